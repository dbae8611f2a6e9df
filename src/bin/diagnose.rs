//! Diagnostic tool - Check router configuration
//!
//! Run with: cargo run --bin diagnose

use std::env;

use payroute::config::Config;
use payroute::tokens::TokenRegistry;

fn main() {
    println!("🔍 PAYROUTE DIAGNOSTIC CHECK\n");

    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            println!("  ❌ Failed to load configuration: {}", e);
            return;
        }
    };
    let registry = TokenRegistry::default();

    println!("═══════════════════════════════════════════════════");
    println!("                  CONFIGURATION                     ");
    println!("═══════════════════════════════════════════════════\n");

    let checks = [
        ("MAX_HOPS", "Maximum edges per route"),
        ("SLIPPAGE_CAP", "Upper bound on modelled slippage"),
        ("FETCH_TIMEOUT_SECS", "Timeout on every external fetch"),
        ("GRAPH_MAX_AGE_SECS", "Cached graph reuse window"),
        ("QUOTE_VALIDITY_SECS", "Lifetime of a quote"),
    ];
    for (key, desc) in checks {
        let marker = if env::var(key).is_ok() { "(from .env)" } else { "(default)" };
        println!("  {}: {}", key, marker);
        println!("    └─ {}\n", desc);
    }
    config.print_summary();

    println!("\n═══════════════════════════════════════════════════");
    println!("                  RPC ENDPOINTS                     ");
    println!("═══════════════════════════════════════════════════\n");

    for chain in registry.chains() {
        if !chain.is_evm() {
            println!("  {:<12} ➖ fixed gas price", chain);
            continue;
        }
        match config.rpc_url(chain) {
            Some(url) => {
                let shown = if url.len() > 50 {
                    format!("{}...", &url[..url.char_indices().nth(40).map(|(i, _)| i).unwrap_or(url.len())])
                } else {
                    url.to_string()
                };
                println!("  {:<12} ✅ {}", chain, shown);
            }
            None => println!("  {:<12} ⚠️  not set (fallback gas price {} gwei)", chain, chain.fallback_gas_price() / 1e9),
        }
    }

    println!("\n═══════════════════════════════════════════════════");
    println!("                  TOKEN REGISTRY                    ");
    println!("═══════════════════════════════════════════════════\n");

    for chain in registry.chains() {
        let symbols: Vec<&str> = registry.tokens_on(chain).iter().map(|t| t.asset.symbol()).collect();
        let dexes: Vec<&str> = config.dexes_on(chain).map(|d| d.name.as_str()).collect();
        println!("  {:<12} {}", chain, symbols.join(", "));
        println!("    └─ dexes: {}", if dexes.is_empty() { "none".to_string() } else { dexes.join(", ") });
    }

    println!("\n═══════════════════════════════════════════════════");
    println!("              BRIDGES INTO {:<22}", config.settlement_chain.as_str().to_uppercase());
    println!("═══════════════════════════════════════════════════\n");

    for chain in registry.chains() {
        if chain == config.settlement_chain {
            continue;
        }
        let lanes: Vec<String> = config
            .bridges
            .iter()
            .filter(|b| b.connects(chain, config.settlement_chain))
            .map(|b| {
                let assets: Vec<&str> = b.assets.iter().map(|a| a.symbol()).collect();
                format!("{} [{}]", b.name, assets.join("/"))
            })
            .collect();
        if lanes.is_empty() {
            println!("  {:<12} ❌ no bridge lane", chain);
        } else {
            println!("  {:<12} ✅ {}", chain, lanes.join(", "));
        }
    }

    println!("\n═══════════════════════════════════════════════════");
    println!("                     STATUS                         ");
    println!("═══════════════════════════════════════════════════\n");

    match config.validate(&registry) {
        Ok(()) => println!("  ✅ Configuration is valid. Routing is ready."),
        Err(e) => println!("  ❌ {}", e),
    }
    println!();
}
