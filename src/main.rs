//! Payroute - quote the cheapest cross-chain payment route
//!
//! Run with: cargo run -- --chain ethereum --token USDC --amount 100000000

use clap::Parser;
use color_eyre::eyre::Result;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use payroute::brain::RouteScorer;
use payroute::cache::{MemoryCache, SharedCache};
use payroute::cartographer::{ConfiguredLiquidity, LiquidityGraphBuilder};
use payroute::clock::{Clock, SystemClock};
use payroute::config::Config;
use payroute::gas_oracle::{FeeDataProvider, GasEstimator, RpcFeeData};
use payroute::price_oracle::{CoinGeckoSource, DefiLlamaSource, PriceOracle, PriceSource, StaticPriceTable};
use payroute::tokens::{Asset, Chain, TokenRegistry};
use payroute::types::{PaymentIntent, Route};
use payroute::RoutingEngine;

/// Find the cheapest route for a payment into the settlement chain
#[derive(Parser)]
#[command(name = "payroute", version, about)]
struct Cli {
    /// Chain the payer holds funds on
    #[arg(long)]
    chain: Chain,

    /// Token the payer pays with (symbol)
    #[arg(long)]
    token: Asset,

    /// Amount in the token's base units
    #[arg(long)]
    amount: String,

    /// Token the merchant settles in (defaults to the configured destination token)
    #[arg(long)]
    destination: Option<Asset>,

    /// TOML configuration file (defaults to environment variables)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write the effective configuration to this TOML file
    #[arg(long)]
    save_config: Option<PathBuf>,

    /// Also print the ranked alternatives
    #[arg(long, default_value_t = 0)]
    alternatives: usize,

    /// Print the quote as JSON only
    #[arg(long)]
    json: bool,
}

fn print_banner() {
    println!();
    println!(
        "{}",
        style("═══════════════════════════════════════════════════════════════").cyan()
    );
    println!(
        "{}",
        style(" 💸 PAYROUTE - Cross-Chain Payment Routing").cyan().bold()
    );
    println!(
        "{}",
        style("    Liquidity Graph | Bounded Search | Live Cost Oracles").cyan()
    );
    println!(
        "{}",
        style("═══════════════════════════════════════════════════════════════").cyan()
    );
    println!();
}

fn print_route(route: &Route) {
    println!(
        "  {} {:?} | {} hops | ~{}s",
        style("Route:").bold(),
        route.route_type,
        route.hop_count(),
        route.estimated_time_seconds
    );
    for (i, step) in route.steps.iter().enumerate() {
        println!(
            "    {}. {} {}:{} → {}:{} via {} | amount {} | fee ${:.4} | gas ${:.4}",
            i + 1,
            style(step.step_type).magenta(),
            step.from_chain,
            step.from_token,
            step.to_chain,
            step.to_token,
            style(&step.provider).cyan(),
            step.amount,
            step.fee,
            step.gas_estimate
        );
    }
    println!(
        "  Gas: ${:.4} | Fees: ${:.4} | Slippage: {:.4}% | {}",
        route.estimated_gas_cost_usd,
        route.estimated_fees_usd,
        route.estimated_slippage * 100.0,
        style(format!("Total: ${:.4}", route.total_cost_usd)).green().bold()
    );
}

fn build_engine(config: &Config, registry: Arc<TokenRegistry>) -> Result<(RoutingEngine, Arc<PriceOracle>)> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let cache: Arc<dyn SharedCache> = Arc::new(MemoryCache::new(clock.clone()));

    let mut sources: Vec<Arc<dyn PriceSource>> = Vec::new();
    sources.push(Arc::new(CoinGeckoSource::new(config.coingecko_api_key.clone())?));
    if config.defillama_enabled {
        sources.push(Arc::new(DefiLlamaSource::new()?));
    }
    sources.push(Arc::new(StaticPriceTable::default()));

    let prices = Arc::new(PriceOracle::new(
        sources,
        cache.clone(),
        clock.clone(),
        config.policy.price_cache_ttl(),
        config.policy.fetch_timeout(),
    ));

    let fee_data: Option<Arc<dyn FeeDataProvider>> = if config.rpc_endpoints.is_empty() {
        None
    } else {
        Some(Arc::new(RpcFeeData::from_config(config)))
    };
    let gas = Arc::new(GasEstimator::new(
        fee_data,
        prices.clone(),
        clock.clone(),
        Duration::from_secs(config.policy.gas_cache_secs),
        config.policy.fetch_timeout(),
    ));

    let builder = LiquidityGraphBuilder::new(
        config,
        registry,
        Arc::new(ConfiguredLiquidity::from_config(config)),
        gas.clone(),
        prices.clone(),
        cache,
        clock.clone(),
    );
    let scorer = RouteScorer::new(gas);

    Ok((RoutingEngine::new(config, builder, scorer, clock), prices))
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("payroute=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    // Load configuration
    let config = match cli.config {
        Some(ref path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };

    let registry = Arc::new(TokenRegistry::default());
    if let Err(e) = config.validate(&registry) {
        error!("Configuration validation failed: {}", e);
        return Err(e.into());
    }

    if let Some(ref path) = cli.save_config {
        config.save_to_file(path)?;
        info!("Configuration written to {}", path.display());
    }

    if !cli.json {
        print_banner();
        config.print_summary();
        println!();
    }

    let (engine, prices) = build_engine(&config, registry)?;
    let refresh = prices.clone().spawn_refresh(config.policy.price_refresh_interval());

    let intent = PaymentIntent::new(
        cli.chain,
        cli.token,
        cli.amount.clone(),
        cli.destination.unwrap_or(config.destination_token),
    );

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}")?);
    spinner.set_message(format!(
        "Routing {} {} on {} → {} on {}",
        intent.amount, intent.source_token, intent.source_chain, intent.destination_token, config.settlement_chain
    ));
    if !cli.json {
        spinner.enable_steady_tick(Duration::from_millis(100));
    }

    let started = Instant::now();
    let result = engine.quote(&intent).await;
    spinner.finish_and_clear();

    let quote = match result {
        Ok(quote) => quote,
        Err(e) => {
            refresh.abort();
            if e.is_user_facing() {
                println!("{} {}", style("✗ Cannot quote this payment:").red().bold(), e);
            } else {
                error!("Routing failed: {}", e);
            }
            return Err(e.into());
        }
    };
    info!("Quote computed in {:?}", started.elapsed());

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&quote)?);
        refresh.abort();
        return Ok(());
    }

    println!("{}", style("═══ SELECTED ROUTE ═══").green().bold());
    print_route(&quote.route);
    println!(
        "  Valid until {} ({}s)",
        quote.expires_at.format("%H:%M:%S UTC"),
        config.policy.quote_validity_secs
    );

    if cli.alternatives > 0 {
        let ranked = engine.rank_routes(&intent).await?;
        println!();
        println!("{}", style("═══ ALTERNATIVES ═══").magenta().bold());
        for route in ranked.iter().skip(1).take(cli.alternatives) {
            println!("  {}", style(route.describe()).dim());
            println!(
                "    Total: ${:.4} | {} hops | ~{}s",
                route.total_cost_usd,
                route.hop_count(),
                route.estimated_time_seconds
            );
        }
    }

    println!();
    println!("{}", serde_json::to_string_pretty(&quote)?);

    refresh.abort();
    Ok(())
}
