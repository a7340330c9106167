use anyhow::Result;
use chrono::Utc;
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use std::time::Duration;
use tokio::select;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use breakout_bot::broker::PaperBroker;
use breakout_bot::config::{resolve_symbols, AppConfig};
use breakout_bot::feed::{RandomWalkFeed, ReplayFeed, TickRecorder};
use breakout_bot::instrument::atm_strike;
use breakout_bot::strategy::{BreakoutParams, BreakoutStrategy, Phase};

#[derive(Parser, Debug)]
struct Args {
    #[arg(long, env = "BOT_CONFIG", default_value = "bot.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// paper-trade against a random-walk feed until Ctrl-C
    Start {
        #[arg(long, value_delimiter = ',', default_value = "NIFTY")]
        symbol: Vec<String>,
        #[arg(long, default_value = "1000")]
        tick_ms: u64,
        #[arg(long)]
        record: Option<PathBuf>,
    },
    /// re-run a recorded tick file deterministically
    Replay {
        #[arg(long, value_delimiter = ',', default_value = "NIFTY")]
        symbol: Vec<String>,
        #[arg(long)]
        path: PathBuf,
        #[arg(long, default_value = "0")]
        tick_ms: u64,
    },
    /// validate the config and show the resolved trade parameters
    Check {
        #[arg(long, value_delimiter = ',', default_value = "NIFTY")]
        symbol: Vec<String>,
    },
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn,breakout_bot=debug,bot=debug".into()),
        )
        .with(fmt::layer())
        .init();

    let args = Args::parse();

    let result = match args.command {
        Commands::Start {
            symbol,
            tick_ms,
            record,
        } => run_start(args.config, symbol, tick_ms, record).await,
        Commands::Replay {
            symbol,
            path,
            tick_ms,
        } => run_replay(args.config, symbol, path, tick_ms).await,
        Commands::Check { symbol } => run_check(args.config, symbol).await,
    };

    if let Err(err) = result {
        error!("{err:#}");
        std::process::exit(1);
    }
}

fn now_millis() -> u64 {
    Utc::now().timestamp_millis() as u64
}

async fn run_start(
    config_path: PathBuf,
    symbols: Vec<String>,
    tick_ms: u64,
    record: Option<PathBuf>,
) -> Result<()> {
    let config = AppConfig::load(&config_path).await?;
    let specs = resolve_symbols(&symbols)?;

    let broker = PaperBroker::new();
    let mut runners = Vec::new();
    let mut feeds = Vec::new();
    for spec in &specs {
        let instrument = spec.instrument();
        feeds.push(RandomWalkFeed::new(&instrument.token, config.paper.start_price));
        runners.push(BreakoutStrategy::new(
            BreakoutParams::from_config(&config, instrument),
            broker.clone(),
        )?);
    }

    let mut recorder = match record {
        Some(path) => Some(TickRecorder::create(&path).await?),
        None => None,
    };

    info!("{}", "STARTING PAPER BOT".green());

    let mut interval = tokio::time::interval(Duration::from_millis(tick_ms));
    loop {
        select! {
            _ = interval.tick() => {
                let now = now_millis();
                for feed in feeds.iter_mut() {
                    let tick = feed.next_tick(now);
                    broker.apply_tick(&tick).await;
                    if let Some(recorder) = recorder.as_mut() {
                        if let Err(err) = recorder.record(&tick).await {
                            error!("Failed to record tick : {}", err);
                        }
                    }
                }
                step_runners(&mut runners, now).await;
                if runners.iter().all(|runner| runner.phase().is_terminal()) {
                    warn!("All runners halted, stopping");
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("{}", "STOPPING".yellow());
                for runner in runners.iter_mut() {
                    runner.cancel().await;
                }
                break;
            }
        }
    }

    print_summary(&broker, &runners).await;

    Ok(())
}

async fn run_replay(
    config_path: PathBuf,
    symbols: Vec<String>,
    path: PathBuf,
    tick_ms: u64,
) -> Result<()> {
    let config = AppConfig::load(&config_path).await?;
    let specs = resolve_symbols(&symbols)?;

    let broker = PaperBroker::new();
    let mut runners = Vec::new();
    for spec in &specs {
        runners.push(BreakoutStrategy::new(
            BreakoutParams::from_config(&config, spec.instrument()),
            broker.clone(),
        )?);
    }

    let mut replay = ReplayFeed::open(&path).await?;
    info!("{}", "REPLAYING TICKS".green());

    loop {
        select! {
            tick = replay.next_tick() => {
                let Some(tick) = tick else {
                    info!("End of replay file");
                    break;
                };
                // replayed ticks drive the clock
                let now = tick.time;
                broker.apply_tick(&tick).await;
                step_runners(&mut runners, now).await;
                if runners.iter().all(|runner| runner.phase().is_terminal()) {
                    warn!("All runners halted, stopping");
                    break;
                }
                if tick_ms > 0 {
                    tokio::time::sleep(Duration::from_millis(tick_ms)).await;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("{}", "STOPPING".yellow());
                break;
            }
        }
    }

    print_summary(&broker, &runners).await;

    Ok(())
}

async fn run_check(config_path: PathBuf, symbols: Vec<String>) -> Result<()> {
    let config = AppConfig::load(&config_path).await?;
    let specs = resolve_symbols(&symbols)?;

    println!("{}", "CONFIG OK".green());
    println!(
        " wait {}s, entry offset {}, limit buffer {}, unknown-poll cap {}",
        config.trade.wait_secs,
        config.trade.entry_offset,
        config.trade.limit_buffer,
        config.trade.max_unknown_polls
    );
    println!(
        " order : x{} {} product",
        config.order.quantity, config.order.product
    );
    for spec in specs {
        let start = config.paper.start_price;
        let trigger = start + config.trade.entry_offset;
        println!(
            " {} : paper start {}, ATM strike {}, first trigger near {} (limit {})",
            spec.instrument(),
            start,
            atm_strike(start, spec.strike_step),
            trigger,
            trigger + config.trade.limit_buffer
        );
    }

    Ok(())
}

async fn step_runners(runners: &mut [BreakoutStrategy<PaperBroker>], now: u64) {
    for runner in runners.iter_mut() {
        if runner.phase().is_terminal() {
            continue;
        }
        runner.step(now).await;
    }
}

async fn print_summary(broker: &PaperBroker, runners: &[BreakoutStrategy<PaperBroker>]) {
    println!();
    println!("{}", "SESSION SUMMARY".bold());
    for runner in runners {
        let phase = runner.phase();
        let phase_tag = match phase {
            Phase::Failed { .. } => phase.to_string().red(),
            Phase::Cancelled => phase.to_string().yellow(),
            _ => phase.to_string().green(),
        };
        let last = broker
            .last_price(&runner.instrument().token)
            .await
            .map(|price| format!(", last {}", price))
            .unwrap_or_default();
        println!(
            " {} : {} cycles, phase {}{}",
            runner.instrument(),
            runner.cycles_completed(),
            phase_tag,
            last
        );
        if let Some(reason) = runner.halt_reason() {
            println!("   halted : {}", reason.to_string().red());
        }
        let position = broker.position(&runner.instrument().token).await;
        if position != 0 {
            println!("   open position : {}", position.to_string().yellow());
        }
    }

    let orders = broker.orders().await;
    println!(" {} orders placed", orders.len());
    for order in &orders {
        let fill = order
            .fill_price
            .map(|price| format!(" fill {}", price))
            .unwrap_or_default();
        println!("  {} {} : {}{}", order.id, order.spec, order.status, fill);
    }
}
