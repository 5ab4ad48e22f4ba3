use anyhow::{Context, Result};
use api_client::{ApiClient, BackendClient};
use clap::{Parser, Subcommand};
use comfy_table::presets::UTF8_FULL;
use comfy_table::{ContentArrangement, Table};
use configuration::{Config, LoggingConfig};
use core_types::{Account, MessageKind, PriceQuote, TradeSide, Transaction, View};
use engine::state::ViewState;
use engine::{BroadcastNotifier, TradingDesk};
use events::Toast;
use rust_decimal::Decimal;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::TryRecvError;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

// ==============================================================================
// CLI Structure
// ==============================================================================

/// A terminal client for the simulated crypto trading desk.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Overrides `backend.base_url` (e.g. "http://localhost:8080/api").
    #[arg(long, global = true)]
    base_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Follow live prices until Ctrl-C.
    Watch {
        /// Stop after this many price snapshots.
        #[arg(long)]
        ticks: Option<usize>,
    },
    /// Look up the current price of one symbol.
    Quote { symbol: String },
    /// Show balance, totals and holdings.
    Account,
    /// Show the transaction history.
    History,
    /// Buy or sell a listed cryptocurrency at its current price.
    Trade {
        symbol: String,
        side: TradeSide,
        amount: String,
    },
    /// Reset the account to its initial balance.
    Reset,
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is fine; it only carries optional overrides.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let config = load_config(&cli)?;
    let _log_guard = init_tracing(&config.logging)?;
    tracing::info!(base_url = %config.backend.base_url, "[TradeDesk] Starting.");

    let api_client: Arc<dyn ApiClient> = Arc::new(BackendClient::new(&config.backend)?);
    let notifier = BroadcastNotifier::default();
    let mut toasts = notifier.subscribe();
    let desk = TradingDesk::new(api_client, Arc::new(notifier), &config);

    let result = run(cli.command, &desk, &mut toasts).await;
    print_toasts(&mut toasts);
    desk.shutdown().await;
    result
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => configuration::load_config_from(path),
        None => configuration::load_config(),
    }
    .context("Failed to load configuration")?;

    if let Some(base_url) = &cli.base_url {
        config.backend.base_url = base_url.clone();
        config.validate()?;
    }
    Ok(config)
}

/// Console logging always; a daily rolling file too when a directory is set.
/// The returned guard must live until exit so buffered lines get flushed.
fn init_tracing(logging: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&logging.level))?;
    let console = fmt::layer().with_writer(std::io::stderr);

    match &logging.directory {
        Some(directory) => {
            let file_appender = tracing_appender::rolling::daily(directory, "tradedesk.log");
            let (non_blocking_file, guard) = tracing_appender::non_blocking(file_appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(console)
                .with(fmt::layer().with_writer(non_blocking_file).with_ansi(false))
                .try_init()?;
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::registry().with(filter).with(console).try_init()?;
            Ok(None)
        }
    }
}

// ==============================================================================
// Command Logic
// ==============================================================================

async fn run(
    command: Commands,
    desk: &TradingDesk,
    toasts: &mut broadcast::Receiver<Toast>,
) -> Result<()> {
    match command {
        Commands::Watch { ticks } => watch(desk, ticks, toasts).await,
        Commands::Quote { symbol } => {
            let quote = desk.quote(&symbol).await.map_err(|e| anyhow::anyhow!(e.reason()))?;
            println!("{}", price_table(std::slice::from_ref(&quote)));
            Ok(())
        }
        Commands::Account => {
            desk.load().await?;
            desk.set_view(View::Portfolio);
            render(desk.state());
            Ok(())
        }
        Commands::History => {
            desk.load().await?;
            desk.set_view(View::History);
            render(desk.state());
            Ok(())
        }
        Commands::Trade {
            symbol,
            side,
            amount,
        } => trade(desk, &symbol, side, amount, toasts).await,
        Commands::Reset => {
            desk.reset().await?;
            print_toasts(toasts);
            desk.set_view(View::Portfolio);
            render(desk.state());
            Ok(())
        }
    }
}

async fn watch(
    desk: &TradingDesk,
    ticks: Option<usize>,
    toasts: &mut broadcast::Receiver<Toast>,
) -> Result<()> {
    // A failed load is already reported as a toast; the feed may still recover prices.
    let _ = desk.start().await;
    print_toasts(toasts);
    desk.set_view(View::Market);

    let mut prices = desk.state().watch_prices();
    prices.borrow_and_update();
    render(desk.state());

    let mut seen = 0;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("[TradeDesk] Interrupted.");
                break;
            }
            changed = prices.changed() => {
                if changed.is_err() {
                    break;
                }
                prices.borrow_and_update();
                seen += 1;
                println!("feed: {:?}", desk.state().feed_state());
                render(desk.state());
                if ticks.is_some_and(|limit| seen >= limit) {
                    break;
                }
            }
        }
    }
    desk.shutdown().await;
    Ok(())
}

async fn trade(
    desk: &TradingDesk,
    symbol: &str,
    side: TradeSide,
    amount: String,
    toasts: &mut broadcast::Receiver<Toast>,
) -> Result<()> {
    desk.load().await?;
    let symbol = symbol.to_ascii_uppercase();
    desk.select_symbol(&symbol)
        .with_context(|| format!("{symbol} is not listed on the market"))?;
    desk.set_side(side);
    desk.set_amount(amount);

    let outcome = desk.execute_trade().await.context("Another trade is still settling")?;
    print_toasts(toasts);
    render(desk.state());

    // Keep the message up, and the panel busy, for the whole feedback window.
    let mut executing = desk.state().watch_executing();
    executing.wait_for(|busy| !*busy).await?;

    if !outcome.success {
        anyhow::bail!(outcome.message.message);
    }
    desk.set_view(View::Portfolio);
    render(desk.state());
    Ok(())
}

// ==============================================================================
// Rendering
// ==============================================================================

fn render(state: &ViewState) {
    match state.view() {
        View::Market => println!("{}", price_table(&state.prices())),
        View::Trade => {
            if let Some(quote) = state.selected_quote() {
                println!(
                    "{} ({}) @ ${:.2}  side: {}",
                    quote.name,
                    quote.symbol,
                    quote.price,
                    state.trade_side()
                );
            }
            if let Some(message) = state.trade_message() {
                let tag = match message.kind {
                    MessageKind::Success => "OK",
                    MessageKind::Error => "ERROR",
                };
                println!("[{tag}] {}: {}", message.title, message.message);
            }
        }
        View::Portfolio => match state.account() {
            Some(account) => println!("{}", account_table(&account)),
            None => println!("No account data."),
        },
        View::History => println!("{}", history_table(&state.transactions())),
    }
}

fn new_table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);
    table
}

fn money(value: Decimal) -> String {
    format!("${:.2}", value)
}

fn price_table(quotes: &[PriceQuote]) -> Table {
    let mut table = new_table(vec!["Symbol", "Name", "Price", "24h Change", "24h %"]);
    for quote in quotes {
        table.add_row(vec![
            quote.symbol.clone(),
            quote.name.clone(),
            money(quote.price),
            format!("{:.2}", quote.change_24h),
            format!("{:.2}%", quote.change_24h_percent),
        ]);
    }
    table
}

fn account_table(account: &Account) -> Table {
    let mut table = new_table(vec!["Symbol", "Quantity", "Avg Price", "Invested", "Value", "P&L"]);
    let mut holdings: Vec<_> = account.holdings.values().collect();
    holdings.sort_by(|a, b| a.symbol.cmp(&b.symbol));
    for holding in holdings {
        table.add_row(vec![
            holding.symbol.clone(),
            holding.quantity.normalize().to_string(),
            money(holding.avg_price),
            money(holding.total_invested),
            holding.current_value.map(money).unwrap_or_else(|| "-".to_string()),
            holding.pnl.map(money).unwrap_or_else(|| "-".to_string()),
        ]);
    }
    table.add_row(vec![
        "Cash".to_string(),
        String::new(),
        String::new(),
        String::new(),
        money(account.balance),
        String::new(),
    ]);
    table.add_row(vec![
        "Total".to_string(),
        String::new(),
        String::new(),
        money(account.total_invested),
        money(account.total_value),
        format!("{} ({:.2}%)", money(account.total_pnl), account.total_pnl_percentage),
    ]);
    table
}

fn history_table(transactions: &[Transaction]) -> Table {
    let mut table = new_table(vec!["#", "Time", "Type", "Symbol", "Quantity", "Price", "Total"]);
    for tx in transactions {
        table.add_row(vec![
            tx.id.clone(),
            tx.timestamp
                .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_default(),
            tx.side.to_string(),
            tx.symbol.clone(),
            tx.quantity.normalize().to_string(),
            money(tx.price),
            money(tx.total),
        ]);
    }
    table
}

fn print_toasts(toasts: &mut broadcast::Receiver<Toast>) {
    for toast in drain_toasts(toasts) {
        let marker = if toast.is_destructive() { "!" } else { "*" };
        println!("{marker} {}: {}", toast.title, toast.description);
    }
}

/// Takes every queued toast. Toasts the channel already overwrote are skipped.
fn drain_toasts(toasts: &mut broadcast::Receiver<Toast>) -> Vec<Toast> {
    let mut drained = Vec::new();
    loop {
        match toasts.try_recv() {
            Ok(toast) => drained.push(toast),
            Err(TryRecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "[TradeDesk] Some notifications were dropped.");
            }
            Err(TryRecvError::Empty | TryRecvError::Closed) => break,
        }
    }
    drained
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drain_toasts_skips_past_lag() {
        let (sender, mut receiver) = broadcast::channel(2);
        for title in ["first", "second", "third"] {
            sender.send(Toast::info(title, "")).unwrap();
        }

        let titles: Vec<String> =
            drain_toasts(&mut receiver).into_iter().map(|t| t.title).collect();
        assert_eq!(titles, vec!["second", "third"]);
        assert!(drain_toasts(&mut receiver).is_empty());
    }
}
