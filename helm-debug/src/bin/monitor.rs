//! `helm-monitor`: a read-only ratatui dashboard over one venue's top of
//! book, positions, and balances.
//!
//! Grounded on the deleted `bog-debug` orderbook TUI's panel layout
//! (header / ladder / metrics / footer, `Layout`/`Block`/`Paragraph`/`List`
//! widgets, a `q`/`p` keyboard loop) but retargeted at real `helm_core`
//! types instead of a standalone mock snapshot: a background task polls
//! the same [`helm_connectors::ReferenceConnector`] `helm-cli` would run
//! and writes into a local [`helm_core::market_cache::MarketCache`], and
//! the render loop only ever reads that cache. Never submits an order or
//! otherwise touches the venue beyond read-only queries.

use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use crossterm::event::{self, Event, KeyCode};
use crossterm::execute;
use crossterm::terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen};
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, List, ListItem, Paragraph};
use ratatui::{Frame, Terminal};

use helm_connectors::{config_from_symbol_map, Credentials, ReferenceConnector};
use helm_core::config::AppConfig;
use helm_core::connector::Connector;
use helm_core::core::types::Trade;
use helm_core::market_cache::MarketCache;

#[derive(Parser, Debug)]
#[command(name = "helm-monitor", about = "Read-only market/position dashboard")]
struct Args {
    /// Path to the same TOML config `helm-cli` would load.
    #[arg(long)]
    config: PathBuf,

    /// Poll interval for top-of-book/positions/margin, in milliseconds.
    #[arg(long, default_value_t = 1000)]
    refresh_ms: u64,
}

struct PollState {
    venue: String,
    symbols: Vec<(String, String)>, // (canonical, venue_symbol)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = AppConfig::load(&args.config)
        .with_context(|| format!("loading config {}", args.config.display()))?;

    let credentials = match &config.credentials_path {
        Some(path) => Credentials::load(path)
            .with_context(|| format!("loading credentials {}", path.display()))?,
        None => Credentials::default(),
    };

    let symbol_map = config.symbol_map_strings();
    let connector_config = config_from_symbol_map(
        &config.venue,
        config.rest_base_url.clone(),
        config.ws_url.clone(),
        &symbol_map,
        credentials,
        false,
    );
    let connector = Arc::new(ReferenceConnector::new(connector_config)?);
    connector.start().await.context("starting connector")?;

    let cache = Arc::new(MarketCache::new());
    let paused = Arc::new(AtomicBool::new(false));
    let poll_state = PollState {
        venue: config.venue.clone(),
        symbols: symbol_map.into_iter().collect(),
    };

    let poll_connector = connector.clone();
    let poll_cache = cache.clone();
    let poll_paused = paused.clone();
    let refresh = Duration::from_millis(args.refresh_ms);
    let poll_task = tokio::spawn(async move {
        poll_loop(poll_connector, poll_cache, poll_state, poll_paused, refresh).await;
    });

    let result = run_ui(cache, paused, refresh).await;

    poll_task.abort();
    let _ = connector.stop().await;
    result
}

async fn poll_loop(
    connector: Arc<ReferenceConnector>,
    cache: Arc<MarketCache>,
    state: PollState,
    paused: Arc<AtomicBool>,
    refresh: Duration,
) {
    loop {
        if paused.load(Ordering::Relaxed) {
            tokio::time::sleep(refresh).await;
            continue;
        }
        for (canonical, venue_symbol) in &state.symbols {
            let symbol = helm_core::core::types::VenueSymbol(venue_symbol.clone());
            match connector.get_top_of_book(&symbol).await {
                Ok(quote) => {
                    let ts = chrono_millis();
                    cache.set_top(canonical, quote.bid_i, quote.ask_i, ts).await;
                }
                Err(err) => {
                    tracing::debug!(venue = %state.venue, symbol = %venue_symbol, error = %err, "top of book poll failed");
                }
            }
        }

        match connector.get_positions().await {
            Ok(positions) => {
                let ts = chrono_millis();
                for position in positions {
                    cache.set_position(&position.venue_symbol, position.base_qty, ts).await;
                }
            }
            Err(err) => {
                tracing::debug!(venue = %state.venue, error = %err, "positions poll failed");
            }
        }

        match connector.get_margin().await {
            Ok(margin) => {
                let ts = chrono_millis();
                for (asset, value) in margin.iter() {
                    if let Some(total) = value.get("total").and_then(serde_json::Value::as_i64) {
                        let available = value
                            .get("available")
                            .and_then(serde_json::Value::as_i64)
                            .unwrap_or(total);
                        cache.set_balance(asset, total, available, ts).await;
                    }
                }
            }
            Err(err) => {
                tracing::debug!(venue = %state.venue, error = %err, "margin poll failed");
            }
        }

        tokio::time::sleep(refresh).await;
    }
}

/// Millisecond epoch timestamp for cache entries. Uses `SystemTime` rather
/// than a wall-clock crate dependency this binary has no other use for.
fn chrono_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

struct App {
    paused: Arc<AtomicBool>,
    show_trades: bool,
}

impl App {
    fn new(paused: Arc<AtomicBool>) -> Self {
        Self {
            paused,
            show_trades: false,
        }
    }

    fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Relaxed)
    }
}

async fn run_ui(cache: Arc<MarketCache>, paused: Arc<AtomicBool>, refresh: Duration) -> Result<()> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = App::new(paused);
    let result = event_loop(&mut terminal, &mut app, cache, refresh).await;

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    result
}

/// Everything one frame needs, read out of the async `MarketCache` before
/// handing control to ratatui's synchronous draw closure.
struct CacheSnapshot {
    symbols: Vec<helm_core::core::types::CanonicalSymbol>,
    top_of_book: HashMap<String, Option<(Option<i64>, Option<i64>, i64)>>,
    trades: HashMap<String, Vec<Trade>>,
    positions: HashMap<String, (rust_decimal::Decimal, i64)>,
    balances: HashMap<String, helm_core::core::types::Balance>,
}

async fn snapshot_cache(cache: &MarketCache) -> CacheSnapshot {
    let symbols = cache.canonical_symbols_with_top_of_book().await;
    let mut top_of_book = HashMap::new();
    let mut trades = HashMap::new();
    for symbol in &symbols {
        top_of_book.insert(symbol.0.clone(), cache.get_top(&symbol.0).await);
        trades.insert(symbol.0.clone(), cache.snapshot_trades(&symbol.0, 5).await);
    }
    CacheSnapshot {
        symbols,
        top_of_book,
        trades,
        positions: cache.snapshot_positions().await,
        balances: cache.snapshot_balances().await,
    }
}

async fn event_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
    cache: Arc<MarketCache>,
    refresh: Duration,
) -> Result<()> {
    loop {
        let snapshot = snapshot_cache(&cache).await;
        terminal.draw(|frame| draw(frame, app, &snapshot))?;

        if event::poll(refresh)? {
            if let Event::Key(key) = event::read()? {
                match key.code {
                    KeyCode::Char('q') | KeyCode::Esc => return Ok(()),
                    KeyCode::Char('p') => {
                        let was_paused = app.paused.load(Ordering::Relaxed);
                        app.paused.store(!was_paused, Ordering::Relaxed);
                    }
                    KeyCode::Char('t') => app.show_trades = !app.show_trades,
                    _ => {}
                }
            }
        }
    }
}

fn draw(frame: &mut Frame, app: &App, snapshot: &CacheSnapshot) {
    let size = frame.area();
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(8),
            Constraint::Length(3),
        ])
        .split(size);

    draw_header(frame, chunks[0], app);

    let body = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
        .split(chunks[1]);

    if app.show_trades {
        draw_trades(frame, body[0], snapshot);
    } else {
        draw_book(frame, body[0], snapshot);
    }
    draw_positions_and_balances(frame, body[1], snapshot);

    draw_footer(frame, chunks[2], app);
}

fn draw_header(frame: &mut Frame, area: Rect, app: &App) {
    let paused = app.is_paused();
    let status = if paused { "PAUSED" } else { "LIVE" };
    let line = Line::from(vec![
        Span::styled("helm-monitor", Style::default().add_modifier(Modifier::BOLD)),
        Span::raw("  "),
        Span::styled(
            status,
            Style::default().fg(if paused { Color::Yellow } else { Color::Green }),
        ),
    ]);
    let header = Paragraph::new(line).block(Block::default().borders(Borders::ALL).title("helm"));
    frame.render_widget(header, area);
}

fn draw_book(frame: &mut Frame, area: Rect, snapshot: &CacheSnapshot) {
    let items: Vec<ListItem> = snapshot
        .symbols
        .iter()
        .map(|symbol| {
            let line = match snapshot.top_of_book.get(&symbol.0).copied().flatten() {
                Some((Some(bid), Some(ask), ts)) => {
                    format!("{:<12} bid {:>10}  ask {:>10}  ts {}", symbol.0, bid, ask, ts)
                }
                Some((bid, ask, ts)) => {
                    format!(
                        "{:<12} bid {:>10}  ask {:>10}  ts {}",
                        symbol.0,
                        bid.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string()),
                        ask.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string()),
                        ts
                    )
                }
                None => format!("{:<12} (no quote yet)", symbol.0),
            };
            ListItem::new(line)
        })
        .collect();
    let list = List::new(items).block(Block::default().borders(Borders::ALL).title("Top of book"));
    frame.render_widget(list, area);
}

fn draw_trades(frame: &mut Frame, area: Rect, snapshot: &CacheSnapshot) {
    let mut items: Vec<ListItem> = Vec::new();
    for symbol in &snapshot.symbols {
        let trades = snapshot.trades.get(&symbol.0).cloned().unwrap_or_default();
        for trade in trades {
            let side = if trade.side.is_buy() { "buy" } else { "sell" };
            items.push(ListItem::new(format!(
                "{:<12} {:<4} px {:>10} sz {:>8}",
                symbol.0, side, trade.price_i, trade.size_i
            )));
        }
    }
    let list = List::new(items).block(Block::default().borders(Borders::ALL).title("Recent trades"));
    frame.render_widget(list, area);
}

fn draw_positions_and_balances(frame: &mut Frame, area: Rect, snapshot: &CacheSnapshot) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(area);

    let position_items: Vec<ListItem> = snapshot
        .positions
        .iter()
        .map(|(symbol, (qty, ts))| ListItem::new(format!("{symbol:<12} {qty:>12} (ts {ts})")))
        .collect();
    let positions_widget =
        List::new(position_items).block(Block::default().borders(Borders::ALL).title("Positions"));
    frame.render_widget(positions_widget, chunks[0]);

    let balance_items: Vec<ListItem> = snapshot
        .balances
        .iter()
        .map(|(asset, balance)| {
            ListItem::new(format!(
                "{:<8} total {:>12} avail {:>12}",
                asset, balance.total_i, balance.available_i
            ))
        })
        .collect();
    let balances_widget =
        List::new(balance_items).block(Block::default().borders(Borders::ALL).title("Margin"));
    frame.render_widget(balances_widget, chunks[1]);
}

fn draw_footer(frame: &mut Frame, area: Rect, _app: &App) {
    let footer = Paragraph::new("q: quit   p: pause polling   t: toggle trades/book view")
        .block(Block::default().borders(Borders::ALL));
    frame.render_widget(footer, area);
}
