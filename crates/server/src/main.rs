mod config;
mod events;
mod tui;

use std::io;
use std::sync::Arc;
use std::sync::mpsc;
use std::time::{Duration, Instant};

use anyhow::Result;
use clap::Parser;
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::terminal::{self, EnterAlternateScreen, LeaveAlternateScreen};
use crossterm::{cursor, execute};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use tokio::runtime::Runtime;

use config::ServerConfig;
use mled::{Engine, EngineConfig, EngineEvent, PatternSpec, Targets};
use tui::{Dashboard, TuiState};

#[derive(Parser)]
#[command(name = "mled-server")]
#[command(about = "MLED/1 multicast LED controller")]
struct Args {
    #[arg(long, default_value = "auto", help = "Bind IP, or 'auto' for the wildcard address")]
    bind_ip: String,

    #[arg(long, help = "Interface to join the multicast group on")]
    iface: Option<String>,

    #[arg(long, default_value = mled::DEFAULT_MULTICAST_GROUP)]
    mcast_group: String,

    #[arg(long, default_value_t = mled::DEFAULT_MULTICAST_PORT)]
    mcast_port: u16,

    #[arg(long, default_value_t = 1)]
    mcast_ttl: u32,

    #[arg(long, default_value_t = 1000, help = "Discovery ping interval, 0 disables")]
    discovery_interval_ms: u64,

    #[arg(long, default_value_t = 30)]
    offline_threshold_s: u64,

    #[arg(long, default_value_t = 500, help = "Beacon interval, 0 disables")]
    beacon_interval_ms: u64,

    #[arg(long, default_value_t = -70, allow_negative_numbers = true)]
    weak_rssi: i32,

    #[arg(long)]
    headless: bool,
}

impl Args {
    fn server_config(&self) -> ServerConfig {
        ServerConfig {
            engine: EngineConfig {
                bind_ip: self.bind_ip.clone(),
                interface: self.iface.clone(),
                multicast_group: self.mcast_group.clone(),
                multicast_port: self.mcast_port,
                multicast_ttl: self.mcast_ttl,
                discovery_interval: Duration::from_millis(self.discovery_interval_ms),
                offline_threshold: Duration::from_secs(self.offline_threshold_s),
                beacon_interval: Duration::from_millis(self.beacon_interval_ms),
                weak_rssi_dbm: self.weak_rssi,
            },
            ..Default::default()
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = args.server_config();

    let runtime = Runtime::new()?;
    let engine = Arc::new(Engine::new(config.engine.clone()));

    if args.headless {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
        engine.on_event(events::log_event);
        runtime.block_on(run_headless(&engine))?;
    } else {
        run_with_tui(&runtime, &engine, &config)?;
    }

    Ok(())
}

async fn run_headless(engine: &Arc<Engine>) -> Result<()> {
    engine.start().await?;
    log::info!("Controller running, epoch {:08X}", engine.epoch_id());

    tokio::signal::ctrl_c().await?;
    log::info!("Shutting down");
    engine.stop().await;
    Ok(())
}

fn run_with_tui(runtime: &Runtime, engine: &Arc<Engine>, config: &ServerConfig) -> Result<()> {
    let (events_tx, events_rx) = mpsc::channel::<EngineEvent>();
    engine.on_event(move |event| {
        let _ = events_tx.send(event.clone());
    });

    runtime.block_on(engine.start())?;

    terminal::enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, cursor::Hide)?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut tui_state = TuiState::new(config.log_capacity);
    if let Some(addr) = engine.local_addr() {
        tui_state.log_info(format!("Controller started on {}", addr));
    }

    let mut last_draw: Option<Instant> = None;
    let mut running = true;

    while running {
        for event in events_rx.try_iter() {
            tui_state.push(events::describe(&event));
        }

        if event::poll(Duration::from_millis(10))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    match key.code {
                        KeyCode::Char('q') | KeyCode::Esc => running = false,
                        KeyCode::Char('p') => match runtime.block_on(engine.send_ping()) {
                            Ok(()) => tui_state.log_info("Ping sent"),
                            Err(e) => tui_state.log_error(format!("Ping failed: {}", e)),
                        },
                        KeyCode::Char('b') => match runtime.block_on(engine.send_beacon()) {
                            Ok(()) => tui_state.log_info("Beacon sent"),
                            Err(e) => tui_state.log_error(format!("Beacon failed: {}", e)),
                        },
                        KeyCode::Char('o') => {
                            apply_to_all(runtime, engine, &mut tui_state, PatternSpec::new("off", 0));
                        }
                        KeyCode::Char('r') => {
                            let spec = PatternSpec::new("rainbow", 60).with_param("speed", 10);
                            apply_to_all(runtime, engine, &mut tui_state, spec);
                        }
                        KeyCode::PageUp => tui_state.scroll_up(),
                        KeyCode::PageDown => tui_state.scroll_down(),
                        KeyCode::End => tui_state.scroll_to_bottom(),
                        _ => {}
                    }
                }
            }
        }

        if last_draw.is_none_or(|at| at.elapsed() >= config.ui_refresh) {
            let dashboard = Dashboard {
                state: engine.state(),
                epoch_id: engine.epoch_id(),
                show_ms: engine.show_ms(),
                local_addr: engine.local_addr(),
                interface: engine.interface(),
                nodes: engine.nodes_snapshot(),
                stats: engine.stats(),
            };
            terminal.draw(|frame| {
                tui::render(frame, &tui_state, &dashboard);
            })?;
            last_draw = Some(Instant::now());
        }
    }

    runtime.block_on(engine.stop());

    terminal::disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, cursor::Show)?;

    Ok(())
}

fn apply_to_all(runtime: &Runtime, engine: &Engine, tui_state: &mut TuiState, spec: PatternSpec) {
    match runtime.block_on(engine.apply_pattern(Targets::All, &spec)) {
        Ok(result) if result.sent_to.is_empty() => {
            tui_state.log_warn(format!("No reachable nodes for '{}'", spec.kind));
        }
        Ok(result) => tui_state.log_info(format!(
            "Applied '{}' to {} nodes",
            spec.kind,
            result.sent_to.len()
        )),
        Err(e) => tui_state.log_error(format!("Apply '{}' failed: {}", spec.kind, e)),
    }
}
