//! wsterm - A persistent remote terminal session client
//!
//! wsterm keeps one long-lived session to a remote interactive process
//! over a WebSocket text channel and renders it in the local terminal.
//! The session outlives the screen: reconnects run automatically with
//! bounded backoff, scrollback survives surface re-attachment, and new
//! output never steals the viewport from a user reading history.
//!
//! # Quick Start
//!
//! ```text
//! wsterm -e http://localhost:8080/claude/ws
//! wsterm                # endpoint from ~/.wsterm/config.toml
//! ```
//!
//! # Keys
//!
//! | Key | Action |
//! |-----|--------|
//! | Ctrl+Q | Quit |
//! | Ctrl+R | Reconnect (when not connected) |
//! | Ctrl+P | Snippet selector (when connected) |
//! | Shift+PageUp/PageDown | Scroll history |
//! | Shift+End | Jump to live output |
//! | Mouse wheel | Scroll history |
//!
//! Everything else is forwarded to the remote process.

mod core;
mod ui;
mod scroll;
mod snippets;
mod config;

use std::cell::Cell;
use std::env;
use std::io::Write;
use std::rc::Rc;
use std::sync::mpsc;
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers, MouseEventKind};
use crossterm::terminal;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use crate::config::Config;
use crate::core::conn::{ConnectionState, ThreadScheduler};
use crate::core::session::{Session, SessionOptions};
use crate::core::transport::{SessionEvent, WsTransportFactory};
use crate::snippets::{SnippetSelector, SnippetStore};
use crate::ui::{KeyMapper, Renderer, StatusLine, SurfaceAdapter, TermModes};

/// Command line arguments
#[derive(Default)]
struct CliArgs {
    /// Endpoint URL override
    endpoint: Option<String>,
    /// Fixed grid width override
    cols: Option<u16>,
    /// Enable resize notices to the remote process
    send_resize: bool,
    /// Hide the status bar
    no_status_bar: bool,
}

/// Version string from Cargo.toml
const VERSION: &str = env!("CARGO_PKG_VERSION");

fn print_version() {
    eprintln!("wsterm {}", VERSION);
}

fn print_help() {
    eprintln!("wsterm {} - A persistent remote terminal session client", VERSION);
    eprintln!();
    eprintln!("Usage: wsterm [OPTIONS]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -e, --endpoint <URL>  Remote endpoint (http/https or ws/wss URL)");
    eprintln!("      --cols <N>        Fixed grid width (default 200)");
    eprintln!("      --send-resize     Send resize notices to the remote process");
    eprintln!("      --no-status-bar   Hide the status bar");
    eprintln!("  -v, --version         Show version");
    eprintln!("  -h, --help            Show this help");
    eprintln!();
    eprintln!("Keys:");
    eprintln!("  Ctrl+Q                Quit");
    eprintln!("  Ctrl+R                Reconnect (when not connected)");
    eprintln!("  Ctrl+P                Snippet selector (when connected)");
    eprintln!("  Shift+PageUp/Down     Scroll history");
    eprintln!("  Shift+End             Jump back to live output");
    eprintln!();
    eprintln!("Snippets are stored in: ~/.wsterm/snippets.toml");
    eprintln!("Configuration: ~/.wsterm/config.toml");
}

fn parse_args() -> Result<CliArgs, String> {
    let args: Vec<String> = env::args().collect();
    let mut cli = CliArgs::default();
    let mut i = 1;

    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => {
                print_help();
                std::process::exit(0);
            }
            "-v" | "--version" => {
                print_version();
                std::process::exit(0);
            }
            "-e" | "--endpoint" => {
                i += 1;
                if i >= args.len() {
                    return Err("Missing endpoint argument".to_string());
                }
                cli.endpoint = Some(args[i].clone());
            }
            "--cols" => {
                i += 1;
                let value = args.get(i).ok_or("Missing cols argument")?;
                cli.cols = Some(
                    value
                        .parse()
                        .map_err(|_| format!("Invalid cols value: {}", value))?,
                );
            }
            "--send-resize" => {
                cli.send_resize = true;
            }
            "--no-status-bar" => {
                cli.no_status_bar = true;
            }
            arg => {
                return Err(format!("Unknown argument: {}. Use -h for help.", arg));
            }
        }
        i += 1;
    }

    Ok(cli)
}

fn main() -> anyhow::Result<()> {
    let cli = match parse_args() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!("Use --help for usage information");
            std::process::exit(1);
        }
    };

    // Initialize logging to file
    let home = std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(std::path::PathBuf::from);

    let log_path = home
        .map(|h| h.join(".wsterm").join("wsterm.log"))
        .unwrap_or_else(|| std::path::PathBuf::from("wsterm.log"));

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .ok();

    if let Some(file) = log_file {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(Level::INFO)
            .with_writer(std::sync::Mutex::new(file))
            .with_ansi(false)
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    }

    info!("wsterm starting...");

    // Merge config: command line args override config file
    let mut config = Config::load();
    if let Some(endpoint) = cli.endpoint {
        config.endpoint = Some(endpoint);
    }
    if let Some(cols) = cli.cols {
        config.cols = cols;
    }
    if cli.send_resize {
        config.send_resize = true;
    }
    if cli.no_status_bar {
        config.status_bar.visible = false;
    }

    let endpoint = config.endpoint.clone().ok_or_else(|| {
        anyhow::anyhow!("no endpoint configured; pass -e or set endpoint in ~/.wsterm/config.toml")
    })?;

    info!("Endpoint: {}", endpoint);
    info!("Grid width: {}", config.cols);

    run_terminal(config, endpoint)
}

fn run_terminal(config: Config, endpoint: String) -> anyhow::Result<()> {
    let (events_tx, events_rx) = mpsc::channel::<SessionEvent>();

    let options = SessionOptions {
        cols: config.cols,
        scrollback: config.scrollback,
        send_resize: config.send_resize,
        policy: config.reconnect.to_policy(),
    };
    let mut session = Session::new(
        options,
        Box::new(WsTransportFactory),
        Box::new(ThreadScheduler::new(events_tx.clone())),
        events_tx.clone(),
    );
    session.initialize(&endpoint)?;

    // The status bar is a plain subscriber of the session
    let status = Rc::new(Cell::new(session.status()));
    let status_changed = Rc::new(Cell::new(true));
    let _status_sub = {
        let status = status.clone();
        let status_changed = status_changed.clone();
        session.subscribe(move |s| {
            info!("connection status: {}", s.as_str());
            status.set(s);
            status_changed.set(true);
        })
    };

    let (cols, rows) = Renderer::size()?;
    info!("Terminal size: {}x{}", cols, rows);

    let mut adapter = SurfaceAdapter::new(config.status_bar.visible);
    adapter.mount(&mut session, cols, rows)?;

    let mut selector = SnippetSelector::new(SnippetStore::load());

    let mut renderer = Renderer::new(config.colors.clone());
    renderer.init()?;

    // Set window title
    print!("\x1b]0;wsterm - {}\x07", endpoint);
    let _ = std::io::stdout().flush();

    let result = run_main_loop(
        &mut session,
        &mut renderer,
        &mut adapter,
        &mut selector,
        &events_rx,
        &status,
        &status_changed,
        &endpoint,
    );

    // The surface goes away with the process; the session is torn down
    // explicitly, never by the detach itself.
    adapter.unmount(&mut session);
    session.teardown();

    // Cleanup - multiple attempts to ensure it works
    let _ = renderer.cleanup();
    let _ = terminal::disable_raw_mode();

    print!("\x1b[?1049l"); // Leave alternate screen
    print!("\x1b[?25h"); // Show cursor
    print!("\x1b[0m"); // Reset attributes
    let _ = std::io::stdout().flush();

    result
}

#[allow(clippy::too_many_arguments)]
fn run_main_loop(
    session: &mut Session,
    renderer: &mut Renderer,
    adapter: &mut SurfaceAdapter,
    selector: &mut SnippetSelector,
    events_rx: &mpsc::Receiver<SessionEvent>,
    status: &Rc<Cell<ConnectionState>>,
    status_changed: &Rc<Cell<bool>>,
    endpoint: &str,
) -> anyhow::Result<()> {
    let poll_timeout = Duration::from_millis(10);
    let mut dirty = true;

    loop {
        // Process everything the transport and timers delivered
        for event in events_rx.try_iter() {
            if session.handle_event(event) {
                dirty = true;
            }
        }
        if status_changed.take() {
            dirty = true;
        }

        if dirty {
            if let Some(region) = adapter.active() {
                let (_, rows) = Renderer::size()?;
                let line = StatusLine {
                    status: status.get(),
                    endpoint,
                    scrolled_lines: session.scroll_position(),
                };
                if selector.is_visible() {
                    renderer.render_with_selector(
                        session,
                        region,
                        adapter.status_row(rows),
                        &line,
                        selector,
                    )?;
                } else {
                    renderer.render(session, region, adapter.status_row(rows), &line)?;
                }
            }
            dirty = false;
        }

        // Poll for terminal events
        if !event::poll(poll_timeout)? {
            continue;
        }

        match event::read()? {
            Event::Key(key) => {
                if key.kind != KeyEventKind::Press {
                    continue;
                }

                // Snippet selector swallows input while visible
                if selector.is_visible() {
                    match key.code {
                        KeyCode::Esc => selector.hide(),
                        KeyCode::Enter => {
                            if let Some(command) = selector.confirm() {
                                session.inject_text(&command);
                            }
                        }
                        KeyCode::Up => selector.select_up(),
                        KeyCode::Down => selector.select_down(),
                        KeyCode::Backspace => selector.backspace(),
                        KeyCode::Char(c) if c.is_ascii_digit() && c != '0' => {
                            let number = c.to_digit(10).unwrap() as usize;
                            if let Some(command) = selector.select_number(number) {
                                session.inject_text(&command);
                            }
                        }
                        KeyCode::Char(c) => selector.input_char(c),
                        _ => {}
                    }
                    dirty = true;
                    continue;
                }

                let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
                let shift = key.modifiers.contains(KeyModifiers::SHIFT);

                match key.code {
                    KeyCode::Char('q') if ctrl => {
                        info!("quit requested");
                        break;
                    }
                    // Reconnect is offered whenever not connected; while
                    // connected Ctrl+R belongs to the remote process.
                    KeyCode::Char('r') if ctrl && status.get() != ConnectionState::Connected => {
                        session.reconnect();
                        dirty = true;
                    }
                    KeyCode::Char('p') if ctrl && status.get() == ConnectionState::Connected => {
                        selector.show();
                        dirty = true;
                    }
                    KeyCode::PageUp if shift => {
                        session.scroll_page(true);
                        dirty = true;
                    }
                    KeyCode::PageDown if shift => {
                        session.scroll_page(false);
                        dirty = true;
                    }
                    KeyCode::End if shift => {
                        session.scroll_to_live();
                        dirty = true;
                    }
                    _ => {
                        let modes = session
                            .screen()
                            .map(TermModes::from_screen)
                            .unwrap_or_default();
                        if let Some(bytes) = KeyMapper::map(&key, &modes) {
                            session.send_input(&bytes);
                        }
                    }
                }
            }
            Event::Mouse(mouse) => match mouse.kind {
                MouseEventKind::ScrollUp => {
                    session.scroll_lines(3);
                    dirty = true;
                }
                MouseEventKind::ScrollDown => {
                    session.scroll_lines(-3);
                    dirty = true;
                }
                _ => {}
            },
            Event::Resize(cols, rows) => {
                info!("terminal resized to {}x{}", cols, rows);
                adapter.on_resize(session, cols, rows);
                dirty = true;
            }
            _ => {}
        }
    }

    Ok(())
}
