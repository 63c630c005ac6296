use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use crossbeam_channel::{Receiver, Sender, select};
use crossterm::{
    event::{
        self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind,
        KeyModifiers, MouseButton, MouseEventKind,
    },
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use log::{LevelFilter, error, info};
use ratatui::{backend::CrosstermBackend, prelude::*};
use simplelog::{Config as LogConfig, WriteLogger};

mod app;
mod controller;
mod grid;
mod ui;

use app::App;
use controller::{Config, MAX_SWAP_DURATION};
use grid::COLUMNS;

#[derive(Parser, Debug)]
#[command(author, version, about = "Drag-and-drop box grid editor")]
struct Args {
    /// Number of rows in the starting grid
    #[arg(short = 'r', long, default_value_t = 1)]
    rows: usize,

    /// Swap animation length in milliseconds (at most 600000)
    #[arg(
        long,
        default_value_t = 1000,
        value_parser = clap::value_parser!(u64).range(0..=MAX_SWAP_DURATION.as_millis() as u64)
    )]
    swap_ms: u64,

    /// Seed for box colors (random when omitted)
    #[arg(long)]
    seed: Option<u64>,

    /// Write a log to this file
    #[arg(long, value_name = "PATH")]
    log_file: Option<PathBuf>,

    /// Log level used with --log-file
    #[arg(long, default_value_t = LevelFilter::Info)]
    log_level: LevelFilter,
}

impl Args {
    fn config(&self) -> Config {
        Config {
            columns: COLUMNS,
            initial_rows: self.rows,
            swap_duration: Duration::from_millis(self.swap_ms),
            seed: self.seed,
        }
    }
}

fn init_logging(args: &Args) -> Result<()> {
    // The terminal belongs to the UI, so logs only ever go to a file
    let Some(path) = &args.log_file else {
        return Ok(());
    };
    let file = File::create(path).with_context(|| format!("creating log file {}", path.display()))?;
    WriteLogger::init(args.log_level, LogConfig::default(), file)
        .context("initializing logger")?;
    Ok(())
}

fn setup_terminal() -> Result<Terminal<CrosstermBackend<io::Stdout>>> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let terminal = Terminal::new(backend)?;
    Ok(terminal)
}

fn restore_terminal(mut terminal: Terminal<CrosstermBackend<io::Stdout>>) -> Result<()> {
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;
    Ok(())
}

/// Forward terminal events to the UI thread until the receiver goes away.
fn spawn_input_reader(tx: Sender<Event>) {
    thread::spawn(move || {
        loop {
            match event::read() {
                Ok(ev) => {
                    if tx.send(ev).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    error!("input reader stopped: {e}");
                    break;
                }
            }
        }
    });
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args)?;
    info!("starting with {:?}", args);

    let mut terminal = setup_terminal()?;

    let (event_tx, event_rx) = crossbeam_channel::unbounded::<Event>();
    spawn_input_reader(event_tx);

    let mut app = App::new(args.config());
    let res = run_app(&mut terminal, &mut app, &event_rx);

    restore_terminal(terminal)?;
    if let Err(e) = res {
        error!("exiting on error: {e:?}");
        eprintln!("Error: {e:?}");
    }
    Ok(())
}

fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
    events: &Receiver<Event>,
) -> Result<()> {
    let idle_rate = Duration::from_millis(250);
    let frame_rate = Duration::from_millis(33);
    // Redraw only when state changes, or every frame while boxes are sliding
    let mut dirty = true;
    loop {
        if dirty {
            terminal.draw(|f| ui::draw(f, app))?;
            dirty = false;
        }

        let now = Instant::now();
        let wait = if app.is_animating() {
            let until_due = app
                .controller
                .next_deadline()
                .map(|d| d.saturating_duration_since(now))
                .unwrap_or(frame_rate);
            frame_rate.min(until_due)
        } else {
            idle_rate
        };
        let timer = crossbeam_channel::after(wait);

        select! {
            recv(events) -> ev => {
                let ev = ev.context("input channel closed")?;
                dirty |= handle_event(app, ev, Instant::now());
            }
            recv(timer) -> _ => {
                dirty |= app.is_animating();
            }
        }

        if app.tick(Instant::now()) {
            dirty = true;
        }

        if app.should_quit {
            return Ok(());
        }
    }
}

/// Returns true if the screen needs a redraw.
fn handle_event(app: &mut App, ev: Event, now: Instant) -> bool {
    match ev {
        Event::Key(key) if key.kind == KeyEventKind::Press => {
            if app.notice.is_some() {
                if matches!(key.code, KeyCode::Enter | KeyCode::Esc | KeyCode::Char(' ')) {
                    app.dismiss_notice();
                }
                return true;
            }
            if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
                app.should_quit = true;
                return false;
            }
            handle_key(app, key.code, now);
            true
        }
        Event::Mouse(m) => match m.kind {
            MouseEventKind::Down(MouseButton::Left) => {
                app.on_mouse_down(m.column, m.row);
                true
            }
            MouseEventKind::Drag(MouseButton::Left) if app.notice.is_none() => {
                app.on_mouse_drag(m.column, m.row);
                true
            }
            MouseEventKind::Up(MouseButton::Left) if app.notice.is_none() => {
                app.on_mouse_up(m.column, m.row, now);
                true
            }
            MouseEventKind::ScrollDown if app.notice.is_none() => {
                app.scroll(true);
                true
            }
            MouseEventKind::ScrollUp if app.notice.is_none() => {
                app.scroll(false);
                true
            }
            _ => false,
        },
        Event::Resize(_, _) => true,
        _ => false,
    }
}

fn handle_key(app: &mut App, code: KeyCode, now: Instant) {
    match code {
        KeyCode::Char('q') => {
            app.should_quit = true;
        }
        KeyCode::Char('?') => {
            app.toggle_help();
            app.status = if app.show_help {
                "Showing keybinds (press ? to close)".into()
            } else {
                "Closed keybinds".into()
            };
        }
        KeyCode::Char('a') => app.add_row(),
        KeyCode::Char('u') => app.undo(),
        KeyCode::Char(' ') => app.toggle_pickup(now),
        KeyCode::Esc => {
            if app.show_help {
                app.toggle_help();
            } else {
                app.cancel_drag();
            }
        }
        KeyCode::Up | KeyCode::Char('k') => app.move_cursor(-1, 0),
        KeyCode::Down | KeyCode::Char('j') => app.move_cursor(1, 0),
        KeyCode::Left | KeyCode::Char('h') => app.move_cursor(0, -1),
        KeyCode::Right | KeyCode::Char('l') => app.move_cursor(0, 1),
        _ => {}
    }
}
