mod app;
mod config;
mod error;
mod event;
mod fs;
mod handler;
mod search;
mod server;
mod sync;

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use crate::app::App;
use crate::config::{AppConfig, FilesConfig, ServerConfig};
use crate::error::AppError;
use crate::event::{Event, EventHandler};
use crate::fs::backend::{Backend, HandleBackend, ServerBackend, SnapshotBackend};
use crate::fs::guard::{resolve_root, DEFAULT_MOUNT_POINT};
use crate::search::{ScrollAction, Span, SpanKind};

/// Browse plain-text files from a local folder or a sandboxed server.
#[derive(Parser, Debug)]
#[command(name = "tv", version, about)]
struct Cli {
    /// Path to a config file (overrides default search)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve a directory over HTTP
    Serve {
        /// Root directory all paths are sandboxed within
        #[arg(long, env = "FILES_DIRECTORY")]
        root: Option<PathBuf>,

        /// Socket address to listen on
        #[arg(long)]
        bind: Option<String>,

        /// Force server-backed browsing on or off (true/false, yes/no, on/off, 1/0)
        #[arg(long, env = "ENABLE_LOCAL_FS")]
        enable_local_fs: Option<String>,

        /// Run in development mode
        #[arg(long)]
        dev: bool,
    },

    /// Print the file tree of a directory or server
    Browse {
        /// Local directory to browse
        #[arg(conflicts_with = "server")]
        dir: Option<PathBuf>,

        /// Read every file once up front instead of on demand
        #[arg(long, requires = "dir")]
        snapshot: bool,

        /// Base URL of a running server
        #[arg(long)]
        server: Option<String>,

        /// Directory on the server to list (defaults to its root)
        #[arg(long, requires = "server")]
        path: Option<String>,

        /// Keep watching the server and report changes until interrupted
        #[arg(long, requires = "server")]
        follow: bool,

        /// Search the selected file
        #[arg(long)]
        search: Option<String>,

        /// Read commands from stdin: r, s <file>, t <dir>, /<query>, n, p, q
        #[arg(long, short = 'i')]
        interactive: bool,

        /// Text extensions to include (repeatable)
        #[arg(long = "ext")]
        extensions: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> error::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve {
            root,
            bind,
            enable_local_fs,
            dev,
        } => {
            let enable_local_fs = match enable_local_fs.as_deref() {
                Some(raw) => Some(server::gate::parse_switch(raw).ok_or_else(|| {
                    AppError::Config(format!("ENABLE_LOCAL_FS: unrecognized value '{raw}'"))
                })?),
                None => None,
            };
            let overrides = AppConfig {
                server: ServerConfig {
                    bind,
                    root: root.map(|r| r.to_string_lossy().to_string()),
                    enable_local_fs,
                    mode: dev.then(|| "development".to_string()),
                    request_timeout_ms: None,
                },
                ..Default::default()
            };
            let config = AppConfig::load(cli.config.as_deref(), Some(&overrides));
            let cwd = std::env::current_dir()?;
            let root = resolve_root(config.root(), Path::new(DEFAULT_MOUNT_POINT), &cwd);
            server::serve(config, root).await
        }
        Command::Browse {
            dir,
            snapshot,
            server,
            path,
            follow,
            search,
            interactive,
            extensions,
        } => {
            let overrides = AppConfig {
                files: FilesConfig {
                    extensions: (!extensions.is_empty()).then_some(extensions),
                },
                ..Default::default()
            };
            let config = AppConfig::load(cli.config.as_deref(), Some(&overrides));
            let backend = open_backend(&config, dir, snapshot, server, path).await?;
            browse(backend, follow, interactive, search).await
        }
    }
}

async fn open_backend(
    config: &AppConfig,
    dir: Option<PathBuf>,
    snapshot: bool,
    server: Option<String>,
    path: Option<String>,
) -> error::Result<Backend> {
    if let Some(url) = server {
        return Ok(Backend::Server(ServerBackend::new(
            &url,
            path,
            config.request_timeout(),
        )?));
    }

    let dir = dir.unwrap_or_else(|| PathBuf::from("."));
    let dir = dir
        .canonicalize()
        .map_err(|_| AppError::InvalidPath(format!("{} does not exist", dir.display())))?;
    if snapshot {
        Ok(Backend::Snapshot(
            SnapshotBackend::capture(&dir, config.extensions()).await?,
        ))
    } else {
        Ok(Backend::Handle(HandleBackend::open(&dir, config.extensions())?))
    }
}

async fn browse(
    backend: Backend,
    follow: bool,
    interactive: bool,
    search: Option<String>,
) -> error::Result<()> {
    let mut events = EventHandler::new();
    let mut app = App::new(backend, events.sender());
    app.follow = follow;

    app.refresh().await?;
    if let Some(query) = &search {
        app.set_search_query(query);
    }
    print_tree(&app);
    print_search(&mut app);

    if follow && !app.open_directory_watch().await? {
        tracing::warn!(backend = app.backend.name(), "backend cannot be watched");
    }
    if !follow && !interactive {
        return Ok(());
    }
    if interactive {
        // Without a watch to keep the session alive, end of input ends it.
        spawn_commands(events.sender(), !follow);
    }

    loop {
        let first = tokio::select! {
            event = events.next() => event?,
            _ = tokio::signal::ctrl_c() => Event::Quit,
        };
        let before = app.selection.clone();
        let query = app.search.query().to_string();

        handler::handle_event(&mut app, first).await;
        while let Some(event) = events.try_next() {
            handler::handle_event(&mut app, event).await;
        }

        if app.selection != before {
            tracing::info!(
                selected = app.selection.path.as_deref().unwrap_or("<none>"),
                index = ?app.selection.index,
                files = app.tree_state.flat_items.len(),
                "selection reconciled"
            );
            print_tree(&app);
        }
        if app.selection != before || app.search.query() != query {
            print_search(&mut app);
        } else {
            print_focus(&mut app);
        }
        if let Some(message) = app.status_message.take() {
            println!("! {message}");
        }
        if app.should_quit {
            break;
        }
    }
    app.close_watches();
    Ok(())
}

/// Read commands from stdin, one per line, into the event queue.
fn spawn_commands(tx: mpsc::UnboundedSender<Event>, quit_on_eof: bool) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => match parse_command(&line) {
                    Some(event) => {
                        if tx.send(event).is_err() {
                            return;
                        }
                    }
                    None if line.trim().is_empty() => {}
                    None => eprintln!("commands: r | s <file> | t <dir> | /<query> | n | p | q"),
                },
                Ok(None) => {
                    if quit_on_eof {
                        let _ = tx.send(Event::Quit);
                    }
                    return;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "stdin closed");
                    return;
                }
            }
        }
    });
}

fn parse_command(line: &str) -> Option<Event> {
    let line = line.trim();
    if let Some(query) = line.strip_prefix('/') {
        return Some(Event::Search(query.to_string()));
    }
    let (command, arg) = match line.split_once(char::is_whitespace) {
        Some((command, arg)) => (command, arg.trim()),
        None => (line, ""),
    };
    match (command, arg) {
        ("r", "") => Some(Event::Refresh),
        ("n", "") => Some(Event::SearchNext),
        ("p", "") => Some(Event::SearchPrevious),
        ("q", "") => Some(Event::Quit),
        ("s", path) if !path.is_empty() => Some(Event::Select(path.to_string())),
        ("t", path) if !path.is_empty() => Some(Event::Toggle(path.to_string())),
        _ => None,
    }
}

fn print_tree(app: &App) {
    if app.tree_state.is_empty() {
        println!("(no text files)");
        return;
    }
    for (item, entry) in app
        .tree_state
        .flat_items
        .iter()
        .zip(app.tree_state.visible_entries())
    {
        let marker = if app.selection.is_selected(&item.path) {
            '>'
        } else {
            ' '
        };
        println!(
            "{marker} {}{}  ({} bytes)",
            "  ".repeat(item.depth),
            item.path,
            entry.size_bytes
        );
    }
}

fn print_search(app: &mut App) {
    if app.search.query().is_empty() {
        return;
    }
    let text = app.selected_content();
    let matches = app.search.matches();
    println!("{} match(es) for '{}'", matches.len(), app.search.query());
    for (i, range) in matches.iter().enumerate() {
        let (line, column) = search::line_col(text, range.start);
        let current = if app.search.current() == Some(i) { '*' } else { ' ' };
        println!("{current} {}:{}", line + 1, column + 1);
    }
    print_focus(app);
}

/// Show the focused match in its line and apply the scroll planned for it.
fn print_focus(app: &mut App) {
    let Some(action) = app.take_scroll() else {
        return;
    };
    if let Some(range) = app.search.current_match() {
        let text = app.selected_content();
        let spans = app.search.spans(text);
        let (line, column) = search::line_col(text, range.start);
        println!("{}:{}  {}", line + 1, column + 1, render_line(text, &spans, range.start));
    }
    match action {
        ScrollAction::Stay => {}
        ScrollAction::Jump { top } => println!("  scroll -> {top:.0}px"),
        ScrollAction::Smooth { top, generation } => {
            if app.viewport.settle(top, generation) {
                println!("  scroll ~> {top:.0}px");
            }
        }
    }
}

/// The line of `text` containing `offset`, with matches in `[..]` and the
/// focused match in `>>..<<`.
fn render_line(text: &str, spans: &[Span], offset: usize) -> String {
    let start = text[..offset].rfind('\n').map_or(0, |i| i + 1);
    let end = text[offset..].find('\n').map_or(text.len(), |i| offset + i);

    let mut out = String::new();
    for span in spans {
        let from = span.range.start.max(start);
        let to = span.range.end.min(end);
        if from >= to {
            continue;
        }
        let piece = &text[from..to];
        match span.kind {
            SpanKind::Plain => out.push_str(piece),
            SpanKind::Match => {
                out.push('[');
                out.push_str(piece);
                out.push(']');
            }
            SpanKind::Current => {
                out.push_str(">>");
                out.push_str(piece);
                out.push_str("<<");
            }
        }
    }
    out
}
