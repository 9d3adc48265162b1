mod screen;

use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use arboard::Clipboard;
use clap::Parser;
use crossterm::cursor;
use crossterm::event::{self, Event};
use crossterm::terminal::{self, Clear, ClearType};
use directories::ProjectDirs;
use folio_core::{
    project_dirs, Command, FileManifestSource, FilePreferenceStore, ImageLoader, LoadState,
    Locale, MemoryPreferenceStore, PreferenceStore, Viewer, ViewerConfig, ViewerEvent,
};
use folio_render::{source_url, FileImageLoader};
use folio_tty::{EventMapper, InputMode, KittyRenderer, UiEvent};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{prelude::*, EnvFilter};

use crate::screen::{redraw, viewport_rows, UiState};

/// Decoded images wider than this are scaled down before display.
const MAX_IMAGE_WIDTH: u32 = 1600;

/// Viewport height used when no terminal is attached.
const CHECK_VIEWPORT_ROWS: f32 = 24.0;

#[derive(Debug, Parser)]
#[command(name = "folio", version, about = "kitty-native viewer for scanned books")]
struct Args {
    /// Manifest describing the book's pages
    #[arg(default_value = "pages.json")]
    manifest: PathBuf,

    /// Page number or label to open at
    #[arg(short = 'p', long = "page")]
    page: Option<String>,

    /// Language of labels and notices (en, ru)
    #[arg(long)]
    locale: Option<Locale>,

    /// Configuration file; defaults to the platform config directory
    #[arg(long)]
    config: Option<PathBuf>,

    /// Load the manifest, print its table of contents and exit
    #[arg(long)]
    check: bool,
}

struct RawModeGuard;

impl RawModeGuard {
    fn new() -> anyhow::Result<Self> {
        terminal::enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
        let mut stdout = io::stdout();
        let _ = crossterm::execute!(stdout, cursor::Show);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let project_dirs =
        project_dirs().ok_or_else(|| anyhow!("unable to resolve platform data directories"))?;
    let _log_guard = init_logging(&project_dirs, args.check)?;

    let config = load_config(&args)?;
    let state_dir = project_dirs.data_local_dir().join("state");
    let store: Arc<dyn PreferenceStore> = match FilePreferenceStore::new(state_dir) {
        Ok(store) => Arc::new(store),
        Err(err) => {
            warn!(error = %format!("{err:#}"), "preferences will not persist this session");
            Arc::new(MemoryPreferenceStore::new())
        }
    };
    let images: Arc<dyn ImageLoader> = Arc::new(FileImageLoader::with_max_width(MAX_IMAGE_WIDTH));
    let source = FileManifestSource::new(args.manifest.clone());

    if args.check {
        let viewer = Viewer::new(config, store, images, CHECK_VIEWPORT_ROWS);
        return check(viewer, &source, args.page.as_deref()).await;
    }

    let (_, rows) = terminal::size()?;
    let mut viewer = Viewer::new(config, store, images, viewport_rows(rows, false));
    if let Err(err) = viewer.load_with(&source).await {
        warn!(error = %format!("{err:#}"), "showing load failure");
    }
    if let Some(query) = &args.page {
        if let Err(err) = viewer.locate(query) {
            warn!(%err, query, "start page not found");
        }
    }
    run(viewer)
}

fn load_config(args: &Args) -> Result<ViewerConfig> {
    let path = match &args.config {
        Some(path) => Some(path.clone()),
        None => ViewerConfig::default_path(),
    };
    let mut config = match path {
        Some(path) => ViewerConfig::load_or_default(&path)?,
        None => ViewerConfig::default(),
    };
    if let Some(locale) = args.locale {
        config.locale = locale;
    }
    Ok(config)
}

async fn check(
    mut viewer: Viewer,
    source: &FileManifestSource,
    page: Option<&str>,
) -> Result<()> {
    if let Err(err) = viewer.load_with(source).await {
        if let LoadState::Failed(message) = viewer.state() {
            bail!("{}", message);
        }
        return Err(err);
    }

    let stdout = io::stdout();
    let mut out = stdout.lock();
    writeln!(out, "{}", viewer.title().unwrap_or_default())?;
    for entry in viewer.sidebar().entries() {
        writeln!(out, "  {:<10} {}", entry.key.to_string(), entry.text)?;
    }
    if let Some(query) = page {
        match viewer.locate(query) {
            Ok(_) => writeln!(out, "{} -> {}", query, viewer.indicator())?,
            Err(err) => bail!("{}: {}", viewer.config().locale.not_found(), err),
        }
    }
    Ok(())
}

enum LoopAction {
    Continue,
    Quit,
}

fn run(mut viewer: Viewer) -> Result<()> {
    let events = viewer.events();
    let _raw = RawModeGuard::new()?;
    let mut stdout = io::stdout();
    crossterm::execute!(stdout, cursor::Hide)?;
    let mut renderer = KittyRenderer::new(stdout);
    let mut mapper = EventMapper::new();
    let mut ui = UiState::default();
    let mut clipboard: Option<Clipboard> = None;
    let mut dirty = true;

    loop {
        let drained = std::mem::take(&mut *events.lock());
        for event in drained {
            handle_viewer_event(event, &mut viewer, &mut renderer, &mut ui)?;
            dirty = true;
        }
        sync_mode(&viewer, &mut mapper);

        if dirty {
            ui.pending = mapper.pending_input();
            redraw(&mut renderer, &mut viewer, &ui)?;
            dirty = false;
        }

        if !event::poll(Duration::from_millis(100))? {
            continue;
        }
        match event::read()? {
            Event::Resize(_, rows) => {
                let fullscreen = viewer.controls().is_fullscreen();
                viewer.apply(Command::Resize {
                    rows: viewport_rows(rows, fullscreen),
                })?;
            }
            ev @ Event::Key(_) => {
                ui.notice = None;
                let ui_event = mapper.map_event(ev);
                match handle_ui_event(ui_event, &mut viewer, &mut ui, &mut clipboard)? {
                    LoopAction::Quit => break,
                    LoopAction::Continue => {}
                }
                dirty = true;
            }
            _ => {}
        }
    }

    renderer.forget_images()?;
    {
        let writer = renderer.writer();
        crossterm::execute!(writer, Clear(ClearType::All), cursor::MoveTo(0, 0))?;
    }
    Ok(())
}

fn sync_mode(viewer: &Viewer, mapper: &mut EventMapper) {
    if mapper.mode() == InputMode::GoTo {
        return;
    }
    let wanted = if viewer.sidebar().is_open() {
        InputMode::Sidebar
    } else {
        InputMode::Normal
    };
    mapper.set_mode(wanted);
}

fn handle_viewer_event(
    event: ViewerEvent,
    viewer: &mut Viewer,
    renderer: &mut KittyRenderer<io::Stdout>,
    ui: &mut UiState,
) -> Result<()> {
    match event {
        ViewerEvent::Notice(message) => ui.notice = Some(message),
        // Transmitted images carry the old theme or belong to a stale pass.
        ViewerEvent::ThemeChanged(_) | ViewerEvent::CardsRendered { .. } => {
            renderer.forget_images()?;
        }
        ViewerEvent::FullscreenChanged(fullscreen) => {
            let (_, rows) = terminal::size()?;
            viewer.apply(Command::Resize {
                rows: viewport_rows(rows, fullscreen),
            })?;
        }
        ViewerEvent::ImageFailed { card, reason } => {
            info!(?card, %reason, "card shows placeholder");
        }
        _ => {}
    }
    Ok(())
}

fn handle_ui_event(
    event: UiEvent,
    viewer: &mut Viewer,
    ui: &mut UiState,
    clipboard: &mut Option<Clipboard>,
) -> Result<LoopAction> {
    match event {
        UiEvent::Command(command) => viewer.apply(command)?,
        UiEvent::GoToSubmit { query } => viewer.apply(Command::Locate { query })?,
        UiEvent::OpenCurrent => {
            ui.notice = Some(match open_current(viewer, clipboard) {
                Ok(notice) => notice,
                Err(err) => {
                    warn!(error = %format!("{err:#}"), "failed to copy page link");
                    format!("{err:#}")
                }
            });
        }
        UiEvent::Quit => return Ok(LoopAction::Quit),
        UiEvent::BeginGoTo
        | UiEvent::GoToChanged { .. }
        | UiEvent::GoToCancel
        | UiEvent::None => {}
    }
    Ok(LoopAction::Continue)
}

/// Copies the link to the current card's image to the clipboard.
fn open_current(viewer: &Viewer, clipboard: &mut Option<Clipboard>) -> Result<String> {
    let card = viewer
        .current_card()
        .or_else(|| viewer.cards().first())
        .ok_or_else(|| anyhow!("nothing to open"))?;
    let url = source_url(&card.source)?;
    if clipboard.is_none() {
        *clipboard = Some(Clipboard::new().context("clipboard unavailable")?);
    }
    let Some(clipboard) = clipboard.as_mut() else {
        bail!("clipboard unavailable");
    };
    clipboard
        .set_text(url.to_string())
        .context("failed to copy link")?;
    Ok(format!("{}: {}", card.open_label, url))
}

/// Logs to `data_local_dir/logs/folio.log`. Without a writable log directory
/// the session runs with console logging under `--check` and none otherwise.
fn init_logging(project_dirs: &ProjectDirs, console: bool) -> Result<Option<WorkerGuard>> {
    let log_dir = project_dirs.data_local_dir().join("logs");
    let log_dir_error = fs::create_dir_all(&log_dir).err();

    let (file_writer, guard) = match log_dir_error {
        None => {
            let file_appender = tracing_appender::rolling::never(&log_dir, "folio.log");
            let (writer, guard) = tracing_appender::non_blocking(file_appender);
            (Some(writer), Some(guard))
        }
        Some(_) => (None, None),
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = file_writer.map(|writer| {
        tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(writer)
    });
    // The interactive screen owns the terminal, so only `--check` logs there.
    let console_layer = console.then(|| tracing_subscriber::fmt::layer().with_writer(io::stderr));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .map_err(|err| anyhow!(err))?;

    if let Some(err) = log_dir_error {
        warn!(%err, dir = %log_dir.display(), "log file disabled");
    }
    Ok(guard)
}
