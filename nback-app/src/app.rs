use crate::cli::Cli;
use ab_glyph::FontArc;
use anyhow::{Context, Result, anyhow};
use nback_core::{InputSource, Level, Renderer, Rgba, Signal};
use nback_experiment::{
    ExperimentConfig, JsonlAnnotationLog, RunOutcome, Session, Summary, TrialController,
};
use nback_render::SkiaRenderer;
use nback_timing::{FrameStats, HighPrecisionTimer, Timer};
use pixels::{Pixels, SurfaceTexture};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::collections::VecDeque;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, trace};
use winit::{
    application::ApplicationHandler,
    dpi::LogicalSize,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    platform::pump_events::{EventLoopExtPumpEvents, PumpStatus},
    window::{Fullscreen, Window, WindowId},
};

const FONT_CANDIDATES: &[&str] = &[
    "assets/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "/Library/Fonts/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

const WINDOW_OPEN_ATTEMPTS: usize = 500;

/// Maps a physical key to the signal it stands for.
pub fn map_key(key: PhysicalKey) -> Option<Signal> {
    let PhysicalKey::Code(code) = key else {
        return None;
    };
    match code {
        KeyCode::Digit0 | KeyCode::Numpad0 => Some(Signal::Select(Level::Zero)),
        KeyCode::Digit1 | KeyCode::Numpad1 => Some(Signal::Select(Level::One)),
        KeyCode::Digit2 | KeyCode::Numpad2 => Some(Signal::Select(Level::Two)),
        KeyCode::Digit3 | KeyCode::Numpad3 => Some(Signal::Select(Level::Three)),
        KeyCode::Space => Some(Signal::Press),
        KeyCode::Escape => Some(Signal::Cancel),
        _ => None,
    }
}

/// Window owner and key-down queue, fed by the pumped event loop.
struct Shell {
    windowed: bool,
    window: Option<Arc<Window>>,
    pending: VecDeque<Signal>,
    failure: Option<anyhow::Error>,
}

impl Shell {
    fn create_window(&self, event_loop: &ActiveEventLoop) -> Result<Arc<Window>> {
        let mut attributes = Window::default_attributes().with_title("N-back");
        if self.windowed {
            attributes = attributes.with_inner_size(LogicalSize::new(1024.0, 768.0));
        } else {
            let monitor = event_loop
                .primary_monitor()
                .or_else(|| event_loop.available_monitors().next())
                .ok_or_else(|| anyhow!("No monitor available"))?;
            if let Some(rate) = monitor.refresh_rate_millihertz() {
                info!(refresh_hz = rate as f64 / 1000.0, "primary monitor");
            }
            attributes = attributes
                .with_fullscreen(Some(Fullscreen::Borderless(Some(monitor))))
                .with_resizable(false);
        }

        let window = Arc::new(event_loop.create_window(attributes)?);
        window.set_cursor_visible(self.windowed);

        let size = window.inner_size();
        println!("Display Configuration:");
        println!("  Physical size: {}×{}", size.width, size.height);
        println!("  Scale factor: {:.2}", window.scale_factor());
        Ok(window)
    }
}

impl ApplicationHandler for Shell {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none() {
            match self.create_window(event_loop) {
                Ok(window) => self.window = Some(window),
                Err(e) => self.failure = Some(e.context("failed to create window")),
            }
        }
    }

    fn window_event(&mut self, _event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => self.pending.push_back(Signal::Cancel),
            WindowEvent::KeyboardInput { event, .. }
                if event.state.is_pressed() && !event.repeat =>
            {
                if let Some(signal) = map_key(event.physical_key) {
                    trace!(?signal, "key down");
                    self.pending.push_back(signal);
                }
            }
            _ => {}
        }
    }
}

/// Keyboard input gathered by pumping the winit event loop from the
/// controller's own thread.
pub struct Keyboard {
    event_loop: EventLoop<()>,
    shell: Shell,
}

impl Keyboard {
    /// Starts the event loop and waits for the window to exist.
    pub fn open(windowed: bool) -> Result<(Self, Arc<Window>)> {
        let event_loop = EventLoop::new().context("failed to start the event loop")?;
        let mut keyboard = Self {
            event_loop,
            shell: Shell {
                windowed,
                window: None,
                pending: VecDeque::new(),
                failure: None,
            },
        };
        for _ in 0..WINDOW_OPEN_ATTEMPTS {
            keyboard.pump(Duration::from_millis(10))?;
            if let Some(window) = keyboard.shell.window.clone() {
                return Ok((keyboard, window));
            }
        }
        Err(anyhow!("window was not created"))
    }

    fn pump(&mut self, timeout: Duration) -> Result<()> {
        if let PumpStatus::Exit(code) = self
            .event_loop
            .pump_app_events(Some(timeout), &mut self.shell)
        {
            debug!(code, "event loop exited");
            self.shell.pending.push_back(Signal::Cancel);
        }
        match self.shell.failure.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl InputSource for Keyboard {
    fn poll(&mut self, timeout: Duration) -> Result<Option<Signal>> {
        if self.shell.pending.is_empty() {
            self.pump(timeout)?;
        }
        Ok(self.shell.pending.pop_front())
    }

    fn discard_pending(&mut self) -> Result<bool> {
        self.pump(Duration::ZERO)?;
        let cancelled = self.shell.pending.contains(&Signal::Cancel);
        if !self.shell.pending.is_empty() {
            debug!(dropped = self.shell.pending.len(), "discarding queued keys");
        }
        self.shell.pending.clear();
        Ok(cancelled)
    }
}

/// The pixels surface backed by an offscreen `SkiaRenderer`.
pub struct Screen {
    window: Arc<Window>,
    pixels: Pixels<'static>,
    renderer: SkiaRenderer,
    present_timer: HighPrecisionTimer,
}

impl Screen {
    pub fn new(window: Arc<Window>, font: FontArc, font_size: f32) -> Result<Self> {
        let size = window.inner_size();
        let surface = SurfaceTexture::new(size.width, size.height, Arc::clone(&window));
        let pixels = Pixels::new(size.width, size.height, surface)
            .context("failed to create the pixel surface")?;
        let renderer = SkiaRenderer::new(size.width, size.height, font, font_size)?;
        Ok(Self {
            window,
            pixels,
            renderer,
            present_timer: HighPrecisionTimer::new(),
        })
    }

    fn sync_size(&mut self) -> Result<()> {
        let size = self.window.inner_size();
        if size.width == 0
            || size.height == 0
            || (size.width, size.height) == (self.renderer.width(), self.renderer.height())
        {
            return Ok(());
        }
        self.pixels.resize_surface(size.width, size.height)?;
        self.pixels.resize_buffer(size.width, size.height)?;
        self.renderer.resize(size.width, size.height)?;
        println!("Display resized to: {}×{}", size.width, size.height);
        Ok(())
    }

    pub fn draw_stats(&self) -> FrameStats {
        self.renderer.draw_stats()
    }

    pub fn present_stats(&self) -> FrameStats {
        self.present_timer.frame_stats()
    }
}

impl Renderer for Screen {
    fn render(&mut self, text: &str, color: Rgba) -> Result<()> {
        self.sync_size()?;
        self.renderer.draw_text(text, color)?;
        self.renderer.copy_to(self.pixels.frame_mut())?;

        let start = self.present_timer.now();
        self.pixels.render().context("failed to present frame")?;
        let elapsed = self.present_timer.elapsed(start);
        self.present_timer.record_frame(elapsed);
        trace!(present_ms = elapsed.as_secs_f64() * 1e3, "frame presented");
        Ok(())
    }
}

impl Drop for Screen {
    fn drop(&mut self) {
        self.window.set_cursor_visible(true);
    }
}

pub fn load_font(explicit: Option<&Path>) -> Result<FontArc> {
    if let Some(path) = explicit {
        return read_font(path);
    }
    FONT_CANDIDATES
        .iter()
        .map(Path::new)
        .find(|p| p.exists())
        .map(read_font)
        .unwrap_or_else(|| Err(anyhow!("no usable font found; pass one with --font")))
}

fn read_font(path: &Path) -> Result<FontArc> {
    let bytes = fs::read(path).with_context(|| format!("failed to read font {}", path.display()))?;
    let font = FontArc::try_from_vec(bytes)
        .with_context(|| format!("{} is not a usable font", path.display()))?;
    info!(path = %path.display(), "font loaded");
    Ok(font)
}

pub fn write_results(path: &Path, summary: &Summary) -> Result<()> {
    let json = serde_json::to_string_pretty(summary)?;
    fs::write(path, json).with_context(|| format!("failed to write results {}", path.display()))?;
    info!(path = %path.display(), "results written");
    Ok(())
}

fn print_timing(label: &str, stats: &FrameStats) {
    if stats.frames == 0 {
        return;
    }
    println!(
        "  {label}: {} frames, avg {:.3}ms, jitter {:.3}ms, min {:.3}ms, max {:.3}ms",
        stats.frames,
        stats.average_frame_time_ns / 1e6,
        stats.jitter_ns / 1e6,
        stats.min_frame_time_ns / 1e6,
        stats.max_frame_time_ns / 1e6,
    );
}

pub fn run(cli: &Cli, config: ExperimentConfig) -> Result<()> {
    let font = load_font(cli.font.as_deref())?;
    // Annotations and response times are stamped from one clock.
    let clock = HighPrecisionTimer::new();
    let mut logger = JsonlAnnotationLog::create(&cli.annotations, clock.clone())
        .with_context(|| format!("failed to open {}", cli.annotations.display()))?;

    let seed = cli.seed.unwrap_or_else(rand::random);
    info!(seed, "sequence seed");

    let (mut keyboard, window) = Keyboard::open(cli.windowed)?;
    let mut screen = Screen::new(window, font, cli.font_size)?;

    let outcome = {
        let session = Session::new(&mut screen, &mut keyboard, &mut logger);
        TrialController::new(
            config,
            session,
            clock,
            StdRng::seed_from_u64(seed),
        )
        .run()?
    };

    info!(
        written = logger.written(),
        path = %logger.path().display(),
        "annotation log closed"
    );

    println!("\nDisplay timing:");
    print_timing("draw", &screen.draw_stats());
    print_timing("present", &screen.present_stats());

    match &outcome {
        RunOutcome::Aborted => println!("\nNo level selected. Goodbye."),
        RunOutcome::Cancelled(_) => println!("\nTest cancelled."),
        RunOutcome::Completed(_) => println!("\nTest completed. Thank you!"),
    }
    if let Some(session) = outcome.session() {
        let summary = session.summary();
        println!("{summary}");
        if let Some(path) = &cli.results {
            write_results(path, &summary)?;
        }
    }
    Ok(())
}
