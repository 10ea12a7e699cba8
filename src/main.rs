//! Ridgeline - a transparent full-screen overlay of audio "mountains"
//!
//! Several translucent spectrum silhouettes, stacked at different depths,
//! rise and fall with whatever the machine is hearing.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use winit::{
    application::ApplicationHandler,
    dpi::{PhysicalPosition, PhysicalSize},
    event::*,
    event_loop::{ActiveEventLoop, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{Window, WindowId, WindowLevel},
};

use ridgeline::audio::{AudioSource, AudioWorker, CaptureSystem, ToneSource, WavSource};
use ridgeline::cli::{Args, InputChoice};
use ridgeline::params::RenderConfig;
use ridgeline::rendering::RenderSystem;
use ridgeline::silhouette::{build_silhouettes, Vertex};
use ridgeline::state::SharedContext;
use ridgeline::{Result, RidgelineError};

/// Samples per batch for file and tone input (~11.6ms @ 44.1kHz)
const BATCH_LEN: usize = 512;

/// Main application state
struct App {
    context: Arc<SharedContext>,
    render_config: RenderConfig,

    // Window and rendering
    window: Option<Arc<Window>>,
    render_system: Option<RenderSystem>,

    // Per-frame scratch, reused across frames
    snapshot: Vec<Vec<f32>>,
    vertices: Vec<Vertex>,
    drawn: Option<(u64, (u32, u32))>,

    frame: u32,
    error: Option<RidgelineError>,
}

impl App {
    fn new(context: Arc<SharedContext>, render_config: RenderConfig) -> Self {
        Self {
            context,
            render_config,
            window: None,
            render_system: None,
            snapshot: Vec::new(),
            vertices: Vec::new(),
            drawn: None,
            frame: 0,
            error: None,
        }
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: RidgelineError) {
        error!("{}", err);
        self.error = Some(err);
        event_loop.exit();
    }

    /// Match the window to its monitor, in case resolution or monitor changed
    fn auto_resize(&self) {
        let Some(window) = &self.window else {
            return;
        };
        let Some(monitor) = window.current_monitor() else {
            return;
        };

        let target = monitor.size();
        if window.inner_size() != target {
            info!("Monitor is {}x{}, resizing overlay", target.width, target.height);
            let _ = window.request_inner_size(target);
            window.set_outer_position(monitor.position());
        }
    }

    /// Render a single frame
    fn render_frame(&mut self, event_loop: &ActiveEventLoop) {
        if self.frame == 0 {
            self.auto_resize();
        }
        self.frame = (self.frame + 1) % self.render_config.refresh_rate_hz;

        let Some(render_system) = self.render_system.as_mut() else {
            return;
        };

        // Copy under the lock, build geometry outside it
        let generation = self.context.snapshot_into(&mut self.snapshot);
        let size = render_system.size();
        if self.drawn != Some((generation, size)) {
            build_silhouettes(
                self.context.layers(),
                &self.snapshot,
                size,
                &self.render_config,
                &mut self.vertices,
            );
            self.drawn = Some((generation, size));
        }

        match render_system.render(&self.vertices) {
            Ok(()) => {}
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                render_system.reconfigure();
            }
            Err(wgpu::SurfaceError::OutOfMemory) => {
                self.fail(
                    event_loop,
                    RidgelineError::Render("GPU out of memory".to_string()),
                );
            }
            Err(e) => warn!("Render error: {:?}", e),
        }
    }
}

impl ApplicationHandler for App {
    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }

    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return; // Already initialized
        }

        let (position, size) = match event_loop.primary_monitor() {
            Some(monitor) => (monitor.position(), monitor.size()),
            None => (
                PhysicalPosition::new(0, 0),
                PhysicalSize::new(
                    self.render_config.fallback_width,
                    self.render_config.fallback_height,
                ),
            ),
        };

        // Create window
        let window_attributes = Window::default_attributes()
            .with_title("Ridgeline")
            .with_decorations(false)
            .with_transparent(true)
            .with_resizable(false)
            .with_window_level(WindowLevel::AlwaysOnTop)
            .with_position(position)
            .with_inner_size(size);

        let window = match event_loop.create_window(window_attributes) {
            Ok(window) => Arc::new(window),
            Err(e) => {
                self.fail(
                    event_loop,
                    RidgelineError::Render(format!("failed to create window: {}", e)),
                );
                return;
            }
        };

        // Let clicks fall through to whatever is underneath
        if let Err(e) = window.set_cursor_hittest(false) {
            warn!("Overlay will capture the mouse: {}", e);
        }

        // Initialize rendering system
        match pollster::block_on(RenderSystem::new(Arc::clone(&window))) {
            Ok(render_system) => self.render_system = Some(render_system),
            Err(e) => {
                self.fail(event_loop, e);
                return;
            }
        }

        info!("Ridgeline is running, press ESC to quit");
        self.window = Some(window);
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _window_id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        state: ElementState::Pressed,
                        physical_key: PhysicalKey::Code(KeyCode::Escape),
                        ..
                    },
                ..
            } => event_loop.exit(),
            WindowEvent::Resized(size) => {
                if let Some(render_system) = self.render_system.as_mut() {
                    render_system.resize(size.width, size.height);
                }
            }
            WindowEvent::RedrawRequested => {
                self.render_frame(event_loop);
            }
            _ => {}
        }
    }
}

fn run(args: Args) -> Result<()> {
    // Everything fallible about configuration fails here, before any thread starts
    let mut analysis = args.analysis_config();
    analysis.validate()?;
    let context = Arc::new(SharedContext::from_config(&args.layer_presets(), &analysis)?);

    let mut capture = None;
    let source: Box<dyn AudioSource> = match args.input() {
        InputChoice::Capture(device) => {
            let (system, source) = CaptureSystem::start(device)?;
            capture = Some(system);
            Box::new(source)
        }
        InputChoice::Wav(path) => Box::new(WavSource::open(path, BATCH_LEN, true)?),
        InputChoice::Tone(freq_hz) => Box::new(ToneSource::new(
            freq_hz,
            0.05,
            analysis.sample_rate_hz,
            BATCH_LEN,
            true,
        )),
    };
    analysis.sample_rate_hz = source.sample_rate_hz();

    let worker = AudioWorker::new(Arc::clone(&context), source, &analysis)?.spawn()?;

    let mut app = App::new(Arc::clone(&context), args.render_config());
    let event_loop = EventLoop::new()
        .map_err(|e| RidgelineError::Render(format!("failed to create event loop: {}", e)))?;
    let loop_result = event_loop.run_app(&mut app);

    // Window is gone: stop the worker and wait until it has let go of shared state
    if let Some(report) = worker.shutdown() {
        info!(
            "Audio worker stopped: {} passes, {} acquisition failures",
            report.passes, report.acquisition_failures
        );
    }
    if let Some(capture) = capture {
        let dropped = capture.dropped_batches();
        if dropped > 0 {
            warn!("{} capture batches dropped while the worker was busy", dropped);
        }
    }

    loop_result.map_err(|e| RidgelineError::Render(format!("event loop failed: {}", e)))?;
    match app.error.take() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("ridgeline=info")),
        )
        .init();

    let args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("ridgeline: {}", e);
            ExitCode::FAILURE
        }
    }
}
