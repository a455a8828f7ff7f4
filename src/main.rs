#[cfg(not(target_arch = "wasm32"))]
fn main() {
    env_logger::init();
    if let Err(err) = native::run() {
        eprintln!("Error: {err:?}");
        std::process::exit(1);
    }
}

#[cfg(target_arch = "wasm32")]
fn main() {}

/// Desktop preview window and headless summary.
#[cfg(not(target_arch = "wasm32"))]
mod native {
    use std::any::Any;
    use std::collections::HashMap;
    use std::env;
    use std::fmt;
    use std::panic::{self, AssertUnwindSafe};
    use std::path::PathBuf;
    use std::sync::Arc;

    use anyhow::{anyhow, Context, Result};
    use log::warn;
    use pollster::block_on;
    use winit::dpi::{LogicalSize, PhysicalPosition};
    use winit::event::{ElementState, Event, MouseButton, MouseScrollDelta, WindowEvent};
    use winit::event_loop::{ControlFlow, EventLoop, EventLoopWindowTarget};
    use winit::window::{Window, WindowBuilder};

    use hero_viewer::{
        summary_lines, FileFetcher, HeroViewer, HostPreferences, LibraryTier, NoMeshDecoder,
        RenderLibrary, ViewerConfig, ViewerState, FALLBACK_CSS_SIZE,
    };

    /// Lines scrolled per wheel notch, in CSS pixels.
    const LINE_HEIGHT: f32 = 100.0;

    pub fn run() -> Result<()> {
        let options = CliOptions::parse()?;
        let config = options.viewer_config()?;
        let preferences = HostPreferences {
            reduced_motion: options.reduced_motion,
            ..HostPreferences::default()
        };
        let fetcher = match &options.assets {
            Some(base) => FileFetcher::with_base(base),
            None => FileFetcher::new(),
        };

        if options.summary_only {
            return run_headless(config, preferences, &fetcher);
        }
        match run_interactive(config.clone(), preferences, &fetcher) {
            Ok(()) => Ok(()),
            Err(err) if err.downcast_ref::<WindowInitError>().is_some() => {
                eprintln!("{err}. Falling back to --summary-only mode.");
                run_headless(config, preferences, &fetcher)
            }
            Err(err) => Err(err),
        }
    }

    fn run_headless(
        config: ViewerConfig,
        preferences: HostPreferences,
        fetcher: &FileFetcher,
    ) -> Result<()> {
        let mut state = ViewerState::new(config, preferences, FALLBACK_CSS_SIZE);
        block_on(state.load_assets(fetcher, &NoMeshDecoder));
        print_summary(&state);
        Ok(())
    }

    fn run_interactive(
        config: ViewerConfig,
        preferences: HostPreferences,
        fetcher: &FileFetcher,
    ) -> Result<()> {
        let default_hook = panic::take_hook();
        panic::set_hook(Box::new(|_| {}));
        let event_loop = panic::catch_unwind(AssertUnwindSafe(EventLoop::new));
        panic::set_hook(default_hook);
        let event_loop = event_loop
            .map_err(|panic| WindowInitError::from_panic("event loop", panic))?
            .map_err(|err| WindowInitError::from_error("event loop", err))?;

        let (width, height) = FALLBACK_CSS_SIZE;
        let window = Arc::new(
            WindowBuilder::new()
                .with_title("hero-viewer")
                .with_inner_size(LogicalSize::new(width as f64, height as f64))
                .build(&event_loop)
                .map_err(|err| WindowInitError::from_error("window", err))?,
        );

        let preferences = HostPreferences {
            device_pixel_ratio: window.scale_factor() as f32,
            ..preferences
        };
        let library = block_on(RenderLibrary::acquire(&LibraryTier::platform_defaults()))?;
        let viewer = block_on(HeroViewer::initialize(
            &library,
            wgpu::SurfaceTarget::from(Arc::clone(&window)),
            config,
            preferences,
            css_size(&window),
            fetcher,
            &NoMeshDecoder,
        ))
        .context("failed to start viewer")?;
        print_summary(viewer.state());

        let mut app = AppState {
            window,
            viewer,
            last_cursor: None,
            last_error: None,
        };
        event_loop.run(|event, target| {
            target.set_control_flow(ControlFlow::Poll);
            if let Err(err) = app.process_event(event, target) {
                app.last_error = Some(err);
                target.exit();
            }
        })?;

        match app.last_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn print_summary(state: &ViewerState) {
        for line in summary_lines(state) {
            println!("{line}");
        }
    }

    fn css_size(window: &Window) -> (u32, u32) {
        let size: LogicalSize<u32> = window.inner_size().to_logical(window.scale_factor());
        (size.width, size.height)
    }

    struct AppState {
        window: Arc<Window>,
        viewer: HeroViewer,
        last_cursor: Option<PhysicalPosition<f64>>,
        last_error: Option<anyhow::Error>,
    }

    impl AppState {
        fn process_event(
            &mut self,
            event: Event<()>,
            target: &EventLoopWindowTarget<()>,
        ) -> Result<()> {
            match event {
                Event::WindowEvent { event, window_id } if window_id == self.window.id() => {
                    match event {
                        WindowEvent::CloseRequested => target.exit(),
                        WindowEvent::Resized(_) | WindowEvent::ScaleFactorChanged { .. } => {
                            let (width, height) = css_size(&self.window);
                            self.viewer.state_mut().request_resize(
                                width,
                                height,
                                self.window.scale_factor() as f32,
                            );
                        }
                        WindowEvent::MouseInput {
                            state,
                            button: MouseButton::Left,
                            ..
                        } => {
                            let input = self.viewer.state().input();
                            match state {
                                ElementState::Pressed => input.press(),
                                ElementState::Released => input.release(),
                            }
                        }
                        WindowEvent::CursorMoved { position, .. } => {
                            if let Some(last) = self.last_cursor {
                                let scale = self.window.scale_factor();
                                self.viewer.state().input().move_by(
                                    ((position.x - last.x) / scale) as f32,
                                    ((position.y - last.y) / scale) as f32,
                                );
                            }
                            self.last_cursor = Some(position);
                        }
                        WindowEvent::CursorLeft { .. } => self.last_cursor = None,
                        WindowEvent::MouseWheel { delta, .. } => {
                            let delta_y = match delta {
                                MouseScrollDelta::LineDelta(_, lines) => -lines * LINE_HEIGHT,
                                MouseScrollDelta::PixelDelta(pixels) => -pixels.y as f32,
                            };
                            self.viewer.state().input().scroll(delta_y);
                        }
                        WindowEvent::RedrawRequested => {
                            self.viewer.render_frame()?;
                        }
                        _ => {}
                    }
                }
                Event::AboutToWait => self.window.request_redraw(),
                _ => {}
            }
            Ok(())
        }
    }

    #[derive(Debug)]
    struct WindowInitError {
        message: String,
    }

    impl WindowInitError {
        fn from_panic(stage: &str, panic: Box<dyn Any + Send>) -> Self {
            Self {
                message: format!("failed to initialize {stage}: {}", panic_message(panic)),
            }
        }

        fn from_error(stage: &str, err: impl fmt::Display) -> Self {
            Self {
                message: format!("failed to initialize {stage}: {err}"),
            }
        }
    }

    impl fmt::Display for WindowInitError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(&self.message)
        }
    }

    impl std::error::Error for WindowInitError {}

    fn panic_message(panic: Box<dyn Any + Send>) -> String {
        match panic.downcast::<String>() {
            Ok(msg) => *msg,
            Err(panic) => match panic.downcast::<&'static str>() {
                Ok(msg) => (*msg).to_string(),
                Err(_) => "unknown panic".into(),
            },
        }
    }

    const USAGE: &str = "Usage: hero-viewer [--model PATH] [--env PATH] [--exposure N] \
    [--speed N] [--autorotate] [--config FILE] [--assets DIR] [--reduced-motion] [--summary-only]";

    #[derive(Debug)]
    struct CliOptions {
        config_path: Option<PathBuf>,
        assets: Option<PathBuf>,
        /// Flag values keyed by the canvas attribute they stand for.
        attributes: HashMap<String, String>,
        reduced_motion: bool,
        summary_only: bool,
    }

    impl CliOptions {
        fn parse() -> Result<Self> {
            Self::from_args(env::args().skip(1))
        }

        fn from_args(args: impl IntoIterator<Item = String>) -> Result<Self> {
            let mut options = Self {
                config_path: None,
                assets: None,
                attributes: HashMap::new(),
                reduced_motion: false,
                summary_only: false,
            };
            let mut args = args.into_iter();
            while let Some(arg) = args.next() {
                let mut value = |flag: &str| {
                    args.next()
                        .ok_or_else(|| anyhow!("{flag} expects a value\n{USAGE}"))
                };
                match arg.as_str() {
                    "--model" => {
                        let url = value("--model")?;
                        options.attributes.insert("data-model".into(), url);
                    }
                    "--env" => {
                        let url = value("--env")?;
                        options.attributes.insert("data-env".into(), url);
                    }
                    "--exposure" => {
                        let number = value("--exposure")?;
                        options.attributes.insert("data-exposure".into(), number);
                    }
                    "--speed" => {
                        let number = value("--speed")?;
                        options.attributes.insert("data-speed".into(), number);
                    }
                    "--autorotate" => {
                        options
                            .attributes
                            .insert("data-autorotate".into(), "true".into());
                    }
                    "--config" => options.config_path = Some(value("--config")?.into()),
                    "--assets" => options.assets = Some(value("--assets")?.into()),
                    "--reduced-motion" => options.reduced_motion = true,
                    "--summary-only" => options.summary_only = true,
                    other => return Err(anyhow!("Unknown argument: {other}\n{USAGE}")),
                }
            }
            Ok(options)
        }

        /// Configuration file values, overridden by flags.
        fn viewer_config(&self) -> Result<ViewerConfig> {
            let base = match &self.config_path {
                Some(path) => {
                    let text = std::fs::read_to_string(path)
                        .with_context(|| format!("failed to read {}", path.display()))?;
                    ViewerConfig::from_toml(&text)
                        .with_context(|| format!("invalid config file {}", path.display()))?
                }
                None => ViewerConfig::default(),
            };
            if base.status_badge {
                warn!("the status badge only exists in the browser");
            }
            Ok(base.with_overrides(&self.attributes))
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        fn parse(args: &[&str]) -> Result<CliOptions> {
            CliOptions::from_args(args.iter().map(|arg| arg.to_string()))
        }

        #[test]
        fn flags_become_canvas_attributes() {
            let options = parse(&["--model", "hero.glb", "--autorotate", "--speed", "3"]).unwrap();
            assert_eq!(options.attributes["data-model"], "hero.glb");
            assert_eq!(options.attributes["data-autorotate"], "true");
            assert_eq!(options.attributes["data-speed"], "3");
            assert!(!options.summary_only);
        }

        #[test]
        fn flag_without_value_is_rejected() {
            let err = parse(&["--exposure"]).unwrap_err();
            assert!(err.to_string().contains("--exposure expects a value"));
        }

        #[test]
        fn unknown_flag_is_rejected() {
            let err = parse(&["--fullscreen"]).unwrap_err();
            assert!(err.to_string().starts_with("Unknown argument: --fullscreen"));
        }

        #[test]
        fn flags_override_the_default_config() {
            let options = parse(&["--exposure", "2.5", "--summary-only"]).unwrap();
            let config = options.viewer_config().unwrap();
            assert_eq!(config.exposure, 2.5);
            assert!(options.summary_only);
        }
    }
}
