//! Per-canvas viewer: scene state, frame stepping and the GPU renderer.

use std::sync::Arc;

use log::{info, warn};
use thiserror::Error;

use crate::assets::AssetFetcher;
use crate::camera::PerspectiveCamera;
use crate::config::ViewerConfig;
use crate::controls::OrbitControls;
use crate::framing::{frame, Framing};
use crate::input::PointerInput;
use crate::library::RenderLibrary;
use crate::model::MeshDecoder;
use crate::render::{RenderError, Renderer};
use crate::scene::{load_environment, load_primary_content, Content, Lighting, Scene};

/// Highest device pixel ratio rendered at.
pub const MAX_PIXEL_RATIO: f32 = 2.0;
/// CSS size assumed when the canvas has no layout box yet.
pub const FALLBACK_CSS_SIZE: (u32, u32) = (1200, 600);

/// What the host environment tells us about the user.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HostPreferences {
    /// `prefers-reduced-motion: reduce` is active.
    pub reduced_motion: bool,
    pub device_pixel_ratio: f32,
}

impl Default for HostPreferences {
    fn default() -> Self {
        Self {
            reduced_motion: false,
            device_pixel_ratio: 1.0,
        }
    }
}

/// Canvas layout size and the pixel ratio used for its drawing buffer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub css_width: u32,
    pub css_height: u32,
    pub pixel_ratio: f32,
}

impl Viewport {
    pub fn new(css_width: u32, css_height: u32, device_pixel_ratio: f32) -> Self {
        let pixel_ratio = if device_pixel_ratio.is_finite() && device_pixel_ratio > 0.0 {
            device_pixel_ratio.min(MAX_PIXEL_RATIO)
        } else {
            1.0
        };
        Self {
            css_width: if css_width == 0 {
                FALLBACK_CSS_SIZE.0
            } else {
                css_width
            },
            css_height: if css_height == 0 {
                FALLBACK_CSS_SIZE.1
            } else {
                css_height
            },
            pixel_ratio,
        }
    }

    /// Size of the drawing buffer in physical pixels.
    pub fn drawing_buffer_size(&self) -> (u32, u32) {
        let scale = |css: u32| ((css as f32 * self.pixel_ratio).round() as u32).max(1);
        (scale(self.css_width), scale(self.css_height))
    }

    pub fn aspect(&self) -> f32 {
        self.css_width as f32 / self.css_height as f32
    }
}

/// Lifecycle of a viewer as exposed to the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewerStatus {
    Loading,
    Ready,
    Failed(String),
}

impl ViewerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Loading => "loading",
            Self::Ready => "ready",
            Self::Failed(_) => "failed",
        }
    }
}

/// Everything a viewer owns apart from the GPU objects.
#[derive(Debug)]
pub struct ViewerState {
    config: ViewerConfig,
    pub scene: Scene,
    pub camera: PerspectiveCamera,
    pub controls: OrbitControls,
    input: Arc<PointerInput>,
    viewport: Viewport,
    pending_resize: Option<Viewport>,
}

impl ViewerState {
    /// Starts with the demo cube under the basic lights; assets replace them
    /// once loaded.
    pub fn new(config: ViewerConfig, preferences: HostPreferences, css_size: (u32, u32)) -> Self {
        let viewport = Viewport::new(css_size.0, css_size.1, preferences.device_pixel_ratio);
        let mut camera = PerspectiveCamera::default();
        camera.set_viewport(viewport.css_width as f32, viewport.css_height as f32);

        let auto_rotate = config.auto_rotate && !preferences.reduced_motion;
        if config.auto_rotate && !auto_rotate {
            info!("reduced motion requested; auto-rotation disabled");
        }
        let controls = OrbitControls::new(auto_rotate, config.auto_rotate_speed);
        let scene = Scene::new(Content::demo_cube(), Lighting::basic(), config.exposure);

        Self {
            config,
            scene,
            camera,
            controls,
            input: Arc::new(PointerInput::new()),
            viewport,
            pending_resize: None,
        }
    }

    pub fn config(&self) -> &ViewerConfig {
        &self.config
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    /// Pointer input sink for event handlers.
    pub fn input(&self) -> Arc<PointerInput> {
        Arc::clone(&self.input)
    }

    pub fn install_lighting(&mut self, lighting: Lighting) {
        self.scene.lighting = lighting;
    }

    /// Replaces the content; loaded models are recentred and the camera
    /// pulled back to fit them.
    pub fn install_content(&mut self, mut content: Content) -> Option<Framing> {
        let framing = match &mut content {
            Content::DemoCube(_) => None,
            Content::Model { asset, offset } => asset.bounds().map(|bounds| {
                let framing = frame(bounds, &mut self.camera);
                *offset = framing.offset;
                framing
            }),
        };
        self.scene.content = content;
        framing
    }

    /// Loads the environment, then the primary content. Failures of either
    /// leave the corresponding default in place.
    pub async fn load_assets(&mut self, fetcher: &impl AssetFetcher, decoder: &impl MeshDecoder) {
        let lighting = load_environment(&self.config.environment_url, fetcher).await;
        self.install_lighting(lighting);
        let content = load_primary_content(&self.config.model_url, fetcher, decoder).await;
        if let Some(framing) = self.install_content(content) {
            info!("framed model at distance {:.2}", framing.distance);
        }
    }

    /// Records a new canvas size; it takes effect on the next frame.
    pub fn request_resize(&mut self, css_width: u32, css_height: u32, device_pixel_ratio: f32) {
        self.pending_resize = Some(Viewport::new(css_width, css_height, device_pixel_ratio));
    }

    /// Advances one frame. Returns the new drawing buffer size when a
    /// pending resize was applied.
    pub fn tick(&mut self) -> Option<(u32, u32)> {
        let resized = self.pending_resize.take().and_then(|viewport| {
            let changed = viewport != self.viewport;
            self.viewport = viewport;
            self.camera
                .set_viewport(viewport.css_width as f32, viewport.css_height as f32);
            changed.then(|| viewport.drawing_buffer_size())
        });

        self.scene.content.advance();
        self.input
            .drain()
            .apply(&mut self.controls, self.viewport.css_height as f32);
        self.controls.update(&mut self.camera);
        resized
    }
}

#[derive(Debug, Error)]
pub enum ViewerError {
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error("GPU is out of memory")]
    OutOfMemory,
}

/// A running viewer bound to one render target.
pub struct HeroViewer {
    state: ViewerState,
    renderer: Renderer,
}

impl HeroViewer {
    /// Creates the renderer for `target`, then loads the configured assets.
    pub async fn initialize(
        library: &RenderLibrary,
        target: wgpu::SurfaceTarget<'static>,
        config: ViewerConfig,
        preferences: HostPreferences,
        css_size: (u32, u32),
        fetcher: &impl AssetFetcher,
        decoder: &impl MeshDecoder,
    ) -> Result<Self, ViewerError> {
        let mut state = ViewerState::new(config, preferences, css_size);
        let mut renderer =
            Renderer::new(library, target, state.viewport().drawing_buffer_size()).await?;
        state.load_assets(fetcher, decoder).await;
        renderer.upload(&state.scene.content);
        Ok(Self { state, renderer })
    }

    pub fn state(&self) -> &ViewerState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut ViewerState {
        &mut self.state
    }

    /// Steps the scene and draws it.
    pub fn render_frame(&mut self) -> Result<(), ViewerError> {
        if let Some(size) = self.state.tick() {
            self.renderer.resize(size);
        }
        match self.renderer.render(&self.state.camera, &self.state.scene) {
            Ok(()) => Ok(()),
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                self.renderer.reconfigure();
                Ok(())
            }
            Err(wgpu::SurfaceError::OutOfMemory) => Err(ViewerError::OutOfMemory),
            Err(wgpu::SurfaceError::Timeout) => {
                warn!("surface timeout; retrying next frame");
                Ok(())
            }
            Err(err) => {
                warn!("frame skipped: {err}");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec3;
    use pollster::block_on;

    use super::*;
    use crate::assets::testing::MemoryFetcher;
    use crate::environment::fixtures::uniform_hdr;
    use crate::model::fixtures::TRIANGLE_GLTF;
    use crate::model::NoMeshDecoder;
    use crate::scene::Light;

    fn config(pairs: &[(&str, &str)]) -> ViewerConfig {
        let attributes: std::collections::HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        ViewerConfig::from_attributes(&attributes)
    }

    #[test]
    fn bare_canvas_shows_cube_under_two_lights() {
        let fetcher = MemoryFetcher::default();
        let mut state = ViewerState::new(config(&[]), HostPreferences::default(), (800, 400));
        block_on(state.load_assets(&fetcher, &NoMeshDecoder));

        assert!(fetcher.requests.borrow().is_empty());
        assert!(state.scene.content.is_demo_cube());
        assert!(state.scene.environment().is_none());
        let lights = state.scene.lights();
        assert_eq!(lights.len(), 2);
        assert!(matches!(lights[0], Light::Ambient { .. }));
        assert!(matches!(lights[1], Light::Directional { .. }));
        assert!((state.camera.distance() - 3.0).abs() < 1e-6);
    }

    #[test]
    fn unreachable_model_leaves_cube_in_place() {
        let fetcher = MemoryFetcher::default();
        let mut state = ViewerState::new(
            config(&[("data-model", "/missing.glb")]),
            HostPreferences::default(),
            (800, 400),
        );
        block_on(state.load_assets(&fetcher, &NoMeshDecoder));
        assert_eq!(state.scene.content, Content::demo_cube());
        assert!((state.camera.distance() - 3.0).abs() < 1e-6);
    }

    #[test]
    fn environment_loads_before_model() {
        let fetcher = MemoryFetcher::default()
            .with("/sky.hdr", uniform_hdr(8, 4))
            .with("/tri.gltf", TRIANGLE_GLTF);
        let mut state = ViewerState::new(
            config(&[("data-model", "/tri.gltf"), ("data-env", "/sky.hdr")]),
            HostPreferences::default(),
            (800, 400),
        );
        block_on(state.load_assets(&fetcher, &NoMeshDecoder));
        assert_eq!(*fetcher.requests.borrow(), vec!["/sky.hdr", "/tri.gltf"]);
        assert!(state.scene.environment().is_some());
        assert!(state.scene.lights().is_empty());
    }

    #[test]
    fn loaded_model_is_centred_and_framed() {
        let fetcher = MemoryFetcher::default().with("/tri.gltf", TRIANGLE_GLTF);
        let mut state = ViewerState::new(
            config(&[("data-model", "/tri.gltf")]),
            HostPreferences::default(),
            (800, 400),
        );
        block_on(state.load_assets(&fetcher, &NoMeshDecoder));

        let bounds = state.scene.content.bounds().unwrap();
        assert!(bounds.center().length() < 1e-5);
        let distance = state.camera.distance();
        assert!((distance - 5.6).abs() < 1e-5);
        assert!(distance >= 2.0 && distance >= 1.4 * bounds.largest_dimension());
        assert_eq!(state.camera.target, Vec3::ZERO);
    }

    #[test]
    fn reduced_motion_disables_auto_rotation() {
        let wants_rotation = config(&[("data-autorotate", "true")]);
        let calm = HostPreferences {
            reduced_motion: true,
            ..HostPreferences::default()
        };
        let state = ViewerState::new(wants_rotation.clone(), calm, (800, 400));
        assert!(!state.controls.auto_rotate);

        let state = ViewerState::new(wants_rotation, HostPreferences::default(), (800, 400));
        assert!(state.controls.auto_rotate);
        assert_eq!(state.controls.auto_rotate_speed, 0.4);
    }

    #[test]
    fn resize_applies_on_next_frame() {
        let mut state = ViewerState::new(config(&[]), HostPreferences::default(), (800, 400));
        assert_eq!(state.camera.aspect, 2.0);

        state.request_resize(300, 600, 3.0);
        assert_eq!(state.camera.aspect, 2.0);

        assert_eq!(state.tick(), Some((600, 1200)));
        assert_eq!(state.camera.aspect, 0.5);
        assert_eq!(state.tick(), None);
    }

    #[test]
    fn zero_sized_canvas_uses_fallback_size() {
        let state = ViewerState::new(
            config(&[]),
            HostPreferences {
                device_pixel_ratio: 1.5,
                ..HostPreferences::default()
            },
            (0, 0),
        );
        let viewport = state.viewport();
        assert_eq!((viewport.css_width, viewport.css_height), (1200, 600));
        assert_eq!(viewport.drawing_buffer_size(), (1800, 900));
        assert_eq!(Viewport::new(10, 10, f32::NAN).pixel_ratio, 1.0);
    }

    #[test]
    fn tick_spins_cube_and_applies_drag() {
        let mut state = ViewerState::new(config(&[]), HostPreferences::default(), (800, 400));
        let input = state.input();
        input.press();
        input.move_by(100.0, 0.0);
        state.tick();
        let Content::DemoCube(cube) = &state.scene.content else {
            panic!("expected demo cube");
        };
        assert!(cube.rotation().x > 0.0);
        assert!(state.camera.position.x.abs() > 0.0);
        assert!(state.controls.update(&mut state.camera));
    }

    #[test]
    fn status_strings_match_page_contract() {
        assert_eq!(ViewerStatus::Loading.as_str(), "loading");
        assert_eq!(ViewerStatus::Ready.as_str(), "ready");
        assert_eq!(ViewerStatus::Failed("x".into()).as_str(), "failed");
    }
}
