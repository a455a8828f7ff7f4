//! Browser entry point: finds hero canvases and runs one viewer per canvas.

use std::cell::RefCell;
use std::rc::Rc;

use anyhow::{anyhow, Result};
use gloo_events::EventListener;
use log::{debug, error, info, warn};
use wasm_bindgen::closure::Closure;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::spawn_local;
use web_sys::{Document, Element, HtmlCanvasElement};

use crate::app::summary_lines;
use crate::assets::HttpFetcher;
use crate::config::ViewerConfig;
use crate::input::wasm::CanvasPointerHandler;
use crate::launch::{launch, ViewerHost};
use crate::library::{LibraryTier, RenderLibrary};
use crate::model::wasm::DracoDecoder;
use crate::viewer::{HeroViewer, HostPreferences, ViewerStatus};

const CANVAS_SELECTOR: &str = "#hero3d, canvas[data-hero3d]";
const STATE_ATTRIBUTE: &str = "data-hero-state";
const REDUCED_MOTION_QUERY: &str = "(prefers-reduced-motion: reduce)";

#[wasm_bindgen(start)]
pub fn bootstrap() {
    console_error_panic_hook::set_once();
    if console_log::init_with_level(log::Level::Info).is_err() {
        web_sys::console::warn_1(&"hero viewer logger was already installed".into());
    }
}

/// Outcome of [`boot`], returned to the page.
#[wasm_bindgen]
#[derive(Debug, Clone, Default)]
pub struct BootReport {
    canvases: u32,
    launched: u32,
    tier: String,
}

#[wasm_bindgen]
impl BootReport {
    /// Hero canvases found on the page.
    #[wasm_bindgen(getter)]
    pub fn canvases(&self) -> u32 {
        self.canvases
    }

    /// Viewers whose initialization was started. Each canvas reports its own
    /// outcome through `data-hero-state`.
    #[wasm_bindgen(getter)]
    pub fn launched(&self) -> u32 {
        self.launched
    }

    /// Library tier in use, empty when none could be acquired.
    #[wasm_bindgen(getter)]
    pub fn tier(&self) -> String {
        self.tier.clone()
    }
}

/// Starts a viewer on every unclaimed hero canvas of the document.
///
/// Pages without a hero canvas get an empty report and nothing else happens.
#[wasm_bindgen]
pub async fn boot() -> Result<BootReport, JsValue> {
    boot_viewers()
        .await
        .map_err(|err| JsValue::from_str(&format!("{err:#}")))
}

async fn boot_viewers() -> Result<BootReport> {
    let window = web_sys::window().ok_or_else(|| anyhow!("window not available"))?;
    let document = window
        .document()
        .ok_or_else(|| anyhow!("document not available"))?;

    let canvases = find_canvases(&document)?;
    let mut report = BootReport {
        canvases: canvases.len() as u32,
        ..BootReport::default()
    };
    if canvases.is_empty() {
        debug!("no hero canvas on this page");
        return Ok(report);
    }
    for canvas in &canvases {
        set_status(canvas, &ViewerStatus::Loading);
    }

    let library = match RenderLibrary::acquire(&LibraryTier::platform_defaults()).await {
        Ok(library) => Rc::new(library),
        Err(err) => {
            error!("hero viewer unavailable: {err}");
            let status = ViewerStatus::Failed(err.to_string());
            for canvas in &canvases {
                set_status(canvas, &status);
            }
            return Ok(report);
        }
    };
    report.tier = library.tier().to_string();
    let decoder = Rc::new(DracoDecoder::new());

    for canvas in canvases {
        let library = Rc::clone(&library);
        let decoder = Rc::clone(&decoder);
        spawn_local(run_canvas(library, decoder, canvas));
        report.launched += 1;
    }
    Ok(report)
}

fn find_canvases(document: &Document) -> Result<Vec<HtmlCanvasElement>> {
    let nodes = document
        .query_selector_all(CANVAS_SELECTOR)
        .map_err(|err| anyhow!("invalid canvas selector: {err:?}"))?;
    let mut canvases = Vec::new();
    for index in 0..nodes.length() {
        let Some(node) = nodes.item(index) else {
            continue;
        };
        match node.dyn_into::<HtmlCanvasElement>() {
            Ok(canvas) if canvas.has_attribute(STATE_ATTRIBUTE) => {
                debug!("canvas {:?} already has a viewer", canvas.id());
            }
            Ok(canvas) => canvases.push(canvas),
            Err(_) => warn!("#hero3d is not a canvas element; skipping"),
        }
    }
    Ok(canvases)
}

/// A hero canvas with its optional status badge.
struct CanvasHost {
    canvas: HtmlCanvasElement,
    config: ViewerConfig,
    badge: RefCell<Option<StatusBadge>>,
}

impl CanvasHost {
    fn new(canvas: HtmlCanvasElement) -> Self {
        let element: &Element = canvas.as_ref();
        let config = ViewerConfig::from_attributes(element);
        let badge = if config.status_badge {
            StatusBadge::attach(&canvas)
                .map_err(|err| warn!("status badge unavailable: {err:#}"))
                .ok()
        } else {
            None
        };
        Self {
            canvas,
            config,
            badge: RefCell::new(badge),
        }
    }
}

impl ViewerHost for CanvasHost {
    fn label(&self) -> String {
        format!("canvas {:?}", self.canvas.id())
    }

    fn config(&self) -> ViewerConfig {
        self.config.clone()
    }

    fn set_status(&self, status: &ViewerStatus) {
        set_status(&self.canvas, status);
        match status {
            ViewerStatus::Loading => {}
            ViewerStatus::Ready => {
                if let Some(badge) = self.badge.borrow_mut().take() {
                    badge.remove();
                }
            }
            ViewerStatus::Failed(_) => {
                if let Some(badge) = self.badge.borrow().as_ref() {
                    badge.show("3D preview unavailable");
                }
            }
        }
    }
}

async fn run_canvas(
    library: Rc<RenderLibrary>,
    decoder: Rc<DracoDecoder>,
    canvas: HtmlCanvasElement,
) {
    let host = CanvasHost::new(canvas);
    launch(&host, |config| {
        start_viewer(&library, &decoder, &host.canvas, config)
    })
    .await;
}

struct RunningViewer {
    viewer: HeroViewer,
    _pointer: CanvasPointerHandler,
}

async fn start_viewer(
    library: &RenderLibrary,
    decoder: &DracoDecoder,
    canvas: &HtmlCanvasElement,
    config: ViewerConfig,
) -> Result<()> {
    let window = web_sys::window().ok_or_else(|| anyhow!("window not available"))?;
    let preferences = HostPreferences {
        reduced_motion: prefers_reduced_motion(&window),
        device_pixel_ratio: window.device_pixel_ratio() as f32,
    };
    let css_size = client_size(canvas);

    let viewer = HeroViewer::initialize(
        library,
        wgpu::SurfaceTarget::Canvas(canvas.clone()),
        config,
        preferences,
        css_size,
        &HttpFetcher,
        decoder,
    )
    .await?;
    for line in summary_lines(viewer.state()) {
        info!("{}: {line}", canvas.id());
    }

    let pointer = CanvasPointerHandler::attach(canvas, viewer.state().input());
    let running = Rc::new(RefCell::new(RunningViewer {
        viewer,
        _pointer: pointer,
    }));

    {
        let running = Rc::clone(&running);
        let canvas = canvas.clone();
        let window_handle = window.clone();
        EventListener::new(&window, "resize", move |_| {
            let (width, height) = client_size(&canvas);
            running.borrow_mut().viewer.state_mut().request_resize(
                width,
                height,
                window_handle.device_pixel_ratio() as f32,
            );
        })
        .forget();
    }

    start_render_loop(running, canvas.clone())
}

fn start_render_loop(running: Rc<RefCell<RunningViewer>>, canvas: HtmlCanvasElement) -> Result<()> {
    let frame: Rc<RefCell<Option<Closure<dyn FnMut()>>>> = Rc::new(RefCell::new(None));
    let next = Rc::clone(&frame);

    *frame.borrow_mut() = Some(Closure::new(move || {
        if let Err(err) = running.borrow_mut().viewer.render_frame() {
            error!("render loop stopped: {err}");
            set_status(&canvas, &ViewerStatus::Failed(err.to_string()));
            return;
        }
        if let Some(callback) = next.borrow().as_ref() {
            if let Err(err) = request_frame(callback) {
                error!("{err:#}");
            }
        }
    }));

    let first = frame.borrow();
    let callback = first
        .as_ref()
        .ok_or_else(|| anyhow!("frame callback missing"))?;
    request_frame(callback)
}

fn request_frame(callback: &Closure<dyn FnMut()>) -> Result<()> {
    let window = web_sys::window().ok_or_else(|| anyhow!("window not available"))?;
    window
        .request_animation_frame(callback.as_ref().unchecked_ref())
        .map_err(|err| anyhow!("requestAnimationFrame failed: {err:?}"))?;
    Ok(())
}

fn prefers_reduced_motion(window: &web_sys::Window) -> bool {
    window
        .match_media(REDUCED_MOTION_QUERY)
        .ok()
        .flatten()
        .is_some_and(|query| query.matches())
}

fn client_size(canvas: &HtmlCanvasElement) -> (u32, u32) {
    (
        canvas.client_width().max(0) as u32,
        canvas.client_height().max(0) as u32,
    )
}

fn set_status(canvas: &HtmlCanvasElement, status: &ViewerStatus) {
    if let Err(err) = canvas.set_attribute(STATE_ATTRIBUTE, status.as_str()) {
        warn!("failed to set {STATE_ATTRIBUTE}: {err:?}");
    }
}

/// Small text element placed right after the canvas while it loads.
struct StatusBadge {
    element: Element,
}

impl StatusBadge {
    fn attach(canvas: &HtmlCanvasElement) -> Result<Self> {
        let document = canvas
            .owner_document()
            .ok_or_else(|| anyhow!("canvas is detached"))?;
        let parent = canvas
            .parent_node()
            .ok_or_else(|| anyhow!("canvas has no parent"))?;
        let element = document
            .create_element("div")
            .map_err(|err| anyhow!("failed to create badge: {err:?}"))?;
        element.set_class_name("hero3d-badge");
        for (name, value) in [
            ("role", "status"),
            (
                "style",
                "font:12px sans-serif;opacity:.7;padding:4px 0;pointer-events:none",
            ),
        ] {
            if let Err(err) = element.set_attribute(name, value) {
                warn!("failed to set badge {name}: {err:?}");
            }
        }
        element.set_text_content(Some("Loading 3D preview…"));
        parent
            .insert_before(&element, canvas.next_sibling().as_ref())
            .map_err(|err| anyhow!("failed to insert badge: {err:?}"))?;
        Ok(Self { element })
    }

    fn show(&self, text: &str) {
        self.element.set_text_content(Some(text));
    }

    fn remove(self) {
        self.element.remove();
    }
}
