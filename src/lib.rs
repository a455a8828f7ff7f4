//! Canvas-hosted 3D hero viewer.
//!
//! Each hero canvas on a page gets its own viewer: a glTF model (or a
//! spinning demo cube when none is configured or it fails to load), lit by
//! an HDR environment panorama or a basic two-light rig, framed by a
//! perspective camera with damped orbit controls. The GPU library is
//! acquired once from an ordered list of tiers and shared by every viewer.
//!
//! Scene construction, framing and frame stepping live in [`ViewerState`]
//! and run without a GPU; [`HeroViewer`] adds the `wgpu` renderer on top.

pub mod app;
pub mod assets;
pub mod camera;
pub mod config;
pub mod controls;
pub mod environment;
pub mod framing;
pub mod input;
pub mod launch;
pub mod library;
pub mod mesh;
pub mod model;
pub mod render;
pub mod scene;
pub mod sources;
pub mod viewer;
#[cfg(target_arch = "wasm32")]
pub mod web;

pub use app::summary_lines;
pub use assets::{AssetFetcher, FetchError, FileFetcher};
pub use camera::PerspectiveCamera;
pub use config::{AttributeSource, ViewerConfig};
pub use controls::OrbitControls;
pub use environment::{EnvironmentError, EnvironmentMap};
pub use framing::{fit_distance, frame, Aabb, Framing};
pub use input::PointerInput;
pub use launch::{launch, ViewerHost};
pub use library::{LibraryError, LibraryTier, RenderLibrary};
pub use model::{
    DracoAttributes, MeshDecoder, ModelAsset, ModelError, NoMeshDecoder, PrimitiveData,
};
pub use render::{RenderError, Renderer};
pub use scene::{load_environment, load_primary_content, Content, Light, Lighting, Scene};
pub use sources::{first_success, AcquireError};
pub use viewer::{
    HeroViewer, HostPreferences, ViewerError, ViewerState, ViewerStatus, Viewport,
    FALLBACK_CSS_SIZE,
};
