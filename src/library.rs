//! Acquisition of the shared GPU library handle.
//!
//! A tier either yields a usable `wgpu::Instance` or fails as a whole. Tiers
//! are tried in order through [`first_success`]; every viewer on the page
//! then shares the winning instance and creates its own surface and device.

use std::fmt;

use log::info;
use thiserror::Error;

use crate::sources::{first_success, AcquireError};

/// One way of reaching a GPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LibraryTier {
    /// Browser WebGPU (`navigator.gpu`).
    WebGpu,
    /// WebGL2 through the GL backend.
    WebGl,
    /// Vulkan, Metal or DX12 on the desktop.
    Native,
}

impl LibraryTier {
    /// Tiers tried by default on the current platform, best first.
    pub fn platform_defaults() -> Vec<Self> {
        if cfg!(target_arch = "wasm32") {
            vec![Self::WebGpu, Self::WebGl]
        } else {
            vec![Self::Native]
        }
    }

    pub fn backends(self) -> wgpu::Backends {
        match self {
            Self::WebGpu => wgpu::Backends::BROWSER_WEBGPU,
            Self::WebGl => wgpu::Backends::GL,
            Self::Native => wgpu::Backends::PRIMARY,
        }
    }

    /// Device limits requested on adapters from this tier.
    pub fn limits(self) -> wgpu::Limits {
        match self {
            Self::WebGl => wgpu::Limits::downlevel_webgl2_defaults(),
            Self::WebGpu | Self::Native => wgpu::Limits::downlevel_defaults(),
        }
    }
}

impl fmt::Display for LibraryTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::WebGpu => "webgpu",
            Self::WebGl => "webgl2",
            Self::Native => "native",
        })
    }
}

#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("{0} is not available in this browser")]
    Unsupported(LibraryTier),
    #[error("no {0} adapter found")]
    NoAdapter(LibraryTier),
    #[error("rendering library unavailable: {0}")]
    Exhausted(#[from] AcquireError<LibraryError>),
}

/// The acquired GPU library, shared read-only by every viewer.
#[derive(Debug)]
pub struct RenderLibrary {
    instance: wgpu::Instance,
    tier: LibraryTier,
}

impl RenderLibrary {
    pub fn instance(&self) -> &wgpu::Instance {
        &self.instance
    }

    pub fn tier(&self) -> LibraryTier {
        self.tier
    }

    /// Acquires the library from the first tier that works.
    pub async fn acquire(tiers: &[LibraryTier]) -> Result<Self, LibraryError> {
        let (tier, instance) = first_success(tiers.iter().copied(), open_tier).await?;
        info!("rendering library ready ({tier})");
        Ok(Self { instance, tier })
    }
}

fn create_instance(tier: LibraryTier) -> wgpu::Instance {
    wgpu::Instance::new(&wgpu::InstanceDescriptor {
        backends: tier.backends(),
        flags: wgpu::InstanceFlags::default(),
        memory_budget_thresholds: Default::default(),
        backend_options: Default::default(),
    })
}

async fn open_tier(tier: LibraryTier) -> Result<wgpu::Instance, LibraryError> {
    match tier {
        LibraryTier::WebGpu => {
            if !browser_webgpu_supported().await {
                return Err(LibraryError::Unsupported(tier));
            }
            Ok(create_instance(tier))
        }
        // WebGL adapters only exist once a canvas surface is attached, so the
        // per-viewer adapter request is the real check for this tier.
        LibraryTier::WebGl => {
            if !cfg!(target_arch = "wasm32") {
                return Err(LibraryError::Unsupported(tier));
            }
            Ok(create_instance(tier))
        }
        LibraryTier::Native => {
            let instance = create_instance(tier);
            instance
                .request_adapter(&wgpu::RequestAdapterOptions {
                    power_preference: wgpu::PowerPreference::HighPerformance,
                    compatible_surface: None,
                    force_fallback_adapter: false,
                })
                .await
                .map_err(|_| LibraryError::NoAdapter(tier))?;
            Ok(instance)
        }
    }
}

#[cfg(target_arch = "wasm32")]
async fn browser_webgpu_supported() -> bool {
    wgpu::util::is_browser_webgpu_supported().await
}

#[cfg(not(target_arch = "wasm32"))]
async fn browser_webgpu_supported() -> bool {
    false
}

#[cfg(test)]
mod tests {
    use pollster::block_on;

    use super::*;

    #[test]
    fn desktop_uses_single_native_tier() {
        assert_eq!(LibraryTier::platform_defaults(), vec![LibraryTier::Native]);
        assert_eq!(LibraryTier::Native.backends(), wgpu::Backends::PRIMARY);
    }

    #[test]
    fn tier_names_are_stable() {
        let names: Vec<String> = [LibraryTier::WebGpu, LibraryTier::WebGl, LibraryTier::Native]
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(names, ["webgpu", "webgl2", "native"]);
    }

    #[test]
    fn browser_tiers_fail_outside_the_browser() {
        let err = block_on(RenderLibrary::acquire(&[
            LibraryTier::WebGpu,
            LibraryTier::WebGl,
        ]))
        .unwrap_err();
        let LibraryError::Exhausted(acquire) = &err else {
            panic!("unexpected error {err}");
        };
        assert_eq!(acquire.failures.len(), 2);
        assert_eq!(acquire.failures[0].0, "webgpu");
        assert!(err.to_string().contains("webgl2 is not available"));
    }

    #[test]
    fn empty_tier_list_cannot_acquire() {
        let err = block_on(RenderLibrary::acquire(&[])).unwrap_err();
        assert!(err.to_string().contains("no sources configured"));
    }
}
