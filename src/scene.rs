use glam::{Mat4, Vec3, Vec4};
use log::warn;

use crate::assets::AssetFetcher;
use crate::environment::{load_environment_map, EnvironmentMap};
use crate::framing::Aabb;
use crate::mesh::{Material, MeshData};
use crate::model::{load_model, MeshDecoder, ModelAsset};

/// Spin added to the demo cube every frame.
const CUBE_SPIN_STEP: f32 = 0.01;

/// Fallback content: a unit cube that keeps spinning on its own.
#[derive(Debug, Clone, PartialEq)]
pub struct DemoCube {
    pub mesh: MeshData,
    pub material: Material,
    spin: f32,
}

impl Default for DemoCube {
    fn default() -> Self {
        Self {
            mesh: MeshData::cube(1.0),
            material: Material {
                base_color: Vec4::ONE,
                metallic: 0.4,
                roughness: 0.2,
                base_color_texture: None,
            },
            spin: 0.0,
        }
    }
}

impl DemoCube {
    pub fn advance(&mut self) {
        self.spin += CUBE_SPIN_STEP;
    }

    /// Euler rotation (x, y, z) in radians.
    pub fn rotation(&self) -> Vec3 {
        Vec3::new(self.spin * 0.6, self.spin * 0.8, 0.0)
    }

    pub fn transform(&self) -> Mat4 {
        let rotation = self.rotation();
        Mat4::from_rotation_x(rotation.x)
            * Mat4::from_rotation_y(rotation.y)
            * Mat4::from_rotation_z(rotation.z)
    }
}

/// Primary content of the scene.
#[derive(Debug, Clone, PartialEq)]
pub enum Content {
    DemoCube(DemoCube),
    Model {
        asset: ModelAsset,
        /// Translation applied to the whole model, set when framing.
        offset: Vec3,
    },
}

impl Content {
    pub fn demo_cube() -> Self {
        Self::DemoCube(DemoCube::default())
    }

    pub fn model(asset: ModelAsset) -> Self {
        Self::Model {
            asset,
            offset: Vec3::ZERO,
        }
    }

    pub fn is_demo_cube(&self) -> bool {
        matches!(self, Self::DemoCube(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::DemoCube(_) => "demo cube",
            Self::Model { .. } => "model",
        }
    }

    /// World transform applied to the content's meshes.
    pub fn transform(&self) -> Mat4 {
        match self {
            Self::DemoCube(cube) => cube.transform(),
            Self::Model { offset, .. } => Mat4::from_translation(*offset),
        }
    }

    /// Bounds of the content in world space, including its transform.
    pub fn bounds(&self) -> Option<Aabb> {
        let transform = self.transform();
        let points: Box<dyn Iterator<Item = Vec3> + '_> = match self {
            Self::DemoCube(cube) => Box::new(cube.mesh.positions()),
            Self::Model { asset, .. } => Box::new(
                asset
                    .meshes
                    .iter()
                    .flat_map(|model| model.mesh.positions()),
            ),
        };
        Aabb::from_points(points.map(|point| transform.transform_point3(point)))
    }

    pub fn advance(&mut self) {
        if let Self::DemoCube(cube) = self {
            cube.advance();
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Light {
    Ambient {
        color: Vec3,
        intensity: f32,
    },
    Directional {
        color: Vec3,
        intensity: f32,
        /// Light position; it shines towards the origin.
        position: Vec3,
    },
}

impl Light {
    pub fn is_ambient(&self) -> bool {
        matches!(self, Self::Ambient { .. })
    }
}

/// How the scene is lit.
#[derive(Debug, Clone, PartialEq)]
pub enum Lighting {
    Environment(EnvironmentMap),
    Basic { ambient: Light, directional: Light },
}

impl Lighting {
    /// White ambient fill plus a white key light up and to the right.
    pub fn basic() -> Self {
        Self::Basic {
            ambient: Light::Ambient {
                color: Vec3::ONE,
                intensity: 0.6,
            },
            directional: Light::Directional {
                color: Vec3::ONE,
                intensity: 0.9,
                position: Vec3::new(2.0, 3.0, 4.0),
            },
        }
    }

    pub fn environment(&self) -> Option<&EnvironmentMap> {
        match self {
            Self::Environment(map) => Some(map),
            Self::Basic { .. } => None,
        }
    }

    pub fn lights(&self) -> Vec<Light> {
        match self {
            Self::Environment(_) => Vec::new(),
            Self::Basic {
                ambient,
                directional,
            } => vec![*ambient, *directional],
        }
    }
}

/// Everything one viewer draws.
#[derive(Debug, Clone, PartialEq)]
pub struct Scene {
    pub content: Content,
    pub lighting: Lighting,
    pub exposure: f32,
}

impl Scene {
    pub fn new(content: Content, lighting: Lighting, exposure: f32) -> Self {
        Self {
            content,
            lighting,
            exposure,
        }
    }

    pub fn environment(&self) -> Option<&EnvironmentMap> {
        self.lighting.environment()
    }

    pub fn lights(&self) -> Vec<Light> {
        self.lighting.lights()
    }
}

/// Loads the model at `url`, or the demo cube when the URL is empty or the
/// model cannot be fetched or decoded.
pub async fn load_primary_content(
    url: &str,
    fetcher: &impl AssetFetcher,
    decoder: &impl MeshDecoder,
) -> Content {
    if url.is_empty() {
        return Content::demo_cube();
    }
    match load_model(url, fetcher, decoder).await {
        Ok(asset) => Content::model(asset),
        Err(err) => {
            warn!("model load failed ({url}): {err}; showing demo cube instead");
            Content::demo_cube()
        }
    }
}

/// Loads the environment panorama at `url`, or the basic two-light rig when
/// the URL is empty or the panorama is unusable.
pub async fn load_environment(url: &str, fetcher: &impl AssetFetcher) -> Lighting {
    if url.is_empty() {
        return Lighting::basic();
    }
    match load_environment_map(url, fetcher).await {
        Ok(map) => Lighting::Environment(map),
        Err(err) => {
            warn!("HDR load failed ({url}): {err}; falling back to lights");
            Lighting::basic()
        }
    }
}
