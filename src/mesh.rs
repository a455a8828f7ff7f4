use std::borrow::Cow;

use glam::{Mat4, Vec2, Vec3, Vec4};
use image::imageops::{self, FilterType};
use image::{ImageBuffer, Rgba};

/// Number of floats per interleaved vertex: `position.xyz`, `normal.xyz`, `uv`.
pub const VERTEX_STRIDE: usize = 8;

/// CPU-side triangle mesh ready for upload.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MeshData {
    pub vertices: Vec<f32>,
    pub indices: Vec<u32>,
}

impl MeshData {
    pub fn vertex_count(&self) -> usize {
        self.vertices.len() / VERTEX_STRIDE
    }

    pub fn push_vertex(&mut self, position: Vec3, normal: Vec3, uv: Vec2) -> u32 {
        let index = self.vertex_count() as u32;
        self.vertices.extend_from_slice(&[
            position.x, position.y, position.z, normal.x, normal.y, normal.z, uv.x, uv.y,
        ]);
        index
    }

    pub fn positions(&self) -> impl Iterator<Item = Vec3> + '_ {
        self.vertices
            .chunks_exact(VERTEX_STRIDE)
            .map(|chunk| Vec3::from_slice(&chunk[0..3]))
    }

    /// Bakes a transform into positions and normals.
    pub fn transform(&mut self, matrix: Mat4) {
        let normal_matrix = glam::Mat3::from_mat4(matrix).inverse().transpose();
        for chunk in self.vertices.chunks_exact_mut(VERTEX_STRIDE) {
            let position = matrix.transform_point3(Vec3::from_slice(&chunk[0..3]));
            let normal = (normal_matrix * Vec3::from_slice(&chunk[3..6])).normalize_or_zero();
            chunk[0..3].copy_from_slice(&position.to_array());
            chunk[3..6].copy_from_slice(&normal.to_array());
        }
        // Mirroring transforms flip the winding order.
        if matrix.determinant() < 0.0 {
            for triangle in self.indices.chunks_exact_mut(3) {
                triangle.swap(1, 2);
            }
        }
    }

    pub fn needs_normals(&self) -> bool {
        self.vertices
            .chunks_exact(VERTEX_STRIDE)
            .any(|chunk| chunk[3] == 0.0 && chunk[4] == 0.0 && chunk[5] == 0.0)
    }

    /// Replaces normals with area-weighted smooth normals.
    pub fn compute_normals(&mut self) {
        let mut accum = vec![Vec3::ZERO; self.vertex_count()];
        let position = |vertices: &[f32], i: usize| {
            Vec3::from_slice(&vertices[i * VERTEX_STRIDE..i * VERTEX_STRIDE + 3])
        };

        for triangle in self.indices.chunks_exact(3) {
            let i0 = triangle[0] as usize;
            let i1 = triangle[1] as usize;
            let i2 = triangle[2] as usize;
            let p0 = position(&self.vertices, i0);
            let p1 = position(&self.vertices, i1);
            let p2 = position(&self.vertices, i2);
            let normal = (p1 - p0).cross(p2 - p0);
            if normal.length_squared() > f32::EPSILON {
                accum[i0] += normal;
                accum[i1] += normal;
                accum[i2] += normal;
            }
        }

        for (i, normal) in accum.into_iter().enumerate() {
            let normal = normal.normalize_or_zero();
            let base = i * VERTEX_STRIDE + 3;
            self.vertices[base..base + 3].copy_from_slice(&normal.to_array());
        }
    }

    /// Axis aligned unit box centred at the origin, one quad per face.
    pub fn cube(size: f32) -> Self {
        let half = size * 0.5;
        let faces: [(Vec3, Vec3, Vec3); 6] = [
            (Vec3::Z, Vec3::X, Vec3::Y),
            (Vec3::NEG_Z, Vec3::NEG_X, Vec3::Y),
            (Vec3::NEG_X, Vec3::Z, Vec3::Y),
            (Vec3::X, Vec3::NEG_Z, Vec3::Y),
            (Vec3::Y, Vec3::X, Vec3::NEG_Z),
            (Vec3::NEG_Y, Vec3::X, Vec3::Z),
        ];
        let corners = [
            (Vec2::new(-1.0, -1.0), Vec2::new(0.0, 1.0)),
            (Vec2::new(1.0, -1.0), Vec2::new(1.0, 1.0)),
            (Vec2::new(1.0, 1.0), Vec2::new(1.0, 0.0)),
            (Vec2::new(-1.0, 1.0), Vec2::new(0.0, 0.0)),
        ];

        let mut mesh = MeshData::default();
        for (normal, right, up) in faces {
            let base = mesh.vertex_count() as u32;
            for (corner, uv) in corners {
                let position = (normal + right * corner.x + up * corner.y) * half;
                mesh.push_vertex(position, normal, uv);
            }
            mesh.indices
                .extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        }
        mesh
    }
}

/// Physically based surface description shared by the cube and glTF meshes.
#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    pub base_color: Vec4,
    pub metallic: f32,
    pub roughness: f32,
    /// Index into the owning model's texture list.
    pub base_color_texture: Option<usize>,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            base_color: Vec4::ONE,
            metallic: 1.0,
            roughness: 1.0,
            base_color_texture: None,
        }
    }
}

/// Decoded RGBA8 image, stored in sRGB.
#[derive(Debug, Clone, PartialEq)]
pub struct TextureData {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

impl TextureData {
    /// Single opaque white texel.
    pub fn white() -> Self {
        Self {
            width: 1,
            height: 1,
            rgba: vec![255; 4],
        }
    }

    /// Returns the texture scaled down, keeping its aspect ratio, so that
    /// neither side exceeds `max_dimension`.
    pub fn fit_within(&self, max_dimension: u32) -> Cow<'_, Self> {
        let largest = self.width.max(self.height);
        if max_dimension == 0 || largest <= max_dimension {
            return Cow::Borrowed(self);
        }
        let Some(source) =
            ImageBuffer::<Rgba<u8>, &[u8]>::from_raw(self.width, self.height, &self.rgba[..])
        else {
            return Cow::Owned(Self::white());
        };

        let scale = max_dimension as f64 / largest as f64;
        let fit = |side: u32| ((side as f64 * scale).round() as u32).clamp(1, max_dimension);
        let (width, height) = (fit(self.width), fit(self.height));
        let resized = imageops::resize(&source, width, height, FilterType::Triangle);
        Cow::Owned(Self {
            width,
            height,
            rgba: resized.into_raw(),
        })
    }
}
