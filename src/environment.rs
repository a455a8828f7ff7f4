//! Image based lighting from equirectangular Radiance HDR panoramas.
//!
//! The panorama is reduced to nine spherical-harmonic coefficients already
//! convolved with the clamped cosine lobe, so evaluating them for a normal
//! gives the diffuse radiance reflected by a white Lambertian surface.

use std::f32::consts::PI;

use glam::Vec3;
use log::debug;
use thiserror::Error;

use crate::assets::{AssetFetcher, FetchError};

/// Longest panorama row that is sampled; wider images are strided.
const MAX_SAMPLED_WIDTH: u32 = 512;

#[derive(Debug, Error)]
pub enum EnvironmentError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("failed to decode HDR panorama: {0}")]
    Decode(#[from] image::ImageError),
    #[error("HDR panorama has no pixels")]
    Empty,
}

/// Irradiance environment derived from a panorama.
#[derive(Debug, Clone, PartialEq)]
pub struct EnvironmentMap {
    /// L2 spherical harmonics, band-major: (0,0), (1,-1), (1,0), (1,1), (2,-2) ...
    pub irradiance: [Vec3; 9],
    pub source_width: u32,
    pub source_height: u32,
}

impl EnvironmentMap {
    /// Decodes a Radiance `.hdr` file.
    pub fn from_hdr(bytes: &[u8]) -> Result<Self, EnvironmentError> {
        let image = image::load_from_memory_with_format(bytes, image::ImageFormat::Hdr)?;
        let pixels = image.into_rgb32f();
        let (width, height) = pixels.dimensions();
        let texels: Vec<Vec3> = pixels
            .pixels()
            .map(|pixel| Vec3::from_array(pixel.0))
            .collect();
        Self::from_equirectangular(width, height, &texels)
    }

    /// Projects linear radiance texels (row-major, top row first) onto the
    /// irradiance basis.
    pub fn from_equirectangular(
        width: u32,
        height: u32,
        texels: &[Vec3],
    ) -> Result<Self, EnvironmentError> {
        if width == 0 || height == 0 || texels.len() < (width * height) as usize {
            return Err(EnvironmentError::Empty);
        }

        let stride = width.div_ceil(MAX_SAMPLED_WIDTH).max(1);
        let sampled_width = width.div_ceil(stride);
        let sampled_height = height.div_ceil(stride);
        let d_lon = 2.0 * PI / sampled_width as f32;
        let d_lat = PI / sampled_height as f32;

        let mut coefficients = [Vec3::ZERO; 9];
        for row in 0..sampled_height {
            let y = (row * stride).min(height - 1);
            // Latitude runs from +pi/2 at the top row to -pi/2 at the bottom.
            let latitude = PI * 0.5 - (row as f32 + 0.5) * d_lat;
            let solid_angle = d_lon * d_lat * latitude.cos();
            for column in 0..sampled_width {
                let x = (column * stride).min(width - 1);
                let longitude = (column as f32 + 0.5) * d_lon - PI;
                let direction = Vec3::new(
                    latitude.cos() * longitude.cos(),
                    latitude.sin(),
                    latitude.cos() * longitude.sin(),
                );
                let radiance = texels[(y * width + x) as usize];
                for (coefficient, basis) in coefficients.iter_mut().zip(sh_basis(direction)) {
                    *coefficient += radiance * (basis * solid_angle);
                }
            }
        }

        // Cosine-lobe convolution per band, divided by pi for outgoing radiance.
        const BAND_SCALE: [f32; 9] = [
            1.0,
            2.0 / 3.0,
            2.0 / 3.0,
            2.0 / 3.0,
            0.25,
            0.25,
            0.25,
            0.25,
            0.25,
        ];
        for (coefficient, scale) in coefficients.iter_mut().zip(BAND_SCALE) {
            *coefficient *= scale;
        }

        debug!("projected {width}x{height} panorama (stride {stride}) to irradiance SH");
        Ok(Self {
            irradiance: coefficients,
            source_width: width,
            source_height: height,
        })
    }

    /// Diffuse radiance reflected towards a surface with the given normal.
    pub fn irradiance(&self, normal: Vec3) -> Vec3 {
        sh_basis(normal.normalize_or_zero())
            .into_iter()
            .zip(self.irradiance)
            .fold(Vec3::ZERO, |sum, (basis, coefficient)| sum + coefficient * basis)
    }
}

/// Fetches and decodes an environment panorama.
pub async fn load_environment_map(
    url: &str,
    fetcher: &impl AssetFetcher,
) -> Result<EnvironmentMap, EnvironmentError> {
    let bytes = fetcher.fetch(url).await?;
    EnvironmentMap::from_hdr(&bytes)
}

fn sh_basis(d: Vec3) -> [f32; 9] {
    [
        0.282_095,
        0.488_603 * d.y,
        0.488_603 * d.z,
        0.488_603 * d.x,
        1.092_548 * d.x * d.y,
        1.092_548 * d.y * d.z,
        0.315_392 * (3.0 * d.z * d.z - 1.0),
        1.092_548 * d.x * d.z,
        0.546_274 * (d.x * d.x - d.y * d.y),
    ]
}

#[cfg(test)]
pub(crate) mod fixtures {
    /// Radiance RGBE file of the given size with every texel equal to one.
    pub(crate) fn uniform_hdr(width: u32, height: u32) -> Vec<u8> {
        let mut bytes = format!(
            "#?RADIANCE\nFORMAT=32-bit_rle_rgbe\n\n-Y {height} +X {width}\n"
        )
        .into_bytes();
        for _ in 0..width * height {
            // mantissa 128 with exponent 129 encodes 1.0
            bytes.extend_from_slice(&[128, 128, 128, 129]);
        }
        bytes
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::uniform_hdr;
    use super::*;

    fn assert_close(actual: Vec3, expected: Vec3, tolerance: f32) {
        assert!(
            (actual - expected).abs().max_element() < tolerance,
            "{actual:?} != {expected:?}"
        );
    }

    #[test]
    fn uniform_sky_gives_uniform_irradiance() {
        let (width, height) = (64, 32);
        let texels = vec![Vec3::ONE; (width * height) as usize];
        let map = EnvironmentMap::from_equirectangular(width, height, &texels).unwrap();
        for normal in [Vec3::X, Vec3::NEG_Y, Vec3::new(1.0, 1.0, -1.0)] {
            assert_close(map.irradiance(normal), Vec3::ONE, 1e-2);
        }
    }

    #[test]
    fn bright_upper_hemisphere_lights_upward_normals() {
        let (width, height) = (64, 32);
        let texels: Vec<Vec3> = (0..width * height)
            .map(|i| if i / width < height / 2 { Vec3::ONE } else { Vec3::ZERO })
            .collect();
        let map = EnvironmentMap::from_equirectangular(width, height, &texels).unwrap();
        let up = map.irradiance(Vec3::Y).x;
        let down = map.irradiance(Vec3::NEG_Y).x;
        let side = map.irradiance(Vec3::X).x;
        assert!(up > 0.9, "up {up}");
        assert!(down < 0.1, "down {down}");
        assert!((side - 0.5).abs() < 0.05, "side {side}");
    }

    #[test]
    fn wide_panoramas_are_strided() {
        let (width, height) = (2048, 1024);
        let texels = vec![Vec3::splat(2.0); (width * height) as usize];
        let map = EnvironmentMap::from_equirectangular(width, height, &texels).unwrap();
        assert_close(map.irradiance(Vec3::Z), Vec3::splat(2.0), 2e-2);
        assert_eq!(map.source_width, 2048);
    }

    #[test]
    fn decodes_radiance_files() {
        let map = EnvironmentMap::from_hdr(&uniform_hdr(16, 8)).unwrap();
        assert_eq!((map.source_width, map.source_height), (16, 8));
        assert_close(map.irradiance(Vec3::Y), Vec3::ONE, 5e-2);
    }

    #[test]
    fn rejects_non_hdr_bytes() {
        assert!(matches!(
            EnvironmentMap::from_hdr(b"definitely not radiance"),
            Err(EnvironmentError::Decode(_))
        ));
    }

    #[test]
    fn rejects_empty_panoramas() {
        assert!(matches!(
            EnvironmentMap::from_equirectangular(0, 0, &[]),
            Err(EnvironmentError::Empty)
        ));
    }
}
