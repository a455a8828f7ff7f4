//! glTF 2.0 model decoding into flattened, world-space meshes.

#[cfg(target_arch = "wasm32")]
pub mod wasm;

use std::collections::HashMap;
use std::future::Future;
use std::path::Path;

use glam::{Mat4, Vec2, Vec3, Vec4};
use gltf::image::Format;
use gltf::json::Value;
use log::{debug, warn};
use thiserror::Error;

use crate::assets::{AssetFetcher, FetchError};
use crate::framing::Aabb;
use crate::mesh::{Material, MeshData, TextureData};

pub const DRACO_EXTENSION: &str = "KHR_draco_mesh_compression";
const MESHOPT_EXTENSION: &str = "EXT_meshopt_compression";

#[derive(Debug, Error)]
pub enum ModelError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("invalid glTF: {0}")]
    Gltf(#[from] gltf::Error),
    #[error("compressed geometry ({0}) is not supported")]
    CompressedGeometry(String),
    #[error("failed to decode compressed geometry: {0}")]
    Decode(String),
    #[error("buffer {index} holds {actual} byte(s), {expected} expected")]
    BufferTooShort {
        index: usize,
        expected: usize,
        actual: usize,
    },
    #[error("invalid texture: {0}")]
    Image(#[from] image::ImageError),
    #[error("model contains no triangle geometry")]
    Empty,
}

/// One drawable primitive of a model.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelMesh {
    pub mesh: MeshData,
    pub material: Material,
}

/// A decoded model. Node transforms are already applied to every vertex.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ModelAsset {
    pub meshes: Vec<ModelMesh>,
    pub textures: Vec<TextureData>,
}

/// Raw vertex streams of one primitive, before they are interleaved.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PrimitiveData {
    pub positions: Vec<[f32; 3]>,
    pub normals: Option<Vec<[f32; 3]>>,
    pub uvs: Option<Vec<[f32; 2]>>,
    pub indices: Option<Vec<u32>>,
}

/// Attribute ids inside a `KHR_draco_mesh_compression` payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DracoAttributes {
    pub position: Option<u32>,
    pub normal: Option<u32>,
    pub tex_coord: Option<u32>,
}

/// Decompresses Draco-encoded primitives.
pub trait MeshDecoder {
    fn decode_draco(
        &self,
        payload: &[u8],
        attributes: DracoAttributes,
    ) -> impl Future<Output = Result<PrimitiveData, ModelError>>;
}

/// Decoder for hosts without a Draco module; compressed models fail to load.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoMeshDecoder;

impl MeshDecoder for NoMeshDecoder {
    async fn decode_draco(
        &self,
        _payload: &[u8],
        _attributes: DracoAttributes,
    ) -> Result<PrimitiveData, ModelError> {
        Err(ModelError::CompressedGeometry(DRACO_EXTENSION.to_string()))
    }
}

impl ModelAsset {
    /// Decodes a `.glb` or self-contained `.gltf` document.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, ModelError> {
        let gltf::Gltf { document, blob } = parse(bytes, &[])?;
        let buffers = gltf::import_buffers(&document, None, blob)?;
        let textures = document
            .images()
            .map(|image| texture_or_white(image.index(), embedded_texture(image.source(), &buffers)))
            .collect();
        assemble(&document, &buffers, textures, &HashMap::new())
    }

    pub fn bounds(&self) -> Option<Aabb> {
        Aabb::from_points(self.meshes.iter().flat_map(|model| model.mesh.positions()))
    }

    pub fn triangle_count(&self) -> usize {
        self.meshes.iter().map(|model| model.mesh.indices.len() / 3).sum()
    }
}

/// Fetches and decodes a model. Buffers and images stored next to the model
/// are fetched relative to `url`; Draco primitives go through `decoder`.
pub async fn load_model(
    url: &str,
    fetcher: &impl AssetFetcher,
    decoder: &impl MeshDecoder,
) -> Result<ModelAsset, ModelError> {
    let bytes = fetcher.fetch(url).await?;
    let gltf::Gltf { document, blob } = parse(&bytes, &[DRACO_EXTENSION])?;

    let mut blob = blob;
    let mut buffers = Vec::new();
    for buffer in document.buffers() {
        let data = match buffer.source() {
            gltf::buffer::Source::Uri(uri) if !is_data_uri(uri) => {
                let mut bytes = fetcher.fetch(&resolve_uri(url, uri)).await?;
                bytes.resize(bytes.len().next_multiple_of(4), 0);
                gltf::buffer::Data(bytes)
            }
            source => gltf::buffer::Data::from_source_and_blob(source, None, &mut blob)?,
        };
        if data.0.len() < buffer.length() {
            return Err(ModelError::BufferTooShort {
                index: buffer.index(),
                expected: buffer.length(),
                actual: data.0.len(),
            });
        }
        buffers.push(data);
    }

    let mut textures = Vec::new();
    for image in document.images() {
        let texture = match image.source() {
            gltf::image::Source::Uri { uri, .. } if !is_data_uri(uri) => {
                match fetcher.fetch(&resolve_uri(url, uri)).await {
                    Ok(bytes) => decode_texture(&bytes),
                    Err(err) => Err(err.into()),
                }
            }
            source => embedded_texture(source, &buffers),
        };
        textures.push(texture_or_white(image.index(), texture));
    }

    let mut decoded = HashMap::new();
    for (primitive, _) in triangle_primitives(&document) {
        let key = (primitive.mesh_index(), primitive.index());
        if decoded.contains_key(&key) {
            continue;
        }
        let Some((view, attributes)) = draco_extension(&primitive) else {
            continue;
        };
        let payload = view_bytes(&document, &buffers, view)
            .ok_or_else(|| ModelError::Decode(format!("bufferView {view} is out of range")))?;
        decoded.insert(key, decoder.decode_draco(payload, attributes).await?);
    }

    assemble(&document, &buffers, textures, &decoded)
}

/// Parses and validates the document, rejecting compression schemes other
/// than the `supported` ones.
fn parse(bytes: &[u8], supported: &[&str]) -> Result<gltf::Gltf, ModelError> {
    let gltf = gltf::Gltf::from_slice(bytes)?;
    if let Some(extension) = gltf.document.extensions_required().find(|name| {
        [DRACO_EXTENSION, MESHOPT_EXTENSION].contains(name) && !supported.contains(name)
    }) {
        return Err(ModelError::CompressedGeometry(extension.to_string()));
    }
    Ok(gltf)
}

fn assemble(
    document: &gltf::Document,
    buffers: &[gltf::buffer::Data],
    textures: Vec<TextureData>,
    decoded: &HashMap<(usize, usize), PrimitiveData>,
) -> Result<ModelAsset, ModelError> {
    let mut meshes = Vec::new();
    for (primitive, world) in triangle_primitives(document) {
        let read;
        let data = match decoded.get(&(primitive.mesh_index(), primitive.index())) {
            Some(data) => data,
            None => match read_accessors(&primitive, buffers) {
                Some(data) => {
                    read = data;
                    &read
                }
                None => continue,
            },
        };
        if let Some(mesh) = build_mesh(data, world) {
            meshes.push(ModelMesh {
                mesh,
                material: read_material(&primitive.material()),
            });
        }
    }

    let model = ModelAsset { meshes, textures };
    if model.triangle_count() == 0 {
        return Err(ModelError::Empty);
    }
    debug!(
        "decoded model: {} mesh(es), {} triangle(s), {} texture(s)",
        model.meshes.len(),
        model.triangle_count(),
        model.textures.len()
    );
    Ok(model)
}

/// Triangle primitives of the default scene with their world transforms.
fn triangle_primitives(document: &gltf::Document) -> Vec<(PlacedPrimitive<'_>, Mat4)> {
    let mut out = Vec::new();
    let scene = document
        .default_scene()
        .or_else(|| document.scenes().next());
    if let Some(scene) = scene {
        for node in scene.nodes() {
            collect_node(&node, Mat4::IDENTITY, &mut out);
        }
    }
    out
}

/// A primitive together with the index of the mesh it belongs to.
struct PlacedPrimitive<'a> {
    mesh: gltf::Mesh<'a>,
    primitive: gltf::Primitive<'a>,
}

impl<'a> PlacedPrimitive<'a> {
    fn mesh_index(&self) -> usize {
        self.mesh.index()
    }
}

impl<'a> std::ops::Deref for PlacedPrimitive<'a> {
    type Target = gltf::Primitive<'a>;

    fn deref(&self) -> &Self::Target {
        &self.primitive
    }
}

fn collect_node<'a>(
    node: &gltf::Node<'a>,
    parent: Mat4,
    out: &mut Vec<(PlacedPrimitive<'a>, Mat4)>,
) {
    let world = parent * Mat4::from_cols_array_2d(&node.transform().matrix());
    if let Some(mesh) = node.mesh() {
        for primitive in mesh.primitives() {
            if primitive.mode() != gltf::mesh::Mode::Triangles {
                debug!("skipping non-triangle primitive in mesh {:?}", mesh.name());
                continue;
            }
            out.push((
                PlacedPrimitive {
                    mesh: mesh.clone(),
                    primitive,
                },
                world,
            ));
        }
    }
    for child in node.children() {
        collect_node(&child, world, out);
    }
}

fn tex_coord_set(primitive: &gltf::Primitive<'_>) -> u32 {
    primitive
        .material()
        .pbr_metallic_roughness()
        .base_color_texture()
        .map(|info| info.tex_coord())
        .unwrap_or(0)
}

fn read_accessors(
    primitive: &gltf::Primitive<'_>,
    buffers: &[gltf::buffer::Data],
) -> Option<PrimitiveData> {
    let reader = primitive.reader(|buffer| buffers.get(buffer.index()).map(|data| &data.0[..]));
    Some(PrimitiveData {
        positions: reader.read_positions()?.collect(),
        normals: reader.read_normals().map(Iterator::collect),
        uvs: reader
            .read_tex_coords(tex_coord_set(primitive))
            .map(|coords| coords.into_f32().collect()),
        indices: reader.read_indices().map(|indices| indices.into_u32().collect()),
    })
}

/// The compressed payload's bufferView and attribute ids, when the
/// primitive carries a Draco extension.
fn draco_extension(primitive: &gltf::Primitive<'_>) -> Option<(usize, DracoAttributes)> {
    let extension = primitive.extension_value(DRACO_EXTENSION)?;
    let view = extension.get("bufferView")?.as_u64()? as usize;
    let attributes = extension.get("attributes")?;
    let id = |name: &str| {
        attributes
            .get(name)
            .and_then(Value::as_u64)
            .map(|id| id as u32)
    };
    Some((
        view,
        DracoAttributes {
            position: id("POSITION"),
            normal: id("NORMAL"),
            tex_coord: id(&format!("TEXCOORD_{}", tex_coord_set(primitive))),
        },
    ))
}

fn view_bytes<'b>(
    document: &gltf::Document,
    buffers: &'b [gltf::buffer::Data],
    view: usize,
) -> Option<&'b [u8]> {
    let view = document.views().nth(view)?;
    let buffer = buffers.get(view.buffer().index())?;
    buffer.0.get(view.offset()..view.offset() + view.length())
}

/// Interleaves one primitive and bakes its world transform. Primitives
/// without a complete triangle are dropped.
fn build_mesh(data: &PrimitiveData, world: Mat4) -> Option<MeshData> {
    if data.positions.is_empty() {
        return None;
    }

    let mut mesh = MeshData::default();
    for (i, position) in data.positions.iter().enumerate() {
        let normal = data
            .normals
            .as_ref()
            .and_then(|normals| normals.get(i))
            .map(|n| Vec3::from_array(*n))
            .unwrap_or(Vec3::ZERO);
        let uv = data
            .uvs
            .as_ref()
            .and_then(|uvs| uvs.get(i))
            .map(|uv| Vec2::from_array(*uv))
            .unwrap_or(Vec2::ZERO);
        mesh.push_vertex(Vec3::from_array(*position), normal, uv);
    }
    mesh.indices = match &data.indices {
        Some(indices) => indices.clone(),
        None => (0..data.positions.len() as u32).collect(),
    };
    let vertex_count = data.positions.len() as u32;
    if mesh.indices.iter().any(|&index| index >= vertex_count) {
        warn!("dropping primitive with out-of-range indices");
        return None;
    }
    mesh.indices.truncate(mesh.indices.len() / 3 * 3);
    if mesh.indices.is_empty() {
        debug!("dropping primitive without a complete triangle");
        return None;
    }

    if data.normals.is_none() || mesh.needs_normals() {
        mesh.compute_normals();
    }
    mesh.transform(world);
    Some(mesh)
}

fn read_material(material: &gltf::Material<'_>) -> Material {
    let pbr = material.pbr_metallic_roughness();
    Material {
        base_color: Vec4::from_array(pbr.base_color_factor()),
        metallic: pbr.metallic_factor(),
        roughness: pbr.roughness_factor(),
        base_color_texture: pbr
            .base_color_texture()
            .map(|info| info.texture().source().index()),
    }
}

fn is_data_uri(uri: &str) -> bool {
    uri.starts_with("data:")
}

/// Resolves a resource URI found in a model against the model's own URL.
fn resolve_uri(model_url: &str, uri: &str) -> String {
    if uri.contains("://") || uri.starts_with('/') {
        return uri.to_string();
    }
    let path = model_url.split(['?', '#']).next().unwrap_or(model_url);
    match path.rfind('/') {
        Some(slash) => format!("{}{uri}", &path[..=slash]),
        None => uri.to_string(),
    }
}

/// Decodes an image held in a bufferView or a data URI.
fn embedded_texture(
    source: gltf::image::Source<'_>,
    buffers: &[gltf::buffer::Data],
) -> Result<TextureData, ModelError> {
    if let gltf::image::Source::Uri { uri, .. } = source {
        if !is_data_uri(uri) {
            return Err(gltf::Error::ExternalReferenceInSliceImport.into());
        }
    }
    // gltf only decodes data URIs when given a base path; nothing is read from it.
    let image = gltf::image::Data::from_source(source, Some(Path::new(".")), buffers)?;
    Ok(convert_image(&image))
}

/// Decodes a PNG or JPEG file fetched next to the model.
fn decode_texture(bytes: &[u8]) -> Result<TextureData, ModelError> {
    let image = image::load_from_memory(bytes)?.to_rgba8();
    Ok(TextureData {
        width: image.width(),
        height: image.height(),
        rgba: image.into_raw(),
    })
}

fn texture_or_white(index: usize, texture: Result<TextureData, ModelError>) -> TextureData {
    texture.unwrap_or_else(|err| {
        warn!("texture {index} unusable ({err}); substituting white");
        TextureData::white()
    })
}

fn convert_image(image: &gltf::image::Data) -> TextureData {
    let pixels = &image.pixels;
    let rgba: Option<Vec<u8>> = match image.format {
        Format::R8G8B8A8 => Some(pixels.clone()),
        Format::R8G8B8 => Some(
            pixels
                .chunks_exact(3)
                .flat_map(|p| [p[0], p[1], p[2], 255])
                .collect(),
        ),
        Format::R8G8 => Some(
            pixels
                .chunks_exact(2)
                .flat_map(|p| [p[0], p[0], p[0], p[1]])
                .collect(),
        ),
        Format::R8 => Some(pixels.iter().flat_map(|&v| [v, v, v, 255]).collect()),
        // 16-bit channels are little endian; keep the high byte.
        Format::R16G16B16A16 => Some(pixels.chunks_exact(2).map(|c| c[1]).collect()),
        Format::R16G16B16 => Some(
            pixels
                .chunks_exact(6)
                .flat_map(|p| [p[1], p[3], p[5], 255])
                .collect(),
        ),
        _ => None,
    };

    match rgba {
        Some(rgba) if rgba.len() == (image.width * image.height * 4) as usize => TextureData {
            width: image.width,
            height: image.height,
            rgba,
        },
        _ => {
            warn!(
                "unsupported texture format {:?}; substituting white",
                image.format
            );
            TextureData::white()
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    /// A single triangle spanning 2 × 4 units, placed by a node at x = 10.
    pub(crate) const TRIANGLE_GLTF: &str = r#"{
        "asset": { "version": "2.0" },
        "scene": 0,
        "scenes": [{ "nodes": [0] }],
        "nodes": [{ "mesh": 0, "translation": [10.0, 0.0, 0.0] }],
        "meshes": [{ "primitives": [{ "attributes": { "POSITION": 0 }, "material": 0 }] }],
        "materials": [{
            "pbrMetallicRoughness": {
                "baseColorFactor": [1.0, 0.0, 0.0, 1.0],
                "metallicFactor": 0.0,
                "roughnessFactor": 0.5
            }
        }],
        "buffers": [{
            "byteLength": 36,
            "uri": "data:application/octet-stream;base64,AAAAAAAAAAAAAAAAAAAAQAAAAAAAAAAAAAAAAAAAgEAAAAAA"
        }],
        "bufferViews": [{ "buffer": 0, "byteOffset": 0, "byteLength": 36 }],
        "accessors": [{
            "bufferView": 0,
            "componentType": 5126,
            "count": 3,
            "type": "VEC3",
            "min": [0.0, 0.0, 0.0],
            "max": [2.0, 4.0, 0.0]
        }]
    }"#;

    /// The triangle above with its vertex data in a separate `tri.bin`.
    pub(crate) const SPLIT_TRIANGLE_GLTF: &str = r#"{
        "asset": { "version": "2.0" },
        "scenes": [{ "nodes": [0] }],
        "nodes": [{ "mesh": 0 }],
        "meshes": [{ "primitives": [{ "attributes": { "POSITION": 0 } }] }],
        "buffers": [{ "byteLength": 36, "uri": "tri.bin" }],
        "bufferViews": [{ "buffer": 0, "byteOffset": 0, "byteLength": 36 }],
        "accessors": [{
            "bufferView": 0,
            "componentType": 5126,
            "count": 3,
            "type": "VEC3",
            "min": [0.0, 0.0, 0.0],
            "max": [2.0, 4.0, 0.0]
        }]
    }"#;

    /// Vertex data of the split triangle: (0,0,0), (2,0,0), (0,4,0).
    pub(crate) fn triangle_bin() -> Vec<u8> {
        [0.0f32, 0.0, 0.0, 2.0, 0.0, 0.0, 0.0, 4.0, 0.0]
            .iter()
            .flat_map(|value| value.to_le_bytes())
            .collect()
    }

    /// Two points and no indices: geometry without a single triangle.
    pub(crate) const SEGMENT_GLTF: &str = r#"{
        "asset": { "version": "2.0" },
        "scenes": [{ "nodes": [0] }],
        "nodes": [{ "mesh": 0 }],
        "meshes": [{ "primitives": [{ "attributes": { "POSITION": 0 } }] }],
        "buffers": [{
            "byteLength": 24,
            "uri": "data:application/octet-stream;base64,AAAAAAAAAAAAAAAAAACAPwAAAAAAAAAA"
        }],
        "bufferViews": [{ "buffer": 0, "byteOffset": 0, "byteLength": 24 }],
        "accessors": [{
            "bufferView": 0,
            "componentType": 5126,
            "count": 2,
            "type": "VEC3",
            "min": [0.0, 0.0, 0.0],
            "max": [1.0, 0.0, 0.0]
        }]
    }"#;

    /// One Draco-compressed primitive placed by a node at z = -5. The
    /// payload is four opaque bytes.
    pub(crate) const DRACO_GLTF: &str = r#"{
        "asset": { "version": "2.0" },
        "extensionsUsed": ["KHR_draco_mesh_compression"],
        "extensionsRequired": ["KHR_draco_mesh_compression"],
        "scenes": [{ "nodes": [0] }],
        "nodes": [{ "mesh": 0, "translation": [0.0, 0.0, -5.0] }],
        "meshes": [{ "primitives": [{
            "attributes": { "POSITION": 0 },
            "indices": 1,
            "extensions": {
                "KHR_draco_mesh_compression": {
                    "bufferView": 0,
                    "attributes": { "POSITION": 3 }
                }
            }
        }] }],
        "buffers": [{ "byteLength": 4, "uri": "data:application/octet-stream;base64,RFJBQw==" }],
        "bufferViews": [{ "buffer": 0, "byteOffset": 0, "byteLength": 4 }],
        "accessors": [
            { "componentType": 5126, "count": 3, "type": "VEC3", "min": [0.0, 0.0, 0.0], "max": [1.0, 1.0, 0.0] },
            { "componentType": 5125, "count": 3, "type": "SCALAR" }
        ]
    }"#;

    pub(crate) const EMPTY_GLTF: &str = r#"{
        "asset": { "version": "2.0" },
        "scenes": [{ "nodes": [] }]
    }"#;
}

#[cfg(test)]
pub(crate) mod testing {
    use std::cell::RefCell;

    use super::{DracoAttributes, MeshDecoder, ModelError, PrimitiveData};

    /// Stands in for the Draco module: returns a fixed unit triangle and
    /// records what it was asked to decode.
    #[derive(Debug, Default)]
    pub(crate) struct TriangleDecoder {
        pub(crate) calls: RefCell<Vec<(Vec<u8>, DracoAttributes)>>,
    }

    impl MeshDecoder for TriangleDecoder {
        async fn decode_draco(
            &self,
            payload: &[u8],
            attributes: DracoAttributes,
        ) -> Result<PrimitiveData, ModelError> {
            self.calls.borrow_mut().push((payload.to_vec(), attributes));
            Ok(PrimitiveData {
                positions: vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
                normals: None,
                uvs: None,
                indices: Some(vec![0, 1, 2]),
            })
        }
    }
}
