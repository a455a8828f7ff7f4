//! Draco decompression through Google's published decoder module.

use std::cell::RefCell;

use js_sys::{Array, Float32Array, Function, Int8Array, Object, Promise, Reflect, Uint32Array, Uint8Array};
use log::{info, warn};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::{future_to_promise, JsFuture};
use web_sys::{Document, HtmlScriptElement};

use super::{DracoAttributes, MeshDecoder, ModelError, PrimitiveData};

const DECODER_SCRIPT: &str = "https://www.gstatic.com/draco/v1/decoders/draco_decoder.js";
const MODULE_FACTORY: &str = "DracoDecoderModule";
/// Property of the object the load promise resolves to. The module itself is
/// thenable and cannot be a promise result.
const MODULE_KEY: &str = "draco";

#[wasm_bindgen]
extern "C" {
    type DracoModule;

    #[wasm_bindgen(method, getter = HEAPF32)]
    fn heap_f32(this: &DracoModule) -> Float32Array;
    #[wasm_bindgen(method, getter = TRIANGULAR_MESH)]
    fn triangular_mesh(this: &DracoModule) -> i32;
    #[wasm_bindgen(method, getter = DT_FLOAT32)]
    fn dt_float32(this: &DracoModule) -> i32;
    #[wasm_bindgen(method, js_name = _malloc)]
    fn malloc(this: &DracoModule, byte_length: u32) -> u32;
    #[wasm_bindgen(method, js_name = _free)]
    fn free(this: &DracoModule, ptr: u32);
    #[wasm_bindgen(method)]
    fn destroy(this: &DracoModule, object: &JsValue);

    type Decoder;

    #[wasm_bindgen(method, js_name = GetEncodedGeometryType)]
    fn encoded_geometry_type(this: &Decoder, data: &Int8Array) -> i32;
    #[wasm_bindgen(method, js_name = DecodeArrayToMesh)]
    fn decode_array_to_mesh(this: &Decoder, data: &Int8Array, byte_length: u32, mesh: &DracoMesh)
        -> DecodeStatus;
    #[wasm_bindgen(method, js_name = GetAttributeByUniqueId)]
    fn attribute_by_unique_id(this: &Decoder, mesh: &DracoMesh, id: u32) -> PointAttribute;
    #[wasm_bindgen(method, js_name = GetAttributeDataArrayForAllPoints)]
    fn attribute_data_for_all_points(
        this: &Decoder,
        mesh: &DracoMesh,
        attribute: &PointAttribute,
        data_type: i32,
        byte_length: u32,
        ptr: u32,
    ) -> bool;
    #[wasm_bindgen(method, js_name = GetTrianglesUInt32Array)]
    fn triangles_u32(this: &Decoder, mesh: &DracoMesh, byte_length: u32, ptr: u32) -> bool;

    type DracoMesh;

    #[wasm_bindgen(method, getter)]
    fn ptr(this: &DracoMesh) -> u32;
    #[wasm_bindgen(method)]
    fn num_faces(this: &DracoMesh) -> u32;
    #[wasm_bindgen(method)]
    fn num_points(this: &DracoMesh) -> u32;

    type PointAttribute;

    #[wasm_bindgen(method, getter)]
    fn ptr(this: &PointAttribute) -> u32;
    #[wasm_bindgen(method)]
    fn num_components(this: &PointAttribute) -> u32;

    type DecodeStatus;

    #[wasm_bindgen(method)]
    fn ok(this: &DecodeStatus) -> bool;
    #[wasm_bindgen(method)]
    fn error_msg(this: &DecodeStatus) -> String;
}

/// Loads the decoder module on first use and shares it between viewers.
#[derive(Debug, Default)]
pub struct DracoDecoder {
    module: RefCell<Option<Promise>>,
}

impl DracoDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    async fn module(&self) -> Result<DracoModule, JsValue> {
        let promise = self
            .module
            .borrow_mut()
            .get_or_insert_with(|| future_to_promise(load_module()))
            .clone();
        let loaded = JsFuture::from(promise).await?;
        Ok(Reflect::get(&loaded, &MODULE_KEY.into())?.unchecked_into())
    }
}

impl MeshDecoder for DracoDecoder {
    async fn decode_draco(
        &self,
        payload: &[u8],
        attributes: DracoAttributes,
    ) -> Result<PrimitiveData, ModelError> {
        let module = self.module().await.map_err(decode_error)?;
        let decoder: Decoder = construct(&module, "Decoder").map_err(decode_error)?;
        let mesh: DracoMesh = construct(&module, "Mesh").map_err(decode_error)?;
        let decoded = read_mesh(&module, &decoder, &mesh, payload, attributes);
        module.destroy(&mesh);
        module.destroy(&decoder);
        decoded.map_err(decode_error)
    }
}

async fn load_module() -> Result<JsValue, JsValue> {
    let window = web_sys::window().ok_or_else(|| JsValue::from_str("window not available"))?;
    if Reflect::get(&window, &MODULE_FACTORY.into())?.is_undefined() {
        let document = window
            .document()
            .ok_or_else(|| JsValue::from_str("document not available"))?;
        inject_script(&document, DECODER_SCRIPT).await?;
    }
    let factory: Function = Reflect::get(&window, &MODULE_FACTORY.into())?.dyn_into()?;

    let ready = Promise::new(&mut |resolve, reject| {
        let on_loaded = Closure::once_into_js(move |module: JsValue| {
            let loaded = Object::new();
            let stored = Reflect::set(&loaded, &MODULE_KEY.into(), &module);
            settle(&resolve, stored.map(|_| loaded.into()));
        });
        let config = Object::new();
        if let Err(err) = Reflect::set(&config, &"onModuleLoaded".into(), &on_loaded)
            .and_then(|_| factory.call1(&JsValue::UNDEFINED, &config))
        {
            settle(&reject, Ok(err));
        }
    });
    let module = JsFuture::from(ready).await?;
    info!("Draco decoder ready");
    Ok(module)
}

async fn inject_script(document: &Document, src: &str) -> Result<(), JsValue> {
    let script: HtmlScriptElement = document.create_element("script")?.dyn_into()?;
    script.set_src(src);
    let loaded = Promise::new(&mut |resolve, reject| {
        script.set_onload(Some(&resolve));
        script.set_onerror(Some(&reject));
    });
    document
        .head()
        .ok_or_else(|| JsValue::from_str("document has no head"))?
        .append_child(&script)?;
    JsFuture::from(loaded)
        .await
        .map_err(|_| JsValue::from_str(&format!("failed to load {src}")))?;
    Ok(())
}

fn settle(callback: &Function, value: Result<JsValue, JsValue>) {
    let value = value.unwrap_or_else(|err| err);
    if let Err(err) = callback.call1(&JsValue::UNDEFINED, &value) {
        warn!("Draco loader callback failed: {err:?}");
    }
}

fn construct<T: JsCast>(module: &DracoModule, class: &str) -> Result<T, JsValue> {
    let constructor: Function = Reflect::get(module, &class.into())?.dyn_into()?;
    Ok(Reflect::construct(&constructor, &Array::new())?.unchecked_into())
}

fn read_mesh(
    module: &DracoModule,
    decoder: &Decoder,
    mesh: &DracoMesh,
    payload: &[u8],
    attributes: DracoAttributes,
) -> Result<PrimitiveData, JsValue> {
    let bytes = Uint8Array::from(payload);
    let array = Int8Array::new(&bytes.buffer());
    if decoder.encoded_geometry_type(&array) != module.triangular_mesh() {
        return Err(JsValue::from_str("payload is not a triangle mesh"));
    }
    let status = decoder.decode_array_to_mesh(&array, array.length(), mesh);
    if !status.ok() || mesh.ptr() == 0 {
        return Err(JsValue::from_str(&status.error_msg()));
    }

    let position = attributes
        .position
        .ok_or_else(|| JsValue::from_str("primitive has no POSITION attribute"))?;
    let positions = read_attribute(module, decoder, mesh, position)?
        .ok_or_else(|| JsValue::from_str("POSITION is missing from the payload"))?;
    let read_optional = |id: Option<u32>| -> Result<Option<(Vec<f32>, usize)>, JsValue> {
        match id {
            Some(id) => read_attribute(module, decoder, mesh, id),
            None => Ok(None),
        }
    };
    let normals = read_optional(attributes.normal)?;
    let uvs = read_optional(attributes.tex_coord)?;

    Ok(PrimitiveData {
        positions: vectors(&positions),
        normals: normals.as_ref().map(vectors),
        uvs: uvs.as_ref().map(vectors),
        indices: Some(read_indices(module, decoder, mesh)?),
    })
}

/// Reads one attribute as floats, with its component count.
fn read_attribute(
    module: &DracoModule,
    decoder: &Decoder,
    mesh: &DracoMesh,
    id: u32,
) -> Result<Option<(Vec<f32>, usize)>, JsValue> {
    let attribute = decoder.attribute_by_unique_id(mesh, id);
    if attribute.ptr() == 0 {
        return Ok(None);
    }
    let components = attribute.num_components();
    let count = mesh.num_points() * components;
    let byte_length = count * 4;
    let ptr = module.malloc(byte_length);
    let copied = decoder.attribute_data_for_all_points(
        mesh,
        &attribute,
        module.dt_float32(),
        byte_length,
        ptr,
    );
    let values = Float32Array::new_with_byte_offset_and_length(&module.heap_f32().buffer(), ptr, count)
        .to_vec();
    module.free(ptr);
    if !copied {
        return Err(JsValue::from_str(&format!("failed to read attribute {id}")));
    }
    Ok(Some((values, components as usize)))
}

fn read_indices(module: &DracoModule, decoder: &Decoder, mesh: &DracoMesh) -> Result<Vec<u32>, JsValue> {
    let count = mesh.num_faces() * 3;
    let byte_length = count * 4;
    let ptr = module.malloc(byte_length);
    let copied = decoder.triangles_u32(mesh, byte_length, ptr);
    let indices = Uint32Array::new_with_byte_offset_and_length(&module.heap_f32().buffer(), ptr, count)
        .to_vec();
    module.free(ptr);
    if !copied {
        return Err(JsValue::from_str("failed to read triangle indices"));
    }
    Ok(indices)
}

/// Splits a flat attribute into fixed-size vectors; vectors with fewer
/// components than `N` are dropped.
fn vectors<const N: usize>((values, components): &(Vec<f32>, usize)) -> Vec<[f32; N]> {
    if *components < N {
        return Vec::new();
    }
    values
        .chunks_exact(*components)
        .map(|chunk| std::array::from_fn(|i| chunk[i]))
        .collect()
}

fn decode_error(err: JsValue) -> ModelError {
    ModelError::Decode(err.as_string().unwrap_or_else(|| format!("{err:?}")))
}
