use bytemuck::{Pod, Zeroable};
use glam::{Mat3, Mat4, Vec3};

use crate::camera::PerspectiveCamera;
use crate::mesh::{Material, MeshData};
use crate::scene::{Content, Light, Lighting, Scene};

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub(crate) struct GlobalUniform {
    pub view_proj: [[f32; 4]; 4],
    pub camera_position: [f32; 4],
    /// rgb premultiplied by intensity.
    pub ambient: [f32; 4],
    /// Unit vector pointing towards the light.
    pub light_direction: [f32; 4],
    pub light_color: [f32; 4],
    pub irradiance: [[f32; 4]; 9],
    /// x: exposure, y: 1 when the environment map lights the scene.
    pub params: [f32; 4],
}

impl GlobalUniform {
    pub fn new(camera: &PerspectiveCamera, scene: &Scene) -> Self {
        let mut uniform = Self {
            view_proj: camera.view_proj().to_cols_array_2d(),
            camera_position: camera.position.extend(1.0).into(),
            ambient: [0.0; 4],
            light_direction: [0.0, 1.0, 0.0, 0.0],
            light_color: [0.0; 4],
            irradiance: [[0.0; 4]; 9],
            params: [scene.exposure, 0.0, 0.0, 0.0],
        };
        match &scene.lighting {
            Lighting::Environment(map) => {
                for (slot, coefficient) in uniform.irradiance.iter_mut().zip(map.irradiance) {
                    *slot = coefficient.extend(0.0).into();
                }
                uniform.params[1] = 1.0;
            }
            Lighting::Basic {
                ambient,
                directional,
            } => {
                for light in [ambient, directional] {
                    match *light {
                        Light::Ambient { color, intensity } => {
                            uniform.ambient = (color * intensity).extend(1.0).into();
                        }
                        Light::Directional {
                            color,
                            intensity,
                            position,
                        } => {
                            uniform.light_direction =
                                position.try_normalize().unwrap_or(Vec3::Y).extend(0.0).into();
                            uniform.light_color = (color * intensity).extend(1.0).into();
                        }
                    }
                }
            }
        }
        uniform
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub(crate) struct ObjectUniform {
    pub model: [[f32; 4]; 4],
    pub normal: [[f32; 4]; 3],
    pub base_color: [f32; 4],
    /// x: metallic, y: roughness, z: 1 when a base colour texture is bound.
    pub material: [f32; 4],
}

impl ObjectUniform {
    pub fn new(model: Mat4, material: &Material, textured: bool) -> Self {
        let normal = Mat3::from_mat4(model).inverse().transpose();
        Self {
            model: model.to_cols_array_2d(),
            normal: mat3_to_3x4(normal),
            base_color: material.base_color.into(),
            material: [
                material.metallic.clamp(0.0, 1.0),
                material.roughness.clamp(0.04, 1.0),
                if textured { 1.0 } else { 0.0 },
                0.0,
            ],
        }
    }
}

/// One mesh of the content as the renderer uploads it.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PlannedDraw<'a> {
    pub mesh: &'a MeshData,
    pub material: &'a Material,
    /// Slot in the model's texture list, if the material samples one.
    pub texture: Option<usize>,
    pub label: String,
}

impl PlannedDraw<'_> {
    pub fn index_count(&self) -> u32 {
        self.mesh.indices.len() as u32
    }
}

/// Lists the draws for `content`. Meshes without a whole triangle are left
/// out, so every draw has a non-empty index buffer.
pub(crate) fn planned_draws(content: &Content) -> Vec<PlannedDraw<'_>> {
    let candidates: Vec<PlannedDraw<'_>> = match content {
        Content::DemoCube(cube) => vec![PlannedDraw {
            mesh: &cube.mesh,
            material: &cube.material,
            texture: None,
            label: "demo-cube".to_string(),
        }],
        Content::Model { asset, .. } => asset
            .meshes
            .iter()
            .enumerate()
            .map(|(index, model)| PlannedDraw {
                mesh: &model.mesh,
                material: &model.material,
                texture: model
                    .material
                    .base_color_texture
                    .filter(|slot| *slot < asset.textures.len()),
                label: format!("model-mesh-{index}"),
            })
            .collect(),
    };
    candidates
        .into_iter()
        .filter(|draw| draw.index_count() >= 3 && draw.mesh.vertex_count() > 0)
        .collect()
}

fn mat3_to_3x4(matrix: Mat3) -> [[f32; 4]; 3] {
    let cols = matrix.to_cols_array();
    [
        [cols[0], cols[1], cols[2], 0.0],
        [cols[3], cols[4], cols[5], 0.0],
        [cols[6], cols[7], cols[8], 0.0],
    ]
}

pub(crate) const SHADER: &str = r#"
struct GlobalUniform {
    view_proj: mat4x4<f32>,
    camera_position: vec4<f32>,
    ambient: vec4<f32>,
    light_direction: vec4<f32>,
    light_color: vec4<f32>,
    irradiance: array<vec4<f32>, 9>,
    params: vec4<f32>,
}

struct ObjectUniform {
    model: mat4x4<f32>,
    normal: mat3x4<f32>,
    base_color: vec4<f32>,
    material: vec4<f32>,
}

@group(0) @binding(0)
var<uniform> globals: GlobalUniform;

@group(1) @binding(0)
var<uniform> object: ObjectUniform;
@group(1) @binding(1)
var base_color_texture: texture_2d<f32>;
@group(1) @binding(2)
var base_color_sampler: sampler;

struct VertexInput {
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
    @location(2) uv: vec2<f32>,
}

struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) world_pos: vec3<f32>,
    @location(1) normal: vec3<f32>,
    @location(2) uv: vec2<f32>,
}

const PI: f32 = 3.14159265;

@vertex
fn vs_main(input: VertexInput) -> VertexOutput {
    var out: VertexOutput;
    let world_position = object.model * vec4<f32>(input.position, 1.0);
    out.position = globals.view_proj * world_position;
    out.world_pos = world_position.xyz;

    let world_normal = mat3x3<f32>(
        object.normal[0].xyz,
        object.normal[1].xyz,
        object.normal[2].xyz
    ) * input.normal;

    out.normal = normalize(world_normal);
    out.uv = input.uv;
    return out;
}

fn sh_irradiance(n: vec3<f32>) -> vec3<f32> {
    let c = globals.irradiance;
    return c[0].xyz * 0.282095
        + c[1].xyz * (0.488603 * n.y)
        + c[2].xyz * (0.488603 * n.z)
        + c[3].xyz * (0.488603 * n.x)
        + c[4].xyz * (1.092548 * n.x * n.y)
        + c[5].xyz * (1.092548 * n.y * n.z)
        + c[6].xyz * (0.315392 * (3.0 * n.z * n.z - 1.0))
        + c[7].xyz * (1.092548 * n.x * n.z)
        + c[8].xyz * (0.546274 * (n.x * n.x - n.y * n.y));
}

fn distribution_ggx(n_dot_h: f32, roughness: f32) -> f32 {
    let a = roughness * roughness;
    let a2 = a * a;
    let d = n_dot_h * n_dot_h * (a2 - 1.0) + 1.0;
    return a2 / (PI * d * d);
}

fn visibility_smith(n_dot_v: f32, n_dot_l: f32, roughness: f32) -> f32 {
    let k = (roughness + 1.0) * (roughness + 1.0) / 8.0;
    let gv = n_dot_v / (n_dot_v * (1.0 - k) + k);
    let gl = n_dot_l / (n_dot_l * (1.0 - k) + k);
    return gv * gl / max(4.0 * n_dot_v * n_dot_l, 1e-4);
}

fn fresnel_schlick(cos_theta: f32, f0: vec3<f32>) -> vec3<f32> {
    return f0 + (vec3<f32>(1.0) - f0) * pow(1.0 - cos_theta, 5.0);
}

fn rrt_and_odt_fit(v: vec3<f32>) -> vec3<f32> {
    let a = v * (v + 0.0245786) - 0.000090537;
    let b = v * (0.983729 * v + 0.4329510) + 0.238081;
    return a / b;
}

fn aces_filmic(color: vec3<f32>, exposure: f32) -> vec3<f32> {
    let input_mat = mat3x3<f32>(
        vec3<f32>(0.59719, 0.07600, 0.02840),
        vec3<f32>(0.35458, 0.90834, 0.13383),
        vec3<f32>(0.04823, 0.01566, 0.83777)
    );
    let output_mat = mat3x3<f32>(
        vec3<f32>(1.60475, -0.10208, -0.00327),
        vec3<f32>(-0.53108, 1.10813, -0.07276),
        vec3<f32>(-0.07367, -0.00605, 1.07602)
    );
    var c = color * (exposure / 0.6);
    c = input_mat * c;
    c = rrt_and_odt_fit(c);
    c = output_mat * c;
    return clamp(c, vec3<f32>(0.0), vec3<f32>(1.0));
}

@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    let texel = textureSample(base_color_texture, base_color_sampler, input.uv);
    var base = object.base_color;
    if object.material.z > 0.5 {
        base = base * texel;
    }
    let metallic = object.material.x;
    let roughness = object.material.y;

    var n = normalize(input.normal);
    let v = normalize(globals.camera_position.xyz - input.world_pos);
    // Double sided: face the viewer.
    if dot(n, v) < 0.0 {
        n = -n;
    }
    let n_dot_v = max(dot(n, v), 1e-4);
    let albedo = base.rgb * (1.0 - metallic);
    let f0 = mix(vec3<f32>(0.04), base.rgb, metallic);

    var color = vec3<f32>(0.0);
    if globals.params.y > 0.5 {
        let fresnel = fresnel_schlick(n_dot_v, f0);
        let r = reflect(-v, n);
        let glossy = mix(sh_irradiance(r), sh_irradiance(n), roughness);
        color = albedo * sh_irradiance(n) + fresnel * glossy * (1.0 - 0.5 * roughness);
    } else {
        let l = globals.light_direction.xyz;
        let h = normalize(l + v);
        let n_dot_l = max(dot(n, l), 0.0);
        let n_dot_h = max(dot(n, h), 0.0);
        let fresnel = fresnel_schlick(max(dot(h, v), 0.0), f0);
        let specular = fresnel
            * distribution_ggx(n_dot_h, roughness)
            * visibility_smith(n_dot_v, n_dot_l, roughness);
        let diffuse = albedo * (vec3<f32>(1.0) - fresnel);
        color = (diffuse + specular * PI) * globals.light_color.rgb * n_dot_l
            + albedo * globals.ambient.rgb;
    }

    return vec4<f32>(aces_filmic(color, globals.params.x), base.a);
}
"#;
