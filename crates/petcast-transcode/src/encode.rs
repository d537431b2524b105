//! GLB encoding with meshopt-compressed vertex streams
//!
//! Layout of the output:
//! - buffer 0 is the GLB binary chunk and holds the compressed vertex
//!   streams, plain index data and images
//! - buffer 1 is an `EXT_meshopt_compression` fallback buffer with a byte
//!   length and no data; vertex views point into it and carry the location
//!   of their compressed bytes in buffer 0
//!
//! Index views are stored uncompressed.

use crate::document::*;
use petcast_core::{PetcastError, Result};
use serde_json::{json, Map, Value};
use std::collections::HashMap;

pub const EXT_MESHOPT: &str = "EXT_meshopt_compression";
pub const KHR_QUANTIZATION: &str = "KHR_mesh_quantization";
pub const KHR_TEXTURE_TRANSFORM: &str = "KHR_texture_transform";

const TARGET_ARRAY_BUFFER: u32 = 34962;
const TARGET_ELEMENT_ARRAY_BUFFER: u32 = 34963;

/// Encode a document as a GLB
pub fn encode_glb(doc: &SceneDocument) -> Result<Vec<u8>> {
    let mut writer = GlbWriter::default();
    let mut root = Map::new();
    root.insert(
        "asset".into(),
        json!({"version": "2.0", "generator": "petcast-transcode"}),
    );

    // Meshes with nothing drawable are dropped along with node references
    let mut mesh_map: Vec<Option<usize>> = Vec::with_capacity(doc.meshes.len());
    let mut meshes = Vec::new();
    for mesh in &doc.meshes {
        let mut primitives = Vec::new();
        for primitive in &mesh.primitives {
            if let Some(p) = writer.primitive(primitive)? {
                primitives.push(p);
            }
        }
        if primitives.is_empty() {
            mesh_map.push(None);
            continue;
        }
        let mut m = Map::new();
        if let Some(name) = &mesh.name {
            m.insert("name".into(), json!(name));
        }
        m.insert("primitives".into(), Value::Array(primitives));
        mesh_map.push(Some(meshes.len()));
        meshes.push(Value::Object(m));
    }

    let images: Vec<Value> = doc
        .images
        .iter()
        .map(|image| {
            let view = writer.plain_view(&image.bytes, None);
            let mut i = Map::new();
            if let Some(name) = &image.name {
                i.insert("name".into(), json!(name));
            }
            i.insert("bufferView".into(), json!(view));
            i.insert("mimeType".into(), json!(image.mime_type));
            Value::Object(i)
        })
        .collect();

    let mut sampler_index: HashMap<Sampler, usize> = HashMap::new();
    let mut samplers = Vec::new();
    let textures: Vec<Value> = doc
        .textures
        .iter()
        .map(|texture| {
            let sampler = *sampler_index.entry(texture.sampler).or_insert_with(|| {
                samplers.push(sampler_json(&texture.sampler));
                samplers.len() - 1
            });
            let mut t = Map::new();
            if let Some(name) = &texture.name {
                t.insert("name".into(), json!(name));
            }
            t.insert("source".into(), json!(texture.source));
            t.insert("sampler".into(), json!(sampler));
            Value::Object(t)
        })
        .collect();

    let materials: Vec<Value> = doc.materials.iter().map(material_json).collect();

    let nodes: Vec<Value> = doc
        .nodes
        .iter()
        .map(|node| node_json(node, node.mesh.and_then(|m| mesh_map.get(m).copied().flatten())))
        .collect();

    let scenes: Vec<Value> = doc
        .scenes
        .iter()
        .map(|scene| {
            let mut s = Map::new();
            if let Some(name) = &scene.name {
                s.insert("name".into(), json!(name));
            }
            s.insert("nodes".into(), json!(scene.nodes));
            Value::Object(s)
        })
        .collect();

    if let Some(scene) = doc.default_scene {
        root.insert("scene".into(), json!(scene));
    }
    put_array(&mut root, "scenes", scenes);
    put_array(&mut root, "nodes", nodes);
    put_array(&mut root, "meshes", meshes);
    put_array(&mut root, "materials", materials);
    put_array(&mut root, "textures", textures);
    put_array(&mut root, "samplers", samplers);
    put_array(&mut root, "images", images);

    let mut extensions = Vec::new();
    if writer.compressed {
        extensions.push(EXT_MESHOPT);
    }
    if writer.quantized {
        extensions.push(KHR_QUANTIZATION);
    }
    // quantized UVs are only meaningful through their transform
    if doc
        .materials
        .iter()
        .flat_map(Material::texture_refs)
        .any(|t| t.transform.is_some())
    {
        extensions.push(KHR_TEXTURE_TRANSFORM);
    }
    if !extensions.is_empty() {
        root.insert("extensionsUsed".into(), json!(extensions));
        root.insert("extensionsRequired".into(), json!(extensions));
    }

    writer.finish(root)
}

#[derive(Default)]
struct GlbWriter {
    bin: Vec<u8>,
    fallback_len: usize,
    views: Vec<Value>,
    accessors: Vec<Value>,
    compressed: bool,
    quantized: bool,
}

impl GlbWriter {
    fn align(&mut self) {
        while self.bin.len() % 4 != 0 {
            self.bin.push(0);
        }
    }

    fn plain_view(&mut self, bytes: &[u8], target: Option<u32>) -> usize {
        self.align();
        let mut view = Map::new();
        view.insert("buffer".into(), json!(0));
        view.insert("byteOffset".into(), json!(self.bin.len()));
        view.insert("byteLength".into(), json!(bytes.len()));
        if let Some(target) = target {
            view.insert("target".into(), json!(target));
        }
        self.bin.extend_from_slice(bytes);
        self.views.push(Value::Object(view));
        self.views.len() - 1
    }

    fn vertex_view(&mut self, attribute: &VertexAttribute) -> Result<usize> {
        let raw = attribute.to_bytes();
        let stride = attribute.byte_stride();
        let encoded = encode_vertex_stream(&raw, stride)?;

        self.align();
        let offset = self.bin.len();
        self.bin.extend_from_slice(&encoded);

        self.fallback_len = (self.fallback_len + 3) & !3;
        let fallback_offset = self.fallback_len;
        self.fallback_len += raw.len();
        self.compressed = true;

        self.views.push(json!({
            "buffer": 1,
            "byteOffset": fallback_offset,
            "byteLength": raw.len(),
            "byteStride": stride,
            "target": TARGET_ARRAY_BUFFER,
            "extensions": {
                EXT_MESHOPT: {
                    "buffer": 0,
                    "byteOffset": offset,
                    "byteLength": encoded.len(),
                    "byteStride": stride,
                    "mode": "ATTRIBUTES",
                    "count": attribute.len(),
                }
            }
        }));
        Ok(self.views.len() - 1)
    }

    fn attribute(&mut self, semantic: Semantic, attribute: &VertexAttribute) -> Result<usize> {
        let view = self.vertex_view(attribute)?;
        let mut accessor = Map::new();
        accessor.insert("bufferView".into(), json!(view));
        accessor.insert("componentType".into(), json!(attribute.component_type()));
        if attribute.is_quantized() {
            accessor.insert("normalized".into(), json!(true));
            self.quantized = true;
        }
        accessor.insert("count".into(), json!(attribute.len()));
        accessor.insert("type".into(), json!(attribute.accessor_type()));
        if semantic == Semantic::Position {
            let (min, max) = component_bounds(attribute);
            accessor.insert("min".into(), min);
            accessor.insert("max".into(), max);
        }
        self.accessors.push(Value::Object(accessor));
        Ok(self.accessors.len() - 1)
    }

    fn indices(&mut self, indices: &[u32], vertex_count: usize) -> usize {
        let (bytes, component_type): (Vec<u8>, u32) = if vertex_count <= u16::MAX as usize {
            (
                indices
                    .iter()
                    .flat_map(|&i| (i as u16).to_le_bytes())
                    .collect(),
                COMPONENT_UNSIGNED_SHORT,
            )
        } else {
            (
                indices.iter().flat_map(|i| i.to_le_bytes()).collect(),
                COMPONENT_UNSIGNED_INT,
            )
        };
        let view = self.plain_view(&bytes, Some(TARGET_ELEMENT_ARRAY_BUFFER));
        self.accessors.push(json!({
            "bufferView": view,
            "componentType": component_type,
            "count": indices.len(),
            "type": "SCALAR",
        }));
        self.accessors.len() - 1
    }

    /// Returns `None` for primitives with no vertices or no triangles left
    fn primitive(&mut self, primitive: &Primitive) -> Result<Option<Value>> {
        let vertex_count = primitive.vertex_count();
        if vertex_count == 0 || primitive.indices.as_ref().is_some_and(Vec::is_empty) {
            return Ok(None);
        }

        let mut attributes = Map::new();
        for (semantic, attribute) in &primitive.attributes {
            let accessor = self.attribute(*semantic, attribute)?;
            attributes.insert(semantic.gltf_name(), json!(accessor));
        }

        let mut p = Map::new();
        p.insert("attributes".into(), Value::Object(attributes));
        if let Some(indices) = &primitive.indices {
            p.insert("indices".into(), json!(self.indices(indices, vertex_count)));
        }
        if let Some(material) = primitive.material {
            p.insert("material".into(), json!(material));
        }
        if primitive.mode != MODE_TRIANGLES {
            p.insert("mode".into(), json!(primitive.mode));
        }
        Ok(Some(Value::Object(p)))
    }

    fn finish(mut self, mut root: Map<String, Value>) -> Result<Vec<u8>> {
        self.align();
        let mut buffers = Vec::new();
        if !self.views.is_empty() {
            buffers.push(json!({"byteLength": self.bin.len()}));
        }
        if self.compressed {
            buffers.push(json!({
                "byteLength": self.fallback_len,
                "extensions": {EXT_MESHOPT: {"fallback": true}},
            }));
        }
        put_array(&mut root, "buffers", buffers);
        put_array(&mut root, "bufferViews", self.views);
        put_array(&mut root, "accessors", self.accessors);

        let json = serde_json::to_vec(&Value::Object(root))
            .map_err(|e| PetcastError::EncodeError(format!("Failed to serialize glTF JSON: {}", e)))?;
        let glb = gltf::binary::Glb {
            header: gltf::binary::Header {
                magic: *b"glTF",
                version: 2,
                length: 0,
            },
            json: json.into(),
            bin: (!self.bin.is_empty()).then(|| self.bin.into()),
        };
        glb.to_vec()
            .map_err(|e| PetcastError::EncodeError(format!("Failed to write GLB: {}", e)))
    }
}

/// Compress one interleaved-free vertex stream with meshopt's vertex codec
fn encode_vertex_stream(raw: &[u8], stride: usize) -> Result<Vec<u8>> {
    let encoded = match stride {
        4 => meshopt::encode_vertex_buffer(&rows::<4>(raw)),
        8 => meshopt::encode_vertex_buffer(&rows::<8>(raw)),
        12 => meshopt::encode_vertex_buffer(&rows::<12>(raw)),
        16 => meshopt::encode_vertex_buffer(&rows::<16>(raw)),
        other => {
            return Err(PetcastError::EncodeError(format!(
                "Unsupported vertex stride {}",
                other
            )))
        }
    };
    encoded.map_err(|e| PetcastError::EncodeError(format!("meshopt vertex encode failed: {:?}", e)))
}

fn rows<const N: usize>(raw: &[u8]) -> Vec<[u8; N]> {
    raw.chunks_exact(N)
        .map(|chunk| {
            let mut row = [0u8; N];
            row.copy_from_slice(chunk);
            row
        })
        .collect()
}

/// Per-component min and max in the accessor's stored units
fn component_bounds(attribute: &VertexAttribute) -> (Value, Value) {
    let components = attribute.components();
    let mut min = vec![f64::MAX; components];
    let mut max = vec![f64::MIN; components];
    for i in 0..attribute.len() {
        for c in 0..components {
            let v = attribute.raw(i, c);
            min[c] = min[c].min(v);
            max[c] = max[c].max(v);
        }
    }
    if attribute.is_quantized() {
        let to_ints = |v: Vec<f64>| json!(v.into_iter().map(|x| x as i64).collect::<Vec<_>>());
        (to_ints(min), to_ints(max))
    } else {
        let to_floats = |v: Vec<f64>| json!(v.into_iter().map(|x| x as f32).collect::<Vec<_>>());
        (to_floats(min), to_floats(max))
    }
}

fn sampler_json(sampler: &Sampler) -> Value {
    let mut s = Map::new();
    if let Some(mag) = sampler.mag_filter {
        s.insert("magFilter".into(), json!(mag));
    }
    if let Some(min) = sampler.min_filter {
        s.insert("minFilter".into(), json!(min));
    }
    s.insert("wrapS".into(), json!(sampler.wrap_s));
    s.insert("wrapT".into(), json!(sampler.wrap_t));
    Value::Object(s)
}

fn texture_info(texture_ref: &TextureRef, scale_key: Option<&str>) -> Value {
    let mut info = Map::new();
    info.insert("index".into(), json!(texture_ref.texture));
    if texture_ref.tex_coord != 0 {
        info.insert("texCoord".into(), json!(texture_ref.tex_coord));
    }
    if let Some(key) = scale_key {
        info.insert(key.into(), json!(texture_ref.scale));
    }
    if let Some(transform) = &texture_ref.transform {
        let mut t = Map::new();
        t.insert("offset".into(), json!(transform.offset));
        if transform.rotation != 0.0 {
            t.insert("rotation".into(), json!(transform.rotation));
        }
        t.insert("scale".into(), json!(transform.scale));
        info.insert(
            "extensions".into(),
            json!({ KHR_TEXTURE_TRANSFORM: Value::Object(t) }),
        );
    }
    Value::Object(info)
}

fn material_json(material: &Material) -> Value {
    let mut pbr = Map::new();
    pbr.insert("baseColorFactor".into(), json!(material.base_color_factor));
    pbr.insert("metallicFactor".into(), json!(material.metallic_factor));
    pbr.insert("roughnessFactor".into(), json!(material.roughness_factor));
    if let Some(t) = &material.base_color_texture {
        pbr.insert("baseColorTexture".into(), texture_info(t, None));
    }
    if let Some(t) = &material.metallic_roughness_texture {
        pbr.insert("metallicRoughnessTexture".into(), texture_info(t, None));
    }

    let mut m = Map::new();
    if let Some(name) = &material.name {
        m.insert("name".into(), json!(name));
    }
    m.insert("pbrMetallicRoughness".into(), Value::Object(pbr));
    if let Some(t) = &material.normal_texture {
        m.insert("normalTexture".into(), texture_info(t, Some("scale")));
    }
    if let Some(t) = &material.occlusion_texture {
        m.insert("occlusionTexture".into(), texture_info(t, Some("strength")));
    }
    if let Some(t) = &material.emissive_texture {
        m.insert("emissiveTexture".into(), texture_info(t, None));
    }
    if material.emissive_factor != [0.0; 3] {
        m.insert("emissiveFactor".into(), json!(material.emissive_factor));
    }
    if material.alpha_mode != AlphaMode::Opaque {
        m.insert("alphaMode".into(), json!(material.alpha_mode.as_str()));
    }
    if material.alpha_mode == AlphaMode::Mask {
        m.insert("alphaCutoff".into(), json!(material.alpha_cutoff.unwrap_or(0.5)));
    }
    if material.double_sided {
        m.insert("doubleSided".into(), json!(true));
    }
    Value::Object(m)
}

fn node_json(node: &Node, mesh: Option<usize>) -> Value {
    let mut n = Map::new();
    if let Some(name) = &node.name {
        n.insert("name".into(), json!(name));
    }
    if let Some(mesh) = mesh {
        n.insert("mesh".into(), json!(mesh));
    }
    if !node.children.is_empty() {
        n.insert("children".into(), json!(node.children));
    }
    match node.transform {
        NodeTransform::Matrix(matrix) => {
            let flat: Vec<f32> = matrix.iter().flatten().copied().collect();
            n.insert("matrix".into(), json!(flat));
        }
        NodeTransform::Trs {
            translation,
            rotation,
            scale,
        } => {
            if translation != [0.0; 3] {
                n.insert("translation".into(), json!(translation));
            }
            if rotation != [0.0, 0.0, 0.0, 1.0] {
                n.insert("rotation".into(), json!(rotation));
            }
            if scale != [1.0; 3] {
                n.insert("scale".into(), json!(scale));
            }
        }
    }
    Value::Object(n)
}

fn put_array(root: &mut Map<String, Value>, key: &str, items: Vec<Value>) {
    if !items.is_empty() {
        root.insert(key.into(), Value::Array(items));
    }
}
