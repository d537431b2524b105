//! GLB fixtures built in code, and readers for pipeline output

use image::{ImageBuffer, ImageFormat, Rgb, Rgba};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::io::Cursor;

/// Assembles a small GLB from float accessors, u16 indices and embedded images
pub(crate) struct GlbBuilder {
    bin: Vec<u8>,
    views: Vec<Value>,
    accessors: Vec<Value>,
}

impl GlbBuilder {
    pub fn new() -> Self {
        Self {
            bin: Vec::new(),
            views: Vec::new(),
            accessors: Vec::new(),
        }
    }

    pub fn push_view(&mut self, bytes: &[u8], target: Option<u32>) -> usize {
        while self.bin.len() % 4 != 0 {
            self.bin.push(0);
        }
        let mut view = json!({
            "buffer": 0,
            "byteOffset": self.bin.len(),
            "byteLength": bytes.len(),
        });
        if let Some(target) = target {
            view["target"] = json!(target);
        }
        self.bin.extend_from_slice(bytes);
        self.views.push(view);
        self.views.len() - 1
    }

    pub fn f32_accessor<const N: usize>(&mut self, data: &[[f32; N]], with_bounds: bool) -> usize {
        let bytes: Vec<u8> = data.iter().flatten().flat_map(|c| c.to_le_bytes()).collect();
        let view = self.push_view(&bytes, Some(34962));
        let kind = match N {
            2 => "VEC2",
            3 => "VEC3",
            _ => "VEC4",
        };
        let mut accessor = json!({
            "bufferView": view,
            "componentType": 5126,
            "count": data.len(),
            "type": kind,
        });
        if with_bounds {
            let mut min = [f32::MAX; N];
            let mut max = [f32::MIN; N];
            for v in data {
                for i in 0..N {
                    min[i] = min[i].min(v[i]);
                    max[i] = max[i].max(v[i]);
                }
            }
            accessor["min"] = json!(min.to_vec());
            accessor["max"] = json!(max.to_vec());
        }
        self.accessors.push(accessor);
        self.accessors.len() - 1
    }

    pub fn index_accessor(&mut self, indices: &[u16]) -> usize {
        let bytes: Vec<u8> = indices.iter().flat_map(|i| i.to_le_bytes()).collect();
        let view = self.push_view(&bytes, Some(34963));
        self.accessors.push(json!({
            "bufferView": view,
            "componentType": 5123,
            "count": indices.len(),
            "type": "SCALAR",
        }));
        self.accessors.len() - 1
    }

    /// Merge the buffer, views and accessors into `root` and write the GLB
    pub fn finish(mut self, mut root: Value) -> Vec<u8> {
        while self.bin.len() % 4 != 0 {
            self.bin.push(0);
        }
        root["asset"] = json!({"version": "2.0"});
        root["buffers"] = json!([{"byteLength": self.bin.len()}]);
        root["bufferViews"] = Value::Array(self.views);
        root["accessors"] = Value::Array(self.accessors);
        glb_from_parts(&root, self.bin)
    }
}

/// Write a GLB from JSON that already describes `bin`
pub(crate) fn glb_from_parts(root: &Value, bin: Vec<u8>) -> Vec<u8> {
    let json = serde_json::to_vec(root).unwrap();
    let glb = gltf::binary::Glb {
        header: gltf::binary::Header {
            magic: *b"glTF",
            version: 2,
            length: 0,
        },
        json: json.into(),
        bin: Some(bin.into()),
    };
    glb.to_vec().unwrap()
}

pub(crate) fn rgb_png(width: u32, height: u32) -> Vec<u8> {
    let img = ImageBuffer::from_fn(width, height, |x, y| {
        Rgb([(x * 255 / width.max(1)) as u8, (y * 255 / height.max(1)) as u8, 96])
    });
    let mut out = Vec::new();
    img.write_to(&mut Cursor::new(&mut out), ImageFormat::Png).unwrap();
    out
}

pub(crate) fn rgba_png(width: u32, height: u32, alpha: u8) -> Vec<u8> {
    let img = ImageBuffer::from_fn(width, height, |x, y| {
        Rgba([(x * 255 / width.max(1)) as u8, (y * 255 / height.max(1)) as u8, 96, alpha])
    });
    let mut out = Vec::new();
    img.write_to(&mut Cursor::new(&mut out), ImageFormat::Png).unwrap();
    out
}

/// Unit cube with 4 vertices per face, normals, UVs, u16 indices and a
/// 64x32 PNG base color texture
pub(crate) fn textured_cube_glb() -> Vec<u8> {
    let faces: [([f32; 3], [f32; 3], [f32; 3]); 6] = [
        ([1.0, 0.0, 0.0], [0.0, 0.0, -1.0], [0.0, 1.0, 0.0]),
        ([-1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0, 0.0]),
        ([0.0, 1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, -1.0]),
        ([0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]),
        ([0.0, 0.0, 1.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
        ([0.0, 0.0, -1.0], [-1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
    ];
    let corners = [(-1.0f32, -1.0f32), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)];

    let mut positions = Vec::new();
    let mut normals = Vec::new();
    let mut uvs = Vec::new();
    let mut indices: Vec<u16> = Vec::new();
    for (n, u, v) in faces {
        let base = positions.len() as u16;
        for (s, t) in corners {
            positions.push([
                n[0] * 0.5 + u[0] * s * 0.5 + v[0] * t * 0.5,
                n[1] * 0.5 + u[1] * s * 0.5 + v[1] * t * 0.5,
                n[2] * 0.5 + u[2] * s * 0.5 + v[2] * t * 0.5,
            ]);
            normals.push(n);
            uvs.push([(s + 1.0) * 0.5, 1.0 - (t + 1.0) * 0.5]);
        }
        indices.extend([base, base + 1, base + 2, base, base + 2, base + 3]);
    }

    let mut builder = GlbBuilder::new();
    let position = builder.f32_accessor(&positions, true);
    let normal = builder.f32_accessor(&normals, false);
    let uv = builder.f32_accessor(&uvs, false);
    let index = builder.index_accessor(&indices);
    let image_view = builder.push_view(&rgb_png(64, 32), None);

    builder.finish(json!({
        "scene": 0,
        "scenes": [{"nodes": [0]}],
        "nodes": [{"name": "cube", "mesh": 0}],
        "meshes": [{
            "name": "cube",
            "primitives": [{
                "attributes": {"POSITION": position, "NORMAL": normal, "TEXCOORD_0": uv},
                "indices": index,
                "material": 0,
            }],
        }],
        "materials": [{
            "name": "fur",
            "pbrMetallicRoughness": {
                "baseColorTexture": {"index": 0},
                "metallicFactor": 0.0,
            },
        }],
        "samplers": [{"magFilter": 9729, "minFilter": 9987}],
        "textures": [{"source": 0, "sampler": 0}],
        "images": [{"bufferView": image_view, "mimeType": "image/png"}],
    }))
}

/// Two identical unindexed `n` x `n` quad grids in separate meshes, each
/// placed by its own node
pub(crate) fn grid_soup_glb(n: usize) -> Vec<u8> {
    let step = 1.0 / n as f32;
    let mut positions = Vec::new();
    let mut normals = Vec::new();
    let mut uvs = Vec::new();
    for i in 0..n {
        for j in 0..n {
            let (x0, z0) = (i as f32 * step, j as f32 * step);
            let (x1, z1) = ((i + 1) as f32 * step, (j + 1) as f32 * step);
            let (y0, y1) = (((x0 + z0) * 3.0).sin() * 0.1, ((x1 + z1) * 3.0).sin() * 0.1);
            let (y01, y10) = (((x0 + z1) * 3.0).sin() * 0.1, ((x1 + z0) * 3.0).sin() * 0.1);
            for p in [
                [x0, y0, z0],
                [x0, y01, z1],
                [x1, y1, z1],
                [x0, y0, z0],
                [x1, y1, z1],
                [x1, y10, z0],
            ] {
                positions.push(p);
                normals.push([0.0, 1.0, 0.0]);
                uvs.push([p[0], p[2]]);
            }
        }
    }

    let mut builder = GlbBuilder::new();
    let mut meshes = Vec::new();
    for name in ["left", "right"] {
        let position = builder.f32_accessor(&positions, true);
        let normal = builder.f32_accessor(&normals, false);
        let uv = builder.f32_accessor(&uvs, false);
        meshes.push(json!({
            "name": name,
            "primitives": [{
                "attributes": {"POSITION": position, "NORMAL": normal, "TEXCOORD_0": uv},
            }],
        }));
    }

    builder.finish(json!({
        "scene": 0,
        "scenes": [{"nodes": [0, 1]}],
        "nodes": [
            {"name": "left", "mesh": 0},
            {"name": "right", "mesh": 1, "translation": [2.0, 0.0, 0.0]},
        ],
        "meshes": meshes,
    }))
}

/// Pipeline output split back into its JSON document and binary chunk
pub(crate) struct OutputGlb {
    pub json: Value,
    pub bin: Vec<u8>,
}

impl OutputGlb {
    pub fn parse(bytes: &[u8]) -> Self {
        let glb = gltf::binary::Glb::from_slice(bytes).unwrap();
        assert_eq!(glb.header.length as usize, bytes.len());
        Self {
            json: serde_json::from_slice(&glb.json).unwrap(),
            bin: glb.bin.map(|b| b.into_owned()).unwrap_or_default(),
        }
    }

    pub fn strings(&self, key: &str) -> Vec<String> {
        self.json[key]
            .as_array()
            .map(|a| a.iter().filter_map(|s| s.as_str().map(String::from)).collect())
            .unwrap_or_default()
    }

    /// Bytes of a buffer view, decompressed if it carries meshopt data
    pub fn view_bytes(&self, view: usize) -> Vec<u8> {
        let view = &self.json["bufferViews"][view];
        let ext = &view["extensions"]["EXT_meshopt_compression"];
        if ext.is_object() {
            assert_eq!(ext["buffer"], 0);
            assert_eq!(ext["mode"], "ATTRIBUTES");
            let offset = ext["byteOffset"].as_u64().unwrap_or(0) as usize;
            let length = ext["byteLength"].as_u64().unwrap() as usize;
            let count = ext["count"].as_u64().unwrap() as usize;
            let encoded = &self.bin[offset..offset + length];
            let decoded = match ext["byteStride"].as_u64().unwrap() {
                4 => flatten(meshopt::decode_vertex_buffer::<[u8; 4]>(encoded, count).unwrap()),
                8 => flatten(meshopt::decode_vertex_buffer::<[u8; 8]>(encoded, count).unwrap()),
                12 => flatten(meshopt::decode_vertex_buffer::<[u8; 12]>(encoded, count).unwrap()),
                16 => flatten(meshopt::decode_vertex_buffer::<[u8; 16]>(encoded, count).unwrap()),
                other => panic!("unexpected stride {}", other),
            };
            assert_eq!(decoded.len(), view["byteLength"].as_u64().unwrap() as usize);
            decoded
        } else {
            assert_eq!(view["buffer"], 0);
            let offset = view["byteOffset"].as_u64().unwrap_or(0) as usize;
            let length = view["byteLength"].as_u64().unwrap() as usize;
            self.bin[offset..offset + length].to_vec()
        }
    }

    /// Element bytes of an accessor, one entry per vertex
    pub fn accessor_rows(&self, accessor: usize) -> Vec<Vec<u8>> {
        let accessor = &self.json["accessors"][accessor];
        let view_index = accessor["bufferView"].as_u64().unwrap() as usize;
        let count = accessor["count"].as_u64().unwrap() as usize;
        let stride = self.json["bufferViews"][view_index]["byteStride"]
            .as_u64()
            .unwrap() as usize;
        let bytes = self.view_bytes(view_index);
        (0..count)
            .map(|i| bytes[i * stride..(i + 1) * stride].to_vec())
            .collect()
    }

    pub fn indices(&self, accessor: usize) -> Vec<u32> {
        let accessor = &self.json["accessors"][accessor];
        let view = accessor["bufferView"].as_u64().unwrap() as usize;
        let bytes = self.view_bytes(view);
        match accessor["componentType"].as_u64().unwrap() {
            5123 => bytes
                .chunks_exact(2)
                .map(|c| u16::from_le_bytes([c[0], c[1]]) as u32)
                .collect(),
            5125 => bytes
                .chunks_exact(4)
                .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect(),
            other => panic!("unexpected index type {}", other),
        }
    }

    /// Assert that no primitive holds two vertices with identical attributes
    pub fn assert_no_duplicate_vertices(&self) {
        for mesh in self.json["meshes"].as_array().unwrap() {
            for primitive in mesh["primitives"].as_array().unwrap() {
                let attributes = primitive["attributes"].as_object().unwrap();
                let streams: Vec<Vec<Vec<u8>>> = attributes
                    .values()
                    .map(|a| self.accessor_rows(a.as_u64().unwrap() as usize))
                    .collect();
                let count = streams[0].len();
                let mut seen = HashSet::new();
                for v in 0..count {
                    let key: Vec<u8> = streams.iter().flat_map(|s| s[v].clone()).collect();
                    assert!(seen.insert(key), "duplicate vertex {}", v);
                }
            }
        }
    }
}

fn flatten<const N: usize>(rows: Vec<[u8; N]>) -> Vec<u8> {
    rows.into_iter().flatten().collect()
}
