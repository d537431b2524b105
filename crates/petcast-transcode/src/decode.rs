//! glTF/GLB decoding into a `SceneDocument`
//!
//! The JSON is read as a plain tree first, so the extensions the encoder
//! writes can be resolved before the gltf crate validates the asset:
//! `EXT_meshopt_compression` views are decompressed into a new buffer,
//! `KHR_mesh_quantization` accessors are read into the normalized integer
//! streams, and `KHR_texture_transform` lands on the texture refs.
//!
//! Only self-contained assets are accepted: buffers and images must live in
//! the GLB binary chunk or in `data:` URIs. Tangents, skins, animations,
//! morph targets and cameras are dropped.

use crate::document::*;
use crate::encode::{EXT_MESHOPT, KHR_QUANTIZATION, KHR_TEXTURE_TRANSFORM};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use gltf::accessor::DataType;
use petcast_core::{PetcastError, Result};
use serde_json::{json, Value};
use std::borrow::Cow;

/// Extensions an asset may list as required
const SUPPORTED_EXTENSIONS: [&str; 3] = [EXT_MESHOPT, KHR_QUANTIZATION, KHR_TEXTURE_TRANSFORM];

/// Decode a binary (GLB) or JSON glTF asset held in memory
pub fn decode_gltf(bytes: &[u8]) -> Result<SceneDocument> {
    let (mut root, blob) = split_container(bytes)?;
    take_extensions(&mut root)?;
    let mut buffers = load_buffers(&root, blob)?;
    decompress_views(&mut root, &mut buffers)?;
    let material_json: Vec<Value> = root
        .get("materials")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let root: gltf::json::Root = serde_json::from_value(root).map_err(parse_error)?;
    let document = gltf::Document::from_json(root).map_err(parse_error)?;

    let mut meshes = Vec::new();
    for mesh in document.meshes() {
        let mut primitives = Vec::new();
        for primitive in mesh.primitives() {
            if let Some(decoded) = decode_primitive(&primitive, &buffers, mesh.index())? {
                primitives.push(decoded);
            }
        }
        meshes.push(Mesh {
            name: mesh.name().map(String::from),
            primitives,
        });
    }

    let mut images = Vec::new();
    for image in document.images() {
        images.push(decode_image(&image, &buffers)?);
    }

    let textures = document
        .textures()
        .map(|texture| {
            let sampler = texture.sampler();
            Texture {
                name: texture.name().map(String::from),
                source: texture.source().index(),
                sampler: Sampler {
                    mag_filter: sampler.mag_filter().map(|f| f.as_gl_enum()),
                    min_filter: sampler.min_filter().map(|f| f.as_gl_enum()),
                    wrap_s: sampler.wrap_s().as_gl_enum(),
                    wrap_t: sampler.wrap_t().as_gl_enum(),
                },
            }
        })
        .collect();

    let materials = document
        .materials()
        .map(|m| {
            let json = m.index().and_then(|i| material_json.get(i));
            decode_material(&m, json.unwrap_or(&Value::Null))
        })
        .collect();

    let nodes = document
        .nodes()
        .map(|node| Node {
            name: node.name().map(String::from),
            transform: match node.transform() {
                gltf::scene::Transform::Matrix { matrix } => NodeTransform::Matrix(matrix),
                gltf::scene::Transform::Decomposed {
                    translation,
                    rotation,
                    scale,
                } => NodeTransform::Trs {
                    translation,
                    rotation,
                    scale,
                },
            },
            mesh: node.mesh().map(|m| m.index()),
            children: node.children().map(|c| c.index()).collect(),
        })
        .collect();

    let scenes = document
        .scenes()
        .map(|scene| Scene {
            name: scene.name().map(String::from),
            nodes: scene.nodes().map(|n| n.index()).collect(),
        })
        .collect();

    Ok(SceneDocument {
        scenes,
        default_scene: document.default_scene().map(|s| s.index()),
        nodes,
        meshes,
        materials,
        textures,
        images,
    })
}

fn parse_error(e: impl std::fmt::Display) -> PetcastError {
    PetcastError::DecodeError(format!("Failed to parse glTF: {}", e))
}

fn decode_error(message: String) -> PetcastError {
    PetcastError::DecodeError(message)
}

/// JSON tree and binary chunk of a GLB, or the tree of a JSON asset
fn split_container(bytes: &[u8]) -> Result<(Value, Option<Vec<u8>>)> {
    if bytes.starts_with(b"glTF") {
        let glb = gltf::binary::Glb::from_slice(bytes).map_err(parse_error)?;
        let root = serde_json::from_slice(&glb.json).map_err(parse_error)?;
        Ok((root, glb.bin.map(Cow::into_owned)))
    } else {
        Ok((serde_json::from_slice(bytes).map_err(parse_error)?, None))
    }
}

/// Reject unknown required extensions and drop the ones handled here from
/// the extension lists, so validation does not see them
fn take_extensions(root: &mut Value) -> Result<()> {
    if let Some(required) = root.get("extensionsRequired").and_then(Value::as_array) {
        let unsupported: Vec<&str> = required
            .iter()
            .filter_map(Value::as_str)
            .filter(|name| !SUPPORTED_EXTENSIONS.contains(name))
            .collect();
        if !unsupported.is_empty() {
            return Err(decode_error(format!(
                "Unsupported required extensions: {}",
                unsupported.join(", ")
            )));
        }
    }
    for key in ["extensionsRequired", "extensionsUsed"] {
        if let Some(list) = root.get_mut(key).and_then(Value::as_array_mut) {
            list.retain(|name| !name.as_str().is_some_and(|n| SUPPORTED_EXTENSIONS.contains(&n)));
        }
    }
    Ok(())
}

fn usize_field(value: &Value, key: &str) -> Option<usize> {
    value.get(key).and_then(Value::as_u64).map(|v| v as usize)
}

fn is_meshopt_fallback(buffer: &Value) -> bool {
    buffer
        .get("extensions")
        .and_then(|e| e.get(EXT_MESHOPT))
        .and_then(|e| e.get("fallback"))
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

/// Resolve every buffer to its bytes. The GLB binary chunk backs the first
/// buffer without a URI; meshopt fallback buffers carry no data.
fn load_buffers(root: &Value, mut blob: Option<Vec<u8>>) -> Result<Vec<Vec<u8>>> {
    let Some(list) = root.get("buffers").and_then(Value::as_array) else {
        return Ok(Vec::new());
    };

    let mut buffers = Vec::with_capacity(list.len());
    for (index, buffer) in list.iter().enumerate() {
        if is_meshopt_fallback(buffer) {
            buffers.push(Vec::new());
            continue;
        }
        let data = match buffer.get("uri").and_then(Value::as_str) {
            Some(uri) => match parse_data_uri(uri) {
                Some((_, data)) => data,
                None => {
                    return Err(decode_error(format!(
                        "Buffer {} references an external file, only embedded buffers are supported",
                        index
                    )))
                }
            },
            None => blob.take().ok_or_else(|| {
                decode_error(format!("Buffer {} has no URI and no binary chunk", index))
            })?,
        };
        let declared = usize_field(buffer, "byteLength").unwrap_or(0);
        if data.len() < declared {
            return Err(decode_error(format!(
                "Buffer {} holds {} bytes, expected {}",
                index,
                data.len(),
                declared
            )));
        }
        buffers.push(data);
    }
    Ok(buffers)
}

/// Decompress every `EXT_meshopt_compression` view into one new buffer and
/// point the views at their plain bytes
fn decompress_views(root: &mut Value, buffers: &mut Vec<Vec<u8>>) -> Result<()> {
    let target = buffers.len();
    let mut decoded: Vec<u8> = Vec::new();
    let mut touched = false;

    if let Some(views) = root.get_mut("bufferViews").and_then(Value::as_array_mut) {
        for (index, view) in views.iter_mut().enumerate() {
            let Some(view) = view.as_object_mut() else {
                continue;
            };
            let Some(ext) = view
                .get_mut("extensions")
                .and_then(Value::as_object_mut)
                .and_then(|e| e.remove(EXT_MESHOPT))
            else {
                continue;
            };

            let data = decompress_view(index, &ext, buffers)?;
            while decoded.len() % 4 != 0 {
                decoded.push(0);
            }
            view.insert("buffer".into(), json!(target));
            view.insert("byteOffset".into(), json!(decoded.len()));
            view.insert("byteLength".into(), json!(data.len()));
            decoded.extend_from_slice(&data);
            touched = true;
        }
    }

    if touched {
        if let Some(list) = root.get_mut("buffers").and_then(Value::as_array_mut) {
            list.push(json!({"byteLength": decoded.len()}));
        }
        buffers.push(decoded);
    }
    Ok(())
}

fn decompress_view(index: usize, ext: &Value, buffers: &[Vec<u8>]) -> Result<Vec<u8>> {
    let (Some(buffer), Some(length), Some(stride), Some(count)) = (
        usize_field(ext, "buffer"),
        usize_field(ext, "byteLength"),
        usize_field(ext, "byteStride"),
        usize_field(ext, "count"),
    ) else {
        return Err(decode_error(format!(
            "Buffer view {}: incomplete {} description",
            index, EXT_MESHOPT
        )));
    };
    let offset = usize_field(ext, "byteOffset").unwrap_or(0);
    let mode = ext.get("mode").and_then(Value::as_str).unwrap_or_default();
    let filter = ext.get("filter").and_then(Value::as_str).unwrap_or("NONE");
    if filter != "NONE" {
        return Err(decode_error(format!(
            "Buffer view {}: meshopt filter {} is not supported",
            index, filter
        )));
    }

    let source = buffers
        .get(buffer)
        .and_then(|b| b.get(offset..offset.checked_add(length)?))
        .ok_or_else(|| {
            decode_error(format!(
                "Buffer view {}: compressed data points outside buffer {}",
                index, buffer
            ))
        })?;

    match (mode, stride) {
        ("ATTRIBUTES", 4) => vertex_rows::<4>(source, count),
        ("ATTRIBUTES", 8) => vertex_rows::<8>(source, count),
        ("ATTRIBUTES", 12) => vertex_rows::<12>(source, count),
        ("ATTRIBUTES", 16) => vertex_rows::<16>(source, count),
        ("ATTRIBUTES", 20) => vertex_rows::<20>(source, count),
        ("ATTRIBUTES", 24) => vertex_rows::<24>(source, count),
        ("ATTRIBUTES", 28) => vertex_rows::<28>(source, count),
        ("ATTRIBUTES", 32) => vertex_rows::<32>(source, count),
        ("TRIANGLES", 2) => meshopt::decode_index_buffer::<u16>(source, count)
            .map(|i| i.into_iter().flat_map(u16::to_le_bytes).collect())
            .map_err(|e| decode_error(format!("meshopt index decode failed: {:?}", e))),
        ("TRIANGLES", 4) => meshopt::decode_index_buffer::<u32>(source, count)
            .map(|i| i.into_iter().flat_map(u32::to_le_bytes).collect())
            .map_err(|e| decode_error(format!("meshopt index decode failed: {:?}", e))),
        (mode, stride) => Err(decode_error(format!(
            "Buffer view {}: meshopt mode {:?} with stride {} is not supported",
            index, mode, stride
        ))),
    }
}

fn vertex_rows<const N: usize>(source: &[u8], count: usize) -> Result<Vec<u8>>
where
    [u8; N]: Default,
{
    let rows = meshopt::decode_vertex_buffer::<[u8; N]>(source, count)
        .map_err(|e| decode_error(format!("meshopt vertex decode failed: {:?}", e)))?;
    Ok(rows.into_iter().flatten().collect())
}

/// Component values of an accessor as stored, element after element
struct AccessorData {
    values: Vec<f64>,
    components: usize,
    data_type: DataType,
    normalized: bool,
}

impl AccessorData {
    fn rows<T, const N: usize>(&self, convert: impl Fn(f64) -> T) -> Vec<[T; N]> {
        self.values
            .chunks_exact(self.components)
            .map(|c| std::array::from_fn(|i| convert(c[i])))
            .collect()
    }

    /// Value as a renderer reads it
    fn value(&self, v: f64) -> f32 {
        if !self.normalized {
            return v as f32;
        }
        let v = match self.data_type {
            DataType::I8 => (v / 127.0).max(-1.0),
            DataType::U8 => v / 255.0,
            DataType::I16 => (v / 32767.0).max(-1.0),
            DataType::U16 => v / 65535.0,
            DataType::U32 | DataType::F32 => v,
        };
        v as f32
    }
}

fn read_accessor(accessor: &gltf::Accessor<'_>, buffers: &[Vec<u8>]) -> Result<AccessorData> {
    let index = accessor.index();
    if accessor.sparse().is_some() {
        return Err(decode_error(format!(
            "Accessor {}: sparse accessors are not supported",
            index
        )));
    }
    let view = accessor
        .view()
        .ok_or_else(|| decode_error(format!("Accessor {} has no buffer view", index)))?;

    let data_type = accessor.data_type();
    let components = accessor.dimensions().multiplicity();
    let size = data_type.size();
    let element = size * components;
    let stride = view.stride().unwrap_or(element);
    let count = accessor.count();

    let data = buffers
        .get(view.buffer().index())
        .and_then(|b| b.get(view.offset()..view.offset().checked_add(view.length())?))
        .ok_or_else(|| {
            decode_error(format!(
                "Accessor {}: buffer view {} points outside its buffer",
                index,
                view.index()
            ))
        })?;
    let end = count
        .checked_sub(1)
        .map_or(Some(0), |last| {
            last.checked_mul(stride)?
                .checked_add(accessor.offset())?
                .checked_add(element)
        });
    if end.map_or(true, |end| end > data.len()) {
        return Err(decode_error(format!(
            "Accessor {}: {} elements do not fit buffer view {}",
            index,
            count,
            view.index()
        )));
    }

    let mut values = Vec::with_capacity(count * components);
    for i in 0..count {
        let start = accessor.offset() + i * stride;
        values.extend(
            data[start..start + element]
                .chunks_exact(size)
                .map(|c| component(c, data_type)),
        );
    }
    Ok(AccessorData {
        values,
        components,
        data_type,
        normalized: accessor.normalized(),
    })
}

fn component(bytes: &[u8], data_type: DataType) -> f64 {
    match data_type {
        DataType::I8 => bytes[0] as i8 as f64,
        DataType::U8 => bytes[0] as f64,
        DataType::I16 => i16::from_le_bytes([bytes[0], bytes[1]]) as f64,
        DataType::U16 => u16::from_le_bytes([bytes[0], bytes[1]]) as f64,
        DataType::U32 => u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f64,
        DataType::F32 => f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f64,
    }
}

/// Read a vertex stream, keeping the integer layouts the encoder writes and
/// converting everything else to floats
fn read_attribute(
    semantic: Semantic,
    accessor: &gltf::Accessor<'_>,
    buffers: &[Vec<u8>],
) -> Result<VertexAttribute> {
    let data = read_accessor(accessor, buffers)?;
    let float = |v: f64| data.value(v);
    let attribute = match (semantic, data.components, data.data_type, data.normalized) {
        (Semantic::Position | Semantic::Normal, 3, DataType::I16, true) => {
            VertexAttribute::I16x3(data.rows(|v| v as i16))
        }
        (Semantic::Normal, 3, DataType::I8, true) => VertexAttribute::I8x3(data.rows(|v| v as i8)),
        (Semantic::TexCoord(_), 2, DataType::U16, true) => {
            VertexAttribute::U16x2(data.rows(|v| v as u16))
        }
        (Semantic::Color(_), 4, DataType::U8, true) => VertexAttribute::U8x4(data.rows(|v| v as u8)),
        (Semantic::Color(_), 4, DataType::U16, true) => {
            VertexAttribute::U16x4(data.rows(|v| v as u16))
        }
        (Semantic::Position | Semantic::Normal, 3, ..) => VertexAttribute::F32x3(data.rows(float)),
        (Semantic::TexCoord(_), 2, ..) => VertexAttribute::F32x2(data.rows(float)),
        (Semantic::Color(_), 4, ..) => VertexAttribute::F32x4(data.rows(float)),
        (Semantic::Color(_), 3, ..) => VertexAttribute::F32x4(
            data.rows::<f32, 3>(float)
                .into_iter()
                .map(|[r, g, b]| [r, g, b, 1.0])
                .collect(),
        ),
        _ => {
            return Err(decode_error(format!(
                "Accessor {}: unsupported layout for {}",
                accessor.index(),
                semantic.gltf_name()
            )))
        }
    };
    Ok(attribute)
}

fn read_indices(accessor: &gltf::Accessor<'_>, buffers: &[Vec<u8>]) -> Result<Vec<u32>> {
    let data = read_accessor(accessor, buffers)?;
    match (data.components, data.data_type) {
        (1, DataType::U8 | DataType::U16 | DataType::U32) => {
            Ok(data.values.iter().map(|&i| i as u32).collect())
        }
        _ => Err(decode_error(format!(
            "Accessor {}: indices must be unsigned scalars",
            accessor.index()
        ))),
    }
}

fn decode_primitive(
    primitive: &gltf::Primitive<'_>,
    buffers: &[Vec<u8>],
    mesh_index: usize,
) -> Result<Option<Primitive>> {
    if primitive.get(&gltf::Semantic::Positions).is_none() {
        log::warn!("Skipping primitive without positions in mesh {}", mesh_index);
        return Ok(None);
    }

    let mut attributes = Vec::new();
    for (semantic, accessor) in primitive.attributes() {
        let semantic = match semantic {
            gltf::Semantic::Positions => Semantic::Position,
            gltf::Semantic::Normals => Semantic::Normal,
            gltf::Semantic::TexCoords(set) => Semantic::TexCoord(set),
            gltf::Semantic::Colors(set) => Semantic::Color(set),
            _ => continue,
        };
        attributes.push((semantic, read_attribute(semantic, &accessor, buffers)?));
    }
    attributes.sort_by_key(|(semantic, _)| *semantic);

    let vertex_count = attributes.first().map_or(0, |(_, a)| a.len());
    if let Some((semantic, _)) = attributes.iter().find(|(_, a)| a.len() != vertex_count) {
        return Err(PetcastError::DecodeError(format!(
            "Mesh {}: {} count does not match {} positions",
            mesh_index,
            semantic.gltf_name(),
            vertex_count
        )));
    }

    let indices = match primitive.indices() {
        Some(accessor) => Some(read_indices(&accessor, buffers)?),
        None => None,
    };
    if let Some(bad) = indices
        .as_ref()
        .and_then(|idx| idx.iter().find(|&&i| i as usize >= vertex_count))
    {
        return Err(PetcastError::DecodeError(format!(
            "Mesh {}: index {} out of range for {} vertices",
            mesh_index, bad, vertex_count
        )));
    }

    Ok(Some(Primitive {
        mode: primitive.mode().as_gl_enum(),
        material: primitive.material().index(),
        attributes,
        indices,
    }))
}

fn decode_image(image: &gltf::Image<'_>, buffers: &[Vec<u8>]) -> Result<Image> {
    let (bytes, declared_mime) = match image.source() {
        gltf::image::Source::View { view, mime_type } => {
            let data = buffers
                .get(view.buffer().index())
                .and_then(|b| b.get(view.offset()..view.offset() + view.length()))
                .ok_or_else(|| {
                    PetcastError::DecodeError(format!(
                        "Image {} points outside its buffer",
                        image.index()
                    ))
                })?;
            (data.to_vec(), Some(mime_type.to_string()))
        }
        gltf::image::Source::Uri { uri, mime_type } => {
            let (uri_mime, data) = parse_data_uri(uri).ok_or_else(|| {
                PetcastError::DecodeError(format!(
                    "Image {} references an external file, only embedded images are supported",
                    image.index()
                ))
            })?;
            (data, mime_type.map(String::from).or(uri_mime))
        }
    };

    let mime_type = declared_mime
        .filter(|m| m.starts_with("image/"))
        .or_else(|| {
            image::guess_format(&bytes)
                .ok()
                .map(|f| f.to_mime_type().to_string())
        })
        .unwrap_or_else(|| "application/octet-stream".to_string());

    Ok(Image {
        name: image.name().map(String::from),
        mime_type,
        bytes,
    })
}

/// Split a base64 `data:` URI into its MIME type and payload
fn parse_data_uri(uri: &str) -> Option<(Option<String>, Vec<u8>)> {
    let rest = uri.strip_prefix("data:")?;
    let (header, payload) = rest.split_once(',')?;
    let mime = header.strip_suffix(";base64")?;
    let data = BASE64.decode(payload).ok()?;
    let mime = (!mime.is_empty()).then(|| mime.to_string());
    Some((mime, data))
}

/// `KHR_texture_transform` of a texture slot, with its texCoord override
fn uv_transform(slot: &Value) -> Option<(UvTransform, Option<u32>)> {
    let ext = slot.get("extensions")?.get(KHR_TEXTURE_TRANSFORM)?;
    let pair = |key: &str, default: [f32; 2]| {
        ext.get(key)
            .and_then(Value::as_array)
            .and_then(|a| Some([a.first()?.as_f64()? as f32, a.get(1)?.as_f64()? as f32]))
            .unwrap_or(default)
    };
    let transform = UvTransform {
        offset: pair("offset", [0.0, 0.0]),
        rotation: ext.get("rotation").and_then(Value::as_f64).unwrap_or(0.0) as f32,
        scale: pair("scale", [1.0, 1.0]),
    };
    let tex_coord = ext.get("texCoord").and_then(Value::as_u64).map(|s| s as u32);
    Some((transform, tex_coord))
}

fn decode_material(material: &gltf::Material<'_>, json: &Value) -> Material {
    let pbr = material.pbr_metallic_roughness();
    let slot = |pointer: &str, texture: usize, tex_coord: u32, scale: f32| {
        let mut texture_ref = TextureRef {
            texture,
            tex_coord,
            scale,
            transform: None,
        };
        if let Some((transform, tex_coord)) = json.pointer(pointer).and_then(uv_transform) {
            texture_ref.transform = (!transform.is_identity()).then_some(transform);
            texture_ref.tex_coord = tex_coord.unwrap_or(texture_ref.tex_coord);
        }
        texture_ref
    };
    let info_ref = |pointer: &str, info: gltf::texture::Info<'_>| {
        slot(pointer, info.texture().index(), info.tex_coord(), 1.0)
    };

    Material {
        name: material.name().map(String::from),
        base_color_factor: pbr.base_color_factor(),
        base_color_texture: pbr
            .base_color_texture()
            .map(|i| info_ref("/pbrMetallicRoughness/baseColorTexture", i)),
        metallic_factor: pbr.metallic_factor(),
        roughness_factor: pbr.roughness_factor(),
        metallic_roughness_texture: pbr
            .metallic_roughness_texture()
            .map(|i| info_ref("/pbrMetallicRoughness/metallicRoughnessTexture", i)),
        normal_texture: material.normal_texture().map(|n| {
            slot("/normalTexture", n.texture().index(), n.tex_coord(), n.scale())
        }),
        occlusion_texture: material.occlusion_texture().map(|o| {
            slot("/occlusionTexture", o.texture().index(), o.tex_coord(), o.strength())
        }),
        emissive_texture: material
            .emissive_texture()
            .map(|i| info_ref("/emissiveTexture", i)),
        emissive_factor: material.emissive_factor(),
        alpha_mode: match material.alpha_mode() {
            gltf::material::AlphaMode::Opaque => AlphaMode::Opaque,
            gltf::material::AlphaMode::Mask => AlphaMode::Mask,
            gltf::material::AlphaMode::Blend => AlphaMode::Blend,
        },
        alpha_cutoff: material.alpha_cutoff(),
        double_sided: material.double_sided(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::*;

    #[test]
    fn test_decode_fixture() {
        let doc = decode_gltf(&textured_cube_glb()).unwrap();
        assert_eq!(doc.meshes.len(), 1);
        assert_eq!(doc.nodes.len(), 1);
        assert_eq!(doc.scenes.len(), 1);
        assert_eq!(doc.default_scene, Some(0));

        let prim = &doc.meshes[0].primitives[0];
        assert_eq!(prim.mode, MODE_TRIANGLES);
        assert_eq!(prim.vertex_count(), 24);
        assert_eq!(prim.indices.as_ref().map(Vec::len), Some(36));
        assert!(prim.attribute(Semantic::Normal).is_some());
        assert!(prim.attribute(Semantic::TexCoord(0)).is_some());
        assert_eq!(prim.material, Some(0));

        assert_eq!(doc.images.len(), 1);
        assert_eq!(doc.images[0].mime_type, "image/png");
        assert_eq!(doc.textures[0].source, 0);
        assert_eq!(
            doc.materials[0].base_color_texture.map(|t| t.texture),
            Some(0)
        );
        assert_eq!(doc.materials[0].base_color_texture.and_then(|t| t.transform), None);
    }

    #[test]
    fn test_garbage_is_decode_error() {
        assert!(matches!(
            decode_gltf(b"definitely not a model"),
            Err(PetcastError::DecodeError(_))
        ));
        // valid header, truncated body
        let glb = textured_cube_glb();
        assert!(decode_gltf(&glb[..40]).is_err());
    }

    #[test]
    fn test_external_buffer_rejected() {
        let json = br#"{
            "asset": {"version": "2.0"},
            "buffers": [{"uri": "model.bin", "byteLength": 12}]
        }"#;
        assert!(matches!(
            decode_gltf(json),
            Err(PetcastError::DecodeError(_))
        ));
    }

    #[test]
    fn test_unknown_required_extension_rejected() {
        let json = br#"{
            "asset": {"version": "2.0"},
            "extensionsUsed": ["KHR_draco_mesh_compression", "EXT_meshopt_compression"],
            "extensionsRequired": ["KHR_draco_mesh_compression", "EXT_meshopt_compression"]
        }"#;
        match decode_gltf(json) {
            Err(PetcastError::DecodeError(message)) => {
                assert!(message.contains("KHR_draco_mesh_compression"));
                assert!(!message.contains("EXT_meshopt_compression"));
            }
            other => panic!("expected decode error, got {:?}", other),
        }
    }

    #[test]
    fn test_handled_extensions_accepted() {
        let json = br#"{
            "asset": {"version": "2.0"},
            "extensionsUsed": ["EXT_meshopt_compression", "KHR_mesh_quantization"],
            "extensionsRequired": ["EXT_meshopt_compression", "KHR_mesh_quantization"]
        }"#;
        let doc = decode_gltf(json).unwrap();
        assert!(doc.meshes.is_empty());
    }

    #[test]
    fn test_meshopt_views_decompressed() {
        let positions = [[0.0f32, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]];
        let rows: Vec<[u8; 12]> = positions
            .iter()
            .map(|p| {
                let mut row = [0u8; 12];
                for (i, c) in p.iter().enumerate() {
                    row[i * 4..i * 4 + 4].copy_from_slice(&c.to_le_bytes());
                }
                row
            })
            .collect();
        let encoded = meshopt::encode_vertex_buffer(&rows).unwrap();
        let indices = meshopt::encode_index_buffer(&[0, 1, 2], 3).unwrap();
        let mut bin = encoded.clone();
        while bin.len() % 4 != 0 {
            bin.push(0);
        }
        let index_offset = bin.len();
        bin.extend_from_slice(&indices);

        let root = json!({
            "asset": {"version": "2.0"},
            "extensionsUsed": [EXT_MESHOPT],
            "extensionsRequired": [EXT_MESHOPT],
            "buffers": [
                {"byteLength": bin.len()},
                {"byteLength": 48, "extensions": {EXT_MESHOPT: {"fallback": true}}}
            ],
            "bufferViews": [
                {
                    "buffer": 1, "byteOffset": 0, "byteLength": 36, "byteStride": 12,
                    "extensions": {EXT_MESHOPT: {
                        "buffer": 0, "byteOffset": 0, "byteLength": encoded.len(),
                        "byteStride": 12, "count": 3, "mode": "ATTRIBUTES"
                    }}
                },
                {
                    "buffer": 1, "byteOffset": 36, "byteLength": 6,
                    "extensions": {EXT_MESHOPT: {
                        "buffer": 0, "byteOffset": index_offset, "byteLength": indices.len(),
                        "byteStride": 2, "count": 3, "mode": "TRIANGLES"
                    }}
                }
            ],
            "accessors": [
                {"bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3",
                 "min": [0, 0, 0], "max": [1, 1, 0]},
                {"bufferView": 1, "componentType": 5123, "count": 3, "type": "SCALAR"}
            ],
            "meshes": [{"primitives": [{"attributes": {"POSITION": 0}, "indices": 1}]}]
        });
        let glb = glb_from_parts(&root, bin);

        let doc = decode_gltf(&glb).unwrap();
        let prim = &doc.meshes[0].primitives[0];
        assert_eq!(prim.positions().unwrap(), &positions[..]);
        assert_eq!(prim.indices, Some(vec![0, 1, 2]));
    }

    #[test]
    fn test_meshopt_filters_rejected() {
        let json = br#"{
            "asset": {"version": "2.0"},
            "buffers": [{"byteLength": 8, "uri": "data:application/octet-stream;base64,AAAAAAAAAAA="}],
            "bufferViews": [{
                "buffer": 0, "byteLength": 8, "byteStride": 8,
                "extensions": {"EXT_meshopt_compression": {
                    "buffer": 0, "byteLength": 8, "byteStride": 8, "count": 1,
                    "mode": "ATTRIBUTES", "filter": "OCTAHEDRAL"
                }}
            }]
        }"#;
        match decode_gltf(json) {
            Err(PetcastError::DecodeError(message)) => assert!(message.contains("OCTAHEDRAL")),
            other => panic!("expected decode error, got {:?}", other),
        }
    }

    #[test]
    fn test_quantized_streams_keep_their_layout() {
        // padded i16 positions, u16 UVs, u8 colors
        let mut bin: Vec<u8> = [[-32767i16, 0, 0, 0], [32767, 0, 0, 0], [0, 32767, 0, 0]]
            .iter()
            .flatten()
            .flat_map(|c| c.to_le_bytes())
            .collect();
        bin.extend(
            [[0u16, 0], [65535, 0], [0, 65535]]
                .iter()
                .flatten()
                .flat_map(|c| c.to_le_bytes()),
        );
        bin.extend([255u8, 0, 0, 255, 0, 255, 0, 255, 0, 0, 255, 128]);

        let root = json!({
            "asset": {"version": "2.0"},
            "extensionsUsed": [KHR_QUANTIZATION],
            "extensionsRequired": [KHR_QUANTIZATION],
            "buffers": [{"byteLength": bin.len()}],
            "bufferViews": [
                {"buffer": 0, "byteOffset": 0, "byteLength": 24, "byteStride": 8},
                {"buffer": 0, "byteOffset": 24, "byteLength": 12},
                {"buffer": 0, "byteOffset": 36, "byteLength": 12}
            ],
            "accessors": [
                {"bufferView": 0, "componentType": 5122, "normalized": true, "count": 3,
                 "type": "VEC3", "min": [-32767, 0, 0], "max": [32767, 32767, 0]},
                {"bufferView": 1, "componentType": 5123, "normalized": true, "count": 3,
                 "type": "VEC2"},
                {"bufferView": 2, "componentType": 5121, "normalized": true, "count": 3,
                 "type": "VEC4"}
            ],
            "meshes": [{"primitives": [{"attributes": {"POSITION": 0, "TEXCOORD_0": 1, "COLOR_0": 2}}]}]
        });
        let glb = glb_from_parts(&root, bin);

        let doc = decode_gltf(&glb).unwrap();
        let prim = &doc.meshes[0].primitives[0];
        assert_eq!(
            prim.attribute(Semantic::Position),
            Some(&VertexAttribute::I16x3(vec![[-32767, 0, 0], [32767, 0, 0], [0, 32767, 0]]))
        );
        assert_eq!(
            prim.attribute(Semantic::TexCoord(0)),
            Some(&VertexAttribute::U16x2(vec![[0, 0], [65535, 0], [0, 65535]]))
        );
        let colors = prim.attribute(Semantic::Color(0)).unwrap();
        assert!(matches!(colors, VertexAttribute::U8x4(_)));
        assert_eq!(colors.value(2, 3), 128.0 / 255.0);
        assert_eq!(prim.bounds().unwrap().max, [1.0, 1.0, 0.0]);
    }

    #[test]
    fn test_texture_transform_read() {
        let slot = json!({
            "index": 0,
            "extensions": {KHR_TEXTURE_TRANSFORM: {
                "offset": [0.25, -1.0], "scale": [2.0, 3.0], "texCoord": 1
            }}
        });
        let (transform, tex_coord) = uv_transform(&slot).unwrap();
        assert_eq!(transform.offset, [0.25, -1.0]);
        assert_eq!(transform.scale, [2.0, 3.0]);
        assert_eq!(transform.rotation, 0.0);
        assert_eq!(tex_coord, Some(1));
        assert!(uv_transform(&json!({"index": 0})).is_none());
    }

    #[test]
    fn test_data_uri() {
        let (mime, data) = parse_data_uri("data:image/png;base64,AAEC").unwrap();
        assert_eq!(mime.as_deref(), Some("image/png"));
        assert_eq!(data, vec![0, 1, 2]);
        assert!(parse_data_uri("textures/albedo.png").is_none());
    }
}
