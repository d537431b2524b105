//! Vertex attribute quantization
//!
//! Positions are normalized per mesh around the bounding-box centre with a
//! single uniform scale and stored as normalized `i16`. The dequantization
//! transform is carried by a new child node, so each node that referenced
//! the mesh now references it through that child. Normals, texture
//! coordinates and colors become normalized integers as well. A UV set that
//! leaves `[0, 1]` is remapped onto it per material, and the material's
//! texture refs get the inverse as a `KHR_texture_transform`. Every value is
//! snapped to the configured bit depth before storage.

use crate::document::{
    MeshBounds, Node, NodeTransform, Primitive, SceneDocument, Semantic, UvTransform,
    VertexAttribute,
};
use petcast_core::config::TranscodeConfig;
use std::collections::HashMap;

/// Counts of streams converted to integers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QuantizeReport {
    pub positions: usize,
    pub normals: usize,
    pub tex_coords: usize,
    pub colors: usize,
    /// UV sets quantized through a texture transform
    pub tex_coords_remapped: usize,
    /// Out-of-range UV sets whose material already rotates them
    pub tex_coords_kept_float: usize,
}

impl QuantizeReport {
    pub fn total(&self) -> usize {
        self.positions + self.normals + self.tex_coords + self.colors
    }
}

/// Quantize every mesh in the document
pub fn quantize_document(doc: &mut SceneDocument, config: &TranscodeConfig) -> QuantizeReport {
    let mut report = QuantizeReport::default();
    let uv_plans = plan_uvs(doc);

    for mesh_index in 0..doc.meshes.len() {
        let mesh = &mut doc.meshes[mesh_index];
        // quantized positions are left alone, so a second pass adds no node
        let bounds = mesh
            .primitives
            .iter()
            .filter_map(|p| p.positions().and_then(MeshBounds::from_positions))
            .reduce(|a, b| a.union(&b));

        for primitive in &mut mesh.primitives {
            quantize_streams(primitive, config, &uv_plans, &mut report);
        }

        let Some(bounds) = bounds else {
            continue;
        };
        let (center, half) = position_frame(&bounds);
        for primitive in &mut mesh.primitives {
            if quantize_positions(primitive, center, half, config.position_bits) {
                report.positions += 1;
            }
        }
        attach_dequantization(doc, mesh_index, center, half);
    }

    attach_uv_transforms(doc, &uv_plans);
    report
}

/// UV sets are keyed by the material that samples them
type UvKey = (Option<usize>, u32);

/// How one UV set of one material is stored
#[derive(Debug, Clone, Copy, PartialEq)]
enum UvPlan {
    Direct,
    /// Stored as `(uv - min) / size`
    Remap { min: [f32; 2], size: [f32; 2] },
    KeepFloat,
}

fn plan_uvs(doc: &SceneDocument) -> HashMap<UvKey, UvPlan> {
    let mut ranges: HashMap<UvKey, ([f32; 2], [f32; 2])> = HashMap::new();
    for primitive in doc.primitives() {
        for (semantic, attribute) in &primitive.attributes {
            let (Semantic::TexCoord(set), VertexAttribute::F32x2(uvs)) = (semantic, attribute) else {
                continue;
            };
            if uvs.is_empty() {
                continue;
            }
            let (min, max) = ranges
                .entry((primitive.material, *set))
                .or_insert(([f32::MAX; 2], [f32::MIN; 2]));
            for uv in uvs {
                for c in 0..2 {
                    min[c] = min[c].min(uv[c]);
                    max[c] = max[c].max(uv[c]);
                }
            }
        }
    }

    ranges
        .into_iter()
        .map(|(key, (min, max))| {
            let plan = if (0..2).all(|c| min[c] >= 0.0 && max[c] <= 1.0) {
                UvPlan::Direct
            } else if is_rotated(doc, key) {
                UvPlan::KeepFloat
            } else {
                UvPlan::Remap {
                    min,
                    size: [max[0] - min[0], max[1] - min[1]],
                }
            };
            (key, plan)
        })
        .collect()
}

fn is_rotated(doc: &SceneDocument, (material, set): UvKey) -> bool {
    material.and_then(|m| doc.materials.get(m)).is_some_and(|m| {
        m.texture_refs().any(|t| {
            t.tex_coord == set && t.transform.is_some_and(|x| x.rotation != 0.0)
        })
    })
}

/// Give every texture ref that samples a remapped set the inverse mapping
fn attach_uv_transforms(doc: &mut SceneDocument, plans: &HashMap<UvKey, UvPlan>) {
    for (&(material, set), plan) in plans {
        let UvPlan::Remap { min, size } = *plan else {
            continue;
        };
        let Some(material) = material.and_then(|m| doc.materials.get_mut(m)) else {
            continue;
        };
        for texture_ref in material.texture_refs_mut().filter(|t| t.tex_coord == set) {
            let current = texture_ref.transform.unwrap_or(UvTransform::IDENTITY);
            texture_ref.transform = current.then_from_unit(min, size);
        }
    }
}

/// Centre and uniform half extent used to normalize positions
fn position_frame(bounds: &MeshBounds) -> ([f32; 3], f32) {
    let size = bounds.size();
    let extent = size[0].max(size[1]).max(size[2]);
    let half = if extent > 0.0 { extent * 0.5 } else { 1.0 };
    (bounds.center(), half)
}

fn quantize_positions(primitive: &mut Primitive, center: [f32; 3], half: f32, bits: u8) -> bool {
    let Some(positions) = primitive.positions() else {
        return false;
    };
    let quantized = positions
        .iter()
        .map(|p| {
            [0, 1, 2].map(|i| snap_signed((p[i] - center[i]) / half, bits, i16::MAX as f32) as i16)
        })
        .collect();
    replace(primitive, Semantic::Position, VertexAttribute::I16x3(quantized));
    true
}

fn quantize_streams(
    primitive: &mut Primitive,
    config: &TranscodeConfig,
    uv_plans: &HashMap<UvKey, UvPlan>,
    report: &mut QuantizeReport,
) {
    let material = primitive.material;
    for (semantic, attribute) in &mut primitive.attributes {
        match (*semantic, &*attribute) {
            (Semantic::Normal, VertexAttribute::F32x3(normals)) => {
                let bits = config.normal_bits;
                *attribute = if bits <= 8 {
                    VertexAttribute::I8x3(
                        normals
                            .iter()
                            .map(|n| n.map(|c| snap_signed(c, bits, i8::MAX as f32) as i8))
                            .collect(),
                    )
                } else {
                    VertexAttribute::I16x3(
                        normals
                            .iter()
                            .map(|n| n.map(|c| snap_signed(c, bits, i16::MAX as f32) as i16))
                            .collect(),
                    )
                };
                report.normals += 1;
            }
            (Semantic::TexCoord(set), VertexAttribute::F32x2(uvs)) => {
                let (min, size) = match uv_plans.get(&(material, set)) {
                    Some(UvPlan::KeepFloat) => {
                        report.tex_coords_kept_float += 1;
                        continue;
                    }
                    Some(UvPlan::Remap { min, size }) => {
                        report.tex_coords_remapped += 1;
                        (*min, *size)
                    }
                    _ => ([0.0; 2], [1.0; 2]),
                };
                let unit = |c: f32, axis: usize| {
                    if size[axis] > 0.0 {
                        (c - min[axis]) / size[axis]
                    } else {
                        0.0
                    }
                };
                let bits = config.tex_coord_bits;
                *attribute = VertexAttribute::U16x2(
                    uvs.iter()
                        .map(|uv| {
                            [0, 1].map(|axis| {
                                snap_unsigned(unit(uv[axis], axis), bits, u16::MAX as f32) as u16
                            })
                        })
                        .collect(),
                );
                report.tex_coords += 1;
            }
            (Semantic::Color(_), VertexAttribute::F32x4(colors)) => {
                let bits = config.color_bits;
                *attribute = if bits <= 8 {
                    VertexAttribute::U8x4(
                        colors
                            .iter()
                            .map(|c| c.map(|v| snap_unsigned(v, bits, u8::MAX as f32) as u8))
                            .collect(),
                    )
                } else {
                    VertexAttribute::U16x4(
                        colors
                            .iter()
                            .map(|c| c.map(|v| snap_unsigned(v, bits, u16::MAX as f32) as u16))
                            .collect(),
                    )
                };
                report.colors += 1;
            }
            _ => {}
        }
    }
}

/// Move the mesh of every node that uses it onto a new child node whose
/// transform maps normalized positions back to model space
fn attach_dequantization(doc: &mut SceneDocument, mesh: usize, center: [f32; 3], half: f32) {
    let owners: Vec<usize> = doc
        .nodes
        .iter()
        .enumerate()
        .filter(|(_, n)| n.mesh == Some(mesh))
        .map(|(i, _)| i)
        .collect();

    for owner in owners {
        let child = doc.nodes.len();
        doc.nodes.push(Node {
            name: None,
            transform: NodeTransform::Trs {
                translation: center,
                rotation: [0.0, 0.0, 0.0, 1.0],
                scale: [half; 3],
            },
            mesh: Some(mesh),
            children: Vec::new(),
        });
        let parent = &mut doc.nodes[owner];
        parent.mesh = None;
        parent.children.push(child);
    }
}

fn replace(primitive: &mut Primitive, semantic: Semantic, attribute: VertexAttribute) {
    if let Some(slot) = primitive.attributes.iter_mut().find(|(s, _)| *s == semantic) {
        slot.1 = attribute;
    }
}

/// Snap `v` in [-1, 1] to a signed grid of `bits` and scale to `max`
fn snap_signed(v: f32, bits: u8, max: f32) -> f32 {
    let levels = ((1u32 << (bits - 1)) - 1) as f32;
    let snapped = (v.clamp(-1.0, 1.0) * levels).round() / levels;
    (snapped * max).round()
}

/// Snap `v` in [0, 1] to an unsigned grid of `bits` and scale to `max`
fn snap_unsigned(v: f32, bits: u8, max: f32) -> f32 {
    let levels = ((1u32 << bits) - 1) as f32;
    let snapped = (v.clamp(0.0, 1.0) * levels).round() / levels;
    (snapped * max).round()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::decode_gltf;
    use crate::document::{Material, Mesh, TextureRef};
    use crate::testing::*;

    fn dequantized_position(prim: &Primitive, node: &Node, i: usize) -> [f32; 3] {
        let NodeTransform::Trs {
            translation, scale, ..
        } = node.transform
        else {
            panic!("expected TRS");
        };
        let attr = prim.attribute(Semantic::Position).unwrap();
        [0, 1, 2].map(|c| translation[c] + scale[c] * attr.value(i, c))
    }

    #[test]
    fn test_positions_round_trip_within_grid_error() {
        let mut doc = decode_gltf(&textured_cube_glb()).unwrap();
        let original: Vec<[f32; 3]> = doc.meshes[0].primitives[0].positions().unwrap().to_vec();
        let config = TranscodeConfig::default();

        let report = quantize_document(&mut doc, &config);
        assert_eq!(report.positions, 1);
        assert_eq!(report.normals, 1);
        assert_eq!(report.tex_coords, 1);

        // node 0 now holds the mesh through a child
        assert_eq!(doc.nodes.len(), 2);
        assert_eq!(doc.nodes[0].mesh, None);
        assert_eq!(doc.nodes[0].children, vec![1]);
        assert_eq!(doc.nodes[1].mesh, Some(0));

        let prim = &doc.meshes[0].primitives[0];
        assert!(matches!(
            prim.attribute(Semantic::Position),
            Some(VertexAttribute::I16x3(_))
        ));
        let half = 0.5;
        let max_error = half / ((1 << (config.position_bits - 1)) - 1) as f32;
        for (i, p) in original.iter().enumerate() {
            let q = dequantized_position(prim, &doc.nodes[1], i);
            for c in 0..3 {
                assert!((q[c] - p[c]).abs() <= max_error, "{:?} vs {:?}", q, p);
            }
        }
    }

    #[test]
    fn test_normal_width_follows_bits() {
        let mut doc = decode_gltf(&textured_cube_glb()).unwrap();
        let config = TranscodeConfig {
            normal_bits: 8,
            ..TranscodeConfig::default()
        };
        quantize_document(&mut doc, &config);
        let prim = &doc.meshes[0].primitives[0];
        let Some(VertexAttribute::I8x3(normals)) = prim.attribute(Semantic::Normal) else {
            panic!("expected i8 normals");
        };
        assert!(normals.iter().all(|n| n.iter().any(|c| c.abs() == 127)));

        let mut doc = decode_gltf(&textured_cube_glb()).unwrap();
        quantize_document(&mut doc, &TranscodeConfig::default());
        assert!(matches!(
            doc.meshes[0].primitives[0].attribute(Semantic::Normal),
            Some(VertexAttribute::I16x3(_))
        ));
    }

    #[test]
    fn test_values_land_on_bit_grid() {
        // 4-bit UVs: 15 levels, each stored as a multiple of 65535 / 15
        assert_eq!(snap_unsigned(0.5, 4, 65535.0), 34952.0);
        assert_eq!(snap_unsigned(1.0, 4, 65535.0), 65535.0);
        assert_eq!(snap_signed(-1.0, 8, 127.0), -127.0);
        assert_eq!(snap_signed(2.0, 14, 32767.0), 32767.0);
        assert_eq!(snap_signed(0.0, 14, 32767.0), 0.0);
    }

    fn uv_triangle(material: Option<usize>, uvs: Vec<[f32; 2]>) -> Primitive {
        Primitive {
            mode: crate::document::MODE_TRIANGLES,
            material,
            attributes: vec![
                (
                    Semantic::Position,
                    VertexAttribute::F32x3(vec![[0.0; 3], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]]),
                ),
                (Semantic::TexCoord(0), VertexAttribute::F32x2(uvs)),
                (
                    Semantic::Color(0),
                    VertexAttribute::F32x4(vec![[1.0, 0.5, 0.0, 1.0]; 3]),
                ),
            ],
            indices: None,
        }
    }

    fn textured_material(transform: Option<UvTransform>) -> Material {
        Material {
            base_color_texture: Some(TextureRef {
                texture: 0,
                tex_coord: 0,
                scale: 1.0,
                transform,
            }),
            ..Material::default()
        }
    }

    #[test]
    fn test_tiled_uvs_quantize_through_texture_transform() {
        let mut doc = SceneDocument {
            meshes: vec![Mesh {
                name: None,
                primitives: vec![
                    uv_triangle(Some(0), vec![[0.0, 0.0], [2.0, 0.0], [0.0, 1.0]]),
                    uv_triangle(Some(0), vec![[-1.0, 0.5], [0.0, 0.0], [1.0, 1.0]]),
                ],
            }],
            materials: vec![textured_material(None)],
            ..SceneDocument::default()
        };
        let report = quantize_document(&mut doc, &TranscodeConfig::default());
        assert_eq!(report.tex_coords, 2);
        assert_eq!(report.tex_coords_remapped, 2);
        assert_eq!(report.tex_coords_kept_float, 0);
        assert_eq!(report.colors, 2);

        // both primitives share the material, so they share the [-1, 2] x [0, 1] frame
        let transform = doc.materials[0].base_color_texture.unwrap().transform.unwrap();
        assert_eq!(transform.offset, [-1.0, 0.0]);
        assert_eq!(transform.scale, [3.0, 1.0]);

        let first = &doc.meshes[0].primitives[0];
        let Some(VertexAttribute::U16x2(uvs)) = first.attribute(Semantic::TexCoord(0)) else {
            panic!("expected u16 UVs");
        };
        assert_eq!(uvs[1], [65535, 0]);
        let uv = first.attribute(Semantic::TexCoord(0)).unwrap();
        for (i, expected) in [[0.0f32, 0.0], [2.0, 0.0], [0.0, 1.0]].iter().enumerate() {
            for axis in 0..2 {
                let restored = transform.offset[axis] + transform.scale[axis] * uv.value(i, axis);
                assert!((restored - expected[axis]).abs() < 1e-3);
            }
        }
        assert_eq!(
            first.attribute(Semantic::Color(0)),
            Some(&VertexAttribute::U8x4(vec![[255, 128, 0, 255]; 3]))
        );
    }

    #[test]
    fn test_in_range_uvs_need_no_transform() {
        let mut doc = SceneDocument {
            meshes: vec![Mesh {
                name: None,
                primitives: vec![uv_triangle(Some(0), vec![[0.0, 0.0], [1.0, 0.0], [0.5, 1.0]])],
            }],
            materials: vec![textured_material(None)],
            ..SceneDocument::default()
        };
        let report = quantize_document(&mut doc, &TranscodeConfig::default());
        assert_eq!(report.tex_coords, 1);
        assert_eq!(report.tex_coords_remapped, 0);
        assert_eq!(doc.materials[0].base_color_texture.unwrap().transform, None);
    }

    #[test]
    fn test_rotated_out_of_range_uvs_stay_float() {
        let rotated = UvTransform {
            rotation: 0.5,
            ..UvTransform::IDENTITY
        };
        let mut doc = SceneDocument {
            meshes: vec![Mesh {
                name: None,
                primitives: vec![uv_triangle(Some(0), vec![[0.0, 0.0], [2.0, 0.0], [0.0, 1.0]])],
            }],
            materials: vec![textured_material(Some(rotated))],
            ..SceneDocument::default()
        };
        let report = quantize_document(&mut doc, &TranscodeConfig::default());
        assert_eq!(report.tex_coords_kept_float, 1);
        assert_eq!(report.tex_coords, 0);
        assert!(matches!(
            doc.meshes[0].primitives[0].attribute(Semantic::TexCoord(0)),
            Some(VertexAttribute::F32x2(_))
        ));
        assert_eq!(
            doc.materials[0].base_color_texture.unwrap().transform,
            Some(rotated)
        );
    }

    #[test]
    fn test_flat_mesh_uses_unit_scale() {
        let (center, half) = position_frame(&MeshBounds {
            min: [2.0; 3],
            max: [2.0; 3],
        });
        assert_eq!(center, [2.0; 3]);
        assert_eq!(half, 1.0);
    }
}
