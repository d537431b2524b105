//! Deduplication of images, textures, materials and meshes
//!
//! Identical items are merged into their first occurrence and every
//! reference is remapped. Items that nothing references any more are then
//! pruned, walking from nodes down to images.

use crate::document::{Material, Primitive, SceneDocument, TextureRef};
use petcast_core::ContentHash;
use std::collections::HashMap;
use std::hash::Hash;

const REMOVED: usize = usize::MAX;

/// Items removed per category
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DedupReport {
    pub images_removed: usize,
    pub textures_removed: usize,
    pub materials_removed: usize,
    pub meshes_removed: usize,
}

impl DedupReport {
    pub fn total(&self) -> usize {
        self.images_removed + self.textures_removed + self.materials_removed + self.meshes_removed
    }
}

/// Merge duplicates and drop unreferenced items
pub fn dedup_document(doc: &mut SceneDocument) -> DedupReport {
    let before = (
        doc.images.len(),
        doc.textures.len(),
        doc.materials.len(),
        doc.meshes.len(),
    );

    // Images by content
    let (images, image_map) = merge_by_key(std::mem::take(&mut doc.images), |image| {
        (image.mime_type.clone(), ContentHash::from_bytes(&image.bytes))
    });
    doc.images = images;
    for texture in &mut doc.textures {
        texture.source = image_map[texture.source];
    }

    // Textures by image and sampler
    let (textures, texture_map) =
        merge_by_key(std::mem::take(&mut doc.textures), |t| (t.source, t.sampler));
    doc.textures = textures;
    for material in &mut doc.materials {
        for texture_ref in material.texture_refs_mut() {
            texture_ref.texture = texture_map[texture_ref.texture];
        }
    }

    // Materials by value, ignoring names
    let (materials, material_map) = merge_by_key(std::mem::take(&mut doc.materials), material_key);
    doc.materials = materials;
    for primitive in doc.primitives_mut() {
        if let Some(material) = primitive.material.as_mut() {
            *material = material_map[*material];
        }
    }

    // Meshes by geometry
    let (meshes, mesh_map) = merge_by_key(std::mem::take(&mut doc.meshes), |mesh| {
        let mut canonical = Vec::new();
        for primitive in &mesh.primitives {
            write_primitive(&mut canonical, primitive);
        }
        ContentHash::from_bytes(&canonical)
    });
    doc.meshes = meshes;
    for node in &mut doc.nodes {
        if let Some(mesh) = node.mesh.as_mut() {
            *mesh = mesh_map[*mesh];
        }
    }

    prune_unreferenced(doc);

    DedupReport {
        images_removed: before.0 - doc.images.len(),
        textures_removed: before.1 - doc.textures.len(),
        materials_removed: before.2 - doc.materials.len(),
        meshes_removed: before.3 - doc.meshes.len(),
    }
}

/// Drop meshes no node uses, then materials, textures and images that
/// nothing above them uses
pub fn prune_unreferenced(doc: &mut SceneDocument) {
    let mut used = vec![false; doc.meshes.len()];
    doc.nodes.iter().filter_map(|n| n.mesh).for_each(|m| used[m] = true);
    let (meshes, mesh_map) = retain_used(std::mem::take(&mut doc.meshes), &used);
    doc.meshes = meshes;
    for node in &mut doc.nodes {
        node.mesh = node.mesh.map(|m| mesh_map[m]);
    }

    let mut used = vec![false; doc.materials.len()];
    doc.primitives().filter_map(|p| p.material).for_each(|m| used[m] = true);
    let (materials, material_map) = retain_used(std::mem::take(&mut doc.materials), &used);
    doc.materials = materials;
    for primitive in doc.primitives_mut() {
        primitive.material = primitive.material.map(|m| material_map[m]);
    }

    let mut used = vec![false; doc.textures.len()];
    for material in &mut doc.materials {
        material.texture_refs_mut().for_each(|r| used[r.texture] = true);
    }
    let (textures, texture_map) = retain_used(std::mem::take(&mut doc.textures), &used);
    doc.textures = textures;
    for material in &mut doc.materials {
        material
            .texture_refs_mut()
            .for_each(|r| r.texture = texture_map[r.texture]);
    }

    let mut used = vec![false; doc.images.len()];
    doc.textures.iter().for_each(|t| used[t.source] = true);
    let (images, image_map) = retain_used(std::mem::take(&mut doc.images), &used);
    doc.images = images;
    for texture in &mut doc.textures {
        texture.source = image_map[texture.source];
    }
}

/// Keep the first item for each key. Returns the kept items and a map from
/// old index to new index.
fn merge_by_key<T, K, F>(items: Vec<T>, key: F) -> (Vec<T>, Vec<usize>)
where
    K: Eq + Hash,
    F: Fn(&T) -> K,
{
    let mut first: HashMap<K, usize> = HashMap::new();
    let mut kept = Vec::new();
    let mut map = Vec::with_capacity(items.len());
    for item in items {
        let next = kept.len();
        let index = *first.entry(key(&item)).or_insert(next);
        if index == next {
            kept.push(item);
        }
        map.push(index);
    }
    (kept, map)
}

fn retain_used<T>(items: Vec<T>, used: &[bool]) -> (Vec<T>, Vec<usize>) {
    let mut kept = Vec::new();
    let mut map = vec![REMOVED; items.len()];
    for (i, item) in items.into_iter().enumerate() {
        if used[i] {
            map[i] = kept.len();
            kept.push(item);
        }
    }
    (kept, map)
}

fn material_key(m: &Material) -> Vec<u32> {
    let mut key: Vec<u32> = Vec::with_capacity(32);
    key.extend(m.base_color_factor.iter().map(|f| f.to_bits()));
    key.push(m.metallic_factor.to_bits());
    key.push(m.roughness_factor.to_bits());
    key.extend(m.emissive_factor.iter().map(|f| f.to_bits()));
    for texture_ref in [
        m.base_color_texture,
        m.metallic_roughness_texture,
        m.normal_texture,
        m.occlusion_texture,
        m.emissive_texture,
    ] {
        match texture_ref {
            Some(TextureRef {
                texture,
                tex_coord,
                scale,
                transform,
            }) => {
                key.extend([1, texture as u32, tex_coord, scale.to_bits()]);
                match transform {
                    Some(t) => key.extend(
                        [t.offset[0], t.offset[1], t.rotation, t.scale[0], t.scale[1]]
                            .map(f32::to_bits),
                    ),
                    None => key.push(0),
                }
            }
            None => key.push(0),
        }
    }
    key.push(m.alpha_mode as u32);
    key.push(m.alpha_cutoff.map_or(u32::MAX, f32::to_bits));
    key.push(m.double_sided as u32);
    key
}

fn write_primitive(out: &mut Vec<u8>, primitive: &Primitive) {
    out.extend(primitive.mode.to_le_bytes());
    out.extend((primitive.material.map_or(u64::MAX, |m| m as u64)).to_le_bytes());
    for (semantic, attribute) in &primitive.attributes {
        out.extend(semantic.gltf_name().as_bytes());
        out.extend(attribute.component_type().to_le_bytes());
        out.extend((attribute.len() as u64).to_le_bytes());
        out.extend(attribute.to_bytes());
    }
    match &primitive.indices {
        Some(indices) => {
            out.extend((indices.len() as u64).to_le_bytes());
            indices.iter().for_each(|i| out.extend(i.to_le_bytes()));
        }
        None => out.extend(u64::MAX.to_le_bytes()),
    }
}
