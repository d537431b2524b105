//! Vertex welding
//!
//! Merges vertices of triangle primitives whose positions lie within
//! `tolerance * bbox diagonal` of each other and whose other attributes
//! match within `tolerance`. Candidates are found through a spatial hash
//! with cells of twice the merge distance, so only the 27 surrounding
//! cells need to be searched.

use crate::document::{
    MeshBounds, Primitive, SceneDocument, Semantic, VertexAttribute, MODE_TRIANGLES,
};
use std::collections::HashMap;

/// Vertex and triangle counts before and after welding
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WeldReport {
    pub vertices_before: usize,
    pub vertices_after: usize,
    pub degenerate_removed: usize,
}

/// Weld every triangle primitive in the document
pub fn weld_document(doc: &mut SceneDocument, tolerance: f32) -> WeldReport {
    let mut report = WeldReport::default();
    for primitive in doc.primitives_mut() {
        let before = primitive.vertex_count();
        report.vertices_before += before;
        if primitive.mode == MODE_TRIANGLES {
            report.degenerate_removed += weld_primitive(primitive, tolerance);
        }
        report.vertices_after += primitive.vertex_count();
    }
    report
}

/// Weld one triangle primitive in place. The primitive always ends up
/// indexed. Returns the number of degenerate triangles dropped.
pub fn weld_primitive(primitive: &mut Primitive, tolerance: f32) -> usize {
    let vertex_count = primitive.vertex_count();
    let positions = match primitive.position_values() {
        Some(p) if !p.is_empty() => p,
        _ => return 0,
    };

    let eps = MeshBounds::from_positions(&positions)
        .map(|b| b.diagonal() * tolerance)
        .unwrap_or(0.0);
    let cell_size = if eps > 0.0 { eps * 2.0 } else { 1.0 };

    let mut spatial_hash: HashMap<(i64, i64, i64), Vec<u32>> = HashMap::new();
    for (idx, p) in positions.iter().enumerate() {
        spatial_hash
            .entry(pos_to_cell(p, cell_size))
            .or_default()
            .push(idx as u32);
    }

    let others: Vec<&VertexAttribute> = primitive
        .attributes
        .iter()
        .filter(|(s, _)| *s != Semantic::Position)
        .map(|(_, a)| a)
        .collect();

    let mut remap: Vec<u32> = (0..vertex_count as u32).collect();
    for (idx, p) in positions.iter().enumerate() {
        let idx = idx as u32;
        if remap[idx as usize] != idx {
            continue;
        }
        let cell = pos_to_cell(p, cell_size);

        for dx in -1..=1 {
            for dy in -1..=1 {
                for dz in -1..=1 {
                    let key = (
                        cell.0.saturating_add(dx),
                        cell.1.saturating_add(dy),
                        cell.2.saturating_add(dz),
                    );
                    let Some(candidates) = spatial_hash.get(&key) else {
                        continue;
                    };
                    for &other in candidates {
                        if other <= idx || remap[other as usize] != other {
                            continue;
                        }
                        if distance(p, &positions[other as usize]) <= eps
                            && attributes_match(&others, idx as usize, other as usize, tolerance)
                        {
                            remap[other as usize] = idx;
                        }
                    }
                }
            }
        }
    }

    // Resolve transitive merges
    for i in 0..remap.len() {
        let mut target = remap[i];
        while remap[target as usize] != target {
            target = remap[target as usize];
        }
        remap[i] = target;
    }

    let indices: Vec<u32> = primitive
        .indices
        .take()
        .unwrap_or_else(|| (0..vertex_count as u32).collect());
    let mut welded: Vec<u32> = Vec::with_capacity(indices.len());
    let mut degenerate = 0;
    for tri in indices.chunks_exact(3) {
        let [a, b, c] = [
            remap[tri[0] as usize],
            remap[tri[1] as usize],
            remap[tri[2] as usize],
        ];
        if a == b || b == c || a == c {
            degenerate += 1;
            continue;
        }
        welded.extend([a, b, c]);
    }

    // Compact to the surviving vertices, keeping their original order
    let mut new_index = vec![u32::MAX; vertex_count];
    let mut referenced: Vec<u32> = welded.clone();
    referenced.sort_unstable();
    referenced.dedup();
    for (new, &old) in referenced.iter().enumerate() {
        new_index[old as usize] = new as u32;
    }
    for i in &mut welded {
        *i = new_index[*i as usize];
    }
    for (_, attribute) in &mut primitive.attributes {
        *attribute = attribute.gather(&referenced);
    }
    primitive.indices = Some(welded);
    degenerate
}

fn attributes_match(attributes: &[&VertexAttribute], a: usize, b: usize, tolerance: f32) -> bool {
    attributes.iter().all(|attr| {
        (0..attr.components()).all(|c| (attr.value(a, c) - attr.value(b, c)).abs() <= tolerance)
    })
}

fn distance(a: &[f32; 3], b: &[f32; 3]) -> f32 {
    let d = [a[0] - b[0], a[1] - b[1], a[2] - b[2]];
    (d[0] * d[0] + d[1] * d[1] + d[2] * d[2]).sqrt()
}

/// Convert position to spatial hash cell.
fn pos_to_cell(pos: &[f32; 3], cell_size: f32) -> (i64, i64, i64) {
    (
        (pos[0] / cell_size).floor() as i64,
        (pos[1] / cell_size).floor() as i64,
        (pos[2] / cell_size).floor() as i64,
    )
}
