//! In-memory scene document
//!
//! A trimmed glTF model holding what the transforms touch: scenes, nodes,
//! meshes with their vertex streams, PBR materials, textures and encoded
//! images. Cross references are plain indices into the document's vectors.

/// glTF primitive mode for triangle lists
pub const MODE_TRIANGLES: u32 = 4;

pub(crate) const COMPONENT_BYTE: u32 = 5120;
pub(crate) const COMPONENT_UNSIGNED_BYTE: u32 = 5121;
pub(crate) const COMPONENT_SHORT: u32 = 5122;
pub(crate) const COMPONENT_UNSIGNED_SHORT: u32 = 5123;
pub(crate) const COMPONENT_UNSIGNED_INT: u32 = 5125;
pub(crate) const COMPONENT_FLOAT: u32 = 5126;

/// A decoded glTF scene
#[derive(Debug, Clone, Default)]
pub struct SceneDocument {
    pub scenes: Vec<Scene>,
    pub default_scene: Option<usize>,
    pub nodes: Vec<Node>,
    pub meshes: Vec<Mesh>,
    pub materials: Vec<Material>,
    pub textures: Vec<Texture>,
    pub images: Vec<Image>,
}

impl SceneDocument {
    pub fn vertex_count(&self) -> usize {
        self.primitives().map(Primitive::vertex_count).sum()
    }

    pub fn triangle_count(&self) -> usize {
        self.primitives()
            .filter(|p| p.mode == MODE_TRIANGLES)
            .map(|p| p.indices.as_ref().map_or(p.vertex_count(), Vec::len) / 3)
            .sum()
    }

    pub fn primitives(&self) -> impl Iterator<Item = &Primitive> {
        self.meshes.iter().flat_map(|m| m.primitives.iter())
    }

    pub fn primitives_mut(&mut self) -> impl Iterator<Item = &mut Primitive> {
        self.meshes.iter_mut().flat_map(|m| m.primitives.iter_mut())
    }

    /// Combined bounding box over every primitive
    pub fn bounds(&self) -> Option<MeshBounds> {
        self.primitives()
            .filter_map(Primitive::bounds)
            .reduce(|a, b| a.union(&b))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Scene {
    pub name: Option<String>,
    pub nodes: Vec<usize>,
}

/// Local transform of a node
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NodeTransform {
    /// Column-major 4x4 matrix
    Matrix([[f32; 4]; 4]),
    Trs {
        translation: [f32; 3],
        rotation: [f32; 4], // quaternion [x, y, z, w]
        scale: [f32; 3],
    },
}

impl NodeTransform {
    pub const IDENTITY: NodeTransform = NodeTransform::Trs {
        translation: [0.0; 3],
        rotation: [0.0, 0.0, 0.0, 1.0],
        scale: [1.0; 3],
    };

    pub fn is_identity(&self) -> bool {
        *self == Self::IDENTITY
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub name: Option<String>,
    pub transform: NodeTransform,
    pub mesh: Option<usize>,
    pub children: Vec<usize>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mesh {
    pub name: Option<String>,
    pub primitives: Vec<Primitive>,
}

/// Vertex attribute semantics that survive decoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Semantic {
    Position,
    Normal,
    TexCoord(u32),
    Color(u32),
}

impl Semantic {
    /// Attribute name as written in glTF JSON
    pub fn gltf_name(&self) -> String {
        match self {
            Semantic::Position => "POSITION".to_string(),
            Semantic::Normal => "NORMAL".to_string(),
            Semantic::TexCoord(set) => format!("TEXCOORD_{}", set),
            Semantic::Color(set) => format!("COLOR_{}", set),
        }
    }
}

/// A vertex stream. Integer variants are normalized accessors; three
/// component integer streams are padded so every element is 4-byte aligned.
#[derive(Debug, Clone, PartialEq)]
pub enum VertexAttribute {
    F32x2(Vec<[f32; 2]>),
    F32x3(Vec<[f32; 3]>),
    F32x4(Vec<[f32; 4]>),
    I8x3(Vec<[i8; 3]>),
    I16x3(Vec<[i16; 3]>),
    U16x2(Vec<[u16; 2]>),
    U8x4(Vec<[u8; 4]>),
    U16x4(Vec<[u16; 4]>),
}

impl VertexAttribute {
    pub fn len(&self) -> usize {
        match self {
            VertexAttribute::F32x2(v) => v.len(),
            VertexAttribute::F32x3(v) => v.len(),
            VertexAttribute::F32x4(v) => v.len(),
            VertexAttribute::I8x3(v) => v.len(),
            VertexAttribute::I16x3(v) => v.len(),
            VertexAttribute::U16x2(v) => v.len(),
            VertexAttribute::U8x4(v) => v.len(),
            VertexAttribute::U16x4(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn components(&self) -> usize {
        match self {
            VertexAttribute::F32x2(_) | VertexAttribute::U16x2(_) => 2,
            VertexAttribute::F32x3(_) | VertexAttribute::I8x3(_) | VertexAttribute::I16x3(_) => 3,
            VertexAttribute::F32x4(_) | VertexAttribute::U8x4(_) | VertexAttribute::U16x4(_) => 4,
        }
    }

    /// Bytes per element including padding
    pub fn byte_stride(&self) -> usize {
        match self {
            VertexAttribute::F32x2(_) => 8,
            VertexAttribute::F32x3(_) => 12,
            VertexAttribute::F32x4(_) => 16,
            VertexAttribute::I8x3(_) => 4,
            VertexAttribute::I16x3(_) => 8,
            VertexAttribute::U16x2(_) => 4,
            VertexAttribute::U8x4(_) => 4,
            VertexAttribute::U16x4(_) => 8,
        }
    }

    pub fn component_type(&self) -> u32 {
        match self {
            VertexAttribute::F32x2(_) | VertexAttribute::F32x3(_) | VertexAttribute::F32x4(_) => {
                COMPONENT_FLOAT
            }
            VertexAttribute::I8x3(_) => COMPONENT_BYTE,
            VertexAttribute::I16x3(_) => COMPONENT_SHORT,
            VertexAttribute::U16x2(_) | VertexAttribute::U16x4(_) => COMPONENT_UNSIGNED_SHORT,
            VertexAttribute::U8x4(_) => COMPONENT_UNSIGNED_BYTE,
        }
    }

    pub fn is_quantized(&self) -> bool {
        self.component_type() != COMPONENT_FLOAT
    }

    pub fn accessor_type(&self) -> &'static str {
        match self.components() {
            2 => "VEC2",
            3 => "VEC3",
            _ => "VEC4",
        }
    }

    /// Component value as stored, before normalization
    pub fn raw(&self, index: usize, component: usize) -> f64 {
        match self {
            VertexAttribute::F32x2(v) => v[index][component] as f64,
            VertexAttribute::F32x3(v) => v[index][component] as f64,
            VertexAttribute::F32x4(v) => v[index][component] as f64,
            VertexAttribute::I8x3(v) => v[index][component] as f64,
            VertexAttribute::I16x3(v) => v[index][component] as f64,
            VertexAttribute::U16x2(v) => v[index][component] as f64,
            VertexAttribute::U8x4(v) => v[index][component] as f64,
            VertexAttribute::U16x4(v) => v[index][component] as f64,
        }
    }

    /// Component value as a renderer reads it (normalized integers mapped
    /// to [-1, 1] or [0, 1])
    pub fn value(&self, index: usize, component: usize) -> f32 {
        let raw = self.raw(index, component) as f32;
        match self {
            VertexAttribute::I8x3(_) => (raw / 127.0).max(-1.0),
            VertexAttribute::I16x3(_) => (raw / 32767.0).max(-1.0),
            VertexAttribute::U8x4(_) => raw / 255.0,
            VertexAttribute::U16x2(_) | VertexAttribute::U16x4(_) => raw / 65535.0,
            _ => raw,
        }
    }

    /// Keep only the listed elements, in order
    pub fn gather(&self, indices: &[u32]) -> VertexAttribute {
        fn pick<T: Copy>(v: &[T], indices: &[u32]) -> Vec<T> {
            indices.iter().map(|&i| v[i as usize]).collect()
        }
        match self {
            VertexAttribute::F32x2(v) => VertexAttribute::F32x2(pick(v, indices)),
            VertexAttribute::F32x3(v) => VertexAttribute::F32x3(pick(v, indices)),
            VertexAttribute::F32x4(v) => VertexAttribute::F32x4(pick(v, indices)),
            VertexAttribute::I8x3(v) => VertexAttribute::I8x3(pick(v, indices)),
            VertexAttribute::I16x3(v) => VertexAttribute::I16x3(pick(v, indices)),
            VertexAttribute::U16x2(v) => VertexAttribute::U16x2(pick(v, indices)),
            VertexAttribute::U8x4(v) => VertexAttribute::U8x4(pick(v, indices)),
            VertexAttribute::U16x4(v) => VertexAttribute::U16x4(pick(v, indices)),
        }
    }

    /// Little-endian element bytes, padded to `byte_stride`
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.len() * self.byte_stride());
        match self {
            VertexAttribute::F32x2(v) => v.iter().flatten().for_each(|c| out.extend(c.to_le_bytes())),
            VertexAttribute::F32x3(v) => v.iter().flatten().for_each(|c| out.extend(c.to_le_bytes())),
            VertexAttribute::F32x4(v) => v.iter().flatten().for_each(|c| out.extend(c.to_le_bytes())),
            VertexAttribute::I8x3(v) => {
                for e in v {
                    out.extend(e.iter().map(|c| *c as u8));
                    out.push(0);
                }
            }
            VertexAttribute::I16x3(v) => {
                for e in v {
                    e.iter().for_each(|c| out.extend(c.to_le_bytes()));
                    out.extend([0, 0]);
                }
            }
            VertexAttribute::U16x2(v) => v.iter().flatten().for_each(|c| out.extend(c.to_le_bytes())),
            VertexAttribute::U8x4(v) => out.extend(v.iter().flatten()),
            VertexAttribute::U16x4(v) => v.iter().flatten().for_each(|c| out.extend(c.to_le_bytes())),
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Primitive {
    pub mode: u32,
    pub material: Option<usize>,
    pub attributes: Vec<(Semantic, VertexAttribute)>,
    pub indices: Option<Vec<u32>>,
}

impl Primitive {
    pub fn vertex_count(&self) -> usize {
        self.attribute(Semantic::Position).map_or(0, VertexAttribute::len)
    }

    pub fn attribute(&self, semantic: Semantic) -> Option<&VertexAttribute> {
        self.attributes
            .iter()
            .find(|(s, _)| *s == semantic)
            .map(|(_, a)| a)
    }

    /// Float positions, if not yet quantized
    pub fn positions(&self) -> Option<&[[f32; 3]]> {
        match self.attribute(Semantic::Position) {
            Some(VertexAttribute::F32x3(p)) => Some(p),
            _ => None,
        }
    }

    /// Positions as a renderer reads them. Quantized positions stay in
    /// their normalized frame.
    pub fn position_values(&self) -> Option<Vec<[f32; 3]>> {
        let positions = self.attribute(Semantic::Position)?;
        if positions.components() != 3 {
            return None;
        }
        Some(
            (0..positions.len())
                .map(|i| [0, 1, 2].map(|c| positions.value(i, c)))
                .collect(),
        )
    }

    pub fn bounds(&self) -> Option<MeshBounds> {
        self.position_values()
            .and_then(|p| MeshBounds::from_positions(&p))
    }
}

/// glTF alpha rendering mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlphaMode {
    Opaque,
    Mask,
    Blend,
}

impl AlphaMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlphaMode::Opaque => "OPAQUE",
            AlphaMode::Mask => "MASK",
            AlphaMode::Blend => "BLEND",
        }
    }
}

/// `KHR_texture_transform` parameters: `uv' = offset + R(rotation) * (scale * uv)`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UvTransform {
    pub offset: [f32; 2],
    /// Radians
    pub rotation: f32,
    pub scale: [f32; 2],
}

impl UvTransform {
    pub const IDENTITY: UvTransform = UvTransform {
        offset: [0.0; 2],
        rotation: 0.0,
        scale: [1.0; 2],
    };

    pub fn is_identity(&self) -> bool {
        *self == Self::IDENTITY
    }

    /// Transform that first maps `[0, 1]` onto `min + size * uv` and then
    /// applies `self`. Only defined for unrotated transforms.
    pub fn then_from_unit(&self, min: [f32; 2], size: [f32; 2]) -> Option<UvTransform> {
        if self.rotation != 0.0 {
            return None;
        }
        Some(UvTransform {
            offset: [
                self.offset[0] + self.scale[0] * min[0],
                self.offset[1] + self.scale[1] * min[1],
            ],
            rotation: 0.0,
            scale: [self.scale[0] * size[0], self.scale[1] * size[1]],
        })
    }
}

/// A material's reference to a texture
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextureRef {
    pub texture: usize,
    pub tex_coord: u32,
    /// Normal scale or occlusion strength; 1.0 elsewhere
    pub scale: f32,
    pub transform: Option<UvTransform>,
}

/// A metallic-roughness PBR material
#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    pub name: Option<String>,
    pub base_color_factor: [f32; 4],
    pub base_color_texture: Option<TextureRef>,
    pub metallic_factor: f32,
    pub roughness_factor: f32,
    pub metallic_roughness_texture: Option<TextureRef>,
    pub normal_texture: Option<TextureRef>,
    pub occlusion_texture: Option<TextureRef>,
    pub emissive_texture: Option<TextureRef>,
    pub emissive_factor: [f32; 3],
    pub alpha_mode: AlphaMode,
    pub alpha_cutoff: Option<f32>,
    pub double_sided: bool,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            name: None,
            base_color_factor: [1.0; 4],
            base_color_texture: None,
            metallic_factor: 1.0,
            roughness_factor: 1.0,
            metallic_roughness_texture: None,
            normal_texture: None,
            occlusion_texture: None,
            emissive_texture: None,
            emissive_factor: [0.0; 3],
            alpha_mode: AlphaMode::Opaque,
            alpha_cutoff: None,
            double_sided: false,
        }
    }
}

impl Material {
    pub fn texture_refs(&self) -> impl Iterator<Item = &TextureRef> {
        [
            &self.base_color_texture,
            &self.metallic_roughness_texture,
            &self.normal_texture,
            &self.occlusion_texture,
            &self.emissive_texture,
        ]
        .into_iter()
        .flatten()
    }

    pub fn texture_refs_mut(&mut self) -> impl Iterator<Item = &mut TextureRef> {
        [
            &mut self.base_color_texture,
            &mut self.metallic_roughness_texture,
            &mut self.normal_texture,
            &mut self.occlusion_texture,
            &mut self.emissive_texture,
        ]
        .into_iter()
        .flatten()
    }
}

/// Sampler state as GL enums
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Sampler {
    pub mag_filter: Option<u32>,
    pub min_filter: Option<u32>,
    pub wrap_s: u32,
    pub wrap_t: u32,
}

impl Default for Sampler {
    fn default() -> Self {
        // REPEAT
        Self {
            mag_filter: None,
            min_filter: None,
            wrap_s: 10497,
            wrap_t: 10497,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Texture {
    pub name: Option<String>,
    pub source: usize,
    pub sampler: Sampler,
}

/// An encoded image (PNG, JPEG, ...)
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    pub name: Option<String>,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// Axis-aligned bounding box computed from vertex positions
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeshBounds {
    pub min: [f32; 3],
    pub max: [f32; 3],
}

impl MeshBounds {
    /// Compute bounds from a set of vertex positions
    pub fn from_positions(positions: &[[f32; 3]]) -> Option<Self> {
        let (first, rest) = positions.split_first()?;
        let mut min = *first;
        let mut max = *first;
        for p in rest {
            for i in 0..3 {
                min[i] = min[i].min(p[i]);
                max[i] = max[i].max(p[i]);
            }
        }
        Some(Self { min, max })
    }

    /// Size along each axis
    pub fn size(&self) -> [f32; 3] {
        [
            self.max[0] - self.min[0],
            self.max[1] - self.min[1],
            self.max[2] - self.min[2],
        ]
    }

    pub fn center(&self) -> [f32; 3] {
        [
            (self.min[0] + self.max[0]) * 0.5,
            (self.min[1] + self.max[1]) * 0.5,
            (self.min[2] + self.max[2]) * 0.5,
        ]
    }

    pub fn diagonal(&self) -> f32 {
        let s = self.size();
        (s[0] * s[0] + s[1] * s[1] + s[2] * s[2]).sqrt()
    }

    /// Merge with another bounds to get the union
    pub fn union(&self, other: &MeshBounds) -> MeshBounds {
        MeshBounds {
            min: [
                self.min[0].min(other.min[0]),
                self.min[1].min(other.min[1]),
                self.min[2].min(other.min[2]),
            ],
            max: [
                self.max[0].max(other.max[0]),
                self.max[1].max(other.max[1]),
                self.max[2].max(other.max[2]),
            ],
        }
    }
}

impl std::fmt::Display for MeshBounds {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = self.size();
        write!(f, "{:.2} x {:.2} x {:.2}", s[0], s[1], s[2])
    }
}
