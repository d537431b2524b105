//! PetCast Transcode - Asset transcoding pipeline
//!
//! Turns a generated glTF/GLB model into a compact GLB for the browser
//! viewer: textures are stripped or downscaled, vertices welded, duplicate
//! resources merged, attributes quantized and vertex streams compressed
//! with `EXT_meshopt_compression`.

pub mod decode;
pub mod dedup;
pub mod document;
pub mod encode;
pub mod fetch;
pub mod pipeline;
pub mod quantize;
pub mod textures;
pub mod weld;

#[cfg(test)]
mod testing;

pub use decode::decode_gltf;
pub use document::{MeshBounds, SceneDocument};
pub use encode::encode_glb;
pub use fetch::{AssetFetcher, HttpFetcher};
pub use pipeline::{AssetPipeline, TranscodeOutcome, TranscodeReport, TranscodedAsset};
