//! Texture stripping and downscaling

use crate::document::{SceneDocument, Semantic};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat};
use petcast_core::config::{TextureMode, TranscodeConfig};
use petcast_core::{PetcastError, Result};
use std::io::Cursor;

/// What the texture pass did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextureReport {
    pub images_before: usize,
    pub images_after: usize,
    pub resized: usize,
    /// Images left untouched because they could not be processed
    pub failed: usize,
}

/// Apply the configured texture mode to the document
pub fn process_textures(doc: &mut SceneDocument, config: &TranscodeConfig) -> TextureReport {
    let images_before = doc.images.len();
    let mut report = TextureReport {
        images_before,
        ..TextureReport::default()
    };

    match config.texture_mode {
        TextureMode::Strip => strip_textures(doc),
        TextureMode::Resize => {
            for (index, image) in doc.images.iter_mut().enumerate() {
                match resize_image(
                    &image.bytes,
                    config.max_texture_size,
                    config.texture_quality,
                ) {
                    Ok(Some((bytes, mime))) => {
                        image.bytes = bytes;
                        image.mime_type = mime.to_string();
                        report.resized += 1;
                    }
                    Ok(None) => {}
                    Err(e) => {
                        log::warn!("Leaving texture image {} as-is: {}", index, e);
                        report.failed += 1;
                    }
                }
            }
        }
    }

    report.images_after = doc.images.len();
    report
}

/// Remove every material, texture, image and UV set
pub fn strip_textures(doc: &mut SceneDocument) {
    doc.images.clear();
    doc.textures.clear();
    doc.materials.clear();
    for primitive in doc.primitives_mut() {
        primitive.material = None;
        primitive
            .attributes
            .retain(|(semantic, _)| !matches!(semantic, Semantic::TexCoord(_)));
    }
}

/// Fit an encoded image within `max_size` and re-encode it. Opaque images
/// become JPEG at `quality`, images with transparency become PNG. Returns
/// `None` when the image already fits and re-encoding would not shrink it.
pub fn resize_image(
    bytes: &[u8],
    max_size: u32,
    quality: u8,
) -> Result<Option<(Vec<u8>, &'static str)>> {
    let img = image::load_from_memory(bytes)
        .map_err(|e| PetcastError::TranscodeError(format!("Failed to decode texture: {}", e)))?;

    let (width, height) = img.dimensions();
    let needs_resize = width > max_size || height > max_size;
    let img = if needs_resize {
        img.resize(max_size, max_size, FilterType::Triangle)
    } else {
        img
    };

    let (encoded, mime) = if has_transparency(&img) {
        (encode_png(&img)?, "image/png")
    } else {
        (encode_jpeg(&img, quality)?, "image/jpeg")
    };

    if !needs_resize && encoded.len() >= bytes.len() {
        return Ok(None);
    }
    Ok(Some((encoded, mime)))
}

fn has_transparency(img: &DynamicImage) -> bool {
    img.color().has_alpha() && img.to_rgba8().pixels().any(|p| p.0[3] < 255)
}

fn encode_jpeg(img: &DynamicImage, quality: u8) -> Result<Vec<u8>> {
    let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
    let mut out = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100));
    rgb.write_with_encoder(encoder)
        .map_err(|e| PetcastError::TranscodeError(format!("JPEG encode failed: {}", e)))?;
    Ok(out)
}

fn encode_png(img: &DynamicImage) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    img.write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
        .map_err(|e| PetcastError::TranscodeError(format!("PNG encode failed: {}", e)))?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::decode_gltf;
    use crate::testing::*;

    fn config(mode: TextureMode) -> TranscodeConfig {
        TranscodeConfig {
            texture_mode: mode,
            max_texture_size: 16,
            ..TranscodeConfig::default()
        }
    }

    #[test]
    fn test_strip_removes_everything_texture_related() {
        let mut doc = decode_gltf(&textured_cube_glb()).unwrap();
        let report = process_textures(&mut doc, &config(TextureMode::Strip));

        assert_eq!(report.images_before, 1);
        assert_eq!(report.images_after, 0);
        assert!(doc.textures.is_empty());
        assert!(doc.materials.is_empty());
        let prim = &doc.meshes[0].primitives[0];
        assert!(prim.material.is_none());
        assert!(prim.attribute(Semantic::TexCoord(0)).is_none());
        assert!(prim.attribute(Semantic::Normal).is_some());
    }

    #[test]
    fn test_resize_fits_bounds_and_keeps_aspect() {
        let mut doc = decode_gltf(&textured_cube_glb()).unwrap();
        let report = process_textures(&mut doc, &config(TextureMode::Resize));
        assert_eq!(report.resized, 1);

        let image = &doc.images[0];
        assert_eq!(image.mime_type, "image/jpeg");
        let decoded = image::load_from_memory(&image.bytes).unwrap();
        // fixture texture is 64x32
        assert_eq!(decoded.dimensions(), (16, 8));
        assert_eq!(doc.textures.len(), 1);
        assert_eq!(doc.materials.len(), 1);
    }

    #[test]
    fn test_transparent_image_stays_png() {
        let png = rgba_png(40, 20, 128);
        let (bytes, mime) = resize_image(&png, 10, 80).unwrap().unwrap();
        assert_eq!(mime, "image/png");
        assert_eq!(image::load_from_memory(&bytes).unwrap().dimensions(), (10, 5));
    }

    #[test]
    fn test_never_upscales() {
        let png = rgb_png(8, 4);
        match resize_image(&png, 512, 80).unwrap() {
            None => {}
            Some((bytes, _)) => {
                assert_eq!(image::load_from_memory(&bytes).unwrap().dimensions(), (8, 4));
            }
        }
    }

    #[test]
    fn test_bad_image_is_left_alone() {
        let mut doc = decode_gltf(&textured_cube_glb()).unwrap();
        doc.images[0].bytes = vec![0x89, b'P', b'N', b'G', 0, 0, 0];
        let before = doc.images[0].clone();

        let report = process_textures(&mut doc, &config(TextureMode::Resize));
        assert_eq!(report.failed, 1);
        assert_eq!(doc.images[0], before);
    }
}
