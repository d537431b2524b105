//! Local model transcoding

use anyhow::{Context, Result};
use petcast_core::config::{TextureMode, TranscodeConfig};
use petcast_transcode::{AssetPipeline, TranscodedAsset};
use serde_json::json;
use std::path::PathBuf;

pub struct TranscodeArgs {
    pub input: PathBuf,
    pub output: PathBuf,
    pub texture_mode: Option<TextureMode>,
    pub json: bool,
    pub config: TranscodeConfig,
}

pub fn run(args: TranscodeArgs) -> Result<()> {
    let mut config = args.config;
    if let Some(mode) = args.texture_mode {
        config.texture_mode = mode;
    }

    let source = std::fs::read(&args.input)
        .with_context(|| format!("Failed to read {}", args.input.display()))?;
    let asset = AssetPipeline::from_config(&config)
        .transcode_bytes(&source)
        .with_context(|| format!("Failed to transcode {}", args.input.display()))?;
    std::fs::write(&args.output, &asset.bytes)
        .with_context(|| format!("Failed to write {}", args.output.display()))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report_json(&asset))?);
        return Ok(());
    }

    let report = &asset.report;
    println!("Transcoded {} -> {}", args.input.display(), args.output.display());
    println!(
        "  Size: {} -> {} bytes ({:.1}% smaller)",
        asset.original_size,
        asset.compressed_size(),
        asset.savings() * 100.0
    );
    println!(
        "  Vertices: {} -> {} ({} triangles)",
        report.vertices_before, report.vertices_after, report.triangles_after
    );
    if report.weld.degenerate_removed > 0 {
        println!("  Degenerate triangles removed: {}", report.weld.degenerate_removed);
    }
    if report.dedup.total() > 0 {
        println!(
            "  Deduplicated: {} mesh(es), {} material(s), {} texture(s), {} image(s)",
            report.dedup.meshes_removed,
            report.dedup.materials_removed,
            report.dedup.textures_removed,
            report.dedup.images_removed
        );
    }
    match config.texture_mode {
        TextureMode::Strip => println!("  Textures: stripped {}", report.textures.images_before),
        TextureMode::Resize => println!(
            "  Textures: {} resized to <= {}px, {} kept",
            report.textures.resized,
            config.max_texture_size,
            report.textures.images_after.saturating_sub(report.textures.resized)
        ),
    }
    println!("  Quantized streams: {}", report.quantize.total());
    Ok(())
}

fn report_json(asset: &TranscodedAsset) -> serde_json::Value {
    let report = &asset.report;
    json!({
        "originalSize": asset.original_size,
        "compressedSize": asset.compressed_size(),
        "savings": asset.savings(),
        "verticesBefore": report.vertices_before,
        "verticesAfter": report.vertices_after,
        "trianglesAfter": report.triangles_after,
        "degenerateRemoved": report.weld.degenerate_removed,
        "deduplicated": report.dedup.total(),
        "imagesBefore": report.textures.images_before,
        "imagesAfter": report.textures.images_after,
        "imagesResized": report.textures.resized,
        "quantizedStreams": report.quantize.total(),
    })
}
