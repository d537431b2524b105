//! PetCast CLI - photo-to-3D generation service and asset transcoder

mod commands;
mod server;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{config, generate, serve, transcode};
use petcast_core::config::TextureMode;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "petcast")]
#[command(about = "Turn pet photos into lightweight 3D models", long_about = None)]
#[command(version)]
struct Cli {
    /// Config file to use instead of ~/.petcast and .petcast
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API
    Serve {
        /// Address to listen on (overrides server.bind)
        #[arg(long)]
        bind: Option<String>,
    },

    /// Transcode a local GLB/glTF file into a compressed GLB
    Transcode {
        /// Source model
        input: PathBuf,

        /// Output GLB path
        output: PathBuf,

        /// Texture handling (strip or resize)
        #[arg(long, value_parser = parse_texture_mode)]
        texture_mode: Option<TextureMode>,

        /// Print the size report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Submit a photo for generation and wait for the model
    Generate {
        /// Path to the photo
        image: PathBuf,

        /// Contact address for the ready notification
        #[arg(long)]
        email: Option<String>,

        /// Print the task id and exit without polling
        #[arg(long)]
        no_wait: bool,

        /// Seconds between status polls
        #[arg(long, default_value = "5")]
        interval: u64,
    },

    /// Show the resolved configuration with secrets redacted
    Config,
}

fn parse_texture_mode(s: &str) -> Result<TextureMode, String> {
    match s {
        "strip" => Ok(TextureMode::Strip),
        "resize" => Ok(TextureMode::Resize),
        _ => Err(format!("unknown texture mode '{}'; valid values: strip, resize", s)),
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve { bind } => serve::run(config, bind),
        Commands::Transcode {
            input,
            output,
            texture_mode,
            json,
        } => transcode::run(transcode::TranscodeArgs {
            input,
            output,
            texture_mode,
            json,
            config: config.transcode,
        }),
        Commands::Generate {
            image,
            email,
            no_wait,
            interval,
        } => generate::run(generate::GenerateArgs {
            image,
            email,
            no_wait,
            interval,
            config,
        }),
        Commands::Config => config::run(&config),
    }
}
