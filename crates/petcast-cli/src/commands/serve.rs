//! HTTP server command

use crate::server;
use anyhow::{Context, Result};
use petcast_core::PetcastConfig;

pub fn run(config: PetcastConfig, bind: Option<String>) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;
    runtime.block_on(server::serve(config, bind))
}
