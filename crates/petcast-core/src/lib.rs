//! PetCast Core - Foundational types shared by every PetCast crate
//!
//! - `PetcastError` / `Result` - the error taxonomy for generation and transcoding
//! - `ContentHash` - SHA-256 content hashing (used to deduplicate images)
//! - `PetcastConfig` - layered TOML configuration

pub mod config;
mod error;
mod hash;

pub use config::PetcastConfig;
pub use error::{PetcastError, Result};
pub use hash::ContentHash;
