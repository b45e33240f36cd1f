//! compression/mod.rs
//! Per-block compression backends behind a factory.
//!
//! - A factory hands out one fresh compressor per block, so workers never
//!   share encoder state.
//! - The factory also owns the container framing written around the blocks.
//! - Registry resolves codec IDs to factories.

pub mod constants;
pub mod types;
pub mod registry;
pub mod codecs;

pub use constants::*;
pub use types::*;
pub use registry::*;
pub use codecs::{DeflateCompressor, GzipFactory, ZstdCompressor, ZstdFactory};
