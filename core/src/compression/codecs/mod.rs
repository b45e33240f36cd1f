//! compression/codecs/mod.rs
//! Block compressor backends.

pub mod deflate;
pub mod zstd;

pub use self::deflate::*;
pub use self::zstd::*;
