/// Stable codec IDs (u16) used by configuration and the registry.
pub mod codec_ids {
    pub const ZSTD: u16    = 0x0001;
    pub const DEFLATE: u16 = 0x0003;
}

/// Default compression levels (balanced).
pub const DEFAULT_LEVEL_ZSTD: i32 = 3;
pub const DEFAULT_LEVEL_DEFLATE: i32 = 6;
