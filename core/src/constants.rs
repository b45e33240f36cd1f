//! constants.rs
//! Defaults and sanity bounds shared by the pipeline and its configuration.

/// Default size of the writer-side buffer (128 KiB).
pub const DEFAULT_BUFFER_SIZE: usize = 1 << 17;

/// Default raw size of one compression block (128 KiB).
pub const DEFAULT_BLOCK_SIZE: usize = 1 << 17;

/// Max block size sanity bound (32 MiB).
pub const MAX_BLOCK_SIZE: usize = 32 * 1024 * 1024;

/// In-flight blocks allowed per pool worker when no limit is configured.
pub const DEFAULT_INFLIGHT_PER_WORKER: usize = 2;

/// Hard cap applied to the derived backpressure limit.
pub const MAX_DEFAULT_INFLIGHT: usize = 256;

/// Fraction of available memory the derived backpressure limit may pin.
pub const INFLIGHT_MEMORY_FRACTION: f64 = 0.25;

/// Thread name prefix of pool workers; a process-wide serial is appended.
pub const WORKER_NAME_PREFIX: &str = "pargz-worker-";

/// gzip container constants (RFC 1952).
pub mod gzip {
    pub const ID1: u8 = 0x1f;
    pub const ID2: u8 = 0x8b;
    pub const CM_DEFLATE: u8 = 8;
    pub const OS_UNKNOWN: u8 = 255;
    pub const XFL_BEST: u8 = 2;
    pub const XFL_FASTEST: u8 = 4;
    pub const HEADER_LEN: usize = 10;
    pub const TRAILER_LEN: usize = 8;
}
