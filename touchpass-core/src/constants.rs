//! Protocol constants

/// Default per-instruction timeouts (milliseconds)
///
/// These encode the module's processing latency. Image capture is bounded
/// by how long the module waits for a finger to appear.
pub mod timeouts {
    /// Handshake and sensor self check
    pub const HANDSHAKE_MS: u64 = 500;

    /// Image capture
    pub const CAPTURE_MS: u64 = 3000;

    /// Feature extraction
    pub const EXTRACT_MS: u64 = 2000;

    /// Template merge
    pub const MERGE_MS: u64 = 2000;

    /// Template store
    pub const STORE_MS: u64 = 2000;

    /// Template delete
    pub const DELETE_MS: u64 = 2000;

    /// Library wipe
    pub const EMPTY_MS: u64 = 3000;

    /// Library search
    pub const SEARCH_MS: u64 = 3000;

    /// Index table page read
    pub const INDEX_TABLE_MS: u64 = 1000;

    /// System parameters, template count and LED configuration
    pub const QUERY_MS: u64 = 500;
}

/// Char buffer identifiers
pub mod buffers {
    /// First char buffer; also the source buffer for `Store`
    pub const PRIMARY: u8 = 1;

    /// Number of char buffers merged during enrollment
    pub const ENROLL_CAPTURES: u8 = 6;
}

/// Library layout
pub mod library {
    /// Slots covered by one index table page
    pub const SLOTS_PER_PAGE: u16 = 256;

    /// Bytes of bitmap in one index table page
    pub const PAGE_BYTES: usize = 32;

    /// Capacity assumed until the system parameters are read
    pub const DEFAULT_SIZE: u16 = 200;
}

/// Raw bytes the decoder may consume for one frame before giving up
pub const DEFAULT_MAX_RAW_BYTES: usize = 512;
