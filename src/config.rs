//! Store configuration.

/// Largest accepted key, in bytes.
pub const DEFAULT_MAX_KEY_LEN: usize = 512 * 1024 * 1024;

/// Page size used when a scan does not ask for one.
pub const DEFAULT_SCAN_COUNT: usize = 10;

/// Configuration for a [`Store`](crate::Store).
#[derive(Debug, Clone)]
pub struct Config {
    /// Keys longer than this are rejected before any mutation.
    pub max_key_len: usize,
    /// Reject keys containing ASCII control bytes.
    pub reject_control_bytes: bool,
    /// Reject keys that open a `{` or `[` without balancing it.
    pub reject_malformed_structured: bool,
    /// Scan page size when the caller passes none.
    pub default_scan_count: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_key_len: DEFAULT_MAX_KEY_LEN,
            reject_control_bytes: true,
            reject_malformed_structured: true,
            default_scan_count: DEFAULT_SCAN_COUNT,
        }
    }
}

impl Config {
    /// Accept any byte string up to `max_key_len`.
    pub fn binary_keys(mut self) -> Self {
        self.reject_control_bytes = false;
        self.reject_malformed_structured = false;
        self
    }

    pub fn with_max_key_len(mut self, max_key_len: usize) -> Self {
        self.max_key_len = max_key_len;
        self
    }
}
