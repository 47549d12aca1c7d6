use thiserror::Error;

/// Rejected scan configuration input.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid network range '{0}', expected a.b.c.d/n with n in 1-32")]
    InvalidNetworkRange(String),

    #[error("invalid IPv4 address '{0}'")]
    InvalidAddress(String),

    #[error("invalid port range {low}-{high}, expected 1 <= low <= high <= 65535")]
    InvalidPortRange { low: u32, high: u32 },

    #[error("timeout {0} ms outside 100-10000 ms")]
    TimeoutOutOfRange(u64),

    #[error("ping interval {0} ms outside 100-10000 ms")]
    IntervalOutOfRange(u64),

    #[error("ping count {0} outside 1-100")]
    CountOutOfRange(u32),

    #[error("pool multiplier {0} outside 1-1024")]
    PoolMultiplierOutOfRange(usize),

    #[error("failed to read engine options from {path}: {reason}")]
    Options { path: String, reason: String },
}

/// Failure to drive a scan session.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("scan session already started; create a new scanner to re-scan")]
    SessionConsumed,

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Failure to load the port/protocol table.
#[derive(Debug, Error)]
pub enum ProtocolTableError {
    #[error("failed to read protocol table: {0}")]
    Io(#[from] std::io::Error),

    #[error("line {line}: malformed protocol row '{row}'")]
    Malformed { line: usize, row: String },
}

/// Failure to export or import a scan report.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("report I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("report is not valid JSON for any scan type: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid file name '{0}': must be non-blank and contain no '.', '/' or '\\'")]
    FileName(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("invalid {field} at index {index}: {reason}")]
    Record {
        field: &'static str,
        index: usize,
        reason: String,
    },
}
