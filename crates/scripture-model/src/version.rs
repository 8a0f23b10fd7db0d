use serde::{Deserialize, Serialize};

/// Identifies one edition of the text and the server-side snapshot to query.
///
/// `build_id` is an opaque session token: every request in a run must use the
/// same value, otherwise chapters come from different content snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionConfig {
    /// Numeric edition id used in service URLs (e.g., "144").
    pub version_id: String,
    /// Short edition code (e.g., "MBB05", "KJV").
    pub version_code: String,
    pub build_id: String,
    /// Locale segment of the data URL (e.g., "en-GB"); also selects the
    /// punctuation profile applied by the cleaner.
    pub locale: String,
}

impl VersionConfig {
    pub fn new(
        version_id: impl Into<String>,
        version_code: impl Into<String>,
        build_id: impl Into<String>,
        locale: impl Into<String>,
    ) -> Self {
        Self {
            version_id: version_id.into(),
            version_code: version_code.into(),
            build_id: build_id.into(),
            locale: locale.into(),
        }
    }
}
