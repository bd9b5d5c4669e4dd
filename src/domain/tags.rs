//! Tag vocabulary
//!
//! Tags are the only persisted state the engine keeps. The strings here must
//! stay stable across releases or re-runs will not recognise earlier work.

/// Session matched to a consent record (and its acquisitions/files)
pub const MATCHED: &str = "wbhi";
/// Session exported to the de-identified project
pub const DEID: &str = "deid";
/// Prefix of the retry marker `retry_<n>_<YYYYMMDD>`
pub const RETRY_PREFIX: &str = "retry_";
/// Date format inside retry markers
pub const RETRY_DATE_FORMAT: &str = "%Y%m%d";
/// Tag a source acquisition carries while staged for copy
pub const TO_COPY_PREFIX: &str = "to_copy_";
/// Tag an acquisition (and its session) carries once verified in a destination
pub const COPIED_PREFIX: &str = "copied_";
/// Operator opted the session out of registry matching
pub const SKIP_REGISTRY: &str = "skip_redcap";
/// Session combines several scans and needs manual splitting
pub const NEED_TO_SPLIT: &str = "need_to_split";
/// Tag written by the file-classifier gear on processed DICOM files
pub const FILE_CLASSIFIER: &str = "file-classifier";

/// Skip markers that exclude a session from matching entirely
pub const SKIP_MARKERS: [&str; 2] = [SKIP_REGISTRY, NEED_TO_SPLIT];

/// Staging tag for a copy into `destination_label`
pub fn to_copy(destination_label: &str) -> String {
    format!("{TO_COPY_PREFIX}{destination_label}")
}

/// Completion tag for a copy into `destination_label`
pub fn copied(destination_label: &str) -> String {
    format!("{COPIED_PREFIX}{destination_label}")
}

/// Whether `tag` belongs to the retry-marker family
pub fn is_retry_marker(tag: &str) -> bool {
    tag.starts_with(RETRY_PREFIX)
}

/// Whether any tag in `tags` is a copy-completion tag
pub fn has_any_copied(tags: &[String]) -> bool {
    tags.iter().any(|t| t.starts_with(COPIED_PREFIX))
}
