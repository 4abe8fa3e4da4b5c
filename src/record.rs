//! Persisted highlight records and the document keys that partition them.

use crate::anchor::StructuralAnchor;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use url::Url;

/// The unit of persisted state: one highlight on one document.
///
/// Records are immutable once created apart from deletion and the in-place
/// color overwrite; `text` is the anchor used for every future relocation and
/// is never empty. The collection for a document key is insertion-ordered and
/// must survive save/restore round-trips in that order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HighlightRecord {
    /// Opaque unique token, stable for the highlight's lifetime.
    pub id: String,
    /// Exact character sequence highlighted at creation time.
    pub text: String,
    /// CSS-compatible fill color.
    pub color: String,
    /// Normalized URL of the owning document.
    pub document_key: String,
    /// Creation timestamp; ordering and debugging only, never matching.
    pub created_at_epoch_ms: u64,
    /// Optional hint narrowing the search before full-document text search.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub structural_anchor: Option<StructuralAnchor>,
}

/// Normalizes a URL into the key that partitions highlight collections.
///
/// The fragment is dropped so in-page navigation does not split a page's
/// highlights across keys.
pub fn document_key(url: &Url) -> String {
    let mut key = url.clone();
    key.set_fragment(None);
    key.to_string()
}

/// Milliseconds since the Unix epoch, saturating at zero for pre-epoch clocks.
pub fn epoch_ms(now: SystemTime) -> u64 {
    now.duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}
