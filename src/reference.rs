use anyhow::{anyhow, Result};
use std::fmt;
use url::Url;

/// Separator between the collection identifier and the record id.
pub const SEPARATOR: char = '/';

/// Build the composite reference string `<collection>/<record_id>`.
pub fn encode(collection_id: &str, record_id: &str) -> String {
    format!("{}{}{}", collection_id, SEPARATOR, record_id)
}

/// Recover the record id from a stored reference.
///
/// Returns the segment after the last separator. Absent, empty, or
/// separator-free input yields an empty string.
pub fn decode(reference: Option<&str>) -> String {
    match reference {
        Some(raw) => match raw.rfind(SEPARATOR) {
            Some(idx) => raw[idx + SEPARATOR.len_utf8()..].to_string(),
            None => String::new(),
        },
        None => String::new(),
    }
}

/// Build a fully-qualified record URL under `base`:
/// `{base}/apps/{collection}/records/{record_id}`.
pub fn record_url(base: &Url, collection_id: &str, record_id: &str) -> Result<Url> {
    if collection_id.is_empty() || record_id.is_empty() {
        return Err(anyhow!("Record URL requires a collection and a record id"));
    }
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| anyhow!("Base URL cannot carry a path: {}", base))?
        .pop_if_empty()
        .extend(["apps", collection_id, "records", record_id]);
    Ok(url)
}

/// A decoded reference to a record in another collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordRef {
    pub collection: String,
    pub record_id: String,
}

impl RecordRef {
    pub fn new(collection: impl Into<String>, record_id: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            record_id: record_id.into(),
        }
    }

    /// Parse `<collection>/<record_id>`. Both halves must be non-empty.
    ///
    /// For record URLs the collection is the segment preceding the record id,
    /// skipping the `records` path component.
    pub fn parse(raw: &str) -> Option<Self> {
        let (head, record_id) = raw.rsplit_once(SEPARATOR)?;
        if record_id.is_empty() {
            return None;
        }
        let head = head.strip_suffix("/records").unwrap_or(head);
        let collection = head.rsplit(SEPARATOR).next().unwrap_or(head);
        if collection.is_empty() {
            return None;
        }
        Some(Self::new(collection, record_id))
    }
}

impl fmt::Display for RecordRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&encode(&self.collection, &self.record_id))
    }
}
