use axum::body::Bytes;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

/// An uploaded image as the service keeps it.
#[derive(Debug, Clone)]
pub struct StoredBlob {
    pub content_type: String,
    pub bytes: Bytes,
    pub uploaded_at: DateTime<Utc>,
}

/// Uploaded images, kept for the lifetime of the process.
#[derive(Default)]
pub struct BlobStore {
    blobs: DashMap<String, StoredBlob>,
}

impl BlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `bytes` under a fresh name derived from `file_name` and return it.
    pub fn put(&self, file_name: &str, content_type: &str, bytes: Bytes) -> String {
        let uploaded_at = Utc::now();
        let blob_name = blob_name(file_name, uploaded_at);
        self.blobs.insert(
            blob_name.clone(),
            StoredBlob {
                content_type: content_type.to_string(),
                bytes,
                uploaded_at,
            },
        );
        blob_name
    }

    pub fn get(&self, blob_name: &str) -> Option<StoredBlob> {
        self.blobs.get(blob_name).map(|entry| entry.clone())
    }

    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }
}

/// `prescription_<unix millis>_<sanitised file name>`
pub fn blob_name(file_name: &str, uploaded_at: DateTime<Utc>) -> String {
    format!(
        "prescription_{}_{}",
        uploaded_at.timestamp_millis(),
        sanitize_file_name(file_name)
    )
}

/// Keeps ASCII alphanumerics, `.`, `-` and `_`; everything else becomes `_`.
/// Directory components are dropped.
pub fn sanitize_file_name(file_name: &str) -> String {
    let base = file_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();

    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();

    if cleaned.trim_matches(['.', '_']).is_empty() {
        "image".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn names_carry_millis_and_clean_file_name() {
        let at = Utc.with_ymd_and_hms(2023, 11, 14, 22, 13, 20).unwrap();
        assert_eq!(
            blob_name("my scan (1).jpg", at),
            "prescription_1700000000000_my_scan__1_.jpg"
        );
    }

    #[test]
    fn sanitize_strips_paths_and_empty_names() {
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("C:\\scans\\rx.png"), "rx.png");
        assert_eq!(sanitize_file_name(".."), "image");
        assert_eq!(sanitize_file_name(""), "image");
    }

    #[test]
    fn put_then_get() {
        let store = BlobStore::new();
        let name = store.put("rx.jpg", "image/jpeg", Bytes::from_static(b"jpeg"));

        assert!(name.starts_with("prescription_"));
        assert!(name.ends_with("_rx.jpg"));
        let blob = store.get(&name).unwrap();
        assert_eq!(blob.content_type, "image/jpeg");
        assert_eq!(blob.bytes.as_ref(), b"jpeg");
        assert_eq!(store.len(), 1);
        assert!(store.get("prescription_0_other.jpg").is_none());
    }
}
