//! Remote file-source client: list CSV files in a folder, download by id.
//!
//! Speaks the Drive v3 REST shape (bearer token, `alt=media` downloads) but
//! only depends on the listing fields the importer needs.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::http::{send_with_retry, BackoffPolicy, FetchError};
use crate::secrets::ApiKey;

#[derive(Debug, Clone)]
pub struct FileSourceConfig {
    pub base_url: String,
    pub folder_id: String,
    pub timeout: Duration,
    pub backoff: BackoffPolicy,
}

impl Default for FileSourceConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.googleapis.com/drive/v3".to_string(),
            folder_id: String::new(),
            timeout: Duration::from_secs(30),
            backoff: BackoffPolicy::default(),
        }
    }
}

/// File metadata as the importer sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    pub id: String,
    pub name: String,
    pub modified_time: Option<DateTime<Utc>>,
    pub size_bytes: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ListingResponse {
    #[serde(default)]
    files: Vec<ListedFile>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListedFile {
    id: String,
    name: String,
    #[serde(default)]
    modified_time: Option<String>,
    // The listing API reports size as a decimal string.
    #[serde(default)]
    size: Option<String>,
}

impl From<ListedFile> for RemoteFile {
    fn from(file: ListedFile) -> Self {
        let modified_time = file
            .modified_time
            .as_deref()
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|dt| dt.with_timezone(&Utc));
        let size_bytes = file.size.as_deref().and_then(|raw| raw.parse().ok());
        Self {
            id: file.id,
            name: file.name,
            modified_time,
            size_bytes,
        }
    }
}

pub struct FileSource {
    client: reqwest::Client,
    config: FileSourceConfig,
    token: ApiKey,
}

impl FileSource {
    pub fn new(token: ApiKey, config: FileSourceConfig) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(FetchError::Request)?;
        Ok(Self {
            client,
            config,
            token,
        })
    }

    /// CSV files in the configured folder, newest modification first.
    pub async fn list_csv_files(&self) -> Result<Vec<RemoteFile>, FetchError> {
        let url = format!("{}/files", self.config.base_url.trim_end_matches('/'));
        let query = format!(
            "'{}' in parents and mimeType='text/csv'",
            self.config.folder_id
        );
        let request = self
            .client
            .get(&url)
            .bearer_auth(self.token.as_str())
            .query(&[
                ("q", query.as_str()),
                ("pageSize", "100"),
                ("orderBy", "modifiedTime desc"),
                ("fields", "files(id, name, mimeType, modifiedTime, size)"),
            ]);
        let bytes = send_with_retry(request, &self.config.backoff).await?;
        let listing: ListingResponse =
            serde_json::from_slice(&bytes).map_err(|err| FetchError::Decode {
                url,
                message: err.to_string(),
            })?;
        Ok(listing.files.into_iter().map(RemoteFile::from).collect())
    }

    /// Raw byte content of one file.
    pub async fn download(&self, file_id: &str) -> Result<Vec<u8>, FetchError> {
        let url = format!(
            "{}/files/{}",
            self.config.base_url.trim_end_matches('/'),
            file_id
        );
        let request = self
            .client
            .get(&url)
            .bearer_auth(self.token.as_str())
            .query(&[("alt", "media")]);
        send_with_retry(request, &self.config.backoff).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listing_payload_deserializes_with_string_sizes() {
        let payload = r#"{
            "files": [
                {"id": "abc123", "name": "leads_week_1.csv", "mimeType": "text/csv",
                 "modifiedTime": "2026-08-20T09:30:00Z", "size": "20480"},
                {"id": "def456", "name": "leads_week_2.csv", "mimeType": "text/csv"}
            ]
        }"#;
        let listing: ListingResponse = serde_json::from_str(payload).unwrap();
        let files: Vec<RemoteFile> = listing.files.into_iter().map(RemoteFile::from).collect();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].name, "leads_week_1.csv");
        assert_eq!(files[0].size_bytes, Some(20480));
        assert!(files[0].modified_time.is_some());
        assert_eq!(files[1].size_bytes, None);
        assert!(files[1].modified_time.is_none());
    }

    #[test]
    fn malformed_metadata_degrades_to_none() {
        let file = ListedFile {
            id: "x".into(),
            name: "odd.csv".into(),
            modified_time: Some("not-a-date".into()),
            size: Some("not-a-number".into()),
        };
        let remote = RemoteFile::from(file);
        assert!(remote.modified_time.is_none());
        assert!(remote.size_bytes.is_none());
    }

    #[test]
    fn empty_listing_is_fine() {
        let listing: ListingResponse = serde_json::from_str("{}").unwrap();
        assert!(listing.files.is_empty());
    }
}
