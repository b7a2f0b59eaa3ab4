//! Hugging Face style model hub client
//!
//! Lists a repository through `/api/models/<id>/tree/main` and fetches
//! files through `/<id>/resolve/main/<path>`.

use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use super::download::{RemoteFile, RemoteRegistry};
use crate::error::{Result, WorkbenchError};

/// Default hub endpoint
pub const DEFAULT_HUB_URL: &str = "https://huggingface.co";

#[derive(Debug, Deserialize)]
struct TreeEntry {
    #[serde(rename = "type")]
    kind: String,
    path: String,
    #[serde(default)]
    size: Option<u64>,
    #[serde(default)]
    lfs: Option<LfsInfo>,
}

#[derive(Debug, Deserialize)]
struct LfsInfo {
    oid: String,
}

/// Blocking hub client
#[derive(Debug, Clone)]
pub struct HubRegistry {
    base_url: String,
    timeout: Duration,
}

impl Default for HubRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_HUB_URL)
    }
}

impl HubRegistry {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(300),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn client(&self, file: &str) -> Result<reqwest::blocking::Client> {
        reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| WorkbenchError::Download {
                file: file.to_string(),
                reason: e.to_string(),
            })
    }

    fn get(&self, url: &str, file: &str) -> Result<reqwest::blocking::Response> {
        debug!(%url, "hub request");
        let response = self
            .client(file)?
            .get(url)
            .send()
            .map_err(|e| WorkbenchError::Download {
                file: file.to_string(),
                reason: if e.is_timeout() {
                    "request timed out".to_string()
                } else {
                    e.to_string()
                },
            })?;
        if !response.status().is_success() {
            return Err(WorkbenchError::Download {
                file: file.to_string(),
                reason: format!("hub returned {}", response.status()),
            });
        }
        Ok(response)
    }
}

impl RemoteRegistry for HubRegistry {
    fn list_files(&self, model_id: &str) -> Result<Vec<RemoteFile>> {
        let url = format!("{}/api/models/{}/tree/main?recursive=true", self.base_url, model_id);
        let entries: Vec<TreeEntry> = self
            .get(&url, model_id)?
            .json()
            .map_err(|e| WorkbenchError::Download {
                file: model_id.to_string(),
                reason: format!("invalid file listing: {}", e),
            })?;

        Ok(entries
            .into_iter()
            .filter(|entry| entry.kind == "file")
            .map(|entry| RemoteFile {
                path: entry.path,
                size: entry.size,
                sha256: entry.lfs.map(|lfs| lfs.oid),
            })
            .collect())
    }

    fn fetch(&self, model_id: &str, path: &str) -> Result<Vec<u8>> {
        let url = format!("{}/{}/resolve/main/{}", self.base_url, model_id, path);
        let bytes = self
            .get(&url, path)?
            .bytes()
            .map_err(|e| WorkbenchError::Download {
                file: path.to_string(),
                reason: e.to_string(),
            })?;
        Ok(bytes.to_vec())
    }
}
