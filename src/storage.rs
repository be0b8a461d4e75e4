//! Lab report object store.
//!
//! Reports are handed to a [`ReportStore`] which returns a retrievable URL.
//! The local store writes under a directory that the router also serves;
//! the HTTP store PUTs to an external bucket endpoint.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use futures_util::future::BoxFuture;
use thiserror::Error;

use crate::config::ReportStoreConfig;

pub const PDF_CONTENT_TYPE: &str = "application/pdf";

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Upload failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Object store rejected upload with status {0}")]
    Rejected(u16),

    #[error("Invalid object key: {0}")]
    InvalidKey(String),
}

pub trait ReportStore: Send + Sync {
    /// Store `bytes` under `key` and return the URL it can be fetched from.
    fn put<'a>(
        &'a self,
        key: &'a str,
        content_type: &'a str,
        bytes: Vec<u8>,
    ) -> BoxFuture<'a, Result<String, StorageError>>;
}

pub fn build_report_store(config: &ReportStoreConfig) -> Arc<dyn ReportStore> {
    match config {
        ReportStoreConfig::Local {
            dir,
            public_base_url,
        } => Arc::new(LocalReportStore::new(dir.clone(), public_base_url.clone())),
        ReportStoreConfig::Http { url, api_key } => {
            Arc::new(HttpReportStore::new(url.clone(), api_key.clone()))
        }
    }
}

/// Keys are relative slash-separated paths with no `..` or root.
fn validate_key(key: &str) -> Result<&Path, StorageError> {
    let path = Path::new(key);
    let clean = !key.is_empty()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
    if clean {
        Ok(path)
    } else {
        Err(StorageError::InvalidKey(key.to_string()))
    }
}

pub struct LocalReportStore {
    root: PathBuf,
    public_base_url: String,
}

impl LocalReportStore {
    pub fn new(root: PathBuf, public_base_url: String) -> Self {
        Self {
            root,
            public_base_url,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ReportStore for LocalReportStore {
    fn put<'a>(
        &'a self,
        key: &'a str,
        _content_type: &'a str,
        bytes: Vec<u8>,
    ) -> BoxFuture<'a, Result<String, StorageError>> {
        Box::pin(async move {
            let relative = validate_key(key)?;
            let path = self.root.join(relative);
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&path, bytes).await?;
            tracing::debug!(path = %path.display(), "Report written");
            Ok(format!("{}/reports/{key}", self.public_base_url))
        })
    }
}

pub struct HttpReportStore {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpReportStore {
    pub fn new(base_url: String, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            api_key,
        }
    }
}

impl ReportStore for HttpReportStore {
    fn put<'a>(
        &'a self,
        key: &'a str,
        content_type: &'a str,
        bytes: Vec<u8>,
    ) -> BoxFuture<'a, Result<String, StorageError>> {
        Box::pin(async move {
            validate_key(key)?;
            let url = format!("{}/{key}", self.base_url);
            let mut request = self
                .client
                .put(&url)
                .header(reqwest::header::CONTENT_TYPE, content_type)
                .body(bytes);
            if let Some(api_key) = &self.api_key {
                request = request.bearer_auth(api_key);
            }

            let response = request.send().await?;
            if !response.status().is_success() {
                return Err(StorageError::Rejected(response.status().as_u16()));
            }
            Ok(url)
        })
    }
}
