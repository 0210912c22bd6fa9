//! Where asset bytes come from
//!
//! The loader only needs "give me the bytes at this path". Deployments pick
//! a filesystem directory, an HTTP origin, or (for tests and embedded
//! builds) an in-memory table.

use crate::audio::LoadError;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

/// Byte source for assets
///
/// Implementations are shared with loader worker threads, hence `Send + Sync`.
pub trait AssetSource: Send + Sync {
    /// Fetch the raw bytes stored at `path`
    fn fetch(&self, path: &str) -> Result<Vec<u8>, LoadError>;
}

/// Reads assets from disk, trying each search path in order
#[derive(Debug, Clone, Default)]
pub struct FileSource {
    search_paths: Vec<PathBuf>,
}

impl FileSource {
    /// Create a source rooted at the given search paths
    pub fn new<P: Into<PathBuf>>(search_paths: impl IntoIterator<Item = P>) -> Self {
        Self {
            search_paths: search_paths.into_iter().map(Into::into).collect(),
        }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let relative = path.trim_start_matches('/');
        self.search_paths
            .iter()
            .map(|root| root.join(relative))
            .find(|candidate| candidate.exists())
            // If not found in search paths, try as given
            .unwrap_or_else(|| PathBuf::from(path))
    }
}

impl AssetSource for FileSource {
    fn fetch(&self, path: &str) -> Result<Vec<u8>, LoadError> {
        let file_path = self.resolve(path);
        std::fs::read(&file_path).map_err(|e| LoadError::Fetch {
            path: path.to_string(),
            reason: e.to_string(),
        })
    }
}

/// Fetches assets with plain HTTP GETs
#[cfg(feature = "http")]
#[derive(Debug, Clone)]
pub struct HttpSource {
    base_url: String,
    client: reqwest::blocking::Client,
}

#[cfg(feature = "http")]
impl HttpSource {
    /// Create a source resolving relative paths against `base_url`
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::blocking::Client::new(),
        }
    }

    fn url_for(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}/{}", self.base_url, path.trim_start_matches('/'))
        }
    }
}

#[cfg(feature = "http")]
impl AssetSource for HttpSource {
    fn fetch(&self, path: &str) -> Result<Vec<u8>, LoadError> {
        let url = self.url_for(path);
        let fetch_error = |e: reqwest::Error| LoadError::Fetch {
            path: url.clone(),
            reason: e.to_string(),
        };

        let response = self.client.get(&url).send().map_err(fetch_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(LoadError::HttpStatus {
                path: url,
                status: status.as_u16(),
            });
        }
        let bytes = response.bytes().map_err(fetch_error)?;
        Ok(bytes.to_vec())
    }
}

/// In-memory asset table that counts fetches per path
#[derive(Debug, Default)]
pub struct MemorySource {
    files: HashMap<String, Vec<u8>>,
    fetches: Mutex<HashMap<String, usize>>,
}

impl MemorySource {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file (builder style)
    pub fn with_file(mut self, path: impl Into<String>, bytes: Vec<u8>) -> Self {
        self.files.insert(path.into(), bytes);
        self
    }

    /// How many times `path` was requested, whether or not it existed
    pub fn fetch_count(&self, path: &str) -> usize {
        self.fetches
            .lock()
            .map(|fetches| fetches.get(path).copied().unwrap_or(0))
            .unwrap_or(0)
    }
}

impl AssetSource for MemorySource {
    fn fetch(&self, path: &str) -> Result<Vec<u8>, LoadError> {
        if let Ok(mut fetches) = self.fetches.lock() {
            *fetches.entry(path.to_string()).or_insert(0) += 1;
        }
        self.files.get(path).cloned().ok_or_else(|| LoadError::Fetch {
            path: path.to_string(),
            reason: "not found".to_string(),
        })
    }
}
