use std::{
    collections::HashMap,
    fs::read_to_string,
    io,
    path::{Path, PathBuf},
};

use tracing::info;

pub const DEFAULT_MANIFEST_PATH: &str = "persisted-query-ids/server.json";

#[derive(Debug, thiserror::Error)]
pub enum PersistedQueryError {
    #[error("Failed to read persisted query manifest {}: {source}", .path.display())]
    FileRead { path: PathBuf, source: io::Error },
    #[error("Failed to parse persisted query manifest {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Hash to query text table, loaded once at startup and never mutated.
#[derive(Debug, Default)]
pub struct PersistedQueryMap {
    queries: HashMap<String, String>,
}

impl PersistedQueryMap {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            queries: entries
                .into_iter()
                .map(|(hash, query)| (hash.into(), query.into()))
                .collect(),
        }
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, PersistedQueryError> {
        let path = path.as_ref();
        let content = read_to_string(path).map_err(|source| PersistedQueryError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;

        let queries: HashMap<String, String> =
            serde_json::from_str(&content).map_err(|source| PersistedQueryError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        info!(
            path = %path.display(),
            count = queries.len(),
            "loaded persisted query manifest"
        );

        Ok(Self { queries })
    }

    pub fn get(&self, hash: &str) -> Option<&str> {
        self.queries.get(hash).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.queries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }
}
