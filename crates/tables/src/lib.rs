pub mod document;
pub mod index;
pub mod json_file;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::{
    error::Error as StdError,
    fmt::Display,
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::atomic::{AtomicU64, Ordering},
};

pub mod prelude {
    pub use crate::{TableExtend, TableFetch, TableUpdate, TableVersion};
}

#[derive(Debug)]
pub enum Error {
    Io(PathBuf, std::io::Error),
    Json(PathBuf, serde_json::Error),
    RowOutOfRange(usize),
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Io(path, e) => write!(f, "io error on {}: {}", path.display(), e),
            Error::Json(path, e) => write!(f, "malformed json in {}: {}", path.display(), e),
            Error::RowOutOfRange(row) => write!(f, "row {} is out of range", row),
        }
    }
}

impl StdError for Error {}

#[async_trait]
pub trait TableFetch {
    type Entry: Send + Sync;

    /// Returns the cached rows, loading them from the origin on first use.
    async fn fetch(&mut self) -> Result<&[Self::Entry], Error>;

    /// Drops the cache and reads the origin again.
    async fn refresh(&mut self) -> Result<(), Error>;
}

#[async_trait]
pub trait TableExtend<E: Send + Sync> {
    /// Appends one row and returns its index.
    async fn extend_one(&mut self, entry: &E) -> Result<usize, Error>;
}

#[async_trait]
pub trait TableUpdate<E: Send + Sync> {
    async fn update_one(&mut self, row: usize, entry: &E) -> Result<(), Error>;
}

pub trait TableVersion {
    fn version(&self) -> u64;
}

static VERSION: AtomicU64 = AtomicU64::new(0);

pub(crate) fn next_version() -> u64 {
    VERSION.fetch_add(1, Ordering::Relaxed)
}

/// Reads a JSON file, treating a missing or blank file as `None`.
pub(crate) async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, Error> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(Error::Io(path.to_owned(), e)),
    };

    if content.trim().is_empty() {
        return Ok(None);
    }

    serde_json::from_str(&content)
        .map(Some)
        .map_err(|e| Error::Json(path.to_owned(), e))
}

/// Writes the whole value next to `path` and renames it over the original.
pub(crate) async fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), Error> {
    let data =
        serde_json::to_vec_pretty(value).map_err(|e| Error::Json(path.to_owned(), e))?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::Io(parent.to_owned(), e))?;
        }
    }

    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, data)
        .await
        .map_err(|e| Error::Io(tmp.clone(), e))?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| Error::Io(path.to_owned(), e))
}
