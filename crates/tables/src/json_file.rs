use std::path::{Path, PathBuf};

use async_trait::async_trait;
use log::{debug, info};
use pretty_type_name::pretty_type_name;
use serde::{de::DeserializeOwned, Serialize};
use tokio::time::Instant;

use crate::{next_version, read_json, write_json, Error, TableVersion};

use super::prelude::*;

/// Row table stored as a JSON array. Rows are cached in memory and every
/// write flushes the whole array back to disk.
pub struct JsonTable<E> {
    path: PathBuf,
    rows: Vec<E>,
    loaded: bool,
    version: u64,
}

impl<E> JsonTable<E> {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            rows: Vec::new(),
            loaded: false,
            version: next_version(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rows seen by the last load; empty until the table is fetched.
    pub fn rows(&self) -> &[E] {
        &self.rows
    }
}

impl<E: Serialize + DeserializeOwned + Send + Sync> JsonTable<E> {
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, Error> {
        let mut table = Self::new(path);
        table.load().await?;
        Ok(table)
    }

    async fn load(&mut self) -> Result<(), Error> {
        let now = Instant::now();
        self.rows = read_json::<Vec<E>>(&self.path).await?.unwrap_or_default();
        self.loaded = true;
        self.version = next_version();

        info!(
            "Loaded {} rows of {} from {} in {:?}",
            self.rows.len(),
            pretty_type_name::<E>(),
            self.path.display(),
            now.elapsed()
        );
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), Error> {
        let now = Instant::now();
        write_json(&self.path, &self.rows).await?;
        self.version = next_version();
        debug!("Flushed {} in {:?}", self.path.display(), now.elapsed());
        Ok(())
    }
}

#[async_trait]
impl<E: Serialize + DeserializeOwned + Send + Sync> TableFetch for JsonTable<E> {
    type Entry = E;

    async fn fetch(&mut self) -> Result<&[E], Error> {
        if !self.loaded {
            self.load().await?;
        }
        Ok(&self.rows)
    }

    async fn refresh(&mut self) -> Result<(), Error> {
        self.load().await
    }
}

#[async_trait]
impl<E: Serialize + DeserializeOwned + Clone + Send + Sync> TableExtend<E> for JsonTable<E> {
    async fn extend_one(&mut self, entry: &E) -> Result<usize, Error> {
        if !self.loaded {
            self.load().await?;
        }

        self.rows.push(entry.clone());
        if let Err(e) = self.flush().await {
            self.rows.pop();
            return Err(e);
        }

        Ok(self.rows.len() - 1)
    }
}

#[async_trait]
impl<E: Serialize + DeserializeOwned + Clone + Send + Sync> TableUpdate<E> for JsonTable<E> {
    async fn update_one(&mut self, row: usize, entry: &E) -> Result<(), Error> {
        if !self.loaded {
            self.load().await?;
        }

        let slot = self.rows.get_mut(row).ok_or(Error::RowOutOfRange(row))?;
        let previous = std::mem::replace(slot, entry.clone());

        if let Err(e) = self.flush().await {
            self.rows[row] = previous;
            return Err(e);
        }

        Ok(())
    }
}

impl<E> TableVersion for JsonTable<E> {
    fn version(&self) -> u64 {
        self.version
    }
}
