use std::path::{Path, PathBuf};

use log::info;
use pretty_type_name::pretty_type_name;
use serde::{de::DeserializeOwned, Serialize};

use crate::{next_version, read_json, write_json, Error, TableVersion};

/// A single JSON document read entirely into memory and written back as a
/// whole after every mutation.
pub struct JsonDocument<T> {
    path: PathBuf,
    doc: T,
    version: u64,
}

impl<T> JsonDocument<T>
where
    T: Serialize + DeserializeOwned + Default + Send + Sync,
{
    /// Opens the document, creating it from `T::default()` when absent.
    ///
    /// Missing keys are filled by the type's serde defaults and the filled
    /// document is written back, so the file always lists every option.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, Error> {
        let path = path.into();
        let doc = read_json::<T>(&path).await?.unwrap_or_default();
        write_json(&path, &doc).await?;

        info!(
            "Opened {} document at {}",
            pretty_type_name::<T>(),
            path.display()
        );

        Ok(Self {
            path,
            doc,
            version: next_version(),
        })
    }

    pub fn get(&self) -> &T {
        &self.doc
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Applies `f` to the document and persists the result. The in-memory
    /// document is left untouched when the write fails.
    pub async fn update<R, F>(&mut self, f: F) -> Result<R, Error>
    where
        T: Clone,
        F: FnOnce(&mut T) -> R + Send,
    {
        let mut doc = self.doc.clone();
        let result = f(&mut doc);

        write_json(&self.path, &doc).await?;
        self.doc = doc;
        self.version = next_version();

        Ok(result)
    }

    pub async fn reload(&mut self) -> Result<(), Error> {
        self.doc = read_json::<T>(&self.path).await?.unwrap_or_default();
        self.version = next_version();
        Ok(())
    }
}

impl<T> TableVersion for JsonDocument<T> {
    fn version(&self) -> u64 {
        self.version
    }
}
