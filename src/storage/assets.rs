//! Binary asset sink
//!
//! Assets are written into the source directory under the final segment of
//! their URL path. Writes go to a `.part` file first and are renamed into
//! place, so a visible asset is always complete.

use crate::storage::traits::StorageResult;
use crate::url::file_name_from_url;
use crate::UrlResult;
use std::fs;
use std::path::{Path, PathBuf};
use url::Url;

/// Writes downloaded assets into one directory
#[derive(Debug, Clone)]
pub struct AssetSink {
    dir: PathBuf,
    overwrite: bool,
}

impl AssetSink {
    /// # Arguments
    ///
    /// * `dir` - Directory the assets land in
    /// * `overwrite` - Replace assets that already exist instead of skipping them
    pub fn new(dir: impl Into<PathBuf>, overwrite: bool) -> Self {
        Self {
            dir: dir.into(),
            overwrite,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Destination path of the asset at `url`
    pub fn path_for(&self, url: &Url) -> UrlResult<PathBuf> {
        Ok(self.dir.join(file_name_from_url(url)?))
    }

    /// Returns true if the asset still has to be downloaded
    pub fn needs_fetch(&self, url: &Url) -> UrlResult<bool> {
        Ok(self.overwrite || !self.path_for(url)?.exists())
    }

    /// Stores the bytes of the asset at `url`
    ///
    /// # Returns
    ///
    /// The path the asset was written to
    pub fn store(&self, url: &Url, bytes: &[u8]) -> StorageResult<PathBuf> {
        let name = file_name_from_url(url)?;
        self.store_named(&name, bytes)
    }

    /// Stores bytes under an explicit file name
    pub fn store_named(&self, name: &str, bytes: &[u8]) -> StorageResult<PathBuf> {
        let target = self.dir.join(name);
        let partial = self.dir.join(format!("{}.part", name));

        fs::write(&partial, bytes)?;
        if let Err(e) = fs::rename(&partial, &target) {
            let _ = fs::remove_file(&partial);
            return Err(e.into());
        }

        Ok(target)
    }
}
