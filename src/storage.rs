//! Artifact byte storage on the local filesystem.
//!
//! A flat, append-only directory: each artifact is one file named by the
//! [`naming`](crate::naming) scheme. Writes are staged under a hidden
//! `.{name}.partial` file and renamed into place, so a reader never sees a
//! half-written artifact. Nothing here overwrites an existing file.
//!
//! [`persist_artifact`] ties a file write to its metadata insert. The file
//! goes first; if the insert then fails, the file is removed again so no
//! orphan outlives the request.

use crate::error::PipelineError;
use crate::imaging::ImageInfo;
use crate::store::{MetadataStore, StoreError};
use crate::types::{ImageRecord, NewImage, Owner};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{error, warn};

/// Directory of stored artifact files.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Use `root` as the storage directory, creating it if missing.
    pub fn open(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute location of a stored file. Rejects names that could escape
    /// the storage directory.
    pub fn path_for(&self, file_name: &str) -> io::Result<PathBuf> {
        let bad = file_name.is_empty()
            || file_name.starts_with('.')
            || file_name.contains(['/', '\\'])
            || file_name.contains('\0');
        if bad {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid artifact file name: {file_name:?}"),
            ));
        }
        Ok(self.root.join(file_name))
    }

    /// Stage `data` and move it into place under `file_name`.
    ///
    /// Fails with `AlreadyExists` if the name is taken.
    pub fn write(&self, file_name: &str, data: &[u8]) -> io::Result<PathBuf> {
        let target = self.path_for(file_name)?;
        if target.exists() {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("artifact already exists: {}", target.display()),
            ));
        }
        let staging = self.root.join(format!(".{file_name}.partial"));

        // A taken staging name belongs to another writer; leave it alone
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&staging)?;

        let staged = file
            .write_all(data)
            .and_then(|()| file.sync_all())
            .and_then(|()| fs::rename(&staging, &target));
        drop(file);

        if let Err(e) = staged {
            // Best effort; the staging name is hidden either way
            let _ = fs::remove_file(&staging);
            return Err(e);
        }
        Ok(target)
    }

    pub fn read(&self, file_name: &str) -> io::Result<Vec<u8>> {
        fs::read(self.path_for(file_name)?)
    }

    /// Remove a stored file. Only used to undo a write whose record never landed.
    pub fn discard(&self, file_name: &str) -> io::Result<()> {
        fs::remove_file(self.path_for(file_name)?)
    }

    /// Names of the visible files in the directory, sorted.
    pub fn list_files(&self) -> io::Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            match entry.file_name().to_str() {
                Some(name) if !name.starts_with('.') => names.push(name.to_string()),
                _ => {}
            }
        }
        names.sort();
        Ok(names)
    }
}

/// Write the bytes, then insert their record; undo the write if the insert fails.
///
/// `info` must describe `data` itself: it is what ends up in the record.
pub(crate) fn persist_artifact<S: MetadataStore + ?Sized>(
    files: &FileStore,
    store: &S,
    owner: &Owner,
    file_name: &str,
    data: &[u8],
    info: &ImageInfo,
) -> Result<ImageRecord, PipelineError> {
    let path = files.write(file_name, data).map_err(StoreError::from)?;

    let new_image = NewImage {
        user_id: owner.id,
        storage_path: path.display().to_string(),
        file_name: file_name.to_string(),
        file_type: info.format,
        file_size: info.size,
        width: info.width,
        height: info.height,
    };

    match store.insert_image(&new_image) {
        Ok(record) => Ok(record),
        Err(insert_err) => {
            match files.discard(file_name) {
                Ok(()) => warn!(
                    file = file_name,
                    error = %insert_err,
                    "record insert failed; removed written file"
                ),
                Err(cleanup_err) => error!(
                    path = %path.display(),
                    error = %insert_err,
                    cleanup_error = %cleanup_err,
                    "record insert failed and written file could not be removed"
                ),
            }
            Err(insert_err.into())
        }
    }
}
