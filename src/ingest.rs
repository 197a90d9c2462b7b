//! Upload ingestion.
//!
//! ```text
//! bytes ──► normalize (≥ threshold and wider than target → downscale)
//!       ──► identify final bytes (format, width, height, size)
//!       ──► random name ──► staged write ──► record insert
//! ```
//!
//! Whatever the caller declared about the upload (size, mime type) is only
//! compared against the bytes for logging; the record is built from what the
//! codec reads back out of the final buffer.

use crate::config::ServiceConfig;
use crate::error::PipelineError;
use crate::imaging::{ImageBackend, get_info, normalize};
use crate::naming::{public_url, upload_file_name};
use crate::storage::{FileStore, persist_artifact};
use crate::store::MetadataStore;
use crate::types::{Owner, RequestContext, StoredArtifact};
use tracing::{debug, info};

/// An upload as handed over by the transport.
#[derive(Debug, Clone, Default)]
pub struct Upload {
    pub data: Vec<u8>,
    /// Size the client claimed, if any.
    pub reported_size: Option<u64>,
    /// Mime type the client claimed, if any.
    pub declared_mime: Option<String>,
}

impl Upload {
    pub fn from_bytes(data: Vec<u8>) -> Self {
        Self {
            reported_size: Some(data.len() as u64),
            data,
            declared_mime: None,
        }
    }
}

/// Turns raw uploads into stored artifacts.
pub struct UploadIngestor<'a, B: ImageBackend, S: MetadataStore + ?Sized> {
    backend: &'a B,
    store: &'a S,
    files: &'a FileStore,
    config: &'a ServiceConfig,
}

impl<'a, B: ImageBackend, S: MetadataStore + ?Sized> UploadIngestor<'a, B, S> {
    pub fn new(
        backend: &'a B,
        store: &'a S,
        files: &'a FileStore,
        config: &'a ServiceConfig,
    ) -> Self {
        Self {
            backend,
            store,
            files,
            config,
        }
    }

    /// Normalize, identify, and persist one upload for `owner`.
    pub fn ingest(
        &self,
        owner: &Owner,
        upload: Upload,
        ctx: &RequestContext,
    ) -> Result<StoredArtifact, PipelineError> {
        let Upload {
            data,
            reported_size,
            declared_mime,
        } = upload;
        let received = data.len() as u64;
        if let Some(reported) = reported_size.filter(|&r| r != received) {
            debug!(reported, actual = received, "reported upload size differs from buffer");
        }

        let data = normalize(self.backend, data, &self.config.normalize_config())?;
        let info = get_info(self.backend, &data)?;

        if let Some(mime) = declared_mime.as_deref().filter(|&m| m != info.format.mime()) {
            debug!(declared = mime, actual = info.format.mime(), "declared mime differs from content");
        }

        let file_name = upload_file_name(info.format);
        let record = persist_artifact(self.files, self.store, owner, &file_name, &data, &info)?;
        let url = public_url(self.config, ctx, &record.file_name);

        info!(
            owner = owner.id,
            id = %record.id,
            file = %record.file_name,
            width = record.width,
            height = record.height,
            bytes = record.file_size,
            received_bytes = received,
            "stored upload"
        );
        Ok(StoredArtifact { record, url })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::RustBackend;
    use crate::imaging::backend::tests::{MockBackend, RecordedOp, info};
    use crate::store::SqliteStore;
    use crate::test_helpers::{Fixture, jpeg_bytes, noise_jpeg_bytes, noise_png_bytes};
    use crate::types::FileType;
    use tempfile::TempDir;

    struct Env {
        _tmp: TempDir,
        files: FileStore,
        store: SqliteStore,
        config: ServiceConfig,
        owner: Owner,
        ctx: RequestContext,
    }

    fn env() -> Env {
        let tmp = TempDir::new().unwrap();
        let files = FileStore::open(tmp.path().join("uploads")).unwrap();
        let store = SqliteStore::open_in_memory().unwrap();
        let owner = store.create_user("alice").unwrap().owner().unwrap();
        Env {
            _tmp: tmp,
            files,
            store,
            config: ServiceConfig::default(),
            owner,
            ctx: RequestContext {
                secure: false,
                host: "localhost".to_string(),
            },
        }
    }

    #[test]
    fn small_upload_is_stored_as_is() {
        let env = env();
        let backend = MockBackend::with_infos(vec![info(FileType::Png, 300, 200, 4)]);
        let ingestor = UploadIngestor::new(&backend, &env.store, &env.files, &env.config);

        let artifact = ingestor
            .ingest(&env.owner, Upload::from_bytes(b"tiny".to_vec()), &env.ctx)
            .unwrap();

        // Only the authoritative identify ran
        assert_eq!(backend.get_operations(), vec![RecordedOp::Identify(b"tiny".to_vec())]);
        assert_eq!(artifact.record.file_type, FileType::Png);
        assert_eq!((artifact.record.width, artifact.record.height), (300, 200));
        assert!(artifact.record.file_name.ends_with(".png"));
        assert_eq!(env.files.read(&artifact.record.file_name).unwrap(), b"tiny");
        assert!(artifact.url.starts_with("http://localhost:3000/api/v1/"));
    }

    #[test]
    fn large_upload_is_downscaled_before_identify() {
        let env = env();
        let backend = MockBackend::with_infos(vec![
            info(FileType::Jpeg, 1600, 1200, 150_000),
            info(FileType::Jpeg, 800, 600, 14),
        ]);
        let ingestor = UploadIngestor::new(&backend, &env.store, &env.files, &env.config);

        let artifact = ingestor
            .ingest(&env.owner, Upload::from_bytes(vec![0u8; 150_000]), &env.ctx)
            .unwrap();

        let ops = backend.get_operations();
        assert_eq!(ops.len(), 3);
        assert!(matches!(
            &ops[1],
            RecordedOp::Resize {
                width: 800,
                height: 600,
                ..
            }
        ));
        assert_eq!(ops[2], RecordedOp::Identify(b"resize:800x600".to_vec()));
        assert_eq!(artifact.record.width, 800);
        assert_eq!(artifact.record.file_type, FileType::Jpeg);
        assert!(artifact.record.file_name.ends_with(".jpeg"));
    }

    #[test]
    fn record_uses_identified_values_not_claims() {
        let env = env();
        let backend = MockBackend::with_infos(vec![info(FileType::Jpeg, 50, 40, 3)]);
        let ingestor = UploadIngestor::new(&backend, &env.store, &env.files, &env.config);
        let upload = Upload {
            data: b"abc".to_vec(),
            reported_size: Some(999_999),
            declared_mime: Some("image/png".to_string()),
        };

        let artifact = ingestor.ingest(&env.owner, upload, &env.ctx).unwrap();
        assert_eq!(artifact.record.file_type, FileType::Jpeg);
        assert_eq!(artifact.record.file_size, 3);
    }

    #[test]
    fn undecodable_upload_creates_nothing() {
        let env = env();
        // No identify results queued, so identify fails
        let backend = MockBackend::new();
        let ingestor = UploadIngestor::new(&backend, &env.store, &env.files, &env.config);

        let err = ingestor
            .ingest(&env.owner, Upload::from_bytes(b"junk".to_vec()), &env.ctx)
            .unwrap_err();
        assert!(matches!(err, PipelineError::Processing(_)));
        assert!(env.files.list_files().unwrap().is_empty());
        assert_eq!(env.store.count_owned_images(env.owner.id).unwrap(), 0);
    }

    // =========================================================================
    // Real codec
    // =========================================================================

    #[test]
    fn real_large_png_is_normalized_to_target_width() {
        let fx = Fixture::new();
        let backend = RustBackend::new();
        let data = noise_png_bytes(1200, 900);
        assert!(data.len() >= 102_400);

        let artifact = fx
            .ingestor(&backend)
            .ingest(&fx.owner, Upload::from_bytes(data.clone()), &fx.ctx)
            .unwrap();
        assert_eq!((artifact.record.width, artifact.record.height), (800, 600));
        assert_eq!(artifact.record.file_type, FileType::Png);
        assert!(artifact.record.file_size <= data.len() as u64);

        let stored = fx.files.read(&artifact.record.file_name).unwrap();
        assert_eq!(stored.len() as u64, artifact.record.file_size);
    }

    #[test]
    fn real_low_quality_jpeg_does_not_grow_when_normalized() {
        let fx = Fixture::new();
        let backend = RustBackend::new();
        let data = noise_jpeg_bytes(1000, 1000, 25);
        assert!(data.len() >= 102_400);

        let artifact = fx
            .ingestor(&backend)
            .ingest(&fx.owner, Upload::from_bytes(data.clone()), &fx.ctx)
            .unwrap();
        assert_eq!((artifact.record.width, artifact.record.height), (800, 800));
        assert_eq!(artifact.record.file_type, FileType::Jpeg);
        assert!(
            artifact.record.file_size <= data.len() as u64,
            "output {} > input {}",
            artifact.record.file_size,
            data.len()
        );
    }

    #[test]
    fn real_small_jpeg_keeps_dimensions() {
        let fx = Fixture::new();
        let backend = RustBackend::new();
        let data = jpeg_bytes(900, 400);
        assert!(data.len() < 102_400);

        let artifact = fx
            .ingestor(&backend)
            .ingest(&fx.owner, Upload::from_bytes(data.clone()), &fx.ctx)
            .unwrap();
        assert_eq!((artifact.record.width, artifact.record.height), (900, 400));
        assert_eq!(artifact.record.file_type, FileType::Jpeg);
        assert_eq!(fx.files.read(&artifact.record.file_name).unwrap(), data);
    }

    #[test]
    fn real_garbage_is_processing_error() {
        let fx = Fixture::new();
        let backend = RustBackend::new();
        let err = fx
            .ingestor(&backend)
            .ingest(&fx.owner, Upload::from_bytes(b"GIF89a....".to_vec()), &fx.ctx)
            .unwrap_err();
        assert!(matches!(err, PipelineError::Processing(_)));
        assert!(fx.files.list_files().unwrap().is_empty());
    }
}
