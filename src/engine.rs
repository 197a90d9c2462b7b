//! Transform engine: derive a new artifact from a stored one.
//!
//! ```text
//! id ──► parse ──► owned lookup ──► read source bytes
//!    ──► resize ──► crop ──► format   (only the requested steps, always this order)
//!    ──► identify final bytes ──► tr-XXXXXX-{base}.{ext} ──► staged write ──► insert
//! ```
//!
//! Sources are never modified. Each successful call adds exactly one file
//! and one record; any failure before the insert leaves neither behind.

use crate::config::ServiceConfig;
use crate::error::PipelineError;
use crate::imaging::{ImageBackend, apply_transformations, get_info};
use crate::naming::{derived_file_name, public_url};
use crate::storage::{FileStore, persist_artifact};
use crate::store::{MetadataStore, StoreError};
use crate::transform::TransformationSet;
use crate::types::{ImageId, Owner, RequestContext, StoredArtifact};
use tracing::{info, warn};

pub struct TransformEngine<'a, B: ImageBackend, S: MetadataStore + ?Sized> {
    backend: &'a B,
    store: &'a S,
    files: &'a FileStore,
    config: &'a ServiceConfig,
}

impl<'a, B: ImageBackend, S: MetadataStore + ?Sized> TransformEngine<'a, B, S> {
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

    /// Parse a JSON request body and run it against `raw_id`.
    ///
    /// The id is checked before the body, matching [`transform`](Self::transform).
    pub fn transform_json(
        &self,
        owner: &Owner,
        raw_id: &str,
        body: &str,
        ctx: &RequestContext,
    ) -> Result<StoredArtifact, PipelineError> {
        ImageId::parse(raw_id)?;
        let set = TransformationSet::from_json(body)?;
        self.transform(owner, raw_id, &set, ctx)
    }

    /// Apply `set` to the owner's artifact `raw_id` and store the result.
    pub fn transform(
        &self,
        owner: &Owner,
        raw_id: &str,
        set: &TransformationSet,
        ctx: &RequestContext,
    ) -> Result<StoredArtifact, PipelineError> {
        let id = ImageId::parse(raw_id)?;
        if set.is_empty() {
            return Err(PipelineError::no_transformations());
        }

        let source = self
            .store
            .find_owned_image(owner.id, id)?
            .ok_or(PipelineError::NotFound)?;
        let data = self
            .files
            .read(&source.file_name)
            .map_err(StoreError::from)?;

        let steps = set.steps();
        let output = apply_transformations(self.backend, data, &steps).map_err(|e| {
            warn!(source = %source.id, error = %e, "transformation failed");
            PipelineError::from(e)
        })?;
        let info = get_info(self.backend, &output)?;

        let file_name = derived_file_name(&source.file_name, info.format);
        let record = persist_artifact(self.files, self.store, owner, &file_name, &output, &info)?;
        let url = public_url(self.config, ctx, &record.file_name);

        info!(
            owner = owner.id,
            source = %source.id,
            id = %record.id,
            file = %record.file_name,
            steps = ?steps.iter().map(|s| s.key()).collect::<Vec<_>>(),
            width = record.width,
            height = record.height,
            bytes = record.file_size,
            "stored derived artifact"
        );
        Ok(StoredArtifact { record, url })
    }
}
