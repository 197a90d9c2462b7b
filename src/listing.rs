//! Read side: paged listing and single-artifact retrieval.
//!
//! Both operations are scoped to the requesting owner. Retrieval shares the
//! engine's rules: a malformed id is a validation error, and an id that does
//! not exist or belongs to someone else is the same `NotFound`.

use crate::config::ServiceConfig;
use crate::error::{FieldError, PipelineError};
use crate::naming::public_url;
use crate::store::MetadataStore;
use crate::types::{ImageId, ImageRecord, Owner, RequestContext, StoredArtifact};
use serde::Serialize;
use tracing::debug;

/// Returned in place of an empty page.
pub const NO_IMAGES_MESSAGE: &str = "You have no uploaded images yet.";

/// Pagination block returned alongside a page of records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub current_page: u64,
    pub total_pages: u64,
    pub page_size: u64,
    pub has_next_page: bool,
}

/// Compute pagination metadata for `count` records.
///
/// `has_next_page` is `(count - page * limit) > limit`, evaluated without
/// underflow. Callers guarantee `limit >= 1`.
pub fn paginate(count: u64, page: u64, limit: u64) -> Pagination {
    let remaining = i128::from(count) - i128::from(page) * i128::from(limit);
    Pagination {
        current_page: page,
        total_pages: count.div_ceil(limit),
        page_size: limit,
        has_next_page: remaining > i128::from(limit),
    }
}

/// Result of a list request.
#[derive(Debug, Clone, PartialEq)]
pub enum Listing {
    Page {
        images: Vec<ImageRecord>,
        pagination: Pagination,
    },
    /// The owner has no records at all.
    Empty,
}

fn check_positive(name: &str, value: u64, errors: &mut Vec<FieldError>) {
    if value < 1 {
        errors.push(FieldError::at(
            &[name],
            "Number must be greater than or equal to 1",
        ));
    }
}

/// Owner-scoped read access to stored artifacts.
pub struct Catalog<'a, S: MetadataStore + ?Sized> {
    store: &'a S,
    config: &'a ServiceConfig,
}

impl<'a, S: MetadataStore + ?Sized> Catalog<'a, S> {
    pub fn new(store: &'a S, config: &'a ServiceConfig) -> Self {
        Self { store, config }
    }

    /// One page of the owner's records, oldest first.
    pub fn list(&self, owner: &Owner, page: u64, limit: u64) -> Result<Listing, PipelineError> {
        let mut errors = Vec::new();
        check_positive("page", page, &mut errors);
        check_positive("limit", limit, &mut errors);
        if !errors.is_empty() {
            return Err(PipelineError::Validation(errors));
        }

        let count = self.store.count_owned_images(owner.id)?;
        if count == 0 {
            return Ok(Listing::Empty);
        }

        let offset = (page - 1).saturating_mul(limit);
        let images = self.store.list_owned_images(owner.id, offset, limit)?;
        debug!(
            owner = owner.id,
            page,
            limit,
            count,
            returned = images.len(),
            "listed images"
        );
        Ok(Listing::Page {
            images,
            pagination: paginate(count, page, limit),
        })
    }

    /// Fetch one owned record with its public URL.
    pub fn retrieve(
        &self,
        owner: &Owner,
        raw_id: &str,
        ctx: &RequestContext,
    ) -> Result<StoredArtifact, PipelineError> {
        let id = ImageId::parse(raw_id)?;
        let record = self
            .store
            .find_owned_image(owner.id, id)?
            .ok_or(PipelineError::NotFound)?;
        let url = public_url(self.config, ctx, &record.file_name);
        Ok(StoredArtifact { record, url })
    }
}
