//! # pixelvault
//!
//! Image ingestion and transformation pipeline. Authenticated users upload
//! PNG or JPEG images and ask for derived versions (resized, cropped,
//! re-encoded); every stored artifact comes back as a public URL plus
//! metadata read from its final bytes.
//!
//! # Architecture: Two Write Paths, One Read Path
//!
//! ```text
//! Upload     bytes      →  normalize → identify → name → store   (ingest)
//! Transform  id + set   →  resize → crop → format → identify → name → store   (engine)
//! List/Get   owner      →  metadata store only   (listing)
//! ```
//!
//! Both write paths end in the same persist step: the bytes are staged and
//! renamed into the storage directory, then the record is inserted. If the
//! insert fails the file is removed again.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`ingest`] | Upload ingestor: normalization and first storage of client bytes |
//! | [`engine`] | Transform engine: derives a new artifact from a stored one |
//! | [`transform`] | Parsing and validation of transformation requests, capabilities |
//! | [`listing`] | Paged listing and single retrieval, owner-scoped |
//! | [`imaging`] | Codec adapter: identify, resize, crop, convert over encoded bytes |
//! | [`naming`] | Upload and `tr-XXXXXX-` derived file names, public URLs |
//! | [`storage`] | Flat artifact directory with staged writes |
//! | [`store`] | SQLite metadata store for users and image records |
//! | [`config`] | `pixelvault.toml` loading, validation, environment overrides |
//! | [`output`] | Response shapes and the JSON envelope |
//! | [`error`] | Caller-facing error taxonomy |
//! | [`types`] | Records and identifiers shared across modules |
//!
//! # Design Decisions
//!
//! ## Truth Comes From Bytes
//!
//! Width, height, size and container are always read back from the final
//! encoded buffer. What a client declared about its upload is logged when it
//! disagrees and otherwise ignored.
//!
//! ## Fixed Step Order
//!
//! A transformation set runs resize, then crop, then format, whatever order
//! the request listed them in. The set is closed: unknown keys are rejected.
//!
//! ## Copy-On-Transform
//!
//! Transforms never touch their source. Each one writes a new file under a
//! fresh random name and inserts a new record, so concurrent transforms of
//! the same source need no locking.
//!
//! ## Owner Scoping
//!
//! Every lookup is filtered by owner. A record belonging to someone else is
//! reported exactly like one that does not exist.

pub mod config;
pub mod engine;
pub mod error;
pub mod imaging;
pub mod ingest;
pub mod listing;
pub mod naming;
pub mod output;
pub mod storage;
pub mod store;
pub mod transform;
pub mod types;

#[cfg(test)]
pub(crate) mod test_helpers;
