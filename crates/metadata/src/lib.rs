//! Relational catalog store for the maproom geospatial archive.
//!
//! The catalog is the authoritative record of what the archive contains:
//! volumes and their category bindings, products, versions, live and deleted
//! file records, download records and upload sessions with their staged
//! manifest snapshots. Access goes through per-entity repository traits so
//! the service layer never touches SQL directly.

pub mod error;
pub mod models;
pub mod repos;
pub mod store;

pub use error::{MetadataError, MetadataResult};
pub use store::{CatalogStore, SqliteStore};
