//! External record store integration - gallery sync and job records

pub mod gallery;
pub mod http_store;
pub mod traits;

pub use gallery::{GallerySync, SyncReport};
pub use http_store::HttpRecordStore;
pub use traits::{NoopStore, RecordFields, RecordStatus, RecordStore};
