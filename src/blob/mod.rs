//! Object storage transfer (Azure Blob Storage).

pub mod azure;

pub use azure::{blob_path, content_type_for, BlobClient, ProgressCallback};
