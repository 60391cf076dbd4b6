//! Time series backends.
//!
//! This module provides the backend interface and the three adapters that
//! assemble ordered series from local dump files, a remote aggregator and a
//! paginated search index.

use crate::core::{BackendKind, Config, Result};
use std::sync::Arc;

pub mod backend;
pub mod file;
pub mod remote;
pub mod search;

// Re-export commonly used types
pub use backend::TimeSeriesBackend;
pub use file::FileBackend;
pub use remote::RemoteBackend;
pub use search::SearchBackend;

/// Build the backend selected by `config.storage.backend`.
pub fn backend_from_config(config: &Config) -> Result<Arc<dyn TimeSeriesBackend>> {
    let storage = &config.storage;
    let backend: Arc<dyn TimeSeriesBackend> = match storage.backend {
        BackendKind::Remote => {
            tracing::info!("Using remote aggregator database at {}", storage.url);
            Arc::new(RemoteBackend::with_timeout(
                storage.url.as_str(),
                storage.request_timeout,
            )?)
        },
        BackendKind::File => {
            tracing::info!("Using file system database at {}", storage.url);
            Arc::new(FileBackend::load_matching(
                &storage.url,
                &storage.file_prefix,
                &storage.file_suffix,
            )?)
        },
        BackendKind::Search => {
            tracing::info!(
                "Using search database at {} (index: {}, type: {})",
                storage.url,
                storage.search.index,
                storage.search.doc_type
            );
            Arc::new(SearchBackend::new(
                storage.url.as_str(),
                &storage.search,
                storage.request_timeout,
            )?)
        },
    };
    Ok(backend)
}
