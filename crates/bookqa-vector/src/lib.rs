pub mod exact;
pub mod remote;
pub mod schema;
pub mod table;

use std::sync::Arc;

use bookqa_core::config::{BackendKind, VectorStoreSettings};
use bookqa_core::traits::VectorStore;

pub use exact::ExactBackend;
pub use remote::RemoteBackend;

/// Build the configured backend. The remote backend never fails here;
/// an unreachable database surfaces as `is_available() == false`.
pub async fn open_store(settings: &VectorStoreSettings) -> Arc<dyn VectorStore> {
    match settings.backend {
        BackendKind::Exact => Arc::new(ExactBackend::new()),
        BackendKind::Remote => Arc::new(RemoteBackend::from_settings(settings).await),
    }
}
