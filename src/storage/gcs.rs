//! Google Cloud Storage backend

use object_store::gcp::GoogleCloudStorageBuilder;
use std::sync::Arc;

use super::{BackendInitError, BackendKind, ObjectStoreBackend};
use crate::config::GcsConfig;

/// Build the GCS backend. Credentials come from the configured service account
/// file, falling back to the standard Google environment and metadata server.
pub fn gcs_backend(config: &GcsConfig) -> Result<ObjectStoreBackend, BackendInitError> {
    let mut builder = GoogleCloudStorageBuilder::from_env().with_bucket_name(&config.bucket);

    if !config.service_account_path.is_empty() {
        builder = builder.with_service_account_path(&config.service_account_path);
    }

    let store = builder.build()?;

    Ok(ObjectStoreBackend::new(
        BackendKind::Gcp,
        Arc::new(store),
        format!("gs://{}", config.bucket),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_service_account_file_fails() {
        let config = GcsConfig {
            bucket: "snapshots".to_string(),
            service_account_path: "/nonexistent/service-account.json".to_string(),
        };

        assert!(gcs_backend(&config).is_err());
    }
}
