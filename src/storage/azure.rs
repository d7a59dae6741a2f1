//! Azure Blob Storage backend

use object_store::azure::MicrosoftAzureBuilder;
use std::sync::Arc;

use super::{BackendInitError, BackendKind, ObjectStoreBackend};
use crate::config::AzureConfig;

/// Public URL of a container
pub fn container_url(account: &str, container: &str) -> String {
    format!("https://{}.blob.core.windows.net/{}", account, container)
}

/// Build the Azure backend from a shared-key credential. Environment overrides
/// have already been applied to `config`.
pub fn azure_backend(config: &AzureConfig) -> Result<ObjectStoreBackend, BackendInitError> {
    if config.account_name.is_empty() || config.account_key.is_empty() {
        return Err(BackendInitError::Config("Invalid Azure configuration".to_string()));
    }

    let store = MicrosoftAzureBuilder::new()
        .with_account(&config.account_name)
        .with_access_key(&config.account_key)
        .with_container_name(&config.container_name)
        .build()?;

    Ok(ObjectStoreBackend::new(
        BackendKind::Azure,
        Arc::new(store),
        container_url(&config.account_name, &config.container_name),
    ))
}
