use async_trait::async_trait;

use crate::error::PublishError;

/// Destination for published artifacts. Implementations own transport and
/// credentials; callers hand over finished bytes and a destination name.
#[async_trait]
pub trait ObjectStorePort: Send + Sync {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), PublishError>;
}
