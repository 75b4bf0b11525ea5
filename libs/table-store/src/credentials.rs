use std::future::Future;
use std::pin::Pin;

use fabric_api::FabricError;

/// Guarantees valid short-lived storage credentials before a catalog call.
pub trait CredentialSource: Send + Sync {
    /// `Config` error when no usable credentials exist. Never retried.
    fn ensure_valid(&self) -> Pin<Box<dyn Future<Output = Result<(), FabricError>> + Send + '_>>;
}

/// Fixed access/secret key pair.
#[derive(Debug, Clone, Default)]
pub struct StaticCredentials {
    pub access_key: String,
    pub secret_key: String,
}

impl StaticCredentials {
    pub fn new(access_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self { access_key: access_key.into(), secret_key: secret_key.into() }
    }
}

impl CredentialSource for StaticCredentials {
    fn ensure_valid(&self) -> Pin<Box<dyn Future<Output = Result<(), FabricError>> + Send + '_>> {
        Box::pin(async move {
            if self.access_key.is_empty() || self.secret_key.is_empty() {
                return Err(FabricError::config("storage credentials are not configured"));
            }
            Ok(())
        })
    }
}
