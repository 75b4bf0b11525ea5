use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, LazyLock, RwLock};

use serde::{Deserialize, Serialize};

use fabric_api::FabricError;
use table_store::CredentialSource;

/// Connection details of the data cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionProfile {
    #[serde(default = "default_profile_name")]
    pub name: String,
    #[serde(default = "default_cluster_host")]
    pub cluster_host: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
    #[serde(default)]
    pub access_key: Option<String>,
    #[serde(default, skip_serializing)]
    pub secret_key: Option<String>,
}

fn default_profile_name() -> String {
    "default".into()
}
fn default_cluster_host() -> String {
    "localhost".into()
}

impl Default for ConnectionProfile {
    fn default() -> Self {
        Self {
            name: default_profile_name(),
            cluster_host: default_cluster_host(),
            username: Some("fabric".into()),
            password: Some("fabric".into()),
            access_key: None,
            secret_key: None,
        }
    }
}

impl ConnectionProfile {
    /// Storage key pair: explicit keys first, then the cluster user.
    pub fn storage_keys(&self) -> Option<(&str, &str)> {
        match (non_empty(&self.access_key), non_empty(&self.secret_key)) {
            (Some(a), Some(s)) => Some((a, s)),
            _ => Some((non_empty(&self.username)?, non_empty(&self.password)?)),
        }
    }
}

fn non_empty(v: &Option<String>) -> Option<&str> {
    v.as_deref().filter(|s| !s.is_empty())
}

// ═══════════════════════════════════════════════════════════════
//  ProfileCache
// ═══════════════════════════════════════════════════════════════

static GLOBAL: LazyLock<Arc<ProfileCache>> = LazyLock::new(|| Arc::new(ProfileCache::new()));

/// Process-wide current profile. Readers get an immutable snapshot.
#[derive(Debug, Default)]
pub struct ProfileCache {
    current: RwLock<Option<Arc<ConnectionProfile>>>,
}

impl ProfileCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn global() -> Arc<ProfileCache> {
        GLOBAL.clone()
    }

    pub fn init(&self, profile: ConnectionProfile) {
        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        *guard = Some(Arc::new(profile));
    }

    pub fn invalidate(&self) {
        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        *guard = None;
    }

    pub fn snapshot(&self) -> Option<Arc<ConnectionProfile>> {
        self.current.read().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

// ═══════════════════════════════════════════════════════════════
//  ProfileCredentials
// ═══════════════════════════════════════════════════════════════

/// Storage credentials taken from whatever profile the cache holds at call time.
#[derive(Debug, Clone)]
pub struct ProfileCredentials {
    cache: Arc<ProfileCache>,
}

impl ProfileCredentials {
    pub fn new(cache: Arc<ProfileCache>) -> Self {
        Self { cache }
    }
}

impl CredentialSource for ProfileCredentials {
    fn ensure_valid(&self) -> Pin<Box<dyn Future<Output = Result<(), FabricError>> + Send + '_>> {
        Box::pin(async move {
            let profile = self
                .cache
                .snapshot()
                .ok_or_else(|| FabricError::config("no connection profile configured"))?;
            if profile.storage_keys().is_none() {
                return Err(FabricError::config(format!(
                    "profile '{}' has no storage credentials",
                    profile.name
                )));
            }
            Ok(())
        })
    }
}
