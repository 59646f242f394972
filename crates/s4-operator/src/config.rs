//! Cluster-scoped settings shared by every signup handled by a process.

use std::{
    fmt::{self, Debug},
    fs,
    path::{Path, PathBuf},
};

use sha2::{Digest, Sha256};
use snafu::{ResultExt, Snafu, ensure};
use url::Url;

type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to read S3 secret key from {path:?}"))]
    ReadSecretKey {
        source: std::io::Error,
        path: PathBuf,
    },

    #[snafu(display("S3 secret key file {path:?} is empty"))]
    EmptySecretKey { path: PathBuf },
}

/// The S3 secret key. Never printed, only its digest is.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretKey(String);

impl SecretKey {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Hex encoded SHA-256 of the key, safe to log.
    pub fn sha256_hex(&self) -> String {
        format!("{:x}", Sha256::digest(self.0.as_bytes()))
    }
}

impl Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey(<redacted>)")
    }
}

/// Loaded once per process and never changed afterwards.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeploymentConfiguration {
    pub kubernetes_namespace: String,
    pub domain: String,
    pub private_host: String,
    pub introducer_image: String,
    pub storageserver_image: String,
    pub s3_access_key_id: String,
    pub s3_secret_key: SecretKey,
    pub subscription_manager_endpoint: Url,
    pub log_gatherer_furl: Option<String>,
    pub stats_gatherer_furl: Option<String>,
}

/// Options to build a [`DeploymentConfiguration`] from.
///
/// Can be used as CLI arguments if the `clap` feature is enabled. Every
/// argument can also be set through the environment.
#[cfg_attr(feature = "clap", derive(clap::Args))]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeploymentOptions {
    /// Namespace customer resources are created in.
    #[cfg_attr(feature = "clap", arg(long, env, default_value = "default"))]
    pub kubernetes_namespace: String,

    /// Domain below which introducers are publicly reachable.
    #[cfg_attr(feature = "clap", arg(long, env))]
    pub domain: String,

    /// Cluster-internal host name of the storage grid router.
    #[cfg_attr(feature = "clap", arg(long, env))]
    pub private_host: String,

    /// Container image of the introducer.
    #[cfg_attr(feature = "clap", arg(long, env))]
    pub introducer_image: String,

    /// Container image of the storage server.
    #[cfg_attr(feature = "clap", arg(long, env))]
    pub storageserver_image: String,

    /// Access key id of the S3 backend.
    #[cfg_attr(feature = "clap", arg(long, env))]
    pub s3_access_key_id: String,

    /// FILE containing the S3 secret key.
    #[cfg_attr(feature = "clap", arg(long, env, value_name = "FILE"))]
    pub s3_secret_path: PathBuf,

    /// Base URL of the subscription manager.
    #[cfg_attr(feature = "clap", arg(long, env))]
    pub subscription_manager_endpoint: Url,

    /// Furl of the log gatherer, if any.
    #[cfg_attr(feature = "clap", arg(long, env))]
    pub log_gatherer_furl: Option<String>,

    /// Furl of the stats gatherer, if any.
    #[cfg_attr(feature = "clap", arg(long, env))]
    pub stats_gatherer_furl: Option<String>,
}

impl DeploymentOptions {
    /// Reads the secret key file and returns the complete configuration.
    pub fn load(self) -> Result<DeploymentConfiguration> {
        let s3_secret_key = read_secret_key(&self.s3_secret_path)?;

        tracing::debug!(
            namespace = self.kubernetes_namespace,
            domain = self.domain,
            subscription_manager = %self.subscription_manager_endpoint,
            "loaded deployment configuration"
        );

        Ok(DeploymentConfiguration {
            kubernetes_namespace: self.kubernetes_namespace,
            domain: self.domain,
            private_host: self.private_host,
            introducer_image: self.introducer_image,
            storageserver_image: self.storageserver_image,
            s3_access_key_id: self.s3_access_key_id,
            s3_secret_key,
            subscription_manager_endpoint: self.subscription_manager_endpoint,
            log_gatherer_furl: self.log_gatherer_furl,
            stats_gatherer_furl: self.stats_gatherer_furl,
        })
    }
}

fn read_secret_key(path: &Path) -> Result<SecretKey> {
    let contents = fs::read_to_string(path).context(ReadSecretKeySnafu { path })?;
    let secret = contents.trim();
    ensure!(!secret.is_empty(), EmptySecretKeySnafu { path });

    Ok(SecretKey::new(secret))
}
