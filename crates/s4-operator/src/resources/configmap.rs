use s4_transform::{Document, PathPattern, TransformBatch, pattern};
use snafu::ResultExt;

use super::{NamingSnafu, Result, Role, SerializeConfigurationSnafu, TransformSnafu};
use crate::{
    config::DeploymentConfiguration,
    kvp,
    marshal::{ConfigurationMarshaler, MarshalInput},
    model::SubscriptionDetails,
    naming,
};

fn template() -> Document {
    Document::mapping([
        ("apiVersion", Document::from("v1")),
        ("kind", Document::from("ConfigMap")),
        (
            "metadata",
            Document::mapping([("labels", kvp::customer_labels())]),
        ),
    ])
}

/// Creates the ConfigMap holding the node configuration of both roles.
///
/// The configuration of each role is stored as JSON with sorted keys, so the
/// same inputs always produce byte-identical data.
pub fn create_configuration(
    config: &DeploymentConfiguration,
    details: &SubscriptionDetails,
    marshaler: &dyn ConfigurationMarshaler,
) -> Result<Document> {
    let name = naming::configmap_name(&details.subscription_id).context(NamingSnafu)?;
    let public_host =
        naming::public_host(&details.subscription_id, &config.domain).context(NamingSnafu)?;

    tracing::info!(
        key_id = config.s3_access_key_id,
        secret_key_hash = config.s3_secret_key.sha256_hex(),
        "creating configuration with storage backend key"
    );

    let introducer_furl = details.external_introducer_furl.to_string();
    let configuration = marshaler.marshal(&MarshalInput {
        introducer_pem: &details.secrets.introducer_node_pem,
        storage_pem: &details.secrets.storage_node_pem,
        storage_privkey: &details.secrets.storage_node_privkey,
        introducer_port: details.introducer_port_number,
        storage_port: details.storage_port_number,
        bucket_name: &details.bucket_name,
        public_host: &public_host,
        private_host: &config.private_host,
        introducer_furl: &introducer_furl,
        s3_access_key_id: &config.s3_access_key_id,
        s3_secret_key: config.s3_secret_key.expose(),
        log_gatherer_furl: config.log_gatherer_furl.as_deref(),
        stats_gatherer_furl: config.stats_gatherer_furl.as_deref(),
    });

    let introducer = node_configuration(Role::Introducer, configuration.introducer)?;
    let storage = node_configuration(Role::Storage, configuration.storage)?;

    let mut batch = TransformBatch::new()
        .set(
            pattern!["metadata", "namespace"],
            config.kubernetes_namespace.as_str(),
        )
        .set(pattern!["metadata", "name"], name);
    batch.extend(kvp::subscription_metadata(&PathPattern::new(), details));

    batch
        .set(pattern!["data", Role::Introducer.config_key()], introducer)
        .set(pattern!["data", Role::Storage.config_key()], storage)
        .apply(&template())
        .context(TransformSnafu { kind: "ConfigMap" })
}

/// Wraps `configuration` in a single-key object named after `role` and
/// serializes it.
fn node_configuration(role: Role, configuration: Document) -> Result<String> {
    let key = role.port_name();
    serde_json::to_string(&Document::mapping([(key, configuration)]))
        .context(SerializeConfigurationSnafu { key })
}
