use s4_transform::{ANY, Document, PathPattern, TransformBatch, pattern};
use serde_json::{Value, json};
use snafu::ResultExt;

use super::{NamingSnafu, PodSlots, Result, Role, TransformSnafu};
use crate::{config::DeploymentConfiguration, kvp, model::SubscriptionDetails, naming};

const CONFIG_MOUNT_PATH: &str = "/app/config";

/// The fixed pod layout every subscription runs with. Images, ports and the
/// ConfigMap name are filled in by [`create_deployment`].
fn template() -> Document {
    let volume = |role: Role| {
        json!({
            "name": role.volume_name(),
            "configMap": {
                "items": [{"key": role.config_key(), "path": role.config_key()}],
            },
        })
    };
    // Both roles are I/O bound, the requests are far below the defaults.
    let container = |role: Role, cpu: &str, memory: &str| {
        json!({
            "name": role.container_name(),
            "volumeMounts": [{"name": role.volume_name(), "mountPath": CONFIG_MOUNT_PATH}],
            "ports": [],
            "resources": {"requests": {"cpu": cpu, "memory": memory}},
        })
    };

    let labels = Value::from(kvp::customer_labels());

    Document::from(json!({
        "apiVersion": "apps/v1",
        "kind": "Deployment",
        "metadata": {"labels": labels},
        "spec": {
            "replicas": 1,
            "revisionHistoryLimit": 2,
            "template": {
                "metadata": {"labels": labels},
                "spec": {
                    "volumes": [volume(Role::Introducer), volume(Role::Storage)],
                    "containers": [
                        container(Role::Introducer, "5m", "64Mi"),
                        container(Role::Storage, "15m", "128Mi"),
                    ],
                },
            },
        },
    }))
}

/// Creates the Deployment running the introducer and storage server of a
/// subscription.
pub fn create_deployment(
    config: &DeploymentConfiguration,
    details: &SubscriptionDetails,
) -> Result<Document> {
    let name = naming::deployment_name(&details.subscription_id).context(NamingSnafu)?;
    let configmap = naming::configmap_name(&details.subscription_id).context(NamingSnafu)?;
    let subscription_label = details.subscription_id.sanitized();

    let images = PodSlots::new(
        config.introducer_image.as_str(),
        config.storageserver_image.as_str(),
    );
    let ports = PodSlots::new(details.introducer_port_number, details.storage_port_number);

    let mut batch = TransformBatch::new()
        .set(
            pattern!["metadata", "namespace"],
            config.kubernetes_namespace.as_str(),
        )
        .set(pattern!["metadata", "name"], name)
        .set(
            pattern!["metadata", "labels", kvp::SUBSCRIPTION_LABEL],
            subscription_label.as_str(),
        )
        .set(
            pattern![
                "spec",
                "template",
                "metadata",
                "labels",
                kvp::SUBSCRIPTION_LABEL
            ],
            subscription_label.as_str(),
        )
        .set(
            pattern!["spec", "template", "spec", "volumes", ANY, "configMap", "name"],
            configmap,
        );

    for (role, image) in images.iter() {
        batch = batch.set(
            pattern!["spec", "template", "spec", "containers", role.index(), "image"],
            *image,
        );
    }
    // Ports have to be unique across every pod selected by the shared
    // Service, the subscription manager hands out such ports.
    for (role, port) in ports.iter() {
        batch = batch.set(
            pattern!["spec", "template", "spec", "containers", role.index(), "ports", 0],
            Document::mapping([
                ("name", Document::from(role.port_name())),
                ("containerPort", Document::from(*port)),
            ]),
        );
    }

    batch.extend(kvp::subscription_metadata(&PathPattern::new(), details));
    batch.extend(kvp::subscription_metadata(
        &pattern!["spec", "template"],
        details,
    ));

    let deployment = batch
        .apply(&template())
        .context(TransformSnafu { kind: "Deployment" })?;

    // Runs as a second batch since selectors and literal paths of a batch
    // only ever see the template.
    let pod_labels = deployment
        .pointer("/spec/template/metadata/labels")
        .cloned()
        .unwrap_or_default();
    TransformBatch::new()
        .set(pattern!["spec", "selector", "matchLabels"], pod_labels)
        .apply(&deployment)
        .context(TransformSnafu { kind: "Deployment" })
}
