use s4_transform::{Document, TransformBatch, pattern};
use snafu::ResultExt;

use super::{Result, Role, TransformSnafu};
use crate::kvp;

/// The single LoadBalancer Service shared by every customer grid.
pub const CUSTOMER_GRID_SERVICE_NAME: &str = "s4-customer-grids";

pub const IDLE_TIMEOUT_ANNOTATION: &str =
    "service.beta.kubernetes.io/aws-load-balancer-connection-idle-timeout";

/// Seconds, long enough for idle storage connections to survive.
const IDLE_TIMEOUT_SECONDS: &str = "3600";

pub const INTRODUCER_SERVICE_PORT: u16 = 10000;
pub const STORAGE_SERVICE_PORT: u16 = 10001;

fn template() -> Document {
    Document::mapping([
        ("apiVersion", Document::from("v1")),
        ("kind", Document::from("Service")),
        (
            "metadata",
            Document::mapping([("labels", kvp::customer_labels())]),
        ),
    ])
}

fn service_port(role: Role, port: u16) -> Document {
    Document::mapping([
        ("name", Document::from(role.port_name())),
        ("protocol", Document::from("TCP")),
        ("port", Document::from(port)),
    ])
}

/// Creates the Service routing customer traffic to the grid router.
///
/// When `existing` is given, e.g. the Service as currently deployed, it is
/// used as the starting point and only the fields managed here are
/// converged. Anything else on it, like a cluster assigned `clusterIP`, is
/// preserved.
pub fn create_service(namespace: &str, existing: Option<&Document>) -> Result<Document> {
    let base = existing.cloned().unwrap_or_else(template);

    TransformBatch::new()
        .set(pattern!["apiVersion"], "v1")
        .set(pattern!["kind"], "Service")
        .set(pattern!["metadata", "name"], CUSTOMER_GRID_SERVICE_NAME)
        .set(pattern!["metadata", "namespace"], namespace)
        .set(pattern!["metadata", "labels"], kvp::customer_labels())
        .set(
            pattern!["metadata", "annotations", IDLE_TIMEOUT_ANNOTATION],
            IDLE_TIMEOUT_SECONDS,
        )
        .set(pattern!["spec", "type"], "LoadBalancer")
        .set(pattern!["spec", "selector"], kvp::infrastructure_labels())
        .set(
            pattern!["spec", "ports"],
            Document::sequence([
                service_port(Role::Introducer, INTRODUCER_SERVICE_PORT),
                service_port(Role::Storage, STORAGE_SERVICE_PORT),
            ]),
        )
        .apply(&base)
        .context(TransformSnafu { kind: "Service" })
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;

    #[test]
    fn fresh_service() {
        let service = create_service("testing", None).unwrap();

        assert_eq!(
            service.pointer("/metadata/name").and_then(Document::as_str),
            Some("s4-customer-grids")
        );
        assert_eq!(
            service
                .pointer("/metadata/annotations")
                .and_then(|annotations| annotations.get(IDLE_TIMEOUT_ANNOTATION))
                .and_then(Document::as_str),
            Some("3600")
        );
        assert_eq!(
            service.pointer("/spec/type").and_then(Document::as_str),
            Some("LoadBalancer")
        );
        assert_eq!(
            service
                .pointer("/spec/selector/component")
                .and_then(Document::as_str),
            Some("Infrastructure")
        );
        assert_eq!(
            service
                .pointer("/spec/ports/1/port")
                .and_then(Document::as_u64),
            Some(10001)
        );
        assert_eq!(
            service
                .pointer("/spec/ports/0/name")
                .and_then(Document::as_str),
            Some("introducer")
        );
    }

    #[test]
    fn existing_service_is_converged() {
        let existing: Document = serde_yaml::from_str(indoc! {"
            apiVersion: v1
            kind: Service
            metadata:
              name: s4-customer-grids
              namespace: old
              annotations:
                owner: ops
            spec:
              type: ClusterIP
              clusterIP: 10.0.0.12
              ports:
                - name: introducer
                  port: 9999
        "})
        .unwrap();

        let service = create_service("testing", Some(&existing)).unwrap();

        assert_eq!(service, create_service("testing", Some(&service)).unwrap());
        assert_eq!(
            service
                .pointer("/metadata/namespace")
                .and_then(Document::as_str),
            Some("testing")
        );
        assert_eq!(
            service.pointer("/spec/clusterIP").and_then(Document::as_str),
            Some("10.0.0.12")
        );
        assert_eq!(
            service
                .pointer("/metadata/annotations/owner")
                .and_then(Document::as_str),
            Some("ops")
        );
        assert_eq!(
            service
                .pointer("/spec/ports")
                .and_then(Document::as_sequence)
                .map(|ports| ports.len()),
            Some(2)
        );
        assert_eq!(
            service.pointer("/spec/type").and_then(Document::as_str),
            Some("LoadBalancer")
        );
    }
}
