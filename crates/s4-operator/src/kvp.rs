//! Labels and annotations attached to every customer-owned object.

use const_format::concatcp;
use s4_transform::{Document, PathPattern, Transform};

use crate::model::SubscriptionDetails;

/// The vendor-specific annotation key prefix.
const VENDOR_KEY_PREFIX: &str = "leastauthority.com/";

pub const PROVIDER_LABEL: &str = "provider";
pub const APP_LABEL: &str = "app";
pub const COMPONENT_LABEL: &str = "component";
pub const VERSION_LABEL: &str = "version";

/// Distinguishes the objects of one subscription from all others.
pub const SUBSCRIPTION_LABEL: &str = "subscription";

pub const PROVIDER: &str = "LeastAuthority";
pub const APP: &str = "s4";
pub const CUSTOMER_COMPONENT: &str = "customer-tahoe-lafs";
pub const INFRASTRUCTURE_COMPONENT: &str = "Infrastructure";

/// Bumped whenever the layout of customer objects changes incompatibly.
pub const CONTAINERIZED_SUBSCRIPTION_VERSION: &str = "2";

pub const EMAIL_ANNOTATION: &str = "email";
pub const CUSTOMER_ANNOTATION: &str = "customer";
pub const SUBSCRIPTION_ANNOTATION: &str = "subscription";
pub const PLAN_ANNOTATION: &str = "plan";
pub const INTRODUCER_TUB_ID_ANNOTATION: &str = concatcp!(VENDOR_KEY_PREFIX, "introducer-tub-id");
pub const STORAGE_TUB_ID_ANNOTATION: &str = concatcp!(VENDOR_KEY_PREFIX, "storage-tub-id");
pub const INTRODUCER_PORT_ANNOTATION: &str =
    concatcp!(VENDOR_KEY_PREFIX, "introducer-port-number");
pub const STORAGE_PORT_ANNOTATION: &str = concatcp!(VENDOR_KEY_PREFIX, "storage-port-number");

/// Labels shared by the per-customer Deployments, ConfigMaps and their pods.
pub fn customer_labels() -> Document {
    Document::mapping([
        (PROVIDER_LABEL, PROVIDER),
        (APP_LABEL, APP),
        (COMPONENT_LABEL, CUSTOMER_COMPONENT),
        (VERSION_LABEL, CONTAINERIZED_SUBSCRIPTION_VERSION),
    ])
}

/// Labels of the shared infrastructure, e.g. the grid router.
pub fn infrastructure_labels() -> Document {
    Document::mapping([
        (PROVIDER_LABEL, PROVIDER),
        (APP_LABEL, APP),
        (COMPONENT_LABEL, INFRASTRUCTURE_COMPONENT),
        (VERSION_LABEL, CONTAINERIZED_SUBSCRIPTION_VERSION),
    ])
}

/// The annotations describing the customer and subscription an object
/// belongs to.
pub fn subscription_annotations(details: &SubscriptionDetails) -> [(&'static str, String); 8] {
    [
        (EMAIL_ANNOTATION, details.customer_email.clone()),
        (CUSTOMER_ANNOTATION, details.customer_id.clone()),
        (
            SUBSCRIPTION_ANNOTATION,
            details.subscription_id.as_str().to_owned(),
        ),
        (PLAN_ANNOTATION, details.plan_id.clone()),
        (
            INTRODUCER_TUB_ID_ANNOTATION,
            details.secrets.introducer_tub_id.clone(),
        ),
        (STORAGE_TUB_ID_ANNOTATION, details.secrets.storage_tub_id.clone()),
        (
            INTRODUCER_PORT_ANNOTATION,
            details.introducer_port_number.to_string(),
        ),
        (
            STORAGE_PORT_ANNOTATION,
            details.storage_port_number.to_string(),
        ),
    ]
}

/// Transforms setting every subscription annotation below `object`, which
/// must point at something with a `metadata` mapping.
pub fn subscription_metadata(
    object: &PathPattern,
    details: &SubscriptionDetails,
) -> impl Iterator<Item = Transform> + use<> {
    let annotations = object.clone().then("metadata").then("annotations");

    subscription_annotations(details)
        .into_iter()
        .map(move |(key, value)| Transform::new(annotations.clone().then(key), Document::from(value)))
}
