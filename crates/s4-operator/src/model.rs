//! Value types exchanged with the subscription manager.

use std::fmt::{self, Debug, Display};

use serde::{Deserialize, Serialize};
use snafu::{Snafu, ensure};

use crate::{furl::Furl, naming};

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display(
        "subscription {subscription_id} was assigned port {port} for both the introducer and the storage server"
    ))]
    PortsNotDistinct {
        subscription_id: SubscriptionId,
        port: u16,
    },
}

/// Opaque identifier of a subscription, as issued by the billing system.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(String);

impl SubscriptionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// The [`naming::sanitize`]d form of the id, used in resource names.
    pub fn sanitized(&self) -> String {
        naming::sanitize(self.as_bytes())
    }
}

impl Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What the billing system tells us about a new signup.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionRequest {
    pub customer_email: String,
    pub customer_id: String,
    pub subscription_id: SubscriptionId,
    pub plan_id: String,
}

/// Certificates, keys and tub ids of the two nodes of a grid.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSecrets {
    pub introducer_node_pem: String,
    pub storage_node_pem: String,
    pub storage_node_privkey: String,
    pub introducer_tub_id: String,
    pub storage_tub_id: String,
}

impl Debug for NodeSecrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeSecrets")
            .field("introducer_tub_id", &self.introducer_tub_id)
            .field("storage_tub_id", &self.storage_tub_id)
            .finish_non_exhaustive()
    }
}

/// Everything known about a subscription once the subscription manager
/// accepted it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionDetails {
    pub subscription_id: SubscriptionId,
    pub customer_id: String,
    pub customer_email: String,
    pub plan_id: String,
    pub bucket_name: String,
    pub introducer_port_number: u16,
    pub storage_port_number: u16,
    pub secrets: NodeSecrets,
    pub external_introducer_furl: Furl,
}

impl SubscriptionDetails {
    /// Checks the invariants the subscription manager is expected to uphold.
    pub fn validate(self) -> Result<Self, Error> {
        ensure!(
            self.introducer_port_number != self.storage_port_number,
            PortsNotDistinctSnafu {
                subscription_id: self.subscription_id.clone(),
                port: self.storage_port_number,
            }
        );
        Ok(self)
    }
}


#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{test_support::subscription_details, *};

    #[test]
    fn distinct_ports_are_valid() {
        let details = subscription_details("sub_1");
        assert_eq!(details.clone().validate().unwrap(), details);
    }

    #[test]
    fn equal_ports_are_rejected() {
        let details = SubscriptionDetails {
            storage_port_number: 12345,
            ..subscription_details("sub_1")
        };

        let err = details.validate().unwrap_err();
        assert_eq!(
            err.to_string(),
            "subscription sub_1 was assigned port 12345 for both the introducer and the storage server"
        );
    }

    #[test]
    fn debug_hides_key_material() {
        let details = subscription_details("sub_1");
        let debug = format!("{details:?}");

        assert!(debug.contains("introducertubid"));
        assert!(!debug.contains("v0-storage-private-key"));
    }

    #[test]
    fn deserializes_subscription_manager_response() {
        let details: SubscriptionDetails = serde_json::from_value(json!({
            "subscription_id": "sub_1",
            "customer_id": "cus_1",
            "customer_email": "alice@example.com",
            "plan_id": "plan",
            "bucket_name": "lae-mn2xgxzr-on2wex2r",
            "introducer_port_number": 10000,
            "storage_port_number": 10001,
            "secrets": {
                "introducer_node_pem": "a",
                "storage_node_pem": "b",
                "storage_node_privkey": "c",
                "introducer_tub_id": "d",
                "storage_tub_id": "e",
            },
            "external_introducer_furl": "pb://d@host:10000/swiss",
        }))
        .unwrap();

        assert_eq!(details.subscription_id, SubscriptionId::new("sub_1"));
        assert_eq!(details.external_introducer_furl.tub_id(), "d");
    }
}
