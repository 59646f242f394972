#![allow(dead_code)]

use std::{path::PathBuf, sync::Arc};

use async_trait::async_trait;
use s4_operator::{
    config::{DeploymentConfiguration, SecretKey},
    furl::Furl,
    marshal::TahoeConfigurationMarshaler,
    model::{NodeSecrets, SubscriptionDetails, SubscriptionId, SubscriptionRequest},
    naming,
    orchestration::{self, ResourceApplier},
    resources::K8sResourceSet,
    signup::{
        BoxedError, DeliveryFailure, FailureNotifier, Mailer, Provisioner, Rendezvous, Wormhole,
        WormholeCode, WormholeError,
    },
    subscription_manager::{self, SubscriptionManager},
};
use tokio::sync::Mutex;

pub const DIAGNOSTICS_PATH: &str = "/var/log/s4/signup.log";

pub fn deployment_configuration() -> DeploymentConfiguration {
    DeploymentConfiguration {
        kubernetes_namespace: "testing".to_owned(),
        domain: "example.com".to_owned(),
        private_host: "s4-grid-router.testing.svc".to_owned(),
        introducer_image: "img-a".to_owned(),
        storageserver_image: "img-b".to_owned(),
        s3_access_key_id: "TESTS3S3S3S3S3S3S3S3".to_owned(),
        s3_secret_key: SecretKey::new("S3".repeat(20)),
        subscription_manager_endpoint: "http://localhost:8000/".parse().unwrap(),
        log_gatherer_furl: None,
        stats_gatherer_furl: Some("pb://stats@gatherer.testing.svc:3117/gatherer".to_owned()),
    }
}

/// The id used throughout: sixteen zero bytes.
pub fn zero_subscription_id() -> SubscriptionId {
    SubscriptionId::new("\0".repeat(16))
}

pub fn subscription_request(subscription_id: SubscriptionId) -> SubscriptionRequest {
    SubscriptionRequest {
        customer_email: "alice@example.com".to_owned(),
        customer_id: "cus_x14Charactersx".to_owned(),
        subscription_id,
        plan_id: "s4_consumer_iteration_2".to_owned(),
    }
}

/// What a well-behaved subscription manager answers to `request`.
pub fn subscription_details(request: &SubscriptionRequest) -> SubscriptionDetails {
    let config = deployment_configuration();
    let public_host = naming::public_host(&request.subscription_id, &config.domain).unwrap();

    SubscriptionDetails {
        subscription_id: request.subscription_id.clone(),
        customer_id: request.customer_id.clone(),
        customer_email: request.customer_email.clone(),
        plan_id: request.plan_id.clone(),
        bucket_name: naming::bucket_name(&request.customer_id, &request.subscription_id),
        introducer_port_number: 12345,
        storage_port_number: 12346,
        secrets: NodeSecrets {
            introducer_node_pem: "-----BEGIN CERTIFICATE----- introducer".to_owned(),
            storage_node_pem: "-----BEGIN CERTIFICATE----- storage".to_owned(),
            storage_node_privkey: "v0-storage-private-key".to_owned(),
            introducer_tub_id: "introducertubid".to_owned(),
            storage_tub_id: "storagetubid".to_owned(),
        },
        external_introducer_furl: format!("pb://introducertubid@{public_host}:12345/swissnum")
            .parse()
            .unwrap(),
    }
}

/// Answers every request with [`subscription_details`], optionally
/// adjusted.
pub struct FakeSubscriptionManager {
    adjust: fn(SubscriptionDetails) -> SubscriptionDetails,
    reject: bool,
}

impl FakeSubscriptionManager {
    pub fn accepting() -> Self {
        Self {
            adjust: |details| details,
            reject: false,
        }
    }

    pub fn with_adjusted_details(adjust: fn(SubscriptionDetails) -> SubscriptionDetails) -> Self {
        Self {
            adjust,
            reject: false,
        }
    }

    pub fn rejecting() -> Self {
        Self {
            reject: true,
            ..Self::accepting()
        }
    }
}

#[async_trait]
impl SubscriptionManager for FakeSubscriptionManager {
    async fn create(
        &self,
        request: &SubscriptionRequest,
    ) -> Result<SubscriptionDetails, subscription_manager::Error> {
        if self.reject {
            return Err(subscription_manager::Error::Rejected {
                status: reqwest::StatusCode::CONFLICT,
                body: "subscription exists".to_owned(),
            });
        }
        Ok((self.adjust)(subscription_details(request)))
    }
}

/// Records applied resource sets, or fails every apply.
#[derive(Default)]
pub struct RecordingApplier {
    pub applied: Mutex<Vec<K8sResourceSet>>,
    pub fail: bool,
}

impl RecordingApplier {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }
}

#[async_trait]
impl ResourceApplier for RecordingApplier {
    async fn apply(&self, resources: &K8sResourceSet) -> Result<(), orchestration::Error> {
        if self.fail {
            return Err(orchestration::Error::MissingName {
                kind: "ConfigMap".to_owned(),
            });
        }
        self.applied.lock().await.push(resources.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingMailer {
    pub sent: Mutex<Vec<(String, Furl)>>,
    pub fail: bool,
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send_signup_confirmation(
        &self,
        customer_email: &str,
        introducer_furl: &Furl,
    ) -> Result<(), BoxedError> {
        if self.fail {
            return Err("SMTP server unavailable".into());
        }
        self.sent
            .lock()
            .await
            .push((customer_email.to_owned(), introducer_furl.clone()));
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub failures: Mutex<Vec<DeliveryFailure>>,
}

#[async_trait]
impl FailureNotifier for RecordingNotifier {
    async fn notify_failure(&self, failure: &DeliveryFailure) -> Result<(), BoxedError> {
        self.failures.lock().await.push(failure.clone());
        Ok(())
    }
}

/// A rendezvous server which cannot be reached.
pub struct UnreachableRendezvous;

#[async_trait]
impl Rendezvous for UnreachableRendezvous {
    async fn open(&self) -> Result<(WormholeCode, Box<dyn Wormhole>), WormholeError> {
        Err(WormholeError::Closed)
    }
}

pub fn provisioner(
    manager: FakeSubscriptionManager,
    applier: Arc<RecordingApplier>,
) -> Provisioner {
    Provisioner {
        manager: Arc::new(manager),
        applier,
        marshaler: Arc::new(TahoeConfigurationMarshaler),
        config: Arc::new(deployment_configuration()),
    }
}

pub fn diagnostics_path() -> PathBuf {
    PathBuf::from(DIAGNOSTICS_PATH)
}
