//! The signup workflow, from a billing event to delivered credentials.
//!
//! Every signup walks through the [`SignupState`]s:
//!
//! ```text
//! Requested -> Provisioned -> Delivering -> Delivered
//!                   |                    \-> DeliveryFailed
//!                   \-----------------------> DeliveryFailed
//! ```
//!
//! The [`Provisioner`] reserves the subscription and applies its resources.
//! The introducer furl is then delivered through exactly one
//! [`SignupChannel`]. Once the subscription is reserved, every failure is
//! reported to a [`FailureNotifier`] so that an operator can follow up with
//! the customer.

use std::{path::PathBuf, sync::Arc};

use async_trait::async_trait;
use snafu::{ResultExt, Snafu};
use tokio::task::JoinHandle;

use crate::{
    config::DeploymentConfiguration,
    marshal::ConfigurationMarshaler,
    model::{self, SubscriptionDetails, SubscriptionRequest},
    orchestration::{self, ResourceApplier},
    resources::{self, K8sResourceSet},
    subscription_manager::{self, SubscriptionManager},
};

mod email;
mod memory;
mod wormhole;

pub use email::{EmailSignup, Mailer};
pub use memory::{MemoryWormhole, MemoryWormholeServer};
pub use wormhole::{
    ClientConfiguration, Error as WormholeError, Rendezvous, Wormhole, WormholeCode,
    WormholeSignup,
};

type Result<T, E = Error> = std::result::Result<T, E>;

/// Error type used by the collaborators the workflow does not own, like the
/// mailer.
pub type BoxedError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to reserve subscription"))]
    Reservation {
        source: subscription_manager::Error,
    },

    #[snafu(display("subscription manager returned an invalid reservation"))]
    InvalidReservation { source: model::Error },

    #[snafu(display("failed to synthesize resources"))]
    SynthesizeResources { source: resources::Error },

    /// The subscription is reserved but its resources are not (fully)
    /// applied. Re-applying `resources` completes the provisioning.
    #[snafu(display("failed to apply resources of a reserved subscription"))]
    ApplyResources {
        source: orchestration::Error,
        resources: Box<K8sResourceSet>,
    },

    #[snafu(display("failed to open wormhole"))]
    OpenWormhole { source: WormholeError },
}

impl Error {
    /// Whether the subscription manager holds a valid reservation for the
    /// failed signup.
    pub fn is_reserved(&self) -> bool {
        !matches!(
            self,
            Self::Reservation { .. } | Self::InvalidReservation { .. }
        )
    }
}

/// The stages of a signup. Every transition is logged.
#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::Display)]
pub enum SignupState {
    Requested,
    Provisioned,
    Delivering,
    Delivered,
    DeliveryFailed,
}

fn transition(state: SignupState) {
    tracing::info!(%state, "signup state changed");
}

/// A reserved subscription whose resources have been applied.
#[derive(Clone, Debug, PartialEq)]
pub struct Provisioned {
    pub details: SubscriptionDetails,
    pub resources: K8sResourceSet,
}

/// Turns a [`SubscriptionRequest`] into running infrastructure.
#[derive(Clone)]
pub struct Provisioner {
    pub manager: Arc<dyn SubscriptionManager>,
    pub applier: Arc<dyn ResourceApplier>,
    pub marshaler: Arc<dyn ConfigurationMarshaler>,
    pub config: Arc<DeploymentConfiguration>,
}

impl Provisioner {
    /// Reserves the subscription, then synthesizes and applies its
    /// resources. Nothing is retried.
    pub async fn provision(&self, request: &SubscriptionRequest) -> Result<Provisioned> {
        let details = self
            .manager
            .create(request)
            .await
            .context(ReservationSnafu)?
            .validate()
            .context(InvalidReservationSnafu)?;

        transition(SignupState::Provisioned);
        tracing::debug!(
            introducer_port = details.introducer_port_number,
            storage_port = details.storage_port_number,
            "subscription reserved"
        );

        let resources =
            K8sResourceSet::synthesize(&self.config, &details, self.marshaler.as_ref(), None)
                .context(SynthesizeResourcesSnafu)?;

        if let Err(source) = self.applier.apply(&resources).await {
            return Err(Error::ApplyResources {
                source,
                resources: Box::new(resources),
            });
        }

        Ok(Provisioned { details, resources })
    }
}

/// Why a reserved subscription never reached its customer, as passed to
/// the [`FailureNotifier`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeliveryFailure {
    pub reason: String,
    pub customer_email: String,
    /// Log file with details on the failure, to be attached to the report.
    pub diagnostics: PathBuf,
    /// The state the signup was in when it failed, either
    /// [`SignupState::Provisioned`] or [`SignupState::Delivering`].
    pub stage: SignupState,
}

/// Tells a human about signups which did not complete.
#[async_trait]
pub trait FailureNotifier: Send + Sync {
    async fn notify_failure(&self, failure: &DeliveryFailure) -> Result<(), BoxedError>;
}

/// Moves the signup to [`SignupState::DeliveryFailed`] and reports
/// `failure` to `notifier`. Errors of the notifier itself are only logged,
/// there is nobody left to tell.
async fn report_failure(notifier: &dyn FailureNotifier, failure: DeliveryFailure) {
    if failure.stage == SignupState::Delivering {
        tracing::warn!(reason = failure.reason, "signup delivery failed");
    } else {
        tracing::warn!(
            reason = failure.reason,
            stage = %failure.stage,
            "provisioning of a reserved subscription failed"
        );
    }
    transition(SignupState::DeliveryFailed);

    if let Err(error) = notifier.notify_failure(&failure).await {
        tracing::error!(
            error = &*error as &dyn std::error::Error,
            "failed to send failure notification"
        );
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    Failed { reason: String },
}

/// How the customer receives the introducer furl.
#[derive(Clone)]
pub enum SignupChannel {
    Email(EmailSignup),
    Wormhole(WormholeSignup),
}

/// What the caller gets back from a [`Signup`].
#[derive(Debug)]
pub enum SignupClaim {
    /// The email was sent, or failed to send, before returning.
    Email { outcome: DeliveryOutcome },

    /// The customer has to enter `code` into their client. `delivery`
    /// completes once the client configuration was handed over, or the
    /// handshake failed.
    Wormhole {
        code: WormholeCode,
        delivery: JoinHandle<DeliveryOutcome>,
    },
}

/// A provisioner wired to one delivery channel.
#[derive(Clone)]
pub struct Signup {
    pub provisioner: Provisioner,
    pub channel: SignupChannel,
    pub notifier: Arc<dyn FailureNotifier>,
    pub diagnostics_path: PathBuf,
}

impl Signup {
    #[tracing::instrument(
        skip_all,
        fields(subscription = %request.subscription_id, plan = request.plan_id.as_str())
    )]
    pub async fn signup(&self, request: SubscriptionRequest) -> Result<SignupClaim> {
        transition(SignupState::Requested);

        let provisioned = match self.provisioner.provision(&request).await {
            Ok(provisioned) => provisioned,
            Err(error) => {
                if error.is_reserved() {
                    self.report(&request, &error, SignupState::Provisioned)
                        .await;
                }
                return Err(error);
            }
        };

        transition(SignupState::Delivering);
        match &self.channel {
            SignupChannel::Email(email) => {
                let outcome = email
                    .deliver(
                        &provisioned.details,
                        self.notifier.as_ref(),
                        self.diagnostics_path.clone(),
                    )
                    .await;
                Ok(SignupClaim::Email { outcome })
            }
            SignupChannel::Wormhole(wormhole) => {
                let opened = wormhole
                    .deliver(
                        &provisioned.details,
                        Arc::clone(&self.notifier),
                        self.diagnostics_path.clone(),
                    )
                    .await
                    .context(OpenWormholeSnafu);

                match opened {
                    Ok((code, delivery)) => Ok(SignupClaim::Wormhole { code, delivery }),
                    Err(error) => {
                        self.report(&request, &error, SignupState::Delivering)
                            .await;
                        Err(error)
                    }
                }
            }
        }
    }

    async fn report(&self, request: &SubscriptionRequest, error: &Error, stage: SignupState) {
        let failure = DeliveryFailure {
            reason: snafu::Report::from_error(error).to_string(),
            customer_email: request.customer_email.clone(),
            diagnostics: self.diagnostics_path.clone(),
            stage,
        };
        report_failure(self.notifier.as_ref(), failure).await;
    }
}
