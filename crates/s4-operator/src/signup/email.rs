use std::{path::PathBuf, sync::Arc};

use async_trait::async_trait;

use super::{
    BoxedError, DeliveryFailure, DeliveryOutcome, FailureNotifier, SignupState, report_failure,
    transition,
};
use crate::{furl::Furl, model::SubscriptionDetails};

/// Sends the signup confirmation carrying the introducer furl.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_signup_confirmation(
        &self,
        customer_email: &str,
        introducer_furl: &Furl,
    ) -> Result<(), BoxedError>;
}

/// Delivers the introducer furl by email.
#[derive(Clone)]
pub struct EmailSignup {
    pub mailer: Arc<dyn Mailer>,
}

impl EmailSignup {
    pub fn new(mailer: Arc<dyn Mailer>) -> Self {
        Self { mailer }
    }

    pub(super) async fn deliver(
        &self,
        details: &SubscriptionDetails,
        notifier: &dyn FailureNotifier,
        diagnostics: PathBuf,
    ) -> DeliveryOutcome {
        match self
            .mailer
            .send_signup_confirmation(&details.customer_email, &details.external_introducer_furl)
            .await
        {
            Ok(()) => {
                transition(SignupState::Delivered);
                DeliveryOutcome::Delivered
            }
            Err(error) => {
                let reason = format!("failed to send signup confirmation: {error}");
                let failure = DeliveryFailure {
                    reason: reason.clone(),
                    customer_email: details.customer_email.clone(),
                    diagnostics,
                    stage: SignupState::Delivering,
                };
                report_failure(notifier, failure).await;
                DeliveryOutcome::Failed { reason }
            }
        }
    }
}
