use std::{fmt, path::PathBuf, sync::Arc};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use snafu::{ResultExt, Snafu, ensure};
use tokio::task::JoinHandle;
use tracing::Instrument;

use super::{
    DeliveryFailure, DeliveryOutcome, FailureNotifier, SignupState, report_failure, transition,
};
use crate::{furl::Furl, model::SubscriptionDetails};

/// The only client protocol version we speak.
const CLIENT_ABILITY: &str = "client-v1";
const SERVER_ABILITY: &str = "server-v1";

/// The grids have a single storage server, so every share goes there.
const SINGLE_SHARE: &str = "1";

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(super)))]
pub enum Error {
    #[snafu(display("wormhole code {code} is unknown or already claimed"))]
    UnknownCode { code: WormholeCode },

    #[snafu(display("the other side closed the wormhole"))]
    Closed,

    #[snafu(display("failed to encode wormhole message"))]
    EncodeMessage { source: serde_json::Error },

    #[snafu(display("received a wormhole message which is not JSON"))]
    DecodeMessage { source: serde_json::Error },

    #[snafu(display("client sent unrecognized abilities {message}"))]
    UnrecognizedAbilities { message: Value },
}

/// The short, human-transcribable code identifying one wormhole.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WormholeCode(String);

impl WormholeCode {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WormholeCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One end of an open wormhole, exchanging JSON messages in order.
#[async_trait]
pub trait Wormhole: Send {
    async fn send_json(&mut self, message: &Value) -> Result<(), Error>;
    async fn receive_json(&mut self) -> Result<Value, Error>;
}

/// Allocates wormholes on a rendezvous server.
#[async_trait]
pub trait Rendezvous: Send + Sync {
    /// Opens a new wormhole and returns its code together with our end.
    async fn open(&self) -> Result<(WormholeCode, Box<dyn Wormhole>), Error>;
}

/// What a client needs to connect to its grid.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ClientConfiguration {
    pub introducer: Furl,
    pub shares_needed: String,
    pub shares_happy: String,
    pub shares_total: String,
    pub nickname: String,
}

impl ClientConfiguration {
    pub fn for_subscription(details: &SubscriptionDetails) -> Self {
        Self {
            introducer: details.external_introducer_furl.clone(),
            shares_needed: SINGLE_SHARE.to_owned(),
            shares_happy: SINGLE_SHARE.to_owned(),
            shares_total: SINGLE_SHARE.to_owned(),
            nickname: details.bucket_name.clone(),
        }
    }
}

/// Runs the server side of the invite handshake: wait for the client's
/// abilities, announce ours and hand over `configuration`.
pub async fn handshake(
    wormhole: &mut dyn Wormhole,
    configuration: &ClientConfiguration,
) -> Result<(), Error> {
    let message = wormhole.receive_json().await?;
    let client_v1 = message
        .get("abilities")
        .and_then(Value::as_object)
        .and_then(|abilities| abilities.get(CLIENT_ABILITY))
        .is_some_and(Value::is_object);
    ensure!(client_v1, UnrecognizedAbilitiesSnafu { message });
    tracing::debug!("client announced {CLIENT_ABILITY}");

    wormhole
        .send_json(&json!({"abilities": {SERVER_ABILITY: {}}}))
        .await?;

    let configuration = serde_json::to_value(configuration).context(EncodeMessageSnafu)?;
    wormhole.send_json(&configuration).await
}

/// Delivers the client configuration through a magic wormhole.
#[derive(Clone)]
pub struct WormholeSignup {
    pub rendezvous: Arc<dyn Rendezvous>,
}

impl WormholeSignup {
    pub fn new(rendezvous: Arc<dyn Rendezvous>) -> Self {
        Self { rendezvous }
    }

    /// Opens a wormhole and spawns the handshake on it.
    ///
    /// Returns as soon as the code is known, the customer needs it to
    /// connect. The handshake result is available through the returned
    /// handle.
    pub(super) async fn deliver(
        &self,
        details: &SubscriptionDetails,
        notifier: Arc<dyn FailureNotifier>,
        diagnostics: PathBuf,
    ) -> Result<(WormholeCode, JoinHandle<DeliveryOutcome>), Error> {
        let (code, mut wormhole) = self.rendezvous.open().await?;
        tracing::info!(%code, "opened wormhole");

        let configuration = ClientConfiguration::for_subscription(details);
        let customer_email = details.customer_email.clone();
        let delivery = tokio::spawn(
            async move {
                match handshake(wormhole.as_mut(), &configuration).await {
                    Ok(()) => {
                        transition(SignupState::Delivered);
                        DeliveryOutcome::Delivered
                    }
                    Err(error) => {
                        let reason = snafu::Report::from_error(&error).to_string();
                        let failure = DeliveryFailure {
                            reason: reason.clone(),
                            customer_email,
                            diagnostics,
                            stage: SignupState::Delivering,
                        };
                        report_failure(notifier.as_ref(), failure).await;
                        DeliveryOutcome::Failed { reason }
                    }
                }
            }
            .instrument(tracing::Span::current()),
        );

        Ok((code, delivery))
    }
}
