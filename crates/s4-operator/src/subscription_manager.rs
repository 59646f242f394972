//! Client side of the subscription manager, which persists subscriptions and
//! hands out ports and node key material.

use async_trait::async_trait;
use snafu::{ResultExt, Snafu};
use url::Url;

use crate::model::{SubscriptionDetails, SubscriptionRequest};

type Result<T, E = Error> = std::result::Result<T, E>;

const SUBSCRIPTIONS_PATH: [&str; 2] = ["v1", "subscriptions"];

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("subscription manager endpoint {endpoint} cannot be used as a base URL"))]
    BuildUrl { endpoint: Url },

    #[snafu(display("failed to send subscription request to {url}"))]
    Request { source: reqwest::Error, url: Url },

    #[snafu(display("subscription manager rejected the subscription with status {status}: {body}"))]
    Rejected {
        status: reqwest::StatusCode,
        body: String,
    },

    #[snafu(display("failed to decode subscription manager response"))]
    DecodeResponse { source: reqwest::Error },
}

/// Reserves everything a new subscription needs.
#[async_trait]
pub trait SubscriptionManager: Send + Sync {
    /// Creates the subscription described by `request`.
    ///
    /// The result is returned as received, callers are expected to
    /// [`SubscriptionDetails::validate`] it.
    async fn create(&self, request: &SubscriptionRequest) -> Result<SubscriptionDetails>;
}

/// Talks to the subscription manager over its HTTP API.
#[derive(Clone, Debug)]
pub struct HttpSubscriptionManager {
    client: reqwest::Client,
    endpoint: Url,
}

impl HttpSubscriptionManager {
    pub fn new(endpoint: Url) -> Self {
        Self::with_client(reqwest::Client::new(), endpoint)
    }

    pub fn with_client(client: reqwest::Client, endpoint: Url) -> Self {
        Self { client, endpoint }
    }

    fn subscriptions_url(&self) -> Result<Url> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|()| {
                BuildUrlSnafu {
                    endpoint: self.endpoint.clone(),
                }
                .build()
            })?
            .pop_if_empty()
            .extend(SUBSCRIPTIONS_PATH);
        Ok(url)
    }
}

#[async_trait]
impl SubscriptionManager for HttpSubscriptionManager {
    #[tracing::instrument(skip_all, fields(subscription = %request.subscription_id))]
    async fn create(&self, request: &SubscriptionRequest) -> Result<SubscriptionDetails> {
        let url = self.subscriptions_url()?;
        tracing::debug!(%url, "requesting subscription");

        let response = self
            .client
            .post(url.clone())
            .json(request)
            .send()
            .await
            .context(RequestSnafu { url })?;

        let status = response.status();
        if !status.is_success() {
            // The body is best effort, the status alone is enough to reject.
            let body = response.text().await.unwrap_or_default();
            return RejectedSnafu { status, body }.fail();
        }

        response.json().await.context(DecodeResponseSnafu)
    }
}
