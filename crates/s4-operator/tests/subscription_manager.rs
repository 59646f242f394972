use axum::{Json, Router, http::StatusCode, routing::post};
use s4_operator::{
    model::{SubscriptionDetails, SubscriptionId, SubscriptionRequest},
    subscription_manager::{Error, HttpSubscriptionManager, SubscriptionManager},
};
use tokio::net::TcpListener;
use url::Url;

mod common;

/// Serves `router` on a random local port and returns its base URL.
async fn serve(router: Router) -> Url {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, router).await });

    format!("http://{address}/api/").parse().unwrap()
}

#[tokio::test]
async fn posts_request_and_decodes_details() {
    let router = Router::new().route(
        "/api/v1/subscriptions",
        post(|Json(request): Json<SubscriptionRequest>| async move {
            Json(common::subscription_details(&request))
        }),
    );
    let manager = HttpSubscriptionManager::new(serve(router).await);
    let request = common::subscription_request(SubscriptionId::new("sub_x14Characterx"));

    let details: SubscriptionDetails = manager.create(&request).await.unwrap();

    assert_eq!(details, common::subscription_details(&request));
}

#[tokio::test]
async fn error_status_is_a_rejection() {
    let router = Router::new().route(
        "/api/v1/subscriptions",
        post(|| async { (StatusCode::CONFLICT, "subscription exists") }),
    );
    let manager = HttpSubscriptionManager::new(serve(router).await);

    let result = manager
        .create(&common::subscription_request(SubscriptionId::new("sub_1")))
        .await;

    let Err(Error::Rejected { status, body }) = result else {
        panic!("expected a rejection, got {result:?}");
    };
    assert_eq!(status.as_u16(), 409);
    assert_eq!(body, "subscription exists");
}

#[tokio::test]
async fn malformed_response_fails_to_decode() {
    let router = Router::new().route(
        "/api/v1/subscriptions",
        post(|| async { Json(serde_json::json!({"subscription_id": "sub_1"})) }),
    );
    let manager = HttpSubscriptionManager::new(serve(router).await);

    let result = manager
        .create(&common::subscription_request(SubscriptionId::new("sub_1")))
        .await;

    assert!(matches!(result, Err(Error::DecodeResponse { .. })));
}
