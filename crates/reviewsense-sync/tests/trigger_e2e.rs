//! End-to-end trigger path against live axum servers on ephemeral ports.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use reviewsense_ai::{ModelError, Prediction, SentimentModel};
use reviewsense_api::{AppState, PredictionService, build_router};
use reviewsense_core::{ProcessingStatus, ReviewSubmission, SentimentLabel};
use reviewsense_store::{DuckStore, IncomingStore, Page, ResultStore};
use reviewsense_sync::{
    ChangeEvent, HookState, PredictClient, TriggerHandler, TriggerOutcome, hook_routes,
};
use serde_json::{Value, json};
use tokio::net::TcpListener;

struct KeywordModel;

#[async_trait]
impl SentimentModel for KeywordModel {
    fn model_id(&self) -> &str {
        "keyword-test-model"
    }

    async fn classify(&self, text: &str) -> Result<Prediction, ModelError> {
        let lower = text.to_lowercase();
        if lower.contains("terrible") || lower.contains("boring") {
            Prediction::from_raw("NEGATIVE", 0.93)
        } else {
            Prediction::from_raw("POSITIVE", 0.9998)
        }
    }
}

/// Takes long enough for a second delivery to arrive mid-prediction.
struct SlowModel;

#[async_trait]
impl SentimentModel for SlowModel {
    fn model_id(&self) -> &str {
        "slow-test-model"
    }

    async fn classify(&self, text: &str) -> Result<Prediction, ModelError> {
        tokio::time::sleep(Duration::from_millis(200)).await;
        KeywordModel.classify(text).await
    }
}

fn local_client(base_url: &str) -> PredictClient {
    let client = reqwest::Client::builder()
        .no_proxy()
        .timeout(PredictClient::TIMEOUT)
        .build()
        .unwrap();
    PredictClient::with_client(client, base_url)
}

async fn serve(listener: TcpListener, router: Router) {
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
}

async fn bind() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    (listener, url)
}

/// API and webhook routes on one server, both over the same store.
async fn spawn_full_server() -> (String, DuckStore) {
    spawn_full_server_with(Arc::new(KeywordModel)).await
}

async fn spawn_full_server_with(model: Arc<dyn SentimentModel>) -> (String, DuckStore) {
    let store = DuckStore::open().unwrap();
    let (listener, url) = bind().await;

    let service = PredictionService::new(model, Arc::new(store.clone()));
    let handler = TriggerHandler::new(local_client(&url), Arc::new(store.clone()));
    let router = build_router(AppState::new(service)).merge(hook_routes(HookState::new(handler)));

    serve(listener, router).await;
    (url, store)
}

/// A predict endpoint that always answers with `status`.
async fn spawn_failing_predict(status: StatusCode) -> String {
    let (listener, url) = bind().await;
    let router = Router::new().route(
        "/predict",
        post(move || async move { (status, axum::Json(json!({"error": "model unavailable"}))) }),
    );
    serve(listener, router).await;
    url
}

/// A predict endpoint that records each body it receives.
async fn spawn_capturing_predict() -> (String, Arc<Mutex<Vec<Value>>>) {
    let captured = Arc::new(Mutex::new(Vec::new()));
    let (listener, url) = bind().await;
    let router = Router::new()
        .route(
            "/predict",
            post(
                |State(seen): State<Arc<Mutex<Vec<Value>>>>, axum::Json(body): axum::Json<Value>| async move {
                    seen.lock().unwrap().push(body.clone());
                    axum::Json(json!({
                        "review": body["review"],
                        "sentiment": "NEGATIVE",
                        "confidence": 0.75,
                        "timestamp": "2026-03-01T12:00:00Z",
                        "movie_title": body["movie_title"],
                        "user_id": body["user_id"],
                        "model_version": "distilbert-sentiment"
                    }))
                },
            ),
        )
        .with_state(captured.clone());
    serve(listener, router).await;
    (url, captured)
}

#[tokio::test]
async fn fantastic_review_is_processed_with_service_output() {
    let (url, store) = spawn_full_server().await;
    let client = local_client(&url);
    let text = "This movie was absolutely fantastic!";

    let record = store
        .insert_incoming(&ReviewSubmission::new(text).with_movie_title("Test Movie"))
        .await
        .unwrap();
    let handler = TriggerHandler::new(client.clone(), Arc::new(store.clone()));
    let outcome = handler.handle(&ChangeEvent::for_record(&record)).await.unwrap();

    // Same text straight through the service.
    let direct = client.predict(&ReviewSubmission::new(text)).await.unwrap();

    let after = store.get_incoming(record.id).await.unwrap();
    assert_eq!(after.status, ProcessingStatus::Processed);
    assert_eq!(after.sentiment, Some(direct.sentiment));
    assert_eq!(after.sentiment, Some(SentimentLabel::Positive));
    assert_eq!(after.confidence, Some(direct.confidence));
    assert!(after.error.is_none());
    assert!(after.processed_at.is_some());
    assert!(matches!(outcome, TriggerOutcome::Processed { id, .. } if id == record.id));

    // One result from the trigger, one from the direct call.
    assert_eq!(store.result_count().await.unwrap(), 2);
}

#[tokio::test]
async fn non_200_marks_failed_with_message() {
    let store = DuckStore::open().unwrap();
    let url = spawn_failing_predict(StatusCode::SERVICE_UNAVAILABLE).await;
    let handler = TriggerHandler::new(local_client(&url), Arc::new(store.clone()));

    let record = store
        .insert_incoming(&ReviewSubmission::new("Terrible. Boring plot."))
        .await
        .unwrap();
    let outcome = handler.handle(&ChangeEvent::for_record(&record)).await.unwrap();

    let after = store.get_incoming(record.id).await.unwrap();
    assert_eq!(after.status, ProcessingStatus::Failed);
    let error = after.error.unwrap();
    assert!(!error.is_empty());
    assert!(error.contains("503"), "{error}");
    assert!(after.sentiment.is_none());
    assert!(matches!(outcome, TriggerOutcome::Failed { .. }));
    assert_eq!(store.result_count().await.unwrap(), 0);
}

#[tokio::test]
async fn created_but_not_ok_is_still_failure() {
    let store = DuckStore::open().unwrap();
    let url = spawn_failing_predict(StatusCode::CREATED).await;
    let handler = TriggerHandler::new(local_client(&url), Arc::new(store.clone()));

    let record = store
        .insert_incoming(&ReviewSubmission::new("fine"))
        .await
        .unwrap();
    handler.handle(&ChangeEvent::for_record(&record)).await.unwrap();
    assert_eq!(
        store.get_incoming(record.id).await.unwrap().status,
        ProcessingStatus::Failed
    );
}

#[tokio::test]
async fn unreachable_endpoint_marks_failed() {
    let store = DuckStore::open().unwrap();
    // Bind then drop so the port is closed.
    let (listener, url) = bind().await;
    drop(listener);
    let handler = TriggerHandler::new(local_client(&url), Arc::new(store.clone()));

    let record = store
        .insert_incoming(&ReviewSubmission::new("anything"))
        .await
        .unwrap();
    let outcome = handler.handle(&ChangeEvent::for_record(&record)).await.unwrap();
    let TriggerOutcome::Failed { error, .. } = outcome else {
        panic!("expected failure, got {outcome:?}");
    };
    assert!(!error.is_empty());
}

#[tokio::test]
async fn payload_sends_explicit_nulls() {
    let store = DuckStore::open().unwrap();
    let (url, captured) = spawn_capturing_predict().await;
    let handler = TriggerHandler::new(local_client(&url), Arc::new(store.clone()));

    let record = store
        .insert_incoming(&ReviewSubmission::new("Meh."))
        .await
        .unwrap();
    let event: ChangeEvent = serde_json::from_value(json!({
        "detail": {"fullDocument": {"_id": record.id, "review": "Meh."}}
    }))
    .unwrap();
    handler.handle(&event).await.unwrap();

    let seen = captured.lock().unwrap().clone();
    assert_eq!(
        seen,
        vec![json!({"review": "Meh.", "movie_title": null, "user_id": null})]
    );
    let after = store.get_incoming(record.id).await.unwrap();
    assert_eq!(after.sentiment, Some(SentimentLabel::Negative));
    assert_eq!(after.confidence, Some(0.75));
}

#[tokio::test]
async fn events_without_document_or_id_are_skipped() {
    let store = DuckStore::open().unwrap();
    let (url, captured) = spawn_capturing_predict().await;
    let handler = TriggerHandler::new(local_client(&url), Arc::new(store.clone()));

    for event in [
        json!({}),
        json!({"detail": {}}),
        json!({"detail": {"fullDocument": {"review": "no id"}}}),
        json!({"detail": {"fullDocument": {"_id": {"$oid": "65f1c0ffee"}, "review": "x"}}}),
        json!({"detail": {"fullDocument": {"_id": 999, "review": "unknown record"}}}),
    ] {
        let event: ChangeEvent = serde_json::from_value(event).unwrap();
        let outcome = handler.handle(&event).await.unwrap();
        assert!(matches!(outcome, TriggerOutcome::Skipped { .. }), "{outcome:?}");
    }
    assert!(captured.lock().unwrap().is_empty());
}

#[tokio::test]
async fn terminal_record_is_not_reprocessed() {
    let store = DuckStore::open().unwrap();
    let url = spawn_failing_predict(StatusCode::INTERNAL_SERVER_ERROR).await;
    let handler = TriggerHandler::new(local_client(&url), Arc::new(store.clone()));

    let record = store
        .insert_incoming(&ReviewSubmission::new("once"))
        .await
        .unwrap();
    let event = ChangeEvent::for_record(&record);
    assert!(matches!(
        handler.handle(&event).await.unwrap(),
        TriggerOutcome::Failed { .. }
    ));
    let first_error = store.get_incoming(record.id).await.unwrap().error;

    // Redelivery leaves the failed record untouched.
    assert!(matches!(
        handler.handle(&event).await.unwrap(),
        TriggerOutcome::Skipped { .. }
    ));
    let after = store.get_incoming(record.id).await.unwrap();
    assert_eq!(after.status, ProcessingStatus::Failed);
    assert_eq!(after.error, first_error);
}

#[tokio::test]
async fn concurrent_redelivery_predicts_once() {
    let (url, store) = spawn_full_server_with(Arc::new(SlowModel)).await;
    let handler = TriggerHandler::new(local_client(&url), Arc::new(store.clone()));

    let record = store
        .insert_incoming(&ReviewSubmission::new("Delivered twice, scored once."))
        .await
        .unwrap();
    let event = ChangeEvent::for_record(&record);

    let (first, second) = tokio::join!(handler.handle(&event), handler.handle(&event));
    let outcomes = [first.unwrap(), second.unwrap()];

    let processed = outcomes
        .iter()
        .filter(|o| matches!(o, TriggerOutcome::Processed { .. }))
        .count();
    let skipped = outcomes
        .iter()
        .filter(|o| matches!(o, TriggerOutcome::Skipped { .. }))
        .count();
    assert_eq!((processed, skipped), (1, 1), "{outcomes:?}");

    assert_eq!(store.result_count().await.unwrap(), 1);
    assert_eq!(
        store.get_incoming(record.id).await.unwrap().status,
        ProcessingStatus::Processed
    );
}

// =============================================================================
// Webhook routes through the client
// =============================================================================

#[tokio::test]
async fn submit_incoming_processes_synchronously() {
    let (url, store) = spawn_full_server().await;
    let client = local_client(&url);

    let record = client
        .submit_incoming(
            &ReviewSubmission::new("Terrible movie. Boring plot, bad acting.")
                .with_movie_title("The Boring Disaster")
                .with_user_id("user456"),
        )
        .await
        .unwrap();
    assert_eq!(record.status, ProcessingStatus::Processed);
    assert_eq!(record.sentiment, Some(SentimentLabel::Negative));
    assert_eq!(record.movie_title.as_deref(), Some("The Boring Disaster"));

    let listed = client.list_incoming(Page::default()).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, record.id);

    let results = store.list(Page::new(1, 0)).await.unwrap();
    assert_eq!(results[0].result.review, record.review);
}

#[tokio::test]
async fn blank_incoming_review_ends_failed() {
    let (url, store) = spawn_full_server().await;
    let client = local_client(&url);

    let record = client
        .submit_incoming(&ReviewSubmission::new("   "))
        .await
        .unwrap();
    assert_eq!(record.status, ProcessingStatus::Failed);
    assert!(record.error.unwrap().contains("Review text cannot be empty"));
    assert_eq!(store.result_count().await.unwrap(), 0);
}

#[tokio::test]
async fn deliver_event_over_http() {
    let (url, store) = spawn_full_server().await;
    let client = local_client(&url);

    let record = store
        .insert_incoming(&ReviewSubmission::new("Incredible performance by the lead actor."))
        .await
        .unwrap();
    let outcome = client
        .deliver_event(&ChangeEvent::for_record(&record))
        .await
        .unwrap();
    assert!(matches!(
        outcome,
        TriggerOutcome::Processed { sentiment: SentimentLabel::Positive, .. }
    ));

    let skipped = client.deliver_event(&ChangeEvent::default()).await.unwrap();
    assert!(matches!(skipped, TriggerOutcome::Skipped { .. }));
}

#[tokio::test]
async fn client_reads_reviews_stats_and_health() {
    let (url, _store) = spawn_full_server().await;
    let client = local_client(&url);

    client
        .predict(&ReviewSubmission::new("great fun"))
        .await
        .unwrap();
    client
        .predict(&ReviewSubmission::new("boring"))
        .await
        .unwrap();

    let page = client.reviews(Page::new(1, 0)).await.unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.reviews[0].result.review, "boring");

    let stats = client.stats().await.unwrap();
    assert_eq!((stats.total, stats.positive_count, stats.negative_count), (2, 1, 1));

    assert_eq!(client.health().await.unwrap().status, "healthy");

    let err = client
        .predict(&ReviewSubmission::new(""))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("400"), "{err}");
}
