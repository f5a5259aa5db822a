mod fixtures;
mod helpers;

use std::time::Duration;
use tokio_util::sync::CancellationToken;

use settlenet_serve::client::http::{ClientError, ProgressClient, Submission};
use settlenet_serve::client::poller::{PollError, PollOutcome, ProgressPoller, StatusSource};
use settlenet_serve::models::job::JobStatus;
use helpers::TestApp;

const POLL: Duration = Duration::from_millis(25);

/// Serve the test app on an ephemeral port and return its base URL.
async fn serve(app: &TestApp) -> (String, tokio::task::JoinHandle<()>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = app.router.clone();
    let handle = tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    (format!("http://{addr}"), handle)
}

fn satellite_submission() -> Submission {
    Submission {
        model_type: "convnext_satellite".to_string(),
        modality: Some("satellite".to_string()),
        threshold: Some(0.5),
    }
}

#[tokio::test]
async fn test_poller_follows_job_to_completion() {
    let app = TestApp::new();
    let (base_url, server) = serve(&app).await;
    let client = ProgressClient::new(&base_url).unwrap();

    let job_id = client
        .submit(fixtures::satellite_archive(6), "tiles.zip", &satellite_submission())
        .await
        .unwrap();

    let mut views = Vec::new();
    let outcome = ProgressPoller::new(POLL)
        .run(&client, job_id, &CancellationToken::new(), |view| {
            views.push(view.clone())
        })
        .await
        .unwrap();

    let PollOutcome::Completed(result) = outcome else {
        panic!("expected completion, got {outcome:?}");
    };
    assert_eq!(result.metadata.tiles_processed, 6);
    assert_eq!(result.metadata.threshold, 0.5);

    let last = views.last().unwrap();
    assert_eq!(last.status, JobStatus::Completed);
    assert_eq!(last.describe(), "6/6 tiles");
    assert!(views.windows(2).all(|w| w[0].progress <= w[1].progress));

    server.abort();
}

#[tokio::test]
async fn test_poller_reports_failure_details() {
    let app = TestApp::new();
    let (base_url, server) = serve(&app).await;
    let client = ProgressClient::new(&base_url).unwrap();

    let submission = Submission {
        model_type: "convnext_all".to_string(),
        modality: None,
        threshold: None,
    };
    let job_id = client
        .submit(fixtures::satellite_archive(2), "tiles.zip", &submission)
        .await
        .unwrap();

    let outcome = ProgressPoller::new(POLL)
        .run(&client, job_id, &CancellationToken::new(), |_| {})
        .await
        .unwrap();
    match outcome {
        PollOutcome::Failed { error, .. } => assert!(error.contains("bc-256")),
        other => panic!("expected failure, got {other:?}"),
    }

    server.abort();
}

#[tokio::test]
async fn test_rejected_upload_surfaces_server_message() {
    let app = TestApp::new();
    let (base_url, server) = serve(&app).await;
    let client = ProgressClient::new(&base_url).unwrap();

    let err = client
        .submit(b"not a zip".to_vec(), "tiles.zip", &satellite_submission())
        .await
        .unwrap_err();
    match err {
        ClientError::Rejected { status, message } => {
            assert_eq!(status, 400);
            assert!(message.contains("ZIP"), "{message}");
        }
        other => panic!("expected rejection, got {other:?}"),
    }

    server.abort();
}

#[tokio::test]
async fn test_unknown_job_is_not_found() {
    let app = TestApp::new();
    let (base_url, server) = serve(&app).await;
    let client = ProgressClient::new(&base_url).unwrap();

    let missing = uuid::Uuid::new_v4();
    let err = client.fetch(missing).await.unwrap_err();
    assert!(matches!(err, PollError::NotFound(id) if id == missing));

    server.abort();
}

#[tokio::test]
async fn test_unreachable_server_stops_polling() {
    // Bind then drop to get a port with nothing listening.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = ProgressClient::new(&format!("http://{addr}")).unwrap();
    let mut updates = 0;
    let err = ProgressPoller::new(POLL)
        .run(&client, uuid::Uuid::new_v4(), &CancellationToken::new(), |_| {
            updates += 1
        })
        .await
        .unwrap_err();

    assert!(matches!(err, PollError::Transport(_)));
    assert_eq!(updates, 0);
}
