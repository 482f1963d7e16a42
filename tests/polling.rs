//! End-to-end loop behavior against stubbed detection services: back-pressure,
//! reset gating, late-response discard, verification flow.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::{sleep, timeout};

use blinkgate::capture::TestPatternSource;
use blinkgate::client::{ClientError, DetectResponse, DetectionApi, ResetResponse};
use blinkgate::config::Settings;
use blinkgate::polling::DetectionController;
use blinkgate::session::presenter::CONNECTION_ERROR_MESSAGE;
use blinkgate::session::{SessionState, SessionStatus};

struct StubClient {
    reset_calls: AtomicUsize,
    detect_calls: AtomicUsize,
    fail_reset: bool,
    fail_detect_status: Option<u16>,
    never_resolve: bool,
    detect_delay: Duration,
    script: Mutex<VecDeque<DetectResponse>>,
    fallback: DetectResponse,
}

impl StubClient {
    fn new() -> Self {
        Self {
            reset_calls: AtomicUsize::new(0),
            detect_calls: AtomicUsize::new(0),
            fail_reset: false,
            fail_detect_status: None,
            never_resolve: false,
            detect_delay: Duration::ZERO,
            script: Mutex::new(VecDeque::new()),
            fallback: success(0, 0, Some(0.35)),
        }
    }

    /// Serve the given responses in order, then keep repeating the last one.
    fn scripted(responses: Vec<DetectResponse>) -> Self {
        let mut stub = Self::new();
        if let Some(last) = responses.last() {
            stub.fallback = last.clone();
        }
        stub.script = Mutex::new(responses.into());
        stub
    }
}

#[async_trait]
impl DetectionApi for StubClient {
    async fn detect(&self, _frame: &str) -> Result<DetectResponse, ClientError> {
        self.detect_calls.fetch_add(1, Ordering::SeqCst);
        if self.never_resolve {
            std::future::pending::<()>().await;
        }
        if self.detect_delay > Duration::ZERO {
            sleep(self.detect_delay).await;
        }
        if let Some(status) = self.fail_detect_status {
            return Err(ClientError::Status(status));
        }
        let scripted = self.script.lock().await.pop_front();
        Ok(scripted.unwrap_or_else(|| self.fallback.clone()))
    }

    async fn reset(&self) -> Result<ResetResponse, ClientError> {
        self.reset_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_reset {
            return Err(ClientError::Status(500));
        }
        Ok(ResetResponse::default())
    }
}

fn success(blinks: u64, score: u64, ear: Option<f64>) -> DetectResponse {
    DetectResponse {
        status: Some("success".into()),
        message: Some("Face processed".into()),
        error: None,
        blink_count: Some(blinks),
        liveness_score: Some(score),
        ear,
    }
}

fn no_face(blinks: u64, score: u64) -> DetectResponse {
    DetectResponse {
        error: Some("No face detected".into()),
        blink_count: Some(blinks),
        liveness_score: Some(score),
        ear: Some(0.0),
        ..DetectResponse::default()
    }
}

fn fast_settings() -> Settings {
    Settings {
        poll_interval_ms: 20,
        ..Settings::default()
    }
}

async fn ready_controller(client: Arc<StubClient>) -> DetectionController {
    let controller = DetectionController::new(client, &fast_settings());
    controller
        .attach_source(Box::new(TestPatternSource::new(64, 48)))
        .await
        .unwrap();
    controller
}

async fn wait_until(
    controller: &DetectionController,
    predicate: impl Fn(&SessionState) -> bool,
) -> SessionState {
    for _ in 0..100 {
        let state = controller.get_state().await;
        if predicate(&state) {
            return state;
        }
        sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached within timeout");
}

#[tokio::test]
async fn test_at_most_one_request_in_flight() {
    let client = Arc::new(StubClient {
        never_resolve: true,
        ..StubClient::new()
    });
    let controller = ready_controller(Arc::clone(&client)).await;

    controller.start().await.unwrap();
    // A dozen tick intervals pass while the first request hangs.
    sleep(Duration::from_millis(250)).await;
    assert_eq!(client.detect_calls.load(Ordering::SeqCst), 1);

    controller.stop().await.unwrap();
}

#[tokio::test]
async fn test_exactly_one_reset_per_start() {
    let client = Arc::new(StubClient::new());
    let controller = ready_controller(Arc::clone(&client)).await;

    controller.start().await.unwrap();
    controller.start().await.unwrap(); // no-op while running
    sleep(Duration::from_millis(60)).await;
    controller.stop().await.unwrap();

    controller.start().await.unwrap();
    controller.stop().await.unwrap();

    assert_eq!(client.reset_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_reset_failure_blocks_the_run() {
    let client = Arc::new(StubClient {
        fail_reset: true,
        ..StubClient::new()
    });
    let controller = ready_controller(Arc::clone(&client)).await;

    assert!(controller.start().await.is_err());
    let state = controller.get_state().await;
    assert!(!state.active);
    assert!(matches!(state.status, SessionStatus::Error(_)));

    sleep(Duration::from_millis(100)).await;
    assert_eq!(client.detect_calls.load(Ordering::SeqCst), 0);
    assert!(!controller.is_running().await);
}

#[tokio::test]
async fn test_late_response_is_discarded_after_stop() {
    let client = Arc::new(StubClient {
        detect_delay: Duration::from_millis(150),
        script: Mutex::new(VecDeque::from(vec![success(7, 70, Some(0.2))])),
        ..StubClient::new()
    });
    let controller = ready_controller(Arc::clone(&client)).await;

    controller.start().await.unwrap();
    sleep(Duration::from_millis(50)).await; // first request sent, still in flight
    assert_eq!(client.detect_calls.load(Ordering::SeqCst), 1);
    controller.stop().await.unwrap();

    sleep(Duration::from_millis(300)).await; // response lands after the stop
    let state = controller.get_state().await;
    assert_eq!(state.metrics.blink_count, 0);
    assert_eq!(state.metrics.liveness_score, 0);
    assert_eq!(state.status, SessionStatus::Ready);
    assert!(!state.in_flight);
}

#[tokio::test]
async fn test_verification_threshold_crossing() {
    let client = Arc::new(StubClient::scripted(vec![
        success(1, 29, Some(0.31)),
        success(2, 30, Some(0.28)),
        success(2, 30, Some(0.28)),
    ]));
    let controller = ready_controller(Arc::clone(&client)).await;

    controller.start().await.unwrap();
    let state = wait_until(&controller, |state| state.metrics.liveness_score >= 30).await;
    assert_eq!(state.status, SessionStatus::Verified);
    assert_eq!(state.metrics.blink_count, 2);

    // Further responses at the same score keep the session verified.
    sleep(Duration::from_millis(100)).await;
    assert_eq!(controller.get_state().await.status, SessionStatus::Verified);

    controller.stop().await.unwrap();
}

#[tokio::test]
async fn test_no_face_keeps_counters_and_surfaces_status() {
    let client = Arc::new(StubClient::scripted(vec![
        success(2, 20, Some(0.3)),
        no_face(9, 90),
    ]));
    let controller = ready_controller(Arc::clone(&client)).await;

    controller.start().await.unwrap();
    let state = wait_until(&controller, |state| state.status == SessionStatus::NoFace).await;
    assert_eq!(state.metrics.blink_count, 2);
    assert_eq!(state.metrics.liveness_score, 20);

    controller.stop().await.unwrap();
}

#[tokio::test]
async fn test_transport_failure_maps_to_generic_connection_error() {
    let client = Arc::new(StubClient {
        fail_detect_status: Some(502),
        ..StubClient::new()
    });
    let controller = ready_controller(Arc::clone(&client)).await;

    controller.start().await.unwrap();
    let state = wait_until(&controller, |state| {
        matches!(state.status, SessionStatus::Error(_))
    })
    .await;
    assert_eq!(
        state.status,
        SessionStatus::Error(CONNECTION_ERROR_MESSAGE.to_string())
    );
    assert_eq!(state.metrics.blink_count, 0);

    controller.stop().await.unwrap();
}

#[tokio::test]
async fn test_stop_is_idempotent() {
    let client = Arc::new(StubClient::new());
    let controller = ready_controller(Arc::clone(&client)).await;

    controller.stop().await.unwrap(); // never started
    controller.start().await.unwrap();
    controller.stop().await.unwrap();
    controller.stop().await.unwrap();
    assert!(!controller.is_running().await);
}

#[tokio::test]
async fn test_start_requires_an_attached_source() {
    let client = Arc::new(StubClient::new());
    let controller = DetectionController::new(client.clone(), &fast_settings());

    assert!(controller.start().await.is_err());
    assert_eq!(client.reset_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_toggle_flips_detection() {
    let client = Arc::new(StubClient::new());
    let controller = ready_controller(Arc::clone(&client)).await;

    assert!(controller.toggle().await.unwrap());
    assert!(controller.is_running().await);
    assert!(!controller.toggle().await.unwrap());
    assert!(!controller.is_running().await);
}

#[tokio::test]
async fn test_view_frames_report_blink_pulse_and_guide_hint() {
    let client = Arc::new(StubClient::scripted(vec![
        success(0, 0, Some(0.35)),
        success(1, 10, Some(0.2)),
    ]));
    let controller = ready_controller(Arc::clone(&client)).await;
    let mut events = controller.subscribe();

    controller.start().await.unwrap();

    let mut saw_pulse = false;
    let mut saw_guide = false;
    for _ in 0..30 {
        match timeout(Duration::from_millis(100), events.changed()).await {
            Ok(Ok(())) => {}
            _ => break,
        }
        let frame = events.borrow_and_update().clone();
        saw_pulse |= frame.blink_pulse;
        saw_guide |= frame.guide_highlight;
        if saw_pulse && saw_guide {
            break;
        }
    }
    assert!(saw_pulse, "rising blink edge never lit the pulse");
    assert!(saw_guide, "low EAR never lit the guide hint");

    controller.stop().await.unwrap();
}
