use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};
use tokio::sync::{watch, Mutex};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::capture::{encode_frame, FrameSource};
use crate::client::{DetectionApi, DetectionOutcome};
use crate::session::{SessionState, ViewFrame};

pub(crate) type SharedSession = Arc<Mutex<SessionState>>;
pub(crate) type SharedSource = Arc<Mutex<Option<Box<dyn FrameSource>>>>;

pub(crate) async fn detection_loop(
    session: SharedSession,
    client: Arc<dyn DetectionApi>,
    source: SharedSource,
    events: watch::Sender<ViewFrame>,
    cadence: Duration,
    jpeg_quality: u8,
    cancel_token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(cadence);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!("detection loop started ({}ms cadence)", cadence.as_millis());

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                run_tick(&session, &client, &source, &events, jpeg_quality).await;
            }
            _ = cancel_token.cancelled() => {
                info!("detection loop shutting down");
                break;
            }
        }
    }
}

async fn run_tick(
    session: &SharedSession,
    client: &Arc<dyn DetectionApi>,
    source: &SharedSource,
    events: &watch::Sender<ViewFrame>,
    jpeg_quality: u8,
) {
    // Back-pressure: never enqueue a second concurrent request.
    let run_id = {
        let guard = session.lock().await;
        if !guard.active {
            return;
        }
        if guard.in_flight {
            debug!("tick skipped: detect request already in flight");
            return;
        }
        let Some(run_id) = guard.run_id else { return };
        run_id
    };

    let frame = {
        let mut source_guard = source.lock().await;
        let Some(frame_source) = source_guard.as_mut() else {
            warn!("tick skipped: no frame source attached");
            return;
        };
        match frame_source.grab() {
            Ok(frame) => frame,
            Err(err) => {
                warn!("frame capture failed: {err}");
                let outcome = DetectionOutcome::Capture(err.to_string());
                drop(source_guard);
                apply_outcome(session, events, run_id, outcome).await;
                return;
            }
        }
    };

    let encoded =
        match tokio::task::spawn_blocking(move || encode_frame(&frame, jpeg_quality)).await {
            Ok(Ok(encoded)) => encoded,
            Ok(Err(err)) => {
                warn!("frame encoding failed: {err}");
                apply_outcome(
                    session,
                    events,
                    run_id,
                    DetectionOutcome::Capture(err.to_string()),
                )
                .await;
                return;
            }
            Err(err) => {
                error!("encode worker join failed: {err}");
                return;
            }
        };

    session.lock().await.in_flight = true;

    // The response is handled in its own task so a slow or hung request
    // never delays cancellation; meanwhile the in-flight flag keeps further
    // ticks from sending.
    let session = Arc::clone(session);
    let client = Arc::clone(client);
    let events = events.clone();
    tokio::spawn(async move {
        let outcome = match client.detect(&encoded).await {
            Ok(response) => response.into_outcome(),
            Err(err) => {
                warn!("detect request failed: {err}");
                DetectionOutcome::Transport(err.to_string())
            }
        };
        apply_outcome(&session, &events, run_id, outcome).await;
    });
}

/// Atomically fold an outcome into the session and publish the view frame.
/// Results belonging to a run that has since been stopped are discarded, so
/// a late response can never resurrect a stopped session's UI.
async fn apply_outcome(
    session: &SharedSession,
    events: &watch::Sender<ViewFrame>,
    run_id: Uuid,
    outcome: DetectionOutcome,
) {
    let mut guard = session.lock().await;
    if guard.run_id != Some(run_id) {
        debug!("discarding detection result from a stopped run");
        return;
    }
    guard.in_flight = false;
    guard.reconcile(&outcome);
    let frame = guard.render(Instant::now());
    drop(guard);

    // send_replace keeps the latest frame available to late subscribers.
    let _ = events.send_replace(frame);
}
