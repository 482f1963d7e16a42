use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use log::{error, info, warn};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::capture::FrameSource;
use crate::client::DetectionApi;
use crate::config::Settings;
use crate::session::{presenter, SessionState, SessionStatus, ViewFrame};

use super::loop_worker::{detection_loop, SharedSession, SharedSource};

struct Worker {
    handle: JoinHandle<()>,
    cancel_token: CancellationToken,
}

/// Owns the detection lifecycle: frame source attachment, start/stop of the
/// polling loop, and the view-frame channel the renderer subscribes to.
pub struct DetectionController {
    session: SharedSession,
    client: Arc<dyn DetectionApi>,
    source: SharedSource,
    events: watch::Sender<ViewFrame>,
    worker: Mutex<Option<Worker>>,
    cadence: Duration,
    jpeg_quality: u8,
}

impl DetectionController {
    pub fn new(client: Arc<dyn DetectionApi>, settings: &Settings) -> Self {
        let mut session = SessionState::new(settings.session);
        let initial = session.render(Instant::now());
        let (events, _) = watch::channel(initial);

        Self {
            session: Arc::new(Mutex::new(session)),
            client,
            source: Arc::new(Mutex::new(None)),
            events,
            worker: Mutex::new(None),
            cadence: Duration::from_millis(settings.poll_interval_ms),
            jpeg_quality: settings.jpeg_quality,
        }
    }

    /// Receive a view frame on every state change.
    pub fn subscribe(&self) -> watch::Receiver<ViewFrame> {
        self.events.subscribe()
    }

    pub async fn get_state(&self) -> SessionState {
        self.session.lock().await.clone()
    }

    pub async fn is_running(&self) -> bool {
        self.worker.lock().await.is_some()
    }

    /// Probe and attach a frame source. A failed probe leaves the session in
    /// its camera-error state and keeps `start` disabled.
    pub async fn attach_source(&self, mut source: Box<dyn FrameSource>) -> Result<()> {
        {
            let mut session = self.session.lock().await;
            session.mark_camera_connecting();
            self.publish(&mut session);
        }

        match source.grab() {
            Ok(frame) => {
                info!(
                    "frame source ready: {} ({}x{})",
                    source.describe(),
                    frame.width(),
                    frame.height()
                );
            }
            Err(err) => {
                error!("frame source probe failed: {err}");
                let mut session = self.session.lock().await;
                session.mark_camera_failed();
                self.publish(&mut session);
                return Err(err).context("frame source unavailable");
            }
        }

        *self.source.lock().await = Some(source);

        let mut session = self.session.lock().await;
        session.mark_camera_ready();
        self.publish(&mut session);
        Ok(())
    }

    /// Begin a detection run. No-op if one is already running. The service
    /// counters are reset first so blinks never leak across runs; a failed
    /// reset blocks the run entirely.
    pub async fn start(&self) -> Result<()> {
        let mut worker_guard = self.worker.lock().await;
        if worker_guard.is_some() {
            warn!("start ignored: detection already running");
            return Ok(());
        }

        {
            let session = self.session.lock().await;
            if !session.camera_ready {
                bail!("frame source not ready; attach a source first");
            }
        }

        if let Err(err) = self.client.reset().await {
            error!("reset request failed: {err}");
            let mut session = self.session.lock().await;
            session.status = SessionStatus::Error(presenter::RESET_FAILED_MESSAGE.to_string());
            self.publish(&mut session);
            return Err(err).context("detection service reset failed");
        }

        let run_id = Uuid::new_v4();
        {
            let mut session = self.session.lock().await;
            session.begin_run(run_id);
            self.publish(&mut session);
        }

        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(detection_loop(
            Arc::clone(&self.session),
            Arc::clone(&self.client),
            Arc::clone(&self.source),
            self.events.clone(),
            self.cadence,
            self.jpeg_quality,
            cancel_token.clone(),
        ));

        *worker_guard = Some(Worker {
            handle,
            cancel_token,
        });
        info!("detection run {run_id} started");
        Ok(())
    }

    /// Stop polling. Idempotent; a response still in flight is discarded on
    /// arrival.
    pub async fn stop(&self) -> Result<()> {
        let worker = self.worker.lock().await.take();
        let Some(worker) = worker else {
            return Ok(());
        };

        worker.cancel_token.cancel();
        worker
            .handle
            .await
            .context("detection loop task failed to join")?;

        let mut session = self.session.lock().await;
        session.end_run();
        self.publish(&mut session);
        info!("detection stopped");
        Ok(())
    }

    /// Flip detection on or off; returns whether it is running afterwards.
    pub async fn toggle(&self) -> Result<bool> {
        if self.is_running().await {
            self.stop().await?;
            Ok(false)
        } else {
            self.start().await?;
            Ok(true)
        }
    }

    /// Flip the EAR debug readout; returns the new visibility.
    pub async fn toggle_debug(&self) -> bool {
        let mut session = self.session.lock().await;
        session.debug_visible = !session.debug_visible;
        self.publish(&mut session);
        session.debug_visible
    }

    fn publish(&self, session: &mut SessionState) {
        let frame = session.render(Instant::now());
        let _ = self.events.send_replace(frame);
    }
}
