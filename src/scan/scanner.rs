use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::{oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::camera::{preferred_device, CameraError, CameraProvider, CameraStream};
use crate::qr::decode_frame;

#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "camelCase")]
pub enum ScanError {
    #[error("No cameras found on this device.")]
    NoCameraAvailable,
    #[error("Failed to access camera. Please check permissions. ({0})")]
    CameraAccessDenied(String),
    #[error("Camera stream ended unexpectedly. ({0})")]
    CameraLost(String),
    #[error("A scan is already in progress.")]
    AlreadyScanning,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "error", rename_all = "camelCase")]
pub enum ScanState {
    Idle,
    RequestingCamera,
    Scanning,
    Decoded,
    Error(ScanError),
    Stopped,
}

/// Terminal result of one session. Sessions ended by `stop` deliver nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    Decoded(String),
    Failed(ScanError),
}

/// A running session: its id and the receiver of its outcome. The receiver
/// resolves once, or is dropped without a value if the session is stopped.
#[derive(Debug)]
pub struct ScanHandle {
    pub session: Uuid,
    pub outcome: oneshot::Receiver<ScanOutcome>,
}

enum SessionEnd {
    Decoded(String),
    Failed(ScanError),
    Stopped,
}

struct Session {
    id: Uuid,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

// `latest` is the most recently started session; only it may publish state
#[derive(Default)]
struct Sessions {
    active: Option<Session>,
    latest: Option<Uuid>,
}

type SessionSlot = Arc<Mutex<Sessions>>;

/// Camera-driven QR reader.
///
/// Each `start` opens a session that holds the camera until it decodes one
/// payload, fails, or is stopped. The camera is released on every one of
/// those paths before the session counts as finished.
pub struct Scanner {
    provider: Arc<dyn CameraProvider>,
    frame_interval: Duration,
    state: Arc<watch::Sender<ScanState>>,
    sessions: SessionSlot,
}

impl Scanner {
    pub fn new(provider: Arc<dyn CameraProvider>, fps: u32) -> Self {
        let (state, _) = watch::channel(ScanState::Idle);
        Self {
            provider,
            frame_interval: Duration::from_micros(1_000_000 / u64::from(fps.max(1))),
            state: Arc::new(state),
            sessions: Arc::new(Mutex::new(Sessions::default())),
        }
    }

    pub fn state(&self) -> ScanState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ScanState> {
        self.state.subscribe()
    }

    pub fn is_scanning(&self) -> bool {
        matches!(*self.state.borrow(), ScanState::Scanning)
    }

    pub async fn start(&self) -> Result<ScanHandle, ScanError> {
        let mut sessions = self.sessions.lock().await;
        if sessions.active.is_some() {
            return Err(ScanError::AlreadyScanning);
        }

        let id = Uuid::new_v4();
        let cancel = CancellationToken::new();
        let (outcome_tx, outcome_rx) = oneshot::channel();
        sessions.latest = Some(id);
        self.state.send_replace(ScanState::RequestingCamera);
        debug!(session = %id, "scan session starting");

        // the task takes this lock before publishing anything, so it cannot
        // finish before its handle is stored below
        let task = tokio::spawn(run_session(SessionCtx {
            id,
            provider: self.provider.clone(),
            frame_interval: self.frame_interval,
            state: self.state.clone(),
            sessions: self.sessions.clone(),
            cancel: cancel.clone(),
            outcome: outcome_tx,
        }));
        sessions.active = Some(Session { id, cancel, task });
        Ok(ScanHandle {
            session: id,
            outcome: outcome_rx,
        })
    }

    /// Stop the active session and wait for its camera to be released.
    /// No-op when nothing is running.
    pub async fn stop(&self) {
        let session = {
            let mut sessions = self.sessions.lock().await;
            let session = sessions.active.take();
            if let Some(s) = &session {
                s.cancel.cancel();
            }
            session
        };
        let Some(session) = session else {
            return;
        };
        if let Err(e) = session.task.await {
            warn!(session = %session.id, error = %e, "scan session task failed");
        }

        // a start that slipped in while we waited owns the state now
        let sessions = self.sessions.lock().await;
        if sessions.latest == Some(session.id) {
            self.state.send_replace(ScanState::Stopped);
            info!(session = %session.id, "scan stopped");
        } else {
            debug!(session = %session.id, "scan stopped after a newer session started");
        }
    }
}

struct SessionCtx {
    id: Uuid,
    provider: Arc<dyn CameraProvider>,
    frame_interval: Duration,
    state: Arc<watch::Sender<ScanState>>,
    sessions: SessionSlot,
    cancel: CancellationToken,
    outcome: oneshot::Sender<ScanOutcome>,
}

async fn open_camera(provider: &dyn CameraProvider) -> Result<Box<dyn CameraStream>, ScanError> {
    let devices = provider
        .devices()
        .await
        .map_err(|e| ScanError::CameraAccessDenied(e.to_string()))?;
    let device = preferred_device(&devices).ok_or(ScanError::NoCameraAvailable)?;
    debug!(device = %device.label, "acquiring camera");
    provider
        .acquire(device)
        .await
        .map_err(|e| ScanError::CameraAccessDenied(e.to_string()))
}

async fn scan_frames(
    stream: &mut dyn CameraStream,
    frame_interval: Duration,
    cancel: &CancellationToken,
) -> SessionEnd {
    let mut ticker = tokio::time::interval(frame_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return SessionEnd::Stopped,
            _ = ticker.tick() => {}
        }
        let frame = tokio::select! {
            biased;
            _ = cancel.cancelled() => return SessionEnd::Stopped,
            f = stream.next_frame() => f,
        };
        let frame = match frame {
            Ok(Some(frame)) => frame,
            Ok(None) => return SessionEnd::Failed(ScanError::CameraLost("stream ended".into())),
            Err(CameraError::Stream(reason)) => return SessionEnd::Failed(ScanError::CameraLost(reason)),
            Err(e) => return SessionEnd::Failed(ScanError::CameraLost(e.to_string())),
        };
        match tokio::task::spawn_blocking(move || decode_frame(&frame)).await {
            Ok(Some(text)) => return SessionEnd::Decoded(text),
            Ok(None) => {}
            Err(e) => {
                return SessionEnd::Failed(ScanError::CameraLost(format!("frame decode failed: {}", e)))
            }
        }
    }
}

// Own task: a panic here drops the stream and run_session still settles the
// session.
async fn capture(
    provider: Arc<dyn CameraProvider>,
    frame_interval: Duration,
    state: Arc<watch::Sender<ScanState>>,
    sessions: SessionSlot,
    id: Uuid,
    cancel: CancellationToken,
) -> SessionEnd {
    let opened = tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        r = open_camera(provider.as_ref()) => Some(r),
    };
    match opened {
        None => SessionEnd::Stopped,
        Some(Err(e)) => SessionEnd::Failed(e),
        Some(Ok(mut stream)) => {
            {
                let sessions = sessions.lock().await;
                if sessions.latest == Some(id) && !cancel.is_cancelled() {
                    state.send_replace(ScanState::Scanning);
                    debug!(session = %id, "scanning");
                }
            }
            let end = scan_frames(&mut *stream, frame_interval, &cancel).await;
            stream.release().await;
            end
        }
    }
}

async fn run_session(ctx: SessionCtx) {
    let SessionCtx {
        id,
        provider,
        frame_interval,
        state,
        sessions,
        cancel,
        outcome,
    } = ctx;

    let worker = tokio::spawn(capture(
        provider,
        frame_interval,
        state.clone(),
        sessions.clone(),
        id,
        cancel.clone(),
    ));
    let end = match worker.await {
        Ok(end) => end,
        Err(e) => {
            warn!(session = %id, error = %e, "scan worker failed");
            SessionEnd::Failed(ScanError::CameraLost(format!("scan worker failed: {}", e)))
        }
    };

    // stop() cancels under this same lock, so exactly one side decides the
    // session's final state
    let mut sessions = sessions.lock().await;
    if cancel.is_cancelled() {
        if matches!(end, SessionEnd::Decoded(_)) {
            debug!(session = %id, "decode suppressed by stop");
        }
        return;
    }
    if sessions.active.as_ref().map(|s| s.id) == Some(id) {
        sessions.active = None;
    }
    match end {
        SessionEnd::Decoded(text) => {
            state.send_replace(ScanState::Decoded);
            info!(session = %id, len = text.len(), "qr decoded");
            let _ = outcome.send(ScanOutcome::Decoded(text));
        }
        SessionEnd::Failed(e) => {
            state.send_replace(ScanState::Error(e.clone()));
            warn!(session = %id, error = %e, "scan failed");
            let _ = outcome.send(ScanOutcome::Failed(e));
        }
        SessionEnd::Stopped => {}
    }
}

#[cfg(test)]
mod scanner_tests {
    use super::*;
    use crate::qr::{encode, EncodeOptions};
    use crate::scan::camera::CameraDevice;
    use async_trait::async_trait;
    use image::{DynamicImage, GrayImage, Luma};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    #[derive(Default)]
    struct FakeCamera {
        devices: Vec<CameraDevice>,
        deny: bool,
        panic_on_frame: bool,
        // when set, release() signals `releasing` and then waits on `gate`
        release_gate: Option<(Arc<Notify>, Arc<Notify>)>,
        frames: Vec<GrayImage>,
        acquired: Arc<AtomicUsize>,
        released: Arc<AtomicUsize>,
    }

    impl FakeCamera {
        fn with_frames(frames: Vec<GrayImage>) -> Self {
            Self {
                devices: vec![CameraDevice {
                    id: "cam0".into(),
                    label: "Back Camera".into(),
                }],
                frames,
                ..Default::default()
            }
        }
    }

    struct FakeStream {
        frames: std::vec::IntoIter<GrayImage>,
        released: Arc<AtomicUsize>,
        panic_on_frame: bool,
        release_gate: Option<(Arc<Notify>, Arc<Notify>)>,
        done: bool,
    }

    #[async_trait]
    impl CameraProvider for FakeCamera {
        async fn devices(&self) -> Result<Vec<CameraDevice>, CameraError> {
            Ok(self.devices.clone())
        }
        async fn acquire(&self, _d: &CameraDevice) -> Result<Box<dyn CameraStream>, CameraError> {
            if self.deny {
                return Err(CameraError::PermissionDenied);
            }
            self.acquired.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(FakeStream {
                frames: self.frames.clone().into_iter(),
                released: self.released.clone(),
                panic_on_frame: self.panic_on_frame,
                release_gate: self.release_gate.clone(),
                done: false,
            }))
        }
    }

    #[async_trait]
    impl CameraStream for FakeStream {
        async fn next_frame(&mut self) -> Result<Option<GrayImage>, CameraError> {
            if self.panic_on_frame {
                panic!("camera driver crashed");
            }
            match self.frames.next() {
                Some(f) => Ok(Some(f)),
                // a live camera keeps running with nothing in view
                None => std::future::pending().await,
            }
        }
        async fn release(&mut self) {
            if let Some((releasing, gate)) = &self.release_gate {
                releasing.notify_one();
                gate.notified().await;
            }
            if !self.done {
                self.done = true;
                self.released.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    fn code_frame(text: &str) -> GrayImage {
        let s = encode(text, &EncodeOptions::default()).unwrap();
        DynamicImage::ImageRgba8(s.image).to_luma8()
    }

    fn blank_frame() -> GrayImage {
        GrayImage::from_pixel(64, 64, Luma([255]))
    }

    #[tokio::test]
    async fn delivers_exactly_one_decode_and_releases_first() {
        let cam = FakeCamera::with_frames(vec![
            blank_frame(),
            code_frame("ean-first-aaaaaaaaa"),
            code_frame("ean-second-bbbbbbbbb"),
        ]);
        let released = cam.released.clone();
        let scanner = Scanner::new(Arc::new(cam), 1000);

        let handle = scanner.start().await.unwrap();
        let outcome = handle.outcome.await.expect("outcome delivered");
        assert_eq!(outcome, ScanOutcome::Decoded("ean-first-aaaaaaaaa".into()));
        assert_eq!(released.load(Ordering::SeqCst), 1);
        assert_eq!(scanner.state(), ScanState::Decoded);
        assert!(!scanner.is_scanning());

        // session is over; stop has nothing to do
        scanner.stop().await;
        assert_eq!(scanner.state(), ScanState::Decoded);
    }

    #[tokio::test]
    async fn no_devices_reports_no_camera() {
        let scanner = Scanner::new(Arc::new(FakeCamera::default()), 1000);
        let outcome = scanner.start().await.unwrap().outcome.await.unwrap();
        assert_eq!(outcome, ScanOutcome::Failed(ScanError::NoCameraAvailable));
        assert_eq!(scanner.state(), ScanState::Error(ScanError::NoCameraAvailable));
    }

    #[tokio::test]
    async fn denied_permission_reports_access_denied() {
        let cam = FakeCamera {
            deny: true,
            ..FakeCamera::with_frames(vec![])
        };
        let scanner = Scanner::new(Arc::new(cam), 1000);
        let outcome = scanner.start().await.unwrap().outcome.await.unwrap();
        assert!(matches!(
            outcome,
            ScanOutcome::Failed(ScanError::CameraAccessDenied(_))
        ));
        // error state is not sticky; a retry may start a new session
        assert!(scanner.start().await.is_ok());
        scanner.stop().await;
    }

    #[tokio::test]
    async fn refused_feed_camera_reports_access_denied() {
        use crate::scan::FeedCamera;

        let scanner = Scanner::new(Arc::new(FeedCamera::with_permission(false)), 1000);
        let outcome = scanner.start().await.unwrap().outcome.await.unwrap();
        assert_eq!(
            outcome,
            ScanOutcome::Failed(ScanError::CameraAccessDenied(
                CameraError::PermissionDenied.to_string()
            ))
        );
    }

    #[tokio::test]
    async fn stop_releases_camera_and_delivers_nothing() {
        let cam = FakeCamera::with_frames(vec![blank_frame(), blank_frame()]);
        let acquired = cam.acquired.clone();
        let released = cam.released.clone();
        let scanner = Scanner::new(Arc::new(cam), 1000);

        let mut states = scanner.subscribe();
        let rx = scanner.start().await.unwrap().outcome;
        states
            .wait_for(|s| *s == ScanState::Scanning)
            .await
            .unwrap();
        assert!(scanner.is_scanning());

        scanner.stop().await;
        assert_eq!(acquired.load(Ordering::SeqCst), 1);
        assert_eq!(released.load(Ordering::SeqCst), 1);
        assert_eq!(scanner.state(), ScanState::Stopped);
        assert!(rx.await.is_err());
    }

    #[tokio::test]
    async fn stop_when_idle_is_a_noop() {
        let scanner = Scanner::new(Arc::new(FakeCamera::default()), 10);
        scanner.stop().await;
        scanner.stop().await;
        assert_eq!(scanner.state(), ScanState::Idle);
    }

    #[tokio::test]
    async fn second_start_while_active_is_rejected() {
        let scanner = Scanner::new(Arc::new(FakeCamera::with_frames(vec![])), 1000);
        let _rx = scanner.start().await.unwrap();
        assert_eq!(scanner.start().await.err(), Some(ScanError::AlreadyScanning));
        scanner.stop().await;
        let rx = scanner.start().await.unwrap().outcome;
        scanner.stop().await;
        assert!(rx.await.is_err());
    }

    fn gated_camera(frames: Vec<GrayImage>) -> (FakeCamera, Arc<Notify>, Arc<Notify>) {
        let releasing = Arc::new(Notify::new());
        let gate = Arc::new(Notify::new());
        let cam = FakeCamera {
            release_gate: Some((releasing.clone(), gate.clone())),
            ..FakeCamera::with_frames(frames)
        };
        (cam, releasing, gate)
    }

    #[tokio::test]
    async fn stop_during_release_suppresses_the_decode() {
        let (cam, releasing, gate) = gated_camera(vec![code_frame("ean-late-ccccccccc")]);
        let released = cam.released.clone();
        let scanner = Scanner::new(Arc::new(cam), 1000);

        let handle = scanner.start().await.unwrap();
        // the frame has decoded and the session is giving the camera back
        releasing.notified().await;

        tokio::join!(scanner.stop(), async {
            gate.notify_one();
        });

        assert!(handle.outcome.await.is_err());
        assert_eq!(scanner.state(), ScanState::Stopped);
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn slow_stop_does_not_clobber_a_newer_session() {
        let (cam, _releasing, gate) = gated_camera(vec![]);
        let acquired = cam.acquired.clone();
        let scanner = Scanner::new(Arc::new(cam), 1000);

        let mut states = scanner.subscribe();
        let first = scanner.start().await.unwrap();
        states.wait_for(|s| *s == ScanState::Scanning).await.unwrap();

        let mut second = None;
        tokio::join!(scanner.stop(), async {
            // stop is parked on the first session's release here
            second = Some(scanner.start().await.unwrap());
            gate.notify_one();
        });
        let second = second.unwrap();
        assert_ne!(first.session, second.session);
        assert!(first.outcome.await.is_err());

        states.wait_for(|s| *s == ScanState::Scanning).await.unwrap();
        assert!(scanner.is_scanning());
        assert_eq!(acquired.load(Ordering::SeqCst), 2);
        assert_eq!(scanner.start().await.err(), Some(ScanError::AlreadyScanning));

        gate.notify_one();
        scanner.stop().await;
        assert_eq!(scanner.state(), ScanState::Stopped);
        assert!(second.outcome.await.is_err());
    }

    #[tokio::test]
    async fn crashed_worker_frees_the_session() {
        let cam = FakeCamera {
            panic_on_frame: true,
            ..FakeCamera::with_frames(vec![])
        };
        let scanner = Scanner::new(Arc::new(cam), 1000);

        let outcome = scanner.start().await.unwrap().outcome.await.unwrap();
        assert!(matches!(outcome, ScanOutcome::Failed(ScanError::CameraLost(_))));
        assert!(matches!(scanner.state(), ScanState::Error(ScanError::CameraLost(_))));

        // not stuck in AlreadyScanning
        let again = scanner.start().await.unwrap();
        scanner.stop().await;
        assert!(again.outcome.await.is_err());
    }
}
