use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use image::GrayImage;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CameraError {
    #[error("camera permission denied")]
    PermissionDenied,
    #[error("camera is held by another session")]
    Busy,
    #[error("no camera is streaming")]
    NotStreaming,
    #[error("camera stream failed: {0}")]
    Stream(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraDevice {
    pub id: String,
    pub label: String,
}

impl CameraDevice {
    fn faces_environment(&self) -> bool {
        let label = self.label.to_lowercase();
        label.contains("back") || label.contains("rear") || label.contains("environment")
    }
}

/// Rear-facing camera if one is labelled as such, else the first device.
pub fn preferred_device(devices: &[CameraDevice]) -> Option<&CameraDevice> {
    devices
        .iter()
        .find(|d| d.faces_environment())
        .or_else(|| devices.first())
}

/// Source of cameras. Acquisition may wait on a user permission prompt.
#[async_trait]
pub trait CameraProvider: Send + Sync {
    async fn devices(&self) -> Result<Vec<CameraDevice>, CameraError>;
    async fn acquire(&self, device: &CameraDevice) -> Result<Box<dyn CameraStream>, CameraError>;
}

/// An acquired camera. Must be released before another session can acquire it.
#[async_trait]
pub trait CameraStream: Send {
    /// Next frame; `Ok(None)` once the stream has ended.
    async fn next_frame(&mut self) -> Result<Option<GrayImage>, CameraError>;
    /// Idempotent.
    async fn release(&mut self);
}

const FEED_DEVICE_ID: &str = "frame-feed";
const FEED_BUFFER: usize = 4;

type Lease = Option<(Uuid, mpsc::Sender<GrayImage>)>;
type LeaseSlot = Arc<Mutex<Lease>>;

// never held across an await; a poisoned lock still holds a valid lease
fn lock(slot: &LeaseSlot) -> MutexGuard<'_, Lease> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Camera fed by frames pushed from outside the process (the local web UI
/// posts captured frames). One stream at a time.
#[derive(Clone)]
pub struct FeedCamera {
    slot: LeaseSlot,
    allowed: bool,
}

impl Default for FeedCamera {
    fn default() -> Self {
        Self::with_permission(true)
    }
}

impl FeedCamera {
    /// A feed whose acquisition is refused with `PermissionDenied` when
    /// `allowed` is false, as if the user declined the camera prompt.
    pub fn with_permission(allowed: bool) -> Self {
        Self {
            slot: Arc::new(Mutex::new(None)),
            allowed,
        }
    }

    /// Hand a frame to the active stream. Returns `false` when the frame was
    /// dropped because the stream is behind.
    pub async fn push_frame(&self, frame: GrayImage) -> Result<bool, CameraError> {
        let slot = lock(&self.slot);
        let (_, tx) = slot.as_ref().ok_or(CameraError::NotStreaming)?;
        match tx.try_send(frame) {
            Ok(()) => Ok(true),
            Err(mpsc::error::TrySendError::Full(_)) => Ok(false),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(CameraError::NotStreaming),
        }
    }

    pub async fn is_streaming(&self) -> bool {
        lock(&self.slot).is_some()
    }
}

#[async_trait]
impl CameraProvider for FeedCamera {
    async fn devices(&self) -> Result<Vec<CameraDevice>, CameraError> {
        Ok(vec![CameraDevice {
            id: FEED_DEVICE_ID.into(),
            label: "Frame feed (environment)".into(),
        }])
    }

    async fn acquire(&self, device: &CameraDevice) -> Result<Box<dyn CameraStream>, CameraError> {
        if device.id != FEED_DEVICE_ID {
            return Err(CameraError::Stream(format!("unknown device {}", device.id)));
        }
        if !self.allowed {
            return Err(CameraError::PermissionDenied);
        }
        let mut slot = lock(&self.slot);
        if slot.is_some() {
            return Err(CameraError::Busy);
        }
        let (tx, rx) = mpsc::channel(FEED_BUFFER);
        let lease = Uuid::new_v4();
        *slot = Some((lease, tx));
        debug!(%lease, "frame feed acquired");
        Ok(Box::new(FeedStream {
            lease,
            rx,
            slot: self.slot.clone(),
            released: false,
        }))
    }
}

struct FeedStream {
    lease: Uuid,
    rx: mpsc::Receiver<GrayImage>,
    slot: LeaseSlot,
    released: bool,
}

impl FeedStream {
    fn free_lease(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.rx.close();
        let mut slot = lock(&self.slot);
        if matches!(slot.as_ref(), Some((lease, _)) if *lease == self.lease) {
            *slot = None;
        }
        debug!(lease = %self.lease, "frame feed released");
    }
}

#[async_trait]
impl CameraStream for FeedStream {
    async fn next_frame(&mut self) -> Result<Option<GrayImage>, CameraError> {
        if self.released {
            return Ok(None);
        }
        Ok(self.rx.recv().await)
    }

    async fn release(&mut self) {
        self.free_lease();
    }
}

// a session task that panics or is aborted never reaches `release`
impl Drop for FeedStream {
    fn drop(&mut self) {
        self.free_lease();
    }
}
