use super::types::{AppState, Lifecycle, SirenStatus};
use crate::config::SirenConfig;
use crate::cover::CoverGate;
use crate::error::{Result, SirenError, TorchError};
use crate::events::{EventBus, SirenEvent};
use crate::hardware::{AlertChannel, CameraAccess, TorchDriver};
use crate::strobe::{PlatformLimits, PulseShape, StrobeConfig, StrobeScheduler};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// One alarm screen: alerts, cover, and strobe started and torn down together
pub struct SirenSession {
    config: SirenConfig,
    event_bus: Arc<EventBus>,
    camera: Arc<dyn CameraAccess>,
    alerts: Arc<dyn AlertChannel>,
    scheduler: StrobeScheduler,
    cover: CoverGate,
    status: Arc<watch::Sender<SirenStatus>>,
    control: Mutex<SessionControl>,
}

struct SessionControl {
    lifecycle: Lifecycle,
    session_id: Option<Uuid>,
    /// The user wants the strobe; survives backgrounding
    user_enabled: bool,
    permission_granted: bool,
    /// Cleared by a mount error until the user retries
    hardware_ok: bool,
    camera_ready: bool,
    /// Requested but waiting on camera readiness or foreground
    pending_strobe: bool,
    foreground: bool,
}

impl SessionControl {
    fn closed() -> Self {
        Self {
            lifecycle: Lifecycle::Closed,
            session_id: None,
            user_enabled: true,
            permission_granted: false,
            hardware_ok: true,
            camera_ready: false,
            pending_strobe: false,
            foreground: true,
        }
    }

    /// Still the same session and still waiting to become open
    fn is_current(&self, session_id: Uuid) -> bool {
        self.lifecycle == Lifecycle::Opening && self.session_id == Some(session_id)
    }

    fn can_strobe(&self) -> bool {
        self.lifecycle != Lifecycle::Closed
            && self.user_enabled
            && self.permission_granted
            && self.hardware_ok
    }
}

/// Forwards to the real driver and mirrors each commanded state into the status
struct StatusTorch {
    driver: Arc<dyn TorchDriver>,
    status: Arc<watch::Sender<SirenStatus>>,
}

impl TorchDriver for StatusTorch {
    fn set_torch(&self, on: bool) -> std::result::Result<(), TorchError> {
        let result = self.driver.set_torch(on);
        // Status follows the commanded state even when the driver refuses it
        self.status.send_if_modified(|status| {
            let changed = status.torch_on != on;
            status.torch_on = on;
            changed
        });
        result
    }

    fn name(&self) -> &str {
        self.driver.name()
    }
}

impl SirenSession {
    pub fn new(
        config: SirenConfig,
        event_bus: Arc<EventBus>,
        torch: Arc<dyn TorchDriver>,
        camera: Arc<dyn CameraAccess>,
        alerts: Arc<dyn AlertChannel>,
    ) -> Self {
        let (status, _) = watch::channel(SirenStatus::default());
        let status = Arc::new(status);

        let scheduler = StrobeScheduler::new(
            Arc::new(StatusTorch {
                driver: torch,
                status: Arc::clone(&status),
            }),
            config.strobe.platform,
            PlatformLimits::from_config(&config.platform),
            PulseShape::from_settings(&config.strobe),
        );

        let cover_status = Arc::clone(&status);
        let cover = CoverGate::with_observer(&config.cover, move |cover| {
            cover_status.send_modify(|status| {
                status.cover_visible = cover.visible;
                status.cover_opacity = cover.opacity;
            });
        });

        Self {
            config,
            event_bus,
            camera,
            alerts,
            scheduler,
            cover,
            status,
            control: Mutex::new(SessionControl::closed()),
        }
    }

    /// Open the alarm: alerts start, the cover goes up, and the strobe waits
    /// for camera readiness. Hardware problems degrade to the screen flash.
    pub async fn open(&self) -> Result<()> {
        let session_id = {
            let mut control = self.control.lock();
            if control.lifecycle != Lifecycle::Closed {
                warn!("Siren already {:?}, ignoring open", control.lifecycle);
                return Ok(());
            }
            *control = SessionControl::closed();
            control.lifecycle = Lifecycle::Opening;
            let id = Uuid::new_v4();
            control.session_id = Some(id);
            id
        };

        info!(session = %session_id, "Opening siren session");
        self.event_bus.publish(SirenEvent::Opening);

        self.start_alerts().await;

        let still_current = {
            let control = self.control.lock();
            let current = control.is_current(session_id);
            if current {
                self.cover.begin();
            }
            current
        };
        if !still_current {
            debug!(session = %session_id, "Session closed while starting alerts");
            self.stop_alerts().await;
            return Ok(());
        }

        let granted = match self.camera.request_permission().await {
            Ok(granted) => granted,
            Err(e) => {
                warn!("Camera permission request failed: {}", e);
                false
            }
        };

        {
            let mut control = self.control.lock();
            if !control.is_current(session_id) {
                debug!(session = %session_id, "Session closed while awaiting permission");
                return Ok(());
            }

            control.permission_granted = granted;
            control.lifecycle = Lifecycle::Open;

            if granted {
                if control.camera_ready && control.foreground {
                    self.start_strobe(&mut control);
                } else {
                    control.pending_strobe = true;
                }
            } else {
                let denied = SirenError::Permission {
                    details: "camera access refused".to_string(),
                };
                warn!("{}; falling back to screen flash", denied);
            }

            self.status.send_modify(|status| {
                status.open = true;
                status.screen_flash = !granted;
            });
        }

        self.event_bus.publish(SirenEvent::Open);
        Ok(())
    }

    /// Camera/torch confirmed live
    pub fn on_camera_ready(&self) {
        {
            let mut control = self.control.lock();
            if control.lifecycle == Lifecycle::Closed {
                debug!("Camera ready after teardown, ignoring");
                return;
            }
            if control.camera_ready {
                return;
            }
            control.camera_ready = true;

            if control.pending_strobe && control.foreground && control.can_strobe() {
                self.start_strobe(&mut control);
            }
        }

        self.cover.on_ready();
        self.event_bus.publish(SirenEvent::CameraReady);
    }

    /// Camera failed to initialise after permission was granted
    pub fn on_mount_error(&self, error: SirenError) {
        let mut control = self.control.lock();
        if control.lifecycle == Lifecycle::Closed {
            return;
        }

        if error.is_recoverable() {
            warn!("Camera mount failed, disabling strobe: {}", error);
        } else {
            error!("Camera mount failed with unexpected error, disabling strobe: {}", error);
        }
        control.hardware_ok = false;
        control.pending_strobe = false;
        self.scheduler.stop();
        self.status.send_modify(|status| {
            status.strobing = false;
            status.screen_flash = true;
        });
    }

    /// User asks for the strobe. Also the manual retry after a mount error.
    pub fn start(&self) -> bool {
        let mut control = self.control.lock();
        if control.lifecycle == Lifecycle::Closed {
            return false;
        }
        if !control.permission_granted {
            warn!("Strobe unavailable without camera permission");
            return false;
        }

        control.user_enabled = true;
        control.hardware_ok = true;
        self.status.send_modify(|status| status.screen_flash = false);

        if control.camera_ready && control.foreground {
            if !self.scheduler.is_running() {
                self.start_strobe(&mut control);
            }
        } else {
            control.pending_strobe = true;
        }
        true
    }

    /// User turns the strobe off; the torch is left off
    pub fn stop(&self) {
        let mut control = self.control.lock();
        control.user_enabled = false;
        control.pending_strobe = false;
        self.stop_strobe();
    }

    pub fn toggle(&self) -> bool {
        let engaged = {
            let control = self.control.lock();
            control.pending_strobe || self.scheduler.is_running()
        };

        if engaged {
            self.stop();
            false
        } else {
            self.start()
        }
    }

    /// Backgrounding stops the strobe; foregrounding resumes it only if the
    /// user still wants it
    pub fn on_app_state(&self, state: AppState) {
        let mut control = self.control.lock();
        match state {
            AppState::Background => {
                if !control.foreground {
                    return;
                }
                control.foreground = false;
                if self.scheduler.is_running() {
                    debug!("App backgrounded, pausing strobe");
                    self.stop_strobe();
                    control.pending_strobe = true;
                }
            }
            AppState::Active => {
                if control.foreground {
                    return;
                }
                control.foreground = true;
                if !control.can_strobe() {
                    control.pending_strobe = false;
                    return;
                }
                if control.camera_ready {
                    debug!("App foregrounded, resuming strobe");
                    control.pending_strobe = false;
                    self.start_strobe(&mut control);
                } else {
                    control.pending_strobe = true;
                }
            }
        }
    }

    /// Tear the session down. Every timer is cleared and the torch forced off
    /// before any async cleanup runs.
    pub async fn close(&self) -> Result<()> {
        let session_id = {
            let mut control = self.control.lock();
            if control.lifecycle == Lifecycle::Closed {
                return Ok(());
            }
            let id = control.session_id.take();
            *control = SessionControl::closed();

            self.scheduler.stop();
            self.cover.teardown();
            self.status.send_modify(|status| {
                status.open = false;
                status.strobing = false;
                status.screen_flash = false;
            });
            id
        };

        self.stop_alerts().await;

        if let Some(id) = session_id {
            info!(session = %id, "Siren session closed");
        }
        self.event_bus.publish(SirenEvent::Closed);
        Ok(())
    }

    pub fn status(&self) -> SirenStatus {
        self.status.borrow().clone()
    }

    /// Subscribe to status changes
    pub fn watch(&self) -> watch::Receiver<SirenStatus> {
        self.status.subscribe()
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.control.lock().lifecycle
    }

    pub fn session_id(&self) -> Option<Uuid> {
        self.control.lock().session_id
    }

    pub fn strobe_config(&self) -> Option<StrobeConfig> {
        self.scheduler.config()
    }

    pub fn is_strobing(&self) -> bool {
        self.scheduler.is_running()
    }

    /// Live cover opacity, interpolated during the fade
    pub fn cover_opacity(&self) -> f64 {
        self.cover.opacity()
    }

    pub fn cover(&self) -> &CoverGate {
        &self.cover
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    fn start_strobe(&self, control: &mut SessionControl) {
        control.pending_strobe = false;
        let config = self
            .scheduler
            .start(self.config.strobe.frequency_hz, self.config.system.prewarm_camera);
        self.status.send_modify(|status| status.strobing = true);
        debug!(
            "Strobe running at {:.2} Hz on {:?}",
            config.frequency_hz,
            self.scheduler.platform()
        );
    }

    fn stop_strobe(&self) {
        self.scheduler.stop();
        self.status.send_modify(|status| status.strobing = false);
    }

    async fn start_alerts(&self) {
        if self.config.alert.sound {
            if let Err(e) = self.alerts.start_looping_alert().await {
                warn!("Siren audio unavailable: {}", e);
            }
        }
        if self.config.alert.vibrate {
            let pattern = self.config.alert.vibration_pattern();
            if let Err(e) = self.alerts.start_vibration_pattern(&pattern).await {
                warn!("Vibration unavailable: {}", e);
            }
        }
    }

    async fn stop_alerts(&self) {
        if self.config.alert.sound {
            if let Err(e) = self.alerts.stop_alert().await {
                warn!("Failed to stop siren audio: {}", e);
            }
        }
        if self.config.alert.vibrate {
            if let Err(e) = self.alerts.stop_vibration().await {
                warn!("Failed to stop vibration: {}", e);
            }
        }
    }
}
