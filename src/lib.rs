pub mod config;
pub mod cover;
pub mod error;
pub mod events;
pub mod hardware;
pub mod keyboard_input;
pub mod session;
pub mod strobe;
pub mod timer;
pub mod trigger;

pub use config::{Platform, SirenConfig};
pub use cover::{CoverGate, CoverPhase, CoverState, FadeTrigger};
pub use error::{EventBusError, Result, SirenError, TorchError};
pub use events::{EventBus, EventFilter, EventReceiver, SirenEvent, Subscription};
pub use hardware::{
    AlertCall, AlertChannel, CameraAccess, ConsoleAlerts, ConsoleTorch, RecordingAlerts,
    RecordingTorch, SimulatedCamera, TorchDriver,
};
pub use keyboard_input::{KeyCommand, KeyboardInputHandler};
pub use session::{AppState, Lifecycle, SirenSession, SirenStatus};
pub use strobe::{
    next_boundary, PlatformLimits, PulseShape, StrobeConfig, StrobePhase, StrobeScheduler,
};
pub use timer::TimerSlot;
pub use trigger::{Activation, ActivationGate, TapTrigger};
