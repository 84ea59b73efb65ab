use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SirenConfig {
    pub strobe: StrobeSettings,
    pub platform: PlatformConfig,
    pub cover: CoverConfig,
    pub trigger: TriggerConfig,
    pub alert: AlertConfig,
    pub system: SystemConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct StrobeSettings {
    /// Requested toggle frequency in Hz (clamped per platform at start)
    #[serde(default = "default_frequency_hz")]
    pub frequency_hz: f64,

    /// Minimum visible flash pulse in milliseconds
    #[serde(default = "default_min_on_ms")]
    pub min_on_ms: u64,

    /// Fraction of each period the torch stays on
    #[serde(default = "default_duty_fraction")]
    pub duty_fraction: f64,

    /// Platform family the clamp and warm-up tables are looked up for
    #[serde(default = "default_platform")]
    pub platform: Platform,
}

/// Per-platform ceilings and camera warm-up delays
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct PlatformConfig {
    #[serde(default = "default_ios_max_hz")]
    pub ios_max_hz: f64,

    #[serde(default = "default_android_max_hz")]
    pub android_max_hz: f64,

    /// Warm-up when the camera preview was already prewarmed
    #[serde(default = "default_primed_warmup_ms")]
    pub primed_warmup_ms: u64,

    #[serde(default = "default_ios_warmup_ms")]
    pub ios_warmup_ms: u64,

    #[serde(default = "default_android_warmup_ms")]
    pub android_warmup_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct CoverConfig {
    /// Failsafe after which the cover fades even without camera readiness
    #[serde(default = "default_failsafe_ms")]
    pub failsafe_ms: u64,

    /// Fade-out animation length
    #[serde(default = "default_fade_ms")]
    pub fade_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct TriggerConfig {
    /// Taps needed to request activation
    #[serde(default = "default_taps_required")]
    pub taps_required: u32,

    /// Window all taps must fall inside
    #[serde(default = "default_tap_window_ms")]
    pub window_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct AlertConfig {
    #[serde(default = "default_sound")]
    pub sound: bool,

    #[serde(default = "default_vibrate")]
    pub vibrate: bool,

    /// Alternating wait/vibrate durations in milliseconds, repeated
    #[serde(default = "default_vibration_pattern_ms")]
    pub vibration_pattern_ms: Vec<u64>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SystemConfig {
    /// Broadcast capacity for async event receivers
    #[serde(default = "default_event_bus_capacity")]
    pub event_bus_capacity: usize,

    /// Whether the camera preview is started before the strobe is needed
    #[serde(default = "default_prewarm_camera")]
    pub prewarm_camera: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Ios,
    Android,
}

impl std::str::FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ios" => Ok(Platform::Ios),
            "android" => Ok(Platform::Android),
            other => Err(format!("unknown platform '{}' (expected ios or android)", other)),
        }
    }
}

impl SirenConfig {
    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            .set_default("strobe.frequency_hz", default_frequency_hz())?
            .set_default("strobe.min_on_ms", default_min_on_ms() as i64)?
            .set_default("strobe.duty_fraction", default_duty_fraction())?
            .set_default("strobe.platform", "android")?
            .set_default("platform.ios_max_hz", default_ios_max_hz())?
            .set_default("platform.android_max_hz", default_android_max_hz())?
            .set_default("platform.primed_warmup_ms", default_primed_warmup_ms() as i64)?
            .set_default("platform.ios_warmup_ms", default_ios_warmup_ms() as i64)?
            .set_default(
                "platform.android_warmup_ms",
                default_android_warmup_ms() as i64,
            )?
            .set_default("cover.failsafe_ms", default_failsafe_ms() as i64)?
            .set_default("cover.fade_ms", default_fade_ms() as i64)?
            .set_default("trigger.taps_required", default_taps_required() as i64)?
            .set_default("trigger.window_ms", default_tap_window_ms() as i64)?
            .set_default("alert.sound", default_sound())?
            .set_default("alert.vibrate", default_vibrate())?
            .set_default(
                "alert.vibration_pattern_ms",
                default_vibration_pattern_ms()
                    .into_iter()
                    .map(|ms| ms as i64)
                    .collect::<Vec<_>>(),
            )?
            .set_default(
                "system.event_bus_capacity",
                default_event_bus_capacity() as i64,
            )?
            .set_default("system.prewarm_camera", default_prewarm_camera())?
            // Add configuration file (optional)
            .add_source(File::with_name(&path_str).required(false))
            // SIRENSTROBE_STROBE__FREQUENCY_HZ=4 etc.
            .add_source(
                Environment::with_prefix("SIRENSTROBE")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: SirenConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.strobe.frequency_hz.is_finite() && self.strobe.frequency_hz > 0.0) {
            return Err(ConfigError::Message(
                "Strobe frequency_hz must be greater than 0".to_string(),
            ));
        }

        if !(self.strobe.duty_fraction > 0.0 && self.strobe.duty_fraction <= 1.0) {
            return Err(ConfigError::Message(
                "Strobe duty_fraction must be in (0, 1]".to_string(),
            ));
        }

        if self.strobe.min_on_ms == 0 {
            return Err(ConfigError::Message(
                "Strobe min_on_ms must be greater than 0".to_string(),
            ));
        }

        for (name, max_hz) in [
            ("ios_max_hz", self.platform.ios_max_hz),
            ("android_max_hz", self.platform.android_max_hz),
        ] {
            if !(max_hz.is_finite() && max_hz > 0.0) {
                return Err(ConfigError::Message(format!(
                    "Platform {} must be greater than 0",
                    name
                )));
            }
        }

        if self.cover.failsafe_ms == 0 {
            return Err(ConfigError::Message(
                "Cover failsafe_ms must be greater than 0".to_string(),
            ));
        }

        if self.trigger.taps_required == 0 {
            return Err(ConfigError::Message(
                "Trigger taps_required must be greater than 0".to_string(),
            ));
        }

        if self.trigger.window_ms == 0 {
            return Err(ConfigError::Message(
                "Trigger window_ms must be greater than 0".to_string(),
            ));
        }

        if self.system.event_bus_capacity == 0 {
            return Err(ConfigError::Message(
                "Event bus capacity must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Render the configuration as TOML
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

impl Default for SirenConfig {
    fn default() -> Self {
        Self {
            strobe: StrobeSettings {
                frequency_hz: default_frequency_hz(),
                min_on_ms: default_min_on_ms(),
                duty_fraction: default_duty_fraction(),
                platform: default_platform(),
            },
            platform: PlatformConfig {
                ios_max_hz: default_ios_max_hz(),
                android_max_hz: default_android_max_hz(),
                primed_warmup_ms: default_primed_warmup_ms(),
                ios_warmup_ms: default_ios_warmup_ms(),
                android_warmup_ms: default_android_warmup_ms(),
            },
            cover: CoverConfig {
                failsafe_ms: default_failsafe_ms(),
                fade_ms: default_fade_ms(),
            },
            trigger: TriggerConfig {
                taps_required: default_taps_required(),
                window_ms: default_tap_window_ms(),
            },
            alert: AlertConfig {
                sound: default_sound(),
                vibrate: default_vibrate(),
                vibration_pattern_ms: default_vibration_pattern_ms(),
            },
            system: SystemConfig {
                event_bus_capacity: default_event_bus_capacity(),
                prewarm_camera: default_prewarm_camera(),
            },
        }
    }
}

impl CoverConfig {
    pub fn failsafe(&self) -> Duration {
        Duration::from_millis(self.failsafe_ms)
    }

    pub fn fade(&self) -> Duration {
        Duration::from_millis(self.fade_ms)
    }
}

impl TriggerConfig {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

impl AlertConfig {
    pub fn vibration_pattern(&self) -> Vec<Duration> {
        self.vibration_pattern_ms
            .iter()
            .map(|ms| Duration::from_millis(*ms))
            .collect()
    }
}

// Default value functions
fn default_frequency_hz() -> f64 {
    6.0
}
fn default_min_on_ms() -> u64 {
    180
}
fn default_duty_fraction() -> f64 {
    0.6
}
fn default_platform() -> Platform {
    Platform::Android
}

fn default_ios_max_hz() -> f64 {
    8.0
}
fn default_android_max_hz() -> f64 {
    3.0
}
// Tuned against camera HAL latency, not derived
fn default_primed_warmup_ms() -> u64 {
    120
}
fn default_ios_warmup_ms() -> u64 {
    220
}
fn default_android_warmup_ms() -> u64 {
    350
}

fn default_failsafe_ms() -> u64 {
    1600
}
fn default_fade_ms() -> u64 {
    300
}

fn default_taps_required() -> u32 {
    5
}
fn default_tap_window_ms() -> u64 {
    1500
}

fn default_sound() -> bool {
    true
}
fn default_vibrate() -> bool {
    true
}
fn default_vibration_pattern_ms() -> Vec<u64> {
    vec![0, 500, 300]
}

fn default_event_bus_capacity() -> usize {
    64
}
fn default_prewarm_camera() -> bool {
    true
}
