mod phase;
mod scheduler;
#[cfg(test)]
mod tests;

pub use phase::{
    next_boundary, period_index, PlatformLimits, PulseShape, StrobeConfig, StrobePhase,
    DEFAULT_FREQUENCY_HZ,
};
pub use scheduler::StrobeScheduler;
