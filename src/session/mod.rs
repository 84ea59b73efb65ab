mod siren;
mod types;

#[cfg(test)]
mod tests;

pub use siren::SirenSession;
pub use types::{AppState, Lifecycle, SirenStatus};
