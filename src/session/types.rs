/// Host application foreground state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppState {
    Active,
    Background,
}

/// Session lifecycle as seen from the hosting screen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Closed,
    Opening,
    Open,
}

/// Read-only fields a presentational view binds to
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SirenStatus {
    pub open: bool,
    pub torch_on: bool,
    pub strobing: bool,
    pub cover_visible: bool,
    pub cover_opacity: f64,
    /// Full-screen flash overlay substituting for an unusable torch
    pub screen_flash: bool,
}

