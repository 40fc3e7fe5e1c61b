//! Application lifecycle bridge.
//!
//! Mobile hosts report `active`, `background` and `inactive` transitions.
//! Coming back to the foreground is the external trigger that revives a
//! channel whose automatic retries were exhausted. Going to the background
//! tears nothing down; the channel is allowed to try to persist.

/// Host application state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AppState {
    /// In the foreground and receiving input.
    #[default]
    Active,
    /// Not visible.
    Background,
    /// Visible but not receiving input (transitions, system dialogs).
    Inactive,
}

impl AppState {
    /// Parse a host state tag. Unknown tags are ignored.
    pub fn from_wire(tag: &str) -> Option<Self> {
        match tag {
            "active" => Some(Self::Active),
            "background" => Some(Self::Background),
            "inactive" => Some(Self::Inactive),
            _ => None,
        }
    }
}

/// What a state change means for the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleSignal {
    /// App returned to the foreground.
    Foregrounded,
    /// App left the foreground.
    Backgrounded,
}

/// Tracks the last observed [`AppState`] and reports meaningful transitions.
#[derive(Debug, Clone, Default)]
pub struct LifecycleBridge {
    current: AppState,
}

impl LifecycleBridge {
    /// Bridge starting from `initial`.
    pub fn new(initial: AppState) -> Self {
        Self { current: initial }
    }

    /// Last observed state.
    pub fn current(&self) -> AppState {
        self.current
    }

    /// Record a new state.
    ///
    /// Repeated reports of the same state yield nothing. `Inactive` on its
    /// own is not a background transition: iOS passes through it on the way
    /// to and from the foreground.
    pub fn observe(&mut self, next: AppState) -> Option<LifecycleSignal> {
        let previous = std::mem::replace(&mut self.current, next);
        match (previous, next) {
            (previous, AppState::Active) if previous != AppState::Active => {
                Some(LifecycleSignal::Foregrounded)
            },
            (previous, AppState::Background) if previous != AppState::Background => {
                Some(LifecycleSignal::Backgrounded)
            },
            _ => None,
        }
    }
}
