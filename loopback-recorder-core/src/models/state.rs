use std::sync::atomic::{AtomicU8, Ordering};

/// Recording session state machine.
///
/// State transitions:
/// ```text
/// idle → capturing → finalizing → idle
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SessionState {
    Idle = 0,
    Capturing = 1,
    Finalizing = 2,
}

impl SessionState {
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    pub fn is_capturing(&self) -> bool {
        matches!(self, Self::Capturing)
    }

    /// A recording is in progress, including the finalize step.
    pub fn is_recording(&self) -> bool {
        matches!(self, Self::Capturing | Self::Finalizing)
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Capturing,
            2 => Self::Finalizing,
            _ => Self::Idle,
        }
    }
}

/// A `SessionState` stored in a single atomic.
///
/// Transitions go through `transition`, a compare-and-swap, so exactly one
/// caller wins each edge of the state machine.
#[derive(Debug)]
pub struct AtomicSessionState(AtomicU8);

impl AtomicSessionState {
    pub fn new(state: SessionState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    pub fn load(&self) -> SessionState {
        SessionState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Move `from → to`. Returns `false` (and changes nothing) if the
    /// current state is not `from`.
    pub fn transition(&self, from: SessionState, to: SessionState) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}
