use crate::geometry::Rect;
use crate::registry::Handle;
use crate::render::backend::{BackendKind, DeviceError};

/// Why a handle could not be resolved to a live record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidHandleReason {
    /// Index lies outside of the allocated table.
    OutOfRange,
    /// Slot is empty: the record was never opened or has been closed.
    Empty,
    /// Slot was reused since the handle was issued (use after close).
    Stale,
}

impl std::fmt::Display for InvalidHandleReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InvalidHandleReason::OutOfRange => write!(f, "index out of range"),
            InvalidHandleReason::Empty => write!(f, "no open window or texture"),
            InvalidHandleReason::Stale => write!(f, "window or texture was already closed"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ScreenError {
    #[error("Invalid window handle {handle}: {reason}")]
    InvalidHandle {
        handle: Handle,
        reason: InvalidHandleReason,
    },

    #[error("Window record {handle} is corrupt (partially constructed). This is a bug")]
    CorruptRecord { handle: Handle },

    #[error("Invalid {arg} {rect:?}: (partially) outside of {bounds:?}")]
    OutOfBoundsRect {
        arg: &'static str,
        rect: Rect,
        bounds: Rect,
    },

    #[error("Rotation requested with both texture-matrix rotation and no-rotation flags set")]
    ConflictingRotationMode,

    #[error("Window {handle} is already inside a primitive group")]
    AlreadyInGroup { handle: Handle },

    #[error("Window {handle} is not inside a primitive group")]
    NotInGroup { handle: Handle },

    #[error("{what} is not supported on the {backend} backend")]
    UnsupportedOnBackend {
        what: &'static str,
        backend: BackendKind,
    },

    #[error("Capacity exceeded: {0}")]
    CapacityExceeded(String),

    #[error("Invalid argument '{name}': {reason}")]
    InvalidArgument { name: &'static str, reason: String },

    #[error("Handle {handle} is a {actual}, but a {expected} is required")]
    WrongKind {
        handle: Handle,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("Window {handle} still owns {children} open textures or offscreen windows")]
    HasChildren { handle: Handle, children: usize },

    #[error("Timed out after {0:?} waiting for the GPU to finish")]
    Timeout(std::time::Duration),

    #[error("Device error: {0}")]
    Device(#[source] DeviceError),

    #[error("Background loader error: {0}")]
    Loader(anyhow::Error),
}

impl ScreenError {
    /// Errors after which the current top-level command must halt without any recovery attempt.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ScreenError::CorruptRecord { .. } | ScreenError::CapacityExceeded(_))
    }

    /// Stable numeric code used by the C interface. Zero is reserved for success.
    pub fn code(&self) -> i32 {
        match self {
            ScreenError::InvalidHandle { .. } => -1,
            ScreenError::CorruptRecord { .. } => -2,
            ScreenError::OutOfBoundsRect { .. } => -3,
            ScreenError::ConflictingRotationMode => -4,
            ScreenError::AlreadyInGroup { .. } => -5,
            ScreenError::NotInGroup { .. } => -6,
            ScreenError::UnsupportedOnBackend { .. } => -7,
            ScreenError::CapacityExceeded(_) => -8,
            ScreenError::InvalidArgument { .. } => -9,
            ScreenError::WrongKind { .. } => -10,
            ScreenError::HasChildren { .. } => -11,
            ScreenError::Timeout(_) => -12,
            ScreenError::Device(_) => -13,
            ScreenError::Loader(_) => -14,
        }
    }

    pub(crate) fn invalid_argument(name: &'static str, reason: impl Into<String>) -> Self {
        ScreenError::InvalidArgument {
            name,
            reason: reason.into(),
        }
    }
}

impl From<DeviceError> for ScreenError {
    fn from(e: DeviceError) -> Self {
        match e {
            DeviceError::Unsupported { what, backend } => {
                ScreenError::UnsupportedOnBackend { what, backend }
            }
            other => ScreenError::Device(other),
        }
    }
}

pub type Result<T, E = ScreenError> = std::result::Result<T, E>;
