//! Host services: network status and user dialogs

/// Current network conditions
pub trait NetworkStatus: Send + Sync {
    fn is_cellular(&self) -> bool;
}

/// Network that is never metered
#[derive(Debug, Clone, Copy, Default)]
pub struct Unmetered;

impl NetworkStatus for Unmetered {
    fn is_cellular(&self) -> bool {
        false
    }
}

/// Dialogs the player may raise
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogKind {
    /// Playback was blocked on a cellular network
    CellularBlocked,
}

/// Modal dialog host
pub trait DialogService: Send + Sync {
    /// Dialog currently on screen, if any
    fn current(&self) -> Option<DialogKind>;

    fn show(&self, dialog: DialogKind);
}

/// Dialog host for headless use; logs instead of showing
#[derive(Debug, Clone, Copy, Default)]
pub struct LogDialogs;

impl DialogService for LogDialogs {
    fn current(&self) -> Option<DialogKind> {
        None
    }

    fn show(&self, dialog: DialogKind) {
        tracing::warn!(?dialog, "Dialog requested");
    }
}
