use std::fmt;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// Cancellable token for one piece of background work.
///
/// Clones share the same flag: the service keeps one to poll from its worker,
/// the cell keeps another to cancel on rebind. Cancelling is idempotent and a
/// no-op once the work has finished.
#[derive(Clone, Default)]
pub struct Handle {
    cancelled: Arc<AtomicBool>,
}

impl Handle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
