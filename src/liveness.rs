use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Liveness flag of one reconciliation sequence.
///
/// Every trigger starts a new epoch and supersedes the token of the previous
/// one. A superseded sequence checks [`LiveToken::is_live`] before each
/// suspension point and stops producing side effects once it is false.
#[derive(Clone, Debug)]
pub struct LiveToken {
    epoch: u64,
    live: Arc<AtomicBool>,
}

impl LiveToken {
    pub fn new(epoch: u64) -> Self {
        Self {
            epoch,
            live: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }

    pub fn supersede(&self) {
        self.live.store(false, Ordering::Release);
    }
}
