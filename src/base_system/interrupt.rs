//! Ctrl-C flag checked between chunks and between episodes.
//!
//! The handler only flips an atomic; loops poll it and unwind through
//! their normal cleanup paths instead of exiting mid-write.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::warn;

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

/// Install the Ctrl-C handler. Safe to call once per process; a second
/// call reports the underlying handler error.
pub fn install() -> Result<(), ctrlc::Error> {
    ctrlc::set_handler(|| {
        if !INTERRUPTED.swap(true, Ordering::SeqCst) {
            warn!("interrupt received, finishing current cleanup");
        }
    })
}

pub fn interrupted() -> bool {
    INTERRUPTED.load(Ordering::SeqCst)
}
