//! One-way teardown state shared by the writer guardian and reader cache.

use std::sync::atomic::{AtomicU8, Ordering};

use crate::error::{FolioError, Result};

const ACTIVE: u8 = 0;
const DISPOSED: u8 = 1;

/// `active` until [`DisposalGuard::dispose`] succeeds once, `disposed` forever after.
#[derive(Debug, Default)]
pub struct DisposalGuard {
    state: AtomicU8,
}

impl DisposalGuard {
    pub fn new() -> Self {
        DisposalGuard {
            state: AtomicU8::new(ACTIVE),
        }
    }

    /// Move to `disposed`. Only the first caller gets `true`.
    pub fn dispose(&self) -> bool {
        self.state
            .compare_exchange(ACTIVE, DISPOSED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn is_disposed(&self) -> bool {
        self.state.load(Ordering::Acquire) == DISPOSED
    }

    /// Fail with `Disposed` once teardown has started.
    pub fn check(&self, operation: &str) -> Result<()> {
        if self.is_disposed() {
            Err(FolioError::disposed(format!("cannot {operation}")))
        } else {
            Ok(())
        }
    }
}
