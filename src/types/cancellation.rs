/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// Shared, fire-and-forget cancellation flag.
///
/// The driver hands a clone of a session's `CancelToken` to everything working on the session's
/// behalf (worker threads, state manager requests). Cancelling is observed by polling
/// [`is_cancelled`](Self::is_cancelled); nobody waits for the observers to notice.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> CancelToken {
        CancelToken::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release)
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}
