use std::sync::{Arc, Mutex, MutexGuard};

use crate::signature::{Secp256k1Recovery, SignerRecovery};
use crate::Aggregator;

/// A cloneable handle serializing every call on one aggregator behind a single lock.
pub struct SharedAggregator<R = Secp256k1Recovery> {
    inner: Arc<Mutex<Aggregator<R>>>,
}

impl<R> Clone for SharedAggregator<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R: SignerRecovery> SharedAggregator<R> {
    pub fn new(aggregator: Aggregator<R>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(aggregator)),
        }
    }

    /// Runs `f` with exclusive access to the aggregator.
    pub fn with<T>(&self, f: impl FnOnce(&mut Aggregator<R>) -> T) -> T {
        f(&mut self.lock())
    }

    // calls never leave partial state behind
    fn lock(&self) -> MutexGuard<'_, Aggregator<R>> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
