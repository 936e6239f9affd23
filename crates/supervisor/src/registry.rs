// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Correlation table from request nonce to pending completion handle.

use std::collections::HashMap;

use bytes::Bytes;
use tokio::sync::oneshot;

use crate::error::SupervisorError;

/// One-shot completion handle for a single in-flight request.
pub(crate) type Waiter = oneshot::Sender<Result<Bytes, SupervisorError>>;

/// Pending waiters keyed by nonce.
///
/// A nonce maps to at most one in-flight request. `take` removes the entry
/// before handing it back, so a duplicate frame for the same nonce finds
/// nothing and cannot double-complete a caller.
#[derive(Default)]
pub(crate) struct WaiterRegistry {
    waiters: HashMap<String, Waiter>,
}

impl WaiterRegistry {
    pub fn insert(&mut self, nonce: String, waiter: Waiter) {
        let prior = self.waiters.insert(nonce, waiter);
        debug_assert!(prior.is_none(), "nonce reused while still in flight");
    }

    pub fn take(&mut self, nonce: &str) -> Option<Waiter> {
        self.waiters.remove(nonce)
    }

    pub fn drain(&mut self) -> Vec<Waiter> {
        self.waiters.drain().map(|(_, waiter)| waiter).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.waiters.is_empty()
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
