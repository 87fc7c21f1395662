//! Poison-tolerant `RwLock` access.
//!
//! A panic while a guard is held must not wedge the settings handle or the
//! in-memory cache for every later request, so both recover the inner value
//! and leave a warning behind.

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::warn;

pub(crate) fn read_or_recover<'a, T>(
    lock: &'a RwLock<T>,
    owner: &'static str,
    op: &'static str,
) -> RwLockReadGuard<'a, T> {
    lock.read().unwrap_or_else(|poisoned| {
        report_poisoned(owner, op, "read");
        PoisonError::into_inner(poisoned)
    })
}

pub(crate) fn write_or_recover<'a, T>(
    lock: &'a RwLock<T>,
    owner: &'static str,
    op: &'static str,
) -> RwLockWriteGuard<'a, T> {
    lock.write().unwrap_or_else(|poisoned| {
        report_poisoned(owner, op, "write");
        PoisonError::into_inner(poisoned)
    })
}

fn report_poisoned(owner: &'static str, op: &'static str, access: &'static str) {
    warn!(
        owner,
        op,
        access,
        result = "poisoned_recovered",
        "state may be stale after a panic in another thread"
    );
}
