// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Sizing heuristic for the compositor's internal frame cache.

use sysinfo::System;

/// Assumed worst-case memory cost of one cached frame.
const BYTES_PER_FRAME: u64 = 6 * 1024 * 1024;

/// Lower bound, honored even when it implies swapping.
const MIN_CAPACITY: u64 = 500;

/// Upper bound, capping absolute memory commitment.
const MAX_CAPACITY: u64 = 2000;

/// Number of frames the compositor should cache, derived from the host's
/// free physical memory at call time.
pub fn frame_cache_capacity() -> u64 {
    let mut system = System::new();
    system.refresh_memory();
    capacity_for_free_memory(system.free_memory())
}

/// Pure sizing rule: one frame per 6 MiB of free memory, clamped into
/// `[500, 2000]`.
pub fn capacity_for_free_memory(free_bytes: u64) -> u64 {
    (free_bytes / BYTES_PER_FRAME).clamp(MIN_CAPACITY, MAX_CAPACITY)
}

#[cfg(test)]
#[path = "capacity_tests.rs"]
mod tests;
