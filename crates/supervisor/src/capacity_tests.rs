// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

const GIB: u64 = 1024 * 1024 * 1024;

#[test]
fn low_memory_clamps_up_to_floor() {
    // 1 GiB / 6 MiB = 170, below the floor.
    assert_eq!(capacity_for_free_memory(GIB), 500);
    assert_eq!(capacity_for_free_memory(0), 500);
}

#[test]
fn high_memory_clamps_down_to_ceiling() {
    // 100 GiB / 6 MiB = 17066, above the ceiling.
    assert_eq!(capacity_for_free_memory(100 * GIB), 2000);
}

#[test]
fn mid_range_memory_scales_linearly() {
    // 4 GiB / 6 MiB = 682.
    assert_eq!(capacity_for_free_memory(4 * GIB), 682);
}

#[test]
fn live_reading_stays_within_bounds() {
    let capacity = frame_cache_capacity();
    assert!((500..=2000).contains(&capacity));
}
