//! Cache memory budget derived from system memory queries
//!
//! The usable budget is `min(available_physical, available_pagefile)`
//! scaled by a safety factor. Physical memory can be reported as available
//! yet be unusable when the backing page file is nearly exhausted, so the
//! smaller of the two figures wins. When the environment cannot be queried
//! at all, a fixed conservative budget is used instead of failing.

use sysinfo::System;

/// Default safety factor applied to the queried headroom.
pub const DEFAULT_SAFETY_FACTOR: f64 = 0.8;

/// Default fixed budget when memory queries are unavailable: 256 MiB.
pub const DEFAULT_FALLBACK_BYTES: u64 = 256 * 1024 * 1024;

/// Budget computation parameters.
#[derive(Debug, Clone, Copy)]
pub struct BudgetConfig {
    /// Fraction of queried headroom the cache may occupy (0, 1].
    pub safety_factor: f64,

    /// Fixed budget used when the environment cannot be queried.
    pub fallback_bytes: u64,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        BudgetConfig {
            safety_factor: DEFAULT_SAFETY_FACTOR,
            fallback_bytes: DEFAULT_FALLBACK_BYTES,
        }
    }
}

/// Query the environment and compute the cache budget in bytes.
///
/// Never fails: unavailable or nonsensical readings fall back to
/// `config.fallback_bytes`.
pub fn compute(config: &BudgetConfig) -> u64 {
    let mut sys = System::new();
    sys.refresh_memory();

    let physical = sys.available_memory();
    if physical == 0 {
        tracing::warn!(
            fallback = config.fallback_bytes,
            "memory query unavailable, using fixed cache budget"
        );
        return config.fallback_bytes;
    }

    // No swap configured means no page-file constraint to honor.
    let pagefile = if sys.total_swap() == 0 {
        physical
    } else {
        sys.free_swap()
    };

    let headroom = physical.min(pagefile);
    if headroom == 0 {
        tracing::warn!(
            fallback = config.fallback_bytes,
            "page file exhausted, using fixed cache budget"
        );
        return config.fallback_bytes;
    }
    let budget = (headroom as f64 * config.safety_factor) as u64;

    tracing::debug!(physical, pagefile, budget, "computed cache budget");
    budget
}
