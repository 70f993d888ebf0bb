//! Lock, fetch, and scheduler timing constants.

use std::time::Duration;

/// Default distributed-lock lease TTL (15 seconds).
///
/// The lease must exceed the worst-case merge pipeline latency
/// (fetch timeout × retries), otherwise a still-running refresh will
/// self-preempt when a peer acquires the expired key.
pub const LOCK_LEASE_TTL: Duration = Duration::from_secs(15);

/// Timeout applied to each individual lock-store operation.
///
/// Independent of the lease itself: a slow or partitioned store must not
/// stall the scheduler for longer than this.
pub const LOCK_OP_TIMEOUT: Duration = Duration::from_secs(3);

/// Per-attempt remote fetch timeout.
///
/// Sized so the full retry budget (attempts plus backoff sleeps) stays
/// inside [`LOCK_LEASE_TTL`]; see the assertion below.
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(4);

/// Connect timeout for the remote fetch HTTP client.
pub const FETCH_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Maximum remote fetch attempts per refresh cycle.
pub const FETCH_MAX_ATTEMPTS: u32 = 3;

/// Base backoff between fetch retries; grows linearly per attempt.
pub const FETCH_BACKOFF_BASE: Duration = Duration::from_millis(500);

// Worst-case fetch: every attempt runs to its timeout, with the linear
// backoff sleeps (base × 1, base × 2, ...) between attempts.
const WORST_CASE_FETCH_MILLIS: u128 = FETCH_TIMEOUT.as_millis() * FETCH_MAX_ATTEMPTS as u128
    + FETCH_BACKOFF_BASE.as_millis()
        * (FETCH_MAX_ATTEMPTS as u128 * (FETCH_MAX_ATTEMPTS as u128 - 1) / 2);

const _: () = assert!(
    WORST_CASE_FETCH_MILLIS < LOCK_LEASE_TTL.as_millis(),
    "worst-case fetch must finish inside the lock lease, or a still-running \
     refresh self-preempts when a peer acquires the expired key"
);

/// Scheduler driver tick.
///
/// Fine enough for second-granularity intervals, cheap enough to idle.
pub const SCHEDULER_TICK: Duration = Duration::from_millis(500);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_budget_fits_inside_lock_lease() {
        let attempts = u128::from(FETCH_MAX_ATTEMPTS);
        let backoff_total = FETCH_BACKOFF_BASE.as_millis() * (attempts * (attempts - 1) / 2);
        let worst_case = FETCH_TIMEOUT.as_millis() * attempts + backoff_total;

        assert!(
            worst_case < LOCK_LEASE_TTL.as_millis(),
            "worst-case fetch ({worst_case}ms) must finish inside the lease \
             ({}ms)",
            LOCK_LEASE_TTL.as_millis()
        );
    }
}
