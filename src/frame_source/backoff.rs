// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Exponential backoff with uniform jitter, shared by the frame source's
//! reconnect logic and the stream publisher's retry logic — one policy,
//! two callers.

use std::time::Duration;

use rand::Rng;

/// `base * 2^attempt * U[0.8, 1.2]`, capped at `max`. `attempt` is 0-based
/// (the first retry after an initial failure).
pub fn next_delay(base: Duration, attempt: u32, max: Duration) -> Duration {
    let exp = base.as_secs_f64() * 2f64.powi(attempt.min(32) as i32);
    let capped = exp.min(max.as_secs_f64());
    let jitter = rand::thread_rng().gen_range(0.8..=1.2);
    Duration::from_secs_f64((capped * jitter).max(0.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stays_within_jitter_bounds_of_the_capped_value() {
        let base = Duration::from_millis(100);
        let max = Duration::from_secs(10);
        for attempt in 0..8 {
            let exp = base.as_secs_f64() * 2f64.powi(attempt as i32);
            let capped = exp.min(max.as_secs_f64());
            let delay = next_delay(base, attempt, max);
            assert!(delay.as_secs_f64() >= capped * 0.8 - 1e-9);
            assert!(delay.as_secs_f64() <= capped * 1.2 + 1e-9);
        }
    }

    #[test]
    fn never_exceeds_cap_even_at_high_attempt_counts() {
        let base = Duration::from_millis(100);
        let max = Duration::from_secs(5);
        let delay = next_delay(base, 30, max);
        assert!(delay.as_secs_f64() <= max.as_secs_f64() * 1.2 + 1e-9);
    }
}
