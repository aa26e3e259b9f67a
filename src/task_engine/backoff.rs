//! Retry backoff (spec.md §4.5 step 4): `delay = min(base * 2^retry_count,
//! cap) * jitter` where `jitter ∈ [0.5, 1.5]`.

use rand::Rng;

pub fn compute_delay_ms(base_ms: u64, cap_ms: u64, retry_count: u32) -> u64 {
    let exponential = base_ms.saturating_mul(1u64 << retry_count.min(32));
    let bounded = exponential.min(cap_ms);
    let jitter = rand::thread_rng().gen_range(0.5..=1.5);
    ((bounded as f64) * jitter) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_is_bounded_by_cap_and_jitter() {
        for retry_count in 0..10 {
            let delay = compute_delay_ms(1_000, 300_000, retry_count);
            assert!(delay <= (300_000f64 * 1.5) as u64);
        }
    }

    #[test]
    fn delay_grows_with_retry_count_before_hitting_cap() {
        // Using the midpoint jitter bound, successive retries should increase
        // until the cap dominates.
        let base = 1_000u64;
        let cap = 1_000_000u64;
        let mut prior = 0f64;
        for retry_count in 0..5 {
            let exponential = base.saturating_mul(1u64 << retry_count).min(cap) as f64;
            assert!(exponential >= prior);
            prior = exponential;
        }
    }
}
