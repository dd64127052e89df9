//! Retry-delay policy shared by the lifecycle manager's initial-charge path
//! and the billing engine's scheduled-renewal path (§4.6).

use chrono::{DateTime, Duration, Utc};

const EXPONENTIAL_INITIAL_DELAY_DAYS: i64 = 1;
const EXPONENTIAL_BACKOFF: i64 = 2;
const EXPONENTIAL_CAP_DAYS: i64 = 24;

/// `retry_at = now + initial_delay * backoff^(retry_count - 1)`, capped at
/// 24 days, unless an explicit `RETRY_DELAY_DAYS` schedule is configured —
/// the schedule wins, indexed by `retry_count` (1-based). Once `retry_count`
/// runs past the configured schedule, the exponential curve takes back over
/// from where the schedule left off.
pub fn compute_retry_at(now: DateTime<Utc>, retry_count: u32, retry_delay_days: &[i64]) -> DateTime<Utc> {
    let index = retry_count.saturating_sub(1) as usize;
    let days = match retry_delay_days.get(index) {
        Some(&configured) => configured,
        None => {
            let exponent = u32::try_from(index).unwrap_or(u32::MAX);
            let scaled = EXPONENTIAL_INITIAL_DELAY_DAYS.saturating_mul(EXPONENTIAL_BACKOFF.saturating_pow(exponent));
            scaled.min(EXPONENTIAL_CAP_DAYS)
        }
    };
    now + Duration::days(days)
}

/// Gateway-error retries (§4.6e) never increment `retry_count` — the delay
/// is always a flat hour, independent of the configured schedule.
pub fn gateway_error_retry_at(now: DateTime<Utc>) -> DateTime<Utc> {
    now + Duration::hours(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uses_configured_schedule_when_present() {
        let now = Utc::now();
        let schedule = [1, 3, 7];
        assert_eq!(compute_retry_at(now, 1, &schedule), now + Duration::days(1));
        assert_eq!(compute_retry_at(now, 2, &schedule), now + Duration::days(3));
        assert_eq!(compute_retry_at(now, 3, &schedule), now + Duration::days(7));
    }

    #[test]
    fn falls_back_to_capped_exponential_past_schedule_end() {
        let now = Utc::now();
        let schedule = [1, 3, 7];
        // index 3 (retry_count 4) is past the 3-entry schedule: 1 * 2^3 = 8.
        assert_eq!(compute_retry_at(now, 4, &schedule), now + Duration::days(8));
    }

    #[test]
    fn exponential_curve_caps_at_24_days() {
        let now = Utc::now();
        assert_eq!(compute_retry_at(now, 10, &[]), now + Duration::days(24));
    }
}
