use httpbench_common::{Outcome, Report};
use tracing::debug;

/// Summarize a finished run. Sorts `outcomes` by latency in place.
///
/// Mean and the even-length median use truncating integer division.
/// Failures are outcomes whose status token starts with `4` or `5`.
pub fn summarize(outcomes: &mut [Outcome]) -> Report {
    if outcomes.is_empty() {
        return Report::default();
    }

    // Stable, so a second call on the sorted slice leaves it untouched.
    outcomes.sort_by_key(|o| o.elapsed_ms);

    let n = outcomes.len();
    let mut sum: u64 = 0;
    let mut min_size = u64::MAX;
    let mut max_size = 0;
    let mut failures = 0;
    let mut error_codes: Vec<(String, usize)> = Vec::new();

    for outcome in outcomes.iter() {
        sum += outcome.elapsed_ms;
        min_size = min_size.min(outcome.size_bytes);
        max_size = max_size.max(outcome.size_bytes);

        if outcome.status.is_failure() {
            failures += 1;
            let token = outcome.status.as_token();
            match error_codes.iter_mut().find(|(code, _)| code == token) {
                Some((_, count)) => *count += 1,
                None => error_codes.push((token.to_string(), 1)),
            }
        }
    }

    let median_ms = if n % 2 == 0 {
        (outcomes[n / 2].elapsed_ms + outcomes[n / 2 - 1].elapsed_ms) / 2
    } else {
        outcomes[n / 2].elapsed_ms
    };

    debug!(requests = n, failures, "summarized outcomes");

    Report {
        request_count: n,
        fastest_ms: outcomes[0].elapsed_ms,
        slowest_ms: outcomes[n - 1].elapsed_ms,
        mean_ms: sum / n as u64,
        median_ms,
        success_percent: (1.0 - failures as f64 / n as f64) * 100.0,
        error_codes,
        min_size_bytes: min_size,
        max_size_bytes: max_size,
    }
}
