//! Retry Scheme
//!
//! A deterministic, monotonic-to-cap backoff cursor used exclusively by the
//! event stream's reconnect policy. Unlike the pipeline (which never backs
//! off on network errors), the stream must survive indefinitely, so it
//! walks this fixed sequence instead of giving up.

use std::time::Duration;

const SEQUENCE_SECS: [f64; 7] = [0.1, 1.0, 3.0, 5.0, 7.0, 11.0, 15.0];

/// Stateful cursor over the fixed backoff sequence `[0.1, 1, 3, 5, 7, 11, 15]`
/// seconds. `next()` advances and saturates at the last value; `reset()`
/// returns to the pre-first state so the next `next()` again yields `0.1s`.
#[derive(Debug, Clone, Default)]
pub struct RetryScheme {
    cursor: Option<usize>,
}

impl RetryScheme {
    pub fn new() -> Self {
        Self { cursor: None }
    }

    /// Advance the cursor and return the next backoff duration.
    pub fn next(&mut self) -> Duration {
        let idx = match self.cursor {
            None => 0,
            Some(i) => (i + 1).min(SEQUENCE_SECS.len() - 1),
        };
        self.cursor = Some(idx);
        Duration::from_secs_f64(SEQUENCE_SECS[idx])
    }

    /// Return to the pre-first state.
    pub fn reset(&mut self) {
        self.cursor = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_next_yields_shortest_delay() {
        let mut scheme = RetryScheme::new();
        assert_eq!(scheme.next(), Duration::from_secs_f64(0.1));
    }

    #[test]
    fn sequence_is_monotonic_and_saturates() {
        let mut scheme = RetryScheme::new();
        let mut last = Duration::ZERO;
        let mut values = Vec::new();
        for _ in 0..SEQUENCE_SECS.len() + 3 {
            let d = scheme.next();
            assert!(d >= last, "retry sequence must be non-decreasing");
            last = d;
            values.push(d);
        }
        let cap = Duration::from_secs_f64(15.0);
        assert_eq!(*values.last().unwrap(), cap);
        assert_eq!(values[values.len() - 2], cap);
    }

    #[test]
    fn reset_restarts_at_shortest_delay() {
        let mut scheme = RetryScheme::new();
        scheme.next();
        scheme.next();
        scheme.next();
        scheme.reset();
        assert_eq!(scheme.next(), Duration::from_secs_f64(0.1));
    }
}
