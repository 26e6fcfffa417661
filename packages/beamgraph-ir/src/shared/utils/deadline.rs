//! Cooperative deadline checks
//!
//! The graph builders check the deadline at every recursion frame instead of
//! relying on task cancellation. A `Deadline` is cheap to copy and carries no
//! locks.

use std::time::{Duration, Instant};

/// Deadline exceeded marker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeadlineExceeded;

/// A point in time after which cooperative work must stop
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at: Instant,
}

impl Deadline {
    pub fn after(duration: Duration) -> Self {
        Self {
            at: Instant::now() + duration,
        }
    }

    /// Deadline sized by estimated AST complexity: 10s baseline, up to 60s
    /// for deeply nested inputs.
    pub fn for_complexity(estimated_nodes: usize) -> Self {
        let secs = 10 + (estimated_nodes / 200) as u64 * 5;
        Self::after(Duration::from_secs(secs.min(60)))
    }

    pub fn check(&self) -> Result<(), DeadlineExceeded> {
        if Instant::now() >= self.at {
            Err(DeadlineExceeded)
        } else {
            Ok(())
        }
    }

    pub fn expired(&self) -> bool {
        self.check().is_err()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_deadline_not_expired() {
        let deadline = Deadline::after(Duration::from_secs(60));
        assert!(deadline.check().is_ok());
    }

    #[test]
    fn test_zero_deadline_expired() {
        let deadline = Deadline::after(Duration::from_secs(0));
        assert!(deadline.expired());
    }

    #[test]
    fn test_complexity_sizing_capped() {
        let small = Deadline::for_complexity(10);
        let huge = Deadline::for_complexity(1_000_000);
        // Both valid; the huge one is capped at 60s from now
        assert!(small.check().is_ok());
        assert!(huge.check().is_ok());
    }
}
