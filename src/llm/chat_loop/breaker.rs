//! Consecutive failure breaker
//!
//! Counts tool failures in a row regardless of which tool failed. Any success
//! resets the count; reaching the threshold ends the conversation.

#[derive(Debug, Clone)]
pub struct ConsecutiveFailureBreaker {
    threshold: usize,
    consecutive: usize,
}

impl ConsecutiveFailureBreaker {
    pub fn new(threshold: usize) -> Self {
        Self {
            threshold: threshold.max(1),
            consecutive: 0,
        }
    }

    pub fn record(&mut self, success: bool) {
        if success {
            self.consecutive = 0;
        } else {
            self.consecutive += 1;
        }
    }

    pub fn consecutive_failures(&self) -> usize {
        self.consecutive
    }

    pub fn is_tripped(&self) -> bool {
        self.consecutive >= self.threshold
    }
}
