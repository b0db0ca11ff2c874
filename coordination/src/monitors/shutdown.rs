//! Shutdown vote counting.
//!
//! Each entity thread votes once per monitor it used when it finishes. The
//! vote that brings the count to the number of participants completes the
//! count; later votes are rejected as an invariant violation.

use std::sync::Mutex;

use tracing::debug;

use super::lock_monitor;
use crate::error::{KernelError, KernelResult};

const MONITOR: &str = "shutdown";

pub struct ShutdownVotes {
    required: usize,
    votes: Mutex<usize>,
}

impl ShutdownVotes {
    pub fn new(required: usize) -> Self {
        Self {
            required,
            votes: Mutex::new(0),
        }
    }

    /// Register one vote. Returns `true` for the vote that completes the count.
    pub fn vote(&self) -> KernelResult<bool> {
        let mut votes = lock_monitor(&self.votes, MONITOR)?;
        if *votes >= self.required {
            return Err(KernelError::invariant(
                MONITOR,
                format!("vote beyond the {} expected participants", self.required),
            ));
        }
        *votes += 1;
        debug!(votes = *votes, required = self.required, "Shutdown vote");
        Ok(*votes == self.required)
    }

    pub fn votes(&self) -> KernelResult<usize> {
        Ok(*lock_monitor(&self.votes, MONITOR)?)
    }

    pub fn is_complete(&self) -> KernelResult<bool> {
        Ok(self.votes()? == self.required)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_last_vote_completes() {
        let votes = ShutdownVotes::new(3);
        assert!(!votes.vote().unwrap());
        assert!(!votes.vote().unwrap());
        assert!(votes.vote().unwrap());
        assert!(votes.is_complete().unwrap());
        assert!(votes.vote().is_err());
    }

    #[test]
    fn test_concurrent_votes_complete_exactly_once() {
        let votes = Arc::new(ShutdownVotes::new(13));
        let handles: Vec<_> = (0..13)
            .map(|_| {
                let votes = Arc::clone(&votes);
                std::thread::spawn(move || votes.vote().unwrap())
            })
            .collect();

        let completions = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|done| *done)
            .count();

        assert_eq!(completions, 1);
        assert_eq!(votes.votes().unwrap(), 13);
    }
}
