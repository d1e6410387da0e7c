//! Idempotent producer validation.
//!
//! Producers tag each append with a `(producer_id, epoch, seq)` triplet.
//! Sequences within an epoch start at 0 and increase by exactly 1; a higher
//! epoch fences an older producer instance and must restart at seq 0. The
//! decision function is pure: the caller commits the accepted state only
//! after the payload itself has been processed and appended, so a failed
//! append never advances producer state.

use crate::types::ProducerState;

/// Decision for one producer-tagged append.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProducerDecision {
    /// Commit the append and advance the producer state.
    Accepted,
    /// Already committed; acknowledge without appending.
    Duplicate { last_seq: u64 },
    /// The producer's epoch is behind the server's.
    StaleEpoch { current_epoch: u64 },
    /// A new epoch must begin at seq 0.
    InvalidEpochSeq,
    /// The sequence skips ahead of the expected next value.
    SequenceGap { expected: u64, received: u64 },
}

/// Validate a producer-tagged append against the recorded state.
pub fn validate(state: Option<&ProducerState>, epoch: u64, seq: u64) -> ProducerDecision {
    let state = match state {
        None => {
            // Unknown producer: the first accepted seq of any epoch is 0.
            if seq == 0 {
                return ProducerDecision::Accepted;
            }
            return ProducerDecision::SequenceGap {
                expected: 0,
                received: seq,
            };
        }
        Some(state) => state,
    };

    if epoch < state.epoch {
        return ProducerDecision::StaleEpoch {
            current_epoch: state.epoch,
        };
    }

    if epoch > state.epoch {
        if seq == 0 {
            return ProducerDecision::Accepted;
        }
        return ProducerDecision::InvalidEpochSeq;
    }

    // Same epoch.
    if seq <= state.last_seq {
        ProducerDecision::Duplicate {
            last_seq: state.last_seq,
        }
    } else if seq == state.last_seq + 1 {
        ProducerDecision::Accepted
    } else {
        ProducerDecision::SequenceGap {
            expected: state.last_seq + 1,
            received: seq,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(epoch: u64, last_seq: u64) -> ProducerState {
        ProducerState {
            epoch,
            last_seq,
            last_updated: 0,
        }
    }

    #[test]
    fn test_unknown_producer_starts_at_zero() {
        assert_eq!(validate(None, 0, 0), ProducerDecision::Accepted);
        assert_eq!(validate(None, 7, 0), ProducerDecision::Accepted);
        assert_eq!(
            validate(None, 0, 3),
            ProducerDecision::SequenceGap {
                expected: 0,
                received: 3
            }
        );
    }

    #[test]
    fn test_stale_epoch() {
        assert_eq!(
            validate(Some(&state(2, 0)), 1, 5),
            ProducerDecision::StaleEpoch { current_epoch: 2 }
        );
    }

    #[test]
    fn test_epoch_bump_restarts_at_zero() {
        assert_eq!(validate(Some(&state(1, 9)), 2, 0), ProducerDecision::Accepted);
        assert_eq!(
            validate(Some(&state(1, 9)), 2, 1),
            ProducerDecision::InvalidEpochSeq
        );
    }

    #[test]
    fn test_same_epoch_progression() {
        let st = state(3, 4);
        assert_eq!(
            validate(Some(&st), 3, 4),
            ProducerDecision::Duplicate { last_seq: 4 }
        );
        assert_eq!(
            validate(Some(&st), 3, 2),
            ProducerDecision::Duplicate { last_seq: 4 }
        );
        assert_eq!(validate(Some(&st), 3, 5), ProducerDecision::Accepted);
        assert_eq!(
            validate(Some(&st), 3, 6),
            ProducerDecision::SequenceGap {
                expected: 5,
                received: 6
            }
        );
    }
}
