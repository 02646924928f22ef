use crate::data::InferenceOutcome;
use tracing::trace;

/// Why a completed inference was not stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StaleCompletion {
    /// An outcome for the same or a newer frame is already stored.
    Superseded { latest_ms: u64 },
    /// The pipeline was stopped after the inference started.
    Expired { generation: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStatus {
    Accepted,
    Stale(StaleCompletion),
}

/// Single-slot cache of the freshest inference outcome.
#[derive(Debug, Default)]
pub struct ResultBuffer {
    generation: u64,
    latest: Option<InferenceOutcome>,
}

impl ResultBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Liveness token to hand to an inference when it starts.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn write(&mut self, generation: u64, outcome: InferenceOutcome) -> WriteStatus {
        if generation != self.generation {
            trace!(generation, current = self.generation, "discarding expired completion");
            return WriteStatus::Stale(StaleCompletion::Expired { generation });
        }
        if let Some(latest) = &self.latest {
            if outcome.frame_timestamp_ms <= latest.frame_timestamp_ms {
                trace!(
                    timestamp_ms = outcome.frame_timestamp_ms,
                    latest_ms = latest.frame_timestamp_ms,
                    "discarding out-of-order completion"
                );
                return WriteStatus::Stale(StaleCompletion::Superseded {
                    latest_ms: latest.frame_timestamp_ms,
                });
            }
        }
        self.latest = Some(outcome);
        WriteStatus::Accepted
    }

    pub fn read(&self) -> Option<&InferenceOutcome> {
        self.latest.as_ref()
    }

    /// Empties the slot and invalidates every outstanding generation.
    pub fn reset(&mut self) {
        self.latest = None;
        self.generation = self.generation.wrapping_add(1);
    }
}
