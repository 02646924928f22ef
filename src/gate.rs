use crate::data::{InferenceOutcome, Recognition};
use crate::error::InferenceError;
use crate::frame::Frame;
use crate::inference::InferenceCapability;
use crate::pipeline::PipelineEvent;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, trace};

/// Identifies one started inference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InferenceTicket {
    pub generation: u64,
    pub frame_timestamp_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateStatus {
    Idle,
    Pending(InferenceTicket),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    Started(InferenceTicket),
    Dropped,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GateStats {
    pub started: u64,
    pub dropped: u64,
    pub failed: u64,
}

/// Runs at most one inference at a time; frames arriving meanwhile are dropped.
pub struct InferenceGate {
    capability: Arc<dyn InferenceCapability>,
    events: UnboundedSender<PipelineEvent>,
    status: GateStatus,
    stats: GateStats,
}

impl InferenceGate {
    pub fn new(
        capability: Arc<dyn InferenceCapability>,
        events: UnboundedSender<PipelineEvent>,
    ) -> Self {
        Self {
            capability,
            events,
            status: GateStatus::Idle,
            stats: GateStats::default(),
        }
    }

    pub fn status(&self) -> GateStatus {
        self.status
    }

    pub fn stats(&self) -> GateStats {
        self.stats
    }

    /// Starts inference on `frame` unless one is already outstanding.
    /// The completion arrives as [`PipelineEvent::InferenceCompleted`].
    pub fn submit(&mut self, frame: Frame, generation: u64) -> Submission {
        if let GateStatus::Pending(pending) = self.status {
            self.stats.dropped += 1;
            trace!(
                timestamp_ms = frame.timestamp_ms,
                pending_ms = pending.frame_timestamp_ms,
                "inference outstanding, dropping frame"
            );
            return Submission::Dropped;
        }
        let ticket = InferenceTicket {
            generation,
            frame_timestamp_ms: frame.timestamp_ms,
        };
        self.status = GateStatus::Pending(ticket);
        self.stats.started += 1;
        let capability = self.capability.clone();
        let events = self.events.clone();
        tokio::spawn(async move {
            let result = capability.infer(&frame, ticket.frame_timestamp_ms).await;
            if events
                .send(PipelineEvent::InferenceCompleted { ticket, result })
                .is_err()
            {
                trace!("pipeline gone, dropping completion");
            }
        });
        Submission::Started(ticket)
    }

    /// Settles `ticket`. The gate stays pending across a restart until the
    /// outstanding call reports back, so a new session cannot start a second
    /// one. Returns `None` when the call failed.
    pub fn complete(
        &mut self,
        ticket: InferenceTicket,
        result: Result<Recognition, InferenceError>,
    ) -> Option<InferenceOutcome> {
        if self.status == GateStatus::Pending(ticket) {
            self.status = GateStatus::Idle;
        } else {
            trace!(?ticket, status = ?self.status, "completion for an unknown ticket");
        }
        match result {
            Ok(recognition) => Some(InferenceOutcome::from_recognition(
                ticket.frame_timestamp_ms,
                recognition,
            )),
            Err(e) => {
                self.stats.failed += 1;
                debug!(timestamp_ms = ticket.frame_timestamp_ms, "inference failed: {e}");
                None
            }
        }
    }
}
