use crate::data::GestureResult;
use std::fmt;
use tracing::info;

/// Text shown next to the video for the current classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GestureSummary {
    pub category: String,
    /// Percentage with two decimals, e.g. `92.00%`.
    pub confidence: String,
    pub handedness: String,
}

impl From<&GestureResult> for GestureSummary {
    fn from(result: &GestureResult) -> Self {
        Self {
            category: result.category_name.clone(),
            confidence: format!("{:.2}%", result.confidence * 100.0),
            handedness: result.handedness.label().to_string(),
        }
    }
}

impl fmt::Display for GestureSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.category, self.confidence)
    }
}

/// Receives the classification text every render tick; `None` means blank.
pub trait ResultDisplay {
    fn show(&mut self, summary: Option<&GestureSummary>);
}

/// Logs the classification whenever it changes.
#[derive(Debug, Default)]
pub struct LogDisplay {
    last: Option<GestureSummary>,
}

impl ResultDisplay for LogDisplay {
    fn show(&mut self, summary: Option<&GestureSummary>) {
        if self.last.as_ref() == summary {
            return;
        }
        match summary {
            Some(s) => info!(
                gesture = %s.category,
                confidence = %s.confidence,
                handedness = %s.handedness,
                "gesture"
            ),
            None => info!("no gesture"),
        }
        self.last = summary.cloned();
    }
}
