//! Value types flowing through the frame pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A normalized hand joint. `x` and `y` are in `[0, 1]` relative to the frame.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Landmark {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub(crate) fn distance(&self, other: &Landmark) -> f32 {
        let (dx, dy, dz) = (self.x - other.x, self.y - other.y, self.z - other.z);
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

/// Landmarks of one detected hand, in joint order.
pub type LandmarkSet = Vec<Landmark>;

/// Number of joints in a hand landmark set.
pub const HAND_LANDMARKS: usize = 21;

/// Joint-index pairs forming the hand skeleton.
pub const HAND_CONNECTIONS: [(usize, usize); 21] = [
    // palm
    (0, 1),
    (0, 5),
    (9, 13),
    (13, 17),
    (5, 9),
    (0, 17),
    // thumb
    (1, 2),
    (2, 3),
    (3, 4),
    // index
    (5, 6),
    (6, 7),
    (7, 8),
    // middle
    (9, 10),
    (10, 11),
    (11, 12),
    // ring
    (13, 14),
    (14, 15),
    (15, 16),
    // pinky
    (17, 18),
    (18, 19),
    (19, 20),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Handedness {
    Left,
    Right,
}

impl Handedness {
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "Left" | "left" => Some(Self::Left),
            "Right" | "right" => Some(Self::Right),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Left => "Left",
            Self::Right => "Right",
        }
    }
}

impl fmt::Display for Handedness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Classification of the first detected hand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GestureResult {
    pub category_name: String,
    /// Score in `[0, 1]`.
    pub confidence: f32,
    pub handedness: Handedness,
}

/// A scored label as reported by the recognizer.
#[derive(Debug, Clone, PartialEq)]
pub struct Category {
    pub name: String,
    pub score: f32,
}

impl Category {
    pub fn new(name: impl Into<String>, score: f32) -> Self {
        Self {
            name: name.into(),
            score,
        }
    }
}

/// Raw output of one inference call: per hand, ranked gestures and
/// handedness plus the landmark set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Recognition {
    pub gestures: Vec<Vec<Category>>,
    pub handedness: Vec<Vec<Category>>,
    pub landmarks: Vec<LandmarkSet>,
}

impl Recognition {
    /// Nothing detected.
    pub fn empty() -> Self {
        Self::default()
    }
}

/// The unit stored in the result buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceOutcome {
    pub frame_timestamp_ms: u64,
    pub result: Option<GestureResult>,
    pub landmarks: Vec<LandmarkSet>,
}

impl InferenceOutcome {
    /// Takes the top gesture and handedness of the first hand.
    pub fn from_recognition(frame_timestamp_ms: u64, recognition: Recognition) -> Self {
        let gesture = recognition.gestures.first().and_then(|g| g.first());
        let hand = recognition.handedness.first().and_then(|h| h.first());
        let result = match (gesture, hand) {
            (Some(gesture), Some(hand)) => {
                Handedness::from_label(&hand.name).map(|handedness| GestureResult {
                    category_name: gesture.name.clone(),
                    confidence: gesture.score.clamp(0.0, 1.0),
                    handedness,
                })
            }
            _ => None,
        };
        Self {
            frame_timestamp_ms,
            result,
            landmarks: recognition.landmarks,
        }
    }
}
