//! Rule-based gesture classification over a hand landmark set.
//!
//! Joint layout: wrist 0, thumb 1-4, index 5-8, middle 9-12, ring 13-16,
//! pinky 17-20 (mcp, pip, dip, tip per finger).

use crate::data::{Landmark, HAND_LANDMARKS};

pub const NONE: &str = "None";
pub const CLOSED_FIST: &str = "Closed_Fist";
pub const OPEN_PALM: &str = "Open_Palm";
pub const POINTING_UP: &str = "Pointing_Up";
pub const THUMB_DOWN: &str = "Thumb_Down";
pub const THUMB_UP: &str = "Thumb_Up";
pub const VICTORY: &str = "Victory";
pub const I_LOVE_YOU: &str = "ILoveYou";

const WRIST: usize = 0;
const THUMB_IP: usize = 3;
const THUMB_TIP: usize = 4;
const INDEX_MCP: usize = 5;
/// (pip, tip) per finger: index, middle, ring, pinky.
const FINGERS: [(usize, usize); 4] = [(6, 8), (10, 12), (14, 16), (18, 20)];

/// Which digits are extended, thumb first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FingerState {
    pub thumb: bool,
    pub index: bool,
    pub middle: bool,
    pub ring: bool,
    pub pinky: bool,
}

impl FingerState {
    pub fn from_landmarks(hand: &[Landmark]) -> Option<Self> {
        if hand.len() < HAND_LANDMARKS {
            return None;
        }
        let wrist = &hand[WRIST];
        let extended = |(pip, tip): (usize, usize)| {
            wrist.distance(&hand[tip]) > wrist.distance(&hand[pip]) * 1.1
        };
        let anchor = &hand[INDEX_MCP];
        let thumb = anchor.distance(&hand[THUMB_TIP]) > anchor.distance(&hand[THUMB_IP]) * 1.2;
        Some(Self {
            thumb,
            index: extended(FINGERS[0]),
            middle: extended(FINGERS[1]),
            ring: extended(FINGERS[2]),
            pinky: extended(FINGERS[3]),
        })
    }
}

/// Maps a landmark set to one of the canned gesture names.
pub fn classify(hand: &[Landmark]) -> &'static str {
    let Some(f) = FingerState::from_landmarks(hand) else {
        return NONE;
    };
    match (f.thumb, f.index, f.middle, f.ring, f.pinky) {
        (true, true, true, true, true) => OPEN_PALM,
        (true, true, false, false, true) => I_LOVE_YOU,
        (_, true, true, false, false) => VICTORY,
        (false, true, false, false, false) => POINTING_UP,
        (true, false, false, false, false) => {
            // image y grows downwards
            if hand[THUMB_TIP].y < hand[WRIST].y {
                THUMB_UP
            } else {
                THUMB_DOWN
            }
        }
        (false, false, false, false, false) => CLOSED_FIST,
        _ => NONE,
    }
}
