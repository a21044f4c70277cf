//! Game-level data models shared by the client and its front ends.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

// --- Play state ---

/// Where the local player currently is in a match.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PlayState {
    #[default]
    Idle,
    Playing,
    Closed,
}

impl std::fmt::Display for PlayState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlayState::Idle => write!(f, "idle"),
            PlayState::Playing => write!(f, "playing"),
            PlayState::Closed => write!(f, "closed"),
        }
    }
}

// --- Board position ---

/// Greedy prefix, one whitespace, then the side-to-move letter.
static FEN_SIDE_TO_MOVE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(.*)\s([b|w])").expect("side-to-move pattern is valid"));

/// A board position as sent by the server, split from its side-to-move token.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BoardPosition {
    /// Everything before the side-to-move token.
    pub fen: String,
    pub white_to_move: bool,
}

impl BoardPosition {
    /// Split a FEN-like string into the position and the side to move.
    ///
    /// Strings without a side-to-move token yield an empty position with
    /// black to move; this never fails.
    pub fn read_fen(data: &str) -> Self {
        match FEN_SIDE_TO_MOVE.captures(data) {
            Some(caps) => Self {
                fen: caps[1].to_string(),
                white_to_move: &caps[2] == "w",
            },
            None => Self::default(),
        }
    }
}

/// Shorthand for [`BoardPosition::read_fen`].
pub fn read_fen(data: &str) -> BoardPosition {
    BoardPosition::read_fen(data)
}

// --- Identifiers ---

/// Whether `input` looks like a short-lived game code rather than a host id.
///
/// Game codes are numbers below 1000. Input that is not a number at all is
/// also treated as a game code.
pub fn determine_is_game_id(input: &str) -> bool {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return true;
    }
    match trimmed.parse::<f64>() {
        // "NaN" parses but is not a number
        Ok(value) if value.is_nan() => true,
        Ok(value) => value < 1000.0,
        Err(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const START: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR";

    #[test]
    fn read_fen_white_to_move() {
        let pos = read_fen(&format!("{START} w"));
        assert_eq!(pos.fen, START);
        assert!(pos.white_to_move);
    }

    #[test]
    fn read_fen_black_to_move() {
        let pos = read_fen(&format!("{START} b"));
        assert_eq!(pos.fen, START);
        assert!(!pos.white_to_move);
    }

    #[test]
    fn read_fen_full_fen_record() {
        let pos = read_fen(&format!("{START} w KQkq - 0 1"));
        assert_eq!(pos.fen, START);
        assert!(pos.white_to_move);
    }

    #[test]
    fn read_fen_without_side_is_empty() {
        assert_eq!(read_fen("garbage"), BoardPosition::default());
        assert_eq!(read_fen(""), BoardPosition::default());
        assert_eq!(read_fen(START), BoardPosition::default());
    }

    #[test]
    fn game_id_threshold() {
        assert!(determine_is_game_id("42"));
        assert!(determine_is_game_id(" 999 "));
        assert!(!determine_is_game_id("1000"));
        assert!(!determine_is_game_id("123456"));
    }

    #[test]
    fn non_numeric_counts_as_game_id() {
        assert!(determine_is_game_id("abc"));
        assert!(determine_is_game_id(""));
        assert!(determine_is_game_id("NaN"));
        assert!(determine_is_game_id("nan"));
    }

    #[test]
    fn play_state_wire_names() {
        assert_eq!(serde_json::to_string(&PlayState::Playing).unwrap(), "\"playing\"");
        assert_eq!(PlayState::default(), PlayState::Idle);
        assert_eq!(PlayState::Closed.to_string(), "closed");
    }
}
