use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

pub mod frame;

pub use frame::{read_frame, write_frame, FrameError, MAX_FRAME_LEN};

/// Dots per side of the square grid. A board of N dots has (N-1)^2 boxes.
pub const BOARD_SIZE: u8 = 6;
pub const COUNTDOWN: Duration = Duration::from_secs(5);
pub const FINISH_DELAY: Duration = Duration::from_secs(5);
pub const TICK_INTERVAL: Duration = Duration::from_millis(100);
pub const SESSION_EXPIRY: Duration = Duration::from_secs(5);
pub const SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(2);

/// Error message returned when both slots are taken.
pub const MATCH_FULL: &str = "Game is full";

/// Number of boxes on a full board.
pub const fn total_boxes() -> usize {
    let cells = (BOARD_SIZE - 1) as usize;
    cells * cells
}

/// One of the two seats in a match.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PlayerSlot {
    Player1,
    Player2,
}

impl PlayerSlot {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlayerSlot::Player1 => "player1",
            PlayerSlot::Player2 => "player2",
        }
    }

    pub fn number(&self) -> u8 {
        match self {
            PlayerSlot::Player1 => 1,
            PlayerSlot::Player2 => 2,
        }
    }

    pub fn other(&self) -> PlayerSlot {
        match self {
            PlayerSlot::Player1 => PlayerSlot::Player2,
            PlayerSlot::Player2 => PlayerSlot::Player1,
        }
    }
}

impl fmt::Display for PlayerSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlayerSlot {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "player1" | "1" => Ok(PlayerSlot::Player1),
            "player2" | "2" => Ok(PlayerSlot::Player2),
            other => Err(format!("unknown player slot '{}'", other)),
        }
    }
}

/// Orientation of an edge between two adjacent dots.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LineKind {
    /// Horizontal edge from (row, col) to (row, col + 1).
    Row,
    /// Vertical edge from (row, col) to (row + 1, col).
    Col,
}

impl FromStr for LineKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "row" => Ok(LineKind::Row),
            "col" => Ok(LineKind::Col),
            other => Err(format!("unknown line kind '{}'", other)),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Line {
    pub kind: LineKind,
    pub position: (u8, u8),
    pub owner: PlayerSlot,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct BoxCell {
    pub position: (u8, u8),
    pub owner: PlayerSlot,
}

/// Lifecycle phase of the match.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Lobby,
    Starting,
    Playing,
    Paused,
    Resuming,
    Finished,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Tie,
    Won(PlayerSlot),
}

/// A player action routed through `Request::ProcessCommand`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub enum Command {
    MakeMove { kind: LineKind, row: u8, col: u8 },
    Ready,
    Unready,
    Pause,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub enum Request {
    GetState,
    AssignPlayer,
    PlayerDisconnected {
        player_id: PlayerSlot,
    },
    ProcessCommand {
        player_id: PlayerSlot,
        command: Command,
    },
    Update,
}

impl Request {
    /// Verb name used in logs.
    pub fn action(&self) -> &'static str {
        match self {
            Request::GetState => "get_state",
            Request::AssignPlayer => "assign_player",
            Request::PlayerDisconnected { .. } => "player_disconnected",
            Request::ProcessCommand { .. } => "process_command",
            Request::Update => "update",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    Error,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Response {
    pub status: Status,
    pub state: Option<Snapshot>,
    pub player_id: Option<PlayerSlot>,
    pub message: Option<String>,
}

impl Response {
    pub fn with_state(state: Snapshot) -> Self {
        Self {
            status: Status::Ok,
            state: Some(state),
            player_id: None,
            message: None,
        }
    }

    pub fn assigned(player_id: PlayerSlot) -> Self {
        Self {
            status: Status::Ok,
            state: None,
            player_id: Some(player_id),
            message: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: Status::Error,
            state: None,
            player_id: None,
            message: Some(message.into()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == Status::Ok
    }
}

/// Read-only view of the match handed to collaborators.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Snapshot {
    pub board_size: u8,
    pub lines: Vec<Line>,
    pub boxes: Vec<BoxCell>,
    pub current_turn: Option<PlayerSlot>,
    pub players: Vec<PlayerSlot>,
    pub winner: Option<Outcome>,
    pub player_count: usize,
    pub game_state: Phase,
    pub player_ready: BTreeMap<PlayerSlot, bool>,
    /// Seconds left on the active timer, never negative.
    pub countdown: f32,
    pub paused_by: Option<PlayerSlot>,
}

impl Snapshot {
    pub fn score(&self, slot: PlayerSlot) -> usize {
        self.boxes.iter().filter(|b| b.owner == slot).count()
    }
}
