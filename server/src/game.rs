//! Authoritative Dots and Boxes match state.
//!
//! Pure game logic: board geometry, move legality, box claiming and the
//! lifecycle state machine. Nothing here performs I/O; the caller supplies the
//! current time so timed transitions stay deterministic.

use log::info;
use rand::Rng;
use shared::{
    total_boxes, BoxCell, Command, Line, LineKind, Outcome, Phase, PlayerSlot, Snapshot,
    BOARD_SIZE, COUNTDOWN, FINISH_DELAY,
};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct MatchState {
    pub phase: Phase,
    pub lines: Vec<Line>,
    pub boxes: Vec<BoxCell>,
    pub current_turn: Option<PlayerSlot>,
    /// Start of the STARTING/RESUMING countdown, or the finish time once FINISHED.
    pub countdown_anchor: Option<Instant>,
    pub paused_by: Option<PlayerSlot>,
    pub winner: Option<Outcome>,
    /// Occupied slots and their readiness.
    pub players: BTreeMap<PlayerSlot, bool>,
}

impl Default for MatchState {
    fn default() -> Self {
        Self::new()
    }
}

impl MatchState {
    pub fn new() -> Self {
        Self {
            phase: Phase::Lobby,
            lines: Vec::new(),
            boxes: Vec::new(),
            current_turn: None,
            countdown_anchor: None,
            paused_by: None,
            winner: None,
            players: BTreeMap::new(),
        }
    }

    /// Returns the match to the lobby. Occupancy survives, readiness does not.
    pub fn reset(&mut self) {
        self.phase = Phase::Lobby;
        self.lines.clear();
        self.boxes.clear();
        self.current_turn = None;
        self.countdown_anchor = None;
        self.paused_by = None;
        self.winner = None;
        for ready in self.players.values_mut() {
            *ready = false;
        }
        info!("Match reset to lobby");
    }

    pub fn snapshot(&self, now: Instant) -> Snapshot {
        let window = match self.phase {
            Phase::Starting | Phase::Resuming => Some(COUNTDOWN),
            Phase::Finished => Some(FINISH_DELAY),
            _ => None,
        };
        let countdown = match (window, self.countdown_anchor) {
            (Some(window), Some(anchor)) => {
                window.saturating_sub(now.saturating_duration_since(anchor)).as_secs_f32()
            }
            _ => 0.0,
        };

        Snapshot {
            board_size: BOARD_SIZE,
            lines: self.lines.clone(),
            boxes: self.boxes.clone(),
            current_turn: self.current_turn,
            players: self.players.keys().copied().collect(),
            winner: self.winner,
            player_count: self.players.len(),
            game_state: self.phase,
            player_ready: self.players.clone(),
            countdown,
            paused_by: self.paused_by,
        }
    }

    /// Seats a new player in the first free slot, or returns `None` when full.
    pub fn assign_player(&mut self) -> Option<PlayerSlot> {
        let slot = [PlayerSlot::Player1, PlayerSlot::Player2]
            .into_iter()
            .find(|slot| !self.players.contains_key(slot))?;

        self.players.insert(slot, false);
        info!("Assigned {}", slot);
        Some(slot)
    }

    pub fn player_disconnected(&mut self, slot: PlayerSlot) {
        if self.players.remove(&slot).is_none() {
            return;
        }
        info!("Player {} disconnected", slot);

        if self.phase != Phase::Lobby {
            info!("Player left mid-match, abandoning it");
            self.reset();
        }
    }

    pub fn apply_command(&mut self, slot: PlayerSlot, command: &Command, now: Instant) {
        match *command {
            Command::MakeMove { kind, row, col } => self.make_move(slot, kind, row, col, now),
            Command::Ready => self.set_ready(slot, true, now),
            Command::Unready => self.set_ready(slot, false, now),
            Command::Pause => self.pause(slot),
        }
    }

    /// Draws an edge. Illegal moves are ignored without touching state.
    pub fn make_move(&mut self, slot: PlayerSlot, kind: LineKind, row: u8, col: u8, now: Instant) {
        if self.phase != Phase::Playing || self.current_turn != Some(slot) {
            return;
        }
        if !edge_on_board(kind, row, col) || self.has_line(kind, (row, col)) {
            return;
        }

        self.lines.push(Line {
            kind,
            position: (row, col),
            owner: slot,
        });

        // Extra-turn rule: completing a box keeps the turn.
        if self.claim_boxes(slot) == 0 {
            self.current_turn = Some(slot.other());
        }

        if self.boxes.len() == total_boxes() {
            self.finish(now);
        }
    }

    fn set_ready(&mut self, slot: PlayerSlot, ready: bool, now: Instant) {
        // While paused only the pauser may change readiness.
        if self.phase == Phase::Paused && self.paused_by != Some(slot) {
            return;
        }
        let Some(flag) = self.players.get_mut(&slot) else {
            return;
        };
        *flag = ready;

        match (self.phase, ready) {
            (Phase::Paused, true) => {
                self.phase = Phase::Resuming;
                self.countdown_anchor = Some(now);
                info!("{} is back, resuming", slot);
            }
            (Phase::Starting | Phase::Resuming, false) => {
                self.phase = if self.paused_by.is_some() {
                    Phase::Paused
                } else {
                    Phase::Lobby
                };
                self.countdown_anchor = None;
                info!("Countdown cancelled by {}", slot);
            }
            _ => {}
        }
    }

    fn pause(&mut self, slot: PlayerSlot) {
        match self.phase {
            Phase::Playing => {
                self.phase = Phase::Paused;
                self.paused_by = Some(slot);
                if let Some(flag) = self.players.get_mut(&slot) {
                    *flag = false;
                }
                info!("Match paused by {}", slot);
            }
            Phase::Paused if self.paused_by != Some(slot) => {
                info!("Both players left the paused match");
                self.reset();
            }
            _ => {}
        }
    }

    /// Advances time-driven transitions.
    pub fn update(&mut self, now: Instant) {
        if self.phase == Phase::Lobby
            && self.players.len() == 2
            && self.players.values().all(|ready| *ready)
        {
            self.phase = Phase::Starting;
            self.current_turn = Some(if rand::thread_rng().gen_bool(0.5) {
                PlayerSlot::Player1
            } else {
                PlayerSlot::Player2
            });
            self.winner = None;
            self.countdown_anchor = Some(now);
            info!("Both players ready, starting countdown");
        }

        match self.phase {
            Phase::Starting if self.elapsed(now, COUNTDOWN) => {
                self.phase = Phase::Playing;
                self.countdown_anchor = None;
                info!("Match started, {:?} moves first", self.current_turn);
            }
            Phase::Resuming if self.elapsed(now, COUNTDOWN) => {
                self.phase = Phase::Playing;
                self.paused_by = None;
                self.countdown_anchor = None;
                info!("Match resumed");
            }
            Phase::Finished if self.elapsed(now, FINISH_DELAY) => {
                self.reset();
            }
            _ => {}
        }
    }

    pub fn score(&self, slot: PlayerSlot) -> usize {
        self.boxes.iter().filter(|b| b.owner == slot).count()
    }

    fn elapsed(&self, now: Instant, window: Duration) -> bool {
        self.countdown_anchor
            .is_some_and(|anchor| now.saturating_duration_since(anchor) >= window)
    }

    fn finish(&mut self, now: Instant) {
        let p1 = self.score(PlayerSlot::Player1);
        let p2 = self.score(PlayerSlot::Player2);
        let outcome = match p1.cmp(&p2) {
            std::cmp::Ordering::Greater => Outcome::Won(PlayerSlot::Player1),
            std::cmp::Ordering::Less => Outcome::Won(PlayerSlot::Player2),
            std::cmp::Ordering::Equal => Outcome::Tie,
        };

        self.winner = Some(outcome);
        self.phase = Phase::Finished;
        self.countdown_anchor = Some(now);
        info!("Match finished {}-{}: {:?}", p1, p2, outcome);
    }

    fn has_line(&self, kind: LineKind, position: (u8, u8)) -> bool {
        self.lines
            .iter()
            .any(|line| line.kind == kind && line.position == position)
    }

    /// Claims every unowned box whose four edges are now drawn.
    fn claim_boxes(&mut self, slot: PlayerSlot) -> usize {
        let cells = BOARD_SIZE - 1;
        let mut claimed = 0;

        for r in 0..cells {
            for c in 0..cells {
                if self.boxes.iter().any(|b| b.position == (r, c)) {
                    continue;
                }
                let closed = self.has_line(LineKind::Row, (r, c))
                    && self.has_line(LineKind::Row, (r + 1, c))
                    && self.has_line(LineKind::Col, (r, c))
                    && self.has_line(LineKind::Col, (r, c + 1));
                if closed {
                    self.boxes.push(BoxCell {
                        position: (r, c),
                        owner: slot,
                    });
                    claimed += 1;
                }
            }
        }

        claimed
    }
}

fn edge_on_board(kind: LineKind, row: u8, col: u8) -> bool {
    match kind {
        LineKind::Row => row < BOARD_SIZE && col < BOARD_SIZE - 1,
        LineKind::Col => row < BOARD_SIZE - 1 && col < BOARD_SIZE,
    }
}
