//! Worker-side session tracking
//!
//! This module maps the opaque tokens handed to players onto the match slot
//! the authority assigned them, including:
//! - Session lifecycle (join, activity, explicit leave)
//! - Idle expiry so abandoned slots are returned to the authority
//!
//! Sessions live only in the worker that created them. The authority learns
//! about a departure through `player_disconnected` once a session is dropped.

use crate::network::AuthorityClient;
use log::{error, info};
use shared::{PlayerSlot, SESSION_EXPIRY};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::time::interval;

/// A player's session on this worker
#[derive(Debug, Clone)]
pub struct Session {
    /// Opaque token the player presents on every request
    pub token: String,
    /// Slot the authority assigned at join time
    pub player_id: PlayerSlot,
    /// Last time the player made any request
    pub last_seen: Instant,
}

impl Session {
    pub fn new(token: String, player_id: PlayerSlot) -> Self {
        Self {
            token,
            player_id,
            last_seen: Instant::now(),
        }
    }

    pub fn is_timed_out(&self, now: Instant, expiry: Duration) -> bool {
        now.saturating_duration_since(self.last_seen) > expiry
    }
}

/// All live sessions on this worker
#[derive(Debug)]
pub struct SessionManager {
    sessions: HashMap<String, Session>,
    expiry: Duration,
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new(SESSION_EXPIRY)
    }
}

impl SessionManager {
    pub fn new(expiry: Duration) -> Self {
        Self {
            sessions: HashMap::new(),
            expiry,
        }
    }

    /// Opens a session for a freshly assigned player and returns its token.
    pub fn open(&mut self, player_id: PlayerSlot) -> String {
        let token = format!("{:032x}", rand::random::<u128>());
        info!("Session opened for {}", player_id);
        self.sessions
            .insert(token.clone(), Session::new(token.clone(), player_id));
        token
    }

    /// Resolves a token to its player and marks the session active.
    pub fn touch(&mut self, token: &str) -> Option<PlayerSlot> {
        let session = self.sessions.get_mut(token)?;
        session.last_seen = Instant::now();
        Some(session.player_id)
    }

    pub fn close(&mut self, token: &str) -> Option<PlayerSlot> {
        let session = self.sessions.remove(token)?;
        info!("Session closed for {}", session.player_id);
        Some(session.player_id)
    }

    /// Removes idle sessions and returns the players they held.
    pub fn check_timeouts(&mut self, now: Instant) -> Vec<PlayerSlot> {
        let expiry = self.expiry;
        let stale: Vec<String> = self
            .sessions
            .values()
            .filter(|session| session.is_timed_out(now, expiry))
            .map(|session| session.token.clone())
            .collect();

        stale
            .iter()
            .filter_map(|token| self.sessions.remove(token))
            .map(|session| {
                info!("Session for {} expired", session.player_id);
                session.player_id
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

/// Spawns a task that expires idle sessions and frees their slots.
pub fn spawn_session_sweeper(
    sessions: Arc<Mutex<SessionManager>>,
    authority: Arc<AuthorityClient>,
    every: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(every);

        loop {
            ticker.tick().await;

            let expired = sessions.lock().await.check_timeouts(Instant::now());
            for player_id in expired {
                let response = authority.player_disconnected(player_id).await;
                if !response.is_ok() {
                    error!("Failed to release {}: {:?}", player_id, response.message);
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_creation() {
        let session = Session::new("abc".to_string(), PlayerSlot::Player1);

        assert_eq!(session.token, "abc");
        assert_eq!(session.player_id, PlayerSlot::Player1);
        assert!(!session.is_timed_out(Instant::now(), Duration::from_secs(1)));
    }

    #[test]
    fn test_session_timeout() {
        let mut session = Session::new("abc".to_string(), PlayerSlot::Player1);
        session.last_seen = Instant::now() - Duration::from_secs(2);

        assert!(session.is_timed_out(Instant::now(), Duration::from_secs(1)));
    }

    #[test]
    fn test_default_expiry() {
        let manager = SessionManager::default();
        assert_eq!(manager.expiry, SESSION_EXPIRY);
        assert!(manager.is_empty());
    }

    #[test]
    fn test_open_issues_unique_tokens() {
        let mut manager = SessionManager::new(Duration::from_secs(5));

        let a = manager.open(PlayerSlot::Player1);
        let b = manager.open(PlayerSlot::Player2);

        assert_ne!(a, b);
        assert_eq!(a.len(), 32);
        assert_eq!(manager.len(), 2);
    }

    #[test]
    fn test_touch_resolves_player() {
        let mut manager = SessionManager::new(Duration::from_secs(5));
        let token = manager.open(PlayerSlot::Player2);

        assert_eq!(manager.touch(&token), Some(PlayerSlot::Player2));
        assert_eq!(manager.touch("unknown"), None);
    }

    #[test]
    fn test_close_removes_session() {
        let mut manager = SessionManager::new(Duration::from_secs(5));
        let token = manager.open(PlayerSlot::Player1);

        assert_eq!(manager.close(&token), Some(PlayerSlot::Player1));
        assert_eq!(manager.close(&token), None);
        assert!(manager.is_empty());
    }

    #[test]
    fn test_check_timeouts_returns_expired_players() {
        let mut manager = SessionManager::new(Duration::from_secs(5));
        let idle = manager.open(PlayerSlot::Player1);
        let active = manager.open(PlayerSlot::Player2);

        let later = Instant::now() + Duration::from_secs(6);
        manager.sessions.get_mut(&active).unwrap().last_seen = later;

        let expired = manager.check_timeouts(later);

        assert_eq!(expired, vec![PlayerSlot::Player1]);
        assert_eq!(manager.touch(&idle), None);
        assert_eq!(manager.len(), 1);
    }
}
