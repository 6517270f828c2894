use crate::network::AuthorityClient;
use log::warn;
use crate::session::{spawn_session_sweeper, SessionManager};
use shared::{Command, PlayerSlot, Response, Snapshot, MATCH_FULL, SESSION_SWEEP_INTERVAL};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("match is full")]
    MatchFull,

    #[error("no session for this token")]
    UnknownSession,

    #[error("authority error: {0}")]
    Authority(String),
}

/// Session-aware entry point a request adapter calls into.
pub struct Worker {
    authority: Arc<AuthorityClient>,
    sessions: Arc<Mutex<SessionManager>>,
}

impl Worker {
    pub fn new(authority: Arc<AuthorityClient>, sessions: Arc<Mutex<SessionManager>>) -> Self {
        Self {
            authority,
            sessions,
        }
    }

    /// Builds a worker with default session expiry and starts its idle sweep.
    pub fn start(authority: Arc<AuthorityClient>) -> (Self, JoinHandle<()>) {
        let sessions = Arc::new(Mutex::new(SessionManager::default()));
        let sweeper = spawn_session_sweeper(
            Arc::clone(&sessions),
            Arc::clone(&authority),
            SESSION_SWEEP_INTERVAL,
        );
        (Self::new(authority, sessions), sweeper)
    }

    pub fn sessions(&self) -> Arc<Mutex<SessionManager>> {
        Arc::clone(&self.sessions)
    }

    /// Claims a slot and opens a session for it.
    pub async fn join(&self) -> Result<(String, PlayerSlot), WorkerError> {
        let response = self.authority.assign_player().await;
        match response.player_id {
            Some(player_id) if response.is_ok() => {
                let token = self.sessions.lock().await.open(player_id);
                Ok((token, player_id))
            }
            _ if response.message.as_deref() == Some(MATCH_FULL) => Err(WorkerError::MatchFull),
            _ => Err(WorkerError::Authority(
                response.message.unwrap_or_else(|| "no player assigned".to_string()),
            )),
        }
    }

    /// Advances timers, then returns the latest snapshot.
    pub async fn state(&self, token: &str) -> Result<Snapshot, WorkerError> {
        self.resolve(token).await?;
        let updated = self.authority.update_game().await;
        if !updated.is_ok() {
            warn!("Timer update failed: {:?}", updated.message);
        }
        let response = self.authority.get_state().await;
        Self::expect_state(response)
    }

    pub async fn act(&self, token: &str, command: Command) -> Result<Snapshot, WorkerError> {
        let player_id = self.resolve(token).await?;
        let response = self.authority.process_command(player_id, command).await;
        Self::expect_state(response)
    }

    pub async fn leave(&self, token: &str) -> Result<Snapshot, WorkerError> {
        let player_id = self
            .sessions
            .lock()
            .await
            .close(token)
            .ok_or(WorkerError::UnknownSession)?;
        let response = self.authority.player_disconnected(player_id).await;
        Self::expect_state(response)
    }

    async fn resolve(&self, token: &str) -> Result<PlayerSlot, WorkerError> {
        self.sessions
            .lock()
            .await
            .touch(token)
            .ok_or(WorkerError::UnknownSession)
    }

    fn expect_state(response: Response) -> Result<Snapshot, WorkerError> {
        match response.state {
            Some(state) if response.is_ok() => Ok(state),
            _ => Err(WorkerError::Authority(
                response.message.unwrap_or_else(|| "missing state".to_string()),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::RetryPolicy;
    use std::time::Duration;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_unknown_token_rejected_without_network() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let authority = Arc::new(AuthorityClient::new(addr.to_string(), RetryPolicy::default()));
        let sessions = Arc::new(Mutex::new(SessionManager::new(Duration::from_secs(5))));
        let worker = Worker::new(authority, sessions);

        assert!(matches!(
            worker.act("missing", Command::Ready).await,
            Err(WorkerError::UnknownSession)
        ));
        assert!(matches!(
            worker.leave("missing").await,
            Err(WorkerError::UnknownSession)
        ));
    }

    #[tokio::test]
    async fn test_state_reports_unreachable_authority() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let policy = RetryPolicy {
            attempts: 1,
            backoff: Duration::from_millis(1),
        };
        let authority = Arc::new(AuthorityClient::new(addr.to_string(), policy));
        let sessions = Arc::new(Mutex::new(SessionManager::new(Duration::from_secs(5))));
        let token = sessions.lock().await.open(PlayerSlot::Player1);
        let worker = Worker::new(authority, sessions);

        assert!(matches!(
            worker.state(&token).await,
            Err(WorkerError::Authority(_))
        ));
    }

    #[tokio::test]
    async fn test_join_surfaces_authority_failure() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let policy = RetryPolicy {
            attempts: 1,
            backoff: Duration::from_millis(1),
        };
        let authority = Arc::new(AuthorityClient::new(addr.to_string(), policy));
        let sessions = Arc::new(Mutex::new(SessionManager::new(Duration::from_secs(5))));
        let worker = Worker::new(authority, Arc::clone(&sessions));

        assert!(matches!(worker.join().await, Err(WorkerError::Authority(_))));
        assert!(sessions.lock().await.is_empty());
    }
}
