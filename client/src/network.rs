use log::{error, info, warn};
use shared::{read_frame, write_frame, Command, PlayerSlot, Request, Response};
use std::io;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::sleep;

/// How hard the client tries before giving up on a request.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff: Duration::from_millis(100),
        }
    }
}

/// One worker's connection to the game state authority.
///
/// Requests are serialized over a single connection; concurrent callers queue
/// on the internal lock. Any failure drops the connection and the request is
/// resent on a fresh one until the retry budget runs out.
pub struct AuthorityClient {
    server_addr: String,
    policy: RetryPolicy,
    stream: Mutex<Option<TcpStream>>,
}

impl AuthorityClient {
    /// Creates a client that dials lazily on the first request.
    pub fn new(server_addr: impl Into<String>, policy: RetryPolicy) -> Self {
        Self {
            server_addr: server_addr.into(),
            policy,
            stream: Mutex::new(None),
        }
    }

    /// Creates a client and dials immediately, failing if the authority is down.
    pub async fn connect(
        server_addr: impl Into<String>,
        policy: RetryPolicy,
    ) -> Result<Self, io::Error> {
        let client = Self::new(server_addr, policy);
        let stream = TcpStream::connect(&client.server_addr).await?;
        info!("Connected to game state authority at {}", client.server_addr);
        *client.stream.lock().await = Some(stream);
        Ok(client)
    }

    pub fn server_addr(&self) -> &str {
        &self.server_addr
    }

    /// Sends a request, reconnecting and resending on failure.
    ///
    /// Always yields a response; an exhausted retry budget becomes an error
    /// response rather than an `Err`.
    pub async fn send_request(&self, request: &Request) -> Response {
        let mut stream = self.stream.lock().await;

        for attempt in 1..=self.policy.attempts {
            if stream.is_none() {
                match TcpStream::connect(&self.server_addr).await {
                    Ok(fresh) => {
                        info!("Connected to game state authority at {}", self.server_addr);
                        *stream = Some(fresh);
                    }
                    Err(e) => {
                        warn!("Failed to connect (attempt {}): {}", attempt, e);
                        sleep(self.policy.backoff).await;
                        continue;
                    }
                }
            }

            let Some(conn) = stream.as_mut() else {
                continue;
            };
            match Self::exchange(conn, request).await {
                Ok(response) => return response,
                Err(e) => {
                    warn!(
                        "Request {} failed (attempt {}): {}",
                        request.action(),
                        attempt,
                        e
                    );
                    *stream = None;
                    sleep(self.policy.backoff).await;
                }
            }
        }

        error!("Max retries reached for {}", request.action());
        Response::error(format!(
            "authority unreachable after {} attempts",
            self.policy.attempts
        ))
    }

    async fn exchange(
        stream: &mut TcpStream,
        request: &Request,
    ) -> Result<Response, Box<dyn std::error::Error + Send + Sync>> {
        write_frame(stream, request).await?;
        match read_frame(stream).await? {
            Some(response) => Ok(response),
            None => Err("connection closed by authority".into()),
        }
    }

    /// Drops the current connection; the next request redials.
    pub async fn disconnect(&self) {
        self.stream.lock().await.take();
    }

    pub async fn get_state(&self) -> Response {
        self.send_request(&Request::GetState).await
    }

    pub async fn assign_player(&self) -> Response {
        self.send_request(&Request::AssignPlayer).await
    }

    pub async fn player_disconnected(&self, player_id: PlayerSlot) -> Response {
        self.send_request(&Request::PlayerDisconnected { player_id })
            .await
    }

    pub async fn process_command(&self, player_id: PlayerSlot, command: Command) -> Response {
        self.send_request(&Request::ProcessCommand { player_id, command })
            .await
    }

    pub async fn update_game(&self) -> Response {
        self.send_request(&Request::Update).await
    }
}
