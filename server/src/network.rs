//! Authority network layer: worker connections, request dispatch and the tick task

use crate::game::MatchState;
use log::{debug, error, info, warn};
use shared::{read_frame, write_frame, FrameError, Request, Response, MATCH_FULL};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio::time::{interval, MissedTickBehavior};

/// Applies one request to the match. Callers must hold the state lock.
pub fn dispatch(state: &mut MatchState, request: Request, now: Instant) -> Response {
    match request {
        Request::GetState => Response::with_state(state.snapshot(now)),
        Request::AssignPlayer => match state.assign_player() {
            Some(player_id) => Response::assigned(player_id),
            None => Response::error(MATCH_FULL),
        },
        Request::PlayerDisconnected { player_id } => {
            state.player_disconnected(player_id);
            Response::with_state(state.snapshot(now))
        }
        Request::ProcessCommand { player_id, command } => {
            state.apply_command(player_id, &command, now);
            Response::with_state(state.snapshot(now))
        }
        Request::Update => {
            state.update(now);
            Response::with_state(state.snapshot(now))
        }
    }
}

/// Game-state authority shared by every worker process
pub struct Server {
    listener: TcpListener,
    state: Arc<Mutex<MatchState>>,
    tick_duration: Duration,
}

impl Server {
    pub async fn new(addr: &str, tick_duration: Duration) -> Result<Self, Box<dyn std::error::Error>> {
        let listener = TcpListener::bind(addr).await?;
        info!("Game state authority listening on {}", listener.local_addr()?);

        Ok(Server {
            listener,
            state: Arc::new(Mutex::new(MatchState::new())),
            tick_duration,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Handle to the match, for inspection alongside the running server.
    pub fn state(&self) -> Arc<Mutex<MatchState>> {
        Arc::clone(&self.state)
    }

    /// Spawns the task that advances timers regardless of request traffic
    fn spawn_ticker(&self) {
        let state = Arc::clone(&self.state);
        let tick_duration = self.tick_duration;

        tokio::spawn(async move {
            let mut ticker = interval(tick_duration);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            info!("Update loop started ({:?} interval)", tick_duration);

            loop {
                ticker.tick().await;
                state.lock().await.update(Instant::now());
            }
        });
    }

    /// Serves one worker until it disconnects or the stream breaks
    async fn handle_connection(state: Arc<Mutex<MatchState>>, mut stream: TcpStream, addr: SocketAddr) {
        loop {
            let response = match read_frame::<Request, _>(&mut stream).await {
                Ok(Some(request)) => {
                    let action = request.action();
                    let response = {
                        let mut state = state.lock().await;
                        dispatch(&mut state, request, Instant::now())
                    };
                    debug!("{} {} -> {:?}", addr, action, response.status);
                    response
                }
                Ok(None) => break,
                Err(e) if !e.is_fatal() => {
                    warn!("Malformed request from {}: {}", addr, e);
                    Response::error(e.to_string())
                }
                Err(FrameError::TooLarge(len)) => {
                    warn!("Dropping {}: oversized frame of {} bytes", addr, len);
                    let _ = write_frame(&mut stream, &Response::error("frame too large")).await;
                    break;
                }
                Err(e) => {
                    error!("Client error {}: {}", addr, e);
                    break;
                }
            };

            if let Err(e) = write_frame(&mut stream, &response).await {
                error!("Failed to reply to {}: {}", addr, e);
                break;
            }
        }

        info!("Worker {} disconnected", addr);
    }

    /// Accepts worker connections forever, one task per connection
    pub async fn run(&self) -> Result<(), Box<dyn std::error::Error>> {
        self.spawn_ticker();

        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    info!("Worker connected from {}", addr);
                    let state = Arc::clone(&self.state);
                    tokio::spawn(Self::handle_connection(state, stream, addr));
                }
                Err(e) => {
                    error!("Accept error: {}", e);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{Command, LineKind, Phase, PlayerSlot, Status, COUNTDOWN};
    use tokio::io::AsyncWriteExt;

    async fn start_server(tick: Duration) -> (SocketAddr, Arc<Mutex<MatchState>>) {
        let server = Server::new("127.0.0.1:0", tick).await.unwrap();
        let addr = server.local_addr().unwrap();
        let state = server.state();
        tokio::spawn(async move {
            let _ = server.run().await;
        });
        (addr, state)
    }

    async fn call(stream: &mut TcpStream, request: &Request) -> Response {
        write_frame(stream, request).await.unwrap();
        read_frame(stream).await.unwrap().unwrap()
    }

    #[test]
    fn test_dispatch_assign_and_full() {
        let mut state = MatchState::new();
        let now = Instant::now();

        let first = dispatch(&mut state, Request::AssignPlayer, now);
        let second = dispatch(&mut state, Request::AssignPlayer, now);
        let third = dispatch(&mut state, Request::AssignPlayer, now);

        assert_eq!(first.player_id, Some(PlayerSlot::Player1));
        assert_eq!(second.player_id, Some(PlayerSlot::Player2));
        assert_eq!(third.status, Status::Error);
        assert_eq!(third.message.as_deref(), Some(MATCH_FULL));
        assert_eq!(state.players.len(), 2);
    }

    #[test]
    fn test_dispatch_get_state_does_not_mutate() {
        let mut state = MatchState::new();
        let now = Instant::now();
        dispatch(&mut state, Request::AssignPlayer, now);

        let a = dispatch(&mut state, Request::GetState, now);
        let b = dispatch(&mut state, Request::GetState, now);

        assert_eq!(a, b);
        assert_eq!(a.state.unwrap().player_count, 1);
    }

    #[test]
    fn test_dispatch_update_advances_countdown() {
        let mut state = MatchState::new();
        let now = Instant::now();
        dispatch(&mut state, Request::AssignPlayer, now);
        dispatch(&mut state, Request::AssignPlayer, now);
        for player_id in [PlayerSlot::Player1, PlayerSlot::Player2] {
            dispatch(
                &mut state,
                Request::ProcessCommand {
                    player_id,
                    command: Command::Ready,
                },
                now,
            );
        }

        let starting = dispatch(&mut state, Request::Update, now).state.unwrap();
        assert_eq!(starting.game_state, Phase::Starting);

        let playing = dispatch(&mut state, Request::Update, now + COUNTDOWN)
            .state
            .unwrap();
        assert_eq!(playing.game_state, Phase::Playing);
        assert!(playing.current_turn.is_some());
    }

    #[test]
    fn test_dispatch_disconnect_returns_snapshot() {
        let mut state = MatchState::new();
        let now = Instant::now();
        dispatch(&mut state, Request::AssignPlayer, now);

        let response = dispatch(
            &mut state,
            Request::PlayerDisconnected {
                player_id: PlayerSlot::Player1,
            },
            now,
        );

        assert!(response.is_ok());
        assert_eq!(response.state.unwrap().player_count, 0);
    }

    #[tokio::test]
    async fn test_connection_serves_many_requests() {
        let (addr, _) = start_server(Duration::from_millis(100)).await;
        let mut stream = TcpStream::connect(addr).await.unwrap();

        let assigned = call(&mut stream, &Request::AssignPlayer).await;
        assert_eq!(assigned.player_id, Some(PlayerSlot::Player1));

        let state = call(&mut stream, &Request::GetState).await;
        assert_eq!(state.state.unwrap().players, vec![PlayerSlot::Player1]);
    }

    #[tokio::test]
    async fn test_malformed_request_keeps_connection_open() {
        let (addr, _) = start_server(Duration::from_millis(100)).await;
        let mut stream = TcpStream::connect(addr).await.unwrap();

        let mut garbage = 4u32.to_be_bytes().to_vec();
        garbage.extend_from_slice(&200u32.to_le_bytes());
        stream.write_all(&garbage).await.unwrap();

        let error: Response = read_frame(&mut stream).await.unwrap().unwrap();
        assert_eq!(error.status, Status::Error);
        assert!(error.message.is_some());

        let ok = call(&mut stream, &Request::GetState).await;
        assert!(ok.is_ok());
    }

    #[tokio::test]
    async fn test_ticker_advances_without_requests() {
        let (addr, state) = start_server(Duration::from_millis(10)).await;
        let mut stream = TcpStream::connect(addr).await.unwrap();

        call(&mut stream, &Request::AssignPlayer).await;
        call(&mut stream, &Request::AssignPlayer).await;
        for player_id in [PlayerSlot::Player1, PlayerSlot::Player2] {
            let command = Command::Ready;
            call(&mut stream, &Request::ProcessCommand { player_id, command }).await;
        }

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(state.lock().await.phase, Phase::Starting);

        // Moves are rejected until the countdown runs out.
        let mover = state.lock().await.current_turn.unwrap();
        let response = call(
            &mut stream,
            &Request::ProcessCommand {
                player_id: mover,
                command: Command::MakeMove {
                    kind: LineKind::Row,
                    row: 0,
                    col: 0,
                },
            },
        )
        .await;
        assert!(response.state.unwrap().lines.is_empty());
    }
}
