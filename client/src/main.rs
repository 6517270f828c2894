use clap::{Parser, Subcommand};
use client::network::{AuthorityClient, RetryPolicy};
use log::info;
use shared::{Command, LineKind, PlayerSlot, Request, Response};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Game state authority address
    #[arg(short = 's', long, default_value = "127.0.0.1:9000")]
    server: String,

    /// Attempts per request before giving up
    #[arg(long, default_value = "3")]
    retries: u32,

    /// Delay between attempts in milliseconds
    #[arg(long, default_value = "100")]
    backoff_ms: u64,

    #[command(subcommand)]
    action: Action,
}

#[derive(Subcommand, Debug)]
enum Action {
    /// Print the current match snapshot
    State,
    /// Claim a free player slot
    Join,
    /// Run timed transitions once and print the result
    Update,
    /// Release a player slot
    Leave { player: PlayerSlot },
    Ready { player: PlayerSlot },
    Unready { player: PlayerSlot },
    Pause { player: PlayerSlot },
    /// Draw an edge: kind is "row" or "col"
    Move {
        player: PlayerSlot,
        kind: LineKind,
        row: u8,
        col: u8,
    },
}

impl Action {
    fn into_request(self) -> Request {
        let process = |player_id, command| Request::ProcessCommand { player_id, command };
        match self {
            Action::State => Request::GetState,
            Action::Join => Request::AssignPlayer,
            Action::Update => Request::Update,
            Action::Leave { player } => Request::PlayerDisconnected { player_id: player },
            Action::Ready { player } => process(player, Command::Ready),
            Action::Unready { player } => process(player, Command::Unready),
            Action::Pause { player } => process(player, Command::Pause),
            Action::Move {
                player,
                kind,
                row,
                col,
            } => process(player, Command::MakeMove { kind, row, col }),
        }
    }
}

fn print_response(response: &Response) {
    println!("status: {:?}", response.status);
    if let Some(player_id) = response.player_id {
        println!("player_id: {}", player_id);
    }
    if let Some(message) = &response.message {
        println!("message: {}", message);
    }
    if let Some(state) = &response.state {
        println!(
            "game_state: {:?}  turn: {:?}  countdown: {:.1}s",
            state.game_state, state.current_turn, state.countdown
        );
        println!(
            "players: {:?}  ready: {:?}  paused_by: {:?}",
            state.players, state.player_ready, state.paused_by
        );
        println!(
            "lines: {}  boxes: {} (player1 {}, player2 {})  winner: {:?}",
            state.lines.len(),
            state.boxes.len(),
            state.score(PlayerSlot::Player1),
            state.score(PlayerSlot::Player2),
            state.winner
        );
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args = Args::parse();
    let policy = RetryPolicy {
        attempts: args.retries,
        backoff: Duration::from_millis(args.backoff_ms),
    };

    info!("Connecting to: {}", args.server);
    let authority = AuthorityClient::connect(&args.server, policy).await?;

    let response = authority.send_request(&args.action.into_request()).await;
    print_response(&response);

    Ok(())
}
