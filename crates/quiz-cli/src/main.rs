//! Terminal frontend for the elimination quiz client.
//!
//! Thin by design: one [`SessionController`] owned by this loop, events
//! pumped with `recv()`, timers driven by a periodic tick, commands read
//! from stdin. Intended for manual testing against a live server.
//!
//! Commands while running: `start` (room creator only), `1`..`9` to
//! answer the current question, `leave`, `quit`.

use std::time::{Duration, Instant};

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use quiz_client::controller::{SessionConfig, SessionController, SessionUpdate};
use quiz_core::answer::AnswerTrigger;
use quiz_core::protocol::{validate_entry_fee, validate_player_name, validate_room_id};
use quiz_core::session::{Phase, SessionState, StateChanged};

#[derive(Parser)]
#[command(name = "quiz")]
#[command(about = "Join or create an elimination quiz room", long_about = None)]
struct Cli {
    /// WebSocket server URL (falls back to $QUIZ_SERVER_URL)
    #[arg(short, long)]
    server: Option<String>,

    /// Player name (2-20 characters)
    #[arg(short, long)]
    name: String,

    /// Room ID to join; omit to create a new room
    #[arg(short, long)]
    room: Option<String>,

    /// Entry fee when creating a room
    #[arg(long, default_value_t = 1.0)]
    entry_fee: f64,

    /// Player cap when creating a room
    #[arg(long, default_value_t = 8)]
    max_players: u32,
}

#[tokio::main]
async fn main() {
    // Initialise tracing (respects RUST_LOG env var).
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    validate_player_name(&cli.name)?;
    if let Some(room) = &cli.room {
        validate_room_id(room)?;
    } else {
        validate_entry_fee(cli.entry_fee)?;
    }

    let config = match &cli.server {
        Some(url) => SessionConfig::new(url),
        None => SessionConfig::from_env()?,
    };
    let server = config.url.clone();
    let mut ctrl = SessionController::connect(config);

    match &cli.room {
        Some(room) => {
            println!("Joining room '{}' on {} as '{}'...", room, server, cli.name);
            ctrl.join_room(&cli.name, room);
        }
        None => {
            println!("Creating a room on {} as '{}'...", server, cli.name);
            ctrl.create_room(&cli.name, cli.entry_fee, cli.max_players);
        }
    }

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut tick = tokio::time::interval(Duration::from_millis(250));

    loop {
        tokio::select! {
            update = ctrl.recv() => {
                match update {
                    SessionUpdate::Updated(changed) => render(ctrl.state(), changed),
                    SessionUpdate::ProtocolError(raw) => {
                        eprintln!("! dropped malformed frame: {}", raw);
                    }
                    SessionUpdate::Empty => {}
                    SessionUpdate::Closed => {
                        println!("Connection closed.");
                        break;
                    }
                }
            }

            _ = tick.tick() => {
                let now = Instant::now();
                let changed = ctrl.tick(now);
                if changed.any() {
                    render(ctrl.state(), changed);
                }
            }

            line = stdin.next_line() => {
                let Ok(Some(line)) = line else { break };
                if !handle_command(&mut ctrl, line.trim()) {
                    break;
                }
            }
        }
    }

    ctrl.close();
    // Let the supervisor deliver its final status event.
    while let SessionUpdate::Updated(_) | SessionUpdate::ProtocolError(_) = ctrl.recv().await {}
    Ok(())
}

/// Returns `false` when the loop should exit.
fn handle_command(ctrl: &mut SessionController, line: &str) -> bool {
    match line {
        "" => {}
        "quit" | "q" => return false,
        "leave" => {
            ctrl.leave_room();
            println!("Left the room.");
        }
        "start" => {
            if ctrl.state().is_creator() {
                ctrl.start_game(None);
            } else {
                println!("Only the room creator can start the game.");
            }
        }
        "reconnect" => ctrl.reconnect(),
        other => match other.parse::<usize>() {
            Ok(n) => answer_by_index(ctrl, n),
            Err(_) => println!("Unknown command '{}'.", other),
        },
    }
    true
}

fn answer_by_index(ctrl: &mut SessionController, n: usize) {
    let Some(option) = ctrl
        .state()
        .question
        .as_ref()
        .and_then(|q| q.options.get(n.wrapping_sub(1)))
        .cloned()
    else {
        println!("No such option.");
        return;
    };
    if ctrl.submit_answer(&option, AnswerTrigger::StableHover) {
        println!("Answered: {}", option);
    } else {
        println!("Already answered this question.");
    }
}

fn render(state: &SessionState, changed: StateChanged) {
    if changed.connection {
        println!("[connection] {:?}", state.connection);
    }
    if changed.error
        && let Some(error) = &state.error
    {
        println!("! {}", error);
    }
    if changed.room
        && let Some(room) = &state.room
    {
        let names: Vec<&str> = room.players.iter().map(|p| p.name.as_str()).collect();
        println!(
            "[room {}] {}/{} players: {} (pool {:.2})",
            room.id,
            room.players.len(),
            room.max_players,
            names.join(", "),
            room.prize_pool,
        );
        if state.is_creator() && state.phase == Phase::Lobby {
            println!("You are the creator. Type 'start' to begin.");
        }
    }
    if changed.phase && state.phase == Phase::Starting {
        println!("Game starting in {}s...", state.countdown);
    }
    if changed.question
        && let Some(q) = &state.question
    {
        println!();
        println!(
            "Q{} ({} alive, {}s): {}",
            q.number, q.alive_players, q.time_limit, q.prompt
        );
        for (i, option) in q.options.iter().enumerate() {
            println!("  {}. {}", i + 1, option);
        }
    }
    if changed.elimination
        && let Some(e) = &state.elimination
    {
        println!(
            "-- {} eliminated on Q{} ({} remain)",
            e.player_name, e.question_number, e.remaining_players
        );
    }
    if changed.phase && state.phase == Phase::Finished {
        match &state.results {
            Some(r) => match &r.winner {
                Some(w) => println!("Game over! Winner: {} (pool {:.2})", w.name, r.prize_pool),
                None => println!("Game over, no winner (pool {:.2}).", r.prize_pool),
            },
            None => println!("Game over."),
        }
    }
}
