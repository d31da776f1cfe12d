use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::Parser;
use client_core::{
    ClientSettings, HttpTeamDirectory, Notice, ScanOutcome, SessionController, SessionEvent,
    SessionState,
};
use scanner_integration::{FrameEvent, LineFeedDecoder};
use shared::domain::Flag;
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::{broadcast, mpsc},
};
use tracing::{debug, warn};

#[derive(Parser, Debug)]
struct Args {
    /// Check-in server base URL. Overrides checkin.toml and the environment.
    #[arg(long)]
    server_url: Option<String>,
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Toggle { row: usize, flag: Flag },
    Save,
    Next,
    Show,
    Help,
    Quit,
}

const HELP: &str = "commands: toggle <row> <check_in|snacks|dinner|check_out>, save, next, show, quit";

/// Recognises operator commands. Anything else is left for the scanner.
fn parse_command(line: &str) -> Option<Command> {
    let mut words = line.split_whitespace();
    let command = match words.next()?.to_ascii_lowercase().as_str() {
        "toggle" | "t" => {
            let row = words.next()?.parse::<usize>().ok().filter(|row| *row > 0)?;
            let flag = Flag::parse(words.next()?)?;
            Command::Toggle { row, flag }
        }
        "save" => Command::Save,
        "next" | "scan" => Command::Next,
        "show" => Command::Show,
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        _ => return None,
    };
    if words.next().is_some() {
        return None;
    }
    Some(command)
}

enum Input {
    Command(Command),
    Unrecognised(String),
}

async fn read_operator_input(decoder: Arc<LineFeedDecoder>, input: mpsc::Sender<Input>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(error) => {
                warn!(%error, "failed to read stdin");
                break;
            }
        };

        let forwarded = match parse_command(&line) {
            Some(command) => Input::Command(command),
            None => match decoder.offer(line).await {
                None => continue,
                Some(line) if line.trim().is_empty() => continue,
                Some(line) => Input::Unrecognised(line),
            },
        };
        if input.send(forwarded).await.is_err() {
            break;
        }
    }
    decoder.close_input().await;
}

async fn print_events(mut events: broadcast::Receiver<SessionEvent>) {
    loop {
        match events.recv().await {
            Ok(SessionEvent::Notice(notice)) => print_notice(&notice),
            Ok(SessionEvent::LoadingIndicator { visible: true }) => println!("Starting scanner..."),
            Ok(SessionEvent::StateChanged(SessionState::Scanning)) => {
                println!("Ready: scan a team badge or paste its payload.")
            }
            Ok(SessionEvent::RosterCleared) => println!("Roster cleared."),
            Ok(event) => debug!(?event, "session event"),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "dropped session events")
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn print_notice(notice: &Notice) {
    if notice.is_success() {
        println!("OK: {}", notice.message());
    } else {
        println!("!! {}", notice.message());
    }
}

enum Step {
    Frame(Option<FrameEvent>),
    Input(Option<Input>),
}

fn report_outcome(controller: &SessionController, outcome: &ScanOutcome) {
    match outcome {
        ScanOutcome::Reviewing(_) => {
            print!("{}", controller.roster());
            println!("Edit with 'toggle', then 'save'. 'next' scans another team.");
        }
        ScanOutcome::TeamNotFound(_) | ScanOutcome::FetchFailed => {
            println!("Type 'next' to scan again.");
        }
        ScanOutcome::ScannerStopped => {
            println!("Scanner stopped. Type 'next' to scan again.");
        }
        ScanOutcome::Stale => {}
    }
}

/// Returns `false` once the operator asked to quit.
async fn run_command(controller: &mut SessionController, command: Command) -> bool {
    match command {
        Command::Toggle { row, flag } => match controller.toggle_row(row - 1, flag) {
            Ok(_) => print!("{}", controller.roster()),
            Err(error) => println!("!! {error}"),
        },
        Command::Save => {
            // The outcome is reported through the notice stream.
            if let Err(error) = controller.save().await {
                debug!(%error, "save did not go through");
            }
        }
        Command::Next => {
            if let Err(error) = controller.scan_next().await {
                debug!(%error, "scanner did not restart");
            }
        }
        Command::Show => {
            if controller.roster().is_visible() {
                print!("{}", controller.roster());
            } else {
                println!("No team under review.");
            }
        }
        Command::Help => println!("{HELP}"),
        Command::Quit => return false,
    }
    true
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("info")
        .with_writer(std::io::stderr)
        .init();
    let args = Args::parse();

    let mut settings = ClientSettings::load(args.config.as_deref());
    if let Some(server_url) = args.server_url {
        settings.server_url = server_url;
    }
    let directory = HttpTeamDirectory::new(&settings.server_url)
        .with_context(|| format!("cannot use server url '{}'", settings.server_url))?;

    let decoder = Arc::new(LineFeedDecoder::new());
    let mut controller =
        SessionController::create(decoder.clone(), Arc::new(directory), settings.scanner.clone());
    tokio::spawn(print_events(controller.subscribe_events()));

    let (input_tx, mut input_rx) = mpsc::channel(16);
    tokio::spawn(read_operator_input(decoder, input_tx));

    println!("{HELP}");
    if let Err(error) = controller.launch().await {
        warn!(%error, "scanner did not start; type 'next' to retry");
    }

    loop {
        let step = if controller.state() == SessionState::Scanning {
            // Only the frame wait races operator input; the fetch that may
            // follow runs to completion below.
            tokio::select! {
                frame = controller.next_frame() => Step::Frame(frame),
                input = input_rx.recv() => Step::Input(input),
            }
        } else {
            Step::Input(input_rx.recv().await)
        };

        match step {
            Step::Frame(frame) => {
                if let Some(outcome) = controller.handle_frame(frame).await {
                    report_outcome(&controller, &outcome);
                }
            }
            Step::Input(Some(Input::Command(command))) => {
                if !run_command(&mut controller, command).await {
                    break;
                }
            }
            Step::Input(Some(Input::Unrecognised(line))) => {
                println!("Unrecognised input '{line}'. {HELP}");
            }
            Step::Input(None) => break,
        }
    }

    controller.dispose().await;
    Ok(())
}
