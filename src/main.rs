//! Command line front end for the guided voice interview.
//!
//! Runs the session controller and drives it from stdin commands. The
//! same controller can be embedded behind other front ends; this binary
//! only does argument parsing, wiring, and the read-eval loop.

use std::sync::Arc;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};

use life_review::api::{ApiClient, Voice};
use life_review::guest;
use life_review::playback::RodioPlayback;
use life_review::session::{Event, SessionController};
use life_review::settings;
use life_review::store::StoreClient;

#[derive(Parser, Debug)]
#[command(name = "life-review", about = "Guided voice interview for capturing life stories")]
struct Args {
    /// Backend API base URL (overrides the saved setting)
    #[arg(long)]
    api_url: Option<String>,

    /// TTS voice: alloy, echo, fable, onyx, nova, shimmer
    #[arg(long)]
    voice: Option<String>,

    /// Disable streaming transcription; every answer uses batch upload
    #[arg(long)]
    no_streaming: bool,

    /// Forget the persisted guest identity and exit
    #[arg(long)]
    clear_guest_id: bool,
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    // reqwest and tungstenite both go through rustls; one process-wide
    // provider keeps them agreeing on the crypto backend
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        log::debug!("Crypto provider already installed");
    }

    let args = Args::parse();

    if args.clear_guest_id {
        guest::clear_guest_id();
        return;
    }

    let mut app_settings = settings::load_settings();
    if let Some(url) = args.api_url {
        app_settings.api_base_url = url;
    }
    if let Some(voice) = &args.voice {
        match Voice::parse(voice) {
            Some(v) => app_settings.voice = v,
            None => {
                eprintln!("Unknown voice {:?}; using {}", voice, app_settings.voice.as_str());
            }
        }
    }
    if args.no_streaming {
        app_settings.streaming_enabled = false;
    }

    let api = ApiClient::new(app_settings.api_base_url.clone());
    let store = StoreClient::from_env();
    let guest_id = guest::get_or_create_guest_id();
    let assemblyai_api_key = std::env::var("ASSEMBLYAI_API_KEY").ok();

    if !api.health().await {
        eprintln!(
            "Warning: backend at {} is not responding; analysis and narration may fail.",
            api.base_url()
        );
    }

    let controller = SessionController::new(
        api,
        store,
        Arc::new(RodioPlayback),
        app_settings,
        guest_id,
        assemblyai_api_key,
    );
    controller.init().await;

    let tx = controller.sender();
    let mut run = tokio::spawn(controller.run());

    // End the session cleanly on Ctrl-C so in-flight answers persist
    let interrupt_tx = tx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = interrupt_tx.send(Event::EndSession).await;
        }
    });

    println!("Life Review voice interview");
    print_help();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let summary = loop {
        tokio::select! {
            result = &mut run => {
                break result.ok();
            }
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(l)) => l,
                    _ => {
                        // stdin closed; wind the session down
                        let _ = tx.send(Event::EndSession).await;
                        break run.await.ok();
                    }
                };
                match line.trim() {
                    "" => {}
                    "start" => { let _ = tx.send(Event::StartSession).await; }
                    "record" => { let _ = tx.send(Event::BeginRecording).await; }
                    "stop" => { let _ = tx.send(Event::StopRecording).await; }
                    "followup" => { let _ = tx.send(Event::StartFollowUp).await; }
                    "next" => { let _ = tx.send(Event::NextQuestion).await; }
                    "end" | "quit" => { let _ = tx.send(Event::EndSession).await; }
                    "help" => print_help(),
                    other => println!("Unknown command {:?} (try 'help')", other),
                }
            }
        }
    };

    if let Some(summary) = summary {
        println!();
        println!("Session complete: {} answers recorded.", summary.responses.len());
        if let Some(name) = summary.display_name {
            println!("Thank you, {}.", name);
        }
    }
}

fn print_help() {
    println!("Commands (listening starts by itself after each question):");
    println!("  stop      finish your answer");
    println!("  record    answer again after a retry prompt or follow-up");
    println!("  followup  add more to your last answer");
    println!("  next      move to the next question");
    println!("  start     begin the interview");
    println!("  end       finish the session");
    println!("  help      show this message");
}
