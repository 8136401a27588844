//! A terminal chat whose model can call the tools of a remote gateway.

#[macro_use]
extern crate tracing;

use std::io::Write as _;
use std::pin::pin;
use std::sync::Arc;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use tokio::io::{self, AsyncBufReadExt};
use tokio::select;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tool_chat::core::Turn;
use tool_chat::{Config, Session, SessionBuilder};
use tool_chat_gateway::HttpGateway;
use tool_chat_openai_model::OpenAIProvider;

enum SessionEvent {
    Answering,
    Turn(Turn),
}

const BAR_CHAR: &str = "▎";

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("invalid configuration: {err}");
            return;
        }
    };
    debug!("starting with {config:?}");

    let model_provider = OpenAIProvider::new(config.openai);
    let gateway = Arc::new(HttpGateway::new(config.gateway_url));

    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    let mut session = SessionBuilder::with_model_provider(model_provider, gateway)
        .loop_config(config.loop_config)
        .on_turn({
            let event_tx = event_tx.clone();
            move |turn| {
                event_tx.send(SessionEvent::Turn(turn.clone())).ok();
            }
        })
        .on_delta(move |_| {
            event_tx.send(SessionEvent::Answering).ok();
        })
        .build();

    match session.tools().await {
        Ok(tools) => println!(
            "{}",
            format!("Connected, {} tools available.", tools.len()).dimmed()
        ),
        Err(err) => warn!("tool gateway is not reachable yet: {err}"),
    }
    println!("{}", "Commands: /tools, /reset, /exit".dimmed());

    let progress_style = ProgressStyle::with_template("{spinner} {wide_msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏");

    loop {
        print!("> ");
        std::io::stdout().flush().ok();

        let Some(line) = read_line().await else {
            break;
        };
        match line.trim() {
            "" => continue,
            "/exit" => break,
            "/reset" => {
                session.reset();
                println!("{}", "Transcript cleared.".dimmed());
            }
            "/tools" => print_tools(&session).await,
            message => {
                chat(&mut session, message, &mut event_rx, &progress_style)
                    .await;
            }
        }
    }
}

async fn chat(
    session: &mut Session,
    message: &str,
    event_rx: &mut mpsc::UnboundedReceiver<SessionEvent>,
    progress_style: &ProgressStyle,
) {
    let mut send = pin!(session.send_message(message));
    let mut progress_bar: Option<ProgressBar> = None;
    // Turns printed so far. A failed run drops them from the transcript.
    let mut shown = 0;

    let result = loop {
        // Create a new progress bar if it has been finished.
        progress_bar
            .get_or_insert_with(|| {
                let progress_bar = ProgressBar::new_spinner();
                progress_bar.set_style(progress_style.clone());
                progress_bar.set_message("🤔 Thinking...");
                progress_bar
            })
            .inc(1);

        select! {
            result = &mut send => break result.map(|_| ()),
            Some(event) = event_rx.recv() => {
                match event {
                    SessionEvent::Answering => {
                        if let Some(progress_bar) = &progress_bar {
                            progress_bar.set_message("💬 Answering...");
                        }
                    }
                    SessionEvent::Turn(turn) => {
                        // Finish the progress bar before printing anything.
                        if let Some(progress_bar) = progress_bar.take() {
                            progress_bar.finish_and_clear();
                        }
                        print_turn(&turn);
                        shown += 1;
                    }
                }
            }
            _ = sleep(Duration::from_millis(100)) => {}
        }
    };

    if let Some(progress_bar) = progress_bar {
        progress_bar.finish_and_clear();
    }
    while let Ok(event) = event_rx.try_recv() {
        if let SessionEvent::Turn(turn) = event {
            print_turn(&turn);
            shown += 1;
        }
    }
    if let Err(err) = result {
        println!("{}❌ {}", BAR_CHAR.bright_red(), err.bright_red());
        if let Some(note) = discarded_note(shown) {
            println!("{}", note.dimmed());
        }
    }
}

fn discarded_note(shown: usize) -> Option<String> {
    match shown {
        0 => None,
        1 => Some("The turn above was discarded.".to_owned()),
        n => Some(format!("The {n} turns above were discarded.")),
    }
}

fn print_turn(turn: &Turn) {
    match turn {
        Turn::User(_) => {}
        Turn::Assistant(content) => {
            println!("{}🤖 {}", BAR_CHAR.bright_cyan(), content.bright_white());
        }
        Turn::AssistantWithToolRequests { .. } => {
            println!("{}🔧 {}", BAR_CHAR.bright_yellow(), turn.content());
        }
        Turn::ToolResult { name, content, .. } => {
            println!(
                "{}📦 {} {}",
                BAR_CHAR.bright_black(),
                name.bright_black(),
                content.dimmed()
            );
        }
    }
}

async fn print_tools(session: &Session) {
    match session.tools().await {
        Ok(tools) if tools.is_empty() => println!("No tools available."),
        Ok(tools) => {
            for tool in tools {
                println!("{} {}", tool.name.bold(), tool.description.dimmed());
            }
        }
        Err(err) => {
            error!("listing tools failed: {err}");
            println!("{}❌ {}", BAR_CHAR.bright_red(), err.bright_red());
        }
    }
}

async fn read_line() -> Option<String> {
    let mut stdin = io::BufReader::new(io::stdin());
    let mut line = String::new();

    match stdin.read_line(&mut line).await {
        Ok(count) => {
            if count == 0 {
                return None;
            }
            Some(line)
        }
        Err(err) => {
            error!("error reading input: {}", err);
            None
        }
    }
}
