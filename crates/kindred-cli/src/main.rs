mod view;

use std::sync::Arc;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};

use kindred_client::clock::SystemClock;
use kindred_client::protocol::ProtocolHandler;
use kindred_client::{
    ClientConfig, Conversation, HistorySource, HttpHistory, ProfileClient, SessionContext,
    Transport, Update, WebSocketTransport,
};
use kindred_types::models::UserId;

use crate::view::Input;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Logs go to stderr so the transcript owns stdout
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kindred_cli=info,kindred_client=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let counterpart = std::env::args()
        .nth(1)
        .map(UserId::new)
        .context("usage: kindred-cli <counterpartId>")?;

    // Config
    let config = ClientConfig::from_env()?;
    let http = config.http_client()?;
    let protocol = ProtocolHandler::new(Arc::new(SystemClock), config.time_display);
    let transport = WebSocketTransport::new(config.socket_url.clone(), config.credentials.clone())
        .with_retry(config.retry)
        .with_reconnect(config.reconnect);
    let history = HttpHistory::new(http.clone(), config.api_url.clone(), config.credentials.clone())
        .with_retry(config.retry);

    // Identity: the env override, or the profile endpoint resolved in the background
    let viewer = view::viewer_override(|key| std::env::var(key).ok());
    let (viewer_tx, viewer_rx) = mpsc::unbounded_channel();
    if viewer.is_none() {
        let profile = ProfileClient::new(http, config.api_url.clone(), config.credentials.clone());
        tokio::spawn(async move {
            let _ = viewer_tx.send(profile.view().await);
        });
    }

    info!("Opening conversation with {}", counterpart);
    let conversation = Conversation::mount(
        SessionContext::new(viewer, config.credentials.clone()),
        counterpart,
        transport,
        history,
        protocol,
    );
    println!("{}", view::status_line(&conversation.title(), conversation.status_text()));

    run(conversation, viewer_rx).await
}

async fn run<T, H>(
    mut conversation: Conversation<T, H>,
    mut viewer_rx: mpsc::UnboundedReceiver<kindred_client::Result<kindred_types::models::Viewer>>,
) -> anyhow::Result<()>
where
    T: Transport,
    H: HistorySource,
{
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            update = conversation.next_update() => {
                let Some(update) = update else { break };
                render(&conversation, &update);
            }
            Some(resolved) = viewer_rx.recv() => match resolved {
                Ok(viewer) => conversation.set_viewer(viewer),
                Err(e) => {
                    warn!("Could not resolve the signed-in user: {}", e);
                    println!("Not signed in; set KINDRED_SESSION_TOKEN or KINDRED_VIEWER_ID");
                }
            },
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match view::parse_input(&line) {
                    Input::Quit => break,
                    Input::Blank => {}
                    Input::Message(text) => {
                        conversation.compose(text);
                        if !conversation.submit() {
                            println!("(not sent: {})", conversation.status_text());
                        }
                    }
                }
            }
        }
    }

    conversation.unmount();
    Ok(())
}

fn render<T: Transport, H: HistorySource>(conversation: &Conversation<T, H>, update: &Update) {
    match update {
        Update::HistoryLoaded { count } => {
            if *count > 0 {
                println!("-- {} earlier messages --", count);
            }
            for (record, side) in conversation.history_entries() {
                println!("{}", view::format_entry(record, side));
            }
        }
        Update::HistoryFailed { error } => println!("(history unavailable: {})", error),
        Update::Connected | Update::Disconnected { .. } => {
            println!("{}", view::status_line(&conversation.title(), conversation.status_text()));
        }
        Update::Delivered { index } => {
            if let Some((record, side)) = conversation.live_entry(*index) {
                println!("{}", view::format_entry(record, side));
            }
        }
    }
}
