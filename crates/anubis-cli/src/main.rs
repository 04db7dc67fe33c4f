mod app;
mod command;
mod render;

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use anubis_core::ClientConfig;
use anubis_core::notice::Notice;
use anubis_http::HttpService;

use crate::app::{App, Flow};
use crate::command::{Command, HELP};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Logs go to stderr so they never interleave with the chat on stdout.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "anubis=info,anubis_core=info,anubis_http=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = ClientConfig::from_env()?;
    info!("Backend {} (gateway {})", config.api_url, config.gateway_url);

    let service = Arc::new(HttpService::new(&config)?);
    let mut app = App::new(service, config);
    let mut events = app.workspace().events();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("{}", HELP);

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    app.handle(Command::Quit).await;
                    break;
                };
                match Command::parse(&line) {
                    Ok(command) => {
                        if app.handle(command).await == Flow::Quit {
                            break;
                        }
                    }
                    Err(e) => println!("{}", render::notice(&Notice::warning(e.to_string()))),
                }
            }
            update = app.workspace_mut().next_update() => app.on_update(update),
            event = events.recv() => match event {
                Ok(event) => app.on_event(&event),
                Err(RecvError::Lagged(n)) => warn!("UI fell behind, skipped {} events", n),
                Err(RecvError::Closed) => break,
            },
        }
    }

    info!("Bye");
    Ok(())
}
