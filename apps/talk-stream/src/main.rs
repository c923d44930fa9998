use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use talk_stream::config::{Config, normalize_opt};
use talk_stream::logging::{self, LogConfig, LogLevel};
use talk_stream::{Coordinator, StatusBoard, StatusObserver, StatusUpdate, WebRtcPeerFactory};
use talks_client::{TalkScript, TalksClient};

#[derive(Parser, Debug)]
#[command(name = "talk-stream", about = "Negotiate a streamed talking-avatar session")]
struct Cli {
    #[arg(long, env = "TALK_STREAM_API_URL")]
    api_url: Option<String>,

    #[arg(long, env = "TALK_STREAM_AUTHORIZATION", hide_env_values = true)]
    authorization: Option<String>,

    #[arg(long, env = "TALK_STREAM_SOURCE_URL", help = "Image the avatar is rendered from")]
    source_url: Option<String>,

    #[arg(long, value_name = "TEXT", help = "Text for the avatar to speak once connected")]
    say: Option<String>,

    #[arg(long, help = "Print status changes as JSON lines")]
    json: bool,

    #[arg(long, value_enum, default_value_t = LogLevel::Warn)]
    log_level: LogLevel,

    #[arg(long, help = "Write logs to a file instead of stderr")]
    log_file: Option<PathBuf>,
}

impl Cli {
    fn config(&self) -> Config {
        let mut config = Config::from_env();
        if let Some(api_url) = normalize_opt(self.api_url.clone()) {
            config.api_url = api_url;
        }
        if let Some(authorization) = normalize_opt(self.authorization.clone()) {
            config.authorization = Some(authorization);
        }
        if let Some(source_url) = normalize_opt(self.source_url.clone()) {
            config.source_url = source_url;
        }
        config
    }
}

struct StatusPrinter {
    board: StatusBoard,
    json: bool,
}

impl StatusObserver for StatusPrinter {
    fn on_status(&mut self, update: StatusUpdate) {
        if !self.board.apply(&update) {
            return;
        }
        if let StatusUpdate::RemoteVideo(track) = &update {
            println!("remote video track {} ready", track.id);
        }
        if self.json {
            match serde_json::to_string(&self.board) {
                Ok(line) => println!("{line}"),
                Err(err) => tracing::warn!(error = %err, "failed to encode status"),
            }
        } else {
            println!("{}", self.board.labels());
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let log_config = LogConfig {
        level: cli.log_level,
        file: cli.log_file.clone(),
    };
    if let Err(err) = logging::init(&log_config) {
        eprintln!("failed to initialize logging: {err}");
        std::process::exit(1);
    }

    if let Err(err) = run(cli).await {
        eprintln!("❌ {err:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = cli.config();
    if config.authorization.is_none() {
        tracing::warn!("no authorization configured; the talks api will likely reject requests");
    }
    let api = TalksClient::new(config.client_config()).context("failed to build talks client")?;
    tracing::info!(api_url = %api.base_url(), "using talks api");
    let (coordinator, status) = Coordinator::spawn(
        Arc::new(api),
        Arc::new(WebRtcPeerFactory::new()),
        config.source_url.clone(),
    );
    let printer = status.spawn(StatusPrinter {
        board: StatusBoard::default(),
        json: cli.json,
    });

    let outcome = drive(&coordinator, cli.say).await;
    coordinator
        .destroy_session()
        .await
        .context("failed to tear down session")?;

    drop(coordinator);
    let _ = tokio::time::timeout(Duration::from_secs(2), printer).await;
    outcome
}

async fn drive(coordinator: &Coordinator, say: Option<String>) -> anyhow::Result<()> {
    tokio::select! {
        created = coordinator.create_session() => {
            created.context("failed to negotiate talk stream")?;
        }
        _ = tokio::signal::ctrl_c() => return Ok(()),
    }
    eprintln!("session active; press Ctrl-C to stop");

    if let Some(text) = say {
        coordinator
            .start_session(TalkScript::text(text))
            .await
            .context("failed to start talk")?;
    }

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    Ok(())
}
