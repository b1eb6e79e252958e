use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use colored::*;
use dialoguer::Confirm;
use peerlink::PeerId;
use peerlink::client::engine::EngineConfig;
use peerlink::client::error::SessionError;
use peerlink::client::{
    ConnectionListener, ConnectionState, PeerSession, ServerConfig, SessionConfig,
    SessionContext, SessionListener, WebRtcEngine,
};
use peerlink::model::{ConnectionConfig, IceServerConfig, PeerStatus};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "peerlink")]
#[command(about = "Peer-to-peer calls over a PeerJS-compatible signaling server")]
struct Cli {
    #[arg(long, env = "PEERLINK_HOST", default_value = "0.peerjs.com", global = true)]
    host: String,

    #[arg(long, env = "PEERLINK_PORT", default_value_t = 443, global = true)]
    port: u16,

    /// Use http/ws instead of https/wss.
    #[arg(long, env = "PEERLINK_INSECURE", global = true)]
    insecure: bool,

    #[arg(long, env = "PEERLINK_KEY", default_value = "peerjs", global = true)]
    key: String,

    /// STUN server for the media engine.
    #[arg(
        long,
        env = "PEERLINK_STUN",
        default_value = "stun:stun.l.google.com:19302",
        global = true
    )]
    stun: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List peers known to the server.
    Peers,

    /// Call a peer and wait until the connection opens or ends.
    Call {
        peer: String,

        #[arg(long)]
        audio_only: bool,

        /// Seconds to wait for the connection to open.
        #[arg(long, default_value_t = 30)]
        wait: u64,
    },

    /// Wait for incoming calls and answer them after confirmation.
    Listen {
        /// Answer without asking.
        #[arg(short, long)]
        yes: bool,
    },
}

/// Prints session events and forwards incoming offers to the main task.
struct CliListener {
    incoming: mpsc::UnboundedSender<PeerId>,
}

#[async_trait]
impl SessionListener for CliListener {
    async fn on_connected(&self, _ctx: &SessionContext, peer_id: &PeerId) {
        println!("{} {}", "🔗 Connected as".green(), peer_id.to_string().bold());
    }

    async fn on_incoming(&self, _ctx: &SessionContext, peer_id: &PeerId) {
        let _ = self.incoming.send(peer_id.clone());
    }

    async fn on_hangup(&self, _ctx: &SessionContext, peer_id: &PeerId) {
        println!("{} {}", "📴 Hung up:".yellow(), peer_id);
    }

    async fn on_disconnected(&self, _ctx: &SessionContext) {
        println!("{}", "Signaling channel closed".red());
    }

    async fn on_error(&self, _ctx: &SessionContext, error: &SessionError) {
        eprintln!("{} {}", "Error:".red().bold(), error);
    }
}

struct CallPrinter;

#[async_trait]
impl ConnectionListener for CallPrinter {
    async fn on_open(&self, peer_id: &PeerId) {
        println!("{} {}", "✅ Connection open with".green().bold(), peer_id);
    }

    async fn on_close(&self, peer_id: &PeerId) {
        println!("{} {}", "Connection closed with".yellow(), peer_id);
    }
}

fn build_session(cli: &Cli) -> Result<(PeerSession, mpsc::UnboundedReceiver<PeerId>)> {
    let server = ServerConfig {
        host: cli.host.clone(),
        port: cli.port,
        secure: !cli.insecure,
        path: "/".to_owned(),
    };
    let config = SessionConfig::new(server, cli.key.clone());

    let engine = WebRtcEngine::new(EngineConfig {
        ice_servers: vec![IceServerConfig::stun(cli.stun.clone())],
    });

    let (incoming, incoming_rx) = mpsc::unbounded_channel();
    let session = PeerSession::new(config, Arc::new(engine), Arc::new(CliListener { incoming }))
        .context("Failed to build HTTP client")?;
    Ok((session, incoming_rx))
}

fn media_config(audio_only: bool) -> ConnectionConfig {
    if audio_only {
        ConnectionConfig::audio_only()
    } else {
        ConnectionConfig::audio_video()
    }
}

async fn run_peers(session: &PeerSession) -> Result<()> {
    let peers = session.list_peers().await.context("Failed to list peers")?;
    if peers.is_empty() {
        println!("{}", "No other peers online".dimmed());
        return Ok(());
    }

    for entry in peers {
        let status = match entry.status {
            PeerStatus::Talking => "talking".green(),
            PeerStatus::Incoming => "incoming".cyan(),
            PeerStatus::Idle => "idle".normal(),
        };
        println!("  {:<32} {}", entry.peer_id.to_string(), status);
    }
    Ok(())
}

async fn run_call(session: &PeerSession, peer: String, audio_only: bool, wait: u64) -> Result<()> {
    println!("{} {}", "📞 Calling".cyan(), peer.bold());
    let handle = session
        .call(peer, media_config(audio_only), Arc::new(CallPrinter))
        .await
        .context("Call rejected")?;

    let settled = tokio::time::timeout(
        Duration::from_secs(wait),
        handle.wait_for(|s| s == ConnectionState::Open || s.is_terminal()),
    )
    .await;

    match settled {
        Ok(ConnectionState::Open) => {
            info!("Call to {} open ({})", handle.peer_id(), handle.connection_id());
            println!("{}", "Press Ctrl-C to hang up".dimmed());
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = handle.wait_for(|s| s.is_terminal()) => {}
            }
            handle.hangup().await;
        }
        Ok(state) => {
            warn!("Call to {} ended in {:?}", handle.peer_id(), state);
            anyhow::bail!("Call ended in state {:?}", state)
        }
        Err(_) => {
            warn!("Call to {} timed out after {}s", handle.peer_id(), wait);
            handle.hangup().await;
            anyhow::bail!("No answer within {}s", wait);
        }
    }
    Ok(())
}

async fn run_listen(
    session: &PeerSession,
    mut incoming: mpsc::UnboundedReceiver<PeerId>,
    yes: bool,
) -> Result<()> {
    println!("{}", "👂 Waiting for calls, Ctrl-C to stop".cyan());

    loop {
        let peer_id = tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            peer = incoming.recv() => match peer {
                Some(p) => p,
                None => break,
            },
        };

        let accept = if yes {
            true
        } else {
            let prompt = format!("Answer call from {}?", peer_id);
            tokio::task::spawn_blocking(move || {
                Confirm::new().with_prompt(prompt).default(true).interact()
            })
            .await
            .context("Prompt task failed")?
            .context("Failed to read answer")?
        };

        if !accept {
            info!("Offer from {} declined", peer_id);
            println!("{} {}", "Ignored call from".dimmed(), peer_id);
            continue;
        }

        match session
            .answer(peer_id.clone(), ConnectionConfig::audio_video(), Arc::new(CallPrinter))
            .await
        {
            Ok(handle) => {
                info!("Answered {} ({})", peer_id, handle.connection_id());
                println!("{} {} ({})", "Answered".green(), peer_id, handle.connection_id());
            }
            Err(e) => {
                warn!("Answer to {} failed: {}", peer_id, e);
                eprintln!("{} {}", "Could not answer:".red(), e);
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let (session, incoming) = build_session(&cli)?;

    let local_id = session
        .connect()
        .await
        .context("Failed to connect to the signaling server")?;
    info!("Connected to {}:{} as {}", cli.host, cli.port, local_id);

    let result = match cli.command {
        Commands::Peers => run_peers(&session).await,
        Commands::Call {
            peer,
            audio_only,
            wait,
        } => run_call(&session, peer, audio_only, wait).await,
        Commands::Listen { yes } => run_listen(&session, incoming, yes).await,
    };

    session.destroy().await;
    result
}
