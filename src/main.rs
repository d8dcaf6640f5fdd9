use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use colored::*;
use std::net::SocketAddr;
use std::path::PathBuf;

use syncwave::sync::remote::connect_peer;
use syncwave::{logging, ServerConfig, SyncEvent, SyncServer};

#[derive(Parser)]
#[command(name = "syncwave")]
#[command(about = "Synchronized listening: share play, pause and seek across every connected player", version)]
#[command(after_help = "Syncwave Endpoints:
- GET /ws               WebSocket for sync events {\"type\",\"time\",\"file\"}
- GET /music?file=NAME  Stream a track from the music directory
- GET /music-list       JSON list of every track name
- GET /stats            Hub counters
- GET /health           Liveness probe")]
struct Cli {
    /// Log debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Also write logs to a daily rolling file in this directory
    #[arg(long, global = true, value_name = "DIR")]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the sync server
    Serve {
        /// TOML configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// Full bind address (overrides --port)
        #[arg(long)]
        bind: Option<SocketAddr>,

        /// Directory the music endpoints serve from
        #[arg(short, long)]
        music_dir: Option<PathBuf>,

        /// Serve a static web frontend from this directory
        #[arg(long)]
        frontend_dir: Option<PathBuf>,

        /// Do not send events back to the listener that sent them
        #[arg(long)]
        no_echo: bool,
    },

    /// Send one sync event to a server and exit
    Send {
        #[arg(short, long, default_value = "ws://localhost:5000/ws")]
        url: String,

        /// Action tag, e.g. play, pause, seek
        #[arg(short = 't', long = "type")]
        kind: String,

        /// Playback position in seconds
        #[arg(long, default_value_t = 0.0)]
        time: f64,

        /// Track the action applies to
        #[arg(short, long)]
        file: String,
    },

    /// Print every sync event broadcast by a server
    Listen {
        #[arg(short, long, default_value = "ws://localhost:5000/ws")]
        url: String,
    },
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _log_guard = logging::init(cli.verbose, cli.log_dir.as_deref())?;

    let command = match cli.command {
        Some(cmd) => cmd,
        None => Commands::Serve {
            config: None,
            port: None,
            bind: None,
            music_dir: None,
            frontend_dir: None,
            no_echo: false,
        },
    };

    match command {
        Commands::Serve {
            config,
            port,
            bind,
            music_dir,
            frontend_dir,
            no_echo,
        } => {
            let mut config = match config {
                Some(path) => ServerConfig::load(&path)?,
                None => ServerConfig::default(),
            };
            if let Some(port) = port {
                config = config.port(port);
            }
            if let Some(addr) = bind {
                config = config.bind(addr);
            }
            if let Some(dir) = music_dir {
                config = config.music_dir(dir);
            }
            if let Some(dir) = frontend_dir {
                config = config.frontend_dir(dir);
            }
            if no_echo {
                config.hub.echo_to_sender = false;
            }

            if !config.music_dir.is_dir() {
                eprintln!(
                    "{} Music directory {} does not exist; listing will fail until it does",
                    "!".yellow(),
                    config.music_dir.display().to_string().bright_white()
                );
            }

            let server = SyncServer::bind(config).await?;
            println!(
                "{} Server is running at {}",
                "✓".green(),
                format!("http://{}", server.local_addr()?).bright_blue()
            );

            server
                .run_until(async {
                    let _ = tokio::signal::ctrl_c().await;
                })
                .await?;
        }

        Commands::Send {
            url,
            kind,
            time,
            file,
        } => {
            let event = SyncEvent::new(kind, time, file);
            let mut peer = connect_peer(&url).await?;
            peer.send(&event).await?;
            peer.close().await?;
            println!("{} Sent {}", "→".bright_blue(), event.to_string().bright_yellow());
        }

        Commands::Listen { url } => {
            let mut peer = connect_peer(&url).await?;
            println!(
                "{} Listening on {}",
                "↔".bright_blue(),
                peer.url().as_str().bright_white()
            );

            while let Some(event) = peer.next_event().await {
                match event {
                    Ok(event) => println!(
                        "{} {:<6} {:>9.3}s  {}",
                        "♪".bright_cyan(),
                        event.kind.bright_yellow(),
                        event.position,
                        event.file.bright_white()
                    ),
                    Err(e) => bail!("connection lost: {e}"),
                }
            }
            println!("{}", "Connection closed".bright_black());
        }
    }

    Ok(())
}
