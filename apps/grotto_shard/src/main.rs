use std::net::SocketAddr;

use anyhow::Context;
use grotto::{Compass, Game, GameConfig, Server, ServerConfig, World};
use grottoproto::{JsonCodec, KindRegistry};
use tracing::{Level, info, warn};

fn usage_and_exit() -> ! {
    eprintln!(
        "grotto_shard\n\n\
USAGE:\n  grotto_shard [--bind HOST:PORT] [--max-connections N] [--max-accept-errors N]\n               [--queue-depth N] [--compass 4|8] [--world cave|spaceport]\n\n\
ENV:\n  GROTTO_BIND                 default 127.0.0.1:4400\n  GROTTO_MAX_CONNECTIONS      default 100\n  GROTTO_MAX_ACCEPT_ERRORS    default 100\n  GROTTO_QUEUE_DEPTH          default 10\n  GROTTO_COMPASS              default 4 (spaceport needs 8)\n  GROTTO_WORLD                default cave\n  GROTTO_NPCS                 comma-separated bot characters, default Warden\n"
    );
    std::process::exit(2);
}

#[derive(Clone, Copy, Debug)]
enum WorldKind {
    Cave,
    Spaceport,
}

impl WorldKind {
    fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cave" => Some(WorldKind::Cave),
            "spaceport" => Some(WorldKind::Spaceport),
            _ => None,
        }
    }

    fn build(self, compass: Compass) -> anyhow::Result<World> {
        let w = match self {
            WorldKind::Cave => World::cave(compass),
            WorldKind::Spaceport => World::spaceport(compass),
        };
        w.with_context(|| format!("build {self:?} world on a {compass} compass"))
    }
}

#[derive(Clone, Debug)]
struct Config {
    bind: SocketAddr,
    max_connections: usize,
    max_accept_errors: u32,
    queue_depth: usize,
    compass: Compass,
    world: WorldKind,
    npcs: Vec<String>,
}

fn env_num<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_args() -> Config {
    let mut bind: SocketAddr = std::env::var("GROTTO_BIND")
        .unwrap_or_else(|_| "127.0.0.1:4400".to_string())
        .parse()
        .unwrap_or_else(|_| usage_and_exit());
    let mut max_connections: usize = env_num::<usize>("GROTTO_MAX_CONNECTIONS", 100).max(1);
    let mut max_accept_errors: u32 = env_num::<u32>("GROTTO_MAX_ACCEPT_ERRORS", 100);
    let mut queue_depth: usize = env_num::<usize>("GROTTO_QUEUE_DEPTH", 10).max(1);
    let mut compass = std::env::var("GROTTO_COMPASS")
        .ok()
        .map(|v| Compass::parse(&v).unwrap_or_else(|| usage_and_exit()))
        .unwrap_or(Compass::Four);
    let mut world = std::env::var("GROTTO_WORLD")
        .ok()
        .map(|v| WorldKind::parse(&v).unwrap_or_else(|| usage_and_exit()))
        .unwrap_or(WorldKind::Cave);
    let npcs: Vec<String> = std::env::var("GROTTO_NPCS")
        .unwrap_or_else(|_| "Warden".to_string())
        .split(',')
        .map(|x| x.trim().to_string())
        .filter(|x| !x.is_empty())
        .collect();

    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        let mut value = || it.next().unwrap_or_else(|| usage_and_exit());
        match arg.as_str() {
            "--bind" => bind = value().parse().unwrap_or_else(|_| usage_and_exit()),
            "--max-connections" => {
                max_connections = value().parse().unwrap_or_else(|_| usage_and_exit())
            }
            "--max-accept-errors" => {
                max_accept_errors = value().parse().unwrap_or_else(|_| usage_and_exit())
            }
            "--queue-depth" => queue_depth = value().parse().unwrap_or_else(|_| usage_and_exit()),
            "--compass" => compass = Compass::parse(&value()).unwrap_or_else(|| usage_and_exit()),
            "--world" => world = WorldKind::parse(&value()).unwrap_or_else(|| usage_and_exit()),
            "-h" | "--help" => usage_and_exit(),
            _ => usage_and_exit(),
        }
    }

    Config {
        bind,
        max_connections: max_connections.max(1),
        max_accept_errors,
        queue_depth: queue_depth.max(1),
        compass,
        world,
        npcs,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,grotto_shard=info,grotto=info".into()),
        )
        .with_target(false)
        .with_max_level(Level::DEBUG)
        .init();

    let cfg = parse_args();
    let world = cfg.world.build(cfg.compass)?;
    info!(
        world = ?cfg.world,
        compass = %cfg.compass,
        npcs = cfg.npcs.len(),
        "world built"
    );

    let (game, handle) = Game::new(
        world,
        &GameConfig {
            queue_depth: cfg.queue_depth,
            npcs: cfg.npcs.clone(),
        },
    );
    let actor = game.spawn();

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("ctrl-c; shutting down"),
            Err(e) => warn!(err = %e, "ctrl-c handler failed; shutting down"),
        }
        let _ = shutdown_tx.send(true);
    });

    let server = Server::new(
        ServerConfig {
            bind: cfg.bind,
            max_connections: cfg.max_connections,
            max_accept_errors: cfg.max_accept_errors,
            ..ServerConfig::default()
        },
        JsonCodec,
        KindRegistry::client(),
    );
    let served = server.run_tcp(handle.clone(), shutdown_rx).await;

    if let Err(e) = handle.stop().await {
        warn!(err = %e, "stop");
    }
    actor.await.context("game actor")?;
    served?;
    Ok(())
}
