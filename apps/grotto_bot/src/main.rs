use std::time::Duration;

use anyhow::Context;
use grotto::Client;
use grottoproto::request::{Join, Look, Move, Say};
use grottoproto::{Direction, JsonCodec, Notice};
use rand::seq::SliceRandom;
use tokio::net::TcpStream;
use tracing::{Level, debug, info, warn};

#[derive(Clone, Debug)]
struct Config {
    addr: String,
    bots: u32,
    step_ms: u64,
}

fn usage_and_exit() -> ! {
    eprintln!(
        "grotto_bot\n\n\
USAGE:\n  grotto_bot [--addr HOST:PORT] [--bots N] [--step-ms MS]\n\n\
ENV:\n  GROTTO_ADDR  default 127.0.0.1:4400\n  BOTS         default 2\n  BOT_STEP_MS  default 2000\n"
    );
    std::process::exit(2);
}

fn parse_args() -> Config {
    let mut addr = std::env::var("GROTTO_ADDR").unwrap_or_else(|_| "127.0.0.1:4400".to_string());
    let mut bots: u32 = std::env::var("BOTS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(2)
        .max(1);
    let mut step_ms: u64 = std::env::var("BOT_STEP_MS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(2000)
        .max(10);

    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--addr" => addr = it.next().unwrap_or_else(|| usage_and_exit()),
            "--bots" => {
                bots = it
                    .next()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or_else(|| usage_and_exit())
            }
            "--step-ms" => {
                step_ms = it
                    .next()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or_else(|| usage_and_exit())
            }
            "-h" | "--help" => usage_and_exit(),
            _ => usage_and_exit(),
        }
    }

    Config {
        addr,
        bots: bots.max(1),
        step_ms: step_ms.max(10),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,grotto_bot=info".into()),
        )
        .with_target(false)
        .with_max_level(Level::DEBUG)
        .init();

    let cfg = parse_args();
    info!(addr = %cfg.addr, bots = cfg.bots, step_ms = cfg.step_ms, "bots starting");

    for i in 0..cfg.bots {
        let name = format!("Rover{}", i + 1);
        let addr = cfg.addr.clone();
        let step = Duration::from_millis(cfg.step_ms);
        tokio::spawn(async move {
            loop {
                if let Err(e) = bot_loop(&addr, &name, step).await {
                    warn!(bot = %name, err = %e, "bot loop error; retrying");
                }
                tokio::time::sleep(Duration::from_millis(500)).await;
            }
        });
    }

    tokio::signal::ctrl_c().await?;
    info!("ctrl-c; bots leaving");
    Ok(())
}

async fn bot_loop(addr: &str, name: &str, step: Duration) -> anyhow::Result<()> {
    let mut c: Client<TcpStream, JsonCodec> = Client::connect(addr, JsonCodec)
        .await
        .with_context(|| format!("connect {addr}"))?;
    let me = c.request(Join::new(name).bot()).await?.ident;
    let look = c.request(Look::new(me)).await?;
    let mut exits = look.room.map(|r| r.exits).unwrap_or_default();
    info!(bot = %name, ident = %me, exits = exits.len(), "bot joined");

    let mut tick = tokio::time::interval(step);
    tick.tick().await;
    loop {
        let notice = tokio::select! {
            n = c.next_notice() => Some(n?),
            _ = tick.tick() => None,
        };

        match notice {
            Some(Notice::Joined { name: who }) | Some(Notice::Arrived { name: who, .. })
                if who != name =>
            {
                let hello = format!("hi {who}. i'm {name} (bot), just wandering.");
                c.request(Say::new(me, hello)).await?;
            }
            Some(n) => debug!(bot = %name, notice = ?n, "notice"),
            None => {
                let Some(d) = pick(&exits) else {
                    continue;
                };
                let moved = c.request(Move::new(me, d)).await?;
                exits = moved.room.map(|r| r.exits).unwrap_or_default();
                if let Some(at) = moved.location {
                    debug!(bot = %name, direction = %d, at = %at, "moved");
                }
            }
        }
    }
}

fn pick(exits: &[Direction]) -> Option<Direction> {
    exits.choose(&mut rand::thread_rng()).copied()
}
