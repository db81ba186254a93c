//! Accept loop and per-connection handlers.
//!
//! Each connection gets one handler task plus a writer task fed by a bounded
//! channel. Handlers only talk to the game through a [`GameHandle`].

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use grottoproto::envelope::{KIND_ERROR, KIND_NOTICE};
use grottoproto::frame::DEFAULT_MAX_FRAME_LEN;
use grottoproto::request::Leave;
use grottoproto::{
    CharacterId, Codec, Envelope, EnvelopeReader, EnvelopeWriter, ErrorCode, ErrorReply,
    KindRegistry, Notice, NoticeSink, Request,
};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Semaphore, mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::error::GameError;
use crate::game::GameHandle;

const OUTBOUND_DEPTH: usize = 64;
const NOTICE_DEPTH: usize = 64;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    pub max_connections: usize,
    /// Consecutive accept failures tolerated before the loop gives up.
    pub max_accept_errors: u32,
    pub accept_backoff: Duration,
    pub max_accept_backoff: Duration,
    pub max_frame_len: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 4400)),
            max_connections: 100,
            max_accept_errors: 100,
            accept_backoff: Duration::from_millis(20),
            max_accept_backoff: Duration::from_secs(5),
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("accept failed more than {max} times in a row: {source}")]
    TooManyAcceptErrors {
        max: u32,
        #[source]
        source: io::Error,
    },
}

/// Source of incoming connections.
pub trait Acceptor: Send {
    type Conn: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    fn accept(&mut self) -> impl Future<Output = io::Result<(Self::Conn, SocketAddr)>> + Send;
}

impl Acceptor for TcpListener {
    type Conn = TcpStream;

    fn accept(&mut self) -> impl Future<Output = io::Result<(TcpStream, SocketAddr)>> + Send {
        TcpListener::accept(self)
    }
}

/// `base * 2^(failures-1)`, capped at `max`.
pub fn backoff_delay(base: Duration, max: Duration, failures: u32) -> Duration {
    let shift = failures.saturating_sub(1).min(20);
    base.saturating_mul(1u32 << shift).min(max)
}

async fn wait_for_shutdown(mut rx: watch::Receiver<bool>) {
    loop {
        if *rx.borrow() {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}

pub struct Server<C> {
    cfg: ServerConfig,
    codec: C,
    kinds: Arc<KindRegistry>,
}

impl<C: Codec> Server<C> {
    pub fn new(cfg: ServerConfig, codec: C, kinds: KindRegistry) -> Self {
        Self {
            cfg,
            codec,
            kinds: Arc::new(kinds),
        }
    }

    pub async fn bind(&self) -> Result<TcpListener, ServerError> {
        TcpListener::bind(self.cfg.bind)
            .await
            .map_err(|source| ServerError::Bind {
                addr: self.cfg.bind,
                source,
            })
    }

    /// Accept until `shutdown` turns true (`Ok`) or too many accepts fail in a row.
    pub async fn run<A: Acceptor>(
        &self,
        mut acceptor: A,
        game: GameHandle,
        shutdown: watch::Receiver<bool>,
    ) -> Result<(), ServerError> {
        let permits = Arc::new(Semaphore::new(self.cfg.max_connections.max(1)));
        let mut failures: u32 = 0;

        loop {
            let permit = tokio::select! {
                _ = wait_for_shutdown(shutdown.clone()) => break,
                p = permits.clone().acquire_owned() => match p {
                    Ok(p) => p,
                    Err(_) => break,
                },
            };

            let accepted = tokio::select! {
                _ = wait_for_shutdown(shutdown.clone()) => break,
                r = acceptor.accept() => r,
            };

            match accepted {
                Ok((conn, peer)) => {
                    failures = 0;
                    info!(peer = %peer, "client connected");
                    let conn_game = game.clone();
                    let codec = self.codec.clone();
                    let kinds = self.kinds.clone();
                    let max_frame_len = self.cfg.max_frame_len;
                    tokio::spawn(async move {
                        let _permit = permit;
                        match handle_conn(conn, peer, conn_game, codec, kinds, max_frame_len).await
                        {
                            Ok(()) => info!(peer = %peer, "client disconnected"),
                            Err(e) => warn!(peer = %peer, err = %e, "connection ended with error"),
                        }
                    });
                }
                Err(e) => {
                    drop(permit);
                    failures += 1;
                    if failures > self.cfg.max_accept_errors {
                        error!(err = %e, failures, "too many accept failures; giving up");
                        return Err(ServerError::TooManyAcceptErrors {
                            max: self.cfg.max_accept_errors,
                            source: e,
                        });
                    }
                    let delay = backoff_delay(
                        self.cfg.accept_backoff,
                        self.cfg.max_accept_backoff,
                        failures,
                    );
                    warn!(
                        err = %e,
                        failures,
                        delay_ms = delay.as_millis() as u64,
                        "accept failed; backing off"
                    );
                    tokio::select! {
                        _ = wait_for_shutdown(shutdown.clone()) => break,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }

        info!("accept loop stopped");
        Ok(())
    }

    /// Bind the configured address and [`Server::run`] on it.
    pub async fn run_tcp(
        &self,
        game: GameHandle,
        shutdown: watch::Receiver<bool>,
    ) -> Result<(), ServerError> {
        let listener = self.bind().await?;
        info!(bind = %self.cfg.bind, "grotto shard listening");
        self.run(listener, game, shutdown).await
    }
}

/// Per-connection state shared by the read loop and the request path.
struct Session<C> {
    peer: SocketAddr,
    game: GameHandle,
    codec: C,
    kinds: Arc<KindRegistry>,
    ident: CharacterId,
    notices: NoticeSink,
}

impl<C: Codec> Session<C> {
    async fn dispatch(&mut self, env: Envelope) -> Envelope {
        let Some(kind) = self.kinds.lookup(&env.kind) else {
            let err = GameError::UnknownRequest(env.kind.clone());
            warn!(peer = %self.peer, kind = %env.kind, "unregistered request kind");
            return self.error_reply(env.kind, err.code(), err.to_string());
        };
        let mut request = match kind.decode(&self.codec, &env.body) {
            Ok(r) => r,
            Err(e) => {
                debug!(peer = %self.peer, kind = %kind, err = %e, "bad request body");
                return self.error_reply(env.kind, ErrorCode::BadRequest, e.to_string());
            }
        };

        // Clients can only ever act as the character this connection joined.
        request.set_ident(self.ident);
        if let Request::Join(join) = &mut request {
            join.sink = Some(self.notices.clone());
        }

        let mut task = self.game.submit(request).await;
        let result = task.wait().await;
        let populated = task.into_inner();
        match (result, populated) {
            (Ok(()), Some(request)) => {
                match &request {
                    Request::Join(j) => {
                        // The old character goes only once the new one exists.
                        if !self.ident.is_unset() {
                            self.release().await;
                        }
                        self.ident = j.ident;
                    }
                    Request::Leave(_) => self.ident = CharacterId::UNSET,
                    _ => {}
                }
                match request.encode_body(&self.codec) {
                    Ok(body) => Envelope::new(env.kind, body),
                    Err(e) => {
                        warn!(peer = %self.peer, kind = %kind, err = %e, "encode reply");
                        self.error_reply(
                            env.kind,
                            ErrorCode::Internal,
                            format!("request applied but reply could not be encoded: {e}"),
                        )
                    }
                }
            }
            (Ok(()), None) => {
                let err = GameError::Stopped;
                self.error_reply(env.kind, err.code(), err.to_string())
            }
            (Err(e), _) => self.error_reply(env.kind, e.code(), e.to_string()),
        }
    }

    fn error_reply(&self, kind: String, code: ErrorCode, message: String) -> Envelope {
        let reply = ErrorReply {
            kind,
            code,
            message,
        };
        let body = match self.codec.encode(&reply) {
            Ok(body) => body,
            Err(e) => {
                warn!(peer = %self.peer, code = %code, err = %e, "encode error reply");
                Default::default()
            }
        };
        Envelope::new(KIND_ERROR, body)
    }

    fn notice(&self, n: &Notice) -> anyhow::Result<Envelope> {
        Ok(Envelope::new(KIND_NOTICE, self.codec.encode(n)?))
    }

    /// Leave with whatever character this connection holds.
    ///
    /// With nothing joined this submits the unset identity and the game
    /// answers `NotFound`, which is only logged.
    async fn release(&mut self) {
        let ident = std::mem::take(&mut self.ident);
        match self.game.exec(Leave::new(ident)).await {
            Ok(left) => debug!(peer = %self.peer, ident = %ident, name = %left.name, "released character"),
            Err(e) => debug!(peer = %self.peer, ident = %ident, err = %e, "release"),
        }
    }
}

async fn handle_conn<S, C>(
    stream: S,
    peer: SocketAddr,
    game: GameHandle,
    codec: C,
    kinds: Arc<KindRegistry>,
    max_frame_len: usize,
) -> anyhow::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    C: Codec,
{
    let (rd, wr) = tokio::io::split(stream);
    let mut reader = EnvelopeReader::new(rd).max_frame_len(max_frame_len);

    let (out_tx, mut out_rx) = mpsc::channel::<Envelope>(OUTBOUND_DEPTH);
    let writer = tokio::spawn(async move {
        let mut w = EnvelopeWriter::new(wr);
        while let Some(env) = out_rx.recv().await {
            w.write_envelope(&env).await?;
        }
        anyhow::Ok(())
    });

    let (notice_tx, mut notice_rx) = mpsc::channel::<Notice>(NOTICE_DEPTH);
    let mut session = Session {
        peer,
        game,
        codec,
        kinds,
        ident: CharacterId::UNSET,
        notices: notice_tx,
    };

    let res = serve(&mut reader, &mut session, &mut notice_rx, &out_tx).await;

    session.release().await;
    drop(out_tx);
    match writer.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) if res.is_ok() => return Err(e.context("write envelope")),
        Ok(Err(e)) => debug!(peer = %peer, err = %e, "writer failed after read error"),
        Err(e) => warn!(peer = %peer, err = %e, "writer task panicked"),
    }
    res
}

async fn serve<R, C>(
    reader: &mut EnvelopeReader<R>,
    session: &mut Session<C>,
    notice_rx: &mut mpsc::Receiver<Notice>,
    out_tx: &mpsc::Sender<Envelope>,
) -> anyhow::Result<()>
where
    R: AsyncRead + Unpin,
    C: Codec,
{
    loop {
        tokio::select! {
            env = reader.read_envelope() => {
                let Some(env) = env.context("read envelope")? else {
                    return Ok(());
                };
                let reply = session.dispatch(env).await;
                out_tx.send(reply).await.context("writer closed")?;
            }
            Some(n) = notice_rx.recv() => {
                let env = session.notice(&n)?;
                out_tx.send(env).await.context("writer closed")?;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::game::{Game, GameConfig};
    use crate::world::{Compass, World};
    use grottoproto::request::{Join, Look, Move, Say};
    use grottoproto::{Direction, JsonCodec, Location};
    use tokio::io::DuplexStream;

    fn game() -> GameHandle {
        let (g, h) = Game::new(World::cave(Compass::Four).unwrap(), &GameConfig::default());
        g.spawn();
        h
    }

    struct Broken {
        calls: Arc<AtomicU32>,
    }

    impl Acceptor for Broken {
        type Conn = DuplexStream;

        async fn accept(&mut self) -> io::Result<(DuplexStream, SocketAddr)> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(io::Error::other("listener is broken"))
        }
    }

    /// Hands out queued in-memory connections, then never returns.
    struct Queued {
        conns: VecDeque<DuplexStream>,
    }

    impl Acceptor for Queued {
        type Conn = DuplexStream;

        async fn accept(&mut self) -> io::Result<(DuplexStream, SocketAddr)> {
            match self.conns.pop_front() {
                Some(c) => Ok((c, SocketAddr::from(([10, 0, 0, 1], 5000)))),
                None => std::future::pending().await,
            }
        }
    }

    fn server(cfg: ServerConfig) -> Server<JsonCodec> {
        Server::new(cfg, JsonCodec, KindRegistry::client())
    }

    #[test]
    fn backoff_doubles_then_caps() {
        let base = Duration::from_millis(20);
        let max = Duration::from_millis(100);
        let got = (1..=5)
            .map(|n| backoff_delay(base, max, n).as_millis())
            .collect::<Vec<_>>();
        assert_eq!(got, vec![20, 40, 80, 100, 100]);
        assert_eq!(backoff_delay(base, Duration::MAX, 200), base * (1 << 20));
    }

    #[tokio::test(start_paused = true)]
    async fn broken_acceptor_trips_the_breaker() {
        let calls = Arc::new(AtomicU32::new(0));
        let cfg = ServerConfig {
            max_accept_errors: 3,
            ..ServerConfig::default()
        };
        let (_tx, rx) = watch::channel(false);
        let start = tokio::time::Instant::now();

        let err = server(cfg)
            .run(Broken { calls: calls.clone() }, game(), rx)
            .await
            .unwrap_err();

        assert!(matches!(err, ServerError::TooManyAcceptErrors { max: 3, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        // 20 + 40 + 80 ms of backoff between the four attempts.
        assert!(start.elapsed() >= Duration::from_millis(140));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_interrupts_backoff() {
        let calls = Arc::new(AtomicU32::new(0));
        let cfg = ServerConfig {
            accept_backoff: Duration::from_secs(60),
            max_accept_backoff: Duration::from_secs(60),
            ..ServerConfig::default()
        };
        let (tx, rx) = watch::channel(false);
        let srv = server(cfg);
        let run = srv.run(Broken { calls: calls.clone() }, game(), rx);
        let stop = async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            tx.send(true).unwrap();
        };
        let (res, ()) = tokio::join!(run, stop);
        res.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    struct Peer {
        r: EnvelopeReader<tokio::io::ReadHalf<DuplexStream>>,
        w: EnvelopeWriter<tokio::io::WriteHalf<DuplexStream>>,
    }

    impl Peer {
        fn new(s: DuplexStream) -> Self {
            let (r, w) = tokio::io::split(s);
            Self {
                r: EnvelopeReader::new(r),
                w: EnvelopeWriter::new(w),
            }
        }

        async fn send(&mut self, kind: &str, body: &str) {
            let env = Envelope::new(kind.to_string(), body.as_bytes().to_vec());
            self.w.write_envelope(&env).await.unwrap();
        }

        /// Next non-notice envelope.
        async fn reply(&mut self) -> Envelope {
            loop {
                let env = self.r.read_envelope().await.unwrap().unwrap();
                if !env.is_notice() {
                    return env;
                }
            }
        }
    }

    fn spawn_conn(game: GameHandle) -> Peer {
        let (ours, theirs) = tokio::io::duplex(4096);
        let peer = SocketAddr::from(([10, 0, 0, 2], 6000));
        tokio::spawn(handle_conn(
            theirs,
            peer,
            game,
            JsonCodec,
            Arc::new(KindRegistry::client()),
            DEFAULT_MAX_FRAME_LEN,
        ));
        Peer::new(ours)
    }

    #[tokio::test]
    async fn unknown_kind_gets_an_error_and_the_connection_survives() {
        let h = game();
        let mut p = spawn_conn(h.clone());

        p.send("stop", "{}").await;
        let env = p.reply().await;
        assert!(env.is_error());
        let err: ErrorReply = serde_json::from_slice(&env.body).unwrap();
        assert_eq!(err.code, ErrorCode::UnknownRequest);
        assert_eq!(err.kind, "stop");

        p.send("move", "not json").await;
        let err: ErrorReply = serde_json::from_slice(&p.reply().await.body).unwrap();
        assert_eq!(err.code, ErrorCode::BadRequest);

        p.send("join", r#"{"name":"Ann"}"#).await;
        let env = p.reply().await;
        assert_eq!(env.kind, "join");
        let j: Join = serde_json::from_slice(&env.body).unwrap();
        assert_eq!(j.location, Some(Location::new("a1", "01")));
        assert!(!h.is_closed());
    }

    #[tokio::test]
    async fn requests_act_as_the_joined_character() {
        let h = game();
        let mut ann = spawn_conn(h.clone());
        ann.send("join", r#"{"name":"Ann"}"#).await;
        let ann_id = serde_json::from_slice::<Join>(&ann.reply().await.body)
            .unwrap()
            .ident;

        let bob = h.exec(Join::new("Bob")).await.unwrap().ident;

        // Claims to be Bob; moves Ann.
        ann.send("move", &format!(r#"{{"ident":{},"direction":"n"}}"#, bob.0))
            .await;
        let m: Move = serde_json::from_slice(&ann.reply().await.body).unwrap();
        assert_eq!(m.ident, ann_id);
        assert_eq!(m.location, Some(Location::new("a1", "02")));

        let look = h.exec(Look::new(bob)).await.unwrap();
        assert_eq!(look.room.unwrap().id, "01");
    }

    #[tokio::test]
    async fn notices_are_forwarded_between_requests() {
        let h = game();
        let mut ann = spawn_conn(h.clone());
        ann.send("join", r#"{"name":"Ann"}"#).await;
        ann.reply().await;

        let bob = h.exec(Join::new("Bob")).await.unwrap().ident;
        h.exec(Say::new(bob, "hi ann")).await.unwrap();

        let mut seen = Vec::new();
        while seen.len() < 2 {
            let env = ann.r.read_envelope().await.unwrap().unwrap();
            assert!(env.is_notice());
            seen.push(serde_json::from_slice::<Notice>(&env.body).unwrap());
        }
        assert_eq!(
            seen,
            vec![
                Notice::Joined {
                    name: "Bob".to_string()
                },
                Notice::Said {
                    from: "Bob".to_string(),
                    text: "hi ann".to_string()
                },
            ]
        );
    }

    #[tokio::test]
    async fn second_join_releases_the_first_character() {
        let h = game();
        let mut p = spawn_conn(h.clone());
        p.send("join", r#"{"name":"Ann"}"#).await;
        let first = serde_json::from_slice::<Join>(&p.reply().await.body)
            .unwrap()
            .ident;
        p.send("join", r#"{"name":"Annie"}"#).await;
        let second = serde_json::from_slice::<Join>(&p.reply().await.body)
            .unwrap()
            .ident;

        assert_ne!(first, second);
        assert!(h.exec(Look::new(first)).await.is_err());
        assert!(h.exec(Look::new(second)).await.is_ok());
    }

    #[tokio::test]
    async fn failed_second_join_keeps_the_first_character() {
        let h = game();
        let mut p = spawn_conn(h.clone());
        p.send("join", r#"{"name":"Ann"}"#).await;
        let first = serde_json::from_slice::<Join>(&p.reply().await.body)
            .unwrap()
            .ident;

        p.send("join", r#"{"name":"   "}"#).await;
        let env = p.reply().await;
        assert!(env.is_error());
        let err: ErrorReply = serde_json::from_slice(&env.body).unwrap();
        assert_eq!(err.code, ErrorCode::InvalidArgument);

        assert!(h.exec(Look::new(first)).await.is_ok());
        p.send("look", "{}").await;
        let env = p.reply().await;
        assert_eq!(env.kind, "look");
        let look: Look = serde_json::from_slice(&env.body).unwrap();
        assert_eq!(look.ident, first);
    }

    #[tokio::test]
    async fn move_accepts_long_direction_names() {
        let h = game();
        let mut p = spawn_conn(h);
        p.send("join", r#"{"name":"Ann"}"#).await;
        p.reply().await;

        p.send("move", r#"{"direction":"North"}"#).await;
        let env = p.reply().await;
        assert_eq!(env.kind, "move");
        let moved: Move = serde_json::from_slice(&env.body).unwrap();
        assert_eq!(moved.direction, Direction::N);
        assert_eq!(moved.location, Some(Location::new("a1", "02")));
    }

    /// JSON, except that `Join` replies cannot be encoded.
    #[derive(Clone)]
    struct NoJoinReplies;

    impl Codec for NoJoinReplies {
        fn encode<T: serde::Serialize + ?Sized>(
            &self,
            v: &T,
        ) -> Result<bytes::Bytes, grottoproto::CodecError> {
            if std::any::type_name::<T>().ends_with("::Join") {
                return Err(grottoproto::CodecError::Other("join replies disabled".into()));
            }
            JsonCodec.encode(v)
        }

        fn decode<T: serde::de::DeserializeOwned>(
            &self,
            body: &[u8],
        ) -> Result<T, grottoproto::CodecError> {
            JsonCodec.decode(body)
        }
    }

    #[tokio::test]
    async fn unencodable_reply_is_internal_not_bad_request() {
        let h = game();
        let (ours, theirs) = tokio::io::duplex(4096);
        tokio::spawn(handle_conn(
            theirs,
            SocketAddr::from(([10, 0, 0, 3], 6000)),
            h.clone(),
            NoJoinReplies,
            Arc::new(KindRegistry::client()),
            DEFAULT_MAX_FRAME_LEN,
        ));
        let mut p = Peer::new(ours);

        p.send("join", r#"{"name":"Ann"}"#).await;
        let env = p.reply().await;
        assert!(env.is_error());
        let err: ErrorReply = serde_json::from_slice(&env.body).unwrap();
        assert_eq!(err.code, ErrorCode::Internal);
        assert_eq!(err.kind, "join");

        // The join itself went through.
        assert!(h.exec(Look::new(CharacterId(1))).await.is_ok());
    }

    #[tokio::test]
    async fn disconnect_leaves_the_game() {
        let h = game();
        let watcher = h.exec(Join::new("Watcher")).await.unwrap().ident;

        let (ours, theirs) = tokio::io::duplex(4096);
        let srv = server(ServerConfig::default());
        let (tx, rx) = watch::channel(false);
        let acceptor = Queued {
            conns: VecDeque::from([theirs]),
        };
        let run = {
            let h = h.clone();
            tokio::spawn(async move { srv.run(acceptor, h, rx).await })
        };

        let mut p = Peer::new(ours);
        p.send("join", r#"{"name":"Ann"}"#).await;
        p.reply().await;
        assert_eq!(h.exec(Look::new(watcher)).await.unwrap().characters, vec!["Ann"]);

        drop(p);
        let mut left = false;
        for _ in 0..100 {
            if h.exec(Look::new(watcher)).await.unwrap().characters.is_empty() {
                left = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(left, "character still present after disconnect");

        tx.send(true).unwrap();
        run.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn move_before_join_is_not_found() {
        let h = game();
        let mut p = spawn_conn(h);
        p.send("move", r#"{"direction":"n"}"#).await;
        let err: ErrorReply = serde_json::from_slice(&p.reply().await.body).unwrap();
        assert_eq!(err.code, ErrorCode::NotFound);
        assert_eq!(err.kind, "move");
    }
}
