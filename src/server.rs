//! Server-role session engine.
//!
//! Accepts connections, runs the registration handshake per session (PASS
//! and NICK stored, USER completes registration and triggers the welcome
//! sequence), and dispatches inbound commands to the embedding application's
//! hooks. Live sessions are held in an explicit server-owned registry passed
//! to every session — never in process globals — so application code can
//! look up peers and post to them from any task.

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use futures::SinkExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, RwLock};
use tokio_stream::StreamExt;
use tokio_util::codec::Framed;
use tracing::{info, warn};

use crate::codec::IrcCodec;
use crate::dispatch::{resolved_name, Control};
use crate::message::Message;

/// User and channel mode letters advertised in RPL_MYINFO.
const USER_MODES: &str = "iosw";
const CHANNEL_MODES: &str = "ovbklimnpst";

/// Server identity and bind configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub host: String,
    pub port: u16,
    /// Server name — the prefix of every reply this server originates.
    pub name: String,
    /// Version token for RPL_MYINFO.
    pub version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 6667,
            name: "irc.estuary.local".into(),
            version: concat!("estuary-", env!("CARGO_PKG_VERSION")).into(),
        }
    }
}

/// Handle to one accepted session, usable from outside its connection task.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    /// Current nickname (empty until NICK arrives).
    pub nick: String,
    /// Full `nick!user@host`, set once registration completes.
    pub prefix: Option<String>,
    out: mpsc::UnboundedSender<Control>,
}

impl SessionHandle {
    /// Build a message and queue it for this session's socket.
    pub fn post(&self, prefix: Option<&str>, command: &str, params: &[&str]) {
        self.send(Message::new(prefix, command, params));
    }

    pub fn send(&self, msg: Message) {
        let _ = self.out.send(Control::Send(msg));
    }

    /// Close this session's connection from the outside.
    pub fn close(&self) {
        let _ = self.out.send(Control::Close);
    }
}

/// Registry of live sessions. Mutated on accept, registration, and
/// disconnect; every access is serialized through the inner lock.
#[derive(Debug, Clone, Default)]
pub struct Sessions {
    inner: Arc<RwLock<HashMap<u64, SessionHandle>>>,
}

impl Sessions {
    /// Find a session by its current nick.
    pub async fn find(&self, nick: &str) -> Option<SessionHandle> {
        self.inner
            .read()
            .await
            .values()
            .find(|s| s.nick == nick)
            .cloned()
    }

    /// Snapshot of every live session.
    pub async fn list(&self) -> Vec<SessionHandle> {
        self.inner.read().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    async fn insert(&self, id: u64, handle: SessionHandle) {
        self.inner.write().await.insert(id, handle);
    }

    async fn update(&self, id: u64, nick: &str, prefix: Option<&str>) {
        if let Some(handle) = self.inner.write().await.get_mut(&id) {
            handle.nick = nick.to_owned();
            handle.prefix = prefix.map(str::to_owned);
        }
    }

    async fn remove(&self, id: u64) {
        self.inner.write().await.remove(&id);
    }
}

/// Per-connection session state visible to event handlers.
pub struct ServerCtx {
    config: Arc<ServerConfig>,
    id: u64,
    peer: SocketAddr,
    nick: String,
    user: String,
    real: String,
    pass: Option<String>,
    /// Host half of the prefix — the peer address.
    host: String,
    prefix: Option<String>,
    registered: bool,
    out: mpsc::UnboundedSender<Control>,
    sessions: Sessions,
}

impl ServerCtx {
    /// Build a message and queue it for the socket.
    pub fn post(&self, prefix: Option<&str>, command: &str, params: &[&str]) {
        self.send(Message::new(prefix, command, params));
    }

    pub fn send(&self, msg: Message) {
        let _ = self.out.send(Control::Send(msg));
    }

    /// Post a message originated by this server (its name as the prefix).
    pub fn reply(&self, command: &str, params: &[&str]) {
        self.send(Message::new(Some(&self.config.name), command, params));
    }

    pub fn nick(&self) -> &str {
        &self.nick
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn real(&self) -> &str {
        &self.real
    }

    pub fn pass(&self) -> Option<&str> {
        self.pass.as_deref()
    }

    /// The session's `nick!user@host`, once registration completes.
    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    pub fn registered(&self) -> bool {
        self.registered
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn server_name(&self) -> &str {
        &self.config.name
    }

    /// The server-wide session registry.
    pub fn sessions(&self) -> &Sessions {
        &self.sessions
    }
}

/// Application hooks for the server role. Every method has a no-op default.
/// The registration commands have engine defaults that run before these.
pub trait ServerEvents: Send {
    fn on_connected(&mut self, _ctx: &mut ServerCtx) {}
    fn on_disconnected(&mut self) {}

    /// Catch-all, called before any other dispatch. Return `true` to mark
    /// the message handled and skip the built-in and named handlers.
    fn on_message(&mut self, _ctx: &mut ServerCtx, _msg: &Message) -> bool {
        false
    }

    fn on_pass(&mut self, _ctx: &mut ServerCtx, _msg: &Message) {}
    fn on_nick(&mut self, _ctx: &mut ServerCtx, _msg: &Message) {}
    fn on_user(&mut self, _ctx: &mut ServerCtx, _msg: &Message) {}
    fn on_ping(&mut self, _ctx: &mut ServerCtx, _msg: &Message) {}
    fn on_pong(&mut self, _ctx: &mut ServerCtx, _msg: &Message) {}
    fn on_privmsg(&mut self, _ctx: &mut ServerCtx, _msg: &Message) {}
    fn on_notice(&mut self, _ctx: &mut ServerCtx, _msg: &Message) {}
    fn on_join(&mut self, _ctx: &mut ServerCtx, _msg: &Message) {}
    fn on_part(&mut self, _ctx: &mut ServerCtx, _msg: &Message) {}
    fn on_quit(&mut self, _ctx: &mut ServerCtx, _msg: &Message) {}
    fn on_kick(&mut self, _ctx: &mut ServerCtx, _msg: &Message) {}
    fn on_mode(&mut self, _ctx: &mut ServerCtx, _msg: &Message) {}
    fn on_topic(&mut self, _ctx: &mut ServerCtx, _msg: &Message) {}
    fn on_invite(&mut self, _ctx: &mut ServerCtx, _msg: &Message) {}

    /// Anything the dispatch table does not recognize.
    fn on_unknown(&mut self, _ctx: &mut ServerCtx, _msg: &Message) {}
}

/// A bound, not-yet-running server.
pub struct Server {
    config: Arc<ServerConfig>,
    listener: TcpListener,
    sessions: Sessions,
}

impl Server {
    /// Bind the listener. Port 0 picks an ephemeral port — read it back with
    /// [`local_addr`](Server::local_addr).
    pub async fn bind(config: ServerConfig) -> io::Result<Server> {
        let listener = TcpListener::bind((config.host.as_str(), config.port)).await?;
        info!(host = %config.host, port = config.port, name = %config.name, "server: listening");
        Ok(Self {
            config: Arc::new(config),
            listener,
            sessions: Sessions::default(),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// The registry shared with every session this server accepts.
    pub fn sessions(&self) -> Sessions {
        self.sessions.clone()
    }

    /// Accept loop: one session task per connection. The factory produces
    /// the events implementation for each accepted session.
    pub async fn run<F>(self, mut factory: F) -> io::Result<()>
    where
        F: FnMut() -> Box<dyn ServerEvents> + Send,
    {
        let mut next_id = 0u64;
        loop {
            let (socket, peer) = self.listener.accept().await?;
            next_id += 1;
            info!(%peer, "server: new connection");
            let events = factory();
            let config = Arc::clone(&self.config);
            let sessions = self.sessions.clone();
            tokio::spawn(run_session(socket, next_id, peer, config, sessions, events));
        }
    }
}

async fn run_session(
    socket: TcpStream,
    id: u64,
    peer: SocketAddr,
    config: Arc<ServerConfig>,
    sessions: Sessions,
    mut events: Box<dyn ServerEvents>,
) {
    let mut framed = Framed::new(socket, IrcCodec::default());
    let (out_tx, mut control) = mpsc::unbounded_channel();

    let mut ctx = ServerCtx {
        config,
        id,
        peer,
        nick: String::new(),
        user: String::new(),
        real: String::new(),
        pass: None,
        host: peer.ip().to_string(),
        prefix: None,
        registered: false,
        out: out_tx.clone(),
        sessions: sessions.clone(),
    };

    sessions
        .insert(
            id,
            SessionHandle {
                nick: String::new(),
                prefix: None,
                out: out_tx,
            },
        )
        .await;

    events.on_connected(&mut ctx);

    loop {
        tokio::select! {
            frame = framed.next() => {
                let msg = match frame {
                    Some(Ok(msg)) => msg,
                    Some(Err(e)) => {
                        warn!(%peer, error = %e, "server: transport error");
                        break;
                    }
                    None => break, // Peer closed the connection.
                };
                let name = resolved_name(&msg.command);
                if !events.on_message(&mut ctx, &msg) {
                    builtin(&mut ctx, name.as_ref(), &msg).await;
                    dispatch(&mut *events, &mut ctx, name.as_ref(), &msg);
                }
                if name == "QUIT" {
                    break;
                }
            }
            cmd = control.recv() => {
                match cmd {
                    Some(Control::Send(msg)) => {
                        if let Err(e) = framed.send(msg).await {
                            warn!(%peer, error = %e, "server: write failed");
                            break;
                        }
                    }
                    Some(Control::Close) | None => break,
                }
            }
        }
    }

    // Finish path — runs exactly once per connection: drop the registry
    // entry, then the disconnect hook. Dropping the framed stream closes the
    // socket; close errors are not interesting.
    sessions.remove(id).await;
    info!(%peer, nick = %ctx.nick, "server: disconnected");
    events.on_disconnected();
}

/// Engine defaults for the registration commands and keepalive. These run
/// after the catch-all but before the application's named handler.
async fn builtin(ctx: &mut ServerCtx, name: &str, msg: &Message) {
    match name {
        "PASS" => {
            if let Some(pass) = msg.params.first() {
                ctx.pass = Some(pass.clone());
            }
        }
        "NICK" => {
            if let Some(nick) = msg.params.first() {
                ctx.nick = nick.clone();
                if ctx.registered {
                    ctx.prefix = Some(format!("{}!{}@{}", ctx.nick, ctx.user, ctx.host));
                }
                let prefix = ctx.prefix.clone();
                ctx.sessions.update(ctx.id, &ctx.nick, prefix.as_deref()).await;
            }
        }
        "USER" => {
            if msg.params.len() < 4 {
                return;
            }
            ctx.user = msg.params[0].clone();
            ctx.real = msg.params[3].clone();
            ctx.prefix = Some(format!("{}!{}@{}", ctx.nick, ctx.user, ctx.host));
            let prefix = ctx.prefix.clone();
            ctx.sessions.update(ctx.id, &ctx.nick, prefix.as_deref()).await;
            if !ctx.registered {
                ctx.registered = true;
                send_welcome(ctx);
            }
        }
        "PING" => {
            let token = msg.params.first().map(String::as_str).unwrap_or_default();
            ctx.reply("PONG", &[&ctx.config.name, token]);
        }
        _ => {}
    }
}

/// The four-message welcome sequence sent once registration completes.
fn send_welcome(ctx: &ServerCtx) {
    let nick = ctx.nick.as_str();
    let prefix = ctx.prefix.as_deref().unwrap_or(nick);
    ctx.reply(
        "001",
        &[nick, &format!("Welcome to the Internet Relay Network {prefix}")],
    );
    ctx.reply(
        "002",
        &[
            nick,
            &format!(
                "Your host is {}, running version {}",
                ctx.config.name, ctx.config.version
            ),
        ],
    );
    ctx.reply("003", &[nick, "This server was created today"]);
    ctx.reply(
        "004",
        &[nick, &ctx.config.name, &ctx.config.version, USER_MODES, CHANNEL_MODES],
    );
}

/// Route a message to the application's named handler. A missing handler is
/// a no-op, never an error.
fn dispatch(events: &mut dyn ServerEvents, ctx: &mut ServerCtx, name: &str, msg: &Message) {
    match name {
        "PASS" => events.on_pass(ctx, msg),
        "NICK" => events.on_nick(ctx, msg),
        "USER" => events.on_user(ctx, msg),
        "PING" => events.on_ping(ctx, msg),
        "PONG" => events.on_pong(ctx, msg),
        "PRIVMSG" => events.on_privmsg(ctx, msg),
        "NOTICE" => events.on_notice(ctx, msg),
        "JOIN" => events.on_join(ctx, msg),
        "PART" => events.on_part(ctx, msg),
        "QUIT" => events.on_quit(ctx, msg),
        "KICK" => events.on_kick(ctx, msg),
        "MODE" => events.on_mode(ctx, msg),
        "TOPIC" => events.on_topic(ctx, msg),
        "INVITE" => events.on_invite(ctx, msg),
        _ => events.on_unknown(ctx, msg),
    }
}
