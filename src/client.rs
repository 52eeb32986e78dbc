//! Client-role session engine.
//!
//! Connects out, performs the PASS/NICK/USER registration handshake, then
//! runs the read loop: every inbound message is offered to the application's
//! catch-all hook first, then to the engine's built-in handlers (keepalive,
//! registration bookkeeping, capability table, channel state), then to the
//! application's named handler. A handler that panics is not caught here —
//! it aborts the session task and surfaces through [`ClientHandle::closed`],
//! so application bugs stay visible.

use std::io;
use std::sync::{Arc, Mutex};

use futures::SinkExt;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};

use crate::channels::{ChannelTable, SharedChannels};
use crate::codec::IrcCodec;
use crate::dispatch::{numeric_name, resolved_name, Control};
use crate::isupport::Isupport;
use crate::message::Message;

/// Registration inputs for the client role, used verbatim for the
/// PASS/NICK/USER handshake.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    pub nick: String,
    pub user: String,
    pub real: String,
    pub pass: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 6667,
            nick: "estuary".into(),
            user: "estuary".into(),
            real: "estuary".into(),
            pass: None,
        }
    }
}

/// Session state visible to event handlers.
pub struct ClientCtx {
    nick: String,
    prefix: Option<String>,
    registered: bool,
    out: mpsc::UnboundedSender<Control>,
    channels: SharedChannels,
    isupport: Arc<Mutex<Isupport>>,
}

impl ClientCtx {
    /// Build a message and queue it for the socket. Never blocks — outbound
    /// traffic is neither rate-limited nor bounded here.
    pub fn post(&self, prefix: Option<&str>, command: &str, params: &[&str]) {
        self.send(Message::new(prefix, command, params));
    }

    pub fn send(&self, msg: Message) {
        let _ = self.out.send(Control::Send(msg));
    }

    /// Current nickname (follows our own NICK changes).
    pub fn nick(&self) -> &str {
        &self.nick
    }

    /// Our full `nick!user@host` prefix; set once registration completes.
    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    pub fn registered(&self) -> bool {
        self.registered
    }

    pub fn channels(&self) -> &SharedChannels {
        &self.channels
    }

    pub fn isupport(&self) -> &Arc<Mutex<Isupport>> {
        &self.isupport
    }
}

/// Application hooks for the client role.
///
/// Every method has a no-op default; implementations override only what they
/// need. Handlers run on the session task and must not block — post outbound
/// messages through the context instead.
pub trait ClientEvents: Send {
    fn on_connected(&mut self, _ctx: &mut ClientCtx) {}
    fn on_disconnected(&mut self) {}

    /// Catch-all, called before any other dispatch. Return `true` to mark
    /// the message handled and skip the built-in and named handlers.
    fn on_message(&mut self, _ctx: &mut ClientCtx, _msg: &Message) -> bool {
        false
    }

    fn on_privmsg(&mut self, _ctx: &mut ClientCtx, _msg: &Message) {}
    fn on_notice(&mut self, _ctx: &mut ClientCtx, _msg: &Message) {}
    fn on_join(&mut self, _ctx: &mut ClientCtx, _msg: &Message) {}
    fn on_part(&mut self, _ctx: &mut ClientCtx, _msg: &Message) {}
    fn on_quit(&mut self, _ctx: &mut ClientCtx, _msg: &Message) {}
    fn on_kick(&mut self, _ctx: &mut ClientCtx, _msg: &Message) {}
    fn on_nick(&mut self, _ctx: &mut ClientCtx, _msg: &Message) {}
    fn on_mode(&mut self, _ctx: &mut ClientCtx, _msg: &Message) {}
    fn on_topic(&mut self, _ctx: &mut ClientCtx, _msg: &Message) {}
    fn on_invite(&mut self, _ctx: &mut ClientCtx, _msg: &Message) {}
    fn on_ping(&mut self, _ctx: &mut ClientCtx, _msg: &Message) {}
    fn on_pong(&mut self, _ctx: &mut ClientCtx, _msg: &Message) {}
    fn on_error(&mut self, _ctx: &mut ClientCtx, _msg: &Message) {}

    fn on_rpl_welcome(&mut self, _ctx: &mut ClientCtx, _msg: &Message) {}
    fn on_rpl_yourhost(&mut self, _ctx: &mut ClientCtx, _msg: &Message) {}
    fn on_rpl_created(&mut self, _ctx: &mut ClientCtx, _msg: &Message) {}
    fn on_rpl_myinfo(&mut self, _ctx: &mut ClientCtx, _msg: &Message) {}
    fn on_rpl_isupport(&mut self, _ctx: &mut ClientCtx, _msg: &Message) {}
    fn on_rpl_notopic(&mut self, _ctx: &mut ClientCtx, _msg: &Message) {}
    fn on_rpl_topic(&mut self, _ctx: &mut ClientCtx, _msg: &Message) {}
    fn on_rpl_namreply(&mut self, _ctx: &mut ClientCtx, _msg: &Message) {}
    fn on_rpl_endofnames(&mut self, _ctx: &mut ClientCtx, _msg: &Message) {}
    fn on_rpl_motdstart(&mut self, _ctx: &mut ClientCtx, _msg: &Message) {}
    fn on_rpl_motd(&mut self, _ctx: &mut ClientCtx, _msg: &Message) {}
    fn on_rpl_endofmotd(&mut self, _ctx: &mut ClientCtx, _msg: &Message) {}
    fn on_err_nicknameinuse(&mut self, _ctx: &mut ClientCtx, _msg: &Message) {}

    /// Any numeric in the dispatch table without a dedicated method above.
    fn on_numeric(&mut self, _ctx: &mut ClientCtx, _name: &'static str, _msg: &Message) {}

    /// Anything the dispatch table does not recognize.
    fn on_unknown(&mut self, _ctx: &mut ClientCtx, _msg: &Message) {}
}

/// Handle to a running client session, usable from any worker.
pub struct ClientHandle {
    out: mpsc::UnboundedSender<Control>,
    channels: SharedChannels,
    isupport: Arc<Mutex<Isupport>>,
    task: JoinHandle<()>,
}

impl ClientHandle {
    /// Build a message and queue it for the socket.
    pub fn post(&self, prefix: Option<&str>, command: &str, params: &[&str]) {
        self.send(Message::new(prefix, command, params));
    }

    pub fn send(&self, msg: Message) {
        let _ = self.out.send(Control::Send(msg));
    }

    /// Close the connection from outside the read loop. This is the only
    /// cancellation mechanism: it unblocks the pending read and drives the
    /// session through its finish path.
    pub fn close(&self) {
        let _ = self.out.send(Control::Close);
    }

    /// The session's channel table. Hold the lock for the whole of any
    /// multi-field read.
    pub fn channels(&self) -> SharedChannels {
        Arc::clone(&self.channels)
    }

    pub fn isupport(&self) -> Arc<Mutex<Isupport>> {
        Arc::clone(&self.isupport)
    }

    /// Wait for the session task to finish. A panic from an application
    /// handler surfaces here as a [`tokio::task::JoinError`].
    pub async fn closed(self) -> Result<(), tokio::task::JoinError> {
        self.task.await
    }
}

/// Connect to a server and spawn the session task.
pub async fn connect(config: ClientConfig, events: Box<dyn ClientEvents>) -> io::Result<ClientHandle> {
    let stream = TcpStream::connect((config.host.as_str(), config.port)).await?;
    info!(host = %config.host, port = config.port, nick = %config.nick, "client: connected");
    Ok(spawn(stream, config, events))
}

/// Run a client session over an already-established stream.
pub fn spawn<S>(stream: S, config: ClientConfig, events: Box<dyn ClientEvents>) -> ClientHandle
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let channels: SharedChannels = Arc::new(Mutex::new(ChannelTable::default()));
    let isupport = Arc::new(Mutex::new(Isupport::default()));

    let ctx = ClientCtx {
        nick: config.nick.clone(),
        prefix: None,
        registered: false,
        out: out_tx.clone(),
        channels: Arc::clone(&channels),
        isupport: Arc::clone(&isupport),
    };

    let task = tokio::spawn(run_session(stream, config, events, ctx, out_rx));

    ClientHandle {
        out: out_tx,
        channels,
        isupport,
        task,
    }
}

async fn run_session<S>(
    stream: S,
    config: ClientConfig,
    mut events: Box<dyn ClientEvents>,
    mut ctx: ClientCtx,
    mut control: mpsc::UnboundedReceiver<Control>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut framed = Framed::new(stream, IrcCodec::default());

    // Registration handshake: PASS (if configured), then NICK, then USER.
    if let Some(ref pass) = config.pass {
        ctx.post(None, "PASS", &[pass]);
    }
    ctx.post(None, "NICK", &[&config.nick]);
    ctx.post(None, "USER", &[&config.user, "0", "*", &config.real]);

    events.on_connected(&mut ctx);

    loop {
        tokio::select! {
            frame = framed.next() => {
                let msg = match frame {
                    Some(Ok(msg)) => msg,
                    Some(Err(e)) => {
                        warn!(error = %e, "client: transport error");
                        break;
                    }
                    None => break, // Server closed the connection.
                };
                if events.on_message(&mut ctx, &msg) {
                    continue;
                }
                let name = resolved_name(&msg.command);
                builtin(&mut ctx, name.as_ref(), &msg);
                dispatch(&mut *events, &mut ctx, name.as_ref(), &msg);
            }
            cmd = control.recv() => {
                match cmd {
                    Some(Control::Send(msg)) => {
                        if let Err(e) = framed.send(msg).await {
                            warn!(error = %e, "client: write failed");
                            break;
                        }
                    }
                    Some(Control::Close) | None => break,
                }
            }
        }
    }

    // Finish path — runs exactly once per connection. Dropping the framed
    // stream closes the socket; close errors are not interesting.
    debug!(nick = %ctx.nick, "client: session finished");
    events.on_disconnected();
}

/// Engine-level handlers: keepalive, registration bookkeeping, the
/// capability table, and the channel-state subset. These run after the
/// catch-all but before the application's named handler, each channel-state
/// update under a single lock scope.
fn builtin(ctx: &mut ClientCtx, name: &str, msg: &Message) {
    match name {
        "PING" => {
            let params: Vec<&str> = msg.params.iter().map(String::as_str).collect();
            ctx.post(None, "PONG", &params);
        }
        "RPL_WELCOME" => {
            // The accepted nick is the first parameter; our full prefix is
            // conventionally the last word of the welcome text.
            if let Some(nick) = msg.params.first() {
                ctx.nick = nick.clone();
            }
            if let Some(word) = msg.params.last().and_then(|t| t.rsplit(' ').next()) {
                if !word.is_empty() {
                    ctx.prefix = Some(word.to_owned());
                }
            }
            ctx.registered = true;
        }
        "RPL_ISUPPORT" => {
            let Ok(mut isupport) = ctx.isupport.lock() else {
                return;
            };
            isupport.observe(&msg.params);
        }
        "RPL_NAMREPLY" => {
            // :server 353 me <list type> <channel> :@foo +bar baz
            if msg.params.len() < 4 {
                return;
            }
            let list_type = msg.params[1].chars().next().unwrap_or('=');
            let names: Vec<&str> = msg.params[3].split_whitespace().collect();
            let Ok(isupport) = ctx.isupport.lock() else {
                return;
            };
            let Ok(mut channels) = ctx.channels.lock() else {
                return;
            };
            channels.names_reply(list_type, &msg.params[2], &names, &isupport);
        }
        "JOIN" => {
            if let (Some(nick), Some(channel)) = (msg.source_nick(), msg.params.first()) {
                let Ok(mut channels) = ctx.channels.lock() else {
                    return;
                };
                channels.join(nick, channel);
            }
        }
        "PART" => {
            if let (Some(nick), Some(channel)) = (msg.source_nick(), msg.params.first()) {
                let Ok(mut channels) = ctx.channels.lock() else {
                    return;
                };
                channels.part(nick, channel);
            }
        }
        "QUIT" => {
            if let Some(nick) = msg.source_nick() {
                let Ok(mut channels) = ctx.channels.lock() else {
                    return;
                };
                channels.quit(nick);
            }
        }
        "KICK" => {
            if msg.params.len() < 2 {
                return;
            }
            let Ok(mut channels) = ctx.channels.lock() else {
                return;
            };
            channels.kick(&msg.params[0], &msg.params[1]);
        }
        "NICK" => {
            let (Some(old), Some(new)) = (msg.source_nick(), msg.params.first()) else {
                return;
            };
            {
                let Ok(mut channels) = ctx.channels.lock() else {
                    return;
                };
                channels.rename_nick(old, new);
            }
            if old == ctx.nick {
                // Our own rename: keep the user@host half of the prefix.
                match ctx.prefix.as_deref().and_then(|p| p.find('!').map(|i| p[i..].to_owned())) {
                    Some(rest) => ctx.prefix = Some(format!("{new}{rest}")),
                    None => ctx.prefix = Some(new.clone()),
                }
                ctx.nick = new.clone();
            }
        }
        "MODE" => {
            if msg.params.len() < 2 {
                return;
            }
            let Ok(isupport) = ctx.isupport.lock() else {
                return;
            };
            let chantypes = isupport.get("CHANTYPES").unwrap_or("#&+!");
            if !msg.params[0].starts_with(|c| chantypes.contains(c)) {
                return; // User modes are not channel state.
            }
            let args: Vec<String> = msg.params[2..].to_vec();
            let Ok(mut channels) = ctx.channels.lock() else {
                return;
            };
            channels.apply_mode(&msg.params[0], &msg.params[1], &args, isupport.modes());
        }
        _ => {}
    }
}

/// Route a message to the application's named handler. A name with no
/// dedicated method falls through to `on_numeric`/`on_unknown`; a missing
/// handler is a no-op, never an error.
fn dispatch(events: &mut dyn ClientEvents, ctx: &mut ClientCtx, name: &str, msg: &Message) {
    match name {
        "PRIVMSG" => events.on_privmsg(ctx, msg),
        "NOTICE" => events.on_notice(ctx, msg),
        "JOIN" => events.on_join(ctx, msg),
        "PART" => events.on_part(ctx, msg),
        "QUIT" => events.on_quit(ctx, msg),
        "KICK" => events.on_kick(ctx, msg),
        "NICK" => events.on_nick(ctx, msg),
        "MODE" => events.on_mode(ctx, msg),
        "TOPIC" => events.on_topic(ctx, msg),
        "INVITE" => events.on_invite(ctx, msg),
        "PING" => events.on_ping(ctx, msg),
        "PONG" => events.on_pong(ctx, msg),
        "ERROR" => events.on_error(ctx, msg),
        "RPL_WELCOME" => events.on_rpl_welcome(ctx, msg),
        "RPL_YOURHOST" => events.on_rpl_yourhost(ctx, msg),
        "RPL_CREATED" => events.on_rpl_created(ctx, msg),
        "RPL_MYINFO" => events.on_rpl_myinfo(ctx, msg),
        "RPL_ISUPPORT" => events.on_rpl_isupport(ctx, msg),
        "RPL_NOTOPIC" => events.on_rpl_notopic(ctx, msg),
        "RPL_TOPIC" => events.on_rpl_topic(ctx, msg),
        "RPL_NAMREPLY" => events.on_rpl_namreply(ctx, msg),
        "RPL_ENDOFNAMES" => events.on_rpl_endofnames(ctx, msg),
        "RPL_MOTDSTART" => events.on_rpl_motdstart(ctx, msg),
        "RPL_MOTD" => events.on_rpl_motd(ctx, msg),
        "RPL_ENDOFMOTD" => events.on_rpl_endofmotd(ctx, msg),
        "ERR_NICKNAMEINUSE" => events.on_err_nicknameinuse(ctx, msg),
        _ => match numeric_name(&msg.command) {
            Some(sym) => events.on_numeric(ctx, sym, msg),
            None => events.on_unknown(ctx, msg),
        },
    }
}
