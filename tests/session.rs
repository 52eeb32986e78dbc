//! End-to-end client/server session test over loopback TCP.
//!
//! A real [`estuary::Server`] accepts a real [`estuary::client`] connection:
//! the client registers with PASS/NICK/USER, receives the welcome sequence,
//! then the server-side application emits a JOIN and a NAMES reply at the
//! session and the client's channel state is checked against them.

use tokio::sync::mpsc;

use estuary::client::{self, ClientConfig, ClientCtx, ClientEvents};
use estuary::message::Message;
use estuary::server::{Server, ServerConfig, ServerCtx, ServerEvents};

/// Install a subscriber once so `RUST_LOG=debug` shows the engine logs.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

/// Server-side application: engine defaults only.
struct NullApp;
impl ServerEvents for NullApp {}

/// Client-side application: forwards the milestones the test waits on.
struct Milestones {
    tx: mpsc::UnboundedSender<&'static str>,
}

impl ClientEvents for Milestones {
    fn on_rpl_welcome(&mut self, ctx: &mut ClientCtx, msg: &Message) {
        assert_eq!(msg.params.first().map(String::as_str), Some("wren"));
        assert!(ctx.registered());
        let _ = self.tx.send("welcome");
    }

    fn on_rpl_myinfo(&mut self, _ctx: &mut ClientCtx, _msg: &Message) {
        let _ = self.tx.send("myinfo");
    }

    fn on_join(&mut self, _ctx: &mut ClientCtx, _msg: &Message) {
        let _ = self.tx.send("join");
    }

    fn on_rpl_namreply(&mut self, _ctx: &mut ClientCtx, _msg: &Message) {
        let _ = self.tx.send("names");
    }
}

#[tokio::test]
async fn registration_handshake_and_channel_state() {
    init_tracing();
    let server = Server::bind(ServerConfig {
        host: "127.0.0.1".into(),
        port: 0,
        ..ServerConfig::default()
    })
    .await
    .unwrap();
    let addr = server.local_addr().unwrap();
    let sessions = server.sessions();
    tokio::spawn(server.run(|| Box::new(NullApp) as Box<dyn ServerEvents>));

    let (tx, mut rx) = mpsc::unbounded_channel();
    let config = ClientConfig {
        host: addr.ip().to_string(),
        port: addr.port(),
        nick: "wren".into(),
        user: "wbyrd".into(),
        real: "Wren Byrd".into(),
        pass: Some("hunter2".into()),
    };
    let handle = client::connect(config, Box::new(Milestones { tx }))
        .await
        .unwrap();

    // The full welcome sequence arrives, addressed to our nick.
    assert_eq!(rx.recv().await, Some("welcome"));
    assert_eq!(rx.recv().await, Some("myinfo"));

    // The server app now emits a JOIN and a NAMES reply at our session.
    let session = sessions.find("wren").await.expect("registered session");
    assert_eq!(session.prefix.as_deref(), Some("wren!wbyrd@127.0.0.1"));
    session.post(Some("wren!wbyrd@127.0.0.1"), "JOIN", &["#test"]);
    session.post(
        Some("irc.estuary.local"),
        "353",
        &["wren", "=", "#test", "wren foo @bar"],
    );

    assert_eq!(rx.recv().await, Some("join"));
    assert_eq!(rx.recv().await, Some("names"));

    let channels = handle.channels();
    {
        let table = channels.lock().unwrap();
        let channel = table.get("#test").expect("channel tracked");
        let users: Vec<&str> = channel.users().iter().map(String::as_str).collect();
        assert_eq!(users, ["wren", "foo", "bar"]);
        assert!(channel.modes().contains(&('o', Some("bar".into()))));
    }

    // Cancellation from another worker: close() unblocks the read loop and
    // the session drains through its finish path.
    handle.close();
    handle.closed().await.unwrap();
}

#[tokio::test]
async fn quit_ends_the_server_session() {
    init_tracing();
    let server = Server::bind(ServerConfig {
        host: "127.0.0.1".into(),
        port: 0,
        ..ServerConfig::default()
    })
    .await
    .unwrap();
    let addr = server.local_addr().unwrap();
    let sessions = server.sessions();
    tokio::spawn(server.run(|| Box::new(NullApp) as Box<dyn ServerEvents>));

    struct WelcomeOnly {
        tx: mpsc::UnboundedSender<&'static str>,
    }
    impl ClientEvents for WelcomeOnly {
        fn on_rpl_welcome(&mut self, _ctx: &mut ClientCtx, _msg: &Message) {
            let _ = self.tx.send("welcome");
        }
    }

    let (tx, mut rx) = mpsc::unbounded_channel();
    let config = ClientConfig {
        host: addr.ip().to_string(),
        port: addr.port(),
        nick: "brief".into(),
        user: "brief".into(),
        real: "Brief Visit".into(),
        pass: None,
    };
    let handle = client::connect(config, Box::new(WelcomeOnly { tx }))
        .await
        .unwrap();
    assert_eq!(rx.recv().await, Some("welcome"));
    assert_eq!(sessions.len().await, 1);

    // An explicit QUIT terminates the server-side session and clears the
    // registry entry; the client side then sees the socket close.
    handle.post(None, "QUIT", &["leaving"]);
    handle.closed().await.unwrap();

    // The registry entry is removed by the session's finish path.
    let mut remaining = sessions.len().await;
    for _ in 0..50 {
        if remaining == 0 {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        remaining = sessions.len().await;
    }
    assert_eq!(remaining, 0);
}

/// Server-side hooks observe registration state the engine has already
/// applied (PASS stored, prefix computed).
#[tokio::test]
async fn server_hooks_see_registration_fields() {
    init_tracing();

    struct Inspect {
        tx: mpsc::UnboundedSender<(Option<String>, Option<String>)>,
    }
    impl ServerEvents for Inspect {
        fn on_user(&mut self, ctx: &mut ServerCtx, _msg: &Message) {
            let _ = self.tx.send((
                ctx.pass().map(str::to_owned),
                ctx.prefix().map(str::to_owned),
            ));
        }
    }

    let server = Server::bind(ServerConfig {
        host: "127.0.0.1".into(),
        port: 0,
        ..ServerConfig::default()
    })
    .await
    .unwrap();
    let addr = server.local_addr().unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel();
    tokio::spawn(server.run(move || {
        Box::new(Inspect { tx: tx.clone() }) as Box<dyn ServerEvents>
    }));

    struct Quiet;
    impl ClientEvents for Quiet {}

    let config = ClientConfig {
        host: addr.ip().to_string(),
        port: addr.port(),
        nick: "wren".into(),
        user: "wbyrd".into(),
        real: "Wren Byrd".into(),
        pass: Some("hunter2".into()),
    };
    let handle = client::connect(config, Box::new(Quiet)).await.unwrap();

    let (pass, prefix) = rx.recv().await.unwrap();
    assert_eq!(pass.as_deref(), Some("hunter2"));
    assert_eq!(prefix.as_deref(), Some("wren!wbyrd@127.0.0.1"));

    handle.close();
    handle.closed().await.unwrap();
}
