//! Integration tests for the game-server bridge components
//!
//! These tests drive the RCON transport, session, supervisor and command
//! pipeline against a scripted in-process game server on a real UDP socket.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};

use bridge::commands::{ChatOutcome, CommandPipeline, MapListMode};
use bridge::events::{EventBus, EventKind};
use bridge::supervisor::ConnectionSupervisor;
use moments::{DemoResolver, DemoResolverConfig, ResolveReason};
use rcon::{RconError, RconSession, RconTransport, SessionError, TransportConfig};

const CHALLENGE_TOKEN: &str = "90210";

/// TRANSPORT PROTOCOL TESTS
mod transport_tests {
    use super::*;

    /// Tests the full challenge-then-command exchange over UDP
    #[tokio::test]
    async fn challenge_exchange_and_echo() {
        let server = FakeGameServer::spawn("secret").await;
        let transport = RconTransport::connect(&server.transport_config("secret"), true)
            .await
            .expect("connect failed");

        let reply = transport.execute("echo check").await.expect("execute failed");
        assert_eq!(reply, "echo check");

        server.shutdown();
    }

    /// Tests that multi-datagram replies are drained and joined in order
    #[tokio::test]
    async fn multi_packet_reply_joined() {
        let server = FakeGameServer::spawn("secret").await;
        let transport = RconTransport::connect(&server.transport_config("secret"), false)
            .await
            .expect("connect failed");

        let reply = transport.execute("burst").await.expect("execute failed");
        assert_eq!(reply, "first piece\nsecond piece");

        server.shutdown();
    }

    /// Tests that high-byte replies decode as cyrillic text
    #[tokio::test]
    async fn cyrillic_reply_decoded() {
        let server = FakeGameServer::spawn("secret").await;
        let transport = RconTransport::connect(&server.transport_config("secret"), false)
            .await
            .expect("connect failed");

        let reply = transport.execute("cp1251").await.expect("execute failed");
        assert_eq!(reply, "Привет");

        server.shutdown();
    }

    /// Tests that password validation surfaces the bad-password reply
    #[tokio::test]
    async fn bad_password_detected_on_connect() {
        let server = FakeGameServer::spawn("secret").await;

        let err = RconTransport::connect(&server.transport_config("wrong"), true)
            .await
            .expect_err("connect should fail");
        assert!(matches!(err, RconError::BadPassword));

        server.shutdown();
    }

    /// Tests that a silent server is reported as offline
    #[tokio::test]
    async fn unanswered_challenge_is_offline() {
        // bind and immediately drop a socket so the port is free but silent
        let unused = UdpSocket::bind("127.0.0.1:0").await.expect("bind failed");
        let addr = unused.local_addr().expect("local addr");
        drop(unused);

        let mut config = TransportConfig::new(addr.ip().to_string(), addr.port(), "secret");
        config.timeout = Duration::from_millis(150);

        let err = RconTransport::connect(&config, true)
            .await
            .expect_err("connect should fail");
        assert!(matches!(
            err,
            RconError::ServerOffline(_) | RconError::BadConnection(_)
        ));
    }
}

/// SESSION LIFECYCLE TESTS
mod session_tests {
    use super::*;

    /// Tests connect, command execution and status fetch on a live session
    #[tokio::test]
    async fn session_connects_and_executes() {
        let server = FakeGameServer::spawn("secret").await;
        let session = RconSession::new(server.transport_config("secret"));

        assert!(!session.connected());
        session.connect_to_server().await.expect("connect failed");
        assert!(session.connected());

        let reply = session.exec("echo alive").await.expect("exec failed");
        assert_eq!(reply, "echo alive");

        let status = session.fetch_status().await.expect("status failed");
        assert_eq!(status, "ultrahc_ds_get_info");

        session.disconnect().await;
        assert!(!session.connected());
        let err = session.exec("echo gone").await.expect_err("exec should fail");
        assert!(matches!(err, SessionError::NotConnected));

        server.shutdown();
    }

    /// Tests that a command failure drops the session into disconnected state
    #[tokio::test]
    async fn exec_failure_clears_connected_flag() {
        let server = FakeGameServer::spawn("secret").await;
        let session = RconSession::new(server.transport_config("secret"));
        session.connect_to_server().await.expect("connect failed");

        server.shutdown();
        sleep(Duration::from_millis(20)).await;

        let err = session.exec("echo void").await.expect_err("exec should fail");
        assert!(matches!(err, SessionError::Command { .. }));
        assert!(!session.connected());

        // follow-up calls fail fast instead of timing out again
        let err = session.exec("echo still").await.expect_err("exec should fail");
        assert!(matches!(err, SessionError::NotConnected));
    }
}

/// SUPERVISOR AND COMMAND PIPELINE TESTS
mod supervisor_pipeline_tests {
    use super::*;

    /// Tests that connect and disconnect transitions notify exactly once
    #[tokio::test]
    async fn transitions_notify_once_per_period() {
        let server = FakeGameServer::spawn("secret").await;
        let session = Arc::new(RconSession::new(server.transport_config("secret")));
        let bus = Arc::new(EventBus::new());
        let connects = count_events(&bus, EventKind::Connected).await;
        let disconnects = count_events(&bus, EventKind::Disconnected).await;

        let supervisor = Arc::new(ConnectionSupervisor::new(
            Arc::clone(&session),
            Arc::clone(&bus),
            Duration::ZERO,
            Duration::from_secs(60),
        ));
        let pipeline = CommandPipeline::new(Arc::clone(&session), Arc::clone(&supervisor));

        supervisor.try_connect().await.expect("connect failed");
        assert_eq!(connects.load(Ordering::SeqCst), 1);

        server.shutdown();
        sleep(Duration::from_millis(20)).await;

        // the chat path tears the session down and notifies once
        assert!(pipeline.send_chat_message("gamer", "hello").await.is_err());
        assert!(!session.connected());
        assert_eq!(disconnects.load(Ordering::SeqCst), 1);

        // a second failure inside the same outage stays silent
        assert!(pipeline.send_chat_message("gamer", "anyone?").await.is_err());
        assert_eq!(disconnects.load(Ordering::SeqCst), 1);
    }

    /// Tests chat relay escaping and truncation on the wire
    #[tokio::test]
    async fn chat_relay_escapes_payload() {
        let server = FakeGameServer::spawn("secret").await;
        let session = Arc::new(RconSession::new(server.transport_config("secret")));
        let bus = Arc::new(EventBus::new());
        let supervisor = Arc::new(ConnectionSupervisor::new(
            Arc::clone(&session),
            Arc::clone(&bus),
            Duration::ZERO,
            Duration::from_secs(60),
        ));
        let pipeline = CommandPipeline::new(Arc::clone(&session), supervisor);

        session.connect_to_server().await.expect("connect failed");

        let outcome = pipeline
            .send_chat_message("Gamer \"X\"", "hello\nworld")
            .await
            .expect("chat failed");
        assert_eq!(outcome, ChatOutcome::Sent { truncated: false });

        let outcome = pipeline.send_chat_message("anyone", "   ").await.expect("chat failed");
        assert_eq!(outcome, ChatOutcome::SkippedEmpty);

        let commands = server.sent_commands().await;
        assert!(commands.contains(&"ultrahc_ds_send_msg \"Gamer 'X'\" \"hello world\"".to_string()));

        server.shutdown();
    }

    /// Tests the marker-framed map listing end to end
    #[tokio::test]
    async fn map_listing_parses_marker_frame() {
        let server = FakeGameServer::spawn("secret").await;
        let session = Arc::new(RconSession::new(server.transport_config("secret")));
        let bus = Arc::new(EventBus::new());
        let supervisor = Arc::new(ConnectionSupervisor::new(
            Arc::clone(&session),
            Arc::clone(&bus),
            Duration::ZERO,
            Duration::from_secs(60),
        ));
        let pipeline = CommandPipeline::new(Arc::clone(&session), supervisor);

        session.connect_to_server().await.expect("connect failed");

        let page = pipeline
            .server_maps(MapListMode::Rotation, 0, 0)
            .await
            .expect("map listing failed");
        assert_eq!(page.total_maps, 3);
        assert_eq!(page.total_pages, 1);
        assert_eq!(page.entries[0].index, 1);
        assert_eq!(page.entries[0].name, "de_dust2");
        assert_eq!(page.entries[2].name, "cs_assault");

        server.shutdown();
    }
}

/// DEMO RESOLUTION TESTS
mod demo_resolution_tests {
    use super::*;

    /// Tests resolving a demo URL from the HLTV status line over UDP
    #[tokio::test]
    async fn hltv_status_yields_demo_url() {
        let server = FakeGameServer::spawn("secret").await;

        let config = DemoResolverConfig {
            hltv_host: server.addr.ip().to_string(),
            hltv_port: server.addr.port(),
            hltv_password: "secret".to_string(),
            timeout: Duration::from_millis(300),
            arena_host: "https://panel.example.com".to_string(),
            arena_hid: "777".to_string(),
            ..DemoResolverConfig::default()
        };
        let resolver = DemoResolver::new(config, None);
        assert!(resolver.enabled());

        let result = resolver.resolve_demo("de_dust2", false).await;
        assert_eq!(result.reason, ResolveReason::Resolved);
        assert_eq!(result.source, "hltv");
        assert_eq!(
            result.demo_url.as_deref(),
            Some("https://panel.example.com/getzipdemo.php?hid=777&dem=auto/1910231830-de_dust2.dem")
        );

        // the second lookup for the same map is served from cache
        let cached = resolver.resolve_demo("de_dust2", false).await;
        assert_eq!(cached.reason, ResolveReason::CacheHit);
        assert_eq!(cached.source, "cache");

        server.shutdown();
    }

    /// Tests the mismatch outcome when HLTV records a different map
    #[tokio::test]
    async fn hltv_recording_other_map_mismatches() {
        let server = FakeGameServer::spawn("secret").await;

        let config = DemoResolverConfig {
            hltv_host: server.addr.ip().to_string(),
            hltv_port: server.addr.port(),
            hltv_password: "secret".to_string(),
            timeout: Duration::from_millis(300),
            arena_host: "panel.example.com".to_string(),
            arena_hid: "777".to_string(),
            ..DemoResolverConfig::default()
        };
        let resolver = DemoResolver::new(config, None);

        let result = resolver.resolve_demo("de_inferno", false).await;
        assert_eq!(result.reason, ResolveReason::MapMismatch);
        assert!(result.map_mismatch);
        assert_eq!(result.map_expected, "de_inferno");
        assert_eq!(result.map_found, "de_dust2");
        assert!(result.demo_url.is_none());

        server.shutdown();
    }
}

/// A scripted game server answering the challenge-response dialect on a
/// real UDP socket. Commands arrive framed as `rcon <token> <password>
/// <command>` and are logged for later assertions.
struct FakeGameServer {
    addr: SocketAddr,
    commands: Arc<Mutex<Vec<String>>>,
    handle: JoinHandle<()>,
}

impl FakeGameServer {
    async fn spawn(password: &'static str) -> Self {
        let socket = UdpSocket::bind("127.0.0.1:0").await.expect("bind fake server");
        let addr = socket.local_addr().expect("local addr");
        let commands = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&commands);

        let handle = tokio::spawn(async move {
            let mut buf = [0u8; 2048];
            loop {
                let Ok((len, peer)) = socket.recv_from(&mut buf).await else {
                    return;
                };
                let Some(body) = buf[..len].strip_prefix(&[0xFF, 0xFF, 0xFF, 0xFF][..]) else {
                    continue;
                };
                let body = String::from_utf8_lossy(body);
                let body = body.trim_end_matches(&['\n', '\0'][..]);

                if body == "getchallenge" {
                    let reply = format!("challenge rcon {}\n", CHALLENGE_TOKEN);
                    let mut packet = vec![0xFF, 0xFF, 0xFF, 0xFF];
                    packet.extend_from_slice(reply.as_bytes());
                    let _ = socket.send_to(&packet, peer).await;
                    continue;
                }

                let Some(rest) = body.strip_prefix(&format!("rcon {} ", CHALLENGE_TOKEN)) else {
                    continue;
                };
                let Some((got_password, command)) = rest.split_once(' ') else {
                    continue;
                };

                if got_password != password {
                    let _ = socket.send_to(&frame_print("Bad rcon_password."), peer).await;
                    continue;
                }

                log.lock().await.push(command.to_string());

                match command {
                    "burst" => {
                        let _ = socket.send_to(&frame_print("first piece"), peer).await;
                        let _ = socket.send_to(&frame_print("second piece"), peer).await;
                    }
                    "cp1251" => {
                        let mut packet = b"\xff\xff\xff\xffprint\n".to_vec();
                        packet.extend_from_slice(&[0xCF, 0xF0, 0xE8, 0xE2, 0xE5, 0xF2]);
                        packet.push(0);
                        let _ = socket.send_to(&packet, peer).await;
                    }
                    "status" => {
                        let text = "hostname:  HLTV\n--  Recording to \"auto/1910231830-de_dust2.dem\".";
                        let _ = socket.send_to(&frame_print(text), peer).await;
                    }
                    "ultrahc_ds_get_maps rotation" => {
                        let text =
                            "ULTRAHC_MAPS_BEGIN rotation\nde_dust2\nde_train\ncs_assault\nULTRAHC_MAPS_END";
                        let _ = socket.send_to(&frame_print(text), peer).await;
                    }
                    chat if chat.starts_with("ultrahc_ds_send_msg") => {
                        let _ = socket.send_to(&frame_print(""), peer).await;
                    }
                    other => {
                        let _ = socket.send_to(&frame_print(other), peer).await;
                    }
                }
            }
        });

        FakeGameServer { addr, commands, handle }
    }

    fn transport_config(&self, password: &str) -> TransportConfig {
        let mut config =
            TransportConfig::new(self.addr.ip().to_string(), self.addr.port(), password);
        config.timeout = Duration::from_millis(300);
        config.burst_timeout = Duration::from_millis(60);
        config
    }

    async fn sent_commands(&self) -> Vec<String> {
        self.commands.lock().await.clone()
    }

    fn shutdown(&self) {
        self.handle.abort();
    }
}

/// Frames a console reply the way the engine does: packet prefix, the
/// `print` marker, a newline, the text and a trailing NUL.
fn frame_print(text: &str) -> Vec<u8> {
    let mut packet = b"\xff\xff\xff\xffprint\n".to_vec();
    packet.extend_from_slice(text.as_bytes());
    packet.push(0);
    packet
}

async fn count_events(bus: &Arc<EventBus>, kind: EventKind) -> Arc<AtomicUsize> {
    let count = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&count);
    bus.subscribe(kind, move |_event| {
        let counter = Arc::clone(&counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    })
    .await;
    count
}
