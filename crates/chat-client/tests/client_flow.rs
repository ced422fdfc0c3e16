//! End-to-end scenarios driving a real [`chat_client::ClientSession`]
//! against a live [`chat_server::ServerEndpoint`] over loopback UDP.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chat_client::session::ClientSession;
use chat_client::{ClientConfig, ClientError, ClientState};
use chat_core::notify::{Event, NotificationSink, RecordingSink};
use chat_core::time::SystemClock;
use chat_server::{ServerConfig, ServerEndpoint, UserStore};
use chat_transport::transport::Transport;
use chat_transport::udp_async::AsyncUdpTransport;

async fn spawn_server() -> (SocketAddr, tokio::sync::oneshot::Sender<()>) {
    let dir = tempfile::tempdir().unwrap();
    let store = UserStore::open(
        dir.path().join("users.bin"),
        chat_crypto::password::PasswordParams::low_cost_for_tests(),
    )
    .unwrap();

    let transport = Arc::new(
        AsyncUdpTransport::bind("127.0.0.1:0".parse::<SocketAddr>().unwrap())
            .await
            .unwrap(),
    );
    let addr = transport.local_addr().unwrap();

    let config = ServerConfig {
        bind_addr: addr,
        heartbeat_interval: Duration::from_millis(300),
        ..ServerConfig::default()
    };

    let endpoint = Arc::new(ServerEndpoint::new(
        transport,
        store,
        Arc::new(RecordingSink::new()),
        Arc::new(SystemClock),
        config,
    ));

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    tokio::spawn(async move {
        let _ = endpoint.run(shutdown_rx).await;
    });
    tokio::time::sleep(Duration::from_millis(20)).await;

    (addr, shutdown_tx)
}

async fn connect_client(
    server_addr: SocketAddr,
) -> (Arc<ClientSession<AsyncUdpTransport>>, Arc<RecordingSink>) {
    let transport = Arc::new(
        AsyncUdpTransport::bind("127.0.0.1:0".parse::<SocketAddr>().unwrap())
            .await
            .unwrap(),
    );
    let sink = Arc::new(RecordingSink::new());
    let config = ClientConfig {
        heartbeat_interval: Duration::from_millis(300),
        ..ClientConfig::default()
    };
    let session = ClientSession::connect(transport, server_addr, config, sink.clone() as Arc<dyn NotificationSink>, Arc::new(SystemClock))
        .await
        .expect("handshake succeeds");
    (session, sink)
}

#[tokio::test]
async fn register_login_say_and_fetch_roundtrip() {
    let (server_addr, _shutdown) = spawn_server().await;
    let (client, _sink) = connect_client(server_addr).await;

    client.register("alice", "hunter2").await.unwrap();
    client.login("alice", "hunter2").await.unwrap();
    assert_eq!(client.state(), ClientState::ConnectedAuth);

    client.say(None, "hello room").await.unwrap();

    let status = client.fetch_chatroom_status().await.unwrap();
    assert_eq!(status.online_count, 1);
    assert_eq!(status.public_log_len, 1);

    let chats = client.get_chats(None).await.unwrap();
    assert_eq!(chats.len(), 1);
    assert_eq!(client.cached_chats(None).len(), 1);

    let roster = client.get_user_info().await.unwrap();
    assert_eq!(roster.len(), 1);
    assert!(roster[0].online);

    client.logout().await.unwrap();
    assert_eq!(client.state(), ClientState::ConnectedUnauth);

    client.disconnect().await;
}

#[tokio::test]
async fn wrong_password_is_rejected() {
    let (server_addr, _shutdown) = spawn_server().await;
    let (client, _sink) = connect_client(server_addr).await;

    client.register("bob", "correct-horse").await.unwrap();
    let err = client.login("bob", "wrong").await.unwrap_err();
    assert!(matches!(err, ClientError::CredentialInvalid));
    assert_eq!(client.state(), ClientState::ConnectedUnauth);
}

#[tokio::test]
async fn say_before_login_is_rejected_locally() {
    let (server_addr, _shutdown) = spawn_server().await;
    let (client, sink) = connect_client(server_addr).await;

    let err = client.say(None, "hi").await.unwrap_err();
    assert!(matches!(err, ClientError::NotAuthenticated));
    assert!(sink.events().contains(&Event::NotLogin));
}

#[tokio::test]
async fn duplicate_registration_is_rejected() {
    let (server_addr, _shutdown) = spawn_server().await;
    let (client, _sink) = connect_client(server_addr).await;

    client.register("carol", "p4ssword").await.unwrap();
    let err = client.register("carol", "different").await.unwrap_err();
    assert!(matches!(err, ClientError::UserExists));
}

#[tokio::test]
async fn second_client_receives_broadcast_and_presence_events() {
    let (server_addr, _shutdown) = spawn_server().await;
    let (alice, _alice_sink) = connect_client(server_addr).await;
    let (bob, bob_sink) = connect_client(server_addr).await;

    alice.register("alice", "hunter2").await.unwrap();
    alice.login("alice", "hunter2").await.unwrap();

    bob.register("bob", "hunter3").await.unwrap();
    bob.login("bob", "hunter3").await.unwrap();

    alice.say(None, "hello from alice").await.unwrap();

    // Give the push events a moment to arrive and be recorded.
    tokio::time::sleep(Duration::from_millis(100)).await;
    let events = bob_sink.events();
    assert!(events.contains(&Event::Online("alice".into())) || events.iter().any(|e| matches!(e, Event::UsersUpdated)));
    assert!(events.iter().any(|e| matches!(e, Event::NewMsg(None))));
}

#[tokio::test]
async fn heartbeat_keeps_session_alive_past_the_interval() {
    let (server_addr, _shutdown) = spawn_server().await;
    let (client, _sink) = connect_client(server_addr).await;

    client.register("dana", "hunter2").await.unwrap();
    client.login("dana", "hunter2").await.unwrap();

    // The server's heartbeat_interval is 300ms; stay connected across two
    // intervals purely on the client's automatic heartbeat emission.
    tokio::time::sleep(Duration::from_millis(700)).await;

    let status = client.fetch_chatroom_status().await.unwrap();
    assert_eq!(status.online_count, 1);
}

#[tokio::test]
async fn client_detects_lost_server_via_heartbeat_silence() {
    let (server_addr, shutdown) = spawn_server().await;
    let (client, sink) = connect_client(server_addr).await;

    client.register("erin", "hunter2").await.unwrap();
    client.login("erin", "hunter2").await.unwrap();

    // Stop the server's receive loop entirely: no more acks, responses, or
    // presence pushes will ever arrive for this client.
    let _ = shutdown.send(());

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(client.state(), ClientState::Disconnected);
    assert!(sink.events().contains(&Event::ConnectionLost));
}
