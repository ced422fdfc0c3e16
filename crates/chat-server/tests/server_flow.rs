//! End-to-end scenarios driving a live [`chat_server::ServerEndpoint`] over
//! real loopback UDP.

mod common;

use chat_core::proto::{EventBody, RequestBody, ResponseBody, UserInfoWire};
use common::{spawn_server, TestClient};

#[tokio::test]
async fn register_login_and_say_roundtrip() {
    let (addr, _sink, _shutdown) = spawn_server().await;
    let mut client = TestClient::connect(addr).await;

    assert_eq!(
        client
            .request(RequestBody::Register {
                username: "alice".into(),
                password: "hunter2".into(),
            })
            .await,
        ResponseBody::Ok
    );

    assert_eq!(
        client
            .request(RequestBody::Login {
                username: "alice".into(),
                password: "hunter2".into(),
            })
            .await,
        ResponseBody::Ok
    );

    assert_eq!(
        client
            .request(RequestBody::Say {
                recipient: None,
                text: "hello room".into(),
            })
            .await,
        ResponseBody::Ok
    );

    let status = client.request(RequestBody::FetchStatus).await;
    assert_eq!(
        status,
        ResponseBody::Status(chat_core::proto::StatusInfoWire {
            online_count: 1,
            public_log_len: 2, // presence entry + the message
        })
    );
}

#[tokio::test]
async fn wrong_password_is_rejected() {
    let (addr, _sink, _shutdown) = spawn_server().await;
    let mut client = TestClient::connect(addr).await;

    client
        .request(RequestBody::Register {
            username: "alice".into(),
            password: "correct".into(),
        })
        .await;

    let resp = client
        .request(RequestBody::Login {
            username: "alice".into(),
            password: "wrong".into(),
        })
        .await;

    match resp {
        ResponseBody::Error { kind, .. } => assert_eq!(kind, "CredentialInvalid"),
        other => panic!("expected CredentialInvalid error, got {other:?}"),
    }
}

#[tokio::test]
async fn duplicate_registration_is_rejected() {
    let (addr, _sink, _shutdown) = spawn_server().await;
    let mut client = TestClient::connect(addr).await;

    client
        .request(RequestBody::Register {
            username: "alice".into(),
            password: "x".into(),
        })
        .await;
    let resp = client
        .request(RequestBody::Register {
            username: "alice".into(),
            password: "y".into(),
        })
        .await;

    match resp {
        ResponseBody::Error { kind, .. } => assert_eq!(kind, "UserExists"),
        other => panic!("expected UserExists error, got {other:?}"),
    }
}

#[tokio::test]
async fn operations_without_login_require_authentication() {
    let (addr, _sink, _shutdown) = spawn_server().await;
    let mut client = TestClient::connect(addr).await;

    let resp = client
        .request(RequestBody::Say {
            recipient: None,
            text: "hi".into(),
        })
        .await;
    match resp {
        ResponseBody::Error { kind, .. } => assert_eq!(kind, "NotAuthenticated"),
        other => panic!("expected NotAuthenticated error, got {other:?}"),
    }
}

#[tokio::test]
async fn second_login_evicts_first_and_addr_reports_not_authenticated() {
    let (addr, _sink, _shutdown) = spawn_server().await;

    let mut first = TestClient::connect(addr).await;
    first
        .request(RequestBody::Register {
            username: "alice".into(),
            password: "pw".into(),
        })
        .await;
    assert_eq!(
        first
            .request(RequestBody::Login {
                username: "alice".into(),
                password: "pw".into(),
            })
            .await,
        ResponseBody::Ok
    );

    let mut second = TestClient::connect(addr).await;
    assert_eq!(
        second
            .request(RequestBody::Login {
                username: "alice".into(),
                password: "pw".into(),
            })
            .await,
        ResponseBody::Ok
    );

    // The first connection's address still has a live session row, but it
    // reverted to unauthenticated: further requests are rejected rather
    // than looking like an unknown peer.
    let resp = first
        .request(RequestBody::GetUsers)
        .await;
    match resp {
        ResponseBody::Error { kind, .. } => assert_eq!(kind, "NotAuthenticated"),
        other => panic!("expected NotAuthenticated error, got {other:?}"),
    }
}

#[tokio::test]
async fn recipient_unknown_and_offline_are_distinguished() {
    let (addr, _sink, _shutdown) = spawn_server().await;
    let mut alice = TestClient::connect(addr).await;
    alice
        .request(RequestBody::Register {
            username: "alice".into(),
            password: "pw".into(),
        })
        .await;
    alice
        .request(RequestBody::Login {
            username: "alice".into(),
            password: "pw".into(),
        })
        .await;

    let resp = alice
        .request(RequestBody::Say {
            recipient: Some("ghost".into()),
            text: "hi".into(),
        })
        .await;
    match resp {
        ResponseBody::Error { kind, .. } => assert_eq!(kind, "RecipientUnknown"),
        other => panic!("expected RecipientUnknown, got {other:?}"),
    }

    // Register bob but don't log him in: known, but offline.
    let mut registrar = TestClient::connect(addr).await;
    registrar
        .request(RequestBody::Register {
            username: "bob".into(),
            password: "pw".into(),
        })
        .await;

    let resp = alice
        .request(RequestBody::Say {
            recipient: Some("bob".into()),
            text: "hi".into(),
        })
        .await;
    match resp {
        ResponseBody::Error { kind, .. } => assert_eq!(kind, "RecipientOffline"),
        other => panic!("expected RecipientOffline, got {other:?}"),
    }
}

#[tokio::test]
async fn private_message_delivers_event_and_history_to_recipient() {
    let (addr, _sink, _shutdown) = spawn_server().await;

    let mut alice = TestClient::connect(addr).await;
    alice
        .request(RequestBody::Register {
            username: "alice".into(),
            password: "pw".into(),
        })
        .await;
    alice
        .request(RequestBody::Login {
            username: "alice".into(),
            password: "pw".into(),
        })
        .await;

    let mut bob = TestClient::connect(addr).await;
    bob.request(RequestBody::Register {
        username: "bob".into(),
        password: "pw".into(),
    })
    .await;
    bob.request(RequestBody::Login {
        username: "bob".into(),
        password: "pw".into(),
    })
    .await;

    assert_eq!(
        alice
            .request(RequestBody::Say {
                recipient: Some("bob".into()),
                text: "hey bob".into(),
            })
            .await,
        ResponseBody::Ok
    );

    let event = bob.next_event(1000).await.expect("bob should get notified");
    match event {
        EventBody::NewMsg { from, entry } => {
            assert_eq!(from, Some("alice".into()));
            assert_eq!(entry.speaker, "alice");
            assert_eq!(entry.kind, chat_core::chat_entry::ChatKind::Message("hey bob".into()));
        }
        other => panic!("expected NewMsg, got {other:?}"),
    }

    let chats = bob
        .request(RequestBody::GetChats {
            peer: Some("alice".into()),
        })
        .await;
    match chats {
        ResponseBody::Chats(entries) => {
            assert_eq!(entries.len(), 1);
            assert_eq!(entries[0].speaker, "alice");
        }
        other => panic!("expected Chats, got {other:?}"),
    }
}

#[tokio::test]
async fn public_broadcast_excludes_sender_and_reaches_others() {
    let (addr, _sink, _shutdown) = spawn_server().await;

    let mut alice = TestClient::connect(addr).await;
    alice
        .request(RequestBody::Register {
            username: "alice".into(),
            password: "pw".into(),
        })
        .await;
    alice
        .request(RequestBody::Login {
            username: "alice".into(),
            password: "pw".into(),
        })
        .await;

    let mut bob = TestClient::connect(addr).await;
    bob.request(RequestBody::Register {
        username: "bob".into(),
        password: "pw".into(),
    })
    .await;
    bob.request(RequestBody::Login {
        username: "bob".into(),
        password: "pw".into(),
    })
    .await;

    alice
        .request(RequestBody::Say {
            recipient: None,
            text: "hi all".into(),
        })
        .await;

    let event = bob.next_event(1000).await.expect("bob hears the broadcast");
    match event {
        EventBody::NewMsg { from, entry } => {
            assert_eq!(from, None);
            assert_eq!(entry.speaker, "alice");
            assert_eq!(entry.kind, chat_core::chat_entry::ChatKind::Message("hi all".into()));
        }
        other => panic!("expected NewMsg, got {other:?}"),
    }

    // Alice's own request/response round trip already completed above with
    // no extra datagram for her own broadcast.
    assert!(alice.expect_silence(200).await);
}

#[tokio::test]
async fn empty_message_is_rejected() {
    let (addr, _sink, _shutdown) = spawn_server().await;
    let mut client = TestClient::connect(addr).await;
    client
        .request(RequestBody::Register {
            username: "alice".into(),
            password: "pw".into(),
        })
        .await;
    client
        .request(RequestBody::Login {
            username: "alice".into(),
            password: "pw".into(),
        })
        .await;

    let resp = client
        .request(RequestBody::Say {
            recipient: None,
            text: String::new(),
        })
        .await;
    match resp {
        ResponseBody::Error { kind, .. } => assert_eq!(kind, "EmptyMessage"),
        other => panic!("expected EmptyMessage, got {other:?}"),
    }
}

#[tokio::test]
async fn replayed_sealed_frame_is_dropped_silently() {
    let (addr, _sink, _shutdown) = spawn_server().await;
    let mut client = TestClient::connect(addr).await;

    client
        .request(RequestBody::Register {
            username: "alice".into(),
            password: "pw".into(),
        })
        .await;

    let (wire, first) = client.request_with_wire(RequestBody::Heartbeat).await;
    assert_eq!(first, ResponseBody::Ok);

    client.send_raw(&wire).await;
    // The replayed frame fails envelope authentication (stale counter) and
    // is dropped; no second reply arrives.
    assert!(client.expect_silence(300).await);
}

#[tokio::test]
async fn get_users_reports_current_online_status() {
    let (addr, _sink, _shutdown) = spawn_server().await;

    let mut alice = TestClient::connect(addr).await;
    alice
        .request(RequestBody::Register {
            username: "alice".into(),
            password: "pw".into(),
        })
        .await;
    alice
        .request(RequestBody::Login {
            username: "alice".into(),
            password: "pw".into(),
        })
        .await;

    let mut registrar = TestClient::connect(addr).await;
    registrar
        .request(RequestBody::Register {
            username: "bob".into(),
            password: "pw".into(),
        })
        .await;

    let resp = alice.request(RequestBody::GetUsers).await;
    match resp {
        ResponseBody::Users(mut users) => {
            users.sort_by(|a, b| a.name.cmp(&b.name));
            assert_eq!(
                users,
                vec![
                    UserInfoWire {
                        name: "alice".into(),
                        online: true
                    },
                    UserInfoWire {
                        name: "bob".into(),
                        online: false
                    },
                ]
            );
        }
        other => panic!("expected Users, got {other:?}"),
    }
}
