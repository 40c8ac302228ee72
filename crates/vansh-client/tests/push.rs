use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use vansh_client::{Config, PushClient, PushNotice};
use vansh_core::{ClientMessage, ProgressEvent, PushEvent};

const OPEN: &str = r#"0{"sid":"eio-1","upgrades":[],"pingInterval":25000,"pingTimeout":20000}"#;

fn config(addr: std::net::SocketAddr, attempts: u32) -> Config {
    Config {
        api_url: format!("http://{addr}"),
        reconnect_attempts: attempts,
        backoff_base: Duration::from_millis(20),
        backoff_cap: Duration::from_millis(80),
        request_timeout: Duration::from_secs(2),
        ..Config::default()
    }
}

async fn next_notice(rx: &mut mpsc::UnboundedReceiver<PushNotice>) -> PushNotice {
    timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("notice in time")
        .expect("channel open")
}

/// Accept one connection, do the handshake, and return the socket plus the
/// first event the client sent after connecting.
async fn accept_and_handshake(
    listener: &TcpListener,
) -> (
    tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>,
    String,
) {
    let (tcp, _) = listener.accept().await.unwrap();
    let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
    ws.send(Message::Text(OPEN.into())).await.unwrap();
    let connect = ws.next().await.unwrap().unwrap();
    assert!(connect.to_text().unwrap().starts_with("40"));
    ws.send(Message::Text(r#"40{"sid":"sock-1"}"#.into()))
        .await
        .unwrap();
    let first = ws.next().await.unwrap().unwrap();
    (ws, first.to_text().unwrap().to_string())
}

#[tokio::test]
async fn joins_room_and_forwards_progress() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (events_tx, mut events) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();

    let (handle, task) = PushClient::new(&config(addr, 3), Some("tok".into()))
        .spawn(events_tx, cancel.clone());
    handle.join("p1");

    let (mut ws, first) = accept_and_handshake(&listener).await;
    assert_eq!(first, r#"42["join_project",{"project_id":"p1"}]"#);
    assert_eq!(
        next_notice(&mut events).await,
        PushNotice::Connected {
            sid: "sock-1".into()
        }
    );

    ws.send(Message::Text("2".into())).await.unwrap();
    assert_eq!(ws.next().await.unwrap().unwrap().to_text().unwrap(), "3");

    ws.send(Message::Text(
        r#"42["progress_update",{"project_id":"p1","stage":"transcribed","progress":37,"message":"done","data":{"transcript":"Hello world."}}]"#.into(),
    ))
    .await
    .unwrap();
    match next_notice(&mut events).await {
        PushNotice::Event(PushEvent::Progress(update)) => {
            assert_eq!(update.project_id, "p1");
            assert_eq!(
                update.event,
                ProgressEvent::Transcribed {
                    transcript: Some("Hello world.".into())
                }
            );
        }
        other => panic!("unexpected {other:?}"),
    }

    handle.send(ClientMessage::StartTranscription {
        project_id: "p1".into(),
    });
    let sent = ws.next().await.unwrap().unwrap();
    assert_eq!(
        sent.to_text().unwrap(),
        r#"420["start_transcription",{"project_id":"p1"}]"#
    );
    ws.send(Message::Text(r#"430[{"error":"Transcription service not configured"}]"#.into()))
        .await
        .unwrap();
    assert_eq!(
        next_notice(&mut events).await,
        PushNotice::Acknowledged {
            event: "start_transcription",
            error: Some("Transcription service not configured".into()),
        }
    );

    handle.send(ClientMessage::AudioChunk(vec![9, 8, 7]));
    let header = ws.next().await.unwrap().unwrap();
    assert_eq!(
        header.to_text().unwrap(),
        r#"451-["audio_chunk",{"_placeholder":true,"num":0}]"#
    );
    let attachment = ws.next().await.unwrap().unwrap();
    assert_eq!(attachment.into_data(), vec![9, 8, 7]);

    cancel.cancel();
    timeout(Duration::from_secs(5), task).await.unwrap().unwrap();
}

#[tokio::test]
async fn reconnects_and_rejoins_rooms() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (events_tx, mut events) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();

    let (handle, task) = PushClient::new(&config(addr, 5), None).spawn(events_tx, cancel.clone());
    handle.join("p1");

    let (ws, first) = accept_and_handshake(&listener).await;
    assert!(first.contains("join_project"));
    assert!(matches!(next_notice(&mut events).await, PushNotice::Connected { .. }));
    drop(ws);

    match next_notice(&mut events).await {
        PushNotice::Reconnecting { attempt, .. } => assert_eq!(attempt, 1),
        other => panic!("unexpected {other:?}"),
    }

    let (_ws, first) = accept_and_handshake(&listener).await;
    assert_eq!(first, r#"42["join_project",{"project_id":"p1"}]"#);
    assert!(matches!(next_notice(&mut events).await, PushNotice::Connected { .. }));

    handle.shutdown();
    timeout(Duration::from_secs(5), task).await.unwrap().unwrap();
}

#[tokio::test]
async fn gives_up_after_bounded_attempts() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let (events_tx, mut events) = mpsc::unbounded_channel();
    let (_handle, task) =
        PushClient::new(&config(addr, 2), None).spawn(events_tx, CancellationToken::new());

    let mut reconnects = 0;
    loop {
        match next_notice(&mut events).await {
            PushNotice::Reconnecting { .. } => reconnects += 1,
            PushNotice::Disconnected { .. } => break,
            other => panic!("unexpected {other:?}"),
        }
    }
    assert_eq!(reconnects, 2);
    timeout(Duration::from_secs(5), task).await.unwrap().unwrap();
}

#[tokio::test]
async fn connect_error_is_not_fatal_until_attempts_run_out() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (events_tx, mut events) = mpsc::unbounded_channel();

    let (_handle, _task) =
        PushClient::new(&config(addr, 1), None).spawn(events_tx, CancellationToken::new());

    let (tcp, _) = listener.accept().await.unwrap();
    let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
    ws.send(Message::Text(OPEN.into())).await.unwrap();
    let _connect = ws.next().await.unwrap().unwrap();
    ws.send(Message::Text(r#"44{"message":"Not authorized"}"#.into()))
        .await
        .unwrap();

    match next_notice(&mut events).await {
        PushNotice::Reconnecting { reason, .. } => assert!(reason.contains("Not authorized")),
        other => panic!("unexpected {other:?}"),
    }
}
