//! Integration tests for StreamLink over real TCP sockets.
//!
//! A small task plays the gate device behind a serial bridge: it answers a
//! plate with a balance and waits for the host's amount due.

use futures::{SinkExt, StreamExt};
use parkgate_link::{Link, LinkError, StreamLink};
use parkgate_protocol::{GateLineCodec, HostMessage, SettlementStatus};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::time::Instant;
use tokio_util::codec::Framed;

fn deadline(millis: u64) -> Instant {
    Instant::now() + Duration::from_millis(millis)
}

#[tokio::test]
async fn test_exchange_with_bridge() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let device = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut framed = Framed::new(stream, GateLineCodec::new());

        framed.send("PLATE:RAB123A".to_string()).await.unwrap();
        framed.send("BOOT OK".to_string()).await.unwrap();
        framed.send("CURRENT_BALANCE:1500".to_string()).await.unwrap();

        let due = framed.next().await.unwrap().unwrap();
        let status = framed.next().await.unwrap().unwrap();
        (due, status)
    });

    let mut link = StreamLink::connect(addr, Duration::from_secs(1)).await.unwrap();

    assert_eq!(link.receive_line(deadline(1000)).await.unwrap(), "PLATE:RAB123A");
    let balance = link
        .receive_line_matching(|l| l.starts_with("CURRENT_BALANCE:"), deadline(1000))
        .await
        .unwrap();
    assert_eq!(balance, "CURRENT_BALANCE:1500");

    link.send_message(&HostMessage::Due(400)).await.unwrap();
    link.send_message(&HostMessage::Status(SettlementStatus::Paid))
        .await
        .unwrap();

    let (due, status) = device.await.unwrap();
    assert_eq!(due, "DUE:400");
    assert_eq!(status, "STATUS:PAID");
}

#[tokio::test]
async fn test_bridge_disconnect_is_closed() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        drop(stream);
    });

    let mut link = StreamLink::connect(addr, Duration::from_secs(1)).await.unwrap();
    let result = link.receive_line(deadline(1000)).await;

    assert!(matches!(result, Err(LinkError::Closed) | Err(LinkError::Io(_))));
}

#[tokio::test]
async fn test_silent_bridge_times_out() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let (done_tx, done_rx) = tokio::sync::oneshot::channel::<()>();
    tokio::spawn(async move {
        let (_stream, _) = listener.accept().await.unwrap();
        let _ = done_rx.await;
    });

    let mut link = StreamLink::connect(addr, Duration::from_secs(1)).await.unwrap();
    let result = link.receive_line(deadline(100)).await;

    assert!(matches!(result, Err(LinkError::Timeout { .. })));
    let _ = done_tx.send(());
}
