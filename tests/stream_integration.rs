// Broadcast transport properties over live loopback connections.

use biostream::codec::read_chunk;
use biostream::{
    query_info, subscribe, BroadcastServer, Chunk, ControlMessage, MetadataPublisher, SignalInfo,
};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const CHANNELS: usize = 2;

fn numbered_chunk(k: u32) -> Chunk {
    let base = k as f32 * 100.0;
    Chunk::new(CHANNELS, vec![base, base + 1.0, base + 2.0, base + 3.0]).unwrap()
}

async fn start_server() -> (
    BroadcastServer,
    mpsc::UnboundedReceiver<ControlMessage>,
    u16,
    CancellationToken,
) {
    let cancel = CancellationToken::new();
    let mut server = BroadcastServer::bind("test", "127.0.0.1", 0, cancel.clone())
        .await
        .unwrap();
    let control_rx = server.start().unwrap();
    let port = server.local_addr().port();
    (server, control_rx, port, cancel)
}

async fn wait_for_subscribers(server: &BroadcastServer, n: usize) {
    for _ in 0..100 {
        if server.subscriber_count().await == n {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!(
        "subscriber count never reached {n}, at {}",
        server.subscriber_count().await
    );
}

async fn recv_chunk(stream: &mut TcpStream) -> Chunk {
    tokio::time::timeout(Duration::from_secs(5), read_chunk(stream, CHANNELS))
        .await
        .expect("timed out waiting for a chunk")
        .unwrap()
        .expect("stream closed early")
}

#[tokio::test]
async fn every_subscriber_receives_the_same_ordered_sequence() {
    let (server, _control, port, _cancel) = start_server().await;

    let mut subs = Vec::new();
    for _ in 0..3 {
        subs.push(subscribe("127.0.0.1", port, "").await.unwrap());
    }
    wait_for_subscribers(&server, 3).await;

    let sent: Vec<Chunk> = (0..5).map(numbered_chunk).collect();
    for chunk in &sent {
        assert_eq!(server.broadcast(chunk).await, 3);
    }

    for stream in subs.iter_mut() {
        for expected in &sent {
            assert_eq!(&recv_chunk(stream).await, expected);
        }
    }

    server.close().await;
}

#[tokio::test]
async fn join_during_active_broadcast_does_not_disturb_existing_subscribers() {
    let (server, _control, port, _cancel) = start_server().await;

    let mut first = subscribe("127.0.0.1", port, "").await.unwrap();
    wait_for_subscribers(&server, 1).await;
    server.broadcast(&numbered_chunk(0)).await;

    let mut late = subscribe("127.0.0.1", port, "").await.unwrap();
    wait_for_subscribers(&server, 2).await;
    server.broadcast(&numbered_chunk(1)).await;

    assert_eq!(recv_chunk(&mut first).await, numbered_chunk(0));
    assert_eq!(recv_chunk(&mut first).await, numbered_chunk(1));
    // The late joiner sees only what was broadcast after it attached.
    assert_eq!(recv_chunk(&mut late).await, numbered_chunk(1));

    server.close().await;
}

#[tokio::test]
async fn one_failed_subscriber_does_not_stop_the_broadcast() {
    let (server, _control, port, _cancel) = start_server().await;

    let mut survivor = subscribe("127.0.0.1", port, "").await.unwrap();
    let doomed = subscribe("127.0.0.1", port, "").await.unwrap();
    wait_for_subscribers(&server, 2).await;

    drop(doomed);

    // The dead connection may absorb a few writes before the failure
    // surfaces; keep broadcasting until it is pruned.
    let mut sent = Vec::new();
    for k in 0..50 {
        let chunk = numbered_chunk(k);
        server.broadcast(&chunk).await;
        sent.push(chunk);
        if server.subscriber_count().await == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(server.subscriber_count().await, 1, "failed subscriber not pruned");

    // The survivor got every chunk, in order.
    for expected in &sent {
        assert_eq!(&recv_chunk(&mut survivor).await, expected);
    }

    // And new subscribers can still join.
    let mut late = subscribe("127.0.0.1", port, "").await.unwrap();
    wait_for_subscribers(&server, 2).await;
    server.broadcast(&numbered_chunk(99)).await;
    assert_eq!(recv_chunk(&mut late).await, numbered_chunk(99));

    server.close().await;
}

#[tokio::test]
async fn control_strings_are_forwarded_to_the_owning_node() {
    let (server, mut control, port, _cancel) = start_server().await;

    let _plain = subscribe("127.0.0.1", port, "").await.unwrap();
    let _tuned = subscribe("127.0.0.1", port, "FILTERS/hp8/lp30").await.unwrap();
    wait_for_subscribers(&server, 2).await;

    let mut received = Vec::new();
    for _ in 0..2 {
        let msg = tokio::time::timeout(Duration::from_secs(5), control.recv())
            .await
            .unwrap()
            .unwrap();
        received.push(msg.text);
    }
    received.sort();
    assert_eq!(received, vec!["".to_string(), "FILTERS/hp8/lp30".to_string()]);

    server.close().await;
}

#[tokio::test]
async fn metadata_then_chunks_describe_the_same_stream() {
    // A subscriber that learns the stream shape from the metadata channel
    // decodes broadcast chunks with it, byte for byte.
    let info = SignalInfo {
        sample_rate: 500.0,
        channels: vec!["C1".into(), "C2".into()],
        chunk_size: 4,
        device: "simulated".into(),
    };
    let cancel = CancellationToken::new();
    let publisher = MetadataPublisher::bind("127.0.0.1", 0, &info).await.unwrap();
    let info_port = publisher.local_addr().unwrap().port();
    tokio::spawn(publisher.serve(cancel.clone()));

    let (server, _control, data_port, _cancel) = start_server().await;

    let learned = query_info("127.0.0.1", info_port).await.unwrap();
    assert_eq!(learned, info);

    let mut stream = subscribe("127.0.0.1", data_port, "").await.unwrap();
    wait_for_subscribers(&server, 1).await;

    let chunk = Chunk::new(
        learned.num_channels(),
        vec![0.5, -0.5, 1.5, -1.5, 2.5, -2.5, 3.5, -3.5],
    )
    .unwrap();
    assert_eq!(chunk.rows(), learned.chunk_size);
    server.broadcast(&chunk).await;

    let received = tokio::time::timeout(
        Duration::from_secs(5),
        read_chunk(&mut stream, learned.num_channels()),
    )
    .await
    .unwrap()
    .unwrap()
    .unwrap();
    assert_eq!(received, chunk);

    cancel.cancel();
    server.close().await;
}

#[tokio::test]
async fn close_is_idempotent_and_releases_the_port() {
    let (server, _control, port, _cancel) = start_server().await;
    let _sub = subscribe("127.0.0.1", port, "").await.unwrap();
    wait_for_subscribers(&server, 1).await;

    server.close().await;
    server.close().await;
    assert_eq!(server.subscriber_count().await, 0);

    // The acceptor has let go of the port.
    for _ in 0..100 {
        if tokio::net::TcpListener::bind(("127.0.0.1", port)).await.is_ok() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("port {port} still bound after close");
}
