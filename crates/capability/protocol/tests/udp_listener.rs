mod support;

use gateway_protocol::{MobilogixProtocol, TransportKind, UdpServer};
use std::sync::Arc;
use std::time::Duration;
use support::{eventually, fixture, next_position};
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn remotes_are_separate_logical_connections() {
    let mut fx = fixture();
    let server = UdpServer::bind(
        Arc::new(MobilogixProtocol::new()),
        "127.0.0.1:0",
        fx.context.clone(),
    )
    .await
    .expect("bind");
    let addr = server.local_addr().expect("addr");
    let shutdown = CancellationToken::new();
    let handle = tokio::spawn(server.run(shutdown.clone()));

    let a = UdpSocket::bind("127.0.0.1:0").await.expect("bind a");
    let b = UdpSocket::bind("127.0.0.1:0").await.expect("bind b");

    // 半帧留在 a 的缓冲中，不影响 b
    a.send_to(b"ID123,10.0,", addr).await.expect("send");
    b.send_to(b"[2024-05-01 08:00:00,T1,1,V1.2,201951132031]", addr)
        .await
        .expect("send");

    let mut ack = [0u8; 64];
    let (n, from) = tokio::time::timeout(Duration::from_secs(2), b.recv_from(&mut ack))
        .await
        .expect("ack timeout")
        .expect("recv");
    assert_eq!(from, addr);
    assert_eq!(&ack[..n], b"[2024-05-01 08:00:00,S1,1]");

    a.send_to(b"20.0,5]", addr).await.expect("send");
    let position = next_position(&mut fx.positions).await;
    assert_eq!((position.device_id, position.latitude, position.longitude), (1, 10.0, 20.0));

    assert!(eventually(|| fx.sessions.len() == 2).await);
    let sessions = fx.sessions.sessions();
    assert!(sessions.iter().all(|s| s.transport == TransportKind::Udp));
    assert_eq!(sessions[0].remote, a.local_addr().expect("a"));
    assert_eq!(sessions[1].remote, b.local_addr().expect("b"));
    assert_ne!(sessions[0].channel_id, sessions[1].channel_id);

    shutdown.cancel();
    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("server stops")
        .expect("join")
        .expect("run");
    assert!(fx.sessions.is_empty());
}
