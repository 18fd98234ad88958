//! Transfers over real loopback UDP sockets.
//!
//! Sender and receiver are spawned as separate tokio tasks so they can make
//! progress concurrently without blocking each other.

use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::time::timeout;

use gbn_arq::simulator::{FaultPlan, FaultyChannel};
use gbn_arq::{Receiver, Sender, TransferConfig, UdpChannel};

/// Bind a socket to an OS-assigned port on loopback.
async fn ephemeral() -> UdpSocket {
    UdpSocket::bind("127.0.0.1:0").await.expect("bind failed")
}

/// Build the two channels of a link: four sockets, one per direction and
/// endpoint, mirroring two unidirectional flows.
async fn udp_link() -> (UdpChannel, UdpChannel) {
    let sender_in = ephemeral().await;
    let receiver_in = ephemeral().await;
    let to_receiver = receiver_in.local_addr().unwrap();
    let to_sender = sender_in.local_addr().unwrap();
    (
        UdpChannel::from_sockets(sender_in, ephemeral().await, to_receiver),
        UdpChannel::from_sockets(receiver_in, ephemeral().await, to_sender),
    )
}

fn config() -> TransferConfig {
    TransferConfig {
        rto: Duration::from_millis(40),
        max_rto: Duration::from_millis(320),
        ..TransferConfig::default()
    }
}

#[tokio::test]
async fn test_udp_hello() {
    let (tx, rx) = udp_link().await;

    let receiver = tokio::spawn(Receiver::new(rx, config()).receive());
    let sender = tokio::spawn(Sender::new(tx, config()).transmit(b"hello".to_vec()));

    let (sent, received) = timeout(Duration::from_secs(5), async { tokio::join!(sender, receiver) })
        .await
        .expect("transfer timed out");

    let report = sent.unwrap().expect("sender");
    assert_eq!(report.frames, 1);
    assert_eq!(received.unwrap().expect("receiver"), b"hello");
}

#[tokio::test]
async fn test_udp_multi_window_message() {
    // 50 000 bytes in 988-byte chunks: 51 frames, five windows' worth.
    let message: Vec<u8> = (0..50_000u32).map(|i| (i % 253) as u8).collect();
    let (tx, rx) = udp_link().await;

    let receiver = tokio::spawn(Receiver::new(rx, config()).receive());
    let sender = tokio::spawn(Sender::new(tx, config()).transmit(message.clone()));

    let (sent, received) = timeout(Duration::from_secs(10), async { tokio::join!(sender, receiver) })
        .await
        .expect("transfer timed out");

    let report = sent.unwrap().expect("sender");
    assert_eq!(report.frames, 51);
    assert!(report.peak_in_flight <= 10);
    assert_eq!(received.unwrap().expect("receiver"), message);
}

#[tokio::test]
async fn test_udp_lossy_link() {
    let message: Vec<u8> = (0..100_000u32).map(|i| (i * 13 % 256) as u8).collect();
    let (tx, rx) = udp_link().await;
    let tx = FaultyChannel::new(tx, FaultPlan::lossy(0.1, 42));
    let rx = FaultyChannel::new(rx, FaultPlan::lossy(0.1, 43));

    let receiver = tokio::spawn(Receiver::new(rx, config()).receive());
    let sender = tokio::spawn(Sender::new(tx, config()).transmit(message.clone()));

    let (sent, received) = timeout(Duration::from_secs(20), async { tokio::join!(sender, receiver) })
        .await
        .expect("transfer timed out");

    assert!(sent.unwrap().expect("sender").retransmissions > 0);
    assert_eq!(received.unwrap().expect("receiver"), message);
}
