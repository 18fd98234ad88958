//! End-to-end transfers over the in-memory link with injected faults.
//!
//! Every test runs on a paused tokio clock, so retransmission timeouts elapse
//! instantly once both endpoints are idle and the outcome is deterministic.

use std::time::Duration;

use gbn_arq::frame::TEARDOWN_ACK;
use gbn_arq::simulator::{memory_link, FaultPlan, FaultRule, FaultyChannel};
use gbn_arq::{Receiver, Sender, TransferConfig, TransferError, TransferReport};

fn config() -> TransferConfig {
    TransferConfig {
        window: 4,
        max_chunk: 16,
        rto: Duration::from_millis(50),
        max_rto: Duration::from_millis(400),
        ..TransferConfig::default()
    }
}

fn message(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 + 3) as u8).collect()
}

/// Run a sender and a receiver to completion.
///
/// `data_faults` applies to frames the sender emits, `ack_faults` to
/// acknowledgments the receiver emits.
async fn transfer(
    message: Vec<u8>,
    config: TransferConfig,
    data_faults: FaultPlan,
    ack_faults: FaultPlan,
) -> (Result<TransferReport, TransferError>, Result<Vec<u8>, TransferError>) {
    let (tx_side, rx_side) = memory_link();
    let tx_side = FaultyChannel::new(tx_side, data_faults);
    let rx_side = FaultyChannel::new(rx_side, ack_faults);

    let sender = tokio::spawn(Sender::new(tx_side, config.clone()).transmit(message));
    let receiver = tokio::spawn(Receiver::new(rx_side, config).receive());

    let (sent, received) = tokio::join!(sender, receiver);
    (sent.unwrap(), received.unwrap())
}

async fn clean_transfer(message: Vec<u8>, config: TransferConfig) -> (TransferReport, Vec<u8>) {
    let (sent, received) = transfer(message, config, FaultPlan::lossless(), FaultPlan::lossless()).await;
    (sent.expect("sender"), received.expect("receiver"))
}

// ---------------------------------------------------------------------------
// Lossless channel
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn hello_single_frame() {
    let config = TransferConfig { window: 10, ..TransferConfig::default() };
    let (report, received) = clean_transfer(b"hello".to_vec(), config).await;

    assert_eq!(received, b"hello");
    assert_eq!(report.frames, 1);
    // seq 0 and the teardown frame.
    assert_eq!(report.datagrams_sent, 2);
    assert_eq!(report.retransmissions, 0);
}

#[tokio::test(start_paused = true)]
async fn round_trip_various_lengths() {
    for len in [0, 1, 12, 13, 28, 29, 100, 1000] {
        let original = message(len);
        let (_, received) = clean_transfer(original.clone(), config()).await;
        assert_eq!(received, original, "len {len}");
    }
}

#[tokio::test(start_paused = true)]
async fn window_never_exceeds_capacity() {
    let (report, received) = clean_transfer(message(2000), config()).await;
    assert_eq!(received.len(), 2000);
    assert_eq!(report.peak_in_flight, 4);
}

#[tokio::test(start_paused = true)]
async fn window_of_one_is_stop_and_wait() {
    let config = TransferConfig { window: 1, ..config() };
    let (report, received) = clean_transfer(message(300), config).await;
    assert_eq!(received, message(300));
    assert_eq!(report.peak_in_flight, 1);
}

// ---------------------------------------------------------------------------
// Single faults
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn recovers_from_lost_data_frame() {
    for seq in [0, 1, 5, 12] {
        let original = message(300);
        let data_faults = FaultPlan::lossless().with_rule(FaultRule::drop_seq(seq));
        let (sent, received) = transfer(original.clone(), config(), data_faults, FaultPlan::lossless()).await;

        let report = sent.unwrap();
        assert!(report.retransmissions > 0, "seq {seq}");
        assert_eq!(received.unwrap(), original, "seq {seq}");
    }
}

#[tokio::test(start_paused = true)]
async fn recovers_from_lost_ack() {
    for ack in [0, 3, 9] {
        let original = message(300);
        let ack_faults = FaultPlan::lossless().with_rule(FaultRule::drop_ack(ack));
        let (sent, received) = transfer(original.clone(), config(), FaultPlan::lossless(), ack_faults).await;

        assert!(sent.is_ok(), "ack {ack}");
        assert_eq!(received.unwrap(), original, "ack {ack}");
    }
}

#[tokio::test(start_paused = true)]
async fn lost_last_ack_recovered_by_timer() {
    // 300 bytes in 16-byte chunks: seq 0..=18, so 18 is the last data ack.
    let original = message(300);
    let ack_faults = FaultPlan::lossless().with_rule(FaultRule::drop_ack(18));
    let (sent, received) = transfer(original.clone(), config(), FaultPlan::lossless(), ack_faults).await;

    assert!(sent.unwrap().retransmissions > 0);
    assert_eq!(received.unwrap(), original);
}

#[tokio::test(start_paused = true)]
async fn corrupted_frames_are_retransmitted() {
    let original = message(200);
    let data_faults = FaultPlan::lossless()
        .with_rule(FaultRule::corrupt_seq(0))
        .with_rule(FaultRule::corrupt_seq(4));
    let (sent, received) = transfer(original.clone(), config(), data_faults, FaultPlan::lossless()).await;

    assert!(sent.unwrap().retransmissions > 0);
    assert_eq!(received.unwrap(), original);
}

#[tokio::test(start_paused = true)]
async fn duplicated_datagrams_are_harmless() {
    let original = message(500);
    let dupes = FaultPlan {
        duplicate_rate: 1.0,
        ..FaultPlan::lossless()
    };
    let (sent, received) = transfer(original.clone(), config(), dupes.clone(), dupes).await;
    assert!(sent.is_ok());
    assert_eq!(received.unwrap(), original);
}

// ---------------------------------------------------------------------------
// Random faults
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn survives_random_loss_and_corruption() {
    for seed in 1..=5u64 {
        let original = message(3000);
        let plan = |seed| FaultPlan {
            loss_rate: 0.15,
            corrupt_rate: 0.05,
            duplicate_rate: 0.05,
            seed,
            rules: Vec::new(),
        };
        let (sent, received) = transfer(original.clone(), config(), plan(seed), plan(seed + 100)).await;
        assert!(sent.is_ok(), "seed {seed}: {sent:?}");
        assert_eq!(received.unwrap(), original, "seed {seed}");
    }
}

// ---------------------------------------------------------------------------
// Teardown
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn teardown_survives_burst_minus_one_losses() {
    let config = config();
    let ack_faults =
        FaultPlan::lossless().with_rule(FaultRule::drop_ack(TEARDOWN_ACK).times(config.teardown_burst - 1));
    let (sent, received) = transfer(message(64), config, FaultPlan::lossless(), ack_faults).await;

    assert!(sent.is_ok());
    assert_eq!(received.unwrap(), message(64));
}

#[tokio::test(start_paused = true)]
async fn lost_burst_reported_as_unconfirmed_teardown() {
    let config = TransferConfig { teardown_retries: 2, ..config() };
    let ack_faults = FaultPlan::lossless().with_rule(FaultRule::drop_ack(TEARDOWN_ACK).times(usize::MAX));
    let (sent, received) = transfer(message(64), config, FaultPlan::lossless(), ack_faults).await;

    // The receiver has everything; only the sender is left in doubt.
    assert_eq!(received.unwrap(), message(64));
    match sent {
        Err(TransferError::TeardownNotConfirmed { attempts }) => assert_eq!(attempts, 3),
        other => panic!("expected TeardownNotConfirmed, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn lingering_receiver_answers_teardown_retry() {
    let config = TransferConfig {
        linger: Duration::from_secs(2),
        ..config()
    };
    let ack_faults =
        FaultPlan::lossless().with_rule(FaultRule::drop_ack(TEARDOWN_ACK).times(config.teardown_burst));
    let (sent, received) = transfer(message(64), config, FaultPlan::lossless(), ack_faults).await;

    assert!(sent.unwrap().retransmissions >= 1);
    assert_eq!(received.unwrap(), message(64));
}

// ---------------------------------------------------------------------------
// Give-up paths
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn dead_link_exhausts_retries() {
    let (tx_side, rx_side) = memory_link();
    let tx_side = FaultyChannel::new(tx_side, FaultPlan::lossy(1.0, 0));
    let config = TransferConfig { max_retries: 4, ..config() };

    let receiver = tokio::spawn(Receiver::new(rx_side, config.clone()).receive());
    let err = Sender::new(tx_side, config)
        .transmit(message(100))
        .await
        .unwrap_err();
    assert!(matches!(err, TransferError::RetriesExhausted { base: 0 }), "{err}");

    assert!(!receiver.is_finished());
    receiver.abort();
}

#[tokio::test(start_paused = true)]
async fn oversized_chunk_rejected_by_both_sides() {
    let config = TransferConfig { max_chunk: 70_000, ..config() };
    let (a, b) = memory_link();
    assert!(matches!(
        Sender::new(a, config.clone()).transmit(b"x".to_vec()).await,
        Err(TransferError::Config(_))
    ));
    assert!(matches!(Receiver::new(b, config).receive().await, Err(TransferError::Config(_))));
}
