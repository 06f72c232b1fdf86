//! End-to-end transfers through an in-process accelerator

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use ycc_dsp::WorkerKind;
use ycc_host::{run_transfer, HostError, HostSession, TransferConfig, HOST_POOL_INDEX};
use ycc_kernel::{convert_in_place, EdgePolicy};
use ycc_link::{
    Link, LinkError, PoolId, Timeout, FROM_ACCELERATOR, MAX_PROCESSORS, TO_ACCELERATOR,
};
use ycc_proc::{LocalProcessor, ProcError, ProcState, Processor};

fn config(buffer_size: usize, worker: WorkerKind, edge_policy: EdgePolicy) -> TransferConfig {
    TransferConfig {
        buffer_size,
        worker,
        edge_policy,
        ..TransferConfig::default()
    }
}

fn image(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 % 256) as u8).collect()
}

/// Convert chunk by chunk, as the accelerator sees the stream
fn expected(src: &[u8], chunk: usize, policy: EdgePolicy) -> Vec<u8> {
    let mut out = src.to_vec();
    for c in out.chunks_mut(chunk) {
        convert_in_place(c, policy);
    }
    out
}

fn round_trip(worker: WorkerKind, policy: EdgePolicy) {
    // 384 is a whole number of pixels and already aligned
    let src = image(384 * 4);
    let mut dst = vec![0u8; src.len()];

    let stats = run_transfer(
        LocalProcessor::new(0),
        &config(384, worker, policy),
        &src,
        &mut dst,
    )
    .unwrap();

    assert_eq!(stats.chunks, 4);
    assert_eq!(stats.bytes, src.len() as u64);
    assert_eq!(dst, expected(&src, 384, policy));

    let mut whole = src.clone();
    convert_in_place(&mut whole, policy);
    assert_eq!(dst, whole);
}

#[test]
fn test_blocking_worker_saturate() {
    round_trip(WorkerKind::Blocking, EdgePolicy::Saturate);
}

#[test]
fn test_blocking_worker_wrap() {
    round_trip(WorkerKind::Blocking, EdgePolicy::Wrap);
}

#[test]
fn test_event_worker_saturate() {
    round_trip(WorkerKind::EventDriven, EdgePolicy::Saturate);
}

#[test]
fn test_event_worker_wrap() {
    round_trip(WorkerKind::EventDriven, EdgePolicy::Wrap);
}

#[test]
fn test_edge_pixels() {
    let src = [0u8, 0, 0, 255, 255, 255];
    for (policy, white) in [
        (EdgePolicy::Saturate, [255u8, 130, 130]),
        (EdgePolicy::Wrap, [153, 130, 130]),
    ] {
        let mut dst = [0u8; 6];
        run_transfer(
            LocalProcessor::new(1),
            &TransferConfig {
                processor_id: 1,
                ..config(128, WorkerKind::Blocking, policy)
            },
            &src,
            &mut dst,
        )
        .unwrap();
        assert_eq!(dst[..3], [16u8, 128, 128]);
        assert_eq!(dst[3..], white);
    }
}

#[test]
fn test_partial_last_chunk() {
    // 1000 bytes in 384-byte chunks: 384, 384, 232
    let src = image(1000);
    let mut dst = vec![0u8; src.len()];

    for worker in [WorkerKind::Blocking, WorkerKind::EventDriven] {
        dst.fill(0);
        let stats = run_transfer(
            LocalProcessor::new(2),
            &TransferConfig {
                processor_id: 2,
                ..config(384, worker, EdgePolicy::Saturate)
            },
            &src,
            &mut dst,
        )
        .unwrap();
        assert_eq!(stats.chunks, 3);
        assert_eq!(stats.bytes, 1000);
        assert_eq!(dst, expected(&src, 384, EdgePolicy::Saturate));
    }
}

#[test]
fn test_odd_length_stream() {
    // The last chunk is padded to the 16-bit channel width; the pad byte
    // never reaches the output
    let src = image(131);
    let mut dst = vec![0u8; src.len()];
    let stats = run_transfer(
        LocalProcessor::new(0),
        &config(128, WorkerKind::Blocking, EdgePolicy::Saturate),
        &src,
        &mut dst,
    )
    .unwrap();

    assert_eq!(stats.chunks, 2);
    assert_eq!(stats.bytes, 131);
    assert_eq!(dst, expected(&src, 128, EdgePolicy::Saturate));
}

#[test]
fn test_padded_tail_two_bytes_past_a_pixel() {
    // 261 = 128 + 128 + 5 and 133 = 128 + 5: the five-byte tail is one pixel
    // and two loose bytes, padded to six on the wire
    for len in [261, 133] {
        let src = image(len);
        let mut dst = vec![0u8; len];
        for worker in [WorkerKind::Blocking, WorkerKind::EventDriven] {
            for policy in [EdgePolicy::Saturate, EdgePolicy::Wrap] {
                dst.fill(0);
                let stats = run_transfer(
                    LocalProcessor::new(0),
                    &config(128, worker, policy),
                    &src,
                    &mut dst,
                )
                .unwrap();

                assert_eq!(stats.bytes, len as u64);
                assert_eq!(
                    dst,
                    expected(&src, 128, policy),
                    "{} bytes, {:?}, {:?}",
                    len,
                    worker,
                    policy
                );
                assert_eq!(dst[len - 2..], src[len - 2..]);
            }
        }
    }
}

#[test]
fn test_zero_buffer_size_before_any_channel() {
    let processor = LocalProcessor::new(0);
    let link = processor.link();
    let src = image(30);
    let mut dst = vec![0u8; 30];

    let err = run_transfer(
        processor,
        &config(0, WorkerKind::Blocking, EdgePolicy::Saturate),
        &src,
        &mut dst,
    )
    .unwrap_err();

    assert!(matches!(err, HostError::InvalidArgument(_)));
    assert!(link.channel_ids().is_empty());
}

#[test]
fn test_processor_id_out_of_range() {
    let cfg = TransferConfig {
        processor_id: MAX_PROCESSORS,
        ..TransferConfig::default()
    };
    let src = image(30);
    let mut dst = vec![0u8; 30];
    assert!(matches!(
        run_transfer(LocalProcessor::new(MAX_PROCESSORS), &cfg, &src, &mut dst),
        Err(HostError::InvalidArgument(_))
    ));
}

#[test]
fn test_session_states_and_teardown() {
    let processor = LocalProcessor::new(3);
    let link = processor.link();
    let cfg = TransferConfig {
        processor_id: 3,
        ..config(128, WorkerKind::EventDriven, EdgePolicy::Saturate)
    };
    let src = image(256);
    let mut dst = vec![0u8; 256];

    let mut session = HostSession::create(processor, cfg, src.len()).unwrap();
    assert_eq!(session.processor().state(), ProcState::Loaded);
    assert_eq!(session.processor().config().unwrap().iterations, 2);

    session.execute(&src, &mut dst).unwrap();
    assert_eq!(session.processor().state(), ProcState::Running);

    let report = session.delete();
    assert!(report.is_clean(), "{:?}", report.failures);
    assert!(link.channel_ids().is_empty());
    assert!(!link.pools().is_open(PoolId::make(3, HOST_POOL_INDEX)));
}

/// Accelerator that never runs: it accepts every lifecycle call and
/// consumes nothing from the channels
struct StalledProcessor {
    link: Arc<Link>,
    calls: Arc<Mutex<Vec<&'static str>>>,
}

impl StalledProcessor {
    fn new() -> (Self, Arc<Mutex<Vec<&'static str>>>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let processor = Self {
            link: Arc::new(Link::new(0)),
            calls: calls.clone(),
        };
        (processor, calls)
    }

    fn log(&self, call: &'static str) -> Result<(), ProcError> {
        self.calls.lock().push(call);
        Ok(())
    }
}

impl Processor for StalledProcessor {
    fn id(&self) -> u8 {
        0
    }

    fn link(&self) -> Arc<Link> {
        self.link.clone()
    }

    fn attach(&mut self) -> Result<(), ProcError> {
        self.log("attach")
    }

    fn load(&mut self, _executable: &str, _args: &[String]) -> Result<(), ProcError> {
        self.log("load")
    }

    fn start(&mut self) -> Result<(), ProcError> {
        self.log("start")
    }

    fn stop(&mut self) -> Result<(), ProcError> {
        self.log("stop")
    }

    fn detach(&mut self) -> Result<(), ProcError> {
        self.log("detach")
    }
}

#[test]
fn test_outbound_timeout_aborts_loop() {
    let cfg = TransferConfig {
        reclaim_timeout: Timeout::After(Duration::from_millis(20)),
        ..config(128, WorkerKind::Blocking, EdgePolicy::Saturate)
    };
    let src = image(512);
    let mut dst = vec![0u8; 512];

    let (processor, calls) = StalledProcessor::new();
    let link = processor.link();
    let mut session = HostSession::create(processor, cfg, src.len()).unwrap();
    let err = session.execute(&src, &mut dst).unwrap_err();

    assert!(matches!(
        err,
        HostError::Channel(LinkError::Timeout(TO_ACCELERATOR))
    ));
    assert_eq!(session.stats().chunks, 0);
    assert!(dst.iter().all(|&b| b == 0));
    assert_eq!(link.channel_ids(), vec![TO_ACCELERATOR, FROM_ACCELERATOR]);

    // The chunk left in the outbound channel goes back to the pool on delete
    let report = session.delete();
    assert!(report.is_clean(), "{:?}", report.failures);
    assert!(link.channel_ids().is_empty());
    assert!(!link.pools().is_open(PoolId::make(0, HOST_POOL_INDEX)));
    assert_eq!(
        *calls.lock(),
        vec!["attach", "load", "start", "stop", "detach"]
    );
}

#[test]
fn test_unexecuted_session_skips_stop() {
    let (processor, calls) = StalledProcessor::new();
    let session = HostSession::create(processor, TransferConfig::default(), 10).unwrap();
    assert_eq!(*calls.lock(), vec!["attach", "load"]);

    assert!(session.delete().is_clean());
    assert_eq!(*calls.lock(), vec!["attach", "load", "detach"]);
}
