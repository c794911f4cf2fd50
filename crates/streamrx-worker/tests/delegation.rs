use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use streamrx_frame::{encode_packet, ByteBuffer, EncodedUnit, FrameType, MediaFrame, MediaKind};
use streamrx_pipeline::{
    frame_renderer, track_renderer, Environment, ExecutionContext, PipeSpec, PipeType,
    PipelineBuilder, Probe, Result as PipelineResult, SessionParams, Stage, StageConfig,
    StageDescriptor, StageRegistry, AUDIO_DECODE, DECODE, DEPACKETIZE, TRACK_GENERATE,
};
use streamrx_worker::{
    spawn_worker, Connector, WorkerClient, WorkerConfig, WorkerFactory, WorkerLink, WorkerOffload,
};
use tokio::sync::mpsc;

type Log = Arc<Mutex<Vec<String>>>;

/// Pass-through stage recording every call it sees.
struct Record {
    base: Box<dyn Stage>,
    log: Log,
}

impl Record {
    fn push(&self, entry: String) {
        self.log.lock().unwrap().push(entry);
    }
}

#[async_trait]
impl Stage for Record {
    fn name(&self) -> &str {
        "Record"
    }

    fn base(&mut self) -> Option<&mut (dyn Stage + 'static)> {
        Some(self.base.as_mut())
    }

    async fn setup(&mut self, config: &StageConfig) -> PipelineResult<()> {
        self.push("setup".to_string());
        self.base.setup(config).await
    }

    async fn cleanup(&mut self) {
        self.push("cleanup".to_string());
        self.base.cleanup().await;
    }

    async fn submit_frame(&mut self, frame: MediaFrame) {
        self.push(format!("frame:{}", frame.timestamp_us));
        self.base.submit_frame(frame).await;
    }
}

fn record_descriptor(log: Log) -> StageDescriptor {
    StageDescriptor::new(
        "Record",
        PipeType::MediaFrame,
        PipeType::MediaFrame,
        move |base, _| {
            Box::new(Record {
                base,
                log: Arc::clone(&log),
            })
        },
    )
}

fn recording_factory(log: Log) -> WorkerFactory {
    Arc::new(move || {
        let mut registry = StageRegistry::new();
        registry
            .register(record_descriptor(Arc::clone(&log)))
            .expect("fresh registry");
        (registry, Environment::new(ExecutionContext::Worker))
    })
}

/// Forward messages one at a time with a pseudo-random delay before each.
fn jittered_relay<T: Send + 'static>(
    mut rx: mpsc::UnboundedReceiver<T>,
    tx: mpsc::UnboundedSender<T>,
    seed: u64,
) {
    tokio::spawn(async move {
        let mut state = seed;
        while let Some(message) = rx.recv().await {
            state = state
                .wrapping_mul(6_364_136_223_846_793_005)
                .wrapping_add(1_442_695_040_888_963_407);
            let delay = Duration::from_micros((state >> 33) % 1_500);
            tokio::time::sleep(delay).await;
            if tx.send(message).is_err() {
                break;
            }
        }
    });
}

fn jittered_connector(factory: WorkerFactory) -> Connector {
    Arc::new(move || {
        let (requests, events) = spawn_worker(factory.clone(), &WorkerConfig::default())?.into_parts();
        let (front_requests, relayed_requests) = mpsc::unbounded_channel();
        let (relayed_events, back_events) = mpsc::unbounded_channel();
        jittered_relay(relayed_requests, requests, 0x5eed);
        jittered_relay(events, relayed_events, 0xfeed);
        Ok(WorkerLink::new(front_requests, back_events))
    })
}

#[tokio::test]
async fn worker_preserves_call_order_under_jitter() {
    let log: Log = Arc::default();
    let mut registry = StageRegistry::new();
    registry.register(record_descriptor(Arc::default())).unwrap();
    let environment = Environment::new(ExecutionContext::Main);
    let offload = WorkerOffload::with_connector(jittered_connector(recording_factory(
        Arc::clone(&log),
    )));

    let (terminal, mut sink) = frame_renderer();
    let mut pipeline = PipelineBuilder::new(&registry, &environment)
        .with_offload(Arc::new(offload))
        .build(terminal, &[PipeSpec::worker(["Record"])])
        .unwrap();
    assert_eq!(pipeline.stage_names()[0], "Worker(Record)");

    pipeline
        .setup(&StageConfig::video(SessionParams::default()))
        .await
        .unwrap();
    for i in 0..100u64 {
        pipeline
            .submit_frame(MediaFrame::new(MediaKind::Video, i, 1, Bytes::new()))
            .await;
    }

    for i in 0..100u64 {
        let frame = tokio::time::timeout(Duration::from_secs(5), sink.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(frame.timestamp_us, i);
    }

    pipeline.cleanup().await;
    tokio::time::timeout(Duration::from_secs(5), async {
        while !log.lock().unwrap().iter().any(|entry| entry == "cleanup") {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    let mut expected = vec!["setup".to_string()];
    expected.extend((0..100).map(|i| format!("frame:{i}")));
    expected.push("cleanup".to_string());
    assert_eq!(*log.lock().unwrap(), expected);
}

fn packet(kind: MediaKind, frame_type: Option<FrameType>, ms: u64, payload: &'static [u8]) -> Bytes {
    let unit = EncodedUnit {
        kind,
        frame_type,
        timestamp_ms: ms,
        duration_us: 0,
        payload: Bytes::from_static(payload),
    };
    let mut buf = ByteBuffer::bulk();
    encode_packet(&unit, &mut buf).unwrap();
    Bytes::copy_from_slice(buf.written())
}

#[tokio::test]
async fn audio_offloaded_while_video_stays_local() {
    let registry = StageRegistry::with_builtin_stages();
    let environment = Environment::full(ExecutionContext::Main);
    let client = WorkerClient::spawn(
        streamrx_worker::default_factory(),
        WorkerConfig::default(),
    );
    let support = Probe::new(&registry, &environment)
        .with_worker(&client)
        .probe_all()
        .await;
    assert!(support.supports(AUDIO_DECODE, ExecutionContext::Worker));
    assert!(!support.supports(TRACK_GENERATE, ExecutionContext::Worker));

    let offload = Arc::new(WorkerOffload::default());

    let (audio_terminal, mut audio_out) = frame_renderer();
    let mut audio = PipelineBuilder::new(&registry, &environment)
        .with_support(&support)
        .with_offload(offload.clone())
        .build(
            audio_terminal,
            &[PipeSpec::worker([DEPACKETIZE, AUDIO_DECODE])],
        )
        .unwrap();

    let (video_terminal, mut video_out) = track_renderer();
    let video_specs: Vec<PipeSpec> = [DEPACKETIZE, DECODE, TRACK_GENERATE]
        .into_iter()
        .map(PipeSpec::stage)
        .collect();
    let mut video = PipelineBuilder::new(&registry, &environment)
        .with_support(&support)
        .with_offload(offload)
        .build(video_terminal, &video_specs)
        .unwrap();

    audio
        .setup(&StageConfig::audio(SessionParams::default()))
        .await
        .unwrap();
    video
        .setup(&StageConfig::video(SessionParams::default()))
        .await
        .unwrap();

    audio
        .submit_packet(packet(MediaKind::Audio, None, 20, b"opus"))
        .await;
    video
        .submit_packet(packet(MediaKind::Video, Some(FrameType::Key), 40, b"idr"))
        .await;

    let sound = tokio::time::timeout(Duration::from_secs(5), audio_out.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(sound.kind, MediaKind::Audio);
    assert_eq!(sound.timestamp_us, 20_000);
    assert_eq!(sound.duration_us, 10_000);

    let picture = tokio::time::timeout(Duration::from_secs(5), video_out.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(picture.kind, MediaKind::Video);
    assert_eq!(picture.data.as_ref(), b"idr");

    audio.on_user_interaction().await;
    tokio::time::timeout(Duration::from_secs(5), async {
        while audio_out.interactions() == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    audio.cleanup().await;
    video.cleanup().await;
}

#[tokio::test]
async fn failing_worker_setup_surfaces_as_setup_error() {
    let registry = StageRegistry::with_builtin_stages();
    let environment = Environment::full(ExecutionContext::Main);
    // The worker has no stages registered, so createPipeline fails there.
    let offload = WorkerOffload::new(
        Arc::new(|| (StageRegistry::new(), Environment::new(ExecutionContext::Worker))),
        WorkerConfig::default(),
    );
    let (terminal, _frames) = frame_renderer();
    let mut pipeline = PipelineBuilder::new(&registry, &environment)
        .with_offload(Arc::new(offload))
        .build(terminal, &[PipeSpec::worker([DEPACKETIZE, AUDIO_DECODE])])
        .unwrap();

    let err = pipeline
        .setup(&StageConfig::audio(SessionParams::default()))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Worker"), "{err}");
    pipeline.cleanup().await;
}
