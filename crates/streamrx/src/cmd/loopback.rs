use serde::Serialize;
use streamrx_telemetry::StatsAggregate;

use crate::cmd::LoopbackArgs;
use crate::exit::{CliResult, SUCCESS, TIMEOUT};
use crate::output::{print_json, print_table, OutputFormat};

#[derive(Debug, Serialize)]
struct LoopbackReport {
    frames_sent: u32,
    video_rendered: u32,
    audio_rendered: u32,
    complete: bool,
    video_stages: Vec<String>,
    audio_stages: Vec<String>,
    stats: StatsAggregate,
}

#[cfg(unix)]
pub fn run(args: LoopbackArgs, format: OutputFormat) -> CliResult<i32> {
    use crate::cmd::{load_session, parse_duration, runtime};

    if args.frames == 0 {
        return Err(crate::exit::CliError::new(
            crate::exit::USAGE,
            "--frames must be greater than zero",
        ));
    }
    let timeout = parse_duration(&args.timeout)?;
    let session = load_session(args.session.as_deref())?;
    let runtime = runtime()?;
    let report = runtime.block_on(session::run(
        args.frames,
        args.offload_audio,
        session,
        timeout,
    ))?;

    print_report(&report, format);
    Ok(if report.complete { SUCCESS } else { TIMEOUT })
}

#[cfg(not(unix))]
pub fn run(_args: LoopbackArgs, _format: OutputFormat) -> CliResult<i32> {
    Err(crate::exit::CliError::new(
        crate::exit::USAGE,
        "loopback requires Unix domain sockets",
    ))
}

fn print_report(report: &LoopbackReport, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(report),
        OutputFormat::Table => {
            let rtt = report
                .stats
                .rtt
                .map(|rtt| format!("{:.1} ms", rtt.rtt_ms))
                .unwrap_or_else(|| "-".to_string());
            print_table(
                &["STREAM", "SENT", "RENDERED", "STAGES"],
                vec![
                    vec![
                        "video".to_string(),
                        report.frames_sent.to_string(),
                        report.video_rendered.to_string(),
                        report.video_stages.join(" -> "),
                    ],
                    vec![
                        "audio".to_string(),
                        report.frames_sent.to_string(),
                        report.audio_rendered.to_string(),
                        report.audio_stages.join(" -> "),
                    ],
                ],
            );
            println!(
                "rtt: {rtt}  stats records: {}  ignored: {}",
                report.stats.records, report.stats.ignored
            );
        }
        OutputFormat::Pretty => {
            println!(
                "video {}/{} audio {}/{} complete={}",
                report.video_rendered,
                report.frames_sent,
                report.audio_rendered,
                report.frames_sent,
                report.complete
            );
            if let Some(transport) = &report.stats.transport {
                println!(
                    "transport: {} messages in, {} bytes in, {} dropped",
                    transport.messages_in, transport.bytes_in, transport.dropped
                );
            }
        }
    }
}

#[cfg(unix)]
mod session {
    use std::os::unix::net::UnixStream;
    use std::sync::Arc;
    use std::time::Duration;

    use bytes::Bytes;
    use streamrx_frame::{
        encode_packet, ByteBuffer, EncodedUnit, FrameType, MediaKind, HOST_AUDIO, HOST_VIDEO,
        STATS,
    };
    use streamrx_pipeline::{
        frame_renderer, track_renderer, Environment, ExecutionContext, PipeSpec, Pipeline,
        PipelineBuilder, Probe, SessionParams, StageConfig, StageRegistry, AUDIO_DECODE, DECODE,
        DEPACKETIZE, TRACK_GENERATE,
    };
    use streamrx_telemetry::{spawn_telemetry, RttStats, StatsRecord, TelemetryConfig, VideoStats};
    use streamrx_transport::{
        connect_unix, Channel, ChannelAttributes, ChannelReceiver, CloseReason, DataChannel,
        HostStream, SessionTransport, TransportConfig, TransportKind,
    };
    use streamrx_worker::{default_factory, WorkerClient, WorkerConfig, WorkerOffload};
    use tokio::task::JoinHandle;
    use tracing::{debug, info};

    use super::LoopbackReport;
    use crate::exit::{
        frame_error, io_error, pipeline_error, transport_error, CliError, CliResult, INTERNAL,
    };

    const KEY_INTERVAL: u32 = 30;

    pub async fn run(
        frames: u32,
        offload_audio: bool,
        params: SessionParams,
        timeout: Duration,
    ) -> CliResult<LoopbackReport> {
        let (host_end, client_end) =
            UnixStream::pair().map_err(|err| io_error("socket pair failed", err))?;
        let (host, host_pump) = connect_unix(host_end, TransportConfig::default())
            .map_err(|err| transport_error("host transport failed", err))?;
        let (client, client_pump) = connect_unix(client_end, TransportConfig::default())
            .map_err(|err| transport_error("client transport failed", err))?;

        let telemetry = spawn_telemetry(&client, TelemetryConfig::default())
            .map_err(|err| transport_error("telemetry failed", err))?;

        let registry = StageRegistry::with_builtin_stages();
        let environment = Environment::full(ExecutionContext::Main);
        let client_worker = offload_audio
            .then(|| WorkerClient::spawn(default_factory(), WorkerConfig::default()));
        let probe = Probe::new(&registry, &environment);
        let support = match &client_worker {
            Some(worker) => probe.with_worker(worker).probe_all().await,
            None => probe.probe_all().await,
        };
        let builder = PipelineBuilder::new(&registry, &environment)
            .with_support(&support)
            .with_offload(Arc::new(WorkerOffload::default()));

        let (video_terminal, mut video_sink) = track_renderer();
        let video_specs = [DEPACKETIZE, DECODE, TRACK_GENERATE].map(PipeSpec::stage);
        let mut video = builder
            .build(video_terminal, &video_specs)
            .map_err(|err| pipeline_error("video pipeline rejected", err))?;

        let (audio_terminal, mut audio_sink) = frame_renderer();
        let audio_specs = if offload_audio {
            vec![PipeSpec::worker([DEPACKETIZE, AUDIO_DECODE])]
        } else {
            vec![PipeSpec::stage(DEPACKETIZE), PipeSpec::stage(AUDIO_DECODE)]
        };
        let mut audio = builder
            .build(audio_terminal, &audio_specs)
            .map_err(|err| pipeline_error("audio pipeline rejected", err))?;

        video
            .setup(&StageConfig::video(params.clone()))
            .await
            .map_err(|err| pipeline_error("video setup failed", err))?;
        audio
            .setup(&StageConfig::audio(params.clone()))
            .await
            .map_err(|err| pipeline_error("audio setup failed", err))?;

        let video_stages = video.stage_names().to_vec();
        let audio_stages = audio.stage_names().to_vec();

        let video_rx = subscribe(
            client
                .setup_host_video(&[TransportKind::Track, TransportKind::Data])
                .map_err(|err| transport_error("host video unavailable", err))?,
        )?;
        let audio_rx = subscribe(
            client
                .setup_host_audio(&[TransportKind::Track, TransportKind::Data])
                .map_err(|err| transport_error("host audio unavailable", err))?,
        )?;
        let video_feed = feed(video, video_rx);
        let audio_feed = feed(audio, audio_rx);

        send_media(&host, frames, &params)?;

        let mut video_rendered = 0u32;
        let mut audio_rendered = 0u32;
        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);
        while video_rendered < frames || audio_rendered < frames {
            tokio::select! {
                _ = &mut deadline => {
                    debug!(video_rendered, audio_rendered, "loopback timed out");
                    break;
                }
                frame = video_sink.recv(), if video_rendered < frames => match frame {
                    Some(_) => video_rendered += 1,
                    None => break,
                },
                frame = audio_sink.recv(), if audio_rendered < frames => match frame {
                    Some(_) => audio_rendered += 1,
                    None => break,
                },
            }
        }

        // Closing the client ends every subscription, which ends the feeds.
        client.close(CloseReason::Disconnect);
        for feed in [video_feed, audio_feed] {
            if let Ok(mut pipeline) = feed.await {
                pipeline.cleanup().await;
            }
        }
        let stats = telemetry.stop().await;
        host.close(CloseReason::Disconnect);
        let _ = tokio::task::spawn_blocking(move || {
            let _ = host_pump.join();
            let _ = client_pump.join();
        })
        .await;

        info!(video_rendered, audio_rendered, frames, "loopback finished");
        Ok(LoopbackReport {
            frames_sent: frames,
            video_rendered,
            audio_rendered,
            complete: video_rendered == frames && audio_rendered == frames,
            video_stages,
            audio_stages,
            stats,
        })
    }

    fn subscribe(stream: HostStream) -> CliResult<ChannelReceiver> {
        match stream {
            HostStream::Data(channel) => channel
                .subscribe()
                .map_err(|err| transport_error("subscribe failed", err)),
            HostStream::Track(channel) => Err(CliError::new(
                INTERNAL,
                format!("unexpected track carrier for channel {}", channel.id()),
            )),
        }
    }

    /// Submit every payload from `rx` to `pipeline` until the channel closes.
    fn feed(mut pipeline: Pipeline, mut rx: ChannelReceiver) -> JoinHandle<Pipeline> {
        tokio::spawn(async move {
            while let Some(packet) = rx.recv().await {
                pipeline.submit_packet(packet).await;
            }
            pipeline
        })
    }

    /// Play the host: media on the host channels and stats records on STATS.
    fn send_media(host: &SessionTransport, frames: u32, params: &SessionParams) -> CliResult<()> {
        let config = host.config().clone();
        let video = open(host, HOST_VIDEO, config.host_video)?;
        let audio = open(host, HOST_AUDIO, config.host_audio)?;
        let stats = open(host, STATS, ChannelAttributes::RELIABLE_ORDERED)?;

        let video_step = StageConfig::video(params.clone()).frame_duration_us();
        let audio_step = StageConfig::audio(params.clone()).frame_duration_us();
        for i in 0..frames {
            let frame_type = if i % KEY_INTERVAL == 0 {
                FrameType::Key
            } else {
                FrameType::Delta
            };
            let video_packet = packet(
                MediaKind::Video,
                Some(frame_type),
                u64::from(i) * video_step / 1000,
                Bytes::from(format!("video-{i}")),
            )?;
            send(&video, &video_packet)?;
            let audio_packet = packet(
                MediaKind::Audio,
                None,
                u64::from(i) * audio_step / 1000,
                Bytes::from(format!("audio-{i}")),
            )?;
            send(&audio, &audio_packet)?;

            if i % 10 == 0 {
                let rtt = StatsRecord::Rtt(RttStats {
                    rtt_ms: 4.0 + f64::from(i % 7),
                    rtt_variance_ms: 0.5,
                });
                send(&stats, &stats_frame(rtt)?)?;
            }
        }
        let latency = StatsRecord::Video(VideoStats {
            avg_host_processing_latency_ms: 3.2,
            max_host_processing_latency_ms: 6.0,
            min_host_processing_latency_ms: 1.1,
            ..VideoStats::default()
        });
        send(&stats, &stats_frame(latency)?)?;
        Ok(())
    }

    fn open(
        host: &SessionTransport,
        id: u8,
        attributes: ChannelAttributes,
    ) -> CliResult<DataChannel> {
        host.open_channel(id, attributes)
            .map_err(|err| transport_error("host channel failed", err))
    }

    fn send(channel: &DataChannel, payload: &[u8]) -> CliResult<()> {
        channel
            .send(payload)
            .map_err(|err| transport_error("host send failed", err))
    }

    fn packet(
        kind: MediaKind,
        frame_type: Option<FrameType>,
        timestamp_ms: u64,
        payload: Bytes,
    ) -> CliResult<Vec<u8>> {
        let unit = EncodedUnit {
            kind,
            frame_type,
            timestamp_ms,
            duration_us: 0,
            payload,
        };
        let mut buf = ByteBuffer::bulk();
        encode_packet(&unit, &mut buf).map_err(|err| frame_error("encode failed", err))?;
        Ok(buf.written().to_vec())
    }

    fn stats_frame(record: StatsRecord) -> CliResult<Vec<u8>> {
        let mut buf = ByteBuffer::bulk();
        record
            .encode(&mut buf)
            .map_err(|err| CliError::new(INTERNAL, format!("stats encode failed: {err}")))?;
        Ok(buf.written().to_vec())
    }
}
