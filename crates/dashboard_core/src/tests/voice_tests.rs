use super::*;

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Mutex as StdMutex,
};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use voice_link::AudioFrame;

use crate::collaborators::MissingVoiceConnector;

#[derive(Default)]
struct RecordingOutput {
    scheduled: StdMutex<Vec<SegmentId>>,
    cancelled: StdMutex<Vec<SegmentId>>,
}

impl AudioOutput for RecordingOutput {
    fn schedule(&self, segment: &ScheduledSegment) {
        self.scheduled.lock().expect("lock").push(segment.id);
    }

    fn cancel(&self, id: SegmentId) {
        self.cancelled.lock().expect("lock").push(id);
    }
}

struct FakeChannel {
    events: broadcast::Sender<VoiceEvent>,
    sent: StdMutex<Vec<AudioFrame>>,
    closed: AtomicBool,
}

#[async_trait]
impl VoiceChannel for FakeChannel {
    async fn send_audio(&self, frame: AudioFrame) -> Result<()> {
        self.sent.lock().expect("lock").push(frame);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn subscribe_events(&self) -> broadcast::Receiver<VoiceEvent> {
        self.events.subscribe()
    }
}

struct FakeConnector {
    channel: Arc<FakeChannel>,
    options: StdMutex<Option<VoiceLinkOptions>>,
}

impl FakeConnector {
    fn new() -> Arc<Self> {
        let (events, _) = broadcast::channel(16);
        Arc::new(Self {
            channel: Arc::new(FakeChannel {
                events,
                sent: StdMutex::new(Vec::new()),
                closed: AtomicBool::new(false),
            }),
            options: StdMutex::new(None),
        })
    }
}

#[async_trait]
impl VoiceChannelConnector for FakeConnector {
    async fn connect(&self, options: VoiceLinkOptions) -> Result<Arc<dyn VoiceChannel>> {
        self.options.lock().expect("lock").replace(options);
        let channel: Arc<dyn VoiceChannel> = self.channel.clone();
        Ok(channel)
    }
}

struct RefusingConnector;

#[async_trait]
impl VoiceChannelConnector for RefusingConnector {
    async fn connect(&self, _options: VoiceLinkOptions) -> Result<Arc<dyn VoiceChannel>> {
        Err(anyhow!("microphone permission denied"))
    }
}

fn audio(sample_count: usize) -> VoiceEvent {
    VoiceEvent::Audio(encode_pcm16(&vec![0.25; sample_count], 24_000))
}

fn listening_session(retention: usize) -> VoiceLinkSession {
    let mut session = VoiceLinkSession::new(retention, 24_000);
    let attempt = session.begin_connect().expect("idle session connects");
    assert!(session.connected(attempt));
    session
}

async fn wait_for(
    rx: &mut broadcast::Receiver<DashboardEvent>,
    mut matches: impl FnMut(&DashboardEvent) -> bool,
) -> DashboardEvent {
    loop {
        let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("event within timeout")
            .expect("event bus open");
        if matches(&event) {
            return event;
        }
    }
}

#[test]
fn fragments_play_back_to_back() {
    let mut scheduler = PlaybackScheduler::default();
    let first = scheduler.schedule(vec![0.0; 2_400], 24_000, Duration::ZERO);
    let second = scheduler.schedule(vec![0.0; 2_400], 24_000, Duration::from_millis(10));

    assert_eq!(first.start_at, Duration::ZERO);
    assert_eq!(first.duration, Duration::from_millis(100));
    assert_eq!(second.start_at, first.end_at());
    assert_eq!(scheduler.next_start(), Duration::from_millis(200));
}

#[test]
fn drained_queue_starts_at_now() {
    let mut scheduler = PlaybackScheduler::default();
    scheduler.schedule(vec![0.0; 2_400], 24_000, Duration::ZERO);
    let late = scheduler.schedule(vec![0.0; 2_400], 24_000, Duration::from_secs(5));
    assert_eq!(late.start_at, Duration::from_secs(5));
}

#[test]
fn cancel_all_forgets_scheduled_segments() {
    let mut scheduler = PlaybackScheduler::default();
    let first = scheduler.schedule(vec![0.0; 2_400], 24_000, Duration::ZERO);
    let second = scheduler.schedule(vec![0.0; 2_400], 24_000, Duration::ZERO);
    assert!(scheduler.is_playing());

    let cancelled = scheduler.cancel_all();
    assert_eq!(cancelled, vec![first.id, second.id]);
    assert!(!scheduler.is_playing());
    assert_eq!(scheduler.next_start(), Duration::ZERO);
    assert!(scheduler.cancel_all().is_empty());

    let fresh = scheduler.schedule(vec![0.0; 2_400], 24_000, Duration::from_millis(30));
    assert_ne!(fresh.id, second.id);
    assert_eq!(fresh.start_at, Duration::from_millis(30));
}

#[test]
fn audio_moves_listening_link_to_speaking() {
    let output = RecordingOutput::default();
    let mut session = listening_session(11);

    let updates = session.apply(audio(2_400), Duration::ZERO, &output);
    assert_eq!(updates, vec![VoiceUpdate::Status(VoiceStatus::Speaking)]);
    assert_eq!(output.scheduled.lock().expect("lock").len(), 1);

    let updates = session.apply(audio(2_400), Duration::ZERO, &output);
    assert!(updates.is_empty());
    assert_eq!(output.scheduled.lock().expect("lock").len(), 2);
}

#[test]
fn interruption_cancels_every_scheduled_segment() {
    let output = RecordingOutput::default();
    let mut session = listening_session(11);
    session.apply(audio(2_400), Duration::ZERO, &output);
    session.apply(audio(2_400), Duration::ZERO, &output);

    let updates = session.apply(VoiceEvent::Interrupted, Duration::from_millis(20), &output);

    assert_eq!(updates, vec![VoiceUpdate::Status(VoiceStatus::Listening)]);
    assert_eq!(
        *output.cancelled.lock().expect("lock"),
        *output.scheduled.lock().expect("lock")
    );
    assert!(!session.playback().is_playing());
}

#[test]
fn events_are_ignored_unless_connected() {
    let output = RecordingOutput::default();
    let mut session = VoiceLinkSession::new(11, 24_000);

    assert!(session.apply(audio(2_400), Duration::ZERO, &output).is_empty());
    assert!(output.scheduled.lock().expect("lock").is_empty());
    assert_eq!(session.status(), VoiceStatus::Idle);
}

#[test]
fn undecodable_audio_is_dropped() {
    let output = RecordingOutput::default();
    let mut session = listening_session(11);
    let bad = VoiceEvent::Audio(AudioFrame::pcm("not base64!", 24_000));

    assert!(session.apply(bad, Duration::ZERO, &output).is_empty());
    assert_eq!(session.status(), VoiceStatus::Listening);
}

#[test]
fn transcript_keeps_only_most_recent_entries() {
    let output = RecordingOutput::default();
    let mut session = listening_session(2);
    for text in ["one", "two", "three"] {
        session.apply(
            VoiceEvent::Transcript {
                role: SpeakerRole::User,
                text: text.into(),
            },
            Duration::ZERO,
            &output,
        );
    }

    let texts: Vec<_> = session.transcript().map(|entry| entry.text.as_str()).collect();
    assert_eq!(texts, vec!["two", "three"]);
}

#[test]
fn drained_playback_returns_to_listening() {
    let output = RecordingOutput::default();
    let mut session = listening_session(11);
    session.apply(audio(2_400), Duration::ZERO, &output);

    assert_eq!(session.tick(Duration::from_millis(50)), None);
    assert_eq!(session.status(), VoiceStatus::Speaking);
    assert_eq!(
        session.tick(Duration::from_millis(100)),
        Some(VoiceStatus::Listening)
    );
}

#[test]
fn shutdown_while_speaking_cancels_and_keeps_transcript() {
    let output = RecordingOutput::default();
    let mut session = listening_session(11);
    session.apply(
        VoiceEvent::Transcript {
            role: SpeakerRole::Model,
            text: "Stay on the lit path.".into(),
        },
        Duration::ZERO,
        &output,
    );
    session.apply(audio(2_400), Duration::ZERO, &output);

    assert!(session.shutdown(&output));
    assert_eq!(session.status(), VoiceStatus::Idle);
    assert_eq!(output.cancelled.lock().expect("lock").len(), 1);
    assert_eq!(session.transcript().count(), 1);
    assert!(!session.shutdown(&output));
}

#[test]
fn connect_completing_after_stop_is_rejected() {
    let mut session = VoiceLinkSession::new(11, 24_000);
    let attempt = session.begin_connect().expect("connect");
    assert!(matches!(
        session.begin_connect(),
        Err(VoiceLinkError::AlreadyActive)
    ));

    session.shutdown(&SilentAudioOutput);
    assert!(!session.connected(attempt));
    assert_eq!(session.status(), VoiceStatus::Idle);
}

#[test]
fn remote_close_goes_idle() {
    let output = RecordingOutput::default();
    let mut session = listening_session(11);
    let updates = session.apply(VoiceEvent::Closed, Duration::ZERO, &output);
    assert_eq!(updates, vec![VoiceUpdate::Status(VoiceStatus::Idle)]);
}

#[tokio::test]
async fn failed_connect_returns_to_idle() {
    let (events, mut rx) = broadcast::channel(16);
    let link = VoiceLink::new(
        &Settings::default(),
        Arc::new(MissingVoiceConnector),
        Arc::new(SilentAudioOutput),
        events,
    );

    let err = link
        .start("brief".into())
        .await
        .expect_err("missing connector must fail");
    assert!(matches!(err, VoiceLinkError::Connect(_)));
    assert_eq!(link.status().await, VoiceStatus::Idle);

    assert!(matches!(
        rx.recv().await.expect("connecting"),
        DashboardEvent::VoiceStatusChanged(VoiceStatus::Connecting)
    ));
    assert!(matches!(
        rx.recv().await.expect("idle"),
        DashboardEvent::VoiceStatusChanged(VoiceStatus::Idle)
    ));
}

#[tokio::test]
async fn refused_connect_can_be_retried() {
    let (events, _rx) = broadcast::channel(16);
    let link = VoiceLink::new(
        &Settings::default(),
        Arc::new(RefusingConnector),
        Arc::new(SilentAudioOutput),
        events,
    );

    assert!(link.start("brief".into()).await.is_err());
    let err = link.start("brief".into()).await.expect_err("still refused");
    assert!(matches!(err, VoiceLinkError::Connect(message) if message.contains("permission")));
}

#[tokio::test]
async fn live_link_relays_transcript_and_playback() {
    let (events, mut rx) = broadcast::channel(64);
    let connector = FakeConnector::new();
    let output = Arc::new(RecordingOutput::default());
    let link = VoiceLink::new(
        &Settings::default(),
        connector.clone(),
        output.clone(),
        events,
    );

    link.start("Current incidents: none".into())
        .await
        .expect("fake connector connects");
    assert_eq!(link.status().await, VoiceStatus::Listening);
    let options = connector
        .options
        .lock()
        .expect("lock")
        .clone()
        .expect("connect options recorded");
    assert_eq!(options.voice_name, "Puck");
    assert_eq!(options.input_sample_rate, 16_000);

    let remote = connector.channel.events.clone();
    remote
        .send(VoiceEvent::Transcript {
            role: SpeakerRole::Model,
            text: "How can I help?".into(),
        })
        .expect("event task subscribed");
    let event = wait_for(&mut rx, |event| {
        matches!(event, DashboardEvent::VoiceTranscript(_))
    })
    .await;
    assert!(matches!(
        event,
        DashboardEvent::VoiceTranscript(TranscriptEntry { role: SpeakerRole::Model, ref text })
            if text == "How can I help?"
    ));

    remote.send(audio(24_000)).expect("send audio");
    wait_for(&mut rx, |event| {
        matches!(event, DashboardEvent::VoiceStatusChanged(VoiceStatus::Speaking))
    })
    .await;
    assert_eq!(output.scheduled.lock().expect("lock").len(), 1);

    remote.send(VoiceEvent::Interrupted).expect("interrupt");
    wait_for(&mut rx, |event| {
        matches!(event, DashboardEvent::VoiceStatusChanged(VoiceStatus::Listening))
    })
    .await;
    assert_eq!(output.cancelled.lock().expect("lock").len(), 1);

    link.send_audio(&[0.1, -0.1]).await.expect("send mic audio");
    assert_eq!(
        connector.channel.sent.lock().expect("lock")[0].mime_type,
        "audio/pcm;rate=16000"
    );

    link.stop().await;
    assert_eq!(link.status().await, VoiceStatus::Idle);
    assert!(connector.channel.closed.load(Ordering::SeqCst));
    assert!(matches!(
        link.send_audio(&[0.0]).await,
        Err(VoiceLinkError::NotActive)
    ));
    assert_eq!(link.transcript().await.len(), 1);
}

#[tokio::test]
async fn lagged_event_stream_stops_playback() {
    let (events, mut rx) = broadcast::channel(64);
    let connector = FakeConnector::new();
    let output = Arc::new(RecordingOutput::default());
    let link = VoiceLink::new(
        &Settings::default(),
        connector.clone(),
        output.clone(),
        events,
    );
    link.start("brief".into()).await.expect("fake connector connects");

    let remote = connector.channel.events.clone();
    remote.send(audio(240_000)).expect("send audio");
    wait_for(&mut rx, |event| {
        matches!(event, DashboardEvent::VoiceStatusChanged(VoiceStatus::Speaking))
    })
    .await;

    // the burst overruns the channel before the event task wakes, so the
    // interruption itself is overwritten
    remote.send(VoiceEvent::Interrupted).expect("interrupt");
    for n in 0..16 {
        remote
            .send(VoiceEvent::Transcript {
                role: SpeakerRole::User,
                text: format!("line {n}"),
            })
            .expect("transcript");
    }

    wait_for(&mut rx, |event| {
        matches!(event, DashboardEvent::VoiceStatusChanged(VoiceStatus::Listening))
    })
    .await;
    assert_eq!(output.cancelled.lock().expect("lock").len(), 1);
    assert!(!link.session.lock().await.playback().is_playing());

    link.stop().await;
}

#[tokio::test]
async fn second_start_while_active_is_rejected() {
    let (events, _rx) = broadcast::channel(16);
    let link = VoiceLink::new(
        &Settings::default(),
        FakeConnector::new(),
        Arc::new(SilentAudioOutput),
        events,
    );
    link.start("brief".into()).await.expect("first start");
    assert!(matches!(
        link.start("brief".into()).await,
        Err(VoiceLinkError::AlreadyActive)
    ));
    link.stop().await;
}
