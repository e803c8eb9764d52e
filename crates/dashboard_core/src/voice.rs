use std::{
    collections::VecDeque,
    sync::Arc,
    time::{Duration, Instant},
};

use tokio::{
    sync::{
        broadcast::{self, error::RecvError},
        Mutex,
    },
    task::JoinHandle,
    time::MissedTickBehavior,
};
use tracing::{debug, info, warn};
use voice_link::{
    decode_pcm16, encode_pcm16, playback_duration, SpeakerRole, VoiceChannel,
    VoiceChannelConnector, VoiceEvent, VoiceLinkOptions,
};

use crate::{config::Settings, error::VoiceLinkError, DashboardEvent};

const PLAYBACK_TICK: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceStatus {
    Idle,
    Connecting,
    Listening,
    Speaking,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptEntry {
    pub role: SpeakerRole,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SegmentId(pub u64);

/// Audio placed on the playback timeline, which starts when the link is
/// created.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledSegment {
    pub id: SegmentId,
    pub start_at: Duration,
    pub duration: Duration,
    pub samples: Vec<f32>,
}

impl ScheduledSegment {
    pub fn end_at(&self) -> Duration {
        self.start_at + self.duration
    }
}

pub trait AudioOutput: Send + Sync {
    fn schedule(&self, segment: &ScheduledSegment);
    fn cancel(&self, id: SegmentId);
}

pub struct SilentAudioOutput;

impl AudioOutput for SilentAudioOutput {
    fn schedule(&self, _segment: &ScheduledSegment) {}

    fn cancel(&self, _id: SegmentId) {}
}

#[derive(Debug, Default)]
pub struct PlaybackScheduler {
    next_start: Duration,
    next_id: u64,
    active: Vec<(SegmentId, Duration)>,
}

impl PlaybackScheduler {
    /// Queues `samples` right after whatever is already scheduled, or at
    /// `now` if the queue has drained.
    pub fn schedule(
        &mut self,
        samples: Vec<f32>,
        sample_rate: u32,
        now: Duration,
    ) -> ScheduledSegment {
        self.next_id += 1;
        let start_at = self.next_start.max(now);
        let duration = playback_duration(samples.len(), sample_rate);
        self.next_start = start_at + duration;

        let segment = ScheduledSegment {
            id: SegmentId(self.next_id),
            start_at,
            duration,
            samples,
        };
        self.active.push((segment.id, segment.end_at()));
        segment
    }

    /// Forgets every scheduled segment and resets the timeline cursor.
    pub fn cancel_all(&mut self) -> Vec<SegmentId> {
        self.next_start = Duration::ZERO;
        self.active.drain(..).map(|(id, _)| id).collect()
    }

    pub fn retire_finished(&mut self, now: Duration) {
        self.active.retain(|(_, end_at)| *end_at > now);
    }

    pub fn is_playing(&self) -> bool {
        !self.active.is_empty()
    }

    pub fn next_start(&self) -> Duration {
        self.next_start
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoiceUpdate {
    Status(VoiceStatus),
    Transcript(TranscriptEntry),
}

#[derive(Debug)]
pub struct VoiceLinkSession {
    status: VoiceStatus,
    attempt: u64,
    transcript: VecDeque<TranscriptEntry>,
    retention: usize,
    output_sample_rate: u32,
    playback: PlaybackScheduler,
}

impl VoiceLinkSession {
    pub fn new(retention: usize, output_sample_rate: u32) -> Self {
        Self {
            status: VoiceStatus::Idle,
            attempt: 0,
            transcript: VecDeque::with_capacity(retention),
            retention,
            output_sample_rate,
            playback: PlaybackScheduler::default(),
        }
    }

    pub fn status(&self) -> VoiceStatus {
        self.status
    }

    pub fn transcript(&self) -> impl Iterator<Item = &TranscriptEntry> {
        self.transcript.iter()
    }

    pub fn playback(&self) -> &PlaybackScheduler {
        &self.playback
    }

    pub fn begin_connect(&mut self) -> Result<u64, VoiceLinkError> {
        if self.status != VoiceStatus::Idle {
            return Err(VoiceLinkError::AlreadyActive);
        }
        self.attempt += 1;
        self.status = VoiceStatus::Connecting;
        Ok(self.attempt)
    }

    /// False when the attempt was stopped or replaced while connecting.
    pub fn connected(&mut self, attempt: u64) -> bool {
        if self.status != VoiceStatus::Connecting || self.attempt != attempt {
            return false;
        }
        self.status = VoiceStatus::Listening;
        true
    }

    pub fn connect_failed(&mut self, attempt: u64) -> bool {
        if self.status != VoiceStatus::Connecting || self.attempt != attempt {
            return false;
        }
        self.status = VoiceStatus::Idle;
        true
    }

    pub fn apply(
        &mut self,
        event: VoiceEvent,
        now: Duration,
        output: &dyn AudioOutput,
    ) -> Vec<VoiceUpdate> {
        if !matches!(self.status, VoiceStatus::Listening | VoiceStatus::Speaking) {
            debug!(?event, "voice: dropping event for inactive link");
            return Vec::new();
        }

        let mut updates = Vec::new();
        match event {
            VoiceEvent::Audio(frame) => {
                let samples = match decode_pcm16(&frame.data_b64) {
                    Ok(samples) => samples,
                    Err(err) => {
                        warn!("voice: dropping undecodable audio fragment: {err}");
                        return updates;
                    }
                };
                let rate = sample_rate_from_mime(&frame.mime_type).unwrap_or(self.output_sample_rate);
                let segment = self.playback.schedule(samples, rate, now);
                output.schedule(&segment);
                self.set_status(VoiceStatus::Speaking, &mut updates);
            }
            VoiceEvent::Transcript { role, text } => {
                let entry = TranscriptEntry { role, text };
                self.transcript.push_back(entry.clone());
                while self.transcript.len() > self.retention {
                    self.transcript.pop_front();
                }
                updates.push(VoiceUpdate::Transcript(entry));
            }
            VoiceEvent::Interrupted => {
                let cancelled = self.playback.cancel_all();
                debug!(cancelled = cancelled.len(), "voice: playback interrupted");
                for id in cancelled {
                    output.cancel(id);
                }
                self.set_status(VoiceStatus::Listening, &mut updates);
            }
            VoiceEvent::Closed => {
                if self.shutdown(output) {
                    updates.push(VoiceUpdate::Status(VoiceStatus::Idle));
                }
            }
        }
        updates
    }

    /// Retires finished segments; returns the new status if playback drained.
    pub fn tick(&mut self, now: Duration) -> Option<VoiceStatus> {
        self.playback.retire_finished(now);
        if self.status == VoiceStatus::Speaking && !self.playback.is_playing() {
            self.status = VoiceStatus::Listening;
            return Some(self.status);
        }
        None
    }

    /// Cancels pending playback and goes idle from any state. The transcript
    /// is kept. Returns whether the status changed.
    pub fn shutdown(&mut self, output: &dyn AudioOutput) -> bool {
        for id in self.playback.cancel_all() {
            output.cancel(id);
        }
        let was_idle = self.status == VoiceStatus::Idle;
        self.status = VoiceStatus::Idle;
        !was_idle
    }

    fn set_status(&mut self, status: VoiceStatus, updates: &mut Vec<VoiceUpdate>) {
        if self.status != status {
            self.status = status;
            updates.push(VoiceUpdate::Status(status));
        }
    }
}

fn sample_rate_from_mime(mime_type: &str) -> Option<u32> {
    mime_type
        .split(';')
        .filter_map(|param| param.trim().strip_prefix("rate="))
        .find_map(|rate| rate.parse().ok())
}

struct ActiveVoiceChannel {
    channel: Arc<dyn VoiceChannel>,
    event_task: JoinHandle<()>,
}

/// Owns the live channel and the single task that consumes its events.
/// Lock order is `session` then `active`.
pub struct VoiceLink {
    connector: Arc<dyn VoiceChannelConnector>,
    output: Arc<dyn AudioOutput>,
    voice_name: String,
    input_sample_rate: u32,
    output_sample_rate: u32,
    origin: Instant,
    session: Mutex<VoiceLinkSession>,
    active: Mutex<Option<ActiveVoiceChannel>>,
    events: broadcast::Sender<DashboardEvent>,
}

impl VoiceLink {
    pub fn new(
        settings: &Settings,
        connector: Arc<dyn VoiceChannelConnector>,
        output: Arc<dyn AudioOutput>,
        events: broadcast::Sender<DashboardEvent>,
    ) -> Arc<Self> {
        Arc::new(Self {
            connector,
            output,
            voice_name: settings.voice_name.clone(),
            input_sample_rate: settings.voice_input_sample_rate,
            output_sample_rate: settings.voice_output_sample_rate,
            origin: Instant::now(),
            session: Mutex::new(VoiceLinkSession::new(
                settings.transcript_retention,
                settings.voice_output_sample_rate,
            )),
            active: Mutex::new(None),
            events,
        })
    }

    pub async fn status(&self) -> VoiceStatus {
        self.session.lock().await.status()
    }

    pub async fn transcript(&self) -> Vec<TranscriptEntry> {
        self.session.lock().await.transcript().cloned().collect()
    }

    pub async fn start(self: &Arc<Self>, system_instruction: String) -> Result<(), VoiceLinkError> {
        let attempt = self.session.lock().await.begin_connect()?;
        self.publish(VoiceUpdate::Status(VoiceStatus::Connecting));

        let options = VoiceLinkOptions {
            system_instruction,
            voice_name: self.voice_name.clone(),
            input_sample_rate: self.input_sample_rate,
            output_sample_rate: self.output_sample_rate,
        };
        let channel = match self.connector.connect(options).await {
            Ok(channel) => channel,
            Err(err) => {
                warn!("voice: connect failed: {err:#}");
                if self.session.lock().await.connect_failed(attempt) {
                    self.publish(VoiceUpdate::Status(VoiceStatus::Idle));
                }
                return Err(VoiceLinkError::Connect(format!("{err:#}")));
            }
        };

        let events = channel.subscribe_events();
        let previous = {
            let mut session = self.session.lock().await;
            if !session.connected(attempt) {
                drop(session);
                debug!(attempt, "voice: link stopped while connecting");
                if let Err(err) = channel.close().await {
                    warn!("voice: failed to close superseded channel: {err:#}");
                }
                return Err(VoiceLinkError::Superseded);
            }
            let task = self.spawn_event_task(events);
            self.active.lock().await.replace(ActiveVoiceChannel {
                channel,
                event_task: task,
            })
        };
        if let Some(previous) = previous {
            previous.event_task.abort();
        }

        info!(attempt, voice = %self.voice_name, "voice: link established");
        self.publish(VoiceUpdate::Status(VoiceStatus::Listening));
        Ok(())
    }

    /// Safe from any state. Scheduled playback is cancelled, not drained.
    pub async fn stop(&self) {
        let (changed, active) = {
            let mut session = self.session.lock().await;
            let changed = session.shutdown(self.output.as_ref());
            (changed, self.active.lock().await.take())
        };

        if let Some(active) = active {
            active.event_task.abort();
            if let Err(err) = active.channel.close().await {
                warn!("voice: failed to close channel: {err:#}");
            }
        }

        if changed {
            info!("voice: link stopped");
            self.publish(VoiceUpdate::Status(VoiceStatus::Idle));
        }
    }

    pub async fn send_audio(&self, samples: &[f32]) -> Result<(), VoiceLinkError> {
        let channel = self
            .active
            .lock()
            .await
            .as_ref()
            .map(|active| Arc::clone(&active.channel))
            .ok_or(VoiceLinkError::NotActive)?;

        channel
            .send_audio(encode_pcm16(samples, self.input_sample_rate))
            .await
            .map_err(|err| VoiceLinkError::Send(format!("{err:#}")))
    }

    pub async fn tick(&self) {
        let now = self.playback_clock();
        let changed = self.session.lock().await.tick(now);
        if let Some(status) = changed {
            self.publish(VoiceUpdate::Status(status));
        }
    }

    async fn handle_event(&self, event: VoiceEvent) {
        let closing = event == VoiceEvent::Closed;
        let now = self.playback_clock();
        let updates = {
            let mut session = self.session.lock().await;
            let updates = session.apply(event, now, self.output.as_ref());
            if closing {
                // the channel is already gone; drop our handle without aborting
                let _ = self.active.lock().await.take();
            }
            updates
        };
        if closing {
            info!("voice: channel closed by remote");
        }
        for update in updates {
            self.publish(update);
        }
    }

    fn spawn_event_task(self: &Arc<Self>, mut events: broadcast::Receiver<VoiceEvent>) -> JoinHandle<()> {
        let link = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(PLAYBACK_TICK);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    received = events.recv() => match received {
                        Ok(event) => {
                            let closing = event == VoiceEvent::Closed;
                            link.handle_event(event).await;
                            if closing {
                                break;
                            }
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(skipped, "voice: event stream lagged");
                            // an interruption may be among the skipped events
                            link.handle_event(VoiceEvent::Interrupted).await;
                        }
                        Err(RecvError::Closed) => {
                            link.handle_event(VoiceEvent::Closed).await;
                            break;
                        }
                    },
                    _ = ticker.tick() => link.tick().await,
                }
            }
        })
    }

    fn playback_clock(&self) -> Duration {
        self.origin.elapsed()
    }

    fn publish(&self, update: VoiceUpdate) {
        let event = match update {
            VoiceUpdate::Status(status) => DashboardEvent::VoiceStatusChanged(status),
            VoiceUpdate::Transcript(entry) => DashboardEvent::VoiceTranscript(entry),
        };
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
#[path = "tests/voice_tests.rs"]
mod tests;
