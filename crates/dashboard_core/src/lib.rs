use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Utc};
use shared::{
    domain::{ChatMessage, Coordinate, Incident, IncidentId, SafetyStatus},
    error::ErrorNotice,
};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};
use voice_link::VoiceChannelConnector;

pub mod collaborators;
pub mod config;
pub mod conversation;
pub mod emergency;
pub mod error;
pub mod mock;
pub mod seed;
pub mod store;
pub mod voice;

pub use collaborators::{
    AlertDispatcher, ConversationAgent, DraftGenerator, GeolocationProvider, IncidentAnalyst,
    SafetyAssessor,
};
pub use config::{load_settings, Settings};
pub use conversation::ConversationSession;
pub use emergency::{EmergencyDraftFlow, EmergencyState};
pub use error::{ChatError, EmergencyError, StoreError, VoiceLinkError};
pub use store::{Horizon, IncidentStore};
pub use voice::{AudioOutput, TranscriptEntry, VoiceLink, VoiceStatus};

const EVENT_CAPACITY: usize = 256;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Clone)]
pub enum DashboardEvent {
    IncidentsChanged { total: usize },
    LocationChanged(Coordinate),
    HorizonChanged(u32),
    SafetyStatusUpdated(SafetyStatus),
    ChatMessageAppended(ChatMessage),
    ChatBusyChanged(bool),
    EmergencyStateChanged(EmergencyState),
    VoiceStatusChanged(VoiceStatus),
    VoiceTranscript(TranscriptEntry),
    Failure(ErrorNotice),
}

pub struct Collaborators {
    pub safety_assessor: Arc<dyn SafetyAssessor>,
    pub conversation_agent: Arc<dyn ConversationAgent>,
    pub draft_generator: Arc<dyn DraftGenerator>,
    pub alert_dispatcher: Arc<dyn AlertDispatcher>,
    pub incident_analyst: Arc<dyn IncidentAnalyst>,
    pub geolocation: Arc<dyn GeolocationProvider>,
    pub voice_connector: Arc<dyn VoiceChannelConnector>,
    pub audio_output: Arc<dyn AudioOutput>,
}

impl Collaborators {
    /// Canned services for every seam except voice and geolocation, which
    /// have no offline stand-in.
    pub fn mocked() -> Self {
        Self {
            safety_assessor: Arc::new(mock::MockSafetyAssessor),
            conversation_agent: Arc::new(mock::MockConversationAgent),
            draft_generator: Arc::new(mock::MockDraftGenerator),
            alert_dispatcher: Arc::new(mock::LoggingAlertDispatcher),
            incident_analyst: Arc::new(mock::MockIncidentAnalyst),
            geolocation: Arc::new(collaborators::MissingGeolocation),
            voice_connector: Arc::new(collaborators::MissingVoiceConnector),
            audio_output: Arc::new(voice::SilentAudioOutput),
        }
    }

    pub fn missing() -> Self {
        Self {
            safety_assessor: Arc::new(collaborators::MissingSafetyAssessor),
            conversation_agent: Arc::new(collaborators::MissingConversationAgent),
            draft_generator: Arc::new(collaborators::MissingDraftGenerator),
            alert_dispatcher: Arc::new(collaborators::MissingAlertDispatcher),
            incident_analyst: Arc::new(collaborators::MissingIncidentAnalyst),
            geolocation: Arc::new(collaborators::MissingGeolocation),
            voice_connector: Arc::new(collaborators::MissingVoiceConnector),
            audio_output: Arc::new(voice::SilentAudioOutput),
        }
    }
}

struct DashboardState {
    store: IncidentStore,
    conversation: ConversationSession,
    emergency: EmergencyDraftFlow,
    horizon: Horizon,
    safety_status: Option<SafetyStatus>,
    safety_generation: u64,
}

/// Owns every piece of dashboard state. The inner lock is never held across
/// a collaborator call.
pub struct Dashboard {
    settings: Settings,
    collaborators: Collaborators,
    clock: Arc<dyn Clock>,
    inner: Mutex<DashboardState>,
    voice: Arc<VoiceLink>,
    events: broadcast::Sender<DashboardEvent>,
}

impl Dashboard {
    pub fn new(settings: Settings, collaborators: Collaborators) -> Arc<Self> {
        Self::with_clock(settings, collaborators, Arc::new(SystemClock))
    }

    pub fn with_clock(
        settings: Settings,
        collaborators: Collaborators,
        clock: Arc<dyn Clock>,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let max_hours = settings.max_horizon_hours;
        let horizon = match Horizon::new(settings.default_horizon_hours, max_hours) {
            Ok(horizon) => horizon,
            Err(err) => {
                warn!("clamping configured default horizon: {err}");
                Horizon::clamped(settings.default_horizon_hours, max_hours)
            }
        };
        let voice = VoiceLink::new(
            &settings,
            Arc::clone(&collaborators.voice_connector),
            Arc::clone(&collaborators.audio_output),
            events.clone(),
        );

        Arc::new(Self {
            inner: Mutex::new(DashboardState {
                store: IncidentStore::new(settings.default_location()),
                conversation: ConversationSession::new(),
                emergency: EmergencyDraftFlow::new(),
                horizon,
                safety_status: None,
                safety_generation: 0,
            }),
            settings,
            collaborators,
            clock,
            voice,
            events,
        })
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<DashboardEvent> {
        self.events.subscribe()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn voice(&self) -> &Arc<VoiceLink> {
        &self.voice
    }

    /// Replaces the store contents with the campus patrol history.
    pub async fn seed_history(&self, now: DateTime<Utc>) -> usize {
        let history = seed::campus_history(&self.settings.campus_locations, now);
        self.seed(history).await
    }

    pub async fn seed(&self, incidents: Vec<Incident>) -> usize {
        let total = {
            let mut state = self.inner.lock().await;
            state.store.seed(incidents);
            state.store.len()
        };
        info!(total, "incident store seeded");
        self.publish(DashboardEvent::IncidentsChanged { total });
        self.refresh_quietly().await;
        total
    }

    pub async fn add_incidents(&self, batch: Vec<Incident>) -> usize {
        if batch.is_empty() {
            return self.inner.lock().await.store.len();
        }
        let total = {
            let mut state = self.inner.lock().await;
            state.store.add_incidents(batch);
            state.store.len()
        };
        self.publish(DashboardEvent::IncidentsChanged { total });
        self.refresh_quietly().await;
        total
    }

    /// Resolves the user position. A denied or unusable fix falls back to the
    /// configured default without surfacing an error.
    pub async fn locate(&self) -> Coordinate {
        let position = match self.collaborators.geolocation.current_position().await {
            Ok(position) if position.is_finite() => position,
            Ok(position) => {
                warn!(%position, "geolocation returned a non-finite fix, using default");
                self.settings.default_location()
            }
            Err(err) => {
                warn!("geolocation unavailable, using default: {err:#}");
                self.settings.default_location()
            }
        };

        {
            let mut state = self.inner.lock().await;
            if let Err(err) = state.store.record_user_location(position) {
                warn!("ignoring located position: {err}");
                return state.store.user_location();
            }
        }
        self.publish(DashboardEvent::LocationChanged(position));
        self.refresh_quietly().await;
        position
    }

    pub async fn record_user_location(&self, coord: Coordinate) -> Result<(), StoreError> {
        self.inner.lock().await.store.record_user_location(coord)?;
        self.publish(DashboardEvent::LocationChanged(coord));
        self.refresh_quietly().await;
        Ok(())
    }

    pub async fn user_location(&self) -> Coordinate {
        self.inner.lock().await.store.user_location()
    }

    pub async fn set_horizon(&self, hours: u32) -> Result<(), StoreError> {
        let horizon = Horizon::new(hours, self.settings.max_horizon_hours)?;
        self.inner.lock().await.horizon = horizon;
        debug!(hours, "horizon changed");
        self.publish(DashboardEvent::HorizonChanged(hours));
        self.refresh_quietly().await;
        Ok(())
    }

    pub async fn horizon(&self) -> Horizon {
        self.inner.lock().await.horizon
    }

    /// Incidents inside the horizon at the clock's current time, newest
    /// batch first.
    pub async fn visible_incidents(&self) -> Vec<Incident> {
        let now = self.clock.now();
        let state = self.inner.lock().await;
        state.store.visible_newest_first(state.horizon, now)
    }

    pub async fn incident(&self, id: &IncidentId) -> Option<Incident> {
        self.inner.lock().await.store.get(id).cloned()
    }

    pub async fn safety_status(&self) -> Option<SafetyStatus> {
        self.inner.lock().await.safety_status.clone()
    }

    /// Recomputes the safety status from the current view. Returns `Ok(None)`
    /// when a newer refresh started while this one was waiting.
    pub async fn refresh_safety_status(&self) -> anyhow::Result<Option<SafetyStatus>> {
        let now = self.clock.now();
        let (generation, filtered, location) = {
            let mut state = self.inner.lock().await;
            state.safety_generation += 1;
            (
                state.safety_generation,
                state.store.filtered_by_horizon(state.horizon, now),
                state.store.user_location(),
            )
        };

        let outcome = IncidentStore::recompute_safety_status(
            self.collaborators.safety_assessor.as_ref(),
            &filtered,
            location,
        )
        .await;

        let mut state = self.inner.lock().await;
        if state.safety_generation != generation {
            debug!(generation, "discarding stale safety status");
            return Ok(None);
        }
        match outcome {
            Ok(status) => {
                state.safety_status = Some(status.clone());
                drop(state);
                debug!(
                    score = status.score,
                    incidents = filtered.len(),
                    "safety status updated"
                );
                self.publish(DashboardEvent::SafetyStatusUpdated(status.clone()));
                Ok(Some(status))
            }
            Err(err) => {
                drop(state);
                warn!("safety assessment failed: {err:#}");
                self.publish(DashboardEvent::Failure(ErrorNotice::collaborator(format!(
                    "safety assessment failed: {err:#}"
                ))));
                Err(err).context("failed to refresh safety status")
            }
        }
    }

    /// Sends one query to the agent. A second query while the first is in
    /// flight is rejected with [`ChatError::Busy`]. Agent failures land in the
    /// transcript as a single agent message, so they are not returned here.
    ///
    /// The session stays busy until this future completes. A caller that drops
    /// it early must call [`Dashboard::abandon_chat`] to accept new queries.
    pub async fn submit_chat(&self, query: &str) -> Result<(), ChatError> {
        let now = self.clock.now();
        let (pending, user_message) = {
            let mut state = self.inner.lock().await;
            let location = state.store.user_location();
            let pending = state.conversation.begin(query, location, now)?;
            let user_message = state.conversation.transcript().last().cloned();
            (pending, user_message)
        };
        if let Some(message) = user_message {
            self.publish(DashboardEvent::ChatMessageAppended(message));
        }
        self.publish(DashboardEvent::ChatBusyChanged(true));
        debug!(request_id = pending.request_id, "chat request sent");

        let outcome = self
            .collaborators
            .conversation_agent
            .chat(&pending.query, pending.location)
            .await;

        let (resolution, total) = {
            let mut state = self.inner.lock().await;
            let resolution = match state.conversation.resolve(&pending, outcome, self.clock.now()) {
                Ok(resolution) => resolution,
                Err(ChatError::Stale { request_id }) => {
                    debug!(request_id, "chat reply dropped");
                    return Ok(());
                }
                Err(err) => return Err(err),
            };
            let added = !resolution.resources.is_empty();
            if added {
                state.store.add_incidents(resolution.resources.clone());
            }
            (resolution, added.then(|| state.store.len()))
        };

        self.publish(DashboardEvent::ChatMessageAppended(resolution.reply));
        self.publish(DashboardEvent::ChatBusyChanged(false));
        if let Some(total) = total {
            info!(
                resources = resolution.resources.len(),
                total, "verified resources added from chat"
            );
            self.publish(DashboardEvent::IncidentsChanged { total });
            self.refresh_quietly().await;
        }
        Ok(())
    }

    /// Gives up on the outstanding chat request. Its reply, if it still
    /// arrives, is discarded.
    pub async fn abandon_chat(&self) -> bool {
        let abandoned = self.inner.lock().await.conversation.abandon();
        if abandoned {
            self.publish(DashboardEvent::ChatBusyChanged(false));
        }
        abandoned
    }

    pub async fn chat_transcript(&self) -> Vec<ChatMessage> {
        self.inner.lock().await.conversation.transcript().to_vec()
    }

    pub async fn is_chat_busy(&self) -> bool {
        self.inner.lock().await.conversation.is_busy()
    }

    /// Moves the user location onto the incident.
    pub async fn focus_incident(&self, id: &IncidentId) -> Result<Coordinate, StoreError> {
        let location = {
            let mut state = self.inner.lock().await;
            let location = state
                .store
                .get(id)
                .map(Incident::location)
                .ok_or_else(|| StoreError::UnknownIncident(id.clone()))?;
            state.store.record_user_location(location)?;
            location
        };
        debug!(incident_id = %id, "focused incident");
        self.publish(DashboardEvent::LocationChanged(location));
        self.refresh_quietly().await;
        Ok(location)
    }

    pub async fn analyze_incident(&self, id: &IncidentId) -> anyhow::Result<String> {
        let incident = self
            .incident(id)
            .await
            .ok_or_else(|| StoreError::UnknownIncident(id.clone()))?;
        match self.collaborators.incident_analyst.analyze(&incident).await {
            Ok(analysis) => Ok(analysis),
            Err(err) => {
                warn!(incident_id = %id, "incident analysis failed: {err:#}");
                self.publish(DashboardEvent::Failure(ErrorNotice::collaborator(format!(
                    "incident analysis failed: {err:#}"
                ))));
                Err(err).with_context(|| format!("failed to analyze incident {id}"))
            }
        }
    }

    /// Asks the draft generator for an alert and parks it for confirmation.
    pub async fn trigger_emergency(&self) -> Result<String, EmergencyError> {
        let (ticket, drafting) = {
            let mut state = self.inner.lock().await;
            let ticket = state.emergency.begin_draft()?;
            (ticket, state.emergency.state().clone())
        };
        info!("emergency draft requested");
        self.publish(DashboardEvent::EmergencyStateChanged(drafting));

        let outcome = self
            .collaborators
            .draft_generator
            .draft(&self.settings.emergency_trigger_message)
            .await;

        let (result, current) = {
            let mut state = self.inner.lock().await;
            let result = state.emergency.draft_ready(ticket, outcome);
            (result, state.emergency.state().clone())
        };
        match result {
            Ok(draft) => {
                self.publish(DashboardEvent::EmergencyStateChanged(current));
                Ok(draft)
            }
            Err(EmergencyError::Stale) => Err(EmergencyError::Stale),
            Err(err) => {
                warn!("emergency draft failed: {err}");
                self.publish(DashboardEvent::EmergencyStateChanged(current));
                self.publish(DashboardEvent::Failure((&err).into()));
                Err(err)
            }
        }
    }

    /// Sends the pending alert. On delivery failure the alert goes back to
    /// pending confirmation so the user can retry or cancel, unless the user
    /// already dismissed it; then only the failure notice is published.
    pub async fn confirm_emergency(&self) -> Result<String, EmergencyError> {
        let (ticket, alert, confirmed) = {
            let mut state = self.inner.lock().await;
            let (ticket, alert) = state.emergency.confirm()?;
            (ticket, alert, state.emergency.state().clone())
        };
        self.publish(DashboardEvent::EmergencyStateChanged(confirmed));

        let outcome = self.collaborators.alert_dispatcher.dispatch(&alert).await;
        let mut state = self.inner.lock().await;
        match outcome {
            Ok(()) => {
                state.emergency.dispatch_delivered(ticket);
                drop(state);
                info!("emergency alert dispatched");
                Ok(alert)
            }
            Err(err) => {
                let reverted = state
                    .emergency
                    .dispatch_failed(ticket)
                    .then(|| state.emergency.state().clone());
                drop(state);
                let err = EmergencyError::Dispatch(format!("{err:#}"));
                warn!(reverted = reverted.is_some(), "{err}");
                if let Some(current) = reverted {
                    self.publish(DashboardEvent::EmergencyStateChanged(current));
                }
                self.publish(DashboardEvent::Failure((&err).into()));
                Err(err)
            }
        }
    }

    pub async fn cancel_emergency(&self) -> bool {
        let cancelled = self.inner.lock().await.emergency.cancel();
        if cancelled {
            info!("emergency draft cancelled");
            self.publish(DashboardEvent::EmergencyStateChanged(EmergencyState::Idle));
        }
        cancelled
    }

    pub async fn dismiss_emergency(&self) -> Result<(), EmergencyError> {
        self.inner.lock().await.emergency.dismiss()?;
        self.publish(DashboardEvent::EmergencyStateChanged(EmergencyState::Idle));
        Ok(())
    }

    pub async fn emergency_state(&self) -> EmergencyState {
        self.inner.lock().await.emergency.state().clone()
    }

    /// Opens the voice link, briefed with what the dashboard currently shows.
    pub async fn start_voice(&self) -> Result<(), VoiceLinkError> {
        let incidents = self.visible_incidents().await;
        let location = self.user_location().await;
        let instruction = voice_instruction(&incidents, location);

        if let Err(err) = self.voice.start(instruction).await {
            if !matches!(err, VoiceLinkError::Superseded) {
                self.publish(DashboardEvent::Failure((&err).into()));
            }
            return Err(err);
        }
        Ok(())
    }

    pub async fn stop_voice(&self) {
        self.voice.stop().await;
    }

    pub async fn voice_status(&self) -> VoiceStatus {
        self.voice.status().await
    }

    async fn refresh_quietly(&self) {
        if let Err(err) = self.refresh_safety_status().await {
            debug!("safety refresh skipped: {err:#}");
        }
    }

    fn publish(&self, event: DashboardEvent) {
        let _ = self.events.send(event);
    }
}

/// System instruction for the voice agent: the visible incidents and the
/// user position.
pub fn voice_instruction(incidents: &[Incident], location: Coordinate) -> String {
    let context = if incidents.is_empty() {
        "No recent incidents".to_string()
    } else {
        incidents
            .iter()
            .map(|incident| {
                format!(
                    "{} at {} ({} severity)",
                    incident.category(),
                    incident.location_label(),
                    incident.severity()
                )
            })
            .collect::<Vec<_>>()
            .join(". ")
    };
    format!(
        "You are the campus safety voice assistant. Keep answers short and calm. \
         Current incidents: {context}. User location: {location}."
    )
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
