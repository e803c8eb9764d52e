//! Service boundaries the dashboard depends on. Every seam has a `Missing*`
//! implementation that fails loudly, for wiring a dashboard without it.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use shared::{
    domain::{Coordinate, Incident, SafetyStatus},
    protocol::AgentReply,
};
use voice_link::{VoiceChannel, VoiceChannelConnector, VoiceLinkOptions};

#[async_trait]
pub trait SafetyAssessor: Send + Sync {
    /// Must produce a status for an empty incident slice.
    async fn summarize(&self, incidents: &[Incident], location: Coordinate)
        -> Result<SafetyStatus>;
}

#[async_trait]
pub trait ConversationAgent: Send + Sync {
    async fn chat(&self, query: &str, location: Coordinate) -> Result<AgentReply>;
}

#[async_trait]
pub trait DraftGenerator: Send + Sync {
    async fn draft(&self, trigger_message: &str) -> Result<String>;
}

#[async_trait]
pub trait AlertDispatcher: Send + Sync {
    async fn dispatch(&self, alert: &str) -> Result<()>;
}

#[async_trait]
pub trait IncidentAnalyst: Send + Sync {
    async fn analyze(&self, incident: &Incident) -> Result<String>;
}

#[async_trait]
pub trait GeolocationProvider: Send + Sync {
    async fn current_position(&self) -> Result<Coordinate>;
}

pub struct MissingSafetyAssessor;

#[async_trait]
impl SafetyAssessor for MissingSafetyAssessor {
    async fn summarize(
        &self,
        _incidents: &[Incident],
        _location: Coordinate,
    ) -> Result<SafetyStatus> {
        Err(anyhow!("safety assessor is unavailable"))
    }
}

pub struct MissingConversationAgent;

#[async_trait]
impl ConversationAgent for MissingConversationAgent {
    async fn chat(&self, _query: &str, _location: Coordinate) -> Result<AgentReply> {
        Err(anyhow!("conversation agent is unavailable"))
    }
}

pub struct MissingDraftGenerator;

#[async_trait]
impl DraftGenerator for MissingDraftGenerator {
    async fn draft(&self, _trigger_message: &str) -> Result<String> {
        Err(anyhow!("draft generator is unavailable"))
    }
}

pub struct MissingAlertDispatcher;

#[async_trait]
impl AlertDispatcher for MissingAlertDispatcher {
    async fn dispatch(&self, _alert: &str) -> Result<()> {
        Err(anyhow!("alert dispatcher is unavailable"))
    }
}

pub struct MissingIncidentAnalyst;

#[async_trait]
impl IncidentAnalyst for MissingIncidentAnalyst {
    async fn analyze(&self, incident: &Incident) -> Result<String> {
        Err(anyhow!("incident analyst is unavailable for {}", incident.id()))
    }
}

/// Behaves like a denied permission prompt.
pub struct MissingGeolocation;

#[async_trait]
impl GeolocationProvider for MissingGeolocation {
    async fn current_position(&self) -> Result<Coordinate> {
        Err(anyhow!("geolocation permission denied"))
    }
}

pub struct MissingVoiceConnector;

#[async_trait]
impl VoiceChannelConnector for MissingVoiceConnector {
    async fn connect(&self, _options: VoiceLinkOptions) -> Result<Arc<dyn VoiceChannel>> {
        Err(anyhow!("voice connector is unavailable"))
    }
}
