//! Canned collaborators standing in for the hosted map and language services.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use shared::{
    domain::{Coordinate, Incident, SafetyStatus},
    protocol::{AgentReply, GroundingResult},
};
use tracing::warn;

use crate::collaborators::{
    AlertDispatcher, ConversationAgent, DraftGenerator, GeolocationProvider, IncidentAnalyst,
    SafetyAssessor,
};

const STABLE_THRESHOLD: i64 = 70;
const SCORE_FLOOR: i64 = 20;
const PENALTY_PER_INCIDENT: i64 = 5;

pub struct MockSafetyAssessor;

#[async_trait]
impl SafetyAssessor for MockSafetyAssessor {
    async fn summarize(
        &self,
        incidents: &[Incident],
        _location: Coordinate,
    ) -> Result<SafetyStatus> {
        let count = i64::try_from(incidents.len()).unwrap_or(i64::MAX);
        let score = 100_i64
            .saturating_sub(count.saturating_mul(PENALTY_PER_INCIDENT))
            .max(SCORE_FLOOR);
        let summary = if score > STABLE_THRESHOLD {
            "Campus conditions are stable"
        } else {
            "Elevated security monitoring active"
        };
        Ok(SafetyStatus::new(
            score,
            summary,
            vec![
                "Maintain situational awareness".into(),
                "Use well-lit pathways".into(),
                "Report suspicious activity".into(),
            ],
        ))
    }
}

pub struct MockConversationAgent;

#[async_trait]
impl ConversationAgent for MockConversationAgent {
    async fn chat(&self, query: &str, _location: Coordinate) -> Result<AgentReply> {
        Ok(AgentReply {
            text: format!(
                "Based on your query \"{query}\", I recommend staying in well-lit areas and following established safety protocols."
            ),
            grounding_results: vec![GroundingResult::place(
                "Campus Safety Center",
                "https://maps.google.com/campus-safety",
            )],
        })
    }
}

pub struct MockDraftGenerator;

#[async_trait]
impl DraftGenerator for MockDraftGenerator {
    async fn draft(&self, trigger_message: &str) -> Result<String> {
        Ok(format!(
            "EMERGENCY ALERT: {trigger_message} - Campus security has been notified. Please remain calm and follow safety protocols."
        ))
    }
}

/// Dispatch transport is external; this only records the alert in the log.
pub struct LoggingAlertDispatcher;

#[async_trait]
impl AlertDispatcher for LoggingAlertDispatcher {
    async fn dispatch(&self, alert: &str) -> Result<()> {
        warn!(alert = %alert, "emergency alert dispatched");
        Ok(())
    }
}

pub struct MockIncidentAnalyst;

#[async_trait]
impl IncidentAnalyst for MockIncidentAnalyst {
    async fn analyze(&self, incident: &Incident) -> Result<String> {
        Ok(format!(
            "Analysis: {} at {} - {} severity incident.",
            incident.category(),
            incident.location_label(),
            incident.severity()
        ))
    }
}

/// Returns a fixed position, or a permission error when built with `denied()`.
pub struct FixedGeolocation(Option<Coordinate>);

impl FixedGeolocation {
    pub fn at(coordinate: Coordinate) -> Self {
        Self(Some(coordinate))
    }

    pub fn denied() -> Self {
        Self(None)
    }
}

#[async_trait]
impl GeolocationProvider for FixedGeolocation {
    async fn current_position(&self) -> Result<Coordinate> {
        self.0
            .ok_or_else(|| anyhow!("geolocation permission denied"))
    }
}

#[cfg(test)]
#[path = "tests/mock_tests.rs"]
mod tests;
