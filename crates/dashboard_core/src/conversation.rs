use chrono::{DateTime, Utc};
use shared::{
    domain::{ChatMessage, Coordinate, Incident, IncidentId, IncidentKind, Severity},
    protocol::{AgentReply, PlaceRef},
};
use tracing::{debug, warn};

use crate::error::ChatError;

pub const AGENT_FAILURE_NOTICE: &str = "Error accessing intelligence network.";
pub const VERIFIED_RESOURCE_CATEGORY: &str = "Verified Resource";
const RESOURCE_JITTER_DEGREES: f64 = 0.005;

/// Ticket for the one agent request a session may have outstanding.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingQuery {
    pub request_id: u64,
    pub query: String,
    pub location: Coordinate,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub reply: ChatMessage,
    pub resources: Vec<Incident>,
}

#[derive(Debug, Default)]
pub struct ConversationSession {
    transcript: Vec<ChatMessage>,
    in_flight: Option<u64>,
    next_request_id: u64,
}

impl ConversationSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates the query and appends the user message. While a request is
    /// outstanding further queries are rejected, never queued.
    pub fn begin(
        &mut self,
        query: &str,
        location: Coordinate,
        now: DateTime<Utc>,
    ) -> Result<PendingQuery, ChatError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ChatError::EmptyQuery);
        }
        if self.in_flight.is_some() {
            return Err(ChatError::Busy);
        }

        self.next_request_id += 1;
        let request_id = self.next_request_id;
        self.in_flight = Some(request_id);
        self.transcript.push(ChatMessage::user(query, now));

        Ok(PendingQuery {
            request_id,
            query: query.to_string(),
            location,
        })
    }

    pub fn resolve(
        &mut self,
        pending: &PendingQuery,
        outcome: anyhow::Result<AgentReply>,
        now: DateTime<Utc>,
    ) -> Result<Resolution, ChatError> {
        if self.in_flight != Some(pending.request_id) {
            debug!(
                request_id = pending.request_id,
                "discarding stale agent reply"
            );
            return Err(ChatError::Stale {
                request_id: pending.request_id,
            });
        }
        self.in_flight = None;

        let resolution = match outcome {
            Ok(reply) => {
                let resources = reply
                    .places()
                    .map(|place| verified_resource(place, pending.location, now))
                    .collect();
                Resolution {
                    reply: ChatMessage::agent(reply.text.clone(), now, reply.grounding_links()),
                    resources,
                }
            }
            Err(err) => {
                warn!(
                    request_id = pending.request_id,
                    "agent request failed: {err:#}"
                );
                Resolution {
                    reply: ChatMessage::agent(AGENT_FAILURE_NOTICE, now, Vec::new()),
                    resources: Vec::new(),
                }
            }
        };

        self.transcript.push(resolution.reply.clone());
        Ok(resolution)
    }

    /// Forgets the outstanding request; its reply will be discarded as stale.
    pub fn abandon(&mut self) -> bool {
        self.in_flight.take().is_some()
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn transcript(&self) -> &[ChatMessage] {
        &self.transcript
    }
}

fn verified_resource(place: &PlaceRef, near: Coordinate, now: DateTime<Utc>) -> Incident {
    let id = IncidentId::fresh("res");
    let (d_lat, d_lng) = jitter_for(&id);
    Incident::new(
        id,
        VERIFIED_RESOURCE_CATEGORY,
        format!("Location found via Google Maps: {}", place.title),
        now,
        near.offset(d_lat, d_lng),
        Severity::Low,
        IncidentKind::VerifiedResource {
            uri: place.uri.clone(),
        },
    )
    .with_location_name(place.title.clone())
}

/// Spreads resource markers around the requester so they do not stack.
/// Each offset stays strictly below `RESOURCE_JITTER_DEGREES`.
fn jitter_for(id: &IncidentId) -> (f64, f64) {
    let hash = id
        .as_str()
        .bytes()
        .fold(0xcbf2_9ce4_8422_2325_u64, |acc, b| {
            (acc ^ u64::from(b)).wrapping_mul(0x0100_0000_01b3)
        });
    let unit = |bits: u64| (bits & 0xffff) as f64 / f64::from(u16::MAX) - 0.5;
    (
        unit(hash) * 2.0 * RESOURCE_JITTER_DEGREES * 0.999,
        unit(hash >> 16) * 2.0 * RESOURCE_JITTER_DEGREES * 0.999,
    )
}

#[cfg(test)]
#[path = "tests/conversation_tests.rs"]
mod tests;
