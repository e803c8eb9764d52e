use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IncidentId(pub String);

impl IncidentId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Mints an id that has never been handed out before, e.g. `res-5f0c...`.
    pub fn fresh(prefix: &str) -> Self {
        Self(format!("{prefix}-{}", Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IncidentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.latitude.is_finite() && self.longitude.is_finite()
    }

    pub fn offset(&self, d_lat: f64, d_lng: f64) -> Self {
        Self::new(self.latitude + d_lat, self.longitude + d_lng)
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Lat {}, Lng {}", self.latitude, self.longitude)
    }
}

/// Ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "LOW",
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
            Severity::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IncidentKind {
    Observed {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        analysis: Option<String>,
    },
    VerifiedResource {
        uri: String,
    },
}

/// A reported or minted incident. Fields are fixed at construction; the
/// timestamp in particular never changes once the incident exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    id: IncidentId,
    category: String,
    description: String,
    timestamp: DateTime<Utc>,
    location: Coordinate,
    severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    location_name: Option<String>,
    kind: IncidentKind,
}

impl Incident {
    pub fn new(
        id: IncidentId,
        category: impl Into<String>,
        description: impl Into<String>,
        timestamp: DateTime<Utc>,
        location: Coordinate,
        severity: Severity,
        kind: IncidentKind,
    ) -> Self {
        Self {
            id,
            category: category.into(),
            description: description.into(),
            timestamp,
            location,
            severity,
            location_name: None,
            kind,
        }
    }

    pub fn with_location_name(mut self, name: impl Into<String>) -> Self {
        self.location_name = Some(name.into());
        self
    }

    pub fn id(&self) -> &IncidentId {
        &self.id
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn location(&self) -> Coordinate {
        self.location
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn location_name(&self) -> Option<&str> {
        self.location_name.as_deref()
    }

    pub fn kind(&self) -> &IncidentKind {
        &self.kind
    }

    pub fn is_verified_resource(&self) -> bool {
        matches!(self.kind, IncidentKind::VerifiedResource { .. })
    }

    pub fn analysis(&self) -> Option<&str> {
        match &self.kind {
            IncidentKind::Observed { analysis } => analysis.as_deref(),
            IncidentKind::VerifiedResource { .. } => None,
        }
    }

    pub fn uri(&self) -> Option<&str> {
        match &self.kind {
            IncidentKind::VerifiedResource { uri } => Some(uri),
            IncidentKind::Observed { .. } => None,
        }
    }

    pub fn location_label(&self) -> &str {
        self.location_name.as_deref().unwrap_or("unknown location")
    }
}

pub const MAX_SAFETY_SCORE: u8 = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafetyStatus {
    pub score: u8,
    pub summary: String,
    pub recommendations: Vec<String>,
}

impl SafetyStatus {
    pub fn new(score: i64, summary: impl Into<String>, recommendations: Vec<String>) -> Self {
        Self {
            score: score.clamp(0, i64::from(MAX_SAFETY_SCORE)) as u8,
            summary: summary.into(),
            recommendations,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    User,
    Agent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroundingLink {
    pub title: String,
    pub uri: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub grounding_links: Vec<GroundingLink>,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
            timestamp,
            grounding_links: Vec::new(),
        }
    }

    pub fn agent(
        content: impl Into<String>,
        timestamp: DateTime<Utc>,
        grounding_links: Vec<GroundingLink>,
    ) -> Self {
        Self {
            role: ChatRole::Agent,
            content: content.into(),
            timestamp,
            grounding_links,
        }
    }
}

/// Named campus landmark used for seeding history and grounding the assistants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampusLocation {
    pub name: String,
    pub coords: Coordinate,
}
