use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use shared::domain::{Coordinate, Incident, IncidentId, SafetyStatus};
use tracing::warn;

use crate::{collaborators::SafetyAssessor, error::StoreError};

/// Recency window, in whole hours.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Horizon(u32);

impl Horizon {
    pub fn new(hours: u32, max_hours: u32) -> Result<Self, StoreError> {
        if hours == 0 || hours > max_hours {
            return Err(StoreError::InvalidHorizon {
                hours,
                max: max_hours,
            });
        }
        Ok(Self(hours))
    }

    /// Pulls `hours` into `1..=max_hours`.
    pub fn clamped(hours: u32, max_hours: u32) -> Self {
        Self(hours.clamp(1, max_hours.max(1)))
    }

    pub fn hours(&self) -> u32 {
        self.0
    }

    pub fn as_duration(&self) -> Duration {
        Duration::hours(i64::from(self.0))
    }

    /// Inclusive: an incident exactly `hours` old is still visible.
    pub fn contains(&self, timestamp: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(timestamp) <= self.as_duration()
    }
}

pub struct IncidentStore {
    incidents: Vec<Incident>,
    batch_starts: Vec<usize>,
    ids: HashSet<IncidentId>,
    user_location: Coordinate,
}

impl IncidentStore {
    pub fn new(default_location: Coordinate) -> Self {
        Self {
            incidents: Vec::new(),
            batch_starts: Vec::new(),
            ids: HashSet::new(),
            user_location: default_location,
        }
    }

    pub fn seed(&mut self, initial: Vec<Incident>) {
        self.incidents.clear();
        self.batch_starts.clear();
        self.ids.clear();
        self.add_incidents(initial);
    }

    pub fn record_user_location(&mut self, coord: Coordinate) -> Result<(), StoreError> {
        if !coord.is_finite() {
            return Err(StoreError::NonFiniteCoordinate(coord));
        }
        self.user_location = coord;
        Ok(())
    }

    pub fn user_location(&self) -> Coordinate {
        self.user_location
    }

    /// Appends in insertion order. Ids are expected to be fresh; a repeated id
    /// is kept and logged.
    pub fn add_incidents(&mut self, batch: Vec<Incident>) {
        if batch.is_empty() {
            return;
        }
        self.batch_starts.push(self.incidents.len());
        for incident in batch {
            if !self.ids.insert(incident.id().clone()) {
                warn!(incident_id = %incident.id(), "duplicate incident id added to store");
            }
            self.incidents.push(incident);
        }
    }

    pub fn filtered_by_horizon(&self, horizon: Horizon, now: DateTime<Utc>) -> Vec<Incident> {
        self.incidents
            .iter()
            .filter(|incident| horizon.contains(incident.timestamp(), now))
            .cloned()
            .collect()
    }

    /// Display ordering: later batches first, each batch in its own order.
    pub fn newest_first(&self) -> Vec<&Incident> {
        let mut ordered = Vec::with_capacity(self.incidents.len());
        let mut end = self.incidents.len();
        for &start in self.batch_starts.iter().rev() {
            ordered.extend(&self.incidents[start..end]);
            end = start;
        }
        ordered
    }

    pub fn visible_newest_first(&self, horizon: Horizon, now: DateTime<Utc>) -> Vec<Incident> {
        self.newest_first()
            .into_iter()
            .filter(|incident| horizon.contains(incident.timestamp(), now))
            .cloned()
            .collect()
    }

    pub async fn recompute_safety_status(
        assessor: &dyn SafetyAssessor,
        filtered: &[Incident],
        location: Coordinate,
    ) -> anyhow::Result<SafetyStatus> {
        assessor.summarize(filtered, location).await
    }

    pub fn get(&self, id: &IncidentId) -> Option<&Incident> {
        self.incidents.iter().find(|incident| incident.id() == id)
    }

    pub fn all(&self) -> &[Incident] {
        &self.incidents
    }

    pub fn len(&self) -> usize {
        self.incidents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.incidents.is_empty()
    }
}

#[cfg(test)]
#[path = "tests/store_tests.rs"]
mod tests;
