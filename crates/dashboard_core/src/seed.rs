use chrono::{DateTime, Duration, Utc};
use shared::domain::{CampusLocation, Incident, IncidentId, IncidentKind, Severity};

const HISTORY_WINDOW_HOURS: i64 = 24;
const HISTORY_SPACING_HOURS: i64 = 5;

/// One low-severity patrol record per campus location, spread over the last day.
pub fn campus_history(locations: &[CampusLocation], now: DateTime<Utc>) -> Vec<Incident> {
    locations
        .iter()
        .zip(0_i64..)
        .map(|(location, index)| {
            let age_hours = (1 + index * HISTORY_SPACING_HOURS) % HISTORY_WINDOW_HOURS;
            Incident::new(
                IncidentId::new(format!("h-{index}")),
                "Surveillance Scan",
                format!("Perimeter check complete at {}.", location.name),
                now - Duration::hours(age_hours) - Duration::minutes((index * 7) % 60),
                location.coords,
                Severity::Low,
                IncidentKind::Observed {
                    analysis: Some("Regular patrol confirmed safety.".into()),
                },
            )
            .with_location_name(location.name.clone())
        })
        .collect()
}
