use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::models::{
    Appointment, AppointmentError, AppointmentInterval, AppointmentStatus, ConflictCheckResponse,
};
use crate::services::repository::AppointmentRepository;

// ==============================================================================
// OVERLAP RULES
// ==============================================================================

/// Half-open intervals overlap iff each starts before the other ends.
/// Touching endpoints are not an overlap.
pub fn intervals_overlap(
    start1: DateTime<Utc>,
    end1: DateTime<Utc>,
    start2: DateTime<Utc>,
    end2: DateTime<Utc>,
) -> bool {
    start1 < end2 && start2 < end1
}

pub fn is_active_appointment(status: &AppointmentStatus) -> bool {
    status.occupies_slot()
}

/// Existing appointments that occupy part of `candidate`.
pub fn find_conflicts<'a>(
    candidate: &AppointmentInterval,
    existing: &'a [Appointment],
) -> Vec<&'a Appointment> {
    existing
        .iter()
        .filter(|appointment| is_active_appointment(&appointment.status))
        .filter(|appointment| {
            intervals_overlap(
                candidate.start,
                candidate.end,
                appointment.start_time,
                appointment.end_time(),
            )
        })
        .collect()
}

pub fn has_conflict(candidate: &AppointmentInterval, existing: &[Appointment]) -> bool {
    !find_conflicts(candidate, existing).is_empty()
}

/// Range of start times that can hold an appointment overlapping `candidate`,
/// given no appointment lasts longer than `max_duration`.
pub fn prefilter_window(
    candidate: &AppointmentInterval,
    max_duration: Duration,
) -> (DateTime<Utc>, DateTime<Utc>) {
    (
        candidate
            .start
            .checked_sub_signed(max_duration)
            .unwrap_or(DateTime::<Utc>::MIN_UTC),
        candidate
            .end
            .checked_add_signed(max_duration)
            .unwrap_or(DateTime::<Utc>::MAX_UTC),
    )
}

// ==============================================================================
// SERVICE
// ==============================================================================

pub struct ConflictDetectionService {
    repository: Arc<dyn AppointmentRepository>,
    max_duration: Duration,
}

impl ConflictDetectionService {
    pub fn new(repository: Arc<dyn AppointmentRepository>, max_duration: Duration) -> Self {
        Self {
            repository,
            max_duration,
        }
    }

    /// Check a proposed slot against everything already booked around it
    #[instrument(skip(self))]
    pub async fn check_conflicts(
        &self,
        start_time: DateTime<Utc>,
        duration_minutes: i64,
        exclude_appointment_id: Option<Uuid>,
    ) -> Result<ConflictCheckResponse, AppointmentError> {
        let candidate = AppointmentInterval::candidate(start_time, duration_minutes);
        let (from, to) = prefilter_window(&candidate, self.max_duration);

        debug!("Checking conflicts from {} to {}", candidate.start, candidate.end);

        let existing = self
            .repository
            .find_starting_between(from, to, exclude_appointment_id)
            .await?;

        let conflicting_appointments: Vec<Appointment> = find_conflicts(&candidate, &existing)
            .into_iter()
            .cloned()
            .collect();

        let has_conflict = !conflicting_appointments.is_empty();

        if has_conflict {
            warn!(
                "Conflict detected for {} - {} conflicting appointments",
                candidate.start,
                conflicting_appointments.len()
            );
        }

        Ok(ConflictCheckResponse {
            has_conflict,
            conflicting_appointments,
        })
    }
}
