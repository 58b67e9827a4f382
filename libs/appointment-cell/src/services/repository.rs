use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::{
    Appointment, AppointmentError, AppointmentInterval, AppointmentListQuery, AppointmentStatus,
};
use crate::services::conflict::{find_conflicts, prefilter_window};

/// Persistence seam for bookings.
///
/// `reserve` and `reschedule` must run the overlap check and the write as one
/// step, so two callers can never both claim the same slot. `transition`
/// re-reads the record under the same lock and touches only status and notes.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AppointmentRepository: Send + Sync {
    async fn find_starting_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        exclude_id: Option<Uuid>,
    ) -> Result<Vec<Appointment>, AppointmentError>;

    async fn get(&self, id: Uuid) -> Result<Option<Appointment>, AppointmentError>;

    async fn list(&self, query: AppointmentListQuery) -> Result<Vec<Appointment>, AppointmentError>;

    async fn reserve(
        &self,
        appointment: Appointment,
        max_duration: Duration,
    ) -> Result<Appointment, AppointmentError>;

    async fn reschedule(
        &self,
        id: Uuid,
        new_start: DateTime<Utc>,
        duration_minutes: i64,
        updated_at: DateTime<Utc>,
        max_duration: Duration,
    ) -> Result<Appointment, AppointmentError>;

    async fn transition(
        &self,
        id: Uuid,
        next: AppointmentStatus,
        note: Option<String>,
        updated_at: DateTime<Utc>,
    ) -> Result<Appointment, AppointmentError>;
}

#[derive(Debug, Default, Clone)]
pub struct InMemoryAppointmentRepository {
    appointments: Arc<Mutex<HashMap<Uuid, Appointment>>>,
}

impl InMemoryAppointmentRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.appointments.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

fn starting_between(
    appointments: &HashMap<Uuid, Appointment>,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
    exclude_id: Option<Uuid>,
) -> Vec<Appointment> {
    let mut found: Vec<Appointment> = appointments
        .values()
        .filter(|apt| Some(apt.id) != exclude_id)
        .filter(|apt| apt.start_time >= from && apt.start_time <= to)
        .cloned()
        .collect();
    found.sort_by_key(|apt| apt.start_time);
    found
}

fn ensure_free(
    appointments: &HashMap<Uuid, Appointment>,
    candidate: &AppointmentInterval,
    exclude_id: Option<Uuid>,
    max_duration: Duration,
) -> Result<(), AppointmentError> {
    let (from, to) = prefilter_window(candidate, max_duration);
    let nearby = starting_between(appointments, from, to, exclude_id);
    let conflicting_ids: Vec<Uuid> = find_conflicts(candidate, &nearby)
        .into_iter()
        .map(|apt| apt.id)
        .collect();

    if conflicting_ids.is_empty() {
        Ok(())
    } else {
        warn!(
            "Slot {} - {} already taken by {} appointments",
            candidate.start,
            candidate.end,
            conflicting_ids.len()
        );
        Err(AppointmentError::ConflictDetected { conflicting_ids })
    }
}

#[async_trait]
impl AppointmentRepository for InMemoryAppointmentRepository {
    async fn find_starting_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        exclude_id: Option<Uuid>,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let appointments = self.appointments.lock().await;
        Ok(starting_between(&appointments, from, to, exclude_id))
    }

    async fn get(&self, id: Uuid) -> Result<Option<Appointment>, AppointmentError> {
        Ok(self.appointments.lock().await.get(&id).cloned())
    }

    async fn list(&self, query: AppointmentListQuery) -> Result<Vec<Appointment>, AppointmentError> {
        let appointments = self.appointments.lock().await;

        let mut found: Vec<Appointment> = appointments
            .values()
            .filter(|apt| query.client_id.map_or(true, |id| apt.client_id == id))
            .filter(|apt| query.from.map_or(true, |from| apt.start_time >= from))
            .filter(|apt| query.to.map_or(true, |to| apt.start_time <= to))
            .cloned()
            .collect();
        found.sort_by_key(|apt| apt.start_time);

        Ok(found)
    }

    async fn reserve(
        &self,
        appointment: Appointment,
        max_duration: Duration,
    ) -> Result<Appointment, AppointmentError> {
        let mut appointments = self.appointments.lock().await;

        if appointments.contains_key(&appointment.id) {
            return Err(AppointmentError::DatabaseError(format!(
                "Appointment {} already exists",
                appointment.id
            )));
        }

        ensure_free(&appointments, &appointment.interval(), None, max_duration)?;

        debug!("Reserved {} for {}", appointment.start_time, appointment.client_id);
        appointments.insert(appointment.id, appointment.clone());

        Ok(appointment)
    }

    async fn reschedule(
        &self,
        id: Uuid,
        new_start: DateTime<Utc>,
        duration_minutes: i64,
        updated_at: DateTime<Utc>,
        max_duration: Duration,
    ) -> Result<Appointment, AppointmentError> {
        let mut appointments = self.appointments.lock().await;

        let current = appointments.get(&id).cloned().ok_or(AppointmentError::NotFound)?;

        if current.status.is_terminal() {
            return Err(AppointmentError::ValidationError(format!(
                "Cannot reschedule a {} appointment",
                current.status
            )));
        }

        let candidate = AppointmentInterval::new(new_start, duration_minutes, current.status);
        ensure_free(&appointments, &candidate, Some(id), max_duration)?;

        let moved = Appointment {
            start_time: new_start,
            duration_minutes,
            updated_at,
            ..current
        };
        appointments.insert(id, moved.clone());

        Ok(moved)
    }

    async fn transition(
        &self,
        id: Uuid,
        next: AppointmentStatus,
        note: Option<String>,
        updated_at: DateTime<Utc>,
    ) -> Result<Appointment, AppointmentError> {
        let mut appointments = self.appointments.lock().await;

        let appointment = appointments.get_mut(&id).ok_or(AppointmentError::NotFound)?;

        if !appointment.status.can_transition_to(next) {
            return Err(AppointmentError::InvalidStatusTransition {
                from: appointment.status,
                to: next,
            });
        }

        appointment.status = next;
        appointment.updated_at = updated_at;
        if let Some(note) = note {
            appointment.notes = Some(match appointment.notes.take() {
                Some(existing) => format!("{}\n{}", existing, note),
                None => note,
            });
        }

        Ok(appointment.clone())
    }
}
