// libs/appointment-cell/src/services/booking.rs
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_utils::clock::{Clock, SystemClock};

use crate::models::{
    Appointment, AppointmentError, AppointmentListQuery, AppointmentStatus,
    BookAppointmentRequest, CancelAppointmentRequest, ConflictCheckResponse,
    RescheduleAppointmentRequest,
};
use crate::services::conflict::ConflictDetectionService;
use crate::services::repository::{AppointmentRepository, InMemoryAppointmentRepository};

const MAX_TITLE_LENGTH: usize = 200;

pub struct AppointmentBookingService {
    repository: Arc<dyn AppointmentRepository>,
    conflict_service: ConflictDetectionService,
    clock: Arc<dyn Clock>,
    max_duration: Duration,
}

impl AppointmentBookingService {
    pub fn new(
        repository: Arc<dyn AppointmentRepository>,
        clock: Arc<dyn Clock>,
        config: &AppConfig,
    ) -> Self {
        let max_duration = config.max_appointment_duration();

        Self {
            conflict_service: ConflictDetectionService::new(Arc::clone(&repository), max_duration),
            repository,
            clock,
            max_duration,
        }
    }

    pub fn in_memory(config: &AppConfig) -> Self {
        Self::new(
            Arc::new(InMemoryAppointmentRepository::new()),
            Arc::new(SystemClock),
            config,
        )
    }

    /// Validate and atomically reserve a new slot
    #[instrument(skip(self, request), fields(client_id = %request.client_id))]
    pub async fn book_appointment(
        &self,
        request: BookAppointmentRequest,
    ) -> Result<Appointment, AppointmentError> {
        info!(
            "Booking appointment at {} for {} minutes",
            request.start_time, request.duration_minutes
        );

        self.validate_booking_request(&request)?;

        let now = self.clock.now();
        let appointment = Appointment {
            id: Uuid::new_v4(),
            client_id: request.client_id,
            title: request.title.trim().to_string(),
            start_time: request.start_time,
            duration_minutes: request.duration_minutes,
            status: AppointmentStatus::Scheduled,
            notes: request.notes,
            created_at: now,
            updated_at: now,
        };

        let booked = self.repository.reserve(appointment, self.max_duration).await?;

        info!("Appointment {} booked successfully", booked.id);
        Ok(booked)
    }

    /// Read-only check of a proposed slot
    pub async fn check_conflicts(
        &self,
        start_time: DateTime<Utc>,
        duration_minutes: i64,
        exclude_appointment_id: Option<Uuid>,
    ) -> Result<ConflictCheckResponse, AppointmentError> {
        self.validate_duration(duration_minutes)?;
        self.validate_span(start_time, duration_minutes)?;

        self.conflict_service
            .check_conflicts(start_time, duration_minutes, exclude_appointment_id)
            .await
    }

    #[instrument(skip(self, request))]
    pub async fn reschedule_appointment(
        &self,
        appointment_id: Uuid,
        request: RescheduleAppointmentRequest,
    ) -> Result<Appointment, AppointmentError> {
        let current = self.get_appointment(appointment_id).await?;
        let duration_minutes = request.duration_minutes.unwrap_or(current.duration_minutes);

        self.validate_duration(duration_minutes)?;
        self.validate_start_time(request.new_start_time)?;
        self.validate_span(request.new_start_time, duration_minutes)?;

        let moved = self
            .repository
            .reschedule(
                appointment_id,
                request.new_start_time,
                duration_minutes,
                self.clock.now(),
                self.max_duration,
            )
            .await?;

        info!("Appointment {} rescheduled to {}", appointment_id, moved.start_time);
        Ok(moved)
    }

    pub async fn cancel_appointment(
        &self,
        appointment_id: Uuid,
        request: CancelAppointmentRequest,
    ) -> Result<Appointment, AppointmentError> {
        debug!("Cancelling appointment: {}", appointment_id);

        let note = request
            .reason
            .filter(|r| !r.trim().is_empty())
            .map(|reason| format!("Cancelled: {}", reason.trim()));

        let cancelled = self
            .repository
            .transition(appointment_id, AppointmentStatus::Cancelled, note, self.clock.now())
            .await?;

        info!("Appointment {} cancelled successfully", appointment_id);
        Ok(cancelled)
    }

    pub async fn update_status(
        &self,
        appointment_id: Uuid,
        status: AppointmentStatus,
    ) -> Result<Appointment, AppointmentError> {
        let updated = self
            .repository
            .transition(appointment_id, status, None, self.clock.now())
            .await?;

        info!("Appointment {} is now {}", appointment_id, updated.status);
        Ok(updated)
    }

    pub async fn get_appointment(&self, appointment_id: Uuid) -> Result<Appointment, AppointmentError> {
        self.repository
            .get(appointment_id)
            .await?
            .ok_or(AppointmentError::NotFound)
    }

    pub async fn list_appointments(
        &self,
        query: AppointmentListQuery,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        if let (Some(from), Some(to)) = (query.from, query.to) {
            if from > to {
                return Err(AppointmentError::ValidationError(
                    "from must not be after to".to_string(),
                ));
            }
        }

        self.repository.list(query).await
    }

    // ==============================================================================
    // PRIVATE HELPER METHODS
    // ==============================================================================

    fn validate_booking_request(&self, request: &BookAppointmentRequest) -> Result<(), AppointmentError> {
        let title = request.title.trim();
        if title.is_empty() {
            return Err(AppointmentError::ValidationError("title is required".to_string()));
        }
        if title.len() > MAX_TITLE_LENGTH {
            return Err(AppointmentError::ValidationError(format!(
                "title must be at most {} characters",
                MAX_TITLE_LENGTH
            )));
        }

        self.validate_duration(request.duration_minutes)?;
        self.validate_start_time(request.start_time)?;
        self.validate_span(request.start_time, request.duration_minutes)
    }

    // Bookings longer than `max_duration` would fall outside the conflict
    // query window, so they are refused outright.
    fn validate_duration(&self, duration_minutes: i64) -> Result<(), AppointmentError> {
        if duration_minutes <= 0 {
            return Err(AppointmentError::ValidationError(
                "duration_minutes must be positive".to_string(),
            ));
        }
        if duration_minutes > self.max_duration.num_minutes() {
            return Err(AppointmentError::ValidationError(format!(
                "duration_minutes must not exceed {}",
                self.max_duration.num_minutes()
            )));
        }
        Ok(())
    }

    // The slot and its conflict window must stay within chrono's range.
    // Call after `validate_duration`.
    fn validate_span(&self, start_time: DateTime<Utc>, duration_minutes: i64) -> Result<(), AppointmentError> {
        let reach = Duration::minutes(duration_minutes) + self.max_duration;
        let representable = start_time.checked_sub_signed(self.max_duration).is_some()
            && start_time.checked_add_signed(reach).is_some();

        if !representable {
            return Err(AppointmentError::InvalidTime(
                "start_time is out of range".to_string(),
            ));
        }
        Ok(())
    }

    fn validate_start_time(&self, start_time: DateTime<Utc>) -> Result<(), AppointmentError> {
        if start_time <= self.clock.now() {
            return Err(AppointmentError::InvalidTime(
                "appointment must start in the future".to_string(),
            ));
        }
        Ok(())
    }
}
