pub mod booking;
pub mod conflict;
pub mod repository;

pub use booking::AppointmentBookingService;
pub use conflict::ConflictDetectionService;
pub use repository::{AppointmentRepository, InMemoryAppointmentRepository};
