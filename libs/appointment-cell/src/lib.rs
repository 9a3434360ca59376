pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

pub use models::{Appointment, AppointmentState, BookingError, Urgency, VisitType};
pub use services::policy::{Caller, Role};
