pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

// Re-export the types other cells work with
pub use models::{DeliveryMode, Slot, SlotCandidate, SlotError, SlotState};
pub use services::store::SlotStore;
