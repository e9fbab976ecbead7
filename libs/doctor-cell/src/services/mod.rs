pub mod availability;
pub mod recurrence;
pub mod schedule;
pub mod slots;

pub use availability::{AvailabilityRepository, AvailabilityService, SupabaseAvailabilityRepository};
pub use schedule::ScheduleService;
