pub mod availability;
pub mod booking;
pub mod cache;
pub mod conflict;
pub mod lifecycle;
pub mod memory_store;
pub mod store;
pub mod supabase_store;

pub use availability::{AvailabilityService, AvailabilityWindow};
pub use booking::AppointmentBookingService;
pub use cache::{AvailabilityCache, CacheKey};
pub use conflict::ConflictDetectionService;
pub use lifecycle::{AppointmentLifecycleService, TransitionDecision};
pub use memory_store::InMemorySchedulingStore;
pub use store::{with_timeout, SchedulingStore, StoreError};
pub use supabase_store::SupabaseSchedulingStore;
