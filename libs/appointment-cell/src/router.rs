// libs/appointment-cell/src/router.rs
use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;
use crate::services::{AppointmentBookingService, AvailabilityCache, AvailabilityService, SchedulingStore};

/// Services shared by every scheduling route. Both services see the same
/// cache so bookings invalidate what availability reads.
pub struct SchedulingState {
    pub config: Arc<AppConfig>,
    pub availability: AvailabilityService,
    pub booking: AppointmentBookingService,
}

impl SchedulingState {
    pub fn new(config: Arc<AppConfig>, store: Arc<dyn SchedulingStore>) -> Self {
        let scheduling = config.scheduling.clone();
        let cache = Arc::new(AvailabilityCache::new(scheduling.cache_ttl()));

        Self {
            availability: AvailabilityService::new(Arc::clone(&store), Arc::clone(&cache), scheduling.clone()),
            booking: AppointmentBookingService::new(store, cache, scheduling),
            config,
        }
    }
}

pub fn availability_routes(state: Arc<SchedulingState>) -> Router {
    Router::new()
        .route("/", get(handlers::get_availability))
        .layer(middleware::from_fn_with_state(state.config.clone(), auth_middleware))
        .with_state(state)
}

pub fn appointment_routes(state: Arc<SchedulingState>) -> Router {
    // All appointment operations require authentication
    Router::new()
        .route("/", post(handlers::book_appointment))
        .route(
            "/{appointment_id}",
            get(handlers::get_appointment).patch(handlers::update_appointment_status),
        )
        .layer(middleware::from_fn_with_state(state.config.clone(), auth_middleware))
        .with_state(state)
}
