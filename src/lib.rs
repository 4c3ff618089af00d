pub mod config;
pub mod database;
pub mod dto;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;

use crate::database::{
    pg_store::PgStore,
    store::{AttemptStore, SopViewTracker, XpLedger},
};
use crate::services::{
    attempt_service::AttemptService, events::TracingObserver, xp_service::XpService,
};
use sqlx::PgPool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub attempt_service: AttemptService,
    pub xp_service: XpService,
}

impl AppState {
    pub fn new(pool: PgPool) -> Self {
        Self::from_store(Arc::new(PgStore::new(pool)))
    }

    /// Wires every service onto one backing store.
    pub fn from_store<S>(store: Arc<S>) -> Self
    where
        S: AttemptStore + XpLedger + SopViewTracker + 'static,
    {
        let attempt_service =
            AttemptService::new(store.clone(), store.clone(), Arc::new(TracingObserver));
        let xp_service = XpService::new(store);

        Self {
            attempt_service,
            xp_service,
        }
    }
}
