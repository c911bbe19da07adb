//! Application state shared across all request handlers.

use bakong_core::provider::BakongClient;
use bakong_core::recon::ReconEngine;
use bakong_core::store::PgReconStore;
use std::sync::Arc;

/// The engine as wired in production: Postgres store, HTTP provider.
pub type Engine = ReconEngine<PgReconStore, BakongClient>;

/// Application state that is shared across all request handlers.
///
/// This is cloneable and cheap to pass around (everything is behind Arc).
/// The database pool lives inside the engine's store; handlers never
/// touch the database directly.
#[derive(Clone)]
pub struct AppState {
    /// The reconciliation engine.
    pub engine: Arc<Engine>,
}

impl AppState {
    /// Create a new AppState with the given engine.
    pub fn new(engine: Engine) -> Self {
        Self {
            engine: Arc::new(engine),
        }
    }
}
