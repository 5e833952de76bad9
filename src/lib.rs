pub mod aliases;
pub mod doctor;
pub mod edges;
pub mod errors;
pub mod fsutil;
pub mod index;
pub mod items;
pub mod migration;
pub mod models;
pub mod placement;
pub mod rank;
pub mod rebalance;
pub mod record;
pub mod workspace;

pub use crate::doctor::{DoctorCommand, DoctorOutcome};
pub use crate::errors::{AppError, AppResult};
pub use crate::models::{Edge, ItemId, ItemKind, ItemRecord};
pub use crate::placement::Placement;
pub use crate::rank::Rank;
pub use crate::workspace::Workspace;

use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;

static LOG_GUARD: std::sync::OnceLock<WorkerGuard> = std::sync::OnceLock::new();

/// Installs the global subscriber. With a log directory, events go to a daily
/// rolling JSON file; otherwise they go to stderr.
pub fn init_tracing(log_dir: Option<&Path>) -> Result<(), String> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let Some(log_dir) = log_dir else {
        return tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init()
            .map_err(|error| error.to_string());
    };

    std::fs::create_dir_all(log_dir).map_err(|error| error.to_string())?;
    let file_appender = tracing_appender::rolling::daily(log_dir, "daybook.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let _ = LOG_GUARD.set(guard);

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .with_writer(non_blocking)
        .try_init()
        .map_err(|error| error.to_string())
}
