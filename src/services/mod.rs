pub mod sync_error;
pub use sync_error::SyncError;

pub mod normalizer;

pub mod upsert_service;
pub mod upsert_service_impl;
pub use upsert_service::{UpsertOutcome, UpsertService};
pub use upsert_service_impl::SeaOrmUpsertService;

pub mod sync_service;
pub use sync_service::{
    RetryPolicy, RunStatus, SyncReport, SyncRequest, SyncRequestError, SyncService, SyncSettings,
};

pub mod repair_service;
pub use repair_service::{RepairReport, RepairService};

pub mod scheduler;
pub use scheduler::Scheduler;
