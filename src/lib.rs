pub mod application;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod logging;

pub use application::bootstrap::{bootstrap_workspace, BootstrapResult};
pub use application::schedule_service::{
    FactDraft, PlanDraft, ScheduleOutcome, SchedulePlansRequest, ScheduleService,
};
pub use domain::approval::StatusChangeConsent;
pub use domain::conflict_policy::ConflictPolicy;
pub use domain::consolidator::{DateCell, ShiftDetails};
pub use domain::models::{
    ApprovalStatus, ChangeHistoryEntry, ShiftOwner, ShiftRecord, Timeline,
};
pub use error::{ConflictPair, ScheduleError, ScheduleResult};
pub use infrastructure::catalog::{CatalogRepository, InMemoryCatalogRepository};
pub use infrastructure::config::EngineConfig;
pub use infrastructure::permissions::{PermissionResolver, StaticPermissionResolver};
pub use logging::init_tracing;
