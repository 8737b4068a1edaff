pub mod models;
pub mod repository;
pub mod service;

pub use models::{PointKind, PointsAward, PointsEntryModel, TargetRef};
pub use repository::{InMemoryPointsLedger, PointsLedgerRepository, PostgresPointsLedger};
pub use service::PointsService;
