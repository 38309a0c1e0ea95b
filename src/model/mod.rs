pub mod endpoint;
pub mod operation;
pub mod policy;
pub mod pool;
pub mod repository;
pub mod snapshot;

pub use endpoint::{Endpoint, SyncStatus};
pub use operation::{Operation, OperationKind, OperationStatus};
pub use policy::{ConflictResolution, SyncPolicy};
pub use pool::{Pool, PoolOverallStatus, PoolStatus};
pub use repository::{Repository, RepositoryInput, RepositoryPackage};
pub use snapshot::{PackageRecord, Snapshot, SystemStateReport};
