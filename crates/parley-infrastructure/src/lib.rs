//! File-system implementations of the parley history contracts.

pub mod config_service;
pub mod partition_store;
pub mod paths;
pub mod sequence;
pub mod storage;

pub use crate::config_service::ConfigService;
pub use crate::partition_store::PartitionStore;
pub use crate::paths::ParleyPaths;
