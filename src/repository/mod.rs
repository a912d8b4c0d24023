//! Domain repositories.

mod snapshot;
mod write_model;

pub use snapshot::SnapshotRepository;
pub use write_model::{Loaded, WriteModel, WriteModelRepository};
