//! Palisade - identity and access management core
//!
//! An event-sourced write model with per-aggregate optimistic concurrency,
//! asynchronous projections with read-after-write consistency, and
//! hierarchical multi-tenant permission resolution.

pub mod aggregate;
pub mod authz;
pub mod cascade;
pub mod command;
pub mod config;
pub mod consistency;
pub mod error;
pub mod facade;
pub mod model;
pub mod projection;
pub mod query;
pub mod repository;
pub mod storage;
pub mod utils;

pub use authz::PermissionContext;
pub use command::Command;
pub use config::Config;
pub use consistency::{cancel_pair, CancelHandle, CancelSignal};
pub use error::{Error, Result};
pub use facade::{Palisade, PalisadeBuilder, SetupError};
pub use model::{ChangeReceipt, Event};
pub use query::{ListOptions, ListResult, Query, QueryResult};
