//! Parcel allocation and batch/vehicle lifecycle.
//!
//! Parcels are routed by volume into one open batch per size class. Batches
//! fill up, get a vehicle, are dispatched, travel and complete:
//!
//! ```text
//! confirm_parcel ──> InProgress ──(threshold)──> Full
//!                        │                        │
//!                        └──── assign + dispatch ─┴──> Ready ──> Transporting ──> Completed
//! ```
//!
//! All mutations go through a [`DispatchStore`], which applies each one
//! atomically. [`Dispatcher`] layers role checks, audit events and metrics
//! on top.

mod allocator;
mod config;
mod error;
mod ledger;
mod lifecycle;
mod ops;
mod sqlite_store;
mod store;
mod types;

pub use allocator::{batch_name_candidates, pick_batch_name};
pub use config::AllocatorConfig;
pub use error::DispatchError;
pub use ops::{AdminOps, Dispatcher, DriverOps, Missions};
pub use sqlite_store::SqliteDispatchStore;
pub use store::*;
pub use types::*;
