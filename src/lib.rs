//! Client-side local store for the DocSync document database SDK.
//!
//! This crate is the subsystem where user writes, server snapshots, and
//! durable on-device persistence meet. It maintains the mutation queue of
//! unacknowledged writes, the cache of last-known server document states,
//! and the registry of server-side listen targets, and it materializes the
//! latency-compensated local view that reads and queries observe.
//!
//! All operations run inside retriable transactions over a pluggable
//! persistence engine ([`local::Persistence`]); an in-memory engine is
//! provided for single-process use and testing. Precomputed query results
//! can be ingested out-of-band through the [`bundle`] module.

pub mod bundle;
pub mod error;
pub mod local;
pub mod model;
pub mod mutation;
pub mod query;
pub mod remote;
pub mod user;
pub mod util;
pub mod value;

pub use error::{DocSyncError, DocSyncErrorCode, DocSyncResult};
pub use local::{LocalStore, LocalWriteResult, QueryResult, UserChangeResult};
pub use user::User;
