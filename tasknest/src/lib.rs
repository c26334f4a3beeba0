//! `TaskNest` — offline-first task synchronization engine.
//!
//! Keeps a durable local cache of tasks consistent with a remote
//! per-user document store while serving low-latency reads and writes
//! to the UI layer and computing reminder side-effects. The UI, the
//! remote backend, authentication, and OS notification delivery are
//! external collaborators reached through the traits in this crate.

pub mod cache;
pub mod config;
pub mod reminder;
pub mod remote;
pub mod repository;
pub mod session;
pub mod sync;
