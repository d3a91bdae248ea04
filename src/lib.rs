//! Live detail view for a single remote replication job.
//!
//! The view combines an initial snapshot fetch, a shared push channel of
//! "job X changed" notifications and a user-confirmed stop request into one
//! consistent picture of the job. See [`detail`] for the synchronization
//! core and [`backend`] for the boundary it talks to.

pub mod backend;
pub mod cli;
pub mod config;
pub mod core;
pub mod detail;
pub mod logging;
pub mod rpc;
