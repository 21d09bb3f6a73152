//! Worker event tools.
//!
//! These deliver the host runtime's install, activate and fetch events.

pub mod fetch;
pub mod lifecycle;

pub use fetch::{WorkerFetchOutput, WorkerFetchParams, fetch_impl};
pub use lifecycle::{activate_impl, install_impl};
