//! The function-lifecycle coordinator.
//!
//! The coordinator owns the function store and ties the machine and network
//! services together through their event ports: whenever a replica becomes
//! ready or exits, the machine-event loop drives the load-balancer
//! membership forward; whenever an invoke arrives for an idle function, the
//! resolver scales from zero and waits for readiness.
//!
//! The foreground [`Manager`] verbs serve the FaaS provider API; two
//! background loops consume events for the lifetime of the coordinator and
//! exit when its cancellation token fires.

mod coordinator;
mod error;
mod probe;

pub use coordinator::{Coordinator, Manager};
pub use error::{Error, ErrorKind, Result};
pub use probe::{HttpReadinessProbe, ReadinessProbe};
