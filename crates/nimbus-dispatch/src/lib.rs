//! nimbus-dispatch — request dispatcher for the Nimbus simulation.
//!
//! Routes incoming requests across a pool of simulated servers using a
//! pluggable balancing algorithm, runs background health-check, decay
//! and scaling loops, and exposes a status snapshot for drivers.

pub mod balancer;
pub mod dispatcher;
pub mod error;

pub use balancer::Algorithm;
pub use dispatcher::{Dispatch, Dispatcher, DispatcherStatus};
pub use error::{DispatchError, DispatchResult};
