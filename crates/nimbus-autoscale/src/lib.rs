//! nimbus-autoscale — request-rate driven instance scaling for the
//! Nimbus simulation.

pub mod scaler;

pub use scaler::{RequestScaler, ScalerStatus};
