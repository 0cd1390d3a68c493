//! Signal-triggered task graph execution.
//!
//! Units declare the signals they consume and produce. A unit becomes
//! runnable once every consumed signal has a version newer than the one the
//! unit observed at its last successful run. Units without inputs are roots
//! and run once per [`Scheduler::run`].

mod graph;
mod retry;
mod scheduler;
mod signal;
mod unit;

pub use graph::Dag;
pub use retry::{RetryPolicy, UnitOutcome};
pub use scheduler::{RunReport, Scheduler, UnitReport};
pub use signal::{Signal, SignalVersion, TriggerTable};
pub use unit::{Unit, UnitKind, UnitSpec, UnitState};
