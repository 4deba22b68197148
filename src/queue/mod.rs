pub mod reconciliation;

pub use reconciliation::{ReconciliationSweep, SweepReport};
