//! Shared primitive types used across the statistics engine.

/// Simulation time, in the model's time unit.
pub type SimTime = f64;

/// Index of a contact type. Inbound types come first, then outbound types.
pub type TypeIndex = usize;

/// Index of an agent group.
pub type GroupIndex = usize;

/// Index of a waiting queue.
pub type QueueIndex = usize;

/// A period as returned by period assignment. Negative means "excluded".
pub type PeriodIndex = i32;
