//! Online statistics engine of a call-center simulator.
//!
//! Events from the simulation core are reduced into accumulator matrices
//! by the measure manager; after each replication (or window) the
//! reshaping cache turns them into observations for the statistic
//! builders.

pub mod cache;
pub mod callcenter_stat;
pub mod checkers;
pub mod config;
pub mod counters;
pub mod error;
pub mod event;
pub mod integral;
pub mod layout;
pub mod manager;
pub mod matrix;
pub mod measure_type;
pub mod performance;
pub mod period;
pub mod segment;
pub mod store;
pub mod strategy;
pub mod tally;
pub mod types;
