//! Parallel execution of factor graph schedules.
//!
//! A [`schedule::Schedule`] is flattened, unrolled over the requested number
//! of iterations and linked by data hazards into a [`dag::DependencyGraph`].
//! The [`runtime::Executor`] then runs every task on a pool of worker threads
//! in an order equivalent to the sequential one.

#[macro_use]
extern crate serde_derive;
#[macro_use]
extern crate log;
#[macro_use]
extern crate lazy_static;
#[macro_use]
extern crate anyhow;
#[macro_use]
extern crate atomic_enum;

pub mod api;
pub mod dag;
pub mod engine;
pub mod metrics;
pub mod model;
pub mod runtime;
pub mod schedule;
pub mod solvers;
pub mod utils;

pub use engine::{Engine, EngineConfig};
pub use model::{FactorGraph, FactorTable, NodeId};
pub use solvers::{Solver, SolverKind};
