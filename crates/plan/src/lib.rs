//! # Steward Plan
//!
//! Operation catalog and plan construction.
//!
//! - [`Operation`] describes one kind of privileged action: target kind,
//!   idempotency, compensation, typed parameters, preconditions, the command
//!   template and an optional reconciliation check.
//! - [`OperationRegistryBuilder`] validates declarations and freezes them
//!   into an immutable [`OperationRegistry`].
//! - [`catalog`] holds the standard cluster, host and etcd operations.
//! - [`PlanTemplate`] and [`MaintenanceTask`] describe what to do;
//!   [`PlanBuilder`] expands them into a [`PlanDefinition`], a DAG of
//!   [`PlannedStep`]s checked with [`PlanGraph`].

pub mod builder;
pub mod catalog;
pub mod command;
pub mod definition;
pub mod error;
pub mod graph;
pub mod operation;
pub mod probe;
pub mod registry;
pub mod task;
pub mod template;

pub use builder::PlanBuilder;
pub use command::{CommandTemplate, RenderedCommand};
pub use definition::{PlanDefinition, PlannedStep};
pub use error::PlanError;
pub use graph::PlanGraph;
pub use operation::{LockScope, LockSpec, Operation};
pub use probe::{Expectation, Probe, RenderedProbe};
pub use registry::{OperationRegistry, OperationRegistryBuilder};
pub use task::{MaintenanceTask, NodeRole, TaskKind};
pub use template::{PlanTemplate, TemplateStep};
