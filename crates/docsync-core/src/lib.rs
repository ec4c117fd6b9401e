//! docsync Core
//!
//! The plugin contract and the scheduler that drives it:
//! - [`PluginResult`]: what a connector produces
//! - [`PluginDescriptor`]: how a plugin is declared
//! - [`SourceConnector`] / [`ConnectorRegistry`]: connector seam and lookup
//! - [`ExecutionPlan`]: validated, ordered plugin set
//! - [`Scheduler`]: bounded, isolated execution with a [`ResultHandler`]
//!
//! # Example
//!
//! ```rust,ignore
//! let plan = ExecutionPlan::load(descriptors, &registry)?;
//! let scheduler = Scheduler::new(plan, Arc::new(reconciler));
//! let report = scheduler.run(&RunContext::new(cursor_reader), 4).await;
//! std::process::exit(report.exit_status().code());
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod connector;
pub mod descriptor;
pub mod error;
pub mod outcome;
pub mod plan;
pub mod registry;
pub mod result;
pub mod scheduler;

pub use connector::{PluginContext, SourceConnector};
pub use descriptor::{DependencyPolicy, PluginConfig, PluginDescriptor};
pub use error::{BoxError, ConfigurationError, ConnectorError, SchedulerError};
pub use outcome::{ExitStatus, PluginOutcome, PluginStatus, RunReport};
pub use plan::{ExecutionPlan, PlannedPlugin};
pub use registry::{ConnectorFactory, ConnectorRegistry};
pub use result::{Payload, PluginResult, DEFAULT_EXTENSION, EXTENSION_METADATA_KEY, VERSION_METADATA_KEY};
pub use scheduler::{ResultHandler, RunContext, Scheduler, SyncReceipt, DEFAULT_PLUGIN_TIMEOUT};
