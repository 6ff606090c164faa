//! The execution engine: agent activation, container scopes, and the
//! session-level run loop that ties the event log, hub, and deriver
//! together into a runnable workflow.

pub mod config;
pub mod container;
pub mod driver;
pub mod error;
pub mod retry;
pub mod scheduler;

pub use config::{Config, ConfigBuilder, ProviderMode};
pub use container::{run_foreach, run_loop, ChildExecutor};
pub use driver::{ExecutionDriver, RunOutcome};
pub use error::{ContainerError, CyclicDependencyError, EngineError, SchemaError};
pub use retry::RetryPolicy;
pub use scheduler::{activate, domain_event_for_stream_kind, pick, ActivationError, ActivationOutcome, ProviderMap, DEFAULT_PROVIDER_KEY};
