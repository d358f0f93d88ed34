pub mod config;
pub mod engine;
pub mod error;
pub mod github;
pub mod http;
pub mod rules;
pub mod types;
pub mod webhook;

pub use config::EngineConfig;
pub use engine::{Delivery, InvocationOutcome, OutcomeStatus, RuleEngine, RulesSource};
pub use error::{AppError, DefaultErrorReporter, ErrorReporter};
pub use types::*;
