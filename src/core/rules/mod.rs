//! Rule interpreter: document model, compilation, resolution and execution.

pub mod action;
pub mod actions;
pub mod builder;
pub mod checks;
pub mod context;
pub mod error;
pub mod expression;
pub mod metadata;
pub mod pool;
pub mod resolver;
pub mod runner;
pub mod schema;
pub mod step;
pub mod variables;

pub use action::{ActionNode, Flow};
pub use builder::{ActionTree, ActionTreeBuilder, Diagnostic};
pub use checks::{BuiltinChecks, CheckCondition, CheckEvaluator};
pub use context::{EventContext, Services};
pub use error::RuleError;
pub use expression::QueryEngine;
pub use metadata::{DocMetadata, MetadataExtractor};
pub use pool::{FlushReport, OperationPool};
pub use resolver::{apply_rerun, resolve, Resolution};
pub use schema::{ActionEntry, RuleDocument, MIN_SCHEMA_VERSION, RULES_FILE_PATH};
pub use step::{ActionSpec, StepNode, StepSequence, Subtype};
pub use variables::VariableTable;
