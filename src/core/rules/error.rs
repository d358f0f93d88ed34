use crate::core::error::AppError;
use crate::core::types::ErrorCategory;

/// Failures raised while loading, compiling, resolving or evaluating repository rules.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RuleError {
    #[error("failed to parse rules document: {0}")]
    ConfigParse(String),
    #[error("schema out of date: document declares schema-version {found}, engine requires at least {minimum}")]
    SchemaTooOld { found: i64, minimum: i64 },
    #[error("invalid action type '{0}'")]
    InvalidActionType(String),
    #[error("invalid action subtype '{subtype}' for '{family}'")]
    InvalidActionSubtype { family: String, subtype: String },
    #[error("malformed step: {0}")]
    MalformedStep(String),
    #[error("predefined sequence '{0}' is not defined")]
    MissingPredefined(String),
    #[error("predefined sequence '{0}' includes itself")]
    PredefinedCycle(String),
    #[error("invalid check: {0}")]
    InvalidCheck(String),
    #[error("action '{from}' remaps to '{to}', which is itself a remap")]
    DoubleRemap { from: String, to: String },
    #[error("action '{0}' remaps to itself")]
    SelfRemap(String),
    #[error("action '{0}' is neither a step sequence nor an alias")]
    NotASequence(String),
    #[error("query failed: {0}")]
    Query(String),
}

impl RuleError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            RuleError::ConfigParse(_) | RuleError::SchemaTooOld { .. } => {
                ErrorCategory::ConfigurationError
            }
            RuleError::InvalidActionType(_)
            | RuleError::InvalidActionSubtype { .. }
            | RuleError::MalformedStep(_)
            | RuleError::MissingPredefined(_)
            | RuleError::PredefinedCycle(_)
            | RuleError::InvalidCheck(_) => ErrorCategory::CompilationError,
            RuleError::DoubleRemap { .. } | RuleError::SelfRemap(_) | RuleError::NotASequence(_) => {
                ErrorCategory::ResolutionError
            }
            RuleError::Query(_) => ErrorCategory::QueryError,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            RuleError::ConfigParse(_) => "RULE-CFG-001",
            RuleError::SchemaTooOld { .. } => "RULE-CFG-002",
            RuleError::InvalidActionType(_) => "RULE-BUILD-001",
            RuleError::InvalidActionSubtype { .. } => "RULE-BUILD-002",
            RuleError::MalformedStep(_) => "RULE-BUILD-003",
            RuleError::MissingPredefined(_) => "RULE-BUILD-004",
            RuleError::PredefinedCycle(_) => "RULE-BUILD-005",
            RuleError::InvalidCheck(_) => "RULE-BUILD-006",
            RuleError::DoubleRemap { .. } => "RULE-RESOLVE-001",
            RuleError::SelfRemap(_) => "RULE-RESOLVE-002",
            RuleError::NotASequence(_) => "RULE-RESOLVE-003",
            RuleError::Query(_) => "RULE-QUERY-001",
        }
    }
}

impl From<RuleError> for AppError {
    fn from(err: RuleError) -> Self {
        AppError::new(err.category(), err.to_string()).with_code(err.code())
    }
}
