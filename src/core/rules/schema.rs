#![allow(clippy::result_large_err)] // Loader returns AppError to keep file diagnostics next to the parse failure.

use crate::core::error::AppError;
use crate::core::rules::error::RuleError;
use crate::core::rules::step::StepSequence;
use crate::core::types::{ErrorCategory, EventKind};
use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Location of the rules file inside the target repository.
pub const RULES_FILE_PATH: &str = ".github/rulebot.yml";

/// Oldest `schema-version` this engine accepts.
pub const MIN_SCHEMA_VERSION: i64 = 5;

/// Settings block (`config:`) of the rules document.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SettingsConfig {
    #[serde(default, rename = "docMetadata")]
    pub doc_metadata: DocMetadataSettings,
}

/// Patterns driving the document-metadata extractor.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocMetadataSettings {
    /// Each entry is an ordered list of line prefixes; `""` matches any line.
    #[serde(default)]
    pub headers: Vec<Vec<String>>,
    #[serde(default)]
    pub content_url_regex: Vec<String>,
    /// Two capture groups: key, value.
    #[serde(default)]
    pub parser_regex: Option<String>,
}

/// What an action name maps to under an event type.
#[derive(Debug, Clone)]
pub enum ActionEntry {
    Sequence(StepSequence),
    Alias(String),
    /// Anything else; kept so resolution can reject it with context.
    Other(String),
}

/// Parsed, validated rules document. Immutable after load.
#[derive(Debug, Clone)]
pub struct RuleDocument {
    pub revision: i64,
    pub schema_version: i64,
    pub owner_alias: String,
    pub settings: SettingsConfig,
    pub events: HashMap<EventKind, IndexMap<String, ActionEntry>>,
    pub predefined: IndexMap<String, StepSequence>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RawRuleDocument {
    revision: i64,
    schema_version: i64,
    owner_ms_alias: String,
    config: SettingsConfig,
    #[serde(default)]
    predefined: IndexMap<String, Value>,
    #[serde(default)]
    issues: IndexMap<String, Value>,
    #[serde(default, rename = "pull_request")]
    pull_request: IndexMap<String, Value>,
    #[serde(default, rename = "issue_comment")]
    issue_comment: IndexMap<String, Value>,
    #[serde(default, rename = "projects_v2_item")]
    projects_v2_item: IndexMap<String, Value>,
}

impl RuleDocument {
    /// Parse rules text and enforce the minimum schema version.
    pub fn parse(text: &str) -> Result<Self, RuleError> {
        let tree: serde_yaml::Value =
            serde_yaml::from_str(text).map_err(|err| RuleError::ConfigParse(err.to_string()))?;
        // Older documents may not match the current shape at all; check the version first.
        if let Some(found) = tree.get("schema-version").and_then(serde_yaml::Value::as_i64) {
            if found < MIN_SCHEMA_VERSION {
                return Err(RuleError::SchemaTooOld {
                    found,
                    minimum: MIN_SCHEMA_VERSION,
                });
            }
        }
        let raw: RawRuleDocument =
            serde_yaml::from_value(tree).map_err(|err| RuleError::ConfigParse(err.to_string()))?;
        validate_settings(&raw.config)?;

        let mut predefined = IndexMap::new();
        for (name, value) in &raw.predefined {
            let sequence = StepSequence::parse(value).map_err(|_| {
                RuleError::ConfigParse(format!("predefined '{}' must be a step sequence", name))
            })?;
            predefined.insert(name.clone(), sequence);
        }

        let mut events = HashMap::new();
        events.insert(EventKind::Issues, action_entries(&raw.issues));
        events.insert(EventKind::PullRequest, action_entries(&raw.pull_request));
        events.insert(EventKind::IssueComment, action_entries(&raw.issue_comment));
        events.insert(
            EventKind::ProjectsV2Item,
            action_entries(&raw.projects_v2_item),
        );

        Ok(RuleDocument {
            revision: raw.revision,
            schema_version: raw.schema_version,
            owner_alias: raw.owner_ms_alias,
            settings: raw.config,
            events,
            predefined,
        })
    }

    /// Load and validate a rules document from a YAML file.
    pub fn load_from_file(path: &Path) -> Result<Self, AppError> {
        let text = fs::read_to_string(path).map_err(|err| {
            AppError::new(
                ErrorCategory::IoError,
                format!("failed to read {}: {}", path.display(), err),
            )
        })?;
        Self::parse(&text).map_err(|err| {
            AppError::from(err).with_context(format!("rules file {}", path.display()))
        })
    }

    /// Configured actions for one event type.
    pub fn actions(&self, kind: EventKind) -> Option<&IndexMap<String, ActionEntry>> {
        self.events.get(&kind)
    }
}

fn action_entries(raw: &IndexMap<String, Value>) -> IndexMap<String, ActionEntry> {
    raw.iter()
        .map(|(name, value)| {
            let entry = match value {
                Value::Array(_) => match StepSequence::parse(value) {
                    Ok(sequence) => ActionEntry::Sequence(sequence),
                    Err(err) => ActionEntry::Other(err.to_string()),
                },
                Value::String(target) => ActionEntry::Alias(target.trim().to_string()),
                Value::Null => ActionEntry::Other("null".to_string()),
                Value::Object(_) => ActionEntry::Other("mapping".to_string()),
                other => ActionEntry::Other(other.to_string()),
            };
            (name.clone(), entry)
        })
        .collect()
}

fn validate_settings(settings: &SettingsConfig) -> Result<(), RuleError> {
    let doc = &settings.doc_metadata;
    if let Some(pattern) = &doc.parser_regex {
        let regex = Regex::new(pattern).map_err(|err| {
            RuleError::ConfigParse(format!("config.docMetadata.parserRegex: {}", err))
        })?;
        if regex.captures_len() < 3 {
            return Err(RuleError::ConfigParse(
                "config.docMetadata.parserRegex must have two capture groups".into(),
            ));
        }
    }
    for pattern in &doc.content_url_regex {
        Regex::new(pattern).map_err(|err| {
            RuleError::ConfigParse(format!("config.docMetadata.contentUrlRegex: {}", err))
        })?;
    }
    if doc.headers.iter().any(|set| set.is_empty()) {
        return Err(RuleError::ConfigParse(
            "config.docMetadata.headers entries must not be empty".into(),
        ));
    }
    Ok(())
}
