//! Typed step model parsed from the rules document.
//!
//! Step keys follow a naming convention: an exact keyword (`check`, `predefined`,
//! `comment`) or `<family>-<subtype>` (`labels-add`, `milestone-set`, `files-any`).
//! The convention is applied once, here, while the document loads.

use crate::core::rules::error::RuleError;
use serde_json::Value;

/// Mutation flavour derived from the key suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subtype {
    Add,
    Remove,
    Set,
}

impl Subtype {
    fn parse(family: &str, suffix: &str) -> Result<Self, RuleError> {
        match suffix {
            "add" => Ok(Subtype::Add),
            "remove" => Ok(Subtype::Remove),
            "set" => Ok(Subtype::Set),
            _ => Err(invalid_subtype(family, suffix)),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Subtype::Add => "add",
            Subtype::Remove => "remove",
            Subtype::Set => "set",
        }
    }
}

/// How a `files-*` step matches the changed file list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileMatch {
    Any,
    All,
    None,
}

impl FileMatch {
    fn parse(suffix: &str) -> Result<Self, RuleError> {
        match suffix {
            "any" => Ok(FileMatch::Any),
            "all" => Ok(FileMatch::All),
            "none" => Ok(FileMatch::None),
            _ => Err(invalid_subtype("files", suffix)),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FileMatch::Any => "any",
            FileMatch::All => "all",
            FileMatch::None => "none",
        }
    }
}

/// A single configured action.
#[derive(Debug, Clone)]
pub enum ActionSpec {
    Check(Value),
    Labels {
        subtype: Subtype,
        values: Vec<String>,
    },
    Milestone {
        subtype: Subtype,
        value: String,
    },
    Project {
        subtype: Subtype,
        value: String,
    },
    Comment {
        template: String,
    },
    Assignees {
        subtype: Subtype,
        values: Vec<String>,
    },
    Reviewers {
        subtype: Subtype,
        values: Vec<String>,
    },
    Variable {
        subtype: Subtype,
        name: String,
        value: String,
    },
    Files {
        mode: FileMatch,
        pattern: String,
        steps: StepSequence,
    },
    Predefined(String),
}

impl ActionSpec {
    /// Parse one `key: value` step entry.
    pub fn parse(key: &str, value: &Value) -> Result<Self, RuleError> {
        let key = key.trim().to_ascii_lowercase();
        match key.as_str() {
            "check" => return Ok(ActionSpec::Check(value.clone())),
            "predefined" => return Ok(ActionSpec::Predefined(scalar(&key, value)?)),
            "comment" => {
                return Ok(ActionSpec::Comment {
                    template: scalar(&key, value)?,
                })
            }
            _ => {}
        }

        let (family, suffix) = key
            .split_once('-')
            .ok_or_else(|| RuleError::InvalidActionType(key.clone()))?;
        match family {
            "labels" | "label" => Ok(ActionSpec::Labels {
                subtype: Subtype::parse(family, suffix)?,
                values: string_list(&key, value)?,
            }),
            "assignees" | "assignee" => Ok(ActionSpec::Assignees {
                subtype: Subtype::parse(family, suffix)?,
                values: string_list(&key, value)?,
            }),
            "reviewers" | "reviewer" => Ok(ActionSpec::Reviewers {
                subtype: Subtype::parse(family, suffix)?,
                values: string_list(&key, value)?,
            }),
            "milestone" => {
                let subtype = Subtype::parse(family, suffix)?;
                match subtype {
                    Subtype::Set => Ok(ActionSpec::Milestone {
                        subtype,
                        value: scalar(&key, value)?,
                    }),
                    Subtype::Remove => Ok(ActionSpec::Milestone {
                        subtype,
                        value: optional_scalar(value),
                    }),
                    Subtype::Add => Err(invalid_subtype(family, suffix)),
                }
            }
            "project" => {
                let subtype = Subtype::parse(family, suffix)?;
                if subtype == Subtype::Set {
                    return Err(invalid_subtype(family, suffix));
                }
                Ok(ActionSpec::Project {
                    subtype,
                    value: scalar(&key, value)?,
                })
            }
            "variable" => {
                let subtype = Subtype::parse(family, suffix)?;
                let (name, value) = variable_body(&key, subtype, value)?;
                Ok(ActionSpec::Variable {
                    subtype,
                    name,
                    value,
                })
            }
            "files" => {
                let mode = FileMatch::parse(suffix)?;
                let body = value
                    .as_object()
                    .ok_or_else(|| malformed(&key, "expected a mapping with pattern and steps"))?;
                let pattern = body
                    .get("pattern")
                    .and_then(Value::as_str)
                    .ok_or_else(|| malformed(&key, "missing pattern"))?
                    .to_string();
                let steps = body
                    .get("steps")
                    .ok_or_else(|| malformed(&key, "missing steps"))
                    .and_then(StepSequence::parse)?;
                Ok(ActionSpec::Files {
                    mode,
                    pattern,
                    steps,
                })
            }
            _ => Err(RuleError::InvalidActionType(key.clone())),
        }
    }

    /// Short label used in diagnostics and `validate` output.
    pub fn describe(&self) -> String {
        match self {
            ActionSpec::Check(_) => "check".to_string(),
            ActionSpec::Labels { subtype, values } => {
                format!("labels-{} {:?}", subtype.as_str(), values)
            }
            ActionSpec::Milestone { subtype, value } => {
                format!("milestone-{} {:?}", subtype.as_str(), value)
            }
            ActionSpec::Project { subtype, value } => {
                format!("project-{} {:?}", subtype.as_str(), value)
            }
            ActionSpec::Comment { .. } => "comment".to_string(),
            ActionSpec::Assignees { subtype, values } => {
                format!("assignees-{} {:?}", subtype.as_str(), values)
            }
            ActionSpec::Reviewers { subtype, values } => {
                format!("reviewers-{} {:?}", subtype.as_str(), values)
            }
            ActionSpec::Variable { subtype, name, .. } => {
                format!("variable-{} {}", subtype.as_str(), name)
            }
            ActionSpec::Files { mode, pattern, .. } => {
                format!("files-{} /{}/", mode.as_str(), pattern)
            }
            ActionSpec::Predefined(name) => format!("predefined {}", name),
        }
    }
}

/// One entry of a step sequence.
#[derive(Debug, Clone)]
pub enum StepNode {
    Action(ActionSpec),
    /// Nested list; runs as an AND-group.
    Group(StepSequence),
    /// Entry that failed to parse. Kept so compilation can report it in place.
    Malformed { key: String, error: RuleError },
}

/// Ordered list of steps.
#[derive(Debug, Clone, Default)]
pub struct StepSequence {
    pub steps: Vec<StepNode>,
}

impl StepSequence {
    /// Parse a YAML/JSON list into steps. Non-list input is rejected.
    pub fn parse(value: &Value) -> Result<Self, RuleError> {
        let items = value
            .as_array()
            .ok_or_else(|| RuleError::MalformedStep("step sequence must be a list".into()))?;
        Ok(Self {
            steps: items.iter().map(parse_step).collect(),
        })
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

fn parse_step(value: &Value) -> StepNode {
    match value {
        Value::Array(_) => match StepSequence::parse(value) {
            Ok(group) => StepNode::Group(group),
            Err(error) => StepNode::Malformed {
                key: "<group>".into(),
                error,
            },
        },
        Value::Object(map) => {
            let mut entries = map.iter();
            if let (Some((key, body)), None) = (entries.next(), entries.next()) {
                return match ActionSpec::parse(key, body) {
                    Ok(spec) => StepNode::Action(spec),
                    Err(error) => StepNode::Malformed {
                        key: key.clone(),
                        error,
                    },
                };
            }
            let keys: Vec<&str> = map.keys().map(String::as_str).collect();
            StepNode::Malformed {
                key: keys.join(","),
                error: RuleError::MalformedStep(format!(
                    "a step must have exactly one key, found [{}]",
                    keys.join(", ")
                )),
            }
        }
        other => StepNode::Malformed {
            key: other.to_string(),
            error: RuleError::MalformedStep(format!("unexpected step value {}", other)),
        },
    }
}

fn scalar(key: &str, value: &Value) -> Result<String, RuleError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        _ => Err(malformed(key, "expected a scalar value")),
    }
}

fn optional_scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    }
}

fn string_list(key: &str, value: &Value) -> Result<Vec<String>, RuleError> {
    match value {
        Value::Array(items) => items.iter().map(|item| scalar(key, item)).collect(),
        Value::Null => Ok(Vec::new()),
        other => Ok(vec![scalar(key, other)?]),
    }
}

fn variable_body(key: &str, subtype: Subtype, value: &Value) -> Result<(String, String), RuleError> {
    if subtype == Subtype::Remove {
        if let Some(name) = value.as_str() {
            return Ok((name.to_string(), String::new()));
        }
    }
    let body = value
        .as_object()
        .ok_or_else(|| malformed(key, "expected a mapping with name and value"))?;
    let name = body
        .get("name")
        .and_then(Value::as_str)
        .filter(|name| !name.trim().is_empty())
        .ok_or_else(|| malformed(key, "missing name"))?
        .to_string();
    let value = match body.get("value") {
        Some(v) => optional_scalar(v),
        None if subtype == Subtype::Remove => String::new(),
        None => return Err(malformed(key, "missing value")),
    };
    Ok((name, value))
}

fn invalid_subtype(family: &str, suffix: &str) -> RuleError {
    RuleError::InvalidActionSubtype {
        family: family.to_string(),
        subtype: suffix.to_string(),
    }
}

fn malformed(key: &str, detail: &str) -> RuleError {
    RuleError::MalformedStep(format!("{}: {}", key, detail))
}
