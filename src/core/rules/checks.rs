//! Condition groups used by `check` steps.
//!
//! A group is a list (all entries must hold), a single mapping (every key must
//! hold) or a bare string, which is shorthand for `expr`.

use crate::core::rules::context::EventContext;
use crate::core::rules::error::RuleError;
use crate::core::rules::expression::{is_truthy, QueryEngine};
use regex::{Regex, RegexBuilder};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// A compiled condition.
pub trait CheckCondition: Send + Sync + fmt::Debug {
    /// `Err` means the condition could not be evaluated; callers treat it as false.
    fn evaluate(&self, ctx: &EventContext) -> Result<bool, RuleError>;
}

/// Compiles raw condition groups.
pub trait CheckEvaluator: Send + Sync {
    fn build(&self, group: &Value) -> Result<Box<dyn CheckCondition>, RuleError>;
}

/// The predicate library shipped with the engine.
pub struct BuiltinChecks {
    queries: Arc<QueryEngine>,
}

impl BuiltinChecks {
    pub fn new(queries: Arc<QueryEngine>) -> Self {
        Self { queries }
    }

    fn parse_group(&self, group: &Value) -> Result<Predicate, RuleError> {
        match group {
            Value::Array(items) => {
                if items.is_empty() {
                    return Err(RuleError::InvalidCheck("empty condition list".into()));
                }
                items
                    .iter()
                    .map(|item| self.parse_group(item))
                    .collect::<Result<Vec<_>, _>>()
                    .map(Predicate::All)
            }
            Value::Object(map) => {
                if map.is_empty() {
                    return Err(RuleError::InvalidCheck("empty condition mapping".into()));
                }
                let mut parts = map
                    .iter()
                    .map(|(key, value)| self.parse_predicate(key, value))
                    .collect::<Result<Vec<_>, _>>()?;
                if parts.len() == 1 {
                    Ok(parts.remove(0))
                } else {
                    Ok(Predicate::All(parts))
                }
            }
            Value::String(expr) => self.parse_predicate("expr", &Value::String(expr.clone())),
            Value::Bool(flag) => Ok(Predicate::Constant(*flag)),
            other => Err(RuleError::InvalidCheck(format!(
                "unsupported condition: {}",
                other
            ))),
        }
    }

    fn parse_predicate(&self, key: &str, value: &Value) -> Result<Predicate, RuleError> {
        match key.to_ascii_lowercase().as_str() {
            "expr" => {
                let expr = text(key, value)?;
                self.queries.compile(&expr)?;
                Ok(Predicate::Expr(expr))
            }
            "has-label" => Ok(Predicate::HasLabel(names(key, value)?)),
            "missing-label" => Ok(Predicate::MissingLabel(names(key, value)?)),
            "title-matches" => Ok(Predicate::TitleMatches(pattern(key, value)?)),
            "body-matches" => Ok(Predicate::BodyMatches(pattern(key, value)?)),
            "comment-matches" => Ok(Predicate::CommentMatches(pattern(key, value)?)),
            "author-in" => Ok(Predicate::AuthorIn(names(key, value)?)),
            "is-pull-request" => value
                .as_bool()
                .map(Predicate::IsPullRequest)
                .ok_or_else(|| RuleError::InvalidCheck(format!("{} expects a boolean", key))),
            "variable-equals" => {
                let body = value.as_object().ok_or_else(|| {
                    RuleError::InvalidCheck(format!("{} expects name and value", key))
                })?;
                let name = body
                    .get("name")
                    .and_then(Value::as_str)
                    .ok_or_else(|| RuleError::InvalidCheck(format!("{} missing name", key)))?;
                let expected = body.get("value").map(scalar_text).unwrap_or_default();
                Ok(Predicate::VariableEquals {
                    name: name.to_string(),
                    value: expected,
                })
            }
            "any" => {
                let items = value.as_array().ok_or_else(|| {
                    RuleError::InvalidCheck(format!("{} expects a list", key))
                })?;
                items
                    .iter()
                    .map(|item| self.parse_group(item))
                    .collect::<Result<Vec<_>, _>>()
                    .map(Predicate::Any)
            }
            "not" => Ok(Predicate::Not(Box::new(self.parse_group(value)?))),
            other => Err(RuleError::InvalidCheck(format!(
                "unknown condition '{}'",
                other
            ))),
        }
    }
}

impl CheckEvaluator for BuiltinChecks {
    fn build(&self, group: &Value) -> Result<Box<dyn CheckCondition>, RuleError> {
        Ok(Box::new(self.parse_group(group)?))
    }
}

#[derive(Debug)]
enum Predicate {
    Constant(bool),
    All(Vec<Predicate>),
    Any(Vec<Predicate>),
    Not(Box<Predicate>),
    Expr(String),
    HasLabel(Vec<String>),
    MissingLabel(Vec<String>),
    TitleMatches(Regex),
    BodyMatches(Regex),
    CommentMatches(Regex),
    AuthorIn(Vec<String>),
    IsPullRequest(bool),
    VariableEquals { name: String, value: String },
}

impl CheckCondition for Predicate {
    fn evaluate(&self, ctx: &EventContext) -> Result<bool, RuleError> {
        let target = ctx.target();
        Ok(match self {
            Predicate::Constant(flag) => *flag,
            Predicate::All(parts) => {
                for part in parts {
                    if !part.evaluate(ctx)? {
                        return Ok(false);
                    }
                }
                true
            }
            Predicate::Any(parts) => {
                for part in parts {
                    if part.evaluate(ctx)? {
                        return Ok(true);
                    }
                }
                false
            }
            Predicate::Not(inner) => !inner.evaluate(ctx)?,
            Predicate::Expr(expr) => is_truthy(&ctx.queries().evaluate(expr, &ctx.snapshot_json())?),
            Predicate::HasLabel(labels) => target
                .map(|item| labels.iter().all(|label| item.has_label(label)))
                .unwrap_or(false),
            Predicate::MissingLabel(labels) => target
                .map(|item| !labels.iter().any(|label| item.has_label(label)))
                .unwrap_or(true),
            Predicate::TitleMatches(regex) => target
                .map(|item| regex.is_match(&item.title))
                .unwrap_or(false),
            Predicate::BodyMatches(regex) => target
                .map(|item| regex.is_match(&item.body))
                .unwrap_or(false),
            Predicate::CommentMatches(regex) => ctx
                .comment
                .as_ref()
                .map(|comment| regex.is_match(&comment.body))
                .unwrap_or(false),
            Predicate::AuthorIn(logins) => {
                let author = ctx
                    .comment
                    .as_ref()
                    .map(|comment| comment.author.as_str())
                    .or_else(|| target.map(|item| item.author.as_str()))
                    .unwrap_or_default();
                logins.iter().any(|login| login.eq_ignore_ascii_case(author))
            }
            Predicate::IsPullRequest(expected) => ctx.is_pull_request() == *expected,
            Predicate::VariableEquals { name, value } => ctx
                .variables
                .get(name)
                .map(|actual| actual.trim().eq_ignore_ascii_case(value.trim()))
                .unwrap_or(false),
        })
    }
}

fn text(key: &str, value: &Value) -> Result<String, RuleError> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| RuleError::InvalidCheck(format!("{} expects a string", key)))
}

fn names(key: &str, value: &Value) -> Result<Vec<String>, RuleError> {
    match value {
        Value::String(s) => Ok(vec![s.clone()]),
        Value::Array(items) => items
            .iter()
            .map(|item| text(key, item))
            .collect::<Result<Vec<_>, _>>(),
        _ => Err(RuleError::InvalidCheck(format!(
            "{} expects a string or a list of strings",
            key
        ))),
    }
}

fn pattern(key: &str, value: &Value) -> Result<Regex, RuleError> {
    let source = text(key, value)?;
    RegexBuilder::new(&source)
        .case_insensitive(true)
        .build()
        .map_err(|err| RuleError::InvalidCheck(format!("{}: invalid pattern: {}", key, err)))
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
