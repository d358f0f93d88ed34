#![allow(clippy::result_large_err)]

use crate::core::error::AppError;
use crate::core::github::{CommentSnapshot, ItemSnapshot, RepoClient};
use crate::core::http::PageFetcher;
use crate::core::rules::expression::QueryEngine;
use crate::core::rules::metadata::{DocMetadata, MetadataExtractor};
use crate::core::rules::pool::{FlushReport, OperationPool};
use crate::core::rules::schema::RuleDocument;
use crate::core::rules::variables::{self, VariableTable};
use crate::core::types::{ErrorCategory, EventKind, RepoRef};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, warn};

/// Collaborators shared by every invocation.
#[derive(Clone)]
pub struct Services {
    pub client: Arc<dyn RepoClient>,
    pub fetcher: Arc<dyn PageFetcher>,
    pub queries: Arc<QueryEngine>,
}

/// Mutable state of one webhook delivery.
pub struct EventContext {
    pub kind: EventKind,
    /// Action name as delivered.
    pub raw_action: String,
    /// Current action name; rewritten by rerun labels and aliases.
    pub action: String,
    pub delivery: Option<String>,
    pub repository: RepoRef,
    pub issue: Option<ItemSnapshot>,
    pub pull_request: Option<ItemSnapshot>,
    pub comment: Option<CommentSnapshot>,
    /// Node id of the issue/PR behind a `projects_v2_item` event.
    pub project_content_id: Option<String>,
    pub payload: Value,
    pub rules: Arc<RuleDocument>,
    pub variables: VariableTable,
    pub doc_metadata: DocMetadata,
    pub operations: OperationPool,
    pub has_failure: bool,
    pub failure_message: String,
    changed_files: Option<Vec<String>>,
    services: Services,
}

impl EventContext {
    /// Build the context from a webhook payload.
    pub fn from_payload(
        kind: EventKind,
        payload: Value,
        rules: Arc<RuleDocument>,
        services: Services,
    ) -> Result<Self, AppError> {
        let action = payload
            .get("action")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let repository = payload
            .pointer("/repository/full_name")
            .and_then(Value::as_str)
            .and_then(RepoRef::parse)
            .unwrap_or_else(|| services.client.repository().clone());

        let issue = snapshot(&payload, "issue")?;
        let pull_request = snapshot(&payload, "pull_request")?;
        let comment = match payload.get("comment") {
            Some(value) if !value.is_null() => {
                Some(CommentSnapshot::from_value(value).map_err(|err| payload_error("comment", err))?)
            }
            _ => None,
        };
        let project_content_id = payload
            .pointer("/projects_v2_item/content_node_id")
            .and_then(Value::as_str)
            .map(str::to_string);

        let mut ctx = EventContext {
            kind,
            raw_action: action.clone(),
            action,
            delivery: None,
            repository,
            issue,
            pull_request,
            comment,
            project_content_id,
            payload,
            rules,
            variables: VariableTable::new(),
            doc_metadata: DocMetadata::new(),
            operations: OperationPool::new(),
            has_failure: false,
            failure_message: String::new(),
            changed_files: None,
            services,
        };
        ctx.seed_variables();
        Ok(ctx)
    }

    pub fn with_delivery(mut self, delivery: Option<String>) -> Self {
        self.delivery = delivery;
        self
    }

    pub fn client(&self) -> &dyn RepoClient {
        self.services.client.as_ref()
    }

    pub fn queries(&self) -> &QueryEngine {
        self.services.queries.as_ref()
    }

    /// The issue or pull request mutations apply to.
    pub fn target(&self) -> Option<&ItemSnapshot> {
        self.pull_request.as_ref().or(self.issue.as_ref())
    }

    pub fn is_pull_request(&self) -> bool {
        self.target().map(|item| item.is_pull_request).unwrap_or(false)
    }

    /// Node id used by project mutations.
    pub fn content_node_id(&self) -> Option<&str> {
        self.project_content_id
            .as_deref()
            .or_else(|| self.target().map(|item| item.node_id.as_str()))
            .filter(|id| !id.is_empty())
    }

    pub fn set_action(&mut self, action: &str) {
        self.action = action.to_string();
        self.variables.set("action", action);
    }

    /// Record a non-fatal failure; the walk continues but the outcome reports it.
    pub fn mark_failure(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!(event = %self.kind, action = %self.action, "{}", message);
        if self.failure_message.is_empty() {
            self.failure_message = message;
        } else {
            self.failure_message.push_str("; ");
            self.failure_message.push_str(&message);
        }
        self.has_failure = true;
    }

    /// JSON view of the live state used by queries and `expr` checks.
    pub fn snapshot_json(&self) -> Value {
        json!({
            "event": self.kind.as_str(),
            "action": self.action,
            "issue": self.issue,
            "pull_request": self.pull_request,
            "comment": self.comment,
            "operations": self.operations,
            "variables": self.variables,
            "payload": self.payload,
        })
    }

    /// Resolve a template: `$expr:` queries or `$name$` substitution.
    pub fn expand(&mut self, template: &str) -> String {
        let Some(query) = variables::query_body(template) else {
            return variables::substitute(template, &self.variables);
        };
        let snapshot = self.snapshot_json();
        match self.queries().evaluate(query, &snapshot) {
            Ok(value) => variables::render_query_result(&value),
            Err(err) => {
                self.mark_failure(format!("query failed: {}", err));
                String::new()
            }
        }
    }

    /// Extract document metadata once and copy it into the variable table.
    pub async fn ensure_doc_metadata(&mut self) {
        if !self.doc_metadata.is_empty() {
            return;
        }
        let settings = &self.rules.settings.doc_metadata;
        if settings.headers.is_empty() && settings.content_url_regex.is_empty() {
            return;
        }
        let Some(body) = self.target().map(|item| item.body.clone()) else {
            return;
        };
        let rules = Arc::clone(&self.rules);
        let fetcher = Arc::clone(&self.services.fetcher);
        MetadataExtractor::new(fetcher.as_ref())
            .extract(&body, &rules.settings.doc_metadata, &mut self.doc_metadata)
            .await;
        debug!(fields = self.doc_metadata.len(), "document metadata extracted");
        self.variables.extend(self.doc_metadata.iter());
    }

    /// Changed file paths of the pull request, fetched once.
    pub async fn changed_files(&mut self) -> Result<&[String], AppError> {
        if self.changed_files.is_none() {
            let files = match self.target() {
                Some(item) if item.is_pull_request => {
                    self.client().list_pull_request_files(item.number).await?
                }
                _ => Vec::new(),
            };
            self.changed_files = Some(files);
        }
        Ok(self.changed_files.as_deref().unwrap_or_default())
    }

    /// Re-read the issue, pull request and comment from upstream.
    pub async fn refresh(&mut self) -> Result<(), AppError> {
        let client = Arc::clone(&self.services.client);
        if let Some(number) = self.issue.as_ref().map(|item| item.number) {
            self.issue = Some(client.get_issue(number).await?);
        }
        if let Some(number) = self.pull_request.as_ref().map(|item| item.number) {
            self.pull_request = Some(client.get_pull_request(number).await?);
        }
        if let Some(id) = self.comment.as_ref().map(|comment| comment.id) {
            self.comment = Some(client.get_comment(id).await?);
        }
        self.changed_files = None;
        self.seed_variables();
        Ok(())
    }

    /// Send pooled operations upstream.
    pub async fn flush(&mut self) -> Result<FlushReport, AppError> {
        let client = Arc::clone(&self.services.client);
        let target = self.target().cloned();
        self.operations.flush(client.as_ref(), target.as_ref()).await
    }

    fn seed_variables(&mut self) {
        self.variables.set("event", self.kind.as_str());
        self.variables.set("action", self.action.clone());
        self.variables.set("repo", self.repository.name.clone());
        self.variables.set("owner", self.repository.owner.clone());
        let (number, title, author) = match self.target() {
            Some(item) => (item.number.to_string(), item.title.clone(), item.author.clone()),
            None => Default::default(),
        };
        self.variables.set("number", number);
        self.variables.set("title", title);
        self.variables.set("author", author);
        // Metadata fields win over built-ins.
        let metadata = std::mem::take(&mut self.doc_metadata);
        self.variables.extend(metadata.iter());
        self.doc_metadata = metadata;
    }
}

fn snapshot(payload: &Value, key: &str) -> Result<Option<ItemSnapshot>, AppError> {
    match payload.get(key) {
        Some(value) if !value.is_null() => {
            let mut item = ItemSnapshot::from_value(value).map_err(|err| payload_error(key, err))?;
            item.is_pull_request |= key == "pull_request";
            Ok(Some(item))
        }
        _ => Ok(None),
    }
}

fn payload_error(key: &str, err: serde_json::Error) -> AppError {
    AppError::new(
        ErrorCategory::ValidationError,
        format!("invalid '{}' object in payload: {}", key, err),
    )
    .with_code("RULE-PAYLOAD-001")
}
