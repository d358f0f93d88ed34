//! Clients that record mutations instead of (or in front of) sending them.

#![allow(clippy::result_large_err)]

use super::{CommentSnapshot, ItemSnapshot, RepoClient};
use crate::core::error::AppError;
use crate::core::types::{ErrorCategory, RepoRef};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::info;

/// One outbound write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Mutation {
    AddLabels { number: u64, labels: Vec<String> },
    RemoveLabels { number: u64, labels: Vec<String> },
    AddAssignees { number: u64, logins: Vec<String> },
    RemoveAssignees { number: u64, logins: Vec<String> },
    AddReviewers { number: u64, logins: Vec<String> },
    RemoveReviewers { number: u64, logins: Vec<String> },
    PostComment { number: u64, body: String },
    SetMilestone { number: u64, title: Option<String> },
    AddToProject { content_id: String, project_id: String },
    RemoveFromProject { content_id: String, project_id: String },
}

/// Shared, append-only list of mutations.
#[derive(Debug, Clone, Default)]
pub struct MutationLog {
    entries: Arc<Mutex<Vec<Mutation>>>,
}

impl MutationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, mutation: Mutation) {
        lock(&self.entries).push(mutation);
    }

    pub fn entries(&self) -> Vec<Mutation> {
        lock(&self.entries).clone()
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.entries).is_empty()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Reads go to the wrapped client; writes are logged and recorded only.
pub struct DryRunClient {
    inner: Arc<dyn RepoClient>,
    log: MutationLog,
}

impl DryRunClient {
    pub fn new(inner: Arc<dyn RepoClient>) -> Self {
        Self {
            inner,
            log: MutationLog::new(),
        }
    }

    pub fn log(&self) -> &MutationLog {
        &self.log
    }

    fn suppress(&self, mutation: Mutation) -> Result<(), AppError> {
        info!(dry_run = true, repo = %self.inner.repository(), ?mutation, "mutation suppressed");
        self.log.push(mutation);
        Ok(())
    }
}

#[async_trait]
impl RepoClient for DryRunClient {
    fn repository(&self) -> &RepoRef {
        self.inner.repository()
    }

    async fn fetch_rules_file(&self, path: &str) -> Result<Option<String>, AppError> {
        self.inner.fetch_rules_file(path).await
    }

    async fn get_issue(&self, number: u64) -> Result<ItemSnapshot, AppError> {
        self.inner.get_issue(number).await
    }

    async fn get_pull_request(&self, number: u64) -> Result<ItemSnapshot, AppError> {
        self.inner.get_pull_request(number).await
    }

    async fn get_comment(&self, id: u64) -> Result<CommentSnapshot, AppError> {
        self.inner.get_comment(id).await
    }

    async fn list_pull_request_files(&self, number: u64) -> Result<Vec<String>, AppError> {
        self.inner.list_pull_request_files(number).await
    }

    async fn add_labels(&self, number: u64, labels: &[String]) -> Result<(), AppError> {
        self.suppress(Mutation::AddLabels {
            number,
            labels: labels.to_vec(),
        })
    }

    async fn remove_labels(&self, number: u64, labels: &[String]) -> Result<(), AppError> {
        self.suppress(Mutation::RemoveLabels {
            number,
            labels: labels.to_vec(),
        })
    }

    async fn add_assignees(&self, number: u64, logins: &[String]) -> Result<(), AppError> {
        self.suppress(Mutation::AddAssignees {
            number,
            logins: logins.to_vec(),
        })
    }

    async fn remove_assignees(&self, number: u64, logins: &[String]) -> Result<(), AppError> {
        self.suppress(Mutation::RemoveAssignees {
            number,
            logins: logins.to_vec(),
        })
    }

    async fn add_reviewers(&self, number: u64, logins: &[String]) -> Result<(), AppError> {
        self.suppress(Mutation::AddReviewers {
            number,
            logins: logins.to_vec(),
        })
    }

    async fn remove_reviewers(&self, number: u64, logins: &[String]) -> Result<(), AppError> {
        self.suppress(Mutation::RemoveReviewers {
            number,
            logins: logins.to_vec(),
        })
    }

    async fn post_comment(&self, number: u64, body: &str) -> Result<(), AppError> {
        self.suppress(Mutation::PostComment {
            number,
            body: body.to_string(),
        })
    }

    async fn set_milestone(&self, number: u64, title: Option<&str>) -> Result<(), AppError> {
        self.suppress(Mutation::SetMilestone {
            number,
            title: title.map(str::to_string),
        })
    }

    async fn add_to_project(&self, content_id: &str, project_id: &str) -> Result<(), AppError> {
        self.suppress(Mutation::AddToProject {
            content_id: content_id.to_string(),
            project_id: project_id.to_string(),
        })
    }

    async fn remove_from_project(
        &self,
        content_id: &str,
        project_id: &str,
    ) -> Result<(), AppError> {
        self.suppress(Mutation::RemoveFromProject {
            content_id: content_id.to_string(),
            project_id: project_id.to_string(),
        })
    }
}

#[derive(Debug, Default)]
struct OfflineState {
    issues: HashMap<u64, ItemSnapshot>,
    pulls: HashMap<u64, ItemSnapshot>,
    comments: HashMap<u64, CommentSnapshot>,
    files: HashMap<u64, Vec<String>>,
}

impl OfflineState {
    /// Every stored copy of item `number` (an issue and its pull request view).
    fn items_mut(&mut self, number: u64) -> impl Iterator<Item = &mut ItemSnapshot> + '_ {
        self.issues
            .get_mut(&number)
            .into_iter()
            .chain(self.pulls.get_mut(&number))
    }

    fn apply(&mut self, mutation: &Mutation) {
        match mutation {
            Mutation::AddLabels { number, labels } => {
                for item in self.items_mut(*number) {
                    merge(&mut item.labels, labels);
                }
            }
            Mutation::RemoveLabels { number, labels } => {
                for item in self.items_mut(*number) {
                    subtract(&mut item.labels, labels);
                }
            }
            Mutation::AddAssignees { number, logins } => {
                for item in self.items_mut(*number) {
                    merge(&mut item.assignees, logins);
                }
            }
            Mutation::RemoveAssignees { number, logins } => {
                for item in self.items_mut(*number) {
                    subtract(&mut item.assignees, logins);
                }
            }
            Mutation::AddReviewers { number, logins } => {
                for item in self.items_mut(*number) {
                    merge(&mut item.requested_reviewers, logins);
                }
            }
            Mutation::RemoveReviewers { number, logins } => {
                for item in self.items_mut(*number) {
                    subtract(&mut item.requested_reviewers, logins);
                }
            }
            Mutation::SetMilestone { number, title } => {
                for item in self.items_mut(*number) {
                    item.milestone = title.clone();
                }
            }
            Mutation::PostComment { .. }
            | Mutation::AddToProject { .. }
            | Mutation::RemoveFromProject { .. } => {}
        }
    }
}

fn merge(current: &mut Vec<String>, values: &[String]) {
    for value in values {
        if !current.iter().any(|c| c.eq_ignore_ascii_case(value)) {
            current.push(value.clone());
        }
    }
}

fn subtract(current: &mut Vec<String>, values: &[String]) {
    current.retain(|c| !values.iter().any(|v| v.eq_ignore_ascii_case(c)));
}

/// In-memory repository used by `rulebot run` and tests.
///
/// Writes are recorded and applied to the seeded items, so later reads observe them.
pub struct OfflineClient {
    repo: RepoRef,
    rules: Option<String>,
    state: Mutex<OfflineState>,
    log: MutationLog,
}

impl OfflineClient {
    pub fn new(repo: RepoRef) -> Self {
        Self {
            repo,
            rules: None,
            state: Mutex::new(OfflineState::default()),
            log: MutationLog::new(),
        }
    }

    /// Seed items from a webhook payload's `issue`, `pull_request` and `comment` objects.
    pub fn from_payload(repo: RepoRef, payload: &Value) -> Result<Self, AppError> {
        let mut client = Self::new(repo);
        if let Some(issue) = payload.get("issue").filter(|v| !v.is_null()) {
            client = client.with_issue(ItemSnapshot::from_value(issue).map_err(seed_error)?);
        }
        if let Some(pr) = payload.get("pull_request").filter(|v| !v.is_null()) {
            let mut pr = ItemSnapshot::from_value(pr).map_err(seed_error)?;
            pr.is_pull_request = true;
            client = client.with_pull_request(pr);
        }
        if let Some(comment) = payload.get("comment").filter(|v| !v.is_null()) {
            client = client.with_comment(CommentSnapshot::from_value(comment).map_err(seed_error)?);
        }
        Ok(client)
    }

    pub fn with_rules(mut self, text: impl Into<String>) -> Self {
        self.rules = Some(text.into());
        self
    }

    pub fn with_issue(self, item: ItemSnapshot) -> Self {
        lock(&self.state).issues.insert(item.number, item);
        self
    }

    pub fn with_pull_request(self, item: ItemSnapshot) -> Self {
        lock(&self.state).pulls.insert(item.number, item);
        self
    }

    pub fn with_comment(self, comment: CommentSnapshot) -> Self {
        lock(&self.state).comments.insert(comment.id, comment);
        self
    }

    pub fn with_files(self, number: u64, files: Vec<String>) -> Self {
        lock(&self.state).files.insert(number, files);
        self
    }

    pub fn log(&self) -> &MutationLog {
        &self.log
    }

    /// Current state of a seeded issue or pull request.
    pub fn item(&self, number: u64) -> Option<ItemSnapshot> {
        let state = lock(&self.state);
        state
            .pulls
            .get(&number)
            .or_else(|| state.issues.get(&number))
            .cloned()
    }

    fn record(&self, mutation: Mutation) -> Result<(), AppError> {
        lock(&self.state).apply(&mutation);
        self.log.push(mutation);
        Ok(())
    }
}

fn seed_error(err: serde_json::Error) -> AppError {
    AppError::new(
        ErrorCategory::ValidationError,
        format!("invalid payload object: {}", err),
    )
}

fn not_found(what: &str, id: u64) -> AppError {
    AppError::new(ErrorCategory::UpstreamError, format!("{} {} not found", what, id))
        .with_code("GH-404")
}

#[async_trait]
impl RepoClient for OfflineClient {
    fn repository(&self) -> &RepoRef {
        &self.repo
    }

    async fn fetch_rules_file(&self, _path: &str) -> Result<Option<String>, AppError> {
        Ok(self.rules.clone())
    }

    async fn get_issue(&self, number: u64) -> Result<ItemSnapshot, AppError> {
        let state = lock(&self.state);
        state
            .issues
            .get(&number)
            .or_else(|| state.pulls.get(&number))
            .cloned()
            .ok_or_else(|| not_found("issue", number))
    }

    async fn get_pull_request(&self, number: u64) -> Result<ItemSnapshot, AppError> {
        lock(&self.state)
            .pulls
            .get(&number)
            .cloned()
            .ok_or_else(|| not_found("pull request", number))
    }

    async fn get_comment(&self, id: u64) -> Result<CommentSnapshot, AppError> {
        lock(&self.state)
            .comments
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found("comment", id))
    }

    async fn list_pull_request_files(&self, number: u64) -> Result<Vec<String>, AppError> {
        Ok(lock(&self.state)
            .files
            .get(&number)
            .cloned()
            .unwrap_or_default())
    }

    async fn add_labels(&self, number: u64, labels: &[String]) -> Result<(), AppError> {
        self.record(Mutation::AddLabels {
            number,
            labels: labels.to_vec(),
        })
    }

    async fn remove_labels(&self, number: u64, labels: &[String]) -> Result<(), AppError> {
        self.record(Mutation::RemoveLabels {
            number,
            labels: labels.to_vec(),
        })
    }

    async fn add_assignees(&self, number: u64, logins: &[String]) -> Result<(), AppError> {
        self.record(Mutation::AddAssignees {
            number,
            logins: logins.to_vec(),
        })
    }

    async fn remove_assignees(&self, number: u64, logins: &[String]) -> Result<(), AppError> {
        self.record(Mutation::RemoveAssignees {
            number,
            logins: logins.to_vec(),
        })
    }

    async fn add_reviewers(&self, number: u64, logins: &[String]) -> Result<(), AppError> {
        self.record(Mutation::AddReviewers {
            number,
            logins: logins.to_vec(),
        })
    }

    async fn remove_reviewers(&self, number: u64, logins: &[String]) -> Result<(), AppError> {
        self.record(Mutation::RemoveReviewers {
            number,
            logins: logins.to_vec(),
        })
    }

    async fn post_comment(&self, number: u64, body: &str) -> Result<(), AppError> {
        self.record(Mutation::PostComment {
            number,
            body: body.to_string(),
        })
    }

    async fn set_milestone(&self, number: u64, title: Option<&str>) -> Result<(), AppError> {
        self.record(Mutation::SetMilestone {
            number,
            title: title.map(str::to_string),
        })
    }

    async fn add_to_project(&self, content_id: &str, project_id: &str) -> Result<(), AppError> {
        self.record(Mutation::AddToProject {
            content_id: content_id.to_string(),
            project_id: project_id.to_string(),
        })
    }

    async fn remove_from_project(
        &self,
        content_id: &str,
        project_id: &str,
    ) -> Result<(), AppError> {
        self.record(Mutation::RemoveFromProject {
            content_id: content_id.to_string(),
            project_id: project_id.to_string(),
        })
    }
}
