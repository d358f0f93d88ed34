#![allow(clippy::result_large_err)]

use crate::core::error::AppError;
use crate::core::github::{ItemSnapshot, RepoClient};
use indexmap::IndexSet;
use serde::Serialize;
use tracing::{debug, info, warn};

/// Pending label/assignee/reviewer mutations for one invocation.
///
/// Sets keep insertion order so batches go out in the order the rules asked for them.
#[derive(Debug, Clone, Default, Serialize)]
pub struct OperationPool {
    labels_add: IndexSet<String>,
    labels_remove: IndexSet<String>,
    assignees: IndexSet<String>,
    reviewers: IndexSet<String>,
    #[serde(skip)]
    flushed: bool,
}

/// What a flush sent upstream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FlushReport {
    pub labels_added: Vec<String>,
    pub labels_removed: Vec<String>,
    pub assignees_added: Vec<String>,
    pub reviewers_added: Vec<String>,
}

impl FlushReport {
    pub fn is_empty(&self) -> bool {
        self.labels_added.is_empty()
            && self.labels_removed.is_empty()
            && self.assignees_added.is_empty()
            && self.reviewers_added.is_empty()
    }
}

impl OperationPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_label(&mut self, label: &str) {
        push(&mut self.labels_add, label);
    }

    pub fn remove_label(&mut self, label: &str) {
        push(&mut self.labels_remove, label);
    }

    pub fn add_assignee(&mut self, login: &str) {
        push(&mut self.assignees, login);
    }

    pub fn add_reviewer(&mut self, login: &str) {
        push(&mut self.reviewers, login);
    }

    pub fn labels_to_add(&self) -> impl Iterator<Item = &str> {
        self.labels_add.iter().map(String::as_str)
    }

    pub fn labels_to_remove(&self) -> impl Iterator<Item = &str> {
        self.labels_remove.iter().map(String::as_str)
    }

    pub fn assignees(&self) -> impl Iterator<Item = &str> {
        self.assignees.iter().map(String::as_str)
    }

    pub fn reviewers(&self) -> impl Iterator<Item = &str> {
        self.reviewers.iter().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.labels_add.is_empty()
            && self.labels_remove.is_empty()
            && self.assignees.is_empty()
            && self.reviewers.is_empty()
    }

    pub fn is_flushed(&self) -> bool {
        self.flushed
    }

    /// Drop every label that is both added and removed; removal wins.
    pub fn resolve_conflicts(&mut self) {
        let removed = &self.labels_remove;
        let before = self.labels_add.len();
        self.labels_add.retain(|label| !removed.contains(label));
        if self.labels_add.len() != before {
            debug!(
                dropped = before - self.labels_add.len(),
                "label additions overridden by removals"
            );
        }
    }

    /// Send the batched mutations. Runs at most once per pool.
    pub async fn flush(
        &mut self,
        client: &dyn RepoClient,
        target: Option<&ItemSnapshot>,
    ) -> Result<FlushReport, AppError> {
        if self.flushed {
            warn!("operation pool already flushed; ignoring second flush");
            return Ok(FlushReport::default());
        }
        self.flushed = true;
        self.resolve_conflicts();

        let Some(target) = target else {
            if !self.is_empty() {
                warn!("no issue or pull request in this event; dropping pooled operations");
            }
            return Ok(FlushReport::default());
        };

        let mut report = FlushReport {
            labels_added: drain(&mut self.labels_add),
            labels_removed: drain(&mut self.labels_remove),
            assignees_added: drain(&mut self.assignees),
            reviewers_added: drain(&mut self.reviewers),
        };

        if !report.labels_added.is_empty() {
            client.add_labels(target.number, &report.labels_added).await?;
        }
        if !report.labels_removed.is_empty() {
            client
                .remove_labels(target.number, &report.labels_removed)
                .await?;
        }
        if !report.assignees_added.is_empty() {
            client
                .add_assignees(target.number, &report.assignees_added)
                .await?;
        }
        if !report.reviewers_added.is_empty() {
            if target.is_pull_request {
                client
                    .add_reviewers(target.number, &report.reviewers_added)
                    .await?;
            } else {
                warn!(
                    number = target.number,
                    "reviewers requested on an issue; skipping"
                );
                report.reviewers_added.clear();
            }
        }

        if !report.is_empty() {
            info!(
                number = target.number,
                labels_added = report.labels_added.len(),
                labels_removed = report.labels_removed.len(),
                assignees_added = report.assignees_added.len(),
                reviewers_added = report.reviewers_added.len(),
                "flushed pooled operations"
            );
        }
        Ok(report)
    }
}

fn push(set: &mut IndexSet<String>, value: &str) {
    let value = value.trim();
    if !value.is_empty() {
        set.insert(value.to_string());
    }
}

fn drain(set: &mut IndexSet<String>) -> Vec<String> {
    std::mem::take(set).into_iter().collect()
}
