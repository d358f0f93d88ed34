//! Boundary to the hosting service: the trait the interpreter mutates through,
//! plus the REST client, app authentication and test/offline doubles.

#![allow(clippy::result_large_err)]

pub mod app;
pub mod client;
pub mod model;
pub mod recording;
pub mod token;

pub use app::{GitHubApp, InstallationClients};
pub use client::GitHubClient;
pub use model::{CommentSnapshot, ItemSnapshot};
pub use recording::{DryRunClient, Mutation, MutationLog, OfflineClient};
pub use token::{CachedToken, TokenCache};

use crate::core::error::AppError;
use crate::core::types::RepoRef;
use async_trait::async_trait;
use std::sync::Arc;

/// Operations the engine performs against one repository.
///
/// Mutations are idempotent from the engine's point of view: adding a label that
/// is already present or removing one that is absent must not fail.
#[async_trait]
pub trait RepoClient: Send + Sync {
    fn repository(&self) -> &RepoRef;

    /// Raw text of the rules file on the default branch, `None` when absent.
    async fn fetch_rules_file(&self, path: &str) -> Result<Option<String>, AppError>;

    async fn get_issue(&self, number: u64) -> Result<ItemSnapshot, AppError>;

    async fn get_pull_request(&self, number: u64) -> Result<ItemSnapshot, AppError>;

    async fn get_comment(&self, id: u64) -> Result<CommentSnapshot, AppError>;

    async fn list_pull_request_files(&self, number: u64) -> Result<Vec<String>, AppError>;

    async fn add_labels(&self, number: u64, labels: &[String]) -> Result<(), AppError>;

    async fn remove_labels(&self, number: u64, labels: &[String]) -> Result<(), AppError>;

    async fn add_assignees(&self, number: u64, logins: &[String]) -> Result<(), AppError>;

    async fn remove_assignees(&self, number: u64, logins: &[String]) -> Result<(), AppError>;

    async fn add_reviewers(&self, number: u64, logins: &[String]) -> Result<(), AppError>;

    async fn remove_reviewers(&self, number: u64, logins: &[String]) -> Result<(), AppError>;

    async fn post_comment(&self, number: u64, body: &str) -> Result<(), AppError>;

    /// Set the milestone by title, or clear it with `None`.
    async fn set_milestone(&self, number: u64, title: Option<&str>) -> Result<(), AppError>;

    async fn add_to_project(&self, content_node_id: &str, project_id: &str)
        -> Result<(), AppError>;

    async fn remove_from_project(
        &self,
        content_node_id: &str,
        project_id: &str,
    ) -> Result<(), AppError>;
}

/// Hands out a client scoped to the repository a delivery targets.
#[async_trait]
pub trait ClientProvider: Send + Sync {
    async fn client_for(
        &self,
        installation_id: Option<u64>,
        repo: &RepoRef,
    ) -> Result<Arc<dyn RepoClient>, AppError>;
}

/// Provider that always returns the same client (offline runs and tests).
pub struct FixedClientProvider {
    client: Arc<dyn RepoClient>,
}

impl FixedClientProvider {
    pub fn new(client: Arc<dyn RepoClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ClientProvider for FixedClientProvider {
    async fn client_for(
        &self,
        _installation_id: Option<u64>,
        _repo: &RepoRef,
    ) -> Result<Arc<dyn RepoClient>, AppError> {
        Ok(Arc::clone(&self.client))
    }
}
