#![allow(clippy::result_large_err)]

use super::model::{GithubFile, GithubMilestone};
use super::{CommentSnapshot, ItemSnapshot, RepoClient};
use crate::core::error::AppError;
use crate::core::types::{ErrorCategory, RepoRef};
use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde_json::{json, Value};
use tracing::{debug, warn};
use url::Url;

const API_VERSION: &str = "2022-11-28";
const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));
const PAGE_SIZE: usize = 100;
/// GitHub stops listing pull request files after 3000 entries.
const MAX_FILE_PAGES: usize = 30;

/// REST/GraphQL client scoped to one repository and one installation token.
#[derive(Clone)]
pub struct GitHubClient {
    http: reqwest::Client,
    api_base: Url,
    token: String,
    repo: RepoRef,
}

impl GitHubClient {
    pub fn new(http: reqwest::Client, api_base: Url, token: impl Into<String>, repo: RepoRef) -> Self {
        Self {
            http,
            api_base,
            token: token.into(),
            repo,
        }
    }

    pub fn default_http() -> Result<reqwest::Client, AppError> {
        reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|err| {
                AppError::new(
                    ErrorCategory::InternalError,
                    format!("failed to build http client: {}", err),
                )
            })
    }

    /// `{api}/repos/{owner}/{name}/{segments...}` with each segment escaped.
    fn repo_url(&self, segments: &[&str]) -> Result<Url, AppError> {
        let mut url = self.api_base.clone();
        url.path_segments_mut()
            .map_err(|_| {
                AppError::new(ErrorCategory::ConfigurationError, "api base cannot be a base URL")
            })?
            .pop_if_empty()
            .extend(["repos", self.repo.owner.as_str(), self.repo.name.as_str()])
            .extend(segments);
        Ok(url)
    }

    fn graphql_url(&self) -> Result<Url, AppError> {
        let mut url = self.api_base.clone();
        url.path_segments_mut()
            .map_err(|_| {
                AppError::new(ErrorCategory::ConfigurationError, "api base cannot be a base URL")
            })?
            .pop_if_empty()
            .push("graphql");
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.request_as(method, url, "application/vnd.github+json")
    }

    fn request_as(&self, method: Method, url: Url, accept: &str) -> RequestBuilder {
        self.http
            .request(method, url)
            .bearer_auth(&self.token)
            .header("Accept", accept)
            .header("X-GitHub-Api-Version", API_VERSION)
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response, AppError> {
        let response = builder.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(status_error(status, &body))
    }

    async fn get_json(&self, segments: &[&str]) -> Result<Value, AppError> {
        let url = self.repo_url(segments)?;
        Ok(self.send(self.request(Method::GET, url)).await?.json().await?)
    }

    async fn write(&self, method: Method, segments: &[&str], body: Value) -> Result<(), AppError> {
        let url = self.repo_url(segments)?;
        debug!(%method, %url, "github write");
        self.send(self.request(method, url).json(&body)).await?;
        Ok(())
    }

    async fn graphql(&self, query: &str, variables: Value) -> Result<Value, AppError> {
        let url = self.graphql_url()?;
        let response: Value = self
            .send(
                self.request(Method::POST, url)
                    .json(&json!({"query": query, "variables": variables})),
            )
            .await?
            .json()
            .await?;
        if let Some(errors) = response.get("errors").filter(|e| !e.is_null()) {
            return Err(AppError::new(
                ErrorCategory::UpstreamError,
                format!("graphql request failed: {}", errors),
            )
            .with_code("GH-GRAPHQL"));
        }
        Ok(response.get("data").cloned().unwrap_or(Value::Null))
    }

    async fn milestone_number(&self, title: &str) -> Result<u64, AppError> {
        for page in 1..=10 {
            let mut url = self.repo_url(&["milestones"])?;
            url.query_pairs_mut()
                .append_pair("state", "all")
                .append_pair("per_page", &PAGE_SIZE.to_string())
                .append_pair("page", &page.to_string());
            let batch: Vec<GithubMilestone> =
                self.send(self.request(Method::GET, url)).await?.json().await?;
            if let Some(found) = batch.iter().find(|m| m.title.eq_ignore_ascii_case(title)) {
                return Ok(found.number);
            }
            if batch.len() < PAGE_SIZE {
                break;
            }
        }
        Err(AppError::new(
            ErrorCategory::ValidationError,
            format!("milestone '{}' does not exist in {}", title, self.repo),
        )
        .with_code("GH-MILESTONE"))
    }
}

fn status_error(status: StatusCode, body: &str) -> AppError {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| body.chars().take(200).collect());
    let category = match status {
        StatusCode::FORBIDDEN => ErrorCategory::ForbiddenError,
        StatusCode::UNAUTHORIZED => ErrorCategory::AuthenticationError,
        _ => ErrorCategory::UpstreamError,
    };
    AppError::new(
        category,
        format!("github returned {}: {}", status.as_u16(), message),
    )
    .with_code(format!("GH-{}", status.as_u16()))
}

fn is_not_found(err: &AppError) -> bool {
    err.code == "GH-404"
}

#[async_trait]
impl RepoClient for GitHubClient {
    fn repository(&self) -> &RepoRef {
        &self.repo
    }

    async fn fetch_rules_file(&self, path: &str) -> Result<Option<String>, AppError> {
        let mut segments = vec!["contents"];
        segments.extend(path.split('/').filter(|s| !s.is_empty()));
        let url = self.repo_url(&segments)?;
        let request = self.request_as(Method::GET, url, "application/vnd.github.raw+json");
        match self.send(request).await {
            Ok(response) => Ok(Some(response.text().await?)),
            Err(err) if is_not_found(&err) => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn get_issue(&self, number: u64) -> Result<ItemSnapshot, AppError> {
        let value = self.get_json(&["issues", &number.to_string()]).await?;
        ItemSnapshot::from_value(&value).map_err(decode_error)
    }

    async fn get_pull_request(&self, number: u64) -> Result<ItemSnapshot, AppError> {
        let value = self.get_json(&["pulls", &number.to_string()]).await?;
        let mut item = ItemSnapshot::from_value(&value).map_err(decode_error)?;
        item.is_pull_request = true;
        Ok(item)
    }

    async fn get_comment(&self, id: u64) -> Result<CommentSnapshot, AppError> {
        let value = self
            .get_json(&["issues", "comments", &id.to_string()])
            .await?;
        CommentSnapshot::from_value(&value).map_err(decode_error)
    }

    async fn list_pull_request_files(&self, number: u64) -> Result<Vec<String>, AppError> {
        let mut files = Vec::new();
        for page in 1..=MAX_FILE_PAGES {
            let mut url = self.repo_url(&["pulls", &number.to_string(), "files"])?;
            url.query_pairs_mut()
                .append_pair("per_page", &PAGE_SIZE.to_string())
                .append_pair("page", &page.to_string());
            let batch: Vec<GithubFile> =
                self.send(self.request(Method::GET, url)).await?.json().await?;
            let done = batch.len() < PAGE_SIZE;
            files.extend(batch.into_iter().map(|file| file.filename));
            if done {
                break;
            }
        }
        Ok(files)
    }

    async fn add_labels(&self, number: u64, labels: &[String]) -> Result<(), AppError> {
        self.write(
            Method::POST,
            &["issues", &number.to_string(), "labels"],
            json!({"labels": labels}),
        )
        .await
    }

    async fn remove_labels(&self, number: u64, labels: &[String]) -> Result<(), AppError> {
        let number = number.to_string();
        for label in labels {
            let url = self.repo_url(&["issues", &number, "labels", label])?;
            match self.send(self.request(Method::DELETE, url)).await {
                Ok(_) => {}
                // Already absent.
                Err(err) if is_not_found(&err) => {
                    debug!(%label, "label not present; nothing to remove")
                }
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    async fn add_assignees(&self, number: u64, logins: &[String]) -> Result<(), AppError> {
        self.write(
            Method::POST,
            &["issues", &number.to_string(), "assignees"],
            json!({"assignees": logins}),
        )
        .await
    }

    async fn remove_assignees(&self, number: u64, logins: &[String]) -> Result<(), AppError> {
        self.write(
            Method::DELETE,
            &["issues", &number.to_string(), "assignees"],
            json!({"assignees": logins}),
        )
        .await
    }

    async fn add_reviewers(&self, number: u64, logins: &[String]) -> Result<(), AppError> {
        self.write(
            Method::POST,
            &["pulls", &number.to_string(), "requested_reviewers"],
            json!({"reviewers": logins}),
        )
        .await
    }

    async fn remove_reviewers(&self, number: u64, logins: &[String]) -> Result<(), AppError> {
        self.write(
            Method::DELETE,
            &["pulls", &number.to_string(), "requested_reviewers"],
            json!({"reviewers": logins}),
        )
        .await
    }

    async fn post_comment(&self, number: u64, body: &str) -> Result<(), AppError> {
        self.write(
            Method::POST,
            &["issues", &number.to_string(), "comments"],
            json!({"body": body}),
        )
        .await
    }

    async fn set_milestone(&self, number: u64, title: Option<&str>) -> Result<(), AppError> {
        let milestone = match title {
            Some(title) => Value::from(self.milestone_number(title).await?),
            None => Value::Null,
        };
        self.write(
            Method::PATCH,
            &["issues", &number.to_string()],
            json!({"milestone": milestone}),
        )
        .await
    }

    async fn add_to_project(&self, content_id: &str, project_id: &str) -> Result<(), AppError> {
        const MUTATION: &str = "mutation($project: ID!, $content: ID!) { \
            addProjectV2ItemById(input: {projectId: $project, contentId: $content}) { item { id } } }";
        self.graphql(MUTATION, json!({"project": project_id, "content": content_id}))
            .await?;
        Ok(())
    }

    async fn remove_from_project(
        &self,
        content_id: &str,
        project_id: &str,
    ) -> Result<(), AppError> {
        const ITEMS: &str = "query($content: ID!) { node(id: $content) { \
            ... on Issue { projectItems(first: 50) { nodes { id project { id } } } } \
            ... on PullRequest { projectItems(first: 50) { nodes { id project { id } } } } } }";
        const DELETE: &str = "mutation($project: ID!, $item: ID!) { \
            deleteProjectV2Item(input: {projectId: $project, itemId: $item}) { deletedItemId } }";

        let data = self.graphql(ITEMS, json!({"content": content_id})).await?;
        let item = data
            .pointer("/node/projectItems/nodes")
            .and_then(Value::as_array)
            .and_then(|nodes| {
                nodes.iter().find(|node| {
                    node.pointer("/project/id").and_then(Value::as_str) == Some(project_id)
                })
            })
            .and_then(|node| node.get("id").and_then(Value::as_str));
        let Some(item) = item else {
            warn!(content_id, project_id, "item is not in the project; nothing to remove");
            return Ok(());
        };
        self.graphql(DELETE, json!({"project": project_id, "item": item}))
            .await?;
        Ok(())
    }
}

fn decode_error(err: serde_json::Error) -> AppError {
    AppError::new(
        ErrorCategory::SerializationError,
        format!("unexpected github response: {}", err),
    )
}
