use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Issue or pull request state as seen by the rules.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemSnapshot {
    pub number: u64,
    pub node_id: String,
    pub title: String,
    pub body: String,
    pub state: String,
    pub author: String,
    pub labels: Vec<String>,
    pub assignees: Vec<String>,
    pub milestone: Option<String>,
    pub html_url: String,
    pub is_pull_request: bool,
    pub draft: bool,
    pub merged: bool,
    pub requested_reviewers: Vec<String>,
}

impl ItemSnapshot {
    pub fn has_label(&self, name: &str) -> bool {
        self.labels.iter().any(|label| label.eq_ignore_ascii_case(name))
    }

    /// Build from an `issue` or `pull_request` object of a webhook payload or REST response.
    pub fn from_value(value: &Value) -> Result<Self, serde_json::Error> {
        let raw: GithubItem = serde_json::from_value(value.clone())?;
        Ok(raw.into())
    }
}

/// Comment state as seen by the rules.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommentSnapshot {
    pub id: u64,
    pub node_id: String,
    pub body: String,
    pub author: String,
}

impl CommentSnapshot {
    pub fn from_value(value: &Value) -> Result<Self, serde_json::Error> {
        let raw: GithubComment = serde_json::from_value(value.clone())?;
        Ok(raw.into())
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct GithubLogin {
    pub login: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GithubLabel {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GithubMilestone {
    pub number: u64,
    pub title: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GithubItem {
    number: u64,
    #[serde(default)]
    node_id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    state: String,
    user: Option<GithubLogin>,
    #[serde(default)]
    labels: Vec<GithubLabel>,
    #[serde(default)]
    assignees: Vec<GithubLogin>,
    milestone: Option<GithubMilestone>,
    #[serde(default)]
    html_url: String,
    /// Present on issues that are pull requests, and on pull request objects as `diff_url`.
    pull_request: Option<Value>,
    diff_url: Option<String>,
    #[serde(default)]
    draft: bool,
    #[serde(default)]
    merged: bool,
    #[serde(default)]
    requested_reviewers: Vec<GithubLogin>,
}

impl From<GithubItem> for ItemSnapshot {
    fn from(raw: GithubItem) -> Self {
        ItemSnapshot {
            number: raw.number,
            node_id: raw.node_id,
            title: raw.title,
            body: raw.body.unwrap_or_default(),
            state: raw.state,
            author: raw.user.map(|user| user.login).unwrap_or_default(),
            labels: raw.labels.into_iter().map(|label| label.name).collect(),
            assignees: raw.assignees.into_iter().map(|user| user.login).collect(),
            milestone: raw.milestone.map(|milestone| milestone.title),
            html_url: raw.html_url,
            is_pull_request: raw.pull_request.is_some() || raw.diff_url.is_some(),
            draft: raw.draft,
            merged: raw.merged,
            requested_reviewers: raw
                .requested_reviewers
                .into_iter()
                .map(|user| user.login)
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct GithubComment {
    id: u64,
    #[serde(default)]
    node_id: String,
    #[serde(default)]
    body: Option<String>,
    user: Option<GithubLogin>,
}

impl From<GithubComment> for CommentSnapshot {
    fn from(raw: GithubComment) -> Self {
        CommentSnapshot {
            id: raw.id,
            node_id: raw.node_id,
            body: raw.body.unwrap_or_default(),
            author: raw.user.map(|user| user.login).unwrap_or_default(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct GithubFile {
    pub filename: String,
}
