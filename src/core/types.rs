use serde::{Deserialize, Serialize};

/// Error category enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCategory {
    ValidationError,
    ConfigurationError,
    CompilationError,
    ResolutionError,
    QueryError,
    UpstreamError,
    ForbiddenError,
    AuthenticationError,
    SerializationError,
    IoError,
    InternalError,
    Unknown,
}

impl ErrorCategory {
    /// Whether the category describes a failure of the repository's rules rather than the service.
    pub fn is_rule_failure(self) -> bool {
        matches!(
            self,
            ErrorCategory::ConfigurationError
                | ErrorCategory::CompilationError
                | ErrorCategory::ResolutionError
                | ErrorCategory::QueryError
        )
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Error severity enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorSeverity {
    Error,
    Warning,
    Info,
    Debug,
}

/// Webhook event types the engine knows how to set up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Issues,
    PullRequest,
    IssueComment,
    ProjectsV2Item,
}

impl EventKind {
    pub const ALL: [EventKind; 4] = [
        EventKind::Issues,
        EventKind::PullRequest,
        EventKind::IssueComment,
        EventKind::ProjectsV2Item,
    ];

    /// Parse the `X-GitHub-Event` header value.
    pub fn from_header(name: &str) -> Option<Self> {
        match name.trim() {
            "issues" => Some(EventKind::Issues),
            "pull_request" => Some(EventKind::PullRequest),
            "issue_comment" => Some(EventKind::IssueComment),
            "projects_v2_item" => Some(EventKind::ProjectsV2Item),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Issues => "issues",
            EventKind::PullRequest => "pull_request",
            EventKind::IssueComment => "issue_comment",
            EventKind::ProjectsV2Item => "projects_v2_item",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Owner/name coordinates of a repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoRef {
    pub owner: String,
    pub name: String,
}

impl RepoRef {
    pub fn new<O: Into<String>, N: Into<String>>(owner: O, name: N) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }

    /// Parse an `owner/name` string.
    pub fn parse(full_name: &str) -> Option<Self> {
        let (owner, name) = full_name.trim().split_once('/')?;
        if owner.is_empty() || name.is_empty() || name.contains('/') {
            return None;
        }
        Some(Self::new(owner, name))
    }
}

impl std::fmt::Display for RepoRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}
