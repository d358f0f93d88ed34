use clap::Args;
use std::path::PathBuf;

#[derive(Args)]
pub struct ServeArgs {
    /// Process configuration file (default: ./rulebot.toml)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Listener address, overriding webhook.bind
    #[arg(long, value_name = "ADDR")]
    pub bind: Option<String>,

    /// Log intended mutations instead of sending them
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Args)]
pub struct RunArgs {
    /// Event name as sent in X-GitHub-Event (issues, pull_request, issue_comment, ...)
    #[arg(long, value_name = "NAME")]
    pub event: String,

    /// Webhook payload JSON file
    #[arg(long, value_name = "FILE")]
    pub payload: PathBuf,

    /// Rules file to evaluate instead of the repository copy
    #[arg(long, value_name = "FILE")]
    pub rules: PathBuf,

    /// Changed file paths reported for the pull request (repeatable)
    #[arg(long = "file", value_name = "PATH")]
    pub files: Vec<String>,
}

#[derive(Args)]
pub struct ValidateArgs {
    /// Rules file to check
    #[arg(value_name = "FILE")]
    pub file: PathBuf,
}
