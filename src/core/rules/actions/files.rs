use crate::core::error::AppError;
use crate::core::rules::action::{ActionNode, Flow};
use crate::core::rules::context::EventContext;
use crate::core::rules::step::FileMatch;
use async_trait::async_trait;
use regex::Regex;
use std::sync::Arc;
use tracing::debug;

/// Runs a nested sequence depending on which changed files match a pattern.
pub struct FilesAction {
    mode: FileMatch,
    pattern: Regex,
    body: Arc<dyn ActionNode>,
}

impl FilesAction {
    pub fn new(mode: FileMatch, pattern: Regex, body: Arc<dyn ActionNode>) -> Self {
        Self {
            mode,
            pattern,
            body,
        }
    }

    fn accepts(&self, files: &[String]) -> bool {
        let matching = files.iter().filter(|f| self.pattern.is_match(f)).count();
        match self.mode {
            FileMatch::Any => matching > 0,
            FileMatch::All => !files.is_empty() && matching == files.len(),
            FileMatch::None => matching == 0,
        }
    }
}

#[async_trait]
impl ActionNode for FilesAction {
    fn name(&self) -> &'static str {
        "files"
    }

    fn describe(&self) -> String {
        format!("files-{} /{}/", self.mode.as_str(), self.pattern.as_str())
    }

    fn children(&self) -> &[Arc<dyn ActionNode>] {
        std::slice::from_ref(&self.body)
    }

    async fn run(&self, ctx: &mut EventContext) -> Result<Flow, AppError> {
        if !ctx.is_pull_request() {
            debug!(mode = self.mode.as_str(), "not a pull request; files step skipped");
            return Ok(Flow::Continue);
        }
        let accepted = {
            let files = ctx.changed_files().await?;
            self.accepts(files)
        };
        debug!(mode = self.mode.as_str(), accepted, "changed files evaluated");
        if accepted {
            self.body.run(ctx).await?;
        }
        Ok(Flow::Continue)
    }
}
