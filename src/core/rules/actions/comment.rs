use crate::core::error::AppError;
use crate::core::rules::action::{ActionNode, Flow};
use crate::core::rules::context::EventContext;
use async_trait::async_trait;
use tracing::{debug, info, warn};

/// Posts a comment right away; comments are never pooled.
pub struct CommentAction {
    template: String,
}

impl CommentAction {
    pub fn new(template: String) -> Self {
        Self { template }
    }
}

#[async_trait]
impl ActionNode for CommentAction {
    fn name(&self) -> &'static str {
        "comment"
    }

    async fn run(&self, ctx: &mut EventContext) -> Result<Flow, AppError> {
        let body = ctx.expand(&self.template);
        if body.trim().is_empty() {
            debug!("comment template expanded to nothing; skipping");
            return Ok(Flow::Continue);
        }
        let Some(number) = ctx.target().map(|item| item.number) else {
            warn!(event = %ctx.kind, "comment step without an issue or pull request; skipping");
            return Ok(Flow::Continue);
        };
        info!(number, chars = body.len(), "posting comment");
        ctx.client().post_comment(number, &body).await?;
        Ok(Flow::Continue)
    }
}
