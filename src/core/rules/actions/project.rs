use crate::core::error::AppError;
use crate::core::rules::action::{ActionNode, Flow};
use crate::core::rules::context::EventContext;
use crate::core::rules::step::Subtype;
use async_trait::async_trait;
use tracing::{info, warn};

/// `project-add` / `project-remove` by project node id.
pub struct ProjectAction {
    subtype: Subtype,
    project: String,
}

impl ProjectAction {
    pub fn new(subtype: Subtype, project: String) -> Self {
        Self { subtype, project }
    }
}

#[async_trait]
impl ActionNode for ProjectAction {
    fn name(&self) -> &'static str {
        "project"
    }

    fn describe(&self) -> String {
        format!("project-{} {}", self.subtype.as_str(), self.project)
    }

    async fn run(&self, ctx: &mut EventContext) -> Result<Flow, AppError> {
        let project = ctx.expand(&self.project).trim().to_string();
        let Some(content) = ctx.content_node_id().map(str::to_string) else {
            warn!(event = %ctx.kind, "project step without a content node; skipping");
            return Ok(Flow::Continue);
        };
        if project.is_empty() {
            warn!("project id resolved to nothing; skipping");
            return Ok(Flow::Continue);
        }
        if self.subtype == Subtype::Remove {
            info!(%project, %content, "removing from project");
            ctx.client().remove_from_project(&content, &project).await?;
        } else {
            info!(%project, %content, "adding to project");
            ctx.client().add_to_project(&content, &project).await?;
        }
        Ok(Flow::Continue)
    }
}
