use crate::core::error::AppError;
use crate::core::rules::action::{ActionNode, Flow};
use crate::core::rules::actions::{expand_all, not_in};
use crate::core::rules::context::EventContext;
use crate::core::rules::step::Subtype;
use async_trait::async_trait;
use tracing::{info, warn};

/// `assignees-*`: additions are pooled, removals go out immediately.
pub struct AssigneesAction {
    subtype: Subtype,
    values: Vec<String>,
}

impl AssigneesAction {
    pub fn new(subtype: Subtype, values: Vec<String>) -> Self {
        Self { subtype, values }
    }
}

#[async_trait]
impl ActionNode for AssigneesAction {
    fn name(&self) -> &'static str {
        "assignees"
    }

    fn describe(&self) -> String {
        format!("assignees-{} {:?}", self.subtype.as_str(), self.values)
    }

    async fn run(&self, ctx: &mut EventContext) -> Result<Flow, AppError> {
        let logins = expand_all(ctx, &self.values);
        let Some((number, current)) = ctx
            .target()
            .map(|item| (item.number, item.assignees.clone()))
        else {
            warn!(event = %ctx.kind, "assignee step without an issue or pull request; skipping");
            return Ok(Flow::Continue);
        };

        let removals = match self.subtype {
            Subtype::Add => Vec::new(),
            Subtype::Remove => logins.clone(),
            Subtype::Set => not_in(&current, &logins),
        };
        if !removals.is_empty() {
            info!(number, ?removals, "removing assignees");
            ctx.client().remove_assignees(number, &removals).await?;
        }
        if self.subtype != Subtype::Remove {
            logins.iter().for_each(|login| ctx.operations.add_assignee(login));
        }
        Ok(Flow::Continue)
    }
}
