use crate::core::error::AppError;
use crate::core::rules::action::{ActionNode, Flow};
use crate::core::rules::actions::{expand_all, not_in};
use crate::core::rules::context::EventContext;
use crate::core::rules::step::Subtype;
use async_trait::async_trait;
use tracing::{info, warn};

/// `reviewers-*`; only meaningful on pull requests.
pub struct ReviewersAction {
    subtype: Subtype,
    values: Vec<String>,
}

impl ReviewersAction {
    pub fn new(subtype: Subtype, values: Vec<String>) -> Self {
        Self { subtype, values }
    }
}

#[async_trait]
impl ActionNode for ReviewersAction {
    fn name(&self) -> &'static str {
        "reviewers"
    }

    fn describe(&self) -> String {
        format!("reviewers-{} {:?}", self.subtype.as_str(), self.values)
    }

    async fn run(&self, ctx: &mut EventContext) -> Result<Flow, AppError> {
        let target = ctx
            .target()
            .filter(|item| item.is_pull_request)
            .map(|item| (item.number, item.requested_reviewers.clone()));
        let Some((number, current)) = target else {
            warn!(event = %ctx.kind, "reviewer step outside a pull request; skipping");
            return Ok(Flow::Continue);
        };
        let logins = expand_all(ctx, &self.values);

        let removals = match self.subtype {
            Subtype::Add => Vec::new(),
            Subtype::Remove => logins.clone(),
            Subtype::Set => not_in(&current, &logins),
        };
        if !removals.is_empty() {
            info!(number, ?removals, "removing requested reviewers");
            ctx.client().remove_reviewers(number, &removals).await?;
        }
        if self.subtype != Subtype::Remove {
            logins.iter().for_each(|login| ctx.operations.add_reviewer(login));
        }
        Ok(Flow::Continue)
    }
}
