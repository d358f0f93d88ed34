use crate::core::error::AppError;
use crate::core::rules::action::{ActionNode, Flow};
use crate::core::rules::context::EventContext;
use crate::core::rules::step::Subtype;
use async_trait::async_trait;
use tracing::{debug, info, warn};

/// `milestone-set` / `milestone-remove`, applied immediately.
pub struct MilestoneAction {
    subtype: Subtype,
    value: String,
}

impl MilestoneAction {
    pub fn new(subtype: Subtype, value: String) -> Self {
        Self { subtype, value }
    }
}

#[async_trait]
impl ActionNode for MilestoneAction {
    fn name(&self) -> &'static str {
        "milestone"
    }

    fn describe(&self) -> String {
        format!("milestone-{} {:?}", self.subtype.as_str(), self.value)
    }

    async fn run(&self, ctx: &mut EventContext) -> Result<Flow, AppError> {
        let title = ctx.expand(&self.value).trim().to_string();
        let Some((number, current)) = ctx
            .target()
            .map(|item| (item.number, item.milestone.clone()))
        else {
            warn!(event = %ctx.kind, "milestone step without an issue or pull request; skipping");
            return Ok(Flow::Continue);
        };

        match self.subtype {
            Subtype::Set => {
                if title.is_empty() {
                    warn!(number, "milestone title resolved to nothing; skipping");
                } else if current.as_deref() == Some(title.as_str()) {
                    debug!(number, %title, "milestone already set");
                } else {
                    info!(number, %title, "setting milestone");
                    ctx.client().set_milestone(number, Some(&title)).await?;
                }
            }
            _ => {
                // A named removal only clears that milestone.
                let matches = title.is_empty() || current.as_deref() == Some(title.as_str());
                if current.is_some() && matches {
                    info!(number, "clearing milestone");
                    ctx.client().set_milestone(number, None).await?;
                }
            }
        }
        Ok(Flow::Continue)
    }
}
