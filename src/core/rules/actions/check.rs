use crate::core::error::AppError;
use crate::core::rules::action::{ActionNode, Flow};
use crate::core::rules::checks::CheckCondition;
use crate::core::rules::context::EventContext;
use async_trait::async_trait;
use tracing::debug;

/// Gates the rest of its sequence on a condition.
#[derive(Debug)]
pub struct CheckAction {
    /// `None` when the condition failed to compile; such a check never passes.
    condition: Option<Box<dyn CheckCondition>>,
}

impl CheckAction {
    pub fn new(condition: Box<dyn CheckCondition>) -> Self {
        Self {
            condition: Some(condition),
        }
    }

    pub fn never() -> Self {
        Self { condition: None }
    }
}

#[async_trait]
impl ActionNode for CheckAction {
    fn name(&self) -> &'static str {
        "check"
    }

    fn describe(&self) -> String {
        match self.condition {
            Some(_) => "check".to_string(),
            None => "check (invalid, always false)".to_string(),
        }
    }

    async fn run(&self, ctx: &mut EventContext) -> Result<Flow, AppError> {
        let Some(condition) = &self.condition else {
            return Ok(Flow::Halt);
        };
        match condition.evaluate(ctx) {
            Ok(true) => Ok(Flow::Continue),
            Ok(false) => {
                debug!(action = %ctx.action, "check did not pass");
                Ok(Flow::Halt)
            }
            Err(err) => {
                ctx.mark_failure(format!("check failed to evaluate: {}", err));
                Ok(Flow::Halt)
            }
        }
    }
}
