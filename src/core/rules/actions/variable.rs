use crate::core::error::AppError;
use crate::core::rules::action::{ActionNode, Flow};
use crate::core::rules::context::EventContext;
use crate::core::rules::step::Subtype;
use async_trait::async_trait;
use tracing::debug;

/// `variable-set` assigns, `variable-add` assigns only when absent, `variable-remove` deletes.
pub struct VariableAction {
    subtype: Subtype,
    name: String,
    value: String,
}

impl VariableAction {
    pub fn new(subtype: Subtype, name: String, value: String) -> Self {
        Self {
            subtype,
            name,
            value,
        }
    }
}

#[async_trait]
impl ActionNode for VariableAction {
    fn name(&self) -> &'static str {
        "variable"
    }

    fn describe(&self) -> String {
        format!("variable-{} {}", self.subtype.as_str(), self.name)
    }

    async fn run(&self, ctx: &mut EventContext) -> Result<Flow, AppError> {
        match self.subtype {
            Subtype::Set => {
                let value = ctx.expand(&self.value);
                ctx.variables.set(&self.name, value);
            }
            Subtype::Add => {
                if !ctx.variables.contains(&self.name) {
                    let value = ctx.expand(&self.value);
                    ctx.variables.set(&self.name, value);
                }
            }
            Subtype::Remove => {
                ctx.variables.remove(&self.name);
            }
        }
        debug!(name = %self.name, op = self.subtype.as_str(), "variable updated");
        Ok(Flow::Continue)
    }
}
