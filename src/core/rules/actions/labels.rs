use crate::core::error::AppError;
use crate::core::rules::action::{ActionNode, Flow};
use crate::core::rules::actions::{expand_all, not_in};
use crate::core::rules::context::EventContext;
use crate::core::rules::step::Subtype;
use async_trait::async_trait;

/// `labels-add`, `labels-remove`, `labels-set`. All label changes are pooled.
pub struct LabelsAction {
    subtype: Subtype,
    values: Vec<String>,
}

impl LabelsAction {
    pub fn new(subtype: Subtype, values: Vec<String>) -> Self {
        Self { subtype, values }
    }
}

#[async_trait]
impl ActionNode for LabelsAction {
    fn name(&self) -> &'static str {
        "labels"
    }

    fn describe(&self) -> String {
        format!("labels-{} {:?}", self.subtype.as_str(), self.values)
    }

    async fn run(&self, ctx: &mut EventContext) -> Result<Flow, AppError> {
        let values = expand_all(ctx, &self.values);
        match self.subtype {
            Subtype::Add => values.iter().for_each(|label| ctx.operations.add_label(label)),
            Subtype::Remove => values
                .iter()
                .for_each(|label| ctx.operations.remove_label(label)),
            Subtype::Set => {
                let current = ctx
                    .target()
                    .map(|item| item.labels.clone())
                    .unwrap_or_default();
                for stale in not_in(&current, &values) {
                    ctx.operations.remove_label(&stale);
                }
                values.iter().for_each(|label| ctx.operations.add_label(label));
            }
        }
        Ok(Flow::Continue)
    }
}
