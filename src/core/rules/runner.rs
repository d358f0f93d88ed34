#![allow(clippy::result_large_err)]

use crate::core::error::AppError;
use crate::core::rules::action::{ActionNode, Flow};
use crate::core::rules::context::EventContext;
use crate::core::rules::pool::FlushReport;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Composite node: runs its children in declaration order.
#[derive(Default)]
pub struct Runner {
    children: Vec<Arc<dyn ActionNode>>,
}

impl Runner {
    pub fn new(children: Vec<Arc<dyn ActionNode>>) -> Self {
        Self { children }
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}

#[async_trait]
impl ActionNode for Runner {
    fn name(&self) -> &'static str {
        "runner"
    }

    fn describe(&self) -> String {
        format!("runner ({} steps)", self.children.len())
    }

    fn children(&self) -> &[Arc<dyn ActionNode>] {
        &self.children
    }

    async fn run(&self, ctx: &mut EventContext) -> Result<Flow, AppError> {
        for (index, child) in self.children.iter().enumerate() {
            if child.run(ctx).await? == Flow::Halt {
                debug!(step = index, node = child.name(), "sequence halted by check");
                break;
            }
        }
        // A halted nested sequence never stops its parent.
        Ok(Flow::Continue)
    }
}

/// Walk `root`, then flush the operation pool once.
///
/// A failed check only ends its own sequence, so pools from partial walks are still
/// flushed. An upstream error aborts the walk and nothing is flushed.
pub async fn execute(root: &dyn ActionNode, ctx: &mut EventContext) -> Result<FlushReport, AppError> {
    root.run(ctx).await?;
    ctx.flush().await
}

/// Indented outline of a tree, one node per line.
pub fn outline(root: &dyn ActionNode) -> Vec<String> {
    fn walk(node: &dyn ActionNode, depth: usize, lines: &mut Vec<String>) {
        lines.push(format!("{}{}", "  ".repeat(depth), node.describe()));
        for child in node.children() {
            walk(child.as_ref(), depth + 1, lines);
        }
    }
    let mut lines = Vec::new();
    walk(root, 0, &mut lines);
    lines
}
