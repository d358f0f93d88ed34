#![allow(clippy::result_large_err)] // Action nodes return AppError directly so upstream failures keep their category.

use crate::core::error::AppError;
use crate::core::rules::context::EventContext;
use async_trait::async_trait;
use std::sync::Arc;

/// What the containing sequence does after a node ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// Stop the containing sequence; the parent keeps going.
    Halt,
}

/// Executable node of a compiled action tree.
#[async_trait]
pub trait ActionNode: Send + Sync {
    /// Family name used in logs.
    fn name(&self) -> &'static str;

    /// One-line rendering for diagnostics and `validate` output.
    fn describe(&self) -> String {
        self.name().to_string()
    }

    fn children(&self) -> &[Arc<dyn ActionNode>] {
        &[]
    }

    async fn run(&self, ctx: &mut EventContext) -> Result<Flow, AppError>;
}
