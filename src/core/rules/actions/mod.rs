//! Leaf action nodes, one module per action family.

pub mod assignees;
pub mod check;
pub mod comment;
pub mod files;
pub mod labels;
pub mod milestone;
pub mod project;
pub mod reviewers;
pub mod variable;

pub use assignees::AssigneesAction;
pub use check::CheckAction;
pub use comment::CommentAction;
pub use files::FilesAction;
pub use labels::LabelsAction;
pub use milestone::MilestoneAction;
pub use project::ProjectAction;
pub use reviewers::ReviewersAction;
pub use variable::VariableAction;

use crate::core::rules::context::EventContext;

/// Expand every configured value, dropping the ones that resolve to nothing.
pub(crate) fn expand_all(ctx: &mut EventContext, values: &[String]) -> Vec<String> {
    values
        .iter()
        .map(|value| ctx.expand(value).trim().to_string())
        .filter(|value| !value.is_empty())
        .collect()
}

/// Entries of `current` not named in `keep`, compared case-insensitively.
pub(crate) fn not_in(current: &[String], keep: &[String]) -> Vec<String> {
    current
        .iter()
        .filter(|value| !keep.iter().any(|k| k.eq_ignore_ascii_case(value)))
        .cloned()
        .collect()
}
