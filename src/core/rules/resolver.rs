//! Decides which configured action-set handles an event.

#![allow(clippy::result_large_err)]

use crate::core::error::AppError;
use crate::core::rules::context::EventContext;
use crate::core::rules::error::RuleError;
use crate::core::rules::schema::ActionEntry;
use crate::core::rules::step::StepSequence;
use indexmap::IndexMap;
use tracing::{debug, info};

/// At most this many alias hops are followed.
pub const MAX_ALIAS_HOPS: usize = 1;

/// Labels with this prefix re-run the event under the suffix as action name.
pub const RERUN_LABEL_PREFIX: &str = "rerun-action-";

/// Successful outcome of resolution.
#[derive(Debug, Clone, Copy)]
pub enum Resolution<'a> {
    Resolved {
        action: &'a str,
        remapped: bool,
        sequence: &'a StepSequence,
    },
    /// Nothing is configured for the action; not an error.
    Undefined,
}

/// Follow the configured entry for `action`, taking at most one alias hop.
pub fn resolve<'a>(
    actions: Option<&'a IndexMap<String, ActionEntry>>,
    action: &str,
) -> Result<Resolution<'a>, RuleError> {
    let Some(actions) = actions else {
        return Ok(Resolution::Undefined);
    };
    let mut current = action.to_string();
    let mut hops = 0;
    loop {
        let Some((name, entry)) = actions.get_key_value(current.as_str()) else {
            debug!(action = %current, "no action-set configured");
            return Ok(Resolution::Undefined);
        };
        match entry {
            ActionEntry::Sequence(sequence) => {
                return Ok(Resolution::Resolved {
                    action: name.as_str(),
                    remapped: hops > 0,
                    sequence,
                })
            }
            ActionEntry::Alias(target) => {
                if hops >= MAX_ALIAS_HOPS {
                    return Err(RuleError::DoubleRemap {
                        from: current,
                        to: target.clone(),
                    });
                }
                if *target == current {
                    return Err(RuleError::SelfRemap(current));
                }
                debug!(from = %current, to = %target, "following action alias");
                current = target.clone();
                hops += 1;
            }
            ActionEntry::Other(_) => return Err(RuleError::NotASequence(current)),
        }
    }
}

/// Apply a `rerun-action-<name>` label on a `labeled` event.
///
/// The label is pooled for removal and the issue/PR/comment are re-read before the
/// new action name is installed. Returns the new action name when a rerun applies.
pub async fn apply_rerun(ctx: &mut EventContext) -> Result<Option<String>, AppError> {
    if ctx.raw_action != "labeled" {
        return Ok(None);
    }
    let label = ctx.target().and_then(|item| {
        item.labels
            .iter()
            .find(|label| has_rerun_prefix(label))
            .cloned()
    });
    let Some(label) = label else {
        return Ok(None);
    };
    let action = label[RERUN_LABEL_PREFIX.len()..].trim().to_lowercase();
    if action.is_empty() {
        return Ok(None);
    }

    info!(%label, %action, "rerun label found; reprocessing");
    ctx.operations.remove_label(&label);
    ctx.refresh().await?;
    ctx.set_action(&action);
    Ok(Some(action))
}

fn has_rerun_prefix(label: &str) -> bool {
    label.len() > RERUN_LABEL_PREFIX.len()
        && label.is_char_boundary(RERUN_LABEL_PREFIX.len())
        && label[..RERUN_LABEL_PREFIX.len()].eq_ignore_ascii_case(RERUN_LABEL_PREFIX)
}
