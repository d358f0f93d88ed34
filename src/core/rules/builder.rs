//! Compiles step sequences into executable action trees.

use crate::core::rules::action::ActionNode;
use crate::core::rules::actions::{
    AssigneesAction, CheckAction, CommentAction, FilesAction, LabelsAction, MilestoneAction,
    ProjectAction, ReviewersAction, VariableAction,
};
use crate::core::rules::checks::CheckEvaluator;
use crate::core::rules::error::RuleError;
use crate::core::rules::runner::Runner;
use crate::core::rules::resolver::{resolve, Resolution};
use crate::core::rules::schema::{ActionEntry, RuleDocument};
use crate::core::rules::step::{ActionSpec, StepNode, StepSequence};
use crate::core::types::EventKind;
use regex::Regex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::error;

/// A compile problem tied to the step that caused it.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub step: String,
    pub error: RuleError,
}

/// Compiled tree plus the per-step problems found while building it.
pub struct ActionTree {
    pub root: Arc<Runner>,
    pub diagnostics: Vec<Diagnostic>,
}

impl ActionTree {
    pub fn is_clean(&self) -> bool {
        self.diagnostics.is_empty()
    }
}

/// Builds trees for one invocation. Predefined sequences are compiled once and reused.
pub struct ActionTreeBuilder<'a> {
    document: &'a RuleDocument,
    checks: &'a dyn CheckEvaluator,
    predefined: HashMap<String, Vec<Arc<dyn ActionNode>>>,
    expanding: Vec<String>,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> ActionTreeBuilder<'a> {
    pub fn new(document: &'a RuleDocument, checks: &'a dyn CheckEvaluator) -> Self {
        Self {
            document,
            checks,
            predefined: HashMap::new(),
            expanding: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    pub fn build(mut self, sequence: &StepSequence) -> ActionTree {
        let root = Arc::new(self.compile_sequence(sequence));
        ActionTree {
            root,
            diagnostics: self.diagnostics,
        }
    }

    fn compile_sequence(&mut self, sequence: &StepSequence) -> Runner {
        let mut children = Vec::with_capacity(sequence.len());
        for step in &sequence.steps {
            self.compile_step(step, &mut children);
        }
        Runner::new(children)
    }

    fn compile_step(&mut self, step: &StepNode, out: &mut Vec<Arc<dyn ActionNode>>) {
        match step {
            StepNode::Group(nested) => out.push(Arc::new(self.compile_sequence(nested))),
            StepNode::Malformed { key, error } => self.report(key, error.clone()),
            StepNode::Action(spec) => match self.compile_action(spec) {
                Ok(nodes) => out.extend(nodes),
                Err(err) => self.report(&spec.describe(), err),
            },
        }
    }

    fn compile_action(&mut self, spec: &ActionSpec) -> Result<Vec<Arc<dyn ActionNode>>, RuleError> {
        let node: Arc<dyn ActionNode> = match spec {
            ActionSpec::Predefined(name) => return self.expand_predefined(name),
            ActionSpec::Check(group) => match self.checks.build(group) {
                Ok(condition) => Arc::new(CheckAction::new(condition)),
                Err(err) => {
                    // Keep the gate so the steps after it stay blocked.
                    self.report("check", err);
                    Arc::new(CheckAction::never())
                }
            },
            ActionSpec::Labels { subtype, values } => {
                Arc::new(LabelsAction::new(*subtype, values.clone()))
            }
            ActionSpec::Assignees { subtype, values } => {
                Arc::new(AssigneesAction::new(*subtype, values.clone()))
            }
            ActionSpec::Reviewers { subtype, values } => {
                Arc::new(ReviewersAction::new(*subtype, values.clone()))
            }
            ActionSpec::Milestone { subtype, value } => {
                Arc::new(MilestoneAction::new(*subtype, value.clone()))
            }
            ActionSpec::Project { subtype, value } => {
                Arc::new(ProjectAction::new(*subtype, value.clone()))
            }
            ActionSpec::Comment { template } => Arc::new(CommentAction::new(template.clone())),
            ActionSpec::Variable {
                subtype,
                name,
                value,
            } => Arc::new(VariableAction::new(*subtype, name.clone(), value.clone())),
            ActionSpec::Files {
                mode,
                pattern,
                steps,
            } => {
                let regex = Regex::new(pattern).map_err(|err| {
                    RuleError::MalformedStep(format!("invalid file pattern '{}': {}", pattern, err))
                })?;
                let body = Arc::new(self.compile_sequence(steps));
                Arc::new(FilesAction::new(*mode, regex, body))
            }
        };
        Ok(vec![node])
    }

    /// Compile a named sequence for splicing into the current one.
    fn expand_predefined(&mut self, name: &str) -> Result<Vec<Arc<dyn ActionNode>>, RuleError> {
        if let Some(nodes) = self.predefined.get(name) {
            return Ok(nodes.clone());
        }
        if self.expanding.iter().any(|open| open == name) {
            return Err(RuleError::PredefinedCycle(name.to_string()));
        }
        let document = self.document;
        let sequence = document
            .predefined
            .get(name)
            .ok_or_else(|| RuleError::MissingPredefined(name.to_string()))?;

        self.expanding.push(name.to_string());
        let mut nodes = Vec::with_capacity(sequence.len());
        for step in &sequence.steps {
            self.compile_step(step, &mut nodes);
        }
        self.expanding.pop();

        self.predefined.insert(name.to_string(), nodes.clone());
        Ok(nodes)
    }

    fn report(&mut self, step: &str, err: RuleError) {
        error!(step, code = err.code(), "failed to compile step: {}", err);
        self.diagnostics.push(Diagnostic {
            step: step.to_string(),
            error: err,
        });
    }
}

/// Compile every action entry and predefined sequence of `document`.
///
/// Diagnostics are prefixed with their location, e.g. `issues.opened: labels-add [..]`.
pub fn check_document(document: &RuleDocument, checks: &dyn CheckEvaluator) -> Vec<Diagnostic> {
    let mut found = Vec::new();
    for kind in EventKind::ALL {
        let Some(actions) = document.actions(kind) else {
            continue;
        };
        for (name, entry) in actions {
            let location = format!("{}.{}", kind, name);
            if let ActionEntry::Sequence(sequence) = entry {
                let tree = ActionTreeBuilder::new(document, checks).build(sequence);
                found.extend(tree.diagnostics.into_iter().map(|d| Diagnostic {
                    step: format!("{}: {}", location, d.step),
                    error: d.error,
                }));
                continue;
            }
            match resolve(Some(actions), name) {
                Ok(Resolution::Resolved { .. }) => {}
                Ok(Resolution::Undefined) => found.push(Diagnostic {
                    step: location,
                    error: RuleError::MalformedStep(format!(
                        "alias target of '{}' is not configured",
                        name
                    )),
                }),
                Err(error) => found.push(Diagnostic {
                    step: location,
                    error,
                }),
            }
        }
    }
    for (name, sequence) in &document.predefined {
        let tree = ActionTreeBuilder::new(document, checks).build(sequence);
        found.extend(tree.diagnostics.into_iter().map(|d| Diagnostic {
            step: format!("predefined.{}: {}", name, d.step),
            error: d.error,
        }));
    }
    found
}
