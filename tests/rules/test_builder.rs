use rulebot::core::rules::builder::check_document;
use rulebot::core::rules::runner::outline;
use rulebot::core::rules::{
    ActionEntry, ActionTreeBuilder, BuiltinChecks, QueryEngine, RuleDocument, RuleError,
    StepSequence,
};
use rulebot::core::types::EventKind;
use std::sync::Arc;

fn checks() -> BuiltinChecks {
    BuiltinChecks::new(Arc::new(QueryEngine::default()))
}

fn document(body: &str) -> RuleDocument {
    let text = format!(
        "revision: 1\nschema-version: 5\nowner-ms-alias: docsbot\nconfig: {{}}\n{}",
        body
    );
    RuleDocument::parse(&text).unwrap()
}

fn sequence<'a>(doc: &'a RuleDocument, kind: EventKind, action: &str) -> &'a StepSequence {
    match doc.actions(kind).and_then(|actions| actions.get(action)) {
        Some(ActionEntry::Sequence(sequence)) => sequence,
        other => panic!("{}.{} is not a sequence: {:?}", kind, action, other),
    }
}

#[test]
fn missing_predefined_contributes_nothing() {
    let doc = document(
        r#"
issues:
  opened:
    - labels-add: [triage]
    - predefined: notify-team
    - comment: "hello"
"#,
    );
    let checks = checks();
    let tree = ActionTreeBuilder::new(&doc, &checks).build(sequence(&doc, EventKind::Issues, "opened"));

    assert_eq!(tree.root.len(), 2);
    assert_eq!(tree.diagnostics.len(), 1);
    assert_eq!(
        tree.diagnostics[0].error,
        RuleError::MissingPredefined("notify-team".into())
    );
    assert!(!tree.is_clean());
}

#[test]
fn predefined_steps_are_spliced_in_place() {
    let doc = document(
        r#"
predefined:
  greet:
    - comment: "hi"
    - labels-add: [greeted]
issues:
  opened:
    - labels-add: [first]
    - predefined: greet
    - predefined: greet
"#,
    );
    let checks = checks();
    let tree = ActionTreeBuilder::new(&doc, &checks).build(sequence(&doc, EventKind::Issues, "opened"));

    assert!(tree.is_clean());
    assert_eq!(tree.root.len(), 5);
    let lines = outline(tree.root.as_ref());
    assert_eq!(lines[0], "runner (5 steps)");
    assert_eq!(lines[1], "  labels-add [\"first\"]");
    assert_eq!(lines[2], "  comment");
}

#[test]
fn predefined_cycles_are_reported() {
    let doc = document(
        r#"
predefined:
  ping:
    - labels-add: [ping]
    - predefined: pong
  pong:
    - predefined: ping
issues:
  opened:
    - predefined: ping
"#,
    );
    let checks = checks();
    let tree = ActionTreeBuilder::new(&doc, &checks).build(sequence(&doc, EventKind::Issues, "opened"));

    assert_eq!(tree.root.len(), 1);
    assert!(tree
        .diagnostics
        .iter()
        .any(|d| d.error == RuleError::PredefinedCycle("ping".into())));
}

#[test]
fn invalid_check_keeps_a_closed_gate() {
    let doc = document(
        r#"
issues:
  opened:
    - check: {favourite-colour: blue}
    - labels-add: [never]
"#,
    );
    let checks = checks();
    let tree = ActionTreeBuilder::new(&doc, &checks).build(sequence(&doc, EventKind::Issues, "opened"));

    assert_eq!(tree.root.len(), 2);
    assert_eq!(tree.diagnostics.len(), 1);
    assert!(matches!(tree.diagnostics[0].error, RuleError::InvalidCheck(_)));
}

#[test]
fn malformed_steps_do_not_stop_siblings() {
    let doc = document(
        r#"
pull_request:
  opened:
    - labels-explode: [x]
    - files-any:
        pattern: "(unclosed"
        steps:
          - labels-add: [docs]
    - assignees-add: [octocat]
    - [ {labels-add: [grouped]}, {comment: "nested"} ]
"#,
    );
    let checks = checks();
    let tree = ActionTreeBuilder::new(&doc, &checks)
        .build(sequence(&doc, EventKind::PullRequest, "opened"));

    assert_eq!(tree.root.len(), 2);
    assert_eq!(tree.diagnostics.len(), 2);
    assert!(matches!(
        tree.diagnostics[0].error,
        RuleError::InvalidActionSubtype { .. }
    ));
    assert!(matches!(tree.diagnostics[1].error, RuleError::MalformedStep(_)));
}

#[test]
fn document_check_walks_every_entry() {
    let doc = document(
        r#"
predefined:
  broken:
    - milestone-add: v1
issues:
  opened:
    - predefined: missing
  reopened: opened
  edited: reopened
  deleted: nowhere
pull_request:
  closed:
    - labels-add: [done]
"#,
    );
    let diagnostics = check_document(&doc, &checks());
    let steps: Vec<&str> = diagnostics.iter().map(|d| d.step.as_str()).collect();

    assert!(steps.iter().any(|s| s.starts_with("issues.opened: ")));
    assert!(diagnostics
        .iter()
        .any(|d| d.step == "issues.edited" && matches!(d.error, RuleError::DoubleRemap { .. })));
    assert!(diagnostics
        .iter()
        .any(|d| d.step == "issues.deleted" && matches!(d.error, RuleError::MalformedStep(_))));
    assert!(steps.iter().any(|s| s.starts_with("predefined.broken: ")));
    assert!(!steps.iter().any(|s| s.starts_with("issues.reopened")));
    assert!(!steps.iter().any(|s| s.starts_with("pull_request")));
}
