use rulebot::core::error::AppError;
use rulebot::core::rules::step::FileMatch;
use rulebot::core::rules::{
    ActionEntry, ActionSpec, RuleDocument, RuleError, StepNode, Subtype, MIN_SCHEMA_VERSION,
};
use rulebot::core::types::{ErrorCategory, EventKind};
use std::fs;
use tempfile::TempDir;

const FULL: &str = r#"
revision: 17
schema-version: 6
owner-ms-alias: docsbot
config:
  docMetadata:
    headers:
      - ["Content source:"]
      - ["---", ""]
    contentUrlRegex:
      - "https://learn\\.example\\.com/\\S+"
    parserRegex: "^(\\w+):\\s*(.+)$"
predefined:
  notify:
    - comment: "Thanks @$author$!"
issues:
  opened:
    - check: {has-label: needs-triage}
    - labels-add: [triaged]
    - predefined: notify
  reopened: opened
pull_request:
  opened:
    - files-any:
        pattern: "^docs/"
        steps:
          - reviewers-add: [docs-team]
issue_comment:
  created:
    - variable-set: {name: reply, value: "$expr:comment.body"}
projects_v2_item:
  edited:
    - project-remove: PVT_1
"#;

#[test]
fn parses_every_section() {
    let doc = RuleDocument::parse(FULL).unwrap();
    assert_eq!(doc.revision, 17);
    assert_eq!(doc.schema_version, 6);
    assert_eq!(doc.owner_alias, "docsbot");

    let meta = &doc.settings.doc_metadata;
    assert_eq!(meta.headers.len(), 2);
    assert_eq!(meta.headers[1], vec!["---".to_string(), String::new()]);
    assert_eq!(meta.content_url_regex.len(), 1);
    assert!(meta.parser_regex.is_some());

    assert_eq!(doc.predefined.get("notify").map(|s| s.len()), Some(1));
    for kind in EventKind::ALL {
        assert!(doc.actions(kind).is_some(), "{} missing", kind);
    }

    let opened = match doc.actions(EventKind::Issues).unwrap().get("opened") {
        Some(ActionEntry::Sequence(sequence)) => sequence,
        other => panic!("unexpected entry {:?}", other),
    };
    assert!(matches!(&opened.steps[0], StepNode::Action(ActionSpec::Check(_))));
    assert!(matches!(
        &opened.steps[1],
        StepNode::Action(ActionSpec::Labels { subtype: Subtype::Add, values }) if values == &["triaged"]
    ));
    assert!(matches!(
        &opened.steps[2],
        StepNode::Action(ActionSpec::Predefined(name)) if name == "notify"
    ));

    let Some(ActionEntry::Sequence(pr)) = doc.actions(EventKind::PullRequest).unwrap().get("opened")
    else {
        panic!("pull_request.opened should be a sequence");
    };
    match &pr.steps[0] {
        StepNode::Action(ActionSpec::Files {
            mode,
            pattern,
            steps,
        }) => {
            assert_eq!(*mode, FileMatch::Any);
            assert_eq!(pattern, "^docs/");
            assert_eq!(steps.len(), 1);
        }
        other => panic!("unexpected step {:?}", other),
    }
}

#[test]
fn old_schema_is_reported_before_anything_else() {
    // Version 1 documents used a different shape entirely.
    let text = "schema-version: 1\nrules: []\n";
    let err = RuleDocument::parse(text).unwrap_err();
    assert_eq!(
        err,
        RuleError::SchemaTooOld {
            found: 1,
            minimum: MIN_SCHEMA_VERSION
        }
    );
    assert!(err.to_string().contains("schema out of date"));
    let app: AppError = err.into();
    assert_eq!(app.category, ErrorCategory::ConfigurationError);
    assert_eq!(app.code, "RULE-CFG-002");
}

#[test]
fn missing_required_keys_fail_to_parse() {
    let err = RuleDocument::parse("schema-version: 5\nrevision: 1\n").unwrap_err();
    assert!(matches!(err, RuleError::ConfigParse(_)));
    assert!(matches!(
        RuleDocument::parse("{{ not yaml").unwrap_err(),
        RuleError::ConfigParse(_)
    ));
}

#[test]
fn bad_steps_are_kept_in_place_for_reporting() {
    let text = r#"
revision: 1
schema-version: 5
owner-ms-alias: docsbot
config: {}
issues:
  opened:
    - shout: loudly
    - milestone-add: v2
    - labels-add: [ok]
    - {labels-add: [a], labels-remove: [b]}
"#;
    let doc = RuleDocument::parse(text).unwrap();
    let Some(ActionEntry::Sequence(sequence)) = doc.actions(EventKind::Issues).unwrap().get("opened")
    else {
        panic!("opened should be a sequence");
    };
    assert_eq!(sequence.len(), 4);
    assert!(matches!(
        &sequence.steps[0],
        StepNode::Malformed { error: RuleError::InvalidActionType(t), .. } if t == "shout"
    ));
    assert!(matches!(
        &sequence.steps[1],
        StepNode::Malformed { error: RuleError::InvalidActionSubtype { family, subtype }, .. }
            if family == "milestone" && subtype == "add"
    ));
    assert!(matches!(&sequence.steps[2], StepNode::Action(_)));
    assert!(matches!(&sequence.steps[3], StepNode::Malformed { .. }));
}

#[test]
fn invalid_content_url_pattern_is_a_config_error() {
    let text = r#"
revision: 1
schema-version: 5
owner-ms-alias: docsbot
config:
  docMetadata:
    contentUrlRegex: ["(unclosed"]
"#;
    assert!(matches!(
        RuleDocument::parse(text).unwrap_err(),
        RuleError::ConfigParse(message) if message.contains("contentUrlRegex")
    ));
}

#[test]
fn loads_from_disk() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("rulebot.yml");
    fs::write(&path, FULL).unwrap();
    let doc = RuleDocument::load_from_file(&path).unwrap();
    assert_eq!(doc.revision, 17);

    let err = RuleDocument::load_from_file(&dir.path().join("absent.yml")).unwrap_err();
    assert_eq!(err.category, ErrorCategory::IoError);
}
