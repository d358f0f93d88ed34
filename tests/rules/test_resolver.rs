use async_trait::async_trait;
use indexmap::IndexMap;
use rulebot::core::error::AppError;
use rulebot::core::github::{OfflineClient, RepoClient};
use rulebot::core::http::PageFetcher;
use rulebot::core::rules::{
    apply_rerun, resolve, ActionEntry, EventContext, QueryEngine, Resolution, RuleDocument,
    RuleError, Services,
};
use rulebot::core::types::{ErrorCategory, EventKind, RepoRef};
use serde_json::{json, Value};
use std::sync::Arc;

const RULES: &str = r#"
revision: 3
schema-version: 5
owner-ms-alias: docsbot
config: {}
issues:
  opened:
    - labels-add: [triage]
  reopened: opened
  edited: reopened
  transferred: transferred
  closed:
    - comment: "closing $number$"
  pinned: 42
"#;

struct NoPages;

#[async_trait]
impl PageFetcher for NoPages {
    async fn fetch_text(&self, url: &str) -> Result<String, AppError> {
        Err(AppError::new(ErrorCategory::UpstreamError, format!("offline: {}", url)))
    }
}

fn document() -> Arc<RuleDocument> {
    Arc::new(RuleDocument::parse(RULES).unwrap())
}

fn issues(doc: &RuleDocument) -> Option<&IndexMap<String, ActionEntry>> {
    doc.actions(EventKind::Issues)
}

fn issue(title: &str, labels: &[&str]) -> Value {
    json!({
        "number": 12,
        "node_id": "I_12",
        "title": title,
        "body": "",
        "state": "open",
        "user": {"login": "jdoe"},
        "labels": labels.iter().map(|name| json!({"name": name})).collect::<Vec<_>>(),
        "assignees": [],
        "html_url": "https://github.com/octo/docs/issues/12"
    })
}

fn context(payload: Value, client: Arc<OfflineClient>) -> EventContext {
    let client: Arc<dyn RepoClient> = client;
    let services = Services {
        client,
        fetcher: Arc::new(NoPages),
        queries: Arc::new(QueryEngine::default()),
    };
    EventContext::from_payload(EventKind::Issues, payload, document(), services).unwrap()
}

#[test]
fn direct_sequence_is_not_remapped() {
    let doc = document();
    match resolve(issues(&doc), "opened").unwrap() {
        Resolution::Resolved {
            action,
            remapped,
            sequence,
        } => {
            assert_eq!(action, "opened");
            assert!(!remapped);
            assert_eq!(sequence.len(), 1);
        }
        Resolution::Undefined => panic!("opened should resolve"),
    }
}

#[test]
fn single_alias_hop_reports_the_target() {
    let doc = document();
    let Resolution::Resolved {
        action, remapped, ..
    } = resolve(issues(&doc), "reopened").unwrap()
    else {
        panic!("reopened should resolve");
    };
    assert_eq!(action, "opened");
    assert!(remapped);
}

#[test]
fn chained_alias_is_a_double_remap() {
    let doc = document();
    let err = resolve(issues(&doc), "edited").unwrap_err();
    assert_eq!(
        err,
        RuleError::DoubleRemap {
            from: "reopened".into(),
            to: "opened".into()
        }
    );
    let app: AppError = err.into();
    assert_eq!(app.category, ErrorCategory::ResolutionError);
}

#[test]
fn alias_to_itself_is_rejected() {
    let doc = document();
    assert_eq!(
        resolve(issues(&doc), "transferred").unwrap_err(),
        RuleError::SelfRemap("transferred".into())
    );
}

#[test]
fn scalar_that_is_not_a_name_is_not_a_sequence() {
    let doc = document();
    assert!(matches!(
        resolve(issues(&doc), "pinned"),
        Err(RuleError::NotASequence(name)) if name == "pinned"
    ));
}

#[test]
fn unknown_action_and_unconfigured_event_are_undefined() {
    let doc = document();
    assert!(matches!(
        resolve(issues(&doc), "deleted").unwrap(),
        Resolution::Undefined
    ));
    assert!(matches!(resolve(None, "opened").unwrap(), Resolution::Undefined));
}

#[tokio::test]
async fn rerun_label_switches_action_and_refreshes() {
    let repo = RepoRef::new("octo", "docs");
    let payload = json!({
        "action": "labeled",
        "repository": {"full_name": "octo/docs"},
        "issue": issue("stale title", &["docs", "Rerun-Action-Closed"]),
    });
    // Upstream already has a newer title.
    let upstream = issue("fresh title", &["docs", "Rerun-Action-Closed"]);
    let client = Arc::new(
        OfflineClient::new(repo)
            .with_issue(rulebot::core::github::ItemSnapshot::from_value(&upstream).unwrap()),
    );
    let mut ctx = context(payload, client);

    let rerun = apply_rerun(&mut ctx).await.unwrap();

    assert_eq!(rerun.as_deref(), Some("closed"));
    assert_eq!(ctx.action, "closed");
    assert_eq!(ctx.raw_action, "labeled");
    assert_eq!(ctx.variables.get("action"), Some("closed"));
    assert_eq!(ctx.issue.as_ref().unwrap().title, "fresh title");
    assert_eq!(ctx.variables.get("title"), Some("fresh title"));
    assert_eq!(
        ctx.operations.labels_to_remove().collect::<Vec<_>>(),
        vec!["Rerun-Action-Closed"]
    );
}

#[tokio::test]
async fn rerun_only_applies_to_labeled_events() {
    let payload = json!({
        "action": "opened",
        "repository": {"full_name": "octo/docs"},
        "issue": issue("t", &["rerun-action-closed"]),
    });
    let client = Arc::new(OfflineClient::new(RepoRef::new("octo", "docs")));
    let mut ctx = context(payload, client);

    assert_eq!(apply_rerun(&mut ctx).await.unwrap(), None);
    assert_eq!(ctx.action, "opened");
    assert!(ctx.operations.is_empty());
}

#[tokio::test]
async fn labeled_event_without_rerun_label_keeps_action() {
    let payload = json!({
        "action": "labeled",
        "repository": {"full_name": "octo/docs"},
        "issue": issue("t", &["bug"]),
    });
    let client = Arc::new(OfflineClient::new(RepoRef::new("octo", "docs")));
    let mut ctx = context(payload, client);

    assert_eq!(apply_rerun(&mut ctx).await.unwrap(), None);
    assert_eq!(ctx.action, "labeled");
}
