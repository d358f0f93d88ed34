//! Per-delivery orchestration: load rules, set up the event context, resolve the
//! action, build the tree, run it and flush.

#![allow(clippy::result_large_err)]

use crate::core::error::AppError;
use crate::core::github::{ClientProvider, RepoClient};
use crate::core::http::PageFetcher;
use crate::core::rules::builder::ActionTreeBuilder;
use crate::core::rules::checks::{BuiltinChecks, CheckEvaluator};
use crate::core::rules::context::{EventContext, Services};
use crate::core::rules::expression::QueryEngine;
use crate::core::rules::pool::FlushReport;
use crate::core::rules::resolver::{apply_rerun, resolve, Resolution};
use crate::core::rules::runner;
use crate::core::rules::schema::{RuleDocument, RULES_FILE_PATH};
use crate::core::types::{ErrorCategory, EventKind, RepoRef};
use serde::Serialize;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, info_span, warn, Instrument};

/// Where the rules document comes from.
#[derive(Clone)]
pub enum RulesSource {
    /// `.github/rulebot.yml` on the target repository's default branch.
    Repository,
    /// A file on local disk, re-read for every delivery.
    LocalFile(PathBuf),
    /// An already parsed document.
    Fixed(Arc<RuleDocument>),
}

/// One inbound event.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub kind: EventKind,
    pub payload: Value,
    pub id: Option<String>,
}

impl Delivery {
    pub fn new(kind: EventKind, payload: Value) -> Self {
        Self {
            kind,
            payload,
            id: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    /// The action-set ran to the end.
    Completed,
    /// The action-set ran but a query or check failed along the way.
    Failed,
    /// Nothing is configured for the event's action.
    NoAction,
}

/// Summary of one delivery.
#[derive(Debug, Clone, Serialize)]
pub struct InvocationOutcome {
    pub status: OutcomeStatus,
    pub event: EventKind,
    pub raw_action: String,
    /// Action whose sequence ran, after rerun and alias handling.
    pub action: Option<String>,
    pub rerun: bool,
    pub operations: FlushReport,
    pub diagnostics: Vec<String>,
    pub failure: Option<String>,
}

pub struct RuleEngine {
    provider: Arc<dyn ClientProvider>,
    fetcher: Arc<dyn PageFetcher>,
    queries: Arc<QueryEngine>,
    checks: Arc<dyn CheckEvaluator>,
    rules: RulesSource,
}

impl RuleEngine {
    pub fn new(
        provider: Arc<dyn ClientProvider>,
        fetcher: Arc<dyn PageFetcher>,
        rules: RulesSource,
    ) -> Self {
        let queries = Arc::new(QueryEngine::default());
        let checks = Arc::new(BuiltinChecks::new(Arc::clone(&queries)));
        Self {
            provider,
            fetcher,
            queries,
            checks,
            rules,
        }
    }

    /// Process one delivery end to end.
    pub async fn handle(&self, delivery: Delivery) -> Result<InvocationOutcome, AppError> {
        let span = info_span!(
            "delivery",
            event = %delivery.kind,
            id = delivery.id.as_deref().unwrap_or("-")
        );
        self.handle_inner(delivery).instrument(span).await
    }

    async fn handle_inner(&self, delivery: Delivery) -> Result<InvocationOutcome, AppError> {
        let Delivery { kind, payload, id } = delivery;
        let repo = payload
            .pointer("/repository/full_name")
            .and_then(Value::as_str)
            .and_then(RepoRef::parse)
            .ok_or_else(|| {
                AppError::new(
                    ErrorCategory::ValidationError,
                    "payload has no repository.full_name",
                )
                .with_code("RULE-PAYLOAD-002")
            })?;
        let installation = payload.pointer("/installation/id").and_then(Value::as_u64);

        let client = self.provider.client_for(installation, &repo).await?;
        let rules = self.load_rules(client.as_ref(), &repo).await?;
        let services = Services {
            client,
            fetcher: Arc::clone(&self.fetcher),
            queries: Arc::clone(&self.queries),
        };
        let mut ctx =
            EventContext::from_payload(kind, payload, Arc::clone(&rules), services)?.with_delivery(id);
        info!(repo = %repo, action = %ctx.raw_action, "processing delivery");

        let rerun = apply_rerun(&mut ctx).await?.is_some();

        let (action, sequence) = match resolve(rules.actions(kind), &ctx.action)? {
            Resolution::Resolved {
                action,
                remapped,
                sequence,
            } => {
                if remapped {
                    info!(from = %ctx.action, to = action, "action remapped");
                    ctx.set_action(action);
                }
                (action.to_string(), sequence)
            }
            Resolution::Undefined => {
                info!(action = %ctx.action, "no action-set configured; nothing to do");
                // A consumed rerun label still has to come off.
                let operations = ctx.flush().await?;
                return Ok(InvocationOutcome {
                    status: OutcomeStatus::NoAction,
                    event: kind,
                    raw_action: ctx.raw_action.clone(),
                    action: None,
                    rerun,
                    operations,
                    diagnostics: Vec::new(),
                    failure: None,
                });
            }
        };

        ctx.ensure_doc_metadata().await;

        let tree = ActionTreeBuilder::new(&rules, self.checks.as_ref()).build(sequence);
        let diagnostics: Vec<String> = tree
            .diagnostics
            .iter()
            .map(|d| format!("{}: {}", d.step, d.error))
            .collect();

        let operations = runner::execute(tree.root.as_ref(), &mut ctx).await?;

        let (status, failure) = if ctx.has_failure {
            warn!(action = %action, "action-set finished with failures: {}", ctx.failure_message);
            (OutcomeStatus::Failed, Some(ctx.failure_message.clone()))
        } else {
            info!(action = %action, "action-set completed");
            (OutcomeStatus::Completed, None)
        };
        Ok(InvocationOutcome {
            status,
            event: kind,
            raw_action: ctx.raw_action.clone(),
            action: Some(action),
            rerun,
            operations,
            diagnostics,
            failure,
        })
    }

    async fn load_rules(
        &self,
        client: &dyn RepoClient,
        repo: &RepoRef,
    ) -> Result<Arc<RuleDocument>, AppError> {
        match &self.rules {
            RulesSource::Fixed(document) => Ok(Arc::clone(document)),
            RulesSource::LocalFile(path) => Ok(Arc::new(RuleDocument::load_from_file(path)?)),
            RulesSource::Repository => {
                let text = client.fetch_rules_file(RULES_FILE_PATH).await?.ok_or_else(|| {
                    AppError::new(
                        ErrorCategory::ConfigurationError,
                        format!("{} not found in {}", RULES_FILE_PATH, repo),
                    )
                    .with_code("RULE-CFG-003")
                })?;
                let document = RuleDocument::parse(&text).map_err(|err| {
                    AppError::from(err).with_context(format!("{} in {}", RULES_FILE_PATH, repo))
                })?;
                Ok(Arc::new(document))
            }
        }
    }
}
