use crate::{
    cli::args::{RunArgs, ServeArgs, ValidateArgs},
    core::{
        config::{ConfigLoader, ConfigValidator, RunMode},
        engine::{Delivery, OutcomeStatus, RuleEngine, RulesSource},
        github::{ClientProvider, FixedClientProvider, GitHubApp, InstallationClients, OfflineClient, RepoClient},
        http::HttpPageFetcher,
        rules::{builder::check_document, BuiltinChecks, QueryEngine, RuleDocument},
        types::{EventKind, RepoRef},
        webhook::{serve_webhook, WebhookOptions},
    },
    Result,
};
use anyhow::{anyhow, Context};
use serde_json::{json, Value};
use std::fs;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

const DEFAULT_PAGE_TIMEOUT: Duration = Duration::from_secs(10);

pub async fn serve(args: ServeArgs) -> Result<()> {
    let mut config = ConfigLoader::load(args.config.as_deref())?;
    if let Some(bind) = args.bind {
        config.webhook.bind = bind;
    }
    if args.dry_run {
        config.engine.dry_run = true;
    }
    ConfigValidator::validate(&config, RunMode::Serve)?;

    let app_id = config
        .github
        .app_id
        .ok_or_else(|| anyhow!("github.app_id is required"))?;
    let app_key = config
        .github
        .app_key
        .as_deref()
        .ok_or_else(|| anyhow!("an app private key is required"))?;
    let api_base = Url::parse(&config.github.api_base)
        .with_context(|| format!("invalid github.api_base {}", config.github.api_base))?;
    let margin = chrono::Duration::seconds(config.github.token_refresh_margin_seconds as i64);
    let app = GitHubApp::from_pem(app_id, app_key, api_base, margin)?;
    let provider: Arc<dyn ClientProvider> =
        Arc::new(InstallationClients::new(Arc::new(app), config.engine.dry_run));

    let fetcher = Arc::new(HttpPageFetcher::new(Duration::from_secs(
        config.engine.page_timeout_seconds,
    ))?);
    let rules = if config.engine.use_local_rules {
        RulesSource::LocalFile(config.engine.local_rules_path.clone())
    } else {
        RulesSource::Repository
    };
    let engine = Arc::new(RuleEngine::new(provider, fetcher, rules));

    let bind: SocketAddr = config
        .webhook
        .bind
        .parse()
        .with_context(|| format!("invalid webhook.bind {}", config.webhook.bind))?;
    let options = WebhookOptions {
        secret: config.webhook.secret.clone().unwrap_or_default(),
        max_body_bytes: config.webhook.max_body_bytes,
        verbose_errors: config.engine.verbose_errors,
    };
    tracing::info!(
        %bind,
        dry_run = config.engine.dry_run,
        local_rules = config.engine.use_local_rules,
        "starting rulebot"
    );
    serve_webhook(engine, options, bind).await?;
    Ok(())
}

pub async fn run(args: RunArgs) -> Result<()> {
    let kind = EventKind::from_header(&args.event)
        .ok_or_else(|| anyhow!("unsupported event '{}'", args.event))?;
    let raw = fs::read_to_string(&args.payload)
        .with_context(|| format!("failed to read payload {}", args.payload.display()))?;
    let payload: Value = serde_json::from_str(&raw)
        .with_context(|| format!("payload {} is not valid JSON", args.payload.display()))?;
    let repo = payload
        .pointer("/repository/full_name")
        .and_then(Value::as_str)
        .and_then(RepoRef::parse)
        .ok_or_else(|| anyhow!("payload has no repository.full_name"))?;

    let document = RuleDocument::load_from_file(&args.rules)?;

    let mut client = OfflineClient::from_payload(repo, &payload)?;
    if let Some(number) = payload.pointer("/pull_request/number").and_then(Value::as_u64) {
        client = client.with_files(number, args.files.clone());
    }
    let client = Arc::new(client);
    let repo_client: Arc<dyn RepoClient> = client.clone();
    let provider: Arc<dyn ClientProvider> = Arc::new(FixedClientProvider::new(repo_client));
    let fetcher = Arc::new(HttpPageFetcher::new(DEFAULT_PAGE_TIMEOUT)?);
    let engine = RuleEngine::new(provider, fetcher, RulesSource::Fixed(Arc::new(document)));

    let outcome = engine
        .handle(Delivery::new(kind, payload).with_id("local"))
        .await?;
    let report = json!({
        "outcome": outcome,
        "mutations": client.log().entries(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);

    if outcome.status == OutcomeStatus::Failed {
        return Err(anyhow!(
            "action-set finished with failures: {}",
            outcome.failure.unwrap_or_default()
        ));
    }
    Ok(())
}

pub async fn validate(args: ValidateArgs) -> Result<()> {
    let document = RuleDocument::load_from_file(&args.file)?;
    let checks = BuiltinChecks::new(Arc::new(QueryEngine::default()));
    let diagnostics = check_document(&document, &checks);

    if diagnostics.is_empty() {
        let entries: usize = EventKind::ALL
            .iter()
            .filter_map(|kind| document.actions(*kind))
            .map(|actions| actions.len())
            .sum();
        println!(
            "{}: ok ({} action entries, {} predefined sequences)",
            args.file.display(),
            entries,
            document.predefined.len()
        );
        return Ok(());
    }

    for diagnostic in &diagnostics {
        println!(
            "{}: [{}] {}",
            diagnostic.step,
            diagnostic.error.code(),
            diagnostic.error
        );
    }
    Err(anyhow!(
        "{} problem(s) found in {}",
        diagnostics.len(),
        args.file.display()
    ))
}
