use rulebot::core::error::{AppError, DefaultErrorReporter, ErrorReporter};
use rulebot::core::rules::RuleError;
use rulebot::core::types::{ErrorCategory, ErrorSeverity};

#[test]
fn test_error_creation_all_categories() {
    let categories = vec![
        ErrorCategory::ValidationError,
        ErrorCategory::ConfigurationError,
        ErrorCategory::CompilationError,
        ErrorCategory::ResolutionError,
        ErrorCategory::QueryError,
        ErrorCategory::UpstreamError,
        ErrorCategory::ForbiddenError,
        ErrorCategory::AuthenticationError,
        ErrorCategory::SerializationError,
        ErrorCategory::IoError,
        ErrorCategory::InternalError,
        ErrorCategory::Unknown,
    ];

    for category in categories {
        let error = AppError::new(category, "test message");
        assert_eq!(error.category, category);
        assert_eq!(error.message, "test message");
        assert!(error.context.is_empty());
        assert!(error.code.starts_with("ERR-"));
        assert!(error.occurred_at <= chrono::Utc::now());
        assert!(error.source.is_none());
    }
}

#[test]
fn test_error_severity_mapping() {
    let test_cases = vec![
        (ErrorCategory::ValidationError, ErrorSeverity::Error),
        (ErrorCategory::CompilationError, ErrorSeverity::Warning),
        (ErrorCategory::QueryError, ErrorSeverity::Error),
        (ErrorCategory::ForbiddenError, ErrorSeverity::Error),
        (ErrorCategory::InternalError, ErrorSeverity::Error),
        (ErrorCategory::Unknown, ErrorSeverity::Info),
    ];

    for (category, expected_severity) in test_cases {
        let error = AppError::new(category, "test");
        assert_eq!(error.severity(), expected_severity);
    }
}

#[test]
fn test_error_display_includes_code_and_context() {
    let error = AppError::new(ErrorCategory::ConfigurationError, "bad rules")
        .with_code("RULE-CFG-001")
        .with_context("rules file .github/rulebot.yml");
    let text = error.to_string();
    assert!(text.starts_with("[RULE-CFG-001] ConfigurationError: bad rules"));
    assert!(text.contains(".github/rulebot.yml"));
}

#[test]
fn test_rule_errors_map_to_categories_and_codes() {
    let cases = vec![
        (
            RuleError::ConfigParse("eof".into()),
            ErrorCategory::ConfigurationError,
            "RULE-CFG-001",
        ),
        (
            RuleError::SchemaTooOld {
                found: 1,
                minimum: 5,
            },
            ErrorCategory::ConfigurationError,
            "RULE-CFG-002",
        ),
        (
            RuleError::InvalidActionType("labels".into()),
            ErrorCategory::CompilationError,
            "RULE-BUILD-001",
        ),
        (
            RuleError::MissingPredefined("notify-team".into()),
            ErrorCategory::CompilationError,
            "RULE-BUILD-004",
        ),
        (
            RuleError::DoubleRemap {
                from: "reopened".into(),
                to: "opened".into(),
            },
            ErrorCategory::ResolutionError,
            "RULE-RESOLVE-001",
        ),
        (
            RuleError::Query("syntax".into()),
            ErrorCategory::QueryError,
            "RULE-QUERY-001",
        ),
    ];

    for (rule_error, category, code) in cases {
        let message = rule_error.to_string();
        let app: AppError = rule_error.into();
        assert_eq!(app.category, category);
        assert_eq!(app.code, code);
        assert_eq!(app.message, message);
    }
}

#[test]
fn test_rule_failure_categories() {
    assert!(ErrorCategory::ConfigurationError.is_rule_failure());
    assert!(ErrorCategory::QueryError.is_rule_failure());
    assert!(!ErrorCategory::UpstreamError.is_rule_failure());
    assert!(!ErrorCategory::ForbiddenError.is_rule_failure());
}

#[test]
fn test_io_and_anyhow_conversions() {
    let io = std::io::Error::new(std::io::ErrorKind::NotFound, "rules missing");
    let app: AppError = io.into();
    assert_eq!(app.category, ErrorCategory::IoError);
    assert_eq!(app.code, "IO_ERROR");
    assert!(app.source.is_some());

    let app: AppError = anyhow::anyhow!("boom").into();
    assert_eq!(app.category, ErrorCategory::InternalError);
    assert_eq!(app.message, "boom");
}

#[test]
fn test_with_source_keeps_the_cause() {
    let cause = std::io::Error::new(std::io::ErrorKind::Other, "socket closed");
    let error = AppError::with_source(ErrorCategory::UpstreamError, "fetch failed", Box::new(cause));
    assert!(error.to_string().contains("Caused by: socket closed"));
}

#[test]
fn test_default_reporter_accepts_every_severity() {
    let reporter = DefaultErrorReporter::new();
    reporter.report_error(&AppError::new(ErrorCategory::CompilationError, "bad step"));
    reporter.report_error(&AppError::new(ErrorCategory::UpstreamError, "timeout"));
    reporter.report_warning("rerun label ignored", Some("issues.labeled".into()));
    reporter.report_warning("no target", None);
}
