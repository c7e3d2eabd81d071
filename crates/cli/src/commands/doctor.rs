//! Doctor command - validate configuration and show status

use anyhow::Result;
use news_digest_adapters::state::SqliteSubscriptionStore;
use news_digest_domain::SubscriptionStore;
use serde::Serialize;
use std::collections::HashSet;
use std::path::PathBuf;

use crate::args::DoctorArgs;
use crate::commands::normalize::build_normalizer;
use crate::config::AppConfig;

#[derive(Debug, Serialize)]
struct DoctorReport {
    config: CheckResult,
    state: CheckResult,
    bot_token: CheckResult,
    normalizer: CheckResult,
    overall: String,
}

#[derive(Debug, Serialize)]
struct CheckResult {
    status: String,
    message: String,
    details: Option<serde_json::Value>,
}

impl CheckResult {
    fn ok(message: impl Into<String>) -> Self {
        Self {
            status: "ok".to_string(),
            message: message.into(),
            details: None,
        }
    }

    fn warn(message: impl Into<String>) -> Self {
        Self {
            status: "warn".to_string(),
            message: message.into(),
            details: None,
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            message: message.into(),
            details: None,
        }
    }

    fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    fn is_ok(&self) -> bool {
        self.status == "ok"
    }

    fn is_error(&self) -> bool {
        self.status == "error"
    }
}

pub async fn execute(args: DoctorArgs, config_path: Option<PathBuf>) -> Result<()> {
    let mut report = DoctorReport {
        config: CheckResult::error("Not checked"),
        state: CheckResult::error("Not checked"),
        bot_token: CheckResult::error("Not checked"),
        normalizer: CheckResult::error("Not checked"),
        overall: "error".to_string(),
    };

    let config = match AppConfig::load(config_path.as_deref()) {
        Ok(c) => {
            report.config = CheckResult::ok("Configuration loaded successfully");
            Some(c)
        }
        Err(e) => {
            report.config = CheckResult::error(format!("Failed to load config: {:#}", e));
            None
        }
    };

    if let Some(ref config) = config {
        report.state = check_state(config).await;
        report.bot_token = check_bot_token(config);
        report.normalizer = check_normalizer(config);
    }

    let checks = [
        &report.config,
        &report.state,
        &report.bot_token,
        &report.normalizer,
    ];

    let has_error = checks.iter().any(|c| c.is_error());
    let all_ok = checks.iter().all(|c| c.is_ok());

    report.overall = if has_error {
        "error".to_string()
    } else if all_ok {
        "ok".to_string()
    } else {
        "warn".to_string()
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    if report.overall == "error" {
        std::process::exit(1);
    }

    Ok(())
}

async fn check_state(config: &AppConfig) -> CheckResult {
    let path = &config.general.state_db_path;

    // Opening would create the file; a fresh install only gets a warning
    if !path.exists() {
        return CheckResult::warn(format!(
            "State database not created yet: {} (created on first run)",
            path.display()
        ));
    }

    let store = match SqliteSubscriptionStore::new(path).await {
        Ok(store) => store,
        Err(e) => return CheckResult::error(format!("Failed to open state database: {}", e)),
    };

    if let Err(e) = store.ping().await {
        return CheckResult::error(format!("State database not responding: {}", e));
    }

    match store.snapshot_all_subscriptions().await {
        Ok(rows) => {
            let users: HashSet<_> = rows.iter().map(|row| row.user).collect();
            let channels: HashSet<_> = rows.iter().map(|row| row.channel.url()).collect();
            CheckResult::ok(format!(
                "{} subscriptions, {} users, {} channels",
                rows.len(),
                users.len(),
                channels.len()
            ))
            .with_details(serde_json::json!({
                "path": path.display().to_string(),
                "subscriptions": rows.len(),
                "users": users.len(),
                "channels": channels.len(),
            }))
        }
        Err(e) => CheckResult::error(format!("Failed to read subscriptions: {}", e)),
    }
}

fn check_bot_token(config: &AppConfig) -> CheckResult {
    let env_var = &config.telegram.bot_token_env;

    if env_var.is_empty() {
        return CheckResult::error("No bot token env var configured");
    }

    // Never print the value
    match std::env::var(env_var) {
        Ok(val) if !val.is_empty() => CheckResult::ok(format!(
            "Bot token: {} (set), API: {}",
            env_var, config.telegram.api_base_url
        )),
        _ => CheckResult::warn(format!(
            "Bot token: {} (not set); only 'run --once --outbox' will work",
            env_var
        )),
    }
}

fn check_normalizer(config: &AppConfig) -> CheckResult {
    match build_normalizer(config) {
        Ok(_) => {
            let lexicon = config
                .normalizer
                .lexicon_path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "none".to_string());
            CheckResult::ok(format!(
                "Dictionary loaded, Ad markers: {}, Lexicon overlay: {}",
                config.normalizer.ad_markers.join(", "),
                lexicon
            ))
        }
        Err(e) => CheckResult::error(format!("{:#}", e)),
    }
}

fn print_report(report: &DoctorReport) {
    println!("news-digest Doctor Report");
    println!("=========================");
    println!();

    print_check("Config", &report.config);
    print_check("State", &report.state);
    print_check("Bot Token", &report.bot_token);
    print_check("Normalizer", &report.normalizer);

    println!();
    let symbol = match report.overall.as_str() {
        "ok" => "✓",
        "warn" => "⚠",
        _ => "✗",
    };
    println!("{} Overall: {}", symbol, report.overall.to_uppercase());

    if report.overall == "ok" {
        println!();
        println!("Ready to run! Try: news-digest run --once --outbox ./outbox.jsonl");
    }
}

fn print_check(name: &str, result: &CheckResult) {
    let symbol = match result.status.as_str() {
        "ok" => "✓",
        "warn" => "⚠",
        _ => "✗",
    };
    println!("{} {}: {}", symbol, name, result.message);
}
