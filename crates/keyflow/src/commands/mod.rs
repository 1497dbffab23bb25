pub mod apply;
pub mod destroy;
pub mod import;
pub mod plan;
pub mod show;
pub mod validate;

use crate::config::{self, KeyflowConfig};
use colored::Colorize;
use keyflow_cloud::{
    ActionType, ApplyResult, Plan, PollConfig, Reconciler, RefreshReport, ResourceManager,
    StateManager,
};
use keyflow_fusionauth::api::{HOST_ENV, TENANT_ID_ENV};
use keyflow_fusionauth::{FusionAuthClient, FusionAuthConfig, FusionAuthError, key_plan_policy};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Everything a command needs: the loaded configuration and where its state lives
pub struct Context {
    pub config_path: PathBuf,
    pub project_root: PathBuf,
    pub config: KeyflowConfig,
    pub poll: PollConfig,
    pub cancel: CancellationToken,
}

impl Context {
    /// Locate and load the configuration, then apply timing overrides
    ///
    /// Timing precedence: built-in defaults, then the provider block, then
    /// CLI flags / KEYFLOW_TIMEOUT / KEYFLOW_INTERVAL.
    pub fn load(
        config_path: Option<&Path>,
        timeout_secs: Option<u64>,
        interval_secs: Option<u64>,
        cancel: CancellationToken,
    ) -> anyhow::Result<Self> {
        let config_path = match config_path {
            Some(path) => path.to_path_buf(),
            None => config::find_config_in(&std::env::current_dir()?)?,
        };
        let config = config::load_config(&config_path)?;
        let project_root = config::project_root(&config_path);

        let mut poll = PollConfig::default();
        if let Some(timeout) = config.provider.timeout {
            poll = poll.with_timeout(timeout);
        }
        if let Some(interval) = config.provider.interval {
            poll = poll.with_interval(interval);
        }
        if let Some(secs) = timeout_secs {
            poll = poll.with_timeout(Duration::from_secs(secs));
        }
        if let Some(secs) = interval_secs {
            poll = poll.with_interval(Duration::from_secs(secs));
        }
        tracing::debug!(?poll, root = %project_root.display(), "Resolved context");

        Ok(Self {
            config_path,
            project_root,
            config,
            poll,
            cancel,
        })
    }

    pub fn state_manager(&self) -> StateManager {
        StateManager::new(&self.project_root)
    }

    /// Connection settings from the provider block and environment
    pub fn fusionauth_config(&self) -> anyhow::Result<FusionAuthConfig> {
        let provider = &self.config.provider;

        let host = provider
            .host
            .clone()
            .or_else(|| std::env::var(HOST_ENV).ok())
            .ok_or_else(|| FusionAuthError::MissingEnvVar(HOST_ENV.to_string()))?;
        let api_key = std::env::var(&provider.api_key_env)
            .map_err(|_| FusionAuthError::MissingEnvVar(provider.api_key_env.clone()))?;

        let mut fusionauth = FusionAuthConfig::new(host, api_key);
        let tenant_id = provider
            .tenant_id
            .clone()
            .or_else(|| std::env::var(TENANT_ID_ENV).ok().filter(|t| !t.is_empty()));
        if let Some(tenant_id) = tenant_id {
            fusionauth = fusionauth.with_tenant_id(tenant_id);
        }
        Ok(fusionauth)
    }

    pub fn reconciler(&self) -> anyhow::Result<Reconciler<FusionAuthClient>> {
        let client = FusionAuthClient::new(self.fusionauth_config()?)?;
        let manager = ResourceManager::new(
            Arc::new(client),
            key_plan_policy(&self.config.length_updates),
        )
        .with_poll_config(self.poll)
        .with_cancellation(self.cancel.clone());
        Ok(Reconciler::new(manager).with_parallelism(self.config.provider.parallelism))
    }
}

pub fn print_refresh(report: &RefreshReport) {
    for name in &report.removed {
        println!(
            "  {} {} was deleted outside of keyflow",
            "!".yellow(),
            name.cyan()
        );
    }
    for name in &report.drifted {
        println!(
            "  {} {} changed outside of keyflow",
            "!".yellow(),
            name.cyan()
        );
    }
}

pub fn print_plan(plan: &Plan) {
    println!();
    for action in &plan.actions {
        let symbol = match action.action_type {
            ActionType::Create => "+".green(),
            ActionType::Update => "~".yellow(),
            ActionType::Replace => "-/+".magenta(),
            ActionType::Delete => "-".red(),
            ActionType::NoOp => continue,
        };
        println!("  {} {}", symbol, action.description);
        if let Some(fields) = action.details.get("fields") {
            println!("      fields: {}", fields);
        }
    }

    if !plan.has_changes {
        println!("{}", "No changes. Signing keys match the configuration.".green());
    }
    println!();
    println!("{} {}", "Plan:".bold(), plan.summary());
}

pub fn print_apply_result(result: &ApplyResult) {
    println!();
    for success in &result.succeeded {
        println!("  {} {}", "✓".green(), success.message);
    }
    for failure in &result.failed {
        println!(
            "  {} {}: {}",
            "✗".red(),
            failure.action_id,
            failure.error.as_deref().unwrap_or("unknown error")
        );
    }
    println!();
    println!(
        "{} {} succeeded, {} failed ({} ms)",
        "Apply:".bold(),
        result.succeeded.len(),
        result.failed.len(),
        result.duration_ms
    );
}
