// # kbsync - Kibana object sync
//
// Thin integration layer: all reconciliation logic lives in kbsync-core and
// all HTTP in kbsync-kibana. This binary only:
// 1. Reads configuration from environment variables
// 2. Loads the resource manifest
// 3. Initializes logging and the runtime
// 4. Runs one apply (or destroy) pass and reports the outcome
//
// ## Configuration
//
// ### Kibana
// - `KBSYNC_URL`: Kibana base URL (required)
// - `KBSYNC_USERNAME` / `KBSYNC_PASSWORD`: Basic auth credentials
// - `KBSYNC_API_KEY`: API key (alternative to basic auth)
// - `KBSYNC_INSECURE`: Accept invalid TLS certificates (`true`/`false`)
// - `KBSYNC_TIMEOUT_SECS`: Request timeout in seconds (default 30)
//
// ### Resources
// - `KBSYNC_MANIFEST`: Path to a JSON list of resources (required for apply)
//
// ### State Store
// - `KBSYNC_STATE_STORE_TYPE`: Type of state store (file, memory)
// - `KBSYNC_STATE_PATH`: Path to state file (for file store)
//
// ### Run
// - `KBSYNC_MODE`: `apply` (default) or `destroy`
// - `KBSYNC_LOG_LEVEL`: trace, debug, info, warn, error
//
// ## Example
//
// ```bash
// export KBSYNC_URL=https://kibana.example.com:5601
// export KBSYNC_USERNAME=elastic
// export KBSYNC_PASSWORD=changeme
// export KBSYNC_MANIFEST=./kibana.json
// export KBSYNC_STATE_STORE_TYPE=file
// export KBSYNC_STATE_PATH=/var/lib/kbsync/state.json
//
// kbsync
// ```
//
// `kibana.json`:
//
// ```json
// [
//   {"address": "logs", "kind": "index_pattern", "name": "logs-*",
//    "body": {"timeFieldName": "@timestamp"}},
//   {"address": "sources", "kind": "log_pattern_set", "space": "ops",
//    "body": ["filebeat-*", "metricbeat-*"]}
// ]
// ```

use anyhow::{Context, Result};
use kbsync_core::{
    Applier, ApplyReport, FileStateStore, KbsyncConfig, KibanaConfig, MemoryStateStore,
    ResourceConfig, StateStore, StateStoreConfig,
};
use kbsync_kibana::KibanaClient;
use std::env;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;

/// Exit codes for different termination scenarios
///
/// - 0: Every resource converged
/// - 1: Configuration or startup error
/// - 2: Runtime error, including any resource that failed to converge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KbsyncExitCode {
    Clean = 0,
    ConfigError = 1,
    RuntimeError = 2,
}

impl From<KbsyncExitCode> for ExitCode {
    fn from(code: KbsyncExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// What a run does with the manifest
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Apply,
    Destroy,
}

/// Application configuration
struct Config {
    url: String,
    username: Option<String>,
    password: Option<String>,
    api_key: Option<String>,
    insecure: bool,
    timeout_secs: u64,
    manifest_path: Option<String>,
    state_store_type: String,
    state_path: Option<String>,
    mode: String,
    log_level: String,
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        Ok(Self {
            url: env::var("KBSYNC_URL").context("KBSYNC_URL is required")?,
            username: non_empty_var("KBSYNC_USERNAME"),
            password: non_empty_var("KBSYNC_PASSWORD"),
            api_key: non_empty_var("KBSYNC_API_KEY"),
            insecure: match non_empty_var("KBSYNC_INSECURE") {
                Some(value) => parse_bool(&value)
                    .with_context(|| format!("KBSYNC_INSECURE '{}' is not a boolean", value))?,
                None => false,
            },
            timeout_secs: match non_empty_var("KBSYNC_TIMEOUT_SECS") {
                Some(value) => value
                    .parse::<u64>()
                    .with_context(|| format!("KBSYNC_TIMEOUT_SECS '{}' is not a number", value))?,
                None => kbsync_core::config::DEFAULT_TIMEOUT_SECS,
            },
            manifest_path: non_empty_var("KBSYNC_MANIFEST"),
            state_store_type: env::var("KBSYNC_STATE_STORE_TYPE")
                .unwrap_or_else(|_| "file".to_string()),
            state_path: non_empty_var("KBSYNC_STATE_PATH"),
            mode: env::var("KBSYNC_MODE").unwrap_or_else(|_| "apply".to_string()),
            log_level: env::var("KBSYNC_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }

    /// Validate the settings that do not belong to kbsync-core
    fn validate(&self) -> Result<()> {
        let mode = self.mode()?;

        match self.state_store_type.as_str() {
            "file" => {
                if self.state_path.is_none() {
                    anyhow::bail!(
                        "KBSYNC_STATE_PATH is required when KBSYNC_STATE_STORE_TYPE=file. \
                        Set it via: export KBSYNC_STATE_PATH=/var/lib/kbsync/state.json"
                    );
                }
            }
            "memory" => {
                warn!("KBSYNC_STATE_STORE_TYPE=memory: identities are forgotten on exit");
            }
            other => anyhow::bail!(
                "KBSYNC_STATE_STORE_TYPE '{}' is not supported. \
                Supported types: file, memory",
                other
            ),
        }

        if mode == Mode::Apply && self.manifest_path.is_none() {
            anyhow::bail!(
                "KBSYNC_MANIFEST is required when KBSYNC_MODE=apply. \
                Set it via: export KBSYNC_MANIFEST=./kibana.json"
            );
        }

        self.log_level()?;
        Ok(())
    }

    fn mode(&self) -> Result<Mode> {
        match self.mode.to_lowercase().as_str() {
            "apply" => Ok(Mode::Apply),
            "destroy" => Ok(Mode::Destroy),
            _ => anyhow::bail!(
                "KBSYNC_MODE '{}' is not valid. Valid modes: apply, destroy",
                self.mode
            ),
        }
    }

    fn log_level(&self) -> Result<Level> {
        match self.log_level.to_lowercase().as_str() {
            "trace" => Ok(Level::TRACE),
            "debug" => Ok(Level::DEBUG),
            "info" => Ok(Level::INFO),
            "warn" => Ok(Level::WARN),
            "error" => Ok(Level::ERROR),
            _ => anyhow::bail!(
                "KBSYNC_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }
    }

    fn kibana(&self) -> KibanaConfig {
        let mut kibana = KibanaConfig::new(self.url.clone());
        kibana.username = self.username.clone();
        kibana.password = self.password.clone();
        kibana.api_key = self.api_key.clone();
        kibana.insecure = self.insecure;
        kibana.timeout_secs = self.timeout_secs;
        kibana
    }

    fn state_store(&self) -> StateStoreConfig {
        match (&self.state_store_type[..], &self.state_path) {
            ("file", Some(path)) => StateStoreConfig::File { path: path.clone() },
            _ => StateStoreConfig::Memory,
        }
    }

    /// Assemble and validate the full configuration, reading the manifest
    fn load(&self) -> Result<KbsyncConfig> {
        let resources = match &self.manifest_path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read manifest {}", path))?;
                parse_manifest(&raw).with_context(|| format!("Invalid manifest {}", path))?
            }
            None => Vec::new(),
        };

        let config = KbsyncConfig {
            kibana: self.kibana(),
            state_store: self.state_store(),
            resources,
        };
        config.validate()?;
        Ok(config)
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.is_empty())
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

fn parse_manifest(raw: &str) -> Result<Vec<ResourceConfig>> {
    Ok(serde_json::from_str(raw)?)
}

fn main() -> ExitCode {
    // Load configuration from environment
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return KbsyncExitCode::ConfigError.into();
        }
    };

    // Initialize tracing first so validation warnings are visible
    let log_level = config.log_level().unwrap_or(Level::INFO);
    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return KbsyncExitCode::ConfigError.into();
    }

    if let Err(e) = config.validate() {
        error!("Configuration validation error: {:#}", e);
        return KbsyncExitCode::ConfigError.into();
    }

    let kbsync_config = match config.load() {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Configuration error: {:#}", e);
            return KbsyncExitCode::ConfigError.into();
        }
    };

    let mode = match config.mode() {
        Ok(mode) => mode,
        Err(e) => {
            error!("Configuration error: {:#}", e);
            return KbsyncExitCode::ConfigError.into();
        }
    };

    info!(
        "Starting kbsync ({:?}) against {} with {} resource(s)",
        mode,
        kbsync_config.kibana.url,
        kbsync_config.resources.len()
    );

    let rt = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return KbsyncExitCode::RuntimeError.into();
        }
    };

    rt.block_on(run(kbsync_config, mode)).into()
}

/// Build the components and run one pass
async fn run(config: KbsyncConfig, mode: Mode) -> KbsyncExitCode {
    let client = match KibanaClient::new(&config.kibana) {
        Ok(client) => client,
        Err(e) => {
            error!("Failed to create Kibana client: {}", e);
            return KbsyncExitCode::ConfigError;
        }
    };

    let state_store = match build_state_store(&config.state_store).await {
        Ok(store) => store,
        Err(e) => {
            error!("Failed to open state store: {:#}", e);
            return KbsyncExitCode::ConfigError;
        }
    };

    let applier = Applier::new(Arc::new(client), state_store);

    let result = match mode {
        Mode::Apply => applier.apply(&config.resources).await,
        Mode::Destroy => applier.destroy().await,
    };

    match result {
        Ok(report) => summarize(&report),
        Err(e) => {
            error!("Run aborted: {}", e);
            KbsyncExitCode::RuntimeError
        }
    }
}

async fn build_state_store(config: &StateStoreConfig) -> Result<Box<dyn StateStore>> {
    let store: Box<dyn StateStore> = match config {
        StateStoreConfig::File { path } => Box::new(FileStateStore::new(path).await?),
        StateStoreConfig::Memory => Box::new(MemoryStateStore::new()),
    };
    Ok(store)
}

fn summarize(report: &ApplyReport) -> KbsyncExitCode {
    let failures = report.failures();
    if failures.is_empty() {
        info!("Done: {} resource(s) processed", report.entries.len());
        KbsyncExitCode::Clean
    } else {
        error!(
            "{} of {} resource(s) failed: {}",
            failures.len(),
            report.entries.len(),
            failures.join(", ")
        );
        KbsyncExitCode::RuntimeError
    }
}
