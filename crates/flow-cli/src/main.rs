//! `flowctl` - run image generation workflows from the command line.
//!
//! Loads a workflow file (a JSON array of single-key instruction objects),
//! validates it and runs it against a Draw Things compatible server.

mod config;
mod constants;
mod error;
mod report;
mod sink;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use flow_engine::{decode_workflow, validate, WorkflowExecutor, WorkflowInstruction};
use generation::{DrawThingsProvider, GenerationProvider};

use config::{AppConfig, Overrides};
use error::{CliError, Result};
use sink::LogEventSink;

#[derive(Parser)]
#[command(name = "flowctl", version, about = "Run image generation workflows")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Configuration file (default: <config dir>/flowctl/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Generation server base URL
    #[arg(long, global = true)]
    url: Option<String>,

    /// Directory that workflow filenames are relative to
    #[arg(long, global = true)]
    workdir: Option<PathBuf>,

    /// Skip the connection check before running
    #[arg(long, global = true)]
    no_check: bool,

    /// Refuse to run workflows with validation errors
    #[arg(long, global = true)]
    strict: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Execute a workflow file.
    Run { workflow: PathBuf },
    /// Report structural errors and warnings.
    Validate { workflow: PathBuf },
    /// Show how each instruction will be handled.
    Classify { workflow: PathBuf },
    /// Probe the generation server.
    Check,
    /// Print the effective configuration.
    Config {
        /// Also write it to the configuration file.
        #[arg(long)]
        save: bool,
    },
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            url: self.url.clone(),
            working_dir: self.workdir.clone(),
            no_check: self.no_check,
            strict: self.strict,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            log::error!("{}", err);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let mut config = load_config(cli.config.as_deref()).await?;
    config.apply(&cli.overrides());

    match cli.command {
        Command::Run { workflow } => cmd_run(&config, &workflow).await,
        Command::Validate { workflow } => cmd_validate(&workflow).await,
        Command::Classify { workflow } => cmd_classify(&workflow).await,
        Command::Check => cmd_check(&config).await,
        Command::Config { save } => cmd_config(&config, cli.config.as_deref(), save).await,
    }
}

async fn load_config(explicit: Option<&Path>) -> Result<AppConfig> {
    match explicit {
        Some(path) => Ok(AppConfig::load_file(path).await?),
        None => match AppConfig::default_dir() {
            Some(dir) => Ok(AppConfig::load(&dir).await?),
            None => Ok(AppConfig::default()),
        },
    }
}

async fn load_workflow(path: &Path) -> Result<Vec<WorkflowInstruction>> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| CliError::ReadWorkflow {
            path: path.to_path_buf(),
            source,
        })?;
    let instructions = decode_workflow(&contents).map_err(|source| CliError::DecodeWorkflow {
        path: path.to_path_buf(),
        source,
    })?;
    log::debug!("Loaded {} instruction(s) from {:?}", instructions.len(), path);
    Ok(instructions)
}

async fn cmd_run(config: &AppConfig, workflow: &Path) -> Result<ExitCode> {
    let instructions = load_workflow(workflow).await?;

    let report = validate(&instructions);
    for warning in &report.warnings {
        log::warn!("{}", warning);
    }
    for error in &report.errors {
        log::warn!("{}", error);
    }

    let provider = Arc::new(DrawThingsProvider::new(&config.provider)?);
    let options = config.executor_options();
    let root = options.working_dir.clone();
    let executor = WorkflowExecutor::new(provider, options);

    let cancel = executor.cancel_handle();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupted, cancelling run");
            cancel.cancel();
        }
    });

    let outcome = executor.execute(&instructions, &LogEventSink).await;
    ctrl_c.abort();
    let result = outcome?;

    print!("{}", report::render_run(&result, &root));
    Ok(exit_code(result.success))
}

async fn cmd_validate(workflow: &Path) -> Result<ExitCode> {
    let instructions = load_workflow(workflow).await?;
    let report = validate(&instructions);
    print!("{}", report::render_validation(&report));
    Ok(exit_code(report.is_valid()))
}

async fn cmd_classify(workflow: &Path) -> Result<ExitCode> {
    let instructions = load_workflow(workflow).await?;
    print!("{}", report::render_classification(&instructions));
    Ok(ExitCode::SUCCESS)
}

async fn cmd_check(config: &AppConfig) -> Result<ExitCode> {
    let provider = DrawThingsProvider::new(&config.provider)?;
    let reachable = provider.check_connection().await;
    if reachable {
        println!("{} is reachable", provider.base_url());
    } else {
        println!("{} is not reachable", provider.base_url());
    }
    Ok(exit_code(reachable))
}

async fn cmd_config(config: &AppConfig, explicit: Option<&Path>, save: bool) -> Result<ExitCode> {
    let json = serde_json::to_string_pretty(config).map_err(config::ConfigError::Serialize)?;
    println!("{}", json);

    if save {
        save_config(config, explicit).await?;
    }
    Ok(ExitCode::SUCCESS)
}

/// Write to the `--config` file when given, else to the platform directory
async fn save_config(config: &AppConfig, explicit: Option<&Path>) -> Result<PathBuf> {
    match explicit {
        Some(path) => {
            config.save_file(path).await?;
            Ok(path.to_path_buf())
        }
        None => {
            let dir = AppConfig::default_dir().ok_or(CliError::NoConfigDir)?;
            Ok(config.save(&dir).await?)
        }
    }
}

fn exit_code(success: bool) -> ExitCode {
    if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_global_flags_parse_after_subcommand() {
        let cli = Cli::try_parse_from([
            "flowctl",
            "run",
            "cats.json",
            "--url",
            "http://gpu-box:7888",
            "--no-check",
        ])
        .unwrap();

        assert!(matches!(&cli.command, Command::Run { workflow } if workflow == Path::new("cats.json")));
        let overrides = cli.overrides();
        assert_eq!(overrides.url.as_deref(), Some("http://gpu-box:7888"));
        assert!(overrides.no_check);
        assert!(!overrides.strict);
    }

    #[test]
    fn test_subcommand_is_required() {
        assert!(Cli::try_parse_from(["flowctl"]).is_err());
    }

    #[tokio::test]
    async fn test_load_workflow() {
        let dir = tempdir().unwrap();
        let good = dir.path().join("good.json");
        std::fs::write(&good, r#"[{"prompt": "a cat"}, {"loop": 2}, {"loopSave": "v_"}, {"loopEnd": true}]"#)
            .unwrap();
        assert_eq!(load_workflow(&good).await.unwrap().len(), 4);

        let bad = dir.path().join("bad.json");
        std::fs::write(&bad, r#"[{"teleport": true}]"#).unwrap();
        assert!(matches!(
            load_workflow(&bad).await,
            Err(CliError::DecodeWorkflow { .. })
        ));

        assert!(matches!(
            load_workflow(&dir.path().join("missing.json")).await,
            Err(CliError::ReadWorkflow { .. })
        ));
    }

    #[tokio::test]
    async fn test_explicit_config_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("flow.json");
        std::fs::write(&path, r#"{"enforce_validation": true}"#).unwrap();

        let config = load_config(Some(&path)).await.unwrap();
        assert!(config.enforce_validation);
    }

    #[tokio::test]
    async fn test_saved_explicit_config_is_loaded_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("flow.json");
        std::fs::write(&path, r#"{"enforce_validation": true}"#).unwrap();

        let mut config = load_config(Some(&path)).await.unwrap();
        config.apply(&Overrides {
            url: Some("http://gpu-box:7888".into()),
            ..Default::default()
        });
        let written = save_config(&config, Some(&path)).await.unwrap();

        assert_eq!(written, path);
        assert!(!dir.path().join("config.json").exists());
        let reloaded = load_config(Some(&path)).await.unwrap();
        assert_eq!(reloaded.provider.base_url, "http://gpu-box:7888");
        assert!(reloaded.enforce_validation);
    }
}
