//! CLI Tooling
//!
//! Every command runs against the container configuration selected with
//! `--config` (layered with the global file and `DHTCELL__*` variables).

use crate::config::ConfigLoader;
use crate::container::{make_config, Container, ContainerConfig};
use crate::entry::{address, Entry};
use crate::error::ApiError;
use crate::logging::{resolve_log_file_path, LoggingConfig};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use serde_json::{json, Value};
use std::io::{BufRead, Write};
use std::path::PathBuf;
use tokio::runtime::Runtime;
use tracing::info;

/// dhtcell - content-addressed entry store with peer replication
#[derive(Parser)]
#[command(name = "dhtcell")]
#[command(about = "Host application instances with validated, replicated entry stores")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Container configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging (debug level)
    #[arg(long, default_value = "false")]
    pub verbose: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file, file+stderr, both)
    #[arg(long)]
    pub log_output: Option<String>,

    /// Log file path (if output includes "file")
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

impl Cli {
    /// Logging configuration with command-line overrides applied. The log
    /// file is resolved here: `--log-file`, then `DHTCELL_LOG_FILE`, then
    /// the configured file, then a default named after `--config`.
    pub fn logging_config(&self, base: &LoggingConfig) -> Result<LoggingConfig, ApiError> {
        let mut config = base.clone();
        if self.verbose {
            config.level = "debug".to_string();
        }
        if let Some(level) = &self.log_level {
            config.level = level.clone();
        }
        if let Some(format) = &self.log_format {
            config.format = format.clone();
        }
        if let Some(output) = &self.log_output {
            config.output = output.clone();
        }
        match resolve_log_file_path(
            self.log_file.clone(),
            config.file.take(),
            self.config.as_deref(),
        ) {
            Ok(path) => config.file = Some(path),
            Err(e) if config.output.contains("file") => return Err(e),
            Err(_) => {}
        }
        Ok(config)
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Check configuration consistency and agent identities
    Check,
    /// List configured instances
    Instances {
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Compute the address of a JSON value
    Hash {
        /// JSON payload
        value: String,
        /// Address it as an app entry of this type
        #[arg(long)]
        entry_type: Option<String>,
    },
    /// Start all instances and make one zome call
    Call {
        instance: String,
        zome: String,
        capability: String,
        function: String,
        /// JSON parameters
        #[arg(long, default_value = "{}")]
        params: String,
    },
    /// Start all instances and execute call requests read from stdin, one
    /// JSON object per line
    Run {
        /// Keep serving after stdin closes, until interrupted
        #[arg(long)]
        serve: bool,
    },
    /// Print the effective configuration as TOML
    Config,
    /// Print a configuration for `agent::app` pairs
    MakeConfig {
        /// Instances as agent::app
        #[arg(required = true)]
        instances: Vec<String>,
    },
}

/// One call read by `run`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CallRequest {
    pub instance: String,
    pub zome: String,
    pub capability: String,
    pub function: String,
    #[serde(default = "empty_params")]
    pub params: Value,
}

fn empty_params() -> Value {
    json!({})
}

/// CLI context: loaded configuration plus the runtime calls execute on
pub struct CliContext {
    config: ContainerConfig,
    config_path: Option<PathBuf>,
    runtime: Runtime,
}

impl CliContext {
    pub fn new(config_path: Option<PathBuf>) -> Result<Self, ApiError> {
        let config = ConfigLoader::load(config_path.as_deref())?;
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .map_err(|e| ApiError::Runtime(e.to_string()))?;
        Ok(Self {
            config,
            config_path,
            runtime,
        })
    }

    pub fn config(&self) -> &ContainerConfig {
        &self.config
    }

    /// Execute a CLI command
    pub fn execute(&self, command: &Commands) -> Result<String, ApiError> {
        match command {
            Commands::Check => self.check(),
            Commands::Instances { format } => self.instances(format),
            Commands::Hash { value, entry_type } => hash(value, entry_type.as_deref()),
            Commands::Call {
                instance,
                zome,
                capability,
                function,
                params,
            } => {
                let request = CallRequest {
                    instance: instance.clone(),
                    zome: zome.clone(),
                    capability: capability.clone(),
                    function: function.clone(),
                    params: serde_json::from_str(params)?,
                };
                let _guard = self.runtime.enter();
                let container = self.start_container()?;
                let result = call(&container, &request)?;
                container.stop();
                Ok(result)
            }
            Commands::Run { serve } => self.run(*serve),
            Commands::Config => self.config.to_toml_string(),
            Commands::MakeConfig { instances } => {
                let pairs = instances
                    .iter()
                    .map(|spec| {
                        spec.split_once("::").ok_or_else(|| {
                            ApiError::ConfigError(format!(
                                "Expected agent::app, got '{}'",
                                spec
                            ))
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                make_config(&pairs).to_toml_string()
            }
        }
    }

    fn start_container(&self) -> Result<Container, ApiError> {
        let container = Container::from_config(self.config.clone())?;
        container.start_all_instances()?;
        info!(
            config = ?self.config_path,
            instances = container.instances().count(),
            "Container started"
        );
        Ok(container)
    }

    fn check(&self) -> Result<String, ApiError> {
        self.config.check_consistency()?;
        let container = Container::from_config(self.config.clone())?;
        let mut output = String::new();
        let mut all_valid = true;
        for (id, _) in container.agents().list_all() {
            let result = container.agents().validate_agent(id);
            all_valid &= result.is_valid();
            output.push_str(&format!(
                "Agent '{}': {}/{} checks passed\n",
                result.agent_id,
                result.passed_checks(),
                result.total_checks()
            ));
            for (check, passed) in &result.checks {
                output.push_str(&format!("  [{}] {}\n", if *passed { "ok" } else { "FAIL" }, check));
            }
            for error in &result.errors {
                output.push_str(&format!("  error: {}\n", error));
            }
        }
        output.push_str(&format!(
            "{} instances configured; configuration {}",
            self.config.instances.len(),
            if all_valid { "is consistent" } else { "has invalid agents" }
        ));
        if all_valid {
            Ok(output)
        } else {
            Err(ApiError::ConfigError(output))
        }
    }

    fn instances(&self, format: &str) -> Result<String, ApiError> {
        let container = Container::from_config(self.config.clone())?;
        let infos = container.instance_infos()?;
        if format == "json" {
            return Ok(serde_json::to_string_pretty(&infos)?);
        }
        if infos.is_empty() {
            return Ok("No instances configured.".to_string());
        }
        let mut table = comfy_table::Table::new();
        table.load_preset(comfy_table::presets::UTF8_FULL);
        table.set_header(vec!["Instance", "Agent", "DNA", "DNA Address", "Entries"]);
        for info in &infos {
            table.add_row(vec![
                info.id.clone(),
                info.agent.clone(),
                info.dna.clone(),
                info.dna_address.to_string(),
                info.entries.to_string(),
            ]);
        }
        Ok(table.to_string())
    }

    fn run(&self, serve: bool) -> Result<String, ApiError> {
        let _guard = self.runtime.enter();
        let container = self.start_container()?;

        let processed = process_lines(
            std::io::stdin().lock(),
            &mut std::io::stdout().lock(),
            |request| call(&container, request),
        )?;

        if serve {
            info!("Serving until interrupted");
            self.runtime
                .block_on(tokio::signal::ctrl_c())
                .map_err(|e| ApiError::Runtime(format!("Failed to listen for ctrl-c: {}", e)))?;
        }
        container.stop();
        Ok(format!("Processed {} calls", processed))
    }
}

/// Answer one JSON call request per input line. Failed calls are reported
/// inline; a failed read or write ends the loop.
fn process_lines<R, W, F>(reader: R, out: &mut W, mut handle: F) -> Result<usize, ApiError>
where
    R: BufRead,
    W: Write,
    F: FnMut(&CallRequest) -> Result<String, ApiError>,
{
    let mut processed = 0usize;
    for line in reader.lines() {
        let line = line.map_err(|e| ApiError::Runtime(format!("Failed to read stdin: {}", e)))?;
        if line.trim().is_empty() {
            continue;
        }
        let output = match serde_json::from_str::<CallRequest>(&line) {
            Ok(request) => handle(&request)
                .unwrap_or_else(|e| json!({ "error": e.to_string() }).to_string()),
            Err(e) => json!({ "error": format!("Invalid request: {}", e) }).to_string(),
        };
        writeln!(out, "{}", output)
            .map_err(|e| ApiError::Runtime(format!("Failed to write stdout: {}", e)))?;
        processed += 1;
    }
    Ok(processed)
}

fn call(container: &Container, request: &CallRequest) -> Result<String, ApiError> {
    let result = container.call(
        &request.instance,
        &request.zome,
        &request.capability,
        &request.function,
        request.params.clone(),
    )?;
    Ok(result.to_json().to_string())
}

fn hash(value: &str, entry_type: Option<&str>) -> Result<String, ApiError> {
    let value: Value = serde_json::from_str(value)?;
    let address = match entry_type {
        Some(entry_type) => Entry::app(entry_type, value).address(),
        None => address::address_of(&value)?,
    };
    Ok(address.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_stable() {
        let a = hash(r#"{"content":"x","date_created":"now"}"#, Some("post")).unwrap();
        let b = hash(r#"{"date_created":"now","content":"x"}"#, Some("post")).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), address::ADDRESS_LEN);
        assert_ne!(a, hash(r#"{"content":"x","date_created":"now"}"#, None).unwrap());
    }

    #[test]
    fn test_call_request_defaults_params() {
        let request: CallRequest = serde_json::from_str(
            r#"{"instance":"alice::blog","zome":"blog","capability":"main","function":"whoami"}"#,
        )
        .unwrap();
        assert_eq!(request.params, json!({}));
    }

    #[test]
    fn test_cli_parses_call() {
        let cli = Cli::parse_from([
            "dhtcell",
            "--config",
            "blog.toml",
            "call",
            "alice::blog",
            "blog",
            "main",
            "create_post",
            "--params",
            r#"{"content":"hi"}"#,
        ]);
        assert!(matches!(cli.command, Commands::Call { ref function, .. } if function == "create_post"));
        assert_eq!(cli.config, Some(PathBuf::from("blog.toml")));
    }

    struct FailingReader;

    impl std::io::Read for FailingReader {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "closed"))
        }
    }

    #[test]
    fn test_process_lines_answers_each_request() {
        let input = concat!(
            r#"{"instance":"alice::blog","zome":"blog","capability":"main","function":"whoami"}"#,
            "\n\nnot json\n"
        );
        let mut out = Vec::new();
        let processed =
            process_lines(input.as_bytes(), &mut out, |request| Ok(request.function.clone()))
                .unwrap();
        assert_eq!(processed, 2);
        let out = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "whoami");
        assert!(lines[1].contains("Invalid request"));
    }

    #[test]
    fn test_stdin_failure_is_runtime_error() {
        let mut out = Vec::new();
        let result = process_lines(
            std::io::BufReader::new(FailingReader),
            &mut out,
            |_| Ok(String::new()),
        );
        match result {
            Err(ApiError::Runtime(msg)) => assert!(msg.contains("Failed to read stdin")),
            other => panic!("expected runtime error, got {:?}", other),
        }
    }

    #[test]
    fn test_logging_overrides() {
        let cli = Cli::parse_from(["dhtcell", "--verbose", "--log-format", "json", "check"]);
        let config = cli.logging_config(&LoggingConfig::default()).unwrap();
        assert_eq!(config.level, "debug");
        assert_eq!(config.format, "json");
    }

    #[test]
    fn test_log_file_flag_wins() {
        let cli = Cli::parse_from([
            "dhtcell",
            "--log-output",
            "file",
            "--log-file",
            "/tmp/dhtcell-cli.log",
            "check",
        ]);
        let base = LoggingConfig {
            file: Some(PathBuf::from("/tmp/dhtcell-config.log")),
            ..LoggingConfig::default()
        };
        let config = cli.logging_config(&base).unwrap();
        assert_eq!(config.output, "file");
        assert_eq!(config.file, Some(PathBuf::from("/tmp/dhtcell-cli.log")));
    }

    #[test]
    fn test_default_log_file_named_after_config() {
        if std::env::var("DHTCELL_LOG_FILE").is_ok() {
            return;
        }
        let cli = Cli::parse_from(["dhtcell", "--config", "/etc/dhtcell/blog.toml", "check"]);
        if let Some(file) = cli.logging_config(&LoggingConfig::default()).unwrap().file {
            assert!(file.ends_with("dhtcell-blog.log"));
        }
    }
}
