#![cfg_attr(
    test,
    allow(
        clippy::panic,
        clippy::print_stdout,
        clippy::print_stderr,
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::use_debug,
        clippy::dbg_macro,
        clippy::panic_in_result_fn,
        clippy::unwrap_in_result,
        reason = "Test-only output and panic-based assertions are permitted."
    )
)]
// crates/osiris-cli/src/main.rs
// ============================================================================
// Module: Osiris CLI Entry Point
// Description: Command dispatcher for compile, run, index, and MCP flows.
// Purpose: Provide the stable CLI surface with family-mapped exit codes.
// Dependencies: clap, osiris-aiop, osiris-compiler, osiris-index, osiris-mcp
// ============================================================================

//! ## Overview
//! The `osiris` binary is the execution boundary of the system: it is the
//! only process that resolves connection secrets from the environment. The
//! MCP server and its delegated tools are hosted here as well, so every
//! secret-touching MCP tool re-enters through a fresh `osiris` subprocess.
//! Exit codes: 0 ok, 2 validation/schema, 3 compile, 4 run, 5 config,
//! 1 internal.

// ============================================================================
// SECTION: Modules
// ============================================================================

mod connections;
mod init;
mod output;
mod runcmd;

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use clap::Subcommand;
use clap::ValueEnum;
use osiris_aiop::RetentionEngine;
use osiris_compiler::CompileOptions;
use osiris_compiler::Compiler;
use osiris_config::FilesystemContract;
use osiris_config::OsirisConfig;
use osiris_core::ErrorFamily;
use osiris_core::time::utc_now_ms;
use osiris_index::RunFilter;
use osiris_index::RunIndex;
use osiris_mcp::CliBridge;
use osiris_mcp::McpServer;
use osiris_mcp::StderrMetrics;
use osiris_mcp::ToolRouter;
use osiris_registry::Registry;
use osiris_registry::ValidationLevel;
use serde_json::Value;
use serde_json::json;

use crate::output::stdout_json;
use crate::output::stdout_line;
use crate::runcmd::Engine;
use crate::runcmd::RunOptions;

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "osiris", version, about = "Deterministic ETL build/run/audit pipeline")]
struct Cli {
    /// Selected subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// Supported CLI subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Initialize a project in the current directory.
    Init {
        /// Overwrite existing scaffold files.
        #[arg(long)]
        force: bool,
    },
    /// Compile an OML pipeline into a build artifact.
    Compile {
        /// OML file to compile.
        oml: PathBuf,
        /// Profile to compile under.
        #[arg(long)]
        profile: Option<String>,
        /// Parameter values as `key=value`.
        #[arg(long = "params", value_name = "K=V")]
        params: Vec<String>,
    },
    /// Execute a compiled manifest.
    Run {
        /// Manifest file or build directory to execute.
        manifest: Option<PathBuf>,
        /// Execute the manifest recorded by the last compile.
        #[arg(long)]
        last_compile: bool,
        /// Profile to run under.
        #[arg(long)]
        profile: Option<String>,
        /// Execution engine.
        #[arg(long, value_enum, default_value_t = EngineArg::Local)]
        engine: EngineArg,
    },
    /// Run index queries.
    Runs {
        /// Selected runs subcommand.
        #[command(subcommand)]
        command: RunsCommand,
    },
    /// Maintenance utilities.
    Maintenance {
        /// Selected maintenance subcommand.
        #[command(subcommand)]
        command: MaintenanceCommand,
    },
    /// Connection catalog utilities (secret-aware).
    Connections {
        /// Selected connections subcommand.
        #[command(subcommand)]
        command: ConnectionsCommand,
    },
    /// Component registry utilities.
    Components {
        /// Selected components subcommand.
        #[command(subcommand)]
        command: ComponentsCommand,
    },
    /// Log and audit package utilities.
    Logs {
        /// Selected logs subcommand.
        #[command(subcommand)]
        command: LogsCommand,
    },
    /// MCP server utilities.
    Mcp {
        /// Selected MCP subcommand.
        #[command(subcommand)]
        command: McpCommand,
    },
}

/// Engine argument values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum EngineArg {
    /// In-process drivers.
    Local,
    /// Sandbox proxy worker.
    E2b,
}

/// `runs` subcommands.
#[derive(Subcommand, Debug)]
enum RunsCommand {
    /// List recorded runs.
    List {
        /// Restrict to one pipeline slug.
        #[arg(long)]
        pipeline: Option<String>,
        /// Restrict to one status label.
        #[arg(long)]
        status: Option<String>,
        /// Emit JSON.
        #[arg(long)]
        json: bool,
    },
    /// Show one run by run id or session id.
    Show {
        /// Run id or session id.
        id: String,
        /// Emit JSON.
        #[arg(long)]
        json: bool,
    },
}

/// `maintenance` subcommands.
#[derive(Subcommand, Debug)]
enum MaintenanceCommand {
    /// Apply retention policies.
    Clean {
        /// Plan without deleting.
        #[arg(long)]
        dry_run: bool,
    },
}

/// `connections` subcommands.
#[derive(Subcommand, Debug)]
enum ConnectionsCommand {
    /// List connections with secrets redacted.
    List {
        /// Emit JSON.
        #[arg(long)]
        json: bool,
    },
    /// Probe connection health.
    Doctor {
        /// Restrict to one family.
        #[arg(long)]
        family: Option<String>,
        /// Restrict to one alias.
        #[arg(long)]
        alias: Option<String>,
        /// Emit JSON.
        #[arg(long)]
        json: bool,
    },
}

/// `components` subcommands.
#[derive(Subcommand, Debug)]
enum ComponentsCommand {
    /// List registry components.
    List {
        /// Emit JSON.
        #[arg(long)]
        json: bool,
    },
    /// Show one component spec.
    Show {
        /// Component name.
        name: String,
    },
    /// Validate one component spec.
    Validate {
        /// Component name.
        name: String,
        /// Validation level.
        #[arg(long, default_value = "enhanced")]
        level: String,
    },
    /// Print a component's first example config.
    ConfigExample {
        /// Component name.
        name: String,
    },
}

/// `logs` subcommands.
#[derive(Subcommand, Debug)]
enum LogsCommand {
    /// Locate AIOP packages.
    Aiop {
        /// Show the most recent package.
        #[arg(long)]
        last: bool,
    },
}

/// `mcp` subcommands.
#[derive(Subcommand, Debug)]
enum McpCommand {
    /// Start the MCP server on stdio.
    Run {
        /// Run the in-process selftest and exit.
        #[arg(long)]
        selftest: bool,
    },
    /// List the tool surface.
    Tools {
        /// Emit JSON.
        #[arg(long)]
        json: bool,
    },
    /// Emit a client launcher snippet.
    Clients {
        /// Emit JSON.
        #[arg(long)]
        json: bool,
    },
    /// Delegation target for the discovery_request tool.
    DiscoveryRequest {
        /// Emit JSON.
        #[arg(long)]
        json: bool,
    },
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// One surfaced CLI failure with its family.
struct CliError {
    /// Error family controlling the exit code.
    family: ErrorFamily,
    /// Human-readable message.
    message: String,
}

impl CliError {
    /// Creates an error.
    fn new(family: ErrorFamily, message: impl Into<String>) -> Self {
        Self {
            family,
            message: message.into(),
        }
    }
}

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// CLI entry point.
fn main() -> ExitCode {
    let cli = Cli::parse();
    match dispatch(cli.command) {
        Ok(code) => code,
        Err(err) => {
            let _ = output::stderr_line(&format!("error[{}]: {}", err.family.as_str(), err.message));
            ExitCode::from(err.family.exit_code())
        }
    }
}

/// Dispatches one parsed command.
fn dispatch(command: Commands) -> Result<ExitCode, CliError> {
    match command {
        Commands::Init {
            force,
        } => cmd_init(force),
        Commands::Compile {
            oml,
            profile,
            params,
        } => cmd_compile(&oml, profile.as_deref(), &params),
        Commands::Run {
            manifest,
            last_compile,
            profile,
            engine,
        } => cmd_run(manifest, last_compile, profile, engine),
        Commands::Runs {
            command,
        } => cmd_runs(command),
        Commands::Maintenance {
            command,
        } => cmd_maintenance(command),
        Commands::Connections {
            command,
        } => cmd_connections(command),
        Commands::Components {
            command,
        } => cmd_components(command),
        Commands::Logs {
            command,
        } => cmd_logs(command),
        Commands::Mcp {
            command,
        } => cmd_mcp(command),
    }
}

// ============================================================================
// SECTION: Context Loading
// ============================================================================

/// Loads the filesystem contract from `osiris.yaml` in the working dir.
fn load_contract() -> Result<FilesystemContract, CliError> {
    let cwd = std::env::current_dir()
        .map_err(|err| CliError::new(ErrorFamily::Config, err.to_string()))?;
    let config = OsirisConfig::load(&cwd.join("osiris.yaml"))
        .map_err(|err| CliError::new(ErrorFamily::Config, err.to_string()))?;
    FilesystemContract::load(config)
        .map_err(|err| CliError::new(ErrorFamily::Config, err.to_string()))
}

/// Loads the component registry under the contract.
fn load_registry(contract: &FilesystemContract) -> Result<Registry, CliError> {
    Registry::load(&contract.components_dir())
        .map_err(|err| CliError::new(ErrorFamily::Config, err.to_string()))
}

// ============================================================================
// SECTION: Command Handlers
// ============================================================================

/// Handles `osiris init`.
fn cmd_init(force: bool) -> Result<ExitCode, CliError> {
    let cwd = std::env::current_dir()
        .map_err(|err| CliError::new(ErrorFamily::Config, err.to_string()))?;
    init::run(&cwd, force).map_err(|err| CliError::new(ErrorFamily::Config, err.to_string()))?;
    emit(&format!("initialized osiris project at {}", cwd.display()))?;
    Ok(ExitCode::SUCCESS)
}

/// Handles `osiris compile`.
fn cmd_compile(
    oml_path: &Path,
    profile: Option<&str>,
    raw_params: &[String],
) -> Result<ExitCode, CliError> {
    let contract = load_contract()?;
    let registry = load_registry(&contract)?;
    let params = parse_params(raw_params)
        .map_err(|message| CliError::new(ErrorFamily::Config, message))?;
    let profile = contract
        .config()
        .resolve_profile(profile)
        .map_err(|err| CliError::new(ErrorFamily::Config, err.to_string()))?;
    let oml_bytes = std::fs::read(oml_path)
        .map_err(|err| CliError::new(ErrorFamily::Config, err.to_string()))?;
    let compiler = Compiler::new(&contract, &registry);
    let outcome = compiler
        .compile(&oml_bytes, &CompileOptions {
            profile,
            params,
        })
        .map_err(|err| CliError::new(compile_family(&err), err.to_string()))?;
    emit(&format!("manifest_hash {}", outcome.hash.as_str()))?;
    emit(&format!("manifest {}", outcome.paths.manifest.display()))?;
    emit(&format!("latest {}", outcome.paths.latest_ptr.display()))?;
    Ok(ExitCode::SUCCESS)
}

/// Maps a compile error onto its family.
fn compile_family(err: &osiris_compiler::CompileError) -> ErrorFamily {
    use osiris_compiler::CompileError;
    match err {
        CompileError::Parse(_) | CompileError::OmlInvalid { .. } | CompileError::StepConfigInvalid(_) => {
            ErrorFamily::Schema
        }
        CompileError::ComponentNotFound(_) | CompileError::CycleDetected(_) => {
            ErrorFamily::Semantic
        }
        CompileError::UnresolvedParam { .. } | CompileError::Config(_) => ErrorFamily::Config,
        CompileError::WriteFailed { .. }
        | CompileError::Hash(_)
        | CompileError::Registry(_)
        | CompileError::Manifest(_) => ErrorFamily::Compile,
    }
}

/// Handles `osiris run`.
fn cmd_run(
    manifest: Option<PathBuf>,
    last_compile: bool,
    profile: Option<String>,
    engine: EngineArg,
) -> Result<ExitCode, CliError> {
    let contract = load_contract()?;
    let options = RunOptions {
        last_compile,
        manifest_path: manifest,
        profile,
        engine: match engine {
            EngineArg::Local => Engine::Local,
            EngineArg::E2b => Engine::E2b,
        },
    };
    let report = runcmd::run(&contract, &options)
        .map_err(|err| CliError::new(err.family(), err.to_string()))?;
    stdout_json(&report).map_err(|err| CliError::new(ErrorFamily::Storage, err.to_string()))?;
    if report.status == "completed" {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::from(ErrorFamily::Run.exit_code()))
    }
}

/// Handles `osiris runs …`.
fn cmd_runs(command: RunsCommand) -> Result<ExitCode, CliError> {
    let contract = load_contract()?;
    let index = RunIndex::new(contract.index_paths());
    match command {
        RunsCommand::List {
            pipeline,
            status,
            json,
        } => {
            let records = index
                .list(&RunFilter {
                    pipeline,
                    status,
                    limit: None,
                })
                .map_err(|err| CliError::new(ErrorFamily::Storage, err.to_string()))?;
            if json {
                stdout_json(&records)
                    .map_err(|err| CliError::new(ErrorFamily::Storage, err.to_string()))?;
            } else {
                for record in &records {
                    emit(&format!(
                        "{:>6}  {:<12}  {:<9}  {}  {}",
                        record.run_id,
                        record.pipeline_slug,
                        record.status,
                        record.manifest_short,
                        record.started_at,
                    ))?;
                }
            }
            Ok(ExitCode::SUCCESS)
        }
        RunsCommand::Show {
            id,
            json,
        } => {
            let record = index
                .find(&id)
                .map_err(|err| CliError::new(ErrorFamily::Storage, err.to_string()))?
                .ok_or_else(|| CliError::new(ErrorFamily::Semantic, format!("run not found: {id}")))?;
            if json {
                stdout_json(&record)
                    .map_err(|err| CliError::new(ErrorFamily::Storage, err.to_string()))?;
            } else {
                emit(&format!(
                    "run {} session {} status {} rows {} dir {}",
                    record.run_id,
                    record.session_id,
                    record.status,
                    record.rows,
                    record.run_logs_path,
                ))?;
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Handles `osiris maintenance clean`.
fn cmd_maintenance(command: MaintenanceCommand) -> Result<ExitCode, CliError> {
    let MaintenanceCommand::Clean {
        dry_run,
    } = command;
    let contract = load_contract()?;
    let engine = RetentionEngine::new(&contract);
    let plan = engine
        .plan(utc_now_ms())
        .map_err(|err| CliError::new(ErrorFamily::Storage, err.to_string()))?;
    emit(&format!("Run logs: {} to delete", plan.run_logs.len()))?;
    emit(&format!("AIOP cores: {} to delete", plan.aiop_cores.len()))?;
    emit(&format!("Annex shards: {} to delete", plan.annex_shards.len()))?;
    emit("Build artifacts: 0 (never deleted)")?;
    if dry_run {
        for action in plan.actions() {
            emit(&format!("  would delete {}", action.path().display()))?;
        }
        return Ok(ExitCode::SUCCESS);
    }
    let report = engine.apply(&plan);
    emit(&format!(
        "deleted {} directories, {} files, {} errors",
        report.deleted_dirs,
        report.deleted_files,
        report.errors.len(),
    ))?;
    if report.errors.is_empty() {
        Ok(ExitCode::SUCCESS)
    } else {
        Err(CliError::new(ErrorFamily::Storage, report.errors.join("; ")))
    }
}

/// Handles `osiris connections …` (the secret-resolving boundary).
fn cmd_connections(command: ConnectionsCommand) -> Result<ExitCode, CliError> {
    let contract = load_contract()?;
    let catalog = connections::load_catalog(contract.base_path())
        .map_err(|err| CliError::new(ErrorFamily::Config, err.to_string()))?;
    match command {
        ConnectionsCommand::List {
            json,
        } => {
            let listing = connections::list_json(&catalog);
            if json {
                stdout_json(&listing)
                    .map_err(|err| CliError::new(ErrorFamily::Storage, err.to_string()))?;
            } else {
                for entry in connections::list_redacted(&catalog) {
                    emit(&format!("@{}.{}", entry.family, entry.alias))?;
                }
            }
            Ok(ExitCode::SUCCESS)
        }
        ConnectionsCommand::Doctor {
            family,
            alias,
            json,
        } => {
            let entries =
                connections::doctor(&catalog, family.as_deref(), alias.as_deref());
            let healthy = entries.iter().all(|entry| entry.ok);
            if json {
                stdout_json(&json!({"ok": healthy, "connections": entries}))
                    .map_err(|err| CliError::new(ErrorFamily::Storage, err.to_string()))?;
            } else {
                for entry in &entries {
                    let state = if entry.ok { "ok" } else { "missing env" };
                    emit(&format!("@{}.{}: {state}", entry.family, entry.alias))?;
                }
            }
            if healthy {
                Ok(ExitCode::SUCCESS)
            } else {
                Ok(ExitCode::from(2))
            }
        }
    }
}

/// Handles `osiris components …`.
fn cmd_components(command: ComponentsCommand) -> Result<ExitCode, CliError> {
    let contract = load_contract()?;
    let registry = load_registry(&contract)?;
    match command {
        ComponentsCommand::List {
            json,
        } => {
            let specs = registry
                .list(None)
                .map_err(|err| CliError::new(ErrorFamily::Storage, err.to_string()))?;
            if json {
                let listing: Vec<Value> = specs
                    .iter()
                    .map(|spec| {
                        json!({
                            "name": spec.name.as_str(),
                            "version": spec.version,
                            "modes": spec.modes,
                        })
                    })
                    .collect();
                stdout_json(&listing)
                    .map_err(|err| CliError::new(ErrorFamily::Storage, err.to_string()))?;
            } else {
                for spec in &specs {
                    emit(&format!("{} {}", spec.name, spec.version))?;
                }
            }
            Ok(ExitCode::SUCCESS)
        }
        ComponentsCommand::Show {
            name,
        } => {
            let spec = registry
                .get(&name)
                .map_err(|err| CliError::new(ErrorFamily::Semantic, err.to_string()))?;
            stdout_json(&*spec)
                .map_err(|err| CliError::new(ErrorFamily::Storage, err.to_string()))?;
            Ok(ExitCode::SUCCESS)
        }
        ComponentsCommand::Validate {
            name,
            level,
        } => {
            let level = ValidationLevel::parse(&level).ok_or_else(|| {
                CliError::new(ErrorFamily::Config, format!("unknown level {level:?}"))
            })?;
            let issues = registry
                .validate(&name, level)
                .map_err(|err| CliError::new(ErrorFamily::Semantic, err.to_string()))?;
            stdout_json(&issues)
                .map_err(|err| CliError::new(ErrorFamily::Storage, err.to_string()))?;
            if issues.is_empty() {
                Ok(ExitCode::SUCCESS)
            } else {
                Ok(ExitCode::from(ErrorFamily::Schema.exit_code()))
            }
        }
        ComponentsCommand::ConfigExample {
            name,
        } => {
            let spec = registry
                .get(&name)
                .map_err(|err| CliError::new(ErrorFamily::Semantic, err.to_string()))?;
            let example = spec.examples.first().map(|example| example.config.clone());
            let example = example.ok_or_else(|| {
                CliError::new(ErrorFamily::Semantic, format!("no examples for {name}"))
            })?;
            stdout_json(&example)
                .map_err(|err| CliError::new(ErrorFamily::Storage, err.to_string()))?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Handles `osiris logs aiop`.
fn cmd_logs(command: LogsCommand) -> Result<ExitCode, CliError> {
    let LogsCommand::Aiop {
        last,
    } = command;
    let contract = load_contract()?;
    let index = RunIndex::new(contract.index_paths());
    let records = index
        .list(&RunFilter::default())
        .map_err(|err| CliError::new(ErrorFamily::Storage, err.to_string()))?;
    let with_aiop: Vec<_> =
        records.iter().filter(|record| record.aiop_path.is_some()).collect();
    if last {
        let record = with_aiop.last().ok_or_else(|| {
            CliError::new(ErrorFamily::Semantic, "no aiop packages recorded".to_string())
        })?;
        if let Some(path) = &record.aiop_path {
            emit(path)?;
        }
        return Ok(ExitCode::SUCCESS);
    }
    for record in with_aiop {
        if let Some(path) = &record.aiop_path {
            emit(path)?;
        }
    }
    Ok(ExitCode::SUCCESS)
}

/// Handles `osiris mcp …`.
fn cmd_mcp(command: McpCommand) -> Result<ExitCode, CliError> {
    match command {
        McpCommand::Run {
            selftest,
        } => {
            let contract = load_contract()?;
            let registry = load_registry(&contract)?;
            let binary = std::env::current_exe()
                .map_err(|err| CliError::new(ErrorFamily::Config, err.to_string()))?;
            let bridge = CliBridge::new(binary);
            let router = ToolRouter::new(contract.clone(), registry, bridge);
            let server = McpServer::new(router, contract, Arc::new(StderrMetrics));
            if selftest {
                let report = server.selftest();
                stdout_json(&report)
                    .map_err(|err| CliError::new(ErrorFamily::Storage, err.to_string()))?;
                return Ok(ExitCode::SUCCESS);
            }
            let stdin = std::io::stdin();
            let mut reader = stdin.lock();
            let mut writer = std::io::stdout();
            server
                .serve_stdio(&mut reader, &mut writer)
                .map_err(|err| CliError::new(ErrorFamily::Storage, err.to_string()))?;
            Ok(ExitCode::SUCCESS)
        }
        McpCommand::Tools {
            json,
        } => {
            let catalog = osiris_mcp::tools::tool_catalog();
            if json {
                stdout_json(&catalog)
                    .map_err(|err| CliError::new(ErrorFamily::Storage, err.to_string()))?;
            } else {
                for (name, description) in catalog {
                    emit(&format!("{name}: {description}"))?;
                }
            }
            Ok(ExitCode::SUCCESS)
        }
        McpCommand::Clients {
            json: _,
        } => {
            let binary = std::env::current_exe()
                .map_err(|err| CliError::new(ErrorFamily::Config, err.to_string()))?;
            let snippet = json!({
                "mcpServers": {
                    "osiris": {
                        "command": binary.display().to_string(),
                        "args": ["mcp", "run"],
                    },
                },
            });
            stdout_json(&snippet)
                .map_err(|err| CliError::new(ErrorFamily::Storage, err.to_string()))?;
            Ok(ExitCode::SUCCESS)
        }
        McpCommand::DiscoveryRequest {
            json: _,
        } => {
            let mut request = String::new();
            let _ = std::io::stdin().read_to_string(&mut request);
            // Discovery requires a database driver, which is an external
            // collaborator; without one the delegation target reports a
            // CONNECTION-family failure.
            stdout_json(&json!({
                "ok": false,
                "error": {
                    "family": "CONNECTION",
                    "message": "no discovery-capable driver is installed",
                },
            }))
            .map_err(|err| CliError::new(ErrorFamily::Storage, err.to_string()))?;
            Ok(ExitCode::from(2))
        }
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Writes one stdout line, mapping failures into storage errors.
fn emit(line: &str) -> Result<(), CliError> {
    stdout_line(line).map_err(|err| CliError::new(ErrorFamily::Storage, err.to_string()))
}

/// Parses `key=value` parameter arguments.
fn parse_params(raw: &[String]) -> Result<BTreeMap<String, String>, String> {
    let mut params = BTreeMap::new();
    for entry in raw {
        let Some((key, value)) = entry.split_once('=') else {
            return Err(format!("params must be key=value, got {entry:?}"));
        };
        if key.is_empty() {
            return Err(format!("params key is empty in {entry:?}"));
        }
        params.insert(key.to_string(), value.to_string());
    }
    Ok(params)
}
