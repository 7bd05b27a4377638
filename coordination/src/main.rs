//! `ad-sdlc` — CLI surface for the autonomous SDLC pipeline controller
//! (spec §6): `init`, `start`, `resume`, `status`, `cancel`.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use coordination::config::Config;
use coordination::controller::{CancellationToken, Controller, TickOutcome};
use coordination::dispatcher::{BridgeRequest, BridgeResponse, DispatchError, Dispatcher, Transport};
use coordination::error::ErrorKind;
use coordination::orchestrator::Orchestrator;
use coordination::priority::{IssueGraphInput, PriorityAnalyzer, ScoringWeights};
use coordination::project::ProjectMode;
use coordination::registry::AgentRegistry;
use coordination::scratchpad::artifact::Section;
use coordination::scratchpad::Scratchpad;

#[derive(Parser)]
#[command(name = "ad-sdlc")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Lay down the on-disk layout under a new `AD_SDLC_HOME`.
    Init { path: PathBuf },
    /// Run a project's pipeline from its current (or initial) phase.
    Start { project_id: String },
    /// Resume a project from its last durable checkpoint.
    Resume { project_id: String },
    /// Print a project's current phase and controller state.
    Status { project_id: String },
    /// Transition a project to `cancelled`.
    Cancel { project_id: String },
    /// Record operator approval for a stage gated by `approvalRequired`.
    Approve { project_id: String, stage: String },
}

/// Shells out to the bundled `sdlc-agent` binary. Unlike agent-originated
/// subprocess calls (git/gh/npm), this is a fixed, repo-controlled
/// invocation with no attacker-influenced argv, so it bypasses the
/// Security Gate's command whitelist rather than needing an entry in it.
struct ProcessBridgeTransport {
    scratchpad_dir: PathBuf,
}

impl Transport for ProcessBridgeTransport {
    fn supports(&self, _agent_type: &str) -> bool {
        true
    }

    fn dispatch(&self, request: BridgeRequest) -> Result<BridgeResponse, DispatchError> {
        let agent_type = request.agent_type.clone();
        let input_path = self.scratchpad_dir.join("bridge/input").join(format!("{agent_type}.json"));
        let output_path = self.scratchpad_dir.join("bridge/output").join(format!("{agent_type}.json"));
        if let Some(parent) = input_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| DispatchError::AgentDispatchError {
                stage: agent_type.clone(),
                cause: e.to_string(),
            })?;
        }
        let body = serde_json::to_vec(&request).map_err(|e| DispatchError::AgentDispatchError {
            stage: agent_type.clone(),
            cause: e.to_string(),
        })?;
        std::fs::write(&input_path, &body).map_err(|e| DispatchError::AgentDispatchError {
            stage: agent_type.clone(),
            cause: e.to_string(),
        })?;

        let status = std::process::Command::new("sdlc-agent")
            .arg("--agent-type")
            .arg(&agent_type)
            .arg("--scratchpad-dir")
            .arg(&self.scratchpad_dir)
            .status()
            .map_err(|e| DispatchError::AgentDispatchError { stage: agent_type.clone(), cause: e.to_string() })?;
        if !status.success() {
            return Err(DispatchError::AgentDispatchError {
                stage: agent_type.clone(),
                cause: format!("sdlc-agent exited with {status}"),
            });
        }

        let bytes = std::fs::read(&output_path).map_err(|e| DispatchError::AgentDispatchError {
            stage: agent_type.clone(),
            cause: e.to_string(),
        })?;
        Ok(BridgeResponse::parse(&bytes))
    }

    fn name(&self) -> &str {
        "process_bridge"
    }
}

fn exit_code_for(kind: ErrorKind) -> i32 {
    match kind {
        ErrorKind::Validation | ErrorKind::SchemaValidation => 2,
        ErrorKind::SecurityDenied => 3,
        ErrorKind::DeadlockOrBlocked | ErrorKind::CircularDependency => 4,
        ErrorKind::Timeout | ErrorKind::BridgeTimeout => 5,
        _ => 1,
    }
}

fn init_tracing(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_new(level).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

fn main() {
    let cli = Cli::parse();
    let config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("ad-sdlc: config error: {e}");
            std::process::exit(exit_code_for(e.kind()));
        }
    };
    init_tracing(&config.log_level);

    let code = match cli.command {
        Command::Init { path } => run_init(&path),
        Command::Start { project_id } => run_start(&config, &project_id),
        Command::Resume { project_id } => run_start(&config, &project_id),
        Command::Status { project_id } => run_status(&config, &project_id),
        Command::Cancel { project_id } => run_cancel(&config, &project_id),
        Command::Approve { project_id, stage } => run_approve(&config, &project_id, &stage),
    };
    std::process::exit(code);
}

fn run_init(path: &PathBuf) -> i32 {
    let home = path.join(".ad-sdlc");
    for dir in ["scratchpad/bridge/input", "scratchpad/bridge/output", "config", "logs"] {
        if let Err(e) = std::fs::create_dir_all(home.join(dir)) {
            eprintln!("ad-sdlc: init failed creating {dir}: {e}");
            return 1;
        }
    }
    let workflow_path = home.join("config/workflow.yaml");
    let agents_path = home.join("config/agents.yaml");
    let workflow = coordination::config::WorkflowConfig::defaults();
    let agents = coordination::config::AgentsConfig::defaults();
    if !workflow_path.exists() {
        let _ = std::fs::write(&workflow_path, serde_yaml::to_string(&workflow).unwrap_or_default());
    }
    if !agents_path.exists() {
        let _ = std::fs::write(&agents_path, serde_yaml::to_string(&agents).unwrap_or_default());
    }
    println!("initialized {}", home.display());
    0
}

fn build_registry(config: &Config) -> AgentRegistry {
    let mut registry = AgentRegistry::new();
    for entry in &config.agents.agents {
        let _ = registry.register(entry.into());
    }
    registry
}

fn run_start(config: &Config, project_id: &str) -> i32 {
    let scratchpad_root = config.ad_sdlc_home.join("scratchpad");
    let scratchpad = Scratchpad::new(scratchpad_root.clone());
    let registry = build_registry(config);
    let mut dispatcher = Dispatcher::new();
    dispatcher.register_transport(Box::new(ProcessBridgeTransport { scratchpad_dir: scratchpad_root.clone() }));

    let stages = config.workflow.stages_for(ProjectMode::Greenfield).to_vec();
    let mut orchestrator = match Orchestrator::new(project_id, &scratchpad, &dispatcher, &registry, stages) {
        Ok(o) => o,
        Err(e) => {
            eprintln!("ad-sdlc: {e}");
            return exit_code_for(e.kind());
        }
    };

    loop {
        let next = match orchestrator.next_stage() {
            Ok(Some(stage)) => stage.clone(),
            Ok(None) => break,
            Err(e) => {
                eprintln!("ad-sdlc: {e}");
                return exit_code_for(e.kind());
            }
        };
        if let Err(e) = orchestrator.run_stage(&next) {
            eprintln!("ad-sdlc: stage {} failed: {e}", next.name);
            return exit_code_for(e.kind());
        }
    }

    let graph: Option<IssueGraphInput> = match scratchpad.read_typed(
        project_id,
        Section::Issues,
        "dependency_graph",
        coordination::scratchpad::schema::SerialFormat::Json,
    ) {
        Ok(g) => g,
        Err(e) => {
            eprintln!("ad-sdlc: {e}");
            return exit_code_for(e.kind());
        }
    };
    let Some(graph) = graph else {
        println!("no issues to run for {project_id}");
        return 0;
    };

    let analyzer = match PriorityAnalyzer::build(graph, ScoringWeights::default()) {
        Ok(a) => a,
        Err(e) => {
            eprintln!("ad-sdlc: {e}");
            return exit_code_for(e.kind());
        }
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("ad-sdlc: {e}");
            return 1;
        }
    };
    runtime.block_on(async {
        let scratchpad = Arc::new(Scratchpad::new(scratchpad_root.clone()));
        let dispatcher = Arc::new({
            let mut d = Dispatcher::new();
            d.register_transport(Box::new(ProcessBridgeTransport { scratchpad_dir: scratchpad_root.clone() }));
            d
        });
        let mut controller = match Controller::start(
            project_id,
            scratchpad,
            dispatcher,
            analyzer,
            config.max_workers,
            CancellationToken::new(),
        ) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("ad-sdlc: {e}");
                return exit_code_for(e.kind());
            }
        };
        loop {
            match controller.tick().await {
                Ok(TickOutcome::Terminated) => return 0,
                Ok(TickOutcome::Continue) => {
                    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                }
                Err(e) => {
                    eprintln!("ad-sdlc: {e}");
                    return exit_code_for(e.kind());
                }
            }
        }
    })
}

fn run_status(config: &Config, project_id: &str) -> i32 {
    let scratchpad_root = config.ad_sdlc_home.join("scratchpad");
    let scratchpad = Scratchpad::new(scratchpad_root.clone());
    match coordination::state_manager::StateManager::load_or_init(&scratchpad, project_id) {
        Ok(state) => {
            println!("{project_id}: {}", state.get_phase());
            0
        }
        Err(e) => {
            eprintln!("ad-sdlc: {e}");
            exit_code_for(e.kind())
        }
    }
}

fn run_approve(config: &Config, project_id: &str, stage: &str) -> i32 {
    let scratchpad_root = config.ad_sdlc_home.join("scratchpad");
    let scratchpad = Scratchpad::new(scratchpad_root);
    let registry = build_registry(config);
    let dispatcher = Dispatcher::new();
    let stages = config.workflow.stages_for(ProjectMode::Greenfield).to_vec();
    let orchestrator = match Orchestrator::new(project_id, &scratchpad, &dispatcher, &registry, stages) {
        Ok(o) => o,
        Err(e) => {
            eprintln!("ad-sdlc: {e}");
            return exit_code_for(e.kind());
        }
    };
    match orchestrator.approve_stage(stage) {
        Ok(()) => {
            println!("{project_id}: stage {stage} approved");
            0
        }
        Err(e) => {
            eprintln!("ad-sdlc: {e}");
            exit_code_for(e.kind())
        }
    }
}

fn run_cancel(config: &Config, project_id: &str) -> i32 {
    let scratchpad_root = config.ad_sdlc_home.join("scratchpad");
    let scratchpad = Scratchpad::new(scratchpad_root.clone());
    match coordination::state_manager::StateManager::load_or_init(&scratchpad, project_id) {
        Ok(state) => match state.cancel() {
            Ok(_) => {
                println!("{project_id}: cancelled");
                0
            }
            Err(e) => {
                eprintln!("ad-sdlc: {e}");
                exit_code_for(e.kind())
            }
        },
        Err(e) => {
            eprintln!("ad-sdlc: {e}");
            exit_code_for(e.kind())
        }
    }
}
