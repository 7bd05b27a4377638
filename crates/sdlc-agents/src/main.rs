//! `sdlc-agent` — the external-harness binary the file-bridge transport
//! invokes (spec §4.5): reads `<scratchpadDir>/bridge/input/<agentType>.json`,
//! runs the matching body, writes `bridge/output/<agentType>.json`.

use std::path::PathBuf;

use clap::Parser;
use sdlc_agents::WireRequest;

#[derive(Parser)]
#[command(name = "sdlc-agent")]
struct Args {
    /// Agent type to run (must match one in `sdlc_agents::AGENT_TYPES`).
    #[arg(long)]
    agent_type: String,
    /// Scratchpad root containing `bridge/{input,output}`.
    #[arg(long)]
    scratchpad_dir: PathBuf,
}

fn main() {
    let args = Args::parse();
    let input_path = args.scratchpad_dir.join("bridge/input").join(format!("{}.json", args.agent_type));
    let output_path = args.scratchpad_dir.join("bridge/output").join(format!("{}.json", args.agent_type));

    let bytes = match std::fs::read(&input_path) {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("sdlc-agent: reading {}: {e}", input_path.display());
            std::process::exit(1);
        }
    };
    let request: WireRequest = match serde_json::from_slice(&bytes) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("sdlc-agent: malformed request: {e}");
            std::process::exit(2);
        }
    };

    let response = match sdlc_agents::run_agent(&args.agent_type, &request) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("sdlc-agent: {e}");
            std::process::exit(2);
        }
    };

    if let Some(parent) = output_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    if let Err(e) = std::fs::write(&output_path, serde_json::to_vec(&response).unwrap_or_default()) {
        eprintln!("sdlc-agent: writing {}: {e}", output_path.display());
        std::process::exit(1);
    }
}
