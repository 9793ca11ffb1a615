use std::process::ExitCode;

use crm_mcp_bridge::config::BridgeConfig;

#[tokio::main]
async fn main() -> ExitCode {
    let config = match BridgeConfig::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("crm-mcp-bridge: {e}");
            return ExitCode::FAILURE;
        }
    };

    crm_mcp_bridge::logging::init_tracing(&config.logging);

    match crm_mcp_bridge::run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "bridge exited with an error");
            ExitCode::FAILURE
        }
    }
}
