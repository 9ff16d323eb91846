use fleetplan_core::DeploymentManifest;
use fleetplan_planner::config::{OutputFormat, PlannerConfig};
use fleetplan_planner::features::state_store::repo::PersistedState;
use fleetplan_planner::{Planner, PlannerResult};
use std::path::Path;
use std::process::ExitCode;
use tracing::{error, info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> PlannerResult<T> {
    let raw = tokio::fs::read_to_string(path).await?;
    Ok(serde_json::from_str(&raw)?)
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("fleetplan_planner=info,info")),
        )
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = PlannerConfig::from_env()?;
    info!(
        manifest = %config.manifest_path.display(),
        state = ?config.state_path,
        output = ?config.output,
        "Starting Fleetplan"
    );

    let manifest: DeploymentManifest = read_json(&config.manifest_path).await?;
    let state = match &config.state_path {
        Some(path) => read_json(path).await?,
        None => PersistedState::default(),
    };

    let planner = Planner::from_state(state);
    match planner.plan(manifest).await {
        Ok(plan) => {
            match config.output {
                OutputFormat::Summary => print!("{plan}"),
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&plan)?),
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(response) => {
            error!(error_code = %response.error_code, "Deployment planning failed");
            eprintln!("Error: {}", response.message);
            Ok(ExitCode::FAILURE)
        }
    }
}
