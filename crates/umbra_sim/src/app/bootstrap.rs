use std::env;
use std::path::{Path, PathBuf};

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use umbra::ExposureSettings;

use super::loop_runner::SimConfig;
use super::scenario::{Scenario, SimError};

const SETTINGS_ENV_VAR: &str = "UMBRA_SETTINGS";
const SCENARIO_ENV_VAR: &str = "UMBRA_SCENARIO";
const DEFAULT_SCENARIO: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/scenarios/torchlit_hall.json");

pub(crate) struct AppWiring {
    pub(crate) config: SimConfig,
    pub(crate) settings: ExposureSettings,
    pub(crate) scenario: Scenario,
}

pub(crate) fn build_app<I>(args: I) -> Result<AppWiring, SimError>
where
    I: IntoIterator<Item = String>,
{
    init_tracing();
    info!("=== umbra sim startup ===");

    let scenario_path = resolve_scenario_path(args, env::var(SCENARIO_ENV_VAR).ok());
    let scenario = Scenario::load(&scenario_path)?;
    let settings_path = env::var(SETTINGS_ENV_VAR).ok().map(PathBuf::from);
    let mut settings = resolve_settings(&scenario, settings_path.as_deref())?;
    settings.apply_env_overrides();
    settings.validate()?;

    info!(
        scenario = scenario.name.as_str(),
        path = %scenario_path.display(),
        actors = scenario.scene.actors().len(),
        steps = scenario.steps.len(),
        "scenario_loaded"
    );

    Ok(AppWiring {
        config: SimConfig::default(),
        settings,
        scenario,
    })
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .compact()
        .init();
}

/// First positional argument, then the env var, then the bundled hall.
fn resolve_scenario_path<I>(args: I, from_env: Option<String>) -> PathBuf
where
    I: IntoIterator<Item = String>,
{
    args.into_iter()
        .map(|arg| arg.trim().to_string())
        .find(|arg| !arg.is_empty())
        .or_else(|| from_env.filter(|value| !value.trim().is_empty()))
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SCENARIO))
}

/// A settings file wins over settings embedded in the scenario.
fn resolve_settings(
    scenario: &Scenario,
    settings_file: Option<&Path>,
) -> Result<ExposureSettings, SimError> {
    if let Some(path) = settings_file {
        let settings = ExposureSettings::load(path)?;
        if scenario.settings.is_some() {
            warn!(
                path = %path.display(),
                "settings file overrides scenario settings"
            );
        }
        return Ok(settings);
    }
    Ok(scenario.settings.clone().unwrap_or_default())
}
