//! Report session-mode support of a simulated environment

use anyhow::Result;
use colored::*;
use spatia_xr::sim::{SimSettings, SimulatedHost};
use spatia_xr::{Capabilities, SessionMode, SpatialEnvironmentDetector};

/// What kind of environment to simulate
#[derive(Debug, Clone, PartialEq)]
pub struct Environment {
    pub api_available: bool,
    pub modes: Vec<SessionMode>,
}

impl Environment {
    /// `--ar`/`--vr` restrict support to the given modes; neither means both.
    pub fn from_flags(no_api: bool, ar: bool, vr: bool) -> Self {
        let modes = match (ar, vr) {
            (false, false) | (true, true) => {
                vec![SessionMode::ImmersiveVr, SessionMode::ImmersiveAr]
            }
            (true, false) => vec![SessionMode::ImmersiveAr],
            (false, true) => vec![SessionMode::ImmersiveVr],
        };
        Self {
            api_available: !no_api,
            modes,
        }
    }
}

pub async fn detect(environment: Environment) -> Capabilities {
    let host = SimulatedHost::new(SimSettings {
        api_available: environment.api_available,
        supported_modes: environment.modes,
        ..SimSettings::default()
    });
    SpatialEnvironmentDetector::new(host).detect().await
}

pub async fn report(environment: Environment) -> Result<()> {
    let capabilities = detect(environment).await;

    println!("{} Spatial environment", "→".blue().bold());
    println!("  {:<14} {}", "api", mark(capabilities.api_available));
    for mode in [SessionMode::ImmersiveVr, SessionMode::ImmersiveAr] {
        println!("  {:<14} {}", mode.as_str(), mark(capabilities.supports(mode)));
    }
    Ok(())
}

fn mark(supported: bool) -> ColoredString {
    if supported {
        "✓ supported".green()
    } else {
        "✗ unsupported".red()
    }
}
