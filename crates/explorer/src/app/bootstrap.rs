use std::env;
use std::str::FromStr;
use std::time::Duration;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use super::walk::{parse_walk_script, WalkLeg};

const MAX_TICKS_ENV_VAR: &str = "TILEWORLD_MAX_TICKS";
const WALK_ENV_VAR: &str = "TILEWORLD_WALK";
const TPS_ENV_VAR: &str = "TILEWORLD_TPS";
const SPEED_ENV_VAR: &str = "TILEWORLD_SPEED";

const DEFAULT_WALK: &str = "N:30,E:30,S:30,W:30";

#[derive(Debug, Clone)]
pub(crate) struct RunConfig {
    pub(crate) target_tps: u32,
    pub(crate) max_ticks: Option<u64>,
    pub(crate) walk: Vec<WalkLeg>,
    /// World units per second.
    pub(crate) speed: f32,
    pub(crate) max_frame_delta: Duration,
    pub(crate) max_ticks_per_frame: u32,
    pub(crate) render_fps: u32,
    pub(crate) metrics_log_interval: Duration,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            target_tps: 60,
            max_ticks: None,
            walk: default_walk(),
            speed: 6.0,
            max_frame_delta: Duration::from_millis(250),
            max_ticks_per_frame: 5,
            render_fps: 30,
            metrics_log_interval: Duration::from_secs(1),
        }
    }
}

impl RunConfig {
    pub(crate) fn from_env() -> Self {
        let defaults = Self::default();
        let walk = match env::var(WALK_ENV_VAR).ok() {
            Some(raw) => match parse_walk_script(&raw) {
                Ok(legs) => legs,
                Err(error) => {
                    warn!(
                        env_var = WALK_ENV_VAR,
                        value = raw.as_str(),
                        error = %error,
                        "invalid walk script; falling back to default"
                    );
                    defaults.walk.clone()
                }
            },
            None => defaults.walk.clone(),
        };
        let target_tps = parse_env_or(
            TPS_ENV_VAR,
            env::var(TPS_ENV_VAR).ok().as_deref(),
            defaults.target_tps,
        );
        let max_ticks = env::var(MAX_TICKS_ENV_VAR)
            .ok()
            .map(|raw| parse_env_or(MAX_TICKS_ENV_VAR, Some(&raw), 0u64))
            .filter(|ticks| *ticks > 0);
        let speed = parse_positive_speed(env::var(SPEED_ENV_VAR).ok().as_deref(), defaults.speed);
        Self {
            target_tps: target_tps.max(1),
            max_ticks,
            walk,
            speed,
            ..defaults
        }
    }
}

pub(crate) struct AppWiring {
    pub(crate) config: RunConfig,
}

pub(crate) fn build_app() -> AppWiring {
    init_tracing();
    info!("=== Tileworld Explorer Startup ===");

    let config = RunConfig::from_env();
    info!(
        target_tps = config.target_tps,
        max_ticks = ?config.max_ticks,
        walk_legs = config.walk.len(),
        speed = config.speed,
        "run_config"
    );
    AppWiring { config }
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

fn default_walk() -> Vec<WalkLeg> {
    parse_walk_script(DEFAULT_WALK).unwrap_or_default()
}

fn parse_env_or<T>(env_var: &'static str, raw: Option<&str>, fallback: T) -> T
where
    T: FromStr + Copy,
{
    match raw {
        Some(value) => match value.trim().parse::<T>() {
            Ok(parsed) => parsed,
            Err(_) => {
                warn!(env_var, value, "invalid env var value; falling back to default");
                fallback
            }
        },
        None => fallback,
    }
}

fn parse_positive_speed(raw: Option<&str>, fallback: f32) -> f32 {
    let speed = parse_env_or(SPEED_ENV_VAR, raw, fallback);
    if speed.is_finite() && speed > 0.0 {
        speed
    } else {
        warn!(env_var = SPEED_ENV_VAR, speed, "speed must be positive; falling back to default");
        fallback
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_walk_is_a_closed_square() {
        let walk = default_walk();
        assert_eq!(walk.len(), 4);
        assert!(walk.iter().all(|leg| leg.distance == 30.0));
    }

    #[test]
    fn env_values_fall_back_when_unparseable() {
        assert_eq!(parse_env_or(TPS_ENV_VAR, Some("120"), 60u32), 120);
        assert_eq!(parse_env_or(TPS_ENV_VAR, Some(" 90 "), 60u32), 90);
        assert_eq!(parse_env_or(TPS_ENV_VAR, Some("fast"), 60u32), 60);
        assert_eq!(parse_env_or(TPS_ENV_VAR, None, 60u32), 60);
    }

    #[test]
    fn speed_must_be_positive() {
        assert_eq!(parse_positive_speed(Some("12.5"), 6.0), 12.5);
        assert_eq!(parse_positive_speed(Some("-3"), 6.0), 6.0);
        assert_eq!(parse_positive_speed(Some("0"), 6.0), 6.0);
        assert_eq!(parse_positive_speed(Some("NaN"), 6.0), 6.0);
    }
}
