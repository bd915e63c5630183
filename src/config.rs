//! Configuration loader: merges .env, config.toml, and env vars.

use common::config::WatchConfig;
use common::Error;
use std::path::Path;

const DEFAULT_CONFIG_PATH: &str = "config.toml";

fn parse_f64(raw: &str, env_name: &str) -> Result<f64, Error> {
    raw.trim()
        .parse::<f64>()
        .map_err(|_| Error::Config(format!("{env_name} must be a number")))
}

fn parse_non_negative_u64(raw: &str, env_name: &str) -> Result<u64, Error> {
    raw.trim()
        .parse::<u64>()
        .map_err(|_| Error::Config(format!("{env_name} must be an integer >= 0")))
}

fn validate_config(config: &WatchConfig) -> Result<(), Error> {
    let mut issues: Vec<String> = Vec::new();

    match config.latitude {
        Some(lat) if !(lat.is_finite() && lat.abs() <= 90.0) => {
            issues.push("latitude must be in [-90, 90]".into());
        }
        None => issues.push("latitude is required (config.toml or RAIN_WATCH_LAT)".into()),
        _ => {}
    }
    match config.longitude {
        Some(lng) if !(lng.is_finite() && lng.abs() <= 180.0) => {
            issues.push("longitude must be in [-180, 180]".into());
        }
        None => issues.push("longitude is required (config.toml or RAIN_WATCH_LNG)".into()),
        _ => {}
    }

    let slot = config.engine.slot_minutes;
    if slot == 0 {
        issues.push("engine.slot_minutes must be > 0".into());
    } else if config.engine.horizon_minutes % slot != 0 {
        issues.push("engine.horizon_minutes must be a multiple of engine.slot_minutes".into());
    }

    if config.fetch.retry_delay_ms == 0 {
        issues.push("fetch.retry_delay_ms must be > 0".into());
    }
    if config.fetch.timeout_secs == 0 {
        issues.push("fetch.timeout_secs must be > 0".into());
    }
    if config.fetch.user_agent.trim().is_empty() {
        issues.push("fetch.user_agent must not be empty".into());
    }

    if let Some(minutes) = config.providers.utc_offset_minutes {
        if minutes.abs() >= 24 * 60 {
            issues.push("providers.utc_offset_minutes must be within +/- 23:59".into());
        }
    } else if let Some(name) = &config.providers.timezone {
        if config.providers.clock_zone().is_err() {
            issues.push(format!("providers.timezone {:?} is not a known IANA zone", name));
        }
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(Error::Config(format!(
            "Invalid config:\n - {}",
            issues.join("\n - ")
        )))
    }
}

/// Load watcher configuration from the environment and an optional config
/// file. `lat`/`lng` come from the command line and win over everything.
pub fn load_config(
    path: Option<&Path>,
    lat: Option<f64>,
    lng: Option<f64>,
) -> Result<WatchConfig, Error> {
    // 1. Load .env file from the working directory or its parents.
    if let Err(e) = dotenvy::dotenv() {
        tracing::debug!("No .env file loaded: {}", e);
    }

    // 2. Start with defaults.
    let mut config = WatchConfig::default();

    // 3. Config file. An explicit path must exist; the default one is optional.
    let config_path = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_PATH));
    if path.is_some() || config_path.exists() {
        let contents = std::fs::read_to_string(config_path).map_err(|e| {
            Error::Config(format!("Failed to read {}: {}", config_path.display(), e))
        })?;
        config = toml::from_str(&contents).map_err(|e| {
            Error::Config(format!("Failed to parse {}: {}", config_path.display(), e))
        })?;
    }

    // 4. Environment overrides (highest priority).
    apply_env_overrides(&mut config, |name| std::env::var(name).ok())?;
    apply_cli_overrides(&mut config, lat, lng);

    validate_config(&config)?;

    Ok(config)
}

fn apply_env_overrides(
    config: &mut WatchConfig,
    var: impl Fn(&str) -> Option<String>,
) -> Result<(), Error> {
    if let Some(raw) = var("RAIN_WATCH_LAT") {
        config.latitude = Some(parse_f64(&raw, "RAIN_WATCH_LAT")?);
    }
    if let Some(raw) = var("RAIN_WATCH_LNG") {
        config.longitude = Some(parse_f64(&raw, "RAIN_WATCH_LNG")?);
    }
    if let Some(raw) = var("RAIN_WATCH_INTERVAL_SECS") {
        config.timing.rain_check_interval_secs =
            parse_non_negative_u64(&raw, "RAIN_WATCH_INTERVAL_SECS")?;
    }
    if let Some(raw) = var("RAIN_WATCH_RETRY_COUNT") {
        let parsed = parse_non_negative_u64(&raw, "RAIN_WATCH_RETRY_COUNT")?;
        config.fetch.retry_count = u32::try_from(parsed)
            .map_err(|_| Error::Config("RAIN_WATCH_RETRY_COUNT is too large".into()))?;
    }
    Ok(())
}

fn apply_cli_overrides(config: &mut WatchConfig, lat: Option<f64>, lng: Option<f64>) {
    if lat.is_some() {
        config.latitude = lat;
    }
    if lng.is_some() {
        config.longitude = lng;
    }
}
