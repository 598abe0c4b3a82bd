//! Configuration loading: TOML file plus environment overrides.

use vigil_models::MonitorConfig;

use crate::error::MonitorResult;

/// Load the monitor configuration.
///
/// Reads `path` (or `vigil.toml` next to the binary when absent, which may
/// be missing entirely), then applies `VIGIL_*` environment overrides with
/// `__` separating nesting levels, e.g. `VIGIL_NOTIFIER__PORT=9001`.
pub fn load_config(path: Option<&str>) -> MonitorResult<MonitorConfig> {
    let mut builder = config::Config::builder();
    builder = match path {
        Some(path) => builder.add_source(config::File::with_name(path)),
        None => builder.add_source(config::File::with_name("vigil").required(false)),
    };
    let cfg = builder
        .add_source(config::Environment::with_prefix("VIGIL").separator("__"))
        .build()?
        .try_deserialize()?;
    Ok(cfg)
}
