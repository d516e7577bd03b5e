use config::{Config, Environment, File, FileFormat};
use serde::de::DeserializeOwned;
use std::path::Path;

use crate::error::ConfigError;

/// Prefix for environment overrides, e.g. `SOFTDEFER_EX_TASKLETS__TIMES=5`.
pub const ENV_PREFIX: &str = "SOFTDEFER";

fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

/// Load module parameters from a TOML file, with environment overrides
pub fn load_toml_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    load_file(path.as_ref(), FileFormat::Toml)
}

/// Load module parameters from a YAML file, with environment overrides
pub fn load_yaml_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    load_file(path.as_ref(), FileFormat::Yaml)
}

/// Module parameters from the environment alone
pub fn load_env_config() -> Result<Config, ConfigError> {
    Ok(Config::builder().add_source(environment()).build()?)
}

fn load_file(path: &Path, format: FileFormat) -> Result<Config, ConfigError> {
    let config = Config::builder()
        .add_source(File::from(path).format(format))
        .add_source(environment())
        .build()?;
    Ok(config)
}

/// Reads the table named after `module`, falling back to defaults when the
/// table is absent. Keys missing from a present table take their serde
/// defaults.
pub fn module_params<P>(config: &Config, module: &str) -> Result<P, ConfigError>
where
    P: DeserializeOwned + Default,
{
    match config.get::<P>(module) {
        Ok(params) => Ok(params),
        Err(config::ConfigError::NotFound(_)) => Ok(P::default()),
        Err(e) => Err(e.into()),
    }
}
