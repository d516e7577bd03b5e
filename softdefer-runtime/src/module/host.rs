use std::sync::Arc;

use config::Config;
use tracing::{error, info};

use super::registry::{ModuleEntry, MODULES};
use super::{DeferralModule, LoadedModule};
use crate::config::{load_env_config, load_toml_config, load_yaml_config};
use crate::error::{ConfigError, ModuleError};

/// Builder for the module host
pub struct ModuleHostBuilder {
    config: Arc<Config>,
    entries: Vec<ModuleEntry>,
}

impl Default for ModuleHostBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ModuleHostBuilder {
    /// Create a builder with no parameter sources; every module gets its defaults
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    /// Parameters from a TOML file plus `SOFTDEFER_*` environment overrides
    pub fn with_toml(path: &str) -> Result<Self, ConfigError> {
        Ok(Self::with_config(load_toml_config(path)?))
    }

    /// Parameters from a YAML file plus `SOFTDEFER_*` environment overrides
    pub fn with_yaml(path: &str) -> Result<Self, ConfigError> {
        Ok(Self::with_config(load_yaml_config(path)?))
    }

    /// Parameters from `SOFTDEFER_*` environment variables only
    pub fn with_env() -> Result<Self, ConfigError> {
        Ok(Self::with_config(load_env_config()?))
    }

    pub fn with_config(config: Config) -> Self {
        Self {
            config: Arc::new(config),
            entries: Vec::new(),
        }
    }

    /// Register a module explicitly. Modules load in registration order.
    pub fn module<M: DeferralModule>(self) -> Self {
        self.entry(ModuleEntry::of::<M>())
    }

    /// Register every module marked with `#[deferral_module]`, sorted by name
    /// and skipping any already registered.
    pub fn discover(mut self) -> Self {
        let mut found: Vec<ModuleEntry> = MODULES.iter().map(|f| f()).collect();
        found.sort_by_key(|entry| entry.name);
        for entry in found {
            self = self.entry(entry);
        }
        self
    }

    fn entry(mut self, entry: ModuleEntry) -> Self {
        if self.entries.iter().any(|known| known.name == entry.name) {
            return self;
        }
        self.entries.push(entry);
        self
    }

    /// Build the host (does not load anything yet)
    pub fn build(self) -> ModuleHost {
        info!(modules = self.entries.len(), "building module host");
        ModuleHost {
            config: self.config,
            entries: self.entries,
        }
    }
}

/// Configured host ready to load its modules
pub struct ModuleHost {
    config: Arc<Config>,
    entries: Vec<ModuleEntry>,
}

impl ModuleHost {
    pub fn module_names(&self) -> Vec<&'static str> {
        self.entries.iter().map(|entry| entry.name).collect()
    }

    /// Run every module's start-of-life entry point.
    ///
    /// A module whose `init` fails is logged, recorded in
    /// [`LoadedModules::failed`] and left disabled; the rest still load.
    pub fn load(self) -> LoadedModules {
        let mut loaded: Vec<Box<dyn LoadedModule>> = Vec::new();
        let mut failed = Vec::new();

        for entry in self.entries {
            match (entry.loader)(&self.config) {
                Ok(module) => {
                    info!(module = entry.name, "module loaded");
                    loaded.push(module);
                }
                Err(e) => {
                    error!(
                        module = entry.name,
                        error = %e,
                        "module failed to load; feature disabled"
                    );
                    failed.push((entry.name, e));
                }
            }
        }

        info!(loaded = loaded.len(), failed = failed.len(), "module host started");
        LoadedModules { loaded, failed }
    }
}

/// Handle for the loaded modules
/// Used to unload them
pub struct LoadedModules {
    loaded: Vec<Box<dyn LoadedModule>>,
    failed: Vec<(&'static str, ModuleError)>,
}

impl LoadedModules {
    pub fn names(&self) -> Vec<&'static str> {
        self.loaded.iter().map(|module| module.name()).collect()
    }

    pub fn failed(&self) -> &[(&'static str, ModuleError)] {
        &self.failed
    }

    /// Run every loaded module's end-of-life entry point, newest first.
    pub fn unload(self) {
        for module in self.loaded.into_iter().rev() {
            module.exit();
        }
        info!("all modules unloaded");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::testing::wait_for;
    use crate::{CooperativeTask, TaskState};
    use config::{File, FileFormat};
    use parking_lot::Mutex;
    use serde::Deserialize;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    static EVENTS: Mutex<Vec<String>> = Mutex::new(Vec::new());
    static TICKS: AtomicUsize = AtomicUsize::new(0);

    fn record(event: impl Into<String>) {
        EVENTS.lock().push(event.into());
    }

    #[derive(Debug, Default, Deserialize)]
    #[serde(default)]
    struct TickParams {
        times: usize,
    }

    struct Ticker {
        task: CooperativeTask,
    }

    impl DeferralModule for Ticker {
        const NAME: &'static str = "host_test_ticker";
        type Params = TickParams;

        fn init(params: TickParams) -> Result<Self, ModuleError> {
            record(format!("init ticker {}", params.times));
            let task = CooperativeTask::new("ticker", || {
                TICKS.fetch_add(1, Ordering::SeqCst);
            });
            for _ in 0..params.times {
                task.schedule();
            }
            Ok(Self { task })
        }

        fn exit(self) {
            self.task.kill();
            assert_eq!(self.task.state(), TaskState::Idle);
            record("exit ticker");
        }
    }

    struct Quiet;

    impl DeferralModule for Quiet {
        const NAME: &'static str = "host_test_quiet";
        type Params = TickParams;

        fn init(_: TickParams) -> Result<Self, ModuleError> {
            record("init quiet");
            Ok(Quiet)
        }

        fn exit(self) {
            record("exit quiet");
        }
    }

    struct Broken;

    impl DeferralModule for Broken {
        const NAME: &'static str = "host_test_broken";
        type Params = TickParams;

        fn init(_: TickParams) -> Result<Self, ModuleError> {
            Err(ModuleError::Init {
                module: Self::NAME,
                reason: "no resources".into(),
            })
        }

        fn exit(self) {
            record("exit broken");
        }
    }

    #[test]
    fn test_load_and_unload_lifecycle() {
        let config = Config::builder()
            .add_source(File::from_str(
                "[host_test_ticker]\ntimes = 2\n",
                FileFormat::Toml,
            ))
            .build()
            .unwrap();

        let host = ModuleHostBuilder::with_config(config)
            .module::<Ticker>()
            .module::<Broken>()
            .module::<Quiet>()
            .module::<Ticker>()
            .build();
        assert_eq!(
            host.module_names(),
            vec!["host_test_ticker", "host_test_broken", "host_test_quiet"]
        );

        let loaded = host.load();
        assert_eq!(loaded.names(), vec!["host_test_ticker", "host_test_quiet"]);
        assert_eq!(loaded.failed().len(), 1);
        assert_eq!(loaded.failed()[0].0, "host_test_broken");

        assert!(wait_for(Duration::from_secs(5), || TICKS.load(Ordering::SeqCst) >= 1));
        loaded.unload();

        let events = EVENTS.lock().clone();
        assert_eq!(
            events,
            vec!["init ticker 2", "init quiet", "exit quiet", "exit ticker"]
        );
        let ticks = TICKS.load(Ordering::SeqCst);
        assert!((1..=2).contains(&ticks));
    }

    #[test]
    fn test_invalid_params_disable_module() {
        let config = Config::builder()
            .add_source(File::from_str(
                "[host_test_quiet]\ntimes = \"many\"\n",
                FileFormat::Toml,
            ))
            .build()
            .unwrap();

        let loaded = ModuleHostBuilder::with_config(config)
            .module::<Quiet>()
            .build()
            .load();
        assert!(loaded.names().is_empty());
        assert!(matches!(
            loaded.failed()[0].1,
            ModuleError::Params { module: "host_test_quiet", .. }
        ));
        loaded.unload();
    }
}
