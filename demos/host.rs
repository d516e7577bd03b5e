use std::time::Duration;

use chrono::Local;
use softdefer::demo::{ExSoftirq, ExTasklets, ExWorkqueue};
use softdefer::ModuleHostBuilder;
use tracing_subscriber::EnvFilter;

/// Loads the demo modules, plus anything else marked `#[deferral_module]`,
/// with parameters from `demos/config/softdefer.toml`. Lets the deferred
/// work play out, then unloads in reverse order.
fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_thread_names(true)
        .init();

    let config_path = concat!(env!("CARGO_MANIFEST_DIR"), "/../demos/config/softdefer.toml");
    let host = ModuleHostBuilder::with_toml(config_path)?
        .module::<ExSoftirq>()
        .module::<ExTasklets>()
        .module::<ExWorkqueue>()
        .discover()
        .build();
    println!(
        "[{}] 🚀 Loading modules: {:?}",
        Local::now().format("%H:%M:%S%.3f"),
        host.module_names()
    );

    let loaded = host.load();
    for (module, error) in loaded.failed() {
        println!("   ⚠️  {module} disabled: {error}");
    }

    std::thread::sleep(Duration::from_millis(500));

    println!("[{}] 🧹 Unloading {:?}", Local::now().format("%H:%M:%S%.3f"), loaded.names());
    loaded.unload();
    Ok(())
}
