use chrono::Local;
use softdefer::demo::{softirq, ExSoftirq, SoftirqParams};
use softdefer::ModuleHostBuilder;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_thread_names(true)
        .init();

    let defaults = SoftirqParams::default();
    println!(
        "[{}] 🚀 Loading ex_softirq: {} callback(s), {:?} apart",
        Local::now().format("%H:%M:%S%.3f"),
        defaults.times,
        defaults.spacing
    );

    let loaded = ModuleHostBuilder::with_env()?
        .module::<ExSoftirq>()
        .build()
        .load();

    loaded.unload();

    println!(
        "[{}] ✅ Unloaded. The callback ran {} time(s); duplicate requests coalesce.",
        Local::now().format("%H:%M:%S%.3f"),
        softirq::executions()
    );
    Ok(())
}
