use std::time::Duration;

use chrono::Local;
use softdefer::demo::{tasklets, ExTasklets};
use softdefer::ModuleHostBuilder;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_thread_names(true)
        .init();

    println!("[{}] 🚀 Loading ex_tasklets", Local::now().format("%H:%M:%S%.3f"));

    let loaded = ModuleHostBuilder::with_env()?
        .module::<ExTasklets>()
        .build()
        .load();

    std::thread::sleep(Duration::from_millis(100));
    loaded.unload();

    println!(
        "[{}] ✅ Unloaded. Tasklet executions: {}, state now {:?}",
        Local::now().format("%H:%M:%S%.3f"),
        tasklets::executions(),
        tasklets::DEMO_TASKLET.state()
    );
    Ok(())
}
