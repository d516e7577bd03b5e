use std::time::Duration;

use chrono::Local;
use softdefer::demo::{workqueue, ExWorkqueue};
use softdefer::ModuleHostBuilder;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_thread_names(true)
        .init();

    println!("[{}] 🚀 Loading ex_workqueue", Local::now().format("%H:%M:%S%.3f"));

    let loaded = ModuleHostBuilder::with_env()?
        .module::<ExWorkqueue>()
        .build()
        .load();

    // Long enough for the default 200ms delayed item to fire.
    std::thread::sleep(Duration::from_millis(400));
    loaded.unload();

    let runs = workqueue::executions();
    println!("\n📊 RESULTS:");
    println!("   System work:    {} run(s)", runs.system);
    println!("   Delayed work:   {} run(s)", runs.delayed);
    println!("   Dedicated work: {} run(s)", runs.dedicated);
    println!(
        "[{}] ✅ All work flushed, dedicated pool destroyed",
        Local::now().format("%H:%M:%S%.3f")
    );
    Ok(())
}
