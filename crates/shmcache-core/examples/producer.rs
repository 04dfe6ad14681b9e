//! Coordinator side: export an array and publish its handle
//!
//! Run this, then run the consumer with the printed handle file:
//! ```bash
//! cargo run --example producer
//! cargo run --example consumer -- /tmp/shmcache_demo.json
//! ```

use shmcache_core::{Address, Array, Complex64, ProcessRegistry, SharedBufferCodec};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let registry = Arc::new(ProcessRegistry::new("ddf"));
    let codec = SharedBufferCodec::new(registry);

    let values: Vec<Complex64> = (0..16)
        .map(|i| Complex64::new(i as f64, 1.0 / (i as f64 + 1.0)))
        .collect();
    let grid = Array::from_vec(&[4, 4], values)?;
    let shared = codec.export(&Address::new("Grid").with("facet", 0), &grid)?;

    let handle_path = "/tmp/shmcache_demo.json";
    std::fs::write(handle_path, serde_json::to_string_pretty(&shared.handle())?)?;
    println!("Exported {} ({} primitives)", shared.name(), shared.len());
    println!("Handle written to {}", handle_path);

    // keep serving for a while, then clean up everything this process exported
    println!("\nSegment is alive for 60s...");
    thread::sleep(Duration::from_secs(60));

    let removed = codec.sweep()?;
    println!("Swept {} segment(s)", removed);
    Ok(())
}
