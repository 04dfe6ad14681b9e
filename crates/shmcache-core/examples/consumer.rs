//! Worker side: attach to a published segment and read it in place
//!
//! ```bash
//! cargo run --example consumer -- /tmp/shmcache_demo.json
//! ```

use shmcache_core::{Buffer, Complex64, SharedBuffer, SharedBufferCodec, SharedHandle};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let handle_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "/tmp/shmcache_demo.json".to_string());
    let handle: SharedHandle = serde_json::from_str(&std::fs::read_to_string(&handle_path)?)?;

    let buffer = Buffer::Shared(SharedBuffer::attach(&handle)?);
    let view = SharedBufferCodec::import(&buffer)?;
    println!(
        "Attached {} owned by pid {}: {:?} {:?}",
        handle.name,
        handle.owner,
        view.dtype(),
        view.shape()
    );

    if let Some(values) = view.as_slice::<Complex64>() {
        for (i, value) in values.iter().take(4).enumerate() {
            println!("  [{}] = {} {:+}i", i, value.re, value.im);
        }
    }

    Ok(())
}
