//! Standalone owner process
//!
//! Creates a hatch and prints every message that arrives. Pair it with the
//! attacher demo in a second terminal.

use std::io::{self, BufRead};

use memhatch::{Endpoint, HatchConfig};

fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let name = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "memhatch_demo".to_string());
    let capacity = std::env::args()
        .nth(2)
        .and_then(|arg| arg.parse().ok())
        .unwrap_or(1024);

    println!("╔══════════════════════════════════════════════════╗");
    println!("║                memhatch Owner                    ║");
    println!("╚══════════════════════════════════════════════════╝");
    println!();
    println!("[Owner] Creating hatch: {}", name);

    let owner = match Endpoint::create(HatchConfig {
        capacity,
        auto_clear: true,
        ..HatchConfig::new(name.clone())
    }) {
        Ok(endpoint) => endpoint,
        Err(e) => {
            eprintln!("[Owner] Failed to create hatch: {}", e);
            std::process::exit(1);
        }
    };
    println!(
        "[Owner] Hatch up ({} byte capacity, {} bytes mapped)",
        owner.capacity(),
        owner.total_mapped_size()
    );

    owner
        .on_message(|payload, info| {
            println!(
                "[Owner] {} bytes on '{}': {}",
                payload.len(),
                info.name,
                String::from_utf8_lossy(payload)
            );
        })
        .expect("register callback");

    println!("[Owner] Waiting for messages... (press Enter to quit)");
    println!();

    let mut line = String::new();
    let _ = io::stdin().lock().read_line(&mut line);

    println!("[Owner] Shutting down");
}
