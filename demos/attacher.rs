//! Standalone attacher process
//!
//! Joins an existing hatch by name and sends each stdin line as one message.
//! Start the owner demo first, or let this one retry until it appears.

use std::io::{self, BufRead, Write};
use std::time::Duration;

use memhatch::{Endpoint, HatchConfig, HatchError};

fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let name = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "memhatch_demo".to_string());

    println!("╔══════════════════════════════════════════════════╗");
    println!("║               memhatch Attacher                  ║");
    println!("╚══════════════════════════════════════════════════╝");
    println!();
    println!("[Attacher] Joining hatch: {}", name);

    // The owner may not be up yet; a missing segment is the retry signal,
    // anything else is fatal.
    let attacher = loop {
        match Endpoint::attach(HatchConfig {
            auto_clear: true,
            ..HatchConfig::new(name.clone())
        }) {
            Ok(endpoint) => break endpoint,
            Err(HatchError::SegmentNotFound { .. }) => {
                println!("[Attacher] Hatch '{}' not up yet, retrying...", name);
                std::thread::sleep(Duration::from_millis(500));
            }
            Err(e) => {
                eprintln!("[Attacher] Failed to attach: {}", e);
                std::process::exit(1);
            }
        }
    };

    println!(
        "[Attacher] Joined '{}' ({} byte capacity)",
        attacher.name(),
        attacher.capacity()
    );
    println!("[Attacher] Type a line to send it; 'exit' quits");
    println!();

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!(">>> ");
        stdout.flush().unwrap();

        let mut input = String::new();
        if stdin.lock().read_line(&mut input).unwrap_or(0) == 0 {
            break;
        }

        let input = input.trim();
        if input.is_empty() {
            continue;
        }
        if input == "exit" {
            break;
        }

        match attacher.write(input.as_bytes()) {
            Ok(()) => println!("[Attacher] Sent {} bytes", input.len()),
            Err(e) => eprintln!("[Attacher] Send failed: {}", e),
        }
    }

    println!("[Attacher] Goodbye");
}
