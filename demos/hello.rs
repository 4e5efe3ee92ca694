//! Hello round trip: owner and attacher in one process
//!
//! The owner creates the hatch and listens; the attacher joins the same
//! name and sends a greeting. Run with an optional hatch name argument.

use std::sync::mpsc;
use std::time::Duration;

use memhatch::{Endpoint, HatchConfig};

fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let name = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "memhatch_hello".to_string());

    println!("╔══════════════════════════════════════════════════╗");
    println!("║              memhatch Hello Round Trip           ║");
    println!("╚══════════════════════════════════════════════════╝");
    println!();

    let owner = match Endpoint::create(HatchConfig {
        capacity: 1024,
        auto_clear: true,
        ..HatchConfig::new(name.clone())
    }) {
        Ok(endpoint) => endpoint,
        Err(e) => {
            eprintln!("[Hello] Failed to create hatch '{}': {}", name, e);
            std::process::exit(1);
        }
    };
    println!(
        "[Hello] Owner up: name={} capacity={} mapped={} owner={}",
        owner.name(),
        owner.capacity(),
        owner.total_mapped_size(),
        owner.is_owner()
    );

    let attacher = match Endpoint::attach(HatchConfig {
        auto_clear: true,
        ..HatchConfig::new(name.clone())
    }) {
        Ok(endpoint) => endpoint,
        Err(e) => {
            eprintln!("[Hello] Failed to attach to '{}': {}", name, e);
            std::process::exit(1);
        }
    };
    println!(
        "[Hello] Attacher up: capacity={} mapped={} owner={}",
        attacher.capacity(),
        attacher.total_mapped_size(),
        attacher.is_owner()
    );
    println!();

    let (tx, rx) = mpsc::channel();
    owner
        .on_message(move |payload, info| {
            println!(
                "[Hello] '{}' ({}) received {} bytes: {}",
                info.name,
                if info.is_owner { "owner" } else { "attacher" },
                payload.len(),
                String::from_utf8_lossy(payload)
            );
            tx.send(()).ok();
        })
        .expect("register callback");

    println!("[Hello] Attacher sending greeting...");
    attacher.write(b"Hello from Client!").expect("write greeting");

    match rx.recv_timeout(Duration::from_secs(2)) {
        Ok(()) => println!("[Hello] Round trip complete"),
        Err(_) => eprintln!("[Hello] No delivery within 2s"),
    }

    // The attacher goes first; the owner's drop unlinks the OS names.
    drop(attacher);
    drop(owner);
    println!("[Hello] Done");
}
