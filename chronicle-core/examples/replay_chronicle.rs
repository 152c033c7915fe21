//! Replay a chronicle from a text file and print what the engine tracked.
//!
//! Events are separated by lines containing only `---`. Without a file a short
//! built-in chronicle is replayed.
//!
//! ```text
//! RUST_LOG=chronicle_core=debug cargo run --example replay_chronicle -- events.txt
//! ```

use chronicle_core::persist::readable_summary;
use chronicle_core::{ChronicleSession, Chronicler, ScriptedGenerator, SessionConfig};
use tracing_subscriber::{fmt, EnvFilter};

const BUILT_IN: &str = "\
King Alaric and Queen Lyra ruled the realm of Vael together, but the northern lords grew restless.
---
King Alaric was assassinated by a hidden blade during the winter feast.
---
Queen Lyra mourned King Alaric's passing as the court fell into turmoil.
---
Queen Lyra rallied the loyal houses and rode north to face the rebels.
---
Through an ancient ritual, King Alaric was resurrected beneath the old oak.
";

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let script = match std::env::args().nth(1) {
        Some(path) => tokio::fs::read_to_string(path).await?,
        None => BUILT_IN.to_string(),
    };
    let events: Vec<&str> = script
        .split("\n---")
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .collect();

    let config = SessionConfig::new("Replay").with_max_attempts(1);
    let mut chronicler = Chronicler::new(
        ScriptedGenerator::new(events.iter().copied()),
        ChronicleSession::new(config),
    );

    for _ in 0..events.len() {
        let outcome = chronicler.next_event().await?;
        let report = &outcome.report;
        println!("Event {}", report.event_number);
        for character in &report.introduced {
            println!("  + {} ({})", character.name, character.role);
        }
        for change in &report.changes {
            println!("  * {} {}: {}", change.character, change.kind, change.detail);
        }
        for violation in &report.usage.violations {
            println!("  ! {violation}");
        }
    }

    println!();
    println!("{}", readable_summary(chronicler.session()));
    Ok(())
}
