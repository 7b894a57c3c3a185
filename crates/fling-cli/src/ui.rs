//! Terminal output for transfer events.

use fling_core::events::{Direction, EventBus, StatusEvent};
use fling_core::files::format_size;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

/// Spawn a task that prints events from the bus until it closes.
///
/// With `quiet` set, progress lines are suppressed; completions and
/// errors still print. Falling behind a large batch drops the oldest
/// events but keeps the printer alive.
pub fn spawn_printer(events: &EventBus, quiet: bool) -> JoinHandle<()> {
    let mut rx = events.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => print_event(&event, quiet),
                Err(RecvError::Lagged(missed)) => {
                    eprintln!("  ({missed} status update(s) skipped)");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

fn print_event(event: &StatusEvent, quiet: bool) {
    match event {
        StatusEvent::ClientConnected { ip } => {
            println!("  Peer connected: {ip}");
        }
        StatusEvent::Progress {
            name,
            percent,
            direction,
        } => {
            if !quiet {
                let verb = match direction {
                    Direction::Send => "Sending",
                    Direction::Receive => "Receiving",
                };
                println!("  {verb} {name}: {percent}%");
            }
        }
        StatusEvent::FileCompleted {
            name,
            size,
            direction,
        } => {
            let verb = match direction {
                Direction::Send => "Sent",
                Direction::Receive => "Received",
            };
            println!("  {verb} {name} ({})", format_size(*size));
        }
        StatusEvent::FileFailed { name, message } => {
            eprintln!("  Failed {name}: {message}");
        }
        StatusEvent::BatchCompleted => {
            if !quiet {
                println!("  All offered files processed.");
            }
        }
        StatusEvent::ServerError { message } => {
            eprintln!("  Error: {message}");
        }
        StatusEvent::Log { message } => {
            if !quiet {
                println!("  {message}");
            }
        }
    }
}

/// Print the standard banner.
pub fn banner() {
    println!();
    println!("Fling v{}", fling_core::VERSION);
    println!("{}", "-".repeat(37));
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_printer_survives_event_overflow() {
        let events = EventBus::new();
        let handle = spawn_printer(&events, true);

        // Flood well past the bus capacity before the printer task gets
        // scheduled, forcing it to observe a lagged receiver.
        for i in 0..1000u32 {
            events.publish(StatusEvent::Progress {
                name: "big.bin".to_string(),
                percent: u8::try_from(i % 100).unwrap(),
                direction: Direction::Receive,
            });
        }

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!handle.is_finished(), "printer exited after lagging");

        // Dropping the bus closes the channel, which ends the task.
        drop(events);
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("printer did not stop on close")
            .unwrap();
    }
}
