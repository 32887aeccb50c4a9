//! Console command feed for the simulator drivers
//!
//! Protocol, one command per line:
//! - `plate <text>` - raw recognizer text for the next camera frame
//! - `tag <id>` - tag identifier presented to the reader
//! - `sensors <n>` - number of active occupancy sensors

use crate::io::sim::SharedSensorArray;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Plate(String),
    Tag(String),
    Sensors(u32),
}

impl ConsoleCommand {
    /// Parse one input line; `None` for blank or unrecognized lines
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        let (verb, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        let rest = rest.trim();

        match verb.to_ascii_lowercase().as_str() {
            // Plate text is kept raw: normalization is the core's job
            "plate" if !rest.is_empty() => Some(ConsoleCommand::Plate(rest.to_string())),
            "tag" if !rest.is_empty() => Some(ConsoleCommand::Tag(rest.to_string())),
            "sensors" => rest.parse().ok().map(ConsoleCommand::Sensors),
            _ => None,
        }
    }
}

/// Destinations for parsed console commands
pub struct ConsoleFeed {
    pub plate_tx: mpsc::Sender<String>,
    pub tag_tx: mpsc::Sender<String>,
    pub sensors: Arc<SharedSensorArray>,
}

impl ConsoleFeed {
    fn dispatch(&self, command: ConsoleCommand) -> bool {
        let result = match command {
            ConsoleCommand::Plate(text) => self.plate_tx.try_send(text),
            ConsoleCommand::Tag(tag) => self.tag_tx.try_send(tag),
            ConsoleCommand::Sensors(n) => {
                self.sensors.set(n);
                Ok(())
            }
        };

        match result {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!("console_command_dropped: channel full");
                true
            }
            Err(TrySendError::Closed(_)) => {
                warn!("console_channel_closed");
                false
            }
        }
    }
}

/// Read commands until EOF or shutdown
pub async fn run_console_feed<R>(
    reader: R,
    feed: ConsoleFeed,
    mut shutdown: watch::Receiver<bool>,
) where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    info!("console_feed_started");

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            }
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(e) => {
                        warn!(error = %e, "console_read_failed");
                        break;
                    }
                };

                match ConsoleCommand::parse(&line) {
                    Some(command) => {
                        debug!(command = ?command, "console_command");
                        if !feed.dispatch(command) {
                            break;
                        }
                    }
                    None if !line.trim().is_empty() => {
                        warn!(line = %line.trim(), "console_unknown_command");
                    }
                    None => {}
                }
            }
        }
    }

    info!("console_feed_stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::drivers::SensorArray;

    #[test]
    fn test_parse_commands() {
        assert_eq!(
            ConsoleCommand::parse("plate p 1-2-3"),
            Some(ConsoleCommand::Plate("p 1-2-3".to_string()))
        );
        assert_eq!(ConsoleCommand::parse("TAG 584190"), Some(ConsoleCommand::Tag("584190".into())));
        assert_eq!(ConsoleCommand::parse("sensors 7"), Some(ConsoleCommand::Sensors(7)));
        assert_eq!(ConsoleCommand::parse("sensors many"), None);
        assert_eq!(ConsoleCommand::parse("plate"), None);
        assert_eq!(ConsoleCommand::parse(""), None);
    }

    #[tokio::test]
    async fn test_feed_dispatches_until_eof() {
        let (plate_tx, mut plate_rx) = mpsc::channel(8);
        let (tag_tx, mut tag_rx) = mpsc::channel(8);
        let sensors = Arc::new(SharedSensorArray::default());
        let feed = ConsoleFeed { plate_tx, tag_tx, sensors: sensors.clone() };
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        let input: &[u8] = b"plate P123\nbogus\ntag 77\nsensors 4\n";
        run_console_feed(input, feed, shutdown_rx).await;

        assert_eq!(plate_rx.recv().await, Some("P123".to_string()));
        assert_eq!(tag_rx.recv().await, Some("77".to_string()));
        assert_eq!(sensors.sample_all(), 4);
    }
}
