//! Display coordinator - single critical section for all display writers
//!
//! The sensor loop publishes free-slot counts and the access controller
//! publishes transient messages. Both go through one async mutex that covers
//! computing the desired lines and rendering them, so a render is never
//! interleaved with another writer.
//!
//! - Only rows whose content changed are written to the driver.
//! - A message holds the display for its duration hint; count updates that
//!   arrive meanwhile are skipped and picked up by the next sample after the
//!   hold expires. Messages are never held back.

use crate::domain::error::DisplayError;
use crate::infra::metrics::Metrics;
use crate::io::drivers::DisplayDriver;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// Who produced the content currently on the display
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplaySource {
    Blank,
    SensorCount,
    Message,
}

#[derive(Debug, Clone)]
pub struct DisplayState {
    /// Rendered rows, padded to the display width
    pub lines: Vec<String>,
    pub source: DisplaySource,
    pub last_write_at: Option<Instant>,
    held_until: Option<Instant>,
}

pub struct DisplayCoordinator {
    driver: Arc<dyn DisplayDriver>,
    state: Mutex<DisplayState>,
    cols: usize,
    rows: usize,
    metrics: Arc<Metrics>,
}

impl DisplayCoordinator {
    pub fn new(driver: Arc<dyn DisplayDriver>, cols: usize, rows: usize, metrics: Arc<Metrics>) -> Self {
        let rows = rows.max(1);
        let state = DisplayState {
            lines: vec![" ".repeat(cols); rows],
            source: DisplaySource::Blank,
            last_write_at: None,
            held_until: None,
        };
        Self { driver, state: Mutex::new(state), cols, rows, metrics }
    }

    /// Show the free-slot count; returns whether anything was rendered
    pub async fn show_count(&self, count: u32) -> Result<bool, DisplayError> {
        let desired = self.layout(&format!("Free slots: {count}"));
        let mut state = self.state.lock().await;

        if let Some(held_until) = state.held_until {
            if Instant::now() < held_until {
                debug!(count = count, "display_count_held");
                return Ok(false);
            }
            state.held_until = None;
        }

        let written = self.render(&mut state, desired).await?;
        if written > 0 {
            state.source = DisplaySource::SensorCount;
        }
        Ok(written > 0)
    }

    /// Show a transient message immediately and hold it for `duration_hint`
    pub async fn show_message(&self, text: &str, duration_hint: Duration) -> Result<(), DisplayError> {
        let desired = self.layout(text);
        let mut state = self.state.lock().await;

        self.render(&mut state, desired).await?;
        state.source = DisplaySource::Message;
        state.held_until = Some(Instant::now() + duration_hint);
        Ok(())
    }

    /// Blank the display
    pub async fn clear(&self) -> Result<(), DisplayError> {
        let mut state = self.state.lock().await;
        self.driver.clear().await?;
        self.metrics.record_display_write();

        state.lines = vec![" ".repeat(self.cols); self.rows];
        state.source = DisplaySource::Blank;
        state.held_until = None;
        state.last_write_at = Some(Instant::now());
        Ok(())
    }

    pub async fn state(&self) -> DisplayState {
        self.state.lock().await.clone()
    }

    /// Split text into display rows, truncated and padded to the width
    fn layout(&self, text: &str) -> Vec<String> {
        let mut lines: Vec<String> = text
            .lines()
            .take(self.rows)
            .map(|line| format!("{:<width$}", line.chars().take(self.cols).collect::<String>(), width = self.cols))
            .collect();
        lines.resize(self.rows, " ".repeat(self.cols));
        lines
    }

    /// Write changed rows; returns how many rows were written
    async fn render(&self, state: &mut DisplayState, desired: Vec<String>) -> Result<usize, DisplayError> {
        let mut written = 0;
        for (row, line) in desired.iter().enumerate() {
            if state.lines.get(row) == Some(line) {
                continue;
            }
            self.driver.write_line(row, line).await?;
            self.metrics.record_display_write();
            state.lines[row] = line.clone();
            written += 1;
        }

        if written > 0 {
            state.last_write_at = Some(Instant::now());
        }
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::sim::RecordingDisplay;

    fn coordinator() -> (Arc<RecordingDisplay>, DisplayCoordinator) {
        let driver = Arc::new(RecordingDisplay::new());
        let display = DisplayCoordinator::new(driver.clone(), 16, 2, Arc::new(Metrics::new()));
        (driver, display)
    }

    #[tokio::test]
    async fn test_unchanged_count_is_not_rewritten() {
        let (driver, display) = coordinator();
        assert!(display.show_count(5).await.unwrap());
        assert!(!display.show_count(5).await.unwrap());
        assert_eq!(driver.writes(), vec![(0, "Free slots: 5   ".to_string())]);
    }

    #[tokio::test]
    async fn test_changed_counts_written_in_order() {
        let (driver, display) = coordinator();
        display.show_count(4).await.unwrap();
        display.show_count(5).await.unwrap();
        let rows: Vec<String> = driver.writes().into_iter().map(|(_, t)| t).collect();
        assert_eq!(rows, vec!["Free slots: 4   ", "Free slots: 5   "]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_message_holds_off_count_updates() {
        let (driver, display) = coordinator();
        display.show_count(3).await.unwrap();
        display.show_message("Welcome\nP123", Duration::from_secs(2)).await.unwrap();
        assert_eq!(display.state().await.source, DisplaySource::Message);

        assert!(!display.show_count(2).await.unwrap());
        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(display.show_count(2).await.unwrap());

        let state = display.state().await;
        assert_eq!(state.source, DisplaySource::SensorCount);
        assert_eq!(state.lines[0].trim_end(), "Free slots: 2");
        assert_eq!(state.lines[1].trim_end(), "");
        // count, two message rows, then count row 0 and blank row 1
        assert_eq!(driver.writes().len(), 5);
    }

    #[tokio::test]
    async fn test_long_message_truncated_to_width() {
        let (driver, display) = coordinator();
        display.show_message("Access denied for everyone", Duration::ZERO).await.unwrap();
        assert_eq!(driver.writes(), vec![(0, "Access denied fo".to_string())]);
    }

    #[tokio::test]
    async fn test_clear_blanks_state() {
        let (driver, display) = coordinator();
        display.show_count(1).await.unwrap();
        display.clear().await.unwrap();
        assert_eq!(driver.clears(), 1);
        assert_eq!(display.state().await.source, DisplaySource::Blank);

        // Same count renders again after a clear
        assert!(display.show_count(1).await.unwrap());
    }
}
