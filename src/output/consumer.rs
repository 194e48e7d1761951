//! Event consumer
//!
//! Drains the event channel on its own schedule and renders each event.
//! The loop ends once every sender is gone and the buffered events have
//! been written, so nothing published before shutdown is lost.

use anyhow::Result;
use log::debug;
use tokio::sync::mpsc;

use crate::models::ProcessEvent;
use crate::output::EventWriter;

pub struct EventConsumer {
    rx: mpsc::Receiver<ProcessEvent>,
    writer: EventWriter,
}

impl EventConsumer {
    pub fn new(rx: mpsc::Receiver<ProcessEvent>, writer: EventWriter) -> Self {
        Self { rx, writer }
    }

    /// Render events until the channel closes. Returns the number rendered.
    pub async fn run(mut self) -> Result<u64> {
        let mut rendered = 0;

        while let Some(event) = self.rx.recv().await {
            self.writer.write_event(&event)?;
            rendered += 1;
        }

        self.writer.flush()?;
        debug!("Event channel closed after {} events", rendered);
        Ok(rendered)
    }
}
