//! Monitor orchestration
//!
//! Wires the collector and the event consumer together over one bounded
//! channel, owns the shutdown signal, and joins both tasks on stop.

use anyhow::{anyhow, Result};
use log::info;
use tokio::signal;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};

use crate::config::MonitorConfiguration;
use crate::filter::ProcessFilter;
use crate::logging::{log_shutdown, log_task_error};
use crate::monitor::{Collector, CollectorSummary, DiffEngine, DiffSettings, ProcessSource, Shutdown, ShutdownSender};
use crate::output::{EventConsumer, EventWriter};

/// Running collector + consumer pair
pub struct ProcessMonitor {
    shutdown: ShutdownSender,
    collector_task: JoinHandle<CollectorSummary>,
    consumer_task: JoinHandle<Result<u64>>,
}

/// What the monitor did before it stopped
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MonitorReport {
    pub collector: CollectorSummary,
    pub events_rendered: u64,
}

impl ProcessMonitor {
    /// Spawn both tasks. `config` must already be validated.
    pub fn start<S>(config: &MonitorConfiguration, source: S, writer: EventWriter) -> Self
    where
        S: ProcessSource + 'static,
    {
        let (tx_events, rx_events) = mpsc::channel(config.general.event_buffer.max(1));
        let (shutdown, rx_shutdown) = Shutdown::new();

        let collector = Collector::new(
            source,
            ProcessFilter::new(&config.filters),
            DiffEngine::new(DiffSettings::from(&config.detectors)),
            tx_events,
            config.polling_duration(),
        )
        .with_report_existing(config.general.report_existing);

        let collector_task = tokio::spawn(collector.run(rx_shutdown));
        let consumer_task = tokio::spawn(EventConsumer::new(rx_events, writer).run());

        Self {
            shutdown,
            collector_task,
            consumer_task,
        }
    }

    /// Signal shutdown, then wait for the poll loop to exit and the
    /// consumer to drain whatever was already published
    pub async fn stop(self) -> Result<MonitorReport> {
        self.shutdown.send_signal();

        let collector = self
            .collector_task
            .await
            .map_err(|e| anyhow!("Collector task failed: {}", e))?;

        let events_rendered = self
            .consumer_task
            .await
            .map_err(|e| anyhow!("Event consumer task failed: {}", e))??;

        Ok(MonitorReport {
            collector,
            events_rendered,
        })
    }

    /// Run until Ctrl+C / SIGTERM, or until the consumer fails
    pub async fn run_until_shutdown(mut self) -> Result<MonitorReport> {
        let reason = tokio::select! {
            _ = shutdown_signal() => "Received shutdown signal",
            result = &mut self.consumer_task => {
                // The consumer only ends early on an output error
                self.shutdown.send_signal();
                return finish_after_consumer_exit(self.collector_task, result).await;
            }
        };

        info!("{}, stopping monitor", reason);
        let report = self.stop().await?;
        log_shutdown(reason, Some(&report.collector));
        Ok(report)
    }
}

/// Join the collector after the consumer ended on its own. A failure of
/// either task is logged and returned.
async fn finish_after_consumer_exit(
    collector_task: JoinHandle<CollectorSummary>,
    consumer: Result<Result<u64>, JoinError>,
) -> Result<MonitorReport> {
    let collector = collector_task
        .await
        .map_err(|e| anyhow!("Collector task failed: {}", e));
    let consumer = consumer
        .map_err(|e| anyhow!("Event consumer task failed: {}", e))
        .and_then(|rendered| rendered);

    match (collector, consumer) {
        (Ok(collector), Ok(events_rendered)) => {
            log_shutdown("Event consumer ended", Some(&collector));
            Ok(MonitorReport {
                collector,
                events_rendered,
            })
        }
        (Ok(collector), Err(error)) => {
            log_task_error("Event consumer", &format!("{:#}", error));
            log_shutdown("Event consumer failed", Some(&collector));
            Err(error)
        }
        (Err(error), Ok(_)) => {
            log_task_error("Collector", &format!("{:#}", error));
            log_shutdown("Collector failed", None);
            Err(error)
        }
        (Err(collector_error), Err(error)) => {
            log_task_error("Collector", &format!("{:#}", collector_error));
            log_task_error("Event consumer", &format!("{:#}", error));
            log_shutdown("Event consumer failed", None);
            Err(error)
        }
    }
}

/// Resolves on Ctrl+C, or SIGTERM on Unix
async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
