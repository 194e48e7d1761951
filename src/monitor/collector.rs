//! Poll loop
//!
//! Each tick enumerates the process table through the filter into a fresh
//! snapshot, diffs it against the retained snapshot, swaps the retained
//! snapshot, and publishes the resulting events on the bounded channel.
//!
//! The retained snapshot lock is held only while diffing and swapping:
//! never across enumeration and never across channel sends.

use chrono::Utc;
use log::{debug, trace};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;

use crate::filter::ProcessFilter;
use crate::logging::log_tick_failure;
use crate::models::{ProcessEvent, ProcessSnapshot};
use crate::monitor::diff::DiffEngine;
use crate::monitor::shutdown::Shutdown;
use crate::monitor::source::{ProcessSource, SourceError};

/// Counters reported when the poll loop exits
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectorSummary {
    /// Ticks that completed diffing
    pub ticks: u64,
    /// Ticks aborted by a source failure
    pub failed_ticks: u64,
    /// Events handed to the channel
    pub events_published: u64,
}

/// Outcome of publishing one tick's batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Publish {
    Complete,
    Cancelled,
    ConsumerGone,
}

/// Owns the retained snapshot and drives the poll/diff/publish cycle
pub struct Collector<S: ProcessSource + 'static> {
    source: Arc<std::sync::Mutex<S>>,
    filter: Arc<ProcessFilter>,
    engine: DiffEngine,
    snapshot: Mutex<Arc<ProcessSnapshot>>,
    events: mpsc::Sender<ProcessEvent>,
    interval: Duration,
    report_existing: bool,
    baseline_established: bool,
}

impl<S: ProcessSource + 'static> Collector<S> {
    pub fn new(
        source: S,
        filter: ProcessFilter,
        engine: DiffEngine,
        events: mpsc::Sender<ProcessEvent>,
        interval: Duration,
    ) -> Self {
        Self {
            source: Arc::new(std::sync::Mutex::new(source)),
            filter: Arc::new(filter),
            engine,
            snapshot: Mutex::new(Arc::new(ProcessSnapshot::default())),
            events,
            interval,
            report_existing: true,
            baseline_established: false,
        }
    }

    /// When false, the first successful tick only records the baseline
    pub fn with_report_existing(mut self, report_existing: bool) -> Self {
        self.report_existing = report_existing;
        self
    }

    /// The most recently retained snapshot
    pub async fn current_snapshot(&self) -> Arc<ProcessSnapshot> {
        Arc::clone(&*self.snapshot.lock().await)
    }

    /// One full enumeration filtered into a snapshot. Runs on the blocking pool.
    pub async fn poll(&self) -> Result<ProcessSnapshot, SourceError> {
        let source = Arc::clone(&self.source);
        let filter = Arc::clone(&self.filter);

        tokio::task::spawn_blocking(move || {
            let mut source = source
                .lock()
                .map_err(|_| SourceError::Unavailable("process source lock poisoned".to_string()))?;
            capture_snapshot(&mut *source, &filter)
        })
        .await
        .map_err(|e| SourceError::Unavailable(format!("enumeration task failed: {}", e)))?
    }

    /// Poll, diff against the retained snapshot, and swap it.
    ///
    /// On error the retained snapshot is left untouched and no events are produced.
    pub async fn tick(&mut self) -> Result<Vec<ProcessEvent>, SourceError> {
        let current = Arc::new(self.poll().await?);
        let detected_at = Utc::now();

        let diff = {
            let mut retained = self.snapshot.lock().await;
            let diff = self.engine.diff(&retained, &current);
            *retained = Arc::clone(&current);
            diff
        };

        debug!(
            "Tick: {} processes in {:?}, {} created, {} terminated, {} modified",
            current.len(),
            current.scan_duration,
            diff.created.len(),
            diff.terminated.len(),
            diff.modified.len()
        );

        let first_tick = !self.baseline_established;
        self.baseline_established = true;
        if first_tick && !self.report_existing {
            debug!("Baseline established with {} processes", current.len());
            return Ok(Vec::new());
        }

        Ok(diff.into_events(detected_at))
    }

    /// Run until `shutdown` is signaled or the consumer goes away
    pub async fn run(mut self, mut shutdown: Shutdown) -> CollectorSummary {
        let mut summary = CollectorSummary::default();
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let events = match self.tick().await {
                Ok(events) => events,
                Err(e) => {
                    summary.failed_ticks += 1;
                    log_tick_failure(&e.to_string());
                    continue;
                }
            };
            summary.ticks += 1;

            let (outcome, published) = self.publish(events, &mut shutdown).await;
            summary.events_published += published;
            match outcome {
                Publish::Complete => {}
                Publish::Cancelled => break,
                Publish::ConsumerGone => {
                    debug!("Event consumer closed the channel, stopping poll loop");
                    break;
                }
            }
        }

        summary
    }

    /// Send one batch in order. Only a send that would block is raced
    /// against cancellation.
    async fn publish(&self, events: Vec<ProcessEvent>, shutdown: &mut Shutdown) -> (Publish, u64) {
        let mut published = 0;

        for event in events {
            let event = match self.events.try_send(event) {
                Ok(()) => {
                    published += 1;
                    continue;
                }
                Err(TrySendError::Closed(_)) => return (Publish::ConsumerGone, published),
                Err(TrySendError::Full(event)) => event,
            };

            tokio::select! {
                biased;
                _ = shutdown.cancelled() => return (Publish::Cancelled, published),
                sent = self.events.send(event) => {
                    if sent.is_err() {
                        return (Publish::ConsumerGone, published);
                    }
                    published += 1;
                }
            }
        }

        (Publish::Complete, published)
    }
}

/// Enumerate `source` and keep the processes `filter` accepts.
///
/// Processes that vanish or cannot be read are skipped for this snapshot only.
pub fn capture_snapshot<S>(source: &mut S, filter: &ProcessFilter) -> Result<ProcessSnapshot, SourceError>
where
    S: ProcessSource + ?Sized,
{
    let scan_start = Instant::now();
    let pids = source.enumerate()?;

    let mut processes = Vec::with_capacity(pids.len());
    for pid in pids {
        match source.attributes(pid) {
            Ok(info) => {
                if filter.should_monitor(&info) {
                    processes.push(info);
                }
            }
            Err(e) if e.is_per_process() => trace!("Skipping process {}: {}", pid, e),
            Err(e) => return Err(e),
        }
    }

    let mut snapshot = ProcessSnapshot::from_processes(processes);
    snapshot.scan_duration = scan_start.elapsed();
    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FilterSettings;
    use crate::models::{ModificationKind, Pid, ProcessInfo};
    use crate::monitor::diff::DiffSettings;
    use std::collections::{HashMap, VecDeque};

    /// Source that replays a script of process tables, repeating the last one
    struct ScriptedSource {
        frames: VecDeque<Result<Vec<ProcessInfo>, SourceError>>,
        current: HashMap<Pid, ProcessInfo>,
        vanishing: Vec<Pid>,
    }

    impl ScriptedSource {
        fn new(frames: Vec<Result<Vec<ProcessInfo>, SourceError>>) -> Self {
            Self {
                frames: frames.into(),
                current: HashMap::new(),
                vanishing: Vec::new(),
            }
        }
    }

    impl ProcessSource for ScriptedSource {
        fn enumerate(&mut self) -> Result<Vec<Pid>, SourceError> {
            let frame = if self.frames.len() > 1 {
                self.frames.pop_front()
            } else {
                self.frames.front().cloned()
            };
            let processes = frame.unwrap_or_else(|| Ok(Vec::new()))?;
            self.current = processes.into_iter().map(|p| (p.pid, p)).collect();

            let mut pids: Vec<Pid> = self.current.keys().copied().collect();
            pids.extend(self.vanishing.iter().copied());
            Ok(pids)
        }

        fn attributes(&mut self, pid: Pid) -> Result<ProcessInfo, SourceError> {
            self.current.get(&pid).cloned().ok_or(SourceError::NotFound(pid))
        }
    }

    fn process(pid: Pid, name: &str) -> ProcessInfo {
        ProcessInfo {
            pid,
            name: name.to_string(),
            username: "alice".to_string(),
            thread_count: 4,
            memory_usage_bytes: 4096,
            ..Default::default()
        }
    }

    fn collector(
        frames: Vec<Result<Vec<ProcessInfo>, SourceError>>,
        capacity: usize,
    ) -> (Collector<ScriptedSource>, mpsc::Receiver<ProcessEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        let collector = Collector::new(
            ScriptedSource::new(frames),
            ProcessFilter::allow_all(),
            DiffEngine::new(DiffSettings::default()),
            tx,
            Duration::from_millis(100),
        );
        (collector, rx)
    }

    // ==================== capture_snapshot tests ====================

    #[test]
    fn test_capture_applies_filter() {
        let mut source = ScriptedSource::new(vec![Ok(vec![process(1, "nginx"), process(2, "bash")])]);
        let filter = ProcessFilter::new(&FilterSettings {
            excluded_processes: vec![],
            included_processes: vec!["nginx".to_string()],
            excluded_users: vec![],
        });

        let snapshot = capture_snapshot(&mut source, &filter).unwrap();
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot.contains(1));
    }

    #[test]
    fn test_capture_skips_vanished_processes() {
        let mut source = ScriptedSource::new(vec![Ok(vec![process(1, "a")])]);
        source.vanishing = vec![77];

        let snapshot = capture_snapshot(&mut source, &ProcessFilter::allow_all()).unwrap();
        assert_eq!(snapshot.len(), 1);
        assert!(!snapshot.contains(77));
    }

    #[test]
    fn test_capture_propagates_enumeration_failure() {
        let mut source = ScriptedSource::new(vec![Err(SourceError::Enumeration("denied".into()))]);
        let result = capture_snapshot(&mut source, &ProcessFilter::allow_all());
        assert!(matches!(result, Err(SourceError::Enumeration(_))));
    }

    // ==================== tick tests ====================

    #[tokio::test]
    async fn test_first_tick_reports_existing_processes() {
        let (mut collector, _rx) = collector(vec![Ok(vec![process(1, "a"), process(2, "b")])], 16);

        let events = collector.tick().await.unwrap();
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| matches!(e, ProcessEvent::Created { .. })));
    }

    #[tokio::test]
    async fn test_first_tick_baseline_when_not_reporting_existing() {
        let (collector, _rx) = collector(
            vec![Ok(vec![process(1, "a")]), Ok(vec![process(1, "a"), process(2, "b")])],
            16,
        );
        let mut collector = collector.with_report_existing(false);

        assert!(collector.tick().await.unwrap().is_empty());
        assert_eq!(collector.current_snapshot().await.len(), 1);

        let events = collector.tick().await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].pid(), 2);
    }

    #[tokio::test]
    async fn test_thread_change_between_ticks() {
        let mut before = process(100, "a.exe");
        before.thread_count = 5;
        let mut after = before.clone();
        after.thread_count = 8;
        let (mut collector, _rx) = collector(vec![Ok(vec![before]), Ok(vec![after])], 16);

        collector.tick().await.unwrap();
        let events = collector.tick().await.unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].pid(), 100);
        assert_eq!(events[0].modification(), Some(ModificationKind::ThreadCount));
        assert_eq!(events[0].process().thread_count, 8);
    }

    #[tokio::test]
    async fn test_empty_enumeration_terminates_everything() {
        let (mut collector, _rx) = collector(vec![Ok(vec![process(200, "w")]), Ok(vec![])], 16);

        collector.tick().await.unwrap();
        let events = collector.tick().await.unwrap();

        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], ProcessEvent::Terminated { process, .. } if process.pid == 200));
        assert!(collector.current_snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn test_enumeration_failure_keeps_retained_snapshot() {
        let (mut collector, _rx) = collector(
            vec![
                Ok(vec![process(1, "a"), process(2, "b")]),
                Err(SourceError::Enumeration("transient".into())),
                Ok(vec![process(1, "a"), process(3, "c")]),
            ],
            16,
        );

        collector.tick().await.unwrap();
        let retained = collector.current_snapshot().await;

        assert!(collector.tick().await.is_err());
        assert!(Arc::ptr_eq(&retained, &collector.current_snapshot().await));

        // The next tick compares against the snapshot from before the failure
        let events = collector.tick().await.unwrap();
        let created: Vec<Pid> = events
            .iter()
            .filter(|e| matches!(e, ProcessEvent::Created { .. }))
            .map(|e| e.pid())
            .collect();
        let terminated: Vec<Pid> = events
            .iter()
            .filter(|e| matches!(e, ProcessEvent::Terminated { .. }))
            .map(|e| e.pid())
            .collect();
        assert_eq!(created, vec![3]);
        assert_eq!(terminated, vec![2]);
    }

    // ==================== run tests ====================

    #[tokio::test]
    async fn test_run_publishes_and_stops_on_shutdown() {
        let (collector, mut rx) = collector(
            vec![Ok(vec![process(1, "a")]), Ok(vec![process(1, "a"), process(2, "b")])],
            16,
        );
        let (tx_shutdown, shutdown) = Shutdown::new();
        let handle = tokio::spawn(collector.run(shutdown));

        let first = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap();
        let second = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap();
        assert_eq!(first.pid(), 1);
        assert_eq!(second.pid(), 2);

        tx_shutdown.send_signal();
        let summary = tokio::time::timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();
        assert!(summary.ticks >= 2);
        assert!(summary.events_published >= 2);
    }

    #[tokio::test]
    async fn test_run_exits_on_shutdown_while_channel_full() {
        // Capacity 1 and nobody reading: the second send blocks until shutdown
        let (collector, _rx) = collector(vec![Ok(vec![process(1, "a"), process(2, "b"), process(3, "c")])], 1);
        let (tx_shutdown, shutdown) = Shutdown::new();
        let handle = tokio::spawn(collector.run(shutdown));

        tokio::time::sleep(Duration::from_millis(300)).await;
        tx_shutdown.send_signal();

        let summary = tokio::time::timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();
        assert_eq!(summary.events_published, 1);
    }

    #[tokio::test]
    async fn test_run_stops_when_consumer_drops() {
        let (collector, rx) = collector(vec![Ok(vec![process(1, "a")])], 4);
        drop(rx);
        let (_tx_shutdown, shutdown) = Shutdown::new();

        let summary = tokio::time::timeout(Duration::from_secs(5), collector.run(shutdown))
            .await
            .unwrap();
        assert_eq!(summary.ticks, 1);
        assert_eq!(summary.events_published, 0);
    }

    #[tokio::test]
    async fn test_run_counts_failed_ticks() {
        let (collector, mut rx) = collector(
            vec![
                Err(SourceError::Enumeration("transient".into())),
                Ok(vec![process(9, "late")]),
            ],
            4,
        );
        let (tx_shutdown, shutdown) = Shutdown::new();
        let handle = tokio::spawn(collector.run(shutdown));

        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap();
        assert_eq!(event.pid(), 9);

        tx_shutdown.send_signal();
        let summary = tokio::time::timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();
        assert_eq!(summary.failed_ticks, 1);
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_thread_spawn_is_not_a_created_process() {
        use crate::monitor::source::SysinfoSource;

        let (tx, _rx) = mpsc::channel(16);
        let mut collector = Collector::new(
            SysinfoSource::new(),
            ProcessFilter::allow_all(),
            DiffEngine::default(),
            tx,
            Duration::from_millis(100),
        );
        collector.tick().await.unwrap();

        let (done_tx, done_rx) = std::sync::mpsc::channel::<()>();
        let worker = std::thread::spawn(move || {
            let _ = done_rx.recv();
        });
        let events = collector.tick().await.unwrap();
        done_tx.send(()).unwrap();
        worker.join().unwrap();

        let own_pid = std::process::id();
        let spawned_here: Vec<_> = events
            .iter()
            .filter(|event| matches!(event, ProcessEvent::Created { .. }) && event.process().parent_pid == own_pid)
            .map(|event| (event.pid(), event.process().name.clone()))
            .collect();
        assert!(spawned_here.is_empty(), "threads reported as new processes: {:?}", spawned_here);
        assert!(collector.current_snapshot().await.contains(own_pid));
    }
}
