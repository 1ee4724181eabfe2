//! Deferred command delivery.
//!
//! The scheduler owns a worker thread that holds deferred commands and hands
//! them to the bus once their due time has passed. Delivery timing is
//! advisory: the contract is **not-before-that-time**, never exact-time. A
//! command scheduled in the past is due immediately and dispatched on the
//! next worker tick.
//!
//! Deferred outcomes cannot be returned to the original caller; rejections
//! and dispatch failures are logged instead. Entries still pending at
//! shutdown are dropped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::bus::{BusError, DispatchOutcome, MessageBus};
use crate::Command;

/// Cooperative cancellation handle for one deferred command.
///
/// Cancelling aborts delivery if the command has not been handed to the bus
/// yet; effects already committed by a delivered command are never undone.
#[derive(Debug, Clone)]
pub struct ScheduleHandle {
    cancelled: Arc<AtomicBool>,
}

impl ScheduleHandle {
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

struct ScheduledEntry {
    due_at: DateTime<Utc>,
    command_type: &'static str,
    cancelled: Arc<AtomicBool>,
    dispatch: Box<dyn FnOnce(&MessageBus) -> Result<DispatchOutcome, BusError> + Send>,
}

enum WorkerMessage {
    Enqueue(ScheduledEntry),
    Shutdown,
}

/// Worker-thread scheduler for not-before-time command delivery.
pub struct CommandScheduler {
    tx: mpsc::Sender<WorkerMessage>,
    join: Option<thread::JoinHandle<()>>,
}

impl CommandScheduler {
    /// Spawn the scheduler worker against the given bus.
    pub fn spawn(bus: Arc<MessageBus>) -> Self {
        let (tx, rx) = mpsc::channel();
        let join = thread::Builder::new()
            .name("command-scheduler".to_string())
            .spawn(move || scheduler_loop(&bus, &rx))
            .expect("failed to spawn command scheduler thread");

        Self {
            tx,
            join: Some(join),
        }
    }

    /// Defer `command` until `due_at`.
    ///
    /// A past `due_at` behaves as immediate dispatch (the entry is already
    /// due). The returned handle cancels delivery cooperatively.
    pub fn schedule<C: Command>(&self, command: C, due_at: DateTime<Utc>) -> ScheduleHandle {
        let cancelled = Arc::new(AtomicBool::new(false));
        let handle = ScheduleHandle {
            cancelled: cancelled.clone(),
        };

        let entry = ScheduledEntry {
            due_at,
            command_type: command.command_type(),
            cancelled,
            dispatch: Box::new(move |bus| bus.dispatch(command)),
        };

        if self.tx.send(WorkerMessage::Enqueue(entry)).is_err() {
            warn!("command scheduler worker is gone; deferred command dropped");
        }
        handle
    }

    /// Request graceful shutdown and wait for the worker to stop.
    pub fn shutdown(mut self) {
        let _ = self.tx.send(WorkerMessage::Shutdown);
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

fn scheduler_loop(bus: &MessageBus, rx: &mpsc::Receiver<WorkerMessage>) {
    let tick = Duration::from_millis(25);
    let mut pending: Vec<ScheduledEntry> = Vec::new();

    loop {
        match rx.recv_timeout(tick) {
            Ok(WorkerMessage::Enqueue(entry)) => pending.push(entry),
            Ok(WorkerMessage::Shutdown) => break,
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }

        let now = Utc::now();
        let mut idx = 0;
        while idx < pending.len() {
            if pending[idx].due_at <= now {
                let entry = pending.swap_remove(idx);
                deliver(bus, entry);
            } else {
                idx += 1;
            }
        }
    }
}

fn deliver(bus: &MessageBus, entry: ScheduledEntry) {
    if entry.cancelled.load(Ordering::SeqCst) {
        debug!(
            command_type = entry.command_type,
            "deferred command cancelled before delivery"
        );
        return;
    }

    match (entry.dispatch)(bus) {
        Ok(DispatchOutcome::Accepted { events_committed }) => {
            debug!(
                command_type = entry.command_type,
                events_committed, "deferred command accepted"
            );
        }
        Ok(DispatchOutcome::Rejected { notifications }) => {
            warn!(
                command_type = entry.command_type,
                violations = notifications.len(),
                "deferred command rejected"
            );
        }
        Err(error) => {
            warn!(
                command_type = entry.command_type,
                error = %error,
                "deferred command dispatch failed"
            );
        }
    }
}
