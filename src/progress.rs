//! Advisory progress reporting
//!
//! Workers and the coordinator push coarse events into a channel; a single
//! relay thread drains it into a [`ProgressObserver`]. Sends are fire and
//! forget, observers may render bars or log lines, and none of it ever
//! gates correctness.

use crossbeam::channel::{unbounded, Sender};
use indicatif::{ProgressBar, ProgressStyle};
use std::thread;
use std::time::Duration;
use tracing::{debug, info};

/// One coarse progress event: a stage opening with its item total, items
/// completing within the current stage, or a free-form status line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    StageStarted { stage: &'static str, total: u64 },
    Advanced { stage: &'static str, delta: u64 },
    Message { text: String },
}

/// Cloneable sending half handed to workers. Sending never fails the
/// sender; events after the relay is gone are silently dropped.
#[derive(Debug, Clone)]
pub struct ProgressSender {
    tx: Option<Sender<ProgressEvent>>,
}

impl ProgressSender {
    /// A sender wired to nothing, for callers that do not track progress.
    pub fn disconnected() -> Self {
        Self { tx: None }
    }

    pub fn stage(&self, stage: &'static str, total: u64) {
        self.send(ProgressEvent::StageStarted { stage, total });
    }

    pub fn advance(&self, stage: &'static str, delta: u64) {
        self.send(ProgressEvent::Advanced { stage, delta });
    }

    pub fn message(&self, text: impl Into<String>) {
        self.send(ProgressEvent::Message { text: text.into() });
    }

    fn send(&self, event: ProgressEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }
}

/// Consumer side of the progress channel.
pub trait ProgressObserver: Send {
    fn on_stage(&mut self, stage: &str, total: u64);
    fn on_advance(&mut self, stage: &str, delta: u64);
    fn on_message(&mut self, text: &str);
    fn on_finish(&mut self) {}
}

/// Discards everything.
#[derive(Debug, Default)]
pub struct NullProgress;

impl ProgressObserver for NullProgress {
    fn on_stage(&mut self, _stage: &str, _total: u64) {}
    fn on_advance(&mut self, _stage: &str, _delta: u64) {}
    fn on_message(&mut self, _text: &str) {}
}

/// Logs stages and totals through `tracing`; the default observer.
#[derive(Debug, Default)]
pub struct LogProgress {
    completed: u64,
    total: u64,
}

impl ProgressObserver for LogProgress {
    fn on_stage(&mut self, stage: &str, total: u64) {
        self.completed = 0;
        self.total = total;
        info!(stage, total, "stage started");
    }

    fn on_advance(&mut self, stage: &str, delta: u64) {
        self.completed += delta;
        debug!(stage, completed = self.completed, total = self.total, "progress");
    }

    fn on_message(&mut self, text: &str) {
        info!("{text}");
    }
}

/// Renders one indicatif bar per stage (a spinner when the stage has no
/// known item total).
pub struct ConsoleProgress {
    bar: Option<ProgressBar>,
}

impl ConsoleProgress {
    pub fn new() -> Self {
        Self { bar: None }
    }

    fn finish_current(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.finish();
        }
    }
}

impl Default for ConsoleProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressObserver for ConsoleProgress {
    fn on_stage(&mut self, stage: &str, total: u64) {
        self.finish_current();
        let bar = if total > 0 {
            let pb = ProgressBar::new(total);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("{msg} [{bar:40.cyan/blue}] {pos:>7}/{len:7} ({eta})")
                    .unwrap()
                    .progress_chars("━━─"),
            );
            pb
        } else {
            let pb = ProgressBar::new_spinner();
            pb.set_style(
                ProgressStyle::default_spinner()
                    .template("{spinner:.cyan} {msg}")
                    .unwrap(),
            );
            pb.enable_steady_tick(Duration::from_millis(80));
            pb
        };
        bar.set_message(stage.to_string());
        self.bar = Some(bar);
    }

    fn on_advance(&mut self, _stage: &str, delta: u64) {
        if let Some(bar) = &self.bar {
            bar.inc(delta);
        }
    }

    fn on_message(&mut self, text: &str) {
        match &self.bar {
            Some(bar) => bar.println(text),
            None => info!("{text}"),
        }
    }

    fn on_finish(&mut self) {
        self.finish_current();
    }
}

/// Owns the relay thread that drains progress events into an observer.
///
/// The thread exits when every [`ProgressSender`] clone is dropped;
/// [`ProgressRelay::finish`] drops the one it is handed and joins.
pub struct ProgressRelay {
    handle: Option<thread::JoinHandle<()>>,
}

impl ProgressRelay {
    pub fn spawn(mut observer: Box<dyn ProgressObserver>) -> (Self, ProgressSender) {
        let (tx, rx) = unbounded();
        let handle = thread::spawn(move || {
            for event in rx.iter() {
                match event {
                    ProgressEvent::StageStarted { stage, total } => {
                        observer.on_stage(stage, total)
                    }
                    ProgressEvent::Advanced { stage, delta } => observer.on_advance(stage, delta),
                    ProgressEvent::Message { text } => observer.on_message(&text),
                }
            }
            observer.on_finish();
        });
        (
            Self {
                handle: Some(handle),
            },
            ProgressSender { tx: Some(tx) },
        )
    }

    /// Drop the final sender and wait for the observer to see every event.
    /// The caller must not hold other sender clones past this point.
    pub fn finish(mut self, sender: ProgressSender) {
        drop(sender);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
