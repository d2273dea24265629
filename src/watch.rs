//! Watch mode: rebuilds affected tasks whenever their sources change.
//!
//! The loop owns a [`Debouncer`] and reacts to three kinds of signals on a
//! single channel:
//!
//! 1. **Filesystem events** from `notify`. Each event's paths are matched
//!    against the watch bindings, the union of bound tasks goes into the
//!    debouncer.
//! 2. **Run completion** from the worker thread. At most one run is in
//!    flight, changes arriving meanwhile wait for it to finish.
//! 3. **Shutdown**, e.g. from a Ctrl-C handler. An in-flight run is allowed
//!    to finish before the loop returns.

mod debounce;

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use camino::{Utf8Path, Utf8PathBuf};
use notify::event::ModifyKind;
use notify::{Event, EventKind, RecursiveMode, Watcher as _};

use crate::error::WatchError;
use crate::orchestrator::Orchestrator;
use crate::pipeline::WatchBinding;

pub use debounce::{Batch, Debouncer};

pub(crate) enum Signal {
    Fs(notify::Result<Event>),
    Finished,
    Shutdown,
}

/// Stops a running [`Watcher`] from another thread.
#[derive(Clone)]
pub struct ShutdownHandle(Sender<Signal>);

impl ShutdownHandle {
    pub fn shutdown(&self) {
        // the loop may already be gone
        let _ = self.0.send(Signal::Shutdown);
    }
}

pub struct Watcher {
    orchestrator: Arc<Orchestrator>,
    bindings: Vec<WatchBinding>,
    root: Utf8PathBuf,
    window: Duration,
    tx: Sender<Signal>,
    rx: Receiver<Signal>,
}

impl Watcher {
    /// `root` is the directory the binding globs are relative to.
    pub fn new(
        orchestrator: Arc<Orchestrator>,
        bindings: Vec<WatchBinding>,
        root: impl AsRef<Utf8Path>,
        window: Duration,
    ) -> Result<Self, WatchError> {
        let root = root.as_ref().canonicalize_utf8()?;
        let (tx, rx) = std::sync::mpsc::channel();

        Ok(Self {
            orchestrator,
            bindings,
            root,
            window,
            tx,
            rx,
        })
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle(self.tx.clone())
    }

    /// Subscribes to filesystem events below the bindings' static roots and
    /// blocks until shut down.
    pub fn watch(self) -> Result<(), WatchError> {
        let tx = self.tx.clone();
        let mut watcher = notify::recommended_watcher(move |event| {
            let _ = tx.send(Signal::Fs(event));
        })?;

        for path in self.watch_roots() {
            tracing::info!("watching {path}");
            watcher.watch(path.as_std_path(), RecursiveMode::Recursive)?;
        }

        tracing::info!("watching for changes...");
        self.run();
        Ok(())
    }

    fn watch_roots(&self) -> Vec<Utf8PathBuf> {
        let mut roots = HashSet::new();

        for binding in &self.bindings {
            match resolve_watch_path(&self.root.join(binding.glob())) {
                Ok(path) => {
                    roots.insert(path);
                }
                Err(e) => tracing::warn!("not watching '{}': {e}", binding.glob()),
            }
        }

        collapse_watch_paths(roots)
    }

    /// Maps an event to the tasks it affects. Paths outside of the project
    /// root or not matched by any binding are dropped.
    fn classify(&self, event: &Event) -> Batch {
        let mut batch = Batch::default();

        match event.kind {
            EventKind::Create(_) | EventKind::Remove(_) => {}
            EventKind::Modify(ModifyKind::Metadata(_)) => return batch,
            EventKind::Modify(_) => {}
            _ => return batch,
        }

        for path in &event.paths {
            let Some(path) = Utf8Path::from_path(path) else {
                continue;
            };
            let Ok(relative) = path.strip_prefix(&self.root) else {
                continue;
            };

            let mut matched = false;
            for binding in self.bindings.iter().filter(|b| b.matches(relative)) {
                batch.tasks.extend(binding.tasks().iter().cloned());
                matched = true;
            }

            if matched {
                tracing::debug!("{relative} changed");
                batch.changed.insert(relative.to_path_buf());
            }
        }

        batch
    }

    #[cfg(test)]
    pub(crate) fn sender(&self) -> Sender<Signal> {
        self.tx.clone()
    }

    pub(crate) fn run(self) {
        let mut debouncer = Debouncer::new(self.window);
        let mut worker: Option<JoinHandle<()>> = None;
        let mut stopping = false;

        loop {
            let signal = match debouncer.deadline() {
                Some(deadline) => {
                    let timeout = deadline.saturating_duration_since(Instant::now());
                    match self.rx.recv_timeout(timeout) {
                        Ok(signal) => Some(signal),
                        Err(RecvTimeoutError::Timeout) => None,
                        Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                None => match self.rx.recv() {
                    Ok(signal) => Some(signal),
                    Err(_) => break,
                },
            };

            match signal {
                Some(Signal::Fs(Ok(event))) => {
                    debouncer.event(self.classify(&event), Instant::now());
                }
                Some(Signal::Fs(Err(e))) => tracing::error!("watch error: {e}"),
                Some(Signal::Finished) => {
                    if let Some(worker) = worker.take()
                        && worker.join().is_err()
                    {
                        tracing::error!("rebuild thread panicked");
                    }

                    debouncer.finished(Instant::now());
                    if stopping {
                        break;
                    }
                }
                Some(Signal::Shutdown) => {
                    if !debouncer.is_running() {
                        break;
                    }
                    tracing::info!("waiting for the running rebuild to finish...");
                    stopping = true;
                }
                None => {}
            }

            if stopping {
                continue;
            }

            if let Some(batch) = debouncer.poll(Instant::now()) {
                worker = Some(self.spawn(batch));
            }
        }

        tracing::info!("stopped watching");
    }

    fn spawn(&self, batch: Batch) -> JoinHandle<()> {
        let orchestrator = self.orchestrator.clone();
        let tx = self.tx.clone();

        thread::spawn(move || {
            let tasks: Vec<String> = batch.tasks.into_iter().collect();
            let changed: Vec<Utf8PathBuf> = batch.changed.into_iter().collect();

            tracing::info!("change detected, running {}", tasks.join(", "));

            match orchestrator.run(&tasks, &changed) {
                Ok(report) if report.is_success() => {
                    tracing::info!("rebuild complete, watching for changes...")
                }
                Ok(report) => {
                    for task in report.failed() {
                        tracing::warn!("{} did not succeed", task.name);
                    }
                }
                Err(e) => tracing::error!("couldn't run tasks: {e}"),
            }

            let _ = tx.send(Signal::Finished);
        })
    }
}

/// Returns the directory to watch for a glob: its static prefix, or the
/// parent directory when the glob names a single file, so atomic writes
/// replacing the file are still seen.
pub fn resolve_watch_path(glob: &Utf8Path) -> std::io::Result<Utf8PathBuf> {
    let components: Vec<_> = glob.components().collect();
    let split_idx = components
        .iter()
        .position(|c| c.as_str().contains(['*', '?', '[']))
        .unwrap_or(components.len());

    let root_part: Utf8PathBuf = components.iter().take(split_idx).collect();
    let absolute_root = root_part.canonicalize_utf8()?;

    if split_idx == components.len() && absolute_root.is_file() {
        let parent = absolute_root
            .parent()
            .unwrap_or(&absolute_root)
            .to_path_buf();
        return Ok(parent);
    }

    Ok(absolute_root)
}

/// Reduces a set of paths to the minimal set of watch roots.
///
/// If we watch `/a` and `/a/b`, we only need to watch `/a` because
/// the watcher is recursive.
fn collapse_watch_paths(paths: HashSet<Utf8PathBuf>) -> Vec<Utf8PathBuf> {
    let mut paths: Vec<_> = paths.into_iter().collect();
    paths.sort();

    let mut filtered = Vec::new();
    for path in paths {
        if let Some(last) = filtered.last()
            && path.starts_with(last)
        {
            continue;
        }
        filtered.push(path);
    }

    filtered
}
