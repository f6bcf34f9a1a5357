//! Filesystem watcher for the request queue.
//!
//! The debouncer thread only forwards "the queue file changed" signals into a
//! channel. A single tokio task consumes them, so batches are dispatched one at
//! a time and never overlap.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, SystemTime},
};

use {
    async_trait::async_trait,
    notify_debouncer_full::{
        DebounceEventResult, Debouncer, RecommendedCache, new_debouncer,
        notify::{EventKind, RecommendedWatcher, RecursiveMode},
    },
    opsrelay_common::types::QueueEntry,
    tokio::{sync::mpsc, task::JoinHandle},
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

use crate::{error::Result, store::QueueStore};

/// Receives each non-empty batch of pending entries.
#[async_trait]
pub trait BatchHandler: Send + Sync {
    async fn handle(&self, batch: Vec<QueueEntry>);
}

/// Drops change events whose file mtime has not advanced since the last
/// processed one. A missing mtime always passes.
#[derive(Debug, Default)]
pub struct ChangeFilter {
    last_mtime: Option<SystemTime>,
}

impl ChangeFilter {
    pub fn should_process(&mut self, mtime: Option<SystemTime>) -> bool {
        let Some(mtime) = mtime else {
            return true;
        };
        if self.last_mtime.is_some_and(|last| mtime <= last) {
            return false;
        }
        self.last_mtime = Some(mtime);
        true
    }
}

pub struct QueueWatcher {
    debouncer: Debouncer<RecommendedWatcher, RecommendedCache>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl QueueWatcher {
    /// Start watching the store's queue file. Pending entries already in the
    /// file are dispatched once right away.
    pub fn start(
        store: Arc<QueueStore>,
        handler: Arc<dyn BatchHandler>,
        debounce: Duration,
    ) -> Result<Self> {
        let requests_path = store.requests_path().to_path_buf();
        let file_name = requests_path.file_name().map(|n| n.to_os_string());
        let dir = requests_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        let (tx, rx) = mpsc::unbounded_channel();

        let mut debouncer = new_debouncer(
            debounce,
            None,
            move |result: DebounceEventResult| match result {
                Ok(events) => {
                    let touched = events.iter().any(|event| {
                        !matches!(event.kind, EventKind::Access(_))
                            && event
                                .paths
                                .iter()
                                .any(|p| p.file_name().map(|n| n.to_os_string()) == file_name)
                    });
                    if touched {
                        let _ = tx.send(());
                    }
                },
                Err(errors) => {
                    for e in errors {
                        warn!(error = %e, "queue watcher error");
                    }
                },
            },
        )?;
        debouncer.watch(&dir, RecursiveMode::NonRecursive)?;
        info!(path = %requests_path.display(), "queue watcher: watching");

        let cancel = CancellationToken::new();
        let task = tokio::spawn(dispatch_loop(store, handler, rx, cancel.clone()));

        Ok(Self {
            debouncer,
            cancel,
            task,
        })
    }

    /// Stop the observer, then wait for the dispatch task. A batch already
    /// being dispatched runs to completion; nothing is dispatched afterwards.
    pub async fn stop(self) {
        self.debouncer.stop();
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            warn!(error = %e, "queue dispatch task ended abnormally");
        }
        info!("queue watcher stopped");
    }
}

async fn modified_time(path: &Path) -> Option<SystemTime> {
    tokio::fs::metadata(path).await.ok()?.modified().ok()
}

async fn dispatch_pending(store: &QueueStore, handler: &dyn BatchHandler) {
    let batch = store.load_pending().await;
    if batch.is_empty() {
        debug!("no pending entries");
        return;
    }
    info!(count = batch.len(), "dispatching pending entries");
    handler.handle(batch).await;
}

async fn dispatch_loop(
    store: Arc<QueueStore>,
    handler: Arc<dyn BatchHandler>,
    mut rx: mpsc::UnboundedReceiver<()>,
    cancel: CancellationToken,
) {
    let mut filter = ChangeFilter::default();
    filter.should_process(modified_time(store.requests_path()).await);
    dispatch_pending(&store, handler.as_ref()).await;

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            signal = rx.recv() => {
                if signal.is_none() {
                    break;
                }
                // Coalesce signals that queued up during the last dispatch.
                while rx.try_recv().is_ok() {}

                if !filter.should_process(modified_time(store.requests_path()).await) {
                    debug!("queue mtime unchanged, skipping event");
                    continue;
                }
                dispatch_pending(&store, handler.as_ref()).await;
            },
        }
    }
}
