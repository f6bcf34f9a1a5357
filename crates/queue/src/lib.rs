//! Outbound queue pipeline: `requests.json` in, `responses.json` out.
//!
//! [`store::QueueStore`] owns both documents, [`watcher::QueueWatcher`]
//! notices when the agent rewrites the queue, and [`dispatch::Dispatcher`]
//! runs each pending entry through the translator and executor.

pub mod dispatch;
pub mod error;
pub mod store;
pub mod watcher;

pub use {
    dispatch::Dispatcher,
    error::{Error, Result},
    store::QueueStore,
    watcher::{BatchHandler, ChangeFilter, QueueWatcher},
};
