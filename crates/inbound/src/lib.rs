//! Inbound half of the relay: chat updates in, agent wake-ups out.

pub mod error;
pub mod inbox;
pub mod notifier;
pub mod offset;
pub mod poller;

pub use {
    error::{Error, Result},
    inbox::InboxStore,
    notifier::AgentNotifier,
    poller::{BatchListener, LongPoller},
};
