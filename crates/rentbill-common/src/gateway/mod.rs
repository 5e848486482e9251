//! Collaborator contracts consumed by the reconciler
//!
//! Storage, the compute provider, and the notification channel are all
//! reached through these traits so the billing core stays agnostic of
//! which backend is wired in.

pub mod ledger;
pub mod notify;
pub mod resource;
pub mod settings;

pub use ledger::LedgerGateway;
pub use notify::Notifier;
pub use resource::{ResourceGateway, ResourceStatus};
pub use settings::SettingsStore;
