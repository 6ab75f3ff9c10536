//! Trigger path: change notifications on the incoming collection are turned
//! into `POST /predict` calls and the outcome is written back onto the record.

pub mod hooks;
pub mod http;
pub mod trigger;

pub use hooks::{HookState, hook_routes};
pub use http::{PredictClient, SyncError};
pub use trigger::{ChangeEvent, TriggerError, TriggerHandler, TriggerOutcome};
