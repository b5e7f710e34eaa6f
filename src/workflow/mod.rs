//! Flow logic for each stage of the cycle
//!
//! Each flow is pure: it takes the current aggregate (or a draft) and returns
//! the next one. The async intents in `commands` sequence these with the
//! guide and the gateway:
//! - onboarding: rate the eight areas once, then receive the first tasks
//! - today: schedule, complete, simplify or abandon the current tasks
//! - week: re-rate the wheel once the cycle is done and start the next one
//! - history: read-only summary of past snapshots

pub mod history;
pub mod onboarding;
pub mod today;
pub mod week;
