//! Inspector protocol client
//!
//! Client side of a JSON-RPC style debugging protocol: commands are
//! correlated with responses by id, events are routed to per-name listeners.

pub mod domain;
pub mod scripts;
pub mod session;
pub mod types;

pub use domain::{Bound, Domain, Member};
pub use scripts::{ScriptMap, ScriptRecord};
pub use session::{EventWaiter, PendingResponse, Session};
pub use types::*;
