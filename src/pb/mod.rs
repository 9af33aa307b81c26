//! Personal-best tracking.
//!
//! At most one lap per (driver, track, car) carries the personal-best flag.
//! [`reconcile`] decides whether a finished session beat the record, and the
//! [`LapStore`] makes the flag move atomically with respect to every other
//! session for the same key.

pub mod reconciler;
pub mod store;

pub use reconciler::{PbOutcome, reconcile};
pub use store::{LapStore, MemoryLapStore, PbCandidate, PbKey, PbTransaction, SessionId};
