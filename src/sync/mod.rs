//! Snapshot history and prediction
//!
//! The server keeps a short ring of recent snapshots and files incoming
//! commands by the tick they apply to. The client keeps the last
//! authoritative snapshot and re-derives its predicted snapshot by replaying
//! local inputs on top of it.

pub mod history;
pub mod prediction;

use thiserror::Error;

use crate::sim::TickError;

pub use history::{ClientHealth, History};
pub use prediction::Prediction;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SyncError {
    #[error("tick {clock} failed")]
    Tick {
        clock: u64,
        #[source]
        source: TickError,
    },
    #[error("tick {clock} was evicted; oldest retained is {oldest}")]
    Evicted { clock: u64, oldest: u64 },
    #[error("tick {clock} has not been simulated; latest is {latest}")]
    NotSimulated { clock: u64, latest: u64 },
    #[error("authoritative tick {authoritative} is older than current tick {current}")]
    StaleAuthoritative { authoritative: u64, current: u64 },
}
