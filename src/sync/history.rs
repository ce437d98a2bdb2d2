//! Server-side snapshot ring and command buffer

use std::collections::{BTreeMap, VecDeque};

use super::SyncError;
use crate::level::Level;
use crate::sim::{ClientId, Command, Snapshot, tick_snapshot_tuned};
use crate::tuning::Tuning;

/// Per-client command counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClientHealth {
    /// Commands received
    pub received: u64,
    /// Inputs that arrived after their tick was simulated
    pub late: u64,
}

/// Authoritative snapshot history
#[derive(Debug, Clone)]
pub struct History {
    latest: Snapshot,
    /// Snapshots before `latest`, oldest first
    older: VecDeque<Snapshot>,
    capacity: usize,
    /// Commands waiting for their tick, in arrival order
    pending: BTreeMap<u64, Vec<Command>>,
    health: BTreeMap<ClientId, ClientHealth>,
    tuning: Tuning,
}

impl History {
    /// Start from `initial`, retaining at most `capacity` snapshots
    pub fn new(initial: Snapshot, capacity: usize) -> Self {
        Self {
            latest: initial,
            older: VecDeque::new(),
            capacity: capacity.max(1),
            pending: BTreeMap::new(),
            health: BTreeMap::new(),
            tuning: Tuning::default(),
        }
    }

    pub fn with_tuning(mut self, tuning: Tuning) -> Self {
        self.tuning = tuning;
        self
    }

    pub fn latest(&self) -> &Snapshot {
        &self.latest
    }

    /// The tick `advance` will produce next
    pub fn next_clock(&self) -> u64 {
        self.latest.clock() + 1
    }

    /// File a command for the tick it applies to.
    ///
    /// Inputs go under their own clock; joins and leaves under the next tick.
    /// Returns `false` if the input's tick was already simulated.
    pub fn push_command(&mut self, command: Command) -> bool {
        let clock = match &command {
            Command::Input { clock, .. } => *clock,
            Command::Player { .. } => self.next_clock(),
        };
        let health = self.health.entry(command.client_id()).or_default();
        health.received += 1;

        if clock <= self.latest.clock() {
            health.late += 1;
            log::debug!(
                "dropping late input from client {:?} for tick {} (latest {})",
                command.client_id(),
                clock,
                self.latest.clock()
            );
            return false;
        }
        self.pending.entry(clock).or_default().push(command);
        true
    }

    /// Commands filed for tick `clock`, in arrival order
    pub fn commands_for(&self, clock: u64) -> &[Command] {
        self.pending.get(&clock).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Simulate the next tick and retain it
    pub fn advance(&mut self, level: &Level, tick_period_ms: f32) -> Result<&Snapshot, SyncError> {
        let clock = self.next_clock();
        let commands = self.pending.remove(&clock).unwrap_or_default();
        let next = tick_snapshot_tuned(&self.latest, &commands, level, tick_period_ms, &self.tuning)
            .map_err(|source| {
                log::error!("tick {} failed: {}", clock, source);
                SyncError::Tick { clock, source }
            })?;

        let previous = std::mem::replace(&mut self.latest, next);
        self.older.push_back(previous);
        while self.older.len() >= self.capacity {
            self.older.pop_front();
        }
        Ok(&self.latest)
    }

    /// A retained snapshot by tick
    pub fn snapshot_at(&self, clock: u64) -> Result<&Snapshot, SyncError> {
        let latest = self.latest.clock();
        if clock == latest {
            return Ok(&self.latest);
        }
        if clock > latest {
            return Err(SyncError::NotSimulated { clock, latest });
        }
        let oldest = self.older.front().map_or(latest, Snapshot::clock);
        if clock < oldest {
            return Err(SyncError::Evicted { clock, oldest });
        }
        let index = (clock - oldest) as usize;
        self.older.get(index).ok_or(SyncError::Evicted { clock, oldest })
    }

    /// Number of snapshots retained, including the latest
    pub fn retained(&self) -> usize {
        self.older.len() + 1
    }

    pub fn client_health(&self, client: ClientId) -> ClientHealth {
        self.health.get(&client).copied().unwrap_or_default()
    }
}
