//! Client-side prediction
//!
//! The predicted snapshot is never edited in place: it is re-derived by
//! replaying buffered local inputs from the authoritative snapshot whenever
//! either changes.

use std::collections::BTreeMap;

use super::SyncError;
use crate::level::Level;
use crate::sim::{ClientId, Command, InputPayload, Snapshot, tick_snapshot_tuned};
use crate::tuning::Tuning;

#[derive(Debug, Clone)]
pub struct Prediction {
    client: ClientId,
    authoritative: Snapshot,
    predicted: Snapshot,
    /// Local inputs not yet covered by the authoritative snapshot
    pending: BTreeMap<u64, InputPayload>,
    tuning: Tuning,
}

impl Prediction {
    pub fn new(client: ClientId, authoritative: Snapshot) -> Self {
        Self {
            client,
            predicted: authoritative.clone(),
            authoritative,
            pending: BTreeMap::new(),
            tuning: Tuning::default(),
        }
    }

    pub fn with_tuning(mut self, tuning: Tuning) -> Self {
        self.tuning = tuning;
        self
    }

    pub fn client(&self) -> ClientId {
        self.client
    }

    pub fn authoritative(&self) -> &Snapshot {
        &self.authoritative
    }

    pub fn predicted(&self) -> &Snapshot {
        &self.predicted
    }

    /// Inputs waiting for the server to catch up
    pub fn pending_inputs(&self) -> usize {
        self.pending.len()
    }

    /// Clock the next local input should carry
    pub fn next_clock(&self) -> u64 {
        self.predicted.clock() + 1
    }

    /// Replace the authoritative snapshot and replay what it does not cover
    pub fn set_authoritative(
        &mut self,
        snapshot: Snapshot,
        level: &Level,
        tick_period_ms: f32,
    ) -> Result<&Snapshot, SyncError> {
        if snapshot.clock() < self.authoritative.clock() {
            return Err(SyncError::StaleAuthoritative {
                authoritative: snapshot.clock(),
                current: self.authoritative.clock(),
            });
        }
        let clock = snapshot.clock();
        self.authoritative = snapshot;
        self.pending.retain(|&k, _| k > clock);
        self.replay(level, tick_period_ms)
    }

    /// Buffer a local input for tick `clock` and replay
    pub fn push_input(
        &mut self,
        clock: u64,
        input: InputPayload,
        level: &Level,
        tick_period_ms: f32,
    ) -> Result<&Snapshot, SyncError> {
        if clock <= self.authoritative.clock() {
            log::debug!(
                "ignoring local input for tick {} already covered by tick {}",
                clock,
                self.authoritative.clock()
            );
            return Ok(&self.predicted);
        }
        self.pending.insert(clock, input);
        self.replay(level, tick_period_ms)
    }

    fn replay(&mut self, level: &Level, tick_period_ms: f32) -> Result<&Snapshot, SyncError> {
        let mut snapshot = self.authoritative.clone();
        let target = self
            .pending
            .last_key_value()
            .map_or(snapshot.clock(), |(&clock, _)| clock);

        while snapshot.clock() < target {
            let clock = snapshot.clock() + 1;
            let commands: Vec<Command> = self
                .pending
                .get(&clock)
                .map(|input| Command::input(self.client, clock, *input))
                .into_iter()
                .collect();
            snapshot = tick_snapshot_tuned(&snapshot, &commands, level, tick_period_ms, &self.tuning)
                .map_err(|source| SyncError::Tick { clock, source })?;
        }

        self.predicted = snapshot;
        Ok(&self.predicted)
    }
}
