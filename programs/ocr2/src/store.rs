//! Round history. Every accepted report lands in a live ring buffer, every `granularity`-th
//! one is also kept in a coarser historical ring buffer.

use std::mem::size_of;

use serde::{Deserialize, Serialize};

use crate::state::{ConfigDigest, DIGEST_SIZE};
use crate::{ErrorCode, Result};

const SNAPSHOT_VERSION: u8 = 1;

#[repr(C)]
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, bytemuck::Pod, bytemuck::Zeroable,
)]
pub struct Transmission {
    /// Observations timestamp taken from the report
    pub timestamp: u64,
    /// When the report was accepted
    pub transmission_timestamp: u64,
    pub answer: i128,
}

/// Ring buffer dimensions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    pub live_length: u32,
    pub historical_length: u32,
    pub granularity: u8,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            live_length: 1024,
            historical_length: 1024,
            granularity: 30,
        }
    }
}

impl StoreConfig {
    pub fn validate(&self) -> Result<()> {
        require!(self.live_length > 0, InvalidInput);
        require!(self.granularity > 0, InvalidInput);
        Ok(())
    }
}

#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct Header {
    latest_config_digest: [u8; DIGEST_SIZE],
    latest_round_id: u32,
    epoch: u32,
    live_length: u32,
    historical_length: u32,
    live_cursor: u32,
    historical_cursor: u32,
    round: u8,
    granularity: u8,
    version: u8,
    _padding: u8,
}

/// Two ringbuffers
/// - Live one that holds the most recent `live_length` rounds
/// - Historical one that holds every `granularity`-th round
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transmissions {
    latest_round_id: u32,
    /// Digest of the configuration that produced the latest round
    latest_config_digest: ConfigDigest,
    epoch: u32,
    round: u8,
    granularity: u8,
    live_cursor: u32,
    historical_cursor: u32,
    live: Vec<Transmission>,
    historical: Vec<Transmission>,
}

impl Transmissions {
    pub fn new(config: &StoreConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            latest_round_id: 0,
            latest_config_digest: [0u8; DIGEST_SIZE],
            epoch: 0,
            round: 0,
            granularity: config.granularity,
            live_cursor: 0,
            historical_cursor: 0,
            live: vec![Transmission::default(); config.live_length as usize],
            historical: vec![Transmission::default(); config.historical_length as usize],
        })
    }

    pub fn latest_round_id(&self) -> u32 {
        self.latest_round_id
    }

    pub fn latest_config_digest(&self) -> ConfigDigest {
        self.latest_config_digest
    }

    pub fn epoch(&self) -> u32 {
        self.epoch
    }

    pub fn round(&self) -> u8 {
        self.round
    }

    /// Reports must move strictly forward in `(epoch, round)`.
    pub fn check_fresh(&self, epoch: u32, round: u8) -> Result<()> {
        require!((self.epoch, self.round) < (epoch, round), StaleReport);
        Ok(())
    }

    pub fn next_round_id(&self) -> Result<u32> {
        self.latest_round_id
            .checked_add(1)
            .ok_or(ErrorCode::Overflow)
    }

    /// A new configuration restarts epochs from zero.
    pub fn reset_epoch_and_round(&mut self) {
        self.epoch = 0;
        self.round = 0;
    }

    /// Records an accepted report and returns its round id.
    pub fn record(
        &mut self,
        epoch: u32,
        round: u8,
        config_digest: ConfigDigest,
        transmission: Transmission,
    ) -> Result<u32> {
        self.check_fresh(epoch, round)?;
        let round_id = self.next_round_id()?;
        self.insert(transmission);
        self.epoch = epoch;
        self.round = round;
        self.latest_config_digest = config_digest;
        Ok(round_id)
    }

    fn insert(&mut self, round: Transmission) {
        self.latest_round_id += 1;

        // insert into live data
        self.live[self.live_cursor as usize] = round;
        self.live_cursor = (self.live_cursor + 1) % self.live.len() as u32;

        if !self.historical.is_empty() && self.latest_round_id % self.granularity as u32 == 0 {
            // insert into historical data
            self.historical[self.historical_cursor as usize] = round;
            self.historical_cursor = (self.historical_cursor + 1) % self.historical.len() as u32;
        }
    }

    pub fn latest(&self) -> Option<Transmission> {
        if self.latest_round_id == 0 {
            return None;
        }

        let len = self.live.len() as u32;
        // Handle wraparound
        let i = (self.live_cursor + len - 1) % len;

        Some(self.live[i as usize])
    }

    /// Looks up a round. Rounds that only survive in the historical buffer resolve to the
    /// closest stored round at or below `round_id`; the returned id is the round actually read.
    pub fn fetch(&self, round_id: u32) -> Option<(u32, Transmission)> {
        if round_id == 0 || self.latest_round_id < round_id {
            return None;
        }

        let latest_round_id = self.latest_round_id;
        let granularity = self.granularity as u32;

        // if in live range, fetch from live set
        let live_start = latest_round_id.saturating_sub((self.live.len() as u32).saturating_sub(1));
        if (live_start..=latest_round_id).contains(&round_id) {
            let offset = latest_round_id - round_id;
            let offset = offset + 1; // + 1 because we're looking for the element before the cursor

            let index = self
                .live_cursor
                .checked_sub(offset)
                .unwrap_or_else(|| self.live.len() as u32 - (offset - self.live_cursor));

            return Some((round_id, self.live[index as usize]));
        }

        if self.historical.is_empty() {
            return None;
        }

        // if in historical range, fetch from closest
        let historical_end = latest_round_id - (latest_round_id % granularity);
        let historical_start = historical_end
            .saturating_sub(granularity.saturating_mul(self.historical.len() as u32 - 1));
        let rounded = round_id - (round_id % granularity);
        if rounded == 0 || !(historical_start..=historical_end).contains(&rounded) {
            return None;
        }

        let offset = (historical_end - rounded) / granularity;
        let offset = offset + 1; // + 1 because we're looking for the element before the cursor

        let index = self.historical_cursor.checked_sub(offset).unwrap_or_else(|| {
            self.historical.len() as u32 - (offset - self.historical_cursor)
        });

        Some((rounded, self.historical[index as usize]))
    }

    /// Serializes the ledger into a flat byte buffer (native byte order).
    pub fn snapshot(&self) -> Vec<u8> {
        let header = Header {
            latest_config_digest: self.latest_config_digest,
            latest_round_id: self.latest_round_id,
            epoch: self.epoch,
            live_length: self.live.len() as u32,
            historical_length: self.historical.len() as u32,
            live_cursor: self.live_cursor,
            historical_cursor: self.historical_cursor,
            round: self.round,
            granularity: self.granularity,
            version: SNAPSHOT_VERSION,
            _padding: 0,
        };

        let mut data = Vec::with_capacity(
            size_of::<Header>()
                + (self.live.len() + self.historical.len()) * size_of::<Transmission>(),
        );
        data.extend_from_slice(bytemuck::bytes_of(&header));
        data.extend_from_slice(bytemuck::cast_slice(&self.live));
        data.extend_from_slice(bytemuck::cast_slice(&self.historical));
        data
    }

    pub fn restore(data: &[u8]) -> Result<Self> {
        require!(data.len() >= size_of::<Header>(), InvalidInput);
        let (header, body) = data.split_at(size_of::<Header>());
        let header: Header = bytemuck::pod_read_unaligned(header);

        require!(header.version == SNAPSHOT_VERSION, InvalidInput);
        require!(header.granularity > 0, InvalidInput);
        require!(header.live_length > 0, InvalidInput);
        require!(header.live_cursor < header.live_length, InvalidInput);
        require!(
            header.historical_length == 0 || header.historical_cursor < header.historical_length,
            InvalidInput
        );

        let live_length = header.live_length as usize;
        let historical_length = header.historical_length as usize;
        require!(
            body.len() == (live_length + historical_length) * size_of::<Transmission>(),
            InvalidInput
        );

        let mut records = body
            .chunks_exact(size_of::<Transmission>())
            .map(bytemuck::pod_read_unaligned::<Transmission>);
        let live = records.by_ref().take(live_length).collect();
        let historical = records.collect();

        Ok(Self {
            latest_round_id: header.latest_round_id,
            latest_config_digest: header.latest_config_digest,
            epoch: header.epoch,
            round: header.round,
            granularity: header.granularity,
            live_cursor: header.live_cursor,
            historical_cursor: header.historical_cursor,
            live,
            historical,
        })
    }
}
