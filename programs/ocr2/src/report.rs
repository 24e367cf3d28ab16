use std::mem::size_of;

use arrayref::{array_ref, array_refs, mut_array_refs};
use serde::{Deserialize, Serialize};

use crate::state::{ConfigDigest, MAX_ORACLES};
use crate::{ErrorCode, Result};

/// Which middle element an even number of observations resolves to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MedianPolicy {
    #[default]
    LowerMiddle,
    UpperMiddle,
}

/// The three 32 byte words signed alongside every report.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReportContext {
    pub config_digest: ConfigDigest,
    pub epoch: u32,
    pub round: u8,
    pub extra_hash: [u8; 32],
}

impl ReportContext {
    pub fn from_words(words: &[[u8; 32]; 3]) -> Result<Self> {
        let (padding, epoch, round) = array_refs![&words[1], 27, 4, 1];
        require!(padding.iter().all(|b| *b == 0), MalformedReport);
        Ok(Self {
            config_digest: words[0],
            epoch: u32::from_be_bytes(*epoch),
            round: round[0],
            extra_hash: words[2],
        })
    }

    pub fn to_words(&self) -> [[u8; 32]; 3] {
        let mut epoch_and_round = [0u8; 32];
        {
            let (_padding, epoch, round) = mut_array_refs![&mut epoch_and_round, 27, 4, 1];
            *epoch = self.epoch.to_be_bytes();
            round[0] = self.round;
        }
        [self.config_digest, epoch_and_round, self.extra_hash]
    }

    /// Epoch and round packed into a single ordered value.
    pub fn epoch_and_round(&self) -> u64 {
        (u64::from(self.epoch) << 8) | u64::from(self.round)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Report {
    pub observations_timestamp: u32,
    pub juels_per_fee_coin: u128,
    /// Observer index for each observation, by position
    pub observers: Vec<u8>,
    /// Sorted ascending
    pub observations: Vec<i128>,
}

impl Report {
    // (uint32, uint128, bytes32, uint8)
    pub const HEADER_LEN: usize = size_of::<u32>() + size_of::<u128>() + 32 + size_of::<u8>();
    pub const OBSERVATION_LEN: usize = size_of::<i128>();

    /// Parses the byte layout. Committee-dependent checks live in [`Report::decode`].
    pub fn unpack(raw_report: &[u8]) -> Result<Self> {
        require!(raw_report.len() >= Self::HEADER_LEN, MalformedReport);

        let (header, body) = raw_report.split_at(Self::HEADER_LEN);
        let header = array_ref![header, 0, Report::HEADER_LEN];
        let (observations_timestamp, juels_per_fee_coin, observers, count) =
            array_refs![header, 4, 16, 32, 1];

        let count = usize::from(count[0]);
        require!(count <= MAX_ORACLES, TooManyObservations);
        require!(body.len() == count * Self::OBSERVATION_LEN, MalformedReport);
        // unused observer slots are zero
        require!(observers[count..].iter().all(|b| *b == 0), MalformedReport);

        let observations: Vec<i128> = body
            .chunks_exact(Self::OBSERVATION_LEN)
            .map(|chunk| i128::from_be_bytes(*array_ref![chunk, 0, 16]))
            .collect();
        let sorted = observations.windows(2).all(|pair| pair[0] <= pair[1]);
        require!(sorted, MalformedReport);

        Ok(Self {
            observations_timestamp: u32::from_be_bytes(*observations_timestamp),
            juels_per_fee_coin: u128::from_be_bytes(*juels_per_fee_coin),
            observers: observers[..count].to_vec(),
            observations,
        })
    }

    /// Parses a report and checks it against a committee of `n` oracles tolerating `f` faults.
    pub fn decode(raw_report: &[u8], n: usize, f: u8) -> Result<Self> {
        let report = Self::unpack(raw_report)?;
        report.validate(n, f)?;
        Ok(report)
    }

    pub fn validate(&self, n: usize, f: u8) -> Result<()> {
        let count = self.observations.len();
        require!(count <= n, TooManyObservations);
        require!(count > usize::from(f), TooFewObservations);

        let mut seen = 0u32;
        for &observer in &self.observers {
            require!(usize::from(observer) < n.min(MAX_ORACLES), MalformedReport);
            let bit = 1u32 << observer;
            require!(seen & bit == 0, MalformedReport);
            seen |= bit;
        }
        Ok(())
    }

    /// Serializes the report. Fails unless there is one observer per observation and at
    /// most [`MAX_ORACLES`] of each.
    pub fn pack(&self) -> Result<Vec<u8>> {
        let count = self.observations.len();
        require!(count <= MAX_ORACLES, TooManyObservations);
        require!(self.observers.len() == count, LengthMismatch);

        let mut raw = Vec::with_capacity(Self::HEADER_LEN + count * Self::OBSERVATION_LEN);
        raw.extend_from_slice(&self.observations_timestamp.to_be_bytes());
        raw.extend_from_slice(&self.juels_per_fee_coin.to_be_bytes());
        let mut observers = [0u8; 32];
        observers[..count].copy_from_slice(&self.observers);
        raw.extend_from_slice(&observers);
        raw.push(count as u8);
        for observation in &self.observations {
            raw.extend_from_slice(&observation.to_be_bytes());
        }
        Ok(raw)
    }

    pub fn median(&self, policy: MedianPolicy) -> Result<i128> {
        median(&self.observations, policy).ok_or(ErrorCode::TooFewObservations)
    }
}

/// Median of sorted values. No interpolation: even counts pick one of the two middle elements.
pub fn median(sorted: &[i128], policy: MedianPolicy) -> Option<i128> {
    if sorted.is_empty() {
        return None;
    }
    let index = match policy {
        MedianPolicy::LowerMiddle => (sorted.len() - 1) / 2,
        MedianPolicy::UpperMiddle => sorted.len() / 2,
    };
    Some(sorted[index])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(observations: Vec<i128>) -> Report {
        Report {
            observations_timestamp: 1_700_000_000,
            juels_per_fee_coin: 5_000_000_000_000_000_000,
            observers: (0..observations.len() as u8).collect(),
            observations,
        }
    }

    #[test]
    fn layout() {
        let raw = report(vec![-5, 10]).pack().unwrap();
        assert_eq!(raw.len(), Report::HEADER_LEN + 2 * Report::OBSERVATION_LEN);
        assert_eq!(Report::HEADER_LEN, 53);
        assert_eq!(&raw[..4], &1_700_000_000u32.to_be_bytes());
        assert_eq!(&raw[20..23], &[0, 1, 0]);
        assert_eq!(raw[52], 2);
        assert_eq!(&raw[53..69], &(-5i128).to_be_bytes());

        let decoded = Report::decode(&raw, 4, 1).unwrap();
        assert_eq!(decoded, report(vec![-5, 10]));
    }

    #[test]
    fn rejects_trailing_and_missing_bytes() {
        let mut raw = report(vec![1, 2]).pack().unwrap();
        raw.push(0);
        assert_eq!(Report::unpack(&raw), Err(ErrorCode::MalformedReport));
        raw.truncate(raw.len() - 2);
        assert_eq!(Report::unpack(&raw), Err(ErrorCode::MalformedReport));
        assert_eq!(Report::unpack(&raw[..10]), Err(ErrorCode::MalformedReport));
    }

    #[test]
    fn rejects_unsorted_observations() {
        let raw = report(vec![2, 1]).pack().unwrap();
        assert_eq!(Report::unpack(&raw), Err(ErrorCode::MalformedReport));
    }

    #[test]
    fn observation_count_bounds() {
        let raw = report(vec![1, 2, 3, 4, 5]).pack().unwrap();
        assert_eq!(Report::decode(&raw, 4, 1), Err(ErrorCode::TooManyObservations));
        let raw = report(vec![1]).pack().unwrap();
        assert_eq!(Report::decode(&raw, 4, 1), Err(ErrorCode::TooFewObservations));
        let raw = report(vec![1, 2]).pack().unwrap();
        assert!(Report::decode(&raw, 4, 1).is_ok());
    }

    #[test]
    fn observers_must_be_unique_committee_members() {
        let mut duplicate = report(vec![1, 2, 3]);
        duplicate.observers = vec![0, 2, 2];
        assert_eq!(
            Report::decode(&duplicate.pack().unwrap(), 4, 1),
            Err(ErrorCode::MalformedReport)
        );

        let mut outside = report(vec![1, 2, 3]);
        outside.observers = vec![0, 1, 4];
        assert_eq!(
            Report::decode(&outside.pack().unwrap(), 4, 1),
            Err(ErrorCode::MalformedReport)
        );
    }

    #[test]
    fn unused_observer_slots_must_be_zero() {
        let mut raw = report(vec![1, 2, 3]).pack().unwrap();
        // last observer slot, past the three in use
        raw[51] = 0xff;
        assert_eq!(Report::unpack(&raw), Err(ErrorCode::MalformedReport));
        raw[51] = 0;
        raw[23] = 3;
        assert_eq!(Report::unpack(&raw), Err(ErrorCode::MalformedReport));
        raw[23] = 0;
        assert!(Report::decode(&raw, 4, 1).is_ok());
    }

    #[test]
    fn pack_checks_lengths() {
        let mut mismatched = report(vec![1, 2, 3]);
        mismatched.observers.pop();
        assert_eq!(mismatched.pack(), Err(ErrorCode::LengthMismatch));

        let oversized = Report {
            observers: vec![0; 300],
            observations: vec![0; 300],
            ..Report::default()
        };
        assert_eq!(oversized.pack(), Err(ErrorCode::TooManyObservations));
        assert!(report(vec![0; MAX_ORACLES]).pack().is_ok());
    }

    #[test]
    fn medians() {
        let even = [10, 12, 15, 20];
        assert_eq!(median(&even, MedianPolicy::LowerMiddle), Some(12));
        assert_eq!(median(&even, MedianPolicy::UpperMiddle), Some(15));
        let odd = [-3, 7, 9];
        assert_eq!(median(&odd, MedianPolicy::LowerMiddle), Some(7));
        assert_eq!(median(&odd, MedianPolicy::UpperMiddle), Some(7));
        assert_eq!(median(&[], MedianPolicy::LowerMiddle), None);
    }

    #[test]
    fn context_words() {
        let context = ReportContext {
            config_digest: [1; 32],
            epoch: 0x0102_0304,
            round: 9,
            extra_hash: [2; 32],
        };
        let words = context.to_words();
        assert_eq!(&words[1][..27], &[0u8; 27]);
        assert_eq!(&words[1][27..], &[1, 2, 3, 4, 9]);
        assert_eq!(ReportContext::from_words(&words), Ok(context));
        assert_eq!(context.epoch_and_round(), 0x0102_0304_09);

        let mut padded = words;
        padded[1][0] = 1;
        assert_eq!(
            ReportContext::from_words(&padded),
            Err(ErrorCode::MalformedReport)
        );
    }
}
