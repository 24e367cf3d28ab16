use std::fmt;

use k256::ecdsa::{RecoveryId, Signature as EcdsaSignature, SigningKey, VerifyingKey};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};

use crate::report::ReportContext;
use crate::state::{Address, ConfigStore};
use crate::{ErrorCode, Result};

/// Signatures a transmission may carry relative to the committee's fault tolerance `f`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignaturePolicy {
    /// Exactly `f + 1`.
    #[default]
    Exact,
    /// Anywhere from `f + 1` up to the committee size.
    AtLeast,
}

impl SignaturePolicy {
    pub fn accepts(&self, count: usize, f: u8, n: usize) -> bool {
        let required = usize::from(f) + 1;
        match self {
            SignaturePolicy::Exact => count == required,
            SignaturePolicy::AtLeast => (required..=n).contains(&count),
        }
    }
}

pub fn keccak256(data: &[u8]) -> [u8; 32] {
    Keccak256::digest(data).into()
}

pub fn keccak256_concat(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

/// The digest oracles sign: the report hash bound to its context words.
pub fn report_hash(report_context: &[[u8; 32]; 3], report: &[u8]) -> [u8; 32] {
    let report = keccak256(report);
    keccak256_concat(&[
        &report,
        &report_context[0],
        &report_context[1],
        &report_context[2],
    ])
}

/// Ethereum address of a secp256k1 public key.
pub fn address_of(key: &VerifyingKey) -> Address {
    let point = key.to_encoded_point(false);
    // skip the 0x04 prefix
    let hash = keccak256(&point.as_bytes()[1..]);
    let mut address = [0u8; 20];
    address.copy_from_slice(&hash[12..]);
    Address(address)
}

/// Recovers the identity that produced a signature over `hash`.
pub trait SignerRecovery {
    fn recover(&self, hash: &[u8; 32], r: &[u8; 32], s: &[u8; 32], v: u8) -> Result<Address>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct Secp256k1Recovery;

impl SignerRecovery for Secp256k1Recovery {
    fn recover(&self, hash: &[u8; 32], r: &[u8; 32], s: &[u8; 32], v: u8) -> Result<Address> {
        require!(v <= 1, InvalidSignature);
        let mut bytes = [0u8; 64];
        bytes[..32].copy_from_slice(r);
        bytes[32..].copy_from_slice(s);
        let signature =
            EcdsaSignature::from_slice(&bytes).map_err(|_| ErrorCode::InvalidSignature)?;
        let recovery_id = RecoveryId::from_byte(v).ok_or(ErrorCode::InvalidSignature)?;
        let key = VerifyingKey::recover_from_prehash(hash, &signature, recovery_id)
            .map_err(|_| ErrorCode::InvalidSignature)?;
        Ok(address_of(&key))
    }
}

/// Checks detached signatures against the active committee and returns the transmitters
/// paired with the recovered signers, in signature order.
pub fn verify<R: SignerRecovery + ?Sized>(
    recovery: &R,
    config: &ConfigStore,
    policy: SignaturePolicy,
    hash: &[u8; 32],
    rs: &[[u8; 32]],
    ss: &[[u8; 32]],
    raw_vs: &[u8; 32],
) -> Result<Vec<Address>> {
    require!(rs.len() == ss.len(), LengthMismatch);
    require!(
        policy.accepts(rs.len(), config.f, config.oracles.len()),
        InvalidSignatureCount
    );

    let mut uniques = 0u32;
    let mut transmitters = Vec::with_capacity(rs.len());
    for (i, (r, s)) in rs.iter().zip(ss).enumerate() {
        let signer = recovery.recover(hash, r, s, raw_vs[i])?;
        let index = config
            .signer_index(&signer)
            .ok_or(ErrorCode::UnauthorizedSigner)?;
        let bit = 1u32 << index;
        require!(uniques & bit == 0, DuplicateSignature);
        uniques |= bit;
        transmitters.push(config.oracles[index].transmitter);
    }

    Ok(transmitters)
}

/// A detached recoverable signature.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Signature {
    pub r: [u8; 32],
    pub s: [u8; 32],
    pub v: u8,
}

/// Splits signatures into the `(rs, ss, raw_vs)` arguments of a transmission.
pub fn pack_signatures(signatures: &[Signature]) -> Result<(Vec<[u8; 32]>, Vec<[u8; 32]>, [u8; 32])> {
    require!(signatures.len() <= 32, InvalidSignatureCount);
    let mut raw_vs = [0u8; 32];
    for (v, signature) in raw_vs.iter_mut().zip(signatures) {
        *v = signature.v;
    }
    Ok((
        signatures.iter().map(|signature| signature.r).collect(),
        signatures.iter().map(|signature| signature.s).collect(),
        raw_vs,
    ))
}

/// Signs reports the way committee members do.
#[derive(Clone)]
pub struct OnchainKeyring {
    key: SigningKey,
}

impl OnchainKeyring {
    pub fn from_secret(secret: &[u8; 32]) -> Result<Self> {
        let key = SigningKey::from_slice(secret).map_err(|_| ErrorCode::InvalidInput)?;
        Ok(Self { key })
    }

    pub fn address(&self) -> Address {
        address_of(self.key.verifying_key())
    }

    pub fn sign(&self, report_context: &ReportContext, report: &[u8]) -> Result<Signature> {
        let hash = report_hash(&report_context.to_words(), report);
        let (signature, recovery_id) = self
            .key
            .sign_prehash_recoverable(&hash)
            .map_err(|_| ErrorCode::InvalidSignature)?;
        let bytes = signature.to_bytes();
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&bytes[..32]);
        s.copy_from_slice(&bytes[32..]);
        Ok(Signature {
            r,
            s,
            v: recovery_id.to_byte(),
        })
    }
}

impl fmt::Debug for OnchainKeyring {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OnchainKeyring")
            .field("address", &self.address())
            .finish()
    }
}
