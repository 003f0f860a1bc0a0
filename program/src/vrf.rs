// Randomness request/fulfillment protocol between a raffle and its oracle
use borsh::{BorshDeserialize, BorshSerialize};
use solana_program::{
    hash::{hashv, Hash},
    msg,
    pubkey::Pubkey,
};
use std::fmt;

use crate::raffle_error::RaffleError;

/// Random words requested per draw
pub const NUM_WORDS: u32 = 1;

pub const MIN_REQUEST_CONFIRMATIONS: u16 = 1;
pub const MAX_REQUEST_CONFIRMATIONS: u16 = 255;
pub const MIN_CALLBACK_GAS_LIMIT: u32 = 10_000;
pub const MAX_CALLBACK_GAS_LIMIT: u32 = 1_000_000;

const REQUEST_ID_SEED: &[u8] = b"randomness-request";

/// Identifier correlating a randomness request with its fulfillment
#[derive(BorshSerialize, BorshDeserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RequestId(pub [u8; 32]);

impl From<u64> for RequestId {
    fn from(value: u64) -> Self {
        let mut bytes = [0u8; 32];
        bytes[24..].copy_from_slice(&value.to_be_bytes());
        RequestId(bytes)
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Hash::new_from_array(self.0))
    }
}

/// One oracle output, read as a big-endian 256-bit unsigned integer
#[derive(BorshSerialize, BorshDeserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RandomWord(pub [u8; 32]);

impl From<u64> for RandomWord {
    fn from(value: u64) -> Self {
        let mut bytes = [0u8; 32];
        bytes[24..].copy_from_slice(&value.to_be_bytes());
        RandomWord(bytes)
    }
}

/// Parameters forwarded verbatim to the oracle with every request
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RandomnessRequest {
    /// Key hash selecting the oracle lane
    pub gas_lane: [u8; 32],
    pub subscription_id: u64,
    pub request_confirmations: u16,
    pub callback_gas_limit: u32,
    pub num_words: u32,
    /// Per-raffle request sequence number, starting at 1
    pub nonce: u64,
}

/// Anything able to accept a randomness request and hand back its identifier.
///
/// The random value itself never comes back through this call; it arrives later
/// in a separate fulfillment.
pub trait RandomnessOracle {
    fn request_randomness(&mut self, request: &RandomnessRequest) -> Result<RequestId, RaffleError>;
}

/// On-chain oracle binding: derives the request id and publishes the request
/// in the transaction log, where the off-chain oracle picks it up.
pub struct LogOracle {
    raffle: Pubkey,
    oracle: Pubkey,
}

impl LogOracle {
    pub fn new(raffle: Pubkey, oracle: Pubkey) -> Self {
        Self { raffle, oracle }
    }
}

impl RandomnessOracle for LogOracle {
    fn request_randomness(&mut self, request: &RandomnessRequest) -> Result<RequestId, RaffleError> {
        let request_id = derive_request_id(&self.raffle, &self.oracle, request);
        msg!(
            "Randomness request {} for raffle {}: oracle={}, subscription={}, confirmations={}, callback_gas_limit={}, words={}",
            request.nonce,
            self.raffle,
            self.oracle,
            request.subscription_id,
            request.request_confirmations,
            request.callback_gas_limit,
            request.num_words
        );
        Ok(request_id)
    }
}

/// Request ids are unique per (raffle, oracle, lane, subscription, nonce).
pub fn derive_request_id(raffle: &Pubkey, oracle: &Pubkey, request: &RandomnessRequest) -> RequestId {
    let hash = hashv(&[
        REQUEST_ID_SEED,
        raffle.as_ref(),
        oracle.as_ref(),
        &request.gas_lane,
        &request.subscription_id.to_le_bytes(),
        &request.nonce.to_le_bytes(),
    ]);
    RequestId(hash.to_bytes())
}

/// Reduce a random word modulo the participant count, using all 256 bits.
pub fn winner_index(word: &RandomWord, participants: usize) -> usize {
    if participants == 0 {
        return 0;
    }

    let modulus = participants as u128;
    let remainder = word
        .0
        .iter()
        .fold(0u128, |acc, byte| (acc * 256 + *byte as u128) % modulus);
    remainder as usize
}
