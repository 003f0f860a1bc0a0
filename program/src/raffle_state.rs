use arrayref::{array_mut_ref, array_ref, array_refs, mut_array_refs};
use borsh::{BorshDeserialize, BorshSerialize};
use solana_program::{
    borsh::try_from_slice_unchecked,
    clock::UnixTimestamp,
    entrypoint::ProgramResult,
    msg,
    program_error::ProgramError,
    program_pack::{IsInitialized, Pack, Sealed},
    pubkey::Pubkey,
};
use std::{convert::TryFrom, fmt, mem};

use crate::events::RaffleEvent;
use crate::raffle_error::RaffleError;
use crate::vrf::{
    self, RandomWord, RandomnessOracle, RandomnessRequest, RequestId, MAX_CALLBACK_GAS_LIMIT,
    MAX_REQUEST_CONFIRMATIONS, MIN_CALLBACK_GAS_LIMIT, MIN_REQUEST_CONFIRMATIONS, NUM_WORDS,
};

/// Most entries a raffle account may hold. Every instruction decodes the
/// whole participant list, and the decode has to fit the 32 KiB program heap.
pub const PARTICIPANT_LIMIT: u32 = 256;

/// Lifecycle state of a raffle
#[derive(BorshSerialize, BorshDeserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum RaffleState {
    /// Accepting entries, waiting for upkeep
    Open,
    /// Randomness requested, entries rejected
    Calculating,
}

impl TryFrom<u8> for RaffleState {
    type Error = &'static str;

    fn try_from(val: u8) -> Result<Self, Self::Error> {
        match val {
            0 => Ok(RaffleState::Open),
            1 => Ok(RaffleState::Calculating),
            _ => Err("Invalid raffle state"),
        }
    }
}

impl From<RaffleState> for u8 {
    fn from(state: RaffleState) -> Self {
        match state {
            RaffleState::Open => 0,
            RaffleState::Calculating => 1,
        }
    }
}

/// Immutable raffle parameters, stored at the head of the raffle account
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RaffleConfig {
    /// Is the account initialized
    pub is_initialized: bool,
    /// Creator of the raffle
    pub authority: Pubkey,
    /// The only key allowed to fulfill randomness requests
    pub oracle: Pubkey,
    /// Minimum payment per entry in lamports
    pub entrance_fee: u64,
    /// Seconds that must pass between rounds
    pub interval: i64,
    /// Oracle key hash
    pub gas_lane: [u8; 32],
    pub subscription_id: u64,
    pub callback_gas_limit: u32,
    pub request_confirmations: u16,
    /// Entries the account was sized for
    pub max_participants: u32,
}

impl RaffleConfig {
    pub fn validate(&self) -> Result<(), RaffleError> {
        if self.entrance_fee == 0 {
            msg!("Entrance fee must be greater than zero");
            return Err(RaffleError::InvalidConfig);
        }
        if self.interval < 0 {
            msg!("Interval cannot be negative");
            return Err(RaffleError::InvalidConfig);
        }
        if !(MIN_REQUEST_CONFIRMATIONS..=MAX_REQUEST_CONFIRMATIONS)
            .contains(&self.request_confirmations)
        {
            msg!(
                "Request confirmations must be within {}..={}",
                MIN_REQUEST_CONFIRMATIONS,
                MAX_REQUEST_CONFIRMATIONS
            );
            return Err(RaffleError::InvalidConfig);
        }
        if !(MIN_CALLBACK_GAS_LIMIT..=MAX_CALLBACK_GAS_LIMIT).contains(&self.callback_gas_limit) {
            msg!(
                "Callback gas limit must be within {}..={}",
                MIN_CALLBACK_GAS_LIMIT,
                MAX_CALLBACK_GAS_LIMIT
            );
            return Err(RaffleError::InvalidConfig);
        }
        if self.max_participants == 0 {
            msg!("Raffle account has no room for participants");
            return Err(RaffleError::InvalidConfig);
        }
        if self.max_participants > PARTICIPANT_LIMIT {
            msg!(
                "Raffle cannot hold more than {} participants, asked for {}",
                PARTICIPANT_LIMIT,
                self.max_participants
            );
            return Err(RaffleError::InvalidConfig);
        }
        Ok(())
    }
}

impl Sealed for RaffleConfig {}

impl IsInitialized for RaffleConfig {
    fn is_initialized(&self) -> bool {
        self.is_initialized
    }
}

impl Pack for RaffleConfig {
    const LEN: usize = 1 + 32 + 32 + 8 + 8 + 32 + 8 + 4 + 2 + 4;

    fn unpack_from_slice(src: &[u8]) -> Result<Self, ProgramError> {
        let src = array_ref![src, 0, RaffleConfig::LEN];
        let (
            is_initialized,
            authority,
            oracle,
            entrance_fee,
            interval,
            gas_lane,
            subscription_id,
            callback_gas_limit,
            request_confirmations,
            max_participants,
        ) = array_refs![src, 1, 32, 32, 8, 8, 32, 8, 4, 2, 4];

        let is_initialized = match is_initialized[0] {
            0 => false,
            1 => true,
            _ => return Err(ProgramError::InvalidAccountData),
        };

        Ok(RaffleConfig {
            is_initialized,
            authority: Pubkey::new_from_array(*authority),
            oracle: Pubkey::new_from_array(*oracle),
            entrance_fee: u64::from_le_bytes(*entrance_fee),
            interval: i64::from_le_bytes(*interval),
            gas_lane: *gas_lane,
            subscription_id: u64::from_le_bytes(*subscription_id),
            callback_gas_limit: u32::from_le_bytes(*callback_gas_limit),
            request_confirmations: u16::from_le_bytes(*request_confirmations),
            max_participants: u32::from_le_bytes(*max_participants),
        })
    }

    fn pack_into_slice(&self, dst: &mut [u8]) {
        let dst = array_mut_ref![dst, 0, RaffleConfig::LEN];
        let (
            is_initialized_dst,
            authority_dst,
            oracle_dst,
            entrance_fee_dst,
            interval_dst,
            gas_lane_dst,
            subscription_id_dst,
            callback_gas_limit_dst,
            request_confirmations_dst,
            max_participants_dst,
        ) = mut_array_refs![dst, 1, 32, 32, 8, 8, 32, 8, 4, 2, 4];

        is_initialized_dst[0] = self.is_initialized as u8;
        authority_dst.copy_from_slice(self.authority.as_ref());
        oracle_dst.copy_from_slice(self.oracle.as_ref());
        *entrance_fee_dst = self.entrance_fee.to_le_bytes();
        *interval_dst = self.interval.to_le_bytes();
        gas_lane_dst.copy_from_slice(&self.gas_lane);
        *subscription_id_dst = self.subscription_id.to_le_bytes();
        *callback_gas_limit_dst = self.callback_gas_limit.to_le_bytes();
        *request_confirmations_dst = self.request_confirmations.to_le_bytes();
        *max_participants_dst = self.max_participants.to_le_bytes();
    }
}

/// Mutable per-round data, borsh-encoded after the config header
#[derive(BorshSerialize, BorshDeserialize, Clone, Debug, PartialEq, Eq)]
struct Round {
    state: RaffleState,
    last_timestamp: UnixTimestamp,
    pooled_balance: u64,
    outstanding_request: Option<RequestId>,
    request_nonce: u64,
    recent_winner: Option<Pubkey>,
    participants: Vec<Pubkey>,
}

impl Round {
    // state, last_timestamp, pooled_balance, outstanding_request,
    // request_nonce, recent_winner, participants length prefix
    const FIXED_LEN: usize = 1 + 8 + 8 + (1 + 32) + 8 + (1 + 32) + 4;
}

/// Individual conditions of the upkeep predicate
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UpkeepStatus {
    pub is_open: bool,
    pub time_passed: bool,
    pub has_players: bool,
    pub has_balance: bool,
}

impl UpkeepStatus {
    pub fn needed(&self) -> bool {
        self.is_open && self.time_passed && self.has_players && self.has_balance
    }
}

impl fmt::Display for UpkeepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "open={} time_passed={} has_players={} has_balance={}",
            self.is_open, self.time_passed, self.has_players, self.has_balance
        )
    }
}

/// A raffle: immutable config plus the state of the current round.
///
/// Every mutation goes through [`Raffle::enter`], [`Raffle::perform_upkeep`]
/// and [`Raffle::fulfill_randomness`]. Each either applies completely or
/// leaves the raffle untouched.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Raffle {
    config: RaffleConfig,
    round: Round,
}

impl Raffle {
    /// Start a raffle in the `Open` state with an empty pool.
    pub fn new(config: RaffleConfig, now: UnixTimestamp) -> Result<Self, RaffleError> {
        config.validate()?;
        Ok(Self {
            config: RaffleConfig {
                is_initialized: true,
                ..config
            },
            round: Round {
                state: RaffleState::Open,
                last_timestamp: now,
                pooled_balance: 0,
                outstanding_request: None,
                request_nonce: 0,
                recent_winner: None,
                participants: Vec::new(),
            },
        })
    }

    /// Account size needed to hold `max_participants` entries.
    pub fn space(max_participants: u32) -> usize {
        RaffleConfig::LEN + Round::FIXED_LEN + max_participants as usize * 32
    }

    /// Number of entries an account of `data_len` bytes can hold, never
    /// more than [`PARTICIPANT_LIMIT`].
    pub fn capacity(data_len: usize) -> u32 {
        let fixed = RaffleConfig::LEN + Round::FIXED_LEN;
        let slots = data_len.saturating_sub(fixed) / 32;
        u32::try_from(slots).map_or(PARTICIPANT_LIMIT, |slots| slots.min(PARTICIPANT_LIMIT))
    }

    pub fn unpack_from_account_data(data: &[u8]) -> Result<Self, ProgramError> {
        if data.len() < RaffleConfig::LEN + Round::FIXED_LEN {
            return Err(ProgramError::AccountDataTooSmall);
        }
        let (header, body) = data.split_at(RaffleConfig::LEN);
        let config = RaffleConfig::unpack(header)?;
        let round = try_from_slice_unchecked::<Round>(body)
            .map_err(|_| ProgramError::InvalidAccountData)?;
        Ok(Self { config, round })
    }

    pub fn pack_into_account_data(&self, dst: &mut [u8]) -> ProgramResult {
        if dst.len() < Raffle::space(self.config.max_participants) {
            return Err(ProgramError::AccountDataTooSmall);
        }
        let (header, mut body) = dst.split_at_mut(RaffleConfig::LEN);
        self.config.pack_into_slice(header);
        self.round
            .serialize(&mut body)
            .map_err(|_| ProgramError::AccountDataTooSmall)
    }

    /// Admit `player` into the current round.
    pub fn enter(&mut self, player: Pubkey, amount: u64) -> Result<RaffleEvent, RaffleError> {
        if self.round.state != RaffleState::Open {
            msg!("Raffle is not open");
            return Err(RaffleError::NotOpen);
        }
        if amount < self.config.entrance_fee {
            msg!(
                "Payment of {} lamports is below the entrance fee of {}",
                amount,
                self.config.entrance_fee
            );
            return Err(RaffleError::InsufficientPayment);
        }
        if self.round.participants.len() >= self.config.max_participants as usize {
            msg!("Raffle is full at {} participants", self.config.max_participants);
            return Err(RaffleError::RaffleFull);
        }
        let pooled_balance = self
            .round
            .pooled_balance
            .checked_add(amount)
            .ok_or(RaffleError::ArithmeticOverflow)?;

        self.round.participants.push(player);
        self.round.pooled_balance = pooled_balance;
        Ok(RaffleEvent::Entered { player, amount })
    }

    /// Evaluate the upkeep predicate at `now` without touching state.
    pub fn check_upkeep(&self, now: UnixTimestamp) -> UpkeepStatus {
        let time_passed = now
            .checked_sub(self.round.last_timestamp)
            .map_or(false, |elapsed| elapsed >= self.config.interval);

        UpkeepStatus {
            is_open: self.round.state == RaffleState::Open,
            time_passed,
            has_players: !self.round.participants.is_empty(),
            has_balance: self.round.pooled_balance > 0,
        }
    }

    /// Close the round and ask `oracle` for randomness.
    ///
    /// The predicate is re-checked here since the caller's `check_upkeep`
    /// result may be stale by the time this runs.
    pub fn perform_upkeep<O: RandomnessOracle + ?Sized>(
        &mut self,
        now: UnixTimestamp,
        oracle: &mut O,
    ) -> Result<RaffleEvent, RaffleError> {
        let status = self.check_upkeep(now);
        if !status.needed() {
            msg!("Upkeep not needed: {}", status);
            return Err(RaffleError::UpkeepNotNeeded(status));
        }

        let request = self.next_request()?;
        let request_id = oracle.request_randomness(&request)?;

        self.round.state = RaffleState::Calculating;
        self.round.outstanding_request = Some(request_id);
        self.round.request_nonce = request.nonce;
        Ok(RaffleEvent::RandomnessRequested { request_id })
    }

    /// Validate a fulfillment and return the winning index and participant,
    /// without changing anything.
    pub fn selected_winner(
        &self,
        request_id: &RequestId,
        random_words: &[RandomWord],
    ) -> Result<(usize, Pubkey), RaffleError> {
        if self.round.outstanding_request.as_ref() != Some(request_id) {
            msg!("No outstanding randomness request {}", request_id);
            return Err(RaffleError::UnknownRequest);
        }
        if self.round.state != RaffleState::Calculating {
            return Err(RaffleError::InvalidState);
        }
        if random_words.len() != NUM_WORDS as usize {
            msg!(
                "Expected {} random words, got {}",
                NUM_WORDS,
                random_words.len()
            );
            return Err(RaffleError::InvalidRandomness);
        }
        if self.round.participants.is_empty() {
            return Err(RaffleError::InvalidState);
        }

        let index = vrf::winner_index(&random_words[0], self.round.participants.len());
        Ok((index, self.round.participants[index]))
    }

    /// Pick the winner, reset the round and pay out the whole pool.
    ///
    /// Bookkeeping is committed before `payout` runs. If `payout` fails the
    /// pre-fulfillment state is restored and `PayoutFailed` is returned.
    pub fn fulfill_randomness<F>(
        &mut self,
        request_id: &RequestId,
        random_words: &[RandomWord],
        now: UnixTimestamp,
        payout: F,
    ) -> Result<RaffleEvent, RaffleError>
    where
        F: FnOnce(&Pubkey, u64) -> ProgramResult,
    {
        let (index, winner) = self.selected_winner(request_id, random_words)?;
        let amount = self.round.pooled_balance;
        msg!(
            "Winner index {} of {} participants: {}",
            index,
            self.round.participants.len(),
            winner
        );

        // Scalars are copied and the participant list is moved aside, so the
        // rollback path allocates nothing.
        let previous_timestamp = self.round.last_timestamp;
        let previous_winner = self.round.recent_winner;
        let entrants = mem::take(&mut self.round.participants);
        self.round.recent_winner = Some(winner);
        self.round.pooled_balance = 0;
        self.round.last_timestamp = now;
        self.round.outstanding_request = None;
        self.round.state = RaffleState::Open;

        if let Err(error) = payout(&winner, amount) {
            msg!("Payout of {} lamports to {} failed: {}", amount, winner, error);
            self.round.participants = entrants;
            self.round.recent_winner = previous_winner;
            self.round.pooled_balance = amount;
            self.round.last_timestamp = previous_timestamp;
            self.round.outstanding_request = Some(*request_id);
            self.round.state = RaffleState::Calculating;
            return Err(RaffleError::PayoutFailed);
        }

        Ok(RaffleEvent::WinnerPicked { winner, amount })
    }

    fn next_request(&self) -> Result<RandomnessRequest, RaffleError> {
        Ok(RandomnessRequest {
            gas_lane: self.config.gas_lane,
            subscription_id: self.config.subscription_id,
            request_confirmations: self.config.request_confirmations,
            callback_gas_limit: self.config.callback_gas_limit,
            num_words: NUM_WORDS,
            nonce: self
                .round
                .request_nonce
                .checked_add(1)
                .ok_or(RaffleError::ArithmeticOverflow)?,
        })
    }

    pub fn config(&self) -> &RaffleConfig {
        &self.config
    }

    pub fn entrance_fee(&self) -> u64 {
        self.config.entrance_fee
    }

    pub fn interval(&self) -> i64 {
        self.config.interval
    }

    pub fn oracle(&self) -> Pubkey {
        self.config.oracle
    }

    pub fn request_confirmations(&self) -> u16 {
        self.config.request_confirmations
    }

    pub fn num_words(&self) -> u32 {
        NUM_WORDS
    }

    pub fn state(&self) -> RaffleState {
        self.round.state
    }

    /// State as exposed to external readers: 0 = open, 1 = calculating.
    pub fn state_code(&self) -> u8 {
        self.round.state.into()
    }

    pub fn pooled_balance(&self) -> u64 {
        self.round.pooled_balance
    }

    pub fn num_players(&self) -> usize {
        self.round.participants.len()
    }

    pub fn player(&self, index: usize) -> Option<Pubkey> {
        self.round.participants.get(index).copied()
    }

    pub fn recent_winner(&self) -> Option<Pubkey> {
        self.round.recent_winner
    }

    pub fn last_timestamp(&self) -> UnixTimestamp {
        self.round.last_timestamp
    }

    pub fn outstanding_request(&self) -> Option<RequestId> {
        self.round.outstanding_request
    }
}
