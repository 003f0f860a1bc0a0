use solana_program::{
    instruction::{AccountMeta, Instruction},
    program_error::ProgramError,
    pubkey::Pubkey,
    system_instruction, system_program,
};
use std::mem::size_of;

use crate::raffle_error::RaffleError;
use crate::raffle_state::Raffle;
use crate::vrf::{RandomWord, RequestId};

/// Most random words one fulfillment can encode; the count is a single byte
pub const MAX_RANDOM_WORDS: usize = u8::MAX as usize;

/// Parameters fixed when a raffle is created
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RaffleParams {
    /// Minimum payment per entry in lamports (0.01 SOL = 10,000,000 lamports)
    pub entrance_fee: u64,
    /// Seconds between rounds
    pub interval: i64,
    /// Oracle key hash
    pub gas_lane: [u8; 32],
    pub subscription_id: u64,
    pub callback_gas_limit: u32,
    pub request_confirmations: u16,
}

#[derive(Clone, Debug, PartialEq)]
pub enum RaffleInstruction {
    /// Initialize a raffle in a pre-allocated account
    ///
    /// Accounts expected:
    /// 0. `[signer]` The authority creating the raffle
    /// 1. `[writable]` The raffle account, owned by this program, rent exempt, uninitialized
    /// 2. `[]` The oracle that will fulfill randomness requests
    InitializeRaffle { params: RaffleParams },

    /// Enter the current round
    ///
    /// Accounts expected:
    /// 0. `[signer, writable]` The player paying the entrance fee
    /// 1. `[writable]` The raffle account
    /// 2. `[]` The system program
    EnterRaffle {
        /// Lamports paid, at least the entrance fee
        amount: u64,
    },

    /// Evaluate the upkeep predicate; result is published as return data
    ///
    /// Accounts expected:
    /// 0. `[]` The raffle account
    CheckUpkeep { check_data: Vec<u8> },

    /// Close the round and request randomness (anyone can call this)
    ///
    /// Accounts expected:
    /// 0. `[writable]` The raffle account
    PerformUpkeep { perform_data: Vec<u8> },

    /// Deliver randomness, pay the winner and reopen the raffle
    ///
    /// Accounts expected:
    /// 0. `[signer]` The raffle oracle
    /// 1. `[writable]` The raffle account
    /// 2. `[writable]` The selected winner
    ///
    /// At most [`MAX_RANDOM_WORDS`] words are encoded.
    FulfillRandomness {
        request_id: RequestId,
        random_words: Vec<RandomWord>,
    },
}

impl RaffleInstruction {
    /// Unpacks a byte buffer into a RaffleInstruction
    pub fn unpack(input: &[u8]) -> Result<Self, ProgramError> {
        let (tag, rest) = input
            .split_first()
            .ok_or(RaffleError::InvalidInstruction)?;

        Ok(match tag {
            0 => {
                let (entrance_fee, rest) = Self::unpack_u64(rest)?;
                let (interval, rest) = Self::unpack_i64(rest)?;
                let (gas_lane, rest) = Self::unpack_fixed_bytes::<32>(rest)?;
                let (subscription_id, rest) = Self::unpack_u64(rest)?;
                let (callback_gas_limit, rest) = Self::unpack_u32(rest)?;
                let (request_confirmations, _) = Self::unpack_u16(rest)?;
                Self::InitializeRaffle {
                    params: RaffleParams {
                        entrance_fee,
                        interval,
                        gas_lane,
                        subscription_id,
                        callback_gas_limit,
                        request_confirmations,
                    },
                }
            }
            1 => {
                let (amount, _) = Self::unpack_u64(rest)?;
                Self::EnterRaffle { amount }
            }
            2 => {
                let (check_data, _) = Self::unpack_bytes(rest)?;
                Self::CheckUpkeep { check_data }
            }
            3 => {
                let (perform_data, _) = Self::unpack_bytes(rest)?;
                Self::PerformUpkeep { perform_data }
            }
            4 => {
                let (request_id, rest) = Self::unpack_fixed_bytes::<32>(rest)?;
                let (&count, mut rest) = rest
                    .split_first()
                    .ok_or(RaffleError::InvalidInstruction)?;
                let mut random_words = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    let (word, next) = Self::unpack_fixed_bytes::<32>(rest)?;
                    random_words.push(RandomWord(word));
                    rest = next;
                }
                Self::FulfillRandomness {
                    request_id: RequestId(request_id),
                    random_words,
                }
            }
            _ => return Err(RaffleError::InvalidInstruction.into()),
        })
    }

    /// Packs a RaffleInstruction into a byte buffer
    pub fn pack(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(size_of::<Self>());
        match self {
            Self::InitializeRaffle { params } => {
                buf.push(0);
                buf.extend_from_slice(&params.entrance_fee.to_le_bytes());
                buf.extend_from_slice(&params.interval.to_le_bytes());
                buf.extend_from_slice(&params.gas_lane);
                buf.extend_from_slice(&params.subscription_id.to_le_bytes());
                buf.extend_from_slice(&params.callback_gas_limit.to_le_bytes());
                buf.extend_from_slice(&params.request_confirmations.to_le_bytes());
            }
            Self::EnterRaffle { amount } => {
                buf.push(1);
                buf.extend_from_slice(&amount.to_le_bytes());
            }
            Self::CheckUpkeep { check_data } => {
                buf.push(2);
                Self::pack_bytes(&mut buf, check_data);
            }
            Self::PerformUpkeep { perform_data } => {
                buf.push(3);
                Self::pack_bytes(&mut buf, perform_data);
            }
            Self::FulfillRandomness {
                request_id,
                random_words,
            } => {
                buf.push(4);
                buf.extend_from_slice(&request_id.0);
                let count = u8::try_from(random_words.len()).unwrap_or(u8::MAX);
                buf.push(count);
                for word in random_words.iter().take(count as usize) {
                    buf.extend_from_slice(&word.0);
                }
            }
        }
        buf
    }

    fn unpack_fixed_bytes<const N: usize>(input: &[u8]) -> Result<([u8; N], &[u8]), ProgramError> {
        if input.len() < N {
            return Err(RaffleError::InvalidInstruction.into());
        }
        let (bytes, rest) = input.split_at(N);
        let mut array = [0u8; N];
        array.copy_from_slice(bytes);
        Ok((array, rest))
    }

    fn unpack_u64(input: &[u8]) -> Result<(u64, &[u8]), ProgramError> {
        let (bytes, rest) = Self::unpack_fixed_bytes::<8>(input)?;
        Ok((u64::from_le_bytes(bytes), rest))
    }

    fn unpack_i64(input: &[u8]) -> Result<(i64, &[u8]), ProgramError> {
        let (bytes, rest) = Self::unpack_fixed_bytes::<8>(input)?;
        Ok((i64::from_le_bytes(bytes), rest))
    }

    fn unpack_u32(input: &[u8]) -> Result<(u32, &[u8]), ProgramError> {
        let (bytes, rest) = Self::unpack_fixed_bytes::<4>(input)?;
        Ok((u32::from_le_bytes(bytes), rest))
    }

    fn unpack_u16(input: &[u8]) -> Result<(u16, &[u8]), ProgramError> {
        let (bytes, rest) = Self::unpack_fixed_bytes::<2>(input)?;
        Ok((u16::from_le_bytes(bytes), rest))
    }

    /// u32 length prefix followed by the bytes
    fn unpack_bytes(input: &[u8]) -> Result<(Vec<u8>, &[u8]), ProgramError> {
        let (len, rest) = Self::unpack_u32(input)?;
        let len = len as usize;
        if rest.len() < len {
            return Err(RaffleError::InvalidInstruction.into());
        }
        let (bytes, rest) = rest.split_at(len);
        Ok((bytes.to_vec(), rest))
    }

    fn pack_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
        buf.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
        buf.extend_from_slice(bytes);
    }
}

/// Create the system instruction allocating a raffle account with room for
/// `max_participants` entries
pub fn create_raffle_account(
    program_id: &Pubkey,
    payer: &Pubkey,
    raffle_account: &Pubkey,
    lamports: u64,
    max_participants: u32,
) -> Instruction {
    system_instruction::create_account(
        payer,
        raffle_account,
        lamports,
        Raffle::space(max_participants) as u64,
        program_id,
    )
}

/// Create initialize_raffle instruction
pub fn initialize_raffle(
    program_id: &Pubkey,
    authority: &Pubkey,
    raffle_account: &Pubkey,
    oracle: &Pubkey,
    params: RaffleParams,
) -> Instruction {
    let data = RaffleInstruction::InitializeRaffle { params }.pack();

    let accounts = vec![
        AccountMeta::new_readonly(*authority, true),
        AccountMeta::new(*raffle_account, false),
        AccountMeta::new_readonly(*oracle, false),
    ];

    Instruction {
        program_id: *program_id,
        accounts,
        data,
    }
}

/// Create enter_raffle instruction
pub fn enter_raffle(
    program_id: &Pubkey,
    player: &Pubkey,
    raffle_account: &Pubkey,
    amount: u64,
) -> Instruction {
    let data = RaffleInstruction::EnterRaffle { amount }.pack();

    let accounts = vec![
        AccountMeta::new(*player, true),
        AccountMeta::new(*raffle_account, false),
        AccountMeta::new_readonly(system_program::id(), false),
    ];

    Instruction {
        program_id: *program_id,
        accounts,
        data,
    }
}

/// Create check_upkeep instruction
pub fn check_upkeep(program_id: &Pubkey, raffle_account: &Pubkey) -> Instruction {
    let data = RaffleInstruction::CheckUpkeep {
        check_data: Vec::new(),
    }
    .pack();

    Instruction {
        program_id: *program_id,
        accounts: vec![AccountMeta::new_readonly(*raffle_account, false)],
        data,
    }
}

/// Create perform_upkeep instruction
pub fn perform_upkeep(
    program_id: &Pubkey,
    raffle_account: &Pubkey,
    perform_data: Vec<u8>,
) -> Instruction {
    let data = RaffleInstruction::PerformUpkeep { perform_data }.pack();

    Instruction {
        program_id: *program_id,
        accounts: vec![AccountMeta::new(*raffle_account, false)],
        data,
    }
}

/// Create fulfill_randomness instruction
pub fn fulfill_randomness(
    program_id: &Pubkey,
    oracle: &Pubkey,
    raffle_account: &Pubkey,
    winner: &Pubkey,
    request_id: RequestId,
    random_words: Vec<RandomWord>,
) -> Result<Instruction, ProgramError> {
    if random_words.len() > MAX_RANDOM_WORDS {
        return Err(RaffleError::InvalidRandomness.into());
    }
    let data = RaffleInstruction::FulfillRandomness {
        request_id,
        random_words,
    }
    .pack();

    let accounts = vec![
        AccountMeta::new_readonly(*oracle, true),
        AccountMeta::new(*raffle_account, false),
        AccountMeta::new(*winner, false),
    ];

    Ok(Instruction {
        program_id: *program_id,
        accounts,
        data,
    })
}
