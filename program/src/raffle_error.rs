use solana_program::program_error::ProgramError;
use thiserror::Error;

use crate::raffle_state::UpkeepStatus;

/// Errors that may be returned by the Raffle program
#[derive(Error, Debug, Copy, Clone, PartialEq, Eq)]
pub enum RaffleError {
    /// Invalid instruction data passed
    #[error("Invalid instruction data")]
    InvalidInstruction,

    /// Payment is below the entrance fee
    #[error("Payment is below the entrance fee")]
    InsufficientPayment,

    /// Raffle is not accepting entries
    #[error("Raffle is not open")]
    NotOpen,

    /// Upkeep predicate is false; carries the individual conditions
    #[error("Upkeep not needed ({0})")]
    UpkeepNotNeeded(UpkeepStatus),

    /// Fulfillment does not match the outstanding randomness request
    #[error("Unknown randomness request")]
    UnknownRequest,

    /// Raffle is not waiting for randomness
    #[error("Raffle is not calculating a winner")]
    InvalidState,

    /// Prize could not be moved to the winner
    #[error("Payout to winner failed")]
    PayoutFailed,

    /// No room left in the raffle account for another entry
    #[error("Raffle has reached its participant capacity")]
    RaffleFull,

    #[error("Unexpected number of random words")]
    InvalidRandomness,

    /// Initialization parameters out of range
    #[error("Invalid raffle configuration")]
    InvalidConfig,

    /// Fulfillment was not signed by the configured oracle
    #[error("Fulfillment signer is not the raffle oracle")]
    UnauthorizedOracle,

    /// Winner account does not match the selected participant
    #[error("Winner account does not match the selected participant")]
    WinnerAccountMismatch,

    #[error("Arithmetic overflow")]
    ArithmeticOverflow,
}

impl RaffleError {
    /// Stable code reported through `ProgramError::Custom`.
    pub fn code(&self) -> u32 {
        match self {
            RaffleError::InvalidInstruction => 0,
            RaffleError::InsufficientPayment => 1,
            RaffleError::NotOpen => 2,
            RaffleError::UpkeepNotNeeded(_) => 3,
            RaffleError::UnknownRequest => 4,
            RaffleError::InvalidState => 5,
            RaffleError::PayoutFailed => 6,
            RaffleError::RaffleFull => 7,
            RaffleError::InvalidRandomness => 8,
            RaffleError::InvalidConfig => 9,
            RaffleError::UnauthorizedOracle => 10,
            RaffleError::WinnerAccountMismatch => 11,
            RaffleError::ArithmeticOverflow => 12,
        }
    }
}

impl From<RaffleError> for ProgramError {
    fn from(e: RaffleError) -> Self {
        ProgramError::Custom(e.code())
    }
}
