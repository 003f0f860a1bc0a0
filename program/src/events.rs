// Notifications for off-chain observers; they never feed back into raffle state
use borsh::{BorshDeserialize, BorshSerialize};
use solana_program::{log::sol_log_data, msg, pubkey::Pubkey};
use std::fmt;

use crate::vrf::RequestId;

#[derive(BorshSerialize, BorshDeserialize, Clone, Debug, PartialEq, Eq)]
pub enum RaffleEvent {
    /// A player joined the current round
    Entered { player: Pubkey, amount: u64 },
    /// The round closed and randomness was requested
    RandomnessRequested { request_id: RequestId },
    /// The pool was paid out and the raffle reopened
    WinnerPicked { winner: Pubkey, amount: u64 },
}

impl RaffleEvent {
    /// Log the event as a readable line and as borsh-encoded program data.
    pub fn emit(&self) {
        msg!("{}", self);
        match self.try_to_vec() {
            Ok(data) => sol_log_data(&[&data]),
            Err(_) => msg!("Failed to encode raffle event"),
        }
    }
}

impl fmt::Display for RaffleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RaffleEvent::Entered { player, amount } => {
                write!(f, "RaffleEnter: player={} amount={}", player, amount)
            }
            RaffleEvent::RandomnessRequested { request_id } => {
                write!(f, "RequestedRaffleWinner: request_id={}", request_id)
            }
            RaffleEvent::WinnerPicked { winner, amount } => {
                write!(f, "WinnerPicked: winner={} amount={}", winner, amount)
            }
        }
    }
}
