// Upkeep Raffle
// A time-boxed raffle whose draws are triggered by keepers and settled by a randomness oracle

pub mod events;
pub mod raffle_entrypoint;
pub mod raffle_error;
pub mod raffle_instruction;
pub mod raffle_processor;
pub mod raffle_state;
pub mod utils;

// Randomness request/response protocol
pub mod vrf;

use solana_program::{account_info::AccountInfo, entrypoint::ProgramResult, msg, pubkey::Pubkey};

pub fn process_instruction(
    program_id: &Pubkey,
    accounts: &[AccountInfo],
    instruction_data: &[u8],
) -> ProgramResult {
    raffle_processor::Processor::process(program_id, accounts, instruction_data).map_err(|error| {
        msg!("Raffle instruction failed: {}", error);
        error
    })
}
