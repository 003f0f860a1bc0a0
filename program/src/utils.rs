// Raffle Program - Account checks and lamport helpers
use solana_program::{
    account_info::AccountInfo, entrypoint::ProgramResult, msg, program_error::ProgramError,
    pubkey::Pubkey,
};

use crate::raffle_error::RaffleError;

pub fn assert_signer(account_info: &AccountInfo, role: &str) -> ProgramResult {
    if !account_info.is_signer {
        msg!("{} must sign the transaction", role);
        return Err(ProgramError::MissingRequiredSignature);
    }
    Ok(())
}

pub fn assert_writable(account_info: &AccountInfo, role: &str) -> ProgramResult {
    if !account_info.is_writable {
        msg!("{} account must be writable", role);
        return Err(ProgramError::InvalidArgument);
    }
    Ok(())
}

pub fn assert_owned_by(account_info: &AccountInfo, owner: &Pubkey) -> ProgramResult {
    if account_info.owner != owner {
        msg!("Account {} must be owned by {}", account_info.key, owner);
        return Err(ProgramError::IncorrectProgramId);
    }
    Ok(())
}

/// Move `amount` lamports out of a program-owned account without dropping it
/// below `min_balance`.
pub fn transfer_lamports(
    from: &AccountInfo,
    to: &AccountInfo,
    amount: u64,
    min_balance: u64,
) -> ProgramResult {
    if !to.is_writable {
        msg!("Recipient {} is not writable", to.key);
        return Err(ProgramError::InvalidArgument);
    }

    let from_balance = from
        .lamports()
        .checked_sub(amount)
        .filter(|remaining| *remaining >= min_balance)
        .ok_or(ProgramError::InsufficientFunds)?;
    let to_balance = to
        .lamports()
        .checked_add(amount)
        .ok_or(RaffleError::ArithmeticOverflow)?;

    **from.try_borrow_mut_lamports()? = from_balance;
    **to.try_borrow_mut_lamports()? = to_balance;
    Ok(())
}

/// Convert lamports to SOL (for display purposes)
pub fn lamports_to_sol(lamports: u64) -> f64 {
    lamports as f64 / 1_000_000_000.0
}
