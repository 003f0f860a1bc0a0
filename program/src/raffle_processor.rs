use borsh::BorshSerialize;
use solana_program::{
    account_info::{next_account_info, AccountInfo},
    entrypoint::ProgramResult,
    msg,
    program::{invoke, set_return_data},
    program_error::ProgramError,
    program_pack::Pack,
    pubkey::Pubkey,
    system_instruction, system_program,
    sysvar::{clock::Clock, rent::Rent, Sysvar},
};

use crate::raffle_error::RaffleError;
use crate::raffle_instruction::{RaffleInstruction, RaffleParams};
use crate::raffle_state::{Raffle, RaffleConfig};
use crate::utils::{self, assert_owned_by, assert_signer, assert_writable};
use crate::vrf::{LogOracle, RandomWord, RequestId};

pub struct Processor;

impl Processor {
    pub fn process(
        program_id: &Pubkey,
        accounts: &[AccountInfo],
        instruction_data: &[u8],
    ) -> ProgramResult {
        let instruction = RaffleInstruction::unpack(instruction_data)?;

        match instruction {
            RaffleInstruction::InitializeRaffle { params } => {
                msg!("Instruction: Initialize Raffle");
                Self::process_initialize_raffle(accounts, params, program_id)
            }
            RaffleInstruction::EnterRaffle { amount } => {
                msg!("Instruction: Enter Raffle");
                Self::process_enter_raffle(accounts, amount, program_id)
            }
            RaffleInstruction::CheckUpkeep { check_data } => {
                msg!("Instruction: Check Upkeep");
                Self::process_check_upkeep(accounts, &check_data, program_id)
            }
            RaffleInstruction::PerformUpkeep { perform_data } => {
                msg!("Instruction: Perform Upkeep");
                Self::process_perform_upkeep(accounts, &perform_data, program_id)
            }
            RaffleInstruction::FulfillRandomness {
                request_id,
                random_words,
            } => {
                msg!("Instruction: Fulfill Randomness");
                Self::process_fulfill_randomness(accounts, request_id, &random_words, program_id)
            }
        }
    }

    fn process_initialize_raffle(
        accounts: &[AccountInfo],
        params: RaffleParams,
        program_id: &Pubkey,
    ) -> ProgramResult {
        let account_info_iter = &mut accounts.iter();
        let authority_info = next_account_info(account_info_iter)?;
        let raffle_info = next_account_info(account_info_iter)?;
        let oracle_info = next_account_info(account_info_iter)?;

        assert_signer(authority_info, "Authority")?;
        assert_owned_by(raffle_info, program_id)?;
        assert_writable(raffle_info, "Raffle")?;

        let data_len = raffle_info.data_len();
        if data_len < Raffle::space(1) {
            msg!(
                "Raffle account needs at least {} bytes, has {}",
                Raffle::space(1),
                data_len
            );
            return Err(ProgramError::AccountDataTooSmall);
        }

        let existing = RaffleConfig::unpack_unchecked(&raffle_info.data.borrow()[..RaffleConfig::LEN])?;
        if existing.is_initialized {
            msg!("Raffle account is already initialized");
            return Err(ProgramError::AccountAlreadyInitialized);
        }

        let rent = Rent::get()?;
        if !rent.is_exempt(raffle_info.lamports(), data_len) {
            msg!("Raffle account must be rent exempt");
            return Err(ProgramError::AccountNotRentExempt);
        }

        let config = RaffleConfig {
            is_initialized: true,
            authority: *authority_info.key,
            oracle: *oracle_info.key,
            entrance_fee: params.entrance_fee,
            interval: params.interval,
            gas_lane: params.gas_lane,
            subscription_id: params.subscription_id,
            callback_gas_limit: params.callback_gas_limit,
            request_confirmations: params.request_confirmations,
            max_participants: Raffle::capacity(data_len),
        };

        let clock = Clock::get()?;
        let raffle = Raffle::new(config, clock.unix_timestamp)?;
        raffle.pack_into_account_data(&mut raffle_info.data.borrow_mut())?;

        msg!(
            "Raffle initialized: EntranceFee={} SOL, Interval={}s, Oracle={}, Capacity={}",
            utils::lamports_to_sol(config.entrance_fee),
            config.interval,
            config.oracle,
            config.max_participants
        );
        Ok(())
    }

    fn process_enter_raffle(
        accounts: &[AccountInfo],
        amount: u64,
        program_id: &Pubkey,
    ) -> ProgramResult {
        let account_info_iter = &mut accounts.iter();
        let player_info = next_account_info(account_info_iter)?;
        let raffle_info = next_account_info(account_info_iter)?;
        let system_program_info = next_account_info(account_info_iter)?;

        assert_signer(player_info, "Player")?;
        assert_owned_by(raffle_info, program_id)?;
        if !system_program::check_id(system_program_info.key) {
            return Err(ProgramError::IncorrectProgramId);
        }

        let mut raffle = Raffle::unpack_from_account_data(&raffle_info.data.borrow())?;
        let event = raffle.enter(*player_info.key, amount)?;

        invoke(
            &system_instruction::transfer(player_info.key, raffle_info.key, amount),
            &[
                player_info.clone(),
                raffle_info.clone(),
                system_program_info.clone(),
            ],
        )?;

        raffle.pack_into_account_data(&mut raffle_info.data.borrow_mut())?;
        msg!(
            "Pool now holds {} lamports from {} entries",
            raffle.pooled_balance(),
            raffle.num_players()
        );
        event.emit();
        Ok(())
    }

    fn process_check_upkeep(
        accounts: &[AccountInfo],
        check_data: &[u8],
        program_id: &Pubkey,
    ) -> ProgramResult {
        let account_info_iter = &mut accounts.iter();
        let raffle_info = next_account_info(account_info_iter)?;

        assert_owned_by(raffle_info, program_id)?;

        let raffle = Raffle::unpack_from_account_data(&raffle_info.data.borrow())?;
        let clock = Clock::get()?;
        let status = raffle.check_upkeep(clock.unix_timestamp);
        msg!(
            "Upkeep needed: {} ({}), check data {} bytes",
            status.needed(),
            status,
            check_data.len()
        );

        let perform_data: Vec<u8> = Vec::new();
        let return_data = (status.needed(), perform_data)
            .try_to_vec()
            .map_err(|_| ProgramError::InvalidAccountData)?;
        set_return_data(&return_data);
        Ok(())
    }

    fn process_perform_upkeep(
        accounts: &[AccountInfo],
        perform_data: &[u8],
        program_id: &Pubkey,
    ) -> ProgramResult {
        let account_info_iter = &mut accounts.iter();
        let raffle_info = next_account_info(account_info_iter)?;

        assert_owned_by(raffle_info, program_id)?;
        assert_writable(raffle_info, "Raffle")?;

        let mut raffle = Raffle::unpack_from_account_data(&raffle_info.data.borrow())?;
        let clock = Clock::get()?;
        let mut oracle = LogOracle::new(*raffle_info.key, raffle.oracle());

        if !perform_data.is_empty() {
            msg!("Ignoring {} bytes of perform data", perform_data.len());
        }
        let event = raffle.perform_upkeep(clock.unix_timestamp, &mut oracle)?;

        raffle.pack_into_account_data(&mut raffle_info.data.borrow_mut())?;
        event.emit();
        Ok(())
    }

    fn process_fulfill_randomness(
        accounts: &[AccountInfo],
        request_id: RequestId,
        random_words: &[RandomWord],
        program_id: &Pubkey,
    ) -> ProgramResult {
        let account_info_iter = &mut accounts.iter();
        let oracle_info = next_account_info(account_info_iter)?;
        let raffle_info = next_account_info(account_info_iter)?;
        let winner_info = next_account_info(account_info_iter)?;

        assert_signer(oracle_info, "Oracle")?;
        assert_owned_by(raffle_info, program_id)?;
        assert_writable(raffle_info, "Raffle")?;

        let mut raffle = Raffle::unpack_from_account_data(&raffle_info.data.borrow())?;

        if *oracle_info.key != raffle.oracle() {
            msg!("Fulfillment signed by {}, expected {}", oracle_info.key, raffle.oracle());
            return Err(RaffleError::UnauthorizedOracle.into());
        }

        let (_, winner) = raffle.selected_winner(&request_id, random_words)?;
        if winner != *winner_info.key {
            msg!("Winner account {} is not the selected participant {}", winner_info.key, winner);
            return Err(RaffleError::WinnerAccountMismatch.into());
        }

        // The raffle account keeps its rent reserve; only the pool moves
        let rent_reserve = Rent::get()?.minimum_balance(raffle_info.data_len());
        let clock = Clock::get()?;
        let event = raffle.fulfill_randomness(
            &request_id,
            random_words,
            clock.unix_timestamp,
            |_, amount| utils::transfer_lamports(raffle_info, winner_info, amount, rent_reserve),
        )?;

        raffle.pack_into_account_data(&mut raffle_info.data.borrow_mut())?;
        event.emit();
        Ok(())
    }
}
