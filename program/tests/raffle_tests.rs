use borsh::BorshDeserialize;
use solana_program::instruction::InstructionError;
use solana_program_test::*;
use solana_sdk::{
    instruction::Instruction,
    pubkey::Pubkey,
    signature::{Keypair, Signer},
    system_instruction,
    sysvar::{clock::Clock, rent::Rent},
    transaction::{Transaction, TransactionError},
};

use upkeep_raffle::{
    process_instruction,
    raffle_error::RaffleError,
    raffle_instruction::{self, RaffleParams},
    raffle_state::{Raffle, RaffleState, PARTICIPANT_LIMIT},
    vrf::{RandomWord, RequestId},
};

const ENTRANCE_FEE: u64 = 10_000_000; // 0.01 SOL
const INTERVAL: i64 = 30;
const MAX_PARTICIPANTS: u32 = 16;
const PLAYER_FUNDS: u64 = 1_000_000_000;

struct TestRaffle {
    context: ProgramTestContext,
    program_id: Pubkey,
    raffle: Keypair,
    oracle: Keypair,
}

fn clone_keypair(keypair: &Keypair) -> Keypair {
    Keypair::from_bytes(&keypair.to_bytes()).unwrap()
}

fn params() -> RaffleParams {
    RaffleParams {
        entrance_fee: ENTRANCE_FEE,
        interval: INTERVAL,
        gas_lane: [7; 32],
        subscription_id: 42,
        callback_gas_limit: 500_000,
        request_confirmations: 3,
    }
}

// Setup program test with an initialized raffle
async fn setup() -> TestRaffle {
    setup_sized_for(MAX_PARTICIPANTS).await
}

async fn setup_sized_for(max_participants: u32) -> TestRaffle {
    let program_id = Pubkey::new_unique();
    let program_test = ProgramTest::new("upkeep_raffle", program_id, processor!(process_instruction));
    let mut context = program_test.start_with_context().await;

    let raffle = Keypair::new();
    let oracle = Keypair::new();
    let rent = context.banks_client.get_rent().await.unwrap();
    let lamports = rent.minimum_balance(Raffle::space(max_participants));

    let payer = clone_keypair(&context.payer);
    let instructions = [
        raffle_instruction::create_raffle_account(
            &program_id,
            &payer.pubkey(),
            &raffle.pubkey(),
            lamports,
            max_participants,
        ),
        raffle_instruction::initialize_raffle(
            &program_id,
            &payer.pubkey(),
            &raffle.pubkey(),
            &oracle.pubkey(),
            params(),
        ),
    ];

    let mut test = TestRaffle {
        context,
        program_id,
        raffle,
        oracle,
    };
    let raffle_signer = clone_keypair(&test.raffle);
    test.process(&instructions, &[&raffle_signer]).await.unwrap();
    test
}

impl TestRaffle {
    async fn process(
        &mut self,
        instructions: &[Instruction],
        signers: &[&Keypair],
    ) -> Result<(), BanksClientError> {
        let blockhash = self
            .context
            .banks_client
            .get_new_latest_blockhash(&self.context.last_blockhash)
            .await
            .unwrap();
        self.context.last_blockhash = blockhash;
        let payer = clone_keypair(&self.context.payer);
        let mut all_signers: Vec<&Keypair> = vec![&payer];
        all_signers.extend_from_slice(signers);

        let mut transaction = Transaction::new_with_payer(instructions, Some(&payer.pubkey()));
        transaction.sign(&all_signers, blockhash);
        self.context.banks_client.process_transaction(transaction).await
    }

    async fn raffle(&mut self) -> Raffle {
        let account = self
            .context
            .banks_client
            .get_account(self.raffle.pubkey())
            .await
            .unwrap()
            .unwrap();
        Raffle::unpack_from_account_data(&account.data).unwrap()
    }

    async fn lamports(&mut self, key: Pubkey) -> u64 {
        self.context.banks_client.get_balance(key).await.unwrap()
    }

    async fn warp_seconds(&mut self, seconds: i64) {
        let mut clock: Clock = self.context.banks_client.get_sysvar().await.unwrap();
        clock.unix_timestamp += seconds;
        self.context.set_sysvar(&clock);
    }

    async fn funded_player(&mut self) -> Keypair {
        let player = Keypair::new();
        let payer = self.context.payer.pubkey();
        self.process(
            &[system_instruction::transfer(&payer, &player.pubkey(), PLAYER_FUNDS)],
            &[],
        )
        .await
        .unwrap();
        player
    }

    async fn enter(&mut self, player: &Keypair, amount: u64) -> Result<(), BanksClientError> {
        let ix = raffle_instruction::enter_raffle(
            &self.program_id,
            &player.pubkey(),
            &self.raffle.pubkey(),
            amount,
        );
        self.process(&[ix], &[player]).await
    }

    async fn perform_upkeep(&mut self) -> Result<(), BanksClientError> {
        let ix = raffle_instruction::perform_upkeep(&self.program_id, &self.raffle.pubkey(), Vec::new());
        self.process(&[ix], &[]).await
    }

    fn fulfill_instruction(
        &self,
        oracle: &Keypair,
        winner: Pubkey,
        request_id: RequestId,
        word: u64,
    ) -> Instruction {
        raffle_instruction::fulfill_randomness(
            &self.program_id,
            &oracle.pubkey(),
            &self.raffle.pubkey(),
            &winner,
            request_id,
            vec![RandomWord::from(word)],
        )
        .unwrap()
    }

    async fn fulfill(
        &mut self,
        oracle: &Keypair,
        winner: Pubkey,
        request_id: RequestId,
        word: u64,
    ) -> Result<(), BanksClientError> {
        let ix = self.fulfill_instruction(oracle, winner, request_id, word);
        self.process(&[ix], &[oracle]).await
    }

    /// Simulate CheckUpkeep and decode the `(needed, perform_data)` it returns
    async fn check_upkeep(&mut self) -> (bool, Vec<u8>) {
        let ix = raffle_instruction::check_upkeep(&self.program_id, &self.raffle.pubkey());
        let blockhash = self
            .context
            .banks_client
            .get_new_latest_blockhash(&self.context.last_blockhash)
            .await
            .unwrap();
        self.context.last_blockhash = blockhash;
        let payer = clone_keypair(&self.context.payer);
        let mut transaction = Transaction::new_with_payer(&[ix], Some(&payer.pubkey()));
        transaction.sign(&[&payer], blockhash);

        let simulation = self
            .context
            .banks_client
            .simulate_transaction(transaction)
            .await
            .unwrap();
        assert!(matches!(simulation.result, Some(Ok(()))));
        let return_data = simulation.simulation_details.unwrap().return_data.unwrap();
        assert_eq!(return_data.program_id, self.program_id);
        <(bool, Vec<u8>)>::try_from_slice(&return_data.data).unwrap()
    }
}

fn assert_raffle_error(result: Result<(), BanksClientError>, expected: RaffleError) {
    assert_eq!(
        result.unwrap_err().unwrap(),
        TransactionError::InstructionError(0, InstructionError::Custom(expected.code()))
    );
}

#[tokio::test]
async fn test_initialize_raffle() {
    let mut test = setup().await;
    let raffle = test.raffle().await;

    assert!(raffle.config().is_initialized);
    assert_eq!(raffle.entrance_fee(), ENTRANCE_FEE);
    assert_eq!(raffle.interval(), INTERVAL);
    assert_eq!(raffle.oracle(), test.oracle.pubkey());
    assert_eq!(raffle.request_confirmations(), 3);
    assert_eq!(raffle.num_words(), 1);
    assert_eq!(raffle.config().max_participants, MAX_PARTICIPANTS);
    assert_eq!(raffle.state(), RaffleState::Open);
    assert_eq!(raffle.num_players(), 0);
    assert_eq!(raffle.recent_winner(), None);
}

#[tokio::test]
async fn test_initialize_twice_fails() {
    let mut test = setup().await;
    let payer = test.context.payer.pubkey();
    let ix = raffle_instruction::initialize_raffle(
        &test.program_id,
        &payer,
        &test.raffle.pubkey(),
        &test.oracle.pubkey(),
        params(),
    );

    let result = test.process(&[ix], &[]).await;
    assert_eq!(
        result.unwrap_err().unwrap(),
        TransactionError::InstructionError(0, InstructionError::AccountAlreadyInitialized)
    );
}

#[tokio::test]
async fn test_enter_raffle_records_player_and_funds() {
    let mut test = setup().await;
    let player = test.funded_player().await;
    let before = test.lamports(test.raffle.pubkey()).await;

    test.enter(&player, ENTRANCE_FEE).await.unwrap();

    let raffle = test.raffle().await;
    assert_eq!(raffle.num_players(), 1);
    assert_eq!(raffle.player(0), Some(player.pubkey()));
    assert_eq!(raffle.pooled_balance(), ENTRANCE_FEE);
    assert_eq!(test.lamports(test.raffle.pubkey()).await, before + ENTRANCE_FEE);
}

#[tokio::test]
async fn test_enter_below_fee_fails() {
    let mut test = setup().await;
    let player = test.funded_player().await;

    let result = test.enter(&player, ENTRANCE_FEE - 1).await;
    assert_raffle_error(result, RaffleError::InsufficientPayment);
    assert_eq!(test.raffle().await.num_players(), 0);
}

#[tokio::test]
async fn test_upkeep_before_interval_fails() {
    let mut test = setup().await;
    let player = test.funded_player().await;
    test.enter(&player, ENTRANCE_FEE).await.unwrap();

    assert_eq!(test.check_upkeep().await, (false, Vec::new()));

    // Only the reported code matters; the status payload is logged
    let status = test.raffle().await.check_upkeep(0);
    let result = test.perform_upkeep().await;
    assert_raffle_error(result, RaffleError::UpkeepNotNeeded(status));
    assert_eq!(test.raffle().await.state(), RaffleState::Open);
}

#[tokio::test]
async fn test_upkeep_without_players_fails() {
    let mut test = setup().await;
    test.warp_seconds(INTERVAL + 1).await;

    let status = test.raffle().await.check_upkeep(0);
    let result = test.perform_upkeep().await;
    assert_raffle_error(result, RaffleError::UpkeepNotNeeded(status));
    assert_eq!(test.raffle().await.state(), RaffleState::Open);
}

#[tokio::test]
async fn test_entry_rejected_while_calculating() {
    let mut test = setup().await;
    let player = test.funded_player().await;
    test.enter(&player, ENTRANCE_FEE).await.unwrap();
    test.warp_seconds(INTERVAL + 1).await;
    test.perform_upkeep().await.unwrap();

    let raffle = test.raffle().await;
    assert_eq!(raffle.state(), RaffleState::Calculating);
    assert!(raffle.outstanding_request().is_some());

    let late = test.funded_player().await;
    let result = test.enter(&late, ENTRANCE_FEE).await;
    assert_raffle_error(result, RaffleError::NotOpen);
}

#[tokio::test]
async fn test_single_player_round_trip() {
    let mut test = setup().await;
    let player = test.funded_player().await;
    test.enter(&player, ENTRANCE_FEE).await.unwrap();
    test.warp_seconds(INTERVAL + 1).await;
    test.perform_upkeep().await.unwrap();

    let request_id = test.raffle().await.outstanding_request().unwrap();
    let before = test.lamports(player.pubkey()).await;
    let oracle = clone_keypair(&test.oracle);
    test.fulfill(&oracle, player.pubkey(), request_id, 12_345)
        .await
        .unwrap();

    let raffle = test.raffle().await;
    assert_eq!(raffle.state(), RaffleState::Open);
    assert_eq!(raffle.recent_winner(), Some(player.pubkey()));
    assert_eq!(raffle.num_players(), 0);
    assert_eq!(raffle.pooled_balance(), 0);
    assert_eq!(raffle.outstanding_request(), None);
    assert_eq!(test.lamports(player.pubkey()).await, before + ENTRANCE_FEE);
}

#[tokio::test]
async fn test_winner_selected_by_word_modulo_players() {
    let mut test = setup().await;
    let mut players = Vec::new();
    for _ in 0..4 {
        let player = test.funded_player().await;
        test.enter(&player, ENTRANCE_FEE).await.unwrap();
        players.push(player);
    }
    test.warp_seconds(INTERVAL).await;
    test.perform_upkeep().await.unwrap();

    // 7 mod 4 == 3
    let winner = players[3].pubkey();
    let request_id = test.raffle().await.outstanding_request().unwrap();
    let before = test.lamports(winner).await;
    let oracle = clone_keypair(&test.oracle);
    test.fulfill(&oracle, winner, request_id, 7).await.unwrap();

    assert_eq!(test.lamports(winner).await, before + 4 * ENTRANCE_FEE);
    assert_eq!(test.raffle().await.recent_winner(), Some(winner));

    // Only the rent reserve stays behind
    let rent = test.context.banks_client.get_sysvar::<Rent>().await.unwrap();
    assert_eq!(
        test.lamports(test.raffle.pubkey()).await,
        rent.minimum_balance(Raffle::space(MAX_PARTICIPANTS))
    );
}

#[tokio::test]
async fn test_fulfill_from_wrong_oracle_fails() {
    let mut test = setup().await;
    let player = test.funded_player().await;
    test.enter(&player, ENTRANCE_FEE).await.unwrap();
    test.warp_seconds(INTERVAL + 1).await;
    test.perform_upkeep().await.unwrap();

    let request_id = test.raffle().await.outstanding_request().unwrap();
    let impostor = Keypair::new();
    let result = test.fulfill(&impostor, player.pubkey(), request_id, 1).await;
    assert_raffle_error(result, RaffleError::UnauthorizedOracle);
    assert_eq!(test.raffle().await.state(), RaffleState::Calculating);
}

#[tokio::test]
async fn test_fulfill_with_wrong_winner_account_fails() {
    let mut test = setup().await;
    let first = test.funded_player().await;
    let second = test.funded_player().await;
    test.enter(&first, ENTRANCE_FEE).await.unwrap();
    test.enter(&second, ENTRANCE_FEE).await.unwrap();
    test.warp_seconds(INTERVAL + 1).await;
    test.perform_upkeep().await.unwrap();

    // 0 mod 2 selects the first entrant
    let request_id = test.raffle().await.outstanding_request().unwrap();
    let oracle = clone_keypair(&test.oracle);
    let result = test.fulfill(&oracle, second.pubkey(), request_id, 0).await;
    assert_raffle_error(result, RaffleError::WinnerAccountMismatch);

    let raffle = test.raffle().await;
    assert_eq!(raffle.num_players(), 2);
    assert_eq!(raffle.pooled_balance(), 2 * ENTRANCE_FEE);
}

#[tokio::test]
async fn test_fulfill_replay_fails() {
    let mut test = setup().await;
    let player = test.funded_player().await;
    test.enter(&player, ENTRANCE_FEE).await.unwrap();
    test.warp_seconds(INTERVAL + 1).await;
    test.perform_upkeep().await.unwrap();

    let request_id = test.raffle().await.outstanding_request().unwrap();
    let oracle = clone_keypair(&test.oracle);
    test.fulfill(&oracle, player.pubkey(), request_id, 5).await.unwrap();

    let result = test.fulfill(&oracle, player.pubkey(), request_id, 6).await;
    assert_raffle_error(result, RaffleError::UnknownRequest);
}

#[tokio::test]
async fn test_next_round_issues_fresh_request() {
    let mut test = setup().await;
    let oracle = clone_keypair(&test.oracle);
    let mut seen = Vec::new();

    for _ in 0..2 {
        let player = test.funded_player().await;
        test.enter(&player, ENTRANCE_FEE).await.unwrap();
        test.warp_seconds(INTERVAL + 1).await;
        test.perform_upkeep().await.unwrap();

        let request_id = test.raffle().await.outstanding_request().unwrap();
        assert!(!seen.contains(&request_id));
        seen.push(request_id);
        test.fulfill(&oracle, player.pubkey(), request_id, 0).await.unwrap();
    }
}

#[tokio::test]
async fn test_check_upkeep_reports_when_round_can_close() {
    let mut test = setup().await;
    assert_eq!(test.check_upkeep().await, (false, Vec::new()));

    let player = test.funded_player().await;
    test.enter(&player, ENTRANCE_FEE).await.unwrap();
    assert_eq!(test.check_upkeep().await, (false, Vec::new()));

    test.warp_seconds(INTERVAL + 1).await;
    assert_eq!(test.check_upkeep().await, (true, Vec::new()));

    test.perform_upkeep().await.unwrap();
    assert_eq!(test.check_upkeep().await, (false, Vec::new()));
}

#[tokio::test]
async fn test_failed_payout_keeps_round_until_retry() {
    let mut test = setup().await;
    let player = test.funded_player().await;
    test.enter(&player, ENTRANCE_FEE).await.unwrap();
    test.warp_seconds(INTERVAL + 1).await;
    test.perform_upkeep().await.unwrap();

    let request_id = test.raffle().await.outstanding_request().unwrap();
    let oracle = clone_keypair(&test.oracle);
    let mut read_only_winner = test.fulfill_instruction(&oracle, player.pubkey(), request_id, 3);
    read_only_winner.accounts[2].is_writable = false;

    let result = test.process(&[read_only_winner], &[&oracle]).await;
    assert_raffle_error(result, RaffleError::PayoutFailed);

    let raffle = test.raffle().await;
    assert_eq!(raffle.state(), RaffleState::Calculating);
    assert_eq!(raffle.outstanding_request(), Some(request_id));
    assert_eq!(raffle.pooled_balance(), ENTRANCE_FEE);
    assert_eq!(raffle.num_players(), 1);

    let before = test.lamports(player.pubkey()).await;
    test.fulfill(&oracle, player.pubkey(), request_id, 3).await.unwrap();
    assert_eq!(test.lamports(player.pubkey()).await, before + ENTRANCE_FEE);
    assert_eq!(test.raffle().await.state(), RaffleState::Open);
}

#[tokio::test]
async fn test_oversized_account_is_capped_at_participant_limit() {
    let mut test = setup_sized_for(PARTICIPANT_LIMIT + 64).await;
    assert_eq!(test.raffle().await.config().max_participants, PARTICIPANT_LIMIT);
}
