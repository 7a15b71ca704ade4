use crate::*;
use fairspin::{
    SpinError,
    evaluate::evaluate,
    generator::derive_outcome_grid,
    replay::BetEventStore,
    test_helpers::STARTING_BALANCE,
};

#[tokio::test(start_paused = true)]
async fn spin__happy_path__walks_every_phase_and_emits_outcome() {
    // given
    let chain = SimulatedChain::new().with_blocks_per_poll(1);
    let controller = initialized_controller(&chain).await;
    let (_, mut rx) = controller.subscribe();

    // when
    let id = controller.spin(BET_PER_LINE, LINES).unwrap();
    let (statuses, outcome) = statuses_until_outcome(&mut rx, id).await;

    // then
    assert_eq!(
        statuses,
        vec![
            SpinStatus::Submitting,
            SpinStatus::Waiting,
            SpinStatus::Claiming,
            SpinStatus::Completed,
        ]
    );
    let spin = controller.spin_record(id).unwrap();
    let bet_key = spin.bet_key.unwrap();
    let claim_block = spin.claim_block.unwrap();
    assert!(claim_block > spin.submit_block.unwrap());
    let config = chain.game_config();
    let grid =
        derive_outcome_grid(&bet_key, &chain.seed_for(claim_block).unwrap(), &config.reels)
            .unwrap();
    let expected = evaluate(&grid, &config, BET_PER_LINE, LINES).unwrap();
    assert_eq!(outcome, expected);
    assert_eq!(spin.outcome, Some(expected));
    assert!(spin.finished_at.is_some());
}

#[tokio::test(start_paused = true)]
async fn spin__completed__background_claim_credits_payout() {
    // given
    let chain = SimulatedChain::new().with_blocks_per_poll(1);
    let controller = initialized_controller(&chain).await;
    let (_, mut rx) = controller.subscribe();
    let id = controller.spin(BET_PER_LINE, LINES).unwrap();
    let (_, outcome) = statuses_until_outcome(&mut rx, id).await;

    // when
    let spin = settled_claim(&controller, id).await;
    time::sleep(settings().balance_refresh_delay * 2).await;

    // then
    assert_eq!(spin.claim, ClaimStatus::Confirmed);
    assert!(chain.is_claimed(&spin.bet_key.unwrap()));
    let expected_balance =
        STARTING_BALANCE - BET_PER_LINE * u64::from(LINES) + outcome.total_payout;
    assert_eq!(chain.balance_of(&SimulatedChain::PLAYER), expected_balance);
    assert_eq!(controller.state().balance, Some(expected_balance));
}

#[tokio::test(start_paused = true)]
async fn spin__invalid_bet__rejected_without_a_record() {
    // given
    let chain = SimulatedChain::new();
    let controller = initialized_controller(&chain).await;
    let (_, mut rx) = controller.subscribe();

    // when
    let zero = controller.spin(0, LINES);
    let too_many_lines = controller.spin(BET_PER_LINE, LINES + 1);

    // then
    assert!(matches!(zero, Err(SpinError::InvalidBet(_))));
    assert!(matches!(too_many_lines, Err(SpinError::InvalidBet(_))));
    for _ in 0..2 {
        assert!(matches!(
            next_event(&mut rx).await,
            SpinEvent::Error {
                spin_id: None,
                recoverable: true,
                ..
            }
        ));
    }
    assert!(controller.spins().is_empty());
}

#[tokio::test(start_paused = true)]
async fn spin__before_initialization__reports_missing_state() {
    // given
    let chain = SimulatedChain::new();
    let controller = SpinController::new(
        chain.clone(),
        SimulatedChain::PLAYER,
        settings(),
        Default::default(),
    );

    // when
    let without_config = controller.spin(BET_PER_LINE, LINES);
    controller.load_config().await.unwrap();
    let without_balance = controller.spin(BET_PER_LINE, LINES);

    // then
    assert!(matches!(without_config, Err(SpinError::ConfigNotLoaded)));
    assert!(matches!(without_balance, Err(SpinError::NotInitialized)));
    assert!(controller.spins().is_empty());
}

#[tokio::test(start_paused = true)]
async fn spin__bet_above_unreserved_balance__is_insufficient() {
    // given
    let chain = SimulatedChain::new();
    chain.set_balance(SimulatedChain::PLAYER, 300);
    let controller = initialized_controller(&chain).await;
    let first = controller.spin(BET_PER_LINE, LINES).unwrap();

    // when
    let second = controller.spin(BET_PER_LINE, LINES);

    // then
    assert!(matches!(
        second,
        Err(SpinError::InsufficientBalance {
            required: 200,
            available: 100,
        })
    ));
    let state = controller.state();
    assert_eq!(state.reserved, 200);
    assert_eq!(state.available, 100);
    assert_eq!(controller.pending_spins().len(), 1);
    assert_eq!(controller.pending_spins()[0].id, first);
}

#[tokio::test(start_paused = true)]
async fn spin__submission_rejected__fails_with_recoverable_error() {
    // given
    let chain = SimulatedChain::new();
    chain.fail_submissions(true);
    let controller = initialized_controller(&chain).await;
    let (_, mut rx) = controller.subscribe();

    // when
    let id = controller.spin(BET_PER_LINE, LINES).unwrap();

    // then
    assert_eq!(
        next_event(&mut rx).await,
        SpinEvent::StatusChanged {
            spin_id: id,
            status: SpinStatus::Submitting,
        }
    );
    assert_eq!(
        next_event(&mut rx).await,
        SpinEvent::StatusChanged {
            spin_id: id,
            status: SpinStatus::Failed,
        }
    );
    match next_event(&mut rx).await {
        SpinEvent::Error {
            spin_id,
            message,
            recoverable,
        } => {
            assert_eq!(spin_id, Some(id));
            assert!(message.contains("rejected"), "{message}");
            assert!(recoverable);
        }
        other => panic!("unexpected event {other:?}"),
    }
    let spin = controller.spin_record(id).unwrap();
    assert_eq!(spin.status, SpinStatus::Failed);
    assert!(spin.outcome.is_none());
    assert_eq!(controller.state().reserved, 0);
    assert_eq!(chain.balance_of(&SimulatedChain::PLAYER), STARTING_BALANCE);
}

#[tokio::test(start_paused = true)]
async fn resume__in_flight_or_finished__does_not_start_twice() {
    // given
    let chain = SimulatedChain::new().with_blocks_per_poll(1);
    let controller = initialized_controller(&chain).await;
    let (_, mut rx) = controller.subscribe();
    let id = controller.spin(BET_PER_LINE, LINES).unwrap();

    // when
    let while_running = controller.resume(id).unwrap();
    statuses_until_outcome(&mut rx, id).await;
    let after_completion = controller.resume(id).unwrap();

    // then
    assert!(!while_running);
    assert!(!after_completion);
    assert!(matches!(
        controller.resume(SpinId(999)),
        Err(SpinError::UnknownSpin(SpinId(999)))
    ));
}

#[tokio::test(start_paused = true)]
async fn abort__waiting_spin__fails_it_and_stops_processing() {
    // given
    let chain = SimulatedChain::new();
    let controller = initialized_controller(&chain).await;
    let (_, mut rx) = controller.subscribe();
    let id = controller.spin(BET_PER_LINE, LINES).unwrap();
    wait_for_status(&mut rx, id, SpinStatus::Waiting).await;

    // when
    let aborted = controller.abort(id).unwrap();
    chain.advance(5);
    time::sleep(Duration::from_secs(10)).await;

    // then
    assert!(aborted);
    let spin = controller.spin_record(id).unwrap();
    assert_eq!(spin.status, SpinStatus::Failed);
    assert_eq!(spin.error.as_deref(), Some("aborted"));
    assert!(spin.outcome.is_none());
    assert!(!controller.abort(id).unwrap());
    assert!(!controller.resume(id).unwrap());
}

#[tokio::test(start_paused = true)]
async fn shutdown__aborts_everything_in_flight_and_stays_usable() {
    // given
    let chain = SimulatedChain::new();
    let controller = initialized_controller(&chain).await;
    let (_, mut rx) = controller.subscribe();
    let first = controller.spin(BET_PER_LINE, LINES).unwrap();
    let second = controller.spin(BET_PER_LINE, LINES).unwrap();
    wait_for_status(&mut rx, first, SpinStatus::Waiting).await;
    assert!(controller.start_balance_polling());

    // when
    controller.shutdown();

    // then
    let state = controller.state();
    assert_eq!(state.in_flight, 0);
    assert_eq!(state.reserved, 0);
    assert!(!state.balance_polling);
    for id in [first, second] {
        assert_eq!(
            controller.spin_record(id).unwrap().status,
            SpinStatus::Failed
        );
    }
    assert!(controller.spin(BET_PER_LINE, LINES).is_ok());
}

#[tokio::test(start_paused = true)]
async fn background_claim__failure_is_recorded_but_never_surfaced() {
    // given
    let chain = SimulatedChain::new().with_blocks_per_poll(1);
    chain.fail_claims(true);
    let controller = initialized_controller(&chain).await;
    let (_, mut rx) = controller.subscribe();
    let id = controller.spin(BET_PER_LINE, LINES).unwrap();
    let (_, outcome) = statuses_until_outcome(&mut rx, id).await;

    // when
    let spin = settled_claim(&controller, id).await;

    // then
    assert!(matches!(spin.claim, ClaimStatus::Failed(_)));
    assert_eq!(spin.status, SpinStatus::Completed);
    assert_eq!(spin.outcome, Some(outcome));
    while let Ok(event) = rx.try_recv() {
        assert!(
            !matches!(event, SpinEvent::Error { .. }),
            "claim failure surfaced: {event:?}"
        );
    }
}

#[tokio::test(start_paused = true)]
async fn background_claim__claim_block_never_passed__times_out() {
    // given
    let chain = SimulatedChain::new();
    let controller = initialized_controller(&chain).await;
    let (_, mut rx) = controller.subscribe();
    let id = controller.spin(BET_PER_LINE, LINES).unwrap();
    wait_for_status(&mut rx, id, SpinStatus::Waiting).await;

    // when
    chain.advance(1);
    statuses_until_outcome(&mut rx, id).await;
    let spin = settled_claim(&controller, id).await;

    // then
    assert_eq!(spin.claim_block, Some(1));
    assert_eq!(spin.claim, ClaimStatus::TimedOut);
    assert_eq!(spin.status, SpinStatus::Completed);
    assert!(!chain.is_claimed(&spin.bet_key.unwrap()));
}

#[tokio::test(start_paused = true)]
async fn background_claim__record_evicted_on_completion__still_claims_on_chain() {
    // given
    let chain = SimulatedChain::new().with_blocks_per_poll(1);
    let controller = SpinController::new(
        chain.clone(),
        SimulatedChain::PLAYER,
        ControllerConfig {
            retained_terminal: 0,
            ..settings()
        },
        Default::default(),
    );
    controller.initialize().await.unwrap();
    let (_, mut rx) = controller.subscribe();

    // when
    let id = controller.spin(BET_PER_LINE, LINES).unwrap();
    statuses_until_outcome(&mut rx, id).await;
    time::sleep(Duration::from_secs(60)).await;

    // then
    let records = chain.event_store().all_bet_records().unwrap();
    let bet_key = records[0].bet_key(&SimulatedChain::PLAYER);
    assert!(controller.spin_record(id).is_none());
    assert!(chain.is_claimed(&bet_key));
}

#[tokio::test(start_paused = true)]
async fn balance_polling__start_and_stop__are_idempotent() {
    // given
    let chain = SimulatedChain::new();
    let controller = initialized_controller(&chain).await;
    let (_, mut rx) = controller.subscribe();

    // when
    assert!(controller.start_balance_polling());
    assert!(!controller.start_balance_polling());
    chain.set_balance(SimulatedChain::PLAYER, 5);
    let event = next_event(&mut rx).await;

    // then
    assert_eq!(
        event,
        SpinEvent::BalanceChanged {
            party: SimulatedChain::PLAYER,
            balance: 5,
        }
    );
    assert!(controller.state().balance_polling);
    assert!(controller.stop_balance_polling());
    assert!(!controller.stop_balance_polling());

    chain.set_balance(SimulatedChain::PLAYER, 7);
    time::sleep(settings().balance_poll_interval * 3).await;
    assert!(rx.try_recv().is_err());
    assert_eq!(controller.state().balance, Some(5));
}

#[tokio::test(start_paused = true)]
async fn unsubscribe__stops_delivery() {
    let chain = SimulatedChain::new();
    let controller = initialized_controller(&chain).await;
    let (subscription, mut rx) = controller.subscribe();

    assert!(controller.unsubscribe(subscription));
    let _ = controller.spin(0, LINES);

    assert!(rx.recv().await.is_none());
    assert!(!controller.unsubscribe(subscription));
}
