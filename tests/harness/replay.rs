use crate::*;
use fairspin::{
    Reconstructor,
    replay::{
        BetEventStore,
        KeySource,
        SledBetEventStore,
    },
    test_helpers::LogStyle,
};
use std::sync::Arc;
use tempdir::TempDir;

async fn completed_spin(
    chain: &SimulatedChain,
) -> (SpinController<SimulatedChain>, QueuedSpin) {
    let controller = initialized_controller(chain).await;
    let (_, mut rx) = controller.subscribe();
    let id = controller.spin(BET_PER_LINE, LINES).unwrap();
    statuses_until_outcome(&mut rx, id).await;
    let spin = controller.spin_record(id).unwrap();
    (controller, spin)
}

#[tokio::test(start_paused = true)]
async fn reconstruct__pruned_logs__matches_the_live_outcome_via_event_store() {
    // given
    let chain = SimulatedChain::new().with_blocks_per_poll(1);
    chain.set_log_style(LogStyle::Pruned);
    let (_controller, spin) = completed_spin(&chain).await;
    let tx_ref = spin.tx_ref.clone().unwrap();
    let reconstructor = Reconstructor::new(
        chain.clone(),
        chain.event_store(),
        Arc::new(chain.game_config()),
    );

    // when
    let replay = reconstructor.reconstruct_required(&tx_ref).await.unwrap();

    // then
    let live = spin.outcome.unwrap();
    assert_eq!(replay.key_source, KeySource::EventStore);
    assert_eq!(Some(replay.bet_key), spin.bet_key);
    assert_eq!(Some(replay.claim_round), spin.claim_block);
    assert_eq!(replay.outcome.grid, live.grid);
    assert_eq!(replay.outcome.total_payout, live.total_payout);
    assert!(replay.verify(&chain.game_config()).unwrap());
}

#[tokio::test(start_paused = true)]
async fn reconstruct__live_logs__recovers_key_from_the_transaction() {
    // given
    let chain = SimulatedChain::new().with_blocks_per_poll(1);
    chain.set_log_style(LogStyle::Nested);
    let (_controller, spin) = completed_spin(&chain).await;
    let reconstructor = Reconstructor::new(
        chain.clone(),
        chain.event_store(),
        Arc::new(chain.game_config()),
    );

    // when
    let replay = reconstructor
        .reconstruct(spin.tx_ref.as_ref().unwrap())
        .await
        .unwrap()
        .expect("replay");

    // then
    assert_eq!(replay.key_source, KeySource::Log);
    assert_eq!(Some(replay.outcome), spin.outcome);
}

#[tokio::test(start_paused = true)]
async fn reconstruct__sled_indexed_records__survive_log_pruning() {
    // given
    let chain = SimulatedChain::new().with_blocks_per_poll(1);
    let (_controller, spin) = completed_spin(&chain).await;
    let tx_ref = spin.tx_ref.clone().unwrap();
    assert!(chain.prune_logs(&tx_ref));

    let temp_dir = TempDir::new("replay_sled_index").unwrap();
    let mut index = SledBetEventStore::open(temp_dir.path()).unwrap();
    for record in chain.event_store().all_bet_records().unwrap() {
        index.record_bet(&record).unwrap();
    }
    let reconstructor =
        Reconstructor::new(chain.clone(), index, Arc::new(chain.game_config()));

    // when
    let replay = reconstructor.reconstruct_required(&tx_ref).await.unwrap();

    // then
    assert_eq!(replay.key_source, KeySource::EventStore);
    assert_eq!(Some(replay.outcome), spin.outcome);
}
