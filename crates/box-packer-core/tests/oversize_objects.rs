use box_packer_core::PackingError;
use box_packer_core::prelude::*;

fn oversize_task() -> PackingTask {
    PackingTask::new(
        PackingContainer::new(100.0, 80.0, 0.0),
        vec![PackInputObject::new(1, 150.0, 120.0)],
    )
}

#[test]
fn every_strategy_returns_empty_for_an_object_larger_than_the_container() {
    for strategy in [
        StrategyKind::Nfdh,
        StrategyKind::Exact,
        StrategyKind::BranchAndBound,
        StrategyKind::Physics,
    ] {
        let cfg = PackerConfig::builder()
            .strategy(strategy)
            .seed(Some(1))
            .time_limit_ms(2_000)
            .build();
        let placed = pack_task(&oversize_task(), &cfg).expect("no error");
        assert!(placed.is_empty(), "{} placed an oversize object", strategy.name());
    }
}

#[test]
fn oversize_object_is_left_out_while_others_are_packed() {
    let mut task = oversize_task();
    task.objects.push(PackInputObject::new(2, 30.0, 20.0));
    for strategy in [
        StrategyKind::Nfdh,
        StrategyKind::Exact,
        StrategyKind::BranchAndBound,
        StrategyKind::Physics,
    ] {
        let cfg = PackerConfig::builder()
            .strategy(strategy)
            .seed(Some(2))
            .time_limit_ms(2_000)
            .build();
        let placed = pack_task(&task, &cfg).expect("no error");
        let ids: Vec<u32> = placed.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![2], "{}", strategy.name());
        validate_layout(&task, &placed).expect("valid layout");
    }
}

#[test]
fn invalid_task_is_rejected_before_packing() {
    let task = PackingTask::new(
        PackingContainer::new(10.0, 10.0, 6.0),
        vec![PackInputObject::new(1, 1.0, 1.0)],
    );
    let err = pack_task(&task, &PackerConfig::default()).unwrap_err();
    assert!(matches!(err, PackingError::InvalidInput(_)));
}
