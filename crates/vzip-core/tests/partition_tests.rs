use vzip_core::{PartitionStrategy, VzipError, WorkPlan};

#[test]
fn shares_always_sum_to_total() -> Result<(), Box<dyn std::error::Error>> {
    for total in 1..=200usize {
        for threads in 1..=20usize {
            for strategy in [PartitionStrategy::Auto, PartitionStrategy::Floor] {
                let plan = WorkPlan::new(total, threads, strategy)?;
                let sum: usize = plan.shares().sum();
                assert_eq!(sum, total, "total {total}, threads {threads}, {strategy:?}");
                assert_eq!(plan.share(0), plan.remainder());
                assert!(plan.shares().skip(1).all(|share| share == plan.regular()));
            }
        }
    }
    Ok(())
}

#[test]
fn ceil_gives_thread_zero_the_leftover() -> Result<(), Box<dyn std::error::Error>> {
    let plan = WorkPlan::new(10, 4, PartitionStrategy::Ceil)?;

    assert_eq!(plan.regular(), 3);
    assert_eq!(plan.remainder(), 1);
    assert_eq!(plan.shares().collect::<Vec<_>>(), vec![1, 3, 3, 3]);
    Ok(())
}

#[test]
fn ceil_rejects_plans_that_leave_thread_zero_nothing() {
    match WorkPlan::new(10, 8, PartitionStrategy::Ceil) {
        Err(VzipError::InvalidPartition {
            total,
            threads,
            regular,
            remainder,
        }) => {
            assert_eq!((total, threads, regular), (10, 8, 2));
            assert_eq!(remainder, -4);
        }
        other => panic!("unexpected partition result: {other:?}"),
    }
}

#[test]
fn auto_falls_back_to_floor_when_ceil_is_invalid() -> Result<(), Box<dyn std::error::Error>> {
    let plan = WorkPlan::new(10, 8, PartitionStrategy::Auto)?;

    assert_eq!(plan.strategy(), PartitionStrategy::Floor);
    assert_eq!(plan.regular(), 1);
    assert_eq!(plan.remainder(), 3);
    Ok(())
}

#[test]
fn auto_prefers_ceil_when_it_is_valid() -> Result<(), Box<dyn std::error::Error>> {
    let plan = WorkPlan::new(10, 4, PartitionStrategy::Auto)?;

    assert_eq!(plan.strategy(), PartitionStrategy::Ceil);
    Ok(())
}

#[test]
fn more_threads_than_items_leaves_idle_threads() -> Result<(), Box<dyn std::error::Error>> {
    let plan = WorkPlan::new(3, 8, PartitionStrategy::Auto)?;

    assert_eq!(plan.regular(), 0);
    assert_eq!(plan.remainder(), 3);
    assert_eq!(plan.shares().filter(|&share| share == 0).count(), 7);
    assert_eq!(plan.share(42), 0);
    Ok(())
}

#[test]
fn single_thread_takes_everything() -> Result<(), Box<dyn std::error::Error>> {
    for strategy in [
        PartitionStrategy::Ceil,
        PartitionStrategy::Floor,
        PartitionStrategy::Auto,
    ] {
        let plan = WorkPlan::new(7, 1, strategy)?;
        assert_eq!(plan.remainder(), 7);
    }
    Ok(())
}

#[test]
fn rejects_empty_input_and_zero_threads() {
    assert!(matches!(
        WorkPlan::new(0, 4, PartitionStrategy::Auto),
        Err(VzipError::EmptyInput)
    ));
    assert!(matches!(
        WorkPlan::new(10, 0, PartitionStrategy::Auto),
        Err(VzipError::InvalidConfig(_))
    ));
}
