use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use heat_sim::barrier::ReductionBarrier;
use heat_sim::generation::Generation;
use heat_sim::BarrierError;

fn value_for(round: usize, id: usize) -> f64 {
    ((round * 7 + id * 13) % 17) as f64 * 0.5
}

#[test]
fn test_every_participant_gets_the_global_max() {
    let participants = 6;
    let barrier = ReductionBarrier::new(participants);
    let arrived = AtomicUsize::new(0);

    thread::scope(|scope| {
        for id in 0..participants {
            let barrier = &barrier;
            let arrived = &arrived;
            scope.spawn(move || {
                arrived.fetch_add(1, Ordering::SeqCst);
                let merged = barrier.wait(Generation::A, id as f64 * 1.5).unwrap();

                // 全員が到着する前に戻ってはいけない
                assert_eq!(arrived.load(Ordering::SeqCst), participants);
                assert_eq!(merged, (participants - 1) as f64 * 1.5);
            });
        }
    });

    assert_eq!(barrier.completed_rounds().unwrap(), 1);
    assert_eq!(barrier.active_generation().unwrap(), Generation::B);

    println!("✓ Barrier returns max to every participant");
}

#[test]
fn test_generations_alternate_over_many_rounds() {
    let participants = 4;
    let rounds = 200;
    let barrier = ReductionBarrier::new(participants);

    thread::scope(|scope| {
        for id in 0..participants {
            let barrier = &barrier;
            scope.spawn(move || {
                for round in 0..rounds {
                    // 速いスレッドが次の世代に先に入っても、前の世代の結果は壊れない
                    if id == 0 && round % 10 == 0 {
                        thread::sleep(Duration::from_micros(200));
                    }
                    let expected = (0..participants)
                        .map(|p| value_for(round, p))
                        .fold(0.0, f64::max);
                    let merged = barrier
                        .wait(Generation::of_iteration(round), value_for(round, id))
                        .unwrap();
                    assert_eq!(merged, expected, "round {} participant {}", round, id);
                }
            });
        }
    });

    assert_eq!(barrier.completed_rounds().unwrap(), rounds as u64);
    assert_eq!(barrier.active_generation().unwrap(), Generation::of_iteration(rounds));

    println!("✓ Barrier stays consistent across {} rounds", rounds);
}

#[test]
fn test_release_hook_runs_once_per_round() {
    let participants = 3;
    let rounds = 10;
    let barrier = ReductionBarrier::new(participants);
    let hooks = AtomicUsize::new(0);

    thread::scope(|scope| {
        for id in 0..participants {
            let barrier = &barrier;
            let hooks = &hooks;
            scope.spawn(move || {
                for round in 0..rounds {
                    barrier
                        .wait_with(Generation::of_iteration(round), id as f64, |report| {
                            assert_eq!(report.round, round as u64 + 1);
                            assert_eq!(report.generation, Generation::of_iteration(round));
                            assert_eq!(report.max, (participants - 1) as f64);
                            hooks.fetch_add(1, Ordering::SeqCst);
                        })
                        .unwrap();
                }
            });
        }
    });

    assert_eq!(hooks.load(Ordering::SeqCst), rounds);
}

#[test]
fn test_single_participant_does_not_block() {
    let barrier = ReductionBarrier::new(1);
    assert_eq!(barrier.wait(Generation::A, 3.25).unwrap(), 3.25);
    assert_eq!(barrier.wait(Generation::B, 0.5).unwrap(), 0.5);

    // 0 は 1 として扱う
    let barrier = ReductionBarrier::new(0);
    assert_eq!(barrier.participants(), 1);
    assert_eq!(barrier.wait(Generation::A, 7.0).unwrap(), 7.0);
}

#[test]
fn test_abort_releases_waiters() {
    let barrier = ReductionBarrier::new(2);

    thread::scope(|scope| {
        let waiter = scope.spawn(|| barrier.wait(Generation::A, 1.0));
        thread::sleep(Duration::from_millis(50));
        barrier.abort();
        assert_eq!(waiter.join().unwrap(), Err(BarrierError::Aborted));
    });

    assert_eq!(barrier.wait(Generation::A, 1.0), Err(BarrierError::Aborted));
}
