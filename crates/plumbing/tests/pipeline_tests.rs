//! End-to-end pipeline behaviour: composition, terminal stages, failure
//! handling and shutdown.

use plumbing_rs::{
    connect, sink, terminate, ChannelError, Config, FailurePolicy, Pipeline, StageError,
    BUFFERED_CONFIG,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

fn first_char(s: &str) -> char {
    s.chars().next().unwrap_or(' ')
}

fn double(x: i32) -> i32 {
    x * 2
}

fn label(x: i32) -> String {
    format!("x{x}")
}

fn reject_three(x: u32) -> Result<u32, String> {
    if x == 3 {
        Err(format!("bad item {x}"))
    } else {
        Ok(x * 10)
    }
}

fn propagating() -> Config {
    Config::default().with_failure_policy(FailurePolicy::Propagate)
}

// =============================================================================
// Composition
// =============================================================================

#[test]
fn test_two_stage_chain_preserves_order() {
    let out: Vec<String> = Pipeline::from_source(vec![1, 2, 3, 4, 5])
        .then(double)
        .then(label)
        .collect();

    assert_eq!(out, ["x2", "x4", "x6", "x8", "x10"]);
}

#[test]
fn test_shr_operator_chains_stages() {
    let out: Vec<String> = (Pipeline::from_source(1..=5) >> double >> label).collect();
    assert_eq!(out, ["x2", "x4", "x6", "x8", "x10"]);
}

#[test]
fn test_connect_macro_matches_then_chain() {
    let by_macro: Vec<_> = connect!(0..100, double, label).collect();
    let by_then: Vec<_> = Pipeline::from_source(0..100).then(double).then(label).collect();
    assert_eq!(by_macro, by_then);
}

#[test]
fn test_connect_function_nests() {
    let inner = connect(vec![3, 1, 2], double);
    let out: Vec<_> = connect(inner, label).collect();
    assert_eq!(out, ["x6", "x2", "x4"]);
}

#[test]
fn test_long_chain_with_lockstep_channels() {
    let mut pipeline = Pipeline::from_source(0..1_000u64);
    for _ in 0..8 {
        pipeline = pipeline.then(|x: u64| x + 1);
    }
    assert_eq!(pipeline.stage_count(), 8);

    let out: Vec<_> = pipeline.collect();
    assert_eq!(out, (8..1_008).collect::<Vec<_>>());
}

#[test]
fn test_slow_consumer_applies_backpressure() {
    let produced = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&produced);

    let mut pipeline = Pipeline::with_config(0..100u32, Config::default().with_capacity(3))
        .unwrap()
        .then(move |x: u32| {
            counter.fetch_add(1, Ordering::SeqCst);
            x
        });

    assert_eq!(pipeline.next(), Some(0));
    thread::sleep(Duration::from_millis(50));

    // One value handed out, two buffered, one held by the blocked stage.
    assert!(produced.load(Ordering::SeqCst) <= 4);
    assert_eq!(pipeline.by_ref().count(), 99);
    assert!(pipeline.wait().is_ok());
}

// =============================================================================
// Terminal stages
// =============================================================================

#[test]
fn test_terminal_stage_side_effects_complete() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let out = Arc::clone(&log);

    let completion = Pipeline::from_source(vec!["Hello", "World"])
        >> first_char
        >> sink(move |c: char| out.lock().unwrap().push(c.to_string()));

    completion.wait().unwrap();
    assert_eq!(*log.lock().unwrap(), ["H", "W"]);
}

#[test]
fn test_terminate_runs_on_worker_thread() {
    let names = Arc::new(Mutex::new(Vec::new()));
    let out = Arc::clone(&names);

    terminate(vec![1, 2], move |_: i32| {
        let name = thread::current().name().map(str::to_owned);
        out.lock().unwrap().push(name);
    })
    .wait()
    .unwrap();

    let names = names.lock().unwrap();
    assert_eq!(names.len(), 2);
    assert!(names.iter().all(|n| n.as_deref() == Some("plumbing-stage-0")));
}

#[test]
fn test_stage_threads_are_named_by_index() {
    let config = BUFFERED_CONFIG.with_name("words");
    let names: Vec<_> = Pipeline::with_config(vec!["a", "b"], config)
        .unwrap()
        .then(first_char)
        .then(|_: char| thread::current().name().map(str::to_owned))
        .collect();

    assert_eq!(names, [Some("words-stage-1".to_owned()), Some("words-stage-1".to_owned())]);
}

// =============================================================================
// Outlets
// =============================================================================

#[test]
fn test_outlet_consumers_share_pipeline_output() {
    let pipeline = Pipeline::with_config(0..500u32, BUFFERED_CONFIG)
        .unwrap()
        .then(|x: u32| x * 3);
    let outlet = pipeline.outlet().unwrap();

    let readers: Vec<_> = (0..2)
        .map(|_| {
            let outlet = outlet.clone();
            thread::spawn(move || outlet.collect::<Vec<_>>())
        })
        .collect();

    let mut seen: Vec<_> = readers
        .into_iter()
        .flat_map(|r| r.join().unwrap())
        .collect();
    assert!(pipeline.wait().is_ok());

    seen.sort_unstable();
    assert_eq!(seen, (0..500).map(|x| x * 3).collect::<Vec<_>>());
}

#[test]
fn test_capacity_below_two_is_rejected() {
    let err = Pipeline::with_config(0..1, Config::default().with_capacity(0)).unwrap_err();
    assert_eq!(err, ChannelError::CapacityTooSmall { capacity: 0, min: 2 });
}

// =============================================================================
// Failures
// =============================================================================

#[test]
fn test_panicking_stage_aborts_unbounded_pipeline() {
    let mut pipeline = Pipeline::from_source(0u64..)
        .then(|x: u64| {
            assert!(x < 10, "value {x} out of range");
            x
        })
        .then(|x| x + 1);

    let seen: Vec<_> = pipeline.by_ref().collect();
    assert!(seen.len() <= 10);
    assert!(seen.iter().copied().eq(1..=seen.len() as u64));

    let error = pipeline.wait().unwrap_err();
    assert!(error.is_panic());
    assert_eq!(error.stage(), 0);
    assert!(error.to_string().contains("value 10 out of range"));
}

#[test]
fn test_try_then_aborts_on_first_error() {
    let mut pipeline = Pipeline::from_source(0..10u32).try_then(reject_three);

    let seen: Vec<_> = pipeline.by_ref().map(Result::unwrap).collect();
    assert!(seen.len() <= 3);
    assert_eq!(seen, [0, 10, 20][..seen.len()]);

    match pipeline.wait() {
        Err(StageError::Failed { stage, source }) => {
            assert_eq!(stage, 0);
            assert_eq!(source.to_string(), "bad item 3");
        }
        other => panic!("expected stage failure, got {other:?}"),
    }
}

#[test]
fn test_propagate_emits_errors_as_items() {
    let mut pipeline = Pipeline::with_config(0..6u32, propagating())
        .unwrap()
        .try_then(reject_three)
        .then_ok(|x: u32| Ok::<_, String>(x + 1));

    let out: Vec<_> = pipeline.by_ref().collect();
    assert_eq!(out.len(), 6);

    let values: Vec<_> = out.iter().filter_map(|r| r.as_ref().ok().copied()).collect();
    assert_eq!(values, [1, 11, 21, 41, 51]);

    let error = out[3].as_ref().unwrap_err();
    assert_eq!(error.stage(), 0);
    assert_eq!(error.to_string(), "stage 0 failed: bad item 3");

    assert!(pipeline.wait().is_ok());
}

#[test]
fn test_propagate_reports_downstream_failures_with_their_stage() {
    let out: Vec<_> = Pipeline::with_config(vec![1u32, 2, 3], propagating())
        .unwrap()
        .try_then(|x: u32| Ok::<_, String>(x))
        .then_ok(|x: u32| if x == 2 { Err("even") } else { Ok(x) })
        .collect();

    assert!(matches!(out[0], Ok(1)));
    assert_eq!(out[1].as_ref().unwrap_err().stage(), 1);
    assert!(matches!(out[2], Ok(3)));
}

#[test]
fn test_propagate_turns_fallible_panics_into_items() {
    let out: Vec<_> = Pipeline::with_config(0..3u8, propagating())
        .unwrap()
        .try_then(|x: u8| {
            assert_ne!(x, 1, "no ones");
            Ok::<_, String>(x)
        })
        .collect();

    assert_eq!(out.len(), 3);
    assert!(out[1].as_ref().unwrap_err().is_panic());
    assert!(matches!(out[2], Ok(2)));
}

#[test]
fn test_then_panic_aborts_even_when_propagating() {
    let completion = Pipeline::with_config(0..100u32, propagating())
        .unwrap()
        .then(|x: u32| {
            assert!(x != 5, "five");
            x
        })
        .for_each(|_| {});

    let error = completion.wait().unwrap_err();
    assert!(error.is_panic());
    assert_eq!(error.stage(), 0);
}

// =============================================================================
// Shutdown
// =============================================================================

#[test]
fn test_dropping_unfinished_pipeline_does_not_hang() {
    let mut pipeline = Pipeline::from_source(0u64..)
        .then(|x: u64| x * 2)
        .then(|x| x + 1);

    let head: Vec<_> = pipeline.by_ref().take(5).collect();
    assert_eq!(head, [1, 3, 5, 7, 9]);
    drop(pipeline);
}

#[test]
fn test_shutdown_stops_infinite_source() {
    let pipeline = Pipeline::with_config(0u64.., BUFFERED_CONFIG)
        .unwrap()
        .then(|x: u64| x.wrapping_mul(31));

    thread::sleep(Duration::from_millis(10));
    assert!(pipeline.shutdown().is_ok());
}

#[test]
fn test_wait_drains_unread_output() {
    let count = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&count);

    let pipeline = Pipeline::from_source(0..64).then(move |x: i32| {
        counter.fetch_add(1, Ordering::Relaxed);
        x
    });
    assert!(pipeline.wait().is_ok());
    assert_eq!(count.load(Ordering::Relaxed), 64);
}
