//! End-to-end behaviour of the engine: ordering, completeness, batching,
//! shutdown and error propagation.

use pfor::channel;
use pfor::prelude::*;
use pfor::source::{from_fn, from_iter, TryIterSource};
use pfor::{run, run_with, Discard, FnSink};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn config(workers: usize, batch: usize) -> EngineConfig {
    EngineConfig::new().with_workers(workers).with_batch_size(batch)
}

fn sequential(items: &[u64]) -> Vec<u64> {
    items.iter().map(|x| x * 3 + 1).collect()
}

#[test]
fn identity_twenty_items_three_workers() {
    let report = run(
        &config(3, 4),
        from_iter(1..=20u32),
        |out: &mut Vec<u32>, item| {
            out.push(item);
            Ok(())
        },
        CollectSink::new(),
    )
    .unwrap();

    let units = report.sink.into_units();
    let seqs: Vec<u64> = units.iter().map(|u| u.seq).collect();
    assert_eq!(seqs, vec![0, 1, 2, 3, 4]);
    assert!(units.iter().all(|u| u.items == 4));

    let flat: Vec<u32> = units.into_iter().flat_map(|u| u.payload).collect();
    assert_eq!(flat, (1..=20).collect::<Vec<_>>());
}

#[test]
fn output_matches_sequential_run_with_jitter() {
    let items: Vec<u64> = (0..300).collect();
    let expected = sequential(&items);

    for (workers, batch) in [(1, 1), (2, 3), (4, 1), (5, 7), (8, 64)] {
        let out = Engine::new(config(workers, batch))
            .map(items.clone(), |x| {
                // Uneven per-item cost so batches complete out of order
                if x % 5 == 0 {
                    thread::sleep(Duration::from_micros(200));
                }
                Ok(x * 3 + 1)
            })
            .unwrap();
        assert_eq!(out, expected, "workers={workers} batch={batch}");
    }
}

#[test]
fn every_item_processed_exactly_once() {
    let seen = Mutex::new(Vec::new());

    run(
        &config(6, 5),
        from_iter(0..1_000usize),
        |_: &mut (), id| {
            seen.lock().push(id);
            Ok(())
        },
        Discard,
    )
    .unwrap();

    let mut seen = seen.into_inner();
    assert_eq!(seen.len(), 1_000);
    seen.sort_unstable();
    assert_eq!(seen, (0..1_000).collect::<Vec<_>>());
}

#[test]
fn batch_count_and_final_batch_size() {
    for (n, b) in [(0usize, 3usize), (1, 3), (9, 3), (10, 3), (10, 1), (5, 64)] {
        let report = run(
            &config(3, b),
            from_iter(0..n),
            |out: &mut Vec<usize>, item| {
                out.push(item);
                Ok(())
            },
            CollectSink::new(),
        )
        .unwrap();

        let expected_batches = n.div_ceil(b);
        assert_eq!(report.stats.batches as usize, expected_batches, "n={n} b={b}");

        let units = report.sink.into_units();
        assert_eq!(units.len(), expected_batches);
        if let Some(last) = units.last() {
            let expected_last = if n % b == 0 { b } else { n % b };
            assert_eq!(last.items, expected_last);
            assert!(units[..units.len() - 1].iter().all(|u| u.items == b));
        }
    }
}

#[test]
fn source_untouched_after_exhaustion_and_contexts_released() {
    let calls = AtomicUsize::new(0);
    let exhausted = AtomicBool::new(false);
    let called_after_end = AtomicBool::new(false);
    let marker = Arc::new(());
    let mut next = 0u32;

    run_with(
        &config(4, 3),
        |_| Ok(Buffered::<Arc<()>, Vec<u32>>::new(Arc::clone(&marker))),
        from_fn(|_: &mut Buffered<Arc<()>, Vec<u32>>| {
            calls.fetch_add(1, Ordering::SeqCst);
            if exhausted.load(Ordering::SeqCst) {
                called_after_end.store(true, Ordering::SeqCst);
            }
            if next == 25 {
                exhausted.store(true, Ordering::SeqCst);
                return Ok(None);
            }
            next += 1;
            Ok(Some(next))
        }),
        |ctx, item| {
            ctx.out.push(item);
            Ok(())
        },
        |_, _ctx| Ok(()),
        Discard,
    )
    .unwrap();

    assert!(!called_after_end.load(Ordering::SeqCst));
    assert_eq!(calls.load(Ordering::SeqCst), 26);
    // Every worker context was dropped before run returned
    assert_eq!(Arc::strong_count(&marker), 1);
}

#[test]
fn processing_failure_stops_commits_at_failing_batch() {
    let committed = Mutex::new(Vec::new());
    let fail_at = 503u32;
    let batch = 10usize;

    let err = run(
        &config(4, batch),
        from_iter(0..2_000u32),
        |out: &mut Vec<u32>, item| {
            if item == fail_at {
                return Err(Error::msg(format!("cannot process {item}")));
            }
            out.push(item);
            Ok(())
        },
        FnSink::new(|unit: OutputUnit<Vec<u32>>| {
            committed.lock().push(unit.seq);
            Ok(())
        }),
    )
    .unwrap_err();

    let failing_seq = (fail_at as usize / batch) as u64;
    match &err {
        Error::Processing { seq, source, .. } => {
            assert_eq!(*seq, failing_seq);
            assert!(source.to_string().contains("cannot process 503"));
        }
        other => panic!("unexpected error: {other}"),
    }

    let committed = committed.into_inner();
    // Committed units form a gap-free prefix that stops before the failure
    assert!(committed.iter().all(|&s| s < failing_seq));
    assert_eq!(committed, (0..committed.len() as u64).collect::<Vec<_>>());
}

#[test]
fn source_failure_is_reported() {
    let lines: Vec<Result<u32>> = (0..50)
        .map(|i| {
            if i == 42 {
                Err(Error::msg("malformed line 42"))
            } else {
                Ok(i)
            }
        })
        .collect();

    let err = run(
        &config(3, 8),
        TryIterSource::new(lines.into_iter()),
        |out: &mut Vec<u32>, item| {
            out.push(item);
            Ok(())
        },
        Vec::new(),
    )
    .unwrap_err();

    assert!(matches!(err, Error::Source { seq: 5, .. }));
    assert!(err.to_string().contains("malformed line 42"));
}

#[test]
fn source_receives_requesting_workers_context() {
    let report = run_with(
        &config(3, 2),
        |worker| Ok(Buffered::<usize, Vec<(usize, usize)>>::new(worker)),
        from_fn({
            let mut n = 0usize;
            move |ctx: &mut Buffered<usize, Vec<(usize, usize)>>| {
                n += 1;
                // Record which worker pulled the item
                Ok((n <= 30).then_some((ctx.state, n)))
            }
        }),
        |ctx, (puller, n)| {
            assert_eq!(puller, ctx.state);
            ctx.out.push((puller, n));
            Ok(())
        },
        |_, _| Ok(()),
        CollectSink::new(),
    )
    .unwrap();

    let pairs = report.sink.into_flat();
    let ns: Vec<usize> = pairs.iter().map(|&(_, n)| n).collect();
    assert_eq!(ns, (1..=30).collect::<Vec<_>>());
    let workers: HashSet<usize> = pairs.iter().map(|&(w, _)| w).collect();
    assert!(workers.iter().all(|&w| w < 3));
}

#[test]
fn finalizer_reduces_per_worker_state() {
    let total = Mutex::new(0u64);

    let report = run_with(
        &config(4, 16),
        |_| Ok(Buffered::<u64, ()>::new(0)),
        from_iter(1..=1_000u64),
        |ctx, x| {
            ctx.state += x;
            Ok(())
        },
        |_, ctx| {
            *total.lock() += ctx.state;
            Ok(())
        },
        Discard,
    )
    .unwrap();

    assert_eq!(*total.lock(), 500_500);
    assert_eq!(report.stats.items, 1_000);
}

#[test]
fn init_failure_is_fatal() {
    let err = run_with(
        &config(2, 4),
        |worker| {
            if worker == 1 {
                Err(Error::msg("no scratch space"))
            } else {
                Ok(Vec::<u8>::new())
            }
        },
        from_iter(0..100u8),
        |out, x| {
            out.push(x);
            Ok(())
        },
        |_, _| Ok(()),
        Discard,
    )
    .unwrap_err();

    assert!(matches!(err, Error::Init { worker: 1, .. }));
}

#[test]
fn streams_to_consumer_thread() {
    let (sink, rx) = channel::bounded::<String>(2);

    let received = thread::scope(|s| {
        let consumer = s.spawn(move || rx.payloads().collect::<String>());

        run(
            &config(3, 5),
            from_iter(0..100u32),
            |out: &mut String, n: u32| {
                out.push_str(&format!("{n},"));
                Ok(())
            },
            sink,
        )
        .unwrap();

        consumer.join().unwrap()
    });

    let expected: String = (0..100).map(|n| format!("{n},")).collect();
    assert_eq!(received, expected);
}

struct LineNumbers;

impl Job for LineNumbers {
    type Item = (usize, String);
    type Context = String;

    fn init(&self, _worker: WorkerIndex) -> Result<String> {
        Ok(String::new())
    }

    fn process(&self, out: &mut String, (n, line): (usize, String)) -> Result<()> {
        out.push_str(&format!("{:>4} {}\n", n, line));
        Ok(())
    }
}

#[test]
fn job_trait_with_write_sink() {
    let lines = (1..=50).map(|n| (n, format!("line {n}")));
    let report = Engine::new(config(3, 7))
        .run(from_iter(lines), &LineNumbers, WriteSink::new(Vec::new()))
        .unwrap();

    let text = String::from_utf8(report.sink.into_inner()).unwrap();
    let first: Vec<&str> = text.lines().take(2).collect();
    assert_eq!(first, vec!["   1 line 1", "   2 line 2"]);
    assert_eq!(text.lines().count(), 50);
    assert!(text.ends_with("  50 line 50\n"));
}
