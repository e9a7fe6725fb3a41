//! Count words per line in parallel and reduce per-worker totals at shutdown

use pfor::prelude::*;
use pfor::source::from_iter;
use std::sync::atomic::{AtomicU64, Ordering};

/// Per-worker state: a running total plus this batch's per-line counts
type Counter = Buffered<u64, Vec<usize>>;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();

    let text: Vec<String> = (0..10_000)
        .map(|i| "lorem ipsum dolor ".repeat(i % 7 + 1))
        .collect();

    let total = AtomicU64::new(0);
    let config = EngineConfig::new().with_workers(4).with_batch_size(128);

    let report = pfor::run_with(
        &config,
        |_worker| Ok(Counter::new(0)),
        from_iter(text.iter()),
        |ctx: &mut Counter, line| {
            let words = line.split_whitespace().count();
            ctx.state += words as u64;
            ctx.out.push(words);
            Ok(())
        },
        |worker, ctx: Counter| {
            println!("worker {} counted {} words", worker, ctx.state);
            total.fetch_add(ctx.state, Ordering::Relaxed);
            Ok(())
        },
        CollectSink::new(),
    )?;

    let per_line = report.sink.into_flat();
    println!("first lines: {:?}", &per_line[..7]);
    println!("total words: {}", total.load(Ordering::Relaxed));

    for (i, w) in report.stats.workers.iter().enumerate() {
        println!("worker {}: {} batches, {} items, busy {:?}", i, w.batches, w.items, w.busy);
    }

    Ok(())
}
