//! Consume ordered results on another thread while the run is in progress

use pfor::channel;
use pfor::prelude::*;
use pfor::source::from_iter;
use std::thread;
use std::time::Duration;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();

    let (sink, rx) = channel::bounded::<Vec<u64>>(8);
    let config = EngineConfig::new().with_workers(4).with_batch_size(10);

    thread::scope(|s| {
        let consumer = s.spawn(move || {
            for unit in rx.iter() {
                println!(
                    "batch {:>3} from worker {} ({} items): first = {:?}",
                    unit.seq,
                    unit.worker,
                    unit.items,
                    unit.payload.first()
                );
            }
        });

        let report = pfor::run(
            &config,
            from_iter(0..200u64),
            |out: &mut Vec<u64>, n: u64| {
                // Larger numbers are cheaper, so later batches tend to finish first
                thread::sleep(Duration::from_micros(2_000 - n * 10));
                out.push(n * n);
                Ok(())
            },
            sink,
        )?;

        println!("max pending units: {}", report.stats.max_pending);
        drop(report);

        consumer
            .join()
            .map_err(|_| Error::WorkerPanicked("consumer".to_string()))
    })
}
