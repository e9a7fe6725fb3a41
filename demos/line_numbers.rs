//! Number the lines of stdin in parallel, writing them to stdout in order
//!
//! ```text
//! cargo run --example line_numbers < some_file.txt
//! RUST_LOG=pfor=debug cargo run --example line_numbers < some_file.txt
//! ```

use pfor::prelude::*;
use pfor::source::from_fn;
use std::io::{self, BufRead};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    // Log to stderr so stdout is clean for output
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let config = EngineConfig::new().with_batch_size(256);

    let mut lines = io::BufReader::new(io::stdin()).lines();
    let mut line_no = 0usize;

    // Reading happens under the dispatcher lock; the reader never needs to be shared.
    let source = from_fn(move |_: &mut String| {
        match lines.next().transpose()? {
            Some(line) => {
                line_no += 1;
                Ok(Some((line_no, line)))
            }
            None => Ok(None),
        }
    });

    let report = pfor::run(
        &config,
        source,
        |out: &mut String, (n, line): (usize, String)| {
            out.push_str(&format!("{:>6}  {}\n", n, line));
            Ok(())
        },
        WriteSink::new(io::stdout()),
    )?;

    eprintln!(
        "{} lines in {} batches, {:.0} lines/s",
        report.stats.items,
        report.stats.batches,
        report.stats.throughput()
    );

    Ok(())
}
