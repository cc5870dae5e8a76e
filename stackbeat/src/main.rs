//! # stackbeat - Diagnostic Harness
//!
//! Exercises the sampling engine end-to-end against the synthetic
//! runtime bridge: N worker threads register themselves, run a busy
//! loop that pumps the safepoint queue (the role a managed runtime
//! plays between bytecodes), then drain and report. Useful for watching
//! timer delivery, skip counters, and capture throughput on a real
//! machine without embedding in a runtime.

use anyhow::{Context, Result};
use clap::Parser;
use crossbeam_channel::{unbounded, Sender};
use log::{debug, info};
use std::fs::File;
use std::io::BufWriter;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use stackbeat::cli::Args;
use stackbeat::export::{ProfileReport, ThreadReport};
use stackbeat::runtime::{RuntimeBridge, SyntheticRuntime};
use stackbeat::sampling;

// Exit codes
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;

fn main() {
    env_logger::init();
    std::process::exit(match run() {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            EXIT_ERROR
        }
    });
}

fn run() -> Result<()> {
    let args = Args::parse();
    if args.threads == 0 {
        anyhow::bail!("--threads must be at least 1");
    }

    if sampling::install() {
        info!("sampler installed");
    }
    sampling::start();

    let window = Duration::from_secs(args.duration);
    let (tx, rx) = unbounded();

    let mut workers = Vec::with_capacity(args.threads);
    for worker in 0..args.threads {
        let tx = tx.clone();
        let handle = thread::Builder::new()
            .name(format!("beat-worker-{worker}"))
            .spawn(move || sample_worker(worker, window, &tx))?;
        workers.push(handle);
    }
    // Drop the last sender so the report iterator below terminates
    drop(tx);

    for handle in workers {
        handle.join().map_err(|_| anyhow::anyhow!("worker thread panicked"))??;
    }

    let mut rows: Vec<ThreadReport> = rx.iter().collect();
    rows.sort_by_key(|r| r.tid);

    if !args.quiet {
        println!("{:>8}  {:>8}  {}", "tid", "traces", "skipped gc/handler/pending/ctx");
        for row in &rows {
            println!(
                "{:>8}  {:>8}  {}/{}/{}/{}",
                row.tid,
                row.captured,
                row.skipped_in_gc,
                row.skipped_in_handler,
                row.skipped_in_pending,
                row.skipped_not_current
            );
        }
    }

    sampling::stop();

    if let Some(path) = args.export {
        let mut report = ProfileReport::new();
        for row in rows {
            report.add_thread(row);
        }
        let file = File::create(&path)
            .with_context(|| format!("failed to create {}", path.display()))?;
        report.export(&mut BufWriter::new(file))?;
        info!("wrote profile report to {}", path.display());
    }

    Ok(())
}

/// One sampled worker: register, spin, pump safepoints, drain, report.
fn sample_worker(worker: usize, window: Duration, tx: &Sender<ThreadReport>) -> Result<()> {
    // Stack depth varies per worker so the reports are tellable apart
    let runtime = Arc::new(SyntheticRuntime::with_stack_depth(8 + worker));
    let bridge: Arc<dyn RuntimeBridge> = runtime.clone();

    if !sampling::register_thread(bridge) {
        anyhow::bail!("worker {worker} failed to register");
    }
    sampling::start_sampling();

    let deadline = Instant::now() + window;
    let mut checksum = 0u64;
    while Instant::now() < deadline {
        checksum = checksum.wrapping_add(spin_workload(512));
        // Safepoint analogue: give any queued capture a chance to run
        runtime.run_deferred();
        thread::sleep(Duration::from_micros(200));
    }

    sampling::stop_sampling(false);
    let drained = sampling::drain_frames();
    let counters = sampling::skip_counters();
    let report =
        ThreadReport::from_drained(sampling::current_tid(), &drained, counters, runtime.as_ref());
    sampling::unregister_thread();

    debug!("worker {worker} finished (checksum {checksum:x})");
    tx.send(report).context("reporter hung up")?;
    Ok(())
}

/// Burn a little CPU so the samples land on something
fn spin_workload(iters: u64) -> u64 {
    (0..iters).fold(0u64, |acc, i| acc.rotate_left(3) ^ i)
}
