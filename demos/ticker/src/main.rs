extern crate cadence;
extern crate parking_lot;

use cadence::prelude::*;
use std::sync::atomic::{AtomicU64, Ordering};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

const TICKS: u64 = 20;
const BYTES_PER_TICK: u64 = 64 * 1024;

/// A repeating timer feeds a background engine, which measures the rate at
/// which it receives bytes. After `TICKS` ticks, the main thread, driven by
/// a `DrivenDispatchEngine`, prints a summary and exits.
fn main() -> Result<()> {
    let config = DispatchConfig::new(&Config::new(&[("CADENCE_LOG_LEVEL", "debug")]))
        .map_err(Error::Config)?;

    if let Err(e) = cadence::logging::setup_logger(config.log_level) {
        eprintln!("cannot initialize logger; {}", e);
    }

    let main_loop = Arc::new(DrivenDispatchEngine::new());
    let engine = Arc::new(WorkerDispatchEngine::with_config(&config)?);
    let timers = ActiveTimerScheduler::start(&config)?;

    let received = Arc::new(AtomicU64::new(0));
    let throughput = Arc::new(Mutex::new(Throughput::with_config(&config)));

    let ticks = Arc::new(AtomicU64::new(0));

    {
        let engine = engine.clone();
        let main_loop = main_loop.clone();
        let received = received.clone();
        let throughput = throughput.clone();
        let ticks = ticks.clone();

        timers.create_timer(
            Duration::from_millis(50),
            move || {
                let tick = ticks.fetch_add(1, Ordering::SeqCst) + 1;

                let received = received.clone();
                let throughput = throughput.clone();

                engine.submit_async(move || {
                    let tag = format!("tick {}", tick);
                    let _guard = LatencyGuard::new(tag, Duration::from_millis(20));

                    let total =
                        received.fetch_add(BYTES_PER_TICK, Ordering::SeqCst) + BYTES_PER_TICK;

                    throughput.lock().update(total);
                });

                if tick == TICKS {
                    let throughput = throughput.clone();

                    main_loop.submit_async(move || {
                        let kbps = throughput.lock().kbps();

                        info!("received {} ticks at {:.1} kbps", TICKS, kbps);
                    });

                    main_loop.stop();
                }
            },
            TimerMode::Repeating,
        )?;
    }

    engine.submit_after(Duration::from_millis(500), || info!("halfway there"));

    main_loop.run();

    engine.flush();

    info!(
        "{} bytes received, {} timers still live",
        received.load(Ordering::SeqCst),
        timers.count()
    );

    Ok(())
}
