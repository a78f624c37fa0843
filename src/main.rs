// Ball Intercept - Main Entry Point
// Replays recorded vision output on the tick clock and emits actuator commands
// Licensed under AGPL v3

use ball_intercept::config::Config;
use ball_intercept::input::FrameReader;
use ball_intercept::output::{CsvOutput, JsonOutput, OutputHandler};
use ball_intercept::tracker::{Session, SessionEvent, TickAction};
use clap::Parser;
use tokio::signal;
use tracing::{debug, error, info, warn};

/// Counters reported when the replay ends
#[derive(Debug, Default)]
struct ReplayStats {
    frames: usize,
    updates: usize,
    predicted: usize,
    skipped: usize,
    malformed: usize,
    commands: usize,
    calibrations: usize,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse command-line arguments
    let config = Config::parse();

    // Initialize logging
    init_logging(config.verbose);

    info!("Starting ball intercept tracker");

    let settings = config.session_settings()?;
    let tick_period = config.tick_period()?;
    let mut session = Session::start(settings)?;

    // Setup outputs
    let mut outputs: Vec<Box<dyn OutputHandler>> = Vec::new();
    for filename in &config.write_csv {
        info!("Writing CSV results to {}", filename);
        match CsvOutput::new(filename) {
            Ok(out) => outputs.push(Box::new(out)),
            Err(e) => error!("Failed to open CSV output file {}: {}", filename, e),
        }
    }
    for filename in &config.write_json {
        info!("Writing JSON results to {}", filename);
        match JsonOutput::new(filename) {
            Ok(out) => outputs.push(Box::new(out)),
            Err(e) => error!("Failed to open JSON output file {}: {}", filename, e),
        }
    }

    let frames = FrameReader::open(&config.frames)?;
    info!(
        "Replaying {} ({})",
        config.frames,
        if config.realtime {
            format!("{} ms ticks", tick_period.as_millis())
        } else {
            "as fast as possible".to_string()
        }
    );

    let mut ticker = tokio::time::interval(tick_period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let shutdown = signal::ctrl_c();
    tokio::pin!(shutdown);

    let mut stats = ReplayStats::default();
    for frame in frames {
        if config.realtime {
            tokio::select! {
                _ = ticker.tick() => {}
                res = &mut shutdown => {
                    match res {
                        Ok(()) => info!("Received shutdown signal (Ctrl+C)"),
                        Err(err) => error!("Unable to listen for shutdown signal: {}", err),
                    }
                    break;
                }
            }
        }

        stats.frames += 1;
        let observation = match frame {
            Ok(obs) => obs,
            Err(e) => {
                warn!("Skipping frame: {}", e);
                stats.malformed += 1;
                continue;
            }
        };

        match session.handle(observation) {
            SessionEvent::Tick(report) => {
                match report.action {
                    TickAction::Update(_) => stats.updates += 1,
                    TickAction::PredictOnly => stats.predicted += 1,
                    TickAction::NoObservation => stats.skipped += 1,
                }
                if let Some(cmd) = &report.command {
                    stats.commands += 1;
                    debug!("tick {}: move actuator to {:.1}", report.tick, cmd.position);
                }
                for out in outputs.iter_mut() {
                    out.handle_tick(&report);
                }
            }
            SessionEvent::Calibration(boundaries) => {
                stats.calibrations += 1;
                info!("Calibrated boundaries: {:?}", boundaries);
                let tick = session.estimator().current_tick();
                for out in outputs.iter_mut() {
                    out.handle_calibration(tick, &boundaries);
                }
            }
        }
    }

    for out in outputs.iter_mut() {
        out.flush();
    }

    info!(
        "Replay finished: {} frames ({} updates, {} predict-only, {} skipped, {} malformed), {} commands, {} calibrations",
        stats.frames,
        stats.updates,
        stats.predicted,
        stats.skipped,
        stats.malformed,
        stats.commands,
        stats.calibrations
    );

    Ok(())
}

/// Initialize logging subsystem
fn init_logging(verbose: bool) {
    use tracing_subscriber::fmt::format::FmtSpan;

    let subscriber = tracing_subscriber::fmt()
        .with_target(false)
        .with_thread_ids(false)
        .with_level(true)
        .with_span_events(if verbose {
            FmtSpan::ENTER | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        });

    if verbose {
        subscriber
            .with_max_level(tracing::Level::DEBUG)
            .init();
        info!("Verbose logging enabled (DEBUG level)");
    } else {
        subscriber
            .with_max_level(tracing::Level::INFO)
            .init();
    }
}
