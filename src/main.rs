//! Coordinator entry point: CLI wiring, simulated gateway and run loop.

use std::process;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use env_logger::Env;
use log::{error, info, warn};

use dr_coordinator::cli::{self, CliOptions};
use dr_coordinator::config::CoordinatorConfig;
use dr_coordinator::dr::{Clock, Coordinator, SystemClock};
use dr_coordinator::io::export::export_csv;
use dr_coordinator::points::simulated::Co2Profile;
use dr_coordinator::points::{SimulatedGateway, ZonePoints};
use dr_coordinator::reporting::RunSummary;
use dr_coordinator::source::{FaultScript, ScriptedEventSource};

fn load_config(opts: &CliOptions) -> CoordinatorConfig {
    // --config takes priority, then --preset, then baseline default
    let loaded = match (&opts.config, &opts.preset) {
        (Some(path), _) => CoordinatorConfig::from_toml_file(path),
        (None, Some(name)) => CoordinatorConfig::from_preset(name),
        (None, None) => Ok(CoordinatorConfig::baseline()),
    };
    let mut config = loaded.unwrap_or_else(|e| {
        error!("{e}");
        process::exit(1);
    });

    if let Some(seed) = opts.seed {
        config.simulation.seed = seed;
    }
    if let Some(secs) = opts.duration_secs {
        config.simulation.duration_secs = secs;
    }

    let errors = config.validate();
    if !errors.is_empty() {
        for e in &errors {
            error!("{e}");
        }
        process::exit(1);
    }
    config
}

async fn run(config: CoordinatorConfig, opts: CliOptions) -> Result<(), String> {
    let sim = &config.simulation;
    let zone = ZonePoints::from_config(&config.zone).map_err(|e| e.to_string())?;

    let gateway = SimulatedGateway::for_zone(
        &zone,
        sim.seed,
        sim.initial_setpoint,
        sim.raw_mode,
        sim.co2_base_ppm,
    )
    .await
    .with_latency(Duration::from_millis(sim.latency_ms));
    gateway
        .set_co2_profile(
            zone.co2.point.clone(),
            Co2Profile {
                base_ppm: sim.co2_base_ppm,
                amp_ppm: sim.co2_amp_ppm,
                period: Duration::from_secs(sim.co2_period_secs),
                noise_std: sim.co2_noise_std,
            },
        )
        .await;
    let gateway = Arc::new(gateway);

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let anchor = clock.now();
    let coordinator =
        Coordinator::start(&config, gateway.clone(), clock).map_err(|e| e.to_string())?;

    let faults = FaultScript::new(&zone, &sim.faults);
    if !faults.is_empty() {
        tokio::spawn(faults.run(gateway.clone()));
    }
    let source = ScriptedEventSource::new(anchor, &config.events);
    let source_task = tokio::spawn(source.run(coordinator.scheduler().clone()));

    #[cfg(feature = "api")]
    let api_task = opts.api_bind.map(|addr| {
        let state = dr_coordinator::api::AppState::from_coordinator(&coordinator);
        tokio::spawn(async move {
            if let Err(e) = dr_coordinator::api::serve(state, addr).await {
                error!("API server stopped: {e}");
            }
        })
    });

    let duration = Duration::from_secs(sim.duration_secs);
    info!("running for {duration:?} (started {anchor})");
    tokio::select! {
        () = tokio::time::sleep(duration) => info!("run duration elapsed"),
        signal = tokio::signal::ctrl_c() => match signal {
            Ok(()) => info!("interrupted; shutting down"),
            Err(e) => warn!("cannot listen for ctrl-c: {e}"),
        },
    }

    source_task.abort();
    #[cfg(feature = "api")]
    if let Some(task) = api_task {
        task.abort();
    }

    let history = coordinator.shutdown().await;
    info!("gateway handled {} writes", gateway.write_count().await);
    println!("\n{}", RunSummary::from_history(&history));

    if let Some(ref path) = opts.status_out {
        export_csv(&history, path)
            .map_err(|e| format!("failed to write CSV to {}: {e}", path.display()))?;
        info!("status history written to {}", path.display());
    }
    Ok(())
}

fn main() {
    let opts = cli::parse_args().unwrap_or_else(|e| {
        eprintln!("error: {e}");
        cli::print_usage();
        process::exit(2);
    });

    let level = opts.log_level.clone().unwrap_or_else(|| "info".to_string());
    env_logger::Builder::from_env(Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();

    let config = load_config(&opts);

    let runtime = tokio::runtime::Runtime::new().unwrap_or_else(|e| {
        error!("failed to create tokio runtime: {e}");
        process::exit(1);
    });
    if let Err(e) = runtime.block_on(run(config, opts)) {
        error!("{e}");
        process::exit(1);
    }
}
