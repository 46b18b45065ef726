//! Coordinator runtime: wires the scheduler, control loop, expiry sweep and
//! status reporter for one zone.

use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::config::CoordinatorConfig;
use crate::error::CoordinatorError;
use crate::points::{PointGateway, ZonePoints};
use crate::reporting::{StatusHistory, log_snapshot};

use super::applicator::{OverrideApplicator, OverrideErrorFlag};
use super::clock::Clock;
use super::control::{ControlHandle, Controller, TickCause, TickReport, run_control_loop};
use super::scheduler::Scheduler;
use super::state::{CoreState, SharedState, StatusSnapshot};

/// Capacity of the on-demand tick queue.
const TICK_QUEUE: usize = 16;

/// Running coordinator for one zone.
///
/// Owns the background tasks; [`Coordinator::shutdown`] stops them after a
/// final release tick.
pub struct Coordinator {
    scheduler: Scheduler,
    control: ControlHandle,
    error_flag: OverrideErrorFlag,
    history: Arc<Mutex<StatusHistory>>,
    tasks: Vec<JoinHandle<()>>,
    control_task: JoinHandle<()>,
}

impl Coordinator {
    /// Starts every task. Must be called inside a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `CoordinatorError::Configuration` if a zone point does not parse.
    pub fn start(
        config: &CoordinatorConfig,
        gateway: Arc<dyn PointGateway>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, CoordinatorError> {
        let points = ZonePoints::from_config(&config.zone)?;
        let shared =
            CoreState::new(config.scheduler.opt_in, config.control.normal_payload).shared();

        let error_flag = OverrideErrorFlag::default();
        let applicator =
            OverrideApplicator::new(gateway, config.control.io_timeout(), error_flag.clone());
        let controller = Controller::new(config.control.clone(), points, applicator);

        let (control, requests) = ControlHandle::channel(TICK_QUEUE);
        let control_task = tokio::spawn(run_control_loop(controller, shared.clone(), requests));

        let scheduler = Scheduler::new(shared.clone(), clock.clone(), control.clone());
        let history = Arc::new(Mutex::new(StatusHistory::new(
            config.scheduler.history_capacity,
        )));

        let tasks = vec![
            tokio::spawn(scheduler.clone().run_driver()),
            tokio::spawn(run_sweep(scheduler.clone(), config.scheduler.sweep_interval())),
            tokio::spawn(run_reporter(
                shared,
                clock,
                error_flag.clone(),
                history.clone(),
                config.scheduler.report_interval(),
            )),
        ];
        info!(
            "coordinator started: tick {:?}, sweep {:?}, report {:?}",
            config.control.tick_interval(),
            config.scheduler.sweep_interval(),
            config.scheduler.report_interval()
        );

        Ok(Self {
            scheduler,
            control,
            error_flag,
            history,
            tasks,
            control_task,
        })
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn error_flag(&self) -> &OverrideErrorFlag {
        &self.error_flag
    }

    pub async fn status(&self) -> StatusSnapshot {
        let now = self.scheduler.clock().now();
        self.scheduler
            .shared()
            .lock()
            .await
            .snapshot(now, self.error_flag.get())
    }

    pub fn history(&self) -> Arc<Mutex<StatusHistory>> {
        self.history.clone()
    }

    /// Runs an out-of-cadence control tick.
    ///
    /// # Errors
    ///
    /// Returns `CoordinatorError::ControlLoopClosed` after shutdown.
    pub async fn tick_now(&self) -> Result<TickReport, CoordinatorError> {
        self.control.tick_now(TickCause::Requested).await
    }

    /// Stops the timers, releases any overrides still in force and stops
    /// the control loop. Returns the recorded status history.
    pub async fn shutdown(self) -> Vec<StatusSnapshot> {
        for task in &self.tasks {
            task.abort();
        }

        {
            let mut core = self.scheduler.shared().lock().await;
            if let Some(id) = core.dr.event_id.clone() {
                warn!("shutting down during event {id}; releasing overrides");
                core.end_event(&id);
            }
        }
        if let Err(e) = self.control.tick_now(TickCause::Shutdown).await {
            warn!("final tick not run: {e}");
        }
        self.control_task.abort();

        let history = self.history.lock().await.to_vec();
        info!("coordinator stopped after {} status reports", history.len());
        history
    }
}

async fn run_sweep(scheduler: Scheduler, period: Duration) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately; nothing can be stale yet.
    interval.tick().await;
    loop {
        interval.tick().await;
        scheduler.sweep().await;
    }
}

async fn run_reporter(
    shared: SharedState,
    clock: Arc<dyn Clock>,
    error_flag: OverrideErrorFlag,
    history: Arc<Mutex<StatusHistory>>,
    period: Duration,
) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        let snapshot = shared.lock().await.snapshot(clock.now(), error_flag.get());
        log_snapshot(&snapshot);
        history.lock().await.push(snapshot);
    }
}
