use super::callbacks::{SessionCallbacks, SummarySink};
use super::command::ControlCommand;
use super::snapshot::{SessionSnapshot, SessionStatus};
use crate::clock::{ClockSignal, Phase, SessionClock};
use crate::collector::{IngestOutcome, RejectReason, ShotCollector};
use crate::config::{DrillConfig, MAX_SECONDS};
use crate::error::{DrillError, Result};
use crate::events::{DrillEvent, EventBus};
use crate::readiness::{ExpectedDevice, ReadinessCoordinator};
use crate::scoring::{DrillRepeatSummary, ScoringAggregator};
use crate::transport::{Transport, TransportCommand, TransportEvent};
use chrono::Utc;
use rand::Rng;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

type FinalizeTask = JoinHandle<Result<DrillRepeatSummary>>;

/// Collaborators handed to the session task by the builder
pub(crate) struct SessionParts {
    pub config: DrillConfig,
    pub devices: Vec<ExpectedDevice>,
    pub transport: Arc<dyn Transport>,
    pub callbacks: Arc<dyn SessionCallbacks>,
    pub sink: Option<Arc<dyn SummarySink>>,
    pub event_bus: EventBus,
    pub scoring: ScoringAggregator,
}

/// Sole owner of the session state. Runs on its own task and processes one
/// message or tick at a time.
pub(crate) struct SessionActor {
    config: DrillConfig,
    transport: Arc<dyn Transport>,
    callbacks: Arc<dyn SessionCallbacks>,
    sink: Option<Arc<dyn SummarySink>>,
    event_bus: EventBus,
    scoring: ScoringAggregator,
    readiness: ReadinessCoordinator,
    collector: ShotCollector,
    clock: SessionClock,
    finalize_task: Option<FinalizeTask>,
    status: SessionStatus,
    current_repeat: u32,
    last_started_repeat: Option<u32>,
    delay_override: Option<f64>,
    delays_used: Vec<f64>,
    summaries: Vec<DrillRepeatSummary>,
    ended_devices: HashSet<String>,
    /// Arm as soon as the outstanding readiness check passes
    auto_arm: bool,
    complete_requested: bool,
}

impl SessionActor {
    pub(crate) fn new(parts: SessionParts) -> Self {
        let config = parts.config;
        let readiness = ReadinessCoordinator::new(parts.devices, config.readiness.timeout());
        let clock = SessionClock::new(
            config.session.tick_interval(),
            config.grace.duration(),
            config.grace.finalize_max_wait(),
            config.session.max_drill_duration(),
        );

        Self {
            transport: parts.transport,
            callbacks: parts.callbacks,
            sink: parts.sink,
            event_bus: parts.event_bus,
            scoring: parts.scoring,
            readiness,
            collector: ShotCollector::new(),
            clock,
            finalize_task: None,
            status: SessionStatus::Running,
            current_repeat: 1,
            last_started_repeat: None,
            delay_override: None,
            delays_used: Vec::new(),
            summaries: Vec::new(),
            ended_devices: HashSet::new(),
            auto_arm: false,
            complete_requested: false,
            config,
        }
    }

    /// Process commands, transport notifications and ticks until the session
    /// is stopped or every controller handle is dropped
    pub(crate) async fn run(
        mut self,
        mut commands: mpsc::Receiver<ControlCommand>,
        mut inbound: mpsc::UnboundedReceiver<TransportEvent>,
        cancel: CancellationToken,
    ) {
        let mut ticker = tokio::time::interval(self.clock.tick_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut inbound_open = true;

        info!(
            "Drill session running: {} repeats across {} devices",
            self.total_repeats(),
            self.readiness.devices().len()
        );

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    info!("Drill session stopped");
                    break;
                }

                event = inbound.recv(), if inbound_open => match event {
                    Some(event) => self.handle_transport_event(event).await,
                    None => {
                        warn!("Transport notification stream closed");
                        inbound_open = false;
                    }
                },

                joined = join_finalize(&mut self.finalize_task), if self.finalize_task.is_some() => {
                    self.finalize_task = None;
                    self.on_finalize_joined(joined).await;
                }

                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => {
                        debug!("All controller handles dropped");
                        break;
                    }
                },

                _ = ticker.tick() => self.on_tick().await,
            }
        }

        self.shutdown().await;
    }

    fn total_repeats(&self) -> u32 {
        self.config.session.repeats
    }

    fn ensure_running(&self) -> Result<()> {
        match self.status {
            SessionStatus::Running => Ok(()),
            _ => Err(DrillError::SessionClosed),
        }
    }

    async fn handle_command(&mut self, command: ControlCommand) {
        debug!("Handling {}", command.name());
        match command {
            ControlCommand::SetCurrentRepeat { repeat, reply } => {
                let _ = reply.send(self.set_current_repeat(repeat));
            }
            ControlCommand::SetRandomDelay { seconds, reply } => {
                let _ = reply.send(self.set_random_delay(seconds));
            }
            ControlCommand::SetBeepTime { at, reply } => {
                let _ = reply.send(self.set_beep_time(at));
            }
            ControlCommand::PerformReadinessCheck { reply } => {
                let result = self.perform_readiness_check().await;
                let _ = reply.send(result);
            }
            ControlCommand::StartExecution { reply } => {
                let result = match self.ensure_running() {
                    Ok(()) => self.arm_current_repeat().await,
                    Err(e) => Err(e),
                };
                let _ = reply.send(result);
            }
            ControlCommand::ManualStopRepeat { reply } => {
                let result = match self.ensure_running() {
                    Ok(()) => self.stop_active_repeat(true).await,
                    Err(e) => Err(e),
                };
                let _ = reply.send(result);
            }
            ControlCommand::IsCurrentRepeatFinalized { reply } => {
                let _ = reply.send(self.is_current_repeat_finalized());
            }
            ControlCommand::CompleteDrill { reply } => {
                self.complete_drill().await;
                let _ = reply.send(());
            }
            ControlCommand::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
        }
    }

    fn set_current_repeat(&mut self, repeat: u32) -> Result<()> {
        self.ensure_running()?;

        let phase = self.clock.phase();
        if phase != Phase::Idle {
            return Err(DrillError::invalid_state(format!(
                "cannot change the current repeat while {}",
                phase.name()
            )));
        }

        if repeat == 0 || repeat > self.total_repeats() {
            return Err(DrillError::invalid_state(format!(
                "repeat {} is outside 1..={}",
                repeat,
                self.total_repeats()
            )));
        }

        if self.summaries.iter().any(|s| s.repeat_index == repeat) {
            return Err(DrillError::invalid_state(format!(
                "repeat {} is already finalized",
                repeat
            )));
        }

        self.current_repeat = repeat;
        debug!("Current repeat set to {}", repeat);
        Ok(())
    }

    fn set_random_delay(&mut self, seconds: f64) -> Result<()> {
        self.ensure_running()?;
        if !(0.0..=MAX_SECONDS).contains(&seconds) {
            return Err(DrillError::invalid_state(format!(
                "start delay must be between 0 and {} seconds, got {}",
                MAX_SECONDS, seconds
            )));
        }
        self.delay_override = Some(seconds);
        debug!("Next start delay fixed at {:.2}s", seconds);
        Ok(())
    }

    /// Move time zero of the running repeat to when the host actually
    /// played the beep
    fn set_beep_time(&mut self, at: Instant) -> Result<()> {
        self.ensure_running()?;

        if !self.clock.set_beep_time(at) {
            return Err(DrillError::invalid_state(format!(
                "no repeat is running while {}",
                self.clock.phase().name()
            )));
        }

        let since = Instant::now().saturating_duration_since(at);
        let beep_time = Utc::now()
            - chrono::Duration::from_std(since).unwrap_or_else(|_| chrono::Duration::zero());
        self.collector.set_beep_time(at, beep_time);
        debug!("Beep time moved {:.3}s back", since.as_secs_f64());
        Ok(())
    }

    async fn perform_readiness_check(&mut self) -> Result<()> {
        self.ensure_running()?;

        let phase = self.clock.phase();
        if phase != Phase::Idle {
            return Err(DrillError::invalid_state(format!(
                "cannot check readiness while {}",
                phase.name()
            )));
        }

        self.auto_arm = false;
        self.begin_readiness(self.current_repeat).await
    }

    async fn begin_readiness(&mut self, repeat: u32) -> Result<()> {
        let commands = self
            .readiness
            .begin(repeat, &self.config.session.mode, Instant::now());

        self.publish(DrillEvent::ReadinessCheckStarted {
            repeat,
            devices: commands.len(),
        })
        .await;

        for command in &commands {
            self.send(command).await?;
        }

        // No devices to wait for
        if self.readiness.all_ready() && self.auto_arm {
            self.arm_after_readiness().await;
        }
        Ok(())
    }

    async fn arm_after_readiness(&mut self) {
        self.auto_arm = false;
        if let Err(e) = self.arm_current_repeat().await {
            warn!("Could not arm repeat {}: {}", self.current_repeat, e);
        }
    }

    fn random_delay(&self) -> f64 {
        let min = self.config.session.delay_min_seconds;
        let max = self.config.session.delay_max_seconds;
        if max > min {
            rand::thread_rng().gen_range(min..=max)
        } else {
            min
        }
    }

    /// Arm the current repeat with a random (or caller-fixed) start delay.
    /// Returns the delay in seconds.
    async fn arm_current_repeat(&mut self) -> Result<f64> {
        let repeat = self.current_repeat;
        if repeat > self.total_repeats() || self.summaries.iter().any(|s| s.repeat_index == repeat)
        {
            return Err(DrillError::invalid_state(format!(
                "repeat {} cannot be started",
                repeat
            )));
        }

        let delay = self.delay_override.unwrap_or_else(|| self.random_delay());
        let wait = Duration::try_from_secs_f64(delay).map_err(|e| {
            DrillError::invalid_state(format!("start delay {} is unusable: {}", delay, e))
        })?;
        self.clock.arm(repeat, wait, Instant::now())?;
        self.delay_override = None;

        if self.readiness.is_outstanding() {
            warn!(
                "Starting repeat {} without: {}",
                repeat,
                self.readiness.missing_devices().join(", ")
            );
            self.readiness.cancel();
        }

        self.auto_arm = false;
        self.ended_devices.clear();
        self.delays_used.push(delay);
        self.publish(DrillEvent::RepeatArmed {
            repeat,
            delay_seconds: delay,
        })
        .await;
        Ok(delay)
    }

    /// Stop the active repeat. Returns false when no repeat was active.
    async fn stop_active_repeat(&mut self, notify_targets: bool) -> Result<bool> {
        let now = Instant::now();
        let Phase::Active { repeat, .. } = self.clock.phase() else {
            debug!("No active repeat to stop");
            return Ok(false);
        };

        self.clock.stop_repeat(now);
        self.after_stop(repeat, now, notify_targets).await?;
        Ok(true)
    }

    async fn after_stop(&mut self, repeat: u32, now: Instant, notify_targets: bool) -> Result<()> {
        self.collector.end_window(now, self.clock.grace());
        self.publish(DrillEvent::RepeatStopped { repeat }).await;
        if notify_targets {
            self.send(&TransportCommand::end()).await?;
        }
        Ok(())
    }

    fn is_current_repeat_finalized(&self) -> bool {
        self.last_started_repeat
            .is_some_and(|repeat| self.summaries.iter().any(|s| s.repeat_index == repeat))
    }

    async fn complete_drill(&mut self) {
        if self.status != SessionStatus::Running {
            debug!("Session already closed, complete request ignored");
            return;
        }

        match self.clock.phase() {
            Phase::Active { repeat, .. } => {
                info!("Completing drill after repeat {} is finalized", repeat);
                self.complete_requested = true;
                // A send failure has already closed the session
                let _ = self.stop_active_repeat(true).await;
            }
            Phase::Grace { repeat, .. } | Phase::Finalizing { repeat, .. } => {
                info!("Completing drill after repeat {} is finalized", repeat);
                self.complete_requested = true;
            }
            _ => {
                self.clock.halt();
                self.readiness.cancel();
                self.finish_session().await;
            }
        }
    }

    async fn on_tick(&mut self) {
        if self.status != SessionStatus::Running {
            return;
        }
        let now = Instant::now();

        if let Some(missing) = self.readiness.poll_timeout(now) {
            self.auto_arm = false;
            self.callbacks.on_readiness_timeout(&missing);
            self.publish(DrillEvent::ReadinessTimeout { devices: missing })
                .await;
        }

        if let Some(signal) = self.clock.tick(now) {
            self.on_clock_signal(signal, now).await;
        }
    }

    async fn on_clock_signal(&mut self, signal: ClockSignal, now: Instant) {
        match signal {
            ClockSignal::Beep { repeat, beep_at } => self.on_beep(repeat, beep_at).await,
            ClockSignal::WatchdogStop { repeat } => {
                let _ = self.after_stop(repeat, now, true).await;
            }
            ClockSignal::GraceElapsed { repeat } => self.start_finalize(repeat).await,
            ClockSignal::FinalizeOverdue { repeat } => {
                if let Some(task) = self.finalize_task.take() {
                    task.abort();
                }
                self.fail(DrillError::FinalizeTimeout { repeat }).await;
            }
            ClockSignal::PauseElapsed { next_repeat } => {
                self.auto_arm = self.config.session.auto_advance;
                let _ = self.begin_readiness(next_repeat).await;
            }
        }
    }

    async fn on_beep(&mut self, repeat: u32, beep_at: Instant) {
        self.collector.begin_window(repeat, beep_at, Utc::now());
        self.last_started_repeat = Some(repeat);
        self.publish(DrillEvent::BeepFired { repeat }).await;
        let _ = self.send(&TransportCommand::start(repeat)).await;
    }

    async fn start_finalize(&mut self, repeat: u32) {
        let stats = self.collector.stats().clone();
        let Some(session) = self.collector.close() else {
            self.fail(DrillError::invalid_state(format!(
                "repeat {} has no shot buffer to finalize",
                repeat
            )))
            .await;
            return;
        };

        debug!("Finalizing repeat {}: {:?}", repeat, stats);
        let aggregator = self.scoring.clone();
        self.finalize_task = Some(tokio::spawn(async move { aggregator.finalize(&session) }));
    }

    async fn on_finalize_joined(
        &mut self,
        joined: std::result::Result<Result<DrillRepeatSummary>, JoinError>,
    ) {
        let summary = match joined {
            Ok(Ok(summary)) => summary,
            Ok(Err(e)) => {
                self.fail(e).await;
                return;
            }
            Err(e) => {
                self.fail(DrillError::component("scoring".to_string(), e.to_string()))
                    .await;
                return;
            }
        };

        let repeat = summary.repeat_index;
        self.callbacks.on_repeat_finalized(&summary);
        self.summaries.push(summary.clone());
        self.publish(DrillEvent::RepeatFinalized { summary }).await;

        let next = (!self.complete_requested && repeat < self.total_repeats()).then_some(repeat + 1);
        self.clock
            .finalized(next, self.config.session.pause(), Instant::now());

        match next {
            Some(next) => self.current_repeat = next,
            None => self.finish_session().await,
        }
    }

    async fn handle_transport_event(&mut self, event: TransportEvent) {
        if self.status != SessionStatus::Running {
            debug!("Session closed, dropping {}", event.event_type());
            return;
        }
        let now = Instant::now();

        match event {
            TransportEvent::DeviceReady { device } => {
                if let Some(progress) = self.readiness.mark_ready(&device) {
                    self.callbacks
                        .on_readiness_update(progress.ready, progress.total);
                    self.publish(DrillEvent::ReadinessUpdate {
                        ready: progress.ready,
                        total: progress.total,
                    })
                    .await;

                    if progress.is_complete() && self.auto_arm {
                        self.arm_after_readiness().await;
                    }
                }
            }
            TransportEvent::ShotReceived { device, raw } => {
                match self.collector.ingest(device.as_deref(), &raw, now) {
                    IngestOutcome::Accepted(shot) => {
                        let repeat = self.collector.current_repeat().unwrap_or(self.current_repeat);
                        self.publish(DrillEvent::ShotAccepted {
                            repeat,
                            device: shot.device,
                            hit_area: shot.hit_area,
                            time_offset: shot.time_offset,
                        })
                        .await;
                    }
                    IngestOutcome::Rejected(RejectReason::NoOpenWindow) => {}
                    IngestOutcome::Rejected(reason) => {
                        self.publish(DrillEvent::ShotRejected {
                            repeat: self.collector.current_repeat(),
                            reason: reason.to_string(),
                        })
                        .await;
                    }
                }
            }
            TransportEvent::RepeatEnded {
                device,
                drill_duration,
            } => self.on_repeat_ended(device, drill_duration).await,
        }
    }

    /// A target finished its repeat. Once every expected target has, the
    /// active repeat stops as if the shooter had stopped it.
    async fn on_repeat_ended(&mut self, device: String, drill_duration: Option<f64>) {
        if !self.clock.phase().holds_open_repeat() {
            debug!("End ack from {} with no repeat running", device);
            return;
        }

        if !self.readiness.devices().iter().any(|d| d.name == device) {
            debug!("End ack from unexpected device {}, ignoring", device);
            return;
        }

        if let Some(duration) = drill_duration {
            self.collector.record_reported_duration(duration);
        }
        self.ended_devices.insert(device);

        let all_ended = self
            .readiness
            .devices()
            .iter()
            .all(|d| self.ended_devices.contains(&d.name));

        if all_ended && matches!(self.clock.phase(), Phase::Active { .. }) {
            info!("Every target reported the end of the repeat");
            // A send failure has already closed the session
            let _ = self.stop_active_repeat(false).await;
        }
    }

    async fn send(&mut self, command: &TransportCommand) -> Result<()> {
        match self.transport.send(command).await {
            Ok(()) => {
                debug!(
                    "Sent {} to {}",
                    command.command_name().unwrap_or("command"),
                    command.dest
                );
                Ok(())
            }
            Err(e) => {
                error!("Transport send failed: {}", e);
                self.fail(DrillError::TransportSendFailure(e.clone())).await;
                Err(DrillError::TransportSendFailure(e))
            }
        }
    }

    async fn fail(&mut self, error: DrillError) {
        if self.status != SessionStatus::Running {
            return;
        }

        error!("Aborting drill session: {}", error);
        self.status = SessionStatus::Failed;
        if let Some(task) = self.finalize_task.take() {
            task.abort();
        }
        self.readiness.cancel();
        self.collector.reset();
        self.clock.halt();

        self.callbacks.on_failure(&error);
        self.publish(DrillEvent::SessionFailed {
            reason: error.to_string(),
        })
        .await;
    }

    async fn finish_session(&mut self) {
        if self.status != SessionStatus::Running {
            return;
        }

        self.status = SessionStatus::Completed;
        self.clock.complete();
        self.readiness.cancel();
        self.collector.reset();
        info!(
            "Drill session complete with {} summaries",
            self.summaries.len()
        );

        if let Some(sink) = self.sink.clone() {
            if let Err(e) = sink.store(&self.summaries).await {
                warn!("Failed to store drill summaries: {}", e);
            }
        }

        self.callbacks.on_complete(&self.summaries);
        self.publish(DrillEvent::SessionCompleted {
            summaries: self.summaries.clone(),
        })
        .await;
    }

    async fn shutdown(&mut self) {
        if let Some(task) = self.finalize_task.take() {
            task.abort();
        }
        self.clock.halt();
        self.readiness.cancel();
        self.collector.reset();

        if self.status == SessionStatus::Running {
            self.publish(DrillEvent::SessionStopped).await;
        }
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            status: self.status,
            phase: self.clock.phase().name().to_string(),
            current_repeat: self.current_repeat,
            total_repeats: self.total_repeats(),
            delays_used: self.delays_used.clone(),
            open_shots: self.collector.shot_count(),
            summaries: self.summaries.clone(),
        }
    }

    async fn publish(&self, event: DrillEvent) {
        // Fails only when nobody is subscribed
        let _ = self.event_bus.publish(event).await;
    }
}

async fn join_finalize(
    task: &mut Option<FinalizeTask>,
) -> std::result::Result<Result<DrillRepeatSummary>, JoinError> {
    match task.as_mut() {
        Some(handle) => handle.await,
        None => std::future::pending().await,
    }
}
