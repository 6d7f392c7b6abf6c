use super::actor::{SessionActor, SessionParts};
use super::{DrillSessionController, NoopCallbacks, SessionCallbacks, SummarySink};
use crate::config::DrillConfig;
use crate::error::{DrillError, Result};
use crate::events::EventBus;
use crate::readiness::ExpectedDevice;
use crate::scoring::{IpscScoring, ScoringAggregator, ScoringFunction};
use crate::transport::{Transport, TransportEvent};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

const COMMAND_CHANNEL_CAPACITY: usize = 32;

/// Drill session builder
pub struct DrillSessionBuilder {
    config: Option<DrillConfig>,
    devices: Vec<ExpectedDevice>,
    transport: Option<Arc<dyn Transport>>,
    inbound: Option<mpsc::UnboundedReceiver<TransportEvent>>,
    scoring_function: Option<Arc<dyn ScoringFunction>>,
    callbacks: Option<Arc<dyn SessionCallbacks>>,
    sink: Option<Arc<dyn SummarySink>>,
    event_bus: Option<EventBus>,
}

impl DrillSessionBuilder {
    pub fn new() -> Self {
        Self {
            config: None,
            devices: Vec::new(),
            transport: None,
            inbound: None,
            scoring_function: None,
            callbacks: None,
            sink: None,
            event_bus: None,
        }
    }

    pub fn config(mut self, config: DrillConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Targets expected in every repeat, in the order they are queried
    pub fn devices(mut self, devices: Vec<ExpectedDevice>) -> Self {
        self.devices = devices;
        self
    }

    pub fn device(mut self, device: ExpectedDevice) -> Self {
        self.devices.push(device);
        self
    }

    /// Outbound link to the targets and the stream of notifications it delivers
    pub fn transport(
        mut self,
        transport: Arc<dyn Transport>,
        inbound: mpsc::UnboundedReceiver<TransportEvent>,
    ) -> Self {
        self.transport = Some(transport);
        self.inbound = Some(inbound);
        self
    }

    /// Points per hit area; defaults to [`IpscScoring`]
    pub fn scoring_function(mut self, scoring: Arc<dyn ScoringFunction>) -> Self {
        self.scoring_function = Some(scoring);
        self
    }

    pub fn callbacks(mut self, callbacks: Arc<dyn SessionCallbacks>) -> Self {
        self.callbacks = Some(callbacks);
        self
    }

    pub fn sink(mut self, sink: Arc<dyn SummarySink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    /// Validate the setup and spawn the session task. Must be called from
    /// within a tokio runtime.
    pub fn build(self) -> Result<DrillSessionController> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let transport = self.transport.ok_or_else(|| {
            DrillError::component("session", "A transport is required")
        })?;
        let inbound = self.inbound.ok_or_else(|| {
            DrillError::component("session", "A transport notification stream is required")
        })?;

        let mut seen = std::collections::HashSet::new();
        if let Some(duplicate) = self.devices.iter().find(|d| !seen.insert(d.name.as_str())) {
            return Err(DrillError::component(
                "session".to_string(),
                format!("Device {} is listed twice", duplicate.name),
            ));
        }

        let scoring = ScoringAggregator::from_config(
            self.scoring_function
                .unwrap_or_else(|| Arc::new(IpscScoring)),
            &config.scoring,
        )
        .with_expected_targets(self.devices.iter().map(|d| d.name.clone()));

        let event_bus = self
            .event_bus
            .unwrap_or_else(|| EventBus::new(config.system.event_bus_capacity));
        let callbacks = self.callbacks.unwrap_or_else(|| Arc::new(NoopCallbacks));

        info!(
            "Building drill session: {} repeats, devices [{}]",
            config.session.repeats,
            self.devices
                .iter()
                .map(|d| d.name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );

        let (commands, command_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let cancel = CancellationToken::new();

        let actor = SessionActor::new(SessionParts {
            config,
            devices: self.devices,
            transport,
            callbacks,
            sink: self.sink,
            event_bus: event_bus.clone(),
            scoring: scoring.clone(),
        });
        tokio::spawn(actor.run(command_rx, inbound, cancel.clone()));

        Ok(DrillSessionController::new(
            commands, cancel, event_bus, scoring,
        ))
    }
}

impl Default for DrillSessionBuilder {
    fn default() -> Self {
        Self::new()
    }
}
