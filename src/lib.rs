pub mod clock;
pub mod collector;
pub mod config;
pub mod error;
pub mod events;
pub mod keyboard_input;
pub mod readiness;
pub mod scoring;
pub mod session;
pub mod transport;

pub use clock::{ClockSignal, Phase, SessionClock};
pub use collector::{
    CollectorStats, HitPosition, IngestOutcome, RejectReason, RepeatSession, ShotCollector,
    ShotEvent,
};
pub use config::{
    DrillConfig, GraceConfig, ReadinessConfig, ScoringConfig, ScoringRuleKind, SessionConfig,
    SystemConfig,
};
pub use error::{DrillError, EventBusError, Result, TransportError};
pub use events::{DrillEvent, EventBus, EventFilter, EventReceiver};
pub use keyboard_input::{KeyAction, KeyboardInputHandler};
pub use readiness::{ExpectedDevice, ReadinessCoordinator, ReadinessProgress, ReadinessState};
pub use scoring::{
    DrillRepeatSummary, HitZone, IpscScoring, ScoringAggregator, ScoringFunction, ScoringRule,
    ZoneCounts,
};
pub use session::{
    DrillSessionBuilder, DrillSessionController, NoopCallbacks, SessionCallbacks,
    SessionSnapshot, SessionStatus, SummarySink,
};
pub use transport::{MockTransport, Transport, TransportCommand, TransportEvent, BROADCAST_DEST};
