mod phase;
mod session_clock;

pub use phase::{ClockSignal, Phase};
pub use session_clock::SessionClock;
