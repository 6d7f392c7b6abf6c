mod coordinator;
mod device;
#[cfg(test)]
mod tests;

pub use coordinator::{ReadinessCoordinator, ReadinessProgress};
pub use device::{ExpectedDevice, ReadinessState};
