use crate::error::Result;
use crate::session::DrillSessionController;
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// What a key press asks the session to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    ReadinessCheck,
    Start,
    Stop,
    Complete,
    Abort,
}

impl KeyAction {
    pub fn from_key(code: KeyCode) -> Option<Self> {
        match code {
            KeyCode::Char('r') => Some(KeyAction::ReadinessCheck),
            KeyCode::Char('s') | KeyCode::Enter => Some(KeyAction::Start),
            KeyCode::Char(' ') => Some(KeyAction::Stop),
            KeyCode::Char('q') => Some(KeyAction::Complete),
            KeyCode::Esc => Some(KeyAction::Abort),
            _ => None,
        }
    }

    /// Run the action against the session
    pub async fn apply(self, controller: &DrillSessionController) -> Result<()> {
        match self {
            KeyAction::ReadinessCheck => controller.perform_readiness_check().await,
            KeyAction::Start => controller.start_execution().await.map(|delay| {
                info!("Repeat armed, beep in {:.2}s", delay);
            }),
            KeyAction::Stop => controller.manual_stop_repeat().await.map(|stopped| {
                if !stopped {
                    debug!("No repeat running to stop");
                }
            }),
            KeyAction::Complete => {
                controller.complete_drill().await;
                Ok(())
            }
            KeyAction::Abort => {
                controller.stop_execution();
                Ok(())
            }
        }
    }
}

/// Drives a session from the terminal: r checks readiness, s or Enter starts
/// the repeat, SPACE stops it, q completes the drill and Esc aborts.
pub struct KeyboardInputHandler {
    controller: DrillSessionController,
    cancellation_token: CancellationToken,
}

impl KeyboardInputHandler {
    pub fn new(controller: DrillSessionController) -> Self {
        Self {
            controller,
            cancellation_token: CancellationToken::new(),
        }
    }

    /// Start listening for keyboard input
    pub async fn start(&self) -> Result<()> {
        info!("Keyboard control active - r: ready, s: start, SPACE: stop, q: complete, Esc: abort");

        let controller = self.controller.clone();
        let cancellation_token = self.cancellation_token.clone();
        let runtime_handle = Handle::current();

        task::spawn_blocking(move || {
            if let Err(e) = enable_raw_mode() {
                error!("Failed to enable raw mode for keyboard input: {}", e);
                return;
            }

            loop {
                if cancellation_token.is_cancelled() || controller.is_stopped() {
                    debug!("Keyboard input handler stopping");
                    break;
                }

                match event::poll(Duration::from_millis(100)) {
                    Ok(true) => {
                        let Ok(Event::Key(key_event)) = event::read() else {
                            continue;
                        };
                        if key_event.kind != KeyEventKind::Press {
                            continue;
                        }

                        let Some(action) = KeyAction::from_key(key_event.code) else {
                            debug!("Key pressed: {:?}", key_event.code);
                            continue;
                        };

                        info!("Key action: {:?}", action);
                        let controller = controller.clone();
                        runtime_handle.spawn(async move {
                            if let Err(e) = action.apply(&controller).await {
                                warn!("{:?} failed: {}", action, e.user_message());
                            }
                        });

                        if action == KeyAction::Abort {
                            break;
                        }
                    }
                    Ok(false) => {}
                    Err(e) => {
                        warn!("Error polling for keyboard events: {}", e);
                    }
                }
            }

            if let Err(e) = disable_raw_mode() {
                error!("Failed to disable raw mode: {}", e);
            } else {
                debug!("Raw mode disabled");
            }
        });

        Ok(())
    }

    /// Stop the keyboard input handler
    pub async fn stop(&self) -> Result<()> {
        info!("Stopping keyboard input handler");
        self.cancellation_token.cancel();

        // Give the blocking task a poll interval to restore the terminal
        tokio::time::sleep(Duration::from_millis(200)).await;
        let _ = disable_raw_mode();

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DrillConfig;
    use crate::readiness::ExpectedDevice;
    use crate::transport::MockTransport;

    fn controller() -> (DrillSessionController, std::sync::Arc<MockTransport>) {
        let (transport, inbound) = MockTransport::new();
        let controller = DrillSessionController::builder()
            .config(DrillConfig::default())
            .device(ExpectedDevice::new("target-1"))
            .transport(transport.clone(), inbound)
            .build()
            .unwrap();
        (controller, transport)
    }

    #[test]
    fn test_key_mapping() {
        assert_eq!(KeyAction::from_key(KeyCode::Char(' ')), Some(KeyAction::Stop));
        assert_eq!(KeyAction::from_key(KeyCode::Enter), Some(KeyAction::Start));
        assert_eq!(KeyAction::from_key(KeyCode::Char('q')), Some(KeyAction::Complete));
        assert_eq!(KeyAction::from_key(KeyCode::Esc), Some(KeyAction::Abort));
        assert_eq!(KeyAction::from_key(KeyCode::Char('x')), None);
    }

    #[tokio::test]
    async fn test_actions_reach_the_session() {
        let (controller, transport) = controller();

        KeyAction::ReadinessCheck.apply(&controller).await.unwrap();
        assert_eq!(transport.commands_named("ready").len(), 1);

        KeyAction::Stop.apply(&controller).await.unwrap();
        KeyAction::Abort.apply(&controller).await.unwrap();
        assert!(controller.is_stopped());
    }

    #[tokio::test]
    async fn test_keyboard_handler_stop() {
        let (controller, _transport) = controller();
        let handler = KeyboardInputHandler::new(controller);

        handler.stop().await.unwrap();
        assert!(handler.cancellation_token.is_cancelled());
    }
}
