//! Connection lifecycle state machine
//!
//! Models connect, backoff, give-up and manual reset over the transport as
//! a pure transition function: each event yields a new state plus a list
//! of effects for the session to execute. No timers or sockets live here,
//! which is what makes the retry policy testable without a network.

use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use tracing::info;

use super::transport::SessionEvent;

/// Connection status, also the label delivered to status subscribers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// Retries exhausted. Terminal until a manual reconnect request.
    Error,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Error => "error",
        }
    }
}

/// Retry budget and delay curve for automatic reconnection.
#[derive(Clone, Copy, Debug)]
pub struct ReconnectPolicy {
    pub base_delay: Duration,
    pub multiplier: f64,
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(3000),
            multiplier: 1.5,
            max_attempts: 10,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before retry number `attempt` (0-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.powi(attempt as i32);
        Duration::from_millis((self.base_delay.as_millis() as f64 * factor) as u64)
    }
}

/// Inputs to the state machine.
#[derive(Debug)]
pub enum ConnEvent {
    /// Initial or manual connect request. Manual requests supersede any
    /// pending backoff timer and reset the retry budget.
    ConnectRequested { manual: bool },
    /// The transport finished its open handshake.
    OpenSucceeded,
    /// The transport closed or failed to open; both count against the
    /// retry budget identically.
    TransportClosed,
    /// A previously scheduled backoff timer fired.
    BackoffTimerFired { generation: u64 },
}

/// Outputs of a transition, executed by the session in order.
#[derive(Debug, PartialEq)]
pub enum Effect {
    /// Close any prior transport and open a new one for this cycle.
    OpenTransport { generation: u64 },
    /// Arm a one-shot reconnect timer for this cycle.
    ScheduleReconnect { delay: Duration, generation: u64 },
    /// Deliver a status change to subscribers.
    Notify(ConnectionState),
}

/// The connection controller.
///
/// `generation` increments on every entry into `Connecting`; transports,
/// their events and backoff timers are tagged with the generation of the
/// cycle that created them, so anything from a superseded cycle is
/// ignored at delivery time rather than cancelled.
pub struct ConnectionController {
    state: ConnectionState,
    attempts: u32,
    generation: u64,
    policy: ReconnectPolicy,
}

impl ConnectionController {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            attempts: 0,
            generation: 0,
            policy,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[cfg(test)]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Apply one event, returning the effects to execute.
    pub fn handle(&mut self, event: ConnEvent) -> Vec<Effect> {
        let mut effects = Vec::new();

        match event {
            ConnEvent::ConnectRequested { manual } => {
                self.attempts = 0;
                self.enter_connecting(&mut effects);
                if manual {
                    info!("manual reconnect requested, generation {}", self.generation);
                }
            }
            ConnEvent::OpenSucceeded => {
                if self.state != ConnectionState::Connecting {
                    return effects;
                }
                self.attempts = 0;
                self.transition(ConnectionState::Connected, &mut effects);
                info!("transport connected");
            }
            ConnEvent::TransportClosed => {
                if self.state != ConnectionState::Connecting
                    && self.state != ConnectionState::Connected
                {
                    return effects;
                }
                self.transition(ConnectionState::Disconnected, &mut effects);
                if self.attempts < self.policy.max_attempts {
                    let delay = self.policy.delay_for(self.attempts);
                    self.attempts += 1;
                    info!(
                        "transport closed, retry {}/{} in {:?}",
                        self.attempts, self.policy.max_attempts, delay
                    );
                    effects.push(Effect::ScheduleReconnect {
                        delay,
                        generation: self.generation,
                    });
                } else {
                    info!("retries exhausted after {} attempts", self.attempts);
                    self.transition(ConnectionState::Error, &mut effects);
                }
            }
            ConnEvent::BackoffTimerFired { generation } => {
                // A timer from a superseded cycle must not act.
                if generation != self.generation || self.state != ConnectionState::Disconnected {
                    return effects;
                }
                self.enter_connecting(&mut effects);
            }
        }

        effects
    }

    /// Invalidate every outstanding timer and transport without opening a
    /// new cycle. Used by session teardown.
    pub fn shutdown(&mut self) {
        self.generation += 1;
        self.state = ConnectionState::Disconnected;
    }

    fn enter_connecting(&mut self, effects: &mut Vec<Effect>) {
        self.generation += 1;
        self.transition(ConnectionState::Connecting, effects);
        effects.push(Effect::OpenTransport {
            generation: self.generation,
        });
    }

    fn transition(&mut self, next: ConnectionState, effects: &mut Vec<Effect>) {
        if self.state != next {
            self.state = next;
            effects.push(Effect::Notify(next));
        }
    }
}

/// Arms one-shot reconnect timers. The controller never cancels a timer;
/// a fired timer proves itself current by generation instead.
pub trait ReconnectScheduler {
    fn schedule(&mut self, delay: Duration, generation: u64);
}

/// Production scheduler: a sleeping thread that posts the fire-back into
/// the control channel.
pub struct ThreadScheduler {
    events: mpsc::Sender<SessionEvent>,
}

impl ThreadScheduler {
    pub fn new(events: mpsc::Sender<SessionEvent>) -> Self {
        Self { events }
    }
}

impl ReconnectScheduler for ThreadScheduler {
    fn schedule(&mut self, delay: Duration, generation: u64) {
        let events = self.events.clone();
        thread::spawn(move || {
            thread::sleep(delay);
            let _ = events.send(SessionEvent::ReconnectTimer { generation });
        });
    }
}
