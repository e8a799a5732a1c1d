use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

pub const DEFAULT_SESSION_BUDGET_SECS: u64 = 300;

const TICK: Duration = Duration::from_secs(1);
const EVENT_FANOUT: usize = 64;

/// Where the session budget currently stands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimerState {
    Idle,
    Running { remaining: u64, budget: u64 },
    Expired,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimerEvent {
    Tick { remaining: u64 },
    Expired,
}

struct TimerInner {
    state: Mutex<TimerState>,
    events: broadcast::Sender<TimerEvent>,
}

/// Wall-clock session budget.
///
/// The driver task measures real elapsed time between ticks rather than
/// counting tick callbacks, so a throttled or suspended host cannot stretch
/// the budget: a late tick consumes every second that actually passed.
/// Remaining time never goes negative, and once `expired` is reached no
/// further tick fires until the timer is re-armed.
pub struct SessionTimer {
    inner: Arc<TimerInner>,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl Default for SessionTimer {
    fn default() -> Self {
        let (events, _) = broadcast::channel(EVENT_FANOUT);
        Self {
            inner: Arc::new(TimerInner {
                state: Mutex::new(TimerState::Idle),
                events,
            }),
            driver: Mutex::new(None),
        }
    }
}

impl SessionTimer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> TimerState {
        *self.inner.state.lock()
    }

    pub fn remaining(&self) -> u64 {
        match self.state() {
            TimerState::Running { remaining, .. } => remaining,
            _ => 0,
        }
    }

    /// Whether sends are currently allowed.
    pub fn can_send(&self) -> bool {
        matches!(self.state(), TimerState::Running { remaining, .. } if remaining > 0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TimerEvent> {
        self.inner.events.subscribe()
    }

    /// Start (or restart) the budget. Any previous driver is replaced, so two
    /// drivers never tick the same state.
    pub fn arm(&self, budget_secs: u64) {
        let mut driver = self.driver.lock();
        if let Some(old) = driver.take() {
            old.abort();
        }

        *self.inner.state.lock() = TimerState::Running {
            remaining: budget_secs,
            budget: budget_secs,
        };
        debug!(budget_secs, "timer armed");

        let inner = Arc::clone(&self.inner);
        // The baseline is captured here, not in the task: time that passes
        // before the driver is first polled still counts against the budget.
        *driver = Some(tokio::spawn(drive(inner, tokio::time::Instant::now())));
    }

    /// Stop the timer and return to `idle`. The driver task is aborted, never
    /// leaked.
    pub fn cancel(&self) {
        if let Some(old) = self.driver.lock().take() {
            old.abort();
        }
        *self.inner.state.lock() = TimerState::Idle;
        debug!("timer cancelled");
    }

    /// Re-arm after expiry with a fresh budget.
    pub fn continue_with(&self, budget_secs: u64) {
        self.arm(budget_secs);
    }
}

impl Drop for SessionTimer {
    fn drop(&mut self) {
        if let Some(driver) = self.driver.lock().take() {
            driver.abort();
        }
    }
}

async fn drive(inner: Arc<TimerInner>, mut last: tokio::time::Instant) {
    let mut ticker = tokio::time::interval(TICK);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        // Whole seconds actually elapsed since the previous accounted tick.
        let elapsed = last.elapsed().as_secs();
        if elapsed == 0 {
            continue;
        }
        last += Duration::from_secs(elapsed);

        let event = {
            let mut state = inner.state.lock();
            match &mut *state {
                TimerState::Running { remaining, .. } => {
                    *remaining = remaining.saturating_sub(elapsed);
                    if *remaining == 0 {
                        *state = TimerState::Expired;
                        TimerEvent::Expired
                    } else {
                        TimerEvent::Tick {
                            remaining: *remaining,
                        }
                    }
                }
                // Cancelled or re-armed out from under us.
                _ => return,
            }
        };

        let _ = inner.events.send(event);
        if event == TimerEvent::Expired {
            return;
        }
    }
}
