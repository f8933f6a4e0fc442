//! Inactivity tracking with a warning ahead of the logout deadline.
//!
//! Every qualifying input signal restarts the activity window. Each window
//! owns two deadline tasks (warning and logout); starting a new window
//! aborts both and bumps a generation counter, so a timer belonging to a
//! superseded window can never fire its hook.

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

use super::AuthError;

type Hook = Arc<dyn Fn() + Send + Sync>;

/// Low-level input the UI layer forwards to the monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputSignal {
    PointerMove,
    KeyPress,
    Click,
    Scroll,
    Resize,
    FocusGained,
}

impl InputSignal {
    /// Whether this signal counts as the user being present.
    pub fn is_qualifying(self) -> bool {
        matches!(
            self,
            InputSignal::PointerMove | InputSignal::KeyPress | InputSignal::Click | InputSignal::Scroll
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivityWindow {
    pub last_activity_at: Instant,
    pub warning_deadline: Instant,
    pub logout_deadline: Instant,
}

impl ActivityWindow {
    fn starting_at(now: Instant, warning_lead: Duration, total_timeout: Duration) -> Self {
        Self {
            last_activity_at: now,
            warning_deadline: now + (total_timeout - warning_lead),
            logout_deadline: now + total_timeout,
        }
    }

    pub fn until_logout(&self) -> Duration {
        self.logout_deadline.saturating_duration_since(Instant::now())
    }

    pub fn idle_time(&self) -> Duration {
        self.last_activity_at.elapsed()
    }
}

struct Armed {
    on_warning: Hook,
    on_timeout: Hook,
    warning_lead: Duration,
    total_timeout: Duration,
    window: ActivityWindow,
    timers: Vec<JoinHandle<()>>,
}

impl Armed {
    fn cancel_timers(&mut self) {
        for timer in self.timers.drain(..) {
            timer.abort();
        }
    }
}

#[derive(Default)]
struct MonitorState {
    armed: Option<Armed>,
    generation: u64,
}

#[derive(Clone, Copy)]
enum Deadline {
    Warning,
    Logout,
}

/// Clone is cheap and clones share the same timers.
#[derive(Clone, Default)]
pub struct ActivityMonitor {
    state: Arc<Mutex<MonitorState>>,
}

impl ActivityMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm the monitor, replacing any previous arming. `on_warning` fires
    /// once `total_timeout - warning_lead` passes without activity,
    /// `on_timeout` once `total_timeout` passes. Must be called from within
    /// a tokio runtime.
    pub fn start(
        &self,
        on_warning: impl Fn() + Send + Sync + 'static,
        on_timeout: impl Fn() + Send + Sync + 'static,
        warning_lead: Duration,
        total_timeout: Duration,
    ) -> Result<(), AuthError> {
        if warning_lead.is_zero() || warning_lead >= total_timeout {
            return Err(AuthError::InvalidTimeouts(format!(
                "warning lead {}s must be positive and below the {}s timeout",
                warning_lead.as_secs(),
                total_timeout.as_secs()
            )));
        }

        let mut state = self.state.lock();
        if let Some(mut previous) = state.armed.take() {
            previous.cancel_timers();
        }
        state.armed = Some(Armed {
            on_warning: Arc::new(on_warning),
            on_timeout: Arc::new(on_timeout),
            warning_lead,
            total_timeout,
            window: ActivityWindow::starting_at(Instant::now(), warning_lead, total_timeout),
            timers: Vec::with_capacity(2),
        });
        self.reschedule(&mut state);
        Ok(())
    }

    /// Restart the activity window from now. No effect when not started.
    pub fn notify_activity(&self) {
        let mut state = self.state.lock();
        let Some(armed) = state.armed.as_mut() else {
            return;
        };
        armed.window =
            ActivityWindow::starting_at(Instant::now(), armed.warning_lead, armed.total_timeout);
        self.reschedule(&mut state);
    }

    /// Forward a raw input signal; only qualifying signals count.
    pub fn observe(&self, signal: InputSignal) -> bool {
        if signal.is_qualifying() {
            self.notify_activity();
            true
        } else {
            false
        }
    }

    /// Disarm the monitor. No timer of this monitor fires afterwards.
    pub fn stop(&self) {
        let mut state = self.state.lock();
        state.generation += 1;
        if let Some(mut armed) = state.armed.take() {
            armed.cancel_timers();
            debug!("Activity monitor stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().armed.is_some()
    }

    pub fn window(&self) -> Option<ActivityWindow> {
        self.state.lock().armed.as_ref().map(|armed| armed.window)
    }

    /// Time left before the logout deadline, if running.
    pub fn until_logout(&self) -> Option<Duration> {
        self.window().map(|window| window.until_logout())
    }

    /// Number of deadline timers that have not completed yet.
    pub fn pending_timers(&self) -> usize {
        self.state
            .lock()
            .armed
            .as_ref()
            .map_or(0, |armed| armed.timers.iter().filter(|t| !t.is_finished()).count())
    }

    fn reschedule(&self, state: &mut MonitorState) {
        state.generation += 1;
        let generation = state.generation;
        let Some(armed) = state.armed.as_mut() else {
            return;
        };
        armed.cancel_timers();

        let weak = Arc::downgrade(&self.state);
        armed.timers.push(spawn_deadline(
            weak.clone(),
            generation,
            armed.window.warning_deadline,
            Deadline::Warning,
        ));
        armed.timers.push(spawn_deadline(
            weak,
            generation,
            armed.window.logout_deadline,
            Deadline::Logout,
        ));
        debug!(generation, "Inactivity deadlines rescheduled");
    }
}

fn spawn_deadline(
    state: Weak<Mutex<MonitorState>>,
    generation: u64,
    deadline: Instant,
    kind: Deadline,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep_until(deadline).await;
        let Some(state) = state.upgrade() else {
            return;
        };

        // Resolve the hook under the lock, call it after releasing it: the
        // hook may call back into the monitor.
        let hook = {
            let mut state = state.lock();
            if state.generation != generation {
                return;
            }
            match kind {
                Deadline::Warning => state.armed.as_ref().map(|armed| armed.on_warning.clone()),
                Deadline::Logout => {
                    // The window is over; disarm so the timeout fires only once.
                    state.generation += 1;
                    state.armed.take().map(|armed| armed.on_timeout.clone())
                }
            }
        };

        if let Some(hook) = hook {
            hook();
        }
    })
}
