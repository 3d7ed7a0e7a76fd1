//! Session monitor: idle timeout, idle warning and token refresh timers.
//!
//! A [`SessionMonitor`] watches one authenticated session at a time. It owns
//! every timer task it spawns and cancels them all on [`SessionMonitor::stop`].
//!
//! ```text
//!            start()                 warning timer
//!   Stopped ─────────► IdleArmed ─────────────────► WarningShown
//!      ▲                 ▲   │                          │
//!      │                 └───┼──── activity ◄───────────┘
//!      │   idle timeout      │
//!      └─────────────────────┴──── stop() / token expiry
//! ```
//!
//! Every arming bumps a counter and every stop bumps an epoch. A timer task
//! that wakes up after either changed does nothing, so no stale callback can
//! fire once `stop()` has returned.
//!
//! Session-ending callbacks run on a detached task: the callback usually
//! logs out, and logging out stops the monitor, which aborts the very timer
//! task that noticed the end.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::SessionTimings;
use crate::notify::Notifier;

pub const IDLE_TIMEOUT_MESSAGE: &str =
    "Your session has expired due to inactivity. Please log in again.";

const IDLE_WARNING_DURATION: Duration = Duration::from_millis(8000);
const IDLE_TIMEOUT_DURATION: Duration = Duration::from_millis(10_000);

/// Idle warning text for a warning shown `lead` before the idle logout.
pub fn idle_warning_message(lead: Duration) -> String {
    format!(
        "Your session will expire in {} due to inactivity. \
         Move your mouse or click to extend your session.",
        describe_lead(lead)
    )
}

fn describe_lead(lead: Duration) -> String {
    let secs = lead.as_secs();
    let (count, unit) = if secs >= 60 && secs % 60 == 0 {
        (secs / 60, "minute")
    } else {
        (secs, "second")
    };
    let plural = if count == 1 { "" } else { "s" };
    format!("{count} {unit}{plural}")
}

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Where the monitor is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorPhase {
    IdleArmed,
    WarningShown,
    Stopped,
}

/// User interactions that count as activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityEvent {
    PointerDown,
    PointerMove,
    KeyPress,
    Scroll,
    TouchStart,
    Click,
}

/// Why the monitor ended a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    /// No activity for the whole idle timeout.
    Idle,
    /// The token expired, or could not be refreshed.
    TokenExpired,
}

/// Callbacks from the monitor back into whoever owns the session.
#[async_trait]
pub trait SessionHooks: Send + Sync {
    /// The session is over; log out.
    async fn on_session_end(&self, reason: EndReason);

    /// The token is about to expire. Return the new expiry, or `None` if no
    /// new token could be obtained.
    async fn on_refresh_due(&self) -> Option<DateTime<Utc>>;
}

// ---------------------------------------------------------------------------
// SessionMonitor
// ---------------------------------------------------------------------------

struct MonitorState {
    phase: MonitorPhase,
    epoch: u64,
    arm: u64,
    last_reset: Option<Instant>,
    idle_task: Option<JoinHandle<()>>,
    refresh_task: Option<JoinHandle<()>>,
    hooks: Option<Arc<dyn SessionHooks>>,
}

/// Which task is ending the session; it must not abort itself.
#[derive(Clone, Copy)]
enum Origin {
    Idle(u64),
    Refresh,
    External,
}

pub struct SessionMonitor {
    shared: Arc<Mutex<MonitorState>>,
    timings: SessionTimings,
    notifier: Notifier,
}

impl SessionMonitor {
    pub fn new(timings: SessionTimings, notifier: Notifier) -> Self {
        Self {
            shared: Arc::new(Mutex::new(MonitorState {
                phase: MonitorPhase::Stopped,
                epoch: 0,
                arm: 0,
                last_reset: None,
                idle_task: None,
                refresh_task: None,
                hooks: None,
            })),
            timings,
            notifier,
        }
    }

    pub fn timings(&self) -> &SessionTimings {
        &self.timings
    }

    pub fn phase(&self) -> MonitorPhase {
        lock(&self.shared).phase
    }

    pub fn is_active(&self) -> bool {
        self.phase() != MonitorPhase::Stopped
    }

    /// Begin monitoring a session. Any previous session is stopped first.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self, hooks: Arc<dyn SessionHooks>) {
        let mut state = lock(&self.shared);
        stop_locked(&mut state);
        state.hooks = Some(hooks);
        self.arm_idle(&mut state);
        tracing::info!(
            idle_timeout_secs = self.timings.idle_timeout_secs,
            "session monitoring started"
        );
    }

    /// Reset the idle timers for a user interaction.
    ///
    /// Returns `true` if the timers were reset; `false` while stopped or when
    /// throttled.
    pub fn record_activity(&self, event: ActivityEvent) -> bool {
        let mut state = lock(&self.shared);
        if state.phase == MonitorPhase::Stopped {
            return false;
        }

        let now = Instant::now();
        let throttled = state
            .last_reset
            .is_some_and(|last| now.duration_since(last) < self.timings.activity_throttle());
        if throttled {
            return false;
        }

        tracing::trace!(?event, "activity, resetting idle timer");
        state.last_reset = Some(now);
        self.arm_idle(&mut state);
        true
    }

    /// Arm the token refresh timer for a token expiring at `expiry`.
    ///
    /// The timer fires `refresh_lead` before expiry. When that moment has
    /// already passed the session ends at once instead.
    pub fn schedule_refresh(&self, expiry: DateTime<Utc>) {
        let mut state = lock(&self.shared);
        if state.phase == MonitorPhase::Stopped {
            tracing::debug!("refresh not scheduled: monitor is stopped");
            return;
        }
        if let Some(task) = state.refresh_task.take() {
            task.abort();
        }

        let epoch = state.epoch;
        let lead = self.timings.refresh_lead();
        match refresh_delay(expiry, lead) {
            Some(wait) => {
                tracing::debug!(expiry = %expiry, wait_secs = wait.as_secs(), "token refresh scheduled");
                let shared = Arc::clone(&self.shared);
                state.refresh_task = Some(tokio::spawn(run_refresh(shared, epoch, lead, wait)));
            }
            None => {
                drop(state);
                tracing::warn!(expiry = %expiry, "token already expired, ending session");
                if let Some(hooks) = finish(&self.shared, epoch, Origin::External) {
                    spawn_end(hooks, EndReason::TokenExpired);
                }
            }
        }
    }

    /// Cancel every timer. Safe to call repeatedly.
    pub fn stop(&self) {
        let mut state = lock(&self.shared);
        if state.phase != MonitorPhase::Stopped {
            tracing::info!("session monitoring stopped");
        }
        stop_locked(&mut state);
    }

    // -- Internal helpers ---------------------------------------------------

    fn arm_idle(&self, state: &mut MonitorState) {
        if let Some(task) = state.idle_task.take() {
            task.abort();
        }
        state.arm += 1;
        state.phase = MonitorPhase::IdleArmed;

        let shared = Arc::clone(&self.shared);
        let timings = self.timings;
        let notifier = self.notifier.clone();
        state.idle_task = Some(tokio::spawn(run_idle(
            shared,
            state.epoch,
            state.arm,
            timings,
            notifier,
        )));
    }
}

impl Drop for SessionMonitor {
    fn drop(&mut self) {
        stop_locked(&mut lock(&self.shared));
    }
}

impl std::fmt::Debug for SessionMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionMonitor")
            .field("phase", &self.phase())
            .field("timings", &self.timings)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Timer tasks
// ---------------------------------------------------------------------------

async fn run_idle(
    shared: Arc<Mutex<MonitorState>>,
    epoch: u64,
    arm: u64,
    timings: SessionTimings,
    notifier: Notifier,
) {
    let warning_after = timings.warning_after();
    let lead = timings.idle_timeout().saturating_sub(warning_after);
    tokio::time::sleep(warning_after).await;

    let show_warning = {
        let mut state = lock(&shared);
        if state.epoch != epoch || state.arm != arm {
            return;
        }
        let first = state.phase == MonitorPhase::IdleArmed;
        if first {
            state.phase = MonitorPhase::WarningShown;
        }
        first
    };
    if show_warning {
        tracing::info!("idle warning shown");
        notifier.warning(idle_warning_message(lead), IDLE_WARNING_DURATION);
    }

    tokio::time::sleep(lead).await;

    if let Some(hooks) = finish(&shared, epoch, Origin::Idle(arm)) {
        tracing::warn!("session timed out due to inactivity");
        notifier.warning(IDLE_TIMEOUT_MESSAGE, IDLE_TIMEOUT_DURATION);
        spawn_end(hooks, EndReason::Idle);
    }
}

async fn run_refresh(
    shared: Arc<Mutex<MonitorState>>,
    epoch: u64,
    lead: Duration,
    first_wait: Duration,
) {
    let mut wait = first_wait;
    loop {
        tokio::time::sleep(wait).await;

        let hooks = {
            let state = lock(&shared);
            if state.epoch != epoch {
                return;
            }
            state.hooks.clone()
        };
        let Some(hooks) = hooks else { return };

        match hooks.on_refresh_due().await.and_then(|expiry| refresh_delay(expiry, lead)) {
            Some(next) => wait = next,
            None => break,
        }
    }

    if let Some(hooks) = finish(&shared, epoch, Origin::Refresh) {
        tracing::warn!("token could not be refreshed, ending session");
        spawn_end(hooks, EndReason::TokenExpired);
    }
}

fn spawn_end(hooks: Arc<dyn SessionHooks>, reason: EndReason) {
    tokio::spawn(async move {
        hooks.on_session_end(reason).await;
    });
}

/// Time until the refresh should fire; `None` if it is already due.
fn refresh_delay(expiry: DateTime<Utc>, lead: Duration) -> Option<Duration> {
    let lead = chrono::Duration::from_std(lead).unwrap_or_else(|_| chrono::Duration::zero());
    (expiry - Utc::now() - lead)
        .to_std()
        .ok()
        .filter(|wait| !wait.is_zero())
}

/// Move to `Stopped` on behalf of a timer. Returns the hooks to notify, or
/// `None` if the session was already stopped or re-armed.
fn finish(
    shared: &Mutex<MonitorState>,
    epoch: u64,
    origin: Origin,
) -> Option<Arc<dyn SessionHooks>> {
    let mut state = lock(shared);
    if state.epoch != epoch || state.phase == MonitorPhase::Stopped {
        return None;
    }
    if let Origin::Idle(arm) = origin {
        if state.arm != arm {
            return None;
        }
    }

    // The calling task drops its own handle instead of aborting itself.
    let idle = state.idle_task.take();
    let refresh = state.refresh_task.take();
    if let (Some(task), false) = (idle, matches!(origin, Origin::Idle(_))) {
        task.abort();
    }
    if let (Some(task), false) = (refresh, matches!(origin, Origin::Refresh)) {
        task.abort();
    }

    state.epoch += 1;
    state.phase = MonitorPhase::Stopped;
    state.last_reset = None;
    state.hooks.take()
}

fn stop_locked(state: &mut MonitorState) {
    state.epoch += 1;
    state.phase = MonitorPhase::Stopped;
    state.last_reset = None;
    state.hooks = None;
    if let Some(task) = state.idle_task.take() {
        task.abort();
    }
    if let Some(task) = state.refresh_task.take() {
        task.abort();
    }
}

fn lock(shared: &Mutex<MonitorState>) -> MutexGuard<'_, MonitorState> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc;

    const MINUTE: Duration = Duration::from_secs(60);

    /// Records every callback; refreshes succeed while `refresh_ok` is set.
    struct Recorder {
        ends: mpsc::UnboundedSender<(EndReason, Instant)>,
        refreshes: AtomicUsize,
        refresh_ok: bool,
    }

    #[async_trait]
    impl SessionHooks for Recorder {
        async fn on_session_end(&self, reason: EndReason) {
            let _ = self.ends.send((reason, Instant::now()));
        }

        async fn on_refresh_due(&self) -> Option<DateTime<Utc>> {
            self.refreshes.fetch_add(1, Ordering::SeqCst);
            self.refresh_ok
                .then(|| Utc::now() + chrono::Duration::minutes(10))
        }
    }

    fn recorder(refresh_ok: bool) -> (Arc<Recorder>, mpsc::UnboundedReceiver<(EndReason, Instant)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let hooks = Arc::new(Recorder {
            ends: tx,
            refreshes: AtomicUsize::new(0),
            refresh_ok,
        });
        (hooks, rx)
    }

    fn monitor() -> SessionMonitor {
        SessionMonitor::new(SessionTimings::default(), Notifier::default())
    }

    /// Timer deadlines round up to the next millisecond.
    fn assert_about(actual: Duration, expected: Duration) {
        assert!(
            actual >= expected && actual < expected + Duration::from_millis(10),
            "expected about {expected:?}, got {actual:?}"
        );
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn idle_timeout_ends_session() {
        let monitor = monitor();
        let (hooks, mut ends) = recorder(true);
        let started = Instant::now();
        monitor.start(hooks);
        assert_eq!(monitor.phase(), MonitorPhase::IdleArmed);

        let (reason, at) = ends.recv().await.unwrap();
        assert_eq!(reason, EndReason::Idle);
        assert_about(at - started, 30 * MINUTE);
        assert_eq!(monitor.phase(), MonitorPhase::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn activity_at_minute_29_postpones_logout() {
        let monitor = monitor();
        let (hooks, mut ends) = recorder(true);
        monitor.start(hooks);

        tokio::time::advance(29 * MINUTE).await;
        settle().await;
        let active_at = Instant::now();
        assert!(monitor.record_activity(ActivityEvent::PointerMove));

        tokio::time::advance(2 * MINUTE).await;
        settle().await;
        assert!(ends.try_recv().is_err());
        assert!(monitor.is_active());

        let (reason, at) = ends.recv().await.unwrap();
        assert_eq!(reason, EndReason::Idle);
        assert_about(at - active_at, 30 * MINUTE);
    }

    #[tokio::test(start_paused = true)]
    async fn warning_is_shown_once_per_arming() {
        let notifier = Notifier::default();
        let mut notices = notifier.subscribe();
        let monitor = SessionMonitor::new(SessionTimings::default(), notifier);
        let (hooks, _ends) = recorder(true);
        monitor.start(hooks);

        tokio::time::advance(25 * MINUTE).await;
        settle().await;
        assert_eq!(monitor.phase(), MonitorPhase::WarningShown);
        let notice = notices.try_recv().unwrap();
        assert_eq!(notice.message, idle_warning_message(5 * MINUTE));
        assert_eq!(notice.duration, Duration::from_secs(8));
        assert!(notices.try_recv().is_err());

        assert!(monitor.record_activity(ActivityEvent::KeyPress));
        assert_eq!(monitor.phase(), MonitorPhase::IdleArmed);

        tokio::time::advance(25 * MINUTE).await;
        settle().await;
        assert_eq!(notices.try_recv().unwrap().message, idle_warning_message(5 * MINUTE));
    }

    #[tokio::test(start_paused = true)]
    async fn warning_names_the_configured_lead() {
        let timings = SessionTimings {
            idle_timeout_secs: 10 * 60,
            warning_lead_secs: 2 * 60,
            ..SessionTimings::default()
        };
        let notifier = Notifier::default();
        let mut notices = notifier.subscribe();
        let monitor = SessionMonitor::new(timings, notifier);
        let (hooks, _ends) = recorder(true);
        monitor.start(hooks);

        tokio::time::advance(8 * MINUTE).await;
        settle().await;
        let notice = notices.try_recv().unwrap();
        assert!(notice.message.contains("expire in 2 minutes"), "{}", notice.message);
    }

    #[test]
    fn warning_lead_wording() {
        assert!(idle_warning_message(MINUTE).contains("in 1 minute due"));
        assert!(idle_warning_message(5 * MINUTE).contains("in 5 minutes due"));
        assert!(idle_warning_message(Duration::from_secs(1)).contains("in 1 second due"));
        assert!(idle_warning_message(Duration::from_secs(90)).contains("in 90 seconds due"));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_publishes_notice() {
        let notifier = Notifier::default();
        let mut notices = notifier.subscribe();
        let monitor = SessionMonitor::new(SessionTimings::default(), notifier);
        let (hooks, mut ends) = recorder(true);
        monitor.start(hooks);

        ends.recv().await.unwrap();
        assert_eq!(notices.recv().await.unwrap().message, idle_warning_message(5 * MINUTE));
        let notice = notices.recv().await.unwrap();
        assert_eq!(notice.message, IDLE_TIMEOUT_MESSAGE);
        assert_eq!(notice.duration, Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn activity_is_throttled() {
        let monitor = monitor();
        let (hooks, _ends) = recorder(true);
        monitor.start(hooks);

        assert!(monitor.record_activity(ActivityEvent::Click));
        assert!(!monitor.record_activity(ActivityEvent::Scroll));

        tokio::time::advance(Duration::from_millis(999)).await;
        assert!(!monitor.record_activity(ActivityEvent::Scroll));

        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(monitor.record_activity(ActivityEvent::TouchStart));
    }

    #[tokio::test(start_paused = true)]
    async fn activity_is_ignored_while_stopped() {
        let monitor = monitor();
        assert!(!monitor.record_activity(ActivityEvent::PointerDown));
        assert_eq!(monitor.phase(), MonitorPhase::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_twice_and_nothing_fires() {
        let monitor = monitor();
        let (hooks, mut ends) = recorder(true);
        monitor.start(hooks.clone());
        monitor.schedule_refresh(Utc::now() + chrono::Duration::minutes(10));

        monitor.stop();
        monitor.stop();
        assert_eq!(monitor.phase(), MonitorPhase::Stopped);

        tokio::time::advance(120 * MINUTE).await;
        settle().await;
        assert!(ends.try_recv().is_err());
        assert_eq!(hooks.refreshes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_fires_before_expiry_and_rearms() {
        let monitor = monitor();
        let (hooks, mut ends) = recorder(true);
        monitor.start(hooks.clone());
        monitor.schedule_refresh(Utc::now() + chrono::Duration::minutes(10));

        tokio::time::advance(4 * MINUTE).await;
        settle().await;
        assert_eq!(hooks.refreshes.load(Ordering::SeqCst), 0);

        tokio::time::advance(MINUTE).await;
        settle().await;
        assert_eq!(hooks.refreshes.load(Ordering::SeqCst), 1);

        tokio::time::advance(5 * MINUTE).await;
        settle().await;
        assert_eq!(hooks.refreshes.load(Ordering::SeqCst), 2);
        assert!(ends.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_refresh_ends_session() {
        let monitor = monitor();
        let (hooks, mut ends) = recorder(false);
        monitor.start(hooks.clone());
        monitor.schedule_refresh(Utc::now() + chrono::Duration::minutes(10));

        let (reason, _) = ends.recv().await.unwrap();
        assert_eq!(reason, EndReason::TokenExpired);
        assert_eq!(hooks.refreshes.load(Ordering::SeqCst), 1);
        assert_eq!(monitor.phase(), MonitorPhase::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_token_ends_session_immediately() {
        let monitor = monitor();
        let (hooks, mut ends) = recorder(true);
        monitor.start(hooks.clone());
        monitor.schedule_refresh(Utc::now() + chrono::Duration::minutes(2));

        assert_eq!(monitor.phase(), MonitorPhase::Stopped);
        let (reason, _) = ends.recv().await.unwrap();
        assert_eq!(reason, EndReason::TokenExpired);
        assert_eq!(hooks.refreshes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn restart_replaces_previous_session() {
        let monitor = monitor();
        let (first, mut first_ends) = recorder(true);
        let (second, mut second_ends) = recorder(true);

        monitor.start(first);
        tokio::time::advance(20 * MINUTE).await;
        monitor.start(second);

        second_ends.recv().await.unwrap();
        assert!(first_ends.try_recv().is_err());
    }

    #[test]
    fn refresh_delay_subtracts_lead() {
        let expiry = Utc::now() + chrono::Duration::minutes(10);
        let wait = refresh_delay(expiry, 5 * MINUTE).unwrap();
        assert!(wait <= 5 * MINUTE && wait > 4 * MINUTE);
        assert!(refresh_delay(Utc::now(), 5 * MINUTE).is_none());
    }

    #[test]
    fn monitor_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SessionMonitor>();
    }
}
