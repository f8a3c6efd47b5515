//! Timer-driven automatic secret rotation.
//!
//! The scheduler periodically scans its registered schedules and invokes
//! the lifecycle manager's rotate operation for each one that is due and
//! whose local-time window (if any) admits the current instant. Successes
//! advance `next_rotation` by the secret's policy cadence; failures back
//! off exponentially until `max_retries` is exhausted, at which point the
//! schedule stops and a failure notification is broadcast.
//!
//! Each pass processes at most `max_concurrent_rotations` schedules; the
//! rest wait for the next pass.

use crate::domain::{Identity, Role, SecretId};
use crate::errors::{Result, StrongroomError};
use crate::lifecycle::SecretManager;
use chrono::{DateTime, Duration, NaiveTime, Utc};
use chrono_tz::Tz;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError};
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Subject the scheduler acts as; carries the writer role in the
/// schedule's tenant.
pub const SCHEDULER_SUBJECT: &str = "rotation-scheduler";

/// A local-time window in which rotation is allowed to run.
///
/// `start < end` keeps the window within one day; `start >= end` wraps
/// midnight (the instant is admitted when `now >= start` or `now <= end`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotationWindow {
    start: NaiveTime,
    end: NaiveTime,
    timezone: String,
}

impl RotationWindow {
    /// Build a window, validating the IANA timezone name.
    pub fn new(start: NaiveTime, end: NaiveTime, timezone: impl Into<String>) -> Result<Self> {
        let timezone = timezone.into();
        timezone.parse::<Tz>().map_err(|_| {
            StrongroomError::config(format!("invalid rotation window timezone '{}'", timezone))
        })?;
        Ok(Self { start, end, timezone })
    }

    /// Whether the window admits the given instant.
    pub fn admits(&self, now: DateTime<Utc>) -> bool {
        let Ok(tz) = self.timezone.parse::<Tz>() else {
            // Validated at construction; an unparsable zone here means the
            // tz database moved under us. Refuse to rotate off-window.
            warn!(timezone = %self.timezone, "Rotation window timezone no longer parses");
            return false;
        };
        let local = now.with_timezone(&tz).time();

        if self.start < self.end {
            self.start <= local && local <= self.end
        } else {
            local >= self.start || local <= self.end
        }
    }
}

/// Per-secret rotation schedule state.
#[derive(Debug, Clone)]
pub struct RotationSchedule {
    pub secret_id: SecretId,
    pub tenant: String,
    pub next_rotation: DateTime<Utc>,
    pub rotation_window: Option<RotationWindow>,
    pub max_retries: u32,
    pub retry_count: u32,
    pub last_attempt: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    /// Set once `retry_count` reaches `max_retries`; the schedule is
    /// skipped until it is re-registered.
    pub exhausted: bool,
}

impl RotationSchedule {
    /// A schedule due at `next_rotation` with no window.
    pub fn new(
        secret_id: SecretId,
        tenant: impl Into<String>,
        next_rotation: DateTime<Utc>,
        max_retries: u32,
    ) -> Self {
        Self {
            secret_id,
            tenant: tenant.into(),
            next_rotation,
            rotation_window: None,
            max_retries,
            retry_count: 0,
            last_attempt: None,
            last_error: None,
            exhausted: false,
        }
    }

    pub fn with_window(mut self, window: RotationWindow) -> Self {
        self.rotation_window = Some(window);
        self
    }
}

/// Notification emitted when a schedule exhausts its retries.
#[derive(Debug, Clone)]
pub struct RotationFailure {
    pub secret_id: SecretId,
    pub tenant: String,
    pub error: String,
    pub retry_count: u32,
    pub at: DateTime<Utc>,
}

/// Scheduler configuration knobs.
#[derive(Debug, Clone)]
pub struct RotationSchedulerOptions {
    pub check_interval_ms: u64,
    pub max_concurrent_rotations: usize,
    pub default_max_retries: u32,
}

impl Default for RotationSchedulerOptions {
    fn default() -> Self {
        Self { check_interval_ms: 60_000, max_concurrent_rotations: 4, default_max_retries: 3 }
    }
}

/// Timer-driven rotation scheduler over a lifecycle manager.
pub struct RotationScheduler {
    manager: Arc<SecretManager>,
    schedules: std::sync::Mutex<HashMap<SecretId, RotationSchedule>>,
    options: RotationSchedulerOptions,
    failures: broadcast::Sender<RotationFailure>,
}

impl std::fmt::Debug for RotationScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let schedules = self.schedules.lock().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("RotationScheduler")
            .field("schedule_count", &schedules.len())
            .field("options", &self.options)
            .finish()
    }
}

impl RotationScheduler {
    pub fn new(manager: Arc<SecretManager>, options: RotationSchedulerOptions) -> Self {
        let (failures, _) = broadcast::channel(64);
        Self { manager, schedules: std::sync::Mutex::new(HashMap::new()), options, failures }
    }

    /// Register (or replace) a schedule.
    pub fn register(&self, schedule: RotationSchedule) {
        let mut schedules = self.schedules.lock().unwrap_or_else(PoisonError::into_inner);
        debug!(secret_id = %schedule.secret_id, next_rotation = %schedule.next_rotation, "Rotation schedule registered");
        schedules.insert(schedule.secret_id.clone(), schedule);
    }

    /// Register a schedule due immediately, using the configured default
    /// retry budget.
    pub fn register_due_now(&self, secret_id: SecretId, tenant: impl Into<String>) {
        self.register(RotationSchedule::new(
            secret_id,
            tenant,
            Utc::now(),
            self.options.default_max_retries,
        ));
    }

    /// Drop a schedule. Returns whether one was registered.
    pub fn unregister(&self, secret_id: &SecretId) -> bool {
        let mut schedules = self.schedules.lock().unwrap_or_else(PoisonError::into_inner);
        schedules.remove(secret_id).is_some()
    }

    /// Snapshot of one schedule's state.
    pub fn schedule_status(&self, secret_id: &SecretId) -> Option<RotationSchedule> {
        let schedules = self.schedules.lock().unwrap_or_else(PoisonError::into_inner);
        schedules.get(secret_id).cloned()
    }

    /// Snapshot of every registered schedule.
    pub fn schedules(&self) -> Vec<RotationSchedule> {
        let schedules = self.schedules.lock().unwrap_or_else(PoisonError::into_inner);
        schedules.values().cloned().collect()
    }

    /// Subscribe to retry-exhaustion notifications.
    pub fn failures(&self) -> broadcast::Receiver<RotationFailure> {
        self.failures.subscribe()
    }

    /// Run one scheduling pass. Returns the number of rotations attempted.
    ///
    /// Due schedules beyond `max_concurrent_rotations` stay queued for the
    /// next pass. The schedule map is never locked across the rotate calls.
    pub async fn run_pending(&self) -> usize {
        let now = Utc::now();

        let due: Vec<(SecretId, String)> = {
            let mut schedules = self.schedules.lock().unwrap_or_else(PoisonError::into_inner);
            let mut due: Vec<&mut RotationSchedule> = schedules
                .values_mut()
                .filter(|schedule| {
                    !schedule.exhausted
                        && schedule.next_rotation <= now
                        && schedule
                            .rotation_window
                            .as_ref()
                            .map_or(true, |window| window.admits(now))
                })
                .collect();
            due.sort_by_key(|schedule| schedule.next_rotation);
            due.into_iter()
                .take(self.options.max_concurrent_rotations)
                .map(|schedule| {
                    schedule.last_attempt = Some(now);
                    (schedule.secret_id.clone(), schedule.tenant.clone())
                })
                .collect()
        };

        if due.is_empty() {
            return 0;
        }

        let attempted = due.len();
        let mut rotations = JoinSet::new();
        for (secret_id, tenant) in due {
            let manager = Arc::clone(&self.manager);
            rotations.spawn(async move {
                let actor = Identity::new(SCHEDULER_SUBJECT, [Role::Writer], tenant);
                let result = manager.rotate(&secret_id, &actor).await;
                (secret_id, result)
            });
        }

        while let Some(joined) = rotations.join_next().await {
            match joined {
                Ok((secret_id, Ok(secret))) => {
                    self.record_success(&secret_id, secret.policy.rotation_days);
                }
                Ok((secret_id, Err(err))) => {
                    self.record_failure(&secret_id, &err.to_string());
                }
                Err(join_err) => {
                    warn!(error = %join_err, "Rotation task panicked");
                }
            }
        }

        attempted
    }

    fn record_success(&self, secret_id: &SecretId, rotation_days: u32) {
        let mut schedules = self.schedules.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(schedule) = schedules.get_mut(secret_id) {
            schedule.next_rotation = Utc::now() + Duration::days(i64::from(rotation_days));
            schedule.retry_count = 0;
            schedule.last_error = None;
            info!(secret_id = %secret_id, next_rotation = %schedule.next_rotation, "Rotation succeeded");
        }
    }

    fn record_failure(&self, secret_id: &SecretId, error: &str) {
        let mut schedules = self.schedules.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(schedule) = schedules.get_mut(secret_id) else { return };

        schedule.retry_count += 1;
        schedule.last_error = Some(error.to_string());

        if schedule.retry_count >= schedule.max_retries {
            schedule.exhausted = true;
            warn!(
                secret_id = %secret_id,
                retries = schedule.retry_count,
                error,
                "Rotation retries exhausted"
            );
            let _ = self.failures.send(RotationFailure {
                secret_id: secret_id.clone(),
                tenant: schedule.tenant.clone(),
                error: error.to_string(),
                retry_count: schedule.retry_count,
                at: Utc::now(),
            });
        } else {
            let backoff = Duration::minutes(1 << schedule.retry_count.min(20));
            schedule.next_rotation = Utc::now() + backoff;
            warn!(
                secret_id = %secret_id,
                retry_count = schedule.retry_count,
                next_rotation = %schedule.next_rotation,
                error,
                "Rotation failed; backing off"
            );
        }
    }

    /// Spawn the periodic scheduling loop. Abort the handle to stop it.
    pub fn spawn(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        let interval_ms = self.options.check_interval_ms;
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(std::time::Duration::from_millis(interval_ms.max(1)));
            loop {
                interval.tick().await;
                self.run_pending().await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemoryAuditSink;
    use crate::domain::{SecretPolicy, SecretString};
    use crate::envelope::EnvelopeKeyManager;
    use crate::lifecycle::NewSecret;
    use crate::storage::MemoryStore;
    use chrono::TimeZone;

    fn window(start: (u32, u32), end: (u32, u32), tz: &str) -> RotationWindow {
        RotationWindow::new(
            NaiveTime::from_hms_opt(start.0, start.1, 0).unwrap(),
            NaiveTime::from_hms_opt(end.0, end.1, 0).unwrap(),
            tz,
        )
        .unwrap()
    }

    fn at_utc(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 15, hour, 0, 0).unwrap()
    }

    #[test]
    fn test_window_within_one_day() {
        let window = window((9, 0), (17, 0), "UTC");
        assert!(window.admits(at_utc(12)));
        assert!(window.admits(at_utc(9)));
        assert!(window.admits(at_utc(17)));
        assert!(!window.admits(at_utc(20)));
        assert!(!window.admits(at_utc(3)));
    }

    #[test]
    fn test_window_wrapping_midnight() {
        let window = window((22, 0), (2, 0), "UTC");
        assert!(window.admits(at_utc(23)));
        assert!(window.admits(at_utc(1)));
        assert!(!window.admits(at_utc(12)));
    }

    #[test]
    fn test_window_respects_timezone() {
        // 12:00 UTC is 08:00 in New York (June, DST): inside a 06:00-09:00
        // local window, outside the same window evaluated in UTC.
        let ny = window((6, 0), (9, 0), "America/New_York");
        assert!(ny.admits(at_utc(12)));

        let utc = window((6, 0), (9, 0), "UTC");
        assert!(!utc.admits(at_utc(12)));
    }

    #[test]
    fn test_window_rejects_bad_timezone() {
        let result = RotationWindow::new(
            NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
            "Mars/Olympus_Mons",
        );
        assert!(result.is_err());
    }

    fn scheduler_fixture() -> (Arc<SecretManager>, RotationScheduler) {
        let keys = Arc::new(EnvelopeKeyManager::new(SecretString::new("rotation-test"), 90));
        let audit = Arc::new(MemoryAuditSink::new());
        let store = Arc::new(MemoryStore::new(keys, audit.clone()));
        let manager = Arc::new(SecretManager::new(store, audit));
        let scheduler =
            RotationScheduler::new(Arc::clone(&manager), RotationSchedulerOptions::default());
        (manager, scheduler)
    }

    fn admin() -> Identity {
        Identity::new("root", [Role::Admin, Role::Writer, Role::Reader], "acme")
    }

    fn policy() -> SecretPolicy {
        SecretPolicy { min_length: 8, rotation_days: 30, ..SecretPolicy::named("rotate") }
    }

    #[tokio::test]
    async fn test_due_schedule_rotates_secret() {
        let (manager, scheduler) = scheduler_fixture();
        manager.handlers().register_fn("fresh", |_| Ok("fresh-value-123".to_string()));

        let secret = manager
            .create_secret(
                NewSecret::new("db-pass", "P@ssw0rd!")
                    .with_policy(policy())
                    .with_rotation_handler("fresh"),
                &admin(),
            )
            .await
            .unwrap();

        scheduler.register_due_now(secret.id.clone(), "acme");
        assert_eq!(scheduler.run_pending().await, 1);

        let rotated = manager.get_secret(&secret.id, &admin()).await.unwrap();
        assert_eq!(rotated.latest_version().unwrap().version, 2);
        assert_eq!(rotated.latest_version().unwrap().created_by, SCHEDULER_SUBJECT);

        // next_rotation advanced by the policy cadence; retry state clear.
        let status = scheduler.schedule_status(&secret.id).unwrap();
        assert!(status.next_rotation > Utc::now() + Duration::days(29));
        assert_eq!(status.retry_count, 0);
        assert!(status.last_error.is_none());
        assert!(status.last_attempt.is_some());
    }

    #[tokio::test]
    async fn test_future_schedule_not_processed() {
        let (_, scheduler) = scheduler_fixture();
        scheduler.register(RotationSchedule::new(
            SecretId::new(),
            "acme",
            Utc::now() + Duration::hours(1),
            3,
        ));
        assert_eq!(scheduler.run_pending().await, 0);
    }

    #[tokio::test]
    async fn test_window_outside_blocks_rotation() {
        let (_, scheduler) = scheduler_fixture();
        let now = Utc::now();
        // A window one hour ahead never admits the current instant.
        let start = (now + Duration::hours(1)).time();
        let end = (now + Duration::hours(2)).time();
        let window = RotationWindow::new(start, end, "UTC").unwrap();

        scheduler.register(
            RotationSchedule::new(SecretId::new(), "acme", now, 3).with_window(window),
        );
        assert_eq!(scheduler.run_pending().await, 0);
    }

    #[tokio::test]
    async fn test_failure_backs_off_exponentially() {
        let (manager, scheduler) = scheduler_fixture();
        manager
            .handlers()
            .register_fn("broken", |_| Err(StrongroomError::internal("upstream down")));

        let secret = manager
            .create_secret(
                NewSecret::new("db-pass", "P@ssw0rd!")
                    .with_policy(policy())
                    .with_rotation_handler("broken"),
                &admin(),
            )
            .await
            .unwrap();

        scheduler.register(RotationSchedule::new(secret.id.clone(), "acme", Utc::now(), 3));
        assert_eq!(scheduler.run_pending().await, 1);

        let status = scheduler.schedule_status(&secret.id).unwrap();
        assert_eq!(status.retry_count, 1);
        assert!(status.last_error.as_deref().unwrap().contains("upstream down"));
        assert!(!status.exhausted);
        // 2^1 minutes in the future.
        assert!(status.next_rotation > Utc::now() + Duration::seconds(100));
    }

    #[tokio::test]
    async fn test_exhaustion_surfaces_notification() {
        let (manager, scheduler) = scheduler_fixture();
        manager
            .handlers()
            .register_fn("broken", |_| Err(StrongroomError::internal("upstream down")));

        let secret = manager
            .create_secret(
                NewSecret::new("db-pass", "P@ssw0rd!")
                    .with_policy(policy())
                    .with_rotation_handler("broken"),
                &admin(),
            )
            .await
            .unwrap();

        let mut failures = scheduler.failures();
        scheduler.register(RotationSchedule::new(secret.id.clone(), "acme", Utc::now(), 1));
        scheduler.run_pending().await;

        let status = scheduler.schedule_status(&secret.id).unwrap();
        assert!(status.exhausted);

        let failure = failures.recv().await.unwrap();
        assert_eq!(failure.secret_id, secret.id);
        assert_eq!(failure.retry_count, 1);

        // Exhausted schedules are skipped on later passes.
        assert_eq!(scheduler.run_pending().await, 0);
    }

    #[tokio::test]
    async fn test_concurrency_bound_per_pass() {
        let (manager, scheduler) = scheduler_fixture();
        manager.handlers().register_fn("fresh", |_| Ok("fresh-value-123".to_string()));

        let mut ids = Vec::new();
        for i in 0..6 {
            let secret = manager
                .create_secret(
                    NewSecret::new(format!("s-{}", i), "P@ssw0rd!")
                        .with_policy(policy())
                        .with_rotation_handler("fresh"),
                    &admin(),
                )
                .await
                .unwrap();
            scheduler.register_due_now(secret.id.clone(), "acme");
            ids.push(secret.id);
        }

        // Default cap is 4: first pass rotates 4, second the remaining 2.
        assert_eq!(scheduler.run_pending().await, 4);
        assert_eq!(scheduler.run_pending().await, 2);
    }

    #[tokio::test]
    async fn test_unregister() {
        let (_, scheduler) = scheduler_fixture();
        let id = SecretId::new();
        scheduler.register_due_now(id.clone(), "acme");
        assert!(scheduler.unregister(&id));
        assert!(!scheduler.unregister(&id));
        assert_eq!(scheduler.run_pending().await, 0);
    }
}
