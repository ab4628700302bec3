//! Admission control: a per-identity cooldown plus a global ceiling over a
//! rolling window.
//!
//! All state sits behind one lock so the check and the update for an
//! identity happen together; two concurrent events from the same identity
//! can never both pass the cooldown.

use std::collections::HashMap;
use std::time::Duration as StdDuration;

use bilbot_config::RateLimitConfig;
use bilbot_core::Identity;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::debug;

/// Timing limits applied by the [`AdmissionController`].
#[derive(Debug, Clone)]
pub struct AdmissionPolicy {
    pub enabled: bool,
    /// Minimum gap between two admissions of one identity.
    pub cooldown: Duration,
    /// Maximum admissions across all identities inside `window`.
    pub global_ceiling: u32,
    pub window: Duration,
}

impl Default for AdmissionPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            cooldown: Duration::seconds(10),
            global_ceiling: 60,
            window: Duration::seconds(60),
        }
    }
}

impl AdmissionPolicy {
    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self {
            enabled: config.enabled,
            cooldown: i64::try_from(config.per_user_seconds)
                .ok()
                .and_then(Duration::try_seconds)
                .unwrap_or(Duration::MAX),
            global_ceiling: config.global_per_minute,
            window: Duration::seconds(60),
        }
    }
}

/// Why an event was turned away.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "limit", rename_all = "snake_case")]
pub enum RateLimitReason {
    /// The identity was admitted too recently.
    Cooldown { retry_after: StdDuration },
    /// The global window is full.
    GlobalCeiling { retry_after: StdDuration },
}

impl RateLimitReason {
    pub fn retry_after(&self) -> StdDuration {
        match self {
            RateLimitReason::Cooldown { retry_after }
            | RateLimitReason::GlobalCeiling { retry_after } => *retry_after,
        }
    }

    /// Wait rounded up to whole seconds, at least one.
    pub fn retry_after_secs(&self) -> u64 {
        let wait = self.retry_after();
        let secs = wait.as_secs() + u64::from(wait.subsec_nanos() > 0);
        secs.max(1)
    }
}

impl std::fmt::Display for RateLimitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RateLimitReason::Cooldown { .. } => {
                write!(f, "per-identity cooldown, retry in {}s", self.retry_after_secs())
            }
            RateLimitReason::GlobalCeiling { .. } => {
                write!(f, "global ceiling reached, retry in {}s", self.retry_after_secs())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdmissionDecision {
    Allowed,
    Rejected(RateLimitReason),
}

impl AdmissionDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, AdmissionDecision::Allowed)
    }
}

#[derive(Default)]
struct AdmissionState {
    last_admitted: HashMap<Identity, DateTime<Utc>>,
    /// Admission timestamps inside the current window.
    window: Vec<DateTime<Utc>>,
}

impl AdmissionState {
    fn prune_window(&mut self, now: DateTime<Utc>, window: Duration) {
        let cutoff = now - window;
        self.window.retain(|t| *t > cutoff);
    }
}

/// Process-wide admission gate.
pub struct AdmissionController {
    policy: AdmissionPolicy,
    state: Mutex<AdmissionState>,
}

impl AdmissionController {
    pub fn new(policy: AdmissionPolicy) -> Self {
        Self { policy, state: Mutex::new(AdmissionState::default()) }
    }

    pub fn policy(&self) -> &AdmissionPolicy {
        &self.policy
    }

    /// Decide whether `identity` may start work at `now`.
    ///
    /// Cooldown is checked before the global window. Only an `Allowed`
    /// decision changes state.
    pub async fn admit(&self, identity: &Identity, now: DateTime<Utc>) -> AdmissionDecision {
        if !self.policy.enabled {
            return AdmissionDecision::Allowed;
        }

        let mut state = self.state.lock().await;

        if let Some(last) = state.last_admitted.get(identity) {
            let elapsed = now - *last;
            if elapsed < self.policy.cooldown {
                let wait = self.policy.cooldown.checked_sub(&elapsed).unwrap_or(Duration::MAX);
                debug!(identity = %identity, wait_ms = wait.num_milliseconds(), "Admission denied: cooldown");
                return AdmissionDecision::Rejected(RateLimitReason::Cooldown {
                    retry_after: wait.to_std().unwrap_or_default(),
                });
            }
        }

        state.prune_window(now, self.policy.window);
        if state.window.len() >= self.policy.global_ceiling as usize {
            let oldest = state.window.iter().min().copied().unwrap_or(now);
            let wait = (oldest + self.policy.window) - now;
            debug!(identity = %identity, in_window = state.window.len(), "Admission denied: global ceiling");
            return AdmissionDecision::Rejected(RateLimitReason::GlobalCeiling {
                retry_after: wait.to_std().unwrap_or_default(),
            });
        }

        state.last_admitted.insert(identity.clone(), now);
        state.window.push(now);
        debug!(identity = %identity, in_window = state.window.len(), "Admission allowed");
        AdmissionDecision::Allowed
    }

    /// Forget identities whose cooldown has passed and expired window slots.
    pub async fn cleanup(&self, now: DateTime<Utc>) {
        let mut state = self.state.lock().await;
        let cooldown = self.policy.cooldown;
        state.last_admitted.retain(|_, last| now - *last < cooldown);
        state.prune_window(now, self.policy.window);
    }

    /// Number of identities currently tracked.
    pub async fn tracked_identities(&self) -> usize {
        self.state.lock().await.last_admitted.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn policy(cooldown_secs: i64, ceiling: u32) -> AdmissionPolicy {
        AdmissionPolicy {
            enabled: true,
            cooldown: Duration::seconds(cooldown_secs),
            global_ceiling: ceiling,
            window: Duration::seconds(60),
        }
    }

    #[test]
    fn oversized_cooldown_saturates() {
        let config = RateLimitConfig { per_user_seconds: 10_000_000_000_000_000, ..Default::default() };
        assert_eq!(AdmissionPolicy::from_config(&config).cooldown, Duration::MAX);

        let config = RateLimitConfig { per_user_seconds: u64::MAX, ..Default::default() };
        assert_eq!(AdmissionPolicy::from_config(&config).cooldown, Duration::MAX);
    }

    #[tokio::test]
    async fn saturated_cooldown_still_answers() {
        let gate = AdmissionController::new(AdmissionPolicy { cooldown: Duration::MAX, ..policy(0, 10) });
        let id = Identity::from("u1");
        assert!(gate.admit(&id, t0()).await.is_allowed());
        assert!(!gate.admit(&id, t0() - Duration::seconds(5)).await.is_allowed());
    }

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-04-28T12:00:00Z").unwrap().with_timezone(&Utc)
    }

    #[tokio::test]
    async fn burst_from_one_identity_admits_once() {
        let ctl = AdmissionController::new(policy(10, 60));
        let user = Identity::from("user1");
        let mut allowed = 0;
        for i in 0..5 {
            let now = t0() + Duration::milliseconds(100 * i);
            if ctl.admit(&user, now).await.is_allowed() {
                allowed += 1;
            }
        }
        assert_eq!(allowed, 1);
    }

    #[tokio::test]
    async fn cooldown_reports_remaining_wait() {
        let ctl = AdmissionController::new(policy(10, 60));
        let user = Identity::from("user1");
        assert!(ctl.admit(&user, t0()).await.is_allowed());
        match ctl.admit(&user, t0() + Duration::milliseconds(3500)).await {
            AdmissionDecision::Rejected(reason @ RateLimitReason::Cooldown { .. }) => {
                assert_eq!(reason.retry_after(), StdDuration::from_millis(6500));
                assert_eq!(reason.retry_after_secs(), 7);
            }
            other => panic!("expected cooldown, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn admits_again_after_cooldown() {
        let ctl = AdmissionController::new(policy(10, 60));
        let user = Identity::from("user1");
        assert!(ctl.admit(&user, t0()).await.is_allowed());
        assert!(!ctl.admit(&user, t0() + Duration::seconds(9)).await.is_allowed());
        assert!(ctl.admit(&user, t0() + Duration::seconds(10)).await.is_allowed());
    }

    #[tokio::test]
    async fn rejected_attempt_does_not_extend_cooldown() {
        let ctl = AdmissionController::new(policy(10, 60));
        let user = Identity::from("user1");
        assert!(ctl.admit(&user, t0()).await.is_allowed());
        assert!(!ctl.admit(&user, t0() + Duration::seconds(8)).await.is_allowed());
        assert!(ctl.admit(&user, t0() + Duration::seconds(11)).await.is_allowed());
    }

    #[tokio::test]
    async fn identities_are_independent() {
        let ctl = AdmissionController::new(policy(10, 60));
        assert!(ctl.admit(&Identity::from("a"), t0()).await.is_allowed());
        assert!(ctl.admit(&Identity::from("b"), t0()).await.is_allowed());
    }

    #[tokio::test]
    async fn earlier_timestamp_than_last_admission_is_rejected() {
        let ctl = AdmissionController::new(policy(10, 60));
        let user = Identity::from("user1");
        assert!(ctl.admit(&user, t0()).await.is_allowed());
        assert!(!ctl.admit(&user, t0() - Duration::seconds(30)).await.is_allowed());
    }

    #[tokio::test]
    async fn global_ceiling_caps_window() {
        let ctl = AdmissionController::new(policy(10, 3));
        let mut allowed = 0;
        for i in 0..10 {
            let user = Identity::new(format!("user{i}"));
            if ctl.admit(&user, t0() + Duration::seconds(i)).await.is_allowed() {
                allowed += 1;
            }
        }
        assert_eq!(allowed, 3);

        match ctl.admit(&Identity::from("late"), t0() + Duration::seconds(20)).await {
            AdmissionDecision::Rejected(RateLimitReason::GlobalCeiling { retry_after }) => {
                assert_eq!(retry_after, StdDuration::from_secs(40));
            }
            other => panic!("expected global ceiling, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn window_slots_expire() {
        let ctl = AdmissionController::new(policy(0, 2));
        assert!(ctl.admit(&Identity::from("a"), t0()).await.is_allowed());
        assert!(ctl.admit(&Identity::from("b"), t0() + Duration::seconds(1)).await.is_allowed());
        assert!(!ctl.admit(&Identity::from("c"), t0() + Duration::seconds(59)).await.is_allowed());
        assert!(ctl.admit(&Identity::from("c"), t0() + Duration::seconds(60)).await.is_allowed());
    }

    #[tokio::test]
    async fn cooldown_rejection_does_not_use_global_slot() {
        let ctl = AdmissionController::new(policy(10, 2));
        let a = Identity::from("a");
        assert!(ctl.admit(&a, t0()).await.is_allowed());
        for i in 1..5 {
            assert!(!ctl.admit(&a, t0() + Duration::seconds(i)).await.is_allowed());
        }
        assert!(ctl.admit(&Identity::from("b"), t0() + Duration::seconds(5)).await.is_allowed());
    }

    #[tokio::test]
    async fn window_never_exceeds_ceiling() {
        let ceiling = 5;
        let ctl = AdmissionController::new(policy(0, ceiling));
        let mut admitted = Vec::new();
        // 200 events over 200 seconds from a rotating set of users.
        for i in 0..200 {
            let now = t0() + Duration::seconds(i);
            let user = Identity::new(format!("user{}", i % 7));
            if ctl.admit(&user, now).await.is_allowed() {
                admitted.push(now);
            }
        }
        for start in &admitted {
            let in_window = admitted
                .iter()
                .filter(|t| **t >= *start && **t < *start + Duration::seconds(60))
                .count();
            assert!(in_window <= ceiling as usize);
        }
    }

    #[tokio::test]
    async fn concurrent_burst_admits_once() {
        let ctl = Arc::new(AdmissionController::new(policy(10, 60)));
        let user = Identity::from("racer");
        let now = t0();
        let handles: Vec<_> = (0..32)
            .map(|_| {
                let ctl = Arc::clone(&ctl);
                let user = user.clone();
                tokio::spawn(async move { ctl.admit(&user, now).await.is_allowed() })
            })
            .collect();
        let mut allowed = 0;
        for h in handles {
            if h.await.unwrap() {
                allowed += 1;
            }
        }
        assert_eq!(allowed, 1);
    }

    #[tokio::test]
    async fn disabled_policy_allows_everything() {
        let mut p = policy(10, 1);
        p.enabled = false;
        let ctl = AdmissionController::new(p);
        let user = Identity::from("user1");
        for _ in 0..5 {
            assert!(ctl.admit(&user, t0()).await.is_allowed());
        }
    }

    #[tokio::test]
    async fn cleanup_forgets_idle_identities() {
        let ctl = AdmissionController::new(policy(10, 60));
        ctl.admit(&Identity::from("a"), t0()).await;
        ctl.admit(&Identity::from("b"), t0() + Duration::seconds(5)).await;
        ctl.cleanup(t0() + Duration::seconds(12)).await;
        assert_eq!(ctl.tracked_identities().await, 1);
    }

    #[test]
    fn policy_from_config() {
        let cfg = RateLimitConfig { per_user_seconds: 3, global_per_minute: 7, ..Default::default() };
        let p = AdmissionPolicy::from_config(&cfg);
        assert_eq!(p.cooldown, Duration::seconds(3));
        assert_eq!(p.global_ceiling, 7);
        assert!(p.enabled);
    }
}
