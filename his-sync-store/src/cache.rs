use std::collections::VecDeque;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::models::{ConfigId, InstanceId};

pub const DEFAULT_WATERMARK_TTL: Duration = Duration::from_secs(24 * 3600);
pub const DEFAULT_RATE_WINDOW: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeCategory {
    Metadata,
    Data,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatermarkKey {
    pub instance_id: InstanceId,
    pub category: ChangeCategory,
    pub resource: &'static str,
}

struct CacheEntry<T> {
    value: T,
    expires_at: Instant,
}

/// spec.md §4.6's per-configuration state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LifecycleState {
    #[default]
    Initial,
    MetadataDone,
    Running,
    Cooldown,
    Throttled,
}

#[derive(Default)]
struct RateSlot {
    admitted: VecDeque<Instant>,
    cooldown_until: Option<Instant>,
}

/// Process-wide ephemeral state: watermarks, rate limiting, lifecycle
/// state, and the audit-endpoint-availability flag. Owned by the
/// scheduler and passed explicitly to the lifecycle manager and change
/// detector (SPEC_FULL.md §3, spec.md §9's re-architecture guidance — a
/// single `ReplicationCache` value rather than ad-hoc global state).
pub struct ReplicationCache {
    watermarks: DashMap<(InstanceId, ChangeCategory, String), CacheEntry<DateTime<Utc>>>,
    rate: DashMap<ConfigId, RateSlot>,
    lifecycle: DashMap<ConfigId, LifecycleState>,
    audit_supported: DashMap<InstanceId, CacheEntry<bool>>,
    watermark_ttl: Duration,
    rate_window: Duration,
}

impl Default for ReplicationCache {
    fn default() -> Self {
        Self::new(DEFAULT_WATERMARK_TTL, DEFAULT_RATE_WINDOW)
    }
}

impl ReplicationCache {
    pub fn new(watermark_ttl: Duration, rate_window: Duration) -> Self {
        Self {
            watermarks: DashMap::new(),
            rate: DashMap::new(),
            lifecycle: DashMap::new(),
            audit_supported: DashMap::new(),
            watermark_ttl,
            rate_window,
        }
    }

    // --- watermarks ---

    pub fn get_watermark(&self, instance_id: InstanceId, category: ChangeCategory, resource: &str) -> Option<DateTime<Utc>> {
        let key = (instance_id, category, resource.to_string());
        let entry = self.watermarks.get(&key)?;
        if entry.expires_at < Instant::now() {
            drop(entry);
            self.watermarks.remove(&key);
            return None;
        }
        Some(entry.value)
    }

    pub fn set_watermark(&self, instance_id: InstanceId, category: ChangeCategory, resource: &str, value: DateTime<Utc>) {
        let key = (instance_id, category, resource.to_string());
        self.watermarks.insert(
            key,
            CacheEntry {
                value,
                expires_at: Instant::now() + self.watermark_ttl,
            },
        );
    }

    pub fn reset_watermark(&self, instance_id: InstanceId, category: ChangeCategory, resource: &str) {
        self.watermarks.remove(&(instance_id, category, resource.to_string()));
    }

    // --- audit endpoint availability (SPEC_FULL.md §9, design note 1) ---

    pub fn get_audit_supported(&self, instance_id: InstanceId) -> Option<bool> {
        let entry = self.audit_supported.get(&instance_id)?;
        if entry.expires_at < Instant::now() {
            drop(entry);
            self.audit_supported.remove(&instance_id);
            return None;
        }
        Some(entry.value)
    }

    pub fn set_audit_supported(&self, instance_id: InstanceId, supported: bool) {
        self.audit_supported.insert(
            instance_id,
            CacheEntry {
                value: supported,
                expires_at: Instant::now() + self.watermark_ttl,
            },
        );
    }

    // --- rate limiting (spec.md §4.6 step 4, §5) ---

    /// Counts syncs admitted within the trailing window, pruning stale
    /// entries first.
    pub fn rate_count(&self, config_id: ConfigId) -> u32 {
        let mut slot = self.rate.entry(config_id).or_default();
        self.prune(&mut slot);
        slot.admitted.len() as u32
    }

    /// Records an admitted sync at the moment it is admitted, per
    /// spec.md §5's "in-flight syncs count against the limit" rule.
    pub fn record_admission(&self, config_id: ConfigId) {
        let mut slot = self.rate.entry(config_id).or_default();
        self.prune(&mut slot);
        slot.admitted.push_back(Instant::now());
    }

    fn prune(&self, slot: &mut RateSlot) {
        let cutoff = Instant::now().checked_sub(self.rate_window).unwrap_or(Instant::now());
        while matches!(slot.admitted.front(), Some(t) if *t < cutoff) {
            slot.admitted.pop_front();
        }
    }

    pub fn cooldown_remaining(&self, config_id: ConfigId) -> Option<Duration> {
        let slot = self.rate.get(&config_id)?;
        let until = slot.cooldown_until?;
        let now = Instant::now();
        if until > now {
            Some(until - now)
        } else {
            None
        }
    }

    pub fn arm_cooldown(&self, config_id: ConfigId, duration: Duration) {
        let mut slot = self.rate.entry(config_id).or_default();
        slot.cooldown_until = Some(Instant::now() + duration);
    }

    pub fn clear_cooldown(&self, config_id: ConfigId) {
        if let Some(mut slot) = self.rate.get_mut(&config_id) {
            slot.cooldown_until = None;
        }
    }

    // --- lifecycle state ---

    pub fn lifecycle_state(&self, config_id: ConfigId) -> LifecycleState {
        self.lifecycle.get(&config_id).map(|s| *s).unwrap_or_default()
    }

    pub fn set_lifecycle_state(&self, config_id: ConfigId, state: LifecycleState) {
        self.lifecycle.insert(config_id, state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use uuid::Uuid;

    #[test]
    fn watermark_round_trips_and_resets() {
        let cache = ReplicationCache::default();
        let instance = Uuid::new_v4();
        assert!(cache.get_watermark(instance, ChangeCategory::Metadata, "users").is_none());
        let now = Utc::now();
        cache.set_watermark(instance, ChangeCategory::Metadata, "users", now);
        assert_eq!(cache.get_watermark(instance, ChangeCategory::Metadata, "users"), Some(now));
        cache.reset_watermark(instance, ChangeCategory::Metadata, "users");
        assert!(cache.get_watermark(instance, ChangeCategory::Metadata, "users").is_none());
    }

    #[test]
    fn rate_counter_tracks_admissions_within_window() {
        let cache = ReplicationCache::new(DEFAULT_WATERMARK_TTL, Duration::from_secs(3600));
        let config = Uuid::new_v4();
        assert_eq!(cache.rate_count(config), 0);
        cache.record_admission(config);
        cache.record_admission(config);
        assert_eq!(cache.rate_count(config), 2);
    }

    #[test]
    fn cooldown_arms_and_reports_remaining() {
        let cache = ReplicationCache::default();
        let config = Uuid::new_v4();
        assert!(cache.cooldown_remaining(config).is_none());
        cache.arm_cooldown(config, Duration::from_secs(60));
        let remaining = cache.cooldown_remaining(config).unwrap();
        assert!(remaining <= Duration::from_secs(60) && remaining > Duration::from_secs(0));
        cache.clear_cooldown(config);
        assert!(cache.cooldown_remaining(config).is_none());
    }

    #[test]
    fn lifecycle_state_defaults_to_initial() {
        let cache = ReplicationCache::default();
        let config = Uuid::new_v4();
        assert_eq!(cache.lifecycle_state(config), LifecycleState::Initial);
        cache.set_lifecycle_state(config, LifecycleState::MetadataDone);
        assert_eq!(cache.lifecycle_state(config), LifecycleState::MetadataDone);
    }
}
