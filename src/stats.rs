//! Per-user activity bookkeeping: login count, daily streaks, named counters.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use utoipa::ToSchema;

use crate::clock::Clock;
use crate::error::ServiceError;
use crate::permission::{PermissionContext, catalog};
use crate::store::StatsRepo;

const MAX_COUNTER_NAME: usize = 64;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserStats {
    pub user_id: String,
    pub login_count: u64,
    pub first_seen_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub last_active_date: Option<NaiveDate>,
    pub active_days_count: u32,
    pub current_streak: u32,
    pub longest_streak: u32,
    #[serde(default)]
    pub counters: BTreeMap<String, i64>,
}

impl UserStats {
    #[must_use]
    pub fn new(user_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.into(),
            login_count: 0,
            first_seen_at: now,
            last_login_at: None,
            last_active_date: None,
            active_days_count: 0,
            current_streak: 0,
            longest_streak: 0,
            counters: BTreeMap::new(),
        }
    }

    /// Mark `now`'s UTC calendar day as active.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        let today = now.date_naive();
        match self.last_active_date {
            Some(last) if last == today => return,
            Some(last) if last.succ_opt() == Some(today) => self.current_streak += 1,
            _ => self.current_streak = 1,
        }
        self.last_active_date = Some(today);
        self.active_days_count += 1;
        self.longest_streak = self.longest_streak.max(self.current_streak);
    }

    pub fn record_login(&mut self, now: DateTime<Utc>) {
        self.login_count += 1;
        self.last_login_at = Some(now);
        self.touch(now);
    }

    pub fn increment(&mut self, counter: &str, by: i64) {
        let value = self.counters.entry(counter.to_string()).or_insert(0);
        *value = value.saturating_add(by);
    }

    /// Whole days since first seen.
    #[must_use]
    pub fn day_age(&self, now: DateTime<Utc>) -> i64 {
        (now.date_naive() - self.first_seen_at.date_naive()).num_days()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StatsView {
    #[serde(flatten)]
    pub stats: UserStats,
    pub day_age: i64,
}

#[derive(Clone)]
pub struct StatsService {
    repo: Arc<dyn StatsRepo>,
    clock: Arc<dyn Clock>,
}

impl StatsService {
    #[must_use]
    pub fn new(repo: Arc<dyn StatsRepo>, clock: Arc<dyn Clock>) -> Self {
        Self { repo, clock }
    }

    /// # Errors
    /// Store failures only.
    pub async fn record_login(&self, user_id: &str) -> Result<UserStats, ServiceError> {
        let now = self.clock.now();
        let mut stats = self.load_or_new(user_id).await?;
        stats.record_login(now);
        self.repo.upsert(&stats).await?;
        Ok(stats)
    }

    /// # Errors
    /// `PermissionDenied`, or `NotFound` when nothing was recorded yet.
    pub async fn get(&self, ctx: &PermissionContext, user_id: &str) -> Result<StatsView, ServiceError> {
        ctx.require_self_or(user_id, &catalog::STATS_READ)?;
        let stats = self
            .repo
            .get(user_id)
            .await?
            .ok_or(ServiceError::NotFound("stats"))?;
        Ok(self.view(stats))
    }

    /// # Errors
    /// `PermissionDenied`, or `BadRequest` for an unusable counter name.
    pub async fn increment(
        &self,
        ctx: &PermissionContext,
        user_id: &str,
        counter: &str,
        by: i64,
    ) -> Result<StatsView, ServiceError> {
        ctx.require_self_or(user_id, &catalog::STATS_UPDATE)?;
        validate_counter(counter)?;
        let mut stats = self.load_or_new(user_id).await?;
        stats.increment(counter, by);
        self.repo.upsert(&stats).await?;
        Ok(self.view(stats))
    }

    fn view(&self, stats: UserStats) -> StatsView {
        let day_age = stats.day_age(self.clock.now());
        StatsView { stats, day_age }
    }

    async fn load_or_new(&self, user_id: &str) -> Result<UserStats, ServiceError> {
        Ok(self
            .repo
            .get(user_id)
            .await?
            .unwrap_or_else(|| UserStats::new(user_id, self.clock.now())))
    }
}

fn validate_counter(counter: &str) -> Result<(), ServiceError> {
    let valid = !counter.is_empty()
        && counter.len() <= MAX_COUNTER_NAME
        && counter
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
    if valid {
        Ok(())
    } else {
        Err(ServiceError::BadRequest(format!("invalid counter name: {counter}")))
    }
}
