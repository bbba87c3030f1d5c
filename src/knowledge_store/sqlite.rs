use super::{adaptation_kind_for_status, CoinSummary, KnowledgeContext, KnowledgeStore, QuickUpdateResult, RecentPerformance};
use crate::config::ThresholdsConfig;
use crate::domain::adaptation::AdaptationMetrics;
use crate::domain::errors::KnowledgeError;
use crate::domain::{Adaptation, Coin, CoinScore, RegimeAction, RegimeRule, TradeEvent, TradingPattern};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::{error, info};
use uuid::Uuid;

struct KnowledgeState {
    coin_scores: HashMap<Coin, CoinScore>,
    patterns: HashMap<String, TradingPattern>,
    rules: HashMap<String, RegimeRule>,
    adaptations: Vec<Adaptation>,
}

pub struct SqliteKnowledgeStore {
    pool: SqlitePool,
    state: Mutex<KnowledgeState>,
}

fn storage_err(e: impl std::fmt::Display) -> KnowledgeError {
    KnowledgeError::Storage(e.to_string())
}

impl SqliteKnowledgeStore {
    pub async fn new(pool: SqlitePool) -> Result<Self, KnowledgeError> {
        Self::init_schema(&pool).await?;
        let state = Self::load(&pool).await?;
        Ok(Self {
            pool,
            state: Mutex::new(state),
        })
    }

    async fn init_schema(pool: &SqlitePool) -> Result<(), KnowledgeError> {
        for stmt in [
            "CREATE TABLE IF NOT EXISTS coin_scores (coin TEXT PRIMARY KEY, data TEXT NOT NULL);",
            "CREATE TABLE IF NOT EXISTS patterns (pattern_id TEXT PRIMARY KEY, data TEXT NOT NULL);",
            "CREATE TABLE IF NOT EXISTS regime_rules (rule_id TEXT PRIMARY KEY, data TEXT NOT NULL);",
            "CREATE TABLE IF NOT EXISTS adaptations (id TEXT PRIMARY KEY, target TEXT NOT NULL, applied_at INTEGER NOT NULL, data TEXT NOT NULL);",
        ] {
            sqlx::query(stmt).execute(pool).await.map_err(storage_err)?;
        }
        Ok(())
    }

    async fn load(pool: &SqlitePool) -> Result<KnowledgeState, KnowledgeError> {
        let mut coin_scores = HashMap::new();
        for row in sqlx::query("SELECT data FROM coin_scores")
            .fetch_all(pool)
            .await
            .map_err(storage_err)?
        {
            let data: String = row.try_get("data").map_err(storage_err)?;
            let score: CoinScore = serde_json::from_str(&data).map_err(storage_err)?;
            coin_scores.insert(score.coin.clone(), score);
        }

        let mut patterns = HashMap::new();
        for row in sqlx::query("SELECT data FROM patterns")
            .fetch_all(pool)
            .await
            .map_err(storage_err)?
        {
            let data: String = row.try_get("data").map_err(storage_err)?;
            let pattern: TradingPattern = serde_json::from_str(&data).map_err(storage_err)?;
            patterns.insert(pattern.pattern_id.clone(), pattern);
        }

        let mut rules = HashMap::new();
        for row in sqlx::query("SELECT data FROM regime_rules")
            .fetch_all(pool)
            .await
            .map_err(storage_err)?
        {
            let data: String = row.try_get("data").map_err(storage_err)?;
            let rule: RegimeRule = serde_json::from_str(&data).map_err(storage_err)?;
            rules.insert(rule.rule_id.clone(), rule);
        }

        let mut adaptations = Vec::new();
        for row in sqlx::query("SELECT data FROM adaptations ORDER BY applied_at ASC")
            .fetch_all(pool)
            .await
            .map_err(storage_err)?
        {
            let data: String = row.try_get("data").map_err(storage_err)?;
            adaptations.push(serde_json::from_str(&data).map_err(storage_err)?);
        }

        Ok(KnowledgeState {
            coin_scores,
            patterns,
            rules,
            adaptations,
        })
    }

    async fn persist_coin_score(&self, score: &CoinScore) -> Result<(), KnowledgeError> {
        let data = serde_json::to_string(score).map_err(storage_err)?;
        sqlx::query("INSERT INTO coin_scores (coin, data) VALUES (?, ?) ON CONFLICT(coin) DO UPDATE SET data = excluded.data")
            .bind(score.coin.to_string())
            .bind(data)
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    async fn persist_pattern(&self, pattern: &TradingPattern) -> Result<(), KnowledgeError> {
        let data = serde_json::to_string(pattern).map_err(storage_err)?;
        sqlx::query("INSERT INTO patterns (pattern_id, data) VALUES (?, ?) ON CONFLICT(pattern_id) DO UPDATE SET data = excluded.data")
            .bind(&pattern.pattern_id)
            .bind(data)
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    async fn persist_rule(&self, rule: &RegimeRule) -> Result<(), KnowledgeError> {
        let data = serde_json::to_string(rule).map_err(storage_err)?;
        sqlx::query("INSERT INTO regime_rules (rule_id, data) VALUES (?, ?) ON CONFLICT(rule_id) DO UPDATE SET data = excluded.data")
            .bind(&rule.rule_id)
            .bind(data)
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    async fn persist_adaptation(&self, adaptation: &Adaptation) -> Result<(), KnowledgeError> {
        let data = serde_json::to_string(adaptation).map_err(storage_err)?;
        sqlx::query(
            "INSERT INTO adaptations (id, target, applied_at, data) VALUES (?, ?, ?, ?) \
             ON CONFLICT(id) DO UPDATE SET data = excluded.data",
        )
        .bind(adaptation.id.to_string())
        .bind(&adaptation.target)
        .bind(adaptation.applied_at.timestamp())
        .bind(data)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(())
    }

    fn check_invariants(score: &CoinScore) -> Result<(), KnowledgeError> {
        if score.total_trades != score.wins + score.losses {
            return Err(KnowledgeError::Invariant(format!(
                "coin {} total_trades {} != wins {} + losses {}",
                score.coin, score.total_trades, score.wins, score.losses
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl KnowledgeStore for SqliteKnowledgeStore {
    async fn coin_score(&self, coin: &Coin) -> Option<CoinScore> {
        self.state.lock().await.coin_scores.get(coin).cloned()
    }

    async fn all_coin_scores(&self) -> Vec<CoinScore> {
        self.state.lock().await.coin_scores.values().cloned().collect()
    }

    async fn context(&self) -> KnowledgeContext {
        let state = self.state.lock().await;
        let mut coin_summaries = HashMap::new();
        let mut blacklist = Vec::new();
        let mut favored = Vec::new();
        let mut recent_performance = RecentPerformance::default();

        for score in state.coin_scores.values() {
            coin_summaries.insert(
                score.coin.clone(),
                CoinSummary {
                    status: score.status,
                    win_rate: score.win_rate(),
                    total_trades: score.total_trades,
                },
            );
            match score.status {
                crate::domain::CoinStatus::Blacklisted => blacklist.push(score.coin.clone()),
                crate::domain::CoinStatus::Favored => favored.push(score.coin.clone()),
                _ => {}
            }
            recent_performance.total_trades += score.total_trades;
            recent_performance.wins += score.wins;
            recent_performance.total_pnl += score.total_pnl;
        }

        let active_patterns = state.patterns.values().filter(|p| p.is_active).cloned().collect();
        let active_rules = state.rules.values().filter(|r| r.is_active).cloned().collect();

        KnowledgeContext {
            coin_summaries,
            blacklist,
            favored,
            active_patterns,
            active_rules,
            recent_performance,
        }
    }

    async fn pattern(&self, id: &str) -> Option<TradingPattern> {
        self.state.lock().await.patterns.get(id).cloned()
    }

    async fn active_patterns(&self) -> Vec<TradingPattern> {
        self.state
            .lock()
            .await
            .patterns
            .values()
            .filter(|p| p.is_active)
            .cloned()
            .collect()
    }

    async fn active_rules(&self) -> Vec<RegimeRule> {
        self.state
            .lock()
            .await
            .rules
            .values()
            .filter(|r| r.is_active)
            .cloned()
            .collect()
    }

    async fn adaptations_since(&self, t: DateTime<Utc>) -> Vec<Adaptation> {
        self.state
            .lock()
            .await
            .adaptations
            .iter()
            .filter(|a| a.applied_at >= t)
            .cloned()
            .collect()
    }

    async fn apply_quick_update(
        &self,
        event: &TradeEvent,
        thresholds: &ThresholdsConfig,
        now: DateTime<Utc>,
    ) -> Result<QuickUpdateResult, KnowledgeError> {
        let mut state = self.state.lock().await;
        let mut result = QuickUpdateResult::default();

        let score = state
            .coin_scores
            .entry(event.coin.clone())
            .or_insert_with(|| CoinScore::new(event.coin.clone(), now));
        let metrics_before = AdaptationMetrics {
            win_rate: score.win_rate(),
            pnl: score.total_pnl,
            trade_count: score.total_trades,
        };
        score.push_outcome(event.won, event.pnl_usd, now);
        Self::check_invariants(score)?;

        let status_changed = score.recompute_status(
            thresholds.min_trades_adaptation,
            thresholds.blacklist_wr,
            thresholds.reduce_wr,
            thresholds.favor_wr,
            now,
        );

        if status_changed {
            if let Some(kind) = adaptation_kind_for_status(score.status) {
                let adaptation = Adaptation::new(
                    kind,
                    event.coin.to_string(),
                    format!("status transitioned to {:?} automatically", score.status),
                    metrics_before,
                    now,
                    chrono::Duration::hours(24),
                    10,
                );
                self.persist_adaptation(&adaptation).await?;
                state.adaptations.push(adaptation.clone());
                result.coin_adaptation = Some(adaptation);
            }
        }
        let score_snapshot = score.clone();
        self.persist_coin_score(&score_snapshot).await?;

        if let Some(pattern_id) = &event.pattern_id {
            let pattern = state
                .patterns
                .entry(pattern_id.clone())
                .or_insert_with(|| TradingPattern::new(pattern_id.clone(), String::new(), serde_json::json!({}), serde_json::json!({}), now));
            let pattern_metrics_before = AdaptationMetrics {
                win_rate: if pattern.times_used == 0 { 0.0 } else { pattern.wins as f64 / pattern.times_used as f64 },
                pnl: pattern.total_pnl,
                trade_count: pattern.times_used,
            };
            let deactivated = pattern.record_outcome(event.won, event.pnl_usd, now);
            let pattern_snapshot = pattern.clone();
            self.persist_pattern(&pattern_snapshot).await?;
            result.pattern_deactivated = deactivated;

            if deactivated {
                let adaptation = Adaptation::new(
                    crate::domain::AdaptationKind::DeactivatePattern,
                    pattern_id.clone(),
                    "confidence or loss-streak threshold breached".to_string(),
                    pattern_metrics_before,
                    now,
                    chrono::Duration::hours(24),
                    10,
                );
                self.persist_adaptation(&adaptation).await?;
                state.adaptations.push(adaptation.clone());
                result.pattern_adaptation = Some(adaptation);
            }
        }

        Ok(result)
    }

    async fn apply_adaptation(&self, adaptation: Adaptation) -> Result<(), KnowledgeError> {
        let mut state = self.state.lock().await;
        apply_adaptation_mutation(&mut state, &adaptation)?;
        match adaptation.kind {
            crate::domain::AdaptationKind::Blacklist | crate::domain::AdaptationKind::Unblacklist => {
                if let Some(score) = state.coin_scores.get(&Coin::new(adaptation.target.as_str())).cloned() {
                    self.persist_coin_score(&score).await?;
                }
            }
            crate::domain::AdaptationKind::DeactivatePattern => {
                if let Some(pattern) = state.patterns.get(&adaptation.target).cloned() {
                    self.persist_pattern(&pattern).await?;
                }
            }
            crate::domain::AdaptationKind::CreateRule => {
                let rule_id = format!("rule-{}", adaptation.id);
                if let Some(rule) = state.rules.get(&rule_id).cloned() {
                    self.persist_rule(&rule).await?;
                }
            }
            _ => {}
        }
        self.persist_adaptation(&adaptation).await?;
        state.adaptations.push(adaptation);
        Ok(())
    }

    async fn force_blacklist(&self, coin: &Coin, reason: String, now: DateTime<Utc>) -> Result<(), KnowledgeError> {
        let mut state = self.state.lock().await;
        let score = state
            .coin_scores
            .entry(coin.clone())
            .or_insert_with(|| CoinScore::new(coin.clone(), now));
        score.force_status(crate::domain::CoinStatus::Blacklisted, Some(reason), now);
        let snapshot = score.clone();
        self.persist_coin_score(&snapshot).await?;
        Ok(())
    }

    async fn unblacklist(&self, coin: &Coin, now: DateTime<Utc>) -> Result<(), KnowledgeError> {
        let mut state = self.state.lock().await;
        let score = state
            .coin_scores
            .get_mut(coin)
            .ok_or_else(|| KnowledgeError::UnknownTarget(coin.to_string()))?;
        score.status_forced = false;
        score.blacklist_reason = None;
        // No ThresholdsConfig in scope on this path; recompute with the
        // defaults so an unblacklisted coin isn't left Unknown forever.
        score.recompute_status(5, 0.30, 0.45, 0.60, now);
        let snapshot = score.clone();
        self.persist_coin_score(&snapshot).await?;
        Ok(())
    }

    async fn rollback_adaptation(&self, adaptation_id: Uuid) -> Result<(), KnowledgeError> {
        let mut state = self.state.lock().await;
        let idx = state
            .adaptations
            .iter()
            .position(|a| a.id == adaptation_id)
            .ok_or_else(|| KnowledgeError::UnknownTarget(adaptation_id.to_string()))?;
        let mut adaptation = state.adaptations[idx].clone();
        let Some(inverse) = adaptation.inverse_kind() else {
            return Err(KnowledgeError::Invariant(format!(
                "adaptation {} has no inverse kind to roll back to",
                adaptation.id
            )));
        };
        let inverse_adaptation = Adaptation {
            kind: inverse,
            ..adaptation.clone()
        };
        apply_adaptation_mutation(&mut state, &inverse_adaptation)?;
        if let Some(score) = state.coin_scores.get(&Coin::new(adaptation.target.as_str())).cloned() {
            self.persist_coin_score(&score).await?;
        }
        if let Some(pattern) = state.patterns.get(&adaptation.target).cloned() {
            self.persist_pattern(&pattern).await?;
        }
        adaptation.rolled_back = true;
        state.adaptations[idx] = adaptation.clone();
        self.persist_adaptation(&adaptation).await?;
        info!("rolled back adaptation {}", adaptation.id);
        Ok(())
    }

    async fn target_metrics(&self, target: &str, _since: DateTime<Utc>) -> AdaptationMetrics {
        let state = self.state.lock().await;
        if let Some(score) = state.coin_scores.get(&Coin::new(target)) {
            return AdaptationMetrics {
                win_rate: score.win_rate(),
                pnl: score.total_pnl,
                trade_count: score.total_trades,
            };
        }
        if let Some(pattern) = state.patterns.get(target) {
            let win_rate = if pattern.times_used == 0 { 0.0 } else { pattern.wins as f64 / pattern.times_used as f64 };
            return AdaptationMetrics {
                win_rate,
                pnl: pattern.total_pnl,
                trade_count: pattern.times_used,
            };
        }
        AdaptationMetrics {
            win_rate: 0.0,
            pnl: rust_decimal::Decimal::ZERO,
            trade_count: 0,
        }
    }

    async fn record_effectiveness(
        &self,
        adaptation_id: Uuid,
        metrics_after: AdaptationMetrics,
        effectiveness: crate::domain::adaptation::Effectiveness,
    ) -> Result<(), KnowledgeError> {
        let mut state = self.state.lock().await;
        let idx = state
            .adaptations
            .iter()
            .position(|a| a.id == adaptation_id)
            .ok_or_else(|| KnowledgeError::UnknownTarget(adaptation_id.to_string()))?;
        state.adaptations[idx].metrics_after = Some(metrics_after);
        state.adaptations[idx].effectiveness = effectiveness;
        let snapshot = state.adaptations[idx].clone();
        self.persist_adaptation(&snapshot).await?;
        Ok(())
    }

    async fn note_trade_for_pending_adaptations(&self, coin: &Coin) -> Result<(), KnowledgeError> {
        let mut state = self.state.lock().await;
        let target = coin.to_string();
        let mut touched = Vec::new();
        for adaptation in state.adaptations.iter_mut() {
            if adaptation.target == target && matches!(adaptation.effectiveness, crate::domain::adaptation::Effectiveness::Pending) {
                adaptation.post_trade_count += 1;
                touched.push(adaptation.clone());
            }
        }
        for adaptation in touched {
            self.persist_adaptation(&adaptation).await?;
        }
        Ok(())
    }
}

fn apply_adaptation_mutation(state: &mut KnowledgeState, adaptation: &Adaptation) -> Result<(), KnowledgeError> {
    use crate::domain::AdaptationKind::*;
    match adaptation.kind {
        Blacklist => {
            let score = state
                .coin_scores
                .entry(Coin::new(adaptation.target.as_str()))
                .or_insert_with(|| CoinScore::new(Coin::new(adaptation.target.as_str()), adaptation.applied_at));
            score.force_status(
                crate::domain::CoinStatus::Blacklisted,
                Some(adaptation.reason.clone()),
                adaptation.applied_at,
            );
        }
        Unblacklist => {
            let score = state
                .coin_scores
                .entry(Coin::new(adaptation.target.as_str()))
                .or_insert_with(|| CoinScore::new(Coin::new(adaptation.target.as_str()), adaptation.applied_at));
            score.status_forced = false;
            score.blacklist_reason = None;
            score.recompute_status(5, 0.30, 0.45, 0.60, adaptation.applied_at);
        }
        Favor => {
            let score = state
                .coin_scores
                .entry(Coin::new(adaptation.target.as_str()))
                .or_insert_with(|| CoinScore::new(Coin::new(adaptation.target.as_str()), adaptation.applied_at));
            score.force_status(crate::domain::CoinStatus::Favored, None, adaptation.applied_at);
        }
        Reduce => {
            let score = state
                .coin_scores
                .entry(Coin::new(adaptation.target.as_str()))
                .or_insert_with(|| CoinScore::new(Coin::new(adaptation.target.as_str()), adaptation.applied_at));
            score.force_status(crate::domain::CoinStatus::Reduced, None, adaptation.applied_at);
        }
        DeactivatePattern => {
            if let Some(pattern) = state.patterns.get_mut(&adaptation.target) {
                pattern.is_active = false;
            }
        }
        CreateRule => {
            let target = if adaptation.target.eq_ignore_ascii_case("GLOBAL") {
                None
            } else {
                Some(Coin::new(adaptation.target.as_str()))
            };
            let action = parse_regime_action(&adaptation.reason);
            let rule_id = format!("rule-{}", adaptation.id);
            let rule = RegimeRule::new(rule_id, serde_json::json!({ "reason": adaptation.reason }), action, target);
            state.rules.insert(rule.rule_id.clone(), rule);
        }
        AdjustParams => {
            error!("adaptation kind {:?} has no direct knowledge mutation defined", adaptation.kind);
        }
    }
    Ok(())
}

/// Recovers the intended [`RegimeAction`] from an adaptation's reason text.
/// Reasoning-service output is free text, not a typed enum, so this is a
/// best-effort keyword match; an unrecognized reason falls back to
/// `ReduceSize` rather than `Skip`, since a misread rule should cost size,
/// not silently veto trading a whole coin.
fn parse_regime_action(reason: &str) -> RegimeAction {
    let lower = reason.to_lowercase();
    if lower.contains("skip") {
        RegimeAction::Skip
    } else if lower.contains("favor") {
        RegimeAction::Favor
    } else {
        RegimeAction::ReduceSize
    }
}
