//! Request orchestration: contest lookup, weather resolution, features, votes,
//! ensemble. Batch flows predict contests concurrently and isolate failures.

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::db::models::Contest;
use crate::db::{ContestRows, Database};
use crate::error::{PredictError, Result};

use super::classifier::{FeatureImportance, ModelInfo, TOP_FEATURES};
use super::ensemble::{EnsemblePredictor, EnsembleResult};
use super::evaluation::{self, BacktestReport, LAST_REGULAR_WEEK};
use super::features::{FeatureEngineer, FeatureVector};
use super::parlay::{self, ParlaySelection};
use super::weather::WeatherCache;

/// Scheduled contests returned by the upcoming listing.
const UPCOMING_LIMIT: i64 = 32;

#[derive(Debug, Clone, Serialize)]
pub struct BatchPredictions {
    pub predictions: Vec<EnsembleResult>,
    /// `(contest_id, reason)` for every contest that could not be predicted
    pub failures: Vec<(i64, String)>,
}

#[derive(Clone)]
pub struct PredictionService {
    db: Database,
    engineer: FeatureEngineer,
    ensemble: EnsemblePredictor,
    weather: WeatherCache,
    default_parlay_selections: usize,
}

impl PredictionService {
    pub fn new(
        db: Database,
        engineer: FeatureEngineer,
        ensemble: EnsemblePredictor,
        weather: WeatherCache,
        default_parlay_selections: usize,
    ) -> Self {
        PredictionService {
            db,
            engineer,
            ensemble,
            weather,
            default_parlay_selections,
        }
    }

    pub fn models(&self) -> Vec<ModelInfo> {
        self.ensemble.registry().describe()
    }

    pub fn feature_importance(&self) -> Vec<FeatureImportance> {
        self.ensemble.registry().feature_importance(TOP_FEATURES)
    }

    fn load(&self, id: i64) -> Result<Contest> {
        self.db
            .get_contest(id)?
            .ok_or(PredictError::ContestNotFound(id))
    }

    /// Fill in weather from the cache when the contest carries none.
    async fn resolve_weather(&self, contest: &mut Contest) {
        if contest.weather.is_some() || contest.venue.indoor {
            return;
        }
        if let Some(city) = contest.venue.city.as_deref() {
            contest.weather = self.weather.lookup(city).await;
            if contest.weather.is_some() {
                debug!("Using cached weather for {} ({})", contest.matchup(), city);
            }
        }
    }

    /// Predict from stored state only.
    fn predict_stored(&self, contest: &Contest) -> EnsembleResult {
        let ctx = self.engineer.gather(contest, &self.db);
        let features = ctx.to_vector();
        let votes = self.ensemble.collect_votes(&features);
        self.ensemble.predict(contest, &ctx, votes)
    }

    async fn predict_loaded(&self, mut contest: Contest) -> EnsembleResult {
        self.resolve_weather(&mut contest).await;
        self.predict_stored(&contest)
    }

    pub async fn predict_contest(&self, id: i64) -> Result<EnsembleResult> {
        let contest = self.load(id)?;
        let result = self.predict_loaded(contest).await;
        info!(
            "Predicted contest {}: {} ({:.1}% confidence{})",
            id,
            result.predicted_winner,
            result.confidence * 100.0,
            if result.fallback { ", fallback" } else { "" }
        );
        Ok(result)
    }

    /// The feature vector the ensemble would see for this contest.
    pub async fn features_for(&self, id: i64) -> Result<FeatureVector> {
        let mut contest = self.load(id)?;
        self.resolve_weather(&mut contest).await;
        Ok(self.engineer.extract(&contest, &self.db))
    }

    pub async fn weekly(&self, season: i32, week: i32) -> Result<BatchPredictions> {
        let rows = self.db.list_week_contests(season, week)?;
        info!("Predicting {} contest(s) for {} week {}", rows.contests.len(), season, week);
        Ok(self.predict_batch(rows).await)
    }

    pub async fn upcoming(&self) -> Result<BatchPredictions> {
        self.upcoming_from(Utc::now()).await
    }

    pub async fn upcoming_from(&self, now: DateTime<Utc>) -> Result<BatchPredictions> {
        let rows = self.db.list_upcoming_contests(now, UPCOMING_LIMIT)?;
        Ok(self.predict_batch(rows).await)
    }

    async fn predict_batch(&self, rows: ContestRows) -> BatchPredictions {
        let predictions = join_all(rows.contests.into_iter().map(|c| self.predict_loaded(c))).await;
        BatchPredictions {
            predictions,
            failures: rows.unreadable,
        }
    }

    /// Replay the ensemble over completed contests of a season. Only stored
    /// weather is used; current conditions say nothing about past games.
    pub async fn backtest(
        &self,
        season: i32,
        week_start: Option<i32>,
        week_end: Option<i32>,
    ) -> Result<BacktestReport> {
        let start = week_start.unwrap_or(1);
        let end = week_end.unwrap_or(LAST_REGULAR_WEEK);
        let rows = self.db.list_final_contests(season, start, end)?;

        let mut skipped = rows.unreadable;
        let mut outcomes = Vec::with_capacity(rows.contests.len());
        for contest in &rows.contests {
            match evaluation::actual_winner(contest) {
                Some(actual) => outcomes.push((self.predict_stored(contest), actual)),
                None => skipped.push((contest.id, "final score missing".to_string())),
            }
        }

        let report = BacktestReport::from_outcomes(season, start, end, &outcomes, skipped);
        info!(
            "Backtest {} weeks {}-{}: {} game(s), accuracy {}",
            season,
            start,
            end,
            report.games,
            report
                .accuracy
                .map(|a| format!("{:.1}%", a * 100.0))
                .unwrap_or_else(|| "n/a".to_string())
        );
        Ok(report)
    }

    /// Predict every requested contest concurrently; ids that fail are skipped.
    pub async fn predict_ids(&self, ids: &[i64]) -> BatchPredictions {
        let outcomes = join_all(ids.iter().map(|&id| async move {
            (id, self.predict_contest(id).await)
        }))
        .await;

        let mut batch = BatchPredictions {
            predictions: Vec::with_capacity(ids.len()),
            failures: Vec::new(),
        };
        for (id, outcome) in outcomes {
            match outcome {
                Ok(result) => batch.predictions.push(result),
                Err(e) => {
                    warn!("Skipping contest {}: {}", id, e);
                    batch.failures.push((id, e.to_string()));
                }
            }
        }
        batch
    }

    pub async fn optimize_parlay(
        &self,
        ids: &[i64],
        max_selections: Option<usize>,
        target_odds: Option<f64>,
    ) -> ParlaySelection {
        let batch = self.predict_ids(ids).await;
        let max = max_selections.unwrap_or(self.default_parlay_selections);
        let mut selection = parlay::optimize(batch.predictions, max, target_odds);
        selection.skipped = batch.failures;
        info!(
            "Parlay: {} pick(s) from {} requested, combined confidence {:.3}",
            selection.num_picks,
            ids.len(),
            selection.combined_confidence
        );
        selection
    }
}
