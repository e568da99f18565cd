//! Backtest scoring: replay predictions over completed contests and measure
//! how often the pick was right, overall, per model and per confidence band.

use serde::Serialize;

use crate::db::models::Contest;

use super::ensemble::{EnsembleResult, Side};

/// Default last week of a backtest window.
pub const LAST_REGULAR_WEEK: i32 = 18;

/// `[low, high)` confidence bands; the top band includes 1.0.
pub const CONFIDENCE_BUCKETS: [(f64, f64); 5] =
    [(0.5, 0.6), (0.6, 0.7), (0.7, 0.8), (0.8, 0.9), (0.9, 1.0)];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelAccuracy {
    pub model: String,
    pub games: usize,
    pub correct: usize,
    pub accuracy: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfidenceBucket {
    pub low: f64,
    pub high: f64,
    pub games: usize,
    pub correct: usize,
    pub accuracy: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BacktestReport {
    pub season: i32,
    pub week_start: i32,
    pub week_end: i32,
    pub games: usize,
    pub correct: usize,
    pub accuracy: Option<f64>,
    /// Mean squared error of the implied home-win probability
    pub brier: Option<f64>,
    pub fallback_games: usize,
    pub by_model: Vec<ModelAccuracy>,
    pub by_confidence: Vec<ConfidenceBucket>,
    pub skipped: Vec<(i64, String)>,
}

/// Home wins only by outscoring the away side; a tie counts against home.
pub fn actual_winner(contest: &Contest) -> Option<Side> {
    match (contest.home_score, contest.away_score) {
        (Some(h), Some(a)) if h > a => Some(Side::Home),
        (Some(_), Some(_)) => Some(Side::Away),
        _ => None,
    }
}

fn ratio(correct: usize, games: usize) -> Option<f64> {
    if games == 0 {
        None
    } else {
        Some(correct as f64 / games as f64)
    }
}

fn in_bucket(confidence: f64, (low, high): (f64, f64)) -> bool {
    confidence >= low && (confidence < high || (high >= 1.0 && confidence <= 1.0))
}

fn implied_home_probability(result: &EnsembleResult) -> f64 {
    match result.predicted_side {
        Side::Home => result.confidence,
        Side::Away => 1.0 - result.confidence,
    }
}

impl BacktestReport {
    pub fn from_outcomes(
        season: i32,
        week_start: i32,
        week_end: i32,
        outcomes: &[(EnsembleResult, Side)],
        skipped: Vec<(i64, String)>,
    ) -> Self {
        let games = outcomes.len();
        let correct = outcomes
            .iter()
            .filter(|(r, actual)| r.predicted_side == *actual)
            .count();

        let brier = if games == 0 {
            None
        } else {
            let sum: f64 = outcomes
                .iter()
                .map(|(r, actual)| {
                    let y = if *actual == Side::Home { 1.0 } else { 0.0 };
                    (implied_home_probability(r) - y).powi(2)
                })
                .sum();
            Some(sum / games as f64)
        };

        // first-seen model order
        let mut by_model: Vec<ModelAccuracy> = Vec::new();
        for (result, actual) in outcomes {
            for vote in &result.model_breakdown {
                let idx = match by_model.iter().position(|m| m.model == vote.model) {
                    Some(i) => i,
                    None => {
                        by_model.push(ModelAccuracy {
                            model: vote.model.clone(),
                            games: 0,
                            correct: 0,
                            accuracy: None,
                        });
                        by_model.len() - 1
                    }
                };
                let entry = &mut by_model[idx];
                entry.games += 1;
                if vote.side == *actual {
                    entry.correct += 1;
                }
            }
        }
        for m in &mut by_model {
            m.accuracy = ratio(m.correct, m.games);
        }

        let by_confidence = CONFIDENCE_BUCKETS
            .iter()
            .map(|&(low, high)| {
                let members: Vec<_> = outcomes
                    .iter()
                    .filter(|(r, _)| in_bucket(r.confidence, (low, high)))
                    .collect();
                let correct = members
                    .iter()
                    .filter(|(r, actual)| r.predicted_side == *actual)
                    .count();
                ConfidenceBucket {
                    low,
                    high,
                    games: members.len(),
                    correct,
                    accuracy: ratio(correct, members.len()),
                }
            })
            .collect();

        BacktestReport {
            season,
            week_start,
            week_end,
            games,
            correct,
            accuracy: ratio(correct, games),
            brier,
            fallback_games: outcomes.iter().filter(|(r, _)| r.fallback).count(),
            by_model,
            by_confidence,
            skipped,
        }
    }
}
