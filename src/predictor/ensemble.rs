//! Weighted-vote ensemble over the registered classifiers.
//!
//! Each classifier votes for the side it gives more than 50%, carrying its
//! registry weight. Home wins the consensus when the home-vote mass reaches
//! 0.5. Overall confidence is the plain mean of the voters' own confidences,
//! not the vote mass. With no usable votes the pick falls back to comparing
//! recent scoring averages.
//!
//! Score, spread and total are derived from recent scoring, shifted by the
//! injury differential and trimmed for weather.

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::db::models::{Contest, WeatherSnapshot};

use super::classifier::{check_distribution, ClassifierRegistry};
use super::features::{FeatureVector, MatchupContext, DEFAULT_AVG_POINTS};
use super::numerology::{self, NumerologyReport};

const DEFAULT_HOME_POINTS: f64 = 24.0;
const DEFAULT_AWAY_POINTS: f64 = 22.0;
const MIN_TEAM_POINTS: f64 = 10.0;
const MIN_TOTAL_POINTS: f64 = 34.0;
const PRECIPITATION_PENALTY: f64 = 2.5;
const WIND_PENALTY_THRESHOLD: f64 = 15.0;
const WIND_PENALTY_PER_MPH: f64 = 0.2;
const FALLBACK_HOME_CONFIDENCE: f64 = 0.56;
const FALLBACK_AWAY_CONFIDENCE: f64 = 0.52;
const INJURY_EDGE_THRESHOLD: f64 = 0.3;
const MAX_KEY_FACTORS: usize = 5;
const HOME_MASS_THRESHOLD: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Home,
    Away,
}

/// What to do with the weights of the surviving models when one fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Surviving models keep their registered weight (mass may sum below 1.0)
    #[default]
    KeepWeights,
    /// Rescale surviving weights to sum to 1.0
    Renormalize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelVote {
    pub model: String,
    pub side: Side,
    pub confidence: f64,
    pub p_home: f64,
    pub weight: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScorePrediction {
    pub home: f64,
    pub away: f64,
    pub spread: f64,
    pub total: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct EnsembleResult {
    pub contest_id: i64,
    pub season: i32,
    pub week: Option<i32>,
    pub home_team: String,
    pub away_team: String,
    pub predicted_side: Side,
    pub predicted_winner: String,
    pub predicted_score: ScorePrediction,
    pub confidence: f64,
    /// Sum of weights voting home; absent when the heuristic was used
    pub home_vote_mass: Option<f64>,
    pub fallback: bool,
    pub key_factors: Vec<String>,
    pub model_breakdown: Vec<ModelVote>,
    pub numerology: NumerologyReport,
}

#[derive(Clone)]
pub struct EnsemblePredictor {
    registry: Arc<ClassifierRegistry>,
    policy: FailurePolicy,
}

impl EnsemblePredictor {
    pub fn new(registry: Arc<ClassifierRegistry>, policy: FailurePolicy) -> Self {
        EnsemblePredictor { registry, policy }
    }

    pub fn registry(&self) -> &ClassifierRegistry {
        &self.registry
    }

    /// Run every registered classifier. Failing models are logged and dropped.
    pub fn collect_votes(&self, features: &FeatureVector) -> Vec<ModelVote> {
        let mut votes = Vec::with_capacity(self.registry.len());
        for entry in self.registry.iter() {
            let name = entry.model.name();
            let dist = entry
                .model
                .predict_probability(features)
                .and_then(|p| check_distribution(name, p));
            match dist {
                Ok([p_away, p_home]) => {
                    let side = if p_home > 0.5 { Side::Home } else { Side::Away };
                    votes.push(ModelVote {
                        model: name.to_string(),
                        side,
                        confidence: p_home.max(p_away),
                        p_home,
                        weight: entry.weight,
                    });
                }
                Err(e) => warn!("Dropping vote from {}: {}", name, e),
            }
        }

        let dropped = self.registry.len() - votes.len();
        if dropped > 0 && self.policy == FailurePolicy::Renormalize {
            let surviving: f64 = votes.iter().map(|v| v.weight).sum();
            if surviving > 0.0 {
                for v in &mut votes {
                    v.weight /= surviving;
                }
            }
        }
        votes
    }

    pub fn predict(
        &self,
        contest: &Contest,
        ctx: &MatchupContext,
        votes: Vec<ModelVote>,
    ) -> EnsembleResult {
        let (side, confidence, mass) = match consensus(&votes) {
            Some((side, confidence, mass)) => (side, confidence, Some(mass)),
            None => {
                let (side, confidence) = fallback_pick(ctx);
                debug!(
                    "No classifier votes for contest {}, heuristic picks {:?}",
                    contest.id, side
                );
                (side, confidence, None)
            }
        };

        let predicted_winner = match side {
            Side::Home => contest.home.name.clone(),
            Side::Away => contest.away.name.clone(),
        };

        EnsembleResult {
            contest_id: contest.id,
            season: contest.season,
            week: contest.week,
            home_team: contest.home.name.clone(),
            away_team: contest.away.name.clone(),
            predicted_side: side,
            predicted_winner,
            predicted_score: predict_scores(ctx),
            confidence,
            home_vote_mass: mass,
            fallback: mass.is_none(),
            key_factors: key_factors(contest, ctx),
            model_breakdown: votes,
            numerology: numerology::analyze(&contest.home.name, &contest.away.name),
        }
    }
}

/// `(side, mean confidence, home-vote mass)`, or `None` without votes.
pub fn consensus(votes: &[ModelVote]) -> Option<(Side, f64, f64)> {
    if votes.is_empty() {
        return None;
    }
    let mass: f64 = votes
        .iter()
        .filter(|v| v.side == Side::Home)
        .map(|v| v.weight)
        .sum();
    let side = if mass >= HOME_MASS_THRESHOLD {
        Side::Home
    } else {
        Side::Away
    };
    let confidence = votes.iter().map(|v| v.confidence).sum::<f64>() / votes.len() as f64;
    Some((side, confidence.clamp(0.0, 1.0), mass))
}

/// Higher recent scoring average wins; ties go home. Missing averages use the
/// same default the feature vector encodes.
pub fn fallback_pick(ctx: &MatchupContext) -> (Side, f64) {
    let home = ctx.home_form.avg_points_for.unwrap_or(DEFAULT_AVG_POINTS);
    let away = ctx.away_form.avg_points_for.unwrap_or(DEFAULT_AVG_POINTS);
    if home >= away {
        (Side::Home, FALLBACK_HOME_CONFIDENCE)
    } else {
        (Side::Away, FALLBACK_AWAY_CONFIDENCE)
    }
}

/// Points shaved off the total for precipitation and wind above 15 mph.
pub fn weather_penalty(weather: Option<&WeatherSnapshot>) -> f64 {
    let Some(w) = weather else {
        return 0.0;
    };
    let mut penalty = 0.0;
    if w.precipitation() {
        penalty += PRECIPITATION_PENALTY;
    }
    if let Some(wind) = w.wind_speed {
        if wind > WIND_PENALTY_THRESHOLD {
            penalty += (wind - WIND_PENALTY_THRESHOLD) * WIND_PENALTY_PER_MPH;
        }
    }
    penalty
}

fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

pub fn predict_scores(ctx: &MatchupContext) -> ScorePrediction {
    let injury = ctx.injury_differential();
    let home = (ctx.home_form.avg_points_for.unwrap_or(DEFAULT_HOME_POINTS) + injury)
        .max(MIN_TEAM_POINTS);
    let away = (ctx.away_form.avg_points_for.unwrap_or(DEFAULT_AWAY_POINTS) - injury)
        .max(MIN_TEAM_POINTS);

    let total = (home + away - weather_penalty(ctx.weather.as_ref())).max(MIN_TOTAL_POINTS);
    let spread = home - away;
    // away absorbs the weather adjustment so home + away == total
    let away = total - home;

    ScorePrediction {
        home: round1(home),
        away: round1(away),
        spread: round1(spread),
        total: round1(total),
    }
}

fn pct(x: f64) -> f64 {
    (x * 100.0).round()
}

pub fn key_factors(contest: &Contest, ctx: &MatchupContext) -> Vec<String> {
    let home = &contest.home.name;
    let away = &contest.away.name;
    let mut factors = Vec::with_capacity(MAX_KEY_FACTORS + 1);

    for (team, form) in [(home, &ctx.home_form), (away, &ctx.away_form)] {
        factors.push(match form.win_pct {
            Some(w) if form.games > 0 => format!(
                "{} won {:.0}% of their last {} games",
                team,
                pct(w),
                form.games
            ),
            _ => format!("{} has no recent completed games (treated as 50%)", team),
        });
    }

    let h2h = &ctx.head_to_head;
    if h2h.meetings > 0 {
        factors.push(format!(
            "{} won {:.0}% of the last {} meetings with {}",
            home,
            pct(h2h.home_win_pct),
            h2h.meetings,
            away
        ));
        factors.push(format!(
            "Average head-to-head margin: {:+.1} points for {}",
            h2h.avg_point_diff, home
        ));
    } else {
        factors.push(format!("No prior meetings between {} and {}", home, away));
        factors.push("Head-to-head margin: even (no history)".to_string());
    }

    if let Some(w) = ctx.weather.as_ref().filter(|w| w.has_signal()) {
        let mut parts = Vec::new();
        if !w.conditions.trim().is_empty() {
            parts.push(w.conditions.trim().to_string());
        }
        if let Some(t) = w.temperature {
            parts.push(format!("{:.0}°F", t));
        }
        if let Some(s) = w.wind_speed {
            parts.push(format!("wind {:.0} mph", s));
        }
        factors.push(format!("Weather: {}", parts.join(", ")));
    }

    let injury = ctx.injury_differential();
    if injury.abs() >= INJURY_EDGE_THRESHOLD {
        let favored = if injury > 0.0 { home } else { away };
        factors.push(format!(
            "Injury edge: {} (impact differential {:+.1})",
            favored, injury
        ));
    }

    factors.truncate(MAX_KEY_FACTORS);
    factors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predictor::classifier::tests::{BrokenVote, FixedVote};
    use crate::predictor::features::tests::make_contest;
    use crate::predictor::features::FEATURE_COUNT;
    use crate::predictor::history::{HeadToHeadSummary, InjuryImpactSummary, TeamRecentForm};
    use approx::assert_relative_eq;
    use std::collections::HashMap;

    fn form(avg_points_for: f64) -> TeamRecentForm {
        TeamRecentForm {
            games: 5,
            win_pct: Some(0.6),
            avg_points_for: Some(avg_points_for),
            avg_points_against: Some(20.0),
            yards_per_play: None,
            turnover_norm: None,
        }
    }

    fn vote(side: Side, weight: f64, confidence: f64) -> ModelVote {
        ModelVote {
            model: "m".into(),
            side,
            confidence,
            p_home: if side == Side::Home { confidence } else { 1.0 - confidence },
            weight,
        }
    }

    fn features() -> FeatureVector {
        FeatureVector([0.5; FEATURE_COUNT])
    }

    #[test]
    fn no_classifiers_falls_back_to_scoring_average() {
        let predictor = EnsemblePredictor::new(Arc::new(ClassifierRegistry::empty()), FailurePolicy::KeepWeights);
        let ctx = MatchupContext {
            home_form: form(30.0),
            away_form: form(20.0),
            ..Default::default()
        };
        let contest = make_contest(9);
        let votes = predictor.collect_votes(&ctx.to_vector());
        assert!(votes.is_empty());
        let result = predictor.predict(&contest, &ctx, votes);
        assert_eq!(result.predicted_side, Side::Home);
        assert_eq!(result.predicted_winner, "Kansas City Chiefs");
        assert_relative_eq!(result.confidence, 0.56, epsilon = 1e-12);
        assert!(result.fallback);
        assert!(result.home_vote_mass.is_none());
    }

    #[test]
    fn fallback_away_and_missing_data() {
        let ctx = MatchupContext {
            home_form: form(17.0),
            away_form: form(28.0),
            ..Default::default()
        };
        assert_eq!(fallback_pick(&ctx), (Side::Away, 0.52));
        // both sides default to 22, ties go home
        assert_eq!(fallback_pick(&MatchupContext::default()), (Side::Home, 0.56));
        // ties go home
        let tie = MatchupContext {
            home_form: form(21.0),
            away_form: form(21.0),
            ..Default::default()
        };
        assert_eq!(fallback_pick(&tie).0, Side::Home);
    }

    #[test]
    fn fallback_default_matches_encoded_points() {
        let ctx = MatchupContext {
            home_form: TeamRecentForm::empty(),
            away_form: form(23.0),
            ..Default::default()
        };
        let v = ctx.to_vector();
        assert_relative_eq!(v.0[10] * 40.0, 22.0, epsilon = 1e-9);
        assert_eq!(fallback_pick(&ctx), (Side::Away, 0.52));

        // score derivation keeps its own 24.0 home default
        let scores = predict_scores(&ctx);
        assert_relative_eq!(scores.home, 24.0, epsilon = 1e-9);
    }

    #[test]
    fn consensus_flips_at_half_mass() {
        let eps = 1e-9;
        let at = consensus(&[vote(Side::Home, 0.5, 0.6), vote(Side::Away, 0.5, 0.7)]).unwrap();
        assert_eq!(at.0, Side::Home);
        let below = consensus(&[
            vote(Side::Home, 0.5 - eps, 0.6),
            vote(Side::Away, 0.5 + eps, 0.7),
        ])
        .unwrap();
        assert_eq!(below.0, Side::Away);
        let above = consensus(&[
            vote(Side::Home, 0.5 + eps, 0.6),
            vote(Side::Away, 0.5 - eps, 0.7),
        ])
        .unwrap();
        assert_eq!(above.0, Side::Home);
        assert!(consensus(&[]).is_none());
    }

    #[test]
    fn registry_weights_drive_consensus() {
        let eps = 1e-6;
        let weights: HashMap<String, f64> =
            [("home_model".to_string(), 0.5 - eps), ("away_model".to_string(), 0.5 + eps)]
                .into_iter()
                .collect();
        let registry = ClassifierRegistry::with_weights(
            vec![FixedVote::arc("home_model", 0.9), FixedVote::arc("away_model", 0.2)],
            &weights,
        );
        let predictor = EnsemblePredictor::new(Arc::new(registry), FailurePolicy::KeepWeights);
        let votes = predictor.collect_votes(&features());
        let (side, confidence, mass) = consensus(&votes).unwrap();
        assert_eq!(side, Side::Away);
        assert_relative_eq!(mass, 0.5 - eps, epsilon = 1e-12);
        // confidence is the mean of per-model confidences (0.9, 0.8)
        assert_relative_eq!(confidence, 0.85, epsilon = 1e-12);
    }

    #[test]
    fn default_three_model_vote() {
        let registry = ClassifierRegistry::new(vec![
            FixedVote::arc("random_forest", 0.7),
            FixedVote::arc("xgboost", 0.4),
            FixedVote::arc("neural_net", 0.8),
        ]);
        let predictor = EnsemblePredictor::new(Arc::new(registry), FailurePolicy::KeepWeights);
        let result = predictor.predict(&make_contest(1), &MatchupContext::default(), predictor.collect_votes(&features()));
        // home mass = 0.35 + 0.25 = 0.60
        assert_eq!(result.predicted_side, Side::Home);
        assert_relative_eq!(result.home_vote_mass.unwrap(), 0.60, epsilon = 1e-9);
        assert_relative_eq!(result.confidence, (0.7 + 0.6 + 0.8) / 3.0, epsilon = 1e-9);
        assert_eq!(result.model_breakdown.len(), 3);
        assert!(!result.fallback);
    }

    #[test]
    fn failing_model_is_dropped_without_renormalizing() {
        let registry = Arc::new(ClassifierRegistry::new(vec![
            FixedVote::arc("random_forest", 0.7),
            Arc::new(BrokenVote("xgboost".into())),
            FixedVote::arc("neural_net", 0.3),
        ]));
        let keep = EnsemblePredictor::new(registry.clone(), FailurePolicy::KeepWeights);
        let votes = keep.collect_votes(&features());
        assert_eq!(votes.len(), 2);
        let (side, _, mass) = consensus(&votes).unwrap();
        // 0.35 home mass out of 0.60 surviving: under-weighted, goes away
        assert_relative_eq!(mass, 0.35, epsilon = 1e-9);
        assert_eq!(side, Side::Away);

        let renorm = EnsemblePredictor::new(registry, FailurePolicy::Renormalize);
        let votes = renorm.collect_votes(&features());
        let total: f64 = votes.iter().map(|v| v.weight).sum();
        assert_relative_eq!(total, 1.0, epsilon = 1e-9);
        let (side, _, mass) = consensus(&votes).unwrap();
        assert_relative_eq!(mass, 0.35 / 0.60, epsilon = 1e-9);
        assert_eq!(side, Side::Home);
    }

    #[test]
    fn all_models_failing_uses_heuristic() {
        let registry = ClassifierRegistry::new(vec![Arc::new(BrokenVote("xgboost".into()))]);
        let predictor = EnsemblePredictor::new(Arc::new(registry), FailurePolicy::Renormalize);
        let result = predictor.predict(&make_contest(1), &MatchupContext::default(), predictor.collect_votes(&features()));
        assert!(result.fallback);
        assert_relative_eq!(result.confidence, 0.56, epsilon = 1e-12);
    }

    #[test]
    fn weather_penalty_values() {
        let storm = WeatherSnapshot {
            temperature: Some(40.0),
            wind_speed: Some(25.0),
            conditions: "Rain".into(),
        };
        assert_relative_eq!(weather_penalty(Some(&storm)), 4.5, epsilon = 1e-9);
        let calm = WeatherSnapshot {
            temperature: Some(70.0),
            wind_speed: Some(15.0),
            conditions: "Clear".into(),
        };
        assert_relative_eq!(weather_penalty(Some(&calm)), 0.0, epsilon = 1e-9);
        assert_relative_eq!(weather_penalty(None), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn scores_apply_injuries_and_weather() {
        let ctx = MatchupContext {
            home_form: form(27.0),
            away_form: form(20.0),
            home_injuries: InjuryImpactSummary { severe: 0, borderline: 0 },
            away_injuries: InjuryImpactSummary { severe: 2, borderline: 1 },
            weather: Some(WeatherSnapshot {
                temperature: Some(35.0),
                wind_speed: Some(25.0),
                conditions: "Snow showers".into(),
            }),
            ..Default::default()
        };
        let s = predict_scores(&ctx);
        // home 27.5, away 19.5, total 47 - 4.5 = 42.5
        assert_relative_eq!(s.home, 27.5, epsilon = 1e-9);
        assert_relative_eq!(s.spread, 8.0, epsilon = 1e-9);
        assert_relative_eq!(s.total, 42.5, epsilon = 1e-9);
        assert_relative_eq!(s.away, 15.0, epsilon = 1e-9);
        assert_relative_eq!(s.home + s.away, s.total, epsilon = 1e-9);
    }

    #[test]
    fn total_is_floored() {
        let ctx = MatchupContext {
            home_form: form(10.0),
            away_form: form(12.0),
            weather: Some(WeatherSnapshot {
                temperature: None,
                wind_speed: Some(40.0),
                conditions: "Thunderstorm".into(),
            }),
            ..Default::default()
        };
        let s = predict_scores(&ctx);
        assert_relative_eq!(s.total, 34.0, epsilon = 1e-9);
        assert_relative_eq!(s.home, 10.0, epsilon = 1e-9);
        assert_relative_eq!(s.away, 24.0, epsilon = 1e-9);
        assert_relative_eq!(s.spread, -2.0, epsilon = 1e-9);
    }

    #[test]
    fn scores_default_without_history() {
        let s = predict_scores(&MatchupContext::default());
        assert_relative_eq!(s.home, 24.0, epsilon = 1e-9);
        assert_relative_eq!(s.away, 22.0, epsilon = 1e-9);
        assert_relative_eq!(s.spread, 2.0, epsilon = 1e-9);
        assert_relative_eq!(s.total, 46.0, epsilon = 1e-9);
    }

    #[test]
    fn key_factor_order_and_limits() {
        let contest = make_contest(1);
        let base = MatchupContext {
            home_form: form(24.0),
            away_form: TeamRecentForm::empty(),
            head_to_head: HeadToHeadSummary {
                meetings: 4,
                home_win_pct: 0.75,
                avg_point_diff: 6.5,
            },
            ..Default::default()
        };
        let factors = key_factors(&contest, &base);
        assert_eq!(factors.len(), 4);
        assert!(factors[0].starts_with("Kansas City Chiefs won 60%"));
        assert!(factors[1].starts_with("Buffalo Bills has no recent"));
        assert!(factors[2].contains("75% of the last 4 meetings"));
        assert!(factors[3].contains("+6.5"));

        let injured = MatchupContext {
            home_injuries: InjuryImpactSummary { severe: 3, borderline: 0 },
            ..base.clone()
        };
        let factors = key_factors(&contest, &injured);
        assert_eq!(factors.len(), 5);
        assert!(factors[4].starts_with("Injury edge: Buffalo Bills"));

        let everything = MatchupContext {
            weather: Some(WeatherSnapshot {
                temperature: Some(28.0),
                wind_speed: None,
                conditions: "Snow".into(),
            }),
            ..injured
        };
        let factors = key_factors(&contest, &everything);
        assert_eq!(factors.len(), 5);
        assert_eq!(factors[4], "Weather: Snow, 28°F");
        assert_eq!(factors, key_factors(&contest, &everything));
    }

    #[test]
    fn weather_without_numbers_is_not_a_factor() {
        let ctx = MatchupContext {
            weather: Some(WeatherSnapshot {
                temperature: None,
                wind_speed: None,
                conditions: "Dome".into(),
            }),
            ..Default::default()
        };
        let factors = key_factors(&make_contest(1), &ctx);
        assert!(factors.iter().all(|f| !f.starts_with("Weather")));
    }

    #[test]
    fn numerology_does_not_change_pick() {
        let predictor = EnsemblePredictor::new(Arc::new(ClassifierRegistry::empty()), FailurePolicy::KeepWeights);
        let ctx = MatchupContext::default();
        let mut contest = make_contest(1);
        let a = predictor.predict(&contest, &ctx, vec![]);
        contest.home.name = "Zzzzzz".into();
        let b = predictor.predict(&contest, &ctx, vec![]);
        assert_eq!(a.predicted_side, b.predicted_side);
        assert_relative_eq!(a.confidence, b.confidence, epsilon = 1e-12);
    }
}
