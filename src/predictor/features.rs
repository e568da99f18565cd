//! Feature engineering: contest + historical context → fixed 25-slot vector.
//!
//! Gathering and assembly are split. [`FeatureEngineer::gather`] asks the
//! accessor for every summary and keeps absences explicit in a
//! [`MatchupContext`]; [`MatchupContext::to_vector`] is the single place where
//! neutral defaults are applied. A storage error on any one signal is logged
//! and treated as a missing signal, so a vector can always be built for a
//! contest that has nothing but team references.

use chrono::{Duration, Timelike};
use serde::Serialize;
use tracing::{debug, warn};

use crate::db::models::{Contest, WeatherSnapshot};

use super::history::{
    HeadToHeadSummary, HistoricalDataAccessor, InjuryImpactSummary, TeamRecentForm,
    HEAD_TO_HEAD_WINDOW, RECENT_FORM_WINDOW,
};

pub const FEATURE_COUNT: usize = 25;

pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "home_off_rating",
    "away_off_rating",
    "home_def_rating",
    "away_def_rating",
    "home_ypp",
    "away_ypp",
    "home_turnover_diff",
    "away_turnover_diff",
    "home_win_pct_l5",
    "away_win_pct_l5",
    "home_avg_pts_scored",
    "away_avg_pts_scored",
    "home_avg_pts_allowed",
    "away_avg_pts_allowed",
    "h2h_home_win_rate",
    "h2h_avg_diff",
    "week_normalized",
    "is_divisional",
    "is_late_kickoff",
    "temperature",
    "wind_speed",
    "precipitation",
    "injury_impact",
    "rest_days",
    "is_home",
];

/// Documented (min, max) of every slot. Unbounded sides use infinity.
pub const FEATURE_RANGES: [(f64, f64); FEATURE_COUNT] = [
    (0.0, 1.0),
    (0.0, 1.0),
    (0.0, 1.0),
    (0.0, 1.0),
    (0.0, 1.0),
    (0.0, 1.0),
    (0.0, 1.0),
    (0.0, 1.0),
    (0.0, 1.0),
    (0.0, 1.0),
    (0.0, 1.0),
    (0.0, 1.0),
    (0.0, 1.0),
    (0.0, 1.0),
    (0.0, 1.0),
    (f64::NEG_INFINITY, f64::INFINITY),
    (0.0, f64::INFINITY),
    (0.0, 1.0),
    (0.0, 1.0),
    (-1.0, 1.0),
    (0.0, 1.5),
    (0.0, 1.0),
    (-1.5, 1.5),
    (3.0, f64::INFINITY),
    (1.0, 1.0),
];

const OFFENSE_SCALE: f64 = 40.0;
const DEFENSE_SCALE: f64 = 35.0;
const YARDS_PER_PLAY_SCALE: f64 = 8.0;
const DEFAULT_YARDS_PER_PLAY: f64 = 5.5;
const POINTS_SCALE: f64 = 40.0;
/// Recent points for/against assumed for a team without completed games.
pub const DEFAULT_AVG_POINTS: f64 = 22.0;
const H2H_DIFF_SCALE: f64 = 20.0;
const REGULAR_SEASON_WEEKS: f64 = 18.0;
const LATE_KICKOFF_HOUR: u32 = 19;
const MIN_REST_DAYS: i64 = 3;
const DEFAULT_REST_DAYS: f64 = 7.0;
const NEUTRAL: f64 = 0.5;

/// Ordered model input. Length is fixed by the type.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FeatureVector(pub [f64; FEATURE_COUNT]);

impl FeatureVector {
    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn named(&self) -> Vec<(&'static str, f64)> {
        FEATURE_NAMES.iter().copied().zip(self.0.iter().copied()).collect()
    }
}

/// Everything the vector and the ensemble's score/key-factor logic need,
/// with absences kept explicit.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MatchupContext {
    pub home_form: TeamRecentForm,
    pub away_form: TeamRecentForm,
    pub head_to_head: HeadToHeadSummary,
    pub home_injuries: InjuryImpactSummary,
    pub away_injuries: InjuryImpactSummary,
    /// Home team's days since its previous game
    pub rest_days: Option<i64>,
    pub week: Option<i32>,
    pub divisional: bool,
    pub late_kickoff: bool,
    pub weather: Option<WeatherSnapshot>,
}

impl MatchupContext {
    pub fn injury_differential(&self) -> f64 {
        InjuryImpactSummary::differential(&self.home_injuries, &self.away_injuries)
    }

    pub fn to_vector(&self) -> FeatureVector {
        let h = &self.home_form;
        let a = &self.away_form;

        let (temp, wind, precip) = encode_weather(self.weather.as_ref());
        let rest = self
            .rest_days
            .map(|d| d.max(MIN_REST_DAYS) as f64)
            .unwrap_or(DEFAULT_REST_DAYS);

        FeatureVector([
            offense_rating(h.avg_points_for),
            offense_rating(a.avg_points_for),
            defense_rating(h.avg_points_against),
            defense_rating(a.avg_points_against),
            yards_per_play(h.yards_per_play),
            yards_per_play(a.yards_per_play),
            h.turnover_norm.unwrap_or(NEUTRAL).clamp(0.0, 1.0),
            a.turnover_norm.unwrap_or(NEUTRAL).clamp(0.0, 1.0),
            h.win_pct.unwrap_or(NEUTRAL),
            a.win_pct.unwrap_or(NEUTRAL),
            recent_points(h.avg_points_for),
            recent_points(a.avg_points_for),
            recent_points(h.avg_points_against),
            recent_points(a.avg_points_against),
            self.head_to_head.home_win_pct,
            self.head_to_head.avg_point_diff / H2H_DIFF_SCALE,
            self.week.unwrap_or(1).max(0) as f64 / REGULAR_SEASON_WEEKS,
            flag(self.divisional),
            flag(self.late_kickoff),
            temp,
            wind,
            precip,
            self.injury_differential(),
            rest,
            1.0,
        ])
    }
}

fn flag(b: bool) -> f64 {
    if b {
        1.0
    } else {
        0.0
    }
}

fn offense_rating(avg_points_for: Option<f64>) -> f64 {
    avg_points_for
        .map(|v| (v / OFFENSE_SCALE).clamp(0.0, 1.0))
        .unwrap_or(NEUTRAL)
}

fn defense_rating(avg_points_against: Option<f64>) -> f64 {
    avg_points_against
        .map(|v| (1.0 - v / DEFENSE_SCALE).clamp(0.0, 1.0))
        .unwrap_or(NEUTRAL)
}

fn yards_per_play(value: Option<f64>) -> f64 {
    (value.unwrap_or(DEFAULT_YARDS_PER_PLAY) / YARDS_PER_PLAY_SCALE).clamp(0.0, 1.0)
}

fn recent_points(value: Option<f64>) -> f64 {
    (value.unwrap_or(DEFAULT_AVG_POINTS) / POINTS_SCALE).clamp(0.0, 1.0)
}

/// `(temperature, wind, precipitation)`; zeros without a snapshot.
pub fn encode_weather(weather: Option<&WeatherSnapshot>) -> (f64, f64, f64) {
    let Some(w) = weather else {
        return (0.0, 0.0, 0.0);
    };
    let temp = w
        .temperature
        .map(|t| ((t - 32.0) / 50.0).clamp(-1.0, 1.0))
        .unwrap_or(0.0);
    let wind = w
        .wind_speed
        .map(|s| (s / 25.0).clamp(0.0, 1.5))
        .unwrap_or(0.0);
    (temp, wind, flag(w.precipitation()))
}

/// Local kickoff hour ≥ 19. Without a venue offset the stored hour is used.
pub fn is_late_kickoff(contest: &Contest) -> bool {
    let local = match contest.venue.utc_offset_minutes {
        Some(offset) => contest.scheduled_at + Duration::minutes(offset as i64),
        None => contest.scheduled_at,
    };
    local.hour() >= LATE_KICKOFF_HOUR
}

pub fn is_divisional(contest: &Contest) -> bool {
    match (&contest.home.division, &contest.away.division) {
        (Some(h), Some(a)) => !h.is_empty() && h.eq_ignore_ascii_case(a),
        _ => false,
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FeatureEngineer {
    recent_window: usize,
    head_to_head_window: usize,
}

impl Default for FeatureEngineer {
    fn default() -> Self {
        FeatureEngineer {
            recent_window: RECENT_FORM_WINDOW,
            head_to_head_window: HEAD_TO_HEAD_WINDOW,
        }
    }
}

impl FeatureEngineer {
    pub fn new(recent_window: usize, head_to_head_window: usize) -> Self {
        FeatureEngineer {
            recent_window: recent_window.max(1),
            head_to_head_window: head_to_head_window.max(1),
        }
    }

    pub fn extract(&self, contest: &Contest, accessor: &dyn HistoricalDataAccessor) -> FeatureVector {
        self.gather(contest, accessor).to_vector()
    }

    pub fn gather(&self, contest: &Contest, accessor: &dyn HistoricalDataAccessor) -> MatchupContext {
        let before = contest.game_date();
        let home_id = contest.home.id;
        let away_id = contest.away.id;

        let form = |team_id: i64| {
            accessor
                .recent_form(
                    team_id,
                    before,
                    self.recent_window,
                    Some(contest.season),
                    contest.week,
                )
                .unwrap_or_else(|e| {
                    warn!(
                        "Recent form unavailable for team {} (contest {}): {}",
                        team_id, contest.id, e
                    );
                    TeamRecentForm::empty()
                })
        };
        let home_form = form(home_id);
        let away_form = form(away_id);

        let head_to_head = accessor
            .head_to_head(home_id, away_id, before, self.head_to_head_window)
            .unwrap_or_else(|e| {
                warn!("Head-to-head unavailable for contest {}: {}", contest.id, e);
                HeadToHeadSummary::neutral()
            });

        let (home_injuries, away_injuries) = match accessor
            .injury_summary(contest.season, &[home_id, away_id])
        {
            Ok(map) => (
                map.get(&home_id).copied().unwrap_or_default(),
                map.get(&away_id).copied().unwrap_or_default(),
            ),
            Err(e) => {
                warn!("Injury summary unavailable for contest {}: {}", contest.id, e);
                Default::default()
            }
        };

        let rest_days = accessor.rest_days(home_id, before).unwrap_or_else(|e| {
            warn!("Rest days unavailable for team {}: {}", home_id, e);
            None
        });

        debug!(
            "Gathered context for {}: form {}/{} games, {} h2h meetings",
            contest.matchup(),
            home_form.games,
            away_form.games,
            head_to_head.meetings
        );

        MatchupContext {
            home_form,
            away_form,
            head_to_head,
            home_injuries,
            away_injuries,
            rest_days,
            week: contest.week,
            divisional: is_divisional(contest),
            late_kickoff: is_late_kickoff(contest),
            weather: contest.weather.clone(),
        }
    }
}
