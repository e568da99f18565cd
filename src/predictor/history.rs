//! Derived per-request summaries over a team's history and the read-only
//! accessor contract that produces them.
//!
//! Every summary carries explicit `Option`s (or a meeting count) so absence is
//! visible to the feature assembler, which applies the neutral defaults in one
//! place instead of sprinkling them through the queries.

use anyhow::Result;
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::HashMap;

use crate::db::models::{GameResult, InjuryCounts, TeamStatsRow};

/// Games in the recent-form window.
pub const RECENT_FORM_WINDOW: usize = 5;
/// Prior meetings in the head-to-head window.
pub const HEAD_TO_HEAD_WINDOW: usize = 10;

const YARDS_PER_PLAY_FLOOR: f64 = 3.5;
const YARDS_PER_PLAY_DIVISOR: f64 = 60.0;
const TURNOVER_SCALE: f64 = 25.0;
const SEVERE_INJURY_WEIGHT: f64 = 0.2;
const BORDERLINE_INJURY_WEIGHT: f64 = 0.1;
const MAX_INJURY_IMPACT: f64 = 1.5;

/// Rolling-window summary of a team's last N completed games.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct TeamRecentForm {
    pub games: usize,
    pub win_pct: Option<f64>,
    pub avg_points_for: Option<f64>,
    pub avg_points_against: Option<f64>,
    pub yards_per_play: Option<f64>,
    pub turnover_norm: Option<f64>,
}

impl TeamRecentForm {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Summarise `games` (most recent first) plus an optional season stats row.
    pub fn from_games(games: &[GameResult], stats: Option<TeamStatsRow>) -> Self {
        if games.is_empty() {
            return Self::empty();
        }
        let n = games.len() as f64;
        let wins = games
            .iter()
            .filter(|g| g.points_for > g.points_against)
            .count() as f64;
        let pf: i32 = games.iter().map(|g| g.points_for).sum();
        let pa: i32 = games.iter().map(|g| g.points_against).sum();

        let yards_per_play = stats
            .and_then(|s| s.total_yards)
            .map(|y| (y / YARDS_PER_PLAY_DIVISOR).max(YARDS_PER_PLAY_FLOOR));
        let turnover_norm = stats
            .and_then(|s| s.turnovers)
            .map(|t| (1.0 - t / TURNOVER_SCALE).clamp(0.0, 1.0));

        TeamRecentForm {
            games: games.len(),
            win_pct: Some(wins / n),
            avg_points_for: Some(pf as f64 / n),
            avg_points_against: Some(pa as f64 / n),
            yards_per_play,
            turnover_norm,
        }
    }
}

/// Home-perspective record over prior meetings of the two teams.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HeadToHeadSummary {
    pub meetings: usize,
    pub home_win_pct: f64,
    pub avg_point_diff: f64,
}

impl HeadToHeadSummary {
    pub fn neutral() -> Self {
        HeadToHeadSummary {
            meetings: 0,
            home_win_pct: 0.5,
            avg_point_diff: 0.0,
        }
    }

    /// `meetings` are seen from the current home team's side.
    pub fn from_meetings(meetings: &[GameResult]) -> Self {
        if meetings.is_empty() {
            return Self::neutral();
        }
        let n = meetings.len() as f64;
        let wins = meetings
            .iter()
            .filter(|g| g.points_for > g.points_against)
            .count() as f64;
        let diff: i32 = meetings
            .iter()
            .map(|g| g.points_for - g.points_against)
            .sum();
        HeadToHeadSummary {
            meetings: meetings.len(),
            home_win_pct: wins / n,
            avg_point_diff: diff as f64 / n,
        }
    }
}

impl Default for HeadToHeadSummary {
    fn default() -> Self {
        Self::neutral()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct InjuryImpactSummary {
    pub severe: u32,
    pub borderline: u32,
}

impl InjuryImpactSummary {
    pub fn impact(&self) -> f64 {
        (self.severe as f64 * SEVERE_INJURY_WEIGHT
            + self.borderline as f64 * BORDERLINE_INJURY_WEIGHT)
            .min(MAX_INJURY_IMPACT)
    }

    /// Positive values favor the home side.
    pub fn differential(home: &InjuryImpactSummary, away: &InjuryImpactSummary) -> f64 {
        away.impact() - home.impact()
    }
}

impl From<InjuryCounts> for InjuryImpactSummary {
    fn from(c: InjuryCounts) -> Self {
        InjuryImpactSummary {
            severe: c.severe,
            borderline: c.borderline,
        }
    }
}

/// Read-only historical queries consumed by the feature pipeline.
///
/// Implementations return the neutral/empty value on empty results; errors are
/// reserved for storage failures and are downgraded to defaults by callers.
pub trait HistoricalDataAccessor: Send + Sync {
    /// Final games strictly before `before`, most recent first.
    fn recent_form(
        &self,
        team_id: i64,
        before: NaiveDate,
        limit: usize,
        season: Option<i32>,
        week: Option<i32>,
    ) -> Result<TeamRecentForm>;

    fn head_to_head(
        &self,
        home_id: i64,
        away_id: i64,
        before: NaiveDate,
        limit: usize,
    ) -> Result<HeadToHeadSummary>;

    fn injury_summary(
        &self,
        season: i32,
        team_ids: &[i64],
    ) -> Result<HashMap<i64, InjuryImpactSummary>>;

    /// Days since the team's previous game, `None` when it has none.
    fn rest_days(&self, team_id: i64, before: NaiveDate) -> Result<Option<i64>>;
}
