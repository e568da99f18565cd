use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// One scheduled matchup between two teams
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contest {
    pub id: i64,
    pub season: i32,
    /// Regular-season week (1–18); playoff rounds continue the count
    pub week: Option<i32>,
    pub home: TeamRef,
    pub away: TeamRef,
    pub scheduled_at: DateTime<Utc>,
    pub venue: Venue,
    pub status: ContestStatus,
    /// Posted spread from the home perspective (negative = home favored)
    pub spread: Option<f64>,
    pub over_under: Option<f64>,
    pub home_score: Option<i32>,
    pub away_score: Option<i32>,
    pub weather: Option<WeatherSnapshot>,
}

impl Contest {
    pub fn game_date(&self) -> NaiveDate {
        self.scheduled_at.date_naive()
    }

    pub fn matchup(&self) -> String {
        format!("{} @ {}", self.away.name, self.home.name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamRef {
    pub id: i64,
    pub name: String,
    pub abbreviation: Option<String>,
    /// e.g. "AFC West"
    pub division: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Venue {
    pub name: Option<String>,
    pub city: Option<String>,
    /// Offset of the venue's local time from UTC, in minutes
    pub utc_offset_minutes: Option<i32>,
    pub indoor: bool,
}

/// "scheduled" | "in_progress" | "final" | "postponed" | "canceled"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContestStatus {
    Scheduled,
    InProgress,
    Final,
    Postponed,
    Canceled,
}

impl ContestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContestStatus::Scheduled => "scheduled",
            ContestStatus::InProgress => "in_progress",
            ContestStatus::Final => "final",
            ContestStatus::Postponed => "postponed",
            ContestStatus::Canceled => "canceled",
        }
    }

    /// Unknown values read back as `Scheduled`.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "in_progress" | "in progress" | "live" => ContestStatus::InProgress,
            "final" | "finished" | "ft" => ContestStatus::Final,
            "postponed" => ContestStatus::Postponed,
            "canceled" | "cancelled" => ContestStatus::Canceled,
            _ => ContestStatus::Scheduled,
        }
    }
}

/// Weather conditions at (or forecast for) a venue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherSnapshot {
    /// Degrees Fahrenheit
    pub temperature: Option<f64>,
    /// Miles per hour
    pub wind_speed: Option<f64>,
    pub conditions: String,
}

const PRECIPITATION_KEYWORDS: [&str; 4] = ["rain", "snow", "storm", "shower"];

impl WeatherSnapshot {
    pub fn precipitation(&self) -> bool {
        let c = self.conditions.to_lowercase();
        PRECIPITATION_KEYWORDS.iter().any(|k| c.contains(k))
    }

    /// True when a numeric weather signal (temperature or wind) is present.
    pub fn has_signal(&self) -> bool {
        self.temperature.is_some() || self.wind_speed.is_some()
    }
}

/// A completed game seen from one team's perspective
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GameResult {
    pub points_for: i32,
    pub points_against: i32,
}

/// Cumulative season stats row for a team (latest week wins)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TeamStatsRow {
    pub total_yards: Option<f64>,
    pub turnovers: Option<f64>,
}

/// Injury counts for one team in one season
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InjuryCounts {
    /// Out / IR / Inactive
    pub severe: u32,
    /// Doubtful / Questionable
    pub borderline: u32,
}
