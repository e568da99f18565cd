use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::warn;

pub mod models;
use models::*;

use crate::predictor::history::{
    HeadToHeadSummary, HistoricalDataAccessor, InjuryImpactSummary, TeamRecentForm,
};
use crate::predictor::weather::WeatherSource;

/// Contests read for a batch, plus `(contest_id, reason)` for rows that
/// could not be mapped.
#[derive(Debug, Default)]
pub struct ContestRows {
    pub contests: Vec<Contest>,
    pub unreadable: Vec<(i64, String)>,
}

/// Thread-safe SQLite connection pool (single connection with mutex)
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) the SQLite database at the given path.
    /// `":memory:"` opens a private in-memory database.
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        let db = Database {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow::anyhow!("database mutex poisoned"))
    }

    /// Run schema migrations (idempotent)
    fn run_migrations(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(())
    }

    // ── Writes (used by ingestion tooling and tests) ─────────────────────────

    pub fn upsert_team(&self, team: &TeamRef) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO teams (id, name, abbreviation, division)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET
                name=excluded.name,
                abbreviation=excluded.abbreviation,
                division=excluded.division",
            params![team.id, team.name, team.abbreviation, team.division],
        )?;
        Ok(())
    }

    /// Insert or update a game. Teams must already exist.
    pub fn upsert_game(&self, c: &Contest) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO games (
                id, season, week, home_team_id, away_team_id, game_date,
                venue_name, venue_city, venue_utc_offset, indoor, status,
                spread, over_under, home_score, away_score,
                weather_temperature, weather_wind_speed, weather_conditions
             ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18)
             ON CONFLICT(id) DO UPDATE SET
                status=excluded.status,
                home_score=excluded.home_score,
                away_score=excluded.away_score,
                game_date=excluded.game_date,
                spread=excluded.spread,
                over_under=excluded.over_under,
                weather_temperature=excluded.weather_temperature,
                weather_wind_speed=excluded.weather_wind_speed,
                weather_conditions=excluded.weather_conditions",
            params![
                c.id,
                c.season,
                c.week,
                c.home.id,
                c.away.id,
                c.scheduled_at,
                c.venue.name,
                c.venue.city,
                c.venue.utc_offset_minutes,
                c.venue.indoor,
                c.status.as_str(),
                c.spread,
                c.over_under,
                c.home_score,
                c.away_score,
                c.weather.as_ref().and_then(|w| w.temperature),
                c.weather.as_ref().and_then(|w| w.wind_speed),
                c.weather.as_ref().map(|w| w.conditions.clone()),
            ],
        )?;
        Ok(())
    }

    pub fn upsert_team_stats(
        &self,
        team_id: i64,
        season: i32,
        week: Option<i32>,
        stats: &TeamStatsRow,
    ) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO team_stats (team_id, season, week, total_yards, turnovers)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![team_id, season, week, stats.total_yards, stats.turnovers],
        )?;
        Ok(())
    }

    pub fn insert_injury(&self, team_id: i64, season: i32, player: &str, status: &str) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO injuries (team_id, season, player_name, status) VALUES (?1, ?2, ?3, ?4)",
            params![team_id, season, player, status],
        )?;
        Ok(())
    }

    pub fn record_weather(
        &self,
        city: &str,
        snapshot: &WeatherSnapshot,
        observed_at: DateTime<Utc>,
    ) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO weather_reports (city, temperature, wind_speed, conditions, observed_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                city.trim().to_lowercase(),
                snapshot.temperature,
                snapshot.wind_speed,
                snapshot.conditions,
                observed_at
            ],
        )?;
        Ok(())
    }

    // ── Contests ──────────────────────────────────────────────────────────────

    pub fn get_contest(&self, id: i64) -> Result<Option<Contest>> {
        let conn = self.lock()?;
        let sql = format!("{} WHERE g.id = ?1", CONTEST_SELECT);
        let contest = conn
            .query_row(&sql, params![id], map_contest)
            .optional()?;
        Ok(contest)
    }

    pub fn list_week_contests(&self, season: i32, week: i32) -> Result<ContestRows> {
        let conn = self.lock()?;
        let sql = format!(
            "{} WHERE g.season = ?1 AND g.week = ?2 ORDER BY g.game_date, g.id",
            CONTEST_SELECT
        );
        let mut stmt = conn.prepare(&sql)?;
        collect_contests(&mut stmt, params![season, week])
    }

    /// Scheduled contests from `now` on, soonest first
    pub fn list_upcoming_contests(&self, now: DateTime<Utc>, limit: i64) -> Result<ContestRows> {
        let conn = self.lock()?;
        let sql = format!(
            "{} WHERE g.status = 'scheduled' AND g.game_date >= ?1
             ORDER BY g.game_date, g.id LIMIT ?2",
            CONTEST_SELECT
        );
        let mut stmt = conn.prepare(&sql)?;
        collect_contests(&mut stmt, params![now, limit])
    }

    /// Final contests with both scores recorded, in week order
    pub fn list_final_contests(&self, season: i32, week_start: i32, week_end: i32) -> Result<ContestRows> {
        let conn = self.lock()?;
        let sql = format!(
            "{} WHERE g.season = ?1 AND g.week BETWEEN ?2 AND ?3
               AND g.status = 'final'
               AND g.home_score IS NOT NULL AND g.away_score IS NOT NULL
             ORDER BY g.week, g.id",
            CONTEST_SELECT
        );
        let mut stmt = conn.prepare(&sql)?;
        collect_contests(&mut stmt, params![season, week_start, week_end])
    }

    // ── History queries ───────────────────────────────────────────────────────

    /// Final games of `team_id` strictly before `before`, most recent first,
    /// from the team's perspective.
    pub fn recent_results(&self, team_id: i64, before: NaiveDate, limit: usize) -> Result<Vec<GameResult>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT
                CASE WHEN home_team_id = ?1 THEN home_score ELSE away_score END,
                CASE WHEN home_team_id = ?1 THEN away_score ELSE home_score END
             FROM games
             WHERE (home_team_id = ?1 OR away_team_id = ?1)
               AND date(game_date) < date(?2)
               AND status = 'final'
             ORDER BY game_date DESC
             LIMIT ?3",
        )?;
        let rows = stmt
            .query_map(params![team_id, before, limit as i64], map_result)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Final meetings between the two teams before `before`, seen from `home_id`.
    pub fn meetings(&self, home_id: i64, away_id: i64, before: NaiveDate, limit: usize) -> Result<Vec<GameResult>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT
                CASE WHEN home_team_id = ?1 THEN home_score ELSE away_score END,
                CASE WHEN home_team_id = ?1 THEN away_score ELSE home_score END
             FROM games
             WHERE ((home_team_id = ?1 AND away_team_id = ?2)
                 OR (home_team_id = ?2 AND away_team_id = ?1))
               AND date(game_date) < date(?3)
               AND status = 'final'
             ORDER BY game_date DESC
             LIMIT ?4",
        )?;
        let rows = stmt
            .query_map(params![home_id, away_id, before, limit as i64], map_result)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Latest season stats row with week ≤ `week` (rows without a week always qualify)
    pub fn latest_team_stats(&self, team_id: i64, season: i32, week: Option<i32>) -> Result<Option<TeamStatsRow>> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT total_yards, turnovers FROM team_stats
                 WHERE team_id = ?1 AND season = ?2
                   AND (?3 IS NULL OR week IS NULL OR week <= ?3)
                 ORDER BY COALESCE(week, 0) DESC, id DESC
                 LIMIT 1",
                params![team_id, season, week],
                |row| {
                    Ok(TeamStatsRow {
                        total_yards: row.get(0)?,
                        turnovers: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    pub fn injury_counts(&self, season: i32, team_id: i64) -> Result<InjuryCounts> {
        let conn = self.lock()?;
        let (severe, borderline): (i64, i64) = conn.query_row(
            "SELECT
                COALESCE(SUM(CASE WHEN lower(status) IN ('out', 'ir', 'inactive') THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN lower(status) IN ('doubtful', 'questionable') THEN 1 ELSE 0 END), 0)
             FROM injuries WHERE season = ?1 AND team_id = ?2",
            params![season, team_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok(InjuryCounts {
            severe: severe.max(0) as u32,
            borderline: borderline.max(0) as u32,
        })
    }

    /// Date of the team's previous game (any status) before `before`
    pub fn previous_game_date(&self, team_id: i64, before: NaiveDate) -> Result<Option<DateTime<Utc>>> {
        let conn = self.lock()?;
        let prev = conn
            .query_row(
                "SELECT game_date FROM games
                 WHERE (home_team_id = ?1 OR away_team_id = ?1)
                   AND date(game_date) < date(?2)
                   AND status NOT IN ('postponed', 'canceled')
                 ORDER BY game_date DESC LIMIT 1",
                params![team_id, before],
                |row| row.get::<_, DateTime<Utc>>(0),
            )
            .optional()?;
        Ok(prev)
    }

    pub fn latest_weather(&self, city: &str) -> Result<Option<WeatherSnapshot>> {
        let conn = self.lock()?;
        let snapshot = conn
            .query_row(
                "SELECT temperature, wind_speed, conditions FROM weather_reports
                 WHERE city = ?1 ORDER BY observed_at DESC, id DESC LIMIT 1",
                params![city.trim().to_lowercase()],
                |row| {
                    Ok(WeatherSnapshot {
                        temperature: row.get(0)?,
                        wind_speed: row.get(1)?,
                        conditions: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                    })
                },
            )
            .optional()?;
        Ok(snapshot)
    }
}

impl HistoricalDataAccessor for Database {
    fn recent_form(
        &self,
        team_id: i64,
        before: NaiveDate,
        limit: usize,
        season: Option<i32>,
        week: Option<i32>,
    ) -> Result<TeamRecentForm> {
        let games = self.recent_results(team_id, before, limit)?;
        if games.is_empty() {
            return Ok(TeamRecentForm::empty());
        }
        let season = season.unwrap_or_else(|| chrono::Datelike::year(&before));
        let stats = self.latest_team_stats(team_id, season, week)?;
        Ok(TeamRecentForm::from_games(&games, stats))
    }

    fn head_to_head(
        &self,
        home_id: i64,
        away_id: i64,
        before: NaiveDate,
        limit: usize,
    ) -> Result<HeadToHeadSummary> {
        let meetings = self.meetings(home_id, away_id, before, limit)?;
        Ok(HeadToHeadSummary::from_meetings(&meetings))
    }

    fn injury_summary(
        &self,
        season: i32,
        team_ids: &[i64],
    ) -> Result<HashMap<i64, InjuryImpactSummary>> {
        let mut out = HashMap::with_capacity(team_ids.len());
        for &team_id in team_ids {
            out.insert(team_id, self.injury_counts(season, team_id)?.into());
        }
        Ok(out)
    }

    fn rest_days(&self, team_id: i64, before: NaiveDate) -> Result<Option<i64>> {
        Ok(self
            .previous_game_date(team_id, before)?
            .map(|prev| (before - prev.date_naive()).num_days()))
    }
}

#[async_trait]
impl WeatherSource for Database {
    async fn current_weather(&self, city: &str) -> Result<Option<WeatherSnapshot>> {
        self.latest_weather(city)
    }

    fn name(&self) -> &str {
        "weather_reports"
    }
}

// ── SQL helpers ────────────────────────────────────────────────────────────────

const CONTEST_SELECT: &str = "
SELECT g.id, g.season, g.week,
       h.id, h.name, h.abbreviation, h.division,
       a.id, a.name, a.abbreviation, a.division,
       g.game_date, g.venue_name, g.venue_city, g.venue_utc_offset, g.indoor,
       g.status, g.spread, g.over_under, g.home_score, g.away_score,
       g.weather_temperature, g.weather_wind_speed, g.weather_conditions
FROM games g
JOIN teams h ON h.id = g.home_team_id
JOIN teams a ON a.id = g.away_team_id";

fn map_contest(row: &rusqlite::Row) -> rusqlite::Result<Contest> {
    let temperature: Option<f64> = row.get(21)?;
    let wind_speed: Option<f64> = row.get(22)?;
    let conditions: Option<String> = row.get(23)?;
    let weather = if temperature.is_some() || wind_speed.is_some() || conditions.is_some() {
        Some(WeatherSnapshot {
            temperature,
            wind_speed,
            conditions: conditions.unwrap_or_default(),
        })
    } else {
        None
    };
    let status: String = row.get(16)?;

    Ok(Contest {
        id: row.get(0)?,
        season: row.get(1)?,
        week: row.get(2)?,
        home: TeamRef {
            id: row.get(3)?,
            name: row.get(4)?,
            abbreviation: row.get(5)?,
            division: row.get(6)?,
        },
        away: TeamRef {
            id: row.get(7)?,
            name: row.get(8)?,
            abbreviation: row.get(9)?,
            division: row.get(10)?,
        },
        scheduled_at: row.get(11)?,
        venue: Venue {
            name: row.get(12)?,
            city: row.get(13)?,
            utc_offset_minutes: row.get(14)?,
            indoor: row.get(15)?,
        },
        status: ContestStatus::parse(&status),
        spread: row.get(17)?,
        over_under: row.get(18)?,
        home_score: row.get(19)?,
        away_score: row.get(20)?,
        weather,
    })
}

/// Map contest rows one at a time so a single unreadable row doesn't sink
/// the whole listing.
fn collect_contests<P: rusqlite::Params>(stmt: &mut rusqlite::Statement<'_>, params: P) -> Result<ContestRows> {
    let mut rows = stmt.query(params)?;
    let mut out = ContestRows::default();
    while let Some(row) = rows.next()? {
        let id: i64 = row.get(0)?;
        match map_contest(row) {
            Ok(contest) => out.contests.push(contest),
            Err(e) => {
                warn!("Unreadable games row {}: {}", id, e);
                out.unreadable.push((id, e.to_string()));
            }
        }
    }
    Ok(out)
}

fn map_result(row: &rusqlite::Row) -> rusqlite::Result<GameResult> {
    Ok(GameResult {
        points_for: row.get::<_, Option<i32>>(0)?.unwrap_or(0),
        points_against: row.get::<_, Option<i32>>(1)?.unwrap_or(0),
    })
}

/// SQLite schema (idempotent CREATE IF NOT EXISTS)
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS teams (
    id           INTEGER PRIMARY KEY,
    name         TEXT    NOT NULL,
    abbreviation TEXT,
    division     TEXT
);

CREATE TABLE IF NOT EXISTS games (
    id                  INTEGER PRIMARY KEY,
    season              INTEGER NOT NULL,
    week                INTEGER,
    home_team_id        INTEGER NOT NULL,
    away_team_id        INTEGER NOT NULL,
    game_date           TEXT    NOT NULL,
    venue_name          TEXT,
    venue_city          TEXT,
    venue_utc_offset    INTEGER,
    indoor              INTEGER NOT NULL DEFAULT 0,
    status              TEXT    NOT NULL DEFAULT 'scheduled',
    spread              REAL,
    over_under          REAL,
    home_score          INTEGER,
    away_score          INTEGER,
    weather_temperature REAL,
    weather_wind_speed  REAL,
    weather_conditions  TEXT,
    FOREIGN KEY (home_team_id) REFERENCES teams(id),
    FOREIGN KEY (away_team_id) REFERENCES teams(id)
);

CREATE TABLE IF NOT EXISTS team_stats (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    team_id     INTEGER NOT NULL,
    season      INTEGER NOT NULL,
    week        INTEGER,
    total_yards REAL,
    turnovers   REAL,
    FOREIGN KEY (team_id) REFERENCES teams(id)
);

CREATE TABLE IF NOT EXISTS injuries (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    team_id     INTEGER NOT NULL,
    season      INTEGER NOT NULL,
    player_name TEXT    NOT NULL,
    status      TEXT    NOT NULL,
    FOREIGN KEY (team_id) REFERENCES teams(id)
);

CREATE TABLE IF NOT EXISTS weather_reports (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    city        TEXT    NOT NULL,
    temperature REAL,
    wind_speed  REAL,
    conditions  TEXT,
    observed_at TEXT    NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_games_home ON games(home_team_id, game_date);
CREATE INDEX IF NOT EXISTS idx_games_away ON games(away_team_id, game_date);
CREATE INDEX IF NOT EXISTS idx_games_week ON games(season, week);
CREATE INDEX IF NOT EXISTS idx_injuries_team ON injuries(season, team_id);
CREATE INDEX IF NOT EXISTS idx_weather_city ON weather_reports(city, observed_at);
"#;

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::predictor::features::FeatureEngineer;
    use approx::assert_relative_eq;
    use chrono::{Duration, TimeZone};

    pub(crate) fn team(id: i64, name: &str, division: &str) -> TeamRef {
        TeamRef {
            id,
            name: name.into(),
            abbreviation: None,
            division: Some(division.into()),
        }
    }

    pub(crate) fn game(
        id: i64,
        home: &TeamRef,
        away: &TeamRef,
        when: DateTime<Utc>,
        score: Option<(i32, i32)>,
    ) -> Contest {
        Contest {
            id,
            season: 2025,
            week: Some(7),
            home: home.clone(),
            away: away.clone(),
            scheduled_at: when,
            venue: Venue {
                name: Some("Stadium".into()),
                city: Some("Kansas City".into()),
                utc_offset_minutes: Some(-300),
                indoor: false,
            },
            status: if score.is_some() {
                ContestStatus::Final
            } else {
                ContestStatus::Scheduled
            },
            spread: None,
            over_under: None,
            home_score: score.map(|s| s.0),
            away_score: score.map(|s| s.1),
            weather: None,
        }
    }

    /// Overwrite a game's kickoff with text that can't be read back as a timestamp.
    pub(crate) fn corrupt_game_date(db: &Database, id: i64) {
        db.lock()
            .unwrap()
            .execute("UPDATE games SET game_date = 'kickoff tbd' WHERE id = ?1", params![id])
            .unwrap();
    }

    /// Two teams, a target contest on 2025-10-19 and history around it.
    pub(crate) fn seeded() -> (Database, Contest) {
        let db = Database::open(":memory:").unwrap();
        let kc = team(1, "Kansas City Chiefs", "AFC West");
        let lv = team(2, "Las Vegas Raiders", "AFC West");
        let den = team(3, "Denver Broncos", "AFC West");
        for t in [&kc, &lv, &den] {
            db.upsert_team(t).unwrap();
        }
        let target_at = Utc.with_ymd_and_hms(2025, 10, 19, 20, 25, 0).unwrap();
        let day = |d: i64| target_at - Duration::days(d);

        // KC: 3 finals vs DEN, 1 earlier meeting with LV
        db.upsert_game(&game(10, &kc, &den, day(7), Some((30, 20)))).unwrap();
        db.upsert_game(&game(11, &den, &kc, day(14), Some((24, 17)))).unwrap();
        db.upsert_game(&game(12, &lv, &kc, day(21), Some((10, 27)))).unwrap();
        // LV: loss to DEN on top of the KC meeting
        db.upsert_game(&game(13, &lv, &den, day(7), Some((13, 16)))).unwrap();
        // same-day and future finals never leak
        db.upsert_game(&game(14, &kc, &den, target_at - Duration::hours(4), Some((50, 0)))).unwrap();
        db.upsert_game(&game(15, &kc, &lv, day(-7), Some((3, 45)))).unwrap();

        let target = game(100, &kc, &lv, target_at, None);
        db.upsert_game(&target).unwrap();
        (db, target)
    }

    #[test]
    fn contest_round_trips() {
        let (db, target) = seeded();
        let c = db.get_contest(100).unwrap().unwrap();
        assert_eq!(c.home.name, "Kansas City Chiefs");
        assert_eq!(c.away.id, 2);
        assert_eq!(c.status, ContestStatus::Scheduled);
        assert_eq!(c.scheduled_at, target.scheduled_at);
        assert_eq!(c.venue.utc_offset_minutes, Some(-300));
        assert!(c.weather.is_none());
        assert!(db.get_contest(999).unwrap().is_none());
    }

    #[test]
    fn recent_form_uses_only_prior_finals() {
        let (db, target) = seeded();
        let form = db
            .recent_form(1, target.game_date(), 5, Some(2025), Some(7))
            .unwrap();
        assert_eq!(form.games, 3);
        assert_relative_eq!(form.win_pct.unwrap(), 2.0 / 3.0, epsilon = 1e-9);
        assert_relative_eq!(form.avg_points_for.unwrap(), (30.0 + 17.0 + 27.0) / 3.0, epsilon = 1e-9);
        assert_relative_eq!(form.avg_points_against.unwrap(), (20.0 + 24.0 + 10.0) / 3.0, epsilon = 1e-9);

        let window = db.recent_form(1, target.game_date(), 2, None, None).unwrap();
        assert_eq!(window.games, 2);
        assert_relative_eq!(window.avg_points_for.unwrap(), 23.5, epsilon = 1e-9);
    }

    #[test]
    fn head_to_head_from_home_perspective() {
        let (db, target) = seeded();
        let h2h = db.head_to_head(1, 2, target.game_date(), 10).unwrap();
        assert_eq!(h2h.meetings, 1);
        assert_relative_eq!(h2h.home_win_pct, 1.0, epsilon = 1e-9);
        assert_relative_eq!(h2h.avg_point_diff, 17.0, epsilon = 1e-9);

        let none = db.head_to_head(2, 3, NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(), 10).unwrap();
        assert_eq!(none.meetings, 0);
        assert_relative_eq!(none.home_win_pct, 0.5, epsilon = 1e-9);
        assert_relative_eq!(none.avg_point_diff, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn injuries_and_rest_days() {
        let (db, target) = seeded();
        db.insert_injury(1, 2025, "A", "Out").unwrap();
        db.insert_injury(1, 2025, "B", "Questionable").unwrap();
        db.insert_injury(2, 2025, "C", "IR").unwrap();
        db.insert_injury(2, 2025, "D", "Inactive").unwrap();
        db.insert_injury(2, 2024, "E", "Out").unwrap();
        db.insert_injury(2, 2025, "F", "Probable").unwrap();

        let map = db.injury_summary(2025, &[1, 2]).unwrap();
        assert_eq!(map[&1], InjuryImpactSummary { severe: 1, borderline: 1 });
        assert_eq!(map[&2], InjuryImpactSummary { severe: 2, borderline: 0 });

        // the same-day game 14 is excluded, previous is 7 days earlier
        assert_eq!(db.rest_days(1, target.game_date()).unwrap(), Some(7));
        assert_eq!(db.rest_days(3, NaiveDate::from_ymd_opt(2020, 1, 1).unwrap()).unwrap(), None);
    }

    #[test]
    fn team_stats_respect_week() {
        let (db, _) = seeded();
        db.upsert_team_stats(1, 2025, Some(5), &TeamStatsRow { total_yards: Some(360.0), turnovers: Some(5.0) }).unwrap();
        db.upsert_team_stats(1, 2025, Some(9), &TeamStatsRow { total_yards: Some(480.0), turnovers: Some(9.0) }).unwrap();
        let row = db.latest_team_stats(1, 2025, Some(7)).unwrap().unwrap();
        assert_eq!(row.total_yards, Some(360.0));
        let latest = db.latest_team_stats(1, 2025, None).unwrap().unwrap();
        assert_eq!(latest.total_yards, Some(480.0));
        assert!(db.latest_team_stats(2, 2025, Some(7)).unwrap().is_none());
    }

    #[test]
    fn weather_reports_latest_wins() {
        let db = Database::open(":memory:").unwrap();
        let now = Utc::now();
        let old = WeatherSnapshot { temperature: Some(60.0), wind_speed: Some(5.0), conditions: "Clear".into() };
        let new = WeatherSnapshot { temperature: Some(45.0), wind_speed: Some(18.0), conditions: "Rain".into() };
        db.record_weather("Chicago", &old, now - Duration::hours(3)).unwrap();
        db.record_weather("Chicago", &new, now).unwrap();
        assert_eq!(db.latest_weather(" chicago").unwrap(), Some(new));
        assert!(db.latest_weather("Miami").unwrap().is_none());
    }

    #[test]
    fn feature_vector_from_store() {
        let (db, target) = seeded();
        let v = FeatureEngineer::default().extract(&target, &db);
        assert_eq!(v.len(), 25);
        // KC averages 74/3 points for
        assert_relative_eq!(v.0[0], (74.0 / 3.0) / 40.0, epsilon = 1e-9);
        // LV scored 13 and 10
        assert_relative_eq!(v.0[1], 11.5 / 40.0, epsilon = 1e-9);
        assert_relative_eq!(v.0[14], 1.0, epsilon = 1e-9);
        assert_relative_eq!(v.0[15], 17.0 / 20.0, epsilon = 1e-9);
        // same division, 20:25 UTC is 15:25 local
        assert_relative_eq!(v.0[17], 1.0, epsilon = 1e-9);
        assert_relative_eq!(v.0[18], 0.0, epsilon = 1e-9);
        assert_relative_eq!(v.0[23], 7.0, epsilon = 1e-9);
    }

    #[test]
    fn upcoming_and_weekly_listing() {
        let (db, target) = seeded();
        let week = db.list_week_contests(2025, 7).unwrap();
        assert_eq!(week.contests.len(), 7);
        assert!(week.unreadable.is_empty());
        let upcoming = db
            .list_upcoming_contests(target.scheduled_at - Duration::days(1), 10)
            .unwrap();
        assert_eq!(upcoming.contests.iter().map(|c| c.id).collect::<Vec<_>>(), vec![100]);
    }

    #[test]
    fn unreadable_row_does_not_sink_the_week() {
        let (db, _) = seeded();
        corrupt_game_date(&db, 12);
        let week = db.list_week_contests(2025, 7).unwrap();
        assert_eq!(week.contests.len(), 6);
        assert!(week.contests.iter().all(|c| c.id != 12));
        assert_eq!(week.unreadable.len(), 1);
        assert_eq!(week.unreadable[0].0, 12);
    }

    #[test]
    fn final_contests_need_scores() {
        let (db, _) = seeded();
        let finals = db.list_final_contests(2025, 1, 18).unwrap();
        let ids: Vec<i64> = finals.contests.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![10, 11, 12, 13, 14, 15]);
        assert!(db.list_final_contests(2025, 8, 18).unwrap().contests.is_empty());
    }
}
