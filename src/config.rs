use clap::Parser;

/// NFL game predictions served from a local SQLite history
#[derive(Parser, Debug, Clone)]
#[command(name = "gridiron-picks", version, about)]
pub struct Config {
    /// SQLite database path
    #[arg(long, env = "DATABASE_PATH", default_value = "gridiron.db")]
    pub database_path: String,

    /// HTTP API listen address
    #[arg(long, env = "API_ADDR", default_value = "0.0.0.0:8080")]
    pub api_addr: String,

    /// Directory of classifier artifacts (*.json)
    #[arg(long, env = "MODELS_DIR", default_value = "models")]
    pub models_dir: String,

    /// Completed games in the recent-form window
    #[arg(long, env = "RECENT_FORM_WINDOW", default_value = "5")]
    pub recent_form_window: usize,

    /// Prior meetings in the head-to-head window
    #[arg(long, env = "HEAD_TO_HEAD_WINDOW", default_value = "10")]
    pub head_to_head_window: usize,

    /// Weather cache freshness in seconds
    #[arg(long, env = "WEATHER_CACHE_TTL_SECS", default_value = "3600")]
    pub weather_cache_ttl_secs: u64,

    /// Parlay size when a request doesn't give one
    #[arg(long, env = "DEFAULT_PARLAY_SELECTIONS", default_value = "5")]
    pub default_parlay_selections: usize,

    /// Rescale surviving model weights to 1.0 when a classifier fails
    #[arg(long, env = "RENORMALIZE_ON_MODEL_FAILURE", default_value = "false")]
    pub renormalize_on_model_failure: bool,

    /// Print predictions for this season as JSON and exit (requires --predict-week)
    #[arg(long, env = "PREDICT_SEASON")]
    pub predict_season: Option<i32>,

    /// Week to predict in one-shot mode
    #[arg(long, env = "PREDICT_WEEK")]
    pub predict_week: Option<i32>,
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.recent_form_window == 0 || self.recent_form_window > 17 {
            anyhow::bail!("recent_form_window must be between 1 and 17");
        }
        if self.head_to_head_window == 0 || self.head_to_head_window > 50 {
            anyhow::bail!("head_to_head_window must be between 1 and 50");
        }
        if self.default_parlay_selections == 0 || self.default_parlay_selections > 16 {
            anyhow::bail!("default_parlay_selections must be between 1 and 16");
        }
        match (self.predict_season, self.predict_week) {
            (Some(_), None) | (None, Some(_)) => {
                anyhow::bail!("PREDICT_SEASON and PREDICT_WEEK must be given together")
            }
            (_, Some(week)) if !(1..=22).contains(&week) => {
                anyhow::bail!("predict_week must be between 1 and 22");
            }
            _ => {}
        }
        Ok(())
    }

    /// `(season, week)` when running in one-shot mode
    pub fn one_shot(&self) -> Option<(i32, i32)> {
        self.predict_season.zip(self.predict_week)
    }
}
