//! `rivus`: sign in, load the wheel and print where the user stands.
//!
//! Usage: `rivus [status|history|chart|toggle-theme]` (default `status`).

use std::process::ExitCode;

use rivus_lib::chart::RadarLayout;
use rivus_lib::{commands, state, AppState};

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match state::load_config() {
        Ok(config) => config,
        Err(e) => {
            log::error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let app = AppState::from_config(config, None);
    commands::start(&app);
    let view = match commands::login(&app).await {
        Ok(view) => view,
        Err(e) => {
            log::error!("{e} ({})", e.recovery_suggestion());
            return ExitCode::FAILURE;
        }
    };

    let command = std::env::args().nth(1).unwrap_or_else(|| "status".to_string());
    let output = match command.as_str() {
        "status" => serde_json::json!({
            "view": view,
            "theme": app.theme(),
            "state": *app.snapshot(),
            "daily": commands::daily_summary(&app),
            "weekly": commands::weekly_access(&app),
        }),
        "history" => serde_json::json!(commands::history_summary(&app)),
        "chart" => serde_json::json!(RadarLayout::default().chart(&app.snapshot().current_wheel)),
        "toggle-theme" => serde_json::json!({ "theme": commands::toggle_theme(&app).await }),
        other => {
            log::error!("Unknown command {other:?}; expected status, history, chart or toggle-theme");
            return ExitCode::FAILURE;
        }
    };

    app.flush().await;
    match serde_json::to_string_pretty(&output) {
        Ok(text) => {
            println!("{text}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!("Failed to render output: {e}");
            ExitCode::FAILURE
        }
    }
}
