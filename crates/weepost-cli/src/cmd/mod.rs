pub mod check;
pub mod run;

use comfy_table::{Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};

use weepost_core::Config;

pub(crate) fn new_table(header: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(header.iter().map(|h| Cell::new(h).fg(Color::Cyan)));
    table
}

fn seconds(value: f64) -> String {
    format!("{value}s")
}

/// Credential is never printed, only whether it is present
fn masked(value: Option<&String>) -> &'static str {
    match value {
        Some(v) if !v.is_empty() => "configured",
        _ => "not set",
    }
}

/// `weepost config` - print the effective settings
pub fn show_config(config: &Config) {
    let mut table = new_table(&["Setting", "Value"]);

    table.add_row(vec![
        "Endpoint",
        config.endpoint.as_deref().unwrap_or("not set"),
    ]);
    table.add_row(vec!["Key", masked(config.key.as_ref())]);
    table.add_row(vec!["Post interval", &seconds(config.post_interval)]);
    table.add_row(vec![
        "Max backlog",
        &config
            .max_backlog
            .map_or_else(|| "unbounded".to_string(), |n| n.to_string()),
    ]);
    table.add_row(vec![
        "Stale after",
        &config.stale.map_or_else(|| "disabled".to_string(), seconds),
    ]);
    table.add_row(vec!["Timeout", &seconds(config.timeout)]);
    table.add_row(vec![
        "Retries",
        &format!(
            "{} tries, {} apart",
            config.max_tries,
            seconds(config.retry_wait)
        ),
    ]);
    table.add_row(vec![
        "Log success / failure",
        &format!("{} / {}", config.log_success, config.log_failure),
    ]);
    table.add_row(vec!["Skip upload", &config.skip_upload.to_string()]);
    table.add_row(vec!["User agent", &config.user_agent]);
    table.add_row(vec!["Eval errors", &format!("{:?}", config.eval_errors)]);
    table.add_row(vec![
        "Filters",
        &format!(
            "{} ({})",
            config.effective_filters().len(),
            if config.default_filters {
                "defaults + custom"
            } else {
                "custom only"
            }
        ),
    ]);

    eprintln!("\n{table}");
}
