//! Output formatting for the CLI.
//!
//! Human output goes to stdout, notices and errors to stderr. In JSON mode
//! only [`Output::json`] and errors print anything.

use console::{measure_text_width, pad_str, style, Alignment, StyledObject, Term};

#[derive(Clone)]
pub struct Output {
    verbose: bool,
    json: bool,
    term: Term,
}

impl Output {
    pub fn new(verbose: bool, json: bool) -> Self {
        Self {
            verbose,
            json,
            term: Term::stdout(),
        }
    }

    fn line(&self, marker: StyledObject<&str>, msg: &str) {
        if !self.json {
            println!("{} {}", marker, msg);
        }
    }

    fn notice(&self, marker: StyledObject<&str>, msg: &str) {
        if !self.json {
            eprintln!("{} {}", marker, msg);
        }
    }

    pub fn info(&self, msg: &str) {
        self.line(style("ℹ").blue(), msg);
    }

    pub fn success(&self, msg: &str) {
        self.line(style("✓").green(), msg);
    }

    pub fn warn(&self, msg: &str) {
        self.notice(style("⚠").yellow(), msg);
    }

    /// Errors print in both modes; JSON mode emits `{"error": ...}`.
    pub fn error(&self, msg: &str) {
        if self.json {
            eprintln!("{}", serde_json::json!({ "error": msg }));
        } else {
            eprintln!("{} {}", style("✗").red(), style(msg).red());
        }
    }

    /// Only shown with `--verbose`.
    pub fn debug(&self, msg: &str) {
        if self.verbose {
            self.notice(style("→").dim(), &style(msg).dim().to_string());
        }
    }

    pub fn header(&self, msg: &str) {
        if !self.json {
            println!("\n{}", style(msg).bold().underlined());
        }
    }

    pub fn kv(&self, key: &str, value: &str) {
        if !self.json {
            println!("  {}: {}", style(key).dim(), value);
        }
    }

    pub fn list_item(&self, item: &str) {
        self.line(style("  •").dim(), item);
    }

    /// Print an aligned table. Column widths fit the widest cell, styled
    /// cells included, and rows are cut at the terminal edge.
    pub fn table(&self, headers: &[&str], rows: &[Vec<String>]) {
        if self.json {
            return;
        }
        let mut widths: Vec<usize> = headers.iter().map(|h| measure_text_width(h)).collect();
        for row in rows {
            for (width, cell) in widths.iter_mut().zip(row) {
                *width = (*width).max(measure_text_width(cell));
            }
        }

        let limit = self.term_width();
        let render = |cells: Vec<String>| {
            let padded: Vec<String> = cells
                .iter()
                .zip(&widths)
                .map(|(cell, width)| pad_str(cell, *width, Alignment::Left, None).into_owned())
                .collect();
            let line = format!("  {}", padded.join("  "));
            println!("{}", console::truncate_str(line.trim_end(), limit, "…"));
        };

        render(
            headers
                .iter()
                .map(|h| style(h).dim().to_string())
                .collect(),
        );
        for row in rows {
            render(row.clone());
        }
    }

    pub fn json<T: serde::Serialize>(&self, value: &T) {
        match serde_json::to_string_pretty(value) {
            Ok(json) => println!("{}", json),
            Err(e) => self.error(&format!("Failed to encode output: {}", e)),
        }
    }

    pub fn is_json(&self) -> bool {
        self.json
    }

    /// Terminal width, 80 when stdout is not a terminal.
    fn term_width(&self) -> usize {
        self.term
            .size_checked()
            .map_or(80, |(_, cols)| usize::from(cols).max(40))
    }
}

/// Colored badge for stock and order states.
pub fn status_badge(status: &str) -> String {
    match status {
        "in_stock" | "committed" => style(status).green().to_string(),
        "low_stock" | "pending" => style(status).yellow().to_string(),
        "out_of_stock" | "failed" => style(status).red().to_string(),
        _ => style(status).dim().to_string(),
    }
}

/// Metres, switching to kilometres past 1000.
pub fn format_distance(metres: f64) -> String {
    if metres >= 1000.0 {
        format!("{:.2} km", metres / 1000.0)
    } else {
        format!("{:.0} m", metres)
    }
}

/// Walking time as `42s`, `2m 5s` or `1h 2m`.
pub fn format_duration(secs: u64) -> String {
    match secs {
        0..=59 => format!("{}s", secs),
        60..=3599 => format!("{}m {}s", secs / 60, secs % 60),
        _ => format!("{}h {}m", secs / 3600, (secs % 3600) / 60),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_distance() {
        assert_eq!(format_distance(12.4), "12 m");
        assert_eq!(format_distance(1500.0), "1.50 km");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(42), "42s");
        assert_eq!(format_duration(125), "2m 5s");
        assert_eq!(format_duration(3720), "1h 2m");
    }

    #[test]
    fn test_badge_keeps_text() {
        let badge = status_badge("low_stock");
        assert_eq!(console::strip_ansi_codes(&badge), "low_stock");
    }
}
