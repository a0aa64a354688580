//! Terminal presentation: display mode selection, the live progress line
//! and the final summary.

use crate::geo::IpInfo;
use crate::measurements::{Measurement, Metric};
use crate::results::SpeedTestResults;
use crate::speedtest::{ProgressCallback, ProgressEvent, RunOutcome};
use colored::Colorize;
use std::io::Write;

/// How results reach the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayMode {
    /// Live progress on stderr, then a colored summary.
    Progress,
    /// Summary only.
    Plain,
    /// A single JSON document on stdout.
    Json,
}

impl DisplayMode {
    /// `Json` when `--json` was given, otherwise `Progress` on a terminal
    /// and `Plain` when piped.
    pub fn detect(json_flag: bool, is_tty: bool) -> Self {
        if json_flag {
            DisplayMode::Json
        } else if is_tty {
            DisplayMode::Progress
        } else {
            DisplayMode::Plain
        }
    }
}

/// Redraws a one-line progress bar on stderr.
#[derive(Debug, Default)]
pub struct ConsoleProgress;

impl ProgressCallback for ConsoleProgress {
    fn on_progress(&self, event: ProgressEvent) {
        let mut stderr = std::io::stderr().lock();

        let _ = match event {
            ProgressEvent::Progress { percent, status, .. } => {
                write!(stderr, "\r\x1b[2K{} {}", progress_bar(percent), status)
            }
            ProgressEvent::Result { metric, measurement } => write!(
                stderr,
                "\r\x1b[2K{} {}\n",
                format!("{}:", label(metric)).bold(),
                format_measurement(metric, &measurement)
            ),
        };
        let _ = stderr.flush();
    }
}

pub fn progress_bar(percent: f64) -> String {
    const WIDTH: usize = 30;

    let percent = percent.clamp(0.0, 100.0);
    let filled = ((percent / 100.0) * WIDTH as f64).round() as usize;

    format!(
        "[{}{}] {:>3.0}%",
        "#".repeat(filled).bright_cyan(),
        " ".repeat(WIDTH - filled),
        percent
    )
}

fn label(metric: Metric) -> &'static str {
    match metric {
        Metric::Ping => "Ping",
        Metric::Download => "Download speed",
        Metric::Upload => "Upload speed",
    }
}

pub fn format_measurement(metric: Metric, measurement: &Measurement) -> String {
    let value = format!("{:.1} {}", measurement.value, metric.unit());

    if measurement.is_estimated() {
        format!("{} {}", value.yellow(), "(estimated)".dimmed())
    } else {
        value.bright_cyan().to_string()
    }
}

pub fn print_connection(info: Option<&IpInfo>) {
    let Some(info) = info else {
        println!("{}", "IP information unavailable".red());
        return;
    };

    let unknown = || "Unknown".to_string();

    println!("{} {}", "Your IP:".bold().white(), info.ip.bright_blue());
    println!("{} {}", "Location:".bold().white(), info.location().bright_blue());
    if let Some(ref country) = info.country_name {
        let code = info.country_code.clone().unwrap_or_else(unknown);
        println!("{} {} ({})", "Country:".bold().white(), country, code);
    }
    println!(
        "{} {}",
        "ISP:".bold().white(),
        info.org.clone().unwrap_or_else(unknown)
    );
    if let Some(ref timezone) = info.timezone {
        println!("{} {}", "Timezone:".bold().white(), timezone);
    }
    println!(
        "{} {}",
        "Postal:".bold().white(),
        info.postal.clone().unwrap_or_else(|| "Not available".to_string())
    );
    if let Some(link) = info.map_link() {
        println!("{} {}", "Map:".bold().white(), link.underline());
    }
}

pub fn print_summary(results: &SpeedTestResults) {
    println!(
        "{} {}",
        "Ping:".bold().white(),
        format_measurement(Metric::Ping, &results.ping.measurement)
    );
    if let Some(jitter) = results.jitter_ms {
        println!("{} {:.1} ms", "Jitter:".bold().white(), jitter);
    }
    println!(
        "{} {}",
        "Download speed:".bold().white(),
        format_measurement(Metric::Download, &results.download.measurement)
    );
    println!(
        "{} {}",
        "Upload speed:".bold().white(),
        format_measurement(Metric::Upload, &results.upload.measurement)
    );

    if results.outcome == RunOutcome::CompletedWithEstimates {
        println!(
            "{}",
            "The test could not run; all values above are estimates.".yellow()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_json_flag_wins() {
        assert_eq!(DisplayMode::detect(true, true), DisplayMode::Json);
        assert_eq!(DisplayMode::detect(true, false), DisplayMode::Json);
    }

    #[test]
    fn test_tty_gets_progress() {
        assert_eq!(DisplayMode::detect(false, true), DisplayMode::Progress);
        assert_eq!(DisplayMode::detect(false, false), DisplayMode::Plain);
    }

    #[test]
    fn test_estimated_values_are_labelled() {
        colored::control::set_override(false);

        let measured = format_measurement(Metric::Download, &Measurement::measured(93.44));
        let estimated = format_measurement(Metric::Ping, &Measurement::estimated(23.0));

        assert_eq!(measured, "93.4 Mbps");
        assert_eq!(estimated, "23.0 ms (estimated)");
    }

    #[test]
    fn test_progress_bar_bounds() {
        colored::control::set_override(false);

        assert_eq!(progress_bar(0.0), format!("[{}]   0%", " ".repeat(30)));
        assert_eq!(progress_bar(100.0), format!("[{}] 100%", "#".repeat(30)));
        assert_eq!(progress_bar(250.0), progress_bar(100.0));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn display_mode_selection(json_flag in any::<bool>(), is_tty in any::<bool>()) {
            let mode = DisplayMode::detect(json_flag, is_tty);

            if json_flag {
                prop_assert_eq!(mode, DisplayMode::Json);
            } else if is_tty {
                prop_assert_eq!(mode, DisplayMode::Progress);
            } else {
                prop_assert_eq!(mode, DisplayMode::Plain);
            }
        }
    }
}
