use std::fmt::Display;

use ansi_term::Colour;
use anyhow::Result;
use chrono::{DateTime, Duration, Local};
use chrono_english::parse_date_string;
use clap::{CommandFactory, Parser, ValueEnum};

use crate::{
    stats::{window::ReportRange, FocusSummary},
    tracker::Tracker,
    utils::dir::create_application_default_path,
};

use super::Args;

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum DateStyle {
    Uk,
    Us,
}

impl From<DateStyle> for chrono_english::Dialect {
    fn from(value: DateStyle) -> Self {
        match value {
            DateStyle::Uk => Self::Uk,
            DateStyle::Us => Self::Us,
        }
    }
}

impl Display for DateStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DateStyle::Uk => write!(f, "uk"),
            DateStyle::Us => write!(f, "us"),
        }
    }
}

#[derive(Debug, Parser)]
pub struct ReportCommand {
    #[arg(
        long,
        value_enum,
        default_value_t = ReportRange::Day,
        help = "Calendar window to report on"
    )]
    range: ReportRange,
    #[arg(
        long,
        help = "Date inside the reported window. Examples are \"yesterday\", \"15/03/2025\", \"last friday\". Defaults to now"
    )]
    anchor: Option<String>,
    #[arg(long, default_value_t = DateStyle::Uk, help = "Style of dates used during parsing. For Uk it's day/month/year. For Us it's month/day/year")]
    date_style: DateStyle,
}

/// Command to process `report`. Prints the focus score, category totals and
/// the per-application usage table for the requested window.
pub async fn process_report_command(
    ReportCommand {
        range,
        anchor,
        date_style,
    }: ReportCommand,
) -> Result<()> {
    let anchor = parse_anchor(anchor, date_style)?;

    let tracker = Tracker::new(create_application_default_path()?).await?;
    let summary = tracker.refresh_data(range, anchor).await;

    print_summary(&summary);
    Ok(())
}

fn parse_anchor(anchor: Option<String>, date_style: DateStyle) -> Result<DateTime<Local>> {
    let now = Local::now();
    match anchor.map(|s| parse_date_string(&s, now, date_style.into())) {
        Some(Ok(v)) => Ok(v.with_timezone(&Local)),
        Some(Err(e)) => Err(Args::command()
            .error(
                clap::error::ErrorKind::ValueValidation,
                format!("Failed to validate anchor date {e}"),
            )
            .into()),
        None => Ok(now),
    }
}

fn print_summary(summary: &FocusSummary) {
    let score_colour = match summary.focus_score {
        v if v >= 70.0 => Colour::Green,
        v if v >= 40.0 => Colour::Yellow,
        _ => Colour::Red,
    };
    println!(
        "Focus score: {}",
        score_colour.paint(format!("{:.1}", summary.focus_score))
    );
    println!(
        "{} {}\t{} {}\t{} {}\t{} {}",
        Colour::Green.paint("productive"),
        format_duration(summary.totals.productive),
        Colour::Yellow.paint("neutral"),
        format_duration(summary.totals.neutral),
        Colour::Red.paint("distracting"),
        format_duration(summary.totals.distracting),
        "total",
        format_duration(summary.totals.total),
    );
    println!();

    let total_seconds = summary.totals.total.num_seconds();
    for stat in &summary.usage {
        let share = if total_seconds > 0 {
            stat.total.num_seconds() * 100 / total_seconds
        } else {
            0
        };
        println!(
            "{}%\t{}\t{}",
            share,
            format_duration(stat.total),
            stat.app_name
        );
    }
}

pub fn format_duration(v: Duration) -> String {
    if v.num_hours() > 0 {
        format!(
            "{}h{}m{}s",
            v.num_hours(),
            v.num_minutes() % 60,
            v.num_seconds() % 60
        )
    } else if v.num_minutes() > 0 {
        format!("{}m{}s", v.num_minutes() % 60, v.num_seconds() % 60)
    } else {
        format!("{}s", v.num_seconds() % 60)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::format_duration;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::seconds(59)), "59s");
        assert_eq!(format_duration(Duration::seconds(61)), "1m1s");
        assert_eq!(format_duration(Duration::seconds(3723)), "1h2m3s");
    }
}
