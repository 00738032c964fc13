//! Text, LCD and HTML renderings of an arrival board.

use std::fmt;

use chrono::{DateTime, Utc};
use chrono_tz::America::New_York;

use crate::arrivals::Arrival;
use crate::stations::Station;

/// Trains listed under "upcoming" after the next one.
pub const UPCOMING_COUNT: usize = 4;

pub fn clock_time(time: DateTime<Utc>) -> String {
    time.with_timezone(&New_York).format("%-I:%M:%S %p").to_string()
}

fn plural(minutes: i64) -> &'static str {
    if minutes == 1 { "" } else { "s" }
}

/// Headline for a console board.
#[derive(Debug, Clone, Default)]
pub struct BoardHeader {
    pub title: String,
    pub notes: Vec<String>,
}

/// Full console board: next train, up to [`UPCOMING_COUNT`] more, and a footer.
/// `arrivals` must already be sorted.
pub fn render_board(header: &BoardHeader, arrivals: &[Arrival], now: DateTime<Utc>) -> String {
    Board { header, arrivals, now }.to_string()
}

struct Board<'a> {
    header: &'a BoardHeader,
    arrivals: &'a [Arrival],
    now: DateTime<Utc>,
}

impl fmt::Display for Board<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = "=".repeat(60);
        writeln!(f, "{rule}")?;
        writeln!(f, "  {}", self.header.title)?;
        for note in &self.header.notes {
            writeln!(f, "  {note}")?;
        }
        writeln!(f, "{rule}\n")?;

        match self.arrivals.split_first() {
            None => writeln!(f, "  No upcoming trains found.")?,
            Some((next, rest)) => {
                writeln!(f, "  NEXT TRAIN:")?;
                writeln!(f, "  {} train to {}", next.line, next.direction)?;
                writeln!(f, "  Arriving in: {} minute{}", next.minutes_away, plural(next.minutes_away))?;
                writeln!(f, "  Time: {}", clock_time(next.arrival_time))?;

                if !rest.is_empty() {
                    writeln!(f, "\n  UPCOMING TRAINS:")?;
                    for (i, train) in rest.iter().take(UPCOMING_COUNT).enumerate() {
                        writeln!(
                            f,
                            "  {}. {} to {} - {} min ({})",
                            i + 2,
                            train.line,
                            train.direction,
                            train.minutes_away,
                            clock_time(train.arrival_time)
                        )?;
                    }
                }
            }
        }

        writeln!(f, "\n{rule}")?;
        writeln!(f, "  Last updated: {}", clock_time(self.now))?;
        write!(f, "{rule}")
    }
}

/// Two lines sized for a 16x2 or 20x4 character LCD.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LcdLines {
    pub line1: String,
    pub line2: String,
    pub minutes: Option<i64>,
}

pub fn lcd_lines(next: Option<&Arrival>) -> LcdLines {
    match next {
        Some(train) => LcdLines {
            line1: format!("{} train {}", train.line, train.direction),
            line2: format!("Arriving: {} min", train.minutes_away),
            minutes: Some(train.minutes_away),
        },
        None => LcdLines {
            line1: "No trains".to_string(),
            line2: "available".to_string(),
            minutes: None,
        },
    }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Self-refreshing status page for one station.
pub fn render_html(station: &Station, arrivals: &[Arrival], now: DateTime<Utc>) -> String {
    let name = escape(station.name);
    let mut body = String::new();
    match arrivals.split_first() {
        None => body.push_str(r#"<div class="no-trains">No upcoming trains</div>"#),
        Some((next, rest)) => {
            body.push_str(&format!(
                r#"<div class="next-train"><div class="train-line">{}</div><div class="direction">to {}</div><div class="minutes">{}</div><div class="minutes-label">minute{}</div></div>"#,
                escape(&next.line),
                escape(&next.direction),
                next.minutes_away,
                plural(next.minutes_away)
            ));
            if !rest.is_empty() {
                body.push_str(r#"<div class="upcoming"><div class="upcoming-title">Upcoming Trains</div>"#);
                for train in rest.iter().take(UPCOMING_COUNT) {
                    body.push_str(&format!(
                        r#"<div class="upcoming-train"><span>{} to {}</span><strong>{} min</strong></div>"#,
                        escape(&train.line),
                        escape(&train.direction),
                        train.minutes_away
                    ));
                }
                body.push_str("</div>");
            }
        }
    }

    format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="UTF-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<meta http-equiv="refresh" content="30">
<title>MTA Train Time - {name}</title>
<style>
body {{ font-family: 'Helvetica Neue', Arial, sans-serif; background: #1d2b64; color: white; text-align: center; padding: 20px; }}
.train-line {{ display: inline-block; background: white; color: #0039a6; font-weight: bold; font-size: 2em; border-radius: 50%; width: 70px; height: 70px; line-height: 70px; }}
.minutes {{ font-size: 5em; font-weight: bold; }}
.upcoming-train {{ display: flex; justify-content: space-between; max-width: 400px; margin: 8px auto; }}
</style>
</head>
<body>
<div class="station-name">{name} Station</div>
{body}
<div class="last-update">Last updated: {updated}</div>
</body>
</html>
"#,
        updated = clock_time(now),
    )
}
