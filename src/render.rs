//! Plain-text and CSV rendering for the CLI.

use std::fmt::Write;

use chrono::{DateTime, Utc};
use happywatch_aggregate::{ActorProgress, InactiveActor, MonitorTick, TrafficSummary};
use happywatch_core::ActivityEvent;
use happywatch_store::RateDecision;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

fn time(t: DateTime<Utc>) -> String {
    t.format(TIME_FORMAT).to_string()
}

pub fn live(tick: &MonitorTick) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "── live activity @ {} UTC ──", time(tick.generated_at));
    match &tick.result {
        Ok(rows) if rows.is_empty() => out.push_str("(no activity)\n"),
        Ok(rows) => {
            let _ = writeln!(
                out,
                "{:<20} {:<20} {:<24} {:>6} {:>6}",
                "actor", "last seen", "endpoint", "total", "errors"
            );
            for row in rows {
                let _ = writeln!(
                    out,
                    "{:<20} {:<20} {:<24} {:>6} {:>6}",
                    row.actor,
                    time(row.last_seen),
                    row.last_endpoint,
                    row.total,
                    row.errors
                );
            }
        }
        Err(e) => {
            let _ = writeln!(out, "refresh failed: {e}");
        }
    }
    if !tick.recent.is_empty() {
        out.push_str("recent:\n");
        for event in &tick.recent {
            let _ = writeln!(
                out,
                "  #{} {} {} {} {}",
                event.id,
                time(event.timestamp),
                event.actor.as_deref().unwrap_or("-"),
                event.endpoint,
                event.status.map_or_else(|| "-".to_string(), |s| s.to_string())
            );
        }
    }
    out
}

pub fn summary(summary: &TrafficSummary) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "traffic since {} UTC", time(summary.since));
    let _ = writeln!(out, "  requests:        {}", summary.total);
    let _ = writeln!(out, "  distinct actors: {}", summary.distinct_actors);
    let _ = writeln!(
        out,
        "  errors:          {} ({:.1}%)",
        summary.errors, summary.error_rate
    );
    if !summary.endpoints.is_empty() {
        out.push_str("  endpoints:\n");
        for e in &summary.endpoints {
            let _ = writeln!(out, "    {:<28} {:>6}", e.endpoint, e.count);
        }
    }
    out
}

pub fn progress(rows: &[ActorProgress]) -> String {
    let mut out = String::from("actor progress\n");
    if rows.is_empty() {
        out.push_str("  (none)\n");
    }
    for row in rows {
        let _ = writeln!(
            out,
            "  {:<20} {:>5} requests  {:>3} sessions  {} .. {}",
            row.actor,
            row.total,
            row.sessions,
            time(row.first_seen),
            time(row.last_seen)
        );
    }
    out
}

pub fn inactive(rows: &[InactiveActor], now: DateTime<Utc>) -> String {
    let mut out = String::from("inactive actors\n");
    if rows.is_empty() {
        out.push_str("  (none)\n");
    }
    for row in rows {
        let idle = (now - row.last_seen).num_minutes();
        let _ = writeln!(
            out,
            "  {:<20} last seen {} ({idle} min ago)",
            row.actor,
            time(row.last_seen)
        );
    }
    out
}

pub fn decision(source: &str, decision: &RateDecision) -> String {
    let verdict = if decision.is_allowed() { "allowed" } else { "limited" };
    format!(
        "{source}: {verdict} ({}/{} in bucket {}, {} remaining, resets in {}s)",
        decision.count(),
        decision.quota(),
        decision.bucket_key(),
        decision.remaining(),
        decision.reset_after().as_secs()
    )
}

pub const CSV_HEADER: &str =
    "id,timestamp,endpoint,actor,session,source,agent,status,duration_ms";

/// One CSV document with a header row.
pub fn csv(events: &[ActivityEvent]) -> String {
    let mut out = String::from(CSV_HEADER);
    out.push('\n');
    for e in events {
        let fields = [
            e.id.to_string(),
            happywatch_core::timestamp::format(e.timestamp),
            csv_field(&e.endpoint),
            csv_field(e.actor.as_deref().unwrap_or("")),
            csv_field(e.session.as_deref().unwrap_or("")),
            csv_field(e.source.as_deref().unwrap_or("")),
            csv_field(e.agent.as_deref().unwrap_or("")),
            e.status.map(|s| s.to_string()).unwrap_or_default(),
            e.duration_ms.map(|d| d.to_string()).unwrap_or_default(),
        ];
        out.push_str(&fields.join(","));
        out.push('\n');
    }
    out
}

/// Quote a field when it holds a delimiter, quote or line break.
fn csv_field(raw: &str) -> String {
    if raw.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", raw.replace('"', "\"\""))
    } else {
        raw.to_string()
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use happywatch_aggregate::{EndpointCount, LiveActor};

    use super::*;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 18, h, m, 0).unwrap()
    }

    #[test]
    fn csv_quotes_when_needed() {
        assert_eq!(csv_field("plain"), "plain");
        assert_eq!(csv_field("a,b"), "\"a,b\"");
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn csv_document() {
        let event = ActivityEvent {
            id: 7,
            timestamp: at(12, 0),
            endpoint: "/message".into(),
            actor: Some("Alice".into()),
            session: None,
            source: Some("1.2.3.4".into()),
            agent: Some("Mozilla/5.0 (X11, Linux)".into()),
            status: Some(200),
            duration_ms: None,
        };
        let doc = csv(&[event]);
        let lines: Vec<&str> = doc.lines().collect();
        assert_eq!(lines[0], CSV_HEADER);
        assert_eq!(
            lines[1],
            "7,2026-10-18T12:00:00.000000Z,/message,Alice,,1.2.3.4,\"Mozilla/5.0 (X11, Linux)\",200,"
        );
    }

    #[test]
    fn summary_text() {
        let text = summary(&TrafficSummary {
            since: at(10, 0),
            total: 4,
            distinct_actors: 2,
            endpoints: vec![EndpointCount {
                endpoint: "/message".into(),
                count: 4,
            }],
            errors: 1,
            error_rate: 25.0,
        });
        assert!(text.contains("requests:        4"));
        assert!(text.contains("1 (25.0%)"));
        assert!(text.contains("/message"));
    }

    #[test]
    fn live_text_reports_failures() {
        let ok = MonitorTick {
            generated_at: at(12, 0),
            result: Ok(vec![LiveActor {
                actor: "Alice".into(),
                last_seen: at(11, 55),
                last_endpoint: "/hint".into(),
                total: 2,
                errors: 1,
            }]),
            recent: Vec::new(),
        };
        assert!(live(&ok).contains("Alice"));

        let failed = MonitorTick {
            result: Err("database is locked".into()),
            ..ok
        };
        assert!(live(&failed).contains("refresh failed: database is locked"));
    }

    #[test]
    fn inactive_text_shows_idle_minutes() {
        let rows = [InactiveActor {
            actor: "Bob".into(),
            last_seen: at(11, 40),
        }];
        assert!(inactive(&rows, at(12, 0)).contains("(20 min ago)"));
    }
}
