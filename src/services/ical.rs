//! iCalendar (RFC 5545) feed encoding.
//!
//! Output uses CRLF terminators, folds content lines at 75 octets and escapes TEXT
//! values. Events that cannot be encoded are skipped with a warning so one bad row
//! never takes down the whole feed.

use chrono::{DateTime, Duration, NaiveDate, Utc};

use crate::models::{CalendarEvent, EventEnd, EventTime, FeedMeta, Frequency, Recurrence};

const PRODID: &str = "-//PawShare//Care Calendar//EN";
const MAX_LINE_OCTETS: usize = 75;
const FALLBACK_UID_DOMAIN: &str = "pawshare.local";

pub struct FeedEncoder;

impl FeedEncoder {
    /// Encode `events` as a single VCALENDAR document
    pub fn encode(
        events: &[CalendarEvent],
        meta: &FeedMeta,
        refresh_interval: Option<Duration>,
        generated_at: DateTime<Utc>,
    ) -> String {
        let mut writer = IcsWriter::default();
        let uid_domain = uid_domain(&meta.base_url);
        let stamp = format_utc(generated_at);

        writer.line("BEGIN:VCALENDAR");
        writer.line("VERSION:2.0");
        writer.property("PRODID", PRODID);
        writer.line("CALSCALE:GREGORIAN");
        writer.line("METHOD:PUBLISH");
        writer.text("X-WR-CALNAME", &meta.calendar_name);
        writer.text("NAME", &meta.calendar_name);
        if let Some(interval) = refresh_interval.filter(|d| *d > Duration::zero()) {
            let value = format_duration(interval);
            writer.property("REFRESH-INTERVAL;VALUE=DURATION", &value);
            writer.property("X-PUBLISHED-TTL", &value);
        }

        let mut skipped = 0usize;
        for event in events {
            match Self::check(event) {
                Ok(start) => Self::write_event(&mut writer, event, start, &uid_domain, &stamp),
                Err(reason) => {
                    skipped += 1;
                    tracing::warn!("Skipping calendar event '{}': {}", event.source_id, reason);
                }
            }
        }

        writer.line("END:VCALENDAR");
        tracing::debug!(
            "Encoded calendar '{}' with {} events ({} skipped)",
            meta.calendar_name,
            events.len() - skipped,
            skipped
        );
        writer.finish()
    }

    fn check(event: &CalendarEvent) -> std::result::Result<EventTime, &'static str> {
        if event.source_id.trim().is_empty() {
            return Err("missing identifier");
        }
        if event.summary.trim().is_empty() {
            return Err("missing summary");
        }
        event.start.ok_or("missing start")
    }

    fn write_event(
        writer: &mut IcsWriter,
        event: &CalendarEvent,
        start: EventTime,
        uid_domain: &str,
        stamp: &str,
    ) {
        writer.line("BEGIN:VEVENT");
        writer.text("UID", &format!("{}@{}", event.source_id.trim(), uid_domain));
        writer.property("DTSTAMP", stamp);
        writer.time("DTSTART", &start);

        match event.end {
            Some(EventEnd::At(end)) if end.is_before_or_at(&start) => {
                tracing::warn!(
                    "Dropping end of calendar event '{}': end is not after start",
                    event.source_id
                );
            }
            Some(EventEnd::At(end)) => writer.time("DTEND", &end),
            Some(EventEnd::Duration(d)) if d > Duration::zero() => {
                writer.property("DURATION", &format_duration(d));
            }
            Some(EventEnd::Duration(_)) => {
                tracing::warn!(
                    "Dropping duration of calendar event '{}': not positive",
                    event.source_id
                );
            }
            None => {}
        }

        writer.text("SUMMARY", &event.summary);
        if let Some(description) = event.description.as_deref().filter(|s| !s.trim().is_empty()) {
            writer.text("DESCRIPTION", description);
        }
        if let Some(location) = event.location.as_deref().filter(|s| !s.trim().is_empty()) {
            writer.text("LOCATION", location);
        }
        if let Some(rule) = &event.recurrence {
            writer.property("RRULE", &format_rrule(rule, &start));
        }
        writer.line("END:VEVENT");
    }
}

#[derive(Default)]
struct IcsWriter {
    out: String,
}

impl IcsWriter {
    fn line(&mut self, content: &str) {
        fold_into(&mut self.out, content);
        self.out.push_str("\r\n");
    }

    /// Property whose value is already in wire form
    fn property(&mut self, name: &str, value: &str) {
        self.line(&format!("{}:{}", name, value));
    }

    fn text(&mut self, name: &str, value: &str) {
        self.property(name, &escape_text(value));
    }

    fn time(&mut self, name: &str, value: &EventTime) {
        match value {
            EventTime::Utc(dt) => self.property(name, &format_utc(*dt)),
            EventTime::Floating(dt) => {
                self.property(name, &dt.format("%Y%m%dT%H%M%S").to_string())
            }
            EventTime::AllDay(date) => {
                self.property(&format!("{};VALUE=DATE", name), &format_date(*date))
            }
        }
    }

    fn finish(self) -> String {
        self.out
    }
}

/// Append `line` to `out`, breaking it into physical lines of at most 75 octets.
/// Continuations start with a single space. Splits never land inside a UTF-8 sequence,
/// and never right after whitespace, which some readers trim before unfolding.
fn fold_into(out: &mut String, line: &str) {
    let mut rest = line;
    let mut limit = MAX_LINE_OCTETS;
    while rest.len() > limit {
        let mut cut = limit;
        while !rest.is_char_boundary(cut) {
            cut -= 1;
        }
        let trimmed = rest[..cut].trim_end_matches([' ', '\t']).len();
        if trimmed > 0 {
            cut = trimmed;
        }
        out.push_str(&rest[..cut]);
        out.push_str("\r\n ");
        rest = &rest[cut..];
        // The leading space counts toward the continuation line's octets.
        limit = MAX_LINE_OCTETS - 1;
    }
    out.push_str(rest);
}

/// Escape a TEXT value: backslash, semicolon, comma and newlines
pub fn escape_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '\\' => out.push_str("\\\\"),
            ';' => out.push_str("\\;"),
            ',' => out.push_str("\\,"),
            '\n' => out.push_str("\\n"),
            '\r' => {
                // CRLF becomes one escaped newline, a bare CR becomes one as well.
                if chars.peek() != Some(&'\n') {
                    out.push_str("\\n");
                }
            }
            c if c.is_control() && c != '\t' => {}
            c => out.push(c),
        }
    }
    out
}

fn format_utc(dt: DateTime<Utc>) -> String {
    dt.format("%Y%m%dT%H%M%SZ").to_string()
}

fn format_date(date: NaiveDate) -> String {
    date.format("%Y%m%d").to_string()
}

/// RFC 5545 DURATION value, e.g. `PT1H30M` or `P1D`
fn format_duration(d: Duration) -> String {
    let total = d.num_seconds();
    let sign = if total < 0 { "-" } else { "" };
    let mut secs = total.abs();
    if secs == 0 {
        return "PT0S".to_string();
    }

    let days = secs / 86_400;
    secs %= 86_400;
    let hours = secs / 3_600;
    secs %= 3_600;
    let minutes = secs / 60;
    secs %= 60;

    let mut out = format!("{}P", sign);
    if days > 0 {
        out.push_str(&format!("{}D", days));
    }
    if hours > 0 || minutes > 0 || secs > 0 {
        out.push('T');
        if hours > 0 {
            out.push_str(&format!("{}H", hours));
        }
        if minutes > 0 {
            out.push_str(&format!("{}M", minutes));
        }
        if secs > 0 {
            out.push_str(&format!("{}S", secs));
        }
    }
    out
}

fn format_rrule(rule: &Recurrence, start: &EventTime) -> String {
    let freq = match rule.frequency {
        Frequency::Daily => "DAILY",
        Frequency::Weekly => "WEEKLY",
        Frequency::Monthly => "MONTHLY",
        Frequency::Yearly => "YEARLY",
    };
    let mut out = format!("FREQ={}", freq);
    if rule.interval > 1 {
        out.push_str(&format!(";INTERVAL={}", rule.interval));
    }
    if let Some(until) = rule.until {
        // UNTIL must use the same value type as DTSTART.
        let value = match start {
            EventTime::AllDay(_) => format_date(until),
            EventTime::Floating(_) => format!("{}T235959", format_date(until)),
            EventTime::Utc(_) => format!("{}T235959Z", format_date(until)),
        };
        out.push_str(&format!(";UNTIL={}", value));
    }
    out
}

/// Host part of the public origin, used as the UID domain
fn uid_domain(base_url: &str) -> String {
    let without_scheme = base_url
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(base_url);
    let authority = without_scheme.split(['/', '?', '#']).next().unwrap_or("");
    let host = authority.rsplit_once('@').map(|(_, h)| h).unwrap_or(authority);
    let host = host.split(':').next().unwrap_or("").trim().to_lowercase();
    if host.is_empty() {
        FALLBACK_UID_DOMAIN.to_string()
    } else {
        host
    }
}
