use crate::model::{LogEvent, Severity};
use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;
use sha1::{Digest, Sha1};
use std::sync::LazyLock;

// Compile regexes once at startup for performance
static TIMESTAMP_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\d{4}-\d{2}-\d{2}[T\s]\d{2}:\d{2}:\d{2}(?:\.\d+)?(?:Z|[+-]\d{2}:?\d{2})?")
        .expect("Failed to compile timestamp regex")
});

static BRACKETED_LEVEL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\[(CRITICAL|ERROR|WARNING|INFO|SERVICE|DEBUG)\]")
        .expect("Failed to compile bracketed level regex")
});

static BARE_LEVEL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(CRITICAL|ERROR|WARNING|INFO|SERVICE|DEBUG)\b")
        .expect("Failed to compile bare level regex")
});

static EXCEPTION_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\w+(?:Exception|Error))\b[^:]*:\s+(.+)")
        .expect("Failed to compile exception regex")
});

static UUID_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}")
        .expect("Failed to compile uuid regex")
});

static IPV4_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:\d{1,3}\.){3}\d{1,3}\b").expect("Failed to compile ipv4 regex")
});

static HEX_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b0[xX][0-9a-fA-F]+\b").expect("Failed to compile hex literal regex")
});

static NUM_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+").expect("Failed to compile integer run regex"));

/// Replace volatile tokens with stable placeholders so that log lines
/// differing only in identifiers collapse to one signature.
///
/// Substitution order matters: a UUID contains digit runs and an IPv4
/// address is nothing but digit runs, so both must be rewritten before the
/// generic integer pass.
pub fn normalize(text: &str) -> String {
    let text = UUID_REGEX.replace_all(text, "<uuid>");
    let text = IPV4_REGEX.replace_all(&text, "<ip>");
    let text = HEX_REGEX.replace_all(&text, "<hex>");
    let text = NUM_REGEX.replace_all(&text, "<num>");
    text.trim().to_string()
}

/// Extracts `(timestamp, level, signature)` from raw log lines.
pub struct LogParser {
    min_severity: Severity,
}

impl LogParser {
    pub fn new(min_severity: Severity) -> Self {
        Self { min_severity }
    }

    /// Parse one raw log line. Returns `None` when the line is empty,
    /// filtered by the severity floor, or otherwise unusable. Multi-line
    /// entries are keyed on their first line only.
    pub fn parse_line(&self, raw: &str) -> Option<LogEvent> {
        let line = raw.split('\n').next().unwrap_or("").trim();
        if line.is_empty() {
            return None;
        }

        if line.starts_with('{') {
            if let Some(event) = self.parse_json_line(raw, line) {
                return event;
            }
            // Malformed JSON falls through to the text path.
        }

        self.parse_text_line(raw, line)
    }

    /// Structured lines: `{"level": "...", "msg": "..."}` and friends.
    /// Returns `Some(None)` when the line decoded but was filtered, and
    /// `None` when it was not valid JSON at all.
    fn parse_json_line(&self, raw: &str, line: &str) -> Option<Option<LogEvent>> {
        let value: serde_json::Value = serde_json::from_str(line).ok()?;
        let object = value.as_object()?;

        let level = lookup_ignore_case(object, &["level", "severity"])
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse::<Severity>().ok())
            .unwrap_or(Severity::Info);

        if level.rank() < self.min_severity.rank() {
            return Some(None);
        }

        let message = lookup_ignore_case(object, &["msg", "message"])
            .and_then(|v| v.as_str())
            .unwrap_or("");
        let message = normalize(&strip_details_suffix(message));

        let timestamp = TIMESTAMP_REGEX
            .find(line)
            .and_then(|m| parse_timestamp(m.as_str()))
            .unwrap_or_else(Utc::now);

        Some(Some(LogEvent {
            signature: join_signature(&level.to_string(), &message),
            timestamp,
            level_rank: level.rank(),
            raw: raw.to_string(),
        }))
    }

    fn parse_text_line(&self, raw: &str, line: &str) -> Option<LogEvent> {
        // Pull out a timestamp if the line carries one, then work on the
        // remainder so identical events at different times converge.
        let (timestamp, rest) = match TIMESTAMP_REGEX.find(line) {
            Some(m) => {
                let mut rest = String::with_capacity(line.len());
                rest.push_str(&line[..m.start()]);
                rest.push_str(&line[m.end()..]);
                (parse_timestamp(m.as_str()).unwrap_or_else(Utc::now), rest)
            }
            None => (Utc::now(), line.to_string()),
        };

        let level_match = BRACKETED_LEVEL_REGEX
            .captures(&rest)
            .or_else(|| BARE_LEVEL_REGEX.captures(&rest));

        let Some(captures) = level_match else {
            // No recognizable level: hash the normalized remainder so the
            // line still clusters stably.
            if self.min_severity.rank() > 0 {
                return None;
            }
            let digest = Sha1::digest(normalize(&rest).as_bytes());
            return Some(LogEvent {
                signature: format!("UNCLASSIFIED:{}", &hex::encode(digest)[..8]),
                timestamp,
                level_rank: 0,
                raw: raw.to_string(),
            });
        };

        let level: Severity = captures
            .get(1)
            .expect("level capture group")
            .as_str()
            .parse()
            .ok()?;
        if level.rank() < self.min_severity.rank() {
            return None;
        }

        let after_level = &rest[captures.get(0).expect("level match").end()..];
        let candidate = after_level.trim_start_matches([':', '-', ' ']);
        let candidate = strip_details_suffix(candidate);

        let candidate = match EXCEPTION_REGEX.captures(&candidate) {
            Some(exc) => format!("{} {}", &exc[1], &exc[2]),
            None => candidate,
        };

        let message = normalize(&candidate);
        Some(LogEvent {
            signature: join_signature(&level.to_string(), &message),
            timestamp,
            level_rank: level.rank(),
            raw: raw.to_string(),
        })
    }
}

fn join_signature(level: &str, message: &str) -> String {
    if message.is_empty() {
        level.to_string()
    } else {
        format!("{}: {}", level, message)
    }
}

fn lookup_ignore_case<'a>(
    object: &'a serde_json::Map<String, serde_json::Value>,
    keys: &[&str],
) -> Option<&'a serde_json::Value> {
    for key in keys {
        if let Some(value) = object
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v)
        {
            return Some(value);
        }
    }
    None
}

/// Remove a trailing `Details: {...}` (or bare `{...}`) JSON blob. The blob
/// must be the suffix of the message and must parse as a JSON object;
/// anything else is left alone.
fn strip_details_suffix(message: &str) -> String {
    let trimmed = message.trim_end();
    if !trimmed.ends_with('}') {
        return trimmed.to_string();
    }

    for (index, byte) in trimmed.bytes().enumerate() {
        if byte != b'{' {
            continue;
        }
        let Ok(value) = serde_json::from_str::<serde_json::Value>(&trimmed[index..]) else {
            continue;
        };
        if !value.is_object() {
            continue;
        }
        let mut prefix = trimmed[..index].trim_end();
        if let Some(stripped) = prefix.strip_suffix("Details:") {
            prefix = stripped.trim_end();
        }
        return prefix.to_string();
    }

    trimmed.to_string()
}

fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    let text = text.replacen(' ', "T", 1);
    if let Ok(parsed) = DateTime::parse_from_rfc3339(&text) {
        return Some(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(&text, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}
