//! Directory listing parser for MLSD facts and `LIST` output
//!
//! Three shapes are understood:
//!
//! - MLSD facts: `type=file;size=1234;modify=20260101120000; file.txt`
//! - Unix `ls -l`: `-rw-r--r-- 1 owner group 1234 Jan  1 12:00 file.txt`
//! - Windows/IIS: `01-01-26  12:00AM       1234 file.txt`
//!
//! Lines that match none of them are dropped rather than guessed at.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, TimeZone, Utc};
use ferromirror_types::{FileInfo, FileKind};
use regex::Regex;
use std::sync::OnceLock;
use tracing::debug;

fn unix_pattern() -> Option<&'static Regex> {
    static UNIX: OnceLock<Option<Regex>> = OnceLock::new();
    UNIX.get_or_init(|| {
        Regex::new(
            r"(?x)
            ^([dlcbps-])[rwxsStT-]{9}[+.@]?\s+   # type and permissions
            \d+\s+                                # link count
            \S+\s+                                # owner
            \S+\s+                                # group
            (\d+)\s+                              # size
            (\w{3}\s+\d{1,2}\s+[\d:]+)\s           # date
            (.+)$                                 # name
            ",
        )
        .ok()
    })
    .as_ref()
}

fn windows_pattern() -> Option<&'static Regex> {
    static WINDOWS: OnceLock<Option<Regex>> = OnceLock::new();
    WINDOWS
        .get_or_init(|| {
            Regex::new(
                r"(?x)
                ^(\d{2}-\d{2}-\d{2,4})\s+            # date
                (\d{1,2}:\d{2}(?:AM|PM)?)\s+         # time
                (<DIR>|\d+)\s+                       # size or <DIR>
                (.+)$                                # name
                ",
            )
            .ok()
        })
        .as_ref()
}

/// Parse a complete listing body; `.` and `..` are removed
pub fn parse_listing(raw: &str) -> Vec<FileInfo> {
    raw.lines()
        .map(str::trim_end)
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| {
            let parsed = parse_line(line);
            if parsed.is_none() {
                debug!("Ignoring unrecognised listing line: {}", line);
            }
            parsed
        })
        .filter(|entry| !entry.is_navigation())
        .collect()
}

fn parse_line(line: &str) -> Option<FileInfo> {
    if line.contains('=') && line.contains(';') {
        if let Some(entry) = parse_mlsd(line) {
            return Some(entry);
        }
    }
    parse_unix(line).or_else(|| parse_windows(line))
}

fn parse_mlsd(line: &str) -> Option<FileInfo> {
    let (facts, name) = line.split_once(' ')?;
    if name.is_empty() {
        return None;
    }

    let mut kind = None;
    let mut size = 0;
    let mut modified_at = None;
    for fact in facts.split(';').filter(|f| !f.is_empty()) {
        let (key, value) = fact.split_once('=')?;
        match key.to_ascii_lowercase().as_str() {
            "type" => {
                kind = Some(match value.to_ascii_lowercase().as_str() {
                    "dir" | "cdir" | "pdir" => FileKind::Directory,
                    _ => FileKind::File,
                });
                // The current and parent directory facts never name real entries
                if matches!(value.to_ascii_lowercase().as_str(), "cdir" | "pdir") {
                    return Some(FileInfo::directory("."));
                }
            }
            "size" => size = value.parse().unwrap_or(0),
            "modify" => modified_at = parse_mlsd_time(value),
            _ => {}
        }
    }

    Some(FileInfo {
        name: name.to_string(),
        kind: kind?,
        size,
        modified_at,
    })
}

fn parse_mlsd_time(value: &str) -> Option<DateTime<Utc>> {
    let base = value.get(..14).unwrap_or(value);
    NaiveDateTime::parse_from_str(base, "%Y%m%d%H%M%S")
        .ok()
        .map(|dt| Utc.from_utc_datetime(&dt))
}

fn parse_unix(line: &str) -> Option<FileInfo> {
    let caps = unix_pattern()?.captures(line)?;
    let kind = match caps.get(1)?.as_str() {
        "d" => FileKind::Directory,
        _ => FileKind::File,
    };
    let size = caps.get(2)?.as_str().parse().unwrap_or(0);
    let raw_name = caps.get(4)?.as_str();
    // Symlinks render as "name -> target"
    let name = match raw_name.find(" -> ") {
        Some(pos) if line.starts_with('l') => &raw_name[..pos],
        _ => raw_name,
    };

    Some(FileInfo {
        name: name.to_string(),
        kind,
        size: if kind == FileKind::Directory { 0 } else { size },
        modified_at: parse_unix_date(caps.get(3)?.as_str()),
    })
}

fn parse_unix_date(value: &str) -> Option<DateTime<Utc>> {
    let normalised = value.split_whitespace().collect::<Vec<_>>().join(" ");
    if normalised.contains(':') {
        // Recent entries omit the year
        let year = Utc::now().year();
        NaiveDateTime::parse_from_str(&format!("{year} {normalised}"), "%Y %b %d %H:%M")
            .ok()
            .map(|dt| Utc.from_utc_datetime(&dt))
    } else {
        NaiveDate::parse_from_str(&normalised, "%b %d %Y")
            .ok()
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .map(|dt| Utc.from_utc_datetime(&dt))
    }
}

fn parse_windows(line: &str) -> Option<FileInfo> {
    let caps = windows_pattern()?.captures(line)?;
    let size_or_dir = caps.get(3)?.as_str();
    let (kind, size) = if size_or_dir == "<DIR>" {
        (FileKind::Directory, 0)
    } else {
        (FileKind::File, size_or_dir.parse().unwrap_or(0))
    };
    let combined = format!("{} {}", caps.get(1)?.as_str(), caps.get(2)?.as_str());
    let modified_at = ["%m-%d-%y %I:%M%p", "%m-%d-%y %H:%M", "%m-%d-%Y %I:%M%p", "%m-%d-%Y %H:%M"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(&combined, format).ok())
        .map(|dt| Utc.from_utc_datetime(&dt));

    Some(FileInfo {
        name: caps.get(4)?.as_str().to_string(),
        kind,
        size,
        modified_at,
    })
}
