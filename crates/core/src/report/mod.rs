//! Reader and writer for the comparison engine's result stream.
//!
//! Each non-empty line describes one compared pair (wrapped here at each `# `):
//!
//! ```text
//! <a> + <b>: tokens <n>   lines <n>
//! # total tokens <n> + <n>, total lines <n> + <n>, percentage matched <n>% + <n>%
//! # <region>{# <region>}
//! ```
//!
//! where a region is `<a1>-<a2>, <b1>-<b2>: <tokens>`. Anything else is a broken contract with
//! the engine and aborts the run.

use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::{Error, IoContext, Result};
use crate::types::{MatchRegion, Range};


const REGION_SEP: &str = "# ";

static LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"^(.+) \+ (.+): tokens (-?\d+)   lines (-?\d+)# ",
        r"total tokens (-?\d+) \+ (-?\d+), ",
        r"total lines (-?\d+) \+ (-?\d+), ",
        r"percentage matched (-?\d+)% \+ (-?\d+)%# (.*)$",
    ))
    .expect("result line regex")
});

static REGION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+)-(\d+), (\d+)-(\d+): (-?\d+)$").expect("region regex")
});

/// One parsed pair line, exactly as the engine reported it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportLine {
    pub names: [String; 2],
    pub tokens: i64,
    pub lines: i64,
    pub total_tokens: [i64; 2],
    /// Engine line counts; one more than the working copy's physical lines.
    pub total_lines: [i64; 2],
    pub percent_matched: [i64; 2],
    pub regions: Vec<MatchRegion>,
}

impl fmt::Display for ReportLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} + {}: tokens {}   lines {}# total tokens {} + {}, total lines {} + {}, \
             percentage matched {}% + {}%",
            self.names[0],
            self.names[1],
            self.tokens,
            self.lines,
            self.total_tokens[0],
            self.total_tokens[1],
            self.total_lines[0],
            self.total_lines[1],
            self.percent_matched[0],
            self.percent_matched[1],
        )?;
        for region in &self.regions {
            write!(f, "{REGION_SEP}{}, {}: {}", region.a, region.b, region.tokens)?;
        }
        Ok(())
    }
}

fn parse_int<T: std::str::FromStr>(raw: &str, line: &str) -> Result<T> {
    raw.parse::<T>()
        .map_err(|_| Error::protocol(line, format!("integer out of range: {raw}")))
}

pub fn parse_regions(raw: &str, line: &str) -> Result<Vec<MatchRegion>> {
    let mut regions = Vec::new();
    for part in raw.split(REGION_SEP) {
        let Some(caps) = REGION_RE.captures(part) else {
            return Err(Error::protocol(line, format!("malformed region {part:?}")));
        };
        let a = Range::new(parse_int(&caps[1], line)?, parse_int(&caps[2], line)?);
        let b = Range::new(parse_int(&caps[3], line)?, parse_int(&caps[4], line)?);
        if a.is_empty() || b.is_empty() || a.start == 0 || b.start == 0 {
            return Err(Error::protocol(line, format!("invalid region range {part:?}")));
        }
        regions.push(MatchRegion::new(a, b, parse_int(&caps[5], line)?));
    }
    Ok(regions)
}

pub fn parse_line(raw: &str) -> Result<ReportLine> {
    let line = raw.trim();
    let Some(caps) = LINE_RE.captures(line) else {
        return Err(Error::protocol(line, "line does not match result grammar"));
    };

    Ok(ReportLine {
        names: [caps[1].to_string(), caps[2].to_string()],
        tokens: parse_int(&caps[3], line)?,
        lines: parse_int(&caps[4], line)?,
        total_tokens: [parse_int(&caps[5], line)?, parse_int(&caps[6], line)?],
        total_lines: [parse_int(&caps[7], line)?, parse_int(&caps[8], line)?],
        percent_matched: [parse_int(&caps[9], line)?, parse_int(&caps[10], line)?],
        regions: parse_regions(&caps[11], line)?,
    })
}

/// Parses every non-blank line of a result stream, preserving engine order.
pub fn parse_report(text: &str) -> Result<Vec<ReportLine>> {
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .map(parse_line)
        .collect()
}

pub fn read_report(path: &Path) -> Result<Vec<ReportLine>> {
    let text = fs::read_to_string(path).at(path)?;
    parse_report(&text)
}
