use std::fmt;

use crate::error::{Error, Result};
use crate::submission::{Submission, SubmissionId};
use crate::types::{HighlightRegion, MatchRegion, Range, RegionTag, SubmissionKind};


/// The parts of a submission a pair needs once the engine has measured it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairSide {
    pub id: SubmissionId,
    pub name: String,
    pub student: String,
    pub tokens: i64,
    pub lines: u32,
}

impl PairSide {
    pub fn from_submission(submit: &Submission, has_submit_num: bool) -> Self {
        Self {
            id: submit.id(),
            name: submit.name.clone(),
            student: submit.student(has_submit_num).to_string(),
            tokens: submit.tokens.unwrap_or(0),
            lines: submit.lines,
        }
    }

    pub fn kind(&self) -> SubmissionKind {
        self.id.kind
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TokenCounts {
    pub matched: i64,
    /// Tokens that only match once boilerplate is no longer filtered.
    pub common: i64,
}

/// Comparison result between two submissions.
#[derive(Debug, Clone, PartialEq)]
pub struct Pair {
    pub sides: [PairSide; 2],
    pub is_self: bool,
    pub tokens: TokenCounts,
    /// Sorted by descending token count, then by the two ranges.
    pub matches: Vec<MatchRegion>,
    regions: Option<[Vec<HighlightRegion>; 2]>,
    percent: Option<[f64; 2]>,
}

impl Pair {
    pub fn new(
        a: PairSide,
        b: PairSide,
        matched_tokens: i64,
        mut matches: Vec<MatchRegion>,
    ) -> Self {
        matches.sort_by(|x, y| {
            y.tokens
                .cmp(&x.tokens)
                .then_with(|| x.a.cmp(&y.a))
                .then_with(|| x.b.cmp(&y.b))
        });
        let is_self = a.student == b.student;
        Self {
            sides: [a, b],
            is_self,
            tokens: TokenCounts {
                matched: matched_tokens,
                common: 0,
            },
            matches,
            regions: None,
            percent: None,
        }
    }

    pub fn names(&self) -> [&str; 2] {
        [&self.sides[0].name, &self.sides[1].name]
    }

    /// Per-side highlight segments, available after [`Pair::find_common`].
    pub fn regions(&self) -> Option<&[Vec<HighlightRegion>; 2]> {
        self.regions.as_ref()
    }

    /// Per-side match percentage, available after [`Pair::calc_percent`].
    pub fn percent(&self) -> Option<[f64; 2]> {
        self.percent
    }

    /// Classifies every line of both sides using the no-baseline run of this pair.
    ///
    /// Lines covered by `nobase` regions are common; lines covered by this pair's own match
    /// regions are stamped with the region index and win over common.
    pub fn find_common(&mut self, nobase_tokens: i64, nobase: &[MatchRegion]) -> Result<()> {
        if self.regions.is_some() {
            return Err(Error::PairState {
                pair: self.to_string(),
                what: "common regions",
            });
        }
        let Some(extra) = nobase_tokens.checked_sub(self.tokens.matched) else {
            return Err(Error::protocol(
                self.to_string(),
                format!("no-baseline token count {nobase_tokens} out of range"),
            ));
        };
        let a = self.side_regions(0, nobase)?;
        let b = self.side_regions(1, nobase)?;
        self.tokens.common = extra.max(0);
        self.regions = Some([a, b]);
        Ok(())
    }

    fn side_regions(&self, side: usize, nobase: &[MatchRegion]) -> Result<Vec<HighlightRegion>> {
        let line_count = self.sides[side].lines;
        let mut stamps = vec![RegionTag::Unmatched; line_count as usize + 1];

        for region in nobase {
            self.stamp(&mut stamps, region.side(side), RegionTag::Common)?;
        }
        for (idx, region) in self.matches.iter().enumerate() {
            self.stamp(&mut stamps, region.side(side), RegionTag::Match(idx))?;
        }

        Ok(compress_stamps(&stamps))
    }

    fn stamp(&self, stamps: &mut [RegionTag], range: Range, tag: RegionTag) -> Result<()> {
        let (start, end) = (range.start as usize, range.end as usize);
        if start == 0 || end >= stamps.len() {
            return Err(Error::protocol(
                self.to_string(),
                format!(
                    "region {range} outside 1-{} lines of the submission",
                    stamps.len() - 1
                ),
            ));
        }
        for slot in &mut stamps[start..=end] {
            *slot = tag;
        }
        Ok(())
    }

    /// `matched / (side tokens - common) * 100` per side, rounded to two decimals.
    pub fn calc_percent(&mut self) -> Result<()> {
        if self.percent.is_some() {
            return Err(Error::PairState {
                pair: self.to_string(),
                what: "percent",
            });
        }
        let calc = |side: &PairSide| {
            let denom = side.tokens.saturating_sub(self.tokens.common);
            if denom <= 0 {
                return 0.0;
            }
            let pct = self.tokens.matched as f64 / denom as f64 * 100.0;
            (pct * 100.0).round() / 100.0
        };
        self.percent = Some([calc(&self.sides[0]), calc(&self.sides[1])]);
        Ok(())
    }
}

impl fmt::Display for Pair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Pair({}, {}, match={}, common={})",
            self.sides[0].name, self.sides[1].name, self.tokens.matched, self.tokens.common
        )
    }
}

/// Collapses per-line stamps (index 0 unused) into contiguous segments covering `1..len`.
fn compress_stamps(stamps: &[RegionTag]) -> Vec<HighlightRegion> {
    let mut out: Vec<HighlightRegion> = Vec::new();
    for (line, &tag) in stamps.iter().enumerate().skip(1) {
        let line = line as u32;
        match out.last_mut() {
            Some(last) if last.tag == tag => last.range.end = line,
            _ => out.push(HighlightRegion {
                range: Range::new(line, line),
                tag,
            }),
        }
    }
    out
}
