//! The user's output restrictions, applied in a fixed order to each patch
//! set as the time-ordered index is walked.

use cvs_log::DateParser;
use patchset::{Engine, PatchSetId};
use regex::Regex;

use crate::Opt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatchSetRange {
    pub min: usize,
    pub max: usize,
}

/// Parses a `-s` argument: comma-separated `N` or `N-M` ranges, with an
/// absent `M` meaning unbounded.
pub fn parse_ranges(spec: &str) -> Result<Vec<PatchSetRange>, String> {
    spec.split(',')
        .map(|part| {
            let (min, max) = match part.split_once('-') {
                Some((min, "")) => (min, None),
                Some((min, max)) => (min, Some(max)),
                None => (part, Some(part)),
            };

            let min = min
                .parse()
                .map_err(|_| format!("bad patch set range {:?}", part))?;
            let max = match max {
                Some(max) => max
                    .parse()
                    .map_err(|_| format!("bad patch set range {:?}", part))?,
                None => usize::MAX,
            };

            Ok(PatchSetRange { min, max })
        })
        .collect()
}

pub struct Restrictions {
    date_start: Option<i64>,
    date_end: Option<i64>,
    author: Option<String>,
    log_regex: Option<Regex>,
    file: Option<String>,
    branch: Option<String>,
    pub ranges: Vec<PatchSetRange>,

    tag_start: Option<String>,
    tag_end: Option<String>,

    // Counters of the patch sets the -r tags resolved to. Zero means "not
    // seen yet": they resolve during the walk itself, which is why the walk
    // may need more than one pass to apply a tag range fully.
    tag_ps_start: usize,
    tag_ps_end: usize,
}

impl Restrictions {
    pub fn from_opt(opt: &Opt) -> anyhow::Result<Self> {
        let dates = DateParser::new();
        let parse_date = |which: usize| -> anyhow::Result<Option<i64>> {
            match opt.date.get(which) {
                Some(spec) => dates
                    .parse(spec)
                    .map(Some)
                    .ok_or_else(|| anyhow::anyhow!("unparseable date {:?}", spec)),
                None => Ok(None),
            }
        };

        Ok(Self {
            date_start: parse_date(0)?,
            date_end: parse_date(1)?,
            author: opt.author.clone(),
            log_regex: opt.log_filter.clone(),
            file: opt.file.clone(),
            branch: opt.branch.clone(),
            ranges: opt
                .show
                .as_deref()
                .map(parse_ranges)
                .transpose()
                .map_err(|e| anyhow::anyhow!(e))?
                .unwrap_or_default(),
            tag_start: opt.tag.get(0).cloned(),
            tag_end: opt.tag.get(1).cloned(),
            tag_ps_start: 0,
            tag_ps_end: 0,
        })
    }

    /// Whether the patch set at visitation counter `counter` passes every
    /// active restriction. Mutates the tag-range resolution state as tagged
    /// patch sets are encountered.
    pub fn select(&mut self, engine: &Engine, id: PatchSetId, counter: usize) -> bool {
        let ps = engine.patchset(id);

        if let Some(start) = self.date_start {
            if ps.date < start {
                return false;
            }
            if let Some(end) = self.date_end {
                if ps.date > end {
                    return false;
                }
            }
        }

        if let Some(author) = &self.author {
            if **author != *ps.author {
                return false;
            }
        }

        if let Some(regex) = &self.log_regex {
            if !regex.is_match(&ps.descr) {
                return false;
            }
        }

        if let Some(file) = &self.file {
            if !engine.patch_set_contains_member(id, file) {
                return false;
            }
        }

        if let Some(branch) = &self.branch {
            if !engine.patch_set_affects_branch(id, branch) {
                return false;
            }
        }

        // The funk factor overrides the tag range: a positive factor forces
        // the patch set in even though it falls before the start tag, a
        // negative one forces it out.
        if ps.funk_factor < 0 {
            return false;
        }

        if ps.funk_factor == 0 {
            if let Some(tag_start) = &self.tag_start {
                if self.tag_ps_start == 0 && ps.tag.as_deref() == Some(tag_start.as_str()) {
                    self.tag_ps_start = counter;
                }
            }
            if let Some(tag_end) = &self.tag_end {
                if self.tag_ps_end == 0 && ps.tag.as_deref() == Some(tag_end.as_str()) {
                    self.tag_ps_end = counter;
                }
            }

            if self.tag_start.is_some() {
                if self.tag_ps_start == 0 || counter <= self.tag_ps_start {
                    if counter == self.tag_ps_start {
                        log::debug!(
                            "patch set {} matches tag {}",
                            counter,
                            self.tag_start.as_deref().unwrap_or("")
                        );
                    }
                    return false;
                }

                if self.tag_end.is_some() && self.tag_ps_end > 0 && counter > self.tag_ps_end {
                    return false;
                }
            }
        }

        if !self.ranges.is_empty()
            && !self
                .ranges
                .iter()
                .any(|range| range.min <= counter && counter <= range.max)
        {
            return false;
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ranges() {
        assert_eq!(
            parse_ranges("3").unwrap(),
            vec![PatchSetRange { min: 3, max: 3 }]
        );
        assert_eq!(
            parse_ranges("2-5").unwrap(),
            vec![PatchSetRange { min: 2, max: 5 }]
        );
        assert_eq!(
            parse_ranges("2-").unwrap(),
            vec![PatchSetRange {
                min: 2,
                max: usize::MAX
            }]
        );
        assert_eq!(
            parse_ranges("1,4-6").unwrap(),
            vec![
                PatchSetRange { min: 1, max: 1 },
                PatchSetRange { min: 4, max: 6 },
            ]
        );

        assert!(parse_ranges("x").is_err());
        assert!(parse_ranges("1-y").is_err());
    }
}
