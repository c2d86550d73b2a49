use crate::archive::category::Category;
use crate::archive::util::{base_name, parse_embedded_date};
use crate::error::{ArchiveError, ArchiveResult};
use chrono::DateTime;
use chrono_tz::Tz;
use std::fs;
use std::path::{Path, PathBuf};
use wildmatch::WildMatch;

/// `sc` + category letter + 8 date characters + sequence/extension.
const FRAGMENT_PATTERN: &str = "sc?????????*.gz";

/// Position inside a [`MatchSet`]. `low..high` is the last slice handed out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SliceCursor {
    low: usize,
    high: usize,
    date: Option<DateTime<Tz>>,
}

#[derive(Debug, Clone, Copy)]
pub struct Slice<'a> {
    pub date: DateTime<Tz>,
    pub fragments: &'a [PathBuf],
}

/// Sorted fragment paths for one category.
#[derive(Debug, Clone)]
pub struct MatchSet {
    category: Category,
    matches: Vec<PathBuf>,
}

fn is_fragment_name(category: Category, matcher: &WildMatch, name: &str) -> bool {
    if !matcher.matches(name) {
        return false;
    }
    match name.get(3..11) {
        Some(date) => name != category.aggregate_file_name(date),
        None => false,
    }
}

fn read_dir_sorted(dir: &Path) -> ArchiveResult<Vec<PathBuf>> {
    let mut out = Vec::new();
    for entry in fs::read_dir(dir).map_err(|err| ArchiveError::at(dir, err))? {
        let entry = entry.map_err(|err| ArchiveError::at(dir, err))?;
        out.push(entry.path());
    }
    out.sort();
    Ok(out)
}

impl MatchSet {
    /// Collect `<root>/<category>/*/*/<fragment>` in lexical order.
    pub fn scan(root: &Path, category: Category) -> ArchiveResult<Self> {
        let category_dir = root.join(category.as_str());
        let years = match read_dir_sorted(&category_dir) {
            Ok(years) => years,
            Err(err) if err.is_not_found() => return Ok(Self::from_paths(category, Vec::new())),
            Err(err) => return Err(err),
        };

        let matcher = WildMatch::new(FRAGMENT_PATTERN);
        let mut matches = Vec::new();
        for year in years.into_iter().filter(|p| p.is_dir()) {
            for month in read_dir_sorted(&year)?.into_iter().filter(|p| p.is_dir()) {
                for path in read_dir_sorted(&month)? {
                    if is_fragment_name(category, &matcher, base_name(&path)) {
                        matches.push(path);
                    }
                }
            }
        }
        Ok(Self::from_paths(category, matches))
    }

    pub fn from_paths(category: Category, mut matches: Vec<PathBuf>) -> Self {
        matches.sort();
        Self { category, matches }
    }

    pub fn category(&self) -> Category {
        self.category
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.matches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    #[cfg(test)]
    pub fn paths(&self) -> &[PathBuf] {
        &self.matches
    }

    /// Hand out the next run of fragments sharing one embedded date.
    ///
    /// Returns `Ok(None)` once the set is exhausted or the next date is not
    /// strictly before `cutoff`; the cursor is left untouched in that case.
    /// A malformed date anywhere in the scanned run is an error.
    pub fn next_slice<'a>(
        &'a self,
        cursor: &mut SliceCursor,
        cutoff: &DateTime<Tz>,
        tz: Tz,
    ) -> ArchiveResult<Option<Slice<'a>>> {
        let low = cursor.high;
        if low >= self.matches.len() {
            return Ok(None);
        }

        let date = parse_embedded_date(base_name(&self.matches[low]), tz)?;
        if date >= *cutoff {
            return Ok(None);
        }

        let mut high = self.matches.len();
        for (i, candidate) in self.matches[low..].iter().enumerate().skip(1) {
            let candidate_date = parse_embedded_date(base_name(candidate), tz)?;
            if candidate_date != date {
                high = low + i;
                break;
            }
        }

        cursor.low = low;
        cursor.high = high;
        cursor.date = Some(date);
        Ok(self.slice_at(cursor))
    }

    /// The slice `cursor` currently points at.
    fn slice_at<'a>(&'a self, cursor: &SliceCursor) -> Option<Slice<'a>> {
        let date = cursor.date?;
        Some(Slice {
            date,
            fragments: &self.matches[cursor.low..cursor.high],
        })
    }
}
