//! Selection of the entries of a product by shell-style wildcard patterns.
use crate::error::PatternError;
use regex::Regex;

/// Shell-style wildcard pattern (`*`, `?`, `[seq]`, `[!seq]`) matched against
/// a whole, case-sensitive string.
#[derive(Debug, Clone)]
pub struct GlobPattern {
    pattern: String,
    regex: Regex,
}

impl GlobPattern {
    pub fn new(pattern: &str) -> Result<Self, PatternError> {
        let regex = Regex::new(&translate(pattern)).map_err(|source| PatternError::Regex {
            pattern: pattern.to_string(),
            source,
        })?;
        Ok(Self {
            pattern: pattern.to_string(),
            regex,
        })
    }

    pub fn matches(&self, name: &str) -> bool {
        self.regex.is_match(name)
    }

    pub fn as_str(&self) -> &str {
        &self.pattern
    }
}

fn translate(pattern: &str) -> String {
    let chars: Vec<char> = pattern.chars().collect();
    let mut out = String::from("(?s)^");
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        i += 1;
        match c {
            '*' => {
                // collapse runs of stars
                while i < chars.len() && chars[i] == '*' {
                    i += 1;
                }
                out.push_str(".*");
            }
            '?' => out.push('.'),
            '[' => match class_end(&chars, i) {
                Some(end) => {
                    out.push_str(&translate_class(&chars[i..end]));
                    i = end + 1;
                }
                None => out.push_str(r"\["),
            },
            _ => out.push_str(&regex::escape(&c.to_string())),
        }
    }
    out.push('$');
    out
}

/// Index of the `]` closing a class opened just before `start`.
fn class_end(chars: &[char], start: usize) -> Option<usize> {
    let mut j = start;
    if j < chars.len() && chars[j] == '!' {
        j += 1;
    }
    // a leading ']' is a member, not the terminator
    if j < chars.len() && chars[j] == ']' {
        j += 1;
    }
    while j < chars.len() && chars[j] != ']' {
        j += 1;
    }
    (j < chars.len()).then_some(j)
}

fn translate_class(members: &[char]) -> String {
    let mut out = String::from("[");
    let mut members = members;
    if let Some(('!', rest)) = members.split_first() {
        out.push('^');
        members = rest;
    }
    for &c in members {
        if c == '-' {
            out.push('-');
        } else {
            out.push_str(&regex::escape(&c.to_string()));
        }
    }
    out.push(']');
    out
}

/// Which entries of a product to retrieve.
#[derive(Debug, Clone)]
pub enum EntrySelection {
    /// Explicit coverage patterns, e.g. `*_????_0035.nc`
    Coverage(Vec<GlobPattern>),
    /// FCI body chunk ids
    Chunks(Vec<u32>),
}

impl EntrySelection {
    pub fn coverage<S: AsRef<str>>(patterns: &[S]) -> Result<Self, PatternError> {
        let patterns = patterns
            .iter()
            .map(|p| GlobPattern::new(p.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(EntrySelection::Coverage(patterns))
    }

    pub fn filter(&self, entries: &[String]) -> Vec<String> {
        match self {
            EntrySelection::Coverage(patterns) => filter_by_coverage(patterns, entries),
            EntrySelection::Chunks(ids) => filter_by_chunks(ids, entries),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            EntrySelection::Coverage(patterns) => patterns.is_empty(),
            EntrySelection::Chunks(ids) => ids.is_empty(),
        }
    }
}

/// Entries matching any of the coverage patterns, grouped by pattern. An entry
/// matched by several patterns is kept once, at its first match.
pub fn filter_by_coverage(patterns: &[GlobPattern], entries: &[String]) -> Vec<String> {
    let mut selected: Vec<String> = vec![];
    for pattern in patterns {
        for entry in entries {
            if pattern.matches(entry) && !selected.contains(entry) {
                selected.push(entry.clone());
            }
        }
    }
    selected
}

/// Pattern matching the body file of one FCI chunk, `..._<cycle>_00<chunk>.nc`.
pub fn chunk_pattern(chunk: u32) -> GlobPattern {
    let pattern = format!("*_????_00{chunk:02}.nc");
    GlobPattern::new(&pattern).expect("Chunk pattern should always compile")
}

/// Entries holding one of the given chunks, in listing order.
pub fn filter_by_chunks(chunks: &[u32], entries: &[String]) -> Vec<String> {
    let patterns: Vec<GlobPattern> = chunks.iter().map(|c| chunk_pattern(*c)).collect();
    entries
        .iter()
        .filter(|entry| patterns.iter().any(|p| p.matches(entry)))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY_34: &str = "W_XX-EUMETSAT-Darmstadt,IMG+SAT,MTI1+FCI-1C-RRAD-FDHSI-FD--CHK-BODY---NC4E_C_EUMT_20240916110920_IDPFI_OPE_20240916110007_20240916110017_N_JLS_C_0066_0034.nc";
    const BODY_35: &str = "W_XX-EUMETSAT-Darmstadt,IMG+SAT,MTI1+FCI-1C-RRAD-FDHSI-FD--CHK-BODY---NC4E_C_EUMT_20240916110921_IDPFI_OPE_20240916110007_20240916110017_N_JLS_C_0066_0035.nc";
    const TRAILER: &str = "W_XX-EUMETSAT-Darmstadt,IMG+SAT,MTI1+FCI-1C-RRAD-FDHSI-FD--CHK-TRAIL---NC4E_C_EUMT_20240916111011_IDPFI_OPE_20240916110007_20240916111000_N_JLS_C_0066_0041.nc";

    fn entries() -> Vec<String> {
        vec![BODY_34, BODY_35, TRAILER, "manifest.xml"]
            .into_iter()
            .map(String::from)
            .collect()
    }

    #[test]
    fn test_glob_wildcards() {
        let p = GlobPattern::new("test*").unwrap();
        assert!(p.matches("test"));
        assert!(p.matches("test_file.nc"));
        assert!(!p.matches("a_test"));
        assert!(!p.matches("Test"));

        let p = GlobPattern::new("B0?.tif").unwrap();
        assert!(p.matches("B04.tif"));
        assert!(!p.matches("B4.tif"));
        assert!(!p.matches("B04xtif"));
    }

    #[test]
    fn test_glob_classes() {
        let p = GlobPattern::new("chunk_[0-3].nc").unwrap();
        assert!(p.matches("chunk_2.nc"));
        assert!(!p.matches("chunk_7.nc"));

        let p = GlobPattern::new("chunk_[!0-3].nc").unwrap();
        assert!(p.matches("chunk_7.nc"));
        assert!(!p.matches("chunk_2.nc"));

        let p = GlobPattern::new("[]]x").unwrap();
        assert!(p.matches("]x"));

        // unterminated class is literal
        let p = GlobPattern::new("a[b").unwrap();
        assert!(p.matches("a[b"));
    }

    #[test]
    fn test_filter_by_chunks() {
        assert_eq!(filter_by_chunks(&[35], &entries()), vec![BODY_35.to_string()]);
        assert_eq!(
            filter_by_chunks(&[35, 34], &entries()),
            vec![BODY_34.to_string(), BODY_35.to_string()]
        );
        assert!(filter_by_chunks(&[1], &entries()).is_empty());
        assert!(filter_by_chunks(&[], &entries()).is_empty());
    }

    #[test]
    fn test_filter_by_coverage_is_pattern_major_and_unique() {
        let selection = EntrySelection::coverage(&["*_0041.nc", "*CHK-*", "*.xml"]).unwrap();
        assert_eq!(
            selection.filter(&entries()),
            vec![
                TRAILER.to_string(),
                BODY_34.to_string(),
                BODY_35.to_string(),
                "manifest.xml".to_string()
            ]
        );
    }

    #[test]
    fn test_chunk_pattern_zero_pads() {
        assert_eq!(chunk_pattern(7).as_str(), "*_????_0007.nc");
        assert!(chunk_pattern(7).matches("x_0066_0007.nc"));
        assert!(!chunk_pattern(7).matches("x_0066_0017.nc"));
    }
}
