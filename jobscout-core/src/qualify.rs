use regex::Regex;
use serde::{Deserialize, Serialize};

/// Qualification sections pulled out of a free-text job description.
/// Derived purely from the description; every list may be empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualificationBlock {
    pub minimum: Vec<String>,
    pub preferred: Vec<String>,
    pub requirements: Vec<String>,
}

impl QualificationBlock {
    pub fn is_empty(&self) -> bool {
        self.minimum.is_empty() && self.preferred.is_empty() && self.requirements.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Minimum,
    Preferred,
    Requirements,
}

#[derive(Debug, Clone, Copy)]
struct Marker {
    start: usize,
    end: usize,
    section: Section,
}

/// Splits a job description into qualification sections with an ordered
/// marker scan: every recognized header is located by offset, markers are
/// sorted ascending, and each section body runs from the end of its header
/// to the start of the next surviving marker. A marker beginning inside a
/// previously accepted header span is discarded (first match wins), which is
/// what keeps the bare "Qualifications" header from re-matching inside
/// "Minimum Qualifications".
#[derive(Debug, Clone)]
pub struct QualificationParser {
    patterns: Vec<(Section, Regex)>,
}

impl Default for QualificationParser {
    fn default() -> Self {
        Self::new()
    }
}

impl QualificationParser {
    pub fn new() -> Self {
        let patterns = vec![
            (
                Section::Minimum,
                Regex::new(r"(?i)minimum\s+qualifications\s*:?").expect("valid regex"),
            ),
            (
                Section::Preferred,
                Regex::new(r"(?i)preferred\s+qualifications\s*:?").expect("valid regex"),
            ),
            (
                Section::Requirements,
                Regex::new(r"(?i)\bqualifications\s*:?").expect("valid regex"),
            ),
            (
                Section::Requirements,
                Regex::new(r"(?i)\brequirements?\b\s*:?").expect("valid regex"),
            ),
        ];
        Self { patterns }
    }

    /// Never fails: a marker-free or otherwise unparseable description
    /// yields an all-empty block.
    pub fn parse(&self, description: &str) -> QualificationBlock {
        let markers = self.scan_markers(description);
        let mut block = QualificationBlock::default();
        for (idx, marker) in markers.iter().enumerate() {
            let body_end = markers
                .get(idx + 1)
                .map(|next| next.start)
                .unwrap_or(description.len());
            let body = &description[marker.end..body_end];
            let items = split_items(body);
            match marker.section {
                Section::Minimum => block.minimum.extend(items),
                Section::Preferred => block.preferred.extend(items),
                Section::Requirements => block.requirements.extend(items),
            }
        }
        block
    }

    fn scan_markers(&self, description: &str) -> Vec<Marker> {
        let mut found = Vec::new();
        for (section, pattern) in &self.patterns {
            for hit in pattern.find_iter(description) {
                found.push(Marker {
                    start: hit.start(),
                    end: hit.end(),
                    section: *section,
                });
            }
        }
        // Ascending by offset; on a shared offset the longer header wins.
        found.sort_by(|a, b| a.start.cmp(&b.start).then(b.end.cmp(&a.end)));

        let mut accepted: Vec<Marker> = Vec::new();
        for marker in found {
            match accepted.last() {
                Some(last) if marker.start < last.end => continue,
                _ => accepted.push(marker),
            }
        }
        accepted
    }
}

fn split_items(body: &str) -> Vec<String> {
    body.split(|c| c == '\n' || c == '\u{2022}')
        .map(strip_bullet)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

fn strip_bullet(line: &str) -> &str {
    let trimmed = line.trim();
    trimmed
        .strip_prefix("- ")
        .or_else(|| trimmed.strip_prefix("* "))
        .or_else(|| trimmed.strip_prefix("\u{2013} "))
        .unwrap_or(trimmed)
        .trim()
}
