//! Score, parts, part groups and transient sections
//!
//! Parts and groups live in arenas inside [`Score`] and are referenced by
//! index. The `layout` list keeps the document order of top-level entries;
//! groups hold their own ordered entries, so the part-list nests naturally.

use serde::{Deserialize, Serialize};

use super::types::Bar;

pub type PartId = usize;
pub type GroupId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "entry", content = "id", rename_all = "lowercase")]
pub enum ScoreEntry {
    Part(PartId),
    Group(GroupId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupSymbol {
    #[default]
    Bracket,
    Brace,
    Line,
    Square,
    None,
}

impl GroupSymbol {
    pub fn as_str(&self) -> &'static str {
        match self {
            GroupSymbol::Bracket => "bracket",
            GroupSymbol::Brace => "brace",
            GroupSymbol::Line => "line",
            GroupSymbol::Square => "square",
            GroupSymbol::None => "none",
        }
    }

    /// From a `systemStartDelimiter` value.
    pub fn from_delimiter(value: &str) -> Option<GroupSymbol> {
        match value.trim_start_matches(['#', '\'']) {
            "SystemStartBracket" => Some(GroupSymbol::Bracket),
            "SystemStartBrace" => Some(GroupSymbol::Brace),
            "SystemStartBar" => Some(GroupSymbol::Line),
            "SystemStartSquare" => Some(GroupSymbol::Square),
            _ => None,
        }
    }
}

/// Bracketed group of staves (`StaffGroup`, `ChoirStaff`, `GrandStaff`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartGroup {
    /// Group number unique among the groups open at the same time
    pub number: u32,
    pub name: Option<String>,
    pub abbr: Option<String>,
    pub symbol: GroupSymbol,
    pub entries: Vec<ScoreEntry>,
}

/// One staff, or one piano staff pair, with all of its bars.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Part {
    /// Context id from `\new Staff = "id"`
    pub context_id: Option<String>,
    pub name: Option<String>,
    pub abbr: Option<String>,
    pub midi: Option<String>,
    pub staves: u32,
    pub bars: Vec<Bar>,
}

impl Part {
    pub fn new(context_id: Option<String>) -> Self {
        Self {
            context_id,
            staves: 1,
            ..Default::default()
        }
    }

    pub fn has_music(&self) -> bool {
        self.bars.iter().any(Bar::has_music)
    }
}

/// A named run of bars built for one voice and merged into its target later.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub name: String,
    pub voice_name: Option<String>,
    pub bars: Vec<Bar>,
}

impl Section {
    pub fn new(name: impl Into<String>, voice_name: Option<String>) -> Self {
        Self {
            name: name.into(),
            voice_name,
            bars: vec![Bar::new()],
        }
    }

    pub fn current_bar(&mut self) -> &mut Bar {
        if self.bars.is_empty() {
            self.bars.push(Bar::new());
        }
        let last = self.bars.len() - 1;
        &mut self.bars[last]
    }

    pub fn has_music(&self) -> bool {
        self.bars.iter().any(Bar::has_music)
    }
}

/// Header metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreMeta {
    pub title: Option<String>,
    pub subtitle: Option<String>,
    /// (type, name) pairs such as ("composer", "J. S. Bach")
    pub creators: Vec<(String, String)>,
    pub rights: Option<String>,
    /// Remaining header fields, written as miscellaneous identification
    pub info: Vec<(String, String)>,
}

/// The finished model handed to the emission walker.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Score {
    pub meta: ScoreMeta,
    pub parts: Vec<Part>,
    pub groups: Vec<PartGroup>,
    /// Top-level entries in document order
    pub layout: Vec<ScoreEntry>,
}

impl Score {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parts in document order, descending into groups.
    pub fn part_order(&self) -> Vec<PartId> {
        let mut out = Vec::new();
        for entry in &self.layout {
            self.collect_parts(*entry, &mut out);
        }
        out
    }

    fn collect_parts(&self, entry: ScoreEntry, out: &mut Vec<PartId>) {
        match entry {
            ScoreEntry::Part(id) => out.push(id),
            ScoreEntry::Group(id) => {
                if let Some(group) = self.groups.get(id) {
                    for child in &group.entries {
                        self.collect_parts(*child, out);
                    }
                }
            }
        }
    }

    pub fn part_by_context_id(&self, id: &str) -> Option<PartId> {
        self.parts
            .iter()
            .position(|p| p.context_id.as_deref() == Some(id))
    }

    pub fn is_empty(&self) -> bool {
        !self.parts.iter().any(Part::has_music)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_part_order_descends_groups() {
        let mut score = Score::new();
        score.parts = vec![Part::new(None), Part::new(Some("a".into())), Part::new(None)];
        score.groups.push(PartGroup {
            number: 1,
            entries: vec![ScoreEntry::Part(1), ScoreEntry::Part(2)],
            ..Default::default()
        });
        score.layout = vec![ScoreEntry::Part(0), ScoreEntry::Group(0)];
        assert_eq!(score.part_order(), vec![0, 1, 2]);
        assert_eq!(score.part_by_context_id("a"), Some(1));
    }

    #[test]
    fn test_delimiter() {
        assert_eq!(GroupSymbol::from_delimiter("#'SystemStartBrace"), Some(GroupSymbol::Brace));
        assert_eq!(GroupSymbol::from_delimiter("Other"), None);
    }
}
