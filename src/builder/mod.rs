//! Score builder
//!
//! Receives build calls from the translator and accumulates them into the bar
//! model. Music is always written into the top of a stack of open sections:
//!
//! ```text
//! global section      music outside any staff
//! └── part section    \new Staff
//!     └── voice       \new Voice, or a << \\ >> branch
//! ```
//!
//! Closing a section merges its bars into its target: a part section into the
//! part, a voice section into the section below it. Voice sections of one fork
//! wait until the fork ends so they all merge against the same bars.

pub mod beams;
pub mod lyrics;

use log::debug;

pub use beams::{ItemRef, Meter};
pub use lyrics::{LyricEvent, LyricSection};

use beams::{BeamAssignments, BeamCursor};

use crate::diagnostics::{DiagnosticKind, Diagnostics};
use crate::ir::{
    clef_from_name, merge_bars, Bar, BarBackup, BarItem, BarMus, BarNote, BarRest, Barline,
    BeamState, Dynamics, DynamicsKind, Edge, Glissando, GraceNote, GroupId, GroupSymbol, Harmony,
    KeyAttr, LineStyle, NotationGroup, NoteType, OctaveShift, Part, PartGroup, PartId, Score,
    ScoreEntry, Section, ShiftKind, Slur, TempoDir, TieType, TimeAttr, Tremolo, Tuplet, WedgeKind,
};
use crate::models::{zero, Pitch, Rational};

/// Where a section's bars go when it closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeTarget {
    Part(PartId),
    /// Bar `offset` of the section below
    Parent { offset: usize },
    /// `Devnull`
    Discard,
    Global,
}

/// A note about to be written.
#[derive(Debug, Clone, PartialEq)]
pub struct NoteSpec {
    pub pitch: Pitch,
    pub duration: Rational,
    pub note_type: NoteType,
    pub onset: Rational,
    pub tuplets: Vec<Tuplet>,
    pub grace: Option<GraceNote>,
    pub unpitched: bool,
    pub instrument: Option<String>,
}

impl NoteSpec {
    pub fn new(pitch: Pitch, duration: Rational, note_type: NoteType, onset: Rational) -> Self {
        Self {
            pitch,
            duration,
            note_type,
            onset,
            tuplets: Vec::new(),
            grace: None,
            unpitched: false,
            instrument: None,
        }
    }
}

/// Where a voice section starts inside the section below it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoiceStart {
    /// Bar of the parent section the voice merges into
    pub bar: usize,
    /// Time already elapsed in that bar
    pub lead: Rational,
    /// Absolute time at the start
    pub onset: Rational,
}

impl VoiceStart {
    pub fn at_bar_start(bar: usize, onset: Rational) -> Self {
        Self {
            bar,
            lead: zero(),
            onset,
        }
    }
}

/// A rest or spacer about to be written.
#[derive(Debug, Clone, PartialEq)]
pub struct RestSpec {
    pub duration: Rational,
    pub note_type: NoteType,
    pub onset: Rational,
    pub tuplets: Vec<Tuplet>,
    pub shown: bool,
    pub full_measure: bool,
}

#[derive(Debug, Clone)]
struct OpenSlur {
    nr: u32,
    phrasing: bool,
    at: ItemRef,
}

/// Per-voice state that lives as long as its section.
#[derive(Debug, Default)]
struct VoiceCursor {
    /// Last note head or rest
    current: Option<ItemRef>,
    /// Every note of the last note or chord
    chord: Vec<ItemRef>,
    last_chord: Vec<Pitch>,
    beams: BeamCursor,
    pending_ties: Vec<Pitch>,
    tie_candidates: Vec<Pitch>,
    open_slurs: Vec<OpenSlur>,
    slur_line: LineStyle,
    phrasing_line: LineStyle,
    grace_slur: Option<u32>,
    glissando: Option<LineStyle>,
    ottava_pending: Option<OctaveShift>,
    ottava_open: Option<u8>,
    wedge_open: bool,
    dashes_open: bool,
    /// Where the voice continues after a fork merged other voices into
    /// the current bar; applied on the next write
    resume: Option<Resume>,
    /// Insert point while continuing in front of merged voices
    insert_at: Option<usize>,
}

#[derive(Debug, Clone, Copy)]
struct Resume {
    index: usize,
    gap: Rational,
    onset: Rational,
    /// Other voices follow `index` in the bar
    merged: bool,
}

#[derive(Debug)]
struct OpenSection {
    section: Section,
    target: MergeTarget,
    voice: u32,
    staff: Option<u32>,
    cursor: VoiceCursor,
    /// Closed child sections waiting to be merged
    pending: Vec<(usize, Section)>,
    voice_contexts: u32,
}

impl OpenSection {
    fn new(name: &str, voice_name: String, target: MergeTarget, voice: u32, staff: Option<u32>) -> Self {
        Self {
            section: Section::new(name, Some(voice_name)),
            target,
            voice,
            staff,
            cursor: VoiceCursor::default(),
            pending: Vec::new(),
            voice_contexts: 0,
        }
    }

    fn last_bar_index(&self) -> usize {
        self.section.bars.len().saturating_sub(1)
    }

    fn item_mut(&mut self, at: ItemRef) -> Option<&mut BarItem> {
        self.section.bars.get_mut(at.bar)?.items.get_mut(at.item)
    }

    fn note_mut(&mut self, at: ItemRef) -> Option<&mut BarNote> {
        self.item_mut(at)?.as_note_mut()
    }

    fn current_note(&mut self) -> Option<&mut BarNote> {
        let at = self.cursor.current?;
        self.note_mut(at)
    }

    fn current_mus(&mut self) -> Option<&mut BarMus> {
        let at = self.cursor.current?;
        self.item_mut(at)?.mus_mut()
    }

    fn push_item(&mut self, item: BarItem) -> ItemRef {
        if let Some(resume) = self.cursor.resume.take() {
            self.open_resume(resume);
        }
        self.place(item)
    }

    fn place(&mut self, item: BarItem) -> ItemRef {
        let advance = item.advance();
        let bar_index = self.last_bar_index();
        let bar = self.section.current_bar();
        match self.cursor.insert_at {
            Some(index) if index < bar.items.len() => {
                bar.items.insert(index, item);
                if let Some(BarItem::Backup(backup)) = bar.items.get_mut(index + 1) {
                    backup.duration += advance;
                }
                self.cursor.insert_at = Some(index + 1);
                ItemRef { bar: bar_index, item: index }
            }
            _ => {
                bar.items.push(item);
                ItemRef {
                    bar: bar_index,
                    item: bar.items.len() - 1,
                }
            }
        }
    }

    /// Continue the voice in front of the voices merged after it, filling
    /// any gap with a spacer.
    fn open_resume(&mut self, resume: Resume) {
        let bar = self.section.current_bar();
        if resume.merged && resume.index < bar.items.len() {
            if !matches!(bar.items.get(resume.index), Some(BarItem::Backup(_))) {
                bar.items
                    .insert(resume.index, BarItem::Backup(BarBackup { duration: zero() }));
            }
            self.cursor.insert_at = Some(resume.index);
        }
        if resume.gap > zero() {
            let skip = self.skip(resume.gap, resume.onset);
            self.place(skip);
        }
    }

    fn apply_beams(&mut self, assignments: BeamAssignments) {
        for (at, state) in assignments {
            if let Some(note) = self.note_mut(at) {
                note.beam = state;
            }
        }
    }

    fn free_slur_number(&self) -> u32 {
        let mut nr = 1;
        while self.cursor.open_slurs.iter().any(|s| s.nr == nr) || self.cursor.grace_slur == Some(nr) {
            nr += 1;
        }
        nr
    }

    fn skip(&self, duration: Rational, onset: Rational) -> BarItem {
        let mut mus = BarMus::new(duration, NoteType::from_length(duration), onset, self.voice);
        mus.voice_name = self.section.voice_name.clone();
        mus.staff = self.staff;
        BarItem::Rest(BarRest {
            mus,
            shown: false,
            show_type: false,
            full_measure: false,
            position: None,
        })
    }
}

#[derive(Debug)]
struct PianoState {
    part: PartId,
    staff_ids: Vec<Option<String>>,
}

/// Accumulates the score during one translation.
#[derive(Debug)]
pub struct ScoreBuilder {
    score: Score,
    global: OpenSection,
    sections: Vec<OpenSection>,
    groups: Vec<GroupId>,
    piano: Option<PianoState>,
    part_entries: Vec<u32>,
    open_lyrics: Vec<LyricSection>,
    lyrics: Vec<LyricSection>,
    last_voice: Option<String>,
    names: u32,
    diagnostics: Diagnostics,
}

impl Default for ScoreBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ScoreBuilder {
    pub fn new() -> Self {
        Self {
            score: Score::new(),
            global: OpenSection::new("global", "global".to_string(), MergeTarget::Global, 1, None),
            sections: Vec::new(),
            groups: Vec::new(),
            piano: None,
            part_entries: Vec::new(),
            open_lyrics: Vec::new(),
            lyrics: Vec::new(),
            last_voice: None,
            names: 0,
            diagnostics: Diagnostics::new(),
        }
    }

    fn top(&mut self) -> &mut OpenSection {
        match self.sections.last_mut() {
            Some(section) => section,
            None => &mut self.global,
        }
    }

    fn top_ref(&self) -> &OpenSection {
        self.sections.last().unwrap_or(&self.global)
    }

    fn auto_name(&mut self) -> String {
        self.names += 1;
        format!("voice{}", self.names)
    }

    pub fn diagnostics_mut(&mut self) -> &mut Diagnostics {
        &mut self.diagnostics
    }

    // ---------------------------------------------------------------------
    // header

    pub fn set_header(&mut self, key: &str, value: &str) {
        let meta = &mut self.score.meta;
        let value = value.to_string();
        match key {
            "title" => meta.title = Some(value),
            "subtitle" => meta.subtitle = Some(value),
            "composer" | "poet" | "arranger" | "lyricist" => {
                meta.creators.push((key.to_string(), value))
            }
            "copyright" => meta.rights = Some(value),
            other => meta.info.push((other.to_string(), value)),
        }
    }

    // ---------------------------------------------------------------------
    // structure

    fn register(&mut self, entry: ScoreEntry) {
        match self.groups.last().copied() {
            Some(group) => {
                if let Some(group) = self.score.groups.get_mut(group) {
                    group.entries.push(entry);
                }
            }
            None => self.score.layout.push(entry),
        }
    }

    fn create_part(&mut self, context_id: Option<&str>) -> PartId {
        let id = self.score.parts.len();
        self.score.parts.push(Part::new(context_id.map(str::to_string)));
        self.part_entries.push(0);
        self.register(ScoreEntry::Part(id));
        id
    }

    /// Open a staff. An id seen before re-enters the existing part.
    pub fn begin_part(&mut self, context_id: Option<&str>) -> PartId {
        let part = match context_id.and_then(|id| self.score.part_by_context_id(id)) {
            Some(part) => part,
            None => self.create_part(context_id),
        };
        let entries = self.part_entries.get_mut(part).map_or(0, |e| {
            *e += 1;
            *e
        });
        let name = context_id.map(str::to_string).unwrap_or_else(|| self.auto_name());
        debug!("part {} section {}", part, entries);
        self.sections.push(OpenSection::new(
            "staff",
            name,
            MergeTarget::Part(part),
            entries.max(1),
            None,
        ));
        part
    }

    /// Open a piano staff: one part whose staves follow.
    pub fn begin_piano(&mut self, context_id: Option<&str>) -> PartId {
        let part = self.create_part(context_id);
        self.piano = Some(PianoState {
            part,
            staff_ids: Vec::new(),
        });
        part
    }

    pub fn in_piano(&self) -> bool {
        self.piano.is_some()
    }

    /// Open staff `n` of the current piano part.
    pub fn begin_piano_staff(&mut self, context_id: Option<&str>) {
        let Some(piano) = self.piano.as_mut() else {
            self.begin_part(context_id);
            return;
        };
        piano.staff_ids.push(context_id.map(str::to_string));
        let staff = piano.staff_ids.len() as u32;
        let part = piano.part;
        let name = context_id.map(str::to_string).unwrap_or_else(|| self.auto_name());
        self.sections.push(OpenSection::new(
            "piano-staff",
            name,
            MergeTarget::Part(part),
            voice_base(Some(staff)),
            Some(staff),
        ));
    }

    pub fn end_piano(&mut self) {
        if let Some(piano) = self.piano.take() {
            if let Some(part) = self.score.parts.get_mut(piano.part) {
                part.staves = (piano.staff_ids.len() as u32).max(1);
            }
        }
    }

    /// `\change Staff = "id"` inside a piano part.
    pub fn change_staff(&mut self, id: &str) {
        let staff = self.piano.as_ref().and_then(|p| {
            p.staff_ids
                .iter()
                .position(|s| s.as_deref() == Some(id))
                .map(|i| i as u32 + 1)
        });
        match staff {
            Some(staff) => self.top().staff = Some(staff),
            None => self.diagnostics.not_implemented("\\change outside a piano staff"),
        }
    }

    pub fn begin_group(&mut self, symbol: GroupSymbol) -> GroupId {
        let id = self.score.groups.len();
        self.score.groups.push(PartGroup {
            number: self.groups.len() as u32 + 1,
            symbol,
            ..Default::default()
        });
        self.register(ScoreEntry::Group(id));
        self.groups.push(id);
        id
    }

    pub fn end_group(&mut self) {
        self.groups.pop();
    }

    /// Open a `\new Voice` below the current section.
    pub fn open_voice(&mut self, name: Option<&str>, start: VoiceStart) {
        let parent = self.top();
        let voice = voice_base(parent.staff) + parent.voice_contexts;
        parent.voice_contexts += 1;
        self.open_child("voice", name, voice, start);
    }

    /// Open branch `k` (counting from 0) of a fork as its own voice.
    pub fn open_branch(&mut self, k: u32, start: VoiceStart) {
        let voice = self.top_ref().voice + k;
        self.open_child("branch", None, voice, start);
    }

    fn open_child(&mut self, kind: &str, name: Option<&str>, voice: u32, start: VoiceStart) {
        let name = name.map(str::to_string).unwrap_or_else(|| self.auto_name());
        let parent = self.top_ref();
        let offset = start.bar.min(parent.last_bar_index());
        let staff = parent.staff;
        let (slur_line, phrasing_line) = (parent.cursor.slur_line, parent.cursor.phrasing_line);
        let mut child = OpenSection::new(kind, name, MergeTarget::Parent { offset }, voice, staff);
        child.cursor.slur_line = slur_line;
        child.cursor.phrasing_line = phrasing_line;
        if start.lead > zero() {
            let skip = child.skip(start.lead, start.onset - start.lead);
            child.push_item(skip);
        }
        self.sections.push(child);
    }

    /// Sections below `Devnull` are dropped.
    pub fn open_discard(&mut self) {
        let name = self.auto_name();
        let voice = self.top_ref().voice;
        self.sections
            .push(OpenSection::new("devnull", name, MergeTarget::Discard, voice, None));
    }

    /// Close the top section and merge it into its target.
    pub fn close_section(&mut self) {
        let Some(mut section) = self.sections.pop() else {
            return;
        };
        self.finish_voice(&mut section);
        merge_waiting(&mut section, zero(), zero());
        let target = section.target;
        match target {
            MergeTarget::Part(part) => {
                if let Some(part) = self.score.parts.get_mut(part) {
                    part.bars = merge_bars(&part.bars, &section.section.bars, 0, false);
                }
            }
            MergeTarget::Parent { offset } => {
                let bars = section.section;
                self.top().pending.push((offset, bars));
            }
            MergeTarget::Discard | MergeTarget::Global => {}
        }
    }

    /// Merge the voices of a finished fork into the current section. The
    /// continuing voice resumes at `since_bar` within the current bar, which
    /// is absolute time `total`.
    pub fn merge_fork(&mut self, since_bar: Rational, total: Rational) {
        let top = self.top();
        merge_waiting(top, since_bar, total);
    }

    fn finish_voice(&mut self, section: &mut OpenSection) {
        let flushed = section.cursor.beams.flush();
        section.apply_beams(flushed);
        if section.cursor.beams.abandon_manual().is_some() {
            self.diagnostics
                .warn(DiagnosticKind::DanglingBeam, "beam opened with [ was never closed");
        }
        for slur in std::mem::take(&mut section.cursor.open_slurs) {
            self.diagnostics
                .warn(DiagnosticKind::DanglingSlur, "slur was never closed");
            if let Some(note) = section.note_mut(slur.at) {
                note.slurs
                    .retain(|s| !(s.nr == slur.nr && s.edge == Edge::Start && s.phrasing == slur.phrasing));
            }
        }
    }

    // ---------------------------------------------------------------------
    // voices

    /// Put back a voice number saved with [`ScoreBuilder::voice`].
    pub fn restore_voice(&mut self, voice: u32) {
        self.top().voice = voice;
    }

    /// `\voiceOne` .. `\voiceFour`, 0-based.
    pub fn set_voice(&mut self, index: u32) {
        let top = self.top();
        top.voice = voice_base(top.staff) + index;
    }

    pub fn one_voice(&mut self) {
        self.set_voice(0);
    }

    pub fn voice(&self) -> u32 {
        self.top_ref().voice
    }

    pub fn voice_name(&self) -> Option<String> {
        self.top_ref().section.voice_name.clone()
    }

    /// Voice of the most recent note.
    pub fn last_voice_name(&self) -> Option<String> {
        self.last_voice.clone()
    }

    // ---------------------------------------------------------------------
    // properties

    fn current_part(&self) -> Option<PartId> {
        if let Some(piano) = self.piano.as_ref() {
            return Some(piano.part);
        }
        self.sections.iter().rev().find_map(|s| match s.target {
            MergeTarget::Part(part) => Some(part),
            _ => None,
        })
    }

    /// `instrumentName`, `shortInstrumentName`, `midiInstrument` on a staff.
    /// Returns false when no part is open.
    pub fn set_part_property(&mut self, property: &str, value: &str) -> bool {
        let Some(part) = self.current_part().and_then(|p| self.score.parts.get_mut(p)) else {
            return false;
        };
        let value = Some(value.to_string());
        match property {
            "instrumentName" => part.name = value,
            "shortInstrumentName" => part.abbr = value,
            "midiInstrument" => part.midi = value,
            _ => return false,
        }
        true
    }

    /// Name, short name or delimiter of the innermost open group.
    pub fn set_group_property(&mut self, property: &str, value: &str) -> bool {
        let Some(group) = self.groups.last().and_then(|g| self.score.groups.get_mut(*g)) else {
            return false;
        };
        match property {
            "instrumentName" => group.name = Some(value.to_string()),
            "shortInstrumentName" => group.abbr = Some(value.to_string()),
            "systemStartDelimiter" => match GroupSymbol::from_delimiter(value) {
                Some(symbol) => group.symbol = symbol,
                None => return false,
            },
            _ => return false,
        }
        true
    }

    // ---------------------------------------------------------------------
    // bars and attributes

    /// Close the current bar and open the next one.
    pub fn new_bar(&mut self) {
        let top = self.top();
        let flushed = top.cursor.beams.flush();
        top.apply_beams(flushed);
        top.cursor.resume = None;
        top.cursor.insert_at = None;
        top.section.bars.push(Bar::new());
    }

    pub fn current_bar_index(&self) -> usize {
        self.top_ref().last_bar_index()
    }

    pub fn mark_pickup(&mut self) {
        self.top().section.current_bar().pickup = true;
    }

    fn current_bar(&mut self) -> &mut Bar {
        self.top().section.current_bar()
    }

    pub fn new_clef(&mut self, name: &str) {
        let staff = self.top_ref().staff;
        let clef = clef_from_name(name, staff);
        self.current_bar().attr_mut().set_clef(clef);
    }

    pub fn new_key(&mut self, fifths: i32, mode: &str) {
        self.current_bar().attr_mut().key = Some(KeyAttr {
            fifths,
            mode: mode.to_string(),
        });
    }

    pub fn new_time(&mut self, numerator: u32, denominator: u32, numeric: bool) {
        self.current_bar().attr_mut().time = Some(TimeAttr {
            numerator,
            denominator,
            numeric,
        });
    }

    pub fn new_tempo(&mut self, tempo: TempoDir) {
        self.current_bar().attr_mut().tempo = Some(tempo);
    }

    /// Right bar line of the bar just finished.
    ///
    /// Goes to the previous bar when the current one holds no music yet.
    pub fn set_right_barline(&mut self, barline: Barline) {
        let top = self.top();
        let bars = &mut top.section.bars;
        let index = match bars.last() {
            Some(bar) if bar.is_empty() && bars.len() > 1 => bars.len() - 2,
            _ => bars.len().saturating_sub(1),
        };
        if let Some(bar) = bars.get_mut(index) {
            merge_side(&mut bar.attr_mut().right, barline);
        }
    }

    pub fn set_left_barline(&mut self, barline: Barline) {
        merge_side(&mut self.current_bar().attr_mut().left, barline);
    }

    // ---------------------------------------------------------------------
    // notes and rests

    /// A note, or the first note of a chord.
    pub fn new_note(&mut self, spec: NoteSpec) -> ItemRef {
        let top = self.top();
        let mut note = make_note(top, spec);
        let cursor = &mut top.cursor;

        cursor.tie_candidates = std::mem::take(&mut cursor.pending_ties);
        match_tie(&mut cursor.tie_candidates, &mut note);
        if !note.is_grace() {
            if let Some(nr) = cursor.grace_slur.take() {
                note.slurs.push(Slur {
                    nr,
                    edge: Edge::Stop,
                    phrasing: false,
                    line: LineStyle::Solid,
                });
            }
            if let Some(line) = cursor.glissando.take() {
                note.glissandos.push(Glissando { edge: Edge::Stop, line });
            }
            if let Some(shift) = cursor.ottava_pending.take() {
                note.mus.octave_shifts.push(shift);
                cursor.ottava_open = Some(shift.size);
            }
        }

        let voice_name = note.mus.voice_name.clone();
        let at = top.push_item(BarItem::Note(note));
        top.cursor.current = Some(at);
        top.cursor.chord = vec![at];
        self.last_voice = voice_name;
        at
    }

    /// A secondary note of the chord opened by [`ScoreBuilder::new_note`].
    pub fn new_chord_note(&mut self, spec: NoteSpec) -> ItemRef {
        let top = self.top();
        let mut note = make_note(top, spec);
        note.mus.chord = true;
        match_tie(&mut top.cursor.tie_candidates, &mut note);
        let at = top.push_item(BarItem::Note(note));
        top.cursor.chord.push(at);
        at
    }

    /// Remember the chord pitches for `q`.
    pub fn end_chord(&mut self) {
        let top = self.top();
        let refs = top.cursor.chord.clone();
        let pitches = refs
            .into_iter()
            .filter_map(|at| top.note_mut(at).map(|n| n.pitch))
            .collect();
        top.cursor.last_chord = pitches;
    }

    pub fn last_chord(&self) -> Vec<Pitch> {
        self.top_ref().cursor.last_chord.clone()
    }

    pub fn new_rest(&mut self, spec: RestSpec) -> ItemRef {
        let top = self.top();
        let mut mus = BarMus::new(spec.duration, spec.note_type, spec.onset, top.voice);
        mus.voice_name = top.section.voice_name.clone();
        mus.staff = top.staff;
        mus.tuplets = spec.tuplets;
        let rest = BarRest {
            mus,
            shown: spec.shown,
            show_type: !spec.full_measure,
            full_measure: spec.full_measure,
            position: None,
        };
        top.cursor.pending_ties.clear();
        if !top.cursor.beams.manual_open() {
            let flushed = top.cursor.beams.flush();
            top.apply_beams(flushed);
        }
        let at = top.push_item(BarItem::Rest(rest));
        top.cursor.current = Some(at);
        top.cursor.chord.clear();
        at
    }

    /// An invisible rest filling `duration`.
    pub fn new_skip(&mut self, duration: Rational, onset: Rational) {
        let top = self.top();
        let skip = top.skip(duration, onset);
        top.push_item(skip);
    }

    /// `c4\rest`: the current note becomes a rest at the note's position.
    pub fn note_to_rest(&mut self) {
        let top = self.top();
        let Some(at) = top.cursor.current else { return };
        let Some(item) = top.item_mut(at) else { return };
        if let BarItem::Note(note) = item {
            let rest = BarRest {
                mus: note.mus.clone(),
                shown: true,
                show_type: true,
                full_measure: false,
                position: Some(note.pitch),
            };
            *item = BarItem::Rest(rest);
        }
    }

    // ---------------------------------------------------------------------
    // beams

    /// Beam the current note. `placement` is its metric position, sounding
    /// length and meter when it may be beamed automatically.
    pub fn beam_current(&mut self, placement: Option<(Rational, Rational, Meter)>) {
        let top = self.top();
        let Some(at) = top.cursor.current else { return };
        if top.cursor.beams.manual_open() {
            top.cursor.beams.manual_note(at);
            return;
        }
        let assignments = match placement {
            Some((start, length, meter)) => top.cursor.beams.auto_note(at, start, length, meter),
            None => top.cursor.beams.flush(),
        };
        top.apply_beams(assignments);
    }

    /// `[` or `]` after the current note.
    pub fn manual_beam(&mut self, edge: Edge) {
        let top = self.top();
        let Some(at) = top.cursor.current else { return };
        match edge {
            Edge::Start => {
                let flushed = top.cursor.beams.manual_start(at);
                top.apply_beams(flushed);
                if let Some(note) = top.note_mut(at) {
                    note.beam = BeamState::None;
                }
            }
            Edge::Stop => match top.cursor.beams.manual_stop(at) {
                Some(assignments) => top.apply_beams(assignments),
                None => self
                    .diagnostics
                    .warn(DiagnosticKind::DanglingBeam, "] without a matching ["),
            },
        }
    }

    // ---------------------------------------------------------------------
    // spanners and marks on the current note

    /// `~` after the current note or chord.
    pub fn tie(&mut self) {
        let top = self.top();
        for at in top.cursor.chord.clone() {
            if let Some(note) = top.note_mut(at) {
                note.ties.push(TieType::Start);
                let pitch = note.pitch;
                top.cursor.pending_ties.push(pitch);
            }
        }
    }

    pub fn slur(&mut self, edge: Edge, phrasing: bool) {
        let top = self.top();
        let Some(at) = top.cursor.current else { return };
        let line = if phrasing {
            top.cursor.phrasing_line
        } else {
            top.cursor.slur_line
        };
        match edge {
            Edge::Start => {
                let nr = top.free_slur_number();
                if let Some(note) = top.note_mut(at) {
                    note.slurs.push(Slur { nr, edge, phrasing, line });
                    top.cursor.open_slurs.push(OpenSlur { nr, phrasing, at });
                }
            }
            Edge::Stop => {
                let open = top.cursor.open_slurs.iter().rposition(|s| s.phrasing == phrasing);
                match open {
                    Some(index) => {
                        let slur = top.cursor.open_slurs.remove(index);
                        if let Some(note) = top.note_mut(at) {
                            note.slurs.push(Slur {
                                nr: slur.nr,
                                edge,
                                phrasing,
                                line,
                            });
                        }
                    }
                    None => self
                        .diagnostics
                        .warn(DiagnosticKind::DanglingSlur, "slur closed without being opened"),
                }
            }
        }
    }

    pub fn set_slur_line(&mut self, phrasing: bool, line: LineStyle) {
        let cursor = &mut self.top().cursor;
        if phrasing {
            cursor.phrasing_line = line;
        } else {
            cursor.slur_line = line;
        }
    }

    /// Slur from the current grace note into the next main note.
    pub fn grace_slur(&mut self) {
        let top = self.top();
        let nr = top.free_slur_number();
        if let Some(note) = top.current_note() {
            note.slurs.push(Slur {
                nr,
                edge: Edge::Start,
                phrasing: false,
                line: LineStyle::Solid,
            });
            top.cursor.grace_slur = Some(nr);
        }
    }

    pub fn dynamic_mark(&mut self, sign: &str) {
        self.close_dynamic_spans(true);
        self.add_dynamics(DynamicsKind::Mark { sign: sign.to_string() }, true);
    }

    pub fn wedge(&mut self, wedge: WedgeKind) {
        self.close_dynamic_spans(true);
        self.add_dynamics(DynamicsKind::Wedge { wedge }, true);
        self.top().cursor.wedge_open = true;
    }

    /// `\cresc`, `\dim`: text followed by dashes.
    pub fn dynamic_text(&mut self, text: &str) {
        self.close_dynamic_spans(true);
        self.add_dynamics(DynamicsKind::Text { text: text.to_string() }, true);
        self.add_dynamics(DynamicsKind::Dashes { edge: Edge::Start }, true);
        self.top().cursor.dashes_open = true;
    }

    /// `\!`
    pub fn end_dynamic_span(&mut self) {
        self.close_dynamic_spans(false);
    }

    fn close_dynamic_spans(&mut self, before: bool) {
        let cursor = &self.top_ref().cursor;
        let (wedge, dashes) = (cursor.wedge_open, cursor.dashes_open);
        if wedge {
            self.add_dynamics(DynamicsKind::Wedge { wedge: WedgeKind::Stop }, before);
        }
        if dashes {
            self.add_dynamics(DynamicsKind::Dashes { edge: Edge::Stop }, before);
        }
        let cursor = &mut self.top().cursor;
        cursor.wedge_open = false;
        cursor.dashes_open = false;
    }

    fn add_dynamics(&mut self, kind: DynamicsKind, before: bool) {
        if let Some(mus) = self.top().current_mus() {
            mus.dynamics.push(Dynamics { kind, before });
        }
    }

    pub fn notation(&mut self, group: NotationGroup) {
        let Some(note) = self.top().current_note() else { return };
        match group {
            NotationGroup::Articulation(name) => note.articulations.push(name.to_string()),
            NotationGroup::Ornament(name) => note.ornaments.push(name.to_string()),
            NotationGroup::Technical(name) => note.technical.push(name.to_string()),
            NotationGroup::Fermata(shape) => note.fermata = Some(shape.to_string()),
        }
    }

    pub fn fingering(&mut self, finger: u8) {
        if let Some(note) = self.top().current_note() {
            note.fingerings.push(finger);
        }
    }

    pub fn tremolo(&mut self, tremolo: Tremolo) {
        if let Some(note) = self.top().current_note() {
            note.tremolo = Some(tremolo);
        }
    }

    pub fn glissando(&mut self, line: LineStyle) {
        let top = self.top();
        if let Some(note) = top.current_note() {
            note.glissandos.push(Glissando { edge: Edge::Start, line });
            top.cursor.glissando = Some(line);
        }
    }

    pub fn trill_span(&mut self, edge: Edge) {
        if let Some(note) = self.top().current_note() {
            if edge == Edge::Start && !note.ornaments.iter().any(|o| o == "trill-mark") {
                note.ornaments.push("trill-mark".to_string());
            }
            note.trill_spanner = Some(edge);
        }
    }

    /// `\ottava #n`; zero ends the shift on the current note.
    pub fn ottava(&mut self, octaves: i8) {
        let top = self.top();
        if let Some(size) = top.cursor.ottava_open.take() {
            if let Some(mus) = top.current_mus() {
                mus.octave_shifts.push(OctaveShift {
                    kind: ShiftKind::Stop,
                    size,
                });
            }
        }
        top.cursor.ottava_pending = OctaveShift::from_ottava(octaves);
    }

    pub fn attach_harmonies(&mut self, harmonies: Vec<Harmony>) {
        if let Some(mus) = self.top().current_mus() {
            mus.harmonies.extend(harmonies);
        }
    }

    /// End the tuplet bracket `nr` on the current note or rest.
    pub fn stop_tuplet(&mut self, nr: u32) {
        let Some(mus) = self.top().current_mus() else { return };
        let Some(index) = mus.tuplets.iter().position(|t| t.nr == nr) else { return };
        match mus.tuplets[index].edge {
            Some(Edge::Start) => {
                let mut stop = mus.tuplets[index];
                stop.edge = Some(Edge::Stop);
                mus.tuplets.insert(index + 1, stop);
            }
            _ => mus.tuplets[index].edge = Some(Edge::Stop),
        }
    }

    // ---------------------------------------------------------------------
    // lyrics

    pub fn open_lyrics(&mut self, voice: Option<String>) {
        self.open_lyrics.push(LyricSection::new(voice));
    }

    /// Bind the innermost open lyrics to `voice` unless already bound.
    /// Returns false when no lyrics are open.
    pub fn bind_lyrics(&mut self, voice: &str) -> bool {
        match self.open_lyrics.last_mut() {
            Some(section) => {
                if section.voice.is_none() {
                    section.voice = Some(voice.to_string());
                }
                true
            }
            None => false,
        }
    }

    pub fn in_lyrics(&self) -> bool {
        !self.open_lyrics.is_empty()
    }

    pub fn lyric(&mut self, event: LyricEvent) {
        match self.open_lyrics.last_mut() {
            Some(section) => section.events.push(event),
            None => self.diagnostics.not_implemented("lyrics outside a lyrics context"),
        }
    }

    pub fn close_lyrics(&mut self) {
        if let Some(mut section) = self.open_lyrics.pop() {
            if section.voice.is_none() {
                section.voice = self.last_voice.clone();
            }
            self.lyrics.push(section);
        }
    }

    // ---------------------------------------------------------------------

    /// Close everything still open and hand out the finished score.
    pub fn finish(mut self) -> (Score, Diagnostics) {
        while !self.sections.is_empty() {
            self.close_section();
        }
        while !self.open_lyrics.is_empty() {
            self.close_lyrics();
        }
        self.end_piano();

        let mut global = std::mem::replace(
            &mut self.global,
            OpenSection::new("global", String::new(), MergeTarget::Global, 1, None),
        );
        self.finish_voice(&mut global);
        merge_waiting(&mut global, zero(), zero());
        let bars = global.section.bars;
        if bars.iter().any(Bar::has_music) {
            let id = self.score.parts.len();
            let mut part = Part::new(None);
            part.bars = bars;
            self.score.parts.push(part);
            self.score.layout.insert(0, ScoreEntry::Part(id));
        } else if bars.iter().any(Bar::has_attr) {
            for part in &mut self.score.parts {
                part.bars = merge_bars(&part.bars, &bars, 0, false);
            }
        }

        lyrics::align(&mut self.score, &self.lyrics, &mut self.diagnostics);

        if self.score.is_empty() {
            self.diagnostics
                .warn(DiagnosticKind::EmptyScore, "the input produced no notes or rests");
        }
        debug!(
            "builder finished: {} parts, {} groups",
            self.score.parts.len(),
            self.score.groups.len()
        );
        (self.score, self.diagnostics)
    }
}

/// First voice number on a staff: 1, 5, 9, ...
fn voice_base(staff: Option<u32>) -> u32 {
    staff.map_or(1, |s| 4 * s.saturating_sub(1) + 1)
}

fn merge_side(side: &mut Option<Barline>, barline: Barline) {
    match side {
        Some(existing) => {
            if barline.style.is_some() {
                existing.style = barline.style;
            }
            if barline.repeat.is_some() {
                existing.repeat = barline.repeat;
            }
            if barline.ending.is_some() {
                existing.ending = barline.ending;
            }
        }
        None => *side = Some(barline),
    }
}

fn make_note(section: &OpenSection, spec: NoteSpec) -> BarNote {
    let mut mus = BarMus::new(spec.duration, spec.note_type, spec.onset, section.voice);
    mus.voice_name = section.section.voice_name.clone();
    mus.staff = section.staff;
    mus.tuplets = spec.tuplets;
    let mut note = BarNote::new(mus, spec.pitch);
    note.grace = spec.grace;
    note.unpitched = spec.unpitched;
    note.instrument = spec.instrument;
    note
}

fn match_tie(candidates: &mut Vec<Pitch>, note: &mut BarNote) {
    if let Some(index) = candidates.iter().position(|p| p.sounds_like(&note.pitch)) {
        candidates.remove(index);
        note.ties.push(TieType::Stop);
    }
}

/// Merge every waiting child section into `section`, then arrange for the
/// continuing voice to pick up at `since_bar` of the last bar.
fn merge_waiting(section: &mut OpenSection, since_bar: Rational, total: Rational) {
    if section.pending.is_empty() {
        return;
    }
    let last = section.last_bar_index();
    let (own_len, own_cursor) = section
        .section
        .bars
        .get(last)
        .map_or((0, zero()), |b| (b.items.len(), b.cursor()));
    for (offset, child) in std::mem::take(&mut section.pending) {
        section.section.bars = merge_bars(&section.section.bars, &child.bars, offset, false);
    }
    let (own_len, own_cursor) = if section.last_bar_index() == last {
        (own_len, own_cursor)
    } else {
        (0, zero())
    };
    section.cursor.insert_at = None;
    section.cursor.resume = None;
    if since_bar <= zero() {
        return;
    }
    let gap = if since_bar > own_cursor {
        since_bar - own_cursor
    } else {
        zero()
    };
    let merged = section.section.current_bar().items.len() > own_len;
    section.cursor.resume = Some(Resume {
        index: own_len,
        gap,
        onset: total - since_bar + own_cursor,
        merged,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::BarItem;
    use crate::models::ratio;

    const QUARTER: NoteType = NoteType { log: 2, dots: 0 };

    fn quarter(builder: &mut ScoreBuilder, step: u8, onset: i64) -> ItemRef {
        builder.new_note(NoteSpec::new(Pitch::new(step, 0, 4), ratio(1, 4), QUARTER, ratio(onset, 4)))
    }

    #[test]
    fn test_part_with_two_bars() {
        let mut builder = ScoreBuilder::new();
        builder.begin_part(Some("up"));
        for i in 0..4 {
            quarter(&mut builder, i as u8, i);
        }
        builder.new_bar();
        quarter(&mut builder, 0, 4);
        builder.close_section();
        let (score, diagnostics) = builder.finish();
        assert!(diagnostics.is_empty());
        assert_eq!(score.parts.len(), 1);
        assert_eq!(score.parts[0].bars.len(), 2);
        assert_eq!(score.parts[0].bars[0].items.len(), 4);
        assert_eq!(score.parts[0].context_id.as_deref(), Some("up"));
    }

    #[test]
    fn test_global_music_becomes_part() {
        let mut builder = ScoreBuilder::new();
        quarter(&mut builder, 0, 0);
        let (score, _) = builder.finish();
        assert_eq!(score.parts.len(), 1);
        assert_eq!(score.layout, vec![ScoreEntry::Part(0)]);
    }

    #[test]
    fn test_global_attributes_merge_into_parts() {
        let mut builder = ScoreBuilder::new();
        builder.new_key(2, "major");
        builder.begin_part(None);
        quarter(&mut builder, 0, 0);
        builder.close_section();
        let (score, _) = builder.finish();
        assert_eq!(score.parts.len(), 1);
        let attr = score.parts[0].bars[0].attr.as_ref().unwrap();
        assert_eq!(attr.key.as_ref().unwrap().fifths, 2);
    }

    #[test]
    fn test_fork_branch_merges_with_backup() {
        let mut builder = ScoreBuilder::new();
        builder.begin_part(None);
        quarter(&mut builder, 0, 0);
        // << { d e } \\ { f } >> a
        quarter(&mut builder, 1, 1);
        quarter(&mut builder, 2, 2);
        builder.open_branch(
            1,
            VoiceStart {
                bar: 0,
                lead: ratio(1, 4),
                onset: ratio(1, 4),
            },
        );
        builder.new_note(NoteSpec::new(Pitch::new(3, 0, 4), ratio(1, 4), QUARTER, ratio(1, 4)));
        builder.close_section();
        builder.merge_fork(ratio(3, 4), ratio(3, 4));
        let a = quarter(&mut builder, 5, 3);
        builder.close_section();
        let (score, _) = builder.finish();
        let bar = &score.parts[0].bars[0];
        // c d e a | backup | skip f
        assert_eq!(a.item, 3);
        assert_eq!(bar.segment_lengths(), vec![ratio(1, 1), ratio(1, 2)]);
        assert_eq!(bar.items[4], BarItem::Backup(BarBackup { duration: ratio(1, 1) }));
        let voices: Vec<u32> = bar.items.iter().filter_map(|i| i.mus()).map(|m| m.voice).collect();
        assert_eq!(voices, vec![1, 1, 1, 1, 2, 2]);
    }

    #[test]
    fn test_voice_contexts_share_bars() {
        let mut builder = ScoreBuilder::new();
        builder.begin_part(None);
        builder.open_voice(Some("s"), VoiceStart::at_bar_start(0, zero()));
        quarter(&mut builder, 0, 0);
        builder.close_section();
        builder.open_voice(Some("a"), VoiceStart::at_bar_start(0, zero()));
        quarter(&mut builder, 1, 0);
        builder.close_section();
        builder.merge_fork(ratio(1, 4), ratio(1, 4));
        builder.close_section();
        let (score, _) = builder.finish();
        let bar = &score.parts[0].bars[0];
        assert_eq!(bar.items.len(), 3);
        let voices: Vec<u32> = bar.items.iter().filter_map(|i| i.mus()).map(|m| m.voice).collect();
        assert_eq!(voices, vec![1, 2]);
    }

    #[test]
    fn test_piano_staff_numbers() {
        let mut builder = ScoreBuilder::new();
        builder.begin_piano(None);
        builder.begin_piano_staff(Some("rh"));
        quarter(&mut builder, 0, 0);
        builder.close_section();
        builder.begin_piano_staff(Some("lh"));
        builder.new_clef("bass");
        quarter(&mut builder, 0, 0);
        builder.close_section();
        builder.end_piano();
        let (score, _) = builder.finish();
        assert_eq!(score.parts.len(), 1);
        let part = &score.parts[0];
        assert_eq!(part.staves, 2);
        let bar = &part.bars[0];
        let second = bar.items.iter().filter_map(|i| i.as_note()).nth(1).unwrap();
        assert_eq!((second.mus.staff, second.mus.voice), (Some(2), 5));
        assert_eq!(bar.attr.as_ref().unwrap().clefs[0].staff, Some(2));
    }

    #[test]
    fn test_ties_match_pitches() {
        let mut builder = ScoreBuilder::new();
        quarter(&mut builder, 0, 0);
        builder.tie();
        let second = quarter(&mut builder, 0, 1);
        let (score, _) = builder.finish();
        let note = score.parts[0].bars[0].items[second.item].as_note().unwrap();
        assert_eq!(note.ties, vec![TieType::Stop]);
    }

    #[test]
    fn test_dangling_slur_removed() {
        let mut builder = ScoreBuilder::new();
        builder.begin_part(None);
        quarter(&mut builder, 0, 0);
        builder.slur(Edge::Start, false);
        builder.close_section();
        let (score, diagnostics) = builder.finish();
        assert_eq!(diagnostics.count(DiagnosticKind::DanglingSlur), 1);
        assert!(score.parts[0].bars[0].items[0].as_note().unwrap().slurs.is_empty());
    }

    #[test]
    fn test_right_barline_goes_to_finished_bar() {
        let mut builder = ScoreBuilder::new();
        quarter(&mut builder, 0, 0);
        builder.new_bar();
        builder.set_right_barline(Barline::styled("light-heavy"));
        let (score, _) = builder.finish();
        let right = score.parts[0].bars[0].attr.as_ref().unwrap().right.as_ref().unwrap();
        assert_eq!(right.style.as_deref(), Some("light-heavy"));
    }

    #[test]
    fn test_groups_nest() {
        let mut builder = ScoreBuilder::new();
        builder.begin_group(GroupSymbol::Bracket);
        builder.begin_part(None);
        quarter(&mut builder, 0, 0);
        builder.close_section();
        builder.begin_group(GroupSymbol::Brace);
        builder.end_group();
        assert!(builder.set_group_property("instrumentName", "Strings"));
        builder.end_group();
        let (score, _) = builder.finish();
        assert_eq!(score.layout, vec![ScoreEntry::Group(0)]);
        assert_eq!(score.groups[0].entries, vec![ScoreEntry::Part(0), ScoreEntry::Group(1)]);
        assert_eq!(score.groups[1].number, 2);
        assert_eq!(score.groups[0].name.as_deref(), Some("Strings"));
    }

    #[test]
    fn test_empty_score_reported() {
        let (_, diagnostics) = ScoreBuilder::new().finish();
        assert_eq!(diagnostics.count(DiagnosticKind::EmptyScore), 1);
    }
}
