// Reference MusicXML 3.1 partwise serializer

use std::borrow::Cow;
use std::collections::HashMap;

use quick_xml::escape::escape;

use super::duration::note_type_name;
use super::ops::{AttributesOp, BarSide, GroupOp, HeaderOp, OutputOp, PartOp, ScoreSink};
use super::walker::EmissionWalker;
use crate::diagnostics::Diagnostic;
use crate::ir::{
    BarMus, BarNote, BarRest, Barline, Dynamics, DynamicsKind, Harmony, NoteType, OctaveShift,
    ShiftKind, Slur, TempoDir, TieType, Tuplet,
};
use crate::models::pitch::AccidentalMark;
use crate::models::Pitch;
use crate::settings::ConversionSettings;

const STEPS: [&str; 7] = ["C", "D", "E", "F", "G", "A", "B"];

/// Serialize a score to a MusicXML document.
pub fn to_musicxml(score: &crate::ir::Score, settings: &ConversionSettings) -> (String, Vec<Diagnostic>) {
    let mut writer = MusicXmlWriter::new();
    let diagnostics = EmissionWalker::new(score, settings).walk(&mut writer);
    (writer.finish(), diagnostics.into_vec())
}

/// Writes MusicXML text for the ops it receives.
pub struct MusicXmlWriter {
    buffer: String,
    part_list: ListState,
    /// Instrument names per part id, for `<instrument id>` references
    instruments: HashMap<String, Vec<String>>,
    current_part: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ListState {
    NotStarted,
    Open,
    Closed,
}

impl MusicXmlWriter {
    pub fn new() -> Self {
        Self {
            buffer: String::new(),
            part_list: ListState::NotStarted,
            instruments: HashMap::new(),
            current_part: None,
        }
    }

    /// Close the document and return it.
    pub fn finish(mut self) -> String {
        if self.buffer.is_empty() {
            self.header(&HeaderOp {
                meta: Default::default(),
                version: "3.1".to_string(),
                software: None,
            });
        }
        self.close_part_list();
        self.buffer.push_str("</score-partwise>\n");
        self.buffer
    }

    fn line(&mut self, depth: usize, text: &str) {
        for _ in 0..depth {
            self.buffer.push_str("  ");
        }
        self.buffer.push_str(text);
        self.buffer.push('\n');
    }

    fn text_element(&mut self, depth: usize, name: &str, text: &str) {
        self.line(depth, &format!("<{0}>{1}</{0}>", name, esc(text)));
    }

    fn open_part_list(&mut self) {
        if self.part_list == ListState::NotStarted {
            self.line(1, "<part-list>");
            self.part_list = ListState::Open;
        }
    }

    fn close_part_list(&mut self) {
        self.open_part_list();
        if self.part_list == ListState::Open {
            self.line(1, "</part-list>");
            self.part_list = ListState::Closed;
        }
    }

    fn header(&mut self, header: &HeaderOp) {
        self.buffer.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        self.buffer.push_str(&format!(
            "<!DOCTYPE score-partwise PUBLIC \"-//Recordare//DTD MusicXML {0} Partwise//EN\" \"http://www.musicxml.org/dtds/partwise.dtd\">\n",
            esc(&header.version)
        ));
        self.buffer.push_str(&format!(
            "<score-partwise version=\"{}\">\n",
            esc(&header.version)
        ));
        let meta = &header.meta;
        if let Some(title) = &meta.title {
            self.line(1, "<work>");
            self.text_element(2, "work-title", title);
            self.line(1, "</work>");
        }
        if let Some(subtitle) = &meta.subtitle {
            self.text_element(1, "movement-title", subtitle);
        }
        self.line(1, "<identification>");
        for (kind, name) in &meta.creators {
            self.line(
                2,
                &format!("<creator type=\"{}\">{}</creator>", esc(kind), esc(name)),
            );
        }
        if let Some(rights) = &meta.rights {
            self.text_element(2, "rights", rights);
        }
        if let Some(software) = &header.software {
            self.line(2, "<encoding>");
            self.text_element(3, "software", software);
            self.line(2, "</encoding>");
        }
        if !meta.info.is_empty() {
            self.line(2, "<miscellaneous>");
            for (name, value) in &meta.info {
                self.line(
                    3,
                    &format!(
                        "<miscellaneous-field name=\"{}\">{}</miscellaneous-field>",
                        esc(name),
                        esc(value)
                    ),
                );
            }
            self.line(2, "</miscellaneous>");
        }
        self.line(1, "</identification>");
    }

    fn start_group(&mut self, group: &GroupOp) {
        self.open_part_list();
        self.line(2, &format!("<part-group type=\"start\" number=\"{}\">", group.number));
        if let Some(name) = &group.name {
            self.text_element(3, "group-name", name);
        }
        if let Some(abbr) = &group.abbr {
            self.text_element(3, "group-abbreviation", abbr);
        }
        self.text_element(3, "group-symbol", group.symbol.as_str());
        self.line(2, "</part-group>");
    }

    fn score_part(&mut self, part: &PartOp) {
        self.open_part_list();
        self.line(2, &format!("<score-part id=\"{}\">", esc(&part.id)));
        self.text_element(3, "part-name", part.name.as_deref().unwrap_or(""));
        if let Some(abbr) = &part.abbr {
            self.text_element(3, "part-abbreviation", abbr);
        }
        let mut names = part.instruments.clone();
        if names.is_empty() {
            names.extend(part.midi.iter().cloned());
        }
        for (i, name) in names.iter().enumerate() {
            self.line(3, &format!("<score-instrument id=\"{}-I{}\">", esc(&part.id), i + 1));
            self.text_element(4, "instrument-name", name);
            self.line(3, "</score-instrument>");
        }
        self.line(2, "</score-part>");
        self.instruments.insert(part.id.clone(), part.instruments.clone());
    }

    fn attributes(&mut self, attr: &AttributesOp) {
        self.line(3, "<attributes>");
        if let Some(divisions) = attr.divisions {
            self.line(4, &format!("<divisions>{}</divisions>", divisions));
        }
        if let Some(key) = &attr.key {
            self.line(4, "<key>");
            self.line(5, &format!("<fifths>{}</fifths>", key.fifths));
            if !key.mode.is_empty() {
                self.text_element(5, "mode", &key.mode);
            }
            self.line(4, "</key>");
        }
        if let Some(time) = &attr.time {
            let symbol = match (time.numeric, time.numerator, time.denominator) {
                (false, 4, 4) => " symbol=\"common\"",
                (false, 2, 2) => " symbol=\"cut\"",
                _ => "",
            };
            self.line(4, &format!("<time{}>", symbol));
            self.line(5, &format!("<beats>{}</beats>", time.numerator));
            self.line(5, &format!("<beat-type>{}</beat-type>", time.denominator));
            self.line(4, "</time>");
        }
        if let Some(staves) = attr.staves {
            self.line(4, &format!("<staves>{}</staves>", staves));
        }
        for clef in &attr.clefs {
            match clef.staff {
                Some(staff) => self.line(4, &format!("<clef number=\"{}\">", staff)),
                None => self.line(4, "<clef>"),
            }
            self.text_element(5, "sign", &clef.sign);
            if let Some(line) = clef.line {
                self.line(5, &format!("<line>{}</line>", line));
            }
            if clef.octave_change != 0 {
                self.line(5, &format!("<clef-octave-change>{}</clef-octave-change>", clef.octave_change));
            }
            self.line(4, "</clef>");
        }
        self.line(3, "</attributes>");
    }

    fn barline(&mut self, side: BarSide, barline: &Barline) {
        self.line(3, &format!("<barline location=\"{}\">", side.as_str()));
        if let Some(style) = &barline.style {
            self.text_element(4, "bar-style", style);
        }
        if let Some(ending) = &barline.ending {
            self.line(
                4,
                &format!(
                    "<ending number=\"{}\" type=\"{}\"/>",
                    ending.numbers(),
                    ending.edge.as_str()
                ),
            );
        }
        if let Some(repeat) = &barline.repeat {
            let direction = match repeat {
                crate::ir::RepeatDir::Forward => "forward",
                crate::ir::RepeatDir::Backward => "backward",
            };
            self.line(4, &format!("<repeat direction=\"{}\"/>", direction));
        }
        self.line(3, "</barline>");
    }

    fn direction(&mut self, placement: &str, body: &[String], sound: Option<String>) {
        self.line(3, &format!("<direction placement=\"{}\">", placement));
        self.line(4, "<direction-type>");
        for text in body {
            self.line(5, text);
        }
        self.line(4, "</direction-type>");
        if let Some(sound) = sound {
            self.line(4, &sound);
        }
        self.line(3, "</direction>");
    }

    fn tempo(&mut self, tempo: &TempoDir) {
        let mut body = Vec::new();
        if let Some(text) = &tempo.text {
            body.push(format!("<words>{}</words>", esc(text)));
        }
        if let (Some(unit), Some(bpm)) = (tempo.unit, tempo.bpm) {
            let mut metronome = format!("<metronome><beat-unit>{}</beat-unit>", note_type_name(unit.log));
            for _ in 0..unit.dots {
                metronome.push_str("<beat-unit-dot/>");
            }
            metronome.push_str(&format!("<per-minute>{}</per-minute></metronome>", bpm));
            body.push(metronome);
        }
        if body.is_empty() {
            return;
        }
        let sound = tempo.playback.map(|q| format!("<sound tempo=\"{}\"/>", format_number(q)));
        self.direction("above", &body, sound);
    }

    fn dynamic(&mut self, dynamic: &Dynamics) {
        let body = match &dynamic.kind {
            DynamicsKind::Mark { sign } => format!("<dynamics><{}/></dynamics>", esc(sign)),
            DynamicsKind::Wedge { wedge } => format!("<wedge type=\"{}\"/>", wedge.as_str()),
            DynamicsKind::Text { text } => format!("<words>{}</words>", esc(text)),
            DynamicsKind::Dashes { edge } => format!("<dashes type=\"{}\"/>", edge.as_str()),
        };
        self.direction("below", &[body], None);
    }

    fn octave_shift(&mut self, shift: &OctaveShift) {
        let body = match shift.kind {
            ShiftKind::Stop => format!("<octave-shift type=\"stop\" size=\"{}\"/>", shift.size),
            kind => format!("<octave-shift type=\"{}\" size=\"{}\"/>", kind.as_str(), shift.size),
        };
        self.direction("above", &[body], None);
    }

    fn harmony(&mut self, harmony: &Harmony, offset: u32) {
        self.line(3, "<harmony>");
        self.line(4, "<root>");
        self.line(5, &format!("<root-step>{}</root-step>", step_letter(harmony.root_step)));
        if harmony.root_alter != 0 {
            self.line(5, &format!("<root-alter>{}</root-alter>", harmony.root_alter));
        }
        self.line(4, "</root>");
        let text = harmony.text.as_deref().unwrap_or("");
        self.line(
            4,
            &format!("<kind text=\"{}\">{}</kind>", esc(text), harmony_kind(text)),
        );
        if let Some((step, alter)) = harmony.bass {
            self.line(4, "<bass>");
            self.line(5, &format!("<bass-step>{}</bass-step>", step_letter(step)));
            if alter != 0 {
                self.line(5, &format!("<bass-alter>{}</bass-alter>", alter));
            }
            self.line(4, "</bass>");
        }
        if offset > 0 {
            self.line(4, &format!("<offset>{}</offset>", offset));
        }
        self.line(3, "</harmony>");
    }

    fn note(&mut self, note: &BarNote, duration: u32) {
        let mus = &note.mus;
        self.line(3, "<note>");
        if let Some(grace) = note.grace {
            self.line(4, if grace.slash { "<grace slash=\"yes\"/>" } else { "<grace/>" });
        }
        if mus.chord {
            self.line(4, "<chord/>");
        }
        if note.unpitched {
            self.line(4, "<unpitched>");
            self.line(5, &format!("<display-step>{}</display-step>", note.pitch.step_name()));
            self.line(5, &format!("<display-octave>{}</display-octave>", note.pitch.octave));
            self.line(4, "</unpitched>");
        } else {
            self.pitch(&note.pitch);
        }
        if !note.is_grace() {
            self.line(4, &format!("<duration>{}</duration>", duration));
        }
        for tie in &note.ties {
            self.line(4, &format!("<tie type=\"{}\"/>", tie_name(*tie)));
        }
        if let Some(instrument) = &note.instrument {
            let index = self
                .current_part
                .as_ref()
                .and_then(|id| self.instruments.get(id).map(|names| (id, names)))
                .and_then(|(id, names)| names.iter().position(|n| n == instrument).map(|i| (id.clone(), i)));
            if let Some((id, i)) = index {
                self.line(4, &format!("<instrument id=\"{}-I{}\"/>", id, i + 1));
            }
        }
        self.voice_and_type(mus, true);
        if let Some(mark) = note.pitch.accidental {
            let name = accidental_name(note.pitch.alter);
            match mark {
                AccidentalMark::Forced => self.line(4, &format!("<accidental>{}</accidental>", name)),
                AccidentalMark::Cautionary => self.line(
                    4,
                    &format!("<accidental cautionary=\"yes\" parentheses=\"yes\">{}</accidental>", name),
                ),
            }
        }
        self.time_modification(&mus.tuplets);
        if let Some(staff) = mus.staff {
            self.line(4, &format!("<staff>{}</staff>", staff));
        }
        if let Some(beam) = note.beam.xml_name() {
            self.line(4, &format!("<beam number=\"1\">{}</beam>", beam));
        }
        let notations = note_notations(note);
        self.notations(&notations);
        for lyric in &note.lyrics {
            self.line(4, &format!("<lyric number=\"{}\">", lyric.number));
            self.text_element(5, "syllabic", lyric.syllabic.as_str());
            self.text_element(5, "text", &lyric.text);
            if lyric.extend {
                self.line(5, "<extend/>");
            }
            self.line(4, "</lyric>");
        }
        self.line(3, "</note>");
    }

    fn rest(&mut self, rest: &BarRest, duration: u32) {
        let mus = &rest.mus;
        self.line(3, "<note>");
        if mus.chord {
            self.line(4, "<chord/>");
        }
        match (&rest.position, rest.full_measure) {
            (Some(position), _) => {
                self.line(4, "<rest>");
                self.line(5, &format!("<display-step>{}</display-step>", position.step_name()));
                self.line(5, &format!("<display-octave>{}</display-octave>", position.octave));
                self.line(4, "</rest>");
            }
            (None, true) => self.line(4, "<rest measure=\"yes\"/>"),
            (None, false) => self.line(4, "<rest/>"),
        }
        self.line(4, &format!("<duration>{}</duration>", duration));
        self.voice_and_type(mus, rest.show_type);
        self.time_modification(&mus.tuplets);
        if let Some(staff) = mus.staff {
            self.line(4, &format!("<staff>{}</staff>", staff));
        }
        let notations: Vec<String> = mus.tuplets.iter().filter_map(tuplet_notation).collect();
        self.notations(&notations);
        self.line(3, "</note>");
    }

    fn pitch(&mut self, pitch: &Pitch) {
        self.line(4, "<pitch>");
        self.line(5, &format!("<step>{}</step>", pitch.step_name()));
        if pitch.alter != 0 {
            self.line(5, &format!("<alter>{}</alter>", pitch.alter));
        }
        self.line(5, &format!("<octave>{}</octave>", pitch.octave));
        self.line(4, "</pitch>");
    }

    fn voice_and_type(&mut self, mus: &BarMus, show_type: bool) {
        self.line(4, &format!("<voice>{}</voice>", mus.voice));
        if show_type {
            self.note_type(mus.note_type);
        }
    }

    fn note_type(&mut self, note_type: NoteType) {
        self.line(4, &format!("<type>{}</type>", note_type_name(note_type.log)));
        for _ in 0..note_type.dots {
            self.line(4, "<dot/>");
        }
    }

    fn time_modification(&mut self, tuplets: &[Tuplet]) {
        if tuplets.is_empty() {
            return;
        }
        // a bracket starting and stopping on one note is listed twice
        let levels: Vec<&Tuplet> = tuplets
            .iter()
            .enumerate()
            .filter(|(i, t)| !tuplets[..*i].iter().any(|o| o.nr == t.nr))
            .map(|(_, t)| t)
            .collect();
        let actual: i64 = levels.iter().map(|t| t.actual).product();
        let normal: i64 = levels.iter().map(|t| t.normal).product();
        if actual == normal {
            return;
        }
        self.line(4, "<time-modification>");
        self.line(5, &format!("<actual-notes>{}</actual-notes>", actual));
        self.line(5, &format!("<normal-notes>{}</normal-notes>", normal));
        self.line(4, "</time-modification>");
    }

    fn notations(&mut self, notations: &[String]) {
        if notations.is_empty() {
            return;
        }
        self.line(4, "<notations>");
        for text in notations {
            self.line(5, text);
        }
        self.line(4, "</notations>");
    }
}

impl Default for MusicXmlWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl ScoreSink for MusicXmlWriter {
    fn emit(&mut self, op: OutputOp) {
        match op {
            OutputOp::Header(header) => self.header(&header),
            OutputOp::StartPartGroup(group) => self.start_group(&group),
            OutputOp::EndPartGroup { number } => {
                self.open_part_list();
                self.line(2, &format!("<part-group type=\"stop\" number=\"{}\"/>", number));
            }
            OutputOp::ScorePart(part) => self.score_part(&part),
            OutputOp::StartPart { id } => {
                self.close_part_list();
                self.line(1, &format!("<part id=\"{}\">", esc(&id)));
                self.current_part = Some(id);
            }
            OutputOp::EndPart => {
                self.line(1, "</part>");
                self.current_part = None;
            }
            OutputOp::StartMeasure { number, implicit } => {
                let implicit = if implicit { " implicit=\"yes\"" } else { "" };
                self.line(2, &format!("<measure number=\"{}\"{}>", number, implicit));
            }
            OutputOp::EndMeasure => self.line(2, "</measure>"),
            OutputOp::Attributes(attr) => self.attributes(&attr),
            OutputOp::Barline { side, barline } => self.barline(side, &barline),
            OutputOp::Tempo(tempo) => self.tempo(&tempo),
            OutputOp::Dynamic(dynamic) => self.dynamic(&dynamic),
            OutputOp::OctaveShift(shift) => self.octave_shift(&shift),
            OutputOp::Harmony { harmony, offset } => self.harmony(&harmony, offset),
            OutputOp::Note { note, duration } => self.note(&note, duration),
            OutputOp::Rest { rest, duration } => self.rest(&rest, duration),
            OutputOp::Forward { duration, voice, staff } => {
                self.line(3, "<forward>");
                self.line(4, &format!("<duration>{}</duration>", duration));
                self.line(4, &format!("<voice>{}</voice>", voice));
                if let Some(staff) = staff {
                    self.line(4, &format!("<staff>{}</staff>", staff));
                }
                self.line(3, "</forward>");
            }
            OutputOp::Backup { duration } => {
                self.line(3, "<backup>");
                self.line(4, &format!("<duration>{}</duration>", duration));
                self.line(3, "</backup>");
            }
        }
    }
}

/// Children of `<notations>` for one note, in schema order.
fn note_notations(note: &BarNote) -> Vec<String> {
    let mut out = Vec::new();
    for tie in &note.ties {
        out.push(format!("<tied type=\"{}\"/>", tie_name(*tie)));
    }
    out.extend(note.slurs.iter().map(slur_notation));
    out.extend(note.mus.tuplets.iter().filter_map(tuplet_notation));
    for glissando in &note.glissandos {
        out.push(format!(
            "<glissando type=\"{}\" line-type=\"{}\"/>",
            glissando.edge.as_str(),
            glissando.line.as_str()
        ));
    }
    let mut ornaments: Vec<String> = note.ornaments.iter().map(|o| format!("<{}/>", o)).collect();
    if let Some(edge) = note.trill_spanner {
        ornaments.push(format!("<wavy-line type=\"{}\"/>", edge.as_str()));
    }
    if let Some(tremolo) = note.tremolo {
        ornaments.push(format!(
            "<tremolo type=\"{}\">{}</tremolo>",
            tremolo.kind.as_str(),
            tremolo.lines
        ));
    }
    if !ornaments.is_empty() {
        out.push(format!("<ornaments>{}</ornaments>", ornaments.concat()));
    }
    let mut technical: Vec<String> = note.technical.iter().map(|t| format!("<{}/>", t)).collect();
    technical.extend(note.fingerings.iter().map(|f| format!("<fingering>{}</fingering>", f)));
    if !technical.is_empty() {
        out.push(format!("<technical>{}</technical>", technical.concat()));
    }
    if !note.articulations.is_empty() {
        let inner: String = note.articulations.iter().map(|a| format!("<{}/>", a)).collect();
        out.push(format!("<articulations>{}</articulations>", inner));
    }
    if let Some(shape) = &note.fermata {
        out.push(format!("<fermata type=\"upright\">{}</fermata>", shape));
    }
    out
}

fn slur_notation(slur: &Slur) -> String {
    let line = match slur.line.as_str() {
        "solid" => String::new(),
        other => format!(" line-type=\"{}\"", other),
    };
    // phrasing slurs are plain slurs here; numbers come from one shared pool
    format!("<slur type=\"{}\" number=\"{}\"{}/>", slur.edge.as_str(), slur.nr, line)
}

fn tuplet_notation(tuplet: &Tuplet) -> Option<String> {
    let edge = tuplet.edge?;
    let bracket = if tuplet.bracket { "yes" } else { "no" };
    Some(format!(
        "<tuplet type=\"{}\" number=\"{}\" bracket=\"{}\"/>",
        edge.as_str(),
        tuplet.nr,
        bracket
    ))
}

fn tie_name(tie: TieType) -> &'static str {
    match tie {
        TieType::Start => "start",
        TieType::Stop => "stop",
    }
}

fn step_letter(step: u8) -> &'static str {
    STEPS[(step % 7) as usize]
}

fn accidental_name(alter: i8) -> &'static str {
    match alter {
        i8::MIN..=-2 => "flat-flat",
        -1 => "flat",
        0 => "natural",
        1 => "sharp",
        _ => "double-sharp",
    }
}

/// MusicXML `<kind>` for a chord modifier such as `m7` or `7.9`.
pub fn harmony_kind(text: &str) -> &'static str {
    match text.trim_start_matches(':') {
        "" | "5" => "major",
        "m" | "m5" => "minor",
        "aug" | "+" => "augmented",
        "dim" => "diminished",
        "7" => "dominant",
        "maj7" | "maj" => "major-seventh",
        "m7" => "minor-seventh",
        "dim7" => "diminished-seventh",
        "aug7" => "augmented-seventh",
        "m7.5-" => "half-diminished",
        "m7+" | "mmaj7" => "major-minor",
        "6" => "major-sixth",
        "m6" => "minor-sixth",
        "9" => "dominant-ninth",
        "maj9" => "major-ninth",
        "m9" => "minor-ninth",
        "11" => "dominant-11th",
        "m11" => "minor-11th",
        "13" => "dominant-13th",
        "m13" => "minor-13th",
        "sus2" => "suspended-second",
        "sus4" | "sus" => "suspended-fourth",
        "1.5" => "power",
        _ => "other",
    }
}

fn esc(text: &str) -> Cow<'_, str> {
    escape(text)
}

fn format_number(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{}", value as i64)
    } else {
        format!("{:.2}", value)
    }
}
