//! `GpifTransformer`: GPIF XML DOM → `Song` (spec §4.7), shared by the GPX
//! and GP7 decode paths. Grounded on the teacher's `roxmltree`-based XML
//! reading style in `rothfield-editor`'s `Cargo.toml` dependency choice;
//! the ID-graph resolution itself follows the spec's description of the
//! format directly since no pack example parses GPIF.

use std::collections::HashMap;

use roxmltree::{Document, Node};

use crate::error::{Error, ErrorKind, Result};
use crate::limits::DecodeLimits;
use crate::model::*;
use crate::pitch;

const DEFAULT_TUNING_MIDI_LOW_TO_HIGH: [i32; 6] = [40, 45, 50, 55, 59, 64];

fn direct_text(node: Node) -> Option<String> {
    node.children()
        .find(|c| c.is_text())
        .and_then(|c| c.text())
        .map(|s| s.trim().to_string())
}

fn child_text(node: Node, tag: &str) -> Option<String> {
    node.children().find(|c| c.has_tag_name(tag)).and_then(direct_text)
}

fn has_child(node: Node, tag: &str) -> bool {
    node.children().any(|c| c.has_tag_name(tag))
}

fn bool_attr(node: Node, attr: &str) -> bool {
    node.attribute(attr).map_or(false, |v| v.eq_ignore_ascii_case("true") || v == "1")
}

fn int_attr(node: Node, attr: &str) -> Option<i32> {
    node.attribute(attr).and_then(|v| v.trim().parse().ok())
}

/// Properties live under a `<Properties>` child; each `<Property name="X">`
/// holds either a typed element child (`Enable`, `Flags`, `Float`, `HType`,
/// ...) or plain text directly.
fn property<'a, 'i>(node: Node<'a, 'i>, name: &str) -> Option<Node<'a, 'i>> {
    node.children()
        .find(|c| c.has_tag_name("Properties"))
        .into_iter()
        .flat_map(|p| p.children().filter(|c| c.has_tag_name("Property")))
        .find(|p| p.attribute("name") == Some(name))
}

fn property_text(node: Node, name: &str) -> Option<String> {
    let p = property(node, name)?;
    if let Some(child) = p.children().find(|c| c.is_element()) {
        direct_text(child)
    } else {
        direct_text(p)
    }
}

fn property_int(node: Node, name: &str) -> Option<i32> {
    property_text(node, name).and_then(|s| s.parse().ok())
}

fn property_float(node: Node, name: &str) -> Option<f32> {
    property_text(node, name).and_then(|s| s.parse().ok())
}

fn property_enabled(node: Node, name: &str) -> bool {
    property(node, name).map_or(false, |p| p.children().any(|c| c.has_tag_name("Enable")))
}

fn parse_ints(s: &str) -> Vec<i32> {
    s.split_whitespace().filter_map(|t| t.parse().ok()).collect()
}

fn index_children<'a, 'i>(root: Node<'a, 'i>, container: &str) -> HashMap<&'a str, Node<'a, 'i>> {
    let mut map = HashMap::new();
    if let Some(c) = root.descendants().find(|n| n.has_tag_name(container)) {
        for child in c.children().filter(|c| c.is_element()) {
            if let Some(id) = child.attribute("id") {
                map.insert(id, child);
            }
        }
    }
    map
}

fn parse_duration(s: &str) -> Duration {
    match s.trim() {
        "Whole" => Duration::Whole,
        "Half" => Duration::Half,
        "Eighth" => Duration::Eighth,
        "16th" => Duration::Sixteenth,
        "32nd" => Duration::ThirtySecond,
        "64th" => Duration::SixtyFourth,
        "128th" => Duration::HundredTwentyEighth,
        _ => Duration::Quarter,
    }
}

struct Indexes<'a, 'i> {
    notes: HashMap<&'a str, Node<'a, 'i>>,
    beats: HashMap<&'a str, Node<'a, 'i>>,
    voices: HashMap<&'a str, Node<'a, 'i>>,
    bars: HashMap<&'a str, Node<'a, 'i>>,
    rhythms: HashMap<&'a str, Node<'a, 'i>>,
}

fn tempo_automations(root: Node) -> Vec<(i32, u32)> {
    let mut out = Vec::new();
    if let Some(mt) = root.descendants().find(|n| n.has_tag_name("MasterTrack")) {
        for automation in mt.descendants().filter(|n| n.has_tag_name("Automation")) {
            let kind = child_text(automation, "Type").unwrap_or_default();
            if !kind.eq_ignore_ascii_case("tempo") {
                continue;
            }
            let bar = child_text(automation, "Bar").and_then(|s| s.parse().ok()).unwrap_or(0);
            let value = child_text(automation, "Value")
                .and_then(|s| s.parse::<f64>().ok())
                .map(|v| v.round().max(0.0) as u32)
                .unwrap_or(120);
            out.push((bar, value));
        }
    }
    out.sort_by_key(|&(bar, _)| bar);
    out
}

fn tempo_at(automations: &[(i32, u32)], bar_index: i32) -> u32 {
    automations
        .iter()
        .rev()
        .find(|&&(bar, _)| bar <= bar_index)
        .map(|&(_, value)| value)
        .or_else(|| automations.first().map(|&(_, value)| value))
        .unwrap_or(120)
}

/// Equivalent to `/capo\s+(\d+)/i`, hand-rolled since no regex crate is in
/// the dependency stack for this module.
fn extract_capo_from_freetext(text: &str) -> Option<i32> {
    let lower = text.to_ascii_lowercase();
    let idx = lower.find("capo")?;
    let rest = &text[idx + 4..];
    let trimmed = rest.trim_start();
    let consumed_ws = rest.len() - trimmed.len();
    if consumed_ws == 0 {
        return None;
    }
    let digits: String = trimmed.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    digits.parse::<i32>().ok().filter(|v| (1..=24).contains(v))
}

fn staff_node<'a, 'i>(track: Node<'a, 'i>) -> Option<Node<'a, 'i>> {
    track
        .children()
        .find(|c| c.has_tag_name("Staves"))
        .and_then(|staves| staves.children().find(|c| c.has_tag_name("Staff")))
}

fn read_tuning_capo(track: Node) -> (Vec<i32>, i32) {
    if let Some(tuning) = property_text(track, "Tuning").map(|s| parse_ints(&s)).filter(|v| !v.is_empty()) {
        let capo = property_int(track, "CapoFret").unwrap_or(0);
        return (tuning, capo);
    }
    if let Some(staff) = staff_node(track) {
        if let Some(tuning) = property_text(staff, "Tuning").map(|s| parse_ints(&s)).filter(|v| !v.is_empty()) {
            let capo = property_int(staff, "CapoFret").unwrap_or(0);
            return (tuning, capo);
        }
    }
    (DEFAULT_TUNING_MIDI_LOW_TO_HIGH.to_vec(), 0)
}

fn build_note(note_node: Node, tuning_midi: &[i32], capo: i32) -> Note {
    let string = property_int(note_node, "String").unwrap_or(0).max(0) as usize;
    let fret = property_int(note_node, "Fret").unwrap_or(0);
    let tuning_for_string = tuning_midi.get(string).copied().unwrap_or_else(|| tuning_midi.last().copied().unwrap_or(0));
    let pitch_class = pitch::midi_to_pitch_class(tuning_for_string + capo + fret);
    let note_name = pitch::note_name(pitch_class, true);

    let tie_node = note_node.children().find(|c| c.has_tag_name("Tie"));
    let tie = Tie {
        origin: tie_node.map_or(false, |t| bool_attr(t, "origin")),
        destination: tie_node.map_or(false, |t| bool_attr(t, "destination")),
    };

    let bend = if property_enabled(note_node, "Bended") {
        Some(Bend {
            origin: property_float(note_node, "BendOriginValue").unwrap_or(0.0),
            middle: property_float(note_node, "BendMiddleValue").unwrap_or(0.0),
            destination: property_float(note_node, "BendDestinationValue").unwrap_or(0.0),
        })
    } else {
        None
    };

    Note {
        string: string as u8,
        fret,
        pitch_class,
        note_name,
        slide: property_int(note_node, "Slide").and_then(SlideType::from_flags),
        harmonic: property_text(note_node, "HarmonicType").as_deref().and_then(HarmonicType::from_gpif_htype),
        palm_mute: property_enabled(note_node, "PalmMute"),
        muted: property_enabled(note_node, "Muted"),
        let_ring: has_child(note_node, "LetRing"),
        bend,
        tie,
        vibrato: has_child(note_node, "Vibrato"),
        hammer_on: property_enabled(note_node, "HopoOrigin"),
        pull_off: property_enabled(note_node, "HopoDestination"),
        tapped: property_enabled(note_node, "Tapped"),
        accent: has_child(note_node, "Accent"),
    }
}

fn resolve_voice_id<'a>(bar_node: Node<'a, '_>) -> Option<&'a str> {
    let ids: Vec<&str> = bar_node
        .children()
        .find(|c| c.has_tag_name("Voices"))
        .and_then(direct_text_static)
        .unwrap_or_default();
    ids.into_iter().find(|id| *id != "-1")
}

// `direct_text` returns an owned String; voice-id resolution needs
// borrowed `&str` slices of the node's own text, so split on a leaked
// local copy is avoided by re-reading text directly from the node here.
fn direct_text_static<'a>(node: Node<'a, '_>) -> Option<Vec<&'a str>> {
    node.children()
        .find(|c| c.is_text())
        .and_then(|c| c.text())
        .map(|s| s.split_whitespace().collect())
}

fn bar_id_for_track<'a>(master_bar: Node<'a, '_>, track_position: usize) -> Option<&'a str> {
    let ids: Vec<&str> = master_bar
        .children()
        .find(|c| c.has_tag_name("Bars"))
        .and_then(direct_text_static)
        .unwrap_or_default();
    ids.get(track_position).or_else(|| ids.get(0)).copied()
}

fn parse_time_signature(master_bar: Node) -> TimeSignature {
    match child_text(master_bar, "Time") {
        Some(text) => {
            let mut parts = text.split('/');
            let num = parts.next().and_then(|s| s.trim().parse().ok());
            let den = parts.next().and_then(|s| s.trim().parse().ok());
            match (num, den) {
                (Some(n), Some(d)) => TimeSignature { numerator: n, denominator: d },
                _ => TimeSignature::default(),
            }
        }
        None => TimeSignature::default(),
    }
}

fn parse_key_signature(master_bar: Node) -> Option<KeySignature> {
    let key = master_bar.children().find(|c| c.has_tag_name("Key"))?;
    let accidental_count = child_text(key, "AccidentalCount").and_then(|s| s.parse().ok()).unwrap_or(0);
    let mode = match child_text(key, "Mode").as_deref() {
        Some("Minor") => KeyMode::Minor,
        _ => KeyMode::Major,
    };
    Some(KeySignature { accidental_count, mode })
}

fn parse_section(master_bar: Node) -> Option<Section> {
    let section = master_bar.children().find(|c| c.has_tag_name("Section"))?;
    let letter = child_text(section, "Letter").and_then(|s| s.chars().next());
    let text = child_text(section, "Text");
    Some(Section { letter, text })
}

fn parse_repeat(master_bar: Node) -> (bool, bool, u8) {
    match master_bar.children().find(|c| c.has_tag_name("Repeat")) {
        Some(repeat) => (
            bool_attr(repeat, "start"),
            bool_attr(repeat, "end"),
            int_attr(repeat, "count").unwrap_or(0).max(0) as u8,
        ),
        None => (false, false, 0),
    }
}

fn build_bar(
    bar_index: u32,
    master_bar: Node,
    track_position: usize,
    indexes: &Indexes,
    tuning_midi: &[i32],
    capo: i32,
    automations: &[(i32, u32)],
    free_texts: &mut Vec<String>,
    limits: &DecodeLimits,
) -> Result<Bar> {
    let time_signature = parse_time_signature(master_bar);
    let key_signature = parse_key_signature(master_bar);
    let section = parse_section(master_bar);
    let (repeat_start, repeat_end, repeat_count) = parse_repeat(master_bar);

    let mut beats = Vec::new();

    let bar_id = bar_id_for_track(master_bar, track_position);
    let bar_node = bar_id.and_then(|id| indexes.bars.get(id)).copied();
    let voice_id = bar_node.and_then(resolve_voice_id);
    let voice_node = voice_id.and_then(|id| indexes.voices.get(id)).copied();

    if let Some(voice) = voice_node {
        let beat_ids: Vec<&str> = voice
            .children()
            .find(|c| c.has_tag_name("Beats"))
            .and_then(direct_text_static)
            .unwrap_or_default();

        for (beat_pos, beat_id) in beat_ids.iter().enumerate() {
            let beat_node = match indexes.beats.get(beat_id) {
                Some(n) => *n,
                None => continue,
            };

            if let Some(text) = child_text(beat_node, "FreeText") {
                free_texts.push(text);
            }

            let note_ids: Vec<&str> = beat_node
                .children()
                .find(|c| c.has_tag_name("Notes"))
                .and_then(direct_text_static)
                .unwrap_or_default();
            let notes: Vec<Note> = note_ids
                .iter()
                .filter_map(|id| indexes.notes.get(id))
                .map(|n| build_note(*n, tuning_midi, capo))
                .collect();

            let rhythm_ref = beat_node.children().find(|c| c.has_tag_name("Rhythm")).and_then(|r| r.attribute("ref"));
            let rhythm_node = rhythm_ref.and_then(|id| indexes.rhythms.get(id)).copied();

            let (duration, dotted, tuplet) = match rhythm_node {
                Some(r) => {
                    let duration = child_text(r, "NoteValue").map(|s| parse_duration(&s)).unwrap_or(Duration::Quarter);
                    let dotted = r
                        .children()
                        .find(|c| c.has_tag_name("AugmentationDot"))
                        .and_then(|d| int_attr(d, "count"))
                        .unwrap_or(0)
                        .max(0) as u8;
                    let tuplet = r.children().find(|c| c.has_tag_name("PrimaryTuplet")).and_then(|t| {
                        let num = int_attr(t, "num")? as u32;
                        let den = int_attr(t, "den")? as u32;
                        if num != den && num > 0 && den > 0 {
                            Some(Tuplet { num, den })
                        } else {
                            None
                        }
                    });
                    (duration, dotted, tuplet)
                }
                None => (Duration::Quarter, 0, None),
            };

            let dynamic = child_text(beat_node, "Dynamic").as_deref().and_then(Dynamic::from_gpif_str);
            let tempo = tempo_at(automations, bar_index as i32);

            beats.push(Beat {
                index: beat_pos as u32,
                bar_index,
                is_rest: notes.is_empty(),
                notes,
                duration,
                tuplet,
                dotted,
                dynamic,
                tempo,
            });
        }
    }

    if beats.len() > limits.max_measure_count as usize {
        return Err(Error::from(ErrorKind::BadContainer("bar has an implausible beat count".to_string())));
    }

    Ok(Bar {
        index: bar_index,
        time_signature,
        key_signature,
        section,
        beats,
        repeat_start,
        repeat_end,
        repeat_count,
    })
}

fn build_track(track: Node, track_position: usize, master_bars: &[Node], indexes: &Indexes, automations: &[(i32, u32)], limits: &DecodeLimits) -> Result<Track> {
    let id = track.attribute("id").and_then(|s| s.parse().ok()).unwrap_or(track_position as u32);
    let name = child_text(track, "Name").unwrap_or_default();
    let short_name = child_text(track, "ShortName").unwrap_or_else(|| name.clone());
    let instrument = property_text(track, "Instrument");

    let (tuning_midi, mut capo_fret) = read_tuning_capo(track);

    if master_bars.len() > limits.max_measure_count as usize {
        return Err(Error::from(ErrorKind::BadContainer("measure count exceeds limit".to_string())));
    }

    let mut free_texts: Vec<String> = Vec::new();
    let mut bars = Vec::with_capacity(master_bars.len());
    for (bar_index, master_bar) in master_bars.iter().enumerate() {
        bars.push(build_bar(
            bar_index as u32,
            *master_bar,
            track_position,
            indexes,
            &tuning_midi,
            capo_fret,
            automations,
            &mut free_texts,
            limits,
        )?);
    }

    if capo_fret == 0 {
        if let Some(found) = free_texts.iter().find_map(|t| extract_capo_from_freetext(t)) {
            capo_fret = found;
            for bar in bars.iter_mut() {
                for beat in bar.beats.iter_mut() {
                    for note in beat.notes.iter_mut() {
                        let tuning_for_string = tuning_midi.get(note.string as usize).copied().unwrap_or(0);
                        note.pitch_class = pitch::midi_to_pitch_class(tuning_for_string + capo_fret + note.fret);
                        note.note_name = pitch::note_name(note.pitch_class, true);
                    }
                }
            }
        }
    }

    let string_count = tuning_midi.len();
    let mut tuning: Vec<String> = tuning_midi
        .iter()
        .map(|&midi| pitch::note_name(pitch::midi_to_pitch_class(midi), true))
        .collect();
    let mut tuning_midi_out = tuning_midi.clone();
    tuning.reverse();
    tuning_midi_out.reverse();

    for bar in bars.iter_mut() {
        for beat in bar.beats.iter_mut() {
            for note in beat.notes.iter_mut() {
                note.string = (string_count as i32 - 1 - note.string as i32).max(0) as u8;
            }
        }
    }

    Ok(Track {
        id,
        name,
        short_name,
        instrument,
        tuning,
        tuning_midi: tuning_midi_out,
        capo_fret,
        bars,
    })
}

/// Transforms a GPIF XML document into a `Song` (spec §4.7).
pub fn transform(xml: &str, limits: &DecodeLimits) -> Result<Song> {
    let doc = Document::parse(xml)?;
    let root = doc.root_element();
    if root.tag_name().name() != "GPIF" {
        return Err(Error::from(ErrorKind::BadContainer("XML document has no <GPIF> root".to_string())));
    }

    let score = root.children().find(|c| c.has_tag_name("Score"));
    let title = score.and_then(|s| child_text(s, "Title")).unwrap_or_default();
    let artist = score.and_then(|s| child_text(s, "Artist")).unwrap_or_default();
    let album = score.and_then(|s| child_text(s, "Album")).unwrap_or_default();

    let indexes = Indexes {
        notes: index_children(root, "Notes"),
        beats: index_children(root, "Beats"),
        voices: index_children(root, "Voices"),
        bars: index_children(root, "Bars"),
        rhythms: index_children(root, "Rhythms"),
    };
    debug!(
        "Indexed {} notes, {} beats, {} voices, {} bars, {} rhythms",
        indexes.notes.len(),
        indexes.beats.len(),
        indexes.voices.len(),
        indexes.bars.len(),
        indexes.rhythms.len()
    );

    let master_bars: Vec<Node> = root
        .descendants()
        .find(|n| n.has_tag_name("MasterBars"))
        .map(|mb| mb.children().filter(|c| c.has_tag_name("MasterBar")).collect())
        .unwrap_or_default();

    let automations = tempo_automations(root);

    let track_nodes: Vec<Node> = root
        .descendants()
        .find(|n| n.has_tag_name("Tracks"))
        .map(|t| t.children().filter(|c| c.has_tag_name("Track")).collect())
        .unwrap_or_default();

    if track_nodes.len() > limits.max_track_count as usize {
        return Err(Error::from(ErrorKind::BadContainer("track count exceeds limit".to_string())));
    }

    let mut tracks = Vec::with_capacity(track_nodes.len());
    for (position, track_node) in track_nodes.iter().enumerate() {
        tracks.push(build_track(*track_node, position, &master_bars, &indexes, &automations, limits)?);
    }

    Ok(Song {
        title,
        artist,
        album,
        tempo: tempo_at(&automations, 0),
        tracks,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<GPIF>
  <Score>
    <Title>Test Song</Title>
    <Artist>Tester</Artist>
    <Album>Demo</Album>
  </Score>
  <MasterTrack>
    <Automations>
      <Automation>
        <Type>Tempo</Type>
        <Bar>0</Bar>
        <Value>120</Value>
      </Automation>
    </Automations>
  </MasterTrack>
  <Tracks>
    <Track id="0">
      <Name>Guitar</Name>
      <Properties>
        <Property name="Tuning"><Pitches>40 45 50 55 59 64</Pitches></Property>
      </Properties>
    </Track>
  </Tracks>
  <MasterBars>
    <MasterBar>
      <Time>4/4</Time>
      <Bars>0</Bars>
    </MasterBar>
  </MasterBars>
  <Bars>
    <Bar id="0">
      <Voices>0 -1 -1 -1</Voices>
    </Bar>
  </Bars>
  <Voices>
    <Voice id="0">
      <Beats>0</Beats>
    </Voice>
  </Voices>
  <Beats>
    <Beat id="0">
      <Notes>0</Notes>
      <Rhythm ref="r0"/>
      <Dynamic>F</Dynamic>
    </Beat>
  </Beats>
  <Rhythms>
    <Rhythm id="r0">
      <NoteValue>Quarter</NoteValue>
    </Rhythm>
  </Rhythms>
  <Notes>
    <Note id="0">
      <Properties>
        <Property name="String">0</Property>
        <Property name="Fret">3</Property>
      </Properties>
      <LetRing/>
    </Note>
  </Notes>
</GPIF>"#;

    #[test]
    fn transforms_minimal_document() {
        let song = transform(SAMPLE, &DecodeLimits::default()).unwrap();
        assert_eq!(song.title, "Test Song");
        assert_eq!(song.artist, "Tester");
        assert_eq!(song.tempo, 120);
        assert_eq!(song.tracks.len(), 1);

        let track = &song.tracks[0];
        assert_eq!(track.tuning, vec!["E", "B", "G", "D", "A", "E"]);
        assert_eq!(track.tuning_midi, vec![64, 59, 55, 50, 45, 40]);
        assert_eq!(track.bars.len(), 1);

        let beat = &track.bars[0].beats[0];
        assert_eq!(beat.duration, Duration::Quarter);
        assert_eq!(beat.dynamic, Some(Dynamic::F));
        assert!(!beat.is_rest);

        let note = &beat.notes[0];
        assert_eq!(note.string, 5);
        assert_eq!(note.pitch_class, 7);
        assert_eq!(note.note_name, "G");
        assert!(note.let_ring);
    }

    #[test]
    fn rejects_non_gpif_root() {
        let err = transform("<Root/>", &DecodeLimits::default()).unwrap_err();
        assert!(err.to_string().contains("GPIF"));
    }

    #[test]
    fn extract_capo_matches_whitespace_then_digits() {
        assert_eq!(extract_capo_from_freetext("Capo 5th fret"), Some(5));
        assert_eq!(extract_capo_from_freetext("capo   12"), Some(12));
        assert_eq!(extract_capo_from_freetext("no capo here"), None);
        assert_eq!(extract_capo_from_freetext("capo99"), None);
    }
}
