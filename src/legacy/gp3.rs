//! `Gp3Decoder`: sequential binary decoder for GP3 files (spec §4.8's GP3
//! differences). GP3 predates most of GP5's richer blocks: one info string
//! fewer, a single triplet-feel bool instead of the directions table, one
//! voice per measure, one-byte beat/note effects, and no track RSE block.

use crate::cursor::ByteCursor;
use crate::error::{Error, ErrorKind, Result};
use crate::limits::DecodeLimits;
use crate::model::*;

use super::{duration_from_code, read_measure_headers, tuplet_from_code, MeasureHeader};

fn read_bend(cursor: &mut ByteCursor) -> Result<Bend> {
    cursor.read_i8()?; // type
    cursor.read_i32()?; // value
    let point_count = cursor.read_i32()?.max(0).min(64);
    let mut values = Vec::with_capacity(point_count as usize);
    for _ in 0..point_count {
        cursor.read_i32()?; // position
        let value = cursor.read_i32()?;
        cursor.read_bool()?; // vibrato
        values.push(value);
    }
    let origin = values.first().copied().unwrap_or(0) as f32 / 100.0;
    let destination = values.last().copied().unwrap_or(0) as f32 / 100.0;
    let middle = values.iter().copied().max_by_key(|v| v.abs()).unwrap_or(0) as f32 / 100.0;
    Ok(Bend { origin, destination, middle })
}

/// GP3's chord diagrams have a short and long form; the long form matches
/// GP5's new format minus the fields GP3 never had (fifth/ninth/eleventh
/// extensions collapse into a single reserved skip).
fn read_chord(cursor: &mut ByteCursor) -> Result<()> {
    let header = cursor.read_u8()?;
    if header & 0x01 == 0 {
        // short form
        cursor.read_int_byte_sized_string()?;
        let first_fret = cursor.read_i32()?;
        if first_fret != 0 {
            cursor.skip(6 * 4)?;
        }
    } else {
        // long form
        cursor.skip(16)?;
        cursor.read_byte_sized_string(21)?;
        cursor.skip(4)?; // first fret
        cursor.skip(7 * 4)?;
        cursor.skip(1)?; // num barres
        cursor.skip(5 + 5 + 5)?;
        cursor.skip(1)?;
        cursor.skip(7)?;
        cursor.skip(1)?;
    }
    Ok(())
}

/// One-byte beat/note effects block (simplified relative to GP5's two
/// flag bytes): accent, vibrato, let-ring, and tremolo bar, each behind a
/// single bit with no per-effect payload beyond the tremolo-bar point list.
fn read_beat_effects(cursor: &mut ByteCursor) -> Result<()> {
    let flags = cursor.read_u8()?;
    if flags & 0x20 != 0 {
        cursor.read_i32()?; // tremolo bar dip, time-independent
    }
    Ok(())
}

/// GP3's mix-table change has no RSE block: instrument + five signed-byte
/// effect values, a tempo name/value pair, and per-effect durations.
fn read_mix_table_change(cursor: &mut ByteCursor) -> Result<()> {
    cursor.read_i8()?; // instrument
    let volume = cursor.read_i8()?;
    let balance = cursor.read_i8()?;
    let chorus = cursor.read_i8()?;
    let reverb = cursor.read_i8()?;
    let phaser = cursor.read_i8()?;
    let tremolo = cursor.read_i8()?;
    cursor.read_int_byte_sized_string()?; // tempo name
    let tempo = cursor.read_i32()?;
    for value in [volume, balance, chorus, reverb, phaser, tremolo] {
        if value >= 0 {
            cursor.skip(1)?;
        }
    }
    if tempo >= 0 {
        cursor.skip(1)?;
    }
    Ok(())
}

struct NoteEffects {
    bend: Option<Bend>,
    hammer_on_or_pull_off: bool,
    let_ring: bool,
    slide: bool,
    harmonic: Option<HarmonicType>,
    palm_mute: bool,
    vibrato: bool,
}

/// GP3's note effects fit in a single flag byte; richer sub-structures
/// (grace note, trill, tap/slap/pop) do not exist yet in this format.
fn read_note_effects(cursor: &mut ByteCursor) -> Result<NoteEffects> {
    let flags = cursor.read_u8()?;
    let bend = if flags & 0x01 != 0 { Some(read_bend(cursor)?) } else { None };
    let hammer_on_or_pull_off = flags & 0x02 != 0;
    let let_ring = flags & 0x08 != 0;
    let slide = flags & 0x04 != 0;
    let palm_mute = flags & 0x20 != 0;
    let vibrato = flags & 0x40 != 0;
    let harmonic = if flags & 0x10 != 0 {
        let code = cursor.read_i8()?;
        HarmonicType::from_code(code)
    } else {
        None
    };
    Ok(NoteEffects { bend, hammer_on_or_pull_off, let_ring, slide, harmonic, palm_mute, vibrato })
}

struct BeatBuild {
    notes: Vec<Note>,
    duration: Duration,
    dotted: u8,
    tuplet: Option<Tuplet>,
    velocities: Vec<i8>,
}

/// Two signed bytes of time-independent duration, rather than GP5's
/// signed-byte-plus-bool encoding.
fn read_note(cursor: &mut ByteCursor) -> Result<(Note, i8)> {
    let flags = cursor.read_u8()?;
    let accent = flags & 0x40 != 0;

    let mut note_type = 1u8;
    if flags & 0x20 != 0 {
        note_type = cursor.read_u8()?;
    }
    let mut velocity: i8 = 8;
    if flags & 0x10 != 0 {
        velocity = cursor.read_i8()?;
    }
    let mut fret: i32 = 0;
    if flags & 0x20 != 0 {
        let raw = cursor.read_i8()? as i32;
        fret = raw.clamp(0, 99);
    }
    if flags & 0x80 != 0 {
        cursor.skip(2)?; // fingerings
    }
    if flags & 0x01 != 0 {
        cursor.skip(2)?; // time-independent duration: two signed bytes
    }

    let effects = if flags & 0x08 != 0 { Some(read_note_effects(cursor)?) } else { None };

    let note = Note {
        string: 0,
        fret,
        pitch_class: 0,
        note_name: String::new(),
        slide: effects.as_ref().and_then(|e| {
            if e.slide {
                SlideType::from_flags(0x01)
            } else {
                None
            }
        }),
        harmonic: effects.as_ref().and_then(|e| e.harmonic),
        palm_mute: effects.as_ref().map_or(false, |e| e.palm_mute),
        muted: note_type == 3,
        let_ring: effects.as_ref().map_or(false, |e| e.let_ring),
        bend: effects.as_ref().and_then(|e| e.bend),
        tie: Tie { origin: false, destination: note_type == 2 },
        vibrato: effects.as_ref().map_or(false, |e| e.vibrato),
        hammer_on: effects.as_ref().map_or(false, |e| e.hammer_on_or_pull_off),
        pull_off: false,
        tapped: false,
        accent,
    };
    Ok((note, velocity))
}

fn read_beat(cursor: &mut ByteCursor, tuning_midi: &[i32], capo: i32) -> Result<BeatBuild> {
    let flags = cursor.read_u8()?;
    if flags & 0x40 != 0 {
        cursor.read_u8()?; // status
    }

    let duration = duration_from_code(cursor.read_i8()?)?;
    let dotted = if flags & 0x01 != 0 { 1 } else { 0 };
    let tuplet = if flags & 0x20 != 0 { tuplet_from_code(cursor.read_i32()?) } else { None };

    if flags & 0x02 != 0 {
        read_chord(cursor)?;
    }
    if flags & 0x04 != 0 {
        cursor.read_int_byte_sized_string()?;
    }
    if flags & 0x08 != 0 {
        read_beat_effects(cursor)?;
    }
    if flags & 0x10 != 0 {
        read_mix_table_change(cursor)?;
    }

    let string_mask = cursor.read_u8()?;
    let mut notes = Vec::new();
    let mut velocities = Vec::new();
    for bit_index in (0..=6).rev() {
        if string_mask & (1 << bit_index) != 0 {
            let string_index = 6 - bit_index;
            let (mut note, velocity) = read_note(cursor)?;
            let tuning_for_string = tuning_midi.get(string_index).copied().unwrap_or(0);
            note.string = string_index as u8;
            note.pitch_class = crate::pitch::midi_to_pitch_class(tuning_for_string + capo + note.fret);
            note.note_name = crate::pitch::note_name(note.pitch_class, true);
            notes.push(note);
            velocities.push(velocity);
        }
    }

    Ok(BeatBuild { notes, duration, dotted, tuplet, velocities })
}

struct TrackHeaderData {
    name: String,
    tuning_midi: Vec<i32>,
    capo_fret: i32,
}

/// GP3's track header stops after colour and display flags: there is no
/// RSE block at all, unlike GP5 where one is always present.
fn read_track_header(cursor: &mut ByteCursor) -> Result<TrackHeaderData> {
    cursor.read_u8()?; // flags1 (bit0 percussion)
    let name = cursor.read_byte_sized_string(40)?;
    let num_strings = cursor.read_i32()?.max(0) as usize;
    let mut tuning = Vec::with_capacity(7);
    for _ in 0..7 {
        tuning.push(cursor.read_i32()?);
    }
    tuning.truncate(num_strings.min(7).max(1));

    cursor.read_i32()?; // port
    cursor.read_i32()?; // channelIndex (1-based)
    cursor.read_i32()?; // effectChannel (1-based)
    cursor.read_i32()?; // fretCount
    let capo_fret = cursor.read_i32()?;
    cursor.skip(4)?; // colour

    Ok(TrackHeaderData { name, tuning_midi: tuning, capo_fret })
}

fn read_info(cursor: &mut ByteCursor) -> Result<(String, String, String)> {
    let title = cursor.read_int_byte_sized_string()?;
    cursor.read_int_byte_sized_string()?; // subtitle
    let artist = cursor.read_int_byte_sized_string()?;
    let album = cursor.read_int_byte_sized_string()?;
    cursor.read_int_byte_sized_string()?; // words
    cursor.read_int_byte_sized_string()?; // copyright
    cursor.read_int_byte_sized_string()?; // tab
    cursor.read_int_byte_sized_string()?; // instructions
    let notice_count = cursor.read_i32()?.max(0);
    for _ in 0..notice_count {
        cursor.read_int_byte_sized_string()?;
    }
    Ok((title, artist, album))
}

fn bar_from_header(index: u32, header: &MeasureHeader, beats: Vec<Beat>) -> Bar {
    Bar {
        index,
        time_signature: header.time_signature,
        key_signature: header.key_signature,
        section: header.section.clone(),
        beats,
        repeat_start: header.repeat_start,
        repeat_end: header.repeat_end,
        repeat_count: header.repeat_count,
    }
}

/// Parses a GP3 file (spec §4.8's GP3 differences paragraph).
pub fn parse(data: &[u8], limits: &DecodeLimits) -> Result<Song> {
    let mut cursor = ByteCursor::new(data);

    let version_string = cursor.read_byte_sized_string(30)?;
    if !version_string.contains("v3") {
        return Err(Error::from(ErrorKind::UnsupportedVersion(version_string)));
    }

    let (title, artist, album) = read_info(&mut cursor)?;
    debug!("[GP3] Read info: title={:?}, artist={:?}, album={:?}", title, artist, album);

    cursor.read_bool()?; // triplet feel

    let tempo = cursor.read_i32()?.max(0) as u32;
    cursor.read_i32()?; // key

    let measure_count = cursor.read_i32()?;
    let track_count = cursor.read_i32()?;
    if measure_count > limits.max_measure_count || track_count > limits.max_track_count {
        return Err(Error::from(ErrorKind::BadContainer("measure/track count exceeds limit".to_string())));
    }
    debug!("[GP3] {} measures, {} tracks", measure_count, track_count);

    let measure_headers = read_measure_headers(&mut cursor, measure_count)?;

    let mut track_headers = Vec::with_capacity(track_count as usize);
    for _ in 0..track_count {
        track_headers.push(read_track_header(&mut cursor)?);
    }

    let mut tracks: Vec<Track> = track_headers
        .iter()
        .enumerate()
        .map(|(i, h)| Track {
            id: i as u32,
            name: h.name.clone(),
            short_name: h.name.clone(),
            instrument: None,
            tuning: h
                .tuning_midi
                .iter()
                .map(|&m| crate::pitch::note_name(crate::pitch::midi_to_pitch_class(m), true))
                .collect(),
            tuning_midi: h.tuning_midi.clone(),
            capo_fret: h.capo_fret,
            bars: Vec::with_capacity(measure_count.max(0) as usize),
        })
        .collect();

    let mut beat_counters = vec![0u32; tracks.len()];

    for (m, header) in measure_headers.iter().enumerate() {
        for (t, track) in tracks.iter_mut().enumerate() {
            let beat_count = cursor.read_i32()?.max(0);
            let mut builds = Vec::with_capacity(beat_count as usize);
            for _ in 0..beat_count {
                builds.push(read_beat(&mut cursor, &track.tuning_midi, track.capo_fret)?);
            }

            let beats: Vec<Beat> = builds
                .into_iter()
                .map(|build| {
                    let dynamic = build.velocities.iter().copied().max().map(Dynamic::from_gp5_velocity);
                    let beat_index = beat_counters[t];
                    beat_counters[t] += 1;
                    Beat {
                        index: beat_index,
                        bar_index: m as u32,
                        is_rest: build.notes.is_empty(),
                        notes: build.notes,
                        duration: build.duration,
                        tuplet: build.tuplet,
                        dotted: build.dotted,
                        dynamic,
                        tempo,
                    }
                })
                .collect();

            track.bars.push(bar_from_header(m as u32, header, beats));
        }
    }

    Ok(Song { title, artist, album, tempo, tracks })
}
