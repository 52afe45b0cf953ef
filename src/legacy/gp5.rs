//! `Gp5Decoder`: sequential binary decoder for GP5 files (spec §4.8).
//! Grounded on the teacher's `legacy/gp5_reader.rs` (`read_info`'s nine
//! `IntByteSizeString` fields, in the same order), rebuilt over
//! `ByteCursor` to emit `model::Song` directly.

use crate::cursor::ByteCursor;
use crate::error::{Error, ErrorKind, Result};
use crate::limits::DecodeLimits;
use crate::model::*;

use super::{duration_from_code, read_measure_headers, tuplet_from_code, MeasureHeader};

struct Version {
    major: u32,
    minor: u32,
}

fn parse_version(s: &str) -> Result<Version> {
    let v_pos = s.find('v').ok_or_else(|| Error::from(ErrorKind::UnsupportedVersion(s.to_string())))?;
    let rest = &s[v_pos + 1..];
    let mut parts = rest.splitn(2, '.');
    let major_str: String = parts.next().unwrap_or("").chars().take_while(|c| c.is_ascii_digit()).collect();
    let minor_str: String = parts
        .next()
        .unwrap_or("")
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    let major = major_str.parse().map_err(|_| Error::from(ErrorKind::UnsupportedVersion(s.to_string())))?;
    let minor = minor_str.parse().unwrap_or(0);
    Ok(Version { major, minor })
}

struct NoteEffects {
    bend: Option<Bend>,
    hammer_on_or_pull_off: bool,
    let_ring: bool,
    slide: Option<SlideType>,
    harmonic: Option<HarmonicType>,
    palm_mute: bool,
    vibrato: bool,
}

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

fn read_note_effects(cursor: &mut ByteCursor) -> Result<NoteEffects> {
    let flags1 = cursor.read_u8()?;
    let flags2 = cursor.read_u8()?;

    let bend = if flags1 & 0x01 != 0 { Some(read_bend(cursor)?) } else { None };
    let hammer_on_or_pull_off = flags1 & 0x02 != 0;
    let let_ring = flags1 & 0x08 != 0;
    if flags1 & 0x10 != 0 {
        cursor.skip(5)?; // grace note
    }

    let palm_mute = flags2 & 0x02 != 0;
    if flags2 & 0x04 != 0 {
        cursor.read_i8()?; // tremolo picking
    }
    let slide = if flags2 & 0x08 != 0 {
        SlideType::from_flags(cursor.read_u8()? as i32)
    } else {
        None
    };
    let harmonic = if flags2 & 0x10 != 0 {
        let code = cursor.read_i8()?;
        match code {
            2 => cursor.skip(3)?,
            3 => cursor.skip(1)?,
            _ => {}
        }
        HarmonicType::from_code(code)
    } else {
        None
    };
    if flags2 & 0x20 != 0 {
        cursor.skip(2)?; // trill
    }
    let vibrato = flags2 & 0x40 != 0;

    Ok(NoteEffects { bend, hammer_on_or_pull_off, let_ring, slide, harmonic, palm_mute, vibrato })
}

/// Consumes a chord diagram bit-for-bit (old or new format); not surfaced
/// in `Song` since spec §3 defines no chord type.
fn read_chord(cursor: &mut ByteCursor) -> Result<()> {
    let new_format = cursor.read_bool()?;
    if new_format {
        cursor.skip(16)?; // sharp + reserved + root/type/extension/bass/tonality/add
        cursor.read_byte_sized_string(22)?;
        cursor.skip(3)?; // fifth, ninth, eleventh
        cursor.skip(4)?; // first fret
        cursor.skip(7 * 4)?; // per-string fret
        cursor.skip(1)?; // num barres
        cursor.skip(5 + 5 + 5)?; // barre frets/starts/ends
        cursor.skip(1)?;
        cursor.skip(7)?; // omissions
        cursor.skip(1)?;
        cursor.skip(7)?; // fingerings
        cursor.skip(1)?; // show
    } else {
        cursor.read_int_byte_sized_string()?;
        let first_fret = cursor.read_i32()?;
        if first_fret != 0 {
            cursor.skip(6 * 4)?;
        }
    }
    Ok(())
}

/// Beat effects (distinct from note effects); consumed for alignment only.
fn read_beat_effects(cursor: &mut ByteCursor) -> Result<()> {
    let flags1 = cursor.read_u8()?;
    let flags2 = cursor.read_u8()?;
    if flags1 & 0x20 != 0 {
        cursor.read_u8()?; // tap/slap/pop
    }
    if flags2 & 0x04 != 0 {
        read_bend(cursor)?; // tremolo bar uses the same point-list shape
    }
    if flags1 & 0x40 != 0 {
        cursor.skip(2)?; // stroke up/down
    }
    if flags2 & 0x02 != 0 {
        cursor.skip(1)?; // pickstroke
    }
    Ok(())
}

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
    cursor.skip(1)?; // wah/rse flags
    Ok(())
}

struct BeatBuild {
    notes: Vec<Note>,
    duration: Duration,
    dotted: u8,
    tuplet: Option<Tuplet>,
    velocities: Vec<i8>,
}

fn read_note(cursor: &mut ByteCursor) -> Result<(Note, i8)> {
    let flags = cursor.read_u8()?;
    let heavy_accent = flags & 0x02 != 0;
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
        cursor.skip(8)?; // duration percent
    }
    cursor.skip(1)?; // GP5 flags2 byte

    let effects = if flags & 0x08 != 0 { Some(read_note_effects(cursor)?) } else { None };

    let note = Note {
        string: 0, // filled in by the caller, which knows the string-mask bit
        fret,
        pitch_class: 0,
        note_name: String::new(),
        slide: effects.as_ref().and_then(|e| e.slide),
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
        accent: accent || heavy_accent,
    };
    Ok((note, velocity))
}

fn read_beat(cursor: &mut ByteCursor, tuning_midi: &[i32], capo: i32) -> Result<BeatBuild> {
    let flags = cursor.read_u8()?;
    if flags & 0x40 != 0 {
        cursor.read_u8()?; // status: 0 empty, 2 rest
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

    let flags2 = cursor.read_i16()?;
    if flags2 & 0x0800 != 0 {
        cursor.skip(1)?;
    }

    Ok(BeatBuild { notes, duration, dotted, tuplet, velocities })
}

struct TrackHeaderData {
    name: String,
    tuning_midi: Vec<i32>,
    capo_fret: i32,
}

fn read_track_header(cursor: &mut ByteCursor, minor: u32) -> Result<TrackHeaderData> {
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
    cursor.read_i16()?; // display flags
    cursor.skip(2)?; // auto accent, midi bank

    cursor.skip(1)?; // humanize
    cursor.skip(24)?;
    if minor > 0 {
        cursor.skip(4 + 2 + 2)?; // RSE instrument: int32 + int16 + pad
    } else {
        cursor.skip(4 * 4)?; // RSE instrument: 4 x int32
    }
    if minor > 0 {
        cursor.skip(4)?; // 4-band equaliser
        cursor.read_int_byte_sized_string()?; // RSE instrument effect
        cursor.read_int_byte_sized_string()?;
    }

    Ok(TrackHeaderData { name, tuning_midi: tuning, capo_fret })
}

fn read_info(cursor: &mut ByteCursor) -> Result<(String, String, String)> {
    let title = cursor.read_int_byte_sized_string()?;
    cursor.read_int_byte_sized_string()?; // subtitle
    let artist = cursor.read_int_byte_sized_string()?;
    let album = cursor.read_int_byte_sized_string()?;
    cursor.read_int_byte_sized_string()?; // words
    cursor.read_int_byte_sized_string()?; // music
    cursor.read_int_byte_sized_string()?; // copyright
    cursor.read_int_byte_sized_string()?; // tab
    cursor.read_int_byte_sized_string()?; // instructions
    let notice_count = cursor.read_i32()?.max(0);
    for _ in 0..notice_count {
        cursor.read_int_byte_sized_string()?;
    }
    Ok((title, artist, album))
}

/// Parses a GP5 file (spec §4.8).
pub fn parse(data: &[u8], limits: &DecodeLimits) -> Result<Song> {
    let mut cursor = ByteCursor::new(data);

    let version_string = cursor.read_byte_sized_string(30)?;
    let version = parse_version(&version_string)?;
    if version.major != 5 {
        return Err(Error::from(ErrorKind::UnsupportedVersion(version_string)));
    }
    let minor = version.minor;
    debug!("[GP5] version {}.{}", version.major, minor);

    let (title, artist, album) = read_info(&mut cursor)?;
    debug!("[GP5] Read info: title={:?}, artist={:?}, album={:?}", title, artist, album);

    // Lyrics.
    cursor.read_i32()?; // track index
    for _ in 0..5 {
        cursor.read_i32()?; // start bar
        cursor.read_int_string()?; // text
    }

    cursor.skip(4 + 4 + 11)?; // RSE master

    // Page setup.
    for _ in 0..7 {
        cursor.read_i32()?;
    }
    cursor.read_i16()?; // flags
    for _ in 0..10 {
        cursor.read_int_byte_sized_string()?;
    }

    cursor.read_int_byte_sized_string()?; // tempo name
    let tempo = cursor.read_i32()?.max(0) as u32;
    if minor > 0 {
        cursor.read_bool()?; // hideTempo
    }

    cursor.read_i8()?; // key
    cursor.read_i32()?; // octave

    for _ in 0..64 {
        cursor.read_i32()?; // instrument
        cursor.read_bytes(6)?;
        cursor.skip(2)?; // padding
    }

    for _ in 0..19 {
        cursor.read_i16()?;
    }
    cursor.read_i32()?; // master reverb

    let measure_count = cursor.read_i32()?;
    let track_count = cursor.read_i32()?;
    if measure_count > limits.max_measure_count || track_count > limits.max_track_count {
        return Err(Error::from(ErrorKind::BadContainer("measure/track count exceeds limit".to_string())));
    }
    debug!("[GP5] {} measures, {} tracks", measure_count, track_count);

    let measure_headers = read_measure_headers(&mut cursor, measure_count)?;

    let mut track_headers = Vec::with_capacity(track_count as usize);
    for i in 0..track_count {
        if i == 0 || minor == 0 {
            cursor.skip(1)?; // blank byte
        }
        track_headers.push(read_track_header(&mut cursor, minor)?);
    }
    cursor.skip(if minor > 0 { 1 } else { 2 })?;

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
            let voice1 = read_voice(&mut cursor, &track.tuning_midi, track.capo_fret)?;
            let voice2 = read_voice(&mut cursor, &track.tuning_midi, track.capo_fret)?;
            cursor.skip(1)?; // line-break byte
            let voice = if voice1.is_empty() { voice2 } else { voice1 };

            let beats: Vec<Beat> = voice
                .into_iter()
                .map(|build| {
                    let dynamic = build
                        .velocities
                        .iter()
                        .copied()
                        .max()
                        .map(Dynamic::from_gp5_velocity);
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

fn read_voice(cursor: &mut ByteCursor, tuning_midi: &[i32], capo: i32) -> Result<Vec<BeatBuild>> {
    let beat_count = cursor.read_i32()?.max(0);
    let mut beats = Vec::with_capacity(beat_count as usize);
    for _ in 0..beat_count {
        beats.push(read_beat(cursor, tuning_midi, capo)?);
    }
    Ok(beats)
}
