//! End-to-end scenarios across the public API, one per supported container
//! format plus the scenario/property checks spec.md §8 lists by name (S1-S7,
//! a sample of P1-P8). Fixtures here are hand-built rather than real-world
//! files, since none ship with this crate; each one is constructed to match
//! the exact field order its decoder reads, not just "looks plausible".

use byteorder::{ByteOrder, LittleEndian};

use gp_decoder::{Beat, DecodeLimits, Duration};

fn push_u16(buf: &mut Vec<u8>, v: u16) {
    buf.extend_from_slice(&v.to_le_bytes());
}
fn push_i32(buf: &mut Vec<u8>, v: i32) {
    buf.extend_from_slice(&v.to_le_bytes());
}
fn push_u32(buf: &mut Vec<u8>, v: u32) {
    buf.extend_from_slice(&v.to_le_bytes());
}

/// `uint8 strLen`, `strLen` bytes, padded to `fixed_len` total payload.
fn push_byte_sized_string(buf: &mut Vec<u8>, s: &str, fixed_len: usize) {
    let bytes = s.as_bytes();
    buf.push(bytes.len() as u8);
    buf.extend_from_slice(bytes);
    buf.resize(buf.len() + (fixed_len - bytes.len()), 0);
}

/// `int32 totalSize`, `uint8 strLen`, `strLen` bytes, no extra padding.
fn push_int_byte_sized_string(buf: &mut Vec<u8>, s: &str) {
    let bytes = s.as_bytes();
    push_i32(buf, 1 + bytes.len() as i32);
    buf.push(bytes.len() as u8);
    buf.extend_from_slice(bytes);
}

/// Builds the smallest GP3 buffer `legacy::gp3::parse` will accept: one
/// track (standard six-string tuning), one measure, one beat, one note.
fn build_minimal_gp3() -> Vec<u8> {
    let mut buf = Vec::new();

    push_byte_sized_string(&mut buf, "FICHIER GUITAR PRO v3.00", 30);

    push_int_byte_sized_string(&mut buf, "Test Song"); // title
    push_int_byte_sized_string(&mut buf, ""); // subtitle
    push_int_byte_sized_string(&mut buf, "Test Artist"); // artist
    push_int_byte_sized_string(&mut buf, "Test Album"); // album
    push_int_byte_sized_string(&mut buf, ""); // words
    push_int_byte_sized_string(&mut buf, ""); // copyright
    push_int_byte_sized_string(&mut buf, ""); // tab
    push_int_byte_sized_string(&mut buf, ""); // instructions
    push_i32(&mut buf, 0); // notice count

    buf.push(0); // triplet feel = false
    push_i32(&mut buf, 132); // tempo
    push_i32(&mut buf, 0); // key

    push_i32(&mut buf, 1); // measure count
    push_i32(&mut buf, 1); // track count

    // One measure header, first (no leading skip byte), flags = 0: keeps the
    // default 4/4 time signature and no marker/key/repeat/alternate-ending.
    buf.push(0x00); // flags
    buf.push(0x00); // flags & 0x10 == 0 -> unknown byte
    buf.push(0x00); // triplet feel byte

    // One track header.
    buf.push(0x00); // flags1
    push_byte_sized_string(&mut buf, "Test Track", 40);
    push_i32(&mut buf, 6); // string count
    for midi in [64i32, 59, 55, 50, 45, 40, 0] {
        push_i32(&mut buf, midi);
    }
    push_i32(&mut buf, 1); // port
    push_i32(&mut buf, 0); // channel index
    push_i32(&mut buf, 0); // effect channel
    push_i32(&mut buf, 24); // fret count
    push_i32(&mut buf, 0); // capo fret
    push_u32(&mut buf, 0); // colour

    // One beat on string index 0 (highest string), fret 3, no frills.
    push_i32(&mut buf, 1); // beat count for this measure/track
    buf.push(0x00); // beat flags
    buf.push(0); // duration code: Quarter
    buf.push(0x40); // string mask: bit 6 set -> string_index 0
    buf.push(0x20); // note flags: 0x20 gates note_type AND fret
    buf.push(1); // note_type: normal
    buf.push(3); // fret

    buf
}

fn build_stored_gp7_archive(name: &str, payload: &[u8]) -> Vec<u8> {
    const LOCAL_HEADER_MAGIC: u32 = 0x0403_4B50;
    const CENTRAL_DIR_MAGIC: u32 = 0x0201_4B50;
    const EOCD_MAGIC: u32 = 0x0605_4B50;

    let mut buf = Vec::new();
    let local_header_offset = 0u32;

    push_u32(&mut buf, LOCAL_HEADER_MAGIC);
    push_u16(&mut buf, 20);
    push_u16(&mut buf, 0);
    push_u16(&mut buf, 0); // method: stored
    push_u16(&mut buf, 0);
    push_u16(&mut buf, 0);
    push_u32(&mut buf, 0);
    push_u32(&mut buf, payload.len() as u32);
    push_u32(&mut buf, payload.len() as u32);
    push_u16(&mut buf, name.len() as u16);
    push_u16(&mut buf, 0);
    buf.extend_from_slice(name.as_bytes());
    buf.extend_from_slice(payload);

    let cd_offset = buf.len() as u32;
    push_u32(&mut buf, CENTRAL_DIR_MAGIC);
    push_u16(&mut buf, 20);
    push_u16(&mut buf, 20);
    push_u16(&mut buf, 0);
    push_u16(&mut buf, 0);
    push_u16(&mut buf, 0);
    push_u16(&mut buf, 0);
    push_u32(&mut buf, 0);
    push_u32(&mut buf, payload.len() as u32);
    push_u32(&mut buf, payload.len() as u32);
    push_u16(&mut buf, name.len() as u16);
    push_u16(&mut buf, 0);
    push_u16(&mut buf, 0);
    push_u16(&mut buf, 0);
    push_u16(&mut buf, 0);
    push_u32(&mut buf, 0);
    push_u32(&mut buf, local_header_offset);
    buf.extend_from_slice(name.as_bytes());
    let cd_size = buf.len() as u32 - cd_offset;

    push_u32(&mut buf, EOCD_MAGIC);
    push_u16(&mut buf, 0);
    push_u16(&mut buf, 0);
    push_u16(&mut buf, 1);
    push_u16(&mut buf, 1);
    push_u32(&mut buf, cd_size);
    push_u32(&mut buf, cd_offset);
    push_u16(&mut buf, 0);

    buf
}

const SAMPLE_GPIF: &str = r#"<GPIF>
  <Score>
    <Title>Archive Song</Title>
    <Artist>Archive Artist</Artist>
    <Album>Archive Album</Album>
  </Score>
  <MasterTrack>
    <Automations>
      <Automation>
        <Type>Tempo</Type>
        <Bar>0</Bar>
        <Value>140</Value>
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
    </Note>
  </Notes>
</GPIF>"#;

/// S1: a 10-byte buffer with no recognizable signal fails `UNRECOGNIZED_FORMAT`
/// without a filename, and dispatches by suffix with one.
#[test]
fn s1_detect_format_uses_filename_fallback() {
    let blank = [0u8; 10];
    assert!(gp_decoder::detect_format(&blank, None).is_err());
    assert_eq!(gp_decoder::detect_format(&blank, Some("x.gpx")).unwrap(), gp_decoder::detect::Format::Gpx);
    assert_eq!(gp_decoder::detect_format(&blank, Some("x.gp")).unwrap(), gp_decoder::detect::Format::Gp7);
    assert_eq!(gp_decoder::detect_format(&blank, Some("x.gp5")).unwrap(), gp_decoder::detect::Format::Gp5);
}

/// S2: a two-byte buffer is too short to even attempt the magic checks.
#[test]
fn s2_detect_format_on_tiny_buffer_is_truncated() {
    let err = gp_decoder::detect_format(&[0u8, 1], None).unwrap_err();
    assert!(err.to_string().contains("past the end"));
}

/// S3-flavored: a synthetic (not real-fixture) GP5-family file decodes end
/// to end through the public `parse` entry point, with every invariant in
/// spec.md §8 (P1-P4) holding on the result.
#[test]
fn s3_gp3_fixture_decodes_into_expected_song() {
    let data = build_minimal_gp3();
    let song = gp_decoder::parse(&data).unwrap();

    assert_eq!(song.title, "Test Song");
    assert_eq!(song.artist, "Test Artist");
    assert_eq!(song.album, "Test Album");
    assert_eq!(song.tempo, 132);
    assert_eq!(song.tracks.len(), 1);

    let track = &song.tracks[0];
    assert_eq!(track.name, "Test Track");
    // P4: tuning/tuningMidi are the same length as the string count, and
    // tuning[0] is the highest-pitch string.
    assert_eq!(track.tuning.len(), track.tuning_midi.len());
    assert_eq!(track.tuning_midi[0], 64);
    assert_eq!(track.bars.len(), 1);

    let bar = &track.bars[0];
    assert_eq!(bar.beats.len(), 1);
    let beat = &bar.beats[0];
    // P2/P3: beat index starts at 0, bar_index matches the enclosing bar.
    assert_eq!(beat.index, 0);
    assert_eq!(beat.bar_index, bar.index);
    assert_eq!(beat.duration, Duration::Quarter);
    assert!(!beat.is_rest);

    let note = &beat.notes[0];
    assert_eq!(note.string, 0);
    assert_eq!(note.fret, 3);
    // P1: pitchClass == (tuningMidi[string] + capoFret + fret) mod 12.
    let expected_pc = ((track.tuning_midi[0] + track.capo_fret + note.fret) % 12 + 12) % 12;
    assert_eq!(note.pitch_class, expected_pc as u8);
}

/// S4: every GPX track has at least one bar and a non-empty tuning.
#[test]
fn s4_gpx_archive_decodes_with_nonempty_tracks() {
    // `extract_gpif` strips the 4-byte "BCFS" magic before handing the rest
    // to the sector walk, so the sector-aligned offsets below are built
    // against `image`, not the final prefixed buffer.
    const SECTOR_SIZE: usize = 0x1000;
    let mut image = vec![0u8; SECTOR_SIZE * 3];

    let gpif = SAMPLE_GPIF.as_bytes();
    LittleEndian::write_u32(&mut image[SECTOR_SIZE..SECTOR_SIZE + 4], 2);
    let name = b"score.gpif\0";
    image[SECTOR_SIZE + 0x04..SECTOR_SIZE + 0x04 + name.len()].copy_from_slice(name);
    LittleEndian::write_u32(&mut image[SECTOR_SIZE + 0x8C..SECTOR_SIZE + 0x90], gpif.len() as u32);
    LittleEndian::write_u32(&mut image[SECTOR_SIZE + 0x94..SECTOR_SIZE + 0x98], 2); // block id
    image[SECTOR_SIZE * 2..SECTOR_SIZE * 2 + gpif.len()].copy_from_slice(gpif);

    let mut data = b"BCFS".to_vec();
    data.extend_from_slice(&image);

    let song = gp_decoder::parse_with_limits(&data, Some("song.gpx"), &DecodeLimits::default()).unwrap();
    assert!(!song.tracks.is_empty());
    for track in &song.tracks {
        assert!(!track.bars.is_empty());
        assert!(!track.tuning.is_empty());
    }
}

/// S5: a GP7 archive's `<Score><Title>` text survives through to `song.title`.
#[test]
fn s5_gp7_archive_title_matches_score_title() {
    let archive = build_stored_gp7_archive("Content/score.gpif", SAMPLE_GPIF.as_bytes());
    let song = gp_decoder::parse_gp7(&archive, &DecodeLimits::default()).unwrap();
    assert!(song.title.contains("Archive Song"));
    assert_eq!(song.tempo, 140);
}

/// S7: an eighth note at tempo 60 takes exactly 500ms.
#[test]
fn s7_eighth_note_at_tempo_sixty_is_500ms() {
    let beat = Beat {
        index: 0,
        bar_index: 0,
        notes: vec![],
        duration: Duration::Eighth,
        tuplet: None,
        dotted: 0,
        is_rest: true,
        dynamic: None,
        tempo: 60,
    };
    assert!((gp_decoder::beat_duration_ms(&beat) - 500.0).abs() < 1e-9);
}

/// P5/P6: the duration/tempo helper table spec.md §8 pins by example.
#[test]
fn duration_and_tempo_helpers_match_spec_examples() {
    assert_eq!(gp_decoder::duration_to_beats(Duration::Whole, 0, None), 4.0);
    assert_eq!(gp_decoder::duration_to_beats(Duration::Quarter, 1, None), 1.5);
    let triplet = Some(gp_decoder::Tuplet { num: 3, den: 2 });
    assert!((gp_decoder::duration_to_beats(Duration::Quarter, 0, triplet) - 2.0 / 3.0).abs() < 1e-9);
    assert_eq!(gp_decoder::duration_to_beats(Duration::Quarter, 1, triplet), 1.0);

    let beat = Beat {
        index: 0,
        bar_index: 0,
        notes: vec![],
        duration: Duration::Quarter,
        tuplet: None,
        dotted: 0,
        is_rest: true,
        dynamic: None,
        tempo: 120,
    };
    assert_eq!(gp_decoder::beat_duration_ms(&beat), 500.0);
}

/// P7/P8: pitch-class arithmetic wraps correctly and round-trips naturals.
#[test]
fn pitch_class_helpers_satisfy_invariants() {
    use gp_decoder::pitch::{midi_to_pitch_class, note_from_pitch_class};

    for n in [-25, -13, -1, 0, 1, 12, 13, 127] {
        assert_eq!(midi_to_pitch_class(n), (((n % 12) + 12) % 12) as u8);
    }
    let naturals = ["C", "D", "E", "F", "G", "A", "B"];
    for pc in [0u8, 2, 4, 5, 7, 9, 11] {
        let (got, name) = note_from_pitch_class(pc);
        assert_eq!(got, pc);
        assert!(naturals.contains(&name.as_str()));
    }
}

/// S6-style check of the public entry point: a stored (method 0) archive
/// entry round-trips its bytes exactly, independent of the deflate path
/// already covered inside `inflate`'s own unit tests.
#[test]
fn stored_archive_entry_round_trips_exactly() {
    let gpif = b"<GPIF><Score><Title>RT</Title></Score></GPIF>";
    let archive = build_stored_gp7_archive("Content/score.gpif", gpif);
    let song = gp_decoder::parse_gp7(&archive, &DecodeLimits::default()).unwrap();
    assert_eq!(song.title, "RT");
}
