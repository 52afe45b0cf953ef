//! The unified song model every decoder converges on (spec §3).
//!
//! No entity ID survives past a decoder: GPX/GP7 resolve their ID-referenced
//! XML graph and GP3/GP5 walk their sequential layout directly into these
//! types. Once returned, a `Song` is immutable by convention (§5).

/// A symbolic note duration with its base beat fraction (quarters per note).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Duration {
    Whole,
    Half,
    Quarter,
    Eighth,
    Sixteenth,
    ThirtySecond,
    SixtyFourth,
    HundredTwentyEighth,
}

impl Duration {
    /// Base beat fraction in quarter notes, per spec §3.
    pub fn base_beats(self) -> f64 {
        match self {
            Duration::Whole => 4.0,
            Duration::Half => 2.0,
            Duration::Quarter => 1.0,
            Duration::Eighth => 0.5,
            Duration::Sixteenth => 0.25,
            Duration::ThirtySecond => 0.125,
            Duration::SixtyFourth => 0.0625,
            Duration::HundredTwentyEighth => 0.03125,
        }
    }
}

/// `num` notes played in the time of `den` (spec §3, I6: never 1/1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tuplet {
    pub num: u32,
    pub den: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyMode {
    Major,
    Minor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeSignature {
    pub numerator: u8,
    pub denominator: u8,
}

impl Default for TimeSignature {
    fn default() -> Self {
        TimeSignature { numerator: 4, denominator: 4 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeySignature {
    pub accidental_count: i8,
    pub mode: KeyMode,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Section {
    pub letter: Option<char>,
    pub text: Option<String>,
}

/// A beat-level loudness marking, surfaced either from GP5 note velocity
/// (decoder picks the loudest note in the beat) or GPIF's `<Dynamic>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dynamic {
    Ppp,
    Pp,
    P,
    Mp,
    Mf,
    F,
    Ff,
    Fff,
}

impl Dynamic {
    /// GP5 velocity byte -> dynamic, using the format's documented scale
    /// where velocity 8 is the default (`mf`).
    pub fn from_gp5_velocity(v: i8) -> Dynamic {
        match v {
            v if v <= 1 => Dynamic::Ppp,
            2 => Dynamic::Pp,
            3 | 4 => Dynamic::P,
            5 | 6 => Dynamic::Mp,
            7 | 8 => Dynamic::Mf,
            9 | 10 => Dynamic::F,
            11 | 12 => Dynamic::Ff,
            _ => Dynamic::Fff,
        }
    }

    pub fn from_gpif_str(s: &str) -> Option<Dynamic> {
        match s.trim() {
            "PPP" => Some(Dynamic::Ppp),
            "PP" => Some(Dynamic::Pp),
            "P" => Some(Dynamic::P),
            "MP" => Some(Dynamic::Mp),
            "MF" => Some(Dynamic::Mf),
            "F" => Some(Dynamic::F),
            "FF" => Some(Dynamic::Ff),
            "FFF" => Some(Dynamic::Fff),
            _ => None,
        }
    }
}

/// Slide type, read as a bitmask in GP3/GP5 and as an integer `Flags`
/// property in GPIF; the lowest set bit wins when more than one is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlideType {
    ShiftSlide,
    LegatoSlide,
    OutDownwards,
    OutUpwards,
    IntoFromBelow,
    IntoFromAbove,
}

impl SlideType {
    pub fn from_flags(flags: i32) -> Option<SlideType> {
        if flags & 0x01 != 0 {
            Some(SlideType::ShiftSlide)
        } else if flags & 0x02 != 0 {
            Some(SlideType::LegatoSlide)
        } else if flags & 0x04 != 0 {
            Some(SlideType::OutDownwards)
        } else if flags & 0x08 != 0 {
            Some(SlideType::OutUpwards)
        } else if flags & 0x10 != 0 {
            Some(SlideType::IntoFromBelow)
        } else if flags & 0x20 != 0 {
            Some(SlideType::IntoFromAbove)
        } else {
            None
        }
    }
}

/// Harmonic type, read from a signed byte in GP3/GP5 (`1..=5`) or the
/// `HarmonicType`/`HType` property in GPIF.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HarmonicType {
    Natural,
    Artificial,
    Tapped,
    Pinch,
    Semi,
}

impl HarmonicType {
    pub fn from_code(code: i8) -> Option<HarmonicType> {
        match code {
            1 => Some(HarmonicType::Natural),
            2 => Some(HarmonicType::Artificial),
            3 => Some(HarmonicType::Tapped),
            4 => Some(HarmonicType::Pinch),
            5 => Some(HarmonicType::Semi),
            _ => None,
        }
    }

    pub fn from_gpif_htype(s: &str) -> Option<HarmonicType> {
        match s.trim() {
            "Natural" => Some(HarmonicType::Natural),
            "Artificial" => Some(HarmonicType::Artificial),
            "Tapped" => Some(HarmonicType::Tapped),
            "Pinch" => Some(HarmonicType::Pinch),
            "Semi" => Some(HarmonicType::Semi),
            _ => None,
        }
    }
}

/// A string bend: origin/destination/middle pitch offsets in semitones,
/// derived from the point list (first point, last point, extreme point).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bend {
    pub origin: f32,
    pub destination: f32,
    pub middle: f32,
}

/// Whether this note is the origin and/or destination end of a tie.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tie {
    pub origin: bool,
    pub destination: bool,
}

#[derive(Debug, Clone)]
pub struct Note {
    /// 0-based string index; 0 is the highest-pitch string (spec §3/§9).
    pub string: u8,
    pub fret: i32,
    /// `(tuningMidi[string] + capoFret + fret) mod 12` (I2).
    pub pitch_class: u8,
    pub note_name: String,
    pub slide: Option<SlideType>,
    pub harmonic: Option<HarmonicType>,
    pub palm_mute: bool,
    pub muted: bool,
    pub let_ring: bool,
    pub bend: Option<Bend>,
    pub tie: Tie,
    pub vibrato: bool,
    pub hammer_on: bool,
    /// Always `false`: GP5 encodes hammer-on/pull-off behind one bit and
    /// direction is contextual (spec §9 open question, preserved as-is).
    pub pull_off: bool,
    pub tapped: bool,
    pub accent: bool,
}

#[derive(Debug, Clone)]
pub struct Beat {
    /// Global index within the track, strictly increasing from 0 (I3).
    pub index: u32,
    /// Index of the enclosing `Bar` (I4).
    pub bar_index: u32,
    /// Keyed by string index; order is not significant.
    pub notes: Vec<Note>,
    pub duration: Duration,
    pub tuplet: Option<Tuplet>,
    pub dotted: u8,
    /// `true` iff `notes` is empty (I5).
    pub is_rest: bool,
    pub dynamic: Option<Dynamic>,
    pub tempo: u32,
}

#[derive(Debug, Clone)]
pub struct Bar {
    pub index: u32,
    pub time_signature: TimeSignature,
    pub key_signature: Option<KeySignature>,
    pub section: Option<Section>,
    pub beats: Vec<Beat>,
    pub repeat_start: bool,
    pub repeat_end: bool,
    pub repeat_count: u8,
}

#[derive(Debug, Clone)]
pub struct Track {
    pub id: u32,
    pub name: String,
    pub short_name: String,
    pub instrument: Option<String>,
    /// Highest-pitch string at index 0 (spec §9, I1/I4).
    pub tuning: Vec<String>,
    pub tuning_midi: Vec<i32>,
    pub capo_fret: i32,
    pub bars: Vec<Bar>,
}

#[derive(Debug, Clone)]
pub struct Song {
    pub title: String,
    pub artist: String,
    pub album: String,
    pub tempo: u32,
    pub tracks: Vec<Track>,
}
