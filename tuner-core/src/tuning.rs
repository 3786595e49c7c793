//! # Musical Tuning Module
//!
//! This module converts between frequencies and named notes under a
//! selectable temperament and an adjustable reference pitch.
//!
//! ## Features
//! - Nearest-note lookup using equal-temperament geometry for naming
//! - Cent deviation measured against the *active temperament's* target pitch
//! - Note name to frequency conversion
//! - Per-pitch-class deviation of a temperament from equal temperament
//! - Shared, lock-protected reference settings for the settings and
//!   detection paths
//!
//! The temperament tonic is the reference note: a table's ratio for
//! semitone offset `s` is applied to `s = midi - a4_midi_note`.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::TunerError;
use crate::temperament::Temperament;

/// Lowest frequency accepted for note lookup.
pub const MIN_NOTE_FREQUENCY: f32 = 20.0;
/// Highest frequency accepted for note lookup.
pub const MAX_NOTE_FREQUENCY: f32 = 20_000.0;
/// Highest valid MIDI note number.
pub const MAX_MIDI_NOTE: u8 = 127;

/// The twelve chromatic pitch classes, C first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PitchClass {
    #[serde(rename = "C")]
    C,
    #[serde(rename = "C#")]
    CSharp,
    #[serde(rename = "D")]
    D,
    #[serde(rename = "D#")]
    DSharp,
    #[serde(rename = "E")]
    E,
    #[serde(rename = "F")]
    F,
    #[serde(rename = "F#")]
    FSharp,
    #[serde(rename = "G")]
    G,
    #[serde(rename = "G#")]
    GSharp,
    #[serde(rename = "A")]
    A,
    #[serde(rename = "A#")]
    ASharp,
    #[serde(rename = "B")]
    B,
}

impl PitchClass {
    pub const ALL: [PitchClass; 12] = [
        PitchClass::C,
        PitchClass::CSharp,
        PitchClass::D,
        PitchClass::DSharp,
        PitchClass::E,
        PitchClass::F,
        PitchClass::FSharp,
        PitchClass::G,
        PitchClass::GSharp,
        PitchClass::A,
        PitchClass::ASharp,
        PitchClass::B,
    ];

    /// Semitones above C (0..=11).
    pub fn index(self) -> i32 {
        self as i32
    }

    /// Pitch class of any semitone count, wrapping negatives.
    pub fn from_index(semitones: i32) -> Self {
        Self::ALL[semitones.rem_euclid(12) as usize]
    }

    /// Sharp spelling, e.g. "C#".
    pub fn name(self) -> &'static str {
        match self {
            PitchClass::C => "C",
            PitchClass::CSharp => "C#",
            PitchClass::D => "D",
            PitchClass::DSharp => "D#",
            PitchClass::E => "E",
            PitchClass::F => "F",
            PitchClass::FSharp => "F#",
            PitchClass::G => "G",
            PitchClass::GSharp => "G#",
            PitchClass::A => "A",
            PitchClass::ASharp => "A#",
            PitchClass::B => "B",
        }
    }
}

impl fmt::Display for PitchClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PitchClass {
    type Err = TunerError;

    /// Accepts a letter with any number of sharps or flats ("C#", "Db", "Bb", "E#").
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unknown = || TunerError::UnknownNoteName(s.to_string());
        let mut chars = s.trim().chars();
        let base = match chars.next().map(|c| c.to_ascii_uppercase()) {
            Some('C') => 0,
            Some('D') => 2,
            Some('E') => 4,
            Some('F') => 5,
            Some('G') => 7,
            Some('A') => 9,
            Some('B') => 11,
            _ => return Err(unknown()),
        };
        let mut offset = 0;
        for c in chars {
            match c {
                '#' | '♯' => offset += 1,
                'b' | '♭' => offset -= 1,
                _ => return Err(unknown()),
            }
        }
        Ok(PitchClass::from_index(base + offset))
    }
}

/// A detected or requested note.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Note {
    /// Pitch class of the nearest note
    pub name: PitchClass,
    /// Scientific octave; octave 4 holds MIDI 60-71
    pub octave: i32,
    /// MIDI number of the nearest note
    pub midi: u8,
    /// The measured frequency in Hz
    pub frequency: f32,
    /// Target frequency of the nearest note under the active temperament
    pub expected_frequency: f32,
    /// Deviation from `expected_frequency` (positive = sharp)
    pub cents: i32,
}

impl fmt::Display for Note {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{} {:+}¢", self.name, self.octave, self.cents)
    }
}

/// Valid range for the reference frequency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceRange {
    /// Historically plausible concert pitches, 400-480 Hz
    #[default]
    Historical,
    /// Experimental and custom references, 1-990 Hz
    Extended,
}

impl ReferenceRange {
    /// `(min, max)` in Hz, inclusive.
    pub fn bounds(self) -> (f32, f32) {
        match self {
            ReferenceRange::Historical => (400.0, 480.0),
            ReferenceRange::Extended => (1.0, 990.0),
        }
    }

    pub fn clamp(self, hz: f32) -> f32 {
        let (min, max) = self.bounds();
        hz.clamp(min, max)
    }
}

/// Reference pitch and active temperament.
///
/// All conversions are pure functions of one of these snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TuningSettings {
    pub temperament: Temperament,
    pub a4_frequency: f32,
    pub a4_midi_note: u8,
}

impl Default for TuningSettings {
    fn default() -> Self {
        Self {
            temperament: Temperament::Equal,
            a4_frequency: 440.0,
            a4_midi_note: 69,
        }
    }
}

impl TuningSettings {
    /// Target frequency of a MIDI note under these settings.
    ///
    /// `a4_frequency * T[s mod 12] * 2^floor(s / 12)` with
    /// `s = midi - a4_midi_note`.
    pub fn expected_frequency(&self, midi: i32) -> Option<f32> {
        if !(0..=MAX_MIDI_NOTE as i32).contains(&midi) {
            return None;
        }
        let semitones = midi - self.a4_midi_note as i32;
        let ratio = self.temperament.ratio(semitones);
        if ratio <= 0.0 {
            return None;
        }
        let octaves = semitones.div_euclid(12);
        let expected = self.a4_frequency as f64 * ratio * 2.0_f64.powi(octaves);
        Some(expected as f32)
    }

    /// Finds the nearest note to `freq` and its deviation in cents.
    ///
    /// The note is picked with equal-temperament geometry regardless of
    /// the active temperament; only the cents are temperament-aware.
    pub fn frequency_to_note(&self, freq: f32) -> Option<Note> {
        if !freq.is_finite() || !(MIN_NOTE_FREQUENCY..=MAX_NOTE_FREQUENCY).contains(&freq) {
            return None;
        }
        if self.a4_frequency <= 0.0 {
            return None;
        }

        let exact = 12.0 * (freq as f64 / self.a4_frequency as f64).log2() + self.a4_midi_note as f64;
        let rounded = exact.round();
        if !(0.0..=MAX_MIDI_NOTE as f64).contains(&rounded) {
            return None;
        }
        let midi = rounded as i32;
        let expected = self.expected_frequency(midi)?;

        Some(Note {
            name: PitchClass::from_index(midi),
            octave: midi.div_euclid(12) - 1,
            midi: midi as u8,
            frequency: freq,
            expected_frequency: expected,
            cents: round_cents(calculate_cents_deviation(freq as f64, expected as f64)),
        })
    }

    /// Target frequency of a named note, `None` outside MIDI 0-127.
    pub fn note_to_frequency(&self, name: PitchClass, octave: i32) -> Option<f32> {
        let midi = (octave + 1).checked_mul(12)?.checked_add(name.index())?;
        self.expected_frequency(midi)
    }

    /// How far the active temperament bends `name` away from equal
    /// temperament, in cents. Independent of any live input.
    ///
    /// The table is read with C as the tonic, so C is always 0. Note
    /// conversions use the reference note as the tonic instead, which means
    /// the live target bend of a pitch class is this table rotated by the
    /// reference: with A as reference, just intonation lists E at -13.7
    /// cents here while the E a tuner actually aims for is a pure fifth
    /// above A, +2.0 cents.
    pub fn cents_deviation(&self, name: PitchClass) -> f64 {
        let degree = name.index();
        let ratio = self.temperament.ratio(degree);
        let equal = Temperament::Equal.ratio(degree);
        calculate_cents_deviation(ratio, equal)
    }
}

/// Calculates the deviation from a target frequency in cents.
///
/// - 100 cents = 1 semitone
/// - 1200 cents = 1 octave
/// - Positive values indicate sharpness, negative values indicate flatness
pub fn calculate_cents_deviation(freq: f64, target_freq: f64) -> f64 {
    1200.0 * (freq / target_freq).log2()
}

/// Rounds half away from zero, so +50.5 reports as +51 and -50.5 as -51.
fn round_cents(cents: f64) -> i32 {
    cents.round() as i32
}

/// Shared handle to the tuning settings.
///
/// Clones share one lock: the settings path writes through one clone while
/// the detection path reads through another. Each conversion reads a single
/// consistent snapshot, so a reference change is never seen half-applied.
#[derive(Debug, Clone)]
pub struct TuningModel {
    settings: Arc<RwLock<TuningSettings>>,
    range: ReferenceRange,
}

impl Default for TuningModel {
    fn default() -> Self {
        Self::new(TuningSettings::default(), ReferenceRange::default())
    }
}

impl TuningModel {
    /// Creates a model, clamping the initial reference into `range`.
    pub fn new(settings: TuningSettings, range: ReferenceRange) -> Self {
        let settings = TuningSettings {
            a4_frequency: range.clamp(settings.a4_frequency),
            a4_midi_note: settings.a4_midi_note.min(MAX_MIDI_NOTE),
            ..settings
        };
        Self {
            settings: Arc::new(RwLock::new(settings)),
            range,
        }
    }

    /// Copy of the current settings.
    pub fn settings(&self) -> TuningSettings {
        *self.settings.read()
    }

    pub fn range(&self) -> ReferenceRange {
        self.range
    }

    pub fn temperament(&self) -> Temperament {
        self.settings.read().temperament
    }

    pub fn a4_frequency(&self) -> f32 {
        self.settings.read().a4_frequency
    }

    pub fn a4_midi_note(&self) -> u8 {
        self.settings.read().a4_midi_note
    }

    pub fn set_temperament(&self, temperament: Temperament) {
        log::debug!("Temperament set to {}", temperament);
        self.settings.write().temperament = temperament;
    }

    /// Sets the reference frequency, clamped to the configured range.
    ///
    /// Returns the value actually applied. A non-finite input leaves the
    /// reference unchanged.
    pub fn set_a4_frequency(&self, hz: f32) -> f32 {
        let mut settings = self.settings.write();
        if !hz.is_finite() {
            log::warn!("Ignoring non-finite reference frequency {}", hz);
            return settings.a4_frequency;
        }
        let applied = self.range.clamp(hz);
        if applied != hz {
            log::warn!("Reference frequency {} Hz clamped to {} Hz", hz, applied);
        }
        settings.a4_frequency = applied;
        log::debug!("Reference frequency set to {} Hz", applied);
        applied
    }

    /// Sets the reference MIDI note, clamped to 0-127. Returns the applied note.
    pub fn set_a4_midi_note(&self, note: u8) -> u8 {
        let applied = note.min(MAX_MIDI_NOTE);
        if applied != note {
            log::warn!("Reference MIDI note {} clamped to {}", note, applied);
        }
        self.settings.write().a4_midi_note = applied;
        log::debug!("Reference MIDI note set to {}", applied);
        applied
    }

    pub fn frequency_to_note(&self, freq: f32) -> Option<Note> {
        self.settings().frequency_to_note(freq)
    }

    pub fn note_to_frequency(&self, name: PitchClass, octave: i32) -> Option<f32> {
        self.settings().note_to_frequency(name, octave)
    }

    pub fn expected_frequency(&self, midi: u8) -> Option<f32> {
        self.settings().expected_frequency(midi as i32)
    }

    pub fn cents_deviation(&self, name: PitchClass) -> f64 {
        self.settings().cents_deviation(name)
    }

    /// Deviation from equal temperament for every pitch class, C first.
    pub fn temperament_deviations(&self) -> [(PitchClass, f64); 12] {
        let settings = self.settings();
        PitchClass::ALL.map(|pc| (pc, settings.cents_deviation(pc)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::{assert_abs_diff_eq, assert_relative_eq};

    fn with(temperament: Temperament) -> TuningModel {
        TuningModel::new(
            TuningSettings {
                temperament,
                ..TuningSettings::default()
            },
            ReferenceRange::Historical,
        )
    }

    #[test]
    fn test_a440_is_a4() {
        let note = TuningModel::default().frequency_to_note(440.0).unwrap();
        assert_eq!(note.name, PitchClass::A);
        assert_eq!(note.octave, 4);
        assert_eq!(note.midi, 69);
        assert_eq!(note.cents, 0);
        assert_eq!(note.to_string(), "A4 +0¢");
    }

    #[test]
    fn test_note_mapping() {
        let model = TuningModel::default();
        let cases = [
            (261.63, "C", 4),
            (493.88, "B", 4),
            (523.25, "C", 5),
            (27.5, "A", 0),
            (4186.01, "C", 8),
            (220.0, "A", 3),
        ];
        for (freq, name, octave) in cases {
            let note = model.frequency_to_note(freq).unwrap();
            assert_eq!(note.name.name(), name, "{} Hz", freq);
            assert_eq!(note.octave, octave, "{} Hz", freq);
            assert!(note.cents.abs() <= 1, "{} Hz is {} cents off", freq, note.cents);
        }
    }

    #[test]
    fn test_cents_sign() {
        let model = TuningModel::default();
        let sharp = model.frequency_to_note(440.0 * 2.0_f32.powf(10.0 / 1200.0)).unwrap();
        assert_eq!(sharp.cents, 10);
        let flat = model.frequency_to_note(440.0 * 2.0_f32.powf(-20.0 / 1200.0)).unwrap();
        assert_eq!(flat.cents, -20);
    }

    #[test]
    fn test_round_cents_half_away_from_zero() {
        assert_eq!(round_cents(2.5), 3);
        assert_eq!(round_cents(-2.5), -3);
        assert_eq!(round_cents(49.4), 49);
        assert_eq!(round_cents(-0.4), 0);
    }

    #[test]
    fn test_rejects_out_of_range_input() {
        let model = TuningModel::default();
        assert!(model.frequency_to_note(0.0).is_none());
        assert!(model.frequency_to_note(-440.0).is_none());
        assert!(model.frequency_to_note(19.9).is_none());
        assert!(model.frequency_to_note(20_000.1).is_none());
        assert!(model.frequency_to_note(f32::NAN).is_none());
        // 20 kHz rounds to MIDI 135
        assert!(model.frequency_to_note(20_000.0).is_none());
    }

    #[test]
    fn test_cents_against_lower_reference() {
        let model = TuningModel::default();
        assert_eq!(model.set_a4_frequency(432.0), 432.0);

        let note = model.frequency_to_note(440.0).unwrap();
        assert_eq!(note.name, PitchClass::A);
        assert_eq!(note.octave, 4);
        let expected = calculate_cents_deviation(440.0, 432.0).round() as i32;
        assert_eq!(note.cents, expected);
        assert_eq!(note.cents, 32);
    }

    #[test]
    fn test_reference_shift_changes_note_only_across_boundary() {
        let model = TuningModel::default();
        let before = model.frequency_to_note(437.0).unwrap();
        model.set_a4_frequency(432.0);
        let after = model.frequency_to_note(437.0).unwrap();
        assert_eq!(before.name, after.name);

        // 450 Hz is 39 cents above 440 but 71 above 432
        model.set_a4_frequency(440.0);
        assert_eq!(model.frequency_to_note(450.0).unwrap().name, PitchClass::A);
        model.set_a4_frequency(432.0);
        assert_eq!(model.frequency_to_note(450.0).unwrap().name, PitchClass::ASharp);
    }

    #[test]
    fn test_cents_follow_active_temperament() {
        // Just major third above the A reference is exactly 550 Hz
        let just = with(Temperament::JustIntonation);
        let note = just.frequency_to_note(550.0).unwrap();
        assert_eq!(note.name, PitchClass::CSharp);
        assert_eq!(note.octave, 5);
        assert_eq!(note.cents, 0);

        // Same input is 14 cents flat of the equal tempered C#5
        let equal = TuningModel::default().frequency_to_note(550.0).unwrap();
        assert_eq!(equal.name, PitchClass::CSharp);
        assert_eq!(equal.cents, -14);
    }

    #[test]
    fn test_expected_frequency_includes_octave() {
        let just = with(Temperament::JustIntonation);
        // A5 and A3
        assert_relative_eq!(just.expected_frequency(81).unwrap(), 880.0, max_relative = 1e-6);
        assert_relative_eq!(just.expected_frequency(57).unwrap(), 220.0, max_relative = 1e-6);
        // C4 is a just minor third above A3
        assert_relative_eq!(just.expected_frequency(60).unwrap(), 264.0, max_relative = 1e-6);
        assert_eq!(just.frequency_to_note(880.0).unwrap().cents, 0);
    }

    #[test]
    fn test_note_to_frequency() {
        let model = TuningModel::default();
        assert_relative_eq!(model.note_to_frequency(PitchClass::A, 4).unwrap(), 440.0, max_relative = 1e-6);
        assert_relative_eq!(model.note_to_frequency(PitchClass::C, 4).unwrap(), 261.6256, max_relative = 1e-5);
        assert_relative_eq!(model.note_to_frequency(PitchClass::C, -1).unwrap(), 8.175799, max_relative = 1e-5);
        assert!(model.note_to_frequency(PitchClass::GSharp, 9).is_none()); // MIDI 128
        assert!(model.note_to_frequency(PitchClass::B, -2).is_none());
    }

    #[test]
    fn test_round_trip_all_temperaments() {
        for temperament in Temperament::ALL {
            let model = with(temperament);
            for midi in 24..=108 {
                let name = PitchClass::from_index(midi);
                let octave = midi / 12 - 1;
                let freq = model.note_to_frequency(name, octave).unwrap();
                let note = model.frequency_to_note(freq).unwrap();
                assert_eq!(note.name, name, "{} MIDI {}", temperament, midi);
                let again = model.note_to_frequency(note.name, octave).unwrap();
                assert_relative_eq!(again, freq, max_relative = 1e-6);
                assert_eq!(note.cents, 0);
            }
        }
    }

    #[test]
    fn test_tonic_deviation_is_zero() {
        for temperament in Temperament::ALL {
            assert_abs_diff_eq!(with(temperament).cents_deviation(PitchClass::C), 0.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_temperament_deviations() {
        let equal = TuningModel::default();
        for (_, cents) in equal.temperament_deviations() {
            assert_abs_diff_eq!(cents, 0.0, epsilon = 1e-9);
        }

        let just = with(Temperament::JustIntonation);
        // Pure third is 13.7 cents narrow, pure fifth 2 cents wide
        assert_abs_diff_eq!(just.cents_deviation(PitchClass::E), -13.686, epsilon = 0.01);
        assert_abs_diff_eq!(just.cents_deviation(PitchClass::G), 1.955, epsilon = 0.01);
        let table = just.temperament_deviations();
        assert_eq!(table[4].0, PitchClass::E);
    }

    #[test]
    fn test_live_bend_is_table_rotated_by_reference() {
        let just = with(Temperament::JustIntonation);
        let equal = TuningModel::default();
        // E5 is 7 semitones above A4, so it takes the table's G column
        let target = just.expected_frequency(76).unwrap() as f64;
        let equal_target = equal.expected_frequency(76).unwrap() as f64;
        let live_bend = calculate_cents_deviation(target, equal_target);
        assert_abs_diff_eq!(live_bend, just.cents_deviation(PitchClass::G), epsilon = 0.01);
        assert!((live_bend - just.cents_deviation(PitchClass::E)).abs() > 10.0);
    }

    #[test]
    fn test_reference_range_policies() {
        let strict = TuningModel::default();
        assert_eq!(strict.set_a4_frequency(390.0), 400.0);
        assert_eq!(strict.set_a4_frequency(500.0), 480.0);
        assert_eq!(strict.set_a4_frequency(f32::NAN), 480.0);

        let wide = TuningModel::new(TuningSettings::default(), ReferenceRange::Extended);
        assert_eq!(wide.set_a4_frequency(256.0), 256.0);
        assert_eq!(wide.set_a4_frequency(0.0), 1.0);
        assert_eq!(wide.set_a4_frequency(1000.0), 990.0);
    }

    #[test]
    fn test_reference_midi_note() {
        let model = TuningModel::new(TuningSettings::default(), ReferenceRange::Extended);
        assert_eq!(model.set_a4_midi_note(200), 127);
        // C4 = 256 Hz reference
        model.set_a4_midi_note(60);
        model.set_a4_frequency(256.0);
        let note = model.frequency_to_note(512.0).unwrap();
        assert_eq!(note.name, PitchClass::C);
        assert_eq!(note.octave, 5);
        assert_eq!(note.cents, 0);
    }

    #[test]
    fn test_clones_share_settings() {
        let ui = TuningModel::default();
        let detector = ui.clone();
        let handle = std::thread::spawn(move || {
            ui.set_temperament(Temperament::Vallotti);
            ui.set_a4_frequency(415.0);
        });
        handle.join().unwrap();
        assert_eq!(detector.temperament(), Temperament::Vallotti);
        assert_eq!(detector.a4_frequency(), 415.0);
    }

    #[test]
    fn test_parse_pitch_class() {
        assert_eq!("C#".parse::<PitchClass>().unwrap(), PitchClass::CSharp);
        assert_eq!("Db".parse::<PitchClass>().unwrap(), PitchClass::CSharp);
        assert_eq!("bb".parse::<PitchClass>().unwrap(), PitchClass::ASharp);
        assert_eq!("Cb".parse::<PitchClass>().unwrap(), PitchClass::B);
        assert_eq!("E#".parse::<PitchClass>().unwrap(), PitchClass::F);
        assert!("H".parse::<PitchClass>().is_err());
        assert!("C4".parse::<PitchClass>().is_err());
    }
}
