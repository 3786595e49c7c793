//! # Temperament Tables
//!
//! Every supported tuning system is a fixed table of twelve frequency ratios,
//! one per semitone above the tonic. Equal temperament is generated once at
//! startup; all other tables are literal historical interval ratios.
//!
//! Tables are written with the tonic at index 0 (C in the usual
//! presentation), so the tonic's ratio is always exactly 1.0.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::TunerError;

/// A table of twelve ratios relative to the tonic.
pub type RatioTable = [f64; 12];

/// Equal temperament, 2^(n/12).
static EQUAL: Lazy<RatioTable> = Lazy::new(|| {
    let mut table = [0.0; 12];
    for (n, ratio) in table.iter_mut().enumerate() {
        *ratio = 2.0_f64.powf(n as f64 / 12.0);
    }
    table
});

const JUST_INTONATION: RatioTable = [
    1.0,         // Unison
    16.0 / 15.0, // Minor second
    9.0 / 8.0,   // Major second
    6.0 / 5.0,   // Minor third
    5.0 / 4.0,   // Major third
    4.0 / 3.0,   // Perfect fourth
    45.0 / 32.0, // Augmented fourth
    3.0 / 2.0,   // Perfect fifth
    8.0 / 5.0,   // Minor sixth
    5.0 / 3.0,   // Major sixth
    9.0 / 5.0,   // Minor seventh
    15.0 / 8.0,  // Major seventh
];

const PYTHAGOREAN: RatioTable = [
    1.0,
    256.0 / 243.0,
    9.0 / 8.0,
    32.0 / 27.0,
    81.0 / 64.0,
    4.0 / 3.0,
    729.0 / 512.0,
    3.0 / 2.0,
    128.0 / 81.0,
    27.0 / 16.0,
    16.0 / 9.0,
    243.0 / 128.0,
];

// Meantones: chain of equal tempered fifths from Eb to G#.

const THIRD_COMMA_MEANTONE: RatioTable = [
    1.0000000000, 1.0373622099, 1.1157215835, 1.2000000000, 1.2448346518, 1.3388659002,
    1.3888888889, 1.4938015822, 1.5496133104, 1.6666666667, 1.7925618986, 1.8595359725,
];

const TWO_SEVENTHS_COMMA_MEANTONE: RatioTable = [
    1.0000000000, 1.0416666667, 1.1170423716, 1.1978723136, 1.2477836600, 1.3380741302,
    1.3938272189, 1.4946854998, 1.5569640623, 1.6696270355, 1.7904423778, 1.8650441436,
];

const QUARTER_COMMA_MEANTONE: RatioTable = [
    1.0000000000, 1.0449067265, 1.1180339887, 1.1962790250, 1.2500000000, 1.3374806100,
    1.3975424859, 1.4953487812, 1.5625000000, 1.6718507624, 1.7888543820, 1.8691859765,
];

const FIFTH_COMMA_MEANTONE: RatioTable = [
    1.0000000000, 1.0494597485, 1.1194237317, 1.1940519805, 1.2531094912, 1.3366501239,
    1.4027605029, 1.4962778697, 1.5702833969, 1.6749689567, 1.7866335538, 1.8750000000,
];

const SIXTH_COMMA_MEANTONE: RatioTable = [
    1.0000000000, 1.0525061129, 1.1203511866, 1.1925695880, 1.2551867814, 1.3360967531,
    1.4062500000, 1.4968975828, 1.5754938562, 1.6770509831, 1.7851545336, 1.8788860590,
];

// Well temperaments: the Pythagorean comma spread over some of the fifths.

/// C-G-D-A and B-F# narrowed by 1/4 comma.
const WERCKMEISTER_III: RatioTable = [
    1.0000000000, 1.0534979424, 1.1174033085, 1.1851851852, 1.2528272487, 1.3333333333,
    1.4046639232, 1.4949269605, 1.5802469136, 1.6704363316, 1.7777777778, 1.8792408731,
];

/// Alternating 1/3 comma fifths, G#-D#-Bb widened.
const WERCKMEISTER_IV: RatioTable = [
    1.0000000000, 1.0487500118, 1.1199298221, 1.1851851852, 1.2542428065, 1.3333333333,
    1.4046639232, 1.4932397628, 1.5731250176, 1.6723237420, 1.7858261835, 1.8728852309,
];

/// "Septenarius", string lengths divisible by seven.
const WERCKMEISTER_VI: RatioTable = [
    1.0,
    98.0 / 93.0,
    28.0 / 25.0,
    196.0 / 165.0,
    49.0 / 39.0,
    4.0 / 3.0,
    196.0 / 139.0,
    196.0 / 131.0,
    49.0 / 31.0,
    196.0 / 117.0,
    98.0 / 55.0,
    49.0 / 26.0,
];

const KIRNBERGER_I: RatioTable = [
    1.0,
    256.0 / 243.0,
    9.0 / 8.0,
    32.0 / 27.0,
    5.0 / 4.0,
    4.0 / 3.0,
    45.0 / 32.0,
    3.0 / 2.0,
    128.0 / 81.0,
    27.0 / 16.0,
    16.0 / 9.0,
    15.0 / 8.0,
];

/// D-A-E split into two half-comma fifths.
const KIRNBERGER_II: RatioTable = [
    1.0,
    256.0 / 243.0,
    9.0 / 8.0,
    32.0 / 27.0,
    5.0 / 4.0,
    4.0 / 3.0,
    45.0 / 32.0,
    3.0 / 2.0,
    128.0 / 81.0,
    1.6770509831,
    16.0 / 9.0,
    15.0 / 8.0,
];

/// C-G-D-A-E narrowed by 1/4 syntonic comma, pure major third C-E.
const KIRNBERGER_III: RatioTable = [
    1.0000000000, 1.0534979424, 1.1180339887, 1.1851851852, 1.2500000000, 1.3333333333,
    1.4062500000, 1.4953487812, 1.5802469136, 1.6718507624, 1.7777777778, 1.8750000000,
];

/// F-C-G-D-A-E-B narrowed by 1/6 comma.
const VALLOTTI: RatioTable = [
    1.0000000000, 1.0558799622, 1.1199298221, 1.1878649575, 1.2542428065, 1.3363480772,
    1.4078399497, 1.4966160644, 1.5838199434, 1.6761049628, 1.7817974363, 1.8771199329,
];

/// C-G-D-A-E-B-F# narrowed by 1/6 comma.
const YOUNG: RatioTable = [
    1.0000000000, 1.0534979424, 1.1199298221, 1.1851851852, 1.2542428065, 1.3333333333,
    1.4046639232, 1.4966160644, 1.5802469136, 1.6761049628, 1.7777777778, 1.8771199329,
];

/// C-G-D-A-E and B-F# narrowed by 1/5 comma.
const KELLNER: RatioTable = [
    1.0000000000, 1.0534979424, 1.1189185319, 1.1851851852, 1.2519786810, 1.3333333333,
    1.4046639232, 1.4959401939, 1.5802469136, 1.6738352056, 1.7777777778, 1.8779680216,
];

/// Lehman's reading of the Well-Tempered Clavier title page.
const LEHMAN: RatioTable = [
    1.0000000000, 1.0582673680, 1.1199298221, 1.1878649575, 1.2542428065, 1.3363480772,
    1.4110231573, 1.4966160644, 1.5856094867, 1.6761049628, 1.7797864722, 1.8813642097,
];

/// Named tuning systems.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Temperament {
    #[default]
    Equal,
    JustIntonation,
    Pythagorean,
    ThirdCommaMeantone,
    TwoSeventhsCommaMeantone,
    QuarterCommaMeantone,
    FifthCommaMeantone,
    SixthCommaMeantone,
    WerckmeisterIii,
    WerckmeisterIv,
    WerckmeisterVi,
    KirnbergerI,
    KirnbergerIi,
    KirnbergerIii,
    Vallotti,
    Young,
    Kellner,
    Lehman,
}

impl Temperament {
    /// Every temperament, in menu order.
    pub const ALL: [Temperament; 18] = [
        Temperament::Equal,
        Temperament::JustIntonation,
        Temperament::Pythagorean,
        Temperament::ThirdCommaMeantone,
        Temperament::TwoSeventhsCommaMeantone,
        Temperament::QuarterCommaMeantone,
        Temperament::FifthCommaMeantone,
        Temperament::SixthCommaMeantone,
        Temperament::WerckmeisterIii,
        Temperament::WerckmeisterIv,
        Temperament::WerckmeisterVi,
        Temperament::KirnbergerI,
        Temperament::KirnbergerIi,
        Temperament::KirnbergerIii,
        Temperament::Vallotti,
        Temperament::Young,
        Temperament::Kellner,
        Temperament::Lehman,
    ];

    /// The twelve ratios of this temperament, tonic first.
    pub fn ratios(self) -> &'static RatioTable {
        match self {
            Temperament::Equal => &EQUAL,
            Temperament::JustIntonation => &JUST_INTONATION,
            Temperament::Pythagorean => &PYTHAGOREAN,
            Temperament::ThirdCommaMeantone => &THIRD_COMMA_MEANTONE,
            Temperament::TwoSeventhsCommaMeantone => &TWO_SEVENTHS_COMMA_MEANTONE,
            Temperament::QuarterCommaMeantone => &QUARTER_COMMA_MEANTONE,
            Temperament::FifthCommaMeantone => &FIFTH_COMMA_MEANTONE,
            Temperament::SixthCommaMeantone => &SIXTH_COMMA_MEANTONE,
            Temperament::WerckmeisterIii => &WERCKMEISTER_III,
            Temperament::WerckmeisterIv => &WERCKMEISTER_IV,
            Temperament::WerckmeisterVi => &WERCKMEISTER_VI,
            Temperament::KirnbergerI => &KIRNBERGER_I,
            Temperament::KirnbergerIi => &KIRNBERGER_II,
            Temperament::KirnbergerIii => &KIRNBERGER_III,
            Temperament::Vallotti => &VALLOTTI,
            Temperament::Young => &YOUNG,
            Temperament::Kellner => &KELLNER,
            Temperament::Lehman => &LEHMAN,
        }
    }

    /// Ratio for a semitone offset from the tonic.
    ///
    /// Negative and large offsets wrap with `((s % 12) + 12) % 12`, so the
    /// octave is not part of the returned ratio.
    pub fn ratio(self, semitones: i32) -> f64 {
        let degree = ((semitones % 12) + 12) % 12;
        self.ratios()[degree as usize]
    }

    /// Human readable name for menus and logs.
    pub fn display_name(self) -> &'static str {
        match self {
            Temperament::Equal => "Equal Temperament",
            Temperament::JustIntonation => "Just Intonation",
            Temperament::Pythagorean => "Pythagorean",
            Temperament::ThirdCommaMeantone => "1/3-Comma Meantone",
            Temperament::TwoSeventhsCommaMeantone => "2/7-Comma Meantone",
            Temperament::QuarterCommaMeantone => "1/4-Comma Meantone",
            Temperament::FifthCommaMeantone => "1/5-Comma Meantone",
            Temperament::SixthCommaMeantone => "1/6-Comma Meantone",
            Temperament::WerckmeisterIii => "Werckmeister III",
            Temperament::WerckmeisterIv => "Werckmeister IV",
            Temperament::WerckmeisterVi => "Werckmeister VI",
            Temperament::KirnbergerI => "Kirnberger I",
            Temperament::KirnbergerIi => "Kirnberger II",
            Temperament::KirnbergerIii => "Kirnberger III",
            Temperament::Vallotti => "Vallotti",
            Temperament::Young => "Young",
            Temperament::Kellner => "Kellner",
            Temperament::Lehman => "Lehman (Bach)",
        }
    }

    /// Stable identifier, matches the serde representation.
    pub fn id(self) -> &'static str {
        match self {
            Temperament::Equal => "equal",
            Temperament::JustIntonation => "just_intonation",
            Temperament::Pythagorean => "pythagorean",
            Temperament::ThirdCommaMeantone => "third_comma_meantone",
            Temperament::TwoSeventhsCommaMeantone => "two_sevenths_comma_meantone",
            Temperament::QuarterCommaMeantone => "quarter_comma_meantone",
            Temperament::FifthCommaMeantone => "fifth_comma_meantone",
            Temperament::SixthCommaMeantone => "sixth_comma_meantone",
            Temperament::WerckmeisterIii => "werckmeister_iii",
            Temperament::WerckmeisterIv => "werckmeister_iv",
            Temperament::WerckmeisterVi => "werckmeister_vi",
            Temperament::KirnbergerI => "kirnberger_i",
            Temperament::KirnbergerIi => "kirnberger_ii",
            Temperament::KirnbergerIii => "kirnberger_iii",
            Temperament::Vallotti => "vallotti",
            Temperament::Young => "young",
            Temperament::Kellner => "kellner",
            Temperament::Lehman => "lehman",
        }
    }
}

impl fmt::Display for Temperament {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Lowercase alphanumerics only, so "Werckmeister III", "werckmeister_iii"
/// and "werckmeister-iii" all compare equal.
fn normalize(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

impl FromStr for Temperament {
    type Err = TunerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = normalize(s);
        if wanted == "et" || wanted == "12tet" {
            return Ok(Temperament::Equal);
        }
        if wanted == "bach" {
            return Ok(Temperament::Lehman);
        }
        Temperament::ALL
            .iter()
            .copied()
            .find(|t| normalize(t.id()) == wanted || normalize(t.display_name()) == wanted)
            .ok_or_else(|| TunerError::UnknownTemperament(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn cents(ratio: f64) -> f64 {
        1200.0 * ratio.log2()
    }

    #[test]
    fn test_tonic_is_unity_everywhere() {
        for t in Temperament::ALL {
            assert_eq!(t.ratios()[0], 1.0, "{} tonic", t);
        }
    }

    #[test]
    fn test_tables_are_ascending_within_octave() {
        for t in Temperament::ALL {
            let table = t.ratios();
            for pair in table.windows(2) {
                assert!(pair[0] < pair[1], "{} not ascending: {:?}", t, table);
            }
            assert!(table[11] < 2.0);
        }
    }

    #[test]
    fn test_equal_table_is_generated() {
        let table = Temperament::Equal.ratios();
        assert_abs_diff_eq!(table[7], 1.4983070768766815, epsilon = 1e-12);
        assert_abs_diff_eq!(cents(table[4]), 400.0, epsilon = 1e-9);
    }

    #[test]
    fn test_known_historical_intervals() {
        // Pure fifth and third where the system keeps them pure
        assert_abs_diff_eq!(Temperament::Pythagorean.ratios()[7], 1.5, epsilon = 1e-12);
        assert_abs_diff_eq!(Temperament::QuarterCommaMeantone.ratios()[4], 1.25, epsilon = 1e-9);
        assert_abs_diff_eq!(Temperament::KirnbergerIii.ratios()[4], 1.25, epsilon = 1e-9);

        // Werckmeister III D is 192.18 cents
        assert_abs_diff_eq!(cents(Temperament::WerckmeisterIii.ratios()[2]), 192.18, epsilon = 0.01);
        // Vallotti Bb is exactly 1000 cents
        assert_abs_diff_eq!(cents(Temperament::Vallotti.ratios()[10]), 1000.0, epsilon = 0.01);
    }

    #[test]
    fn test_ratio_wraps_negative_offsets() {
        let t = Temperament::JustIntonation;
        assert_eq!(t.ratio(-1), t.ratios()[11]);
        assert_eq!(t.ratio(-12), 1.0);
        assert_eq!(t.ratio(19), t.ratios()[7]);
    }

    #[test]
    fn test_parse_names() {
        assert_eq!("equal".parse::<Temperament>().unwrap(), Temperament::Equal);
        assert_eq!("Werckmeister III".parse::<Temperament>().unwrap(), Temperament::WerckmeisterIii);
        assert_eq!("quarter-comma-meantone".parse::<Temperament>().unwrap(), Temperament::QuarterCommaMeantone);
        assert_eq!("1/4-Comma Meantone".parse::<Temperament>().unwrap(), Temperament::QuarterCommaMeantone);
        assert_eq!("bach".parse::<Temperament>().unwrap(), Temperament::Lehman);
        assert!(matches!(
            "gamelan".parse::<Temperament>(),
            Err(TunerError::UnknownTemperament(_))
        ));
    }

    #[test]
    fn test_ids_round_trip() {
        for t in Temperament::ALL {
            assert_eq!(t.id().parse::<Temperament>().unwrap(), t);
            let json = serde_json::to_string(&t).unwrap();
            assert_eq!(json, format!("\"{}\"", t.id()));
        }
    }
}
