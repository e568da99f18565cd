//! Letter-to-number annotations for a matchup.
//!
//! Purely advisory: the report is attached to each prediction but never feeds
//! the winner or confidence. Three fixed ciphers map A–Z to small integers;
//! every other character is ignored.

use serde::Serialize;

/// Raw sums that count as master numbers.
const MASTER_NUMBERS: [u32; 3] = [11, 22, 33];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Cipher {
    /// A=1 … Z=26
    English,
    /// A–I, J–R, S–Z each count 1, 2, 3 …
    Pythagorean,
    Chaldean,
}

pub const ALL_CIPHERS: [Cipher; 3] = [Cipher::English, Cipher::Pythagorean, Cipher::Chaldean];

const CHALDEAN: [u32; 26] = [
    1, 2, 3, 4, 5, 8, 3, 5, 1, // A–I
    1, 2, 3, 4, 5, 7, 8, 1, 2, // J–R
    3, 4, 6, 6, 6, 5, 1, 7, // S–Z
];

impl Cipher {
    /// Weight of this cipher when deciding the favored side.
    pub fn weight(&self) -> f64 {
        match self {
            Cipher::English => 1.0,
            Cipher::Pythagorean => 1.5,
            Cipher::Chaldean => 1.2,
        }
    }

    fn letter_value(&self, c: char) -> u32 {
        let idx = (c as u8 - b'A') as u32;
        match self {
            Cipher::English => idx + 1,
            Cipher::Pythagorean => idx % 9 + 1,
            Cipher::Chaldean => CHALDEAN[idx as usize],
        }
    }

    pub fn value(&self, text: &str) -> u32 {
        text.chars()
            .map(|c| c.to_ascii_uppercase())
            .filter(|c| c.is_ascii_uppercase())
            .map(|c| self.letter_value(c))
            .sum()
    }
}

/// Repeated digit sum down to a single digit.
pub fn reduce_to_single(mut n: u32) -> u32 {
    while n > 9 {
        let mut sum = 0;
        while n > 0 {
            sum += n % 10;
            n /= 10;
        }
        n = sum;
    }
    n
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CipherValue {
    pub cipher: Cipher,
    pub value: u32,
    pub reduced: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TextAnalysis {
    pub text: String,
    pub values: Vec<CipherValue>,
}

impl TextAnalysis {
    pub fn of(text: &str) -> Self {
        let values = ALL_CIPHERS
            .iter()
            .map(|c| {
                let value = c.value(text);
                CipherValue {
                    cipher: *c,
                    value,
                    reduced: reduce_to_single(value),
                }
            })
            .collect();
        TextAnalysis {
            text: text.to_string(),
            values,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Lean {
    Home,
    Away,
    Neutral,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Pattern {
    EqualValues { cipher: Cipher, value: u32 },
    MasterNumber { cipher: Cipher, team: Lean, value: u32 },
    MultipleOf11 { cipher: Cipher, difference: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NumerologyReport {
    pub home: TextAnalysis,
    pub away: TextAnalysis,
    pub patterns: Vec<Pattern>,
    pub favored: Lean,
}

pub fn analyze(home_team: &str, away_team: &str) -> NumerologyReport {
    let home = TextAnalysis::of(home_team);
    let away = TextAnalysis::of(away_team);
    let patterns = find_patterns(&home, &away);
    let favored = determine_favor(&home, &away);
    NumerologyReport {
        home,
        away,
        patterns,
        favored,
    }
}

fn find_patterns(home: &TextAnalysis, away: &TextAnalysis) -> Vec<Pattern> {
    let mut patterns = Vec::new();
    for (h, a) in home.values.iter().zip(away.values.iter()) {
        let cipher = h.cipher;
        if h.value == a.value {
            patterns.push(Pattern::EqualValues {
                cipher,
                value: h.value,
            });
        }
        for (team, value) in [(Lean::Home, h.value), (Lean::Away, a.value)] {
            if MASTER_NUMBERS.contains(&value) {
                patterns.push(Pattern::MasterNumber {
                    cipher,
                    team,
                    value,
                });
            }
        }
        let difference = h.value.abs_diff(a.value);
        if difference % 11 == 0 {
            patterns.push(Pattern::MultipleOf11 { cipher, difference });
        }
    }
    patterns
}

fn determine_favor(home: &TextAnalysis, away: &TextAnalysis) -> Lean {
    let mut home_score = 0.0;
    let mut away_score = 0.0;
    for (h, a) in home.values.iter().zip(away.values.iter()) {
        let w = h.cipher.weight();
        if h.reduced > a.reduced {
            home_score += w;
        } else if a.reduced > h.reduced {
            away_score += w;
        }
    }
    if home_score > away_score {
        Lean::Home
    } else if away_score > home_score {
        Lean::Away
    } else {
        Lean::Neutral
    }
}
