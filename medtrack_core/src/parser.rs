//! Dosing-text parser.
//!
//! Turns a phrase like "aspirin 500mg twice daily with food" into a
//! medication name, dose string, reminder times, and notes. Frequency
//! phrases are matched longest-first so "twice daily" wins over "daily".

use crate::{Error, Result};
use chrono::{NaiveTime, Timelike};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// How often a dose is taken, before mapping onto clock times
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Frequency {
    OnceDaily,
    TwiceDaily,
    ThreeTimesDaily,
    EveryMorning,
    EveryNight,
    AtBedtime,
    EveryHours(u32),
    AsNeeded,
}

/// Clock anchors the frequency phrases map onto
///
/// Configurable so "every morning" can mean 07:00 for one household and
/// 09:00 for another.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct DoseClock {
    pub morning: NaiveTime,
    pub midday: NaiveTime,
    pub evening: NaiveTime,
    pub bedtime: NaiveTime,
}

impl Default for DoseClock {
    fn default() -> Self {
        Self {
            morning: hm(8, 0),
            midday: hm(12, 0),
            evening: hm(20, 0),
            bedtime: hm(22, 0),
        }
    }
}

fn hm(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).expect("valid clock time")
}

/// What the parser understood from one dosing phrase
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsedDosing {
    pub name: String,
    pub dose: Option<String>,
    /// Empty when `as_needed` is set
    pub times_of_day: Vec<NaiveTime>,
    /// "As needed" medications get no reminder schedule
    pub as_needed: bool,
    pub notes: Option<String>,
}

/// Frequency phrases, longest first so partial matches never win
static FREQUENCY_PHRASES: Lazy<Vec<(&'static str, Frequency)>> = Lazy::new(|| {
    let mut phrases = vec![
        ("three times daily", Frequency::ThreeTimesDaily),
        ("three times a day", Frequency::ThreeTimesDaily),
        ("3 times a day", Frequency::ThreeTimesDaily),
        ("3 times daily", Frequency::ThreeTimesDaily),
        ("twice daily", Frequency::TwiceDaily),
        ("twice a day", Frequency::TwiceDaily),
        ("2 times a day", Frequency::TwiceDaily),
        ("2 times daily", Frequency::TwiceDaily),
        ("once daily", Frequency::OnceDaily),
        ("once a day", Frequency::OnceDaily),
        ("daily", Frequency::OnceDaily),
        ("every morning", Frequency::EveryMorning),
        ("every night", Frequency::EveryNight),
        ("at bedtime", Frequency::AtBedtime),
        ("before bed", Frequency::AtBedtime),
        ("as needed", Frequency::AsNeeded),
        ("when needed", Frequency::AsNeeded),
    ];
    phrases.sort_by_key(|(phrase, _)| std::cmp::Reverse(phrase.len()));
    phrases
});

static EVERY_N_HOURS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"every (\d{1,2}) hours").expect("valid regex"));

static DOSE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(\d+(?:\.\d+)?\s*(?:mg|mcg|g|ml|iu|units?|tablets?|capsules?|pills?|puffs?|drops?))\b")
        .expect("valid regex")
});

static ACTION_WORDS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(add|take|use|using|remind me to take|my)\b").expect("valid regex"));

const NOTE_KEYWORDS: [&str; 10] = [
    "with food",
    "without food",
    "on empty stomach",
    "with water",
    "before meals",
    "after meals",
    "in the morning",
    "at night",
    "with breakfast",
    "with dinner",
];

/// Parse one dosing phrase into its parts
///
/// Fails with [`Error::Parse`] when no medication name survives after
/// stripping dose, frequency, and note phrases.
pub fn parse_dosing(text: &str, clock: &DoseClock) -> Result<ParsedDosing> {
    let lowered = text.to_lowercase();

    let notes = extract_notes(&lowered);
    let (frequency, matched_phrase) = extract_frequency(&lowered);
    let dose = DOSE
        .find(&lowered)
        .map(|m| m.as_str().trim().to_string());

    let name = extract_name(&lowered, dose.as_deref(), matched_phrase.as_deref(), &notes)?;

    let as_needed = frequency == Some(Frequency::AsNeeded);
    let times_of_day = match frequency {
        Some(freq) if !as_needed => times_for(freq, clock),
        // No recognizable frequency defaults to once daily
        None => times_for(Frequency::OnceDaily, clock),
        _ => Vec::new(),
    };

    Ok(ParsedDosing {
        name,
        dose,
        times_of_day,
        as_needed,
        notes: if notes.is_empty() {
            None
        } else {
            Some(notes.join(", "))
        },
    })
}

fn extract_frequency(text: &str) -> (Option<Frequency>, Option<String>) {
    if let Some(caps) = EVERY_N_HOURS.captures(text) {
        if let Ok(hours) = caps[1].parse::<u32>() {
            if (1..=24).contains(&hours) {
                return (Some(Frequency::EveryHours(hours)), Some(caps[0].to_string()));
            }
        }
    }

    for (phrase, frequency) in FREQUENCY_PHRASES.iter() {
        if text.contains(phrase) {
            return (Some(*frequency), Some((*phrase).to_string()));
        }
    }

    (None, None)
}

fn times_for(frequency: Frequency, clock: &DoseClock) -> Vec<NaiveTime> {
    let mut times = match frequency {
        Frequency::OnceDaily | Frequency::EveryMorning => vec![clock.morning],
        Frequency::TwiceDaily => vec![clock.morning, clock.evening],
        Frequency::ThreeTimesDaily => vec![clock.morning, clock.midday, clock.evening],
        Frequency::EveryNight | Frequency::AtBedtime => vec![clock.bedtime],
        Frequency::EveryHours(n) => {
            // Anchor the cycle at the morning dose and wrap around the day
            let mut times = Vec::new();
            let mut offset = 0;
            while offset < 24 {
                times.push(hm((clock.morning.hour() + offset) % 24, clock.morning.minute()));
                offset += n;
            }
            times
        }
        Frequency::AsNeeded => Vec::new(),
    };
    times.sort();
    times.dedup();
    times
}

fn extract_notes(text: &str) -> Vec<String> {
    NOTE_KEYWORDS
        .iter()
        .filter(|keyword| text.contains(*keyword))
        .map(|keyword| (*keyword).to_string())
        .collect()
}

fn extract_name(
    text: &str,
    dose: Option<&str>,
    frequency_phrase: Option<&str>,
    notes: &[String],
) -> Result<String> {
    let mut working = ACTION_WORDS.replace_all(text, " ").into_owned();

    if let Some(dose) = dose {
        working = working.replace(dose, " ");
    }
    if let Some(phrase) = frequency_phrase {
        working = working.replace(phrase, " ");
    }
    for note in notes {
        working = working.replace(note.as_str(), " ");
    }

    let name: String = working
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim_matches(|c: char| c.is_ascii_punctuation() || c.is_whitespace())
        .to_string();

    if name.is_empty() {
        return Err(Error::Parse(format!(
            "could not find a medication name in '{}'",
            text
        )));
    }

    // Drug names are usually one or two words, occasionally three
    let words: Vec<&str> = name.split_whitespace().collect();
    let keep = match words.len() {
        1 => 1,
        2 | 3 => 2,
        _ => 3,
    };
    Ok(words[..keep].join(" "))
}
