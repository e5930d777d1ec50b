use std::sync::LazyLock;

use chrono::{Datelike, Duration, Local, NaiveDate, NaiveTime, Weekday};
use regex::{Captures, Regex};

use super::Extractor;
use crate::models::{format_time, Entities, Extraction, Intent};

/// Keyword groups in priority order; the first group with a match wins.
const INTENT_KEYWORDS: &[(Intent, &[&str])] = &[
    (Intent::Schedule, &["book", "schedule", "make an appointment"]),
    (Intent::Reschedule, &["reschedule", "change", "modify"]),
    (Intent::Cancel, &["cancel", "delete", "remove"]),
    (
        Intent::ViewAppointments,
        &[
            "view appointments",
            "show appointments",
            "see appointments",
            "list appointments",
        ],
    ),
    (
        Intent::ShowTherapists,
        &[
            "show therapists",
            "list therapists",
            "available therapists",
            "therapist availability",
        ],
    ),
    (Intent::Greet, &["hello", "hi", "hey", "greetings"]),
];

/// Words that end a provider name following "with".
const NAME_STOP_WORDS: &[&str] = &["tomorrow", "today", "at", "on", "for"];

const TITLES: &[&str] = &["dr", "dr.", "doctor", "mr", "mr.", "mrs", "mrs.", "ms", "ms.", "miss"];

const MONTHS: &str = "january|jan|february|feb|march|mar|april|apr|may|june|jun|july|jul|august|aug|september|sept|sep|october|oct|november|nov|december|dec";

static ISO_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{4})-(\d{1,2})-(\d{1,2})\b").expect("valid regex"));

static SLASH_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\d{1,2})/(\d{1,2})(?:/(\d{4}|\d{2}))?\b").expect("valid regex")
});

static MONTH_DAY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"\b({MONTHS})\.?\s+(\d{{1,2}})(?:st|nd|rd|th)?\b(?:,?\s+(\d{{4}}))?"
    ))
    .expect("valid regex")
});

static DAY_MONTH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"\b(\d{{1,2}})(?:st|nd|rd|th)?\s+(?:of\s+)?({MONTHS})\b\.?(?:,?\s+(\d{{4}}))?"
    ))
    .expect("valid regex")
});

static MONTH_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!(r"^({MONTHS})\.?$")).expect("valid regex"));

static WEEKDAY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(monday|tuesday|wednesday|thursday|friday|saturday|sunday)\b")
        .expect("valid regex")
});

static TIME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\d{1,2})(?::(\d{2}))?\s*([ap])\.?m\b\.?").expect("valid regex")
});

/// Heuristic extractor: keyword intents plus pattern-based entity spans.
#[derive(Debug, Clone, Default)]
pub struct KeywordExtractor;

impl KeywordExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Extracts relative to a fixed `today`, so relative dates are deterministic.
    pub fn extract_on(&self, utterance: &str, today: NaiveDate) -> Extraction {
        let lower = utterance.to_lowercase();
        let words = normalized_words(&lower);

        let intent = classify(&words);
        let entities = Entities {
            provider_name: provider_after_with(utterance).or_else(|| longest_person_span(utterance)),
            date: find_date(&lower, &words, today),
            time: find_time(&lower),
        };

        tracing::debug!(utterance, intent = ?intent, entities = ?entities, "extracted intent");

        Extraction { intent, entities }
    }
}

impl Extractor for KeywordExtractor {
    fn extract(&self, utterance: &str) -> Extraction {
        self.extract_on(utterance, Local::now().date_naive())
    }
}

fn normalized_words(lower: &str) -> Vec<String> {
    lower
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_string())
        .filter(|w| !w.is_empty())
        .collect()
}

/// Whole-word phrase matching, so "reschedule" never counts as "schedule".
fn classify(words: &[String]) -> Option<Intent> {
    INTENT_KEYWORDS
        .iter()
        .find(|(_, phrases)| phrases.iter().any(|phrase| contains_phrase(words, phrase)))
        .map(|(intent, _)| *intent)
}

fn contains_phrase(words: &[String], phrase: &str) -> bool {
    let needle: Vec<&str> = phrase.split_whitespace().collect();
    words
        .windows(needle.len())
        .any(|window| window.iter().zip(&needle).all(|(w, n)| w == n))
}

fn strip_trailing_punctuation(s: &str) -> &str {
    s.trim_end_matches([',', '?', '!', ';', ':'])
}

/// Everything after the first "with" up to a stop word, keeping the input casing.
fn provider_after_with(utterance: &str) -> Option<String> {
    let tokens: Vec<&str> = utterance.split_whitespace().collect();
    let start = tokens
        .iter()
        .position(|t| t.eq_ignore_ascii_case("with"))?
        + 1;

    let name: Vec<&str> = tokens[start..]
        .iter()
        .take_while(|t| {
            let bare = t
                .trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase();
            !NAME_STOP_WORDS.contains(&bare.as_str())
        })
        .copied()
        .collect();

    let joined = name.join(" ");
    let trimmed = strip_trailing_punctuation(joined.trim());
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn is_title(token: &str) -> bool {
    TITLES.contains(&token.to_lowercase().as_str())
}

fn is_name_word(token: &str) -> bool {
    let bare = strip_trailing_punctuation(token);
    let mut chars = bare.chars();
    let capitalized = chars.next().is_some_and(|c| c.is_uppercase())
        && chars.all(|c| c.is_alphabetic() || c == '\'' || c == '-');
    if !capitalized || bare.len() < 2 {
        return false;
    }
    let lower = bare.to_lowercase();
    !WEEKDAY.is_match(&lower)
        && !MONTH_WORD.is_match(&lower)
        && !NAME_STOP_WORDS.contains(&lower.as_str())
        && classify(&[lower]).is_none()
}

/// Longest run of capitalised words (optionally led by a title). The first
/// token of the sentence only counts when it is a title.
fn longest_person_span(utterance: &str) -> Option<String> {
    let tokens: Vec<&str> = utterance.split_whitespace().collect();
    let mut best: Option<(usize, String)> = None;

    let mut i = 0;
    while i < tokens.len() {
        let mut j = i;
        if is_title(tokens[j]) {
            j += 1;
        } else if i == 0 {
            i += 1;
            continue;
        }
        let names_start = j;
        while j < tokens.len() && is_name_word(tokens[j]) {
            j += 1;
            // A trailing comma or question mark ends the name.
            if strip_trailing_punctuation(tokens[j - 1]) != tokens[j - 1] {
                break;
            }
        }
        if j > names_start {
            let span = tokens[i..j].join(" ");
            let span = strip_trailing_punctuation(&span).to_string();
            if best.as_ref().map_or(true, |(len, _)| j - i > *len) {
                best = Some((j - i, span));
            }
            i = j;
        } else {
            i += 1;
        }
    }

    best.map(|(_, span)| span)
}

fn find_date(lower: &str, words: &[String], today: NaiveDate) -> Option<NaiveDate> {
    if words.iter().any(|w| w == "tomorrow") {
        return Some(today + Duration::days(1));
    }
    if words.iter().any(|w| w == "today") {
        return Some(today);
    }
    if contains_phrase(words, "next week") {
        return Some(today + Duration::days(7));
    }

    if let Some(caps) = ISO_DATE.captures(lower) {
        return ymd(number(&caps, 1)?, number(&caps, 2)?, number(&caps, 3)?);
    }
    if let Some(caps) = MONTH_DAY.captures(lower) {
        let year = caps.get(3).and_then(|m| m.as_str().parse().ok()).unwrap_or(today.year());
        return ymd(year, month_number(&caps[1])?, number(&caps, 2)?);
    }
    if let Some(caps) = DAY_MONTH.captures(lower) {
        let year = caps.get(3).and_then(|m| m.as_str().parse().ok()).unwrap_or(today.year());
        return ymd(year, month_number(&caps[2])?, number(&caps, 1)?);
    }
    if let Some(caps) = SLASH_DATE.captures(lower) {
        let year = match caps.get(3).map(|m| m.as_str()) {
            Some(y) if y.len() == 2 => 2000 + y.parse::<i32>().ok()?,
            Some(y) => y.parse().ok()?,
            None => today.year(),
        };
        return ymd(year, number(&caps, 1)?, number(&caps, 2)?);
    }
    if let Some(caps) = WEEKDAY.captures(lower) {
        let weekday: Weekday = caps[1].parse().ok()?;
        let ahead = (7 + weekday.num_days_from_monday() as i64
            - today.weekday().num_days_from_monday() as i64)
            % 7;
        return Some(today + Duration::days(ahead));
    }
    None
}

fn number<T: std::str::FromStr>(caps: &Captures, idx: usize) -> Option<T> {
    caps.get(idx)?.as_str().parse().ok()
}

fn ymd(year: i32, month: u32, day: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, day)
}

fn month_number(name: &str) -> Option<u32> {
    let month = match name.get(..3)? {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    };
    Some(month)
}

/// Accepts `h:mm am/pm` and `h am/pm`; returns the canonical `h:mm AM/PM`.
fn find_time(lower: &str) -> Option<String> {
    let caps = TIME.captures(lower)?;
    let hour: u32 = number(&caps, 1)?;
    let minute: u32 = match caps.get(2) {
        Some(m) => m.as_str().parse().ok()?,
        None => 0,
    };
    if !(1..=12).contains(&hour) {
        return None;
    }
    let pm = &caps[3] == "p";
    let hour24 = hour % 12 + if pm { 12 } else { 0 };
    NaiveTime::from_hms_opt(hour24, minute, 0).map(format_time)
}
