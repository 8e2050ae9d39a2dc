//! Entity extraction from French utterances.
//!
//! Every extractor is best-effort: it either finds a value it is confident
//! about or leaves the field `None` for the draft defaults to fill. Nothing
//! here ever errors on user speech.
//!
//! Name-like entities (clients, contacts) are matched against the
//! original-case text because STT capitalizes proper nouns; everything else
//! works on a lowercased copy.

use crate::crm::{ActionType, DealStatus, Priority};
use chrono::{Datelike, Duration, NaiveDate, NaiveTime, Weekday};
use regex::Regex;
use std::sync::LazyLock;

/// Everything the extractors can pull out of one utterance.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Entities {
    /// Client / company name (deal-side).
    pub client: Option<String>,
    /// Person to contact (action-side).
    pub contact: Option<String>,
    /// Amount in euros, k/mille multiplier already applied.
    pub amount: Option<f64>,
    pub status: Option<DealStatus>,
    /// Win probability in percent. May exceed 100; validation rejects it.
    pub probability: Option<u8>,
    pub action_type: Option<ActionType>,
    /// Relative dates already resolved against the reference day.
    pub due_date: Option<NaiveDate>,
    pub time: Option<NaiveTime>,
    pub priority: Option<Priority>,
}

// Capitalized word sequence: "TechCorp", "Tech Corp Industries", "Jean-Luc".
const NAME: &str = r"((?:[A-ZÀ-ÖØ-Þ][\w'’&.-]*)(?:\s+[A-ZÀ-ÖØ-Þ0-9][\w'’&.-]*)*)";

// Triggers fold case (utterances often open with the verb); names do not.
static CLIENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"\b(?:(?i)avec|pour|chez|client|soci[ée]t[ée])\s+{NAME}"
    ))
    .expect("client regex")
});

static CONTACT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"\b(?:(?i)rappeler|rappelle[sz]?|appeler|appelle[sz]?|contacter|contacte[sz]?|avec|chez|à)\s+{NAME}"
    ))
    .expect("contact regex")
});

static DEAL_TARGET_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?:(?i)opportunit[ée]|deal|affaire|vente|statut)\s+(?:(?i)de\s+|d['’]|du\s+|pour\s+|avec\s+|chez\s+)?{NAME}"
    ))
    .expect("deal target regex")
});

static ACTION_TARGET_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?:(?i)action|t[âa]che|rendez[- ]vous|rdv|r[ée]union|rappel|appel|visite)\s+(?:(?i)de\s+|d['’]|du\s+|pour\s+|avec\s+|chez\s+)?{NAME}"
    ))
    .expect("action target regex")
});

// "50 000 €", "50k", "3 mille euros". The marker or the currency must be
// present; bare numbers are only accepted by the modification extractor.
static AMOUNT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+(?:[\s\u{202f}\u{a0}.]\d{3})*(?:,\d+)?)\s*(k|mille)?\b\s*(€|euros?\b)?")
        .expect("amount regex")
});

static BARE_NUMBER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+(?:[\s\u{202f}\u{a0}]\d{3})*)(?:,(\d+))?").expect("bare number regex")
});

static STATUS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(n[ée]gociations?|n[ée]gocier|propositions?|devis|offres?|prospections?|prospects?|gagn[ée]e?s?|remport[ée]e?s?|perdue?s?)\b")
        .expect("status regex")
});

static PROBABILITY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{1,3})\s*(?:%|pour ?cent\b)").expect("probability regex"));

static TIME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\d{1,2})\s*h(?:eures?)?\s*(\d{2})?\b|\b(\d{1,2}):(\d{2})\b")
        .expect("time regex")
});

static WEEKDAY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(lundi|mardi|mercredi|jeudi|vendredi|samedi|dimanche)\b")
        .expect("weekday regex")
});

static PRIORITY_LOW_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(basse|faible|pas urgente?|quand tu peux)\b").expect("low priority regex")
});

static PRIORITY_HIGH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(urgente?s?|importante?s?|prioritaires?|critiques?)\b")
        .expect("high priority regex")
});

/// Keyword table for action kinds, in precedence order.
const ACTION_TYPE_TABLE: &[(&str, ActionType)] = &[
    (
        r"\b(appels?|appeler|appelle[sz]?|rappels?|rappeler|rappelle[sz]?|t[ée]l[ée]phones?|t[ée]l[ée]phoner)\b",
        ActionType::Call,
    ),
    (
        r"\b(e-?mails?|mails?|courriels?|[ée]crire|[ée]cris)\b",
        ActionType::Email,
    ),
    (
        r"\b(rendez[- ]vous|rdv|r[ée]unions?|meetings?|rencontres?|visites?)\b",
        ActionType::Meeting,
    ),
    (r"\b(t[âa]ches?)\b", ActionType::Task),
];

static ACTION_TYPE_RES: LazyLock<Vec<(Regex, ActionType)>> = LazyLock::new(|| {
    ACTION_TYPE_TABLE
        .iter()
        .map(|(pattern, kind)| (Regex::new(pattern).expect("action type regex"), *kind))
        .collect()
});

/// Entities relevant when creating or updating a deal.
pub(crate) fn deal_entities(message: &str, today: NaiveDate) -> Entities {
    let lower = message.to_lowercase();
    Entities {
        client: extract_client(message),
        amount: extract_amount(&lower),
        status: extract_status(&lower),
        probability: extract_probability(&lower),
        due_date: extract_due_date(&lower, today),
        ..Default::default()
    }
}

/// Entities relevant when creating or updating an action item.
pub(crate) fn action_entities(message: &str, today: NaiveDate) -> Entities {
    let lower = message.to_lowercase();
    Entities {
        contact: extract_contact(message),
        action_type: extract_action_type(&lower),
        due_date: extract_due_date(&lower, today),
        time: extract_time(&lower),
        priority: extract_priority(&lower),
        ..Default::default()
    }
}

/// Union extractor for "non, plutôt …" turns: the pending command decides
/// which fields it cares about. Bare numbers count as amounts here
/// ("plutôt 80000"), once times and percentages are ruled out.
pub(crate) fn modification_entities(message: &str, today: NaiveDate) -> Entities {
    let lower = message.to_lowercase();
    let time = extract_time(&lower);
    let probability = extract_probability(&lower);
    let amount = extract_amount(&lower).or_else(|| extract_bare_amount(&lower));
    Entities {
        client: extract_client(message),
        contact: extract_contact(message),
        amount,
        status: extract_status(&lower),
        probability,
        action_type: extract_action_type(&lower),
        due_date: extract_due_date(&lower, today),
        time,
        priority: extract_priority(&lower),
    }
}

/// Name of the deal an update refers to ("l'opportunité de TechCorp").
pub(crate) fn deal_target(message: &str) -> Option<String> {
    DEAL_TARGET_RE
        .captures(message)
        .and_then(|c| c.get(1))
        .map(|m| clean_name(m.as_str()))
}

/// Name of the action an update refers to ("le rendez-vous avec Martin").
pub(crate) fn action_target(message: &str) -> Option<String> {
    ACTION_TARGET_RE
        .captures(message)
        .and_then(|c| c.get(1))
        .map(|m| clean_name(m.as_str()))
}

fn extract_client(message: &str) -> Option<String> {
    CLIENT_RE
        .captures(message)
        .and_then(|c| c.get(1))
        .map(|m| clean_name(m.as_str()))
}

fn extract_contact(message: &str) -> Option<String> {
    CONTACT_RE
        .captures(message)
        .and_then(|c| c.get(1))
        .map(|m| clean_name(m.as_str()))
}

// Captured names may drag trailing punctuation along ("TechCorp.").
fn clean_name(raw: &str) -> String {
    raw.trim_end_matches(['.', ',', ';', '!', '?', '\'', '’', '-', '&', ' '])
        .to_owned()
}

fn extract_amount(lower: &str) -> Option<f64> {
    for caps in AMOUNT_RE.captures_iter(lower) {
        let marker = caps.get(2).map(|m| m.as_str());
        let currency = caps.get(3).map(|m| m.as_str());
        if marker.is_none() && currency.is_none() {
            continue;
        }
        if let Some(value) = parse_number(&caps[1]) {
            let multiplier = if marker.is_some() { 1_000.0 } else { 1.0 };
            return Some(value * multiplier);
        }
    }
    None
}

/// Bare-number fallback for modification turns. Times and percentages are
/// blanked out first so "plutôt 80000" parses but "à 14h30" never does.
fn extract_bare_amount(lower: &str) -> Option<f64> {
    let mut scrubbed = lower.to_owned();
    for re in [&TIME_RE, &PROBABILITY_RE] {
        let ranges: Vec<_> = re.find_iter(&scrubbed).map(|m| m.range()).collect();
        let mut bytes = scrubbed.into_bytes();
        for range in ranges {
            bytes[range].fill(b' ');
        }
        scrubbed = String::from_utf8(bytes).unwrap_or_default();
    }

    for caps in BARE_NUMBER_RE.captures_iter(&scrubbed) {
        let integer: String = caps[1].chars().filter(char::is_ascii_digit).collect();
        // Two-digit numbers are too ambiguous to treat as money.
        if integer.len() < 3 {
            continue;
        }
        let fraction = caps.get(2).map(|m| m.as_str()).unwrap_or("");
        let text = if fraction.is_empty() {
            integer
        } else {
            format!("{integer}.{fraction}")
        };
        if let Ok(value) = text.parse::<f64>() {
            return Some(value);
        }
    }
    None
}

fn parse_number(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .chars()
        .filter(|c| !matches!(c, ' ' | '\u{202f}' | '\u{a0}' | '.'))
        .map(|c| if c == ',' { '.' } else { c })
        .collect();
    cleaned.parse::<f64>().ok()
}

fn extract_status(lower: &str) -> Option<DealStatus> {
    let matched = STATUS_RE.find(lower)?.as_str();
    let status = if matched.starts_with("negoci") || matched.starts_with("négoci") {
        DealStatus::Negotiation
    } else if matched.starts_with("proposition")
        || matched.starts_with("devis")
        || matched.starts_with("offre")
    {
        DealStatus::Proposal
    } else if matched.starts_with("prospect") {
        DealStatus::Prospect
    } else if matched.starts_with("gagn") || matched.starts_with("remport") {
        DealStatus::Won
    } else {
        DealStatus::Lost
    };
    Some(status)
}

fn extract_probability(lower: &str) -> Option<u8> {
    PROBABILITY_RE
        .captures(lower)
        .and_then(|caps| caps[1].parse::<u8>().ok())
}

fn extract_action_type(lower: &str) -> Option<ActionType> {
    ACTION_TYPE_RES
        .iter()
        .find(|(re, _)| re.is_match(lower))
        .map(|(_, kind)| *kind)
}

fn extract_due_date(lower: &str, today: NaiveDate) -> Option<NaiveDate> {
    if lower.contains("après-demain") || lower.contains("apres-demain") || lower.contains("après demain")
    {
        return Some(today + Duration::days(2));
    }
    if lower.contains("demain") {
        return Some(today + Duration::days(1));
    }
    if lower.contains("aujourd'hui") || lower.contains("aujourd’hui") {
        return Some(today);
    }
    let weekday = match WEEKDAY_RE.captures(lower)?.get(1)?.as_str() {
        "lundi" => Weekday::Mon,
        "mardi" => Weekday::Tue,
        "mercredi" => Weekday::Wed,
        "jeudi" => Weekday::Thu,
        "vendredi" => Weekday::Fri,
        "samedi" => Weekday::Sat,
        _ => Weekday::Sun,
    };
    Some(next_weekday(today, weekday))
}

/// Next occurrence of `target` strictly after `today`: "mardi" said on a
/// Tuesday means next week, never right now.
fn next_weekday(today: NaiveDate, target: Weekday) -> NaiveDate {
    let ahead = i64::from(target.num_days_from_monday())
        - i64::from(today.weekday().num_days_from_monday());
    let ahead = ahead.rem_euclid(7);
    let ahead = if ahead == 0 { 7 } else { ahead };
    today + Duration::days(ahead)
}

fn extract_time(lower: &str) -> Option<NaiveTime> {
    for caps in TIME_RE.captures_iter(lower) {
        let (hour, minute) = if let Some(h) = caps.get(1) {
            let m = caps.get(2).map(|m| m.as_str()).unwrap_or("00");
            (h.as_str().parse::<u32>().ok()?, m.parse::<u32>().ok()?)
        } else {
            let h = caps.get(3)?;
            let m = caps.get(4)?;
            (h.as_str().parse::<u32>().ok()?, m.as_str().parse::<u32>().ok()?)
        };
        if let Some(time) = NaiveTime::from_hms_opt(hour, minute, 0) {
            return Some(time);
        }
    }
    None
}

fn extract_priority(lower: &str) -> Option<Priority> {
    // "pas urgent" must win over "urgent".
    if PRIORITY_LOW_RE.is_match(lower) {
        return Some(Priority::Low);
    }
    if PRIORITY_HIGH_RE.is_match(lower) {
        return Some(Priority::High);
    }
    None
}
