//! Draft construction, merging, validation and spoken summaries.
//!
//! Extracted entities rarely describe a complete record, so drafts are
//! filled with conservative defaults and read back to the user for
//! confirmation before anything reaches the store. All user-facing text
//! here is French and goes to TTS verbatim.

use crate::crm::{
    ActionDraft, ActionPatch, ActionStatus, ActionType, DealDraft, DealPatch, DealStatus, Priority,
};
use crate::intent::Entities;
use chrono::{Duration, Months, NaiveDate, NaiveTime, Timelike};
use regex::Regex;
use std::sync::LazyLock;

/// Placeholder client for deals created without a name. Validation refuses
/// to commit it.
pub const UNKNOWN_CLIENT: &str = "Client inconnu";

// Times embedded in titles, "14h" or "14h30".
static TITLE_TIME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d{1,2}\s*h\s*(?:\d{2})?\b").expect("title time regex"));

// ── draft construction ──────────────────────────────────────────────────

/// Build a deal draft from extracted entities, defaulting what is missing:
/// unknown client, zero amount, prospect stage, 50% probability, close in
/// one month.
pub fn deal_draft(entities: &Entities, today: NaiveDate) -> DealDraft {
    DealDraft {
        client: entities
            .client
            .clone()
            .unwrap_or_else(|| UNKNOWN_CLIENT.to_owned()),
        amount: entities.amount.unwrap_or(0.0),
        status: entities.status.unwrap_or(DealStatus::Prospect),
        probability: entities.probability.unwrap_or(50),
        expected_close: entities
            .due_date
            .unwrap_or_else(|| today.checked_add_months(Months::new(1)).unwrap_or(today)),
    }
}

/// Build an action draft from extracted entities: due tomorrow, medium
/// priority, todo, with a title synthesized from the kind and contact.
pub fn action_draft(entities: &Entities, today: NaiveDate) -> ActionDraft {
    let time = entities.time;
    let mut title = synthesize_title(entities.action_type, entities.contact.as_deref());
    if let Some(t) = time {
        title.push_str(&format!(" à {}", format_time_fr(t)));
    }
    ActionDraft {
        title,
        action_type: entities.action_type,
        contact: entities.contact.clone(),
        due_date: Some(entities.due_date.unwrap_or_else(|| today + Duration::days(1))),
        time,
        priority: entities.priority.unwrap_or(Priority::Medium),
        status: ActionStatus::Todo,
    }
}

fn synthesize_title(action_type: Option<ActionType>, contact: Option<&str>) -> String {
    match (action_type, contact) {
        (Some(ActionType::Call), Some(c)) => format!("Appeler {c}"),
        (Some(ActionType::Call), None) => "Appeler le contact".to_owned(),
        (Some(ActionType::Email), Some(c)) => format!("Envoyer un email à {c}"),
        (Some(ActionType::Email), None) => "Envoyer un email".to_owned(),
        (Some(ActionType::Meeting), Some(c)) => format!("Rendez-vous avec {c}"),
        (Some(ActionType::Meeting), None) => "Rendez-vous".to_owned(),
        (Some(ActionType::Task), Some(c)) => format!("Tâche pour {c}"),
        (Some(ActionType::Task), None) => "Nouvelle tâche".to_owned(),
        (None, Some(c)) => format!("Nouvelle action pour {c}"),
        (None, None) => "Nouvelle action".to_owned(),
    }
}

// ── merging modifications ───────────────────────────────────────────────

/// Fold "non, plutôt …" entities into a pending deal draft.
pub fn merge_deal(draft: &mut DealDraft, entities: &Entities) {
    if let Some(client) = &entities.client {
        draft.client = client.clone();
    }
    if let Some(amount) = entities.amount {
        draft.amount = amount;
    }
    if let Some(status) = entities.status {
        draft.status = status;
    }
    if let Some(probability) = entities.probability {
        draft.probability = probability;
    }
    if let Some(due) = entities.due_date {
        draft.expected_close = due;
    }
}

/// Fold modification entities into a pending action draft.
///
/// A new time also rewrites the title: an embedded "14h"/"14h30" is
/// replaced in place, otherwise the time is appended.
pub fn merge_action(draft: &mut ActionDraft, entities: &Entities) {
    if let Some(contact) = &entities.contact {
        draft.contact = Some(contact.clone());
    }
    if let Some(action_type) = entities.action_type {
        draft.action_type = Some(action_type);
    }
    if let Some(due) = entities.due_date {
        draft.due_date = Some(due);
    }
    if let Some(priority) = entities.priority {
        draft.priority = priority;
    }
    if let Some(time) = entities.time {
        draft.title = match retime_title(&draft.title, time) {
            Some(rewritten) => rewritten,
            None => format!("{} à {}", draft.title, format_time_fr(time)),
        };
        draft.time = Some(time);
    }
}

/// Replace an embedded "14h"/"14h30" in a title with a new time.
/// `None` when the title carries no time.
pub fn retime_title(title: &str, time: NaiveTime) -> Option<String> {
    if TITLE_TIME_RE.is_match(title) {
        Some(
            TITLE_TIME_RE
                .replace(title, format_time_fr(time))
                .into_owned(),
        )
    } else {
        None
    }
}

// ── patches ─────────────────────────────────────────────────────────────

/// Field changes for an existing deal, from update-intent entities.
pub fn deal_patch(entities: &Entities) -> DealPatch {
    DealPatch {
        client: entities.client.clone(),
        amount: entities.amount,
        status: entities.status,
        probability: entities.probability,
        expected_close: entities.due_date,
    }
}

/// Field changes for an existing action, from update-intent entities.
pub fn action_patch(entities: &Entities) -> ActionPatch {
    ActionPatch {
        title: None,
        action_type: entities.action_type,
        contact: entities.contact.clone(),
        due_date: entities.due_date,
        time: entities.time,
        priority: entities.priority,
        status: None,
    }
}

/// Fold modification entities into a pending deal patch.
pub fn merge_deal_patch(patch: &mut DealPatch, entities: &Entities) {
    let incoming = deal_patch(entities);
    if incoming.client.is_some() {
        patch.client = incoming.client;
    }
    if incoming.amount.is_some() {
        patch.amount = incoming.amount;
    }
    if incoming.status.is_some() {
        patch.status = incoming.status;
    }
    if incoming.probability.is_some() {
        patch.probability = incoming.probability;
    }
    if incoming.expected_close.is_some() {
        patch.expected_close = incoming.expected_close;
    }
}

/// Fold modification entities into a pending action patch.
pub fn merge_action_patch(patch: &mut ActionPatch, entities: &Entities) {
    let incoming = action_patch(entities);
    if incoming.action_type.is_some() {
        patch.action_type = incoming.action_type;
    }
    if incoming.contact.is_some() {
        patch.contact = incoming.contact;
    }
    if incoming.due_date.is_some() {
        patch.due_date = incoming.due_date;
    }
    if incoming.time.is_some() {
        patch.time = incoming.time;
    }
    if incoming.priority.is_some() {
        patch.priority = incoming.priority;
    }
}

// ── validation ──────────────────────────────────────────────────────────

/// Problems that block committing a deal draft; empty means valid.
pub fn validate_deal(draft: &DealDraft) -> Vec<String> {
    let mut errors = Vec::new();
    let client = draft.client.trim();
    if client.is_empty() || client == UNKNOWN_CLIENT {
        errors.push("Le client doit être précisé.".to_owned());
    }
    if draft.amount <= 0.0 {
        errors.push("Le montant doit être supérieur à zéro.".to_owned());
    }
    if draft.probability > 100 {
        errors.push("La probabilité doit être comprise entre 0 et 100.".to_owned());
    }
    errors
}

/// Problems that block committing an action draft; empty means valid.
pub fn validate_action(draft: &ActionDraft) -> Vec<String> {
    let mut errors = Vec::new();
    if draft.title.trim().is_empty() {
        errors.push("Le titre de l'action est vide.".to_owned());
    }
    if draft.action_type.is_none() {
        errors.push(
            "Le type d'action doit être précisé (appel, email, rendez-vous ou tâche).".to_owned(),
        );
    }
    if draft.due_date.is_none() {
        errors.push("L'échéance de l'action doit être précisée.".to_owned());
    }
    errors
}

/// Problems that block applying a deal patch; empty means valid.
pub fn validate_deal_patch(patch: &DealPatch) -> Vec<String> {
    let mut errors = Vec::new();
    if patch.client.as_deref().is_some_and(|c| c.trim().is_empty()) {
        errors.push("Le client doit être précisé.".to_owned());
    }
    if patch.amount.is_some_and(|a| a <= 0.0) {
        errors.push("Le montant doit être supérieur à zéro.".to_owned());
    }
    if patch.probability.is_some_and(|p| p > 100) {
        errors.push("La probabilité doit être comprise entre 0 et 100.".to_owned());
    }
    errors
}

/// Problems that block applying an action patch; empty means valid.
pub fn validate_action_patch(patch: &ActionPatch) -> Vec<String> {
    let mut errors = Vec::new();
    if patch.title.as_deref().is_some_and(|t| t.trim().is_empty()) {
        errors.push("Le titre de l'action est vide.".to_owned());
    }
    if patch.contact.as_deref().is_some_and(|c| c.trim().is_empty()) {
        errors.push("Le contact doit être précisé.".to_owned());
    }
    errors
}

// ── spoken summaries ────────────────────────────────────────────────────

/// One-sentence summary of a deal draft, read back before committing.
pub fn describe_deal(draft: &DealDraft) -> String {
    format!(
        "Opportunité {} pour {}, {}, probabilité {}%",
        draft.client,
        format_euros(draft.amount),
        draft.status.label_fr(),
        draft.probability
    )
}

/// One-sentence summary of an action draft.
pub fn describe_action(draft: &ActionDraft, today: NaiveDate) -> String {
    let mut when = date_phrase(draft.due_date, today);
    if let Some(time) = draft.time {
        if !TITLE_TIME_RE.is_match(&draft.title) {
            when.push_str(&format!(" à {}", format_time_fr(time)));
        }
    }
    let mut out = format!("{}, {}", draft.title, when);
    if draft.priority != Priority::Medium {
        out.push_str(&format!(", priorité {}", draft.priority.label_fr()));
    }
    out
}

/// "field → new value" listing for a deal update.
pub fn describe_deal_patch(client: &str, patch: &DealPatch) -> String {
    let mut parts = Vec::new();
    if let Some(new_client) = &patch.client {
        parts.push(format!("client → {new_client}"));
    }
    if let Some(amount) = patch.amount {
        parts.push(format!("montant → {}", format_euros(amount)));
    }
    if let Some(status) = patch.status {
        parts.push(format!("statut → {}", status.label_fr()));
    }
    if let Some(probability) = patch.probability {
        parts.push(format!("probabilité → {probability}%"));
    }
    if let Some(close) = patch.expected_close {
        parts.push(format!("clôture → le {}", format_date_fr(close)));
    }
    if parts.is_empty() {
        return format!("Aucun changement pour l'opportunité {client}");
    }
    format!("Modification de l'opportunité {client} : {}", parts.join(", "))
}

/// "field → new value" listing for an action update.
pub fn describe_action_patch(title: &str, patch: &ActionPatch, today: NaiveDate) -> String {
    let mut parts = Vec::new();
    if let Some(new_title) = &patch.title {
        parts.push(format!("titre → {new_title}"));
    }
    if let Some(action_type) = patch.action_type {
        parts.push(format!("type → {}", action_type.label_fr()));
    }
    if let Some(contact) = &patch.contact {
        parts.push(format!("contact → {contact}"));
    }
    if let Some(due) = patch.due_date {
        parts.push(format!("échéance → {}", date_phrase(Some(due), today)));
    }
    if let Some(time) = patch.time {
        parts.push(format!("heure → {}", format_time_fr(time)));
    }
    if let Some(priority) = patch.priority {
        parts.push(format!("priorité → {}", priority.label_fr()));
    }
    if let Some(status) = patch.status {
        let label = match status {
            ActionStatus::Todo => "à faire",
            ActionStatus::Done => "terminée",
        };
        parts.push(format!("statut → {label}"));
    }
    if parts.is_empty() {
        return format!("Aucun changement pour « {title} »");
    }
    format!("Modification de « {title} » : {}", parts.join(", "))
}

/// Euro amounts with space-grouped thousands: "50 000 €", "1 500,50 €".
pub fn format_euros(amount: f64) -> String {
    let cents = (amount * 100.0).round() as i64;
    let whole = cents / 100;
    let frac = (cents % 100).abs();
    let grouped = group_thousands(whole);
    if frac == 0 {
        format!("{grouped} €")
    } else {
        format!("{grouped},{frac:02} €")
    }
}

fn group_thousands(value: i64) -> String {
    let digits = value.abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(' ');
        }
        out.push(ch);
    }
    if value < 0 { format!("-{out}") } else { out }
}

/// "14h" / "14h30".
pub fn format_time_fr(time: NaiveTime) -> String {
    if time.minute() == 0 {
        format!("{}h", time.hour())
    } else {
        format!("{}h{:02}", time.hour(), time.minute())
    }
}

/// "23/08/2026".
pub fn format_date_fr(date: NaiveDate) -> String {
    date.format("%d/%m/%Y").to_string()
}

// "aujourd'hui", "demain", or "le 25/08/2026".
fn date_phrase(date: Option<NaiveDate>, today: NaiveDate) -> String {
    match date {
        None => "sans échéance".to_owned(),
        Some(d) if d == today => "aujourd'hui".to_owned(),
        Some(d) if d == today + Duration::days(1) => "demain".to_owned(),
        Some(d) => format!("le {}", format_date_fr(d)),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    // 2026-08-18 is a Tuesday.
    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 8, 18).unwrap()
    }

    fn time(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    // ── defaults ─────────────────────────────────────────────────────────

    #[test]
    fn deal_draft_defaults() {
        let draft = deal_draft(&Entities::default(), today());
        assert_eq!(draft.client, UNKNOWN_CLIENT);
        assert!(draft.amount.abs() < f64::EPSILON);
        assert_eq!(draft.status, DealStatus::Prospect);
        assert_eq!(draft.probability, 50);
        assert_eq!(draft.expected_close, NaiveDate::from_ymd_opt(2026, 9, 18).unwrap());
    }

    #[test]
    fn action_draft_defaults() {
        let draft = action_draft(&Entities::default(), today());
        assert_eq!(draft.title, "Nouvelle action");
        assert_eq!(draft.action_type, None);
        assert_eq!(draft.due_date, Some(NaiveDate::from_ymd_opt(2026, 8, 19).unwrap()));
        assert_eq!(draft.priority, Priority::Medium);
        assert_eq!(draft.status, ActionStatus::Todo);
    }

    #[test]
    fn action_titles_come_from_type_and_contact() {
        let entities = Entities {
            action_type: Some(ActionType::Call),
            contact: Some("Dupont".to_owned()),
            time: Some(time(14, 30)),
            ..Default::default()
        };
        let draft = action_draft(&entities, today());
        assert_eq!(draft.title, "Appeler Dupont à 14h30");

        let entities = Entities {
            action_type: Some(ActionType::Email),
            contact: Some("Martin".to_owned()),
            ..Default::default()
        };
        assert_eq!(action_draft(&entities, today()).title, "Envoyer un email à Martin");
    }

    // ── merging ──────────────────────────────────────────────────────────

    #[test]
    fn merge_deal_overwrites_only_present_fields() {
        let mut draft = deal_draft(
            &Entities {
                client: Some("TechCorp".to_owned()),
                amount: Some(50_000.0),
                ..Default::default()
            },
            today(),
        );
        merge_deal(
            &mut draft,
            &Entities {
                amount: Some(80_000.0),
                ..Default::default()
            },
        );
        assert!((draft.amount - 80_000.0).abs() < f64::EPSILON);
        assert_eq!(draft.client, "TechCorp");
    }

    #[test]
    fn merge_action_replaces_embedded_time() {
        let mut draft = action_draft(
            &Entities {
                action_type: Some(ActionType::Call),
                contact: Some("Dupont".to_owned()),
                time: Some(time(14, 30)),
                ..Default::default()
            },
            today(),
        );
        merge_action(
            &mut draft,
            &Entities {
                time: Some(time(15, 0)),
                ..Default::default()
            },
        );
        assert_eq!(draft.title, "Appeler Dupont à 15h");
        assert_eq!(draft.time, Some(time(15, 0)));
    }

    #[test]
    fn merge_action_appends_time_when_title_has_none() {
        let mut draft = action_draft(
            &Entities {
                action_type: Some(ActionType::Meeting),
                contact: Some("Martin".to_owned()),
                ..Default::default()
            },
            today(),
        );
        merge_action(
            &mut draft,
            &Entities {
                time: Some(time(9, 0)),
                ..Default::default()
            },
        );
        assert_eq!(draft.title, "Rendez-vous avec Martin à 9h");
    }

    // ── validation ───────────────────────────────────────────────────────

    #[test]
    fn default_deal_draft_is_invalid() {
        let errors = validate_deal(&deal_draft(&Entities::default(), today()));
        assert_eq!(errors.len(), 2);
        assert!(errors[0].contains("client"));
        assert!(errors[1].contains("montant"));
    }

    #[test]
    fn complete_deal_draft_is_valid() {
        let entities = Entities {
            client: Some("TechCorp".to_owned()),
            amount: Some(50_000.0),
            ..Default::default()
        };
        assert!(validate_deal(&deal_draft(&entities, today())).is_empty());
    }

    #[test]
    fn out_of_range_probability_is_refused() {
        let mut draft = deal_draft(
            &Entities {
                client: Some("TechCorp".to_owned()),
                amount: Some(50_000.0),
                probability: Some(150),
                ..Default::default()
            },
            today(),
        );
        let errors = validate_deal(&draft);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("probabilité"));
        draft.probability = 100;
        assert!(validate_deal(&draft).is_empty());
    }

    #[test]
    fn action_without_type_is_invalid() {
        let entities = Entities {
            contact: Some("Dupont".to_owned()),
            ..Default::default()
        };
        let errors = validate_action(&action_draft(&entities, today()));
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("type d'action"));
    }

    #[test]
    fn patches_get_the_same_range_checks_as_drafts() {
        let mut patch = DealPatch {
            status: Some(DealStatus::Negotiation),
            probability: Some(150),
            ..Default::default()
        };
        let errors = validate_deal_patch(&patch);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("probabilité"));

        patch.probability = Some(75);
        assert!(validate_deal_patch(&patch).is_empty());

        // Untouched fields are not the patch's problem.
        assert!(validate_deal_patch(&DealPatch::default()).is_empty());
        assert!(validate_action_patch(&ActionPatch::default()).is_empty());

        let patch = DealPatch {
            amount: Some(0.0),
            ..Default::default()
        };
        assert!(validate_deal_patch(&patch)[0].contains("montant"));
    }

    // ── summaries ────────────────────────────────────────────────────────

    #[test]
    fn deal_summary_reads_naturally() {
        let draft = DealDraft {
            client: "TechCorp".to_owned(),
            amount: 50_000.0,
            status: DealStatus::Negotiation,
            probability: 60,
            expected_close: today(),
        };
        assert_eq!(
            describe_deal(&draft),
            "Opportunité TechCorp pour 50 000 €, en négociation, probabilité 60%"
        );
    }

    #[test]
    fn action_summary_special_cases_relative_days() {
        let entities = Entities {
            action_type: Some(ActionType::Call),
            contact: Some("Dupont".to_owned()),
            due_date: Some(today() + Duration::days(1)),
            priority: Some(Priority::High),
            ..Default::default()
        };
        let draft = action_draft(&entities, today());
        assert_eq!(describe_action(&draft, today()), "Appeler Dupont, demain, priorité haute");
    }

    #[test]
    fn action_summary_skips_time_already_in_title() {
        let entities = Entities {
            action_type: Some(ActionType::Call),
            contact: Some("Dupont".to_owned()),
            due_date: Some(today() + Duration::days(1)),
            time: Some(time(14, 0)),
            ..Default::default()
        };
        let draft = action_draft(&entities, today());
        // The synthesized title already says "à 14h".
        assert_eq!(describe_action(&draft, today()), "Appeler Dupont à 14h, demain");
    }

    #[test]
    fn patch_summary_lists_field_changes() {
        let patch = DealPatch {
            status: Some(DealStatus::Negotiation),
            amount: Some(80_000.0),
            ..Default::default()
        };
        let text = describe_deal_patch("TechCorp", &patch);
        assert!(text.contains("TechCorp"));
        assert!(text.contains("montant → 80 000 €"));
        assert!(text.contains("statut → en négociation"));
    }

    // ── formatting ───────────────────────────────────────────────────────

    #[test]
    fn euro_formatting_groups_thousands() {
        assert_eq!(format_euros(0.0), "0 €");
        assert_eq!(format_euros(500.0), "500 €");
        assert_eq!(format_euros(50_000.0), "50 000 €");
        assert_eq!(format_euros(1_234_567.5), "1 234 567,50 €");
    }

    #[test]
    fn time_formatting_drops_zero_minutes() {
        assert_eq!(format_time_fr(time(14, 0)), "14h");
        assert_eq!(format_time_fr(time(9, 5)), "9h05");
    }

    #[test]
    fn date_phrase_special_cases() {
        assert_eq!(date_phrase(Some(today()), today()), "aujourd'hui");
        assert_eq!(date_phrase(Some(today() + Duration::days(1)), today()), "demain");
        assert_eq!(
            date_phrase(Some(NaiveDate::from_ymd_opt(2026, 12, 24).unwrap()), today()),
            "le 24/12/2026"
        );
        assert_eq!(date_phrase(None, today()), "sans échéance");
    }
}
