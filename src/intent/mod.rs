//! Rule-based intent detection for French CRM utterances.
//!
//! Detection is an ordered table of rules, each a set of regexes with a
//! fixed confidence. The first rule whose pattern matches wins. Rules that
//! only make sense while a command awaits confirmation (confirm / cancel /
//! modify) are gated on the `has_pending` flag and sit at the top of the
//! table, so "non, plutôt 80000" never leaks into record creation.

mod entities;

pub use entities::Entities;

use chrono::{Local, NaiveDate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// What the user is asking the copilot to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentKind {
    CreateDeal,
    UpdateDeal,
    CreateAction,
    UpdateAction,
    /// Approve the pending command.
    Confirm,
    /// Drop the pending command.
    Cancel,
    /// Adjust the pending command before committing.
    Modify,
    /// Anything that is not a CRM command; delegated to the chat assistant.
    Query,
}

/// A classified utterance.
#[derive(Debug, Clone, PartialEq)]
pub struct Intent {
    pub kind: IntentKind,
    pub confidence: f32,
    pub entities: Entities,
    /// Name of the record an update refers to, when one was captured.
    pub target: Option<String>,
}

struct Rule {
    kind: IntentKind,
    confidence: f32,
    /// Only applies while a command awaits confirmation.
    pending_only: bool,
    patterns: &'static [&'static LazyLock<Regex>],
}

static CONFIRM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\s*(oui|ouais|ok|okay|d['’]accord|daccord|vas[- ]?y|c['’]est bon|cest bon|parfait|tr[eè]s bien|confirme[rz]?|valide[rz]?|exactement|absolument|carr[ée]ment)\b",
    )
    .expect("confirm regex")
});

// A bare "non" cancels; "non," followed by more is a modification.
static CANCEL_BARE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*non(\s+merci)?\s*[.!…]*\s*$").expect("cancel regex"));

static CANCEL_KEYWORD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(annule[rz]?|annulation|stop|arr[eê]te[rz]?|laisse[rz]? tomber|abandonne[rz]?|oublie[rz]?)\b")
        .expect("cancel keyword regex")
});

static MODIFY_PREFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*non\s*,").expect("modify prefix regex"));

static MODIFY_KEYWORD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(plut[oô]t|modifie[rsz]?|change[rsz]?|corrige[rsz]?|remplace[rsz]?|d[ée]cale[rsz]?|mets|mettez)\b")
        .expect("modify keyword regex")
});

// "met…" counts as an update verb with "à jour" or a definite article:
// "mets l'opportunité…" edits a record, "mets un rendez-vous" schedules one.
static UPDATE_DEAL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(modifie[rsz]?|change[rsz]?|passe[rsz]?|bascule[rsz]?|met(?:s|tre|tez)?\s+[àa]\s+jour|met(?:s|tre|tez)?\s+(?:l['’]|le\s|la\s|les\s))\b.*\b(opportunit[ée]s?|deals?|affaires?|ventes?|statut)\b",
    )
    .expect("update deal regex")
});

static UPDATE_ACTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(modifie[rsz]?|change[rsz]?|d[ée]cale[rsz]?|d[ée]place[rsz]?|reporte[rsz]?|met(?:s|tre|tez)?\s+[àa]\s+jour|met(?:s|tre|tez)?\s+(?:l['’]|le\s|la\s|les\s))\b.*\b(actions?|t[âa]ches?|rendez[- ]vous|rdv|r[ée]unions?|rappels?|appels?|visites?)\b",
    )
    .expect("update action regex")
});

static CREATE_DEAL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(cr[ée]e[rsz]?|ajoute[rsz]?|nouvelles?|nouveaux?|ouvre[rsz]?|ouvrir)\b.*\b(opportunit[ée]s?|deals?|affaires?|prospects?|ventes?)\b",
    )
    .expect("create deal regex")
});

static CREATE_DEAL_PROSPECT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bprospects?\s+(de|pour|avec|chez)\b").expect("prospect regex"));

static CREATE_ACTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(cr[ée]e[rsz]?|ajoute[rsz]?|nouvelles?|nouveaux?)\b.*\b(actions?|t[âa]ches?|rappels?)\b")
        .expect("create action regex")
});

static CALL_VERB_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(rappeler|rappelle[sz]?|appeler|appelle[sz]?|contacter|contacte[sz]?)\b")
        .expect("call verb regex")
});

static SEND_EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(envo(?:yer|ie[sz]?)|[ée]crire|[ée]cris)\b.*\b(e-?mails?|mails?|courriels?|messages?)\b")
        .expect("send email regex")
});

static SCHEDULE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(planifie[rsz]?|programme[rsz]?|pr[ée]voir|pr[ée]vois|organise[rsz]?|cale[rsz]?)\b.*\b(rendez[- ]vous|rdv|r[ée]unions?|appels?|rappels?|visites?|rencontres?)\b",
    )
    .expect("schedule regex")
});

/// Ordered rule table; first match wins.
static RULES: &[Rule] = &[
    Rule {
        kind: IntentKind::Confirm,
        confidence: 0.95,
        pending_only: true,
        patterns: &[&CONFIRM_RE],
    },
    Rule {
        kind: IntentKind::Cancel,
        confidence: 0.95,
        pending_only: true,
        patterns: &[&CANCEL_BARE_RE, &CANCEL_KEYWORD_RE],
    },
    Rule {
        kind: IntentKind::Modify,
        confidence: 0.85,
        pending_only: true,
        patterns: &[&MODIFY_PREFIX_RE, &MODIFY_KEYWORD_RE],
    },
    Rule {
        kind: IntentKind::UpdateDeal,
        confidence: 0.9,
        pending_only: false,
        patterns: &[&UPDATE_DEAL_RE],
    },
    Rule {
        kind: IntentKind::UpdateAction,
        confidence: 0.9,
        pending_only: false,
        patterns: &[&UPDATE_ACTION_RE],
    },
    Rule {
        kind: IntentKind::CreateDeal,
        confidence: 0.9,
        pending_only: false,
        patterns: &[&CREATE_DEAL_RE, &CREATE_DEAL_PROSPECT_RE],
    },
    Rule {
        kind: IntentKind::CreateAction,
        confidence: 0.9,
        pending_only: false,
        patterns: &[&CREATE_ACTION_RE, &CALL_VERB_RE, &SEND_EMAIL_RE, &SCHEDULE_RE],
    },
];

/// Classifies utterances against the rule table.
#[derive(Debug, Clone, Copy, Default)]
pub struct IntentDetector;

impl IntentDetector {
    pub fn new() -> Self {
        Self
    }

    /// Classify an utterance, resolving relative dates against today.
    pub fn detect(&self, message: &str, has_pending: bool) -> Intent {
        self.detect_at(message, has_pending, Local::now().date_naive())
    }

    /// Classify an utterance against an explicit reference day.
    pub fn detect_at(&self, message: &str, has_pending: bool, today: NaiveDate) -> Intent {
        let lower = message.to_lowercase();

        for rule in RULES {
            if rule.pending_only && !has_pending {
                continue;
            }
            if rule.patterns.iter().any(|re| re.is_match(&lower)) {
                return materialize(rule, message, today);
            }
        }

        Intent {
            kind: IntentKind::Query,
            confidence: 0.5,
            entities: Entities::default(),
            target: None,
        }
    }
}

/// Attach the entities and target the matched rule calls for.
fn materialize(rule: &Rule, message: &str, today: NaiveDate) -> Intent {
    let (entities, target) = match rule.kind {
        IntentKind::CreateDeal => (entities::deal_entities(message, today), None),
        IntentKind::UpdateDeal => (
            entities::deal_entities(message, today),
            entities::deal_target(message),
        ),
        IntentKind::CreateAction => (entities::action_entities(message, today), None),
        IntentKind::UpdateAction => (
            entities::action_entities(message, today),
            entities::action_target(message),
        ),
        IntentKind::Modify => (entities::modification_entities(message, today), None),
        IntentKind::Confirm | IntentKind::Cancel | IntentKind::Query => {
            (Entities::default(), None)
        }
    };

    Intent {
        kind: rule.kind,
        confidence: rule.confidence,
        entities,
        target,
    }
}
