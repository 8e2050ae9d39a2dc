//! Fuzzy matching of spoken references to CRM records.
//!
//! Users say "techcorp" or "le deal innova" and mean a record whose stored
//! name never matches exactly. Candidates are scored with a normalized
//! Levenshtein similarity (with a substring shortcut) and a winner is only
//! returned when it is both good enough and clearly ahead of the runner-up:
//! guessing the wrong record is worse than asking back.

use crate::config::MatcherConfig;
use crate::crm::{ActionItem, Deal};
use crate::normalize::normalize;

/// A candidate record with its similarity score against the query.
#[derive(Debug, Clone, Copy)]
pub struct MatchResult<'a, T> {
    pub item: &'a T,
    pub score: f64,
}

/// Fuzzy lookup of deals and actions by spoken name.
#[derive(Debug, Clone)]
pub struct ItemMatcher {
    threshold: f64,
    ambiguity_gap: f64,
}

impl Default for ItemMatcher {
    fn default() -> Self {
        Self::new(&MatcherConfig::default())
    }
}

impl ItemMatcher {
    pub fn new(config: &MatcherConfig) -> Self {
        Self {
            threshold: config.threshold,
            ambiguity_gap: config.ambiguity_gap,
        }
    }

    /// Find the deal whose client name best matches `query`.
    ///
    /// Returns `None` when nothing clears the threshold, or when the two
    /// best candidates are too close to call.
    pub fn find_deal<'a>(&self, deals: &'a [Deal], query: &str) -> Option<&'a Deal> {
        self.decide(self.find_deals(deals, query))
    }

    /// Find the action whose title or contact best matches `query`.
    pub fn find_action<'a>(&self, actions: &'a [ActionItem], query: &str) -> Option<&'a ActionItem> {
        self.decide(self.find_actions(actions, query))
    }

    /// All deals at or above the threshold, best first. Used for
    /// clarification prompts when the single-winner rule rejects.
    pub fn find_deals<'a>(&self, deals: &'a [Deal], query: &str) -> Vec<MatchResult<'a, Deal>> {
        self.rank(deals, |deal| similarity(query, &deal.client))
    }

    /// All actions at or above the threshold, best first.
    pub fn find_actions<'a>(
        &self,
        actions: &'a [ActionItem],
        query: &str,
    ) -> Vec<MatchResult<'a, ActionItem>> {
        self.rank(actions, |action| {
            similarity(query, &action.title).max(similarity(query, &action.contact))
        })
    }

    fn rank<'a, T>(&self, items: &'a [T], score: impl Fn(&T) -> f64) -> Vec<MatchResult<'a, T>> {
        let mut ranked: Vec<MatchResult<'a, T>> = items
            .iter()
            .map(|item| MatchResult {
                item,
                score: score(item),
            })
            .filter(|m| m.score >= self.threshold)
            .collect();
        ranked.sort_by(|x, y| y.score.total_cmp(&x.score));
        ranked
    }

    // Single-winner rule: best candidate wins only with a clear lead.
    fn decide<'a, T>(&self, ranked: Vec<MatchResult<'a, T>>) -> Option<&'a T> {
        match ranked.as_slice() {
            [] => None,
            [only] => Some(only.item),
            [best, second, ..] if best.score - second.score < self.ambiguity_gap => None,
            [best, ..] => Some(best.item),
        }
    }
}

/// Similarity between two strings in `[0, 1]`, computed on normalized text.
///
/// Identical after normalization → 1.0. One contained in the other → ratio
/// of the shorter length to the longer. Otherwise 1 − edit distance / longer
/// length.
pub fn similarity(a: &str, b: &str) -> f64 {
    let a = normalize(a);
    let b = normalize(b);

    if a == b {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    let longer = a_chars.len().max(b_chars.len()) as f64;
    let shorter = a_chars.len().min(b_chars.len()) as f64;

    if a.contains(&b) || b.contains(&a) {
        return shorter / longer;
    }

    1.0 - levenshtein(&a_chars, &b_chars) as f64 / longer
}

/// Levenshtein edit distance over chars.
fn levenshtein(a: &[char], b: &[char]) -> usize {
    let n = a.len();
    let m = b.len();

    if n == 0 {
        return m;
    }
    if m == 0 {
        return n;
    }

    // Cost matrix. Using a flat vec for cache-friendliness.
    let mut cost = vec![0usize; (n + 1) * (m + 1)];
    let idx = |i: usize, j: usize| i * (m + 1) + j;

    for i in 0..=n {
        cost[idx(i, 0)] = i;
    }
    for j in 0..=m {
        cost[idx(0, j)] = j;
    }

    for i in 1..=n {
        for j in 1..=m {
            let substitution = usize::from(a[i - 1] != b[j - 1]);
            cost[idx(i, j)] = (cost[idx(i - 1, j)] + 1)
                .min(cost[idx(i, j - 1)] + 1)
                .min(cost[idx(i - 1, j - 1)] + substitution);
        }
    }

    cost[idx(n, m)]
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use crate::crm::{ActionStatus, ActionType, DealStatus, Priority};
    use chrono::NaiveDate;

    fn deal(id: &str, client: &str) -> Deal {
        Deal {
            id: id.to_owned(),
            client: client.to_owned(),
            amount: 10_000.0,
            status: DealStatus::Prospect,
            probability: 50,
            expected_close: NaiveDate::from_ymd_opt(2026, 9, 30).unwrap(),
        }
    }

    fn action(id: &str, title: &str, contact: &str) -> ActionItem {
        ActionItem {
            id: id.to_owned(),
            title: title.to_owned(),
            action_type: ActionType::Call,
            contact: contact.to_owned(),
            due_date: NaiveDate::from_ymd_opt(2026, 8, 24).unwrap(),
            time: None,
            priority: Priority::Medium,
            status: ActionStatus::Todo,
        }
    }

    // ── levenshtein ──────────────────────────────────────────────────────

    #[test]
    fn levenshtein_known_distances() {
        let chars = |s: &str| s.chars().collect::<Vec<_>>();
        assert_eq!(levenshtein(&chars("chat"), &chars("chat")), 0);
        assert_eq!(levenshtein(&chars("chat"), &chars("chats")), 1);
        assert_eq!(levenshtein(&chars("tecorp"), &chars("techcorp")), 2);
        assert_eq!(levenshtein(&chars(""), &chars("abc")), 3);
    }

    // ── similarity ───────────────────────────────────────────────────────

    #[test]
    fn identical_after_normalization_scores_one() {
        assert!((similarity("TechCorp", "techcorp") - 1.0).abs() < f64::EPSILON);
        assert!((similarity("Société Générale", "societe generale") - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn substring_scores_length_ratio() {
        // "tech" inside "techcorp": 4 / 8.
        assert!((similarity("tech", "TechCorp") - 0.5).abs() < 1e-9);
    }

    #[test]
    fn typo_scores_by_edit_distance() {
        // 2 edits over 8 chars → 0.75.
        assert!((similarity("tecorp", "TechCorp") - 0.75).abs() < 1e-9);
    }

    #[test]
    fn empty_vs_non_empty_scores_zero() {
        assert!((similarity("", "TechCorp")).abs() < f64::EPSILON);
        assert!((similarity("", "") - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn similarity_is_symmetric() {
        let ab = similarity("innova", "Innovatech");
        let ba = similarity("Innovatech", "innova");
        assert!((ab - ba).abs() < f64::EPSILON);
    }

    // ── single-winner rule ───────────────────────────────────────────────

    #[test]
    fn finds_deal_despite_transcription_typo() {
        let deals = vec![
            deal("deal-1", "TechCorp"),
            deal("deal-2", "Innovatech"),
            deal("deal-3", "Global Sud"),
        ];
        let matcher = ItemMatcher::default();
        let found = matcher.find_deal(&deals, "tecorp");
        assert_eq!(found.map(|d| d.id.as_str()), Some("deal-1"));
    }

    #[test]
    fn near_tie_is_rejected_as_ambiguous() {
        // One edit away from both candidates: no safe winner.
        let deals = vec![deal("deal-1", "Altex"), deal("deal-2", "Altec")];
        let matcher = ItemMatcher::default();
        assert!(matcher.find_deal(&deals, "alteq").is_none());
        // The ranked list still exposes both for a clarification prompt.
        assert_eq!(matcher.find_deals(&deals, "alteq").len(), 2);
    }

    #[test]
    fn duplicate_names_are_ambiguous() {
        let deals = vec![deal("deal-1", "TechCorp"), deal("deal-2", "TechCorp")];
        let matcher = ItemMatcher::default();
        assert!(matcher.find_deal(&deals, "techcorp").is_none());
    }

    #[test]
    fn nothing_above_threshold_means_no_match() {
        let deals = vec![deal("deal-1", "TechCorp")];
        let matcher = ItemMatcher::default();
        assert!(matcher.find_deal(&deals, "boulangerie du coin").is_none());
        assert!(matcher.find_deal(&deals, "").is_none());
    }

    #[test]
    fn action_matches_on_title_or_contact() {
        let actions = vec![
            action("action-1", "Préparer la démo", "Martin"),
            action("action-2", "Envoyer le devis", "Lefèvre"),
        ];
        let matcher = ItemMatcher::default();
        let by_contact = matcher.find_action(&actions, "martin");
        assert_eq!(by_contact.map(|a| a.id.as_str()), Some("action-1"));
        let by_title = matcher.find_action(&actions, "envoyer le devis");
        assert_eq!(by_title.map(|a| a.id.as_str()), Some("action-2"));
    }

    #[test]
    fn ranked_results_are_sorted_best_first() {
        let deals = vec![deal("deal-1", "Innovatech"), deal("deal-2", "Innova")];
        let matcher = ItemMatcher::default();
        let ranked = matcher.find_deals(&deals, "innova");
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].item.id, "deal-2");
        assert!(ranked[0].score >= ranked[1].score);
    }
}
