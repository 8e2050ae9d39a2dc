//! CRM domain types and the store seam the orchestrator writes through.
//!
//! The pipeline never talks to a database directly: hosts implement
//! [`CrmStore`] over whatever persistence they have. [`MemoryStore`] is a
//! complete in-memory implementation for hosts without persistence and for
//! tests.

use crate::error::{Result, VoiceError};
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

/// Sales pipeline stage of a deal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DealStatus {
    Prospect,
    Proposal,
    Negotiation,
    Won,
    Lost,
}

impl DealStatus {
    /// French label used in spoken confirmations.
    pub fn label_fr(&self) -> &'static str {
        match self {
            Self::Prospect => "en prospection",
            Self::Proposal => "en proposition",
            Self::Negotiation => "en négociation",
            Self::Won => "gagnée",
            Self::Lost => "perdue",
        }
    }
}

/// Kind of follow-up action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Call,
    Email,
    Meeting,
    Task,
}

impl ActionType {
    /// French label used in spoken confirmations.
    pub fn label_fr(&self) -> &'static str {
        match self {
            Self::Call => "appel",
            Self::Email => "email",
            Self::Meeting => "rendez-vous",
            Self::Task => "tâche",
        }
    }
}

/// Action priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    /// French label used in spoken confirmations.
    pub fn label_fr(&self) -> &'static str {
        match self {
            Self::Low => "basse",
            Self::Medium => "moyenne",
            Self::High => "haute",
        }
    }
}

/// Completion state of an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Todo,
    Done,
}

/// A sales opportunity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deal {
    pub id: String,
    /// Client / company name. Also the fuzzy-match key.
    pub client: String,
    /// Expected value in euros.
    pub amount: f64,
    pub status: DealStatus,
    /// Win probability in percent (0–100).
    pub probability: u8,
    pub expected_close: NaiveDate,
}

/// A follow-up action item (call, email, meeting, task).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionItem {
    pub id: String,
    pub title: String,
    pub action_type: ActionType,
    /// Person to contact. Also a fuzzy-match key, alongside the title.
    pub contact: String,
    pub due_date: NaiveDate,
    /// Optional time of day ("14h30" style utterances).
    pub time: Option<NaiveTime>,
    pub priority: Priority,
    pub status: ActionStatus,
}

/// A deal under construction, before the user has confirmed it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DealDraft {
    pub client: String,
    pub amount: f64,
    pub status: DealStatus,
    pub probability: u8,
    pub expected_close: NaiveDate,
}

/// An action under construction, before the user has confirmed it.
///
/// `action_type` stays optional: validation refuses to commit a draft
/// whose kind was never stated or implied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionDraft {
    pub title: String,
    pub action_type: Option<ActionType>,
    pub contact: Option<String>,
    pub due_date: Option<NaiveDate>,
    pub time: Option<NaiveTime>,
    pub priority: Priority,
    pub status: ActionStatus,
}

/// Field-level changes to an existing deal. `None` means "leave as is".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DealPatch {
    pub client: Option<String>,
    pub amount: Option<f64>,
    pub status: Option<DealStatus>,
    pub probability: Option<u8>,
    pub expected_close: Option<NaiveDate>,
}

impl DealPatch {
    pub fn is_empty(&self) -> bool {
        self.client.is_none()
            && self.amount.is_none()
            && self.status.is_none()
            && self.probability.is_none()
            && self.expected_close.is_none()
    }
}

/// Field-level changes to an existing action. `None` means "leave as is".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionPatch {
    pub title: Option<String>,
    pub action_type: Option<ActionType>,
    pub contact: Option<String>,
    pub due_date: Option<NaiveDate>,
    pub time: Option<NaiveTime>,
    pub priority: Option<Priority>,
    pub status: Option<ActionStatus>,
}

impl ActionPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.action_type.is_none()
            && self.contact.is_none()
            && self.due_date.is_none()
            && self.time.is_none()
            && self.priority.is_none()
            && self.status.is_none()
    }
}

impl Deal {
    /// Apply a patch in place.
    pub fn apply(&mut self, patch: &DealPatch) {
        if let Some(client) = &patch.client {
            self.client = client.clone();
        }
        if let Some(amount) = patch.amount {
            self.amount = amount;
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(probability) = patch.probability {
            self.probability = probability;
        }
        if let Some(expected_close) = patch.expected_close {
            self.expected_close = expected_close;
        }
    }
}

impl ActionItem {
    /// Apply a patch in place.
    pub fn apply(&mut self, patch: &ActionPatch) {
        if let Some(title) = &patch.title {
            self.title = title.clone();
        }
        if let Some(action_type) = patch.action_type {
            self.action_type = action_type;
        }
        if let Some(contact) = &patch.contact {
            self.contact = contact.clone();
        }
        if let Some(due_date) = patch.due_date {
            self.due_date = due_date;
        }
        if let Some(time) = patch.time {
            self.time = Some(time);
        }
        if let Some(priority) = patch.priority {
            self.priority = priority;
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
    }
}

/// Storage seam the orchestrator commits confirmed commands through.
///
/// Reads return snapshots; the orchestrator never holds references into the
/// store across turns.
#[async_trait]
pub trait CrmStore: Send {
    /// Snapshot of all deals.
    async fn deals(&self) -> Result<Vec<Deal>>;

    /// Snapshot of all action items.
    async fn actions(&self) -> Result<Vec<ActionItem>>;

    /// Insert a freshly created deal.
    async fn insert_deal(&mut self, deal: Deal) -> Result<()>;

    /// Insert a freshly created action item.
    async fn insert_action(&mut self, action: ActionItem) -> Result<()>;

    /// Apply a patch to the deal with the given id.
    async fn update_deal(&mut self, id: &str, patch: &DealPatch) -> Result<()>;

    /// Apply a patch to the action with the given id.
    async fn update_action(&mut self, id: &str, patch: &ActionPatch) -> Result<()>;
}

/// In-memory [`CrmStore`] for hosts without persistence and for tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    deals: Vec<Deal>,
    actions: Vec<ActionItem>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with existing records (e.g. loaded by the host).
    pub fn with_records(deals: Vec<Deal>, actions: Vec<ActionItem>) -> Self {
        Self { deals, actions }
    }
}

#[async_trait]
impl CrmStore for MemoryStore {
    async fn deals(&self) -> Result<Vec<Deal>> {
        Ok(self.deals.clone())
    }

    async fn actions(&self) -> Result<Vec<ActionItem>> {
        Ok(self.actions.clone())
    }

    async fn insert_deal(&mut self, deal: Deal) -> Result<()> {
        self.deals.push(deal);
        Ok(())
    }

    async fn insert_action(&mut self, action: ActionItem) -> Result<()> {
        self.actions.push(action);
        Ok(())
    }

    async fn update_deal(&mut self, id: &str, patch: &DealPatch) -> Result<()> {
        let deal = self
            .deals
            .iter_mut()
            .find(|d| d.id == id)
            .ok_or_else(|| VoiceError::Store(format!("no deal with id {id}")))?;
        deal.apply(patch);
        Ok(())
    }

    async fn update_action(&mut self, id: &str, patch: &ActionPatch) -> Result<()> {
        let action = self
            .actions
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or_else(|| VoiceError::Store(format!("no action with id {id}")))?;
        action.apply(patch);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use chrono::NaiveDate;

    fn sample_deal(id: &str, client: &str) -> Deal {
        Deal {
            id: id.to_owned(),
            client: client.to_owned(),
            amount: 10_000.0,
            status: DealStatus::Prospect,
            probability: 50,
            expected_close: NaiveDate::from_ymd_opt(2026, 9, 1).unwrap(),
        }
    }

    // ── memory store ─────────────────────────────────────────────────────

    #[tokio::test]
    async fn insert_and_snapshot_deals() {
        let mut store = MemoryStore::new();
        store.insert_deal(sample_deal("deal-1", "TechCorp")).await.unwrap();
        let deals = store.deals().await.unwrap();
        assert_eq!(deals.len(), 1);
        assert_eq!(deals[0].client, "TechCorp");
    }

    #[tokio::test]
    async fn update_deal_applies_patch() {
        let mut store = MemoryStore::new();
        store.insert_deal(sample_deal("deal-1", "TechCorp")).await.unwrap();

        let patch = DealPatch {
            amount: Some(80_000.0),
            status: Some(DealStatus::Negotiation),
            ..Default::default()
        };
        store.update_deal("deal-1", &patch).await.unwrap();

        let deals = store.deals().await.unwrap();
        assert!((deals[0].amount - 80_000.0).abs() < f64::EPSILON);
        assert_eq!(deals[0].status, DealStatus::Negotiation);
        // Untouched fields survive.
        assert_eq!(deals[0].probability, 50);
    }

    #[tokio::test]
    async fn update_unknown_id_is_an_error() {
        let mut store = MemoryStore::new();
        let result = store.update_deal("deal-404", &DealPatch::default()).await;
        assert!(result.is_err());
    }

    // ── patches ──────────────────────────────────────────────────────────

    #[test]
    fn default_patches_are_empty() {
        assert!(DealPatch::default().is_empty());
        assert!(ActionPatch::default().is_empty());
        let patch = DealPatch {
            probability: Some(80),
            ..Default::default()
        };
        assert!(!patch.is_empty());
    }

    #[test]
    fn action_patch_applies_time_and_priority() {
        let mut action = ActionItem {
            id: "action-1".to_owned(),
            title: "Appeler Dupont".to_owned(),
            action_type: ActionType::Call,
            contact: "Dupont".to_owned(),
            due_date: NaiveDate::from_ymd_opt(2026, 8, 24).unwrap(),
            time: None,
            priority: Priority::Medium,
            status: ActionStatus::Todo,
        };
        let patch = ActionPatch {
            time: Some(NaiveTime::from_hms_opt(14, 30, 0).unwrap()),
            priority: Some(Priority::High),
            ..Default::default()
        };
        action.apply(&patch);
        assert_eq!(action.time, Some(NaiveTime::from_hms_opt(14, 30, 0).unwrap()));
        assert_eq!(action.priority, Priority::High);
        assert_eq!(action.title, "Appeler Dupont");
    }
}
