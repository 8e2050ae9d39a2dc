//! Conversational state machine between intent detection and the store.
//!
//! At most one command is ever in flight. A recognized create/update intent
//! becomes a [`PendingAction`] that is read back to the user; nothing touches
//! the store until an explicit confirmation. "Non, plutôt …" folds changes
//! into the pending command instead of starting over, and anything that is
//! not a CRM command is handed back to the host untouched.

use crate::crm::{
    ActionDraft, ActionItem, ActionPatch, CrmStore, Deal, DealDraft, DealPatch,
};
use crate::drafts::{
    self, action_draft, deal_draft, describe_action, describe_action_patch, describe_deal,
    describe_deal_patch, merge_action, merge_action_patch, merge_deal, merge_deal_patch,
    validate_action, validate_action_patch, validate_deal, validate_deal_patch,
};
use crate::error::{Result, VoiceError};
use crate::intent::{Intent, IntentDetector, IntentKind};
use crate::matcher::ItemMatcher;
use crate::normalize::normalize;
use chrono::{DateTime, Local, NaiveDate, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};

/// A store mutation waiting for the user's go-ahead.
#[derive(Debug, Clone, PartialEq)]
pub enum PendingCommand {
    CreateDeal(DealDraft),
    CreateAction(ActionDraft),
    UpdateDeal {
        id: String,
        client: String,
        patch: DealPatch,
    },
    UpdateAction {
        id: String,
        title: String,
        patch: ActionPatch,
    },
}

/// The command awaiting confirmation, with the prompt that proposed it.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingAction {
    pub command: PendingCommand,
    /// Last confirmation prompt spoken for this command.
    pub confirmation: String,
    /// Confidence of the intent that produced it.
    pub confidence: f32,
}

/// What a turn produced, with the text to speak back.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    /// A command awaits confirmation; the prompt asks for it.
    Proposed { prompt: String },
    /// The store was written; the message announces it.
    Committed { message: String },
    /// The pending command was dropped.
    Cancelled { message: String },
    /// Recoverable problem; the message is a question back to the user.
    Clarify { message: String },
    /// Not a CRM command. The host's assistant should answer it.
    Delegate,
}

impl TurnOutcome {
    /// Text to speak for this turn, if the pipeline produced any.
    pub fn reply(&self) -> Option<&str> {
        match self {
            Self::Proposed { prompt } => Some(prompt),
            Self::Committed { message }
            | Self::Cancelled { message }
            | Self::Clarify { message } => Some(message),
            Self::Delegate => None,
        }
    }
}

/// Where the conversation currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationStep {
    Greeting,
    Gathering,
    Confirming,
    Completed,
}

/// Per-conversation bookkeeping, reset with [`Orchestrator::reset`].
#[derive(Debug, Clone)]
pub struct ConversationState {
    pub step: ConversationStep,
    pub deals_created: u32,
    pub actions_created: u32,
    pub updates_applied: u32,
    pub started_at: DateTime<Local>,
    pub last_activity: DateTime<Local>,
}

impl ConversationState {
    fn new() -> Self {
        let now = Local::now();
        Self {
            step: ConversationStep::Greeting,
            deals_created: 0,
            actions_created: 0,
            updates_applied: 0,
            started_at: now,
            last_activity: now,
        }
    }
}

impl Default for ConversationState {
    fn default() -> Self {
        Self::new()
    }
}

/// Turns utterances into store writes, one confirmed command at a time.
pub struct Orchestrator {
    detector: IntentDetector,
    matcher: ItemMatcher,
    pending: Option<PendingAction>,
    state: ConversationState,
    seq: AtomicU64,
}

impl Orchestrator {
    pub fn new() -> Self {
        Self::with_matcher(ItemMatcher::default())
    }

    pub fn with_matcher(matcher: ItemMatcher) -> Self {
        Self {
            detector: IntentDetector::new(),
            matcher,
            pending: None,
            state: ConversationState::new(),
            seq: AtomicU64::new(0),
        }
    }

    /// The command currently awaiting confirmation, if any.
    pub fn pending(&self) -> Option<&PendingAction> {
        self.pending.as_ref()
    }

    pub fn state(&self) -> &ConversationState {
        &self.state
    }

    /// Drop any pending command and restart the conversation bookkeeping.
    pub fn reset(&mut self) {
        self.pending = None;
        self.state = ConversationState::new();
        info!("conversation reset");
    }

    /// Process one utterance, resolving relative dates against today.
    pub async fn handle(
        &mut self,
        utterance: &str,
        store: &mut dyn CrmStore,
    ) -> Result<TurnOutcome> {
        let today = Local::now().date_naive();
        self.handle_at(utterance, store, today).await
    }

    /// Process one utterance against an explicit reference day.
    pub async fn handle_at(
        &mut self,
        utterance: &str,
        store: &mut dyn CrmStore,
        today: NaiveDate,
    ) -> Result<TurnOutcome> {
        self.state.last_activity = Local::now();

        let intent = self.detector.detect_at(utterance, self.pending.is_some(), today);
        debug!(kind = ?intent.kind, confidence = intent.confidence, "intent detected");

        let outcome = match intent.kind {
            IntentKind::Confirm => self.confirm(store).await?,
            IntentKind::Cancel => self.cancel(),
            IntentKind::Modify => self.modify(&intent, today),
            IntentKind::CreateDeal => self.propose_deal(&intent, today),
            IntentKind::CreateAction => self.propose_action(&intent, today),
            IntentKind::UpdateDeal => self.propose_deal_update(&intent, store).await?,
            IntentKind::UpdateAction => self.propose_action_update(&intent, store, today).await?,
            IntentKind::Query => TurnOutcome::Delegate,
        };

        self.advance_step(&outcome);
        Ok(outcome)
    }

    // ── confirmation ─────────────────────────────────────────────────────

    async fn confirm(&mut self, store: &mut dyn CrmStore) -> Result<TurnOutcome> {
        let Some(pending) = self.pending.take() else {
            return Ok(TurnOutcome::Clarify {
                message: "Je n'ai rien à confirmer pour le moment.".to_owned(),
            });
        };

        let errors = match &pending.command {
            PendingCommand::CreateDeal(draft) => validate_deal(draft),
            PendingCommand::CreateAction(draft) => validate_action(draft),
            PendingCommand::UpdateDeal { patch, .. } => validate_deal_patch(patch),
            PendingCommand::UpdateAction { patch, .. } => validate_action_patch(patch),
        };
        if !errors.is_empty() {
            // Invalid drafts stay pending so the user can fix them by voice.
            self.pending = Some(pending);
            return Ok(TurnOutcome::Clarify {
                message: format!("Il me manque des informations. {}", errors.join(" ")),
            });
        }

        match self.write(pending.command.clone(), store).await {
            Ok(message) => {
                info!(message = %message, "command committed");
                Ok(TurnOutcome::Committed { message })
            }
            Err(err) => {
                warn!(error = %err, "store write failed, keeping the pending command");
                self.pending = Some(pending);
                Ok(TurnOutcome::Clarify {
                    message: "L'enregistrement a échoué. Dites « oui » pour réessayer, ou « non » pour annuler.".to_owned(),
                })
            }
        }
    }

    async fn write(&mut self, command: PendingCommand, store: &mut dyn CrmStore) -> Result<String> {
        match command {
            PendingCommand::CreateDeal(draft) => {
                let deal = Deal {
                    id: self.mint_id("deal"),
                    client: draft.client,
                    amount: draft.amount,
                    status: draft.status,
                    probability: draft.probability,
                    expected_close: draft.expected_close,
                };
                let client = deal.client.clone();
                store.insert_deal(deal).await?;
                self.state.deals_created += 1;
                Ok(format!("C'est fait ! L'opportunité {client} est créée."))
            }
            PendingCommand::CreateAction(draft) => {
                let (Some(action_type), Some(due_date)) = (draft.action_type, draft.due_date)
                else {
                    return Err(VoiceError::Session(
                        "incomplete action draft reached commit".to_owned(),
                    ));
                };
                let action = ActionItem {
                    id: self.mint_id("action"),
                    title: draft.title,
                    action_type,
                    contact: draft.contact.unwrap_or_default(),
                    due_date,
                    time: draft.time,
                    priority: draft.priority,
                    status: draft.status,
                };
                let title = action.title.clone();
                store.insert_action(action).await?;
                self.state.actions_created += 1;
                Ok(format!("C'est noté ! « {title} » est ajoutée à votre liste."))
            }
            PendingCommand::UpdateDeal { id, client, patch } => {
                store.update_deal(&id, &patch).await?;
                self.state.updates_applied += 1;
                Ok(format!("C'est fait ! L'opportunité {client} est mise à jour."))
            }
            PendingCommand::UpdateAction { id, title, patch } => {
                store.update_action(&id, &patch).await?;
                self.state.updates_applied += 1;
                Ok(format!("C'est fait ! « {title} » est mise à jour."))
            }
        }
    }

    fn mint_id(&self, prefix: &str) -> String {
        let millis = Utc::now().timestamp_millis();
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        format!("{prefix}-{millis}-{seq}")
    }

    // ── cancel / modify ──────────────────────────────────────────────────

    fn cancel(&mut self) -> TurnOutcome {
        if self.pending.take().is_some() {
            info!("pending command cancelled");
            TurnOutcome::Cancelled {
                message: "D'accord, j'annule.".to_owned(),
            }
        } else {
            TurnOutcome::Cancelled {
                message: "D'accord.".to_owned(),
            }
        }
    }

    fn modify(&mut self, intent: &Intent, today: NaiveDate) -> TurnOutcome {
        let Some(pending) = self.pending.as_mut() else {
            return TurnOutcome::Clarify {
                message: "Je n'ai rien à modifier pour le moment.".to_owned(),
            };
        };

        let prompt = match &mut pending.command {
            PendingCommand::CreateDeal(draft) => {
                merge_deal(draft, &intent.entities);
                deal_prompt(draft)
            }
            PendingCommand::CreateAction(draft) => {
                merge_action(draft, &intent.entities);
                action_prompt(draft, today)
            }
            PendingCommand::UpdateDeal { client, patch, .. } => {
                merge_deal_patch(patch, &intent.entities);
                patch_prompt(&describe_deal_patch(client, patch))
            }
            PendingCommand::UpdateAction { title, patch, .. } => {
                merge_action_patch(patch, &intent.entities);
                patch_prompt(&describe_action_patch(title, patch, today))
            }
        };
        pending.confirmation = prompt.clone();
        TurnOutcome::Proposed { prompt }
    }

    // ── proposals ────────────────────────────────────────────────────────

    fn propose_deal(&mut self, intent: &Intent, today: NaiveDate) -> TurnOutcome {
        if let Some(busy) = self.refuse_if_busy() {
            return busy;
        }
        let draft = deal_draft(&intent.entities, today);
        let prompt = deal_prompt(&draft);
        self.pending = Some(PendingAction {
            command: PendingCommand::CreateDeal(draft),
            confirmation: prompt.clone(),
            confidence: intent.confidence,
        });
        TurnOutcome::Proposed { prompt }
    }

    fn propose_action(&mut self, intent: &Intent, today: NaiveDate) -> TurnOutcome {
        if let Some(busy) = self.refuse_if_busy() {
            return busy;
        }
        let draft = action_draft(&intent.entities, today);
        let prompt = action_prompt(&draft, today);
        self.pending = Some(PendingAction {
            command: PendingCommand::CreateAction(draft),
            confirmation: prompt.clone(),
            confidence: intent.confidence,
        });
        TurnOutcome::Proposed { prompt }
    }

    async fn propose_deal_update(
        &mut self,
        intent: &Intent,
        store: &mut dyn CrmStore,
    ) -> Result<TurnOutcome> {
        if let Some(busy) = self.refuse_if_busy() {
            return Ok(busy);
        }
        let Some(target) = intent.target.as_deref() else {
            return Ok(TurnOutcome::Clarify {
                message: "De quelle opportunité parlez-vous ?".to_owned(),
            });
        };

        let deals = store.deals().await?;
        let Some(deal) = self.matcher.find_deal(&deals, target) else {
            return Ok(self.deal_lookup_failure(&deals, target));
        };

        let mut patch = drafts::deal_patch(&intent.entities);
        // The name that designated the deal is not a rename request.
        if patch
            .client
            .as_deref()
            .is_some_and(|c| normalize(c) == normalize(&deal.client))
        {
            patch.client = None;
        }
        if patch.is_empty() {
            return Ok(TurnOutcome::Clarify {
                message: format!("Que faut-il changer sur l'opportunité {} ?", deal.client),
            });
        }

        let prompt = patch_prompt(&describe_deal_patch(&deal.client, &patch));
        self.pending = Some(PendingAction {
            command: PendingCommand::UpdateDeal {
                id: deal.id.clone(),
                client: deal.client.clone(),
                patch,
            },
            confirmation: prompt.clone(),
            confidence: intent.confidence,
        });
        Ok(TurnOutcome::Proposed { prompt })
    }

    async fn propose_action_update(
        &mut self,
        intent: &Intent,
        store: &mut dyn CrmStore,
        today: NaiveDate,
    ) -> Result<TurnOutcome> {
        if let Some(busy) = self.refuse_if_busy() {
            return Ok(busy);
        }
        let Some(target) = intent.target.as_deref() else {
            return Ok(TurnOutcome::Clarify {
                message: "De quelle action parlez-vous ?".to_owned(),
            });
        };

        let actions = store.actions().await?;
        let Some(action) = self.matcher.find_action(&actions, target) else {
            return Ok(self.action_lookup_failure(&actions, target));
        };

        let mut patch = drafts::action_patch(&intent.entities);
        if patch
            .contact
            .as_deref()
            .is_some_and(|c| normalize(c) == normalize(&action.contact))
        {
            patch.contact = None;
        }
        // Restating the kind of the action ("décale le rendez-vous…") is not
        // a change either.
        if patch.action_type == Some(action.action_type) {
            patch.action_type = None;
        }
        if patch.is_empty() {
            return Ok(TurnOutcome::Clarify {
                message: format!("Que faut-il changer sur « {} » ?", action.title),
            });
        }

        let prompt = patch_prompt(&describe_action_patch(&action.title, &patch, today));
        self.pending = Some(PendingAction {
            command: PendingCommand::UpdateAction {
                id: action.id.clone(),
                title: action.title.clone(),
                patch,
            },
            confirmation: prompt.clone(),
            confidence: intent.confidence,
        });
        Ok(TurnOutcome::Proposed { prompt })
    }

    fn deal_lookup_failure(&self, deals: &[Deal], target: &str) -> TurnOutcome {
        let candidates = self.matcher.find_deals(deals, target);
        if candidates.len() >= 2 {
            let names: Vec<&str> = candidates.iter().map(|c| c.item.client.as_str()).collect();
            TurnOutcome::Clarify {
                message: format!(
                    "Plusieurs opportunités correspondent à « {target} » : {}. Laquelle ?",
                    names.join(", ")
                ),
            }
        } else {
            TurnOutcome::Clarify {
                message: format!("Je n'ai pas trouvé d'opportunité pour « {target} »."),
            }
        }
    }

    fn action_lookup_failure(&self, actions: &[ActionItem], target: &str) -> TurnOutcome {
        let candidates = self.matcher.find_actions(actions, target);
        if candidates.len() >= 2 {
            let titles: Vec<&str> = candidates.iter().map(|c| c.item.title.as_str()).collect();
            TurnOutcome::Clarify {
                message: format!(
                    "Plusieurs actions correspondent à « {target} » : {}. Laquelle ?",
                    titles.join(", ")
                ),
            }
        } else {
            TurnOutcome::Clarify {
                message: format!("Je n'ai pas trouvé d'action pour « {target} »."),
            }
        }
    }

    // One command at a time: a new record command while another awaits
    // confirmation is refused, and the pending one is kept.
    fn refuse_if_busy(&self) -> Option<TurnOutcome> {
        self.pending.as_ref().map(|pending| TurnOutcome::Clarify {
            message: format!(
                "Une commande est déjà en attente : {} Dites « oui » pour la valider ou « non » pour l'abandonner.",
                pending.confirmation
            ),
        })
    }

    fn advance_step(&mut self, outcome: &TurnOutcome) {
        self.state.step = match outcome {
            TurnOutcome::Proposed { .. } => ConversationStep::Confirming,
            TurnOutcome::Committed { .. } => ConversationStep::Completed,
            TurnOutcome::Cancelled { .. } => ConversationStep::Gathering,
            TurnOutcome::Clarify { .. } if self.pending.is_some() => ConversationStep::Confirming,
            TurnOutcome::Clarify { .. } => ConversationStep::Gathering,
            TurnOutcome::Delegate => self.state.step,
        };
    }
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new()
    }
}

fn deal_prompt(draft: &DealDraft) -> String {
    format!("{}. Dois-je créer cette opportunité ?", describe_deal(draft))
}

fn action_prompt(draft: &ActionDraft, today: NaiveDate) -> String {
    format!("{}. Dois-je créer cette action ?", describe_action(draft, today))
}

fn patch_prompt(description: &str) -> String {
    format!("{description}. Dois-je appliquer ces modifications ?")
}
