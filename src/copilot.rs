//! Ties the pipeline together: orchestrated commands, chat fallback for
//! everything else, and replies fed back to the session for synthesis.

use crate::crm::CrmStore;
use crate::error::Result;
use crate::orchestrator::{Orchestrator, TurnOutcome};
use crate::session::SessionHandle;
use crate::speakable::clean_for_speech;
use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// The host's conversational assistant, asked whenever an utterance is not a
/// CRM command.
#[async_trait]
pub trait ChatDelegate: Send {
    /// Answer `utterance`. May return Markdown; replies are flattened for
    /// speech before synthesis.
    async fn answer(&mut self, utterance: &str) -> anyhow::Result<String>;
}

/// A complete voice copilot: command pipeline plus chat fallback.
pub struct Copilot<S, C> {
    orchestrator: Orchestrator,
    store: S,
    chat: C,
}

impl<S, C> Copilot<S, C>
where
    S: CrmStore,
    C: ChatDelegate,
{
    pub fn new(store: S, chat: C) -> Self {
        Self::with_orchestrator(Orchestrator::new(), store, chat)
    }

    pub fn with_orchestrator(orchestrator: Orchestrator, store: S, chat: C) -> Self {
        Self {
            orchestrator,
            store,
            chat,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Handle one utterance and produce the full reply text for synthesis.
    pub async fn respond(&mut self, utterance: &str) -> Result<String> {
        let outcome = self.orchestrator.handle(utterance, &mut self.store).await?;
        match outcome {
            TurnOutcome::Delegate => {
                debug!("delegating to the chat assistant");
                match self.chat.answer(utterance).await {
                    Ok(markdown) => Ok(clean_for_speech(&markdown)),
                    Err(err) => {
                        warn!(error = %err, "chat delegate failed");
                        Ok("Je n'ai pas pu obtenir de réponse. Pouvez-vous reformuler ?".to_owned())
                    }
                }
            }
            other => Ok(other.reply().map(str::to_owned).unwrap_or_default()),
        }
    }

    /// Answer every captured utterance through `session` until cancelled or
    /// the utterance stream closes.
    pub async fn run(
        mut self,
        session: SessionHandle,
        mut utterances: mpsc::Receiver<String>,
        cancel: CancellationToken,
    ) {
        info!("copilot loop running");
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                utterance = utterances.recv() => match utterance {
                    Some(utterance) => {
                        debug!(text = %utterance, "utterance received");
                        match self.respond(&utterance).await {
                            Ok(reply) if !reply.is_empty() => session.speak(reply),
                            Ok(_) => {}
                            Err(err) => {
                                warn!(error = %err, "turn failed");
                                session.speak("Une erreur est survenue. Pouvez-vous répéter ?");
                            }
                        }
                    }
                    None => break,
                },
            }
        }
        info!("copilot loop stopped");
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use crate::crm::MemoryStore;

    struct MarkdownChat;

    #[async_trait]
    impl ChatDelegate for MarkdownChat {
        async fn answer(&mut self, utterance: &str) -> anyhow::Result<String> {
            Ok(format!("**Réponse :** {utterance}"))
        }
    }

    struct OfflineChat;

    #[async_trait]
    impl ChatDelegate for OfflineChat {
        async fn answer(&mut self, _utterance: &str) -> anyhow::Result<String> {
            Err(anyhow::anyhow!("backend offline"))
        }
    }

    #[tokio::test]
    async fn commands_are_answered_by_the_orchestrator() {
        let mut copilot = Copilot::new(MemoryStore::new(), MarkdownChat);
        let reply = copilot
            .respond("Crée une opportunité avec TechCorp pour 50 000 euros")
            .await
            .unwrap();
        assert!(reply.contains("TechCorp"), "reply: {reply}");
        assert!(reply.contains("Dois-je créer"), "reply: {reply}");

        let reply = copilot.respond("oui").await.unwrap();
        assert!(reply.contains("C'est fait"), "reply: {reply}");
        assert_eq!(copilot.store().deals().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn questions_go_to_the_chat_delegate_and_lose_markdown() {
        let mut copilot = Copilot::new(MemoryStore::new(), MarkdownChat);
        let reply = copilot
            .respond("quel est le pipeline de ce trimestre")
            .await
            .unwrap();
        assert!(!reply.contains("**"), "reply: {reply}");
        assert!(reply.contains("Réponse :"), "reply: {reply}");
    }

    #[tokio::test]
    async fn chat_failure_degrades_to_a_spoken_apology() {
        let mut copilot = Copilot::new(MemoryStore::new(), OfflineChat);
        let reply = copilot.respond("bonjour").await.unwrap();
        assert!(reply.contains("reformuler"), "reply: {reply}");
    }
}
