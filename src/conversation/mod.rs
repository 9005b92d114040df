//! Per-buyer dialogue that collects a delivery target and an explicit
//! confirmation before anything is bought from the vendor.

pub mod target;

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::entries::{currency::format_number, prelude::*};
use target::{TargetError, TargetKind};

pub mod prelude {
    pub use super::{
        target::{TargetError, TargetKind},
        Conversation, ConversationStore, OrderTerms, Phase, Step,
    };
}

const CONFIRM: [&str; 3] = ["+", "«+»", "\"+\""];
const REJECT: &str = "-";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    AwaitingTarget,
    AwaitingConfirmation,
    Fulfilling,
    Terminal,
}

/// What was bought, fixed when the order arrives.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderTerms {
    pub quantity: f64,
    pub currency: Currency,
    pub price: f64,
    pub lot: LotMapping,
}

impl OrderTerms {
    pub fn amount_text(&self) -> String {
        if self.lot.convert_currency {
            self.currency.format_amount(self.quantity)
        } else {
            format_number(self.quantity)
        }
    }

    pub fn target_kind(&self) -> &TargetKind {
        &self.lot.target
    }
}

/// Outcome of feeding one buyer message into a conversation.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// Text did not validate as a target; nothing changed.
    Rejected(TargetError),
    /// A target was stored or replaced and must be confirmed.
    PromptConfirmation,
    /// Unrecognized text while waiting for confirmation.
    Reprompt,
    TargetCleared,
    /// The conversation moved to `Fulfilling`; the caller owns the vendor call.
    Fulfil,
    Ignored,
}

#[derive(Debug, Clone)]
pub struct Conversation {
    pub order_id: OrderId,
    pub chat: MarketChat,
    pub buyer_id: BuyerId,
    pub buyer_username: String,
    pub terms: OrderTerms,
    pub created_at: DateTime<Utc>,
    phase: Phase,
    target: Option<String>,
}

impl Conversation {
    pub fn new(
        order_id: OrderId,
        chat: MarketChat,
        buyer_id: BuyerId,
        buyer_username: String,
        terms: OrderTerms,
    ) -> Self {
        Self {
            order_id,
            chat,
            buyer_id,
            buyer_username,
            terms,
            created_at: Utc::now(),
            phase: Phase::AwaitingTarget,
            target: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }

    pub fn step(&mut self, text: &str, confirmation_required: bool) -> Step {
        let text = text.trim();
        let kind = self.terms.lot.target.clone();

        match self.phase {
            Phase::AwaitingTarget => match kind.validate(text) {
                Ok(target) => {
                    self.target = Some(target);
                    if confirmation_required {
                        self.phase = Phase::AwaitingConfirmation;
                        Step::PromptConfirmation
                    } else {
                        self.phase = Phase::Fulfilling;
                        Step::Fulfil
                    }
                }
                Err(e) => Step::Rejected(e),
            },
            Phase::AwaitingConfirmation => {
                if CONFIRM.contains(&text) {
                    self.phase = Phase::Fulfilling;
                    Step::Fulfil
                } else if text == REJECT {
                    self.target = None;
                    self.phase = Phase::AwaitingTarget;
                    Step::TargetCleared
                } else if let Ok(target) = kind.validate(text) {
                    self.target = Some(target);
                    Step::PromptConfirmation
                } else {
                    Step::Reprompt
                }
            }
            Phase::Fulfilling | Phase::Terminal => Step::Ignored,
        }
    }

    /// The vendor rejected the target; the buyer has to send another one.
    pub fn retry_target(&mut self) {
        if self.phase == Phase::Fulfilling {
            self.target = None;
            self.phase = Phase::AwaitingTarget;
        }
    }

    pub fn finish(&mut self) {
        self.phase = Phase::Terminal;
    }
}

pub type ConversationKey = (MarketChat, BuyerId);

/// Live conversations, at most one per chat and buyer.
#[derive(Default)]
pub struct ConversationStore {
    entries: HashMap<ConversationKey, Conversation>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `conv`, returning the conversation it displaced.
    pub fn insert(&mut self, conv: Conversation) -> Option<Conversation> {
        self.entries
            .insert((conv.chat.clone(), conv.buyer_id), conv)
    }

    pub fn get(&self, chat: &str, buyer: BuyerId) -> Option<&Conversation> {
        self.entries.get(&(chat.to_owned(), buyer))
    }

    pub fn get_mut(&mut self, chat: &str, buyer: BuyerId) -> Option<&mut Conversation> {
        self.entries.get_mut(&(chat.to_owned(), buyer))
    }

    pub fn remove(&mut self, chat: &str, buyer: BuyerId) -> Option<Conversation> {
        self.entries.remove(&(chat.to_owned(), buyer)).map(|mut conv| {
            conv.finish();
            conv
        })
    }

    pub fn by_order(&self, order_id: &str) -> Option<&Conversation> {
        self.entries.values().find(|c| c.order_id == order_id)
    }

    pub fn by_order_mut(&mut self, order_id: &str) -> Option<&mut Conversation> {
        self.entries.values_mut().find(|c| c.order_id == order_id)
    }

    pub fn remove_order(&mut self, order_id: &str) -> Option<Conversation> {
        let key = self
            .entries
            .iter()
            .find(|(_, c)| c.order_id == order_id)
            .map(|(key, _)| key.clone())?;
        self.remove(&key.0, key.1)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn terms() -> OrderTerms {
        OrderTerms {
            quantity: 100.0,
            currency: Currency::RUB,
            price: 110.0,
            lot: LotMapping {
                name: "Steam".to_owned(),
                service_id: 1,
                quantity: 1.0,
                target: TargetKind::SteamLogin,
                convert_currency: true,
                target_field: None,
            },
        }
    }

    fn conv() -> Conversation {
        Conversation::new(
            "12345".to_owned(),
            "chat-1".to_owned(),
            7,
            "buyer".to_owned(),
            terms(),
        )
    }

    #[test]
    fn valid_target_moves_to_confirmation() {
        let mut c = conv();
        assert_eq!(c.step("myrobloxlogin123", true), Step::PromptConfirmation);
        assert_eq!(c.phase(), Phase::AwaitingConfirmation);
        assert_eq!(c.target(), Some("myrobloxlogin123"));
        assert_eq!(c.terms.amount_text(), "100 RUB");
    }

    #[test]
    fn fractional_amounts_are_shown_as_charged() {
        let mut t = terms();
        t.quantity = 25.7;
        assert_eq!(t.amount_text(), "25.7 RUB");

        t.lot.convert_currency = false;
        t.quantity = 1.5;
        assert_eq!(t.amount_text(), "1.5");
        t.quantity = 1000.0;
        assert_eq!(t.amount_text(), "1000");
    }

    #[test]
    fn invalid_target_stays() {
        let mut c = conv();
        assert!(matches!(c.step("not a login!", true), Step::Rejected(_)));
        assert_eq!(c.phase(), Phase::AwaitingTarget);
        assert_eq!(c.target(), None);
    }

    #[test]
    fn skip_confirmation() {
        let mut c = conv();
        assert_eq!(c.step("login", false), Step::Fulfil);
        assert_eq!(c.phase(), Phase::Fulfilling);
    }

    #[test]
    fn confirmation_variants() {
        for confirm in ["+", "«+»", " + "] {
            let mut c = conv();
            c.step("login", true);
            assert_eq!(c.step(confirm, true), Step::Fulfil);
            assert_eq!(c.phase(), Phase::Fulfilling);
        }
    }

    #[test]
    fn minus_clears_target() {
        let mut c = conv();
        c.step("login", true);
        assert_eq!(c.step("-", true), Step::TargetCleared);
        assert_eq!(c.phase(), Phase::AwaitingTarget);
        assert_eq!(c.target(), None);
    }

    #[test]
    fn new_target_replaces_without_phase_change() {
        let mut c = conv();
        c.step("first", true);
        assert_eq!(c.step("second", true), Step::PromptConfirmation);
        assert_eq!(c.phase(), Phase::AwaitingConfirmation);
        assert_eq!(c.target(), Some("second"));

        assert_eq!(c.step("what??", true), Step::Reprompt);
        assert_eq!(c.target(), Some("second"));
    }

    #[test]
    fn fulfilling_is_not_reentrant() {
        let mut c = conv();
        c.step("login", true);
        c.step("+", true);
        assert_eq!(c.step("+", true), Step::Ignored);
        assert_eq!(c.step("other", true), Step::Ignored);

        c.retry_target();
        assert_eq!(c.phase(), Phase::AwaitingTarget);
        assert_eq!(c.target(), None);
    }

    #[test]
    fn store_is_keyed_by_chat_and_buyer() {
        let mut store = ConversationStore::new();
        assert!(store.insert(conv()).is_none());

        let mut other = conv();
        other.order_id = "999".to_owned();
        let displaced = store.insert(other).unwrap();
        assert_eq!(displaced.order_id, "12345");
        assert_eq!(store.len(), 1);

        assert!(store.get("chat-1", 8).is_none());
        assert!(store.by_order("999").is_some());

        let removed = store.remove_order("999").unwrap();
        assert_eq!(removed.phase(), Phase::Terminal);
        assert!(store.is_empty());
        assert!(store.remove_order("999").is_none());
    }
}
