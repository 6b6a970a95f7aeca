//! Inbound message classification.
//!
//! A [`Classifier`] is an ordered chain of named [`ExtractionStrategy`]s.
//! Each strategy looks at the same message and reports an [`Outcome`];
//! the first [`Outcome::Matched`] ends the search.

mod strategies;

pub use strategies::{DeliveryStatus, FailedRecipientsHeader, Qmail, ReplyFooter};

use crate::Result;
use crate::mailbox::Message;
use crate::store::EventKind;
use tracing::{debug, trace};

/// Why a message could not be classified.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClassifyError {
    /// Neither a plain-text nor an HTML body with content.
    #[error("no parseable body")]
    NoParseableBody,

    /// A body was found but no address in it.
    #[error("no parseable address")]
    NoParseableAddress,

    /// Every failure strategy came up empty.
    #[error("no undeliverable address found")]
    NoUndeliverableAddress,

    /// A part body was not valid base64.
    #[error("undecodable part body: {0}")]
    Decode(String),
}

impl From<mailcast_mime::Error> for ClassifyError {
    fn from(err: mailcast_mime::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

/// Result of one strategy on one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Found the affected address.
    Matched(String),
    /// Not applicable; the next strategy is tried.
    NoMatch,
    /// Applicable but failed.
    Error(ClassifyError),
}

/// One way of finding the affected address in a message.
pub trait ExtractionStrategy: Send + Sync {
    /// Short name used in logs and reports.
    fn name(&self) -> &'static str;

    /// Looks for the address.
    fn extract(&self, message: &Message) -> Outcome;
}

/// A successful classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    /// Event to record.
    pub kind: EventKind,
    /// Address the event applies to, as extracted.
    pub address: String,
    /// Strategy that matched.
    pub strategy: &'static str,
}

/// Ordered strategy chain for one event kind.
pub struct Classifier {
    kind: EventKind,
    strategies: Vec<Box<dyn ExtractionStrategy>>,
}

impl Classifier {
    /// Creates an empty chain.
    #[must_use]
    pub fn new(kind: EventKind) -> Self {
        Self {
            kind,
            strategies: Vec::new(),
        }
    }

    /// Appends a strategy to the chain.
    #[must_use]
    pub fn with_strategy(mut self, strategy: impl ExtractionStrategy + 'static) -> Self {
        self.strategies.push(Box::new(strategy));
        self
    }

    /// The unsubscribe chain: the reply footer only.
    ///
    /// # Errors
    ///
    /// Returns an error if a pattern fails to compile.
    pub fn unsubscribe() -> Result<Self> {
        Ok(Self::new(EventKind::Unsubscribe).with_strategy(ReplyFooter::new()?))
    }

    /// The delivery-failure chain: header, delivery-status report, qmail.
    ///
    /// # Errors
    ///
    /// Returns an error if a pattern fails to compile.
    pub fn undeliverable() -> Result<Self> {
        Ok(Self::new(EventKind::Fail)
            .with_strategy(FailedRecipientsHeader)
            .with_strategy(DeliveryStatus::new()?)
            .with_strategy(Qmail::new()?))
    }

    /// Event kind this chain reports.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        self.kind
    }

    /// Strategy names in chain order.
    #[must_use]
    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Runs the chain.
    ///
    /// # Errors
    ///
    /// When nothing matched, returns the first strategy error, or
    /// [`ClassifyError::NoParseableAddress`] (unsubscribe) /
    /// [`ClassifyError::NoUndeliverableAddress`] (fail) if no strategy
    /// errored.
    pub fn classify(&self, message: &Message) -> std::result::Result<Classification, ClassifyError> {
        let mut first_error = None;
        for strategy in &self.strategies {
            match strategy.extract(message) {
                Outcome::Matched(address) => {
                    debug!(message = %message.id, strategy = strategy.name(), %address, "matched");
                    return Ok(Classification {
                        kind: self.kind,
                        address,
                        strategy: strategy.name(),
                    });
                }
                Outcome::NoMatch => {
                    trace!(message = %message.id, strategy = strategy.name(), "no match");
                }
                Outcome::Error(e) => {
                    debug!(message = %message.id, strategy = strategy.name(), error = %e, "strategy failed");
                    first_error.get_or_insert(e);
                }
            }
        }
        Err(first_error.unwrap_or(match self.kind {
            EventKind::Unsubscribe => ClassifyError::NoParseableAddress,
            EventKind::Fail => ClassifyError::NoUndeliverableAddress,
        }))
    }
}

impl std::fmt::Debug for Classifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Classifier")
            .field("kind", &self.kind)
            .field("strategies", &self.strategy_names())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use mailcast_mime::Part;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Fixed {
        name: &'static str,
        outcome: Outcome,
        calls: Arc<AtomicUsize>,
    }

    impl ExtractionStrategy for Fixed {
        fn name(&self) -> &'static str {
            self.name
        }

        fn extract(&self, _message: &Message) -> Outcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.outcome.clone()
        }
    }

    fn fixed(name: &'static str, outcome: Outcome) -> (Fixed, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Fixed {
                name,
                outcome,
                calls: Arc::clone(&calls),
            },
            calls,
        )
    }

    fn message(payload: Part) -> Message {
        Message {
            id: "m1".into(),
            payload,
            ..Message::default()
        }
    }

    #[test]
    fn stops_at_first_match() {
        let (a, a_calls) = fixed("a", Outcome::NoMatch);
        let (b, b_calls) = fixed("b", Outcome::Matched("x@example.com".into()));
        let (c, c_calls) = fixed("c", Outcome::Matched("y@example.com".into()));
        let chain = Classifier::new(EventKind::Fail)
            .with_strategy(a)
            .with_strategy(b)
            .with_strategy(c);

        let result = chain.classify(&Message::default()).unwrap();
        assert_eq!(result.address, "x@example.com");
        assert_eq!(result.strategy, "b");
        assert_eq!(
            [a_calls, b_calls, c_calls].map(|c| c.load(Ordering::SeqCst)),
            [1, 1, 0]
        );
    }

    #[test]
    fn errors_do_not_stop_the_chain() {
        let (a, _) = fixed("a", Outcome::Error(ClassifyError::Decode("bad".into())));
        let (b, _) = fixed("b", Outcome::Matched("x@example.com".into()));
        let chain = Classifier::new(EventKind::Fail).with_strategy(a).with_strategy(b);
        assert_eq!(chain.classify(&Message::default()).unwrap().strategy, "b");
    }

    #[test]
    fn exhausted_chain_reports_first_error_or_kind_default() {
        let (a, _) = fixed("a", Outcome::NoMatch);
        let (b, _) = fixed("b", Outcome::Error(ClassifyError::Decode("bad".into())));
        let chain = Classifier::new(EventKind::Fail).with_strategy(a).with_strategy(b);
        assert_eq!(
            chain.classify(&Message::default()).unwrap_err(),
            ClassifyError::Decode("bad".into())
        );

        let empty = Classifier::new(EventKind::Fail);
        assert_eq!(
            empty.classify(&Message::default()).unwrap_err(),
            ClassifyError::NoUndeliverableAddress
        );
    }

    #[test]
    fn failure_chain_order() {
        let chain = Classifier::undeliverable().unwrap();
        assert_eq!(
            chain.strategy_names(),
            vec![FailedRecipientsHeader::NAME, DeliveryStatus::NAME, Qmail::NAME]
        );

        // Header wins over the report.
        let both = message(
            Part::container(
                "multipart/report",
                vec![
                    Part::leaf("text/plain", b"failed"),
                    Part::leaf(
                        "message/delivery-status",
                        b"Action: failed\nFinal-Recipient: rfc822; <bob@example.org>",
                    ),
                ],
            )
            .with_header("X-Failed-Recipients", "alice@example.org"),
        );
        let result = chain.classify(&both).unwrap();
        assert_eq!(
            (result.kind, result.address.as_str(), result.strategy),
            (EventKind::Fail, "alice@example.org", FailedRecipientsHeader::NAME)
        );
    }

    #[test]
    fn failure_chain_falls_through_to_qmail() {
        let chain = Classifier::undeliverable().unwrap();
        let qmail = message(Part::leaf(
            "text/plain",
            b"Hi. This is the qmail-send program at mx.example.net.\n\n<carol@example.net>: does not exist\n",
        ));
        assert_eq!(chain.classify(&qmail).unwrap().strategy, Qmail::NAME);

        let chatter = message(Part::leaf("text/plain", b"thanks for the newsletter"));
        assert_eq!(
            chain.classify(&chatter).unwrap_err(),
            ClassifyError::NoUndeliverableAddress
        );
    }

    #[test]
    fn unsubscribe_chain_errors_are_explicit() {
        let chain = Classifier::unsubscribe().unwrap();
        assert_eq!(chain.kind(), EventKind::Unsubscribe);

        let ok = message(Part::leaf(
            "text/plain",
            b"This email was sent to Jane Doe (jane@example.com) because...",
        ));
        assert_eq!(chain.classify(&ok).unwrap().address, "jane@example.com");

        let attachment_only = message(Part::leaf("application/pdf", b"%PDF"));
        assert_eq!(
            chain.classify(&attachment_only).unwrap_err(),
            ClassifyError::NoParseableBody
        );
    }
}
