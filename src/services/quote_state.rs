use chrono::{DateTime, Utc};
use strum::IntoEnumIterator;
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::models::quote::{Quote, QuoteEvent, QuoteStatus};

/// A status-changing request against a single quote.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum QuoteCommand {
    Send,
    Accept,
    Reject { reason: Option<String> },
    Cancel,
    Convert { sales_order_id: Uuid },
}

impl QuoteCommand {
    pub fn event(&self) -> QuoteEvent {
        match self {
            QuoteCommand::Send => QuoteEvent::Send,
            QuoteCommand::Accept => QuoteEvent::Accept,
            QuoteCommand::Reject { .. } => QuoteEvent::Reject,
            QuoteCommand::Cancel => QuoteEvent::Cancel,
            QuoteCommand::Convert { .. } => QuoteEvent::Convert,
        }
    }
}

/// Outcome of an applied command.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Transition {
    pub event: QuoteEvent,
    pub from: QuoteStatus,
    pub to: QuoteStatus,
    /// False only for a resend, which leaves the quote untouched.
    pub changed: bool,
}

/// Single authority over quote status. Every status change, and every "which actions
/// are allowed" answer, is derived from [`QuoteStateMachine::target`].
pub struct QuoteStateMachine;

impl QuoteStateMachine {
    /// The transition table. `Duplicate` targets the status of the new copy.
    pub fn target(from: QuoteStatus, event: QuoteEvent) -> Option<QuoteStatus> {
        use QuoteStatus::*;

        match (event, from) {
            (QuoteEvent::Send, Draft | Sent) => Some(Sent),
            (QuoteEvent::Accept, Draft | Sent) => Some(Accepted),
            (QuoteEvent::Reject, Draft | Sent) => Some(Rejected),
            (QuoteEvent::Cancel, Draft | Sent | Accepted) => Some(Cancelled),
            (QuoteEvent::Convert, Accepted) => Some(Converted),
            (QuoteEvent::Duplicate, Draft | Sent | Accepted) => Some(Draft),
            _ => None,
        }
    }

    /// Checks the table and the guards without touching the quote.
    pub fn check(quote: &Quote, event: QuoteEvent) -> Result<QuoteStatus, ServiceError> {
        let to = Self::target(quote.status, event).ok_or(ServiceError::IllegalTransition {
            from: quote.status,
            event,
        })?;

        match event {
            QuoteEvent::Send if quote.status == QuoteStatus::Draft && quote.lines.is_empty() => {
                Err(ServiceError::EmptyQuote(quote.id))
            }
            QuoteEvent::Convert if quote.sales_order_id.is_some() => {
                Err(ServiceError::NotConvertible(
                    quote.id,
                    "already linked to a sales order".to_string(),
                ))
            }
            QuoteEvent::Convert if quote.lines.is_empty() => {
                Err(ServiceError::EmptyQuote(quote.id))
            }
            _ => Ok(to),
        }
    }

    /// Applies `command` to `quote`. On error the quote is left exactly as it was.
    pub fn apply(
        quote: &mut Quote,
        command: QuoteCommand,
        now: DateTime<Utc>,
    ) -> Result<Transition, ServiceError> {
        let event = command.event();
        let from = quote.status;
        let to = Self::check(quote, event)?;

        let changed = from != to;
        match command {
            QuoteCommand::Send => {
                if changed {
                    quote.sent_at.get_or_insert(now);
                }
            }
            QuoteCommand::Accept => {
                quote.accepted_at.get_or_insert(now);
            }
            QuoteCommand::Reject { reason } => {
                quote.rejected_at.get_or_insert(now);
                quote.rejection_reason = reason
                    .map(|text| text.trim().to_string())
                    .filter(|text| !text.is_empty());
            }
            QuoteCommand::Cancel => {}
            QuoteCommand::Convert { sales_order_id } => {
                quote.sales_order_id = Some(sales_order_id);
                quote.converted_at.get_or_insert(now);
            }
        }
        quote.status = to;

        Ok(Transition {
            event,
            from,
            to,
            changed,
        })
    }

    /// Undoes a committed conversion whose sales order could not be finalized.
    pub fn revert_conversion(quote: &mut Quote, sales_order_id: Uuid) -> Result<(), ServiceError> {
        if quote.status != QuoteStatus::Converted || quote.sales_order_id != Some(sales_order_id) {
            return Err(ServiceError::InvalidState(format!(
                "quote {} is not converted to sales order {}",
                quote.id, sales_order_id
            )));
        }
        quote.status = QuoteStatus::Accepted;
        quote.sales_order_id = None;
        quote.converted_at = None;
        Ok(())
    }

    /// Events currently legal for the quote, guards included.
    pub fn available_events(quote: &Quote) -> Vec<QuoteEvent> {
        QuoteEvent::iter()
            .filter(|event| Self::check(quote, *event).is_ok())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::quote::{NewLineItem, QuoteDraft};
    use assert_matches::assert_matches;
    use rstest::rstest;
    use rust_decimal_macros::dec;

    fn quote_in(status: QuoteStatus, with_lines: bool) -> Quote {
        let now = Utc::now();
        let lines = if with_lines {
            vec![NewLineItem {
                product_id: Uuid::new_v4(),
                description: None,
                quantity: dec!(1),
                unit_price: dec!(100),
                discount_amount: None,
                tax_amount: None,
            }]
        } else {
            Vec::new()
        };
        let mut quote = Quote::new(
            Uuid::new_v4(),
            QuoteDraft {
                quote_number: "QT-TEST".into(),
                contact_id: Uuid::new_v4(),
                currency: "USD".into(),
                quote_date: now.date_naive(),
                valid_until: None,
                estimated_eta: None,
                notes: None,
                lines,
            },
            now,
        )
        .unwrap();
        quote.status = status;
        quote
    }

    #[rstest]
    #[case(QuoteStatus::Draft, QuoteEvent::Send, Some(QuoteStatus::Sent))]
    #[case(QuoteStatus::Sent, QuoteEvent::Send, Some(QuoteStatus::Sent))]
    #[case(QuoteStatus::Draft, QuoteEvent::Accept, Some(QuoteStatus::Accepted))]
    #[case(QuoteStatus::Sent, QuoteEvent::Accept, Some(QuoteStatus::Accepted))]
    #[case(QuoteStatus::Draft, QuoteEvent::Reject, Some(QuoteStatus::Rejected))]
    #[case(QuoteStatus::Sent, QuoteEvent::Reject, Some(QuoteStatus::Rejected))]
    #[case(QuoteStatus::Accepted, QuoteEvent::Cancel, Some(QuoteStatus::Cancelled))]
    #[case(QuoteStatus::Accepted, QuoteEvent::Convert, Some(QuoteStatus::Converted))]
    #[case(QuoteStatus::Accepted, QuoteEvent::Send, None)]
    #[case(QuoteStatus::Accepted, QuoteEvent::Reject, None)]
    #[case(QuoteStatus::Sent, QuoteEvent::Convert, None)]
    #[case(QuoteStatus::Draft, QuoteEvent::Convert, None)]
    fn transition_table(
        #[case] from: QuoteStatus,
        #[case] event: QuoteEvent,
        #[case] expected: Option<QuoteStatus>,
    ) {
        assert_eq!(QuoteStateMachine::target(from, event), expected);
    }

    #[rstest]
    fn terminal_states_have_no_outbound_transitions(
        #[values(QuoteStatus::Rejected, QuoteStatus::Cancelled, QuoteStatus::Converted)]
        from: QuoteStatus,
    ) {
        let mut quote = quote_in(from, true);
        let before = quote.clone();
        for command in [
            QuoteCommand::Send,
            QuoteCommand::Accept,
            QuoteCommand::Reject { reason: None },
            QuoteCommand::Cancel,
            QuoteCommand::Convert {
                sales_order_id: Uuid::new_v4(),
            },
        ] {
            let event = command.event();
            assert_matches!(
                QuoteStateMachine::apply(&mut quote, command, Utc::now()),
                Err(ServiceError::IllegalTransition { from: f, event: e })
                    if f == from && e == event
            );
        }
        assert_eq!(quote, before);
        assert!(QuoteStateMachine::available_events(&quote).is_empty());
    }

    #[test]
    fn send_requires_lines() {
        let mut quote = quote_in(QuoteStatus::Draft, false);
        assert_matches!(
            QuoteStateMachine::apply(&mut quote, QuoteCommand::Send, Utc::now()),
            Err(ServiceError::EmptyQuote(_))
        );
        assert_eq!(quote.status, QuoteStatus::Draft);
        assert_eq!(quote.sent_at, None);
    }

    #[test]
    fn resend_keeps_original_timestamp() {
        let mut quote = quote_in(QuoteStatus::Draft, true);
        let first = Utc::now();
        let sent = QuoteStateMachine::apply(&mut quote, QuoteCommand::Send, first).unwrap();
        assert!(sent.changed);
        assert_eq!(quote.sent_at, Some(first));

        let later = first + chrono::Duration::hours(1);
        let resent = QuoteStateMachine::apply(&mut quote, QuoteCommand::Send, later).unwrap();
        assert!(!resent.changed);
        assert_eq!(resent.from, QuoteStatus::Sent);
        assert_eq!(quote.sent_at, Some(first));
    }

    #[test]
    fn reject_stores_trimmed_reason() {
        let mut quote = quote_in(QuoteStatus::Sent, true);
        let now = Utc::now();
        QuoteStateMachine::apply(
            &mut quote,
            QuoteCommand::Reject {
                reason: Some("  too expensive ".into()),
            },
            now,
        )
        .unwrap();
        assert_eq!(quote.status, QuoteStatus::Rejected);
        assert_eq!(quote.rejected_at, Some(now));
        assert_eq!(quote.rejection_reason.as_deref(), Some("too expensive"));
    }

    #[test]
    fn convert_links_order_and_can_be_reverted() {
        let mut quote = quote_in(QuoteStatus::Accepted, true);
        let order_id = Uuid::new_v4();
        QuoteStateMachine::apply(
            &mut quote,
            QuoteCommand::Convert {
                sales_order_id: order_id,
            },
            Utc::now(),
        )
        .unwrap();
        assert_eq!(quote.status, QuoteStatus::Converted);
        assert_eq!(quote.sales_order_id, Some(order_id));
        assert!(quote.converted_at.is_some());

        assert_matches!(
            QuoteStateMachine::revert_conversion(&mut quote, Uuid::new_v4()),
            Err(ServiceError::InvalidState(_))
        );
        QuoteStateMachine::revert_conversion(&mut quote, order_id).unwrap();
        assert_eq!(quote.status, QuoteStatus::Accepted);
        assert_eq!(quote.sales_order_id, None);
        assert_eq!(quote.converted_at, None);
    }

    #[test]
    fn convert_guards() {
        let mut linked = quote_in(QuoteStatus::Accepted, true);
        linked.sales_order_id = Some(Uuid::new_v4());
        assert_matches!(
            QuoteStateMachine::check(&linked, QuoteEvent::Convert),
            Err(ServiceError::NotConvertible(..))
        );

        let empty = quote_in(QuoteStatus::Accepted, false);
        assert_matches!(
            QuoteStateMachine::check(&empty, QuoteEvent::Convert),
            Err(ServiceError::EmptyQuote(_))
        );
    }

    #[test]
    fn available_events_follow_table_and_guards() {
        let empty_draft = quote_in(QuoteStatus::Draft, false);
        assert_eq!(
            QuoteStateMachine::available_events(&empty_draft),
            vec![
                QuoteEvent::Accept,
                QuoteEvent::Reject,
                QuoteEvent::Cancel,
                QuoteEvent::Duplicate
            ]
        );

        let accepted = quote_in(QuoteStatus::Accepted, true);
        assert_eq!(
            QuoteStateMachine::available_events(&accepted),
            vec![QuoteEvent::Cancel, QuoteEvent::Convert, QuoteEvent::Duplicate]
        );
    }
}
