//! Service-level tests for the quote lifecycle: editing, transitions, duplication and
//! deletion, run against the in-memory backends.

mod common;

use assert_matches::assert_matches;
use common::{line, TestApp};
use quote_engine::{
    errors::ServiceError,
    models::{LineItemPatch, Quote, QuoteEvent, QuoteHeaderPatch, QuoteStatus},
    repositories::QuoteFilter,
    services::quote_state::QuoteStateMachine,
};
use rstest::rstest;
use rust_decimal_macros::dec;
use uuid::Uuid;

/// Drives a fresh one-line quote into `status` through the public operations.
async fn quote_in(app: &TestApp, status: QuoteStatus) -> Quote {
    let quotes = &app.state.services.quotes;
    let lines = vec![line(Uuid::new_v4(), dec!(2), dec!(10))];
    let quote = match status {
        QuoteStatus::Accepted | QuoteStatus::Converted => app.accepted_quote(lines).await,
        _ => app.draft_quote(lines).await,
    };
    match status {
        QuoteStatus::Sent => quotes.send_quote(quote.id).await.unwrap(),
        QuoteStatus::Rejected => quotes.reject_quote(quote.id, None).await.unwrap(),
        QuoteStatus::Cancelled => quotes.cancel_quote(quote.id).await.unwrap(),
        QuoteStatus::Converted => {
            quotes.convert_quote(quote.id, None).await.unwrap();
            quotes.get_quote(quote.id).await.unwrap()
        }
        _ => quote,
    }
}

#[tokio::test]
async fn create_quote_applies_defaults_and_totals() {
    let app = TestApp::new();
    let mut discounted = line(Uuid::new_v4(), dec!(3), dec!(10));
    discounted.discount_amount = Some(dec!(5));
    discounted.tax_amount = Some(dec!(2.5));

    let quote = app
        .draft_quote(vec![discounted, line(Uuid::new_v4(), dec!(1), dec!(4.25))])
        .await;

    assert_eq!(quote.status, QuoteStatus::Draft);
    assert_eq!(quote.currency, "USD");
    assert!(quote.quote_number.starts_with("QT-"));
    assert_eq!(
        quote.valid_until,
        Some(quote.quote_date + chrono::Duration::days(30))
    );
    assert_eq!(quote.totals.subtotal_amount, dec!(34.25));
    assert_eq!(quote.totals.discount_amount, dec!(5));
    assert_eq!(quote.totals.tax_amount, dec!(2.5));
    assert_eq!(quote.totals.total_amount, dec!(31.75));
    assert_eq!(quote.totals.items_count, 2);
    assert_eq!(quote.totals.total_quantity, dec!(4));
    assert_eq!(quote.version, 1);
}

#[tokio::test]
async fn full_lifecycle_records_timestamps() {
    let app = TestApp::new();
    let quotes = &app.state.services.quotes;
    let quote = app
        .draft_quote(vec![line(Uuid::new_v4(), dec!(2), dec!(7))])
        .await;

    let sent = quotes.send_quote(quote.id).await.unwrap();
    assert_eq!(sent.status, QuoteStatus::Sent);
    assert!(sent.sent_at.is_some());

    let accepted = quotes.accept_quote(quote.id).await.unwrap();
    assert_eq!(accepted.status, QuoteStatus::Accepted);
    assert!(accepted.accepted_at.is_some());
    assert!(!accepted.can_edit());
    assert_eq!(
        QuoteStateMachine::available_events(&accepted),
        vec![QuoteEvent::Cancel, QuoteEvent::Convert, QuoteEvent::Duplicate]
    );
}

#[tokio::test]
async fn sending_an_empty_quote_is_refused() {
    let app = TestApp::new();
    let quote = app.draft_quote(Vec::new()).await;

    assert_matches!(
        app.state.services.quotes.send_quote(quote.id).await,
        Err(ServiceError::EmptyQuote(id)) if id == quote.id
    );
    let stored = app.state.services.quotes.get_quote(quote.id).await.unwrap();
    assert_eq!(stored.status, QuoteStatus::Draft);
    assert_eq!(stored.version, quote.version);
}

#[tokio::test]
async fn resending_keeps_original_sent_at() {
    let app = TestApp::new();
    let quotes = &app.state.services.quotes;
    let quote = app
        .draft_quote(vec![line(Uuid::new_v4(), dec!(1), dec!(1))])
        .await;

    let first = quotes.send_quote(quote.id).await.unwrap();
    let second = quotes.send_quote(quote.id).await.unwrap();
    assert_eq!(second.status, QuoteStatus::Sent);
    assert_eq!(second.sent_at, first.sent_at);
    assert_eq!(second.version, first.version);
}

#[tokio::test]
async fn terminal_statuses_refuse_every_event() {
    let app = TestApp::new();
    let quotes = &app.state.services.quotes;
    let quote = app
        .draft_quote(vec![line(Uuid::new_v4(), dec!(1), dec!(1))])
        .await;
    quotes.send_quote(quote.id).await.unwrap();
    let rejected = quotes
        .reject_quote(quote.id, Some("price too high".to_string()))
        .await
        .unwrap();
    assert_eq!(rejected.rejection_reason.as_deref(), Some("price too high"));
    assert!(rejected.rejected_at.is_some());

    assert_matches!(
        quotes.accept_quote(quote.id).await,
        Err(ServiceError::IllegalTransition {
            from: QuoteStatus::Rejected,
            event: QuoteEvent::Accept
        })
    );
    assert_matches!(
        quotes.send_quote(quote.id).await,
        Err(ServiceError::IllegalTransition { .. })
    );
    assert_matches!(
        quotes.cancel_quote(quote.id).await,
        Err(ServiceError::IllegalTransition { .. })
    );
}

#[tokio::test]
async fn editing_recomputes_totals_and_bumps_version() {
    let app = TestApp::new();
    let quotes = &app.state.services.quotes;
    let quote = app
        .draft_quote(vec![line(Uuid::new_v4(), dec!(2), dec!(10))])
        .await;

    let with_second = quotes
        .add_line_item(quote.id, line(Uuid::new_v4(), dec!(1), dec!(5)))
        .await
        .unwrap();
    assert_eq!(with_second.totals.total_amount, dec!(25));
    assert_eq!(with_second.lines[1].position, 1);
    assert_eq!(with_second.version, quote.version + 1);

    let first_line = with_second.lines[0].id;
    let patched = quotes
        .update_line_item(
            quote.id,
            first_line,
            LineItemPatch {
                quantity: Some(dec!(4)),
                discount_amount: Some(dec!(8)),
                ..LineItemPatch::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(patched.lines[0].line_total, dec!(32));
    assert_eq!(patched.totals.total_amount, dec!(37));

    let removed = quotes.remove_line_item(quote.id, first_line).await.unwrap();
    assert_eq!(removed.lines.len(), 1);
    assert_eq!(removed.lines[0].position, 0);
    assert_eq!(removed.totals.total_amount, dec!(5));

    let header = quotes
        .update_header(
            quote.id,
            QuoteHeaderPatch {
                estimated_eta: Some("2 weeks".to_string()),
                notes: Some("  ".to_string()),
            },
        )
        .await
        .unwrap();
    assert_eq!(header.estimated_eta.as_deref(), Some("2 weeks"));
    assert_eq!(header.notes, None);
}

#[tokio::test]
async fn discount_above_line_amount_is_rejected() {
    let app = TestApp::new();
    let quote = app
        .draft_quote(vec![line(Uuid::new_v4(), dec!(1), dec!(10))])
        .await;
    let line_id = quote.lines[0].id;

    assert_matches!(
        app.state
            .services
            .quotes
            .update_line_item(
                quote.id,
                line_id,
                LineItemPatch {
                    discount_amount: Some(dec!(10.01)),
                    ..LineItemPatch::default()
                },
            )
            .await,
        Err(ServiceError::ValidationError(_))
    );
}

#[tokio::test]
async fn accepted_quote_is_read_only() {
    let app = TestApp::new();
    let quote = app
        .accepted_quote(vec![line(Uuid::new_v4(), dec!(1), dec!(1))])
        .await;

    assert_matches!(
        app.state
            .services
            .quotes
            .add_line_item(quote.id, line(Uuid::new_v4(), dec!(1), dec!(1)))
            .await,
        Err(ServiceError::InvalidState(_))
    );
}

#[tokio::test]
async fn duplicate_creates_fresh_draft() {
    let app = TestApp::new();
    let source = app
        .accepted_quote(vec![
            line(Uuid::new_v4(), dec!(2), dec!(3)),
            line(Uuid::new_v4(), dec!(1), dec!(9)),
        ])
        .await;

    let copy = app
        .state
        .services
        .quotes
        .duplicate_quote(source.id)
        .await
        .unwrap();

    assert_ne!(copy.id, source.id);
    assert_ne!(copy.quote_number, source.quote_number);
    assert_eq!(copy.status, QuoteStatus::Draft);
    assert_eq!(copy.contact_id, source.contact_id);
    assert_eq!(copy.totals, source.totals);
    assert!(copy.sent_at.is_none() && copy.accepted_at.is_none());
    assert!(copy.sales_order_id.is_none());
    assert!(copy.lines.iter().all(|l| source.line(l.id).is_none()));
}

#[tokio::test]
async fn delete_is_refused_for_accepted_quotes() {
    let app = TestApp::new();
    let quotes = &app.state.services.quotes;
    let draft = app
        .draft_quote(vec![line(Uuid::new_v4(), dec!(1), dec!(1))])
        .await;
    let accepted = app
        .accepted_quote(vec![line(Uuid::new_v4(), dec!(1), dec!(1))])
        .await;

    quotes.delete_quote(draft.id).await.unwrap();
    assert_matches!(
        quotes.get_quote(draft.id).await,
        Err(ServiceError::NotFound(_))
    );
    assert_matches!(
        quotes.delete_quote(accepted.id).await,
        Err(ServiceError::InvalidState(_))
    );
}

#[tokio::test]
async fn list_filters_by_status() {
    let app = TestApp::new();
    let draft = app
        .draft_quote(vec![line(Uuid::new_v4(), dec!(1), dec!(1))])
        .await;
    let accepted = app
        .accepted_quote(vec![line(Uuid::new_v4(), dec!(1), dec!(1))])
        .await;

    let drafts = app
        .state
        .services
        .quotes
        .list_quotes(QuoteFilter {
            status: Some(QuoteStatus::Draft),
            contact_id: None,
        })
        .await
        .unwrap();
    assert!(drafts.iter().any(|q| q.id == draft.id));
    assert!(drafts.iter().all(|q| q.id != accepted.id));

    let by_contact = app
        .state
        .services
        .quotes
        .list_quotes(QuoteFilter {
            status: None,
            contact_id: Some(accepted.contact_id),
        })
        .await
        .unwrap();
    assert_eq!(by_contact.len(), 1);
}

#[tokio::test]
async fn concurrent_accept_and_cancel_leave_one_winner() {
    let app = TestApp::new();
    let quote = app
        .draft_quote(vec![line(Uuid::new_v4(), dec!(1), dec!(1))])
        .await;
    app.state.services.quotes.send_quote(quote.id).await.unwrap();

    let accept = {
        let quotes = app.state.services.quotes.clone();
        tokio::spawn(async move { quotes.accept_quote(quote.id).await })
    };
    let cancel = {
        let quotes = app.state.services.quotes.clone();
        tokio::spawn(async move { quotes.cancel_quote(quote.id).await })
    };
    let accept = accept.await.unwrap();
    let cancel = cancel.await.unwrap();

    let stored = app.state.services.quotes.get_quote(quote.id).await.unwrap();
    // Cancel is legal from accepted, so either order ends cancelled; accept after
    // cancel is refused.
    assert_eq!(stored.status, QuoteStatus::Cancelled);
    assert!(cancel.is_ok());
    if let Err(e) = accept {
        assert_matches!(e, ServiceError::IllegalTransition { .. });
    }
}

#[rstest]
#[tokio::test]
async fn edits_are_refused_outside_draft_and_sent(
    #[values(
        QuoteStatus::Accepted,
        QuoteStatus::Rejected,
        QuoteStatus::Cancelled,
        QuoteStatus::Converted
    )]
    status: QuoteStatus,
) {
    let app = TestApp::new();
    let quote = quote_in(&app, status).await;
    assert_eq!(quote.status, status);
    let quotes = &app.state.services.quotes;
    let line_id = quote.lines[0].id;

    assert_matches!(
        quotes
            .update_header(
                quote.id,
                QuoteHeaderPatch {
                    notes: Some("too late".into()),
                    estimated_eta: Some("tomorrow".into()),
                },
            )
            .await,
        Err(ServiceError::InvalidState(_))
    );
    assert_matches!(
        quotes
            .add_line_item(quote.id, line(Uuid::new_v4(), dec!(1), dec!(1)))
            .await,
        Err(ServiceError::InvalidState(_))
    );
    assert_matches!(
        quotes
            .update_line_item(
                quote.id,
                line_id,
                LineItemPatch {
                    quantity: Some(dec!(5)),
                    ..Default::default()
                },
            )
            .await,
        Err(ServiceError::InvalidState(_))
    );
    assert_matches!(
        quotes.remove_line_item(quote.id, line_id).await,
        Err(ServiceError::InvalidState(_))
    );

    let stored = quotes.get_quote(quote.id).await.unwrap();
    assert_eq!(stored, quote);
}

#[rstest]
#[tokio::test]
async fn header_is_editable_in_draft_and_sent(
    #[values(QuoteStatus::Draft, QuoteStatus::Sent)] status: QuoteStatus,
) {
    let app = TestApp::new();
    let quote = quote_in(&app, status).await;
    let updated = app
        .state
        .services
        .quotes
        .update_header(
            quote.id,
            QuoteHeaderPatch {
                notes: Some("call before delivery".into()),
                estimated_eta: None,
            },
        )
        .await
        .unwrap();

    assert_eq!(updated.status, status);
    assert_eq!(updated.notes.as_deref(), Some("call before delivery"));
    assert_eq!(updated.version, quote.version + 1);
}
