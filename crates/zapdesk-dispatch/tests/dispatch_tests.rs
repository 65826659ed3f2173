// SPDX-FileCopyrightText: 2026 Zapdesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end dispatch scenarios over the full stack and a mock driver.

use std::sync::Arc;
use std::time::Duration;

use zapdesk_core::types::{
    CanonicalAddress, ContactFilter, EntityKind, EventAction, MediaRef, Message, MessageRequest,
    TicketPatch, TicketStatus, new_id, now_timestamp,
};
use zapdesk_core::ZapdeskError;
use zapdesk_dispatch::{
    ContactDetails, DISPATCH_QUEUE, DispatchOutcome, NumberValidator, SendToNumber,
};
use zapdesk_test_utils::TestHarness;
use zapdesk_test_utils::storage::channel;

fn text(body: &str) -> MessageRequest {
    MessageRequest::Text {
        body: body.into(),
        quoted_id: None,
    }
}

fn media(name: &str) -> MediaRef {
    MediaRef {
        path: format!("/srv/media/{name}"),
        file_name: name.into(),
        mime_type: None,
        caption: None,
    }
}

fn to_number(number: &str, request: MessageRequest) -> SendToNumber {
    SendToNumber {
        channel_id: None,
        number: number.into(),
        request,
        close_ticket: false,
    }
}

async fn contact_count(h: &TestHarness) -> usize {
    h.storage()
        .list_contacts(&ContactFilter {
            tenant_id: 1,
            ..ContactFilter::default()
        })
        .await
        .unwrap()
        .len()
}

async fn messages(h: &TestHarness, ticket_id: &str) -> Vec<Message> {
    h.storage()
        .list_messages(ticket_id, 100, 0)
        .await
        .unwrap()
        .0
}

async fn inbound(h: &TestHarness, ticket_id: &str, contact_id: &str, body: &str) -> Message {
    let message = Message {
        id: new_id(),
        tenant_id: 1,
        ticket_id: ticket_id.into(),
        contact_id: contact_id.into(),
        body: body.into(),
        from_me: false,
        read: false,
        external_id: Some(format!("wamid.{body}")),
        quoted_message_id: None,
        media_path: None,
        media_name: None,
        created_at: now_timestamp(),
    };
    h.storage().insert_message(&message).await.unwrap();
    message
}

#[tokio::test]
async fn send_to_new_number_creates_contact_ticket_and_message() {
    let h = TestHarness::new().await.unwrap();
    h.driver.set_profile_pic("15551234567", "https://pics/1.jpg").await;

    let receipt = h
        .service
        .dispatcher
        .send_to_number(&h.ctx(), &to_number("+1 (555) 123-4567", text("Hi {{name}}")))
        .await
        .unwrap();

    assert_eq!(receipt.contact.address, "15551234567");
    assert_eq!(receipt.contact.name, "15551234567");
    assert_eq!(receipt.contact.profile_pic_url.as_deref(), Some("https://pics/1.jpg"));
    assert_eq!(receipt.ticket.status, TicketStatus::Pending);
    assert_eq!(receipt.ticket.channel_id, "main");
    assert_eq!(receipt.ticket.last_message, "Hi 15551234567");

    let DispatchOutcome::Sent { message } = receipt.outcome else {
        panic!("text should be sent inline");
    };
    assert!(message.from_me);
    let sent = h.driver.sent_messages().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].address, "15551234567");
    assert_eq!(sent[0].body, "Hi 15551234567");
    assert_eq!(message.external_id.as_deref(), Some(sent[0].external_id.as_str()));
}

#[tokio::test]
async fn repeat_sends_reuse_contact_and_active_ticket() {
    let h = TestHarness::new().await.unwrap();
    let first = h
        .service
        .dispatcher
        .send_to_number(&h.ctx(), &to_number("5511999990000", text("one")))
        .await
        .unwrap();
    let second = h
        .service
        .dispatcher
        .send_to_number(&h.ctx(), &to_number("+55 11 99999-0000", text("two")))
        .await
        .unwrap();

    assert_eq!(first.contact.id, second.contact.id);
    assert_eq!(first.ticket.id, second.ticket.id);
    assert_eq!(contact_count(&h).await, 1);
    assert_eq!(messages(&h, &first.ticket.id).await.len(), 2);
}

#[tokio::test]
async fn concurrent_sends_to_a_new_number_share_one_ticket() {
    let h = Arc::new(TestHarness::new().await.unwrap());
    let mut handles = Vec::new();
    for n in 0..6 {
        let h = Arc::clone(&h);
        handles.push(tokio::spawn(async move {
            h.service
                .dispatcher
                .send_to_number(&h.ctx(), &to_number("5550142", text(&format!("m{n}"))))
                .await
        }));
    }
    let mut tickets = Vec::new();
    for handle in handles {
        tickets.push(handle.await.unwrap().unwrap().ticket.id);
    }
    tickets.sort();
    tickets.dedup();
    assert_eq!(tickets.len(), 1);
    assert_eq!(contact_count(&h).await, 1);
    assert_eq!(messages(&h, &tickets[0]).await.len(), 6);
}

#[tokio::test]
async fn empty_request_writes_nothing() {
    let h = TestHarness::new().await.unwrap();
    let err = h
        .service
        .dispatcher
        .send_to_number(&h.ctx(), &to_number("5550100", text("   ")))
        .await
        .unwrap_err();
    assert!(matches!(err, ZapdeskError::Validation(_)));

    let err = h
        .service
        .dispatcher
        .send_to_number(
            &h.ctx(),
            &to_number(
                "5550100",
                MessageRequest::Media {
                    attachments: vec![],
                    body: None,
                },
            ),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ZapdeskError::Validation(_)));

    assert_eq!(contact_count(&h).await, 0);
    assert_eq!(h.driver.verify_calls(), 0);
    assert_eq!(h.driver.send_attempts(), 0);
}

#[tokio::test]
async fn unreachable_number_writes_nothing() {
    let h = TestHarness::new().await.unwrap();
    h.driver.mark_unreachable("5550999").await;
    let err = h
        .service
        .dispatcher
        .send_to_number(&h.ctx(), &to_number("555-0999", text("hello")))
        .await
        .unwrap_err();
    assert!(matches!(err, ZapdeskError::InvalidNumber { .. }));
    assert_eq!(contact_count(&h).await, 0);
}

#[tokio::test]
async fn no_connected_channel_is_reported() {
    let h = TestHarness::builder().without_channels().build().await.unwrap();
    let err = h
        .service
        .dispatcher
        .send_to_number(&h.ctx(), &to_number("5550100", text("hello")))
        .await
        .unwrap_err();
    assert!(matches!(err, ZapdeskError::NoChannelConnected { tenant_id: 1 }));
    assert_eq!(contact_count(&h).await, 0);
}

#[tokio::test]
async fn explicit_channel_must_belong_to_tenant() {
    let h = TestHarness::builder()
        .with_channel(channel("foreign", 2, true))
        .build()
        .await
        .unwrap();
    let mut req = to_number("5550100", text("hello"));
    req.channel_id = Some("foreign".into());
    let err = h
        .service
        .dispatcher
        .send_to_number(&h.ctx(), &req)
        .await
        .unwrap_err();
    assert!(matches!(err, ZapdeskError::NoChannelConnected { .. }));
}

#[tokio::test]
async fn failed_text_send_leaves_no_message() {
    let h = TestHarness::new().await.unwrap();
    let receipt = h
        .service
        .dispatcher
        .send_to_number(&h.ctx(), &to_number("5550100", text("first")))
        .await
        .unwrap();

    h.driver.fail_all_sends(true);
    let err = h
        .service
        .dispatcher
        .reply(&h.ctx(), &receipt.ticket.id, &text("second"))
        .await
        .unwrap_err();
    assert!(matches!(err, ZapdeskError::ChannelSend { .. }));

    let stored = messages(&h, &receipt.ticket.id).await;
    assert_eq!(stored.len(), 1);
    let ticket = h.service.tickets.show(&receipt.ticket.id, 1).await.unwrap();
    assert_eq!(ticket.last_message, "first");
}

#[tokio::test]
async fn close_after_send_lands_after_the_delay() {
    let h = TestHarness::builder()
        .with_auto_close_delay(Duration::from_millis(40))
        .build()
        .await
        .unwrap();
    let mut req = to_number("5550100", text("bye"));
    req.close_ticket = true;
    let receipt = h.service.dispatcher.send_to_number(&h.ctx(), &req).await.unwrap();
    assert!(receipt.ticket.status.is_active());

    tokio::time::sleep(Duration::from_millis(150)).await;
    let ticket = h.service.tickets.show(&receipt.ticket.id, 1).await.unwrap();
    assert_eq!(ticket.status, TicketStatus::Closed);
}

#[tokio::test]
async fn manual_reopen_beats_scheduled_close() {
    let h = TestHarness::builder()
        .without_queueing()
        .with_auto_close_delay(Duration::from_millis(60))
        .build()
        .await
        .unwrap();
    let mut req = to_number("5550100", text("bye"));
    req.close_ticket = true;
    let receipt = h.service.dispatcher.send_to_number(&h.ctx(), &req).await.unwrap();
    let id = receipt.ticket.id.clone();

    h.service
        .tickets
        .update(&id, &TicketPatch::status(TicketStatus::Closed), 1)
        .await
        .unwrap();
    h.service
        .tickets
        .update(&id, &TicketPatch::status(TicketStatus::Open), 1)
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(200)).await;
    let ticket = h.service.tickets.show(&id, 1).await.unwrap();
    assert_eq!(ticket.status, TicketStatus::Open);
}

#[tokio::test]
async fn media_jobs_fail_independently() {
    let h = TestHarness::new().await.unwrap();
    h.driver.fail_file("b.pdf").await;
    let mut events = h.service.bus.subscribe(1);

    let receipt = h
        .service
        .dispatcher
        .send_to_number(
            &h.ctx(),
            &to_number(
                "5550100",
                MessageRequest::Media {
                    attachments: vec![media("a.png"), media("b.pdf"), media("c.jpg")],
                    body: None,
                },
            ),
        )
        .await
        .unwrap();
    let DispatchOutcome::Queued { jobs } = &receipt.outcome else {
        panic!("media should be queued");
    };
    assert_eq!(jobs.len(), 3);
    assert!(messages(&h, &receipt.ticket.id).await.is_empty());

    let pool = h.start_workers().await.unwrap();
    h.settle().await.unwrap();
    pool.shutdown().await;

    let stored = messages(&h, &receipt.ticket.id).await;
    let mut names: Vec<_> = stored
        .iter()
        .filter_map(|m| m.media_name.as_deref())
        .collect();
    names.sort();
    assert_eq!(names, vec!["a.png", "c.jpg"]);
    assert!(stored.iter().all(|m| m.body == m.media_name.clone().unwrap_or_default()));

    assert_eq!(h.driver.attempts_for_file("a.png").await, 1);
    assert_eq!(h.driver.attempts_for_file("b.pdf").await, 3);
    assert_eq!(h.driver.attempts_for_file("c.jpg").await, 1);

    let mut exhausted = Vec::new();
    while let Ok(event) = events.try_recv() {
        if event.entity_kind == EntityKind::Job {
            exhausted.push(event);
        }
    }
    assert_eq!(exhausted.len(), 1);
    assert_eq!(exhausted[0].action, EventAction::Delete);
    assert_eq!(exhausted[0].payload["fileName"], "b.pdf");
    assert_eq!(exhausted[0].payload["attempts"], 3);
    assert_eq!(exhausted[0].payload["code"], "ERR_JOB_EXHAUSTED");
    assert_eq!(h.service.queue.open_jobs().await.unwrap(), 0);
}

#[tokio::test]
async fn jobs_resolve_their_channel_when_they_run() {
    let h = TestHarness::builder()
        .with_channel(channel("backup", 1, false))
        .build()
        .await
        .unwrap();
    let receipt = h
        .service
        .dispatcher
        .send_to_number(
            &h.ctx(),
            &to_number(
                "5550100",
                MessageRequest::Media {
                    attachments: vec![media("a.png")],
                    body: Some("see {{firstName}}".into()),
                },
            ),
        )
        .await
        .unwrap();
    assert_eq!(receipt.ticket.channel_id, "main");

    h.service.registry.unregister("main");
    let pool = h.start_workers().await.unwrap();
    h.settle().await.unwrap();
    pool.shutdown().await;

    let stored = messages(&h, &receipt.ticket.id).await;
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].body, "see 5550100");
}

#[tokio::test]
async fn reply_quotes_and_marks_read() {
    let h = TestHarness::new().await.unwrap();
    let receipt = h
        .service
        .dispatcher
        .send_to_number(&h.ctx(), &to_number("5550100", text("hello")))
        .await
        .unwrap();
    let question = inbound(&h, &receipt.ticket.id, &receipt.contact.id, "q1").await;

    let outcome = h
        .service
        .dispatcher
        .reply(
            &h.ctx(),
            &receipt.ticket.id,
            &MessageRequest::Text {
                body: "answer".into(),
                quoted_id: Some(question.id.clone()),
            },
        )
        .await
        .unwrap();
    let DispatchOutcome::Sent { message } = outcome else {
        panic!("text should be sent inline");
    };
    assert_eq!(message.quoted_message_id.as_deref(), Some(question.id.as_str()));

    let sent = h.driver.sent_messages().await;
    assert_eq!(sent.last().unwrap().quoted_external_id.as_deref(), Some("wamid.q1"));
    let stored = h.storage().get_message(&question.id).await.unwrap().unwrap();
    assert!(stored.read);
}

#[tokio::test]
async fn reply_rejects_foreign_quote_and_ticket() {
    let h = TestHarness::new().await.unwrap();
    let receipt = h
        .service
        .dispatcher
        .send_to_number(&h.ctx(), &to_number("5550100", text("hello")))
        .await
        .unwrap();

    let err = h
        .service
        .dispatcher
        .reply(
            &h.ctx(),
            &receipt.ticket.id,
            &MessageRequest::Text {
                body: "x".into(),
                quoted_id: Some("nope".into()),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ZapdeskError::Validation(_)));

    let err = h
        .service
        .dispatcher
        .reply(
            &zapdesk_core::types::TenantContext::new(2),
            &receipt.ticket.id,
            &text("x"),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ZapdeskError::TicketNotFound { .. }));
}

fn quoting(body: &str, quoted_id: &str) -> MessageRequest {
    MessageRequest::Text {
        body: body.into(),
        quoted_id: Some(quoted_id.into()),
    }
}

#[tokio::test]
async fn rejected_reply_quote_leaves_inbound_unread() {
    let h = TestHarness::new().await.unwrap();
    let receipt = h
        .service
        .dispatcher
        .send_to_number(&h.ctx(), &to_number("5550100", text("hello")))
        .await
        .unwrap();
    let question = inbound(&h, &receipt.ticket.id, &receipt.contact.id, "q1").await;
    let sends_before = h.driver.sent_count().await;

    let err = h
        .service
        .dispatcher
        .reply(&h.ctx(), &receipt.ticket.id, &quoting("answer", "nope"))
        .await
        .unwrap_err();
    assert!(matches!(err, ZapdeskError::Validation(_)));

    let stored = h.storage().get_message(&question.id).await.unwrap().unwrap();
    assert!(!stored.read);
    assert_eq!(h.driver.sent_count().await, sends_before);
}

#[tokio::test]
async fn quote_to_unknown_number_writes_nothing() {
    let h = TestHarness::new().await.unwrap();

    let err = h
        .service
        .dispatcher
        .send_to_number(&h.ctx(), &to_number("5550100", quoting("hi", "nope")))
        .await
        .unwrap_err();
    assert!(matches!(err, ZapdeskError::Validation(_)));
    assert_eq!(contact_count(&h).await, 0);
    assert_eq!(h.driver.sent_count().await, 0);
}

#[tokio::test]
async fn quote_to_number_must_belong_to_its_active_ticket() {
    let h = TestHarness::new().await.unwrap();
    let first = h
        .service
        .dispatcher
        .send_to_number(&h.ctx(), &to_number("5550100", text("hello")))
        .await
        .unwrap();
    let question = inbound(&h, &first.ticket.id, &first.contact.id, "q1").await;
    let other = h
        .service
        .dispatcher
        .send_to_number(&h.ctx(), &to_number("5550199", text("hello")))
        .await
        .unwrap();
    let foreign = inbound(&h, &other.ticket.id, &other.contact.id, "q2").await;

    let err = h
        .service
        .dispatcher
        .send_to_number(&h.ctx(), &to_number("5550100", quoting("x", &foreign.id)))
        .await
        .unwrap_err();
    assert!(matches!(err, ZapdeskError::Validation(_)));
    let stored = h.storage().get_message(&question.id).await.unwrap().unwrap();
    assert!(!stored.read);

    let receipt = h
        .service
        .dispatcher
        .send_to_number(&h.ctx(), &to_number("5550100", quoting("answer", &question.id)))
        .await
        .unwrap();
    assert_eq!(receipt.ticket.id, first.ticket.id);
    let DispatchOutcome::Sent { message } = receipt.outcome else {
        panic!("text should be sent inline");
    };
    assert_eq!(message.quoted_message_id.as_deref(), Some(question.id.as_str()));
    let sent = h.driver.sent_messages().await;
    assert_eq!(sent.last().unwrap().quoted_external_id.as_deref(), Some("wamid.q1"));
}

#[tokio::test]
async fn canonical_address_matches_created_contact() {
    let h = TestHarness::new().await.unwrap();
    let receipt = h
        .service
        .dispatcher
        .send_to_number(&h.ctx(), &to_number("15551234567", text("hi")))
        .await
        .unwrap();

    let session = h.service.registry.session("main").unwrap();
    let address = NumberValidator::new()
        .validate("+1 (555) 123-4567", &session)
        .await
        .unwrap();
    assert!(address.as_str().chars().all(|c| c.is_ascii_digit()));
    assert_eq!(address, CanonicalAddress::normalize("15551234567").unwrap());

    let contact = h
        .service
        .contacts
        .resolve_or_create(1, &address, &ContactDetails::default())
        .await
        .unwrap();
    assert_eq!(contact.id, receipt.contact.id);
}

#[tokio::test]
async fn inline_and_queued_sends_share_the_channel_lock() {
    let h = TestHarness::new().await.unwrap();
    h.driver.set_send_delay(Duration::from_millis(5)).await;
    let receipt = h
        .service
        .dispatcher
        .send_to_number(
            &h.ctx(),
            &to_number(
                "5550100",
                MessageRequest::Media {
                    attachments: vec![media("a.png"), media("b.png"), media("c.png")],
                    body: None,
                },
            ),
        )
        .await
        .unwrap();

    let pool = h.start_workers().await.unwrap();
    for n in 0..3 {
        h.service
            .dispatcher
            .reply(&h.ctx(), &receipt.ticket.id, &text(&format!("t{n}")))
            .await
            .unwrap();
    }
    h.settle().await.unwrap();
    pool.shutdown().await;

    assert_eq!(h.driver.sent_count().await, 6);
    assert_eq!(h.driver.max_in_flight(), 1);
}

#[tokio::test]
async fn history_pages_include_outbound_messages() {
    let h = TestHarness::new().await.unwrap();
    let receipt = h
        .service
        .dispatcher
        .send_to_number(&h.ctx(), &to_number("5550100", text("one")))
        .await
        .unwrap();
    h.service
        .dispatcher
        .reply(&h.ctx(), &receipt.ticket.id, &text("two"))
        .await
        .unwrap();

    let page = h.service.history.page(&receipt.ticket.id, 1, 1).await.unwrap();
    let bodies: Vec<_> = page.messages.iter().map(|m| m.body.as_str()).collect();
    assert_eq!(bodies, vec!["one", "two"]);
    assert!(!page.has_more);
}

#[tokio::test]
async fn jobs_abandoned_by_a_dead_worker_are_delivered_after_recovery() {
    let h = TestHarness::new().await.unwrap();
    let receipt = h
        .service
        .dispatcher
        .send_to_number(
            &h.ctx(),
            &to_number(
                "5550100",
                MessageRequest::Media {
                    attachments: vec![media("a.png")],
                    body: None,
                },
            ),
        )
        .await
        .unwrap();

    // A worker takes the job and dies without acknowledging it.
    let taken = h
        .storage()
        .dequeue_job(DISPATCH_QUEUE, Duration::ZERO)
        .await
        .unwrap();
    assert!(taken.is_some());
    assert!(!h.service.queue.run_once().await.unwrap());

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(h.service.queue.recover().await.unwrap(), 1);
    assert!(h.service.queue.run_once().await.unwrap());

    assert_eq!(messages(&h, &receipt.ticket.id).await.len(), 1);
    assert_eq!(h.service.queue.open_jobs().await.unwrap(), 0);
}
