// SPDX-FileCopyrightText: 2026 Careflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation turn driver.
//!
//! Consumes job envelopes from the durable queue and executes one full
//! turn per inbound message: route to the doctor, dedupe at message
//! level, classify, advance the state machine, then run its actions
//! (replies, consent writes, slot offers, bookings, payment links).
//! Payment-provider events take a separate path that confirms the
//! appointment matched on the gateway order id.

use std::collections::VecDeque;
use std::sync::Arc;

use careflow_booking as booking;
use careflow_core::{
    CareflowError, ChannelSender, Gateway, IntentClassifier, JobEnvelope, NotificationSender,
    PayerInfo, PaymentGateway, Provider,
};
use careflow_instagram::webhook::{self, InboundMessage};
use careflow_payments::gateway_for_region;
use careflow_storage::queries::{appointments, audit, conversations, doctors, messages, patients, payments};
use careflow_storage::{Conversation, Database, Doctor, Patient};
use chrono::{DateTime, Datelike, Duration, Utc};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::ephemeral::EphemeralStore;
use crate::fsm::{self, Action, ConvState, Step, TurnInput, replies};

/// Orchestrator tunables, from the `booking` config section.
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// Maximum slots offered in one message.
    pub offer_limit: usize,
    /// How many days ahead to search for free slots.
    pub lookahead_days: u32,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            offer_limit: 5,
            lookahead_days: 7,
        }
    }
}

pub struct Orchestrator {
    db: Database,
    channel: Arc<dyn ChannelSender>,
    classifier: Arc<dyn IntentClassifier>,
    notifier: Arc<dyn NotificationSender>,
    razorpay: Arc<dyn PaymentGateway>,
    paypal: Arc<dyn PaymentGateway>,
    ephemeral: EphemeralStore,
    settings: OrchestratorSettings,
}

struct TurnContext {
    doctor: Doctor,
    patient: Patient,
    conversation: Conversation,
    recipient_id: String,
    correlation_id: String,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db: Database,
        channel: Arc<dyn ChannelSender>,
        classifier: Arc<dyn IntentClassifier>,
        notifier: Arc<dyn NotificationSender>,
        razorpay: Arc<dyn PaymentGateway>,
        paypal: Arc<dyn PaymentGateway>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            db,
            channel,
            classifier,
            notifier,
            razorpay,
            paypal,
            ephemeral: EphemeralStore::default(),
            settings,
        }
    }

    /// Periodic maintenance hook: drop expired pre-consent fields.
    pub fn sweep_ephemeral(&self) -> usize {
        self.ephemeral.sweep()
    }

    /// Process one dequeued job envelope.
    pub async fn process(&self, envelope: &JobEnvelope) -> Result<(), CareflowError> {
        match envelope.provider {
            Provider::Instagram => self.process_messages(envelope).await,
            Provider::Razorpay | Provider::Paypal => self.process_payment_event(envelope).await,
        }
    }

    async fn process_messages(&self, envelope: &JobEnvelope) -> Result<(), CareflowError> {
        let inbound = webhook::extract_messages(&envelope.payload);
        if inbound.is_empty() {
            debug!(event_id = %envelope.event_id, "no text messages in payload");
            return Ok(());
        }

        for message in inbound {
            self.process_one_message(envelope, &message).await?;
        }
        Ok(())
    }

    async fn process_one_message(
        &self,
        envelope: &JobEnvelope,
        message: &InboundMessage,
    ) -> Result<(), CareflowError> {
        let doctor = doctors::find_by_instagram_page(&self.db, &message.page_id)
            .await?
            .ok_or_else(|| {
                CareflowError::Validation(format!(
                    "no doctor registered for page '{}'",
                    message.page_id
                ))
            })?;

        let patient =
            patients::find_or_create_placeholder(&self.db, "instagram", &message.sender_id)
                .await?;
        let conversation = conversations::find_or_create(
            &self.db,
            doctor.id,
            patient.id,
            "instagram",
            &message.sender_id,
        )
        .await?;

        let result = self
            .classifier
            .classify(&message.text, &envelope.correlation_id)
            .await;

        let inserted = messages::insert_inbound(
            &self.db,
            conversation.id,
            &message.message_id,
            &message.text,
            Some(&result.intent.to_string()),
        )
        .await?;
        if !inserted {
            info!(
                conversation_id = conversation.id,
                message_id = %message.message_id,
                "duplicate platform message, skipping"
            );
            return Ok(());
        }

        let state = ConvState::from_json(&conversation.state);
        let input = TurnInput {
            intent: result.intent,
            text: &message.text,
            consent_granted: patient.consent_status == "granted",
        };
        let transition = fsm::advance(&state, &input);
        debug!(
            conversation_id = conversation.id,
            intent = %result.intent,
            from = ?state.step,
            to = ?transition.state.step,
            "turn advanced"
        );

        let ctx = TurnContext {
            doctor,
            patient,
            recipient_id: message.sender_id.clone(),
            correlation_id: envelope.correlation_id.clone(),
            conversation,
        };
        let turn = self.finish_turn(&ctx, transition.state, transition.actions).await;
        if let Err(e) = turn {
            // Unwind the dedupe marker so the retry re-runs this turn
            // instead of skipping it as a duplicate.
            if let Err(cleanup) =
                messages::delete_inbound(&self.db, ctx.conversation.id, &message.message_id).await
            {
                warn!(
                    conversation_id = ctx.conversation.id,
                    message_id = %message.message_id,
                    error = %cleanup,
                    "failed to unwind inbound message after turn error"
                );
            }
            return Err(e);
        }
        Ok(())
    }

    async fn finish_turn(
        &self,
        ctx: &TurnContext,
        state: ConvState,
        actions: Vec<Action>,
    ) -> Result<(), CareflowError> {
        let final_state = self.run_actions(ctx, state, actions).await?;
        conversations::update_state(&self.db, ctx.conversation.id, &final_state.to_json()).await
    }

    async fn run_actions(
        &self,
        ctx: &TurnContext,
        mut state: ConvState,
        actions: Vec<Action>,
    ) -> Result<ConvState, CareflowError> {
        let mut pending: VecDeque<Action> = actions.into();

        while let Some(action) = pending.pop_front() {
            match action {
                Action::Send(text) => {
                    self.send(ctx, &text).await?;
                }
                Action::StoreName(name) => {
                    self.ephemeral
                        .update(ctx.conversation.id, |id| id.name = Some(name));
                }
                Action::StorePhone(phone) => {
                    self.ephemeral
                        .update(ctx.conversation.id, |id| id.phone = Some(phone));
                }
                Action::GrantConsent => {
                    patients::grant_consent(&self.db, ctx.patient.id).await?;
                    audit::record(
                        &self.db,
                        "consent_granted",
                        Some(&ctx.correlation_id),
                        json!({"patient_id": ctx.patient.id}),
                    )
                    .await?;
                }
                Action::RevokeConsent => {
                    patients::revoke_consent(&self.db, ctx.patient.id).await?;
                    audit::record(
                        &self.db,
                        "consent_revoked",
                        Some(&ctx.correlation_id),
                        json!({"patient_id": ctx.patient.id}),
                    )
                    .await?;
                }
                Action::PersistIdentity => {
                    let identity = self.ephemeral.get(ctx.conversation.id).unwrap_or_default();
                    match (identity.name, identity.phone) {
                        (Some(name), Some(phone)) => {
                            patients::persist_identity(
                                &self.db,
                                ctx.patient.id,
                                &name,
                                &phone,
                                identity.email.as_deref(),
                            )
                            .await?;
                        }
                        _ => {
                            // Fields expired from the holding area; start
                            // collection over instead of booking nameless.
                            warn!(
                                conversation_id = ctx.conversation.id,
                                "ephemeral identity expired before persist"
                            );
                            self.send(ctx, replies::ASK_NAME).await?;
                            return Ok(ConvState {
                                step: Step::CollectingInfo,
                                ..ConvState::default()
                            });
                        }
                    }
                }
                Action::OfferSlots => {
                    state = self.offer_slots(ctx, state).await?;
                }
                Action::Book { slot } => {
                    state = self.book_and_issue_link(ctx, state, &slot).await?;
                }
                Action::RemindPayment => {
                    let link =
                        payments::latest_pending_link_for_patient(&self.db, ctx.patient.id)
                            .await?;
                    match link {
                        Some(url) => {
                            self.send(ctx, &format!("Here's your payment link again: {url}"))
                                .await?;
                        }
                        None => {
                            self.send(ctx, replies::NOTHING_TO_PAY).await?;
                        }
                    }
                }
                Action::CancelAppointment => {
                    let cancelled =
                        appointments::cancel_open_for_patient(&self.db, ctx.patient.id).await?;
                    audit::record(
                        &self.db,
                        "appointment_cancelled",
                        Some(&ctx.correlation_id),
                        json!({"patient_id": ctx.patient.id, "count": cancelled}),
                    )
                    .await?;
                }
                Action::DiscardEphemeral => {
                    self.ephemeral.discard(ctx.conversation.id);
                }
            }
        }
        Ok(state)
    }

    async fn send(&self, ctx: &TurnContext, text: &str) -> Result<(), CareflowError> {
        let message_id = self.channel.send_text(&ctx.recipient_id, text).await?;
        messages::insert_outbound(&self.db, ctx.conversation.id, &message_id.0, text).await?;
        Ok(())
    }

    /// Compute slots over the lookahead window, send the numbered list,
    /// and record the offers in the state.
    async fn offer_slots(
        &self,
        ctx: &TurnContext,
        mut state: ConvState,
    ) -> Result<ConvState, CareflowError> {
        let mut slots = Vec::new();
        let today = Utc::now().date_naive();
        for offset in 1..=i64::from(self.settings.lookahead_days) {
            if slots.len() >= self.settings.offer_limit {
                break;
            }
            let date = today + Duration::days(offset);
            let remaining = self.settings.offer_limit - slots.len();
            let day_slots =
                booking::available_slots(&self.db, &ctx.doctor, date, remaining).await?;
            slots.extend(day_slots);
        }

        if slots.is_empty() {
            self.send(
                ctx,
                "I'm sorry, there are no free slots in the coming week. Please check back soon.",
            )
            .await?;
            state.offered_slots = Vec::new();
            return Ok(state);
        }

        let mut listing = String::from("Here are the next available slots:\n");
        for (i, slot) in slots.iter().enumerate() {
            listing.push_str(&format!("{}) {}\n", i + 1, format_slot_label(slot)));
        }
        listing.push_str("Reply with the number of the slot you'd like.");
        self.send(ctx, &listing).await?;

        state.offered_slots = slots;
        Ok(state)
    }

    /// Book the chosen slot and issue a payment link. A lost booking race
    /// apologizes and re-offers instead of failing the job.
    async fn book_and_issue_link(
        &self,
        ctx: &TurnContext,
        mut state: ConvState,
        slot: &str,
    ) -> Result<ConvState, CareflowError> {
        let appointment_id =
            match booking::book_slot(&self.db, &ctx.doctor, ctx.patient.id, slot).await {
                Ok(id) => id,
                Err(CareflowError::Conflict(_)) => {
                    info!(
                        conversation_id = ctx.conversation.id,
                        slot, "slot taken between offer and acceptance"
                    );
                    self.send(
                        ctx,
                        "I'm sorry, that slot was just taken. Let me find you fresh options.",
                    )
                    .await?;
                    state.step = Step::SelectingSlot;
                    return self.offer_slots(ctx, state).await;
                }
                Err(e) => return Err(e),
            };

        audit::record(
            &self.db,
            "appointment_booked",
            Some(&ctx.correlation_id),
            json!({
                "appointment_id": appointment_id,
                "doctor_id": ctx.doctor.id,
                "slot": slot,
            }),
        )
        .await?;

        // Identity was persisted at consent, so the payer details come
        // from the patient row, not the ephemeral store.
        let patient = patients::get(&self.db, ctx.patient.id)
            .await?
            .ok_or_else(|| CareflowError::Internal("patient vanished mid-turn".into()))?;
        let payer = PayerInfo {
            name: patient.name,
            email: patient.email,
            phone: patient.phone,
        };

        let adapter = self.adapter_for(gateway_for_region(&ctx.doctor.region));
        let link = careflow_payments::issue_link(
            &self.db,
            adapter.as_ref(),
            appointment_id,
            ctx.doctor.consultation_fee_minor,
            &ctx.doctor.currency,
            &payer,
        )
        .await?;

        self.send(
            ctx,
            &format!(
                "Your slot on {} is held! Please pay here to confirm: {}",
                format_slot_label(slot),
                link.url
            ),
        )
        .await?;
        Ok(state)
    }

    fn adapter_for(&self, gateway: Gateway) -> &Arc<dyn PaymentGateway> {
        match gateway {
            Gateway::Razorpay => &self.razorpay,
            Gateway::Paypal => &self.paypal,
        }
    }

    /// Payment-provider webhook: match the gateway order id to a pending
    /// payment and confirm or fail the appointment behind it. Unknown and
    /// already-settled orders are no-ops.
    async fn process_payment_event(&self, envelope: &JobEnvelope) -> Result<(), CareflowError> {
        let gateway = match envelope.provider {
            Provider::Razorpay => Gateway::Razorpay,
            Provider::Paypal => Gateway::Paypal,
            Provider::Instagram => unreachable!("dispatched by provider"),
        };

        let Some(order_id) = extract_order_id(envelope.provider, &envelope.payload) else {
            warn!(event_id = %envelope.event_id, "payment event without an order id, ignoring");
            return Ok(());
        };
        let Some(outcome) = payment_outcome(envelope.provider, &envelope.payload) else {
            debug!(event_id = %envelope.event_id, "payment event type not handled");
            return Ok(());
        };

        let payment = payments::mark_status_by_order(
            &self.db,
            &gateway.to_string(),
            &order_id,
            outcome,
        )
        .await?;
        let Some(payment) = payment else {
            info!(order_id, "no pending payment for order, ignoring");
            return Ok(());
        };

        audit::record(
            &self.db,
            "payment_settled",
            Some(&envelope.correlation_id),
            json!({
                "gateway": gateway.to_string(),
                "order_id": order_id,
                "outcome": outcome,
                "appointment_id": payment.appointment_id,
            }),
        )
        .await?;

        let appointment = appointments::get(&self.db, payment.appointment_id)
            .await?
            .ok_or_else(|| CareflowError::Internal("payment references missing appointment".into()))?;
        let patient = patients::get(&self.db, appointment.patient_id)
            .await?
            .ok_or_else(|| CareflowError::Internal("appointment references missing patient".into()))?;

        if outcome == "captured" {
            appointments::update_status(&self.db, appointment.id, "confirmed").await?;
            self.notify_confirmed(envelope, &appointment.appointment_date, &appointment, &patient)
                .await?;
        } else {
            self.notify_payment_failed(envelope, &appointment, &patient).await?;
        }
        Ok(())
    }

    async fn notify_confirmed(
        &self,
        envelope: &JobEnvelope,
        slot: &str,
        appointment: &careflow_storage::Appointment,
        patient: &Patient,
    ) -> Result<(), CareflowError> {
        let label = format_slot_label(slot);

        if let (Some(platform), Some(external_id)) =
            (patient.platform.as_deref(), patient.platform_external_id.as_deref())
        {
            let conversation = conversations::find_or_create(
                &self.db,
                appointment.doctor_id,
                patient.id,
                platform,
                external_id,
            )
            .await?;
            let mut state = ConvState::from_json(&conversation.state);
            state.step = Step::Confirmed;
            state.offered_slots = Vec::new();
            conversations::update_state(&self.db, conversation.id, &state.to_json()).await?;

            let ctx = TurnContext {
                doctor: doctors::get(&self.db, appointment.doctor_id)
                    .await?
                    .ok_or_else(|| CareflowError::Internal("appointment references missing doctor".into()))?,
                patient: patient.clone(),
                conversation,
                recipient_id: external_id.to_string(),
                correlation_id: envelope.correlation_id.clone(),
            };
            self.send(
                &ctx,
                &format!("Payment received! Your appointment on {label} is confirmed. See you then."),
            )
            .await?;
        }

        // Email is best effort and never blocks the confirmation.
        if let Some(email) = patient.email.as_deref() {
            let sent = self
                .notifier
                .send_email(
                    email,
                    "Your appointment is confirmed",
                    &format!("Your appointment on {label} is confirmed. Thank you!"),
                    &envelope.correlation_id,
                )
                .await;
            if !sent {
                warn!(appointment_id = appointment.id, "confirmation email not delivered");
            }
        }
        Ok(())
    }

    async fn notify_payment_failed(
        &self,
        envelope: &JobEnvelope,
        appointment: &careflow_storage::Appointment,
        patient: &Patient,
    ) -> Result<(), CareflowError> {
        if let (Some(platform), Some(external_id)) =
            (patient.platform.as_deref(), patient.platform_external_id.as_deref())
        {
            let conversation = conversations::find_or_create(
                &self.db,
                appointment.doctor_id,
                patient.id,
                platform,
                external_id,
            )
            .await?;
            let ctx = TurnContext {
                doctor: doctors::get(&self.db, appointment.doctor_id)
                    .await?
                    .ok_or_else(|| CareflowError::Internal("appointment references missing doctor".into()))?,
                patient: patient.clone(),
                conversation,
                recipient_id: external_id.to_string(),
                correlation_id: envelope.correlation_id.clone(),
            };
            self.send(
                &ctx,
                "Your payment didn't go through, so the slot isn't confirmed yet. \
Ask me about payment and I'll resend the link.",
            )
            .await?;
        }
        Ok(())
    }
}

/// Human-readable label for an RFC 3339 slot start ("Mon 07 Sep, 09:00").
fn format_slot_label(slot: &str) -> String {
    match DateTime::parse_from_rfc3339(slot) {
        Ok(dt) => {
            let dt = dt.with_timezone(&Utc);
            format!(
                "{} {:02} {}, {}",
                dt.weekday(),
                dt.day(),
                dt.format("%b"),
                dt.format("%H:%M")
            )
        }
        Err(_) => slot.to_string(),
    }
}

fn extract_order_id(provider: Provider, payload: &serde_json::Value) -> Option<String> {
    let value = match provider {
        Provider::Razorpay => payload
            .pointer("/payload/payment_link/entity/id")
            .or_else(|| payload.pointer("/payload/payment/entity/order_id"))
            .or_else(|| payload.get("order_id")),
        Provider::Paypal => payload
            .pointer("/resource/id")
            .or_else(|| payload.get("order_id")),
        Provider::Instagram => None,
    };
    value.and_then(|v| v.as_str()).map(str::to_string)
}

/// Map a provider event name onto a payment row status, or `None` for
/// event types we don't act on.
fn payment_outcome(provider: Provider, payload: &serde_json::Value) -> Option<&'static str> {
    match provider {
        Provider::Razorpay => {
            let event = payload.get("event")?.as_str()?;
            if event.contains("paid") || event.contains("captured") {
                Some("captured")
            } else if event.contains("failed") {
                Some("failed")
            } else {
                None
            }
        }
        Provider::Paypal => {
            let event = payload.get("event_type")?.as_str()?;
            if event.contains("COMPLETED") || event.contains("APPROVED") {
                Some("captured")
            } else if event.contains("DENIED") || event.contains("DECLINED") {
                Some("failed")
            } else {
                None
            }
        }
        Provider::Instagram => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use careflow_core::{Intent, IntentResult, MessageId, PaymentLink};
    use std::sync::Mutex;
    use tempfile::tempdir;

    struct RecordingChannel {
        sent: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl ChannelSender for RecordingChannel {
        fn platform(&self) -> &str {
            "instagram"
        }

        async fn send_text(
            &self,
            recipient_id: &str,
            text: &str,
        ) -> Result<MessageId, CareflowError> {
            let mut sent = self.sent.lock().unwrap();
            sent.push((recipient_id.to_string(), text.to_string()));
            Ok(MessageId(format!("out-{}", sent.len())))
        }
    }

    struct FlakyChannel {
        failures_left: Mutex<u32>,
        sent: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl ChannelSender for FlakyChannel {
        fn platform(&self) -> &str {
            "instagram"
        }

        async fn send_text(
            &self,
            recipient_id: &str,
            text: &str,
        ) -> Result<MessageId, CareflowError> {
            {
                let mut left = self.failures_left.lock().unwrap();
                if *left > 0 {
                    *left -= 1;
                    return Err(CareflowError::Channel {
                        message: "platform returned 503".into(),
                        source: None,
                    });
                }
            }
            let mut sent = self.sent.lock().unwrap();
            sent.push((recipient_id.to_string(), text.to_string()));
            Ok(MessageId(format!("out-{}", sent.len())))
        }
    }

    struct KeywordClassifier;

    #[async_trait]
    impl IntentClassifier for KeywordClassifier {
        async fn classify(&self, text: &str, _correlation_id: &str) -> IntentResult {
            let lower = text.to_lowercase();
            let intent = if lower.contains("book") {
                Intent::BookAppointment
            } else if lower.contains("cancel") {
                Intent::CancelAppointment
            } else if lower == "yes" {
                Intent::ConsentYes
            } else if lower == "no" {
                Intent::ConsentNo
            } else if lower.contains("hi") || lower.contains("hello") {
                Intent::Greeting
            } else if lower.contains("pay") {
                Intent::PaymentQuery
            } else {
                Intent::Unknown
            };
            IntentResult {
                intent,
                confidence: 1.0,
            }
        }
    }

    struct SilentNotifier {
        sent: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl NotificationSender for SilentNotifier {
        async fn send_email(
            &self,
            to: &str,
            _subject: &str,
            _body: &str,
            _correlation_id: &str,
        ) -> bool {
            self.sent.lock().unwrap().push(to.to_string());
            true
        }
    }

    struct FakeGateway {
        gateway: Gateway,
    }

    #[async_trait]
    impl PaymentGateway for FakeGateway {
        fn gateway(&self) -> Gateway {
            self.gateway
        }

        async fn create_link(
            &self,
            _amount_minor: i64,
            _currency: &str,
            reference_id: &str,
            _payer: &PayerInfo,
        ) -> Result<PaymentLink, CareflowError> {
            Ok(PaymentLink {
                url: format!("https://pay.example/{reference_id}"),
                gateway_order_id: format!("order-{reference_id}"),
                expires_at: None,
            })
        }

        fn verify_webhook(&self, _sig: &str, _raw_body: &[u8]) -> bool {
            true
        }

        fn extract_event_id(&self, _body: &serde_json::Value) -> Option<String> {
            None
        }
    }

    struct Harness {
        orchestrator: Orchestrator,
        db: Database,
        channel: Arc<RecordingChannel>,
        notifier: Arc<SilentNotifier>,
        _dir: tempfile::TempDir,
    }

    async fn setup() -> Harness {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("orchestrator_test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();

        let doctor_id = doctors::create(
            &db,
            "Dr. Rao",
            Some("rao@example.com"),
            "IN",
            Some("page-1"),
            30,
            50000,
            "INR",
        )
        .await
        .unwrap();
        // Availability every weekday so the 7-day lookahead always finds
        // slots regardless of the date the test runs.
        for weekday in 0..7 {
            doctors::add_availability(&db, doctor_id, weekday, "09:00", "10:00")
                .await
                .unwrap();
        }

        let channel = Arc::new(RecordingChannel {
            sent: Mutex::new(Vec::new()),
        });
        let notifier = Arc::new(SilentNotifier {
            sent: Mutex::new(Vec::new()),
        });
        let orchestrator = Orchestrator::new(
            db.clone(),
            channel.clone(),
            Arc::new(KeywordClassifier),
            notifier.clone(),
            Arc::new(FakeGateway {
                gateway: Gateway::Razorpay,
            }),
            Arc::new(FakeGateway {
                gateway: Gateway::Paypal,
            }),
            OrchestratorSettings::default(),
        );

        Harness {
            orchestrator,
            db,
            channel,
            notifier,
            _dir: dir,
        }
    }

    fn envelope(event_id: &str, provider: Provider, payload: serde_json::Value) -> JobEnvelope {
        JobEnvelope {
            event_id: event_id.to_string(),
            provider,
            payload,
            correlation_id: format!("corr-{event_id}"),
            timestamp: Utc::now(),
        }
    }

    fn dm(mid: &str, sender: &str, text: &str) -> JobEnvelope {
        envelope(
            mid,
            Provider::Instagram,
            json!({
                "entry": [{
                    "id": "page-1",
                    "messaging": [{
                        "sender": {"id": sender},
                        "message": {"mid": mid, "text": text},
                    }],
                }],
            }),
        )
    }

    fn last_reply(harness: &Harness) -> String {
        harness.channel.sent.lock().unwrap().last().unwrap().1.clone()
    }

    async fn drive_to_payment(harness: &Harness, sender: &str) -> String {
        harness.orchestrator.process(&dm("m1", sender, "I want to book")).await.unwrap();
        harness.orchestrator.process(&dm("m2", sender, "Asha Verma")).await.unwrap();
        harness
            .orchestrator
            .process(&dm("m3", sender, "+91 98765 43210"))
            .await
            .unwrap();
        harness.orchestrator.process(&dm("m4", sender, "yes")).await.unwrap();
        let offers = last_reply(harness);
        assert!(offers.contains("1)"), "expected slot listing, got: {offers}");
        harness.orchestrator.process(&dm("m5", sender, "1")).await.unwrap();
        last_reply(harness)
    }

    #[tokio::test]
    async fn full_booking_flow_reaches_payment_link() {
        let harness = setup().await;
        let link_reply = drive_to_payment(&harness, "user-1").await;
        assert!(link_reply.contains("https://pay.example/appt-1"), "got: {link_reply}");

        // Patient row carries the consented identity.
        let patient = patients::find_or_create_placeholder(&harness.db, "instagram", "user-1")
            .await
            .unwrap();
        assert_eq!(patient.consent_status, "granted");
        assert_eq!(patient.name.as_deref(), Some("Asha Verma"));

        // Appointment pending, payment pending.
        let appointment = appointments::get(&harness.db, 1).await.unwrap().unwrap();
        assert_eq!(appointment.status, "pending");
        let payment = payments::find_by_order(&harness.db, "razorpay", "order-appt-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(payment.status, "pending");

        // The conversation flow is complete once the link is out; capture
        // settles the payment row later.
        let convo = conversations::find_or_create(&harness.db, 1, patient.id, "instagram", "user-1")
            .await
            .unwrap();
        assert_eq!(ConvState::from_json(&convo.state).step, Step::Confirmed);
    }

    #[tokio::test]
    async fn payment_question_after_link_resends_it() {
        let harness = setup().await;
        drive_to_payment(&harness, "user-1").await;

        harness
            .orchestrator
            .process(&dm("m6", "user-1", "how do I pay?"))
            .await
            .unwrap();
        let reply = last_reply(&harness);
        assert!(reply.contains("https://pay.example/appt-1"), "got: {reply}");
    }

    #[tokio::test]
    async fn payment_capture_confirms_and_notifies() {
        let harness = setup().await;
        drive_to_payment(&harness, "user-1").await;

        // Give the patient an email so the confirmation mail path runs.
        let patient = patients::find_or_create_placeholder(&harness.db, "instagram", "user-1")
            .await
            .unwrap();
        patients::persist_identity(
            &harness.db,
            patient.id,
            "Asha Verma",
            "+919876543210",
            Some("asha@example.com"),
        )
        .await
        .unwrap();

        let event = envelope(
            "evt-pay",
            Provider::Razorpay,
            json!({
                "event": "payment_link.paid",
                "payload": {"payment_link": {"entity": {"id": "order-appt-1"}}},
            }),
        );
        harness.orchestrator.process(&event).await.unwrap();

        let appointment = appointments::get(&harness.db, 1).await.unwrap().unwrap();
        assert_eq!(appointment.status, "confirmed");
        assert!(last_reply(&harness).contains("confirmed"));
        assert_eq!(
            harness.notifier.sent.lock().unwrap().as_slice(),
            &["asha@example.com".to_string()]
        );

        // Redelivered capture event is a no-op.
        harness.orchestrator.process(&event).await.unwrap();
        let appointment = appointments::get(&harness.db, 1).await.unwrap().unwrap();
        assert_eq!(appointment.status, "confirmed");
    }

    #[tokio::test]
    async fn consent_refusal_stores_nothing() {
        let harness = setup().await;
        let sender = "user-2";
        harness.orchestrator.process(&dm("n1", sender, "book me in")).await.unwrap();
        harness.orchestrator.process(&dm("n2", sender, "Ravi")).await.unwrap();
        harness.orchestrator.process(&dm("n3", sender, "+91 11111 22222")).await.unwrap();
        harness.orchestrator.process(&dm("n4", sender, "no")).await.unwrap();

        let patient = patients::find_or_create_placeholder(&harness.db, "instagram", sender)
            .await
            .unwrap();
        assert_eq!(patient.consent_status, "revoked");
        assert!(patient.name.is_none());
        assert!(patient.phone.is_none());
        assert!(last_reply(&harness).contains("won't store"));
    }

    #[tokio::test]
    async fn stale_slot_apologizes_and_reoffers() {
        let harness = setup().await;

        // First patient takes slot 1.
        drive_to_payment(&harness, "user-1").await;

        // Second patient is offered the remaining slots; force a stale
        // acceptance by booking their first offer out from under them.
        let sender = "user-3";
        harness.orchestrator.process(&dm("s1", sender, "book please")).await.unwrap();
        harness.orchestrator.process(&dm("s2", sender, "Meera")).await.unwrap();
        harness.orchestrator.process(&dm("s3", sender, "+91 22222 33333")).await.unwrap();
        harness.orchestrator.process(&dm("s4", sender, "yes")).await.unwrap();

        let patient3 = patients::find_or_create_placeholder(&harness.db, "instagram", sender)
            .await
            .unwrap();
        let convo = conversations::find_or_create(&harness.db, 1, patient3.id, "instagram", sender)
            .await
            .unwrap();
        let state = ConvState::from_json(&convo.state);
        assert_eq!(state.step, Step::SelectingSlot);
        let contested = state.offered_slots[0].clone();

        let rival = patients::find_or_create_placeholder(&harness.db, "instagram", "rival")
            .await
            .unwrap();
        appointments::book(&harness.db, 1, rival.id, &contested, 30, None)
            .await
            .unwrap();

        harness.orchestrator.process(&dm("s5", sender, "1")).await.unwrap();
        let sent = harness.channel.sent.lock().unwrap();
        let apology = sent.iter().rev().find(|(r, _)| r == sender).unwrap();
        // Re-offer follows the apology; the last message is a fresh listing.
        assert!(apology.1.contains("available slots") || apology.1.contains("no free slots"));
        drop(sent);

        let convo = conversations::find_or_create(&harness.db, 1, patient3.id, "instagram", sender)
            .await
            .unwrap();
        let state = ConvState::from_json(&convo.state);
        assert_eq!(state.step, Step::SelectingSlot);
        assert!(!state.offered_slots.contains(&contested));
    }

    #[tokio::test]
    async fn duplicate_message_is_processed_once() {
        let harness = setup().await;
        let first = dm("dup-1", "user-4", "hello");
        harness.orchestrator.process(&first).await.unwrap();
        harness.orchestrator.process(&first).await.unwrap();

        let sent = harness.channel.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
    }

    #[tokio::test]
    async fn transient_send_failure_is_retried_cleanly() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("flaky_test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        doctors::create(&db, "Dr. Rao", None, "IN", Some("page-1"), 30, 50000, "INR")
            .await
            .unwrap();

        let channel = Arc::new(FlakyChannel {
            failures_left: Mutex::new(1),
            sent: Mutex::new(Vec::new()),
        });
        let orchestrator = Orchestrator::new(
            db.clone(),
            channel.clone(),
            Arc::new(KeywordClassifier),
            Arc::new(SilentNotifier {
                sent: Mutex::new(Vec::new()),
            }),
            Arc::new(FakeGateway {
                gateway: Gateway::Razorpay,
            }),
            Arc::new(FakeGateway {
                gateway: Gateway::Paypal,
            }),
            OrchestratorSettings::default(),
        );

        let job = dm("flaky-1", "user-9", "hello");
        let err = orchestrator.process(&job).await.unwrap_err();
        assert!(err.is_retryable());
        assert!(channel.sent.lock().unwrap().is_empty());

        // The failed turn must not leave a dedupe marker behind: the
        // redelivered job runs the full turn and the greeting goes out.
        orchestrator.process(&job).await.unwrap();
        assert_eq!(channel.sent.lock().unwrap().len(), 1);

        let patient = patients::find_or_create_placeholder(&db, "instagram", "user-9")
            .await
            .unwrap();
        let convo = conversations::find_or_create(&db, 1, patient.id, "instagram", "user-9")
            .await
            .unwrap();
        let log = messages::recent(&db, convo.id, 10).await.unwrap();
        assert_eq!(log.iter().filter(|m| m.sender_type == "patient").count(), 1);
    }

    #[tokio::test]
    async fn unknown_page_is_a_permanent_error() {
        let harness = setup().await;
        let event = envelope(
            "bad-page",
            Provider::Instagram,
            json!({
                "entry": [{
                    "id": "page-unknown",
                    "messaging": [{
                        "sender": {"id": "user-5"},
                        "message": {"mid": "bp-1", "text": "hi"},
                    }],
                }],
            }),
        );
        let err = harness.orchestrator.process(&event).await.unwrap_err();
        assert!(matches!(err, CareflowError::Validation(_)));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn payment_event_for_unknown_order_is_ignored() {
        let harness = setup().await;
        let event = envelope(
            "evt-ghost",
            Provider::Razorpay,
            json!({
                "event": "payment_link.paid",
                "payload": {"payment_link": {"entity": {"id": "order-ghost"}}},
            }),
        );
        harness.orchestrator.process(&event).await.unwrap();
    }

    #[test]
    fn slot_label_formatting() {
        assert_eq!(
            format_slot_label("2026-09-07T09:00:00.000Z"),
            "Mon 07 Sep, 09:00"
        );
        assert_eq!(format_slot_label("not a date"), "not a date");
    }

    #[test]
    fn order_id_extraction_per_provider() {
        let rzp = json!({"payload": {"payment_link": {"entity": {"id": "plink_1"}}}});
        assert_eq!(
            extract_order_id(Provider::Razorpay, &rzp).as_deref(),
            Some("plink_1")
        );

        let pp = json!({"resource": {"id": "ORDER-9"}});
        assert_eq!(
            extract_order_id(Provider::Paypal, &pp).as_deref(),
            Some("ORDER-9")
        );

        assert!(extract_order_id(Provider::Instagram, &json!({})).is_none());
    }

    #[test]
    fn payment_outcome_mapping() {
        let paid = json!({"event": "payment_link.paid"});
        assert_eq!(payment_outcome(Provider::Razorpay, &paid), Some("captured"));

        let failed = json!({"event": "payment.failed"});
        assert_eq!(payment_outcome(Provider::Razorpay, &failed), Some("failed"));

        let refund = json!({"event": "refund.processed"});
        assert_eq!(payment_outcome(Provider::Razorpay, &refund), None);

        let completed = json!({"event_type": "PAYMENT.CAPTURE.COMPLETED"});
        assert_eq!(payment_outcome(Provider::Paypal, &completed), Some("captured"));
    }
}
