// SPDX-FileCopyrightText: 2026 Careflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation state machine.
//!
//! Pure transition logic: given the persisted state and a classified
//! inbound message, produce the next state plus a list of actions for the
//! orchestrator to execute (send a reply, stash an identity field, book a
//! slot). No I/O happens here, which keeps every path unit-testable.
//!
//! The happy path walks greeting -> collecting_info -> awaiting_consent ->
//! selecting_slot -> confirmed: booking and the payment link are issued
//! within the slot-selection turn, and payment capture lands later through
//! the provider webhook against the payment row. A cancel intent drops to
//! cancelled from any step; cancelled and confirmed both allow a fresh
//! booking to start over.

use careflow_core::Intent;
use serde::{Deserialize, Serialize};

/// Where a conversation currently stands. Serialized into the
/// `conversations.state` JSON.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    #[default]
    Greeting,
    CollectingInfo,
    AwaitingConsent,
    SelectingSlot,
    Confirmed,
    Cancelled,
}

/// Persisted conversation state. Field-presence flags only; the values
/// themselves live in the ephemeral store until consent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvState {
    pub step: Step,
    pub have_name: bool,
    pub have_phone: bool,
    pub offered_slots: Vec<String>,
}

impl ConvState {
    pub fn from_json(json: &str) -> Self {
        serde_json::from_str(json).unwrap_or_default()
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

/// One classified inbound message.
#[derive(Debug, Clone)]
pub struct TurnInput<'a> {
    pub intent: Intent,
    pub text: &'a str,
    /// Whether this patient has already granted consent.
    pub consent_granted: bool,
}

/// Side effects for the orchestrator, executed in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Send a reply to the patient.
    Send(String),
    /// Stash the name in the ephemeral store.
    StoreName(String),
    /// Stash the phone number in the ephemeral store.
    StorePhone(String),
    /// Record the consent grant on the patient row.
    GrantConsent,
    /// Record a consent refusal and drop ephemeral fields.
    RevokeConsent,
    /// Move ephemeral identity fields onto the consented patient row.
    PersistIdentity,
    /// Compute and send available slots; fills `offered_slots`.
    OfferSlots,
    /// Book the chosen slot and issue a payment link.
    Book { slot: String },
    /// Resend the pending payment link.
    RemindPayment,
    /// Cancel the patient's open appointment.
    CancelAppointment,
    /// Drop any ephemeral identity fields for this conversation.
    DiscardEphemeral,
}

/// A transition: the state to persist plus the actions to run.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub state: ConvState,
    pub actions: Vec<Action>,
}

pub mod replies {
    pub const WELCOME: &str =
        "Hello! I can help you book a consultation. Just say \"book an appointment\" to start.";
    pub const ASK_NAME: &str = "Great, let's get you booked. What's your full name?";
    pub const ASK_PHONE: &str = "Thanks! And what's the best phone number to reach you?";
    pub const ASK_CONSENT: &str = "Before I save your details, do you consent to us storing \
your name and phone number for this booking? Please reply yes or no.";
    pub const CONSENT_DECLINED: &str = "Understood. I won't store your details, so I can't \
complete the booking. Feel free to message again if you change your mind.";
    pub const ASK_CONSENT_AGAIN: &str =
        "Sorry, I need a yes or no: may we store your name and phone number for this booking?";
    pub const ASK_PHONE_AGAIN: &str = "That doesn't look like a phone number. Please send it \
with digits, like +91 98765 43210.";
    pub const SLOT_NOT_UNDERSTOOD: &str =
        "Sorry, I didn't catch that. Please reply with the number of the slot you'd like.";
    pub const NOTHING_TO_PAY: &str =
        "I don't see a pending payment for you. If you've already paid, you're all set.";
    pub const CANCELLED: &str =
        "Your booking has been cancelled. Message me any time to book again.";
    pub const FALLBACK: &str =
        "I can help you book, reschedule, or cancel an appointment. What would you like to do?";
    pub const CONFIRMED_SMALL_TALK: &str =
        "You're all set! Your appointment is confirmed. Anything else I can help with?";
}

/// Extract a 1-based slot choice from free text, bounded by the number of
/// offers ("2", "slot 2", "the 2nd one").
pub fn parse_slot_choice(text: &str, offered: usize) -> Option<usize> {
    let digits: String = text
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    let n: usize = digits.parse().ok()?;
    (1..=offered).contains(&n).then(|| n - 1)
}

/// Advance the conversation one turn.
pub fn advance(state: &ConvState, input: &TurnInput<'_>) -> Transition {
    // Cancellation wins from any live step.
    if input.intent == Intent::CancelAppointment && state.step != Step::Cancelled {
        return Transition {
            state: ConvState {
                step: Step::Cancelled,
                ..ConvState::default()
            },
            actions: vec![
                Action::CancelAppointment,
                Action::DiscardEphemeral,
                Action::Send(replies::CANCELLED.into()),
            ],
        };
    }

    match state.step {
        Step::Greeting => start_or_chat(state, input),
        Step::CollectingInfo => collect(state, input),
        Step::AwaitingConsent => consent(state, input),
        Step::SelectingSlot => select_slot(state, input),
        Step::Confirmed | Step::Cancelled => start_or_chat(state, input),
    }
}

/// Greeting, confirmed, and cancelled all behave like an idle thread: a
/// booking intent starts the flow, everything else is small talk.
fn start_or_chat(state: &ConvState, input: &TurnInput<'_>) -> Transition {
    match input.intent {
        Intent::BookAppointment | Intent::Reschedule => {
            if input.consent_granted {
                Transition {
                    state: ConvState {
                        step: Step::SelectingSlot,
                        have_name: true,
                        have_phone: true,
                        offered_slots: Vec::new(),
                    },
                    actions: vec![Action::OfferSlots],
                }
            } else {
                Transition {
                    state: ConvState {
                        step: Step::CollectingInfo,
                        ..ConvState::default()
                    },
                    actions: vec![Action::Send(replies::ASK_NAME.into())],
                }
            }
        }
        Intent::PaymentQuery if state.step == Step::Confirmed => Transition {
            state: state.clone(),
            actions: vec![Action::RemindPayment],
        },
        Intent::Greeting => reply_in_place(state, match state.step {
            Step::Confirmed => replies::CONFIRMED_SMALL_TALK,
            _ => replies::WELCOME,
        }),
        _ => reply_in_place(state, replies::FALLBACK),
    }
}

/// Loose phone-shape check: enough digits to dial, and nothing that isn't
/// a digit, space, or common separator.
fn looks_like_phone(text: &str) -> bool {
    let digits = text.chars().filter(char::is_ascii_digit).count();
    (7..=15).contains(&digits)
        && text
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_whitespace() || matches!(c, '+' | '-' | '(' | ')' | '.'))
}

fn collect(state: &ConvState, input: &TurnInput<'_>) -> Transition {
    // A question mid-collection gets a nudge rather than being swallowed
    // as a field value.
    if matches!(input.intent, Intent::Question | Intent::Greeting) {
        let prompt = if state.have_name {
            replies::ASK_PHONE
        } else {
            replies::ASK_NAME
        };
        return reply_in_place(state, prompt);
    }

    let value = input.text.trim().to_string();
    if value.is_empty() {
        let prompt = if state.have_name {
            replies::ASK_PHONE
        } else {
            replies::ASK_NAME
        };
        return reply_in_place(state, prompt);
    }

    if !state.have_name && !value.chars().any(char::is_alphabetic) {
        return reply_in_place(state, replies::ASK_NAME);
    }
    if state.have_name && !looks_like_phone(&value) {
        return reply_in_place(state, replies::ASK_PHONE_AGAIN);
    }

    if !state.have_name {
        Transition {
            state: ConvState {
                have_name: true,
                ..state.clone()
            },
            actions: vec![
                Action::StoreName(value),
                Action::Send(replies::ASK_PHONE.into()),
            ],
        }
    } else {
        Transition {
            state: ConvState {
                step: Step::AwaitingConsent,
                have_phone: true,
                ..state.clone()
            },
            actions: vec![
                Action::StorePhone(value),
                Action::Send(replies::ASK_CONSENT.into()),
            ],
        }
    }
}

fn consent(state: &ConvState, input: &TurnInput<'_>) -> Transition {
    match input.intent {
        Intent::ConsentYes => Transition {
            state: ConvState {
                step: Step::SelectingSlot,
                offered_slots: Vec::new(),
                ..state.clone()
            },
            actions: vec![
                Action::GrantConsent,
                Action::PersistIdentity,
                Action::DiscardEphemeral,
                Action::OfferSlots,
            ],
        },
        Intent::ConsentNo => Transition {
            state: ConvState {
                step: Step::Cancelled,
                ..ConvState::default()
            },
            actions: vec![
                Action::RevokeConsent,
                Action::DiscardEphemeral,
                Action::Send(replies::CONSENT_DECLINED.into()),
            ],
        },
        _ => reply_in_place(state, replies::ASK_CONSENT_AGAIN),
    }
}

/// A valid choice books and issues the payment link inside this turn, so
/// the resting state is already `Confirmed`; capture settles the payment
/// row later. The orchestrator rewinds to `SelectingSlot` on a lost race.
fn select_slot(state: &ConvState, input: &TurnInput<'_>) -> Transition {
    match parse_slot_choice(input.text, state.offered_slots.len()) {
        Some(index) => Transition {
            state: ConvState {
                step: Step::Confirmed,
                ..state.clone()
            },
            actions: vec![Action::Book {
                slot: state.offered_slots[index].clone(),
            }],
        },
        None => reply_in_place(state, replies::SLOT_NOT_UNDERSTOOD),
    }
}

fn reply_in_place(state: &ConvState, text: &str) -> Transition {
    Transition {
        state: state.clone(),
        actions: vec![Action::Send(text.into())],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(intent: Intent, text: &str) -> TurnInput<'_> {
        TurnInput {
            intent,
            text,
            consent_granted: false,
        }
    }

    #[test]
    fn state_json_round_trip_and_empty_default() {
        assert_eq!(ConvState::from_json("{}"), ConvState::default());
        assert_eq!(ConvState::from_json("garbage"), ConvState::default());

        let state = ConvState {
            step: Step::SelectingSlot,
            have_name: true,
            have_phone: true,
            offered_slots: vec!["2026-09-07T09:00:00.000Z".into()],
        };
        assert_eq!(ConvState::from_json(&state.to_json()), state);
    }

    #[test]
    fn booking_intent_starts_info_collection() {
        let t = advance(
            &ConvState::default(),
            &input(Intent::BookAppointment, "I want to see the doctor"),
        );
        assert_eq!(t.state.step, Step::CollectingInfo);
        assert_eq!(t.actions, vec![Action::Send(replies::ASK_NAME.into())]);
    }

    #[test]
    fn consented_patient_skips_straight_to_slots() {
        let t = advance(
            &ConvState::default(),
            &TurnInput {
                intent: Intent::BookAppointment,
                text: "book again please",
                consent_granted: true,
            },
        );
        assert_eq!(t.state.step, Step::SelectingSlot);
        assert_eq!(t.actions, vec![Action::OfferSlots]);
    }

    #[test]
    fn greeting_stays_put() {
        let t = advance(&ConvState::default(), &input(Intent::Greeting, "hi"));
        assert_eq!(t.state.step, Step::Greeting);
        assert_eq!(t.actions, vec![Action::Send(replies::WELCOME.into())]);
    }

    #[test]
    fn name_then_phone_then_consent_prompt() {
        let after_start = ConvState {
            step: Step::CollectingInfo,
            ..ConvState::default()
        };

        let t1 = advance(&after_start, &input(Intent::Unknown, "Asha Verma"));
        assert!(t1.state.have_name);
        assert_eq!(t1.state.step, Step::CollectingInfo);
        assert_eq!(
            t1.actions,
            vec![
                Action::StoreName("Asha Verma".into()),
                Action::Send(replies::ASK_PHONE.into()),
            ]
        );

        let t2 = advance(&t1.state, &input(Intent::Unknown, "+91 98765 43210"));
        assert!(t2.state.have_phone);
        assert_eq!(t2.state.step, Step::AwaitingConsent);
        assert_eq!(
            t2.actions,
            vec![
                Action::StorePhone("+91 98765 43210".into()),
                Action::Send(replies::ASK_CONSENT.into()),
            ]
        );
    }

    #[test]
    fn question_during_collection_reasks_instead_of_storing() {
        let state = ConvState {
            step: Step::CollectingInfo,
            ..ConvState::default()
        };
        let t = advance(&state, &input(Intent::Question, "why do you need my name?"));
        assert!(!t.state.have_name);
        assert_eq!(t.actions, vec![Action::Send(replies::ASK_NAME.into())]);
    }

    #[test]
    fn consent_yes_persists_and_offers_slots() {
        let state = ConvState {
            step: Step::AwaitingConsent,
            have_name: true,
            have_phone: true,
            ..ConvState::default()
        };
        let t = advance(&state, &input(Intent::ConsentYes, "yes please"));
        assert_eq!(t.state.step, Step::SelectingSlot);
        assert_eq!(
            t.actions,
            vec![
                Action::GrantConsent,
                Action::PersistIdentity,
                Action::DiscardEphemeral,
                Action::OfferSlots,
            ]
        );
    }

    #[test]
    fn consent_no_discards_and_cancels() {
        let state = ConvState {
            step: Step::AwaitingConsent,
            have_name: true,
            have_phone: true,
            ..ConvState::default()
        };
        let t = advance(&state, &input(Intent::ConsentNo, "no"));
        assert_eq!(t.state.step, Step::Cancelled);
        assert!(t.actions.contains(&Action::RevokeConsent));
        assert!(t.actions.contains(&Action::DiscardEphemeral));
    }

    #[test]
    fn ambiguous_consent_reply_reasks() {
        let state = ConvState {
            step: Step::AwaitingConsent,
            have_name: true,
            have_phone: true,
            ..ConvState::default()
        };
        let t = advance(&state, &input(Intent::Question, "what happens to my data?"));
        assert_eq!(t.state.step, Step::AwaitingConsent);
        assert_eq!(t.actions, vec![Action::Send(replies::ASK_CONSENT_AGAIN.into())]);
    }

    #[test]
    fn slot_choice_books_the_right_slot() {
        let state = ConvState {
            step: Step::SelectingSlot,
            have_name: true,
            have_phone: true,
            offered_slots: vec![
                "2026-09-07T09:00:00.000Z".into(),
                "2026-09-07T09:30:00.000Z".into(),
            ],
        };
        let t = advance(&state, &input(Intent::Unknown, "slot 2 works for me"));
        assert_eq!(t.state.step, Step::Confirmed);
        assert_eq!(
            t.actions,
            vec![Action::Book {
                slot: "2026-09-07T09:30:00.000Z".into()
            }]
        );
    }

    #[test]
    fn out_of_range_choice_reasks() {
        let state = ConvState {
            step: Step::SelectingSlot,
            have_name: true,
            have_phone: true,
            offered_slots: vec!["2026-09-07T09:00:00.000Z".into()],
        };
        let t = advance(&state, &input(Intent::Unknown, "number 5"));
        assert_eq!(t.state.step, Step::SelectingSlot);
        assert_eq!(t.actions, vec![Action::Send(replies::SLOT_NOT_UNDERSTOOD.into())]);
    }

    #[test]
    fn payment_query_after_booking_resends_the_link() {
        let state = ConvState {
            step: Step::Confirmed,
            have_name: true,
            have_phone: true,
            ..ConvState::default()
        };
        let t = advance(&state, &input(Intent::PaymentQuery, "where do I pay?"));
        assert_eq!(t.state.step, Step::Confirmed);
        assert_eq!(t.actions, vec![Action::RemindPayment]);
    }

    #[test]
    fn implausible_phone_reasks() {
        let state = ConvState {
            step: Step::CollectingInfo,
            have_name: true,
            ..ConvState::default()
        };
        for junk in ["banana", "12345", "call me maybe 42"] {
            let t = advance(&state, &input(Intent::Unknown, junk));
            assert!(!t.state.have_phone, "accepted {junk:?}");
            assert_eq!(t.state.step, Step::CollectingInfo);
            assert_eq!(t.actions, vec![Action::Send(replies::ASK_PHONE_AGAIN.into())]);
        }

        let t = advance(&state, &input(Intent::Unknown, "+91 98765 43210"));
        assert!(t.state.have_phone);
        assert_eq!(t.state.step, Step::AwaitingConsent);
    }

    #[test]
    fn numeric_name_reasks() {
        let state = ConvState {
            step: Step::CollectingInfo,
            ..ConvState::default()
        };
        let t = advance(&state, &input(Intent::Unknown, "9876543210"));
        assert!(!t.state.have_name);
        assert_eq!(t.actions, vec![Action::Send(replies::ASK_NAME.into())]);
    }

    #[test]
    fn phone_shape_check() {
        assert!(looks_like_phone("+91 98765 43210"));
        assert!(looks_like_phone("(040) 2345-6789"));
        assert!(looks_like_phone("9876543210"));
        assert!(!looks_like_phone("banana"));
        assert!(!looks_like_phone("12345"));
        assert!(!looks_like_phone("my number is 9876543210"));
        assert!(!looks_like_phone("12345678901234567890"));
    }

    #[test]
    fn cancel_wins_from_any_step() {
        for step in [
            Step::Greeting,
            Step::CollectingInfo,
            Step::AwaitingConsent,
            Step::SelectingSlot,
            Step::Confirmed,
        ] {
            let state = ConvState {
                step,
                ..ConvState::default()
            };
            let t = advance(&state, &input(Intent::CancelAppointment, "cancel it"));
            assert_eq!(t.state.step, Step::Cancelled, "from {step:?}");
            assert!(t.actions.contains(&Action::CancelAppointment));
        }
    }

    #[test]
    fn cancelled_thread_can_book_again() {
        let state = ConvState {
            step: Step::Cancelled,
            ..ConvState::default()
        };
        let t = advance(&state, &input(Intent::BookAppointment, "actually, book me in"));
        assert_eq!(t.state.step, Step::CollectingInfo);
    }

    #[test]
    fn slot_choice_parsing() {
        assert_eq!(parse_slot_choice("2", 3), Some(1));
        assert_eq!(parse_slot_choice("slot 3 please", 3), Some(2));
        assert_eq!(parse_slot_choice("the 1st one", 3), Some(0));
        assert_eq!(parse_slot_choice("0", 3), None);
        assert_eq!(parse_slot_choice("4", 3), None);
        assert_eq!(parse_slot_choice("tomorrow", 3), None);
        assert_eq!(parse_slot_choice("2", 0), None);
    }
}
