// SPDX-FileCopyrightText: 2026 Careflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation agent: state machine, orchestrator, and queue workers.
//!
//! The split keeps the transition logic pure ([`fsm`]), the side effects
//! in one place ([`orchestrator`]), and the queue mechanics separate
//! ([`worker`]). Pre-consent identity fields live only in [`ephemeral`]
//! until the patient agrees to storage.

pub mod ephemeral;
pub mod fsm;
pub mod orchestrator;
pub mod worker;

pub use ephemeral::EphemeralStore;
pub use orchestrator::{Orchestrator, OrchestratorSettings};
pub use worker::{Worker, WorkerSettings};
