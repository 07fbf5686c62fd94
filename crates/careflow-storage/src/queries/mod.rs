// SPDX-FileCopyrightText: 2026 Careflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed query modules, one per storage entity.

pub mod appointments;
pub mod audit;
pub mod conversations;
pub mod dead_letters;
pub mod doctors;
pub mod events;
pub mod messages;
pub mod patients;
pub mod payments;
pub mod queue;
