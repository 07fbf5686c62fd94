// SPDX-FileCopyrightText: 2026 Careflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Layered TOML configuration for the Careflow booking pipeline.
//!
//! Configuration flows: compiled defaults -> system TOML -> user TOML ->
//! local TOML -> `CAREFLOW_*` environment variables. Validation happens once
//! at startup with all errors collected for the operator.

pub mod loader;
pub mod model;
pub mod validation;

pub use loader::{load_config, load_config_from_path, load_config_from_str};
pub use model::CareflowConfig;
pub use validation::{load_and_validate, render_errors, validate};
