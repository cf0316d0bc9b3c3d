// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the Conduit CLI

pub mod config;
pub mod logging;
pub mod model;
pub mod policy;
pub mod run;

pub use self::config::ConfigCommand;
pub use self::model::ModelCommand;
pub use self::policy::PolicyCommand;
