// SPDX-FileCopyrightText: 2026 Skiff Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed query functions. Each takes `&Database` and runs on its connection thread.

pub mod cron;
pub mod sessions;
