//! Shared test harness modules for the hazmap CLI.
#![expect(
    clippy::panic,
    reason = "Tests assert panic branches to surface unexpected CLI outcomes"
)]

use super::*;

#[cfg(feature = "store-sqlite")]
mod helpers;
mod parsing;
