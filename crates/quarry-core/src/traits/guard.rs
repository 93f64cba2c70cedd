// SPDX-FileCopyrightText: 2026 Quarry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use async_trait::async_trait;

use crate::types::GuardDecision;

/// Domain-membership gate evaluated before any generation cost is spent.
///
/// Guards are infallible: an implementation that cannot decide must fall
/// back to a heuristic decision of its own.
#[async_trait]
pub trait DomainGuard: Send + Sync {
    fn name(&self) -> &str;

    async fn check(&self, question: &str) -> GuardDecision;
}
