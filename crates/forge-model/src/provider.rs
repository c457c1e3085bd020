// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::Stream;

use crate::{CompletionRequest, NormalizedEvent};

pub type NormalizedEventStream =
    Pin<Box<dyn Stream<Item = anyhow::Result<NormalizedEvent>> + Send>>;

/// Cooperative cancellation handle, checked between await points by both the
/// adapter (while consuming the transport stream) and the turn engine
/// (before issuing a continuation). Cancel is idempotent.
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// `stream(...)` contract of §4.3: open a provider stream, translate vendor
/// events into the normalized vocabulary. The terminal `Stop` event carries
/// both the stop reason and any new continuation handle; adapters never
/// return those out-of-band.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Human-readable adapter name ("anthropic-blocks", "openai-responses", ...).
    fn name(&self) -> &str;

    async fn stream(
        &self,
        req: CompletionRequest,
        cancel: CancelToken,
    ) -> anyhow::Result<NormalizedEventStream>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_token_starts_uncancelled() {
        let t = CancelToken::new();
        assert!(!t.is_cancelled());
    }

    #[test]
    fn cancel_token_is_shared_across_clones() {
        let t = CancelToken::new();
        let clone = t.clone();
        clone.cancel();
        assert!(t.is_cancelled());
    }
}
