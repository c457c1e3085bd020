// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod blocks;
mod mock;
mod provider;
mod responses;
mod types;

pub use blocks::BlocksAdapter;
pub use mock::ScriptedAdapter;
pub use provider::{CancelToken, NormalizedEventStream, ProviderAdapter};
pub use responses::ResponsesAdapter;
pub use types::*;

use forge_config::{AdapterFlavor, ModelConfig};

/// Construct a boxed [`ProviderAdapter`] from configuration (§4.3).
///
/// Selects the "blocks" or "response" adapter based on `cfg.flavor`; an
/// explicit `api_key` (turn-level override, §6) takes precedence over the
/// config's own key resolution.
pub fn from_config(cfg: &ModelConfig, api_key_override: Option<String>) -> anyhow::Result<Box<dyn ProviderAdapter>> {
    let api_key = api_key_override
        .or_else(|| cfg.api_key.clone())
        .or_else(|| cfg.api_key_env.as_ref().and_then(|env| std::env::var(env).ok()))
        .ok_or_else(|| anyhow::anyhow!("no API key resolved for model {:?}", cfg.name))?;

    match cfg.flavor {
        AdapterFlavor::Blocks => {
            let mut adapter = BlocksAdapter::new(api_key, cfg.name.clone());
            if let Some(base) = &cfg.base_url {
                adapter = adapter.with_base_url(base.clone());
            }
            Ok(Box::new(adapter))
        }
        AdapterFlavor::Response => {
            let mut adapter = ResponsesAdapter::new(api_key, cfg.name.clone());
            if let Some(base) = &cfg.base_url {
                adapter = adapter.with_base_url(base.clone());
            }
            Ok(Box::new(adapter))
        }
    }
}
