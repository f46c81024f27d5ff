//! Process-wide application state.
//!
//! One [`AppState`] is built at startup and handed to every component that
//! needs the index or a persona chain. Both are lazy, memoized singletons:
//! the first caller triggers construction, later callers get the same
//! instance, and a failed construction is never cached — every subsequent
//! call retries from scratch.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OnceCell};

use crate::chain::{Persona, RagChain};
use crate::config::Config;
use crate::error::Result;
use crate::index::VectorIndex;

pub struct AppState {
    pub config: Config,
    index: OnceCell<Arc<VectorIndex>>,
    chains: Mutex<HashMap<Persona, Arc<RagChain>>>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        AppState {
            config,
            index: OnceCell::new(),
            chains: Mutex::new(HashMap::new()),
        }
    }

    /// The shared vector index, constructed on first access.
    ///
    /// `get_or_try_init` makes construction effectively exactly-once under
    /// concurrent first access, and leaves the cell empty on failure so the
    /// next caller retries.
    pub async fn index(&self) -> Result<Arc<VectorIndex>> {
        self.index
            .get_or_try_init(|| async { VectorIndex::connect(&self.config).await.map(Arc::new) })
            .await
            .cloned()
    }

    /// The memoized chain for a persona, built on first access.
    ///
    /// A build failure (e.g. unknown LLM provider) leaves the cache
    /// unchanged, so no chain exists after a configuration error.
    pub async fn chain(&self, persona: Persona) -> Result<Arc<RagChain>> {
        let mut chains = self.chains.lock().await;
        if let Some(chain) = chains.get(&persona) {
            return Ok(chain.clone());
        }

        let index = self.index().await?;
        let chain = Arc::new(RagChain::build(&self.config, persona, index)?);
        chains.insert(persona, chain.clone());
        Ok(chain)
    }
}
