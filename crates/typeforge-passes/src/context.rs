//! Shared pipeline state.
//!
//! The Markov scorer is expensive to build, so the context owns it behind
//! a lazy handle; union identifiers are handed out from a counter so every
//! union created during one pipeline run gets a distinct id.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;

use crate::markov::MarkovChain;

#[derive(Default)]
pub struct PipelineContext {
    markov: OnceLock<MarkovChain>,
    next_union_id: AtomicU64,
}

impl PipelineContext {
    pub fn new() -> PipelineContext {
        PipelineContext::default()
    }

    pub fn markov(&self) -> &MarkovChain {
        self.markov.get_or_init(MarkovChain::trained)
    }

    pub fn next_union_id(&self) -> u64 {
        self.next_union_id.fetch_add(1, Ordering::Relaxed)
    }
}
