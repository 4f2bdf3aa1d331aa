//! Structure resolution over the aggregated batch text.
//!
//! Strategies are tried coarsest first (default 1, 3, 5 chunks). Within a
//! strategy chunks run strictly in order, each returning the complete
//! updated section list that becomes the context for the next chunk. A
//! transport failure or unparsable reply abandons the strategy; nothing
//! carries over to the next one.

use crate::output::Section;
use crate::pipeline::extract::parse_and_validate;
use crate::pipeline::reconcile::{fix_boundaries, ReconcileOptions};
use crate::pipeline::transport::AiBackend;
use crate::progress::ProgressCallback;
use crate::prompts::{structure_prompt_multi, structure_prompt_single, ChunkPosition};
use tracing::{debug, info, warn};

/// Result of [`StructureResolver::resolve`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Resolution {
    pub sections: Vec<Section>,
    /// Chunk count of the winning strategy; `None` when every strategy failed.
    pub chunk_count: Option<usize>,
}

/// Split `text` into `n` contiguous line ranges of `ceil(lines / n)` lines.
///
/// Line endings are kept. Ranges past the end of the text and whitespace-only
/// ranges are skipped, so fewer than `n` chunks may come back. Each returned
/// chunk keeps its 1-indexed position among the `n` parts.
pub fn split_into_chunks(text: &str, n: usize) -> Vec<(usize, String)> {
    let n = n.max(1);
    let lines: Vec<&str> = text.split_inclusive('\n').collect();
    let chunk_size = lines.len().div_ceil(n);

    (0..n)
        .filter_map(|i| {
            let start = (i * chunk_size).min(lines.len());
            let end = ((i + 1) * chunk_size).min(lines.len());
            let chunk = lines[start..end].concat();
            (!chunk.trim().is_empty()).then_some((i + 1, chunk))
        })
        .collect()
}

/// Runs the escalating chunk strategies against a text backend.
pub struct StructureResolver<'a> {
    backend: &'a dyn AiBackend,
    model: &'a str,
    section_names: &'a [String],
    strategies: &'a [usize],
    reconcile: ReconcileOptions,
    progress: Option<&'a ProgressCallback>,
}

impl<'a> StructureResolver<'a> {
    pub fn new(
        backend: &'a dyn AiBackend,
        model: &'a str,
        section_names: &'a [String],
        strategies: &'a [usize],
    ) -> Self {
        Self {
            backend,
            model,
            section_names,
            strategies,
            reconcile: ReconcileOptions::default(),
            progress: None,
        }
    }

    pub fn reconcile_options(mut self, options: ReconcileOptions) -> Self {
        self.reconcile = options;
        self
    }

    pub fn progress(mut self, progress: Option<&'a ProgressCallback>) -> Self {
        self.progress = progress;
        self
    }

    /// Never fails: exhausting every strategy yields an empty resolution.
    pub async fn resolve(&self, text: &str, total_pages: usize) -> Resolution {
        for &chunk_count in self.strategies {
            info!("Resolving structure with {} chunk(s)", chunk_count);
            if let Some(cb) = self.progress {
                cb.on_strategy_start(chunk_count);
            }

            if let Some(sections) = self.run_strategy(text, chunk_count, total_pages).await {
                info!(
                    "Structure resolved with {} chunk(s): {} sections",
                    chunk_count,
                    sections.len()
                );
                return Resolution {
                    sections,
                    chunk_count: Some(chunk_count),
                };
            }

            info!("{} chunk strategy failed, escalating", chunk_count);
            if let Some(cb) = self.progress {
                cb.on_strategy_failed(chunk_count);
            }
        }

        warn!("All chunk strategies exhausted; no sections identified");
        Resolution::default()
    }

    async fn run_strategy(
        &self,
        text: &str,
        chunk_count: usize,
        total_pages: usize,
    ) -> Option<Vec<Section>> {
        let mut current: Vec<Section> = Vec::new();

        for (part, chunk) in split_into_chunks(text, chunk_count) {
            let prompt = if chunk_count == 1 {
                structure_prompt_single(total_pages, self.section_names, &chunk)
            } else {
                let position = ChunkPosition {
                    part,
                    total_parts: chunk_count,
                };
                structure_prompt_multi(total_pages, self.section_names, &current, position, &chunk)
            };

            let reply = match self.backend.text(&prompt, self.model).await {
                Ok(reply) => reply,
                Err(e) => {
                    warn!("Chunk {}/{} request failed: {}", part, chunk_count, e);
                    return None;
                }
            };

            match parse_and_validate(&reply) {
                Some(sections) => {
                    debug!(
                        "Chunk {}/{} returned {} sections",
                        part,
                        chunk_count,
                        sections.len()
                    );
                    current = sections;
                }
                None => {
                    warn!("Chunk {}/{} reply had no usable structure", part, chunk_count);
                    return None;
                }
            }
        }

        let fixed = fix_boundaries(current, self.reconcile);
        (!fixed.is_empty()).then_some(fixed)
    }
}
