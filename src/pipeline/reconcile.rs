//! Boundary reconciliation: turn a raw section list into a valid partition.
//!
//! Two single left-to-right passes over the list sorted by start page:
//!
//! - **Phase A** removes overlaps. Exact duplicates of the current section
//!   are dropped; any other overlap is split at
//!   `floor((current.end + next.start) / 2)`.
//! - **Phase B** closes small gaps: when `0 < gap ≤ max_gap_fill`, the
//!   earlier section is extended up to the page before the next one. Larger
//!   gaps are left alone.
//!
//! The output is a fixed point: reconciling it again changes nothing.

use crate::output::Section;
use tracing::info;

/// Tuning for [`fix_boundaries`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileOptions {
    /// Largest gap (in pages) absorbed by the preceding section.
    pub max_gap_fill: u32,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self { max_gap_fill: 5 }
    }
}

/// Resolve overlaps, then fill small gaps.
pub fn fix_boundaries(sections: Vec<Section>, options: ReconcileOptions) -> Vec<Section> {
    let resolved = resolve_overlaps(sections);
    fill_gaps(resolved, options.max_gap_fill)
}

/// Phase A. The result is sorted and free of overlaps.
pub fn resolve_overlaps(mut sections: Vec<Section>) -> Vec<Section> {
    // Stable: equal start pages keep their input order.
    sections.sort_by_key(|s| s.start_page);

    let mut fixed: Vec<Section> = Vec::with_capacity(sections.len());
    for mut next in sections {
        let Some(current) = fixed.last_mut() else {
            fixed.push(next);
            continue;
        };

        if current.end_page < next.start_page {
            fixed.push(next);
            continue;
        }

        if current.start_page == next.start_page && current.end_page == next.end_page {
            info!(
                "Dropping duplicate section '{}' (same pages as '{}')",
                next.name, current.name
            );
            continue;
        }

        // Both halves must keep at least one page. Outside an earlier
        // rewrite breaking sort order the clamp never changes the midpoint.
        if next.end_page <= current.start_page {
            info!(
                "Dropping section '{}' ({}-{}): no pages left after '{}'",
                next.name, next.start_page, next.end_page, current.name
            );
            continue;
        }
        let sum = u64::from(current.end_page) + u64::from(next.start_page);
        let midpoint = ((sum / 2) as u32).clamp(current.start_page, next.end_page - 1);

        current.end_page = midpoint;
        next.start_page = midpoint + 1;
        info!(
            "Overlap between '{}' and '{}' split at page {}",
            current.name, next.name, midpoint
        );
        fixed.push(next);
    }
    fixed
}

/// Phase B. Extends a section over a following gap of `1..=max_gap` pages.
pub fn fill_gaps(mut sections: Vec<Section>, max_gap: u32) -> Vec<Section> {
    for i in 1..sections.len() {
        let next_start = sections[i].start_page;
        let current = &mut sections[i - 1];
        let gap = next_start.saturating_sub(current.end_page.saturating_add(1));
        if gap > 0 && gap <= max_gap {
            current.end_page = next_start - 1;
            info!("Filled {} page gap after '{}'", gap, current.name);
        }
    }
    sections
}
