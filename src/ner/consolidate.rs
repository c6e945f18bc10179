//! Duplicate-detection consolidation.
//!
//! Recognizers may report several candidate labels for the same span.
//! Consolidation keeps exactly one entity per `(start, end)` span: the
//! highest-scoring candidate, with ties broken by the configured label
//! priority order so repeated runs produce identical output.
//!
//! Partially overlapping spans (neither identical nor contained) are NOT
//! merged: a name inside an email local-part is two legitimate detections,
//! and dropping either would lose information. Callers apply their own merge
//! policy if they need one.

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::models::{DetectedEntity, EntityType};

/// Rank of a label in the priority list; unlisted labels sort after all
/// listed ones and fall back to lexical order between themselves.
fn priority_rank(label: &EntityType, priority: &[EntityType]) -> usize {
    priority
        .iter()
        .position(|p| p == label)
        .unwrap_or(priority.len())
}

/// Pick the winner between two candidates over the same span.
fn better(a: &DetectedEntity, b: &DetectedEntity, priority: &[EntityType]) -> Ordering {
    match a.score.partial_cmp(&b.score).unwrap_or(Ordering::Equal) {
        Ordering::Equal => {
            // Lower rank = higher priority, so invert for "better".
            let ra = priority_rank(&a.label, priority);
            let rb = priority_rank(&b.label, priority);
            match rb.cmp(&ra) {
                Ordering::Equal => b.label.label().cmp(a.label.label()),
                other => other,
            }
        }
        other => other,
    }
}

/// Consolidate raw detections into one entity per identical span.
///
/// Output is sorted by `(start, end, label)` and deterministic for a given
/// input and priority order.
pub fn consolidate(
    entities: Vec<DetectedEntity>,
    priority: &[EntityType],
) -> Vec<DetectedEntity> {
    let mut by_span: HashMap<(usize, usize), DetectedEntity> =
        HashMap::with_capacity(entities.len());

    for entity in entities {
        let span = (entity.start, entity.end);
        match by_span.get(&span) {
            Some(existing) if better(&entity, existing, priority) != Ordering::Greater => {}
            _ => {
                by_span.insert(span, entity);
            }
        }
    }

    let mut consolidated: Vec<DetectedEntity> = by_span.into_values().collect();
    consolidated.sort_by(|a, b| {
        (a.start, a.end, a.label.label()).cmp(&(b.start, b.end, b.label.label()))
    });
    consolidated
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity(label: &str, start: usize, end: usize, score: f32) -> DetectedEntity {
        DetectedEntity::new(label, start, end, "x", score)
    }

    #[test]
    fn test_higher_score_wins_identical_span() {
        let out = consolidate(
            vec![entity("PERSON", 0, 10, 0.9), entity("ORG", 0, 10, 0.95)],
            &[],
        );
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].label, EntityType::Org);
    }

    #[test]
    fn test_tie_broken_by_priority_order() {
        let priority = vec![EntityType::Org, EntityType::Person];
        let out = consolidate(
            vec![entity("PERSON", 0, 10, 0.8), entity("ORG", 0, 10, 0.8)],
            &priority,
        );
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].label, EntityType::Org);

        // Reversed priority flips the winner.
        let priority = vec![EntityType::Person, EntityType::Org];
        let out = consolidate(
            vec![entity("PERSON", 0, 10, 0.8), entity("ORG", 0, 10, 0.8)],
            &priority,
        );
        assert_eq!(out[0].label, EntityType::Person);
    }

    #[test]
    fn test_tie_without_priority_is_deterministic() {
        // Neither label listed: lexical order decides, input order doesn't.
        let a = vec![entity("PERSON", 0, 5, 0.5), entity("DATE", 0, 5, 0.5)];
        let b = vec![entity("DATE", 0, 5, 0.5), entity("PERSON", 0, 5, 0.5)];
        let out_a = consolidate(a, &[]);
        let out_b = consolidate(b, &[]);
        assert_eq!(out_a, out_b);
        assert_eq!(out_a[0].label, EntityType::Date);
    }

    #[test]
    fn test_partial_overlaps_retained() {
        // Name embedded in an email local-part: both survive.
        let out = consolidate(
            vec![entity("PERSON", 0, 8, 0.9), entity("EMAIL", 0, 20, 0.95)],
            &[],
        );
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn test_non_overlapping_untouched() {
        let out = consolidate(
            vec![
                entity("PERSON", 0, 8, 0.9),
                entity("ORG", 26, 31, 0.9),
                entity("GPE", 48, 68, 0.9),
            ],
            &[],
        );
        assert_eq!(out.len(), 3);
        assert!(out.windows(2).all(|w| w[0].start <= w[1].start));
    }

    #[test]
    fn test_output_sorted_by_span() {
        let out = consolidate(
            vec![entity("ORG", 20, 30, 0.9), entity("PERSON", 0, 8, 0.9)],
            &[],
        );
        assert_eq!(out[0].start, 0);
        assert_eq!(out[1].start, 20);
    }
}
