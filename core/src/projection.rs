//! Filtered projection engine for the knowledge graph.
//!
//! Produces bounded subgraphs so a UI can load a view of a large graph:
//! entities are selected first under the filter's constraints and caps, then
//! only relations whose *both* endpoints survived selection are kept. Totals
//! before filtering are reported alongside so clients can show coverage.

use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::{EngineError, EngineResult};
use crate::types::{Entity, Relation};

/// Sort key for entity selection.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SortBy {
    /// Mention occurrence count (default).
    #[default]
    Occurrence,
    /// Aggregated confidence.
    Confidence,
    /// Canonical name, lexicographic.
    Name,
}

/// Sort direction.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    /// Descending (default).
    #[default]
    Desc,
}

/// Filter options for a bounded graph projection.
///
/// All fields are optional on the wire; defaults and hard caps follow the
/// table below. Values above a hard cap are clamped, not rejected.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(default)]
pub struct GraphFilter {
    /// Restrict to one domain; `None` means no domain constraint.
    pub domain: Option<String>,
    /// Max entities returned. Default 500, hard cap 5000.
    pub max_entities: usize,
    /// Max relations returned. Default 500, hard cap 10000.
    pub max_relations: usize,
    /// Minimum entity occurrence (and relation weight). Default 1.
    pub min_occurrence: u64,
    /// Minimum entity confidence. Default 0.
    pub min_confidence: f32,
    /// Entity type tags to keep; empty means any.
    pub entity_types: BTreeSet<String>,
    /// Relation type tags to keep; empty means any.
    pub relation_types: BTreeSet<String>,
    /// Entity sort key.
    pub sort_by: SortBy,
    /// Entity sort direction.
    pub sort_order: SortOrder,
}

impl GraphFilter {
    /// Hard cap on returned entities.
    pub const MAX_ENTITIES_CAP: usize = 5000;
    /// Hard cap on returned relations.
    pub const MAX_RELATIONS_CAP: usize = 10_000;

    /// Validate ranges and clamp the caps.
    ///
    /// Returns `invalid_input` for zero limits or a confidence outside
    /// `[0, 1]`; limits above the hard caps are clamped silently.
    pub fn validated(mut self) -> EngineResult<Self> {
        if self.max_entities == 0 {
            return Err(EngineError::InvalidInput("max_entities must be ≥ 1".into()));
        }
        if self.max_relations == 0 {
            return Err(EngineError::InvalidInput("max_relations must be ≥ 1".into()));
        }
        if self.min_occurrence == 0 {
            return Err(EngineError::InvalidInput("min_occurrence must be ≥ 1".into()));
        }
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(EngineError::InvalidInput(
                "min_confidence must be within [0, 1]".into(),
            ));
        }
        self.max_entities = self.max_entities.min(Self::MAX_ENTITIES_CAP);
        self.max_relations = self.max_relations.min(Self::MAX_RELATIONS_CAP);
        Ok(self)
    }
}

impl Default for GraphFilter {
    fn default() -> Self {
        Self {
            domain: None,
            max_entities: 500,
            max_relations: 500,
            min_occurrence: 1,
            min_confidence: 0.0,
            entity_types: BTreeSet::new(),
            relation_types: BTreeSet::new(),
            sort_by: SortBy::default(),
            sort_order: SortOrder::default(),
        }
    }
}

/// Totals present in the graph before the filter was applied.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct ProjectionTotals {
    /// Entities in the (domain-scoped) graph.
    pub entities: u64,
    /// Relations in the (domain-scoped) graph.
    pub relations: u64,
}

/// A bounded subgraph produced by [`apply`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct FilteredProjection {
    /// Selected entities, in filter sort order.
    pub entities: Vec<Entity>,
    /// Selected relations, by weight descending. Endpoints are always a
    /// subset of `entities`.
    pub relations: Vec<Relation>,
    /// Counts before filtering.
    pub totals_before_filter: ProjectionTotals,
    /// The filter as applied (after clamping).
    pub applied_filter: GraphFilter,
}

/// Apply a filter to a graph snapshot. Pure; deterministic under the declared
/// sort order (ties broken by entity name, then id).
pub fn apply(
    entities: Vec<Entity>,
    relations: Vec<Relation>,
    filter: &GraphFilter,
) -> FilteredProjection {
    let totals = ProjectionTotals {
        entities: entities.len() as u64,
        relations: relations.len() as u64,
    };

    // Step 1: entity selection.
    let mut selected: Vec<Entity> = entities
        .into_iter()
        .filter(|e| filter.domain.as_deref().is_none_or(|d| e.domain == d))
        .filter(|e| filter.entity_types.is_empty() || filter.entity_types.contains(&e.entity_type))
        .filter(|e| e.occurrence >= filter.min_occurrence)
        .filter(|e| e.confidence >= filter.min_confidence)
        .collect();

    selected.sort_by(|a, b| {
        let ord = match filter.sort_by {
            SortBy::Occurrence => a.occurrence.cmp(&b.occurrence),
            SortBy::Confidence => a
                .confidence
                .partial_cmp(&b.confidence)
                .unwrap_or(std::cmp::Ordering::Equal),
            SortBy::Name => a.name.cmp(&b.name),
        };
        let ord = match filter.sort_order {
            SortOrder::Asc => ord,
            SortOrder::Desc => ord.reverse(),
        };
        ord.then_with(|| a.name.cmp(&b.name)).then_with(|| a.id.cmp(&b.id))
    });
    selected.truncate(filter.max_entities);

    let kept_ids: HashSet<&str> = selected.iter().map(|e| e.id.as_str()).collect();

    // Step 2: relation selection over the surviving entity set.
    let mut kept_relations: Vec<Relation> = relations
        .into_iter()
        .filter(|r| kept_ids.contains(r.source_id.as_str()) && kept_ids.contains(r.target_id.as_str()))
        .filter(|r| {
            filter.relation_types.is_empty() || filter.relation_types.contains(&r.relation_type)
        })
        .filter(|r| r.weight >= filter.min_occurrence)
        .collect();
    kept_relations.sort_by(|a, b| {
        b.weight
            .cmp(&a.weight)
            .then_with(|| a.source_id.cmp(&b.source_id))
            .then_with(|| a.target_id.cmp(&b.target_id))
            .then_with(|| a.relation_type.cmp(&b.relation_type))
    });
    kept_relations.truncate(filter.max_relations);

    FilteredProjection {
        entities: selected,
        relations: kept_relations,
        totals_before_filter: totals,
        applied_filter: filter.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{entity_id, normalize_entity_name};

    fn entity(name: &str, etype: &str, domain: &str, occurrence: u64, confidence: f32) -> Entity {
        let normalized = normalize_entity_name(name);
        Entity {
            id: entity_id(&normalized, etype),
            name: name.to_string(),
            entity_type: etype.to_string(),
            description: String::new(),
            aliases: Default::default(),
            domain: domain.to_string(),
            occurrence,
            confidence,
        }
    }

    fn relation(source: &Entity, target: &Entity, rtype: &str, weight: u64) -> Relation {
        Relation {
            source_id: source.id.clone(),
            target_id: target.id.clone(),
            relation_type: rtype.to_string(),
            evidence: vec![],
            confidence: 0.9,
            weight,
            domain: source.domain.clone(),
        }
    }

    fn sample_graph() -> (Vec<Entity>, Vec<Relation>) {
        let a = entity("Alice", "person", "general", 5, 0.9);
        let b = entity("Acme", "organization", "general", 8, 0.8);
        let c = entity("Paris", "location", "general", 3, 0.7);
        let d = entity("Widget", "product", "industrial", 2, 0.6);
        let relations = vec![
            relation(&a, &b, "works_for", 4),
            relation(&b, &c, "headquartered_in", 2),
            relation(&b, &d, "produces", 1),
        ];
        (vec![a, b, c, d], relations)
    }

    #[test]
    fn test_defaults() {
        let f = GraphFilter::default();
        assert_eq!(f.max_entities, 500);
        assert_eq!(f.max_relations, 500);
        assert_eq!(f.min_occurrence, 1);
        assert_eq!(f.min_confidence, 0.0);
        assert_eq!(f.sort_by, SortBy::Occurrence);
        assert_eq!(f.sort_order, SortOrder::Desc);
    }

    #[test]
    fn test_validation_rejects_zero_limits() {
        let err = GraphFilter { max_entities: 0, ..Default::default() }
            .validated()
            .unwrap_err();
        assert!(err.to_string().contains("max_entities"));
        assert!(GraphFilter { max_relations: 0, ..Default::default() }.validated().is_err());
        assert!(GraphFilter { min_occurrence: 0, ..Default::default() }.validated().is_err());
        assert!(
            GraphFilter { min_confidence: 1.5, ..Default::default() }.validated().is_err()
        );
    }

    #[test]
    fn test_validation_clamps_caps() {
        let f = GraphFilter {
            max_entities: 1_000_000,
            max_relations: 1_000_000,
            ..Default::default()
        }
        .validated()
        .unwrap();
        assert_eq!(f.max_entities, GraphFilter::MAX_ENTITIES_CAP);
        assert_eq!(f.max_relations, GraphFilter::MAX_RELATIONS_CAP);
    }

    #[test]
    fn test_apply_sorts_by_occurrence_desc() {
        let (entities, relations) = sample_graph();
        let projection = apply(entities, relations, &GraphFilter::default());
        let occurrences: Vec<u64> = projection.entities.iter().map(|e| e.occurrence).collect();
        assert_eq!(occurrences, vec![8, 5, 3, 2]);
        assert_eq!(projection.totals_before_filter.entities, 4);
        assert_eq!(projection.totals_before_filter.relations, 3);
    }

    #[test]
    fn test_apply_respects_caps_and_endpoint_subset() {
        let (entities, relations) = sample_graph();
        let filter = GraphFilter { max_entities: 2, ..Default::default() };
        let projection = apply(entities, relations, &filter);
        assert_eq!(projection.entities.len(), 2);
        let kept: HashSet<&str> = projection.entities.iter().map(|e| e.id.as_str()).collect();
        for rel in &projection.relations {
            assert!(kept.contains(rel.source_id.as_str()));
            assert!(kept.contains(rel.target_id.as_str()));
        }
        // Only Alice→Acme survives (Paris and Widget were cut)
        assert_eq!(projection.relations.len(), 1);
        assert_eq!(projection.relations[0].relation_type, "works_for");
    }

    #[test]
    fn test_apply_domain_filter() {
        let (entities, relations) = sample_graph();
        let filter = GraphFilter { domain: Some("industrial".into()), ..Default::default() };
        let projection = apply(entities, relations, &filter);
        assert_eq!(projection.entities.len(), 1);
        assert_eq!(projection.entities[0].name, "Widget");
        assert!(projection.relations.is_empty());
    }

    #[test]
    fn test_apply_min_occurrence_applies_to_relation_weight() {
        let (entities, relations) = sample_graph();
        let filter = GraphFilter { min_occurrence: 2, ..Default::default() };
        let projection = apply(entities, relations, &filter);
        // Widget (occurrence 2) stays; the produces edge (weight 1) is cut.
        assert!(projection.relations.iter().all(|r| r.weight >= 2));
    }

    #[test]
    fn test_apply_type_filters() {
        let (entities, relations) = sample_graph();
        let filter = GraphFilter {
            entity_types: ["person".to_string(), "organization".to_string()].into(),
            relation_types: ["works_for".to_string()].into(),
            ..Default::default()
        };
        let projection = apply(entities, relations, &filter);
        assert_eq!(projection.entities.len(), 2);
        assert_eq!(projection.relations.len(), 1);
    }

    #[test]
    fn test_apply_sort_by_name_asc() {
        let (entities, relations) = sample_graph();
        let filter = GraphFilter {
            sort_by: SortBy::Name,
            sort_order: SortOrder::Asc,
            ..Default::default()
        };
        let projection = apply(entities, relations, &filter);
        let names: Vec<&str> = projection.entities.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["Acme", "Alice", "Paris", "Widget"]);
    }

    #[test]
    fn test_apply_never_errors_when_fewer_present() {
        let (entities, relations) = sample_graph();
        let filter = GraphFilter { max_entities: 5000, max_relations: 10_000, ..Default::default() };
        let projection = apply(entities, relations, &filter);
        assert_eq!(projection.entities.len(), 4);
        assert_eq!(projection.relations.len(), 3);
    }

    #[test]
    fn test_apply_relations_sorted_by_weight_desc() {
        let (entities, relations) = sample_graph();
        let projection = apply(entities, relations, &GraphFilter::default());
        let weights: Vec<u64> = projection.relations.iter().map(|r| r.weight).collect();
        assert_eq!(weights, vec![4, 2, 1]);
    }

    #[test]
    fn test_filter_deserializes_with_defaults() {
        let filter: GraphFilter =
            serde_json::from_str(r#"{"max_entities": 50, "sort_by": "confidence"}"#).unwrap();
        assert_eq!(filter.max_entities, 50);
        assert_eq!(filter.max_relations, 500);
        assert_eq!(filter.sort_by, SortBy::Confidence);
    }
}
