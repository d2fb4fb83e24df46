//! Entity resolution: normalize, block, and merge detected spans.
//!
//! Resolution turns raw NER spans into canonical entities with deterministic
//! ids:
//! 1. Normalize the name (lowercase, fold whitespace, strip punctuation).
//! 2. Compute a blocking key `(normalized_name_prefix, type)` and look up
//!    candidates in-process.
//! 3. Merge when the full normalized names match, the fuzzy ratio clears the
//!    threshold (default 0.92), or one name abbreviates the other; merging
//!    unions aliases and keeps the max confidence.
//! 4. Otherwise mint a fresh deterministic id.
//!
//! Occurrence counts are *not* maintained here: the graph store derives them
//! from observed-once mention edges.

use std::collections::{BTreeMap, HashMap};

use lattica_core::{entity_id, normalize_entity_name, Entity, Mention, OffsetSpan};

use crate::NerSpan;

/// Fuzzy-match threshold above which two normalized names merge.
pub const MERGE_THRESHOLD: f32 = 0.92;
/// Blocking key prefix length over the normalized name.
pub const BLOCK_PREFIX_LEN: usize = 4;

/// Normalized Levenshtein similarity: `1 − distance / max_len`, in `[0, 1]`.
pub fn fuzzy_ratio(a: &str, b: &str) -> f32 {
    if a == b {
        return 1.0;
    }
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    if a_chars.is_empty() || b_chars.is_empty() {
        return 0.0;
    }
    let mut previous: Vec<usize> = (0..=b_chars.len()).collect();
    let mut current = vec![0usize; b_chars.len() + 1];
    for (i, &ac) in a_chars.iter().enumerate() {
        current[0] = i + 1;
        for (j, &bc) in b_chars.iter().enumerate() {
            let substitution = previous[j] + usize::from(ac != bc);
            current[j + 1] = substitution.min(previous[j + 1] + 1).min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }
    let distance = previous[b_chars.len()];
    1.0 - distance as f32 / a_chars.len().max(b_chars.len()) as f32
}

/// Whether `short` reads as an abbreviation of `long`: an all-caps token of
/// 2+ letters whose letters initial the words of `long`, in order.
pub fn is_abbreviation(short: &str, long: &str) -> bool {
    let letters: Vec<char> = short.chars().filter(|c| c.is_alphabetic()).collect();
    if letters.len() < 2 || !short.chars().filter(|c| c.is_alphabetic()).all(|c| c.is_uppercase()) {
        return false;
    }
    let initials: Vec<char> = long
        .split_whitespace()
        .filter_map(|w| w.chars().next())
        .collect();
    if initials.len() != letters.len() {
        return false;
    }
    letters
        .iter()
        .zip(&initials)
        .all(|(a, b)| a.eq_ignore_ascii_case(b))
}

/// In-process entity resolver accumulating canonical entities and mentions
/// across the chunks of one ingestion run.
pub struct EntityResolver {
    domain: String,
    /// Canonical entities by id.
    entities: BTreeMap<String, Entity>,
    /// Exact lookup: `(normalized_name, type)` → id.
    by_normalized: HashMap<(String, String), String>,
    /// Blocking index: `(prefix, type)` → candidate ids.
    blocks: HashMap<(String, String), Vec<String>>,
    /// Alias lookup for relation endpoint resolution: normalized alias → id.
    alias_index: HashMap<String, String>,
    /// Observed-once mention pairs.
    mentions: BTreeMap<(String, String), Mention>,
}

impl EntityResolver {
    /// Create a resolver for one document's domain.
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            entities: BTreeMap::new(),
            by_normalized: HashMap::new(),
            blocks: HashMap::new(),
            alias_index: HashMap::new(),
            mentions: BTreeMap::new(),
        }
    }

    fn block_key(normalized: &str, entity_type: &str) -> (String, String) {
        let prefix: String = normalized.chars().take(BLOCK_PREFIX_LEN).collect();
        (prefix, entity_type.to_string())
    }

    /// Resolve a span observed in `chunk_id` to a canonical entity id,
    /// recording the mention.
    pub fn observe(&mut self, span: &NerSpan, chunk_id: &str) -> Option<String> {
        let normalized = normalize_entity_name(&span.text);
        if normalized.is_empty() {
            return None;
        }
        let id = self.resolve_name(&span.text, &normalized, &span.label, span.confidence);
        let key = (id.clone(), chunk_id.to_string());
        self.mentions.entry(key).or_insert_with(|| Mention {
            entity_id: id.clone(),
            chunk_id: chunk_id.to_string(),
            span: Some(OffsetSpan {
                start: span.start as u32,
                end: span.end as u32,
            }),
        });
        Some(id)
    }

    /// Resolve a surface form (e.g. a relation endpoint) to an existing
    /// entity id, without creating one.
    pub fn lookup(&self, text: &str) -> Option<String> {
        let normalized = normalize_entity_name(text);
        self.alias_index.get(&normalized).cloned()
    }

    fn resolve_name(
        &mut self,
        surface: &str,
        normalized: &str,
        entity_type: &str,
        confidence: f32,
    ) -> String {
        // 1. Exact normalized match for this type.
        if let Some(id) = self
            .by_normalized
            .get(&(normalized.to_string(), entity_type.to_string()))
            .cloned()
        {
            self.merge_into(&id, surface, normalized, confidence);
            return id;
        }

        // 2. Fuzzy / abbreviation candidates from the blocking index.
        let block = Self::block_key(normalized, entity_type);
        let candidates = self.blocks.get(&block).cloned().unwrap_or_default();
        for candidate_id in candidates {
            let Some(candidate) = self.entities.get(&candidate_id) else { continue };
            let candidate_norm = normalize_entity_name(&candidate.name);
            if fuzzy_ratio(normalized, &candidate_norm) >= MERGE_THRESHOLD {
                self.merge_into(&candidate_id, surface, normalized, confidence);
                return candidate_id;
            }
        }
        // Abbreviations block differently (prefix differs), so scan aliases.
        if surface.len() <= 8 {
            let abbreviation_match = self
                .entities
                .values()
                .find(|e| e.entity_type == entity_type && is_abbreviation(surface, &e.name))
                .map(|e| e.id.clone());
            if let Some(id) = abbreviation_match {
                self.merge_into(&id, surface, normalized, confidence);
                return id;
            }
        }

        // 3. Fresh deterministic id.
        let id = entity_id(normalized, entity_type);
        let entity = Entity {
            id: id.clone(),
            name: surface.to_string(),
            entity_type: entity_type.to_string(),
            description: String::new(),
            aliases: Default::default(),
            domain: self.domain.clone(),
            occurrence: 0,
            confidence: confidence.clamp(0.0, 1.0),
        };
        self.by_normalized
            .insert((normalized.to_string(), entity_type.to_string()), id.clone());
        self.blocks.entry(block).or_default().push(id.clone());
        self.alias_index.insert(normalized.to_string(), id.clone());
        self.entities.insert(id.clone(), entity);
        id
    }

    fn merge_into(&mut self, id: &str, surface: &str, normalized: &str, confidence: f32) {
        if let Some(entity) = self.entities.get_mut(id) {
            if entity.name != surface {
                entity.aliases.insert(surface.to_string());
            }
            entity.confidence = entity.confidence.max(confidence.clamp(0.0, 1.0));
        }
        self.alias_index
            .entry(normalized.to_string())
            .or_insert_with(|| id.to_string());
    }

    /// Consume the resolver, returning entities sorted by id and mentions in
    /// deterministic order.
    pub fn into_parts(self) -> (Vec<Entity>, Vec<Mention>) {
        (
            self.entities.into_values().collect(),
            self.mentions.into_values().collect(),
        )
    }

    /// Number of distinct entities resolved so far.
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }
}
