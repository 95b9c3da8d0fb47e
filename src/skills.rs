//! Skill extraction against a versioned taxonomy.
//!
//! Matching is two-phase: exact alias n-grams first, then a bounded fuzzy pass
//! over spans no exact match touches. Overlapping candidates are resolved by
//! span length, taxonomy priority, confidence, and position, in that order, so
//! the same text and taxonomy always produce the same tags.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

use rustc_hash::FxHashSet;
use stop_words::{LANGUAGE, get};
use tracing::trace;

use crate::config::SkillMatchConfig;
use crate::data::{SkillCategory, SkillTag};
use crate::taxonomy::Taxonomy;
use crate::types::SkillName;
use crate::utils::{Token, join_tokens, tokenize};

/// Reusable extractor bound to one taxonomy.
///
/// Holds the stop-word set so repeated extraction does not rebuild it.
#[derive(Clone, Debug)]
pub struct SkillExtractor {
    taxonomy: Arc<Taxonomy>,
    config: SkillMatchConfig,
    stopwords: FxHashSet<String>,
}

impl SkillExtractor {
    /// Create an extractor for `taxonomy` using `config` thresholds.
    pub fn new(taxonomy: Arc<Taxonomy>, config: SkillMatchConfig) -> Self {
        Self {
            taxonomy,
            config,
            stopwords: load_stopwords(),
        }
    }

    /// Taxonomy this extractor matches against.
    pub fn taxonomy(&self) -> &Taxonomy {
        &self.taxonomy
    }

    /// Matching thresholds in effect.
    pub fn config(&self) -> &SkillMatchConfig {
        &self.config
    }

    /// Extract canonical skills from `text`, unique per name and sorted by name.
    pub fn extract(&self, text: &str) -> Vec<SkillTag> {
        extract_with(&self.taxonomy, &self.config, &self.stopwords, text)
    }
}

/// One-shot extraction without keeping an extractor around.
pub fn extract_skills(taxonomy: &Taxonomy, config: &SkillMatchConfig, text: &str) -> Vec<SkillTag> {
    extract_with(taxonomy, config, &load_stopwords(), text)
}

/// Group skill names by category, names sorted within each group.
pub fn categorize(tags: &[SkillTag]) -> BTreeMap<SkillCategory, Vec<SkillName>> {
    let mut grouped: BTreeMap<SkillCategory, Vec<SkillName>> = BTreeMap::new();
    for tag in tags {
        grouped.entry(tag.category).or_default().push(tag.name.clone());
    }
    for names in grouped.values_mut() {
        names.sort();
        names.dedup();
    }
    grouped
}

fn load_stopwords() -> FxHashSet<String> {
    get(LANGUAGE::English)
        .iter()
        .map(|word| word.to_lowercase())
        .collect()
}

/// A candidate match over tokens `[start, end)`.
#[derive(Clone, Debug)]
struct Candidate {
    start: usize,
    end: usize,
    entry: usize,
    confidence: f32,
}

impl Candidate {
    fn len(&self) -> usize {
        self.end - self.start
    }
}

fn extract_with(
    taxonomy: &Taxonomy,
    config: &SkillMatchConfig,
    stopwords: &FxHashSet<String>,
    text: &str,
) -> Vec<SkillTag> {
    let tokens = tokenize(text);
    if tokens.is_empty() {
        return Vec::new();
    }
    let max_ngram = config.max_ngram.min(taxonomy.max_alias_tokens()).max(1);

    let mut candidates = exact_candidates(taxonomy, &tokens, max_ngram);
    if config.fuzzy_enabled {
        let mut covered = vec![false; tokens.len()];
        for candidate in &candidates {
            covered[candidate.start..candidate.end].fill(true);
        }
        candidates.extend(fuzzy_candidates(
            taxonomy, config, stopwords, &tokens, &covered, max_ngram,
        ));
    }

    let accepted = resolve_overlaps(taxonomy, candidates, tokens.len());

    let mut by_name: BTreeMap<SkillName, SkillTag> = BTreeMap::new();
    for candidate in accepted {
        let entry = taxonomy.entry(candidate.entry);
        let span_start = tokens[candidate.start].start;
        let span_end = tokens[candidate.end - 1].end;
        let tag = SkillTag {
            name: entry.name.clone(),
            category: entry.category,
            confidence: candidate.confidence,
            matched: text[span_start..span_end].to_string(),
            span_start,
            span_end,
        };
        match by_name.get(&tag.name) {
            Some(existing)
                if existing.confidence > tag.confidence
                    || (existing.confidence == tag.confidence
                        && existing.span_start <= tag.span_start) => {}
            _ => {
                by_name.insert(tag.name.clone(), tag);
            }
        }
    }
    by_name.into_values().collect()
}

fn exact_candidates(taxonomy: &Taxonomy, tokens: &[Token], max_ngram: usize) -> Vec<Candidate> {
    let mut candidates = Vec::new();
    for start in 0..tokens.len() {
        let longest = max_ngram.min(tokens.len() - start);
        for len in 1..=longest {
            let key = join_tokens(&tokens[start..start + len]);
            if let Some(entry) = taxonomy.lookup(&key) {
                candidates.push(Candidate {
                    start,
                    end: start + len,
                    entry,
                    confidence: 1.0,
                });
            }
        }
    }
    candidates
}

fn fuzzy_candidates(
    taxonomy: &Taxonomy,
    config: &SkillMatchConfig,
    stopwords: &FxHashSet<String>,
    tokens: &[Token],
    covered: &[bool],
    max_ngram: usize,
) -> Vec<Candidate> {
    let mut candidates = Vec::new();
    for start in 0..tokens.len() {
        let longest = max_ngram.min(tokens.len() - start);
        for len in 1..=longest {
            let window = &tokens[start..start + len];
            if covered[start..start + len].iter().any(|hit| *hit) {
                break;
            }
            if !eligible_span(window, stopwords) {
                continue;
            }
            let span = join_tokens(window);
            if let Some((entry, confidence)) = best_fuzzy_alias(taxonomy, config, &span, len) {
                trace!(span = %span, skill = %taxonomy.entry(entry).name, confidence, "fuzzy skill match");
                candidates.push(Candidate {
                    start,
                    end: start + len,
                    entry,
                    confidence,
                });
            }
        }
    }
    candidates
}

/// Spans made of stop-words, or whose edges are stop-words or numbers, never
/// fuzzy-match.
fn eligible_span(window: &[Token], stopwords: &FxHashSet<String>) -> bool {
    let edge_ok = |token: &Token| {
        !stopwords.contains(&token.text) && token.text.chars().any(char::is_alphabetic)
    };
    match (window.first(), window.last()) {
        (Some(first), Some(last)) => edge_ok(first) && edge_ok(last),
        _ => false,
    }
}

fn best_fuzzy_alias(
    taxonomy: &Taxonomy,
    config: &SkillMatchConfig,
    span: &str,
    token_count: usize,
) -> Option<(usize, f32)> {
    let span_chars = span.chars().count();
    if span_chars < config.fuzzy_min_chars {
        return None;
    }
    let span_initial = span.chars().next()?;

    let mut best: Option<(usize, usize, u8, f64)> = None;
    for (alias, entry) in taxonomy.sorted_aliases() {
        if alias.split(' ').count() != token_count {
            continue;
        }
        let alias_chars = alias.chars().count();
        if alias_chars < config.fuzzy_min_chars
            || alias_chars.abs_diff(span_chars) > config.fuzzy_max_edits
        {
            continue;
        }
        if config.fuzzy_require_same_initial && alias.chars().next() != Some(span_initial) {
            continue;
        }
        let distance = strsim::damerau_levenshtein(span, alias);
        if distance == 0 || distance > config.fuzzy_max_edits {
            continue;
        }
        let similarity = 1.0 - distance as f64 / span_chars.max(alias_chars) as f64;
        if similarity < config.fuzzy_min_similarity {
            continue;
        }
        let priority = taxonomy.entry(*entry).priority;
        let better = match best {
            None => true,
            Some((_, best_distance, best_priority, _)) => {
                distance < best_distance || (distance == best_distance && priority > best_priority)
            }
        };
        if better {
            best = Some((*entry, distance, priority, similarity));
        }
    }

    best.map(|(entry, _, _, similarity)| (entry, similarity as f32))
}

fn resolve_overlaps(taxonomy: &Taxonomy, mut candidates: Vec<Candidate>, token_count: usize) -> Vec<Candidate> {
    candidates.sort_by(|a, b| compare_candidates(taxonomy, a, b));
    let mut taken = vec![false; token_count];
    let mut accepted = Vec::new();
    for candidate in candidates {
        if taken[candidate.start..candidate.end].iter().any(|hit| *hit) {
            continue;
        }
        taken[candidate.start..candidate.end].fill(true);
        accepted.push(candidate);
    }
    accepted
}

fn compare_candidates(taxonomy: &Taxonomy, a: &Candidate, b: &Candidate) -> Ordering {
    let entry_a = taxonomy.entry(a.entry);
    let entry_b = taxonomy.entry(b.entry);
    b.len()
        .cmp(&a.len())
        .then_with(|| entry_b.priority.cmp(&entry_a.priority))
        .then_with(|| b.confidence.total_cmp(&a.confidence))
        .then_with(|| a.start.cmp(&b.start))
        .then_with(|| entry_a.name.cmp(&entry_b.name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::taxonomy::{SalaryConventions, SkillEntry};

    fn extractor() -> SkillExtractor {
        SkillExtractor::new(
            Arc::new(Taxonomy::builtin().unwrap()),
            SkillMatchConfig::default(),
        )
    }

    fn names(tags: &[SkillTag]) -> Vec<&str> {
        tags.iter().map(|tag| tag.name.as_str()).collect()
    }

    #[test]
    fn exact_aliases_are_found_with_full_confidence() {
        let text = "Looking for a Python developer with React and AWS experience";
        let tags = extractor().extract(text);
        assert_eq!(names(&tags), vec!["aws", "python", "react"]);
        assert!(tags.iter().all(|tag| tag.confidence == 1.0));
        let react = tags.iter().find(|tag| tag.name == "react").unwrap();
        assert_eq!(&text[react.span_start..react.span_end], "React");
        assert_eq!(react.matched, "React");
    }

    #[test]
    fn misspelling_matches_fuzzily_with_reduced_confidence() {
        let tags = extractor().extract("experience with Kubernetis");
        assert_eq!(names(&tags), vec!["kubernetes"]);
        assert!(tags[0].confidence < 1.0);
        assert!(tags[0].confidence >= 0.85);
        assert_eq!(tags[0].matched, "Kubernetis");
    }

    #[test]
    fn fuzzy_matching_can_be_disabled() {
        let config = SkillMatchConfig {
            fuzzy_enabled: false,
            ..SkillMatchConfig::default()
        };
        let extractor = SkillExtractor::new(Arc::new(Taxonomy::builtin().unwrap()), config);
        assert!(extractor.extract("experience with Kubernetis").is_empty());
    }

    #[test]
    fn longest_span_wins_over_contained_alias() {
        let tags = extractor().extract("Build apps in React Native for iOS");
        assert_eq!(names(&tags), vec!["ios", "react native"]);
    }

    #[test]
    fn aliases_collapse_to_one_tag_per_skill() {
        let tags = extractor().extract("Postgres, PostgreSQL and pg. Also k8s and Kubernetes.");
        assert_eq!(names(&tags), vec!["kubernetes", "postgresql"]);
        let pg = &tags[1];
        assert_eq!(pg.matched, "Postgres");
    }

    #[test]
    fn symbol_languages_and_dotted_frameworks_match() {
        let tags = extractor().extract("We use C++, C#, Node.js, Next.js and CI/CD daily.");
        assert_eq!(names(&tags), vec!["c#", "c++", "ci/cd", "next.js", "node.js"]);
    }

    #[test]
    fn extraction_is_deterministic() {
        let extractor = extractor();
        let text = "Senior engineer: Rust, Kafka, Terraform, machine learning, Kubernetis, mentoring.";
        let first = extractor.extract(text);
        for _ in 0..5 {
            assert_eq!(extractor.extract(text), first);
        }
        let taxonomy = Taxonomy::builtin().unwrap();
        assert_eq!(
            extract_skills(&taxonomy, &SkillMatchConfig::default(), text),
            first
        );
    }

    #[test]
    fn empty_and_skill_free_text_yield_nothing() {
        let extractor = extractor();
        assert!(extractor.extract("").is_empty());
        assert!(extractor.extract("We value curiosity and kindness at scale.").is_empty());
    }

    #[test]
    fn priority_breaks_equal_length_ties() {
        let taxonomy = Taxonomy::new(
            "prio",
            vec![
                SkillEntry {
                    name: "data platform".into(),
                    category: SkillCategory::Tool,
                    priority: 0,
                    aliases: vec![],
                },
                SkillEntry {
                    name: "platform engineering".into(),
                    category: SkillCategory::SoftSkill,
                    priority: 5,
                    aliases: vec![],
                },
            ],
            SalaryConventions::default(),
        )
        .unwrap();
        let tags = extract_skills(
            &taxonomy,
            &SkillMatchConfig::default(),
            "data platform engineering",
        );
        assert_eq!(names(&tags), vec!["platform engineering"]);
    }

    #[test]
    fn categorize_groups_by_category() {
        let tags = extractor().extract("Python, Django, Docker and strong communication");
        let grouped = categorize(&tags);
        assert_eq!(grouped[&SkillCategory::Language], vec!["python"]);
        assert_eq!(grouped[&SkillCategory::Framework], vec!["django"]);
        assert_eq!(grouped[&SkillCategory::Tool], vec!["docker"]);
        assert_eq!(grouped[&SkillCategory::SoftSkill], vec!["communication"]);
    }
}
