//! Canonical skill taxonomy and salary-unit conventions.
//!
//! A `Taxonomy` is immutable once built and carries its own version label, so
//! extractors built from different taxonomies can coexist in one process.

use std::fs;
use std::path::Path;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::data::SkillCategory;
use crate::errors::PipelineError;
use crate::hash::{stable_hash_str, stable_hash_with};
use crate::types::{AliasKey, CurrencyCode, SkillName, TaxonomyVersion};
use crate::utils::{join_tokens, tokenize};

/// Version label of the built-in taxonomy.
pub const BUILTIN_VERSION: &str = "builtin-1";

/// One canonical skill and the spellings that map to it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SkillEntry {
    /// Canonical skill name (also matched as an alias).
    pub name: SkillName,
    /// Skill category.
    pub category: SkillCategory,
    /// Tie-break priority for overlapping matches of equal length (higher wins).
    #[serde(default)]
    pub priority: u8,
    /// Additional spellings.
    #[serde(default)]
    pub aliases: Vec<String>,
}

/// Currency, period, and keyword conventions used by salary extraction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SalaryConventions {
    /// Currency symbols (longest first when matched) and their ISO codes.
    pub currency_symbols: Vec<(String, CurrencyCode)>,
    /// Recognized ISO currency codes.
    pub currency_codes: Vec<CurrencyCode>,
    /// Qualifiers marking hourly figures.
    pub hourly_qualifiers: Vec<String>,
    /// Qualifiers marking annual figures.
    pub yearly_qualifiers: Vec<String>,
    /// Qualifiers marking monthly figures (annualized).
    pub monthly_qualifiers: Vec<String>,
    /// Words that signal a compensation context.
    pub context_keywords: Vec<String>,
    /// Words or symbols that mark a figure as an estimate.
    pub estimate_markers: Vec<String>,
    /// Terms that look like figures but never denote pay, such as `401k`.
    #[serde(default = "default_excluded_terms")]
    pub excluded_terms: Vec<String>,
}

fn default_excluded_terms() -> Vec<String> {
    ["401k", "401(k)", "403b", "403(b)", "457b", "457(b)"]
        .iter()
        .map(|term| term.to_string())
        .collect()
}

impl Default for SalaryConventions {
    fn default() -> Self {
        fn owned(values: &[&str]) -> Vec<String> {
            values.iter().map(|value| value.to_string()).collect()
        }
        Self {
            currency_symbols: [
                ("US$", "USD"),
                ("CA$", "CAD"),
                ("C$", "CAD"),
                ("AU$", "AUD"),
                ("A$", "AUD"),
                ("NZ$", "NZD"),
                ("$", "USD"),
                ("€", "EUR"),
                ("£", "GBP"),
                ("¥", "JPY"),
                ("₹", "INR"),
            ]
            .iter()
            .map(|(symbol, code)| (symbol.to_string(), code.to_string()))
            .collect(),
            currency_codes: owned(&[
                "USD", "EUR", "GBP", "CAD", "AUD", "NZD", "JPY", "INR", "CHF", "SEK", "NOK", "DKK",
                "PLN", "SGD",
            ]),
            hourly_qualifiers: owned(&[
                "/hr", "/hour", "/h", "per hour", "an hour", "a hour", "hourly", "ph",
            ]),
            yearly_qualifiers: owned(&[
                "/yr",
                "/year",
                "/y",
                "per year",
                "a year",
                "per annum",
                "/annum",
                "annually",
                "annual",
                "p.a.",
                "pa",
            ]),
            monthly_qualifiers: owned(&["/mo", "/month", "per month", "a month", "monthly"]),
            context_keywords: owned(&[
                "salary",
                "compensation",
                "pay",
                "wage",
                "base",
                "ote",
                "remuneration",
            ]),
            estimate_markers: owned(&[
                "~",
                "approximately",
                "approx",
                "around",
                "estimated",
                "est",
            ]),
            excluded_terms: default_excluded_terms(),
        }
    }
}

/// Serialized taxonomy document (`version`, `skills`, optional `salary`).
#[derive(Debug, Deserialize)]
struct TaxonomyDocument {
    version: TaxonomyVersion,
    skills: Vec<SkillEntry>,
    #[serde(default)]
    salary: Option<SalaryConventions>,
}

/// Immutable, versioned alias index over canonical skills.
#[derive(Clone, Debug)]
pub struct Taxonomy {
    version: TaxonomyVersion,
    entries: Vec<SkillEntry>,
    aliases: FxHashMap<AliasKey, usize>,
    /// Alias keys sorted lexicographically, used for deterministic fuzzy scans.
    sorted_aliases: Vec<(AliasKey, usize)>,
    max_alias_tokens: usize,
    salary: SalaryConventions,
}

impl Taxonomy {
    /// Build a taxonomy, rejecting duplicate names and aliases claimed by two skills.
    pub fn new(
        version: impl Into<TaxonomyVersion>,
        entries: Vec<SkillEntry>,
        salary: SalaryConventions,
    ) -> Result<Self, PipelineError> {
        let version = version.into();
        if version.trim().is_empty() {
            return Err(PipelineError::TaxonomyLoad(
                "taxonomy version must not be empty".into(),
            ));
        }
        let mut names: FxHashMap<String, usize> = FxHashMap::default();
        let mut aliases: FxHashMap<AliasKey, usize> = FxHashMap::default();
        let mut max_alias_tokens = 0usize;

        for (idx, entry) in entries.iter().enumerate() {
            if entry.name.trim().is_empty() {
                return Err(PipelineError::TaxonomyLoad(format!(
                    "skill entry #{idx} has an empty name"
                )));
            }
            if let Some(previous) = names.insert(entry.name.clone(), idx) {
                return Err(PipelineError::TaxonomyLoad(format!(
                    "skill '{}' is defined twice (entries #{previous} and #{idx})",
                    entry.name
                )));
            }
            for spelling in std::iter::once(&entry.name).chain(entry.aliases.iter()) {
                let tokens = tokenize(spelling);
                if tokens.is_empty() {
                    return Err(PipelineError::TaxonomyLoad(format!(
                        "alias '{spelling}' of skill '{}' has no matchable characters",
                        entry.name
                    )));
                }
                max_alias_tokens = max_alias_tokens.max(tokens.len());
                let key = join_tokens(&tokens);
                match aliases.get(&key) {
                    Some(&owner) if owner != idx => {
                        return Err(PipelineError::TaxonomyLoad(format!(
                            "alias '{key}' maps to both '{}' and '{}'",
                            entries[owner].name, entry.name
                        )));
                    }
                    Some(_) => {}
                    None => {
                        aliases.insert(key, idx);
                    }
                }
            }
        }

        let mut sorted_aliases: Vec<(AliasKey, usize)> = aliases
            .iter()
            .map(|(key, idx)| (key.clone(), *idx))
            .collect();
        sorted_aliases.sort();

        Ok(Self {
            version,
            entries,
            aliases,
            sorted_aliases,
            max_alias_tokens,
            salary,
        })
    }

    /// Parse a JSON taxonomy document.
    ///
    /// Expected shape: `{"version": "...", "skills": [{"name", "category",
    /// "priority"?, "aliases"?}], "salary"?: {...}}`.
    pub fn from_json_str(raw: &str) -> Result<Self, PipelineError> {
        let document: TaxonomyDocument = serde_json::from_str(raw)
            .map_err(|err| PipelineError::TaxonomyLoad(format!("invalid taxonomy JSON: {err}")))?;
        Self::new(
            document.version,
            document.skills,
            document.salary.unwrap_or_default(),
        )
    }

    /// Load a JSON taxonomy document from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PipelineError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|err| {
            PipelineError::TaxonomyLoad(format!("cannot read {}: {err}", path.display()))
        })?;
        Self::from_json_str(&raw)
    }

    /// The curated built-in taxonomy.
    pub fn builtin() -> Result<Self, PipelineError> {
        Self::new(
            BUILTIN_VERSION,
            builtin_entries(),
            SalaryConventions::default(),
        )
    }

    /// Version label.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Deterministic fingerprint over version and alias table.
    pub fn fingerprint(&self) -> u64 {
        let seed = stable_hash_str(0, &self.version);
        stable_hash_with(|hasher| {
            use std::hash::Hash;
            seed.hash(hasher);
            for (alias, idx) in &self.sorted_aliases {
                alias.hash(hasher);
                self.entries[*idx].name.hash(hasher);
            }
        })
    }

    /// All canonical entries in definition order.
    pub fn entries(&self) -> &[SkillEntry] {
        &self.entries
    }

    /// Entry by index.
    pub fn entry(&self, idx: usize) -> &SkillEntry {
        &self.entries[idx]
    }

    /// Resolve a normalized alias key to its entry index.
    pub fn lookup(&self, alias_key: &str) -> Option<usize> {
        self.aliases.get(alias_key).copied()
    }

    /// Resolve any spelling (normalized the same way as text) to its entry.
    pub fn resolve(&self, spelling: &str) -> Option<&SkillEntry> {
        let key = join_tokens(&tokenize(spelling));
        self.lookup(&key).map(|idx| &self.entries[idx])
    }

    /// Alias keys sorted lexicographically with their entry index.
    pub fn sorted_aliases(&self) -> &[(AliasKey, usize)] {
        &self.sorted_aliases
    }

    /// Longest alias length in tokens.
    pub fn max_alias_tokens(&self) -> usize {
        self.max_alias_tokens
    }

    /// Salary conventions bundled with this taxonomy.
    pub fn salary(&self) -> &SalaryConventions {
        &self.salary
    }
}

fn builtin_entries() -> Vec<SkillEntry> {
    use SkillCategory::{Framework, Language, SoftSkill, Tool};

    let table: &[(&str, SkillCategory, u8, &[&str])] = &[
        // Languages
        ("python", Language, 0, &["py", "python3"]),
        ("javascript", Language, 0, &["js", "ecmascript"]),
        ("typescript", Language, 0, &["ts"]),
        ("java", Language, 0, &[]),
        ("golang", Language, 0, &["go lang"]),
        ("rust", Language, 0, &["rustlang"]),
        ("c++", Language, 0, &["cpp"]),
        ("c#", Language, 0, &["csharp"]),
        ("ruby", Language, 0, &[]),
        ("php", Language, 0, &[]),
        ("swift", Language, 0, &[]),
        ("kotlin", Language, 0, &[]),
        ("scala", Language, 0, &[]),
        ("r language", Language, 0, &["r programming", "rstudio"]),
        ("matlab", Language, 0, &[]),
        ("perl", Language, 0, &[]),
        ("shell", Language, 0, &["bash", "shell scripting"]),
        ("sql", Language, 0, &[]),
        ("html", Language, 0, &["html5"]),
        ("css", Language, 0, &["css3"]),
        // Frontend
        ("react", Framework, 1, &["reactjs", "react.js"]),
        ("vue", Framework, 1, &["vuejs", "vue.js"]),
        ("angular", Framework, 1, &["angularjs"]),
        ("svelte", Framework, 1, &[]),
        ("next.js", Framework, 1, &["nextjs"]),
        ("nuxt", Framework, 1, &["nuxtjs", "nuxt.js"]),
        ("gatsby", Framework, 1, &[]),
        ("sass", Tool, 0, &["scss"]),
        ("tailwind", Framework, 1, &["tailwindcss", "tailwind css"]),
        ("bootstrap", Framework, 1, &[]),
        ("webpack", Tool, 0, &[]),
        ("vite", Tool, 0, &[]),
        // Backend
        ("node.js", Framework, 1, &["nodejs", "node"]),
        ("express.js", Framework, 1, &["expressjs"]),
        ("django", Framework, 1, &[]),
        ("flask", Framework, 1, &[]),
        ("fastapi", Framework, 1, &[]),
        ("rails", Framework, 1, &["ruby on rails", "ror"]),
        ("spring", Framework, 1, &["spring boot", "springboot"]),
        ("graphql", Tool, 0, &[]),
        ("rest api", Tool, 1, &["rest apis", "restful", "restful api", "restful apis"]),
        ("grpc", Tool, 0, &[]),
        ("websocket", Tool, 0, &["websockets"]),
        // Databases
        ("postgresql", Tool, 0, &["postgres", "pg"]),
        ("mysql", Tool, 0, &[]),
        ("mongodb", Tool, 0, &["mongo"]),
        ("redis", Tool, 0, &[]),
        ("elasticsearch", Tool, 0, &["elastic search"]),
        ("dynamodb", Tool, 0, &["dynamo db"]),
        ("cassandra", Tool, 0, &[]),
        ("firebase", Tool, 0, &[]),
        ("supabase", Tool, 0, &[]),
        ("prisma", Tool, 0, &[]),
        // Cloud & DevOps
        ("aws", Tool, 0, &["amazon web services"]),
        ("gcp", Tool, 0, &["google cloud", "google cloud platform"]),
        ("azure", Tool, 0, &["microsoft azure"]),
        ("docker", Tool, 0, &[]),
        ("kubernetes", Tool, 0, &["k8s"]),
        ("terraform", Tool, 0, &[]),
        ("ansible", Tool, 0, &[]),
        ("jenkins", Tool, 0, &[]),
        ("github actions", Tool, 1, &[]),
        ("gitlab ci", Tool, 1, &[]),
        ("circleci", Tool, 0, &["circle ci"]),
        ("cloudformation", Tool, 0, &[]),
        // ML/AI
        ("machine learning", Tool, 1, &["ml"]),
        ("deep learning", Tool, 1, &["dl"]),
        ("tensorflow", Framework, 1, &["tf"]),
        ("pytorch", Framework, 1, &[]),
        ("keras", Framework, 1, &[]),
        ("nlp", Tool, 0, &["natural language processing"]),
        ("computer vision", Tool, 1, &[]),
        ("pandas", Framework, 1, &[]),
        ("numpy", Framework, 1, &[]),
        ("scikit-learn", Framework, 1, &["sklearn", "scikit learn"]),
        ("llm", Tool, 0, &["llms", "large language models"]),
        ("langchain", Framework, 1, &[]),
        ("hugging face", Tool, 1, &["huggingface"]),
        // Data engineering
        ("spark", Tool, 0, &["apache spark", "pyspark"]),
        ("hadoop", Tool, 0, &[]),
        ("kafka", Tool, 0, &["apache kafka"]),
        ("airflow", Tool, 0, &["apache airflow"]),
        ("dbt", Tool, 0, &[]),
        ("etl", Tool, 0, &[]),
        ("data pipeline", Tool, 1, &["data pipelines"]),
        // Mobile
        ("react native", Framework, 2, &[]),
        ("flutter", Framework, 1, &[]),
        ("ios", Tool, 0, &[]),
        ("android", Tool, 0, &[]),
        ("swiftui", Framework, 1, &[]),
        ("jetpack compose", Framework, 1, &[]),
        // Other tooling
        ("git", Tool, 0, &[]),
        ("linux", Tool, 0, &[]),
        ("ci/cd", Tool, 1, &["cicd", "continuous integration"]),
        ("microservices", Tool, 0, &["microservice"]),
        ("oauth", Tool, 0, &["oauth2"]),
        ("jwt", Tool, 0, &[]),
        // Practices and soft skills
        ("agile", SoftSkill, 0, &[]),
        ("scrum", SoftSkill, 0, &[]),
        ("system design", SoftSkill, 1, &[]),
        ("communication", SoftSkill, 0, &["communication skills"]),
        ("leadership", SoftSkill, 0, &[]),
        ("mentoring", SoftSkill, 0, &["mentorship"]),
        ("problem solving", SoftSkill, 0, &["problem-solving"]),
        ("collaboration", SoftSkill, 0, &["teamwork"]),
    ];

    table
        .iter()
        .map(|(name, category, priority, aliases)| SkillEntry {
            name: name.to_string(),
            category: *category,
            priority: *priority,
            aliases: aliases.iter().map(|alias| alias.to_string()).collect(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, aliases: &[&str]) -> SkillEntry {
        SkillEntry {
            name: name.to_string(),
            category: SkillCategory::Tool,
            priority: 0,
            aliases: aliases.iter().map(|a| a.to_string()).collect(),
        }
    }

    #[test]
    fn builtin_taxonomy_loads() {
        let taxonomy = Taxonomy::builtin().unwrap();
        assert_eq!(taxonomy.version(), BUILTIN_VERSION);
        assert_eq!(taxonomy.resolve("Postgres").unwrap().name, "postgresql");
        assert_eq!(taxonomy.resolve("React.js").unwrap().name, "react");
        assert_eq!(taxonomy.resolve("CI/CD").unwrap().name, "ci/cd");
        assert_eq!(taxonomy.max_alias_tokens(), 3);
    }

    #[test]
    fn duplicate_alias_across_skills_is_rejected() {
        let err = Taxonomy::new(
            "dup",
            vec![entry("postgresql", &["pg"]), entry("pgbouncer", &["pg"])],
            SalaryConventions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::TaxonomyLoad(_)));
        assert!(err.to_string().contains("'pg'"));
    }

    #[test]
    fn alias_differing_only_in_punctuation_collides() {
        let err = Taxonomy::new(
            "dup",
            vec![entry("ci/cd", &[]), entry("ci-cd", &[])],
            SalaryConventions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::TaxonomyLoad(_)));
    }

    #[test]
    fn repeated_alias_for_same_skill_is_allowed() {
        let taxonomy = Taxonomy::new(
            "ok",
            vec![entry("kubernetes", &["k8s", "K8S", "kubernetes"])],
            SalaryConventions::default(),
        )
        .unwrap();
        assert_eq!(taxonomy.sorted_aliases().len(), 2);
    }

    #[test]
    fn duplicate_skill_name_is_rejected() {
        let err = Taxonomy::new(
            "dup",
            vec![entry("rust", &[]), entry("rust", &["rustlang"])],
            SalaryConventions::default(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("defined twice"));
    }

    #[test]
    fn json_document_round_trips_through_loader() {
        let raw = r#"{
            "version": "custom-v2",
            "skills": [
                {"name": "rust", "category": "language", "aliases": ["rustlang"]},
                {"name": "mentoring", "category": "soft_skill"}
            ]
        }"#;
        let taxonomy = Taxonomy::from_json_str(raw).unwrap();
        assert_eq!(taxonomy.version(), "custom-v2");
        assert_eq!(
            taxonomy.resolve("rustlang").unwrap().category,
            SkillCategory::Language
        );
        assert_eq!(taxonomy.salary(), &SalaryConventions::default());
    }

    #[test]
    fn malformed_json_is_a_taxonomy_error() {
        let err = Taxonomy::from_json_str("{\"version\": 3}").unwrap_err();
        assert!(matches!(err, PipelineError::TaxonomyLoad(_)));
    }

    #[test]
    fn load_reports_missing_file() {
        let err = Taxonomy::load("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, PipelineError::TaxonomyLoad(_)));
    }

    #[test]
    fn fingerprint_tracks_alias_table() {
        let a = Taxonomy::builtin().unwrap();
        let b = Taxonomy::builtin().unwrap();
        assert_eq!(a.fingerprint(), b.fingerprint());
        let c = Taxonomy::new("builtin-1", vec![entry("rust", &[])], SalaryConventions::default())
            .unwrap();
        assert_ne!(a.fingerprint(), c.fingerprint());
    }
}
