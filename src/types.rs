/// Identifier for the scraper adapter that produced a raw posting.
/// Examples: `greenhouse`, `lever`, `careers_page::acme`
pub type SourceId = String;
/// Posting identifier as assigned by the originating source.
/// Examples: `4412093`, `b7e2c0d1-senior-backend`
pub type NativeId = String;
/// Stable canonical posting key derived from company and title.
/// Example: `acme::senior backend engineer`
pub type PostingKey = String;
/// Canonical company name after suffix stripping.
/// Examples: `Acme`, `Globex`
pub type CompanyName = String;
/// Canonical role title after abbreviation expansion.
/// Examples: `Senior Backend Engineer`, `Staff Data Scientist`
pub type RoleTitle = String;
/// Canonical skill name as defined by the taxonomy.
/// Examples: `python`, `kubernetes`, `machine learning`
pub type SkillName = String;
/// Value along an aggregation dimension (skill, role, company, skill pair).
/// Examples: `rust`, `Senior Backend Engineer`, `aws + terraform`
pub type DimensionValue = String;
/// ISO 4217 currency code.
/// Examples: `USD`, `EUR`, `GBP`
pub type CurrencyCode = String;
/// Taxonomy version label.
/// Examples: `builtin-2024.1`, `custom-v3`
pub type TaxonomyVersion = String;
/// Normalized lookup key for a taxonomy alias (tokens joined by one space).
/// Examples: `node.js`, `ci cd`, `github actions`
pub type AliasKey = String;
