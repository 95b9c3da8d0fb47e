/// Constants used by company/title canonicalization and posting keys.
pub mod dedup {
    /// Separator between the company and title fragments of a posting key.
    pub const POSTING_KEY_SEPARATOR: &str = "::";
    /// Default normalized-title similarity required to merge postings of one company.
    pub const DEFAULT_TITLE_SIMILARITY: f64 = 0.85;
    /// Trailing legal-entity suffixes stripped from company names (lowercase, no punctuation).
    pub const COMPANY_SUFFIXES: &[&str] = &[
        "inc",
        "incorporated",
        "llc",
        "ltd",
        "limited",
        "corp",
        "corporation",
        "co",
        "company",
        "gmbh",
        "plc",
        "sa",
        "ag",
        "bv",
        "pty",
    ];
    /// Title abbreviations expanded during canonicalization (lowercase, no trailing dot).
    pub const TITLE_ABBREVIATIONS: &[(&str, &str)] = &[
        ("sr", "Senior"),
        ("snr", "Senior"),
        ("jr", "Junior"),
        ("jnr", "Junior"),
        ("eng", "Engineer"),
        ("engr", "Engineer"),
        ("dev", "Developer"),
        ("mgr", "Manager"),
        ("mgmt", "Management"),
        ("assoc", "Associate"),
        ("asst", "Assistant"),
        ("dir", "Director"),
        ("vp", "Vice President"),
        ("swe", "Software Engineer"),
        ("sde", "Software Development Engineer"),
        ("ml", "Machine Learning"),
    ];
}

/// Constants used by posting status inference.
pub mod status {
    /// Days since last-seen after which an active posting is considered stale.
    pub const DEFAULT_STALE_AFTER_DAYS: i64 = 14;
    /// Days since last-seen after which a posting is considered closed.
    pub const DEFAULT_CLOSED_AFTER_DAYS: i64 = 45;
}

/// Constants used by skill matching.
pub mod skills {
    /// Longest alias n-gram (in tokens) considered for exact matches.
    pub const DEFAULT_MAX_NGRAM: usize = 3;
    /// Maximum Damerau-Levenshtein edits accepted for a fuzzy match.
    pub const DEFAULT_FUZZY_MAX_EDITS: usize = 2;
    /// Minimum similarity (1 - edits / len) accepted for a fuzzy match.
    pub const DEFAULT_FUZZY_MIN_SIMILARITY: f64 = 0.85;
    /// Minimum span length in characters eligible for fuzzy matching.
    pub const DEFAULT_FUZZY_MIN_CHARS: usize = 7;
}

/// Constants used by salary phrase extraction.
pub mod salary {
    /// Currency assumed when a phrase carries no symbol or code.
    pub const DEFAULT_CURRENCY: &str = "USD";
    /// Max byte distance between a compensation keyword and an unmarked figure.
    pub const DEFAULT_KEYWORD_WINDOW: usize = 48;
    /// Bytes inspected on either side of a phrase for estimate markers.
    pub const ESTIMATE_MARKER_WINDOW: usize = 16;
    /// Multiplier applied by the `k` shorthand.
    pub const THOUSANDS_MULTIPLIER: f64 = 1_000.0;
    /// Months per year used when annualizing monthly figures.
    pub const MONTHS_PER_YEAR: f64 = 12.0;
}

/// Constants used by trend windowing and emerging detection.
pub mod trends {
    /// Default window epoch (Monday 1970-01-05T00:00:00Z) as a unix timestamp.
    pub const DEFAULT_WINDOW_EPOCH_SECS: i64 = 345_600;
    /// Default window size in days.
    pub const DEFAULT_WINDOW_DAYS: i64 = 7;
    /// Separator used for skill-pair dimension values.
    pub const SKILL_PAIR_SEPARATOR: &str = " + ";
    /// Default number of trailing windows inspected by the emerging detector.
    pub const DEFAULT_LOOKBACK_WINDOWS: usize = 4;
    /// Default count of consecutive positive-velocity windows required.
    pub const DEFAULT_MIN_POSITIVE_STREAK: usize = 3;
    /// Default minimum latest-window count (noise floor).
    pub const DEFAULT_MIN_COUNT: u64 = 5;
    /// Default minimum growth rate over the lookback.
    pub const DEFAULT_MIN_GROWTH_RATE: f64 = 1.0;
}

/// Constants used by the file-backed posting store.
pub mod store {
    /// Version tag for store metadata compatibility checks.
    pub const STORE_VERSION: u8 = 2;
    /// Version tag for persisted posting records.
    pub const RECORD_VERSION: u8 = 1;
    /// Key used for store-level metadata.
    pub const META_KEY: &[u8] = b"__meta__";
    /// Key holding the number of posting-key index entries.
    pub const INDEX_LEN_KEY: &[u8] = b"__index_len__";
    /// Key prefix for posting-key index entries, suffixed with the entry position.
    pub const INDEX_ENTRY_PREFIX: &[u8] = b"index:";
    /// Key prefix for posting records.
    pub const RECORD_PREFIX: &[u8] = b"posting:";
    /// Prefix marker for bitcode-encoded payloads.
    pub const BITCODE_PREFIX: u8 = b'B';
    /// Default directory for persisted posting stores.
    pub const DEFAULT_STORE_DIR: &str = ".jobtrends_store";
    /// Default filename for persisted posting stores.
    pub const DEFAULT_STORE_FILENAME: &str = "postings.bin";
}
