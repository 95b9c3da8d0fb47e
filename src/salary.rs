//! Salary range extraction from free text.
//!
//! Figures are recognized by one regex assembled from the taxonomy's
//! [`SalaryConventions`]. A figure counts as compensation when it carries a
//! currency, a `k` multiplier, or a pay period, or when a compensation keyword
//! sits within the configured byte window. When several figures qualify, the
//! one closest to a keyword wins; otherwise the first one does.

use regex::{Captures, Regex};
use tracing::trace;

use crate::config::SalaryConfig;
use crate::constants::salary::{ESTIMATE_MARKER_WINDOW, MONTHS_PER_YEAR, THOUSANDS_MULTIPLIER};
use crate::data::{SalaryPeriod, SalaryRange};
use crate::errors::PipelineError;
use crate::taxonomy::SalaryConventions;
use crate::types::CurrencyCode;

const NUMBER: &str = r"\d{1,3}(?:,\d{3})+(?:\.\d+)?|\d+(?:\.\d+)?";
const RANGE_SEPARATOR: &str = r"(?:\s*[-–—]\s*|\s+to\s+)";
/// Annual figures below this are not plausible salaries.
const MIN_ANNUAL_AMOUNT: f64 = 1_000.0;

/// Compiled salary matcher.
#[derive(Clone, Debug)]
pub struct SalaryExtractor {
    pattern: Regex,
    keywords: Option<Regex>,
    estimates: Option<Regex>,
    excluded: Option<Regex>,
    symbols: Vec<(String, CurrencyCode)>,
    codes: Vec<CurrencyCode>,
    hourly: Vec<String>,
    monthly: Vec<String>,
    config: SalaryConfig,
}

/// One regex hit before selection.
#[derive(Clone, Debug)]
struct Candidate {
    start: usize,
    end: usize,
    range: SalaryRange,
    marked: bool,
}

impl SalaryExtractor {
    /// Compile the matcher for `conventions`.
    pub fn new(conventions: &SalaryConventions, config: SalaryConfig) -> Result<Self, PipelineError> {
        let currency_terms: Vec<String> = conventions
            .currency_symbols
            .iter()
            .map(|(symbol, _)| symbol.clone())
            .chain(conventions.currency_codes.iter().cloned())
            .collect();
        let currency = alternation(&currency_terms);
        let codes = alternation(&conventions.currency_codes);
        let periods = alternation(
            &conventions
                .hourly_qualifiers
                .iter()
                .chain(&conventions.yearly_qualifiers)
                .chain(&conventions.monthly_qualifiers)
                .cloned()
                .collect::<Vec<_>>(),
        );

        let prefix = |name: &str| {
            currency
                .as_ref()
                .map(|alt| format!(r"(?:(?P<{name}>{alt})\s*)?"))
                .unwrap_or_default()
        };
        let figure = |pre: &str, num: &str, k: &str| {
            format!(r"{}\b(?P<{num}>{NUMBER})(?:\s*(?P<{k}>k)\b)?", prefix(pre))
        };
        let suffix_code = codes
            .as_ref()
            .map(|alt| format!(r"(?:\s*(?P<code>{alt}))?"))
            .unwrap_or_default();
        let suffix_period = periods
            .as_ref()
            .map(|alt| format!(r"(?:\s*(?P<period>{alt}))?"))
            .unwrap_or_default();
        let source = format!(
            "(?i){}(?:{RANGE_SEPARATOR}{})?{suffix_code}{suffix_period}",
            figure("pre1", "a", "ka"),
            figure("pre2", "b", "kb"),
        );
        let pattern = compile(&source)?;
        let keywords = alternation(&conventions.context_keywords)
            .map(|alt| compile(&format!("(?i){alt}")))
            .transpose()?;
        let estimates = alternation(&conventions.estimate_markers)
            .map(|alt| compile(&format!("(?i){alt}")))
            .transpose()?;
        let excluded = alternation(&conventions.excluded_terms)
            .map(|alt| compile(&format!("(?i){alt}")))
            .transpose()?;

        Ok(Self {
            pattern,
            keywords,
            estimates,
            excluded,
            symbols: conventions.currency_symbols.clone(),
            codes: conventions.currency_codes.clone(),
            hourly: lowered(&conventions.hourly_qualifiers),
            monthly: lowered(&conventions.monthly_qualifiers),
            config,
        })
    }

    /// Extract the most plausible salary range from `text`, if any.
    pub fn extract(&self, text: &str) -> Option<SalaryRange> {
        let keyword_spans: Vec<(usize, usize)> = self
            .keywords
            .as_ref()
            .map(|re| re.find_iter(text).map(|m| (m.start(), m.end())).collect())
            .unwrap_or_default();
        let excluded_spans: Vec<(usize, usize)> = self
            .excluded
            .as_ref()
            .map(|re| re.find_iter(text).map(|m| (m.start(), m.end())).collect())
            .unwrap_or_default();

        let mut best: Option<(usize, Candidate)> = None;
        let mut first: Option<Candidate> = None;
        for caps in self.pattern.captures_iter(text) {
            let Some(candidate) = self.candidate(text, &caps) else {
                continue;
            };
            if excluded_spans
                .iter()
                .any(|&(xs, xe)| xs < candidate.end && candidate.start < xe)
            {
                trace!(start = candidate.start, "figure inside an excluded term");
                continue;
            }
            let distance = keyword_spans
                .iter()
                .map(|&(ks, ke)| span_distance((candidate.start, candidate.end), (ks, ke)))
                .min()
                .filter(|distance| *distance <= self.config.keyword_window);
            if !candidate.marked && distance.is_none() {
                trace!(start = candidate.start, "unmarked figure without nearby keyword");
                continue;
            }
            if let Some(distance) = distance
                && best.as_ref().is_none_or(|(current, _)| distance < *current)
            {
                best = Some((distance, candidate.clone()));
            }
            if first.is_none() {
                first = Some(candidate);
            }
        }
        best.map(|(_, candidate)| candidate)
            .or(first)
            .map(|candidate| candidate.range)
    }

    fn candidate(&self, text: &str, caps: &Captures<'_>) -> Option<Candidate> {
        let whole = caps.get(0)?;
        let mut low = parse_amount(caps.name("a")?.as_str())?;
        let mut high = match caps.name("b") {
            Some(b) => parse_amount(b.as_str())?,
            None => low,
        };
        let k_low = caps.name("ka").is_some();
        let k_high = caps.name("kb").is_some();
        if k_low {
            low *= THOUSANDS_MULTIPLIER;
        }
        if k_high {
            high *= THOUSANDS_MULTIPLIER;
        } else if caps.name("b").is_none() && k_low {
            high = low;
        }
        // "$120-150k": the multiplier on the upper bound applies to both.
        if k_high && !k_low && low < THOUSANDS_MULTIPLIER {
            low *= THOUSANDS_MULTIPLIER;
        }

        let currency_match = caps
            .name("pre1")
            .or_else(|| caps.name("pre2"))
            .or_else(|| caps.name("code"));
        let currency = match currency_match {
            Some(m) => self.currency_for(m.as_str())?,
            None => self.config.default_currency.clone(),
        };

        let period_text = caps
            .name("period")
            .map(|m| m.as_str().to_lowercase().split_whitespace().collect::<Vec<_>>().join(" "));
        let period = match period_text.as_deref() {
            Some(p) if self.hourly.iter().any(|q| q == p) => SalaryPeriod::Hour,
            Some(p) if self.monthly.iter().any(|q| q == p) => {
                low *= MONTHS_PER_YEAR;
                high *= MONTHS_PER_YEAR;
                SalaryPeriod::Year
            }
            _ => SalaryPeriod::Year,
        };

        if low <= 0.0 || high <= 0.0 {
            return None;
        }
        if low > high {
            std::mem::swap(&mut low, &mut high);
        }
        if period == SalaryPeriod::Year && high < MIN_ANNUAL_AMOUNT {
            return None;
        }

        let marked = currency_match.is_some() || k_low || k_high || period_text.is_some();
        Some(Candidate {
            start: whole.start(),
            end: whole.end(),
            range: SalaryRange {
                min: low,
                max: high,
                currency,
                period,
                is_estimated: self.is_estimated(text, whole.start(), whole.end()),
            },
            marked,
        })
    }

    fn currency_for(&self, matched: &str) -> Option<CurrencyCode> {
        let matched = matched.trim();
        if let Some(code) = self
            .codes
            .iter()
            .find(|code| code.eq_ignore_ascii_case(matched))
        {
            return Some(code.clone());
        }
        self.symbols
            .iter()
            .find(|(symbol, _)| symbol.to_lowercase() == matched.to_lowercase())
            .map(|(_, code)| code.clone())
    }

    fn is_estimated(&self, text: &str, start: usize, end: usize) -> bool {
        let Some(estimates) = &self.estimates else {
            return false;
        };
        estimates
            .find_iter(text)
            .any(|m| span_distance((start, end), (m.start(), m.end())) <= ESTIMATE_MARKER_WINDOW)
    }
}

/// Byte gap between two spans; zero when they overlap or touch.
fn span_distance(a: (usize, usize), b: (usize, usize)) -> usize {
    if b.1 <= a.0 {
        a.0 - b.1
    } else if b.0 >= a.1 {
        b.0 - a.1
    } else {
        0
    }
}

fn parse_amount(raw: &str) -> Option<f64> {
    raw.replace(',', "").parse::<f64>().ok()
}

fn lowered(values: &[String]) -> Vec<String> {
    values.iter().map(|value| value.to_lowercase()).collect()
}

/// Escaped alternation, longest term first; alphanumeric edges get `\b`.
fn alternation(terms: &[String]) -> Option<String> {
    let mut terms: Vec<&String> = terms.iter().filter(|term| !term.is_empty()).collect();
    if terms.is_empty() {
        return None;
    }
    terms.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
    terms.dedup();
    let parts: Vec<String> = terms
        .into_iter()
        .map(|term| {
            let starts_word = term.chars().next().is_some_and(char::is_alphanumeric);
            let ends_word = term.chars().last().is_some_and(char::is_alphanumeric);
            format!(
                "{}{}{}",
                if starts_word { r"\b" } else { "" },
                regex::escape(term),
                if ends_word { r"\b" } else { "" }
            )
        })
        .collect();
    Some(format!("(?:{})", parts.join("|")))
}

fn compile(source: &str) -> Result<Regex, PipelineError> {
    Regex::new(source)
        .map_err(|err| PipelineError::Configuration(format!("invalid salary pattern: {err}")))
}
