use std::cmp::Ordering;
use std::collections::HashSet;

use cinesync_model::MediaCandidate;
use ordered_float::NotNan;

use crate::parse::clean::collapse_whitespace;

const TITLE_ACCEPT_MIN_OVERLAP_BP: u16 = 650;
const TITLE_ACCEPT_MIN_JACCARD_BP: u16 = 420;
/// Release years further apart than this rule a candidate out when the file
/// carries a year.
const YEAR_ACCEPT_MAX_DIFF: u16 = 1;

#[derive(Debug, Clone)]
struct TitleKey {
    normalized: String,
    tokens: Vec<String>,
}

impl TitleKey {
    fn new(raw: &str) -> Self {
        let normalized = normalize_title(raw);
        let tokens = tokenize_title(&normalized);
        Self { normalized, tokens }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TitleMatch {
    pub exact_normalized: bool,
    pub contains_normalized: bool,
    pub overlap_bp: u16,
    pub jaccard_bp: u16,
    pub intersection_tokens: u16,
    pub query_tokens: u16,
    pub candidate_tokens: u16,
}

impl TitleMatch {
    pub fn is_acceptable(self) -> bool {
        if self.exact_normalized {
            return true;
        }

        if self.query_tokens == 0 || self.candidate_tokens == 0 {
            return false;
        }

        self.overlap_bp >= TITLE_ACCEPT_MIN_OVERLAP_BP
            && self.jaccard_bp >= TITLE_ACCEPT_MIN_JACCARD_BP
    }

    fn cmp_best(self, other: Self) -> Ordering {
        self.exact_normalized
            .cmp(&other.exact_normalized)
            .then_with(|| self.overlap_bp.cmp(&other.overlap_bp))
            .then_with(|| self.jaccard_bp.cmp(&other.jaccard_bp))
            .then_with(|| {
                self.contains_normalized.cmp(&other.contains_normalized)
            })
            .then_with(|| {
                self.intersection_tokens.cmp(&other.intersection_tokens)
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum YearRank {
    NotApplicable,
    Diff(u16),
    Unknown,
}

impl YearRank {
    pub fn is_acceptable(self) -> bool {
        !matches!(self, YearRank::Diff(diff) if diff > YEAR_ACCEPT_MAX_DIFF)
    }

    pub fn cmp_best(self, other: Self) -> Ordering {
        use YearRank::*;
        match (self, other) {
            (NotApplicable, _) | (_, NotApplicable) => Ordering::Equal,
            (Diff(a), Diff(b)) => b.cmp(&a), // lower diff is better
            (Diff(_), Unknown) => Ordering::Greater,
            (Unknown, Diff(_)) => Ordering::Less,
            (Unknown, Unknown) => Ordering::Equal,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateRank {
    pub title: TitleMatch,
    pub year: YearRank,
    pub has_poster: bool,
    pub vote_count: u64,
    pub popularity: NotNan<f64>,
}

impl CandidateRank {
    pub fn is_acceptable(&self) -> bool {
        self.title.is_acceptable() && self.year.is_acceptable()
    }

    fn cmp_best(&self, other: &Self) -> Ordering {
        self.title
            .cmp_best(other.title)
            .then_with(|| self.year.cmp_best(other.year))
            .then_with(|| self.has_poster.cmp(&other.has_poster))
            .then_with(|| self.vote_count.cmp(&other.vote_count))
            .then_with(|| self.popularity.cmp(&other.popularity))
    }
}

#[derive(Debug, Clone)]
pub struct RankedCandidate<'a> {
    pub candidate: &'a MediaCandidate,
    pub rank: CandidateRank,
}

/// Outcome of weighing a ranked candidate list.
#[derive(Debug, Clone, PartialEq)]
pub enum Assessment {
    /// One candidate is clearly the file's media.
    Confident(MediaCandidate),
    /// Several acceptable candidates, best first.
    Ambiguous(Vec<MediaCandidate>),
    NoMatch,
}

fn normalize_title(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if ch.is_alphanumeric() {
            for lower in ch.to_lowercase() {
                out.push(lower);
            }
        } else {
            out.push(' ');
        }
    }
    collapse_whitespace(&out)
}

fn is_stopword(token: &str) -> bool {
    matches!(
        token,
        "the"
            | "a"
            | "an"
            | "to"
            | "of"
            | "and"
            | "or"
            | "for"
            | "in"
            | "on"
            | "at"
            | "with"
            | "from"
            | "by"
    )
}

fn tokenize_title(normalized: &str) -> Vec<String> {
    normalized
        .split_whitespace()
        .filter(|token| !is_stopword(token) && token.chars().count() > 1)
        .map(str::to_string)
        .collect()
}

fn has_poster_path(poster_path: Option<&str>) -> bool {
    poster_path.map(str::trim).is_some_and(|path| !path.is_empty())
}

fn year_rank(query_year: Option<u16>, candidate_year: Option<u16>) -> YearRank {
    let Some(query_year) = query_year else {
        return YearRank::NotApplicable;
    };
    let Some(candidate_year) = candidate_year else {
        return YearRank::Unknown;
    };
    YearRank::Diff(query_year.abs_diff(candidate_year))
}

fn not_nan_or_zero(value: f64) -> NotNan<f64> {
    NotNan::new(value)
        .unwrap_or_else(|_| NotNan::new(0.0).expect("0 is not NaN"))
}

fn title_match(query: &TitleKey, candidate: &TitleKey) -> TitleMatch {
    let exact_normalized = query.normalized == candidate.normalized;
    let contains_normalized = candidate.normalized.contains(&query.normalized)
        || query.normalized.contains(&candidate.normalized);

    let query_tokens = query.tokens.len() as u16;
    let candidate_tokens = candidate.tokens.len() as u16;

    if query_tokens == 0 || candidate_tokens == 0 {
        return TitleMatch {
            exact_normalized,
            contains_normalized,
            overlap_bp: 0,
            jaccard_bp: 0,
            intersection_tokens: 0,
            query_tokens,
            candidate_tokens,
        };
    }

    let query_set: HashSet<&str> =
        query.tokens.iter().map(String::as_str).collect();
    let candidate_set: HashSet<&str> =
        candidate.tokens.iter().map(String::as_str).collect();

    let intersection = query_set.intersection(&candidate_set).count() as u16;
    let union = query_set.union(&candidate_set).count() as u16;

    let overlap_bp =
        ((intersection as u32) * 1000 / (query_set.len().max(1) as u32)) as u16;
    let jaccard_bp = if union == 0 {
        0
    } else {
        ((intersection as u32) * 1000 / (union as u32)) as u16
    };

    TitleMatch {
        exact_normalized,
        contains_normalized,
        overlap_bp,
        jaccard_bp,
        intersection_tokens: intersection,
        query_tokens,
        candidate_tokens,
    }
}

fn best_title_match(query: &TitleKey, titles: &[&str]) -> TitleMatch {
    let mut best = TitleMatch {
        exact_normalized: false,
        contains_normalized: false,
        overlap_bp: 0,
        jaccard_bp: 0,
        intersection_tokens: 0,
        query_tokens: query.tokens.len() as u16,
        candidate_tokens: 0,
    };

    for raw in titles {
        let key = TitleKey::new(raw);
        let current = title_match(query, &key);
        if current.cmp_best(best) == Ordering::Greater {
            best = current;
        }
    }

    best
}

/// Rank provider hits against the parsed title and year, best first.
pub fn rank_candidates<'a>(
    query_title: &str,
    query_year: Option<u16>,
    results: &'a [MediaCandidate],
) -> Vec<RankedCandidate<'a>> {
    let query = TitleKey::new(query_title);

    let mut ranked: Vec<_> = results
        .iter()
        .map(|candidate| {
            let mut titles = vec![candidate.title.as_str()];
            titles.extend(candidate.original_title.as_deref());

            let rank = CandidateRank {
                title: best_title_match(&query, &titles),
                year: year_rank(query_year, candidate.year()),
                has_poster: has_poster_path(candidate.poster_path.as_deref()),
                vote_count: candidate.vote_count,
                popularity: not_nan_or_zero(candidate.popularity),
            };
            RankedCandidate { candidate, rank }
        })
        .collect();

    ranked.sort_by(|a, b| a.rank.cmp_best(&b.rank).reverse());
    ranked
}

/// Decide whether a ranked list identifies a single media item.
///
/// Confident when exactly one candidate is acceptable, or when the best is an
/// exact title match and the runner-up is either not exact or has a strictly
/// worse year. Everything else with acceptable candidates is ambiguous; the
/// list is truncated to `limit`.
pub fn assess(ranked: &[RankedCandidate<'_>], limit: usize) -> Assessment {
    let acceptable: Vec<_> = ranked
        .iter()
        .filter(|ranked| ranked.rank.is_acceptable())
        .collect();

    match acceptable.as_slice() {
        [] => Assessment::NoMatch,
        [only] => Assessment::Confident(only.candidate.clone()),
        [best, runner_up, ..] => {
            let best_rank = &best.rank;
            let clear_winner = best_rank.title.exact_normalized
                && (!runner_up.rank.title.exact_normalized
                    || best_rank.year.cmp_best(runner_up.rank.year)
                        == Ordering::Greater);
            if clear_winner {
                Assessment::Confident(best.candidate.clone())
            } else {
                Assessment::Ambiguous(
                    acceptable
                        .iter()
                        .take(limit.max(1))
                        .map(|ranked| ranked.candidate.clone())
                        .collect(),
                )
            }
        }
    }
}
