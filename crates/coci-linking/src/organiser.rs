//! Organiser resolution against the person/institution directory.
//!
//! Per organiser:
//!   1. affiliation known → top institution hit, then authors filtered to it
//!   2. otherwise (or nothing found) → authors by name, disambiguated by
//!      [`rank_candidates`]
//!   3. copy name / URI / ORCID of the selected candidate
//!   4. affiliation back-fill: derive one from the history when none was
//!      extracted, or corroborate the extracted one and attach its ROR

use coci_common::{AffiliationProvenance, CountryRegistry, OrganiserRecord, Thresholds};
use coci_directory::{AffiliationEntry, CandidateAuthor, Directory, DirectoryError, Institution};
use tracing::{debug, instrument, warn};

use crate::similarity::{normalized_similarity, token_set_ratio};
use crate::Result;

// ── Disambiguation ───────────────────────────────────────────────────────────

/// Outcome of ranking several same-named candidates.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedCandidate<'c> {
    /// Position of the winner in the slice passed to [`rank_candidates`].
    pub index: usize,
    pub candidate: &'c CandidateAuthor,
    /// Best normalized similarity over the candidate's names, in [0, 1].
    pub score: f64,
}

/// Pick the candidate whose name best matches `target`.
///
/// Candidates are ordered by works count (descending, stable), then every
/// (candidate, name) pair is scored; the first pair reaching the maximum
/// wins. When no pair scores above zero the most prolific candidate is
/// returned with score 0. `None` only for an empty slice.
pub fn rank_candidates<'c>(target: &str, candidates: &'c [CandidateAuthor]) -> Option<RankedCandidate<'c>> {
    let mut order: Vec<(usize, &CandidateAuthor)> = candidates.iter().enumerate().collect();
    order.sort_by(|(_, a), (_, b)| b.works_count.cmp(&a.works_count));

    let (index, candidate) = *order.first()?;
    let mut best = RankedCandidate { index, candidate, score: 0.0 };
    for (index, candidate) in order {
        for name in candidate.comparable_names() {
            let score = normalized_similarity(name, target);
            if score > best.score {
                best = RankedCandidate { index, candidate, score };
            }
        }
    }
    Some(best)
}

// ── Affiliation history helpers ──────────────────────────────────────────────

/// Preference among institution types when back-filling; lower is better.
fn type_rank(kind: Option<&str>) -> u8 {
    match kind {
        Some("education")  => 0,
        Some("company")    => 1,
        Some("facility")   => 2,
        Some("healthcare") => 3,
        Some("funder")     => 4,
        Some("government") => 5,
        Some("archive")    => 6,
        Some(_)            => 7,
        None               => 8,
    }
}

/// History entry closest to `year`, institution type breaking ties, then
/// history order. Entries without active years are skipped.
fn closest_in_time(history: &[AffiliationEntry], year: i32) -> Option<(&AffiliationEntry, u32)> {
    let mut best: Option<(&AffiliationEntry, (u32, u8))> = None;
    for entry in history {
        let Some(gap) = entry.min_year_gap(year) else { continue };
        let key = (gap, type_rank(entry.institution_type.as_deref()));
        if best.is_none_or(|(_, best_key)| key < best_key) {
            best = Some((entry, key));
        }
    }
    best.map(|(entry, (gap, _))| (entry, gap))
}

/// History entry whose name best matches `affiliation` (token-set ratio), first wins ties.
fn best_name_match<'h>(history: &'h [AffiliationEntry], affiliation: &str) -> Option<(&'h AffiliationEntry, f64)> {
    let mut best: Option<(&AffiliationEntry, f64)> = None;
    for entry in history {
        let score = token_set_ratio(&entry.institution_name, affiliation);
        if best.is_none_or(|(_, best_score)| score > best_score) {
            best = Some((entry, score));
        }
    }
    best
}

// ── Resolver ─────────────────────────────────────────────────────────────────

/// What the directory lookup settled on for one organiser.
struct Selection {
    author: CandidateAuthor,
    /// Set when the institution-filtered search produced the author.
    institution: Option<Institution>,
}

pub struct OrganiserResolver<'a> {
    directory: &'a dyn Directory,
    countries: &'a CountryRegistry,
    thresholds: &'a Thresholds,
    tolerate_errors: bool,
}

impl<'a> OrganiserResolver<'a> {
    pub fn new(
        directory: &'a dyn Directory,
        countries: &'a CountryRegistry,
        thresholds: &'a Thresholds,
    ) -> Self {
        Self { directory, countries, thresholds, tolerate_errors: false }
    }

    /// Log directory failures and leave the organiser unresolved instead of aborting.
    pub fn tolerate_errors(mut self, tolerate: bool) -> Self {
        self.tolerate_errors = tolerate;
        self
    }

    /// Resolve every organiser in place, in order.
    pub async fn resolve_all(&self, organisers: &mut [OrganiserRecord], year: i32) -> Result<()> {
        let mut resolved = 0usize;
        for organiser in organisers.iter_mut() {
            match self.resolve(organiser, year).await {
                Ok(()) => resolved += usize::from(organiser.is_resolved()),
                Err(e) if self.tolerate_errors => {
                    warn!(organiser = %organiser.organiser_name, error = %e, "Directory lookup failed, organiser left unresolved");
                    organiser.clear_directory_links();
                }
                Err(e) => return Err(e.into()),
            }
        }
        debug!(total = organisers.len(), resolved, "Organisers resolved");
        Ok(())
    }

    /// Resolve one organiser in place.
    #[instrument(skip(self, organiser), fields(organiser = %organiser.organiser_name))]
    pub async fn resolve(&self, organiser: &mut OrganiserRecord, year: i32) -> std::result::Result<(), DirectoryError> {
        organiser.clear_directory_links();

        let Some(selection) = self.select(organiser).await? else {
            return Ok(());
        };
        let author = &selection.author;

        organiser.openalex_name = Some(author.display_name.clone()).filter(|n| !n.is_empty());
        organiser.openalex_page = Some(author.id.clone());
        organiser.orcid = author.orcid.clone();

        if organiser.has_affiliation() {
            self.corroborate_affiliation(organiser, &selection);
        } else {
            self.backfill_affiliation(organiser, author, year);
        }
        Ok(())
    }

    async fn select(&self, organiser: &OrganiserRecord) -> std::result::Result<Option<Selection>, DirectoryError> {
        let name = organiser.organiser_name.trim();
        if name.is_empty() {
            debug!("Organiser has no name, nothing to look up");
            return Ok(None);
        }

        if organiser.has_affiliation() {
            let institutions = self.directory.search_institutions(organiser.organiser_affiliation.trim()).await?;
            if let Some(institution) = institutions.into_iter().next() {
                let authors = self.directory.search_authors_in_institution(name, &institution.id).await?;
                if let Some(author) = authors.into_iter().next() {
                    debug!(institution = %institution.display_name, author = %author.id, "Institution-filtered match");
                    return Ok(Some(Selection { author, institution: Some(institution) }));
                }
                debug!(institution = %institution.display_name, "No author under institution, falling back to name search");
            } else {
                debug!("No institution matches the affiliation, falling back to name search");
            }
        }

        let candidates = self.directory.search_authors(name).await?;
        let author = match candidates.len() {
            0 => {
                debug!("Directory lookup empty");
                return Ok(None);
            }
            1 => candidates.into_iter().next(),
            n => {
                let ranked = rank_candidates(name, &candidates);
                if let Some(r) = &ranked {
                    debug!(candidates = n, winner = %r.candidate.id, score = r.score, "Ambiguous match ranked");
                }
                ranked.map(|r| r.candidate.clone())
            }
        };
        Ok(author.map(|author| Selection { author, institution: None }))
    }

    /// Extracted affiliation present: attach a ROR and mark verified when the
    /// directory agrees. The affiliation text itself is kept.
    ///
    /// An institution without a ROR does not verify on its own; the author's
    /// history is checked instead.
    fn corroborate_affiliation(&self, organiser: &mut OrganiserRecord, selection: &Selection) {
        if let Some(ror) = selection.institution.as_ref().and_then(|i| i.ror.clone()) {
            organiser.affiliation_ror = Some(ror);
            organiser.verified = true;
            return;
        }

        let Some((entry, score)) = best_name_match(&selection.author.affiliations, &organiser.organiser_affiliation) else {
            return;
        };
        debug!(institution = %entry.institution_name, score, "Best history match for extracted affiliation");
        if score >= self.thresholds.affiliation_fuzzy_min {
            organiser.affiliation_ror = entry.ror.clone();
            organiser.verified = true;
        }
    }

    /// No extracted affiliation: adopt the history entry active closest to the event year.
    fn backfill_affiliation(&self, organiser: &mut OrganiserRecord, author: &CandidateAuthor, year: i32) {
        let Some((entry, gap)) = closest_in_time(&author.affiliations, year) else {
            debug!("No dated affiliation history to back-fill from");
            return;
        };
        if gap > self.thresholds.affiliation_max_year_gap || entry.institution_name.trim().is_empty() {
            debug!(institution = %entry.institution_name, gap, "Closest affiliation too far from event year");
            return;
        }

        organiser.organiser_affiliation = entry.institution_name.clone();
        organiser.affiliation_ror = entry.ror.clone();
        organiser.organiser_country = entry
            .country_code
            .as_deref()
            .and_then(|code| self.countries.name_for(code))
            .unwrap_or_default()
            .to_string();
        organiser.affiliation_provenance = AffiliationProvenance::DerivedFromDirectory;
        organiser.verified = false;
        debug!(institution = %entry.institution_name, gap, "Affiliation back-filled from directory");
    }
}
