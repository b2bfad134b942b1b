//! Pure post-processing applied to extracted and persisted records.

use std::collections::HashSet;

use coci_common::config::EventDefaults;
use coci_common::{AffiliationProvenance, EventRecord, OrganiserRecord};
use tracing::{debug, info};

/// Fill empty track names with the default label; when the event has more
/// than one distinct track, relabel default-track organisers to the catch-all.
///
/// The default label is matched case-insensitively. Idempotent.
pub fn normalize_tracks(organisers: &mut [OrganiserRecord], defaults: &EventDefaults) {
    let is_default = |track: &str| track.eq_ignore_ascii_case(&defaults.default_track);

    for organiser in organisers.iter_mut() {
        let trimmed = organiser.track_name.trim();
        if trimmed.is_empty() {
            organiser.track_name = defaults.default_track.clone();
        } else if trimmed.len() != organiser.track_name.len() {
            organiser.track_name = trimmed.to_string();
        }
    }

    let mut distinct: HashSet<String> = HashSet::new();
    for organiser in organisers.iter() {
        if is_default(&organiser.track_name) {
            distinct.insert(defaults.default_track.to_lowercase());
        } else {
            distinct.insert(organiser.track_name.clone());
        }
    }
    if distinct.len() <= 1 {
        return;
    }

    let mut relabelled = 0usize;
    for organiser in organisers.iter_mut().filter(|o| is_default(&o.track_name)) {
        organiser.track_name = defaults.catch_all_track.clone();
        relabelled += 1;
    }
    if relabelled > 0 {
        debug!(tracks = distinct.len(), relabelled, "Default track relabelled");
    }
}

/// Organisers per distinct affiliation string. `None` without organisers.
pub fn affiliation_ratio(organisers: &[OrganiserRecord]) -> Option<f64> {
    if organisers.is_empty() {
        return None;
    }
    let distinct: HashSet<&str> = organisers.iter().map(|o| o.organiser_affiliation.trim()).collect();
    Some(organisers.len() as f64 / distinct.len() as f64)
}

/// Discard every extracted affiliation when too many organisers share too few
/// strings, a sign the model copied one affiliation across the committee.
///
/// Returns whether the affiliations were cleared.
pub fn screen_affiliations(organisers: &mut [OrganiserRecord], max_ratio: f64) -> bool {
    let Some(ratio) = affiliation_ratio(organisers) else {
        return false;
    };
    if ratio < max_ratio {
        return false;
    }
    info!(organisers = organisers.len(), ratio, "Affiliations look duplicated, discarding them");
    for organiser in organisers.iter_mut() {
        organiser.clear_affiliation();
    }
    true
}

/// Re-establish record invariants on a persisted record.
///
/// Fills a missing year, normalizes tracks, derives provenance for
/// affiliations that lack one and drops a ROR left without an affiliation.
/// Does not run the affiliation screen.
pub fn refine_record(record: &mut EventRecord, defaults: &EventDefaults) {
    if record.year.is_none() {
        record.year = Some(defaults.year());
    }
    normalize_tracks(&mut record.organisers, defaults);

    for organiser in &mut record.organisers {
        if organiser.has_affiliation() {
            if organiser.affiliation_provenance == AffiliationProvenance::Unset {
                organiser.affiliation_provenance = AffiliationProvenance::ExtractedFromText;
            }
        } else {
            organiser.affiliation_provenance = AffiliationProvenance::Unset;
            organiser.affiliation_ror = None;
            organiser.verified = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn organisers(affiliations: &[&str]) -> Vec<OrganiserRecord> {
        affiliations
            .iter()
            .enumerate()
            .map(|(i, a)| OrganiserRecord::extracted(format!("Person {i}"), *a, "Belgium", "main"))
            .collect()
    }

    fn tracks(organisers: &[OrganiserRecord]) -> Vec<&str> {
        organisers.iter().map(|o| o.track_name.as_str()).collect()
    }

    #[test]
    fn test_single_track_keeps_default() {
        let defaults = EventDefaults::default();
        let mut orgs = organisers(&["A", "B"]);
        orgs[1].track_name = "  ".to_string();
        normalize_tracks(&mut orgs, &defaults);
        assert_eq!(tracks(&orgs), vec!["main", "main"]);
    }

    #[test]
    fn test_several_tracks_relabel_default() {
        let defaults = EventDefaults::default();
        let mut orgs = organisers(&["A", "B", "C", "D"]);
        orgs[1].track_name = "Research Track".to_string();
        orgs[2].track_name = "Main".to_string();
        orgs[3].track_name = String::new();
        normalize_tracks(&mut orgs, &defaults);
        assert_eq!(tracks(&orgs), vec!["Other", "Research Track", "Other", "Other"]);

        // idempotent
        let before = orgs.clone();
        normalize_tracks(&mut orgs, &defaults);
        assert_eq!(orgs, before);
    }

    #[test]
    fn test_default_label_variants_are_one_track() {
        let defaults = EventDefaults::default();
        let mut orgs = organisers(&["A", "B"]);
        orgs[1].track_name = "MAIN".to_string();
        normalize_tracks(&mut orgs, &defaults);
        assert_eq!(tracks(&orgs), vec!["main", "MAIN"]);
    }

    #[test]
    fn test_screen_clears_at_ratio() {
        // 8 organisers over 2 strings → 4.0
        let mut orgs = organisers(&["ECOOM", "ECOOM", "ECOOM", "ECOOM", "ECOOM", "ECOOM", "ECOOM", "CWI"]);
        orgs[0].affiliation_ror = Some("https://ror.org/x".to_string());
        assert!(screen_affiliations(&mut orgs, 4.0));
        for o in &orgs {
            assert!(!o.has_affiliation());
            assert!(o.organiser_country.is_empty());
            assert!(o.affiliation_ror.is_none());
            assert_eq!(o.affiliation_provenance, AffiliationProvenance::Unset);
        }
    }

    #[test]
    fn test_screen_keeps_below_ratio() {
        // 8 organisers over 3 strings → 2.67
        let mut orgs = organisers(&["ECOOM", "ECOOM", "ECOOM", "ECOOM", "ECOOM", "ECOOM", "CWI", "KU Leuven"]);
        assert!(!screen_affiliations(&mut orgs, 4.0));
        assert!(orgs.iter().all(OrganiserRecord::has_affiliation));
    }

    #[test]
    fn test_screen_uses_ratio_not_quarter_count() {
        // 6 organisers over 2 strings → 3.0; two strings is still within ⌈6/4⌉
        let mut orgs = organisers(&["ECOOM", "ECOOM", "ECOOM", "ECOOM", "ECOOM", "CWI"]);
        assert_eq!(affiliation_ratio(&orgs), Some(3.0));
        assert!(!screen_affiliations(&mut orgs, 4.0));
        assert!(orgs.iter().all(OrganiserRecord::has_affiliation));
    }

    #[test]
    fn test_screen_without_organisers() {
        let mut orgs: Vec<OrganiserRecord> = Vec::new();
        assert_eq!(affiliation_ratio(&orgs), None);
        assert!(!screen_affiliations(&mut orgs, 4.0));
    }

    #[test]
    fn test_refine_repairs_persisted_record() {
        let defaults = EventDefaults { default_year: Some(2025), ..Default::default() };
        let mut orphan = OrganiserRecord::extracted("Jane Doe", "", "", "");
        orphan.affiliation_ror = Some("https://ror.org/008x57b05".to_string());
        orphan.verified = true;
        let mut legacy = OrganiserRecord::extracted("John Roe", "CWI", "Netherlands", "main");
        legacy.affiliation_provenance = AffiliationProvenance::Unset;

        let mut record = EventRecord { organisers: vec![orphan, legacy], ..Default::default() };
        refine_record(&mut record, &defaults);

        assert_eq!(record.year, Some(2025));
        assert!(record.organisers[0].affiliation_ror.is_none());
        assert!(!record.organisers[0].verified);
        assert_eq!(record.organisers[0].track_name, "main");
        assert_eq!(record.organisers[1].affiliation_provenance, AffiliationProvenance::ExtractedFromText);
        assert!(record.check_invariants().is_ok());
    }
}
