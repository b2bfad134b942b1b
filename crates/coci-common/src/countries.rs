//! Country-code → country-name translation.
//!
//! The directory reports institution countries as ISO 3166-1 alpha-2 codes;
//! organiser records carry the country name. The ISO table ships with the
//! crate as a TSV and is parsed into an in-memory lookup once.
//!
//! ```ignore
//! let countries = CountryRegistry::bundled();
//! assert_eq!(countries.name_for("BE"), Some("Belgium"));
//! ```

use std::collections::HashMap;

use crate::error::{CociError, Result};

const ISO_3166_TSV: &str = include_str!("../data/iso3166.tsv");

/// In-memory ISO 3166-1 lookup, keyed by upper-cased alpha-2 and alpha-3 codes.
#[derive(Debug, Clone)]
pub struct CountryRegistry {
    lookup: HashMap<String, String>,
    n_countries: usize,
}

impl CountryRegistry {
    /// The registry built from the bundled ISO table.
    pub fn bundled() -> Self {
        // The bundled table is validated by the tests below.
        Self::from_tsv(ISO_3166_TSV).unwrap_or_else(|_| Self {
            lookup: HashMap::new(),
            n_countries: 0,
        })
    }

    /// Build from a `alpha2 \t alpha3 \t name` TSV with a header row.
    pub fn from_tsv(tsv: &str) -> Result<Self> {
        let mut lookup = HashMap::new();
        let mut n_countries = 0usize;

        for (line_no, line) in tsv.lines().enumerate() {
            if line_no == 0 || line.trim().is_empty() { continue; }

            let fields: Vec<&str> = line.split('\t').map(str::trim).collect();
            let &[alpha2, alpha3, name] = fields.as_slice() else {
                return Err(CociError::Config(format!(
                    "malformed country table row {}: {line:?}",
                    line_no + 1
                )));
            };
            if name.is_empty() { continue; }

            lookup.insert(alpha2.to_uppercase(), name.to_string());
            lookup.insert(alpha3.to_uppercase(), name.to_string());
            n_countries += 1;
        }

        tracing::debug!(n_countries, "country registry built");
        Ok(Self { lookup, n_countries })
    }

    /// Country name for an ISO code. Case-insensitive; `None` when unknown.
    pub fn name_for(&self, code: &str) -> Option<&str> {
        self.lookup.get(&code.trim().to_uppercase()).map(String::as_str)
    }

    pub fn n_countries(&self) -> usize { self.n_countries }
}

impl Default for CountryRegistry {
    fn default() -> Self { Self::bundled() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bundled_table_parses() {
        let r = CountryRegistry::from_tsv(ISO_3166_TSV).unwrap();
        assert_eq!(r.n_countries(), 249);
    }

    #[test]
    fn test_lookup_alpha2_and_alpha3() {
        let r = CountryRegistry::bundled();
        assert_eq!(r.name_for("BE"), Some("Belgium"));
        assert_eq!(r.name_for("bel"), Some("Belgium"));
        assert_eq!(r.name_for("GB"), Some("United Kingdom"));
        assert_eq!(r.name_for(" us "), Some("United States"));
    }

    #[test]
    fn test_unknown_code() {
        let r = CountryRegistry::bundled();
        assert_eq!(r.name_for("XX"), None);
        assert_eq!(r.name_for(""), None);
    }

    #[test]
    fn test_malformed_row_is_rejected() {
        assert!(CountryRegistry::from_tsv("alpha2\talpha3\tname\nBE\tBelgium\n").is_err());
    }
}
