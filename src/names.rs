// src/names.rs
//! Company-name normalisation shared by the IR search, the aggregators and
//! the validator.
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

// Share class marker at the end of a listing name, e.g. "Atlas Copco A".
static SHARE_CLASS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\s+[ab]$").expect("Failed to compile SHARE_CLASS_RE")
});

static LEGAL_SUFFIX_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\s+(ab|ltd|corp|inc|group|abp|as|asa|sa|nv|plc)$")
        .expect("Failed to compile LEGAL_SUFFIX_RE")
});

static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\s+").expect("Failed to compile WHITESPACE_RE")
});

/// Maps accented Latin letters to their base letter. Covers the Nordic and
/// Western European letters that show up in listing names.
pub fn fold_accents(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            'å' | 'ä' | 'à' | 'á' | 'â' | 'ã' => 'a',
            'Å' | 'Ä' | 'À' | 'Á' | 'Â' | 'Ã' => 'A',
            'ö' | 'ø' | 'ò' | 'ó' | 'ô' | 'õ' => 'o',
            'Ö' | 'Ø' | 'Ò' | 'Ó' | 'Ô' | 'Õ' => 'O',
            'é' | 'è' | 'ê' | 'ë' => 'e',
            'É' | 'È' | 'Ê' | 'Ë' => 'E',
            'ü' | 'ú' | 'ù' | 'û' => 'u',
            'Ü' | 'Ú' | 'Ù' | 'Û' => 'U',
            'í' | 'ì' | 'î' | 'ï' => 'i',
            'Í' | 'Ì' | 'Î' | 'Ï' => 'I',
            'ç' => 'c',
            'Ç' => 'C',
            'ñ' => 'n',
            'Ñ' => 'N',
            other => other,
        })
        .collect()
}

/// Lower-cases, replaces `&` with `and`, drops punctuation and collapses
/// whitespace. Used to match names across tables.
pub fn normalize_name(name: &str) -> String {
    let lowered = fold_accents(&name.to_lowercase()).replace('&', "and");
    let cleaned: String = lowered
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || c.is_whitespace())
        .collect();
    WHITESPACE_RE.replace_all(cleaned.trim(), " ").into_owned()
}

/// Lower-cased, accent-folded, alphanumerics only. "Hennes & Mauritz" becomes
/// "hennesmauritz"; suitable for comparing against domain names.
pub fn compact(text: &str) -> String {
    fold_accents(&text.to_lowercase())
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect()
}

/// Removes a trailing share class ("A"/"B").
pub fn strip_share_class(name: &str) -> String {
    SHARE_CLASS_RE.replace(name.trim(), "").into_owned()
}

/// Removes one trailing legal-form suffix (AB, Ltd, plc, ...).
pub fn strip_legal_suffix(name: &str) -> String {
    LEGAL_SUFFIX_RE.replace(name.trim(), "").into_owned()
}

/// Name forms used when searching for a company.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchName {
    /// Listing name without share class, e.g. "Volvo AB".
    pub display: String,
    /// Display name without legal suffix, e.g. "Volvo".
    pub matching: String,
    /// Compact form of `matching`, e.g. "volvo".
    pub compact: String,
}

impl SearchName {
    pub fn new(company_name: &str) -> Self {
        let display = strip_share_class(company_name);
        let matching = strip_legal_suffix(&display);
        let compact = compact(&matching);
        Self {
            display,
            matching,
            compact,
        }
    }
}

/// First word of the cleaned name, lower-cased. Aggregators address most
/// companies by this slug (`mfn.se/all/a/volvo`).
pub fn first_word_slug(company_name: &str) -> String {
    let base = strip_legal_suffix(&strip_share_class(company_name));
    let cleaned: String = fold_accents(&base.to_lowercase())
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || c.is_whitespace())
        .collect();
    cleaned.split_whitespace().next().unwrap_or_default().to_string()
}

/// Hyphenated slug of the full cleaned name ("Atlas Copco" -> "atlas-copco").
pub fn hyphen_slug(company_name: &str) -> String {
    let base = strip_legal_suffix(&strip_share_class(company_name));
    let cleaned: String = fold_accents(&base.to_lowercase())
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || c.is_whitespace() || *c == '-')
        .collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join("-")
}

/// Matches names from one list against another by normalized form.
/// Returns the matched pairs and the names with no counterpart.
pub fn match_rows<'a>(
    names: &[&'a str],
    reference: &[&'a str],
) -> (Vec<(&'a str, &'a str)>, Vec<&'a str>) {
    let index: HashMap<String, &str> = reference
        .iter()
        .map(|name| (normalize_name(name), *name))
        .collect();

    let mut matches = Vec::new();
    let mut missing = Vec::new();
    for name in names {
        match index.get(&normalize_name(name)) {
            Some(found) => matches.push((*name, *found)),
            None => missing.push(*name),
        }
    }
    (matches, missing)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("Hennes & Mauritz AB"), "hennes and mauritz ab");
        assert_eq!(normalize_name("  Skandinaviska   Enskilda Banken "), "skandinaviska enskilda banken");
        assert_eq!(normalize_name("Länsförsäkringar"), "lansforsakringar");
        assert_eq!(normalize_name("ABB Ltd."), "abb ltd");
    }

    #[test]
    fn test_compact_folds_accents() {
        assert_eq!(compact("Sälj & Köp"), "saljkop");
        assert_eq!(compact("Essity AB (publ)"), "essityabpubl");
    }

    #[test]
    fn test_search_name_strips_class_then_suffix() {
        let name = SearchName::new("Volvo AB B");
        assert_eq!(name.display, "Volvo AB");
        assert_eq!(name.matching, "Volvo");
        assert_eq!(name.compact, "volvo");

        let name = SearchName::new("ABB Ltd");
        assert_eq!(name.display, "ABB Ltd");
        assert_eq!(name.matching, "ABB");
    }

    #[test]
    fn test_share_class_needs_separator() {
        // A trailing "a" inside a word is not a share class.
        assert_eq!(strip_share_class("Nordea"), "Nordea");
        assert_eq!(strip_share_class("Atlas Copco A"), "Atlas Copco");
    }

    #[test]
    fn test_slugs() {
        assert_eq!(first_word_slug("Atlas Copco AB"), "atlas");
        assert_eq!(first_word_slug("Boliden"), "boliden");
        assert_eq!(hyphen_slug("Atlas Copco A"), "atlas-copco");
        assert_eq!(hyphen_slug("Nibe Industrier AB B"), "nibe-industrier");
        assert_eq!(first_word_slug(""), "");
    }

    #[test]
    fn test_match_rows() {
        let names = ["Hennes & Mauritz AB", "Unknown Corp"];
        let reference = ["HENNES AND MAURITZ AB", "Volvo AB"];
        let (matches, missing) = match_rows(&names, &reference);
        assert_eq!(matches, vec![("Hennes & Mauritz AB", "HENNES AND MAURITZ AB")]);
        assert_eq!(missing, vec!["Unknown Corp"]);
    }
}
