//! Browsing helpers over a catalog snapshot: free-text search and the
//! first-letter filter used when the user doesn't have a barcode to hand.

use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use crate::db::ProductRecord;

/// Case-insensitive substring match over name, barcode and brand.
/// A blank query matches everything.
pub fn search<'a>(products: &'a [ProductRecord], query: &str) -> Vec<&'a ProductRecord> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return products.iter().collect();
    }

    products
        .iter()
        .filter(|product| {
            product.name.to_lowercase().contains(&needle)
                || product.barcode.to_lowercase().contains(&needle)
                || product.brand.to_lowercase().contains(&needle)
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LetterFilter {
    /// Names starting with this (uppercase) letter.
    Letter(char),
    /// Names starting with a digit.
    Digits,
}

impl LetterFilter {
    pub fn matches(&self, name: &str) -> bool {
        let Some(first) = name.trim_start().chars().next() else {
            return false;
        };

        match self {
            LetterFilter::Letter(letter) => first.to_uppercase().eq(letter.to_uppercase()),
            LetterFilter::Digits => first.is_numeric(),
        }
    }

    pub fn apply<'a>(&self, products: &'a [ProductRecord]) -> Vec<&'a ProductRecord> {
        products
            .iter()
            .filter(|product| self.matches(&product.name))
            .collect()
    }
}

impl FromStr for LetterFilter {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        let value = value.trim();
        if value == "0-9" || value == "#" {
            return Ok(LetterFilter::Digits);
        }

        let mut chars = value.chars();
        match (chars.next(), chars.next()) {
            (Some(ch), None) if ch.is_ascii_alphabetic() => {
                Ok(LetterFilter::Letter(ch.to_ascii_uppercase()))
            }
            (Some(ch), None) if ch.is_ascii_digit() => Ok(LetterFilter::Digits),
            _ => Err(anyhow!("expected a letter A-Z or 0-9, got '{value}'")),
        }
    }
}

impl fmt::Display for LetterFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LetterFilter::Letter(letter) => write!(f, "{letter}"),
            LetterFilter::Digits => f.write_str("0-9"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> Vec<ProductRecord> {
        vec![
            ProductRecord::new("8935049502142", "Hao Hao noodles", "Acecook"),
            ProductRecord::new("8934588012112", "Aquafina", "PepsiCo"),
            ProductRecord::new("8936036020373", "apple juice", "Vfresh"),
            ProductRecord::new("4902430735063", "7Up", "PepsiCo"),
        ]
    }

    #[test]
    fn search_matches_name_barcode_or_brand() {
        let products = catalog();
        let by_brand: Vec<_> = search(&products, "pepsico")
            .into_iter()
            .map(|p| p.name.as_str())
            .collect();
        assert_eq!(by_brand, vec!["Aquafina", "7Up"]);

        assert_eq!(search(&products, "502142").len(), 1);
        assert_eq!(search(&products, "NOODLE").len(), 1);
        assert!(search(&products, "zzz").is_empty());
    }

    #[test]
    fn blank_search_returns_everything() {
        let products = catalog();
        assert_eq!(search(&products, "   ").len(), products.len());
    }

    #[test]
    fn letter_filter_is_case_insensitive() {
        let products = catalog();
        let filter: LetterFilter = "a".parse().unwrap();
        let names: Vec<_> = filter
            .apply(&products)
            .into_iter()
            .map(|p| p.name.as_str())
            .collect();
        assert_eq!(names, vec!["Aquafina", "apple juice"]);
    }

    #[test]
    fn digit_bucket_matches_leading_digits() {
        let products = catalog();
        let filter: LetterFilter = "0-9".parse().unwrap();
        let names: Vec<_> = filter
            .apply(&products)
            .into_iter()
            .map(|p| p.name.as_str())
            .collect();
        assert_eq!(names, vec!["7Up"]);
    }

    #[test]
    fn rejects_multi_char_letters() {
        assert!("AB".parse::<LetterFilter>().is_err());
        assert!("".parse::<LetterFilter>().is_err());
        assert_eq!(LetterFilter::Digits.to_string(), "0-9");
    }
}
