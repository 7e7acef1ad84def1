// MangaSync - Reading List Catalog Matcher
// Copyright (C) 2025 Henning Berge
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


//! Title normalization
//!
//! Pure string transforms producing a comparable canonical form of a title.
//! Everything here is deterministic and idempotent:
//! `normalize(normalize(x)) == normalize(x)` for all inputs.
//!
//! Abbreviations, translations and styling differ wildly between a reading
//! list export and the catalog ("Fullmetal Alchemist (2011)", "fullmetal-
//! alchemist", "FULLMETAL ALCHEMIST"), so comparisons only ever happen on
//! the canonical form.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Parenthetical asides: scanlator notes, years, "(Official Colored)"
    static ref PARENTHETICAL: Regex =
        Regex::new(r"\([^)]*\)").expect("parenthetical regex should compile");

    /// Season/part/volume numbering with a keyword: "Season 2", "Part II",
    /// "Vol 3", "Cour 2", plus common non-English variants
    static ref SEASON_KEYWORD: Regex = Regex::new(
        r"\b(?:season|series|saison|stagione|temporada|part|parte|vol|volume|arc|cour)\s*(?:\d+|ii|iii|iv|v|vi|vii|viii|ix|x|xi|xii)\b",
    )
    .expect("season keyword regex should compile");

    /// Ordinal numbering: "2nd Season", "3rd Part"
    static ref ORDINAL_SEASON: Regex = Regex::new(
        r"\b\d+(?:st|nd|rd|th)\s+(?:season|series|part|cour)\b",
    )
    .expect("ordinal season regex should compile");

    /// A bare trailing numeral: "One Piece 2", "Mob Psycho III"
    static ref TRAILING_NUMBER: Regex = Regex::new(
        r"\s(?:\d+|ii|iii|iv|v|vi|vii|viii|ix|x|xi|xii)$",
    )
    .expect("trailing number regex should compile");
}

/// Similarity reported when two titles differ only by season/part numbering:
/// same series, different entry.
pub const SEASON_PATTERN_SIMILARITY: f64 = 0.95;

/// Sentinel for "no season pattern detected"
pub const NO_SEASON_PATTERN: f64 = -1.0;

/// Map look-alike non-Latin letters onto a Latin skeleton.
///
/// Some expansions produce more than one letter (æ, œ, ß). Characters not
/// in the table pass through unchanged.
fn fold_char(c: char, out: &mut String) {
    match c {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' | 'ā' | 'ă' | 'ą' => out.push('a'),
        'æ' => out.push_str("ae"),
        'ç' | 'ć' | 'č' => out.push('c'),
        'è' | 'é' | 'ê' | 'ë' | 'ē' | 'ė' | 'ę' | 'ě' => out.push('e'),
        'ì' | 'í' | 'î' | 'ï' | 'ī' | 'į' => out.push('i'),
        'ñ' | 'ń' | 'ň' => out.push('n'),
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' | 'ō' | 'ő' => out.push('o'),
        'œ' => out.push_str("oe"),
        'ù' | 'ú' | 'û' | 'ü' | 'ū' | 'ů' | 'ű' => out.push('u'),
        'ý' | 'ÿ' => out.push('y'),
        'ß' => out.push_str("ss"),
        'ð' | 'đ' => out.push('d'),
        'þ' => out.push_str("th"),
        'ł' => out.push('l'),
        'ś' | 'š' => out.push('s'),
        'ź' | 'ż' | 'ž' => out.push('z'),
        'ť' => out.push('t'),
        'ř' => out.push('r'),
        // Full-width forms common in catalog-native titles
        'ａ'..='ｚ' => out.push(char::from_u32(c as u32 - 'ａ' as u32 + 'a' as u32).unwrap_or(c)),
        '０'..='９' => out.push(char::from_u32(c as u32 - '０' as u32 + '0' as u32).unwrap_or(c)),
        _ => out.push(c),
    }
}

/// Produce the canonical comparable form of a title.
///
/// Lower-cases, strips parenthetical asides, treats underscores and dashes
/// as spaces, removes punctuation, folds look-alike letters to a Latin
/// skeleton and collapses whitespace.
pub fn normalize(title: &str) -> String {
    let without_asides = PARENTHETICAL.replace_all(title, " ");

    let mut folded = String::with_capacity(without_asides.len());
    for c in without_asides.chars() {
        for lower in c.to_lowercase() {
            match lower {
                '_' | '-' | '‐' | '–' | '—' => folded.push(' '),
                // The multiplication sign shows up as a stylized "x"
                // ("Hunter×Hunter") and would otherwise be dropped
                '×' => folded.push('x'),
                c if c.is_whitespace() => folded.push(' '),
                c if c.is_alphanumeric() => fold_char(c, &mut folded),
                // Everything else is punctuation or symbols: dropped
                _ => {}
            }
        }
    }

    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_article(token: &str) -> bool {
    matches!(token, "a" | "an" | "the")
}

fn strip_leading_articles(normalized: &str) -> String {
    normalized
        .split(' ')
        .skip_while(|token| is_article(token))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Do two titles differ only by leading articles ("a", "an", "the")?
///
/// Used to avoid rejecting true matches over minor article differences:
/// "The Promised Neverland" and "Promised Neverland" are the same title.
pub fn differs_only_by_articles(a: &str, b: &str) -> bool {
    let a = normalize(a);
    let b = normalize(b);
    let a = strip_leading_articles(&a);
    let b = strip_leading_articles(&b);
    !a.is_empty() && a == b
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn strip_season_tokens(normalized: &str) -> String {
    let stripped = ORDINAL_SEASON.replace_all(normalized, " ");
    let stripped = SEASON_KEYWORD.replace_all(&stripped, " ");
    let mut stripped = collapse_whitespace(&stripped);
    // Trailing numerals can stack ("Mob Psycho 100 II"); peel until stable
    loop {
        let next = TRAILING_NUMBER.replace(&stripped, "").into_owned();
        if next == stripped {
            break;
        }
        stripped = collapse_whitespace(&next);
    }
    stripped
}

/// Detect season/part/volume/arc/cour numbering between two titles.
///
/// Returns [`SEASON_PATTERN_SIMILARITY`] when removing such numbering makes
/// the two titles identical and at least one of them actually carried a
/// numbering token ("same series, different entry"). Returns
/// [`NO_SEASON_PATTERN`] otherwise.
pub fn season_pattern(a: &str, b: &str) -> f64 {
    let norm_a = normalize(a);
    let norm_b = normalize(b);
    if norm_a.is_empty() || norm_b.is_empty() {
        return NO_SEASON_PATTERN;
    }

    let stripped_a = strip_season_tokens(&norm_a);
    let stripped_b = strip_season_tokens(&norm_b);
    let any_token_removed = stripped_a != norm_a || stripped_b != norm_b;

    if any_token_removed && !stripped_a.is_empty() && stripped_a == stripped_b {
        SEASON_PATTERN_SIMILARITY
    } else {
        NO_SEASON_PATTERN
    }
}
