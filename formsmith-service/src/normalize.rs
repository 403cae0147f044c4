//! Raw PDF field names to human-readable labels.
//!
//! `normalize` is pure and total: any input produces a label, nothing
//! panics, and the transform is idempotent. Raw AcroForm names arrive as
//! `BUYERNAME`, `sellerEmailAddress`, `property_address_2` and similar;
//! the output is what a person would put on a printed form.

/// Words kept lowercase unless they lead the label.
const STOP_WORDS: &[&str] = &[
    "a", "an", "the", "of", "in", "on", "at", "for", "to", "and", "or", "by", "with", "per",
];

/// Acronyms restored to their canonical capitalization after title casing.
const ACRONYMS: &[&str] = &[
    "ID", "SSN", "VA", "HOA", "POA", "LLC", "EIN", "APN", "FHA", "DOB", "PO", "USA", "ZIP",
];

/// Known concatenation patterns that boundary splitting cannot separate.
/// Keys are compared against lowercased words.
const CONCATENATIONS: &[(&str, &str)] = &[
    ("nameof", "name of"),
    ("emailaddress", "email address"),
    ("phonenumber", "phone number"),
    ("dateofbirth", "date of birth"),
    ("firstname", "first name"),
    ("lastname", "last name"),
    ("middlename", "middle name"),
    ("fullname", "full name"),
    ("buyername", "buyer name"),
    ("sellername", "seller name"),
    ("propertyaddress", "property address"),
    ("mailingaddress", "mailing address"),
    ("homeaddress", "home address"),
    ("streetaddress", "street address"),
    ("zipcode", "zip code"),
    ("closingdate", "closing date"),
    ("settlementdate", "settlement date"),
    ("purchaseprice", "purchase price"),
    ("salesprice", "sales price"),
    ("unitnumber", "unit number"),
    ("lotnumber", "lot number"),
    ("accountnumber", "account number"),
    ("associationname", "association name"),
    ("managementcompany", "management company"),
];

/// Normalize a raw field name into a human-readable label.
pub fn normalize(raw: &str) -> String {
    if raw.trim().is_empty() {
        return raw.to_string();
    }

    let mut text = raw.trim().to_string();

    // (a) ALL-CAPS and mostly-caps input carries no case information
    if caps_ratio(&text) > 0.7 {
        text = text.to_lowercase();
    }

    // (b) split camelCase, ACRONYMWord and letter/digit boundaries;
    //     separators become spaces
    text = split_boundaries(&text);

    // (c) expand known concatenations word by word
    let mut words: Vec<String> = Vec::new();
    for word in text.split_whitespace() {
        let lower = word.to_lowercase();
        match CONCATENATIONS.iter().find(|(k, _)| *k == lower) {
            Some((_, expansion)) => words.extend(expansion.split(' ').map(String::from)),
            None => words.push(word.to_string()),
        }
    }

    // (d, e) title case with stop-list and acronym restoration
    let cased: Vec<String> = words
        .iter()
        .enumerate()
        .map(|(i, word)| case_word(word, i == 0))
        .collect();

    // (f, g) possessive repair happens inside case_word; joining on a
    // single space collapses whitespace
    cased.join(" ")
}

/// Ratio of uppercase letters to all letters. Non-letters are ignored.
fn caps_ratio(s: &str) -> f64 {
    let letters = s.chars().filter(|c| c.is_alphabetic()).count();
    if letters == 0 {
        return 0.0;
    }
    let upper = s.chars().filter(|c| c.is_uppercase()).count();
    upper as f64 / letters as f64
}

/// Insert spaces at word boundaries and turn separators into spaces.
fn split_boundaries(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    let mut out = String::with_capacity(s.len() + 8);

    for (i, &c) in chars.iter().enumerate() {
        if i > 0 {
            let prev = chars[i - 1];
            let next = chars.get(i + 1).copied();

            let camel = prev.is_lowercase() && c.is_uppercase();
            // last capital of an acronym run starts a new word: "HOAFee"
            let acronym_end = prev.is_uppercase()
                && c.is_uppercase()
                && next.map(|n| n.is_lowercase()).unwrap_or(false);
            let letter_digit = prev.is_alphabetic() && c.is_ascii_digit();
            let digit_letter = prev.is_ascii_digit() && c.is_alphabetic();

            if camel || acronym_end || letter_digit || digit_letter {
                out.push(' ');
            }
        }

        match c {
            '_' | '-' | '.' => out.push(' '),
            _ => out.push(c),
        }
    }

    out
}

/// Title-case one word, honoring the stop-list, acronym table and
/// possessive suffixes.
fn case_word(word: &str, first: bool) -> String {
    // strip a possessive suffix before classification, reattach after
    let (stem, possessive) = match word.to_lowercase().strip_suffix("'s") {
        Some(_) => (&word[..word.len() - 2], true),
        None => (word, false),
    };

    let lower = stem.to_lowercase();

    let cased = if let Some(acr) = ACRONYMS.iter().find(|a| a.eq_ignore_ascii_case(&lower)) {
        (*acr).to_string()
    } else if !first && STOP_WORDS.contains(&lower.as_str()) {
        lower
    } else {
        title_case(&lower)
    };

    if possessive {
        format!("{}'s", cased)
    } else {
        cased
    }
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(c) => c.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}
