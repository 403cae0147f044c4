//! Curated pattern table for rule-based field mapping.
//!
//! Each rule lists the substrings that must all appear in the stripped,
//! lowercased PDF field name. Rules are ordered most-specific first; the
//! first match wins.

/// A deterministic mapping rule
pub struct RulePattern {
    /// Substrings that must all be present in the stripped name
    pub all_of: &'static [&'static str],
    /// Target schema field (dot path)
    pub target: &'static str,
}

pub const RULES: &[RulePattern] = &[
    // Compound rules first so "buyeremail" beats the bare "buyer" rule
    RulePattern { all_of: &["buyer", "email"], target: "buyerEmail" },
    RulePattern { all_of: &["purchaser", "email"], target: "buyerEmail" },
    RulePattern { all_of: &["buyer", "phone"], target: "buyerPhone" },
    RulePattern { all_of: &["buyer", "tel"], target: "buyerPhone" },
    RulePattern { all_of: &["seller", "email"], target: "sellerEmail" },
    RulePattern { all_of: &["seller", "phone"], target: "sellerPhone" },
    RulePattern { all_of: &["management", "company"], target: "managementCompany" },
    RulePattern { all_of: &["title", "company"], target: "titleCompany" },
    RulePattern { all_of: &["escrow", "number"], target: "escrowNumber" },
    RulePattern { all_of: &["transfer", "fee"], target: "transferFee" },
    RulePattern { all_of: &["assessment"], target: "assessmentAmount" },
    // Single-keyword rules
    RulePattern { all_of: &["buyer"], target: "buyerName" },
    RulePattern { all_of: &["purchaser"], target: "buyerName" },
    RulePattern { all_of: &["seller"], target: "sellerName" },
    RulePattern { all_of: &["grantor"], target: "sellerName" },
    RulePattern { all_of: &["closing"], target: "closingDate" },
    RulePattern { all_of: &["settlement"], target: "closingDate" },
    RulePattern { all_of: &["hoa"], target: "associationName" },
    RulePattern { all_of: &["association"], target: "associationName" },
    RulePattern { all_of: &["unit"], target: "unitNumber" },
    RulePattern { all_of: &["lot"], target: "lotNumber" },
    RulePattern { all_of: &["price"], target: "purchasePrice" },
    RulePattern { all_of: &["escrow"], target: "escrowNumber" },
    RulePattern { all_of: &["property"], target: "propertyAddress" },
    RulePattern { all_of: &["address"], target: "propertyAddress" },
];

/// Strip separators and lowercase, the canonical key the rules match on.
pub fn strip_name(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_alphanumeric())
        .collect::<String>()
        .to_lowercase()
}

/// First matching rule target, if any.
pub fn rule_target(name: &str) -> Option<&'static str> {
    let stripped = strip_name(name);
    RULES
        .iter()
        .find(|rule| rule.all_of.iter().all(|kw| stripped.contains(kw)))
        .map(|rule| rule.target)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_name() {
        assert_eq!(strip_name("Buyer_Name-1"), "buyername1");
        assert_eq!(strip_name("BUYER NAME"), "buyername");
    }

    #[test]
    fn test_bare_buyer_rule() {
        assert_eq!(rule_target("BUYERNAME"), Some("buyerName"));
        assert_eq!(rule_target("purchaser_full_name"), Some("buyerName"));
    }

    #[test]
    fn test_compound_beats_bare() {
        assert_eq!(rule_target("buyer_email_address"), Some("buyerEmail"));
        assert_eq!(rule_target("BuyerPhone"), Some("buyerPhone"));
    }

    #[test]
    fn test_no_match() {
        assert_eq!(rule_target("notary_stamp"), None);
    }
}
