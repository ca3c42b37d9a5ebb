//! Filename-to-identity classifier.
//!
//! Certificates arrive under three naming conventions. Each is a
//! [`Grammar`]; [`classify`] tries them in [`Grammar::PRECEDENCE`] order
//! and the first grammar that accepts the name decides the identity.
//!
//! | Grammar | Example | Identity |
//! |---------|---------|----------|
//! | [`Grammar::NewStyleCap`] | `MB-X7CAP-Lot-A100.pdf` | product, lot, `Cap` |
//! | [`Grammar::NewStyleTube`] | `MB-X7-Lot-A100-240115-550021.pdf` | product, lot, legacy key, `Tube` |
//! | [`Grammar::LegacyOnly`] | `240115_550021.pdf` | legacy key, `Unknown` |
//!
//! New-style names are checked before the legacy form so that a lot code
//! shaped like two six-digit groups is never read as a legacy key. The
//! cap grammar is checked before the tube grammar because the tube
//! pattern would otherwise accept `X7CAP` as a product suffix.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::models::{ClassificationFailure, DocumentIdentity, PackagingVariant};

static NEW_STYLE_CAP: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^MB-([A-Za-z0-9]+)CAP-Lot-([A-Za-z0-9]+)(?:-([0-9]{6})[-_]?([0-9]{6}))?\.pdf$",
    )
    .expect("cap grammar is a valid regex")
});

static NEW_STYLE_TUBE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^MB-([A-Za-z0-9]+)-Lot-([A-Za-z0-9]+)(?:-([0-9]{6})[-_]?([0-9]{6}))?\.pdf$")
        .expect("tube grammar is a valid regex")
});

static LEGACY_KEY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([0-9]{6})[-_\s]?([0-9]{6})$").expect("legacy grammar is a valid regex")
});

/// One filename convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Grammar {
    /// `MB-<suffix>CAP-Lot-<lot>[-<legacy>].pdf`
    NewStyleCap,
    /// `MB-<suffix>-Lot-<lot>[-<legacy>].pdf`
    NewStyleTube,
    /// `<6 digits><sep?><6 digits>[.pdf]`
    LegacyOnly,
}

impl Grammar {
    /// Order in which [`classify`] tries the grammars.
    pub const PRECEDENCE: [Grammar; 3] = [
        Grammar::NewStyleCap,
        Grammar::NewStyleTube,
        Grammar::LegacyOnly,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Grammar::NewStyleCap => "new-style cap",
            Grammar::NewStyleTube => "new-style tube",
            Grammar::LegacyOnly => "legacy",
        }
    }

    /// Parse `file_name` with this grammar alone.
    pub fn parse(self, file_name: &str) -> Option<DocumentIdentity> {
        match self {
            Grammar::NewStyleCap => NEW_STYLE_CAP
                .captures(file_name)
                .map(|caps| new_style_identity(&caps, PackagingVariant::Cap)),
            Grammar::NewStyleTube => NEW_STYLE_TUBE
                .captures(file_name)
                .map(|caps| new_style_identity(&caps, PackagingVariant::Tube)),
            Grammar::LegacyOnly => {
                canonical_legacy_key(strip_pdf_extension(file_name)).map(DocumentIdentity::legacy_only)
            }
        }
    }
}

fn new_style_identity(caps: &Captures<'_>, variant: PackagingVariant) -> DocumentIdentity {
    let legacy_key = match (caps.get(3), caps.get(4)) {
        (Some(a), Some(b)) => format!("{}-{}", a.as_str(), b.as_str()),
        _ => String::new(),
    };
    DocumentIdentity {
        product: format!("MB-{}", &caps[1]),
        packaging_variant: variant,
        lot: caps[2].to_string(),
        legacy_key,
    }
}

fn strip_pdf_extension(file_name: &str) -> &str {
    let len = file_name.len();
    if len >= 4 && file_name.is_char_boundary(len - 4) {
        let (stem, ext) = file_name.split_at(len - 4);
        if ext.eq_ignore_ascii_case(".pdf") {
            return stem;
        }
    }
    file_name
}

/// Canonicalize a bare legacy code (`NNNNNN NNNNNN`, `NNNNNN_NNNNNN`,
/// `NNNNNNNNNNNN`, ...) to `NNNNNN-NNNNNN`.
///
/// The query matcher uses the same function, so a code typed into the
/// search box matches exactly the keys the classifier produced.
pub fn canonical_legacy_key(s: &str) -> Option<String> {
    LEGACY_KEY
        .captures(s)
        .map(|caps| format!("{}-{}", &caps[1], &caps[2]))
}

/// Classify a base filename, reporting which grammar matched.
pub fn classify_with_grammar(
    file_name: &str,
) -> Result<(Grammar, DocumentIdentity), ClassificationFailure> {
    Grammar::PRECEDENCE
        .iter()
        .find_map(|g| g.parse(file_name).map(|id| (*g, id)))
        .filter(|(_, id)| id.is_resolved())
        .ok_or_else(|| ClassificationFailure::unrecognized(file_name))
}

/// Classify a base filename into a [`DocumentIdentity`].
pub fn classify(file_name: &str) -> Result<DocumentIdentity, ClassificationFailure> {
    classify_with_grammar(file_name).map(|(_, id)| id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UNRECOGNIZED_PATTERN;

    #[test]
    fn new_style_cap() {
        let id = classify("MB-X7CAP-Lot-A100.pdf").unwrap();
        assert_eq!(id.product, "MB-X7");
        assert_eq!(id.packaging_variant, PackagingVariant::Cap);
        assert_eq!(id.lot, "A100");
        assert_eq!(id.legacy_key, "");
    }

    #[test]
    fn new_style_tube() {
        let (grammar, id) = classify_with_grammar("MB-X7-Lot-A100.pdf").unwrap();
        assert_eq!(grammar, Grammar::NewStyleTube);
        assert_eq!(id.product, "MB-X7");
        assert_eq!(id.packaging_variant, PackagingVariant::Tube);
        assert_eq!(id.lot, "A100");
    }

    #[test]
    fn new_style_is_case_insensitive() {
        let id = classify("mb-q2cap-lot-b7.PDF").unwrap();
        assert_eq!(id.product, "MB-q2");
        assert_eq!(id.packaging_variant, PackagingVariant::Cap);
        assert_eq!(id.lot, "b7");
    }

    #[test]
    fn new_style_with_trailing_legacy_key() {
        for name in [
            "MB-X7CAP-Lot-A100-240115-550021.pdf",
            "MB-X7CAP-Lot-A100-240115_550021.pdf",
            "MB-X7CAP-Lot-A100-240115550021.pdf",
        ] {
            let id = classify(name).unwrap();
            assert_eq!(id.packaging_variant, PackagingVariant::Cap, "{}", name);
            assert_eq!(id.lot, "A100", "{}", name);
            assert_eq!(id.legacy_key, "240115-550021", "{}", name);
        }

        let id = classify("MB-Z-Lot-9-000001-000002.pdf").unwrap();
        assert_eq!(id.packaging_variant, PackagingVariant::Tube);
        assert_eq!(id.legacy_key, "000001-000002");
    }

    #[test]
    fn legacy_separators_all_canonicalize() {
        for name in [
            "240115-550021.pdf",
            "240115_550021.pdf",
            "240115 550021.pdf",
            "240115550021.pdf",
            "240115-550021.PDF",
        ] {
            let id = classify(name).unwrap();
            assert_eq!(id.legacy_key, "240115-550021", "{}", name);
            assert_eq!(id.product, "");
            assert_eq!(id.lot, "");
            assert_eq!(id.packaging_variant, PackagingVariant::Unknown);
        }
    }

    #[test]
    fn unrecognized_names_fail() {
        for name in [
            "readme.pdf",
            "24011-550021.pdf",
            "240115--550021.pdf",
            "MB-X7CAP-Lot-.pdf",
            "MB-X7-Lot-A100.docx",
            "MB-X7-Lot-A-100.pdf",
        ] {
            let err = classify(name).unwrap_err();
            assert_eq!(err.file_name, name);
            assert_eq!(err.reason, UNRECOGNIZED_PATTERN);
        }
    }

    #[test]
    fn cap_grammar_takes_precedence_over_tube() {
        // The tube pattern alone reads the suffix as "X7CAP".
        let tube_only = Grammar::NewStyleTube.parse("MB-X7CAP-Lot-A100.pdf").unwrap();
        assert_eq!(tube_only.product, "MB-X7CAP");

        let (grammar, id) = classify_with_grammar("MB-X7CAP-Lot-A100.pdf").unwrap();
        assert_eq!(grammar, Grammar::NewStyleCap);
        assert_eq!(id.product, "MB-X7");
    }

    #[test]
    fn new_style_lot_shaped_like_legacy_stays_new_style() {
        let (grammar, id) = classify_with_grammar("MB-A-Lot-240115550021.pdf").unwrap();
        assert_eq!(grammar, Grammar::NewStyleTube);
        assert_eq!(id.lot, "240115550021");
        assert_eq!(id.legacy_key, "");
    }

    #[test]
    fn each_grammar_parses_in_isolation() {
        assert!(Grammar::NewStyleCap.parse("240115-550021.pdf").is_none());
        assert!(Grammar::NewStyleTube.parse("240115-550021.pdf").is_none());
        assert!(Grammar::LegacyOnly.parse("MB-X7-Lot-A100.pdf").is_none());
        assert!(Grammar::LegacyOnly.parse("240115-550021").is_some());
    }

    #[test]
    fn canonical_legacy_key_rejects_other_shapes() {
        assert_eq!(
            canonical_legacy_key("240115 550021").as_deref(),
            Some("240115-550021")
        );
        assert_eq!(canonical_legacy_key("2401155500211"), None);
        assert_eq!(canonical_legacy_key("abc"), None);
        assert_eq!(canonical_legacy_key(""), None);
    }

    #[test]
    fn non_ascii_names_do_not_panic() {
        assert!(classify("證書.pdf").is_err());
        assert!(classify("é").is_err());
    }
}
