//! `coa classify`: show how file names are parsed, without building.

use anyhow::Result;
use serde::Serialize;

use coa_search_core::identity::classify_with_grammar;
use coa_search_core::models::DocumentIdentity;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Classification {
    pub file_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grammar: Option<&'static str>,
    #[serde(flatten)]
    pub identity: Option<DocumentIdentity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Classify one name, reporting which grammar accepted it.
pub fn explain(file_name: &str) -> Classification {
    match classify_with_grammar(file_name) {
        Ok((grammar, identity)) => Classification {
            file_name: file_name.to_string(),
            grammar: Some(grammar.name()),
            identity: Some(identity),
            error: None,
        },
        Err(failure) => Classification {
            file_name: file_name.to_string(),
            grammar: None,
            identity: None,
            error: Some(failure.reason),
        },
    }
}

pub fn run_classify(names: &[String], json: bool) -> Result<()> {
    let results: Vec<Classification> = names.iter().map(|n| explain(n)).collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }

    for c in &results {
        match (&c.identity, &c.error) {
            (Some(id), _) => {
                println!("{}", c.file_name);
                println!("    grammar: {}", c.grammar.unwrap_or("-"));
                println!("    product: {}", or_dash(&id.product));
                println!("    variant: {}", id.packaging_variant);
                println!("    lot: {}", or_dash(&id.lot));
                println!("    legacy: {}", or_dash(&id.legacy_key));
            }
            (None, Some(reason)) => println!("{}\n    error: {}", c.file_name, reason),
            (None, None) => println!("{}", c.file_name),
        }
    }
    Ok(())
}

fn or_dash(s: &str) -> &str {
    if s.is_empty() {
        "-"
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coa_search_core::identity::Grammar;
    use coa_search_core::models::{PackagingVariant, UNRECOGNIZED_PATTERN};

    #[test]
    fn cap_name_reports_cap_grammar() {
        let c = explain("MB-X7CAP-Lot-A100.pdf");
        assert_eq!(c.grammar, Some(Grammar::NewStyleCap.name()));
        assert_eq!(
            c.identity.unwrap().packaging_variant,
            PackagingVariant::Cap
        );
    }

    #[test]
    fn tube_name_with_legacy_suffix_reports_tube_grammar() {
        let c = explain("MB-X7-Lot-A100-240115-550021.pdf");
        assert_eq!(c.grammar, Some(Grammar::NewStyleTube.name()));
        let id = c.identity.unwrap();
        assert_eq!(id.packaging_variant, PackagingVariant::Tube);
        assert_eq!(id.legacy_key, "240115-550021");
    }

    #[test]
    fn legacy_name_reports_legacy_grammar() {
        let c = explain("240115_550021.pdf");
        assert_eq!(c.grammar, Some(Grammar::LegacyOnly.name()));
        assert_eq!(c.identity.unwrap().legacy_key, "240115-550021");
    }

    #[test]
    fn failure_serializes_error_only() {
        let c = explain("readme.pdf");
        assert_eq!(c.error.as_deref(), Some(UNRECOGNIZED_PATTERN));
        let json = serde_json::to_value(&c).unwrap();
        assert_eq!(json["fileName"], "readme.pdf");
        assert!(json.get("product").is_none());
        assert!(json.get("grammar").is_none());
    }
}
