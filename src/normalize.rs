// =============================================================================
// normalize.rs - ONE RECORD SHAPE TO RULE THEM ALL
// =============================================================================
//
// Total and pure. Every missing field gets a default instead of an error,
// because missing fields are the normal case for both upstreams. The only
// input besides the raw record is the run's reference year, fixed when the
// run starts, so normalizing the same record twice gives the same answer.
// =============================================================================

use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;

use crate::keywords::{classify_nature, classify_status};
use crate::models::{ProcessRecord, RawProcess, Source, TribunalCode};

/// Claimant placeholder when the source had no party name.
pub const UNKNOWN_CLAIMANT: &str = "Não informado";

/// Years between filing and the budget year the credit is paid in.
const FISCAL_YEAR_OFFSET: i32 = 2;

/// Budget year for a filing date. Undated records get `reference_year + 2`,
/// i.e. next year's budget plus one.
pub fn fiscal_year_for(filed: Option<NaiveDate>, reference_year: i32) -> i32 {
    match filed {
        Some(date) => date.year() + FISCAL_YEAR_OFFSET,
        None => reference_year + FISCAL_YEAR_OFFSET,
    }
}

/// Parse the filing date forms the upstreams actually send:
/// `2021-03-15`, `2021-03-15T10:00:00Z`, `15/03/2021`, `15/03/2021 10:00`,
/// and the compact `20210315103000`.
pub fn parse_filing_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    if let Some(head) = text.get(..10) {
        if let Ok(date) = NaiveDate::parse_from_str(head, "%Y-%m-%d") {
            return Some(date);
        }
        if let Ok(date) = NaiveDate::parse_from_str(head, "%d/%m/%Y") {
            return Some(date);
        }
    }

    let digits: String = text.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.len() >= 8 {
        if let Ok(date) = NaiveDate::parse_from_str(&digits[..8], "%Y%m%d") {
            return Some(date);
        }
    }

    None
}

/// Parse an amount in either Brazilian display form (`R$ 1.234.567,89`) or
/// plain decimal form (`1234567.89`). Negative amounts are rejected.
///
/// Only the first numeric token counts; whatever follows it (dates,
/// reference numbers) is ignored.
pub fn parse_amount(text: &str) -> Option<Decimal> {
    let start = text.find(|c: char| c.is_ascii_digit())?;
    let prefix = &text[..start];
    if prefix.ends_with('-') || prefix.trim_end().ends_with("-R$") {
        return None;
    }

    let rest = &text[start..];
    let end = rest
        .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == ','))
        .unwrap_or(rest.len());
    let cleaned = rest[..end].trim_end_matches(['.', ',']);

    let canonical = if cleaned.contains(',') {
        // Comma is the decimal separator, dots are thousands.
        cleaned.replace('.', "").replace(',', ".")
    } else if cleaned.matches('.').count() > 1 {
        cleaned.replace('.', "")
    } else if let Some((_, frac)) = cleaned.split_once('.') {
        // A single dot followed by exactly three digits is a thousands dot.
        if frac.len() == 3 {
            cleaned.replace('.', "")
        } else {
            cleaned.to_string()
        }
    } else {
        cleaned.to_string()
    };

    Decimal::from_str(&canonical)
        .ok()
        .filter(|amount| !amount.is_sign_negative())
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Maps raw adapter records into `ProcessRecord`s.
#[derive(Debug, Clone, Copy)]
pub struct Normalizer {
    reference_year: i32,
}

impl Normalizer {
    pub fn new(reference_year: i32) -> Self {
        Self { reference_year }
    }

    pub fn normalize(&self, raw: &RawProcess, tribunal: &TribunalCode, source: Source) -> ProcessRecord {
        let view = raw.view();
        let filed = view.filing_date.and_then(parse_filing_date);

        ProcessRecord {
            number: view.number.trim().to_string(),
            tribunal_code: tribunal.to_string(),
            claimant: non_empty(view.claimant).unwrap_or_else(|| UNKNOWN_CLAIMANT.to_string()),
            amount: view
                .amount
                .filter(|amount| !amount.is_sign_negative())
                .unwrap_or(Decimal::ZERO),
            status: classify_status(view.last_movement),
            nature_category: classify_nature(view.class_name, view.subject),
            fiscal_year: fiscal_year_for(filed, self.reference_year),
            filing_date: non_empty(view.filing_date),
            source_label: source.label().to_string(),
            class_name: non_empty(view.class_name),
            subject: non_empty(view.subject),
            last_movement: non_empty(view.last_movement),
            low_confidence: !view.synthesized.is_empty(),
            synthesized_fields: view.synthesized.iter().map(|f| f.to_string()).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ApiEntry, NatureCategory, PortalEntry, ProcessStatus};

    #[test]
    fn test_parse_amount_forms() {
        assert_eq!(parse_amount("R$ 1.234.567,89"), Some(Decimal::new(123_456_789, 2)));
        assert_eq!(parse_amount("1234567.89"), Some(Decimal::new(123_456_789, 2)));
        assert_eq!(parse_amount("50.000"), Some(Decimal::new(50_000, 0)));
        assert_eq!(parse_amount("50000"), Some(Decimal::new(50_000, 0)));
        assert_eq!(parse_amount("R$ 0,50"), Some(Decimal::new(50, 2)));
        assert_eq!(parse_amount("-10,00"), None);
        assert_eq!(parse_amount("não informado"), None);
    }

    #[test]
    fn test_parse_amount_ignores_trailing_text() {
        assert_eq!(parse_amount("R$ 1.234,56 em 05/2020"), Some(Decimal::new(123_456, 2)));
        assert_eq!(parse_amount("R$ 1.234,56, atualizado"), Some(Decimal::new(123_456, 2)));
        assert_eq!(parse_amount("Valor - R$ 10,00 (ref. 2019)"), Some(Decimal::new(1_000, 2)));
        assert_eq!(parse_amount("R$ -10,00"), None);
        assert_eq!(parse_amount("-R$ 10,00"), None);
    }

    #[test]
    fn test_parse_filing_date_forms() {
        let expected = NaiveDate::from_ymd_opt(2021, 3, 15);
        assert_eq!(parse_filing_date("2021-03-15"), expected);
        assert_eq!(parse_filing_date("2021-03-15T10:00:00.000Z"), expected);
        assert_eq!(parse_filing_date("15/03/2021"), expected);
        assert_eq!(parse_filing_date("15/03/2021 às 10:00"), expected);
        assert_eq!(parse_filing_date("20210315103000"), expected);
        assert_eq!(parse_filing_date("março de 2021"), None);
        assert_eq!(parse_filing_date(""), None);
    }

    #[test]
    fn test_api_entry_defaults() {
        let normalizer = Normalizer::new(2025);
        let record = normalizer.normalize(
            &RawProcess::Api(ApiEntry {
                number: Some(" 0001234-56.2020.8.26.0100 ".into()),
                ..Default::default()
            }),
            &TribunalCode::Resolved("TJ-SP".into()),
            Source::OfficialApi,
        );

        assert_eq!(record.number, "0001234-56.2020.8.26.0100");
        assert_eq!(record.tribunal_code, "TJ-SP");
        assert_eq!(record.claimant, UNKNOWN_CLAIMANT);
        assert_eq!(record.amount, Decimal::ZERO);
        assert_eq!(record.status, ProcessStatus::EarlyReview);
        assert_eq!(record.nature_category, NatureCategory::General);
        assert_eq!(record.fiscal_year, 2027);
        assert_eq!(record.filing_date, None);
        assert_eq!(record.source_label, "OFFICIAL_API");
        assert!(!record.low_confidence);
    }

    #[test]
    fn test_unresolved_tribunal_uses_sentinel() {
        let record = Normalizer::new(2025).normalize(
            &RawProcess::Api(ApiEntry::default()),
            &TribunalCode::Unresolved,
            Source::OfficialApi,
        );
        assert_eq!(record.tribunal_code, crate::models::UNRESOLVED_TRIBUNAL);
    }

    #[test]
    fn test_portal_entry_with_synthesized_fields() {
        let raw = RawProcess::Portal(PortalEntry {
            number: "0001234-56.2021.8.26.0053".into(),
            class_name: "Precatório".into(),
            subject: "Aposentadoria".into(),
            claimant: Some("Maria da Silva".into()),
            amount: Decimal::new(7_654_321, 2),
            filing_date: Some("10/02/2021".into()),
            last_movement: Some("Expedição de precatório".into()),
            synthesized: vec!["amount"],
        });

        let record = Normalizer::new(2025).normalize(
            &raw,
            &TribunalCode::Resolved("TJ-SP".into()),
            Source::PortalScraper,
        );

        assert_eq!(record.fiscal_year, 2023);
        assert_eq!(record.filing_date.as_deref(), Some("10/02/2021"));
        assert_eq!(record.status, ProcessStatus::Approved);
        assert_eq!(record.nature_category, NatureCategory::SocialSecurity);
        assert!(record.low_confidence);
        assert_eq!(record.synthesized_fields, vec!["amount".to_string()]);
    }

    #[test]
    fn test_normalization_is_idempotent() {
        let raw = RawProcess::Api(ApiEntry {
            number: Some("0001234-56.2020.8.26.0100".into()),
            class_name: Some("Precatório".into()),
            subject: Some("ICMS".into()),
            claimant: Some("Fulano".into()),
            amount: Some(Decimal::new(12_345, 1)),
            filing_date: Some("2020-01-01".into()),
            last_movement: Some("Conclusos".into()),
        });
        let normalizer = Normalizer::new(2025);
        let tribunal = TribunalCode::Resolved("TJ-SP".into());

        assert_eq!(
            normalizer.normalize(&raw, &tribunal, Source::OfficialApi),
            normalizer.normalize(&raw, &tribunal, Source::OfficialApi)
        );
    }
}
