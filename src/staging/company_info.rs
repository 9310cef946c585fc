//! Top shareholders per company.

use super::{field, Field, FieldKind, MappedNormalizer};

const FIELDS: &[Field] = &[
    field("Ticker", "ticker", FieldKind::Text),
    field("HTML Creation Date", "html_creation_date", FieldKind::Date),
    field("Owner Name", "owner_name", FieldKind::Text),
    field("Owner Type", "owner_type", FieldKind::Text),
    field("Shares Held", "shares_held", FieldKind::Integer),
    field("Percent of Shares Outstanding", "percent_shares_outstanding", FieldKind::Float),
    field("Percent of Portfolio", "percent_of_portfolio", FieldKind::Float),
    field("Holding Date", "holding_date", FieldKind::Date),
];

pub fn normalizer() -> MappedNormalizer {
    MappedNormalizer {
        source: "company info",
        table: "company_info",
        natural_key: &["owner_name", "holding_date"],
        fields: FIELDS,
    }
}
