//! Insider transactions, one row per filing and owner.

use super::{field, Field, FieldKind, MappedNormalizer};

const FIELDS: &[Field] = &[
    field("Ticker", "ticker", FieldKind::Text),
    field("HTML Creation Date", "html_creation_date", FieldKind::Date),
    field("FilingDate", "filing_date", FieldKind::Date),
    field("OwnerName", "owner_name", FieldKind::Text),
    field("OwnerType", "owner_type", FieldKind::Text),
    field("TransactionType", "transaction_type", FieldKind::Text),
    field("Shares", "shares", FieldKind::Integer),
    field("PriceMax", "price_max", FieldKind::Float),
    field("TransactionValue", "transaction_value", FieldKind::Float),
];

pub fn normalizer() -> MappedNormalizer {
    MappedNormalizer {
        source: "insider",
        table: "insider_transactions",
        natural_key: &["filing_date", "owner_name"],
        fields: FIELDS,
    }
}
