//! Ownership breakdown per ticker and page snapshot.

use super::{field, Field, FieldKind, MappedNormalizer};

const FIELDS: &[Field] = &[
    field("Ticker", "ticker", FieldKind::Text),
    field("HTML Creation Date", "html_creation_date", FieldKind::Date),
    field("InstitutionsShares", "institutions_shares", FieldKind::Integer),
    field("InstitutionsPercent", "institutions_percent", FieldKind::Float),
    field("PublicCompaniesShares", "public_companies_shares", FieldKind::Integer),
    field("PublicCompaniesPercent", "public_companies_percent", FieldKind::Float),
    field("PrivateCompaniesShares", "private_companies_shares", FieldKind::Integer),
    field("PrivateCompaniesPercent", "private_companies_percent", FieldKind::Float),
    field("IndividualInsidersShares", "individual_insiders_shares", FieldKind::Integer),
    field("IndividualInsidersPercent", "individual_insiders_percent", FieldKind::Float),
    field("VCPEFirmsShares", "vcpe_firms_shares", FieldKind::Integer),
    field("VCPEFirmsPercent", "vcpe_firms_percent", FieldKind::Float),
    field("GeneralPublicShares", "general_public_shares", FieldKind::Integer),
    field("GeneralPublicPercent", "general_public_percent", FieldKind::Float),
];

pub fn normalizer() -> MappedNormalizer {
    MappedNormalizer {
        source: "ownership",
        table: "ownership_breakdown",
        natural_key: &["ticker", "html_creation_date"],
        fields: FIELDS,
    }
}
