use crate::context::DealCategory;
use crate::record::OfferRecord;

pub const SALE_ONLY_FIELDS: &[&str] = &["price", "residential_complex", "object_type", "finish_type"];
pub const RENT_LONG_ONLY_FIELDS: &[&str] = &["price_per_month", "commissions"];
pub const RENT_SHORT_ONLY_FIELDS: &[&str] = &["price_per_day"];

/// Fields that must not appear in records of `category`.
pub fn foreign_fields(category: DealCategory) -> [&'static [&'static str]; 2] {
    match category {
        DealCategory::Sale => [RENT_LONG_ONLY_FIELDS, RENT_SHORT_ONLY_FIELDS],
        DealCategory::RentLong => [RENT_SHORT_ONLY_FIELDS, SALE_ONLY_FIELDS],
        DealCategory::RentShort => [RENT_LONG_ONLY_FIELDS, SALE_ONLY_FIELDS],
    }
}

/// Strip fields belonging to other categories. Missing fields are ignored.
pub fn prune(record: &mut OfferRecord, category: DealCategory) {
    for field in foreign_fields(category).into_iter().flatten() {
        record.remove(field);
    }
}
