use clap::ValueEnum;
use serde::Deserialize;

pub const ACCOMMODATION_TYPE: &str = "flat";

/// Listing category the run is scoped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DealCategory {
    Sale,
    RentLong,
    RentShort,
}

impl DealCategory {
    /// Value of the `deal_type` column and of the site's `deal_type` query parameter.
    pub fn deal_type(self) -> &'static str {
        match self {
            DealCategory::Sale => "sale",
            DealCategory::RentLong | DealCategory::RentShort => "rent",
        }
    }

    /// Site rent period code: 4 = long term, 2 = daily.
    pub fn rent_period(self) -> Option<u8> {
        match self {
            DealCategory::Sale => None,
            DealCategory::RentLong => Some(4),
            DealCategory::RentShort => Some(2),
        }
    }

    pub fn is_sale(self) -> bool {
        self == DealCategory::Sale
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DealCategory::Sale => "sale",
            DealCategory::RentLong => "rent-long",
            DealCategory::RentShort => "rent-short",
        }
    }
}

/// Immutable per-run parameters.
#[derive(Debug, Clone)]
pub struct ListingContext {
    pub category: DealCategory,
    pub location: String,
    pub start_page: u32,
    pub end_page: u32,
    pub fetch_detail_pages: bool,
    pub persist_incrementally: bool,
}

impl ListingContext {
    pub fn pages_planned(&self) -> u32 {
        self.end_page.saturating_sub(self.start_page) + 1
    }

    /// 1-based position of `page` within the configured range.
    pub fn page_index(&self, page: u32) -> u32 {
        page.saturating_sub(self.start_page) + 1
    }
}
