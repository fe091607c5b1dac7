use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

use crate::context::{ListingContext, ACCOMMODATION_TYPE};

/// Attribute map produced by one extractor. Insertion order is kept.
pub type Fields = Map<String, Value>;

static OFFER_ID_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"/(\d+)/?$").unwrap());

/// Price columns in lookup order for the running average.
const PRICE_KEYS: &[&str] = &["price", "price_per_month", "price_per_day"];

/// Numeric offer id from an offer url: the last all-digit path segment.
///
/// `https://www.cian.ru/sale/flat/290212283/` → `290212283`.
pub fn offer_id(url: &str) -> Option<u64> {
    let path = url.split(['?', '#']).next().unwrap_or_default();
    OFFER_ID_RE
        .captures(path)
        .and_then(|caps| caps[1].parse().ok())
}

/// One flat offer as written to the output file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OfferRecord {
    fields: Fields,
}

impl OfferRecord {
    /// Base record carrying the fields every row has.
    pub fn from_context(url: &str, ctx: &ListingContext) -> Self {
        let mut fields = Fields::new();
        fields.insert("url".into(), Value::from(url));
        fields.insert("location".into(), Value::from(ctx.location.as_str()));
        fields.insert("deal_type".into(), Value::from(ctx.category.deal_type()));
        fields.insert("accommodation_type".into(), Value::from(ACCOMMODATION_TYPE));
        Self { fields }
    }

    /// Later values win; an existing key keeps its column position.
    pub fn merge(&mut self, fields: Fields) {
        for (key, value) in fields {
            self.fields.insert(key, value);
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.fields.shift_remove(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn url(&self) -> Option<&str> {
        self.get("url").and_then(Value::as_str)
    }

    /// First numeric price column present, if any.
    pub fn price(&self) -> Option<f64> {
        PRICE_KEYS
            .iter()
            .find_map(|key| self.get(key).and_then(Value::as_f64))
    }

    pub fn as_fields(&self) -> &Fields {
        &self.fields
    }
}
