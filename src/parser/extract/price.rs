use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};
use serde_json::Value;

use super::{first_text, int_value, parse_int};
use crate::record::Fields;

static MAIN_PRICE_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("span[data-mark='MainPrice']").unwrap());
static PRICE_INFO_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("p[data-mark='PriceInfo']").unwrap());
static COMMISSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)комиссия\s+(\d+)\s*%").unwrap());

/// The headline price, keyed by period: `price` (sale), `price_per_month` + `commissions`
/// (long rent) or `price_per_day` (daily rent).
pub fn extract(doc: &Html) -> Fields {
    let mut fields = Fields::new();
    let Some(main) = first_text(doc, &MAIN_PRICE_SEL) else {
        fields.insert("price".into(), Value::Null);
        return fields;
    };
    let amount = int_value(parse_int(&main));

    if main.contains("/мес") {
        fields.insert("price_per_month".into(), amount);
        let info = first_text(doc, &PRICE_INFO_SEL).unwrap_or_default();
        fields.insert("commissions".into(), int_value(commission(&info)));
    } else if main.contains("/сут") {
        fields.insert("price_per_day".into(), amount);
    } else {
        fields.insert("price".into(), amount);
    }
    fields
}

fn commission(info: &str) -> Option<i64> {
    if info.to_lowercase().contains("без комиссии") {
        return Some(0);
    }
    COMMISSION_RE
        .captures(info)
        .and_then(|caps| caps[1].parse().ok())
}
