use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};

use super::{decimal_value, element_text, int_value, parse_decimal};
use crate::record::Fields;

static TITLE_SEL: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("span[data-mark='OfferTitle'], span[data-mark='OfferSubtitle']").unwrap()
});
static ROOMS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d+)-комн").unwrap());
static METERS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+(?:[.,]\d+)?)\s*м²").unwrap());
static FLOOR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d+)/(\d+)\s*этаж").unwrap());

/// Rooms, area and floor from the card title line(s).
pub fn extract(doc: &Html) -> Fields {
    let title = doc
        .select(&TITLE_SEL)
        .map(element_text)
        .collect::<Vec<_>>()
        .join(", ");

    let rooms = if title.contains("Студия") {
        Some(0)
    } else {
        capture_int(&ROOMS_RE, &title, 1)
    };
    let total_meters = METERS_RE
        .captures(&title)
        .and_then(|caps| parse_decimal(&caps[1]));

    let mut fields = Fields::new();
    fields.insert("floor".into(), int_value(capture_int(&FLOOR_RE, &title, 1)));
    fields.insert("floors_count".into(), int_value(capture_int(&FLOOR_RE, &title, 2)));
    fields.insert("rooms_count".into(), int_value(rooms));
    fields.insert("total_meters".into(), decimal_value(total_meters));
    fields
}

fn capture_int(re: &Regex, text: &str, group: usize) -> Option<i64> {
    re.captures(text)
        .and_then(|caps| caps.get(group))
        .and_then(|m| m.as_str().parse().ok())
}
