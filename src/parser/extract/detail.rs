use std::sync::LazyLock;

use scraper::{Html, Selector};
use serde_json::Value;

use super::{decimal_value, int_value, parse_decimal, parse_int, text_value};
use crate::record::Fields;

static BODY_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("body").unwrap());

enum Kind {
    Text,
    Int,
    Decimal,
}

// (page label, column, value kind)
const LABELS: &[(&str, &str, Kind)] = &[
    ("Тип жилья", "object_type", Kind::Text),
    ("Тип дома", "house_material", Kind::Text),
    ("Год постройки", "year_of_construction", Kind::Int),
    ("Отопление", "heating_type", Kind::Text),
    ("Отделка", "finish_type", Kind::Text),
    ("Жилая площадь", "living_meters", Kind::Decimal),
    ("Площадь кухни", "kitchen_meters", Kind::Decimal),
    ("Высота потолков", "ceiling_height", Kind::Decimal),
    ("Санузел", "bathroom", Kind::Text),
    ("Балкон/лоджия", "balcony", Kind::Text),
];

/// Label/value pairs from a flat's own page. A label missing from the page gives null.
pub fn extract(html: &str) -> Fields {
    let doc = Html::parse_document(html);
    let tokens: Vec<String> = doc
        .select(&BODY_SEL)
        .next()
        .map(|body| {
            body.text()
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let mut fields = Fields::new();
    for (label, column, kind) in LABELS {
        let raw = next_after(&tokens, label);
        let value: Value = match kind {
            Kind::Text => text_value(raw.map(str::to_string)),
            Kind::Int => int_value(raw.and_then(parse_int)),
            Kind::Decimal => decimal_value(raw.and_then(parse_decimal)),
        };
        fields.insert(column.to_string(), value);
    }
    fields
}

/// Token following `label`, if any.
fn next_after<'a>(tokens: &'a [String], label: &str) -> Option<&'a str> {
    let i = tokens.iter().position(|t| t == label)?;
    tokens.get(i + 1).map(String::as_str)
}
