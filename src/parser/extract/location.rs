use std::sync::LazyLock;

use scraper::{Html, Selector};

use super::{element_text, first_text, text_value};
use crate::record::Fields;

static GEO_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[data-name='GeoLabel']").unwrap());
static UNDERGROUND_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div[data-name='SpecialGeo'] a").unwrap());
static COMPLEX_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href*='/zhk-']").unwrap());

const STREET_MARKERS: &[&str] = &[
    "ул.", "улица", "пер.", "просп.", "пр-т", "проезд", "ш.", "наб.", "б-р", "бульвар", "пл.",
];

/// Address pieces from the geo labels. Sale cards also name the residential complex.
pub fn extract(doc: &Html, is_sale: bool) -> Fields {
    let labels: Vec<String> = doc.select(&GEO_SEL).map(element_text).collect();

    let district = labels
        .iter()
        .find_map(|l| l.strip_prefix("р-н "))
        .map(str::to_string);

    let street_idx = labels
        .iter()
        .position(|l| STREET_MARKERS.iter().any(|m| l.contains(m)));
    let street = street_idx.map(|i| labels[i].clone());
    let house_number = street_idx
        .and_then(|i| labels.get(i + 1))
        .filter(|l| l.starts_with(|c: char| c.is_ascii_digit()))
        .cloned();

    let mut fields = Fields::new();
    fields.insert("district".into(), text_value(district));
    fields.insert("street".into(), text_value(street));
    fields.insert("house_number".into(), text_value(house_number));
    fields.insert("underground".into(), text_value(first_text(doc, &UNDERGROUND_SEL)));
    if is_sale {
        fields.insert(
            "residential_complex".into(),
            text_value(first_text(doc, &COMPLEX_SEL)),
        );
    }
    fields
}
