use std::sync::LazyLock;

use scraper::{Html, Selector};
use serde_json::Value;

use super::{first_text, text_value};
use crate::record::Fields;

static NAME_SEL: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("div[data-name='BrandingLevelWrapper'] span[data-name='AuthorName']").unwrap()
});
static TYPE_SEL: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("div[data-name='BrandingLevelWrapper'] span[data-name='AuthorType']").unwrap()
});

// Checked in order; the first label contained in the badge wins.
const AUTHOR_TYPES: &[(&str, &str)] = &[
    ("Представитель", "official_representative"),
    ("Застройщик", "developer"),
    ("Агентство", "real_estate_agent"),
    ("Риелтор", "realtor"),
    ("Собственник", "homeowner"),
];

pub fn extract(doc: &Html) -> Fields {
    let author = first_text(doc, &NAME_SEL);
    let author_type = first_text(doc, &TYPE_SEL).map(|badge| classify(&badge).to_string());

    let mut fields = Fields::new();
    fields.insert("author".into(), text_value(author));
    fields.insert(
        "author_type".into(),
        author_type.map(Value::String).unwrap_or_else(|| Value::from("unknown")),
    );
    fields
}

fn classify(badge: &str) -> &'static str {
    AUTHOR_TYPES
        .iter()
        .find(|(label, _)| badge.contains(label))
        .map(|(_, kind)| *kind)
        .unwrap_or("unknown")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agency_badge() {
        let doc = Html::parse_fragment(
            r#"<div data-name="BrandingLevelWrapper"><span data-name="AuthorName">Этажи</span><span data-name="AuthorType">Агентство недвижимости</span></div>"#,
        );
        let f = extract(&doc);
        assert_eq!(f["author"], "Этажи");
        assert_eq!(f["author_type"], "real_estate_agent");
    }

    #[test]
    fn representative_before_developer() {
        assert_eq!(classify("Представитель застройщика"), "official_representative");
        assert_eq!(classify("Застройщик"), "developer");
        assert_eq!(classify("Частное лицо"), "unknown");
    }

    #[test]
    fn missing_badge() {
        let f = extract(&Html::parse_fragment("<article></article>"));
        assert_eq!(f["author"], Value::Null);
        assert_eq!(f["author_type"], "unknown");
    }
}
