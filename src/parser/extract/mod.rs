pub mod author;
pub mod detail;
pub mod location;
pub mod price;
pub mod specification;

use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};
use serde_json::{Number, Value};

static LINK_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div[data-name='LinkArea'] a[href]").unwrap());

pub fn offer_url(doc: &Html) -> Option<String> {
    doc.select(&LINK_SEL)
        .find_map(|a| a.value().attr("href"))
        .map(|href| href.trim().to_string())
        .filter(|href| !href.is_empty())
}

/// Whitespace-collapsed text of an element.
pub fn element_text(el: ElementRef) -> String {
    el.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Text of the first match, if non-empty.
pub fn first_text(doc: &Html, sel: &Selector) -> Option<String> {
    doc.select(sel)
        .next()
        .map(element_text)
        .filter(|t| !t.is_empty())
}

/// Integer from the digits of `s`: `"12 500 000 ₽"` → 12500000.
pub fn parse_int(s: &str) -> Option<i64> {
    let digits: String = s.chars().filter(char::is_ascii_digit).collect();
    digits.parse().ok()
}

/// Leading decimal number with either separator: `"12,5 м²"` → 12.5.
pub fn parse_decimal(s: &str) -> Option<f64> {
    let number: String = s
        .trim()
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == ',' || *c == '.')
        .map(|c| if c == ',' { '.' } else { c })
        .collect();
    number.parse().ok()
}

pub fn decimal_value(x: Option<f64>) -> Value {
    x.and_then(Number::from_f64)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

pub fn int_value(x: Option<i64>) -> Value {
    x.map(Value::from).unwrap_or(Value::Null)
}

pub fn text_value(x: Option<String>) -> Value {
    x.map(Value::String).unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers() {
        assert_eq!(parse_int("12\u{a0}500\u{a0}000 ₽"), Some(12_500_000));
        assert_eq!(parse_int("₽/мес."), None);
        assert_eq!(parse_decimal("12,5 м²"), Some(12.5));
        assert_eq!(parse_decimal("2.7 м"), Some(2.7));
        assert_eq!(parse_decimal("нет"), None);
    }

    #[test]
    fn url_from_link_area() {
        let doc = Html::parse_fragment(
            r#"<article><div data-name="LinkArea"><a href=" https://www.cian.ru/sale/flat/1/ ">x</a></div></article>"#,
        );
        assert_eq!(offer_url(&doc).as_deref(), Some("https://www.cian.ru/sale/flat/1/"));
        assert_eq!(offer_url(&Html::parse_fragment("<article></article>")), None);
    }

    #[test]
    fn collapsed_text() {
        let doc = Html::parse_fragment("<p>  ул.\n   Ленина <b>5</b> </p>");
        let sel = Selector::parse("p").unwrap();
        assert_eq!(first_text(&doc, &sel).as_deref(), Some("ул. Ленина 5"));
    }
}
