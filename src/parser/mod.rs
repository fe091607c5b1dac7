pub mod extract;

use scraper::{Html, Selector};
use std::sync::LazyLock;

use crate::context::DealCategory;
use crate::record::Fields;

/// Text the anti-bot challenge page always shows.
pub const CAPTCHA_MARKER: &str = "Captcha";

static HEADER_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div[data-name='HeaderDefault']").unwrap());
static OFFER_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("article[data-name='CardComponent']").unwrap());

/// A parsed search-result page.
pub trait ListDocument {
    type Offer: OfferQuery;

    fn text_contains(&self, marker: &str) -> bool;
    /// Whether the page header landmark is present.
    fn has_header(&self) -> bool;
    /// Offer cards in document order.
    fn offers(&self) -> Vec<Self::Offer>;
}

/// Field queries against one offer card.
pub trait OfferQuery {
    fn url(&self) -> Option<String>;
    fn author(&self) -> Fields;
    fn location(&self, category: DealCategory) -> Fields;
    fn price(&self) -> Fields;
    fn specification(&self) -> Fields;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PageFault {
    #[error("anti-bot challenge")]
    Blocked,
    #[error("page header missing")]
    Malformed,
}

/// Result of one fetch+parse attempt, with the attempt counter to use next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageOutcome {
    Success { offers_found: usize },
    Blocked { next_attempt: u32 },
    Malformed { next_attempt: u32 },
}

impl PageOutcome {
    pub fn from_fault(fault: PageFault, attempt: u32) -> Self {
        match fault {
            PageFault::Blocked => PageOutcome::Blocked {
                next_attempt: attempt + 1,
            },
            PageFault::Malformed => PageOutcome::Malformed {
                next_attempt: attempt + 1,
            },
        }
    }

    pub fn next_attempt(&self) -> u32 {
        match *self {
            PageOutcome::Success { .. } => 0,
            PageOutcome::Blocked { next_attempt } | PageOutcome::Malformed { next_attempt } => {
                next_attempt
            }
        }
    }
}

/// Reject challenge and broken pages, otherwise return the offer cards.
pub fn classify<D: ListDocument>(doc: &D) -> Result<Vec<D::Offer>, PageFault> {
    if doc.text_contains(CAPTCHA_MARKER) {
        return Err(PageFault::Blocked);
    }
    if !doc.has_header() {
        return Err(PageFault::Malformed);
    }
    Ok(doc.offers())
}

// ── HTML ──

pub struct HtmlListPage {
    doc: Html,
}

impl HtmlListPage {
    pub fn parse(html: &str) -> Self {
        Self {
            doc: Html::parse_document(html),
        }
    }
}

impl ListDocument for HtmlListPage {
    type Offer = HtmlOffer;

    fn text_contains(&self, marker: &str) -> bool {
        self.doc.root_element().text().collect::<String>().contains(marker)
    }

    fn has_header(&self) -> bool {
        self.doc.select(&HEADER_SEL).next().is_some()
    }

    fn offers(&self) -> Vec<HtmlOffer> {
        self.doc
            .select(&OFFER_SEL)
            .map(|card| HtmlOffer {
                doc: Html::parse_fragment(&card.html()),
            })
            .collect()
    }
}

/// One offer card, detached from its page.
pub struct HtmlOffer {
    doc: Html,
}

impl OfferQuery for HtmlOffer {
    fn url(&self) -> Option<String> {
        extract::offer_url(&self.doc)
    }

    fn author(&self) -> Fields {
        extract::author::extract(&self.doc)
    }

    fn location(&self, category: DealCategory) -> Fields {
        extract::location::extract(&self.doc, category.is_sale())
    }

    fn price(&self) -> Fields {
        extract::price::extract(&self.doc)
    }

    fn specification(&self) -> Fields {
        extract::specification::extract(&self.doc)
    }
}
