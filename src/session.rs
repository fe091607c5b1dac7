use std::time::Duration;

use anyhow::{Context, Result};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::builder::{Built, OfferBuilder};
use crate::context::ListingContext;
use crate::fetch::{DetailFetcher, ListFetcher};
use crate::parser::{self, HtmlListPage, ListDocument, PageOutcome};
use crate::progress::{Progress, Snapshot};
use crate::store::{CsvSink, ResultSet, RunStats};

/// Fixed waits and the retry ceiling.
#[derive(Debug, Clone, Copy)]
pub struct Pacing {
    /// After every list-page attempt.
    pub list_pause: Duration,
    /// After every detail-page fetch.
    pub detail_pause: Duration,
    /// Attempts per page before it is abandoned.
    pub max_attempts: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageState {
    Pending,
    Fetching,
    Succeeded,
    Retrying,
    GivingUp,
}

/// Where a page goes after an attempt ended with `outcome`.
pub fn resolve(outcome: PageOutcome, max_attempts: u32) -> PageState {
    match outcome {
        PageOutcome::Success { .. } => PageState::Succeeded,
        _ if outcome.next_attempt() < max_attempts => PageState::Retrying,
        _ => PageState::GivingUp,
    }
}

#[derive(Debug, Default)]
pub struct RunSummary {
    pub pages_succeeded: Vec<u32>,
    pub pages_abandoned: Vec<u32>,
    pub fetches: usize,
    pub accepted: usize,
    pub duplicates: usize,
    pub unidentified: usize,
    pub average_price: f64,
}

/// One scraping run: owns the accumulated results for its lifetime.
pub struct Session<L, D> {
    ctx: ListingContext,
    pacing: Pacing,
    lists: L,
    details: D,
    sink: Option<CsvSink>,
    progress: Progress,
    results: ResultSet,
    stats: RunStats,
    duplicates: usize,
    unidentified: usize,
}

impl<L: ListFetcher, D: DetailFetcher> Session<L, D> {
    pub fn new(ctx: ListingContext, pacing: Pacing, lists: L, details: D) -> Self {
        Self {
            ctx,
            pacing,
            lists,
            details,
            sink: None,
            progress: Progress::hidden(),
            results: ResultSet::default(),
            stats: RunStats::default(),
            duplicates: 0,
            unidentified: 0,
        }
    }

    /// Rewrite `sink` after every accepted offer. Ignored unless the context asks
    /// for incremental persistence.
    pub fn with_sink(mut self, sink: CsvSink) -> Self {
        if self.ctx.persist_incrementally {
            self.sink = Some(sink);
        }
        self
    }

    pub fn with_progress(mut self, progress: Progress) -> Self {
        self.progress = progress;
        self
    }

    pub fn results(&self) -> &ResultSet {
        &self.results
    }

    /// Walk the page range. Only fetch and write failures end the run early.
    pub async fn run(&mut self) -> Result<RunSummary> {
        let pages_planned = self.ctx.pages_planned();
        let mut summary = RunSummary::default();
        let mut page = self.ctx.start_page;
        let mut attempt = 0;

        info!(
            category = self.ctx.category.as_str(),
            location = %self.ctx.location,
            start = self.ctx.start_page,
            end = self.ctx.end_page,
            "Collecting offers from list pages"
        );

        while page <= self.ctx.end_page {
            if attempt == 0 {
                debug!(page, state = ?PageState::Pending, "Page state");
            }
            debug!(page, attempt, state = ?PageState::Fetching, "Page state");

            let body = self
                .lists
                .fetch_list(page)
                .await
                .with_context(|| format!("Failed to fetch list page {}", page))?;
            summary.fetches += 1;

            let outcome = {
                let doc = HtmlListPage::parse(&body);
                self.parse_page(&doc, page, pages_planned, attempt).await?
            };
            sleep(self.pacing.list_pause).await;

            match resolve(outcome, self.pacing.max_attempts) {
                PageState::Succeeded => {
                    summary.pages_succeeded.push(page);
                    attempt = 0;
                    let Some(next) = page.checked_add(1) else { break };
                    page = next;
                }
                PageState::Retrying => {
                    attempt = outcome.next_attempt();
                    debug!(page, attempt, state = ?PageState::Retrying, "Page state");
                }
                _ => {
                    warn!(page, attempts = outcome.next_attempt(), "Giving up on page, its offers are lost");
                    summary.pages_abandoned.push(page);
                    attempt = 0;
                    let Some(next) = page.checked_add(1) else { break };
                    page = next;
                }
            }
        }

        self.progress.finish();
        summary.accepted = self.stats.accepted;
        summary.average_price = self.stats.average_price;
        summary.duplicates = self.duplicates;
        summary.unidentified = self.unidentified;
        info!(
            accepted = summary.accepted,
            duplicates = summary.duplicates,
            abandoned = summary.pages_abandoned.len(),
            "Run finished"
        );
        Ok(summary)
    }

    /// Classify one list page and build every offer on it.
    pub async fn parse_page<Doc: ListDocument>(
        &mut self,
        doc: &Doc,
        page: u32,
        pages_planned: u32,
        attempt: u32,
    ) -> Result<PageOutcome> {
        let offers = match parser::classify(doc) {
            Ok(offers) => offers,
            Err(fault) => {
                warn!(page, attempt, reason = %fault, "List page rejected");
                return Ok(PageOutcome::from_fault(fault, attempt));
            }
        };
        info!(page, offers = offers.len(), "List page parsed");

        let builder = OfferBuilder::new(&self.ctx, &self.details, self.pacing.detail_pause);
        for (ind, offer) in offers.iter().enumerate() {
            match builder.build(offer, &mut self.results, &mut self.stats).await? {
                Built::Accepted(id) => {
                    debug!(page, offer_id = id, "Offer accepted");
                    if let Some(sink) = &self.sink {
                        sink.persist(&self.results).with_context(|| {
                            format!("Failed to write {}", sink.path().display())
                        })?;
                    }
                }
                Built::Duplicate(id) => {
                    debug!(page, offer_id = id, "Duplicate offer");
                    self.duplicates += 1;
                }
                Built::Unidentified => self.unidentified += 1,
            }

            self.progress.report(&Snapshot {
                page,
                page_index: self.ctx.page_index(page),
                pages_planned,
                processed: ind + 1,
                on_page: offers.len(),
                accepted: self.stats.accepted,
                average_price: self.stats.average_price,
            });
        }

        Ok(PageOutcome::Success {
            offers_found: offers.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::collections::{HashMap, VecDeque};

    use async_trait::async_trait;
    use tokio::time::Instant;

    use super::*;
    use crate::builder::tests::{context, SpyDetails, SpyOffer};
    use crate::context::DealCategory;
    use crate::parser::CAPTCHA_MARKER;
    use crate::store::HeaderPolicy;

    const CAPTCHA: &str =
        "<html><body><h1>Captcha</h1><p>Подтвердите, что запросы отправляли вы, а не робот</p></body></html>";
    const BROKEN: &str = "<html><body><p>Something went wrong</p></body></html>";

    fn card(id: u64, price: u64) -> String {
        format!(
            r#"<article data-name="CardComponent"><div data-name="LinkArea"><a href="https://www.cian.ru/sale/flat/{}/">Квартира</a><span data-mark="MainPrice">{} ₽</span></div></article>"#,
            id, price
        )
    }

    fn list_html(ids: &[u64]) -> String {
        let cards: String = ids.iter().map(|id| card(*id, 1_000_000)).collect();
        format!(
            r#"<html><body><div data-name="HeaderDefault"></div>{}</body></html>"#,
            cards
        )
    }

    /// Serves queued bodies per page; the last body of a page repeats.
    #[derive(Default)]
    struct ScriptedLists {
        pages: RefCell<HashMap<u32, VecDeque<String>>>,
        log: RefCell<Vec<u32>>,
        fetched_at: RefCell<Vec<Instant>>,
    }

    impl ScriptedLists {
        fn page(self, page: u32, bodies: &[&str]) -> Self {
            self.pages
                .borrow_mut()
                .insert(page, bodies.iter().map(|b| b.to_string()).collect());
            self
        }
    }

    #[async_trait(?Send)]
    impl ListFetcher for ScriptedLists {
        async fn fetch_list(&self, page: u32) -> Result<String> {
            self.log.borrow_mut().push(page);
            self.fetched_at.borrow_mut().push(Instant::now());
            let mut pages = self.pages.borrow_mut();
            let queue = pages
                .get_mut(&page)
                .ok_or_else(|| anyhow::anyhow!("connection reset"))?;
            let body = if queue.len() > 1 {
                queue.pop_front().unwrap_or_default()
            } else {
                queue.front().cloned().unwrap_or_default()
            };
            Ok(body)
        }
    }

    fn quick() -> Pacing {
        Pacing {
            list_pause: Duration::ZERO,
            detail_pause: Duration::ZERO,
            max_attempts: 3,
        }
    }

    #[test]
    fn state_transitions() {
        assert_eq!(resolve(PageOutcome::Success { offers_found: 0 }, 3), PageState::Succeeded);
        assert_eq!(resolve(PageOutcome::Blocked { next_attempt: 2 }, 3), PageState::Retrying);
        assert_eq!(resolve(PageOutcome::Malformed { next_attempt: 3 }, 3), PageState::GivingUp);
        assert_eq!(resolve(PageOutcome::Blocked { next_attempt: 1 }, 1), PageState::GivingUp);
    }

    #[tokio::test]
    async fn blocked_page_retried_until_success() {
        let page1 = list_html(&[1, 2]);
        let page2 = list_html(&[3]);
        let page3 = list_html(&[4, 5]);
        let lists = ScriptedLists::default()
            .page(1, &[page1.as_str()])
            .page(2, &[CAPTCHA, CAPTCHA, page2.as_str()])
            .page(3, &[page3.as_str()]);

        let mut session = Session::new(context(DealCategory::Sale, false), quick(), lists, SpyDetails::default());
        let summary = session.run().await.unwrap();

        assert_eq!(*session.lists.log.borrow(), [1, 2, 2, 2, 3]);
        assert_eq!(summary.fetches, 5);
        assert_eq!(summary.pages_succeeded, [1, 2, 3]);
        assert!(summary.pages_abandoned.is_empty());
        assert_eq!(summary.accepted, 5);
        assert_eq!(summary.average_price, 1_000_000.0);
    }

    #[tokio::test]
    async fn malformed_page_abandoned_at_ceiling() {
        let page1 = list_html(&[1]);
        let page3 = list_html(&[3]);
        let lists = ScriptedLists::default()
            .page(1, &[page1.as_str()])
            .page(2, &[BROKEN])
            .page(3, &[page3.as_str()]);

        let mut session = Session::new(context(DealCategory::Sale, false), quick(), lists, SpyDetails::default());
        let summary = session.run().await.unwrap();

        assert_eq!(*session.lists.log.borrow(), [1, 2, 2, 2, 3]);
        assert_eq!(summary.pages_succeeded, [1, 3]);
        assert_eq!(summary.pages_abandoned, [2]);
        assert_eq!(session.results().len(), 2);
    }

    #[tokio::test]
    async fn repeated_offer_across_pages() {
        let page1 = list_html(&[10]);
        let page2 = list_html(&[20, 10, 30, 40]);
        let page3 = list_html(&[]);
        let lists = ScriptedLists::default()
            .page(1, &[page1.as_str()])
            .page(2, &[page2.as_str()])
            .page(3, &[page3.as_str()]);

        let mut session = Session::new(context(DealCategory::Sale, true), quick(), lists, SpyDetails::default());
        let summary = session.run().await.unwrap();

        assert_eq!(summary.accepted, 4);
        assert_eq!(summary.duplicates, 1);
        let urls: Vec<_> = session
            .results()
            .records()
            .iter()
            .map(|r| r.url().unwrap().to_string())
            .collect();
        assert_eq!(
            urls,
            [
                "https://www.cian.ru/sale/flat/10/",
                "https://www.cian.ru/sale/flat/20/",
                "https://www.cian.ru/sale/flat/30/",
                "https://www.cian.ru/sale/flat/40/",
            ]
        );
        // one detail request per accepted offer
        assert_eq!(session.details.urls.borrow().len(), 4);
    }

    struct FakePage {
        text: String,
        header: bool,
        offers: Vec<(u64, Option<i64>)>,
    }

    impl ListDocument for FakePage {
        type Offer = SpyOffer;

        fn text_contains(&self, marker: &str) -> bool {
            self.text.contains(marker)
        }

        fn has_header(&self) -> bool {
            self.header
        }

        fn offers(&self) -> Vec<SpyOffer> {
            self.offers.iter().map(|(id, price)| SpyOffer::new(*id, *price)).collect()
        }
    }

    #[tokio::test]
    async fn blocked_page_contributes_nothing() {
        let doc = FakePage {
            text: format!("{} required", CAPTCHA_MARKER),
            header: true,
            offers: vec![(1, Some(10)), (2, Some(20))],
        };
        let mut session = Session::new(
            context(DealCategory::Sale, true),
            quick(),
            ScriptedLists::default(),
            SpyDetails::default(),
        );
        let outcome = session.parse_page(&doc, 1, 3, 1).await.unwrap();

        assert_eq!(outcome, PageOutcome::Blocked { next_attempt: 2 });
        assert!(session.results().is_empty());
        assert!(session.details.urls.borrow().is_empty());
    }

    #[tokio::test]
    async fn four_cards_one_seen_adds_three() {
        let mut session = Session::new(
            context(DealCategory::Sale, false),
            quick(),
            ScriptedLists::default(),
            SpyDetails::default(),
        );
        let first = FakePage {
            text: String::new(),
            header: true,
            offers: vec![(7, Some(100))],
        };
        session.parse_page(&first, 1, 3, 0).await.unwrap();

        let second = FakePage {
            text: String::new(),
            header: true,
            offers: vec![(8, Some(100)), (7, Some(100)), (9, None), (10, Some(5))],
        };
        let outcome = session.parse_page(&second, 2, 3, 0).await.unwrap();

        assert_eq!(outcome, PageOutcome::Success { offers_found: 4 });
        assert_eq!(session.results().len(), 4);
        assert_eq!(session.duplicates, 1);
    }

    #[tokio::test]
    async fn incremental_persistence_rewrites_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let page1 = list_html(&[1, 2]);
        let lists = ScriptedLists::default().page(1, &[page1.as_str()]);
        let mut ctx = context(DealCategory::Sale, false);
        ctx.end_page = 1;
        ctx.persist_incrementally = true;

        let mut session = Session::new(ctx, quick(), lists, SpyDetails::default())
            .with_sink(CsvSink::new(&path, HeaderPolicy::DropExtra));
        session.run().await.unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("url;location;deal_type;accommodation_type;author"));
        assert!(lines[1].starts_with("https://www.cian.ru/sale/flat/1/;Москва;sale;flat;"));
        assert!(lines[1].contains(";1000000;"));
    }

    #[tokio::test]
    async fn sink_ignored_without_persist_flag() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let page1 = list_html(&[1]);
        let lists = ScriptedLists::default().page(1, &[page1.as_str()]);
        let mut ctx = context(DealCategory::Sale, false);
        ctx.end_page = 1;

        let mut session = Session::new(ctx, quick(), lists, SpyDetails::default())
            .with_sink(CsvSink::new(&path, HeaderPolicy::DropExtra));
        session.run().await.unwrap();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn transport_failure_is_fatal() {
        let page1 = list_html(&[1]);
        let lists = ScriptedLists::default().page(1, &[page1.as_str()]);
        let mut session = Session::new(context(DealCategory::Sale, false), quick(), lists, SpyDetails::default());

        let err = session.run().await.unwrap_err();
        assert!(err.to_string().contains("list page 2"));
        assert_eq!(session.results().len(), 1);
    }

    #[tokio::test]
    async fn list_pause_follows_every_attempt() {
        let empty = list_html(&[]);
        let page2 = list_html(&[1]);
        let lists = ScriptedLists::default()
            .page(1, &[CAPTCHA, empty.as_str()])
            .page(2, &[BROKEN, page2.as_str()]);
        let pause = Duration::from_millis(40);
        let pacing = Pacing {
            list_pause: pause,
            ..quick()
        };
        let mut ctx = context(DealCategory::Sale, false);
        ctx.end_page = 2;

        let mut session = Session::new(ctx, pacing, lists, SpyDetails::default());
        session.run().await.unwrap();
        let finished = Instant::now();

        assert_eq!(*session.lists.log.borrow(), [1, 1, 2, 2]);
        let fetched_at = session.lists.fetched_at.borrow();
        for pair in fetched_at.windows(2) {
            assert!(pair[1] - pair[0] >= pause, "gap {:?}", pair[1] - pair[0]);
        }
        assert!(finished - fetched_at[3] >= pause);
    }

    #[tokio::test]
    async fn last_page_at_top_of_range() {
        let page = list_html(&[1]);
        let lists = ScriptedLists::default().page(u32::MAX, &[page.as_str()]);
        let mut ctx = context(DealCategory::Sale, false);
        ctx.start_page = u32::MAX;
        ctx.end_page = u32::MAX;

        let mut session = Session::new(ctx, quick(), lists, SpyDetails::default());
        let summary = session.run().await.unwrap();

        assert_eq!(*session.lists.log.borrow(), [u32::MAX]);
        assert_eq!(summary.pages_succeeded, [u32::MAX]);
        assert_eq!(summary.accepted, 1);
    }

    #[tokio::test]
    async fn abandoned_page_at_top_of_range() {
        let lists = ScriptedLists::default()
            .page(u32::MAX - 1, &[BROKEN])
            .page(u32::MAX, &[BROKEN]);
        let mut ctx = context(DealCategory::Sale, false);
        ctx.start_page = u32::MAX - 1;
        ctx.end_page = u32::MAX;

        let mut session = Session::new(ctx, quick(), lists, SpyDetails::default());
        let summary = session.run().await.unwrap();

        assert_eq!(summary.fetches, 6);
        assert_eq!(summary.pages_abandoned, [u32::MAX - 1, u32::MAX]);
    }
}
