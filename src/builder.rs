use std::time::Duration;

use anyhow::{Context, Result};
use tokio::time::sleep;
use tracing::warn;

use crate::context::ListingContext;
use crate::fetch::DetailFetcher;
use crate::parser::OfferQuery;
use crate::prune::prune;
use crate::record::{offer_id, OfferRecord};
use crate::store::{ResultSet, RunStats};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Built {
    Accepted(u64),
    Duplicate(u64),
    /// Card had no link or the link carried no offer id.
    Unidentified,
}

/// Turns offer cards into records and accepts the ones not seen before.
pub struct OfferBuilder<'a, D> {
    ctx: &'a ListingContext,
    details: &'a D,
    detail_pause: Duration,
}

impl<'a, D: DetailFetcher> OfferBuilder<'a, D> {
    pub fn new(ctx: &'a ListingContext, details: &'a D, detail_pause: Duration) -> Self {
        Self {
            ctx,
            details,
            detail_pause,
        }
    }

    /// The id check runs before any extraction, so a duplicate costs no extractor
    /// calls and no detail request.
    pub async fn build<Q: OfferQuery>(
        &self,
        offer: &Q,
        results: &mut ResultSet,
        stats: &mut RunStats,
    ) -> Result<Built> {
        let Some(url) = offer.url() else {
            warn!("Offer card without link, skipped");
            return Ok(Built::Unidentified);
        };
        let Some(id) = offer_id(&url) else {
            warn!(url = %url, "No offer id in url, skipped");
            return Ok(Built::Unidentified);
        };
        if results.contains(id) {
            return Ok(Built::Duplicate(id));
        }

        // context < list card < detail page
        let mut record = OfferRecord::from_context(&url, self.ctx);
        record.merge(offer.author());
        record.merge(offer.location(self.ctx.category));
        record.merge(offer.price());
        record.merge(offer.specification());

        if self.ctx.fetch_detail_pages {
            let detail = self
                .details
                .fetch_detail(&url)
                .await
                .with_context(|| format!("Failed to fetch offer page {}", url))?;
            record.merge(detail);
            sleep(self.detail_pause).await;
        }

        prune(&mut record, self.ctx.category);
        let price = record.price();
        let fresh = results.accumulate(id, record);
        debug_assert!(fresh, "offer {} accepted twice", id);
        stats.record(price);

        Ok(Built::Accepted(id))
    }
}
