use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use crate::context::DealCategory;
use crate::parser::extract::detail;
use crate::record::Fields;

// Single worker: futures need not be Send.

/// Source of search-result page bodies.
#[async_trait(?Send)]
pub trait ListFetcher {
    async fn fetch_list(&self, page: u32) -> Result<String>;
}

/// Source of per-offer detail fields.
#[async_trait(?Send)]
pub trait DetailFetcher {
    async fn fetch_detail(&self, url: &str) -> Result<Fields>;
}

#[async_trait(?Send)]
impl<'a, T: ListFetcher + ?Sized> ListFetcher for &'a T {
    async fn fetch_list(&self, page: u32) -> Result<String> {
        (**self).fetch_list(page).await
    }
}

#[async_trait(?Send)]
impl<'a, T: DetailFetcher + ?Sized> DetailFetcher for &'a T {
    async fn fetch_detail(&self, url: &str) -> Result<Fields> {
        (**self).fetch_detail(url).await
    }
}

/// Stand-in for parsing saved pages: every request fails.
pub struct Offline;

#[async_trait(?Send)]
impl ListFetcher for Offline {
    async fn fetch_list(&self, page: u32) -> Result<String> {
        bail!("offline: list page {} not available", page)
    }
}

#[async_trait(?Send)]
impl DetailFetcher for Offline {
    async fn fetch_detail(&self, url: &str) -> Result<Fields> {
        bail!("offline: {} not available", url)
    }
}

/// One HTTP session shared by list and detail requests.
pub struct HttpFetcher {
    client: Client,
    search_url: String,
    category: DealCategory,
    region: u32,
}

impl HttpFetcher {
    pub fn new(search_url: &str, user_agent: &str, category: DealCategory, region: u32) -> Result<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .cookie_store(true)
            .build()
            .context("Failed to build http client")?;
        Ok(Self {
            client,
            search_url: search_url.to_string(),
            category,
            region,
        })
    }

    pub fn list_url(&self, page: u32) -> String {
        let mut url = format!(
            "{}?engine_version=2&offer_type=flat&deal_type={}&region={}&p={}",
            self.search_url,
            self.category.deal_type(),
            self.region,
            page
        );
        if let Some(period) = self.category.rent_period() {
            url.push_str(&format!("&type={}", period));
        }
        url
    }

    async fn get_text(&self, url: &str) -> Result<String> {
        debug!(url, "GET");
        let res = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("Request failed for {}", url))?;
        // Challenge pages come back with error statuses too; the parser classifies them.
        Ok(res.text().await?)
    }
}

#[async_trait(?Send)]
impl ListFetcher for HttpFetcher {
    async fn fetch_list(&self, page: u32) -> Result<String> {
        self.get_text(&self.list_url(page)).await
    }
}

#[async_trait(?Send)]
impl DetailFetcher for HttpFetcher {
    async fn fetch_detail(&self, url: &str) -> Result<Fields> {
        let html = self.get_text(url).await?;
        Ok(detail::extract(&html))
    }
}
