use std::time::Duration;

use tracing::info;

use crate::{config::Config, error::ApiError};

const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Fetch the provider's search-results page for a category + zipcode pair.
/// The body goes straight to the extractor; no browser automation here.
pub async fn fetch_search_page(
    config: &Config,
    category: &str,
    zipcode: &str,
) -> Result<String, ApiError> {
    let url = format!("{}/search", config.scrape_base_url);
    let client = reqwest::Client::builder()
        .timeout(FETCH_TIMEOUT)
        .build()
        .map_err(|err| ApiError::Internal(anyhow::anyhow!("failed building HTTP client: {err}")))?;

    info!(category, zipcode, url = %url, "Fetching provider search page");
    let response = client
        .get(&url)
        .query(&[("terms", category), ("postal", zipcode)])
        .send()
        .await
        .map_err(|err| {
            ApiError::Internal(anyhow::Error::new(err).context("provider fetch failed"))
        })?;

    let status = response.status();
    if !status.is_success() {
        return Err(ApiError::Internal(anyhow::anyhow!(
            "provider returned status {status}"
        )));
    }

    let body = response.text().await.map_err(|err| {
        ApiError::Internal(anyhow::Error::new(err).context("reading provider response body"))
    })?;

    info!(bytes = body.len(), "Provider page fetched");
    Ok(body)
}
