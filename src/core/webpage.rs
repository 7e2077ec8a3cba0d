use crate::utils::url::ensure_scheme;

/// Fetch the raw body of a page. The caller truncates before embedding
/// the content anywhere.
pub async fn fetch_webpage(client: &reqwest::Client, url: &str) -> Result<String, reqwest::Error> {
    let url = ensure_scheme(url);
    let response = client.get(&url).send().await?;
    response.text().await
}
