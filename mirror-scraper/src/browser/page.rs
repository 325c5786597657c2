//! [`PageHandle`] over a live CDP page.

use crate::error::ScrapeError;
use crate::page::{PageHandle, RawCell, RawRow};
use async_trait::async_trait;
use chromiumoxide::Page;

/// A rendered page in a running browser.
#[derive(Clone)]
pub struct ChromiumPage {
    page: Page,
}

impl ChromiumPage {
    pub fn new(page: Page) -> Self {
        Self { page }
    }
}

/// Script that serializes table rows in one round-trip.
fn rows_script(selector: &str) -> Result<String, ScrapeError> {
    let selector = serde_json::to_string(selector)
        .map_err(|e| ScrapeError::InvalidSelector(e.to_string()))?;
    Ok(format!(
        r#"(() => {{
  const body = document.querySelector({selector});
  if (!body) return [];
  const clean = (s) => (s || '').replace(/\s+/g, ' ').trim();
  return Array.from(body.querySelectorAll('tr'))
    .map((tr) => Array.from(tr.querySelectorAll('td')).map((td) => {{
      const a = td.querySelector('a');
      return {{
        text: clean(td.innerText),
        test_id: td.getAttribute('data-test-id'),
        link: a ? {{
          href: a.getAttribute('href'),
          test_id: a.getAttribute('data-test-id'),
          text: clean(a.innerText),
        }} : null,
      }};
    }}))
    .filter((cells) => cells.length > 0);
}})()"#
    ))
}

#[async_trait]
impl PageHandle for ChromiumPage {
    async fn query_rows(&self, selector: &str) -> Result<Vec<RawRow>, ScrapeError> {
        let script = rows_script(selector)?;
        let result = self.page.evaluate(script).await.map_err(|e| {
            let message = e.to_string();
            if message.contains("SyntaxError") && message.contains("querySelector") {
                ScrapeError::InvalidSelector(format!("{selector}: {message}"))
            } else {
                ScrapeError::Browser(message)
            }
        })?;
        let rows: Vec<Vec<RawCell>> = result
            .into_value()
            .map_err(|e| ScrapeError::Browser(format!("unexpected row payload: {e}")))?;
        Ok(rows.into_iter().map(RawRow::new).collect())
    }

    async fn current_url(&self) -> Option<String> {
        self.page.url().await.ok().flatten()
    }

    async fn contains_text(&self, needle: &str) -> Result<bool, ScrapeError> {
        let needle = serde_json::to_string(&needle.to_lowercase())
            .map_err(|e| ScrapeError::Browser(e.to_string()))?;
        let script = format!(
            "(() => !!document.body && document.body.innerText.toLowerCase().includes({needle}))()"
        );
        self.page
            .evaluate(script)
            .await
            .map_err(|e| ScrapeError::Browser(e.to_string()))?
            .into_value::<bool>()
            .map_err(|e| ScrapeError::Browser(e.to_string()))
    }
}
