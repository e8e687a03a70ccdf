//! Retrying assertions over a page
//!
//! Like Playwright's `expect`, each check polls until it holds or the
//! timeout runs out, and only then reports the last observed value.

use std::time::Duration;

use regex::{Regex, RegexBuilder};
use tokio::time::{sleep, Instant};

use crate::driver::PageDriver;
use crate::error::{E2eError, E2eResult};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Case-insensitive, unanchored pattern from user-supplied text
pub fn case_insensitive(pattern: &str) -> E2eResult<Regex> {
    Ok(RegexBuilder::new(pattern).case_insensitive(true).build()?)
}

/// Wait until the element's text matches `pattern`
pub async fn to_have_text<D>(page: &D, selector: &str, pattern: &Regex, timeout: Duration) -> E2eResult<()>
where
    D: PageDriver + ?Sized,
{
    let deadline = Instant::now() + timeout;
    let mut last_actual = String::new();

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match page.text_content(selector, remaining.max(POLL_INTERVAL)).await {
            Ok(text) => {
                if pattern.is_match(&text) {
                    return Ok(());
                }
                last_actual = text;
            }
            Err(e) if e.is_timeout() => {}
            Err(e) => return Err(e),
        }

        if Instant::now() >= deadline {
            return Err(E2eError::AssertionFailed(format!(
                "expected {} to have text matching /{}/i, found {:?}",
                selector,
                pattern.as_str(),
                last_actual
            )));
        }
        sleep(POLL_INTERVAL).await;
    }
}

/// Wait until the page URL equals `expected`
pub async fn to_have_url<D>(page: &D, expected: &str, timeout: Duration) -> E2eResult<()>
where
    D: PageDriver + ?Sized,
{
    let deadline = Instant::now() + timeout;

    loop {
        let actual = page.url().await?;
        if actual == expected {
            return Ok(());
        }

        if Instant::now() >= deadline {
            return Err(E2eError::AssertionFailed(format!(
                "expected page URL {}, found {}",
                expected, actual
            )));
        }
        sleep(POLL_INTERVAL).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_insensitive_matches_substring() {
        let pattern = case_insensitive("invalid credentials").unwrap();
        assert!(pattern.is_match("Error: Invalid Credentials, try again"));
        assert!(!pattern.is_match("Please fill in all fields"));
    }

    #[test]
    fn test_case_insensitive_rejects_bad_pattern() {
        assert!(matches!(case_insensitive("("), Err(E2eError::InvalidPattern(_))));
    }
}
