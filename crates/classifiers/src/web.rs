//! Web lookup strategy.
//!
//! Fetches the page the archive came from (when an origin hint is known) or
//! a search results page for the asset's name, strips markup and counts
//! category keywords. The dominant category wins; a tie or no hits declines.

use async_trait::async_trait;
use dropsort_config::WebLookupConfig;
use dropsort_core::classify::{Answer, Asset, AssetType, ClassificationMethod, Confidence, Strategy};
use dropsort_core::error::StrategyError;
use regex::Regex;
use std::sync::LazyLock;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

const MAX_BODY_BYTES: usize = 512 * 1024;

static TAGS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<script.*?</script>|<style.*?</style>|<[^>]+>").expect("valid regex")
});

/// Words that point at each category on a product or search page.
const CATEGORY_WORDS: &[(AssetType, &[&str])] = &[
    (
        AssetType::Music,
        &["music", "song", "soundtrack", "track", "beat", "bpm", "royalty-free music"],
    ),
    (
        AssetType::SoundEffect,
        &["sfx", "sound effect", "sound effects", "whoosh", "foley", "impact", "riser"],
    ),
    (
        AssetType::Footage,
        &["footage", "stock video", "b-roll", "4k", "clip", "drone"],
    ),
    (
        AssetType::Image,
        &["photo", "image", "illustration", "texture", "wallpaper", "overlay"],
    ),
    (
        AssetType::Template,
        &["template", "mogrt", "after effects", "premiere pro", "preset", "lut", "transitions pack"],
    ),
];

pub struct WebLookupStrategy {
    lookup_url: String,
    use_origin_hint: bool,
    client: reqwest::Client,
}

impl WebLookupStrategy {
    pub fn new(config: &WebLookupConfig) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .user_agent(concat!("dropsort/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            lookup_url: config.lookup_url.clone(),
            use_origin_hint: config.use_origin_hint,
            client,
        }
    }

    /// Page to fetch for `asset`.
    pub fn target_url(&self, asset: &Asset) -> String {
        if self.use_origin_hint {
            if let Some(origin) = asset.origin_hint.as_deref().filter(|o| o.starts_with("http")) {
                return origin.to_string();
            }
        }

        let mut query = asset.stem().replace(['_', '-'], " ");
        if let Some(folder) = &asset.source_folder {
            query = format!("{folder} {query}");
        }
        self.lookup_url.replace("{query}", &encode_query(query.trim()))
    }

    async fn lookup(&self, asset: &Asset) -> Result<Answer, StrategyError> {
        let url = self.target_url(asset);
        debug!(asset = %asset.file_name(), url = %url, "Web lookup");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| StrategyError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        if status == 429 {
            return Err(StrategyError::RateLimited {
                retry_after_secs: 60,
            });
        }
        if !response.status().is_success() {
            return Err(StrategyError::Api {
                status_code: status,
                message: format!("lookup page returned {status}"),
            });
        }

        let body = read_capped(response, MAX_BODY_BYTES).await?;
        score_page(&body)
    }
}

/// Read at most `limit` bytes of the response body. The rest is never fetched.
async fn read_capped(mut response: reqwest::Response, limit: usize) -> Result<String, StrategyError> {
    let mut buf: Vec<u8> = Vec::new();
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| StrategyError::Network(e.to_string()))?
    {
        let room = limit - buf.len();
        if chunk.len() >= room {
            buf.extend_from_slice(&chunk[..room]);
            debug!(limit, "Lookup page truncated");
            break;
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

#[async_trait]
impl Strategy for WebLookupStrategy {
    fn method(&self) -> ClassificationMethod {
        ClassificationMethod::WebLookup
    }

    async fn attempt(
        &self,
        asset: &Asset,
        cancel: CancellationToken,
    ) -> Result<Answer, StrategyError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(StrategyError::Cancelled),
            r = self.lookup(asset) => r,
        }
    }
}

/// Count category keywords in an HTML page and turn the tally into an answer.
pub fn score_page(html: &str) -> Result<Answer, StrategyError> {
    let text = TAGS.replace_all(html, " ").to_lowercase();

    let mut scores: Vec<(AssetType, usize)> = CATEGORY_WORDS
        .iter()
        .map(|(t, words)| (*t, words.iter().map(|w| text.matches(w).count()).sum()))
        .collect();
    scores.sort_by(|a, b| b.1.cmp(&a.1));

    let (top_type, top) = scores[0];
    let runner_up = scores.get(1).map(|s| s.1).unwrap_or(0);

    if top == 0 {
        return Err(StrategyError::Ambiguous("no category keywords on page".into()));
    }
    if top == runner_up {
        return Err(StrategyError::Ambiguous(format!(
            "tie between categories at {top} hits"
        )));
    }

    let confidence = if top >= 6 && top >= runner_up * 2 {
        Confidence::High
    } else if top >= 3 {
        Confidence::Medium
    } else {
        Confidence::Low
    };

    Ok(Answer::new(top_type, confidence)
        .with_rationale(format!("{top} keyword hits vs {runner_up}")))
}

/// Form-style percent encoding for a query value.
fn encode_query(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for b in value.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char)
            }
            b' ' => out.push('+'),
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(lookup_url: String) -> WebLookupConfig {
        WebLookupConfig {
            lookup_url,
            use_origin_hint: true,
        }
    }

    #[test]
    fn encodes_query() {
        assert_eq!(encode_query("ROAD TO EWC riser"), "ROAD+TO+EWC+riser");
        assert_eq!(encode_query("a&b/c"), "a%26b%2Fc");
    }

    #[test]
    fn target_prefers_origin_hint() {
        let s = WebLookupStrategy::new(&config("https://search.test/?q={query}".into()));
        let mut asset = Asset::new("/x/Big_Riser-01.wav");
        asset.source_folder = Some("ROAD TO EWC".into());
        assert_eq!(
            s.target_url(&asset),
            "https://search.test/?q=ROAD+TO+EWC+Big+Riser+01"
        );

        asset.origin_hint = Some("https://store.test/packs/ewc".into());
        assert_eq!(s.target_url(&asset), "https://store.test/packs/ewc");
    }

    #[test]
    fn scoring_picks_dominant_category() {
        let html = r#"<html><head><style>.music{}</style></head><body>
            <h1>Cinematic SFX Pack</h1><p>Whoosh, impact and riser sound effects.</p>
            <p>Sound effects for trailers. Foley included.</p></body></html>"#;
        let answer = score_page(html).unwrap();
        assert_eq!(answer.asset_type, AssetType::SoundEffect);
        assert_eq!(answer.confidence, Confidence::High);
    }

    #[test]
    fn scoring_declines_on_nothing_or_tie() {
        assert!(matches!(
            score_page("<p>hello world</p>"),
            Err(StrategyError::Ambiguous(_))
        ));
        assert!(matches!(
            score_page("<p>music footage</p>"),
            Err(StrategyError::Ambiguous(_))
        ));
    }

    #[tokio::test]
    async fn looks_up_search_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("q", "Drone City Night"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "<ul><li>Drone City Night 4K stock video footage</li>\
                 <li>Aerial drone clip, 4k footage</li></ul>",
            ))
            .expect(1)
            .mount(&server)
            .await;

        let strategy =
            WebLookupStrategy::new(&config(format!("{}/search?q={{query}}", server.uri())));
        let answer = strategy
            .attempt(&Asset::new("/x/Drone_City_Night.mp4"), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(answer.asset_type, AssetType::Footage);
        assert!(answer.confidence >= Confidence::Medium);
    }

    #[tokio::test]
    async fn page_past_the_body_limit_is_ignored() {
        let mut page = String::from("<p>royalty-free music soundtrack</p>");
        page.push_str(&" ".repeat(MAX_BODY_BYTES));
        page.push_str(&"<p>sound effects whoosh riser</p>".repeat(200));

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(page))
            .mount(&server)
            .await;

        let strategy =
            WebLookupStrategy::new(&config(format!("{}/search?q={{query}}", server.uri())));
        let answer = strategy
            .attempt(&Asset::new("/x/thing.wav"), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(answer.asset_type, AssetType::Music);
    }

    #[tokio::test]
    async fn capped_read_stops_at_limit() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("a".repeat(10_000)))
            .mount(&server)
            .await;

        let response = reqwest::get(server.uri()).await.unwrap();
        let body = read_capped(response, 1000).await.unwrap();
        assert_eq!(body.len(), 1000);
    }

    #[tokio::test]
    async fn not_found_is_a_decline() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let strategy =
            WebLookupStrategy::new(&config(format!("{}/search?q={{query}}", server.uri())));
        let err = strategy
            .attempt(&Asset::new("/x/thing.wav"), CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, StrategyError::Api { status_code: 404, .. }));
    }
}
