//! Adaptive-bitrate (HLS) manifest resolution.
//!
//! A master playlist is resolved to its highest-resolution variant before
//! decoding; anything else is decoded as given.

use std::time::Duration;

use tracing::{debug, info};
use url::Url;

use crate::error::{MediaError, MediaResult};

const STREAM_INF: &str = "#EXT-X-STREAM-INF:";

/// One variant stream of a master playlist.
#[derive(Debug, Clone, PartialEq)]
pub struct Variant {
    pub uri: Url,
    pub width: u32,
    pub height: u32,
    pub bandwidth: u64,
}

impl Variant {
    fn pixels(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

pub struct ManifestResolver {
    client: reqwest::Client,
}

impl ManifestResolver {
    pub fn new(timeout: Duration) -> MediaResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    /// Resolve `url` to the stream that should be decoded.
    ///
    /// Non-manifest URLs are returned unchanged. A manifest that cannot be
    /// fetched, or a master playlist without usable variants, is an error.
    pub async fn resolve(&self, url: &Url) -> MediaResult<Url> {
        if !url.path().to_ascii_lowercase().ends_with(".m3u8") {
            return Ok(url.clone());
        }

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| MediaError::manifest(format!("{url}: {e}")))?;
        if !response.status().is_success() {
            return Err(MediaError::manifest(format!("{url}: HTTP {}", response.status())));
        }
        let body = response
            .text()
            .await
            .map_err(|e| MediaError::manifest(format!("{url}: {e}")))?;

        if !body.trim_start().starts_with("#EXTM3U") {
            return Err(MediaError::manifest(format!("{url}: not an M3U8 playlist")));
        }
        if !body.contains(STREAM_INF) {
            debug!(%url, "Media playlist, decoding directly");
            return Ok(url.clone());
        }

        let variants = parse_master_playlist(&body, url);
        let best = select_best_variant(&variants)
            .ok_or_else(|| MediaError::manifest(format!("{url}: master playlist has no variants")))?;

        info!(
            %url,
            variant = %best.uri,
            width = best.width,
            height = best.height,
            bandwidth = best.bandwidth,
            "Resolved stream manifest"
        );
        Ok(best.uri.clone())
    }
}

/// Parse `#EXT-X-STREAM-INF` entries, resolving URIs against `base`.
pub fn parse_master_playlist(body: &str, base: &Url) -> Vec<Variant> {
    let mut variants = Vec::new();
    let mut lines = body.lines().map(str::trim);

    while let Some(line) = lines.next() {
        let Some(attrs) = line.strip_prefix(STREAM_INF) else {
            continue;
        };
        let Some(uri) = lines.by_ref().find(|l| !l.is_empty() && !l.starts_with('#')) else {
            break;
        };
        let Ok(uri) = base.join(uri) else {
            continue;
        };

        let (mut width, mut height, mut bandwidth) = (0, 0, 0);
        for (key, value) in attributes(attrs) {
            match key {
                "RESOLUTION" => {
                    if let Some((w, h)) = value.split_once(['x', 'X']) {
                        width = w.parse().unwrap_or(0);
                        height = h.parse().unwrap_or(0);
                    }
                }
                "BANDWIDTH" => bandwidth = value.parse().unwrap_or(0),
                _ => {}
            }
        }
        variants.push(Variant {
            uri,
            width,
            height,
            bandwidth,
        });
    }
    variants
}

/// Highest resolution wins, bandwidth breaks ties.
pub fn select_best_variant(variants: &[Variant]) -> Option<&Variant> {
    variants
        .iter()
        .max_by_key(|v| (v.pixels(), v.bandwidth))
}

/// Split an attribute list, honoring quoted values that contain commas.
fn attributes(list: &str) -> Vec<(&str, &str)> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut quoted = false;
    for (i, c) in list.char_indices() {
        match c {
            '"' => quoted = !quoted,
            ',' if !quoted => {
                push_attribute(&mut out, &list[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    push_attribute(&mut out, &list[start..]);
    out
}

fn push_attribute<'a>(out: &mut Vec<(&'a str, &'a str)>, pair: &'a str) {
    if let Some((k, v)) = pair.split_once('=') {
        out.push((k.trim(), v.trim().trim_matches('"')));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const MASTER: &str = "#EXTM3U\n\
#EXT-X-STREAM-INF:BANDWIDTH=800000,RESOLUTION=640x360,CODECS=\"avc1.4d401e,mp4a.40.2\"\n\
low/index.m3u8\n\
#EXT-X-STREAM-INF:BANDWIDTH=5000000,RESOLUTION=1920x1080\n\
hd/index.m3u8\n\
#EXT-X-STREAM-INF:BANDWIDTH=2500000,RESOLUTION=1280x720\n\
https://other.example.com/mid/index.m3u8\n";

    #[test]
    fn test_parse_master_playlist() {
        let base = Url::parse("https://cdn.example.com/live/master.m3u8").unwrap();
        let variants = parse_master_playlist(MASTER, &base);

        assert_eq!(variants.len(), 3);
        assert_eq!(variants[0].width, 640);
        assert_eq!(variants[0].uri.as_str(), "https://cdn.example.com/live/low/index.m3u8");
        assert_eq!(variants[2].uri.as_str(), "https://other.example.com/mid/index.m3u8");

        let best = select_best_variant(&variants).unwrap();
        assert_eq!((best.width, best.height), (1920, 1080));
        assert_eq!(best.bandwidth, 5_000_000);
    }

    #[test]
    fn test_bandwidth_breaks_resolution_ties() {
        let base = Url::parse("https://cdn.example.com/master.m3u8").unwrap();
        let body = "#EXTM3U\n\
#EXT-X-STREAM-INF:BANDWIDTH=100,RESOLUTION=1280x720\na.m3u8\n\
#EXT-X-STREAM-INF:BANDWIDTH=300,RESOLUTION=1280x720\nb.m3u8\n";
        let variants = parse_master_playlist(body, &base);
        assert!(select_best_variant(&variants).unwrap().uri.as_str().ends_with("b.m3u8"));
    }

    #[tokio::test]
    async fn test_resolve_master() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/live/master.m3u8"))
            .respond_with(ResponseTemplate::new(200).set_body_string(MASTER))
            .mount(&server)
            .await;

        let resolver = ManifestResolver::new(Duration::from_secs(5)).unwrap();
        let url = Url::parse(&format!("{}/live/master.m3u8", server.uri())).unwrap();
        let resolved = resolver.resolve(&url).await.unwrap();

        assert_eq!(resolved.path(), "/live/hd/index.m3u8");
    }

    #[tokio::test]
    async fn test_media_playlist_passthrough() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/vod/index.m3u8"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("#EXTM3U\n#EXTINF:6.0,\nseg0.ts\n#EXT-X-ENDLIST\n"),
            )
            .mount(&server)
            .await;

        let resolver = ManifestResolver::new(Duration::from_secs(5)).unwrap();
        let url = Url::parse(&format!("{}/vod/index.m3u8", server.uri())).unwrap();
        assert_eq!(resolver.resolve(&url).await.unwrap(), url);
    }

    #[tokio::test]
    async fn test_unreachable_manifest_is_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let resolver = ManifestResolver::new(Duration::from_secs(5)).unwrap();
        let url = Url::parse(&format!("{}/gone/master.m3u8", server.uri())).unwrap();
        assert!(matches!(
            resolver.resolve(&url).await,
            Err(MediaError::ManifestUnresolvable(_))
        ));
    }

    #[tokio::test]
    async fn test_plain_url_untouched() {
        let resolver = ManifestResolver::new(Duration::from_secs(5)).unwrap();
        let url = Url::parse("https://example.com/video.mp4").unwrap();
        assert_eq!(resolver.resolve(&url).await.unwrap(), url);
    }
}
