//! Fake blog read API served by wiremock: `total` photo posts, each with a
//! 1280 and a 500 px rendition under `/media/`.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

/// Bytes served for every media file.
pub const MEDIA_BODY: &[u8] = b"\x89PNG fake image bytes";

/// Answers `/api/read?num=N&start=S` with the matching slice of posts.
struct ReadApi {
    base: String,
    total: u32,
    pages: Arc<AtomicUsize>,
}

impl Respond for ReadApi {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let mut num = 20;
        let mut start = 0;
        for (key, value) in request.url.query_pairs() {
            match key.as_ref() {
                "num" => num = value.parse().unwrap_or(20),
                "start" => start = value.parse().unwrap_or(0),
                _ => {}
            }
        }
        if num > 1 {
            self.pages.fetch_add(1, Ordering::SeqCst);
        }
        ResponseTemplate::new(200)
            .set_body_string(read_document(&self.base, self.total, start, num))
            .insert_header("content-type", "text/xml")
    }
}

/// Renders a read-API document holding posts `start..start + num`.
#[must_use]
pub fn read_document(base: &str, total: u32, start: u32, num: u32) -> String {
    let end = start.saturating_add(num).min(total);
    let posts: String = (start..end)
        .map(|i| {
            format!(
                r#"    <post id="{id}" type="photo" date-gmt="2016-01-02 10:00:00 GMT" reblog-key="rk{i}">
      <photo-caption>photo {i}</photo-caption>
      <photo-url max-width="1280">{base}/media/photo_{i}_1280.jpg</photo-url>
      <photo-url max-width="500">{base}/media/photo_{i}_500.jpg</photo-url>
    </post>
"#,
                id = 5000 + i,
            )
        })
        .collect();
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<tumblr version="1.0">
  <tumblelog name="fake" timezone="UTC" title="Fake blog">A blog served by a test</tumblelog>
  <posts start="{start}" total="{total}">
{posts}  </posts>
</tumblr>"#
    )
}

/// Handle on a mounted fake blog.
pub struct FakeBlog {
    pub server: MockServer,
    pages: Arc<AtomicUsize>,
}

impl FakeBlog {
    /// Mounts the read API and media files. `media_delay` slows every media
    /// response; `media_expect` makes the server verify the media request
    /// count when dropped.
    pub async fn mount(
        server: MockServer,
        total: u32,
        media_delay: Duration,
        media_expect: Option<u64>,
    ) -> Self {
        let pages = Arc::new(AtomicUsize::new(0));
        Mock::given(method("GET"))
            .and(path("/api/read"))
            .respond_with(ReadApi {
                base: server.uri(),
                total,
                pages: Arc::clone(&pages),
            })
            .mount(&server)
            .await;

        let media = Mock::given(method("GET"))
            .and(path_regex(r"^/media/.+\.jpg$"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(MEDIA_BODY)
                    .set_delay(media_delay),
            );
        match media_expect {
            Some(count) => media.expect(count).mount(&server).await,
            None => media.mount(&server).await,
        }

        Self { server, pages }
    }

    /// Blog URL as stored on a blog record.
    #[must_use]
    pub fn blog_url(&self) -> String {
        format!("{}/", self.server.uri())
    }

    /// Page requests served so far (metadata requests excluded).
    #[must_use]
    pub fn page_requests(&self) -> usize {
        self.pages.load(Ordering::SeqCst)
    }

    /// Media requests received so far.
    pub async fn media_requests(&self) -> usize {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|r| r.url.path().starts_with("/media/"))
            .count()
    }

    /// Polls until at least `count` media requests have arrived.
    pub async fn wait_for_media_requests(&self, count: usize) {
        tokio::time::timeout(Duration::from_secs(10), async {
            while self.media_requests().await < count {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .unwrap();
    }
}
