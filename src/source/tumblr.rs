//! [`PostSource`] for the Tumblr v1 XML read API (`/api/read`).

use std::borrow::Cow;

use async_trait::async_trait;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use tracing::{debug, instrument};

use super::{BlogMeta, PhotoUrl, Post, PostPage, PostSource, PostType, SourceError};
use crate::download::ThrottledTransport;

/// Builds the read-API URL for `count` posts starting at `start`.
///
/// `start` is omitted when zero.
///
/// ```
/// use blogcrawl_core::source::api_url;
///
/// assert_eq!(api_url("https://a.tumblr.com/", 50, 0), "https://a.tumblr.com/api/read?num=50");
/// assert_eq!(api_url("https://a.tumblr.com", 50, 100), "https://a.tumblr.com/api/read?num=50&start=100");
/// ```
#[must_use]
pub fn api_url(blog_url: &str, count: u32, start: u32) -> String {
    let separator = if blog_url.ends_with('/') { "" } else { "/" };
    let mut url = format!("{blog_url}{separator}api/read?num={count}");
    if start > 0 {
        url.push_str(&format!("&start={start}"));
    }
    url
}

/// Parsed read-API response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApiDocument {
    pub meta: BlogMeta,
    pub posts: Vec<Post>,
}

/// Open element with the text collected directly inside it.
struct OpenElement {
    name: String,
    text: String,
    max_width: Option<u32>,
}

#[derive(Default)]
struct DocumentBuilder {
    doc: ApiDocument,
    saw_posts: bool,
    stack: Vec<OpenElement>,
    post: Option<Post>,
    photoset_photo: Option<Vec<PhotoUrl>>,
}

impl DocumentBuilder {
    fn open(&mut self, element: &BytesStart<'_>) {
        let name = String::from_utf8_lossy(element.name().as_ref()).into_owned();
        let mut max_width = None;

        match name.as_str() {
            "tumblelog" => {
                if let Some(title) = attribute(element, b"title") {
                    self.doc.meta.title = title;
                }
            }
            "posts" => {
                self.saw_posts = true;
                if let Some(total) = attribute(element, b"total").and_then(|v| v.parse().ok()) {
                    self.doc.meta.total_posts = total;
                }
            }
            "post" => {
                let mut post = Post::new(
                    attribute(element, b"id").unwrap_or_default(),
                    PostType::from_api(&attribute(element, b"type").unwrap_or_default()),
                );
                post.date_gmt = attribute(element, b"date-gmt").unwrap_or_default();
                post.url_with_slug = attribute(element, b"url-with-slug").unwrap_or_default();
                post.reblog_key = attribute(element, b"reblog-key").unwrap_or_default();
                self.post = Some(post);
            }
            "photo" if self.post.is_some() => self.photoset_photo = Some(Vec::new()),
            "photo-url" => {
                max_width = attribute(element, b"max-width").and_then(|v| v.parse().ok());
            }
            _ => {}
        }

        self.stack.push(OpenElement {
            name,
            text: String::new(),
            max_width,
        });
    }

    fn text(&mut self, text: &str) {
        if let Some(top) = self.stack.last_mut() {
            top.text.push_str(text);
        }
    }

    fn close(&mut self) {
        let Some(element) = self.stack.pop() else {
            return;
        };
        let text = element.text;

        if element.name == "tumblelog" {
            self.doc.meta.description = text;
            return;
        }
        if element.name == "post" {
            if let Some(post) = self.post.take() {
                self.doc.posts.push(post);
            }
            return;
        }

        let Some(post) = self.post.as_mut() else {
            return;
        };
        match element.name.as_str() {
            "photo-url" => {
                let rendition = PhotoUrl {
                    max_width: element.max_width.unwrap_or_default(),
                    url: text,
                };
                match self.photoset_photo.as_mut() {
                    Some(photo) => photo.push(rendition),
                    None => post.photo_urls.push(rendition),
                }
            }
            "photo" => {
                if let Some(photo) = self.photoset_photo.take() {
                    post.photoset.push(photo);
                }
            }
            "tag" => post.tags.push(text),
            "photo-caption" => post.photo_caption = text,
            "video-player" => post.video_players.push(text),
            "audio-player" => post.audio_players.push(text),
            "audio-caption" => post.audio_caption = text,
            "id3-artist" => post.id3.artist = text,
            "id3-title" => post.id3.title = text,
            "id3-track" => post.id3.track = text,
            "id3-album" => post.id3.album = text,
            "id3-year" => post.id3.year = text,
            "regular-title" => post.regular_title = text,
            "regular-body" => post.regular_body = text,
            "quote-text" => post.quote_text = text,
            "quote-source" => post.quote_source = text,
            "link-text" => post.link_text = text,
            "link-url" => post.link_url = text,
            "link-description" => post.link_description = text,
            "conversation-text" => post.conversation_text = text,
            _ => {}
        }
    }
}

/// Reads an attribute, falling back to the raw value when it holds an
/// unknown entity.
fn attribute(element: &BytesStart<'_>, key: &[u8]) -> Option<String> {
    element
        .attributes()
        .flatten()
        .find(|attr| attr.key.as_ref() == key)
        .map(|attr| match attr.unescape_value() {
            Ok(value) => value.into_owned(),
            Err(_) => String::from_utf8_lossy(&attr.value).into_owned(),
        })
}

/// Parses a read-API document. Unknown elements are ignored; a document
/// without a `posts` element is rejected.
///
/// # Errors
///
/// Returns [`SourceError::Parse`] for malformed XML or a missing `posts`
/// element.
pub fn parse_document(url: &str, xml: &str) -> Result<ApiDocument, SourceError> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);
    let mut builder = DocumentBuilder::default();

    loop {
        match reader.read_event() {
            Ok(Event::Start(element)) => builder.open(&element),
            Ok(Event::Empty(element)) => {
                builder.open(&element);
                builder.close();
            }
            Ok(Event::End(_)) => builder.close(),
            Ok(Event::Text(text)) => {
                let value = text
                    .unescape()
                    .unwrap_or_else(|_| Cow::Owned(String::from_utf8_lossy(&text).into_owned()));
                builder.text(&value);
            }
            Ok(Event::CData(data)) => {
                builder.text(&String::from_utf8_lossy(&data.into_inner()));
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(SourceError::parse(
                    url,
                    format!("{e} at byte {}", reader.buffer_position()),
                ));
            }
        }
    }

    if !builder.saw_posts {
        return Err(SourceError::parse(url, "missing posts element"));
    }
    Ok(builder.doc)
}

/// [`PostSource`] talking to `<blog>/api/read` over a throttled transport.
#[derive(Debug, Clone)]
pub struct TumblrApiSource {
    transport: ThrottledTransport,
}

impl TumblrApiSource {
    #[must_use]
    pub fn new(transport: ThrottledTransport) -> Self {
        Self { transport }
    }

    async fn fetch_document(&self, url: &str) -> Result<ApiDocument, SourceError> {
        let body = self
            .transport
            .fetch_text(url)
            .await
            .map_err(|e| SourceError::fetch(url, e))?;
        parse_document(url, &body)
    }
}

#[async_trait]
impl PostSource for TumblrApiSource {
    #[instrument(skip(self), fields(blog = %blog_url))]
    async fn fetch_page(
        &self,
        blog_url: &str,
        page_size: u32,
        start: u32,
    ) -> Result<PostPage, SourceError> {
        let url = api_url(blog_url, page_size, start);
        let doc = self.fetch_document(&url).await?;
        debug!(posts = doc.posts.len(), total = doc.meta.total_posts, "fetched page");
        Ok(PostPage {
            total_posts: doc.meta.total_posts,
            posts: doc.posts,
        })
    }

    #[instrument(skip(self), fields(blog = %blog_url))]
    async fn fetch_meta(&self, blog_url: &str) -> Result<BlogMeta, SourceError> {
        let url = api_url(blog_url, 1, 0);
        Ok(self.fetch_document(&url).await?.meta)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::download::BandwidthLimit;
    use crate::test_support::socket_guard::start_mock_server_or_skip;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, ResponseTemplate};

    const PAGE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<tumblr version="1.0">
  <tumblelog name="demo" timezone="US/Eastern" title="Demo &amp; Co">A demo blog</tumblelog>
  <posts start="0" total="3">
    <post id="101" url="https://demo.tumblr.com/post/101" url-with-slug="https://demo.tumblr.com/post/101/sunset" type="photo" date-gmt="2016-01-02 10:00:00 GMT" reblog-key="rk1">
      <photo-caption>&lt;p&gt;Sunset&lt;/p&gt;</photo-caption>
      <photo-url max-width="1280">https://media.example/101_1280.jpg</photo-url>
      <photo-url max-width="500">https://media.example/101_500.jpg</photo-url>
      <photoset>
        <photo offset="o1" caption="">
          <photo-url max-width="1280">https://media.example/101a_1280.jpg</photo-url>
          <photo-url max-width="500">https://media.example/101a_500.jpg</photo-url>
        </photo>
        <photo offset="o2" caption="">
          <photo-url max-width="1280">https://media.example/101b_1280.jpg</photo-url>
        </photo>
      </photoset>
      <tag>Sky</tag>
      <tag>evening</tag>
    </post>
    <post id="102" type="video" date-gmt="2016-01-03 10:00:00 GMT" reblog-key="rk2">
      <video-player max-width="500"><![CDATA[<video><source src="https://demo.tumblr.com/video_file/102/tumblr_v/480" type="video/mp4"></video>]]></video-player>
    </post>
    <post id="103" type="regular" date-gmt="2016-01-04 10:00:00 GMT">
      <regular-title>Hello</regular-title>
      <regular-body>&lt;b&gt;world&lt;/b&gt;</regular-body>
    </post>
  </posts>
</tumblr>"#;

    #[test]
    fn test_api_url_appends_path_and_optional_start() {
        assert_eq!(
            api_url("https://a.tumblr.com/", 1, 0),
            "https://a.tumblr.com/api/read?num=1"
        );
        assert_eq!(
            api_url("https://a.tumblr.com", 50, 50),
            "https://a.tumblr.com/api/read?num=50&start=50"
        );
    }

    #[test]
    fn test_parse_meta() {
        let doc = parse_document("u", PAGE).unwrap();
        assert_eq!(doc.meta.title, "Demo & Co");
        assert_eq!(doc.meta.description, "A demo blog");
        assert_eq!(doc.meta.total_posts, 3);
        assert_eq!(doc.posts.len(), 3);
    }

    #[test]
    fn test_parse_photo_post_with_photoset() {
        let doc = parse_document("u", PAGE).unwrap();
        let photo = &doc.posts[0];

        assert_eq!(photo.id, "101");
        assert_eq!(photo.post_type, PostType::Photo);
        assert_eq!(photo.reblog_key, "rk1");
        assert_eq!(
            photo.url_with_slug,
            "https://demo.tumblr.com/post/101/sunset"
        );
        assert_eq!(photo.photo_caption, "<p>Sunset</p>");
        assert_eq!(photo.photo_urls.len(), 2);
        assert_eq!(photo.photo_urls[1].max_width, 500);
        assert!(photo.is_photoset());
        assert_eq!(photo.photoset.len(), 2);
        assert_eq!(photo.photoset[0].len(), 2);
        assert_eq!(photo.photoset[1][0].url, "https://media.example/101b_1280.jpg");
        assert_eq!(photo.tags, vec!["Sky", "evening"]);
    }

    #[test]
    fn test_parse_video_player_cdata_and_regular_body() {
        let doc = parse_document("u", PAGE).unwrap();
        assert!(doc.posts[1].video_players[0].contains(r#"<source src="#));
        assert_eq!(doc.posts[2].post_type, PostType::Regular);
        assert_eq!(doc.posts[2].regular_title, "Hello");
        assert_eq!(doc.posts[2].regular_body, "<b>world</b>");
    }

    #[test]
    fn test_parse_rejects_document_without_posts() {
        let err = parse_document("https://x/api/read", "<tumblr><tumblelog/></tumblr>").unwrap_err();
        assert!(matches!(err, SourceError::Parse { .. }));
    }

    #[test]
    fn test_parse_rejects_malformed_xml() {
        let err = parse_document("u", "<tumblr><posts total=\"1\"><post></posts>").unwrap_err();
        assert!(matches!(err, SourceError::Parse { .. }));
    }

    #[tokio::test]
    async fn test_fetch_page_requests_offset_and_parses() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .and(path("/api/read"))
            .and(query_param("num", "50"))
            .and(query_param("start", "50"))
            .respond_with(ResponseTemplate::new(200).set_body_string(PAGE))
            .expect(1)
            .mount(&mock_server)
            .await;

        let transport =
            ThrottledTransport::new(Duration::from_secs(5), BandwidthLimit::unlimited()).unwrap();
        let source = TumblrApiSource::new(transport);
        let page = source
            .fetch_page(&format!("{}/", mock_server.uri()), 50, 50)
            .await
            .unwrap();

        assert_eq!(page.total_posts, 3);
        assert_eq!(page.posts.len(), 3);
    }

    #[tokio::test]
    async fn test_fetch_meta_maps_http_error_to_fetch_error() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        let transport =
            ThrottledTransport::new(Duration::from_secs(5), BandwidthLimit::unlimited()).unwrap();
        let source = TumblrApiSource::new(transport);
        let err = source.fetch_meta(&mock_server.uri()).await.unwrap_err();

        assert!(matches!(err, SourceError::Fetch { .. }));
    }
}
