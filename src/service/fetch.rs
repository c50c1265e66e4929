//! Bounded image downloads.

use reqwest::{Client, Url};
use tracing::{debug, instrument};

use crate::{
    base::error::{BotError, BotResult},
    interaction::context::DispatchContext,
    service::store::key::Filetype,
};

/// Initial buffer size; bodies grow past this only as bytes arrive.
const INITIAL_BUFFER_BYTES: usize = 64 * 1024;

/// A downloaded image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fetched {
    pub bytes: Vec<u8>,
    /// The filetype detected from the body itself.
    pub filetype: Filetype,
}

/// HTTP client for pulling images off the internet.
///
/// This is trivially cloneable; the underlying connection pool is shared.
#[derive(Debug, Clone)]
pub struct Fetcher {
    http: Client,
}

impl Fetcher {
    pub fn new() -> BotResult<Self> {
        let http = Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| BotError::Configuration(format!("failed to build http client: {e}")))?;

        Ok(Self { http })
    }

    /// Download `url`, refusing bodies larger than `max_bytes`.
    ///
    /// The body is streamed and the download is abandoned as soon as it grows
    /// past the limit, so no more than `max_bytes` are ever buffered. The
    /// filetype comes from sniffing the body, never from the URL or headers.
    #[instrument(skip(self, ctx), fields(url = %url))]
    pub async fn fetch(&self, ctx: &DispatchContext, url: &Url, max_bytes: u64) -> BotResult<Fetched> {
        if !matches!(url.scheme(), "http" | "https") {
            return Err(BotError::validation(format!("`{}` urls can't be fetched", url.scheme())));
        }

        ctx.guard(self.download(url, max_bytes)).await
    }

    async fn download(&self, url: &Url, max_bytes: u64) -> BotResult<Fetched> {
        let mut response = self
            .http
            .get(url.clone())
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| BotError::transport(format!("GET {url}"), e))?;

        if let Some(length) = response.content_length()
            && length > max_bytes
        {
            debug!(length, max_bytes, "declared length is over the limit");
            return Err(BotError::SizeExceeded { limit: max_bytes });
        }

        let limit = usize::try_from(max_bytes).unwrap_or(usize::MAX);
        let mut bytes = Vec::with_capacity(limit.min(INITIAL_BUFFER_BYTES));

        while let Some(chunk) = response.chunk().await.map_err(|e| BotError::transport(format!("GET {url}"), e))? {
            if bytes.len() + chunk.len() > limit {
                debug!(read = bytes.len() + chunk.len(), max_bytes, "body is over the limit");
                return Err(BotError::SizeExceeded { limit: max_bytes });
            }

            bytes.extend_from_slice(&chunk);
        }

        let filetype = Filetype::sniff(&bytes).ok_or_else(|| {
            let declared = response.headers().get(reqwest::header::CONTENT_TYPE).and_then(|value| value.to_str().ok()).unwrap_or("unknown");
            BotError::UnsupportedType(declared.to_string())
        })?;

        debug!(size = bytes.len(), %filetype, "fetched image");

        Ok(Fetched { bytes, filetype })
    }
}

#[cfg(test)]
mod tests {
    use std::{io::Write, time::Duration};

    use super::*;

    fn png_of_len(len: usize) -> Vec<u8> {
        let mut bytes = b"\x89PNG\r\n\x1a\n".to_vec();
        bytes.resize(len, 0);
        bytes
    }

    fn ctx() -> DispatchContext {
        DispatchContext::detached(Duration::from_secs(5))
    }

    fn url(server: &mockito::Server, path: &str) -> Url {
        Url::parse(&format!("{}{path}", server.url())).unwrap()
    }

    #[tokio::test]
    async fn fetches_a_body_of_exactly_the_limit() {
        let mut server = mockito::Server::new_async().await;
        let mock = server.mock("GET", "/garf.png").with_status(200).with_body(png_of_len(64)).create_async().await;

        let fetched = Fetcher::new().unwrap().fetch(&ctx(), &url(&server, "/garf.png"), 64).await.unwrap();

        assert_eq!(fetched.bytes.len(), 64);
        assert_eq!(fetched.bytes, png_of_len(64));
        assert_eq!(fetched.filetype, Filetype::Png);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn refuses_a_body_one_byte_over_the_limit() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server.mock("GET", "/garf.png").with_status(200).with_body(png_of_len(65)).create_async().await;

        let result = Fetcher::new().unwrap().fetch(&ctx(), &url(&server, "/garf.png"), 64).await;

        assert!(matches!(result, Err(BotError::SizeExceeded { limit: 64 })));
    }

    #[tokio::test]
    async fn refuses_an_oversized_chunked_body() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/huge.png")
            .with_status(200)
            .with_chunked_body(|writer| {
                writer.write_all(b"\x89PNG\r\n\x1a\n")?;
                for _ in 0..64 {
                    writer.write_all(&[0u8; 1024])?;
                }
                Ok(())
            })
            .create_async()
            .await;

        let result = Fetcher::new().unwrap().fetch(&ctx(), &url(&server, "/huge.png"), 4096).await;

        assert!(matches!(result, Err(BotError::SizeExceeded { limit: 4096 })));
    }

    #[tokio::test]
    async fn sniffs_instead_of_trusting_the_url() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server.mock("GET", "/actually-a.png").with_status(200).with_header("content-type", "image/png").with_body(b"GIF89a-not-a-png").create_async().await;

        let fetched = Fetcher::new().unwrap().fetch(&ctx(), &url(&server, "/actually-a.png"), 1024).await.unwrap();

        assert_eq!(fetched.filetype, Filetype::Gif);
    }

    #[tokio::test]
    async fn rejects_unrecognized_content() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server.mock("GET", "/garf.png").with_status(200).with_header("content-type", "text/html").with_body("<!doctype html><p>nope</p>").create_async().await;

        let result = Fetcher::new().unwrap().fetch(&ctx(), &url(&server, "/garf.png"), 1024).await;

        assert!(matches!(result, Err(BotError::UnsupportedType(declared)) if declared == "text/html"));
    }

    #[tokio::test]
    async fn http_errors_are_transport_errors() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server.mock("GET", "/missing.png").with_status(404).create_async().await;

        let result = Fetcher::new().unwrap().fetch(&ctx(), &url(&server, "/missing.png"), 1024).await;

        assert!(matches!(result, Err(BotError::Transport { .. })));
    }

    #[tokio::test]
    async fn only_fetches_http_urls() {
        let result = Fetcher::new().unwrap().fetch(&ctx(), &Url::parse("file:///etc/passwd").unwrap(), 1024).await;

        assert!(matches!(result, Err(BotError::Validation(_))));
    }

    #[tokio::test]
    async fn an_expired_context_aborts_the_download() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server.mock("GET", "/garf.png").with_status(200).with_body(png_of_len(16)).create_async().await;

        let ctx = ctx();
        ctx.cancel();

        let result = Fetcher::new().unwrap().fetch(&ctx, &url(&server, "/garf.png"), 1024).await;

        assert!(matches!(result, Err(BotError::Timeout)));
    }
}
