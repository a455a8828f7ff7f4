//! Asynchronous retrieval of model and environment assets.

use std::future::Future;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed to read {url}: {source}")]
    Io {
        url: String,
        #[source]
        source: std::io::Error,
    },
    #[error("request for {url} returned HTTP {status}")]
    Status { url: String, status: u16 },
    #[error("request for {url} failed: {message}")]
    Network { url: String, message: String },
}

/// Fetches the raw bytes behind an asset URL.
///
/// Implementations are not required to be `Send`; the browser fetcher holds
/// JavaScript promises.
pub trait AssetFetcher {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<Vec<u8>, FetchError>>;
}

/// Resolves asset URLs as paths relative to a base directory.
#[derive(Debug, Clone, Default)]
pub struct FileFetcher {
    base: Option<PathBuf>,
}

impl FileFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base(base: impl Into<PathBuf>) -> Self {
        Self {
            base: Some(base.into()),
        }
    }

    fn resolve(&self, url: &str) -> PathBuf {
        let path = url.strip_prefix("file://").unwrap_or(url);
        match &self.base {
            Some(base) => base.join(path),
            None => PathBuf::from(path),
        }
    }
}

impl AssetFetcher for FileFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        std::fs::read(self.resolve(url)).map_err(|source| FetchError::Io {
            url: url.to_string(),
            source,
        })
    }
}

#[cfg(target_arch = "wasm32")]
pub use web_fetch::HttpFetcher;

#[cfg(target_arch = "wasm32")]
mod web_fetch {
    use js_sys::{ArrayBuffer, Uint8Array};
    use wasm_bindgen::JsCast;
    use wasm_bindgen_futures::JsFuture;
    use web_sys::Response;

    use super::{AssetFetcher, FetchError};

    /// Retrieves assets with the browser `fetch` API.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct HttpFetcher;

    impl AssetFetcher for HttpFetcher {
        async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
            let network = |message: String| FetchError::Network {
                url: url.to_string(),
                message,
            };
            let window = web_sys::window().ok_or_else(|| network("window not available".into()))?;
            let response = JsFuture::from(window.fetch_with_str(url))
                .await
                .map_err(|err| network(format!("{err:?}")))?
                .dyn_into::<Response>()
                .map_err(|_| network("fetch did not resolve to a Response".into()))?;
            if !response.ok() {
                return Err(FetchError::Status {
                    url: url.to_string(),
                    status: response.status(),
                });
            }
            let body = response
                .array_buffer()
                .map_err(|err| network(format!("{err:?}")))?;
            let buffer = JsFuture::from(body)
                .await
                .map_err(|err| network(format!("{err:?}")))?
                .dyn_into::<ArrayBuffer>()
                .map_err(|_| network("body is not an ArrayBuffer".into()))?;
            Ok(Uint8Array::new(&buffer).to_vec())
        }
    }
}
