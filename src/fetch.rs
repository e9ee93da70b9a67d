//! Transports for texture bytes.

use futures::future::{FutureExt, LocalBoxFuture};

use crate::error::FetchError;

/// One GET of raw image bytes. Implementations must not retry or fall back;
/// the texture cache owns that policy.
pub trait TextureFetcher {
    fn fetch(&self, url: &str) -> LocalBoxFuture<'static, Result<Vec<u8>, FetchError>>;
}

/// Native transport: `http(s)` through reqwest, anything without a scheme
/// (or with `file://`) from the local filesystem.
///
/// Must be awaited inside a tokio runtime.
#[cfg(not(target_arch = "wasm32"))]
#[derive(Clone, Default)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

#[cfg(not(target_arch = "wasm32"))]
impl HttpFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn local_path(url: &str) -> Option<&str> {
    if let Some(path) = url.strip_prefix("file://") {
        return Some(path);
    }
    if url.contains("://") {
        None
    } else {
        Some(url)
    }
}

#[cfg(not(target_arch = "wasm32"))]
impl TextureFetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> LocalBoxFuture<'static, Result<Vec<u8>, FetchError>> {
        let client = self.client.clone();
        let url = url.to_string();
        async move {
            if let Some(path) = local_path(&url) {
                return tokio::fs::read(path)
                    .await
                    .map_err(|e| FetchError::Network(format!("{path}: {e}")));
            }
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(FetchError::Unsupported(url));
            }

            let response = client
                .get(&url)
                .send()
                .await
                .map_err(|e| FetchError::Network(e.to_string()))?;
            let status = response.status();
            if !status.is_success() {
                return Err(FetchError::Status(status.as_u16()));
            }
            let bytes = response
                .bytes()
                .await
                .map_err(|e| FetchError::Network(e.to_string()))?;
            Ok(bytes.to_vec())
        }
        .boxed_local()
    }
}

/// Browser transport: `fetch()` in `cors` mode without credentials, so the
/// decoded bitmap never taints the canvas.
#[cfg(target_arch = "wasm32")]
#[derive(Clone, Copy, Default)]
pub struct BrowserFetcher;

#[cfg(target_arch = "wasm32")]
fn js_error(value: wasm_bindgen::JsValue) -> FetchError {
    FetchError::Network(format!("{value:?}"))
}

#[cfg(target_arch = "wasm32")]
impl TextureFetcher for BrowserFetcher {
    fn fetch(&self, url: &str) -> LocalBoxFuture<'static, Result<Vec<u8>, FetchError>> {
        use wasm_bindgen::JsCast;
        use wasm_bindgen_futures::JsFuture;
        use web_sys::{Request, RequestCredentials, RequestInit, RequestMode, Response};

        let url = url.to_string();
        async move {
            let window =
                web_sys::window().ok_or_else(|| FetchError::Unsupported("no window".into()))?;

            let init = RequestInit::new();
            init.set_method("GET");
            init.set_mode(RequestMode::Cors);
            init.set_credentials(RequestCredentials::Omit);
            let request = Request::new_with_str_and_init(&url, &init).map_err(js_error)?;

            let value = JsFuture::from(window.fetch_with_request(&request))
                .await
                .map_err(js_error)?;
            let response: Response = value.dyn_into().map_err(js_error)?;
            if !response.ok() {
                return Err(FetchError::Status(response.status()));
            }

            let buffer = JsFuture::from(response.array_buffer().map_err(js_error)?)
                .await
                .map_err(js_error)?;
            Ok(js_sys::Uint8Array::new(&buffer).to_vec())
        }
        .boxed_local()
    }
}
