//! Texture loader and cache.
//!
//! `TextureCache` is an explicitly constructed handle (cheap to clone) that
//! turns a material's texture URL into a decoded `Bitmap`. Concurrent loads
//! of one URL share a single fetch; finished bitmaps are kept by URL, with
//! optional LRU eviction.

use futures::future::{FutureExt, LocalBoxFuture, Shared};
use image::RgbaImage;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};
use tiny_skia::{ColorU8, Pixmap};

use crate::config::TextureConfig;
use crate::error::TextureLoadError;
use crate::fetch::TextureFetcher;

/// A decoded, same-origin RGBA8 image.
pub struct Bitmap {
    pub url: String,
    pub image: RgbaImage,
}

impl fmt::Debug for Bitmap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bitmap")
            .field("url", &self.url)
            .field("width", &self.width())
            .field("height", &self.height())
            .finish()
    }
}

impl Bitmap {
    pub fn new(url: impl Into<String>, image: RgbaImage) -> Self {
        Self {
            url: url.into(),
            image,
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Decode is complete and non-empty.
    pub fn is_complete(&self) -> bool {
        self.width() > 0 && self.height() > 0
    }

    /// Premultiplied copy for the vector path.
    pub fn to_pixmap(&self) -> Option<Pixmap> {
        let mut pixmap = Pixmap::new(self.width(), self.height())?;
        for (dst, src) in pixmap.pixels_mut().iter_mut().zip(self.image.pixels()) {
            let [r, g, b, a] = src.0;
            *dst = ColorU8::from_rgba(r, g, b, a).premultiply();
        }
        Some(pixmap)
    }
}

pub type TextureResult = Result<Rc<Bitmap>, TextureLoadError>;

type InFlight = Shared<LocalBoxFuture<'static, TextureResult>>;

/// `encodeURIComponent`: everything but unreserved marks is percent-encoded.
pub fn encode_uri_component(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z'
            | b'a'..=b'z'
            | b'0'..=b'9'
            | b'-'
            | b'_'
            | b'.'
            | b'!'
            | b'~'
            | b'*'
            | b'\''
            | b'('
            | b')' => out.push(byte as char),
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

struct ReadyEntry {
    bitmap: Rc<Bitmap>,
    last_used: u64,
}

struct CacheInner {
    fetcher: Rc<dyn TextureFetcher>,
    proxy_origin: String,
    proxy_endpoint: String,
    max_entries: Option<usize>,
    ready: RefCell<HashMap<String, ReadyEntry>>,
    in_flight: RefCell<HashMap<String, InFlight>>,
    clock: Cell<u64>,
}

impl CacheInner {
    fn tick(&self) -> u64 {
        let now = self.clock.get() + 1;
        self.clock.set(now);
        now
    }

    fn proxy_url(&self, url: &str) -> Option<String> {
        if self.proxy_endpoint.is_empty() {
            return None;
        }
        Some(format!(
            "{}{}?url={}",
            self.proxy_origin,
            self.proxy_endpoint,
            encode_uri_component(url)
        ))
    }

    fn insert_ready(&self, url: String, bitmap: Rc<Bitmap>) {
        let last_used = self.tick();
        let mut ready = self.ready.borrow_mut();
        ready.insert(url, ReadyEntry { bitmap, last_used });

        let Some(max) = self.max_entries else {
            return;
        };
        while ready.len() > max.max(1) {
            let Some(oldest) = ready
                .iter()
                .min_by_key(|(_, e)| e.last_used)
                .map(|(k, _)| k.clone())
            else {
                break;
            };
            log::debug!("evicting texture {oldest}");
            ready.remove(&oldest);
        }
    }
}

#[derive(Clone)]
pub struct TextureCache {
    inner: Rc<CacheInner>,
}

impl TextureCache {
    pub fn new(fetcher: Rc<dyn TextureFetcher>, config: &TextureConfig) -> Self {
        Self {
            inner: Rc::new(CacheInner {
                fetcher,
                proxy_origin: config.proxy_origin.clone(),
                proxy_endpoint: config.proxy_endpoint.clone(),
                max_entries: config.max_entries,
                ready: RefCell::new(HashMap::new()),
                in_flight: RefCell::new(HashMap::new()),
                clock: Cell::new(0),
            }),
        }
    }

    /// Proxy URL the loader falls back to for `url`.
    pub fn proxy_url(&self, url: &str) -> Option<String> {
        self.inner.proxy_url(url)
    }

    /// Resolves `url` to a bitmap. Callers asking for the same URL while a
    /// load is running share it and receive the same `Rc`.
    pub fn load(&self, url: &str) -> LocalBoxFuture<'static, TextureResult> {
        if url.trim().is_empty() {
            return futures::future::ready(Err(TextureLoadError::EmptyUrl)).boxed_local();
        }
        if let Some(bitmap) = self.peek(url) {
            return futures::future::ready(Ok(bitmap)).boxed_local();
        }
        if let Some(task) = self.inner.in_flight.borrow().get(url) {
            return task.clone().boxed_local();
        }

        let fetcher = Rc::clone(&self.inner.fetcher);
        let proxy_url = self.inner.proxy_url(url);
        let weak: Weak<CacheInner> = Rc::downgrade(&self.inner);
        let key = url.to_string();

        let task = async move {
            let result = fetch_and_decode(fetcher.as_ref(), &key, proxy_url.as_deref())
                .await
                .map(Rc::new);
            if let Some(inner) = weak.upgrade() {
                // cleared on either outcome so a failed URL can be retried
                inner.in_flight.borrow_mut().remove(&key);
                match &result {
                    Ok(bitmap) => inner.insert_ready(key.clone(), Rc::clone(bitmap)),
                    Err(err) => log::warn!("texture {key} unavailable: {err}"),
                }
            }
            result
        }
        .boxed_local()
        .shared();

        self.inner
            .in_flight
            .borrow_mut()
            .insert(url.to_string(), task.clone());
        task.boxed_local()
    }

    /// Cached bitmap, if already decoded. Counts as a use for LRU.
    pub fn peek(&self, url: &str) -> Option<Rc<Bitmap>> {
        let now = self.inner.tick();
        let mut ready = self.inner.ready.borrow_mut();
        let entry = ready.get_mut(url)?;
        entry.last_used = now;
        Some(Rc::clone(&entry.bitmap))
    }

    pub fn is_loading(&self, url: &str) -> bool {
        self.inner.in_flight.borrow().contains_key(url)
    }

    pub fn len(&self) -> usize {
        self.inner.ready.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn evict(&self, url: &str) -> bool {
        self.inner.ready.borrow_mut().remove(url).is_some()
    }

    /// Drops decoded bitmaps; running loads are left alone.
    pub fn clear(&self) {
        self.inner.ready.borrow_mut().clear();
    }
}

async fn fetch_bytes(
    fetcher: &dyn TextureFetcher,
    url: &str,
    proxy_url: Option<&str>,
) -> Result<Vec<u8>, TextureLoadError> {
    let direct = match fetcher.fetch(url).await {
        Ok(bytes) => return Ok(bytes),
        Err(err) => err,
    };

    let Some(proxy_url) = proxy_url else {
        return Err(TextureLoadError::Unreachable {
            url: url.to_string(),
            direct,
            proxy: None,
        });
    };

    log::warn!("direct fetch of {url} failed ({direct}); retrying via proxy");
    fetcher
        .fetch(proxy_url)
        .await
        .map_err(|proxy| TextureLoadError::Unreachable {
            url: url.to_string(),
            direct,
            proxy: Some(proxy),
        })
}

async fn fetch_and_decode(
    fetcher: &dyn TextureFetcher,
    url: &str,
    proxy_url: Option<&str>,
) -> Result<Bitmap, TextureLoadError> {
    let bytes = fetch_bytes(fetcher, url, proxy_url).await?;
    decode_bitmap(url, &bytes)
}

/// Decodes encoded image bytes (PNG, JPEG, ...) into an RGBA bitmap.
pub fn decode_bitmap(url: &str, bytes: &[u8]) -> Result<Bitmap, TextureLoadError> {
    let image = image::load_from_memory(bytes)
        .map_err(|e| TextureLoadError::Decode {
            url: url.to_string(),
            reason: e.to_string(),
        })?
        .to_rgba8();
    let bitmap = Bitmap::new(url, image);
    if !bitmap.is_complete() {
        return Err(TextureLoadError::EmptyImage {
            url: url.to_string(),
        });
    }
    Ok(bitmap)
}
