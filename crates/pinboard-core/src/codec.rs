//! Image sources, reading and decoding.

use image::{DynamicImage, ImageDecoder, ImageReader, RgbaImage};
use std::fmt;
use std::fs;
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Why a single source could not be turned into pixels.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("IO error: {0}")]
    Io(String),
    #[error("Decode error: {0}")]
    Decode(String),
    #[error("Unsupported source: {0}")]
    UnsupportedSource(String),
    #[error("Fetch error: {0}")]
    Fetch(String),
}

/// Where an image comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    Path(PathBuf),
    Url(Url),
    /// Raw encoded bytes, e.g. from a drop or the clipboard.
    Bytes { name: String, data: Arc<[u8]> },
}

impl Source {
    /// Interpret a command line or drop string as a URL if it has a
    /// scheme, otherwise as a path.
    pub fn parse(input: &str) -> Self {
        match Url::parse(input) {
            // Single letter schemes are Windows drive letters.
            Ok(url) if url.scheme().len() > 1 => Source::Url(url),
            _ => Source::Path(PathBuf::from(input)),
        }
    }

    pub fn bytes(name: impl Into<String>, data: impl Into<Arc<[u8]>>) -> Self {
        Source::Bytes {
            name: name.into(),
            data: data.into(),
        }
    }

    /// Name used in error reports.
    pub fn identifier(&self) -> String {
        match self {
            Source::Path(path) => path.display().to_string(),
            Source::Url(url) => url.to_string(),
            Source::Bytes { name, .. } => name.clone(),
        }
    }

    /// Filename stored with an item loaded from this source.
    pub fn filename(&self) -> Option<String> {
        match self {
            Source::Path(_) | Source::Url(_) => Some(self.identifier()),
            Source::Bytes { .. } => None,
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.identifier())
    }
}

/// Fetches the encoded bytes of a source.
pub trait SourceReader: Send + Sync {
    fn read(&self, source: &Source) -> Result<Vec<u8>, SourceError>;
}

/// How long a download may take before it counts as failed.
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

fn is_remote(url: &Url) -> bool {
    matches!(url.scheme(), "http" | "https")
}

/// Reads local paths and `file://` URLs. Remote URLs are reported as
/// unsupported.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalReader;

impl SourceReader for LocalReader {
    fn read(&self, source: &Source) -> Result<Vec<u8>, SourceError> {
        let path = match source {
            Source::Path(path) => path.clone(),
            Source::Url(url) if url.scheme() == "file" => url
                .to_file_path()
                .map_err(|_| SourceError::UnsupportedSource(url.to_string()))?,
            Source::Url(url) => return Err(SourceError::UnsupportedSource(url.to_string())),
            Source::Bytes { data, .. } => return Ok(data.to_vec()),
        };
        fs::read(&path).map_err(|e| SourceError::Io(format!("Failed to read {}: {}", path.display(), e)))
    }
}

/// Downloads `http` and `https` URLs with a blocking client. Only ever
/// called from worker threads.
#[derive(Debug, Clone)]
pub struct HttpReader {
    client: Option<reqwest::blocking::Client>,
}

impl Default for HttpReader {
    fn default() -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .map_err(|e| log::warn!("HTTP client unavailable, URLs cannot be loaded: {}", e))
            .ok();
        Self { client }
    }
}

impl HttpReader {
    /// Use a preconfigured client, e.g. one with proxy settings.
    pub fn with_client(client: reqwest::blocking::Client) -> Self {
        Self { client: Some(client) }
    }
}

impl SourceReader for HttpReader {
    fn read(&self, source: &Source) -> Result<Vec<u8>, SourceError> {
        let url = match source {
            Source::Url(url) if is_remote(url) => url,
            _ => return Err(SourceError::UnsupportedSource(source.identifier())),
        };
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| SourceError::Fetch(format!("No HTTP client to fetch {}", url)))?;
        log::debug!("Fetching {}", url);
        let response = client
            .get(url.as_str())
            .send()
            .and_then(|response| response.error_for_status())
            .map_err(|e| SourceError::Fetch(format!("Failed to fetch {}: {}", url, e)))?;
        let bytes = response
            .bytes()
            .map_err(|e| SourceError::Fetch(format!("Failed to read {}: {}", url, e)))?;
        Ok(bytes.to_vec())
    }
}

/// Local files through [`LocalReader`], remote URLs through
/// [`HttpReader`].
#[derive(Debug, Default, Clone)]
pub struct DefaultReader {
    local: LocalReader,
    http: HttpReader,
}

impl SourceReader for DefaultReader {
    fn read(&self, source: &Source) -> Result<Vec<u8>, SourceError> {
        match source {
            Source::Url(url) if is_remote(url) => self.http.read(source),
            _ => self.local.read(source),
        }
    }
}

/// Turns encoded bytes into upright RGBA pixels.
pub trait ImageCodec: Send + Sync {
    fn decode(&self, data: &[u8]) -> Result<RgbaImage, SourceError>;
}

/// Decoder backed by the `image` crate. Applies the orientation stored in
/// the file's metadata.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultCodec;

impl ImageCodec for DefaultCodec {
    fn decode(&self, data: &[u8]) -> Result<RgbaImage, SourceError> {
        let reader = ImageReader::new(Cursor::new(data))
            .with_guessed_format()
            .map_err(|e| SourceError::Io(e.to_string()))?;
        let mut decoder = reader
            .into_decoder()
            .map_err(|e| SourceError::Decode(e.to_string()))?;
        let orientation = decoder
            .orientation()
            .map_err(|e| SourceError::Decode(e.to_string()))?;
        let mut image = DynamicImage::from_decoder(decoder).map_err(|e| SourceError::Decode(e.to_string()))?;
        image.apply_orientation(orientation);
        Ok(image.to_rgba8())
    }
}

/// Reader and codec used by background jobs.
#[derive(Clone)]
pub struct Loader {
    reader: Arc<dyn SourceReader>,
    codec: Arc<dyn ImageCodec>,
}

impl Default for Loader {
    fn default() -> Self {
        Self::new(Arc::new(DefaultReader::default()), Arc::new(DefaultCodec))
    }
}

impl fmt::Debug for Loader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Loader").finish_non_exhaustive()
    }
}

impl Loader {
    pub fn new(reader: Arc<dyn SourceReader>, codec: Arc<dyn ImageCodec>) -> Self {
        Self { reader, codec }
    }

    /// Read and decode one source.
    pub fn load(&self, source: &Source) -> Result<RgbaImage, SourceError> {
        match source {
            Source::Bytes { data, .. } => self.codec.decode(data),
            _ => self.codec.decode(&self.reader.read(source)?),
        }
    }
}
