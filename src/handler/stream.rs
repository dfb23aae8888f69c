//! Stream handlers: byte sources re-emitted through the codec registry.
//!
//! # Responsibilities
//! - Hold stream content, eagerly loaded or fetched on first use
//! - Filter decoded records by key
//! - Translate between the route's consumed and produced formats
//!
//! # Design Decisions
//! - Content is kept after a fetch, so every request sees the full stream
//! - Unknown formats pass through byte for byte

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex, PoisonError};

use axum::body::Bytes;
use futures_util::future::BoxFuture;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::debug;

use crate::codec::{CodecError, CodecRegistry, MediaType, Record};

/// A byte source behind a stream route.
pub trait DataStream: Send + Sync + 'static {
    /// True while more content can be pulled from the backing source.
    fn can_fetch(&self) -> bool;

    /// Pull the remaining content into the buffer; returns bytes read.
    fn fetch(&self) -> BoxFuture<'_, io::Result<u64>>;

    /// Everything buffered so far.
    fn contents(&self) -> Bytes;
}

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("stream source {0} is empty")]
    Empty(String),

    #[error("failed to read stream source {source_name}: {source}")]
    Io {
        source_name: String,
        #[source]
        source: io::Error,
    },

    #[error("command {command} exited with {status}: {output}")]
    Command {
        command: String,
        status: std::process::ExitStatus,
        output: String,
    },
}

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// In-memory stream content with an optional reader still to drain.
pub struct BufferedStream {
    buffer: Mutex<Vec<u8>>,
    reader: tokio::sync::Mutex<Option<BoxedReader>>,
}

impl BufferedStream {
    fn loaded(content: Vec<u8>, origin: &str) -> Result<Self, StreamError> {
        if content.is_empty() {
            return Err(StreamError::Empty(origin.to_string()));
        }
        Ok(Self {
            buffer: Mutex::new(content),
            reader: tokio::sync::Mutex::new(None),
        })
    }

    pub fn from_bytes(content: impl Into<Vec<u8>>) -> Result<Self, StreamError> {
        Self::loaded(content.into(), "buffer")
    }

    /// Content read from `reader` on first dispatch.
    pub fn from_reader(reader: impl AsyncRead + Send + Unpin + 'static) -> Self {
        Self {
            buffer: Mutex::new(Vec::new()),
            reader: tokio::sync::Mutex::new(Some(Box::new(reader))),
        }
    }

    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, StreamError> {
        let path = path.as_ref();
        let content = tokio::fs::read(path).await.map_err(|source| StreamError::Io {
            source_name: path.display().to_string(),
            source,
        })?;
        Self::loaded(content, &path.display().to_string())
    }

    /// Concatenated content of the files under `dir`, in path order.
    pub async fn from_dir(dir: impl AsRef<Path>, recursive: bool) -> Result<Self, StreamError> {
        let dir = dir.as_ref();
        let mut files = Vec::new();
        collect_files(dir, recursive, &mut files)
            .await
            .map_err(|source| StreamError::Io {
                source_name: dir.display().to_string(),
                source,
            })?;
        files.sort();

        let mut content = Vec::new();
        for file in &files {
            let mut bytes = tokio::fs::read(file).await.map_err(|source| StreamError::Io {
                source_name: file.display().to_string(),
                source,
            })?;
            content.append(&mut bytes);
        }
        Self::loaded(content, &dir.display().to_string())
    }

    /// Combined stdout and stderr of a finished command.
    pub async fn from_command(program: &str, args: &[&str]) -> Result<Self, StreamError> {
        let command = std::iter::once(program)
            .chain(args.iter().copied())
            .collect::<Vec<_>>()
            .join(" ");
        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| StreamError::Io {
                source_name: command.clone(),
                source,
            })?;

        let mut content = output.stdout;
        content.extend_from_slice(&output.stderr);
        if !output.status.success() {
            return Err(StreamError::Command {
                command,
                status: output.status,
                output: String::from_utf8_lossy(&content).into_owned(),
            });
        }
        Self::loaded(content, &command)
    }
}

fn collect_files<'a>(
    dir: &'a Path,
    recursive: bool,
    files: &'a mut Vec<PathBuf>,
) -> BoxFuture<'a, io::Result<()>> {
    Box::pin(async move {
        let mut entries = tokio::fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let kind = entry.file_type().await?;
            if kind.is_file() {
                files.push(entry.path());
            } else if kind.is_dir() && recursive {
                collect_files(&entry.path(), true, files).await?;
            }
        }
        Ok(())
    })
}

impl DataStream for BufferedStream {
    fn can_fetch(&self) -> bool {
        match self.reader.try_lock() {
            Ok(reader) => reader.is_some(),
            // Someone is fetching right now.
            Err(_) => true,
        }
    }

    fn fetch(&self) -> BoxFuture<'_, io::Result<u64>> {
        Box::pin(async move {
            let mut reader = self.reader.lock().await;
            let Some(source) = reader.as_mut() else {
                return Ok(0);
            };

            let mut fetched = Vec::new();
            source.read_to_end(&mut fetched).await?;
            *reader = None;

            let read = fetched.len() as u64;
            self.buffer
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .extend_from_slice(&fetched);
            debug!(bytes = read, "Stream fetched");
            Ok(read)
        })
    }

    fn contents(&self) -> Bytes {
        Bytes::copy_from_slice(&self.buffer.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl fmt::Debug for BufferedStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferedStream")
            .field("buffered", &self.buffer.lock().unwrap_or_else(PoisonError::into_inner).len())
            .field("can_fetch", &self.can_fetch())
            .finish()
    }
}

/// Keeps records whose string value at `key` satisfies a predicate.
/// Records without the key, or with a non-string value there, are kept.
#[derive(Clone)]
pub struct KeyFilter {
    key: String,
    predicate: Arc<dyn Fn(&str) -> bool + Send + Sync>,
}

impl KeyFilter {
    pub fn new(key: impl Into<String>, predicate: impl Fn(&str) -> bool + Send + Sync + 'static) -> Self {
        Self {
            key: key.into(),
            predicate: Arc::new(predicate),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn apply(&self, records: Vec<Record>) -> Vec<Record> {
        records
            .into_iter()
            .filter(|record| match record.get(&self.key).and_then(|v| v.as_str()) {
                Some(value) => (self.predicate)(value),
                None => true,
            })
            .collect()
    }
}

impl fmt::Debug for KeyFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyFilter").field("key", &self.key).finish()
    }
}

/// Output of a stream route.
#[derive(Debug)]
pub enum Rendered {
    Translated(Vec<u8>),
    Verbatim(Bytes),
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("fetching stream content: {0}")]
    Fetch(#[from] io::Error),

    #[error("{combination}: {source}")]
    Codec {
        combination: String,
        #[source]
        source: CodecError,
    },
}

/// Fetch if needed, then decode with `consumes`, filter, encode with
/// `produces`. Without a codec for either side the bytes pass through.
pub async fn render(
    stream: &dyn DataStream,
    filter: Option<&KeyFilter>,
    codecs: &CodecRegistry,
    consumes: &MediaType,
    produces: &MediaType,
) -> Result<Rendered, RenderError> {
    if stream.can_fetch() {
        stream.fetch().await?;
    }
    let content = stream.contents();

    let (Some(decoder), Some(encoder)) = (codecs.lookup(consumes), codecs.lookup(produces)) else {
        debug!(consumes = %consumes, produces = %produces, "No codec pair, writing stream verbatim");
        return Ok(Rendered::Verbatim(content));
    };

    let combination = format!("{}→{}", consumes.format_name(), produces.format_name());
    let codec_error = |source| RenderError::Codec {
        combination: combination.clone(),
        source,
    };

    let mut records = decoder.decode(&content).map_err(codec_error)?;
    if let Some(filter) = filter {
        records = filter.apply(records);
    }
    let out = encoder.encode(&records).map_err(codec_error)?;
    Ok(Rendered::Translated(out))
}
