//! Multipart paste form parsing.
//!
//! Everything held in memory shares one budget.  Text fields that
//! overrun it reject the form; an uploaded file is spooled to an
//! anonymous temporary file once it would overrun it.

use axum::extract::multipart::{Field, MultipartError};
use axum::extract::Multipart;
use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncSeekExt, AsyncWriteExt};

use crate::errors::PasteError;
use crate::storage::backend::UploadSource;

/// Content type assumed for file parts that declare none.
pub const DEFAULT_FILE_CONTENT_TYPE: &str = "application/octet-stream";

/// A parsed paste submission.
#[derive(Debug, Default)]
pub struct PasteForm {
    /// The `content` text field; empty when absent.
    pub content: String,
    /// The `syntax` field, if sent.
    pub syntax: Option<String>,
    /// The `file` part, if a file was chosen.
    pub file: Option<UploadedFile>,
}

impl PasteForm {
    /// Neither a file nor any text was submitted.
    pub fn is_empty(&self) -> bool {
        self.file.is_none() && self.content.is_empty()
    }
}

#[derive(Debug)]
pub struct UploadedFile {
    pub file_name: String,
    pub content_type: String,
    pub size: u64,
    pub body: FileBody,
}

/// Where an uploaded file's bytes ended up.
#[derive(Debug)]
pub enum FileBody {
    Memory(Bytes),
    /// Rewound temporary file.
    Spooled(tokio::fs::File),
}

impl UploadedFile {
    /// Whether the file was spooled to disk.
    pub fn is_spooled(&self) -> bool {
        matches!(self.body, FileBody::Spooled(_))
    }

    /// Turn the stored bytes into an upload source for the object store.
    pub fn into_source(self) -> UploadSource {
        match self.body {
            FileBody::Memory(data) => UploadSource::Bytes(data),
            FileBody::Spooled(file) => UploadSource::Reader {
                reader: Box::new(file),
                size_hint: Some(self.size),
            },
        }
    }
}

/// Read the paste form from a multipart body.
///
/// `max_memory` bounds the text fields plus the part of an uploaded
/// file buffered in memory before spooling.
pub async fn read_paste_form(
    mut multipart: Multipart,
    max_memory: u64,
) -> Result<PasteForm, PasteError> {
    let mut form = PasteForm::default();
    let mut budget = max_memory;

    while let Some(field) = multipart.next_field().await.map_err(invalid_form)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "content" => form.content = read_text_field(field, &mut budget).await?,
            "syntax" => form.syntax = Some(read_text_field(field, &mut budget).await?),
            "file" => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                // Browsers send an empty part when no file was chosen.
                if file_name.is_empty() || form.file.is_some() {
                    continue;
                }
                let content_type = field
                    .content_type()
                    .filter(|ct| !ct.is_empty())
                    .unwrap_or(DEFAULT_FILE_CONTENT_TYPE)
                    .to_string();
                let (size, body) = read_file_field(field, budget).await?;
                if let FileBody::Memory(_) = body {
                    budget -= size;
                }
                let file = UploadedFile {
                    file_name,
                    content_type,
                    size,
                    body,
                };
                tracing::debug!(
                    "Received file {} ({}, {} bytes, spooled={})",
                    file.file_name,
                    file.content_type,
                    file.size,
                    file.is_spooled()
                );
                form.file = Some(file);
            }
            _ => {}
        }
    }

    Ok(form)
}

/// Read a text field, charging its size against `budget`.
async fn read_text_field(mut field: Field<'_>, budget: &mut u64) -> Result<String, PasteError> {
    let name = field.name().unwrap_or_default().to_string();
    let mut buffer = BytesMut::new();

    while let Some(chunk) = field.chunk().await.map_err(invalid_form)? {
        let len = chunk.len() as u64;
        if len > *budget {
            tracing::warn!("Form field {} exceeds the in-memory limit", name);
            return Err(PasteError::InvalidForm {
                message: format!("Form field {name} is too large"),
            });
        }
        *budget -= len;
        buffer.extend_from_slice(&chunk);
    }

    String::from_utf8(Vec::from(buffer)).map_err(|_| PasteError::InvalidForm {
        message: format!("Form field {name} is not valid UTF-8"),
    })
}

async fn read_file_field(
    mut field: Field<'_>,
    max_memory: u64,
) -> Result<(u64, FileBody), PasteError> {
    let mut buffer = BytesMut::new();
    let mut spool: Option<tokio::fs::File> = None;
    let mut size: u64 = 0;

    while let Some(chunk) = field.chunk().await.map_err(invalid_form)? {
        size += chunk.len() as u64;

        if spool.is_none() && size > max_memory {
            let mut file = tokio::fs::File::from_std(tempfile::tempfile().map_err(spool_error)?);
            file.write_all(&buffer).await.map_err(spool_error)?;
            buffer = BytesMut::new();
            spool = Some(file);
        }

        match spool.as_mut() {
            Some(file) => file.write_all(&chunk).await.map_err(spool_error)?,
            None => buffer.extend_from_slice(&chunk),
        }
    }

    let body = match spool {
        Some(mut file) => {
            file.flush().await.map_err(spool_error)?;
            file.rewind().await.map_err(spool_error)?;
            FileBody::Spooled(file)
        }
        None => FileBody::Memory(buffer.freeze()),
    };
    Ok((size, body))
}

fn invalid_form(err: MultipartError) -> PasteError {
    PasteError::InvalidForm {
        message: err.body_text(),
    }
}

fn spool_error(err: std::io::Error) -> PasteError {
    PasteError::InternalError(anyhow::Error::new(err).context("failed to spool uploaded file"))
}
