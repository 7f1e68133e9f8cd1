// JSON document I/O shared by the project and configuration stores.
//
// Reads and writes always go through the FileArbiter so a document held open by
// another process is waited on instead of failing.

use crate::services::arbiter::{Access, ArbiterError, FileArbiter, OpenMode};
use camino::Utf8Path;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::io::{BufWriter, Read, Write};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

/// Outcome of reading a document that exists and could be opened.
pub(crate) enum Parsed<T> {
    Value(T),
    /// Empty, `null`, or malformed. A well-formed document is never empty.
    Corrupt(Option<serde_json::Error>),
}

fn parse<T: DeserializeOwned>(bytes: &[u8]) -> Parsed<T> {
    match serde_json::from_slice::<Option<T>>(bytes) {
        Ok(Some(value)) => Parsed::Value(value),
        Ok(None) => Parsed::Corrupt(None),
        Err(e) => Parsed::Corrupt(Some(e)),
    }
}

fn io_error(path: &Utf8Path) -> impl FnOnce(std::io::Error) -> ArbiterError + '_ {
    move |source| ArbiterError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// A file deleted between the existence check and the open counts as missing.
fn vanished_as_none<F>(opened: Result<Option<F>, ArbiterError>) -> Result<Option<F>, ArbiterError> {
    match opened {
        Err(ArbiterError::Io { source, .. }) if source.kind() == std::io::ErrorKind::NotFound => Ok(None),
        other => other,
    }
}

/// `Ok(None)` when the file is missing, cancelled, or not readable.
pub(crate) fn read<T: DeserializeOwned>(
    arbiter: &FileArbiter,
    path: &Utf8Path,
    cancel: &CancellationToken,
) -> Result<Option<Parsed<T>>, ArbiterError> {
    if !path.is_file() {
        return Ok(None);
    }

    let opened = arbiter.open_when_accessible(path, OpenMode::Open, Access::Read, cancel);
    let Some(mut file) = vanished_as_none(opened)? else {
        return Ok(None);
    };

    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes).map_err(io_error(path))?;
    Ok(Some(parse(&bytes)))
}

pub(crate) async fn read_async<T: DeserializeOwned>(
    arbiter: &FileArbiter,
    path: &Utf8Path,
    cancel: &CancellationToken,
) -> Result<Option<Parsed<T>>, ArbiterError> {
    let is_file = tokio::fs::metadata(path)
        .await
        .map(|metadata| metadata.is_file())
        .unwrap_or(false);
    if cancel.is_cancelled() || !is_file {
        return Ok(None);
    }

    let opened = arbiter
        .open_when_accessible_async(path, OpenMode::Open, Access::Read, cancel)
        .await;
    let Some(mut file) = vanished_as_none(opened)? else {
        return Ok(None);
    };

    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes).await.map_err(io_error(path))?;
    Ok(Some(parse(&bytes)))
}

/// Write `value` as indented JSON, flush and sync. `Ok(false)` when cancelled or
/// the arbiter could not hand out a writable handle.
pub(crate) fn write<T: Serialize>(
    arbiter: &FileArbiter,
    path: &Utf8Path,
    value: &T,
    cancel: &CancellationToken,
) -> Result<bool, ArbiterError> {
    let Some(file) = arbiter.open_when_accessible(path, OpenMode::Create, Access::Write, cancel)?
    else {
        return Ok(false);
    };

    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value)
        .map_err(std::io::Error::from)
        .map_err(io_error(path))?;
    writer.flush().map_err(io_error(path))?;
    let file = writer
        .into_inner()
        .map_err(|e| e.into_error())
        .map_err(io_error(path))?;
    file.sync_all().map_err(io_error(path))?;
    Ok(true)
}

pub(crate) async fn write_async<T: Serialize>(
    arbiter: &FileArbiter,
    path: &Utf8Path,
    value: &T,
    cancel: &CancellationToken,
) -> Result<bool, ArbiterError> {
    // Serialize before taking the lock to keep the critical section short.
    let bytes = serde_json::to_vec_pretty(value)
        .map_err(std::io::Error::from)
        .map_err(io_error(path))?;

    let Some(mut file) = arbiter
        .open_when_accessible_async(path, OpenMode::Create, Access::Write, cancel)
        .await?
    else {
        return Ok(false);
    };

    file.write_all(&bytes).await.map_err(io_error(path))?;
    file.flush().await.map_err(io_error(path))?;
    file.sync_all().await.map_err(io_error(path))?;
    Ok(true)
}
