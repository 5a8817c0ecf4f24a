//! File walking and in-place rewriting.
//!
//! Distinct input files are processed on independent rayon tasks; within a
//! file everything is sequential. Outputs are written to a sibling temporary
//! file and renamed over the original only after the rewritten bytes came
//! back clean from the verifier, so a failure of any kind leaves the
//! original untouched.

use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use thiserror::Error;
use tracing::{debug, error, info};
use untwine_bytecode::{split_method, BytecodeError};

use crate::cli::Cli;
use crate::codec::{ClassFileCodec, CodecError, ResolverCache, TypeResolver};
use crate::filter::ExcludeFilter;

/// What happened to one input path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// At least one method was rewritten and the file replaced.
    Rewritten,
    /// Nothing to do; the file was left byte-for-byte as it was.
    Unchanged,
    /// Not a `.class` or `.jar` path.
    Skipped,
}

/// Failure while processing a single input file.
#[derive(Error, Debug)]
pub enum ProcessError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Rewrite(#[from] BytecodeError),

    #[error("archive error: {0}")]
    Zip(#[from] zip::result::ZipError),
}

/// Overall driver failure: every input was attempted, some of them failed.
#[derive(Error, Debug)]
pub enum DriverError {
    #[error("{failed} of {total} inputs failed")]
    SomeInputsFailed { failed: usize, total: usize },
}

/// Processes every path of `cli` in place.
///
/// Files are handled in parallel; a failing file is reported and does not
/// stop the others. Returns an error when any input failed.
pub fn run(
    cli: &Cli,
    codec: &dyn ClassFileCodec,
    resolver: &dyn TypeResolver,
) -> Result<(), DriverError> {
    let filter = ExcludeFilter::new(&cli.exclude_packages, &cli.exclude_classes);
    let cache = ResolverCache::new(resolver);

    let results: Vec<(&PathBuf, Result<Outcome, ProcessError>)> = cli
        .paths
        .par_iter()
        .map(|path| (path, process_path(path, codec, &cache, &filter)))
        .collect();

    let mut failed = 0;
    for (path, result) in &results {
        match result {
            Ok(Outcome::Rewritten) => info!(path = %path.display(), "rewritten"),
            Ok(Outcome::Unchanged) => debug!(path = %path.display(), "unchanged"),
            Ok(Outcome::Skipped) => {}
            Err(err) => {
                failed += 1;
                error!(path = %path.display(), %err, "failed");
            }
        }
    }

    if failed > 0 {
        return Err(DriverError::SomeInputsFailed {
            failed,
            total: cli.paths.len(),
        });
    }
    Ok(())
}

/// Dispatches one path on its extension.
pub fn process_path(
    path: &Path,
    codec: &dyn ClassFileCodec,
    resolver: &dyn TypeResolver,
    filter: &ExcludeFilter,
) -> Result<Outcome, ProcessError> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("class") => process_class_file(path, codec, resolver, filter),
        Some("jar") => process_jar(path, codec, resolver, filter),
        _ => {
            debug!(path = %path.display(), "neither .class nor .jar, skipping");
            Ok(Outcome::Skipped)
        }
    }
}

fn process_class_file(
    path: &Path,
    codec: &dyn ClassFileCodec,
    resolver: &dyn TypeResolver,
    filter: &ExcludeFilter,
) -> Result<Outcome, ProcessError> {
    let bytes = fs::read(path)?;
    match rewrite_class(&bytes, codec, resolver, filter)? {
        Some(rewritten) => {
            write_atomic(path, &rewritten)?;
            Ok(Outcome::Rewritten)
        }
        None => Ok(Outcome::Unchanged),
    }
}

fn process_jar(
    path: &Path,
    codec: &dyn ClassFileCodec,
    resolver: &dyn TypeResolver,
    filter: &ExcludeFilter,
) -> Result<Outcome, ProcessError> {
    let mut archive = zip::ZipArchive::new(fs::File::open(path)?)?;

    let mut entries: Vec<(String, bool, Vec<u8>)> = Vec::with_capacity(archive.len());
    let mut changed = false;
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let name = entry.name().to_string();
        if entry.is_dir() {
            entries.push((name, true, Vec::new()));
            continue;
        }
        let mut data = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut data)?;

        if name.ends_with(".class") {
            if let Some(rewritten) = rewrite_class(&data, codec, resolver, filter)? {
                changed = true;
                data = rewritten;
            }
        }
        entries.push((name, false, data));
    }

    if !changed {
        return Ok(Outcome::Unchanged);
    }

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    {
        let mut writer = zip::ZipWriter::new(tmp.as_file_mut());
        let options = zip::write::FileOptions::default();
        for (name, is_dir, data) in &entries {
            if *is_dir {
                writer.add_directory(name.clone(), options)?;
            } else {
                writer.start_file(name.clone(), options)?;
                writer.write_all(data)?;
            }
        }
        writer.finish()?;
    }
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(Outcome::Rewritten)
}

/// Rewrites one class; `None` means it is excluded or already reducible.
///
/// The emitted bytes are verified before being handed back; verifier
/// diagnostics abort the file with the original still in place.
fn rewrite_class(
    bytes: &[u8],
    codec: &dyn ClassFileCodec,
    resolver: &dyn TypeResolver,
    filter: &ExcludeFilter,
) -> Result<Option<Vec<u8>>, ProcessError> {
    let mut class = codec.parse(bytes)?;
    if filter.is_excluded(&class.name) {
        debug!(class = %class.name, "excluded, copying unchanged");
        return Ok(None);
    }

    let mut changed = false;
    for method in &mut class.methods {
        if split_method(method)? {
            debug!(method = %method.display_name(), "rewrote irreducible control flow");
            changed = true;
        }
    }
    if !changed {
        return Ok(None);
    }

    let out = codec.emit(&class)?;
    codec.verify(&out, resolver)?;
    Ok(Some(out))
}

/// Writes to a sibling temp file and renames over `path`. The temp file is
/// removed on any failure.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), ProcessError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
