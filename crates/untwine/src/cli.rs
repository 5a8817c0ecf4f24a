//! Command-line surface.

use std::path::PathBuf;

use clap::Parser;

/// Removes irreducible loops from compiled JVM methods.
///
/// Every listed path ending in `.class` or `.jar` is rewritten in place;
/// other paths are ignored. Rewritten files are first written next to the
/// original and renamed over it only after the result verified cleanly.
#[derive(Parser, Debug, Default)]
#[command(name = "untwine", version)]
pub struct Cli {
    /// Class files or jar archives to process in place.
    #[arg(value_name = "PATH")]
    pub paths: Vec<PathBuf>,

    /// Package prefixes whose classes are copied unchanged
    /// (dot or slash form, comma separated).
    #[arg(
        long = "excludePackages",
        value_name = "PACKAGES",
        value_delimiter = ','
    )]
    pub exclude_packages: Vec<String>,

    /// Fully qualified class names copied unchanged
    /// (dot or slash form, comma separated).
    #[arg(
        long = "excludeClasses",
        value_name = "CLASSES",
        value_delimiter = ','
    )]
    pub exclude_classes: Vec<String>,
}
