//! # untwine
//!
//! Driver for rewriting JVM class files so that every method body has
//! reducible control flow. Inputs are bare `.class` files or `.jar`
//! archives, rewritten in place with a temp-file-and-rename discipline;
//! anything else is skipped.
//!
//! Class-file parsing, serialization, and bytecode verification are not
//! performed here: an embedder supplies them through [`ClassFileCodec`] and
//! [`TypeResolver`], the way the original workflow delegates those concerns
//! to a bytecode library. The driver walks the inputs, applies the exclusion
//! filters, runs the splitter over every method, and writes verified results
//! back:
//!
//! ```ignore
//! use clap::Parser;
//!
//! fn main() -> std::process::ExitCode {
//!     tracing_subscriber::fmt::init();
//!     let cli = untwine::Cli::parse();
//!     match untwine::run(&cli, &MyCodec::new(), &MyResolver::new()) {
//!         Ok(()) => std::process::ExitCode::SUCCESS,
//!         Err(err) => {
//!             eprintln!("{err}");
//!             std::process::ExitCode::FAILURE
//!         }
//!     }
//! }
//! ```

pub mod cli;
pub mod codec;
pub mod driver;
pub mod filter;

pub use cli::Cli;
pub use codec::{ClassFileCodec, ClassUnit, CodecError, ResolverCache, TypeResolver};
pub use driver::{run, DriverError, Outcome, ProcessError};
pub use filter::ExcludeFilter;
