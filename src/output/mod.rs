//! Output formatters and the operation log.
//!
//! - [`json`]: machine-readable results for scripting
//! - [`oplog`]: append-only CSV log of every destructive action
//! - [`script`]: recovery scripts built from the operation log
//!
//! # Example
//!
//! ```no_run
//! use photodupe::duplicates::{DuplicateFinder, FinderConfig};
//! use photodupe::error::ExitCode;
//! use photodupe::output::JsonOutput;
//! use std::path::Path;
//!
//! let finder = DuplicateFinder::with_defaults(FinderConfig::default());
//! let (groups, summary) = finder.find_duplicates(Path::new(".")).unwrap();
//!
//! let output = JsonOutput::new(&groups, &summary, ExitCode::Success);
//! println!("{}", output.to_json_pretty().unwrap());
//! ```

pub mod json;
pub mod oplog;
pub mod script;

pub use json::{JsonOutput, JsonOutputError};
pub use oplog::{
    CsvOperationLog, MemoryOperationLog, Operation, OperationKind, OperationLogError,
    OperationSink,
};
pub use script::{RecoveryScript, ScriptType};
