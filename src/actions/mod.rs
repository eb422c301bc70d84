//! File actions module.
//!
//! Resolution of duplicate groups: every duplicate is deleted, sent to the
//! system trash, or moved into a duplicates folder, while the original of
//! each group is left untouched.
//!
//! ```no_run
//! use photodupe::actions::{resolve, ResolveConfig};
//!
//! let groups = Vec::new();
//! let report = resolve(&groups, &ResolveConfig::trash().with_dry_run(true), None, None);
//! println!("{}", report.summary());
//! ```

pub mod resolve;

pub use resolve::{
    delete_file, move_file, resolve, trash_file, unique_target, ActionError, ActionFailure,
    RemovalReport, ResolutionMode, ResolveConfig, ResolveProgressCallback,
};
