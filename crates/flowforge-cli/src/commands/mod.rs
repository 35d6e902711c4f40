//! CLI subcommands.

pub mod jobs;
pub mod run;
pub mod validate;

pub use jobs::JobsArgs;
pub use run::RunArgs;
pub use validate::ValidateArgs;
