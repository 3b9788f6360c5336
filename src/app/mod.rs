pub mod cli_parser;
pub mod config;
pub mod logging;
pub mod run;

pub use config::AppConfig;
pub use run::run;

/// `ExitStatus` represents the exit states that will be return to the OS after termination
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    /// All fine.
    Ok = 0,
    /// CLI argument parsing failed.
    CliParsingFailed = 1,
    /// Parsed CLI arguments could not be turned into a valid configuration.
    ConfigParsingFailed = 2,
    /// An unrecoverable error occurred. This is worst case and should not happen.
    UnrecoverableError = 3,
}
