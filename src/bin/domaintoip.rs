use std::convert::TryFrom;
use std::env;
use std::process;

use tracing::{debug, error, info};

use domaintoip::app::logging::Logging;
use domaintoip::app::{self, cli_parser, AppConfig, ExitStatus};

#[tokio::main]
async fn main() {
    let args = match cli_parser::create_parser().try_get_matches() {
        Ok(args) => args,
        Err(err) => {
            let exit_status = if err.use_stderr() {
                ExitStatus::CliParsingFailed
            } else {
                ExitStatus::Ok
            };
            let _ = err.print();
            process::exit(exit_status as i32);
        }
    };

    let color = !args.get_flag("no-color");
    let logging = Logging::new(args.get_count("v"), env::var_os("RUST_LOG"), color, args.get_flag("debug"));
    if let Err(err) = logging.start() {
        eprintln!("Failed to initialize logging: {:#}", err);
        process::exit(ExitStatus::UnrecoverableError as i32);
    }
    debug!("Parsed args and set up logging.");

    let app_config = match AppConfig::try_from(&args) {
        Ok(config) => config,
        Err(err) => {
            error!("Failed to parse configuration: {:#}", err);
            eprintln!("Failed to parse configuration: {:#}", err);
            process::exit(ExitStatus::ConfigParsingFailed as i32);
        }
    };
    debug!("Parsed config: {:?}", app_config);

    let exit_status = match app::run(&app_config).await {
        Ok(exit_status) => exit_status,
        Err(err) => {
            error!("Failed to run: {:#}", err);
            eprintln!("Failed to run: {:#}", err);
            ExitStatus::UnrecoverableError
        }
    };
    info!("Exiting with status {:?}.", exit_status);

    process::exit(exit_status as i32);
}
