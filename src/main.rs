//! photodupe command-line entry point.

use clap::Parser;
use photodupe::{
    cli::Cli,
    duplicates::FinderError,
    error::{ExitCode, StructuredError},
};

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    let json_errors = cli.json_errors;

    match photodupe::run_app(cli) {
        Ok(code) => code.into(),
        Err(err) => {
            let exit_code = if err
                .downcast_ref::<FinderError>()
                .is_some_and(|e| matches!(e, FinderError::Interrupted))
            {
                ExitCode::Interrupted
            } else {
                ExitCode::GeneralError
            };

            if json_errors {
                let structured = StructuredError::new(&err, exit_code);
                match serde_json::to_string_pretty(&structured) {
                    Ok(json) => eprintln!("{json}"),
                    Err(_) => eprintln!("[{}] Error: {:#}", exit_code.code_prefix(), err),
                }
            } else {
                eprintln!("[{}] Error: {:#}", exit_code.code_prefix(), err);
            }

            exit_code.into()
        }
    }
}
