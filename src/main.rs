use std::process::ExitCode;

use caption_layout::cli::parse_cli;
use caption_layout::{AppError, resolve_settings, run_session};

#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let (cli, sources) = parse_cli();
    let result = match resolve_settings(&cli, &sources) {
        Ok(settings) => {
            log::debug!(
                "using snapshot {} (config dir: {:?})",
                settings.snapshot.display(),
                settings.config_dir
            );
            run_session(&settings, &cli.command).await
        }
        Err(err) => Err(AppError::from(err)),
    };

    match result {
        Ok(outcome) => {
            println!("{outcome}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("{} failed: {err}", cli.command.name());
            ExitCode::FAILURE
        }
    }
}
