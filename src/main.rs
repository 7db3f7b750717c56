use std::process::ExitCode;

use rtt_probe::{
    client::run_client,
    configuration::{Configuration, Parser},
    reflector::run_reflector,
};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();

    let conf = Configuration::parse();
    if let Err(e) = conf.validate() {
        eprintln!("Configuration is broken: {}", e);
        return ExitCode::FAILURE;
    }

    log::info!("Configuration valid. Starting up...");

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                shutdown.cancel();
            }
        });
    }

    if conf.is_reflector {
        if let Err(e) = run_reflector(&conf, shutdown).await {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    } else {
        match run_client(&conf, shutdown).await {
            Ok(snapshot) => snapshot.print(conf.output_format),
            Err(e) => {
                eprintln!("{}", e);
                return ExitCode::FAILURE;
            }
        }
    }

    ExitCode::SUCCESS
}
