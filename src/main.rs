//! Token Analyzer - transaction analysis client and offline-caching gateway

use std::path::Path;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use token_analyzer::{
    cli::{AnalyzeArgs, Cli, Command, ServeArgs, WorkerCommand},
    client::{Controller, CsvUpload, FormInput, HttpAnalyzeApi, WorkerControl},
    config::Config,
    export::{DirectorySink, DownloadSink},
    gateway::Gateway,
    render, setup_tracing,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Setup tracing
    if let Err(e) = setup_tracing(&cli.log_level, cli.log_format.as_deref()) {
        eprintln!("Failed to setup tracing: {e}");
        return ExitCode::FAILURE;
    }

    // Handle subcommands
    match cli.command {
        Some(Command::Analyze(args)) => run_analyze(cli.config.as_deref(), args).await,
        Some(Command::Worker(cmd)) => run_worker(cli.config.as_deref(), cmd).await,
        Some(Command::Serve(args)) => run_server(cli.config.as_deref(), args).await,
        None => run_server(cli.config.as_deref(), ServeArgs::default()).await,
    }
}

fn load_config(path: Option<&Path>) -> Option<Config> {
    match Config::load(path) {
        Ok(config) => Some(config),
        Err(e) => {
            error!("Failed to load configuration: {e}");
            None
        }
    }
}

/// Run one analysis and print (and optionally export) the results
async fn run_analyze(config_path: Option<&Path>, args: AnalyzeArgs) -> ExitCode {
    let Some(config) = load_config(config_path) else {
        return ExitCode::FAILURE;
    };

    let file = match &args.csv {
        Some(path) => match CsvUpload::from_path(path).await {
            Ok(file) => Some(file),
            Err(e) => {
                eprintln!("❌ Failed to read {}: {e}", path.display());
                return ExitCode::FAILURE;
            }
        },
        None => None,
    };

    let defaults = FormInput::prefilled();
    let form = FormInput {
        file,
        sol_price: args.sol_price.unwrap_or(defaults.sol_price),
        token_address: args.token_address.unwrap_or(defaults.token_address),
        total_supply: args.total_supply.unwrap_or(defaults.total_supply),
        market_cap_threshold: args
            .market_cap_threshold
            .unwrap_or(defaults.market_cap_threshold),
    };

    let endpoint = args.endpoint.unwrap_or(config.client.endpoint);
    let api = match HttpAnalyzeApi::new(endpoint, config.client.request_timeout) {
        Ok(api) => api,
        Err(e) => {
            eprintln!("❌ Failed to create client: {e}");
            return ExitCode::FAILURE;
        }
    };

    let mut controller = Controller::new(api);
    controller.select_tab(args.tab);

    let outcome = controller.submit(&form).await.map(|_| ());
    if outcome.is_err() {
        let message = controller.state().error_message().unwrap_or("Analysis failed");
        eprintln!("❌ {message}");
        return ExitCode::FAILURE;
    }

    if args.html {
        if let Some(markup) = controller.render_html() {
            println!("{markup}");
        }
    } else if let Some(result) = controller.state().result() {
        println!("{}", render::text::table(result, args.tab));
        println!(
            "{} transaction(s), {} whale(s)",
            result.transactions.len(),
            result.whale_report.len()
        );
    }

    if let Some(format) = args.export {
        let download = match controller.export(format) {
            Ok(Some(download)) => download,
            Ok(None) => return ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("❌ Export failed: {e}");
                return ExitCode::FAILURE;
            }
        };
        match DirectorySink::new(&args.out_dir).deliver(&download) {
            Ok(path) => eprintln!("✅ Exported {}", path.display()),
            Err(e) => {
                eprintln!("❌ Failed to save {}: {e}", download.filename);
                return ExitCode::FAILURE;
            }
        }
    }

    ExitCode::SUCCESS
}

/// Talk to a running gateway's worker
async fn run_worker(config_path: Option<&Path>, cmd: WorkerCommand) -> ExitCode {
    let (url, skip) = match cmd {
        WorkerCommand::SkipWaiting { url } => (url, true),
        WorkerCommand::Status { url } => (url, false),
    };

    let base = match url {
        Some(url) => url,
        None => {
            let Some(config) = load_config(config_path) else {
                return ExitCode::FAILURE;
            };
            format!("http://{}:{}", config.server.host, config.server.port)
        }
    };

    let control = match WorkerControl::new(&base) {
        Ok(control) => control,
        Err(e) => {
            eprintln!("❌ Failed to create client: {e}");
            return ExitCode::FAILURE;
        }
    };

    if skip {
        return match control.skip_waiting().await {
            Ok(()) => {
                println!("✅ SKIP_WAITING sent to {base}");
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("❌ {e}");
                ExitCode::FAILURE
            }
        };
    }

    match control.status().await {
        Ok(status) => {
            println!(
                "{}",
                serde_json::to_string_pretty(&status).unwrap_or_default()
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("❌ {e}");
            ExitCode::FAILURE
        }
    }
}

/// Run the gateway server
async fn run_server(config_path: Option<&Path>, args: ServeArgs) -> ExitCode {
    let Some(mut config) = load_config(config_path) else {
        return ExitCode::FAILURE;
    };

    // Apply CLI overrides
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(upstream) = args.upstream {
        config.upstream.url = upstream;
    }
    if let Some(dir) = args.storage_dir {
        config.offline.storage_dir = Some(dir);
    }
    if args.no_offline {
        config.offline.enabled = false;
    }
    if let Err(e) = config.validate() {
        error!("Invalid configuration: {e}");
        return ExitCode::FAILURE;
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        port = config.server.port,
        upstream = %config.upstream.url,
        offline = config.offline.enabled,
        "Starting token analyzer gateway"
    );

    // Create and run gateway
    let gateway = match Gateway::new(config, config_path.map(Path::to_path_buf)).await {
        Ok(g) => g,
        Err(e) => {
            error!("Failed to create gateway: {e}");
            return ExitCode::FAILURE;
        }
    };

    // Run with graceful shutdown
    if let Err(e) = gateway.run().await {
        error!("Gateway error: {e}");
        return ExitCode::FAILURE;
    }

    info!("Gateway shutdown complete");
    ExitCode::SUCCESS
}
