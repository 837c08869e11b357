use clap::{Parser, Subcommand, ValueEnum};
use serde_json::Value;
use std::fs;
use std::process::ExitCode;
use uuid::Uuid;

use linkbudget_client::schema::{
    self, CalculationResponse, DirectionResult, SchemaKind, SweepResponse, Validated,
    ValidationErrors,
};
use linkbudget_client::{CancellationToken, Config, LinkBudgetClient, QueryError};

#[derive(Parser)]
#[command(name = "linkbudget")]
#[command(about = "Satellite link-budget calculation client")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a JSON payload against one of the calculation schemas
    Validate { kind: Kind, file: String },
    /// Run one calculation against the service
    Calculate {
        request: String,
        #[arg(short, long)]
        config: Option<String>,
        /// Skip the shared cache and retries
        #[arg(long)]
        uncached: bool,
    },
    /// Run a parameter sweep against the service
    Sweep {
        request: String,
        #[arg(short, long)]
        config: Option<String>,
    },
    /// Create a scenario, or replace an existing one when an id is given
    SaveScenario {
        file: String,
        #[arg(long)]
        id: Option<Uuid>,
        #[arg(short, long)]
        config: Option<String>,
    },
    /// Print the delays a failing calculation would be retried after
    RetrySchedule {
        #[arg(short, long)]
        config: Option<String>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Kind {
    Runtime,
    Request,
    Response,
    SweepRequest,
    SweepResponse,
    Scenario,
}

impl From<Kind> for SchemaKind {
    fn from(kind: Kind) -> Self {
        match kind {
            Kind::Runtime => SchemaKind::Runtime,
            Kind::Request => SchemaKind::Request,
            Kind::Response => SchemaKind::Response,
            Kind::SweepRequest => SchemaKind::SweepRequest,
            Kind::SweepResponse => SchemaKind::SweepResponse,
            Kind::Scenario => SchemaKind::Scenario,
        }
    }
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Validate { kind, file } => validate(kind.into(), &file),
        Commands::Calculate {
            request,
            config,
            uncached,
        } => calculate(&request, config.as_deref(), uncached),
        Commands::Sweep { request, config } => sweep(&request, config.as_deref()),
        Commands::SaveScenario { file, id, config } => {
            save_scenario(&file, id, config.as_deref())
        }
        Commands::RetrySchedule { config } => retry_schedule(config.as_deref()),
    }
}

fn read_json(path: &str) -> Result<Value, String> {
    let content = fs::read_to_string(path).map_err(|e| format!("Error reading file: {}", e))?;
    serde_json::from_str(&content).map_err(|e| format!("Invalid JSON: {}", e))
}

fn load_config(path: Option<&str>) -> Result<Config, String> {
    match path {
        Some(p) => Config::from_file(p).map_err(|e| format!("Config error: {}", e)),
        None => Ok(Config::default()),
    }
}

fn validate(kind: SchemaKind, path: &str) -> ExitCode {
    let raw = match read_json(path) {
        Ok(v) => v,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    match schema::validate_kind(kind, &raw) {
        Ok(Validated::Runtime(params)) => {
            println!("Runtime parameters are valid");
            println!(
                "  uplink:   {:.3} GHz @ {:.1} deg",
                params.uplink.frequency_hz / 1e9,
                params.uplink.elevation_deg
            );
            println!(
                "  downlink: {:.3} GHz @ {:.1} deg",
                params.downlink.frequency_hz / 1e9,
                params.downlink.elevation_deg
            );
            ExitCode::SUCCESS
        }
        Ok(Validated::Request(request)) => {
            println!(
                "Calculation request is valid ({} / {:?})",
                request.waveform_strategy, request.transponder_type
            );
            ExitCode::SUCCESS
        }
        Ok(Validated::Response(response)) => {
            print_response(&response);
            ExitCode::SUCCESS
        }
        Ok(Validated::SweepRequest(request)) => {
            let sweep = &request.sweep;
            println!(
                "Sweep request is valid ({} from {} to {} in {} steps)",
                sweep.parameter_path, sweep.start, sweep.end, sweep.steps
            );
            ExitCode::SUCCESS
        }
        Ok(Validated::SweepResponse(response)) => {
            print_sweep(&response);
            ExitCode::SUCCESS
        }
        Ok(Validated::Scenario(draft)) => {
            println!("Scenario \"{}\" is valid ({:?})", draft.name, draft.status);
            ExitCode::SUCCESS
        }
        Err(errors) => {
            print_violations(&errors);
            ExitCode::FAILURE
        }
    }
}

/// Everything a command talking to the service needs.
struct Session {
    client: LinkBudgetClient,
    runtime: tokio::runtime::Runtime,
    token: CancellationToken,
}

fn open_session(config: Option<&str>) -> Result<Session, String> {
    let config = load_config(config)?;
    let client = LinkBudgetClient::new(&config).map_err(|e| e.to_string())?;
    let runtime = tokio::runtime::Runtime::new()
        .map_err(|e| format!("Failed to start runtime: {}", e))?;
    Ok(Session {
        client,
        runtime,
        token: CancellationToken::new(),
    })
}

/// Cancels `token` on Ctrl-C. Must be called inside the runtime.
fn cancel_on_interrupt(token: &CancellationToken) {
    let interrupt = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupt.cancel();
        }
    });
}

fn report_failure(what: &str, err: &QueryError) -> ExitCode {
    match err {
        QueryError::Validation(errors) => print_violations(errors),
        e => {
            log::error!("{} failed ({}): {}", what, e.kind(), e);
            eprintln!("{} failed: {}", what, e);
            if e.is_recoverable() {
                eprintln!("The service may be temporarily unavailable; try again later.");
            }
        }
    }
    ExitCode::FAILURE
}

fn calculate(path: &str, config: Option<&str>, uncached: bool) -> ExitCode {
    let (raw, session) = match read_json(path).and_then(|raw| Ok((raw, open_session(config)?))) {
        Ok(v) => v,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    let Session {
        client,
        runtime,
        token,
    } = session;

    let outcome = runtime.block_on(async {
        cancel_on_interrupt(&token);
        let outcome = if uncached {
            client.calculate_uncached(&raw, &token).await
        } else {
            client
                .calculate(&raw, &token)
                .await
                .map(|r| CalculationResponse::clone(&r))
        };
        client.shutdown();
        outcome
    });

    match outcome {
        Ok(response) => {
            print_response(&response);
            ExitCode::SUCCESS
        }
        Err(e) => report_failure("Calculation", &e),
    }
}

fn sweep(path: &str, config: Option<&str>) -> ExitCode {
    let (raw, session) = match read_json(path).and_then(|raw| Ok((raw, open_session(config)?))) {
        Ok(v) => v,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    let Session {
        client,
        runtime,
        token,
    } = session;

    let outcome = runtime.block_on(async {
        cancel_on_interrupt(&token);
        let outcome = client.sweep(&raw, &token).await;
        client.shutdown();
        outcome
    });

    match outcome {
        Ok(response) => {
            print_sweep(&response);
            ExitCode::SUCCESS
        }
        Err(e) => report_failure("Sweep", &e),
    }
}

fn save_scenario(path: &str, id: Option<Uuid>, config: Option<&str>) -> ExitCode {
    let (raw, session) = match read_json(path).and_then(|raw| Ok((raw, open_session(config)?))) {
        Ok(v) => v,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    let Session {
        client,
        runtime,
        token,
    } = session;

    let outcome = runtime.block_on(async {
        cancel_on_interrupt(&token);
        match id {
            Some(id) => client.update_scenario(id, &raw, &token).await,
            None => client.create_scenario(&raw, &token).await,
        }
    });

    match outcome {
        Ok(scenario) => {
            println!(
                "Scenario \"{}\" saved as {} ({:?})",
                scenario.name, scenario.id, scenario.status
            );
            ExitCode::SUCCESS
        }
        Err(e) => report_failure("Saving scenario", &e),
    }
}

fn retry_schedule(config: Option<&str>) -> ExitCode {
    let config = match load_config(config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let policy = config.retry_policy();
    println!("Up to {} retries after the first attempt", policy.max_retries);
    for (i, delay) in policy.schedule().enumerate() {
        println!("  retry {}: after {}", i + 1, humantime::format_duration(delay));
    }
    ExitCode::SUCCESS
}

fn print_response(response: &CalculationResponse) {
    println!(
        "Calculation result (schema {}, {} / {})",
        response.schema_version,
        response.strategy.waveform_strategy,
        response.strategy.transponder_type
    );
    print_direction(&response.results.uplink);
    print_direction(&response.results.downlink);
    if let Some(combined) = &response.results.combined {
        match combined.link_margin_db {
            Some(margin) => println!(
                "  combined: C/N {:.2} dB, C/N0 {:.2} dBHz, margin {:.2} dB",
                combined.cn_db, combined.cn0_dbhz, margin
            ),
            None => println!(
                "  combined: C/N {:.2} dB, C/N0 {:.2} dBHz",
                combined.cn_db, combined.cn0_dbhz
            ),
        }
    }
}

fn print_sweep(response: &SweepResponse) {
    println!(
        "Sweep of {} ({} points)",
        response.sweep_label,
        response.points.len()
    );
    for point in &response.points {
        let margin = point
            .combined_link_margin_db
            .map_or_else(|| "-".to_string(), |m| format!("{:.2} dB", m));
        println!(
            "  {:>12.3}  margin {:>10}  {}{}",
            point.sweep_value,
            margin,
            point.modcod_id.as_deref().unwrap_or("none"),
            if point.viable { "" } else { "  (not viable)" }
        );
    }
    match (response.crossover_value, response.threshold_db) {
        (Some(crossover), Some(threshold)) => {
            println!("  margin crosses {:.1} dB at {:.3}", threshold, crossover)
        }
        (None, Some(threshold)) => println!("  margin never crosses {:.1} dB", threshold),
        _ => {}
    }
}

fn print_direction(result: &DirectionResult) {
    println!(
        "  {}: C/N {:.2} dB, margin {:.2} dB, modcod {}",
        result.direction,
        result.cn_db,
        result.link_margin_db,
        result.modcod_selected.as_deref().unwrap_or("none")
    );
    for warning in result.warnings.iter().flatten() {
        println!("    warning: {}", warning);
    }
}

fn print_violations(errors: &ValidationErrors) {
    eprintln!(
        "{} is invalid ({} violation(s)):",
        errors.schema(),
        errors.len()
    );
    for v in errors.iter() {
        eprintln!("  {}", v);
    }
}
