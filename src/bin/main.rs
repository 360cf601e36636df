use std::{
    io::{self, IsTerminal},
    process::ExitCode,
};
use tracing::error;
use tracing_subscriber::EnvFilter;

use botkeeper::{
    cli::{Cli, Commands, parse_args, usage_summary},
    config::{BotConfig, load_config},
    control::{
        CleanReport, DetachedLauncher, LogReport, Manager, RestartReport, StartReport,
        StopReport,
    },
    error::ControlError,
    logs::format_size,
    process::SystemProcessTable,
    status::{GREEN_BOLD, RED_BOLD, YELLOW_BOLD, paint},
    supervisor::run_supervisor,
};

fn main() -> ExitCode {
    let args = parse_args();
    init_logging(&args);

    let config = load_config(&args.config);

    let command = match args.command {
        Some(Commands::Unknown(words)) => {
            let name = words.first().cloned().unwrap_or_default();
            eprintln!(
                "{}",
                paint(&ControlError::UnknownCommand(name).to_string(), RED_BOLD, color())
            );
            print!("{}", usage_summary(&args.config, config.as_ref().map_err(|e| e.to_string())));
            return ExitCode::FAILURE;
        }
        Some(command) => command,
        None => {
            print!("{}", usage_summary(&args.config, config.as_ref().map_err(|e| e.to_string())));
            return ExitCode::FAILURE;
        }
    };

    let config = match config {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{}", paint(&err.to_string(), RED_BOLD, color()));
            return ExitCode::FAILURE;
        }
    };

    if command == Commands::Supervise {
        return match run_supervisor(&config) {
            Ok(()) => ExitCode::SUCCESS,
            Err(err) => {
                error!("Supervisor exited with error: {err}");
                ExitCode::FAILURE
            }
        };
    }

    let log_level = args.log_level.map(|level| level.as_str());
    let launcher = match DetachedLauncher::for_config(&config, log_level) {
        Ok(launcher) => launcher,
        Err(err) => {
            eprintln!("{}", paint(&ControlError::LaunchError(err).to_string(), RED_BOLD, color()));
            return ExitCode::FAILURE;
        }
    };
    let manager = Manager::new(config, SystemProcessTable::new(), launcher);

    match command {
        Commands::Start => print_start(manager.config(), manager.start()),
        Commands::Stop => print_stop(manager.stop()),
        Commands::Restart => print_restart(manager.config(), manager.restart()),
        Commands::Status { json, no_color } => {
            let report = manager.status();
            if json {
                match serde_json::to_string_pretty(&report) {
                    Ok(json) => println!("{json}"),
                    Err(err) => print_failure(&err.to_string()),
                }
            } else {
                print!("{}", report.render(!no_color && color()));
            }
        }
        Commands::Log { lines } => print_log(manager.log(lines)),
        Commands::Clean => print_clean(manager.clean()),
        Commands::Supervise | Commands::Unknown(_) => {}
    }

    ExitCode::SUCCESS
}

fn init_logging(args: &Cli) {
    let supervising = args.command == Some(Commands::Supervise);
    let default_level = if supervising { "info" } else { "warn" };
    let filter = if let Some(level) = args.log_level {
        EnvFilter::new(level.as_str())
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_ansi(!supervising && io::stderr().is_terminal())
        .try_init();
}

fn color() -> bool {
    io::stdout().is_terminal()
}

fn print_success(message: &str) {
    println!("{}", paint(&format!("✓ {message}"), GREEN_BOLD, color()));
}

fn print_notice(message: &str) {
    println!("{}", paint(&format!("! {message}"), YELLOW_BOLD, color()));
}

fn print_failure(message: &str) {
    println!("{}", paint(&format!("✗ {message}"), RED_BOLD, color()));
}

fn print_start(config: &BotConfig, result: Result<StartReport, ControlError>) {
    match result {
        Ok(report) => {
            if let Some(stale) = report.replaced_stale {
                print_notice(&format!("Removed stale PID record for {stale}"));
            }
            print_success(&format!("Supervisor started (PID {})", report.pid));
            println!("  Log file: {}", config.log_file.display());
        }
        Err(err) => print_failure(&err.to_string()),
    }
}

fn print_stop(result: Result<StopReport, ControlError>) {
    let report = match result {
        Ok(report) => report,
        Err(err) => return print_failure(&err.to_string()),
    };

    if let Some(pid) = report.stale_record {
        print_notice(&format!("Removed stale PID record for {pid}"));
    }
    if let Some(pid) = report.supervisor {
        let how = if report.supervisor_forced { "killed" } else { "stopped" };
        print_success(&format!("Supervisor {how} (PID {pid})"));
    }
    if !report.targets.is_empty() {
        print_success(&format!("Bot processes stopped: {:?}", report.targets));
    }
    if !report.forced_targets.is_empty() {
        print_notice(&format!("Force-killed: {:?}", report.forced_targets));
    }
    if !report.stray_supervisors.is_empty() {
        print_success(&format!(
            "Stray supervisor processes stopped: {:?}",
            report.stray_supervisors
        ));
    }
    for err in &report.record_errors {
        print_failure(err);
    }
    if !report.stopped_anything() {
        print_notice("No processes found");
    }
}

fn print_restart(config: &BotConfig, result: Result<RestartReport, ControlError>) {
    match result {
        Ok(report) => {
            print_stop(Ok(report.stop));
            print_start(config, report.start);
        }
        Err(err) => print_failure(&err.to_string()),
    }
}

fn print_log(result: Result<LogReport, ControlError>) {
    match result {
        Ok(report) => {
            println!("==> {} <==", report.path.display());
            let width = report
                .lines
                .last()
                .map(|line| line.number.to_string().len())
                .unwrap_or(1);
            for line in &report.lines {
                println!("{:>width$}  {}", line.number, line.text);
            }
            println!("Total lines: {}", report.total_lines);
        }
        Err(err) => print_failure(&err.to_string()),
    }
}

fn print_clean(result: Result<CleanReport, ControlError>) {
    let report = match result {
        Ok(report) => report,
        Err(err) => return print_failure(&err.to_string()),
    };

    match report.previous_size {
        Some(size) => print_success(&format!(
            "Cleared {} (was {})",
            report.path.display(),
            format_size(size)
        )),
        None => print_failure(&ControlError::LogFileMissing(report.path).to_string()),
    }

    if !report.other_logs.is_empty() {
        println!("Other log files (left untouched):");
        for (path, size) in &report.other_logs {
            println!("  {} ({})", path.display(), format_size(*size));
        }
    }
}
