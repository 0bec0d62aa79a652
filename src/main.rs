use std::path::Path;

use bw_tui::app::{self, ExitReason};
use bw_tui::error::StartupError;
use bw_tui::logging;

fn main() {
    let bin_name = executable_name();
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--version" | "-V" => {
                println!("{bin_name} v{}", env!("CARGO_PKG_VERSION"));
                return;
            }
            "--help" | "-h" => {
                print_usage(&bin_name);
                return;
            }
            _ => {}
        }
    }

    if let Err(e) = logging::init() {
        eprintln!("Warning: {e:#}");
    }

    match app::run() {
        Ok(ExitReason::Locked { confirmed: true }) => println!("Vault locked."),
        Ok(ExitReason::Locked { confirmed: false }) => {
            println!("Local session cleared (bw lock reported an error).")
        }
        Ok(ExitReason::Quit | ExitReason::Cancelled) => {}
        Err(e) => {
            tracing::error!("{e:#}");
            if e.downcast_ref::<StartupError>().is_some() {
                eprintln!("{e}");
            } else {
                eprintln!("Error: {e:#}");
            }
            std::process::exit(1);
        }
    }
}

fn print_usage(bin_name: &str) {
    eprintln!("Usage: {bin_name} [OPTIONS]");
    eprintln!("  -h, --help              Show this help and exit");
    eprintln!("  -V, --version           Show version and exit");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  BW_DEBUG=1              Write diagnostic logs to bw-tui.log");
}

fn executable_name() -> String {
    let fallback = "bw-tui".to_string();
    let arg0 = match std::env::args().next() {
        Some(v) => v,
        None => return fallback,
    };
    let path = Path::new(&arg0);
    match path.file_name().and_then(|name| name.to_str()) {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => fallback,
    }
}
