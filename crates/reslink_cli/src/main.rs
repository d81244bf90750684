//! CLI smoke entry point.
//!
//! # Responsibility
//! - Provide a minimal executable to verify `reslink_core` linkage.
//! - With a database path, print per-kind row counts of that store.

use reslink_core::{open_db, ResourceKind, ResourceSession, SessionOptions};
use std::error::Error;
use std::process::ExitCode;

fn main() -> ExitCode {
    println!("reslink_core ping={}", reslink_core::ping());
    println!("reslink_core version={}", reslink_core::core_version());

    let Some(path) = std::env::args().nth(1) else {
        return ExitCode::SUCCESS;
    };
    match print_counts(&path) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("reslink_cli error={err}");
            ExitCode::FAILURE
        }
    }
}

fn print_counts(path: &str) -> Result<(), Box<dyn Error>> {
    let conn = open_db(path)?;
    let mut session = ResourceSession::open(&conn, SessionOptions::default())?;
    for kind in ResourceKind::ALL {
        let rows = session.refresh_all(kind)?;
        println!("{kind} rows={rows}");
    }
    Ok(())
}
