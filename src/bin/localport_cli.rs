//! Entry point for the `localport` control CLI.

use clap::Parser;
use localport::cli::{ClientArgs, ClientCommand};
use localport::control::client;
use localport::control::{default_socket_path, Request, Response};
use std::process::ExitCode;

fn main() -> ExitCode {
    let _ = localport::instrumentation::init_stdout();
    let args = ClientArgs::parse();
    let socket_path = args.socket.unwrap_or_else(default_socket_path);

    let request = match args.command {
        ClientCommand::Start { names } => Request::Start { names },
        ClientCommand::Stop { names } => Request::Stop { names },
        ClientCommand::Status { names } => Request::Status { names },
        ClientCommand::Reload => Request::Reload,
        ClientCommand::DaemonStop => Request::DaemonStop,
        ClientCommand::Logs { name, lines } => Request::Logs { name, lines },
    };

    match client::send(&socket_path, &request) {
        Ok(Response::Ok) => ExitCode::SUCCESS,
        Ok(Response::Status { services }) => {
            print_status(&services);
            ExitCode::SUCCESS
        }
        Ok(Response::Logs { lines }) => {
            for line in lines {
                println!("{line}");
            }
            ExitCode::SUCCESS
        }
        Ok(Response::Error { message }) => {
            eprintln!("error: {message}");
            ExitCode::FAILURE
        }
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn print_status(services: &[localport::control::ServiceStatusDto]) {
    println!("{:<20} {:<10} {:<12} {:<10} {:<8}", "NAME", "PID", "STATE", "HEALTH", "RESTARTS");
    for service in services {
        println!(
            "{:<20} {:<10} {:<12} {:<10} {:<8}",
            service.name, service.pid, service.state, service.health, service.restart_attempt
        );
    }
}
