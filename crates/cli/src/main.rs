//! Gateway CLI for configuration checks and offline request signing.
//!
//! This tool provides commands for:
//! - Validating configuration files and printing derived certificate serials
//! - Computing certificate and root certificate serials
//! - Building signed page-mode URLs/forms and SDK strings
//! - Verifying asynchronous notification signatures

use clap::{Parser, Subcommand};
use log::LevelFilter;
use std::path::PathBuf;

mod cert;
mod config;
mod error;
mod notify;
mod sign;

use alipay_gateway_common::logging::init_logging;
use error::CliError;
use sign::SignArgs;

#[derive(Parser)]
#[command(name = "apgw")]
#[command(about = "Gateway CLI for config checks and request signing")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Certificate utilities
    Cert {
        #[command(subcommand)]
        action: CertAction,
    },

    /// Build a signed page-mode request (auto-submit form, or URL with --get)
    Page {
        /// Path to the TOML configuration file
        #[arg(long, short, env = "APGW_CONFIG")]
        file: PathBuf,

        #[command(flatten)]
        request: RequestArgs,

        /// Return URL for the browser after payment
        #[arg(long)]
        return_url: Option<String>,

        /// Emit a redirect URL instead of a form
        #[arg(long)]
        get: bool,
    },

    /// Build a signed SDK string
    Sdk {
        /// Path to the TOML configuration file
        #[arg(long, short, env = "APGW_CONFIG")]
        file: PathBuf,

        #[command(flatten)]
        request: RequestArgs,
    },

    /// Notification utilities
    Notify {
        #[command(subcommand)]
        action: NotifyAction,
    },
}

#[derive(clap::Args)]
struct RequestArgs {
    /// Gateway API name, e.g. alipay.trade.page.pay
    #[arg(long, short)]
    method: String,

    /// Business model as JSON
    #[arg(long, short)]
    biz: String,

    /// Asynchronous notification URL
    #[arg(long)]
    notify_url: Option<String>,

    /// Token for calls made on behalf of another merchant
    #[arg(long)]
    app_auth_token: Option<String>,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Validate config and print derived certificate serials
    Validate {
        /// Path to the TOML configuration file
        #[arg(long, short, env = "APGW_CONFIG")]
        file: PathBuf,
    },
}

#[derive(Subcommand)]
enum CertAction {
    /// Print the gateway serial of a PEM certificate
    Sn {
        /// Path to the PEM file
        #[arg(long, short)]
        file: PathBuf,

        /// Treat the file as a root bundle
        #[arg(long)]
        root: bool,
    },
}

#[derive(Subcommand)]
enum NotifyAction {
    /// Verify a notification's signature
    Verify {
        /// Path to the TOML configuration file
        #[arg(long, short, env = "APGW_CONFIG")]
        file: PathBuf,

        /// Notification parameters as a URL-encoded query string
        #[arg(long, short)]
        params: String,
    },
}

impl RequestArgs {
    fn into_sign_args(self, return_url: Option<String>) -> SignArgs {
        SignArgs {
            method: self.method,
            biz: self.biz,
            notify_url: self.notify_url,
            return_url,
            app_auth_token: self.app_auth_token,
        }
    }
}

fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    };
    if let Err(e) = init_logging(level) {
        eprintln!("Failed to initialize logging: {}", e);
    }

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Commands::Config { action } => match action {
            ConfigAction::Validate { file } => config::validate(&file, cli.verbose),
        },
        Commands::Cert { action } => match action {
            CertAction::Sn { file, root } => cert::print_serial(&file, root, cli.verbose),
        },
        Commands::Page {
            file,
            request,
            return_url,
            get,
        } => sign::page(&file, &request.into_sign_args(return_url), get, cli.verbose),
        Commands::Sdk { file, request } => {
            sign::sdk(&file, &request.into_sign_args(None), cli.verbose)
        }
        Commands::Notify { action } => match action {
            NotifyAction::Verify { file, params } => notify::verify(&file, &params, cli.verbose),
        },
    }
}
