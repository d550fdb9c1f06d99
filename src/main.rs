use std::process;

use log::{error, info};

use numpool::app::{self, init_logging};
use numpool::config;

fn main() {
    let args = app::parse();

    // A tokio runtime isn't up yet; run config loading on a throwaway
    // single-threaded one, matching the teacher's split between config
    // load (sync-looking CLI path) and the real multi-threaded server runtime.
    let config_runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("failed to build startup runtime");

    if let Err(e) = config_runtime.block_on(config::parse(&args.config_file)) {
        eprintln!("failed to load configuration from {}: {e}", args.config_file);
        process::exit(1);
    }
    drop(config_runtime);

    let config = config::get_config();

    if let Err(e) = init_logging(&args, &config) {
        eprintln!("failed to initialize logging: {e}");
        process::exit(1);
    }

    if args.test_config {
        info!("configuration file {} is valid", args.config_file);
        process::exit(0);
    }

    if let Err(e) = app::run_server(args, config) {
        error!("server exited with error: {e}");
        process::exit(1);
    }
}
