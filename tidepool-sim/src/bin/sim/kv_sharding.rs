//! Binary target for the sharded key-value simulation.
//!
//! Usage: `kv_sharding [invocations] [replay_seed]`. A replay seed is the
//! "Replay seed" printed by a failing report; it runs as the first
//! invocation.

use std::env;
use std::process;

use tidepool_sim::simulations::{kv_sharding_config, run_kv_sharding};

fn main() {
    tracing_subscriber::fmt::init();

    let mut args = env::args().skip(1);
    let invocations = args.next().and_then(|arg| arg.parse().ok());
    let replay_seed = args.next().and_then(|arg| arg.parse().ok());
    let config = kv_sharding_config(invocations, replay_seed);

    let report = match run_kv_sharding(config, 6) {
        Ok(report) => report,
        Err(error) => {
            eprintln!("ERROR: {error}");
            process::exit(2);
        }
    };

    eprintln!("{report}");
    if !report.is_success() {
        process::exit(1);
    }
}
