// src/main.rs

use anyhow::Context;
use dk::{cli, config, logging, run};

fn main() {
    if let Err(err) = run_main() {
        eprintln!("dk error: {err:?}");
        std::process::exit(1);
    }
}

fn run_main() -> anyhow::Result<()> {
    let args = cli::parse();
    let path = args.config_path();
    let cfg = config::load_and_validate(&path)
        .with_context(|| format!("loading config {}", path.display()))?;
    logging::init_logging(args.log_level, args.verbose, &cfg.log)?;
    run(&args, &cfg, &mut std::io::stdout().lock())
}
