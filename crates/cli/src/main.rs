//! The `hancho` binary: parse flags, load the root manifest, drive the
//! scheduler, print the tally, and exit 0 iff everything passed.

mod cli;
mod logging;

use clap::Parser;
use hancho_core::{BuildContext, BuildOptions, Config, Error, ScriptHost};
use std::sync::Arc;

#[tokio::main]
async fn main() {
    let argv: Vec<String> = std::env::args().collect();
    let (known, extra) = cli::split_extra_flags(argv);
    let args = match cli::Cli::try_parse_from(known) {
        Ok(args) => args,
        Err(err) => err.exit(),
    };
    logging::init(args.verbose, args.debug, args.trace);

    match run(args, extra).await {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("hancho: {err}");
            std::process::exit(-1);
        }
    }
}

async fn run(
    args: cli::Cli,
    extra: Vec<(String, hancho_core::Value)>,
) -> Result<i32, Error> {
    let options = BuildOptions {
        jobs: args.jobs.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        }),
        verbosity: args.verbose,
        quiet: args.quiet,
        dry_run: args.dry_run,
        debug: args.debug,
        force: args.force,
        trace: args.trace,
        shuffle: args.shuffle,
        use_color: args.use_color,
        root_dir: args.root_dir.clone(),
        ..BuildOptions::default()
    };
    let ctx: Arc<BuildContext> = BuildContext::new(options);

    // Unrecognized --key=value flags become global config fields.
    if !extra.is_empty() {
        let mut root = (*ctx.root_config()).clone();
        let mut overlay = Config::new();
        for (key, value) in extra {
            overlay.set(key, value);
        }
        root.merge_from(&overlay);
        ctx.set_root_config(root);
    }

    let host = ScriptHost::new(ctx.clone());
    host.load_root(&args.root_file)?;

    let queued = host.queue_targets(args.target.as_deref())?;
    tracing::info!(queued, "tasks queued");

    let summary = ctx.drive().await?;
    ctx.report_summary(&summary);
    Ok(summary.exit_code())
}
