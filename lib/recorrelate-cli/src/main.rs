#![allow(missing_docs)]
use std::io::{BufWriter, Write};

use anyhow::{Context, Result};
use recorrelate_core::{ApiSpec, Correlator, IdentifierDatabase, TrafficHistory};
use tracing::{Level, debug};

mod args;

use self::args::{AppArgs, Invocation, USAGE};

fn main() -> Result<()> {
    let args = match Invocation::from_env().context("parsing arguments")? {
        Invocation::Help => {
            std::io::stdout()
                .write_all(USAGE.as_bytes())
                .context("writing usage")?;
            return Ok(());
        }
        Invocation::Run(args) => args,
    };

    let level = if args.debug { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(level)
        .init();

    run(&args)
}

fn run(args: &AppArgs) -> Result<()> {
    let specs = args
        .specs
        .iter()
        .map(|path| {
            ApiSpec::load(path)
                .with_context(|| format!("api parse failed for {:?}", path.display()))
        })
        .collect::<Result<Vec<_>>>()?;
    for spec in &specs {
        debug!(title = spec.title(), paths = spec.paths().len(), "api loaded");
    }

    let history = TrafficHistory::load(&args.burp, args.b64).context("burp parse failed")?;
    let from = IdentifierDatabase::load(&args.from).context("could not read 'from' db file")?;
    let to = IdentifierDatabase::load(&args.to).context("could not read 'to' db file")?;

    let correlation = Correlator::new(args.options())
        .correlate(&specs, &history, &from, &to)
        .context("correlation failed")?;

    if args.json {
        let mut out = BufWriter::new(std::io::stdout().lock());
        correlation
            .write_json(&mut out)
            .context("could not json encode items")?;
        out.flush().context("writing output")?;
    }

    if args.replay {
        correlation.replay().context("replaying correlated requests")?;
    }

    Ok(())
}
