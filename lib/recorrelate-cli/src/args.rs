use std::ffi::OsString;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use recorrelate_core::{CorrelateOptions, CredentialPolicy};

pub(crate) const USAGE: &str = "\
Correlate a Burp Suite history with OpenAPI documents and translate identifiers for replay.

USAGE:
    recorrelate [OPTIONS] --from <DB> --to <DB> --burp <FILE> <OPENAPI>...

OPTIONS:
    --fuzzy <N>        minimum % match in URL to correlate burp <-> openapi paths [default: 100]
    --from <DB>        starting identifier database file name
    --to <DB>          substitution identifier database file name
    --burp <FILE>      burp input file name
    --b64              burp requests/responses are base64-encoded
    -D, --debug        verbose debug output
    --nosub            skip all identifier substitution for replay
    --pathonly         skip identifier substitutions in the headers/body of a request
    --replay           replay all correlated requests with new authorization
    --auth <VALUE>     'Authorization:' header value for replaying
    --cookie <VALUE>   'Cookie:' header value for replaying (optional with --auth)
    --omitauth         omit both 'Authorization:' and 'Cookie:' headers in replay
    --json             only emit JSON of correlated requests
    -h, --help         print this help
";

/// What the command line asks for.
#[derive(Debug)]
pub(crate) enum Invocation {
    Help,
    Run(AppArgs),
}

#[derive(Debug)]
pub(crate) struct AppArgs {
    pub(crate) fuzzy: u32,
    pub(crate) from: PathBuf,
    pub(crate) to: PathBuf,
    pub(crate) burp: PathBuf,
    pub(crate) b64: bool,
    pub(crate) debug: bool,
    pub(crate) no_sub: bool,
    pub(crate) path_only: bool,
    pub(crate) replay: bool,
    pub(crate) auth: Option<String>,
    pub(crate) cookie: Option<String>,
    pub(crate) omit_auth: bool,
    pub(crate) json: bool,
    pub(crate) specs: Vec<PathBuf>,
}

impl Invocation {
    pub(crate) fn from_env() -> Result<Self> {
        Self::parse(pico_args::Arguments::from_env())
    }

    #[cfg(test)]
    fn from_vec(args: &[&str]) -> Result<Self> {
        let args = args.iter().map(OsString::from).collect();
        Self::parse(pico_args::Arguments::from_vec(args))
    }

    fn parse(mut pargs: pico_args::Arguments) -> Result<Self> {
        if pargs.contains(["-h", "--help"]) {
            return Ok(Self::Help);
        }

        let fuzzy = pargs
            .opt_value_from_str("--fuzzy")
            .context("parsing fuzzy argument")?
            .unwrap_or(100);
        let from: Option<PathBuf> = pargs
            .opt_value_from_os_str("--from", to_path)
            .context("parsing from argument")?;
        let to: Option<PathBuf> = pargs
            .opt_value_from_os_str("--to", to_path)
            .context("parsing to argument")?;
        let burp: Option<PathBuf> = pargs
            .opt_value_from_os_str("--burp", to_path)
            .context("parsing burp argument")?;
        let auth = pargs
            .opt_value_from_str("--auth")
            .context("parsing auth argument")?;
        let cookie = pargs
            .opt_value_from_str("--cookie")
            .context("parsing cookie argument")?;

        let b64 = pargs.contains("--b64");
        let debug = pargs.contains(["-D", "--debug"]);
        let no_sub = pargs.contains("--nosub");
        let path_only = pargs.contains("--pathonly");
        let replay = pargs.contains("--replay");
        let omit_auth = pargs.contains("--omitauth");
        let json = pargs.contains("--json");

        let mut specs = Vec::new();
        for arg in pargs.finish() {
            if arg.to_string_lossy().starts_with('-') {
                bail!("unknown argument {arg:?}");
            }
            specs.push(PathBuf::from(arg));
        }

        if specs.is_empty() {
            bail!("must specify at least one openapi file as an argument");
        }

        let args = AppArgs {
            fuzzy,
            from: from.context("must specify a 'from' db file (--from)")?,
            to: to.context("must specify a 'to' db file (--to)")?,
            burp: burp.context("must specify a burp suite history file (--burp)")?,
            b64,
            debug,
            no_sub,
            path_only,
            replay,
            auth,
            cookie,
            omit_auth,
            json,
            specs,
        };
        args.check_credentials()?;

        Ok(Self::Run(args))
    }
}

fn to_path(value: &std::ffi::OsStr) -> Result<PathBuf, std::convert::Infallible> {
    Ok(PathBuf::from(value))
}

impl AppArgs {
    fn check_credentials(&self) -> Result<()> {
        let has_credentials = self.auth.is_some() || self.cookie.is_some();
        if self.omit_auth && has_credentials {
            bail!("--omitauth cannot be combined with --auth or --cookie");
        }
        if self.replay && !has_credentials {
            bail!(
                "if replaying, must specify auth information (--auth and/or --cookie); \
                 replaying with --omitauth is not supported"
            );
        }
        Ok(())
    }

    pub(crate) fn credentials(&self) -> CredentialPolicy {
        CredentialPolicy::from_values(
            self.auth.clone().map(Into::into),
            self.cookie.clone().map(Into::into),
            self.omit_auth,
        )
    }

    pub(crate) fn options(&self) -> CorrelateOptions {
        CorrelateOptions::default()
            .with_fuzzy_threshold(self.fuzzy)
            .with_base64(self.b64)
            .with_skip_substitution(self.no_sub)
            .with_path_only(self.path_only)
            .with_credentials(self.credentials())
    }
}
