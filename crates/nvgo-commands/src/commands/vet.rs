//! GoVet: run the static checker over the current package.

use crate::outcome::{diagnostics_or_error, CommandArgs, Outcome};
use crate::registry::{command_opts, Command};
use crate::session::Session;
use async_trait::async_trait;
use nvgo_core::{parse, Config, CoreResult};
use nvgo_rpc::{CommandOpts, Nargs};
use tokio_util::sync::CancellationToken;

pub struct VetCommand;

/// Arguments for `go vet`: configured flags then targets, `.` by default.
pub fn vet_args(flags: &[String], targets: &[String]) -> Vec<String> {
    let mut args = vec!["vet".to_string()];
    args.extend(flags.iter().cloned());
    if targets.is_empty() {
        args.push(".".to_string());
    } else {
        args.extend(targets.iter().cloned());
    }
    args
}

#[async_trait]
impl Command for VetCommand {
    fn name(&self) -> &'static str {
        "GoVet"
    }

    fn producer(&self) -> Option<&'static str> {
        Some("Vet")
    }

    fn opts(&self) -> CommandOpts {
        command_opts(Nargs::Any)
    }

    fn keep_cursor(&self, args: &CommandArgs, _config: &Config) -> bool {
        args.autosave
    }

    async fn run(&self, session: &Session, args: CommandArgs, cancel: CancellationToken) -> CoreResult<Outcome> {
        let state = session.context_for(&args.eval)?;
        let config = session.config();
        let dir = args.eval.dir();
        let opts = session
            .parse_options(&dir, &state, &args.eval)
            .with_ignore(config.vet.ignore.clone());

        let result = session
            .tool("go", &state, &cancel)
            .args(vet_args(&config.vet.flags, &args.args))
            .current_dir(&dir)
            .run()
            .await;

        match result {
            // Older releases report on stderr but exit 0.
            Ok(output) => Ok(Outcome::from_diagnostics(parse(&output.stderr_str(), &opts)?)),
            Err(e) => diagnostics_or_error(e, &opts),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vet_args() {
        assert_eq!(vet_args(&[], &[]), vec!["vet", "."]);
        let flags = vec!["-composites=false".to_string()];
        let targets = vec!["./...".to_string()];
        assert_eq!(vet_args(&flags, &targets), vec!["vet", "-composites=false", "./..."]);
    }
}
