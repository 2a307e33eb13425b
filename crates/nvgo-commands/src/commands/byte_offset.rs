//! GoByteOffset: echo the byte offset of the cursor.

use crate::outcome::{CommandArgs, Outcome};
use crate::registry::{command_opts, Command};
use crate::session::Session;
use async_trait::async_trait;
use nvgo_core::CoreResult;
use nvgo_rpc::{CommandOpts, Nargs};
use tokio_util::sync::CancellationToken;

pub struct ByteOffsetCommand;

#[async_trait]
impl Command for ByteOffsetCommand {
    fn name(&self) -> &'static str {
        "GoByteOffset"
    }

    fn opts(&self) -> CommandOpts {
        command_opts(Nargs::Zero)
    }

    async fn run(&self, session: &Session, _args: CommandArgs, _cancel: CancellationToken) -> CoreResult<Outcome> {
        let editor = session.editor();
        let window = editor.current_window().await?;
        let offset = editor.byte_offset(window).await?;
        editor.echo(offset.to_string()).await?;
        Ok(Outcome::Success)
    }
}
