//! Emergency backup command

use anyhow::Result;
use clap::Args;
use creel_backup::BackupRequest;

use super::Globals;
use crate::output;

#[derive(Args, Debug)]
pub struct EmergencyArgs {
    /// Why the backup is taken (stored in the document and its name)
    #[arg(trailing_var_arg = true)]
    pub reason: Vec<String>,
}

impl EmergencyArgs {
    pub fn reason(&self) -> Option<String> {
        let reason = self.reason.join(" ");
        let reason = reason.trim();
        (!reason.is_empty()).then(|| reason.to_string())
    }
}

pub async fn run(args: EmergencyArgs, globals: &Globals<'_>) -> Result<()> {
    let reason = args.reason();
    if reason.is_none() {
        output::info("No reason given, recording the backup as urgent");
    }
    super::backup::produce(BackupRequest::emergency(reason), globals).await
}
