use console::style;
use forgefeed::CheckpointedConnector;

use super::shared::{self, CommandResult};
use crate::ConnectionArgs;
use crate::config::Config;

pub(crate) async fn handle_validate(args: &ConnectionArgs, config: &Config) -> CommandResult {
    let connector = shared::build_connector(args, config)?;

    match connector.validate_connector_settings().await {
        Ok(()) => {
            println!(
                "{} Settings for {} are valid",
                style("✓").green(),
                connector.config().repo_owner
            );
            Ok(())
        }
        Err(e) => {
            eprintln!("{} {}: {}", style("✗").red(), style(e.category()).bold(), e);
            Err(e.into())
        }
    }
}
