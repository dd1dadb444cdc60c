//! Resolve and print the version table

use console::style;

use super::{GlobalArgs, Session};
use crate::display;
use crate::error::Result;

pub async fn run(args: &GlobalArgs) -> Result<()> {
    let session = Session::load(args)?;
    let (table, source) = session.resolve_versions(args.refresh_versions).await?;

    eprintln!(
        "{} {} version(s) for stack {} from {}",
        style("→").blue().bold(),
        table.len(),
        style(session.stack.name()).cyan(),
        source
    );
    display::print_json(&table)
}
