use std::path::Path;

use snipvault_core::export::{render_export, ExportBundle};
use snipvault_core::util::now_ms;

use crate::cli::ExportFormat;
use crate::commands::common::open_store;
use crate::error::CliError;

pub async fn export_bundle(db_path: &Path) -> Result<ExportBundle, CliError> {
    let store = open_store(db_path).await?;
    let snippets = store.list_snippets(None).await?;
    let knowledge = store.list_knowledge(None).await?;
    Ok(ExportBundle::new(now_ms(), snippets, knowledge))
}

pub async fn run_export(
    format: ExportFormat,
    output_path: Option<&Path>,
    db_path: &Path,
) -> Result<(), CliError> {
    let bundle = export_bundle(db_path).await?;
    let rendered = render_export(&bundle, format.into())?;

    if let Some(path) = output_path {
        std::fs::write(path, rendered)?;
        tracing::info!("Exported {} item(s)", bundle.len());
        println!("{}", path.display());
    } else {
        println!("{rendered}");
    }

    Ok(())
}
