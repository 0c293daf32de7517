use std::path::Path;

use snipvault_core::capture::CaptureService;
use snipvault_core::models::EntityKind;

use crate::commands::common::{open_store, report_capture, resolve_item_id};
use crate::error::CliError;

pub async fn run_delete(kind: EntityKind, id: &str, db_path: &Path) -> Result<(), CliError> {
    let store = open_store(db_path).await?;
    let id = resolve_item_id(&store, kind, id).await?;

    let result = CaptureService::new(store).delete(kind, &id).await;
    report_capture(&result, false)
}
