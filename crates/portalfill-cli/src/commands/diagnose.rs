use anyhow::Result;
use comfy_table::{Cell, Table};
use portalfill_core::{AutomationSession, DiagnosedField};

use crate::cli::DiagnoseArgs;
use crate::commands::wait_for_enter;
use crate::output::table::{clip, print_table};
use crate::output::{OutputFormat, json::print_json};

pub async fn run(
    session: &AutomationSession,
    profile: Option<&str>,
    args: DiagnoseArgs,
    format: OutputFormat,
) -> Result<()> {
    if args.wait {
        session.open(profile).await?;
        wait_for_enter("Navigate to the page to inspect, then press Enter.").await?;
    }

    let result = session.diagnose(profile).await;
    session.close().await;
    let fields = result?;

    if format.is_json() {
        return print_json(&fields);
    }

    if fields.is_empty() {
        println!("No visible text fields found.");
        return Ok(());
    }
    print_table(fields_table(&fields))
}

fn fields_table(fields: &[DiagnosedField]) -> Table {
    let mut table = Table::new();
    table.set_header(vec!["Tag", "Type", "Label", "Name", "Id", "Selector"]);

    for field in fields {
        let tag = if field.editable && field.tag != "input" && field.tag != "textarea" {
            format!("{} (editable)", field.tag)
        } else {
            field.tag.clone()
        };
        let label = if field.label.is_empty() {
            field.placeholder.as_str()
        } else {
            field.label.as_str()
        };
        table.add_row(vec![
            Cell::new(tag),
            Cell::new(&field.input_type),
            Cell::new(clip(label, 40)),
            Cell::new(&field.name),
            Cell::new(&field.id),
            Cell::new(clip(&field.selector_hint, 50)),
        ]);
    }
    table
}
