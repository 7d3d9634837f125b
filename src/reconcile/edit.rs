//! Edit-table export and diff-and-apply import
//!
//! Round-trip contract: importing an unedited export yields zero changes.
//! The id column is the join key; memo, date and amount columns are
//! display context for the person editing the file.

use std::collections::HashMap;

use csv::{ReaderBuilder, WriterBuilder};

use crate::error::{TallyError, TallyResult};
use crate::models::Transaction;

/// Render transactions as editable CSV rows:
/// `[id, memo, date, amount, ignored, category]`
pub fn edit_csv(transactions: &[Transaction]) -> TallyResult<Vec<u8>> {
    let mut writer = WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());

    for tx in transactions {
        writer.write_record(&tx.edit_row())?;
    }

    writer
        .into_inner()
        .map_err(|e| TallyError::Csv(e.to_string()))
}

/// Parse an edited table and collect the entities whose category or
/// ignored flag differs from the snapshot
///
/// Any row referencing an id absent from the snapshot means the export is
/// stale; the whole batch is rejected with `ImportValidation` before any
/// change is collected for application. Unchanged rows are no-ops.
pub fn parse_edit_csv(
    contents: &[u8],
    snapshot: &[Transaction],
) -> TallyResult<Vec<Transaction>> {
    let by_id: HashMap<String, &Transaction> =
        snapshot.iter().map(|tx| (tx.id(), tx)).collect();

    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(contents);

    let mut changed = Vec::new();
    for record in reader.records() {
        let record = record?;
        if record.len() < 6 {
            return Err(TallyError::Csv(format!(
                "edit row has {} fields, expected 6",
                record.len()
            )));
        }

        let id = record[0].to_string();
        let ignored = &record[4] == "true";
        let category = record[5].to_string();

        let original = by_id
            .get(&id)
            .ok_or(TallyError::ImportValidation { id })?;

        if original.category != category || original.ignored != ignored {
            let mut edited = (*original).clone();
            edited.category = category;
            edited.ignored = ignored;
            changed.push(edited);
        }
    }

    Ok(changed)
}
