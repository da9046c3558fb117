//! Moving a record between the active and archived sets.
//!
//! The move is read, insert into destination, delete from source. Inserting
//! first means a failure at any step leaves the record in its original set.

use crate::{
    applicant::{self, Row, KEY_COLUMN},
    domain::{Lookup, RecordSet},
    errors::{Error, TransferFailure, TransferStage},
    ports::{ApplicantStore, Columns, Filter},
    Result,
};

/// Move the record matching `lookup` out of `from` into the other set.
/// Returns the moved row.
pub async fn transfer(store: &dyn ApplicantStore, lookup: &Lookup, from: RecordSet) -> Result<Row> {
    let to = from.other();

    let mut rows = store.select(from, &Filter::by(lookup), Columns::All).await?;
    let row = match rows.len() {
        0 => {
            return Err(Error::NotFound(format!(
                "no {} applicant matches {lookup}",
                from.label()
            )))
        }
        1 => rows.remove(0),
        n => {
            return Err(Error::InvalidArgument(format!(
                "{n} {} applicants match {lookup}; use the alias email",
                from.label()
            )))
        }
    };

    let key = applicant::text(&row, KEY_COLUMN)
        .ok_or_else(|| Error::Backend("record without alias_email".to_string()))?;
    let by_key = Filter::all().eq(KEY_COLUMN, key.as_str());

    let failure = |stage, source_intact, reason: String| {
        Error::PartialTransfer(TransferFailure {
            key: key.clone(),
            from,
            to,
            stage,
            source_intact,
            reason,
        })
    };

    let occupied = store
        .select(to, &by_key, Columns::Only(&[KEY_COLUMN]))
        .await?;
    if !occupied.is_empty() {
        tracing::warn!(key = %key, to = to.label(), "transfer refused: destination occupied");
        return Err(failure(
            TransferStage::DestinationOccupied,
            true,
            format!("{key} already exists in the {} set", to.label()),
        ));
    }

    if let Err(e) = store.insert(to, row.clone()).await {
        tracing::warn!(key = %key, to = to.label(), error = %e, "transfer insert failed");
        return Err(failure(TransferStage::Insert, true, e.to_string()));
    }

    match store.delete(from, &by_key).await {
        Ok(0) => {
            tracing::warn!(key = %key, from = from.label(), "source row vanished during transfer");
        }
        Ok(_) => {}
        Err(e) => {
            tracing::error!(key = %key, from = from.label(), error = %e, "transfer delete failed");
            // Undo the copy so the record lives in exactly one set again.
            let source_intact = match store.delete(to, &by_key).await {
                Ok(_) => true,
                Err(rollback) => {
                    tracing::error!(key = %key, error = %rollback, "transfer rollback failed");
                    false
                }
            };
            return Err(failure(TransferStage::Delete, source_intact, e.to_string()));
        }
    }

    tracing::info!(key = %key, from = from.label(), to = to.label(), "record transferred");
    Ok(row)
}
