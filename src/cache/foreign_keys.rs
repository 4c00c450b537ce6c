//! Foreign-key grouping.
//!
//! Introspection queries report foreign keys as flat rows, one per column
//! pair. This module folds them back into composite relations with a single
//! streaming pass: a new relation starts whenever the (constraint, table)
//! pair changes from the previous row. Rows of one constraint must therefore
//! arrive contiguously; the query is responsible for that ordering. A pair
//! that reappears after a different one is not merged with its earlier run.

use std::convert::Infallible;

use crate::repository::{ColumnIdentity, ColumnPair, ForeignKeyRelation, ForeignKeyRow};

/// Group pre-ordered rows into relations.
///
/// `schema` is the schema being described. It is the local side of every
/// pair, and the referenced side when a row carries no referenced schema.
pub fn group_foreign_keys<I>(rows: I, schema: &str) -> Vec<ForeignKeyRelation>
where
    I: IntoIterator<Item = ForeignKeyRow>,
{
    match try_group_foreign_keys(rows.into_iter().map(Ok::<_, Infallible>), schema) {
        Ok(relations) => relations,
        Err(never) => match never {},
    }
}

/// Group rows from a fallible cursor, stopping at the first error.
pub fn try_group_foreign_keys<I, E>(rows: I, schema: &str) -> Result<Vec<ForeignKeyRelation>, E>
where
    I: IntoIterator<Item = Result<ForeignKeyRow, E>>,
{
    let mut relations = Vec::new();
    let mut current: Option<ForeignKeyRelation> = None;
    let mut previous: Option<(String, String)> = None;

    for row in rows {
        let row = row?;

        let same_run = previous
            .as_ref()
            .is_some_and(|(constraint, table)| *constraint == row.constraint && *table == row.table);

        let referenced_schema = row.referenced_schema.as_deref().unwrap_or(schema);
        let pair = ColumnPair {
            local: ColumnIdentity::new(schema, row.table.as_str(), row.column),
            referenced: ColumnIdentity::new(
                referenced_schema,
                row.referenced_table,
                row.referenced_column,
            ),
        };

        match current.as_mut() {
            Some(relation) if same_run => relation.push(pair),
            _ => {
                if let Some(done) = current.replace(ForeignKeyRelation::new(pair)) {
                    relations.push(done);
                }
            }
        }

        previous = Some((row.constraint, row.table));
    }

    if let Some(done) = current {
        relations.push(done);
    }
    Ok(relations)
}
