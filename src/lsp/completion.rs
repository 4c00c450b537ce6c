//! Enumeration-style completions straight from the schema cache.
//!
//! Context-aware suggestions (join conditions, aliases, ...) belong to the
//! SQL completion engine. This module only lists what exists: schemas,
//! tables, and the columns of a qualified table.

use tower_lsp::lsp_types::{CompletionItem, CompletionItemKind, Position};

use crate::cache::SchemaCache;

/// Identifier (possibly dotted) that ends at `position`.
pub fn identifier_before(text: &str, position: Position) -> &str {
    let Some(line) = text.lines().nth(position.line as usize) else {
        return "";
    };

    let end = byte_offset(line, position.character);
    let head = &line[..end];

    let start = head
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_alphanumeric() || *c == '_' || *c == '.')
        .last()
        .map(|(i, _)| i)
        .unwrap_or(end);
    &head[start..]
}

/// Byte offset of an LSP `character`, counted in UTF-16 code units, within
/// `line`. Positions past the end clamp to the end.
fn byte_offset(line: &str, character: u32) -> usize {
    let target = character as usize;
    let mut units = 0;
    for (i, c) in line.char_indices() {
        if units >= target {
            return i;
        }
        units += c.len_utf16();
    }
    line.len()
}

/// Completion items for `prefix` against one cache snapshot.
///
/// - `schema.` lists that schema's tables.
/// - `table.` or `schema.table.` lists the table's columns.
/// - Anything else lists schemas, default-schema tables by bare name, and
///   other schemas' tables as `schema.table`.
pub fn complete(cache: &SchemaCache, prefix: &str) -> Vec<CompletionItem> {
    if let Some((qualifier, partial)) = prefix.rsplit_once('.') {
        return complete_qualified(cache, qualifier, partial);
    }

    let mut items = Vec::new();
    for schema in cache.schemas().filter(|s| s.starts_with(prefix)) {
        items.push(item(schema, CompletionItemKind::MODULE, Some("schema".to_string())));
    }

    let default_schema = cache.default_schema();
    for qualified in cache.all_tables() {
        if !qualified.table.starts_with(prefix) && !qualified.schema.starts_with(prefix) {
            continue;
        }
        let label = if qualified.schema == default_schema {
            qualified.table.clone()
        } else {
            qualified.to_string()
        };
        items.push(item(&label, CompletionItemKind::CLASS, Some("table".to_string())));
    }
    items
}

fn complete_qualified(cache: &SchemaCache, qualifier: &str, partial: &str) -> Vec<CompletionItem> {
    let mut items: Vec<CompletionItem> = cache
        .tables(qualifier)
        .filter(|table| table.starts_with(partial))
        .map(|table| item(table, CompletionItemKind::CLASS, Some("table".to_string())))
        .collect();

    if let Some(columns) = cache.columns_of(qualifier) {
        items.extend(
            columns
                .iter()
                .filter(|column| column.name().starts_with(partial))
                .map(|column| {
                    item(
                        column.name(),
                        CompletionItemKind::FIELD,
                        Some(column.one_line()),
                    )
                }),
        );
    }
    items
}

fn item(label: &str, kind: CompletionItemKind, detail: Option<String>) -> CompletionItem {
    CompletionItem {
        label: label.to_string(),
        kind: Some(kind),
        detail,
        ..Default::default()
    }
}
