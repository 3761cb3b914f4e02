//! XLSX sheet extraction.
//!
//! Each worksheet becomes one text block:
//!
//! ```text
//! Sheet: Ledger
//! Date,Amount
//! 2024-07-01,150
//! ```
//!
//! Blocks are separated by a blank line so every sheet is its own paragraph
//! for the chunker. Cell positions come from the `r` attribute (`B7`), so
//! sparse rows keep their column alignment. Rows are held sparsely and only
//! padded when rendered; a sheet's rendered text is capped at
//! [`XLSX_MAX_SHEET_TEXT_BYTES`] (or `max_entry_bytes`, if smaller).

use std::collections::{BTreeMap, HashMap};

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use tracing::{debug, warn};

use crate::container::{list_entries, read_named, ContainerEntry};
use crate::error::Result;

/// Maximum sheets to process.
const XLSX_MAX_SHEETS: usize = 100;
/// Maximum cells to process per sheet.
const XLSX_MAX_CELLS_PER_SHEET: usize = 100_000;
/// Last column Excel can address (`XFD`).
const MAX_COLUMNS: usize = 16_384;
/// Upper bound on the rendered text of one sheet.
pub const XLSX_MAX_SHEET_TEXT_BYTES: usize = 1024 * 1024;

const CELL_DELIMITER: &str = ",";
const SHARED_STRINGS_ENTRY: &str = "xl/sharedStrings.xml";
const WORKBOOK_ENTRY: &str = "xl/workbook.xml";
const WORKBOOK_RELS_ENTRY: &str = "xl/_rels/workbook.xml.rels";
const WORKSHEET_PREFIX: &str = "xl/worksheets/sheet";

/// A worksheet name and the container entry holding its cells.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetRef {
    pub name: String,
    pub path: String,
}

/// Extract every worksheet as delimited text.
pub fn extract_sheets(bytes: &[u8], max_entry_bytes: u64) -> Result<String> {
    let entries = list_entries(bytes)?;
    let shared = match read_named(bytes, &entries, SHARED_STRINGS_ENTRY, max_entry_bytes) {
        Ok(Some(xml)) => parse_shared_strings(&xml),
        Ok(None) => Vec::new(),
        Err(e) => {
            warn!(error = %e, "unreadable shared-string table");
            Vec::new()
        }
    };

    let mut sheets = sheets_from_manifest(bytes, &entries, max_entry_bytes);
    if sheets.is_empty() {
        debug!("workbook manifest missing or empty; discovering worksheets by name");
        sheets = discover_sheets(&entries);
    }

    let text_budget = usize::try_from(max_entry_bytes)
        .unwrap_or(usize::MAX)
        .min(XLSX_MAX_SHEET_TEXT_BYTES);
    let mut blocks = Vec::new();
    for sheet in sheets.into_iter().take(XLSX_MAX_SHEETS) {
        let xml = match read_named(bytes, &entries, &sheet.path, max_entry_bytes) {
            Ok(Some(xml)) => xml,
            Ok(None) => {
                warn!(sheet = %sheet.name, path = %sheet.path, "worksheet entry missing");
                continue;
            }
            Err(e) => {
                warn!(sheet = %sheet.name, error = %e, "skipping unreadable worksheet");
                continue;
            }
        };
        let rows = parse_sheet_rows(&xml, &shared);
        blocks.push(render_sheet(&sheet.name, &rows, text_budget));
    }
    Ok(blocks.join("\n\n"))
}

/// Render one sheet block, dropping the rows that would exceed `budget` bytes.
fn render_sheet(name: &str, rows: &[SparseRow], budget: usize) -> String {
    let mut block = format!("Sheet: {}", name);
    for (index, row) in rows.iter().enumerate() {
        let line = expand_row(row).join(CELL_DELIMITER);
        if block.len() + 1 + line.len() > budget {
            warn!(
                sheet = name,
                kept = index,
                total = rows.len(),
                budget,
                "sheet text limit reached; truncating"
            );
            break;
        }
        block.push('\n');
        block.push_str(&line);
    }
    block
}

/// Convert a column label (`A`, `Z`, `AA`) to a zero-based index.
///
/// Digits are base 26 with `A = 1 .. Z = 26`. Any trailing row number is
/// ignored, so `"AB12"` resolves like `"AB"`.
pub fn column_index(label: &str) -> Option<usize> {
    let mut acc: usize = 0;
    let mut seen = false;
    for c in label.chars() {
        if !c.is_ascii_alphabetic() {
            break;
        }
        let digit = (c.to_ascii_uppercase() as u8 - b'A') as usize + 1;
        acc = acc.checked_mul(26)?.checked_add(digit)?;
        seen = true;
    }
    if seen {
        Some(acc - 1)
    } else {
        None
    }
}

fn attr(e: &BytesStart<'_>, key: &[u8]) -> Option<String> {
    e.attributes().flatten().find_map(|a| {
        if a.key.local_name().as_ref() == key || a.key.as_ref() == key {
            a.unescape_value().ok().map(|v| v.into_owned())
        } else {
            None
        }
    })
}

/// Parse `sharedStrings.xml`. Rich-text runs of one `<si>` are concatenated.
pub(crate) fn parse_shared_strings(xml: &[u8]) -> Vec<String> {
    let mut strings = Vec::new();
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut current: Option<String> = None;
    let mut in_t = false;
    let mut in_phonetic = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"si" => current = Some(String::new()),
                b"rPh" => in_phonetic = true,
                b"t" => in_t = !in_phonetic,
                _ => {}
            },
            Ok(Event::Empty(e)) if e.local_name().as_ref() == b"si" => {
                strings.push(String::new());
            }
            Ok(Event::Text(te)) if in_t => {
                if let (Some(s), Ok(text)) = (current.as_mut(), te.unescape()) {
                    s.push_str(&text);
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"si" => strings.push(current.take().unwrap_or_default()),
                b"rPh" => in_phonetic = false,
                b"t" => in_t = false,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => {
                warn!(error = %e, "malformed shared-string table; keeping {} strings", strings.len());
                break;
            }
            _ => {}
        }
        buf.clear();
    }
    strings
}

/// Resolve sheet names to worksheet paths through `workbook.xml` and its
/// relationships part. Returns an empty list when either is unusable.
fn sheets_from_manifest(bytes: &[u8], entries: &[ContainerEntry], max: u64) -> Vec<SheetRef> {
    let (Ok(Some(workbook)), Ok(Some(rels))) = (
        read_named(bytes, entries, WORKBOOK_ENTRY, max),
        read_named(bytes, entries, WORKBOOK_RELS_ENTRY, max),
    ) else {
        return Vec::new();
    };
    let targets = parse_relationships(&rels);
    parse_workbook_sheets(&workbook)
        .into_iter()
        .filter_map(|(name, rel_id)| {
            let target = targets.get(&rel_id)?;
            Some(SheetRef {
                name,
                path: resolve_target(target),
            })
        })
        .collect()
}

/// `(sheet name, relationship id)` pairs in workbook order.
fn parse_workbook_sheets(xml: &[u8]) -> Vec<(String, String)> {
    let mut sheets = Vec::new();
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) if e.local_name().as_ref() == b"sheet" => {
                if let (Some(name), Some(id)) = (attr(&e, b"name"), attr(&e, b"id")) {
                    sheets.push((name, id));
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                warn!(error = %e, "malformed workbook manifest");
                return Vec::new();
            }
            _ => {}
        }
        buf.clear();
    }
    sheets
}

fn parse_relationships(xml: &[u8]) -> HashMap<String, String> {
    let mut map = HashMap::new();
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e))
                if e.local_name().as_ref() == b"Relationship" =>
            {
                if let (Some(id), Some(target)) = (attr(&e, b"Id"), attr(&e, b"Target")) {
                    map.insert(id, target);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                warn!(error = %e, "malformed workbook relationships");
                return HashMap::new();
            }
            _ => {}
        }
        buf.clear();
    }
    map
}

/// Relationship targets are relative to `xl/` unless absolute.
fn resolve_target(target: &str) -> String {
    match target.strip_prefix('/') {
        Some(absolute) => absolute.to_string(),
        None => format!("xl/{}", target.trim_start_matches("./")),
    }
}

/// Fallback: every `xl/worksheets/sheetN.xml`, ordered by `N`.
fn discover_sheets(entries: &[ContainerEntry]) -> Vec<SheetRef> {
    let mut found: Vec<(u32, &str)> = entries
        .iter()
        .filter_map(|e| {
            let n = e
                .name
                .strip_prefix(WORKSHEET_PREFIX)?
                .strip_suffix(".xml")?
                .parse::<u32>()
                .ok()?;
            Some((n, e.name.as_str()))
        })
        .collect();
    found.sort_by_key(|(n, _)| *n);
    found
        .into_iter()
        .map(|(n, path)| SheetRef {
            name: format!("Sheet{}", n),
            path: path.to_string(),
        })
        .collect()
}

#[derive(Default)]
struct CellState {
    column: usize,
    kind: Option<String>,
    value: Option<String>,
    inline: Option<String>,
}

impl CellState {
    fn resolve(self, shared: &[String]) -> String {
        match self.kind.as_deref() {
            Some("s") => self
                .value
                .as_deref()
                .and_then(|v| v.trim().parse::<usize>().ok())
                .and_then(|i| shared.get(i).cloned())
                .unwrap_or_default(),
            _ => self.inline.or(self.value).unwrap_or_default(),
        }
    }
}

#[derive(Clone, Copy, PartialEq)]
enum TextTarget {
    None,
    Value,
    Inline,
}

/// Non-empty cells of one row keyed by column index.
pub(crate) type SparseRow = BTreeMap<usize, String>;

fn place(row: &mut SparseRow, state: CellState, shared: &[String]) {
    if state.column >= MAX_COLUMNS {
        return;
    }
    let column = state.column;
    let value = state.resolve(shared);
    if value.is_empty() {
        row.remove(&column);
    } else {
        row.insert(column, value);
    }
}

/// Pad a sparse row out to its last non-empty column.
pub(crate) fn expand_row(row: &SparseRow) -> Vec<String> {
    let width = row.keys().next_back().map_or(0, |last| last + 1);
    let mut cells = vec![String::new(); width];
    for (&column, value) in row {
        cells[column] = value.clone();
    }
    cells
}

/// Parse `<row>`/`<c>` elements into sparse rows. Rows without any
/// non-empty cell are dropped.
pub(crate) fn parse_sheet_rows(xml: &[u8], shared: &[String]) -> Vec<SparseRow> {
    let mut rows: Vec<SparseRow> = Vec::new();
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut row: Option<SparseRow> = None;
    let mut cell: Option<CellState> = None;
    let mut next_column = 0usize;
    let mut target = TextTarget::None;
    let mut in_inline = false;
    let mut cells_seen = 0usize;

    loop {
        if cells_seen >= XLSX_MAX_CELLS_PER_SHEET {
            warn!("worksheet cell limit reached ({})", XLSX_MAX_CELLS_PER_SHEET);
            break;
        }
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"row" => {
                    row = Some(SparseRow::new());
                    next_column = 0;
                }
                b"c" => {
                    let column = attr(&e, b"r")
                        .and_then(|r| column_index(&r))
                        .unwrap_or(next_column);
                    cell = Some(CellState {
                        column,
                        kind: attr(&e, b"t"),
                        ..CellState::default()
                    });
                }
                b"v" => target = TextTarget::Value,
                b"is" => in_inline = true,
                b"t" if in_inline => target = TextTarget::Inline,
                _ => {}
            },
            Ok(Event::Empty(e)) if e.local_name().as_ref() == b"c" => {
                let column = attr(&e, b"r")
                    .and_then(|r| column_index(&r))
                    .unwrap_or(next_column);
                if let Some(r) = row.as_mut() {
                    place(r, CellState { column, ..CellState::default() }, shared);
                }
                next_column = column + 1;
                cells_seen += 1;
            }
            Ok(Event::Text(te)) if target != TextTarget::None => {
                if let (Some(c), Ok(text)) = (cell.as_mut(), te.unescape()) {
                    let slot = match target {
                        TextTarget::Value => &mut c.value,
                        _ => &mut c.inline,
                    };
                    slot.get_or_insert_with(String::new).push_str(&text);
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"v" | b"t" => target = TextTarget::None,
                b"is" => in_inline = false,
                b"c" => {
                    if let Some(state) = cell.take() {
                        next_column = state.column + 1;
                        if let Some(r) = row.as_mut() {
                            place(r, state, shared);
                        }
                        cells_seen += 1;
                    }
                }
                b"row" => {
                    if let Some(r) = row.take() {
                        if !r.is_empty() {
                            rows.push(r);
                        }
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => {
                warn!(error = %e, "malformed worksheet; keeping {} rows", rows.len());
                break;
            }
            _ => {}
        }
        buf.clear();
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::testutil::{build_zip, build_zip_raw};
    use crate::container::DEFAULT_MAX_ENTRY_BYTES;

    const SHARED: &str = r#"<sst xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" count="2" uniqueCount="2"><si><t>Date</t></si><si><t>Amount</t></si></sst>"#;

    const SHEET1: &str = r#"<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData><row r="1"><c r="A1" t="s"><v>0</v></c><c r="B1" t="n"><v>150</v></c></row></sheetData></worksheet>"#;

    const WORKBOOK: &str = r#"<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets><sheet name="Ledger" sheetId="1" r:id="rId1"/></sheets></workbook>"#;

    const RELS: &str = r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/></Relationships>"#;

    #[test]
    fn column_labels_decode_base_26() {
        assert_eq!(column_index("A"), Some(0));
        assert_eq!(column_index("Z"), Some(25));
        assert_eq!(column_index("AA"), Some(26));
        assert_eq!(column_index("AB12"), Some(27));
        assert_eq!(column_index("XFD"), Some(16_383));
        assert_eq!(column_index("12"), None);
        assert_eq!(column_index(""), None);
    }

    #[test]
    fn single_sheet_with_shared_strings() {
        let zip = build_zip(&[
            ("xl/workbook.xml", WORKBOOK.as_bytes(), true),
            ("xl/_rels/workbook.xml.rels", RELS.as_bytes(), true),
            ("xl/sharedStrings.xml", SHARED.as_bytes(), true),
            ("xl/worksheets/sheet1.xml", SHEET1.as_bytes(), true),
        ]);
        let text = extract_sheets(&zip, DEFAULT_MAX_ENTRY_BYTES).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("Sheet: Ledger"));
        assert_eq!(lines.next(), Some("Date,150"));
    }

    #[test]
    fn falls_back_to_discovered_worksheets() {
        let sheet2 = r#"<worksheet><sheetData><row><c t="inlineStr"><is><t>second</t></is></c></row></sheetData></worksheet>"#;
        let zip = build_zip(&[
            ("xl/worksheets/sheet10.xml", sheet2.as_bytes(), false),
            ("xl/worksheets/sheet1.xml", SHEET1.as_bytes(), false),
        ]);
        let text = extract_sheets(&zip, DEFAULT_MAX_ENTRY_BYTES).unwrap();
        let blocks: Vec<&str> = text.split("\n\n").collect();
        assert_eq!(blocks.len(), 2);
        // No shared-string table: the reference cannot resolve.
        assert_eq!(blocks[0], "Sheet: Sheet1\n,150");
        assert_eq!(blocks[1], "Sheet: Sheet10\nsecond");
    }

    #[test]
    fn sparse_rows_keep_alignment() {
        let xml = r#"<worksheet><sheetData><row r="1"><c r="A1" t="str"><v>name</v></c><c r="D1"><v>4</v></c><c r="F1"/></row><row r="2"><c r="C2" t="b"><v>1</v></c></row></sheetData></worksheet>"#;
        let rows = parse_sheet_rows(xml.as_bytes(), &[]);
        assert_eq!(expand_row(&rows[0]), vec!["name", "", "", "4"]);
        assert_eq!(expand_row(&rows[1]), vec!["", "", "1"]);
    }

    #[test]
    fn cells_without_reference_follow_previous_column() {
        let xml = r#"<worksheet><sheetData><row><c r="B1"><v>x</v></c><c><v>y</v></c></row></sheetData></worksheet>"#;
        let rows = parse_sheet_rows(xml.as_bytes(), &[]);
        assert_eq!(expand_row(&rows[0]), vec!["", "x", "y"]);
    }

    #[test]
    fn rich_text_shared_strings_are_joined() {
        let xml = r#"<sst><si><r><t>Net </t></r><r><t>profit</t></r></si><si/><si><t>A&amp;B</t><rPh><t>ignored</t></rPh></si></sst>"#;
        let strings = parse_shared_strings(xml.as_bytes());
        assert_eq!(strings, vec!["Net profit", "", "A&B"]);
    }

    #[test]
    fn out_of_range_shared_reference_is_empty() {
        let xml = r#"<worksheet><sheetData><row><c r="A1" t="s"><v>7</v></c><c r="B1"><v>2</v></c></row></sheetData></worksheet>"#;
        let rows = parse_sheet_rows(xml.as_bytes(), &["only".to_string()]);
        assert_eq!(expand_row(&rows[0]), vec!["", "2"]);
    }

    #[test]
    fn unreadable_worksheet_is_skipped() {
        let zip = build_zip(&[
            ("xl/workbook.xml", WORKBOOK.as_bytes(), false),
            ("xl/_rels/workbook.xml.rels", RELS.as_bytes(), false),
        ]);
        assert_eq!(extract_sheets(&zip, DEFAULT_MAX_ENTRY_BYTES).unwrap(), "");
    }

    const TWO_SHEET_WORKBOOK: &str = r#"<workbook xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets><sheet name="Ledger" sheetId="1" r:id="rId1"/><sheet name="Broken" sheetId="2" r:id="rId2"/><sheet name="Corrupt" sheetId="3" r:id="rId3"/></sheets></workbook>"#;

    const TWO_SHEET_RELS: &str = r#"<Relationships><Relationship Id="rId1" Target="worksheets/sheet1.xml"/><Relationship Id="rId2" Target="worksheets/sheet2.xml"/><Relationship Id="rId3" Target="worksheets/sheet3.xml"/></Relationships>"#;

    #[test]
    fn failing_worksheet_does_not_hide_its_neighbours() {
        let zip = build_zip_raw(&[
            ("xl/workbook.xml", TWO_SHEET_WORKBOOK.as_bytes().to_vec(), 0, TWO_SHEET_WORKBOOK.len()),
            ("xl/_rels/workbook.xml.rels", TWO_SHEET_RELS.as_bytes().to_vec(), 0, TWO_SHEET_RELS.len()),
            ("xl/sharedStrings.xml", SHARED.as_bytes().to_vec(), 0, SHARED.len()),
            ("xl/worksheets/sheet1.xml", SHEET1.as_bytes().to_vec(), 0, SHEET1.len()),
            // LZMA: not a supported method.
            ("xl/worksheets/sheet2.xml", SHEET1.as_bytes().to_vec(), 14, SHEET1.len()),
            // Claims deflate but the payload is not a deflate stream.
            ("xl/worksheets/sheet3.xml", vec![0xff; 64], 8, 512),
        ]);
        let text = extract_sheets(&zip, DEFAULT_MAX_ENTRY_BYTES).unwrap();
        assert_eq!(text, "Sheet: Ledger\nDate,150");
    }

    #[test]
    fn far_right_cells_stay_sparse_and_sheet_text_is_capped() {
        let rows: String = (1..=200)
            .map(|r| format!(r#"<row r="{r}"><c r="XFD{r}"><v>1</v></c></row>"#))
            .collect();
        let sheet = format!("<worksheet><sheetData>{}</sheetData></worksheet>", rows);

        let parsed = parse_sheet_rows(sheet.as_bytes(), &[]);
        assert_eq!(parsed.len(), 200);
        assert!(parsed.iter().all(|row| row.len() == 1));

        let zip = build_zip(&[("xl/worksheets/sheet1.xml", sheet.as_bytes(), true)]);
        let budget = 64 * 1024;
        let text = extract_sheets(&zip, budget as u64).unwrap();
        assert!(text.len() <= budget, "{} bytes", text.len());
        assert!(text.starts_with("Sheet: Sheet1\n"));
        let kept = text.lines().skip(1).count();
        assert!(kept >= 1 && kept < 200);
        assert!(text.lines().skip(1).all(|l| l.len() == MAX_COLUMNS && l.ends_with(",1")));

        let text = extract_sheets(&zip, DEFAULT_MAX_ENTRY_BYTES).unwrap();
        assert!(text.len() <= XLSX_MAX_SHEET_TEXT_BYTES);
    }
}
