use serde::Deserialize;

/// One financial report as returned by the reporting endpoint: ordered
/// column descriptors plus a recursive row tree. Owned immutably by the
/// orchestrator for the duration of one sync.
#[derive(Debug, Clone, Deserialize)]
pub struct Report {
    #[serde(rename = "Columns")]
    pub columns: Option<Columns>,
    #[serde(rename = "Rows")]
    pub rows: Option<Rows>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Columns {
    #[serde(rename = "Column", default)]
    pub column: Vec<Column>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Column {
    #[serde(rename = "ColTitle")]
    pub col_title: Option<String>,
    #[serde(rename = "ColType")]
    pub col_type: Option<String>,
    #[serde(rename = "MetaData", default)]
    pub metadata: Vec<NameValue>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NameValue {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Value")]
    pub value: String,
}

/// A row group. `row` stays `None` when the API sends `"Rows": {}`,
/// which the flatteners treat differently from an empty array.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Rows {
    #[serde(rename = "Row")]
    pub row: Option<Vec<Row>>,
}

impl Rows {
    pub fn rows(&self) -> &[Row] {
        self.row.as_deref().unwrap_or_default()
    }
}

/// One node in the row tree. Leaf rows carry `col_data`; section rows
/// carry a `header`, a nested `rows` group and a closing `summary`;
/// summary-only rows carry just the `summary`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Row {
    #[serde(rename = "type")]
    pub row_type: Option<String>,
    #[serde(rename = "Header")]
    pub header: Option<RowLabel>,
    #[serde(rename = "Summary")]
    pub summary: Option<RowLabel>,
    #[serde(rename = "ColData")]
    pub col_data: Option<Vec<Cell>>,
    #[serde(rename = "Rows")]
    pub rows: Option<Rows>,
}

/// Header or summary line of a section: a plain run of cells.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RowLabel {
    #[serde(rename = "ColData", default)]
    pub col_data: Vec<Cell>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Cell {
    pub value: Option<String>,
}
