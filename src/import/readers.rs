//! Normalise external files into a header plus rows of string cells.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use serde::Serialize;
use serde_json::Value;

use super::ImportError;
use crate::capabilities::Capabilities;
use crate::{AppError, AppResult};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TabularData {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl TabularData {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileFormat {
    Csv,
    Json,
    Excel,
}

const EXCEL_EXTENSIONS: &[&str] = &["xlsx", "xlsm", "xltx", "xltm"];

impl FileFormat {
    /// Pick a format from the file extension; anything unrecognised is CSV.
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        if ext == "json" {
            FileFormat::Json
        } else if EXCEL_EXTENSIONS.contains(&ext.as_str()) {
            FileFormat::Excel
        } else {
            FileFormat::Csv
        }
    }
}

pub fn read_file(path: &Path, caps: &Capabilities) -> AppResult<TabularData> {
    let format = FileFormat::from_path(path);
    if format == FileFormat::Excel {
        caps.require_excel()?;
    }
    let open = |path: &Path| {
        File::open(path).map_err(|err| {
            AppError::from(err)
                .with_context("operation", "open_import_file")
                .with_context("path", path.display().to_string())
        })
    };
    match format {
        FileFormat::Csv => read_csv(BufReader::new(open(path)?)),
        FileFormat::Json => read_json(BufReader::new(open(path)?)),
        FileFormat::Excel => read_excel(path),
    }
}

pub fn read_csv<R: Read>(reader: R) -> AppResult<TabularData> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let header: Vec<String> = rdr
        .headers()?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut rows = Vec::new();
    for record in rdr.records() {
        let record = record?;
        let row = (0..header.len())
            .map(|i| record.get(i).unwrap_or("").trim_start().to_string())
            .collect();
        rows.push(row);
    }
    Ok(TabularData { header, rows })
}

pub fn read_json<R: Read>(reader: R) -> AppResult<TabularData> {
    let value: Value = serde_json::from_reader(reader)?;
    tabulate_json(value)
}

fn tabulate_json(value: Value) -> AppResult<TabularData> {
    let items = match value {
        Value::Array(items) => items,
        other => {
            return Err(ImportError::JsonShape(format!(
                "expected an array of objects, found {}",
                json_kind(&other)
            ))
            .into())
        }
    };

    let mut objects = Vec::with_capacity(items.len());
    for (index, item) in items.into_iter().enumerate() {
        match item {
            Value::Object(map) => objects.push(map),
            other => {
                return Err(ImportError::JsonShape(format!(
                    "element {index} is {}, not an object",
                    json_kind(&other)
                ))
                .into())
            }
        }
    }

    let header: Vec<String> = objects
        .first()
        .map(|first| first.keys().cloned().collect())
        .unwrap_or_default();
    let rows = objects
        .iter()
        .map(|obj| {
            header
                .iter()
                .map(|key| obj.get(key).map(json_cell).unwrap_or_default())
                .collect()
        })
        .collect();
    Ok(TabularData { header, rows })
}

fn json_cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(feature = "excel")]
fn read_excel(path: &Path) -> AppResult<TabularData> {
    use calamine::{open_workbook_auto, Reader};

    let mut workbook = open_workbook_auto(path)
        .map_err(|err| AppError::from(err).with_context("path", path.display().to_string()))?;
    let range = match workbook.worksheet_range_at(0) {
        Some(range) => range?,
        None => return Ok(TabularData::default()),
    };

    let mut rows = range.rows();
    let header: Vec<String> = match rows.next() {
        Some(first) => first.iter().map(|c| c.to_string().trim().to_string()).collect(),
        None => return Ok(TabularData::default()),
    };
    let rows = rows
        .map(|row| {
            (0..header.len())
                .map(|i| row.get(i).map(|c| c.to_string()).unwrap_or_default())
                .collect()
        })
        .collect();
    Ok(TabularData { header, rows })
}

#[cfg(not(feature = "excel"))]
fn read_excel(_path: &Path) -> AppResult<TabularData> {
    Err(AppError::capability_missing("excel"))
}
