use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One spreadsheet row, already reduced to the four columns we use.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportRow {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub core_selling_point: String,
    #[serde(default)]
    pub target_audience: String,
    #[serde(default)]
    pub brand_tone: String,
}

#[derive(Clone, Copy)]
enum Column {
    Name,
    CoreSellingPoint,
    TargetAudience,
    BrandTone,
}

const HEADERS: &[(&str, Column)] = &[
    ("商品名称", Column::Name),
    ("name", Column::Name),
    ("product name", Column::Name),
    ("核心卖点", Column::CoreSellingPoint),
    ("core selling point", Column::CoreSellingPoint),
    ("selling point", Column::CoreSellingPoint),
    ("目标受众", Column::TargetAudience),
    ("target audience", Column::TargetAudience),
    ("audience", Column::TargetAudience),
    ("品牌调性", Column::BrandTone),
    ("brand tone", Column::BrandTone),
    ("brand", Column::BrandTone),
];

impl ImportRow {
    /// Maps a header → cell record. Unknown headers are ignored and missing
    /// ones stay empty; numeric cells are kept as their text form.
    ///
    /// When several aliases of one column are present, the one listed first
    /// in `HEADERS` wins (the Chinese header over its English aliases),
    /// whatever order the record's keys come in. Blank cells never win.
    pub fn from_record(record: &Map<String, Value>) -> Self {
        let mut row = ImportRow::default();
        let mut ranks: [Option<usize>; 4] = [None; 4];
        for (header, cell) in record {
            let Some((rank, column)) = column_for(header) else {
                continue;
            };
            let text = cell_text(cell);
            if text.is_empty() {
                continue;
            }
            let (slot, best) = match column {
                Column::Name => (&mut row.name, &mut ranks[0]),
                Column::CoreSellingPoint => (&mut row.core_selling_point, &mut ranks[1]),
                Column::TargetAudience => (&mut row.target_audience, &mut ranks[2]),
                Column::BrandTone => (&mut row.brand_tone, &mut ranks[3]),
            };
            if best.is_none_or(|best| rank < best) {
                *slot = text;
                *best = Some(rank);
            }
        }
        row
    }
}

fn column_for(header: &str) -> Option<(usize, Column)> {
    let normalized = header
        .trim()
        .to_lowercase()
        .replace(['_', '-'], " ");
    HEADERS
        .iter()
        .position(|(name, _)| *name == normalized)
        .map(|rank| (rank, HEADERS[rank].1))
}

fn cell_text(cell: &Value) -> String {
    match cell {
        Value::String(text) => text.trim().to_string(),
        Value::Number(number) => number.to_string(),
        Value::Bool(flag) => flag.to_string(),
        Value::Null | Value::Array(_) | Value::Object(_) => String::new(),
    }
}
