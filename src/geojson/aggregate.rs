use hashbrown::HashMap;
use tracing::info;

use super::parse_location;
use crate::table::{Table, TableError, LATITUDE_COLUMN, LONGITUDE_COLUMN};

/// Collapse rows sharing a location and the `group_by` values into one,
/// keeping the greatest value of `max_column`.
///
/// Rows without coordinates are dropped. The comparison is chosen once for
/// the whole column: numeric when every non-empty cell of `max_column`
/// parses as a number, lexicographic otherwise. Empty cells are ignored.
/// Output columns are Latitude, Longitude, the group columns, then
/// `max_column`, in first-seen order.
pub fn aggregate_max(table: &Table, group_by: &[String], max_column: &str) -> Result<Table, TableError> {
    let lat_idx = table.column_index(LATITUDE_COLUMN)?;
    let lon_idx = table.column_index(LONGITUDE_COLUMN)?;
    let group_idx = group_by
        .iter()
        .map(|c| table.column_index(c))
        .collect::<Result<Vec<_>, _>>()?;
    let max_idx = table.column_index(max_column)?;
    let numeric = is_numeric_column(table, max_idx);

    let mut order: Vec<(f64, f64, Vec<String>)> = Vec::new();
    let mut groups: HashMap<(u64, u64, Vec<String>), Vec<String>> = HashMap::new();

    for row in table.rows() {
        let Some(location) = parse_location(&row[lat_idx], &row[lon_idx]) else {
            continue;
        };
        let (lat, lon) = (location.latitude, location.longitude);
        let keys: Vec<String> = group_idx.iter().map(|&i| row[i].trim().to_string()).collect();
        let key = (lat.to_bits(), lon.to_bits(), keys.clone());

        let values = groups.entry(key).or_insert_with(|| {
            order.push((lat, lon, keys));
            Vec::new()
        });
        let value = row[max_idx].trim();
        if !value.is_empty() {
            values.push(value.to_string());
        }
    }

    let mut headers = vec![LATITUDE_COLUMN.to_string(), LONGITUDE_COLUMN.to_string()];
    headers.extend(group_by.iter().cloned());
    headers.push(max_column.to_string());

    let rows: Vec<Vec<String>> = order
        .into_iter()
        .map(|(lat, lon, keys)| {
            let values = groups
                .remove(&(lat.to_bits(), lon.to_bits(), keys.clone()))
                .unwrap_or_default();
            let mut row = vec![lat.to_string(), lon.to_string()];
            row.extend(keys);
            row.push(max_value(&values, numeric).unwrap_or_default());
            row
        })
        .collect();

    info!(
        "Aggregated {} rows into {} groups",
        table.len(),
        rows.len()
    );
    Ok(Table::new(headers, rows))
}

fn is_numeric_column(table: &Table, idx: usize) -> bool {
    let mut cells = table
        .rows()
        .iter()
        .map(|row| row[idx].trim())
        .filter(|cell| !cell.is_empty())
        .peekable();
    cells.peek().is_some() && cells.all(|cell| cell.parse::<f64>().is_ok())
}

fn max_value(values: &[String], numeric: bool) -> Option<String> {
    if numeric {
        values
            .iter()
            .filter_map(|v| v.parse::<f64>().ok().map(|n| (n, v)))
            .max_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(_, v)| v.clone())
    } else {
        values.iter().max().cloned()
    }
}
