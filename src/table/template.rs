//! Address composition from table columns.

use regex::Regex;

use super::TableError;

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Literal(String),
    Column(usize),
}

/// A pattern like `"{Address 1}, {City}, {State} {Zip Code}"` bound to the
/// column positions of a header row.
#[derive(Debug, Clone)]
pub struct AddressTemplate {
    segments: Vec<Segment>,
}

impl AddressTemplate {
    pub fn parse(template: &str, headers: &[String]) -> Result<Self, TableError> {
        let placeholder = Regex::new(r"\{([^{}]+)\}").expect("valid placeholder regex");

        let mut segments = Vec::new();
        let mut last = 0;
        for caps in placeholder.captures_iter(template) {
            let Some(whole) = caps.get(0) else {
                continue;
            };
            if whole.start() > last {
                segments.push(Segment::Literal(template[last..whole.start()].to_string()));
            }

            let name = caps[1].trim();
            let index = headers
                .iter()
                .position(|h| h.trim() == name)
                .ok_or_else(|| TableError::MissingColumn(name.to_string()))?;
            segments.push(Segment::Column(index));
            last = whole.end();
        }
        if last < template.len() {
            segments.push(Segment::Literal(template[last..].to_string()));
        }

        if !segments.iter().any(|s| matches!(s, Segment::Column(_))) {
            return Err(TableError::Template(format!(
                "template '{}' references no columns",
                template
            )));
        }

        Ok(Self { segments })
    }

    /// Template consisting of a single column
    pub fn single_column(column: &str, headers: &[String]) -> Result<Self, TableError> {
        Self::parse(&format!("{{{}}}", column), headers)
    }

    /// Fill the template from one row. Cells are trimmed; a row whose
    /// referenced cells are all empty yields an empty address.
    pub fn render(&self, row: &[String]) -> String {
        let mut any_value = false;
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Column(i) => {
                    let cell = row.get(*i).map(|c| c.trim()).unwrap_or("");
                    any_value |= !cell.is_empty();
                    out.push_str(cell);
                }
            }
        }

        if any_value {
            out
        } else {
            String::new()
        }
    }
}
