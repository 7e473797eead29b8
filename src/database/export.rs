use std::collections::{BTreeMap, HashMap};

use crate::constants::{SHOPPING_LIST_CONTENT_TYPE, SHOPPING_LIST_FILENAME, SHOPPING_LIST_HEADER};

use super::schema::ShoppingListRow;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShoppingListLine {
    pub name: String,
    pub measurement_unit: String,
    pub amount: i64,
}

/// Ingredient totals over every recipe in a shopping list, one line per
/// (name, unit), ordered by name then unit.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ShoppingListExport {
    pub lines: Vec<ShoppingListLine>,
}

impl ShoppingListExport {
    pub fn consolidate<I>(rows: I) -> Self
    where
        I: IntoIterator<Item = ShoppingListRow>,
    {
        let mut totals: BTreeMap<(String, String), i64> = BTreeMap::new();
        for row in rows {
            *totals.entry((row.name, row.measurement_unit)).or_insert(0) += row.amount as i64;
        }

        let lines = totals
            .into_iter()
            .map(|((name, measurement_unit), amount)| ShoppingListLine {
                name,
                measurement_unit,
                amount,
            })
            .collect();

        Self { lines }
    }

    pub fn to_csv(&self) -> String {
        let mut name_counts: HashMap<&str, usize> = HashMap::new();
        for line in &self.lines {
            *name_counts.entry(line.name.as_str()).or_insert(0) += 1;
        }

        let mut csv = format!(
            "{},{}\r\n",
            escape(SHOPPING_LIST_HEADER.0),
            escape(SHOPPING_LIST_HEADER.1)
        );

        for line in &self.lines {
            let name = if name_counts[line.name.as_str()] > 1 {
                format!("{} ({})", line.name, line.measurement_unit)
            } else {
                line.name.to_owned()
            };

            csv += &format!("{},{}\r\n", escape(&name), line.amount);
        }

        csv
    }

    pub fn filename(&self) -> &'static str {
        SHOPPING_LIST_FILENAME
    }

    pub fn content_type(&self) -> &'static str {
        SHOPPING_LIST_CONTENT_TYPE
    }
}

fn escape(field: &str) -> String {
    if field.contains([',', '"', '\r', '\n']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

impl warp::Reply for ShoppingListExport {
    fn into_response(self) -> warp::reply::Response {
        let disposition = format!("attachment; filename=\"{}\"", self.filename());
        let content_type = self.content_type();

        let reply = warp::reply::with_header(self.to_csv(), "content-type", content_type);
        warp::reply::with_header(reply, "content-disposition", disposition).into_response()
    }
}
