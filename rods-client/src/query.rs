//! General queries.
//!
//! A [`Query`] selects catalog columns and filters them with an AND of
//! equality conditions. Results come back column-major on the wire, one
//! page at a time, and are turned into rows here.

use crate::error::ClientError;
use crate::session::Session;
use rods_protocol::message::{GenQueryInp, GenQueryOut, KeyValPair, SELECT_PLAIN};
use rods_protocol::Column;

/// Rows requested per page.
pub const PAGE_SIZE: usize = 500;

/// A general query: selected columns plus equality conditions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    columns: Vec<Column>,
    conditions: Vec<(Column, String)>,
    limit: Option<usize>,
}

impl Query {
    pub fn new(columns: impl IntoIterator<Item = Column>) -> Self {
        Self {
            columns: columns.into_iter().collect(),
            conditions: Vec::new(),
            limit: None,
        }
    }

    /// Adds `column = value` to the conjunction.
    pub fn filter(mut self, column: Column, value: impl Into<String>) -> Self {
        self.conditions.push((column, value.into()));
        self
    }

    /// Caps the total number of rows. Without a limit every page is
    /// fetched.
    pub fn limit(mut self, max_rows: usize) -> Self {
        self.limit = Some(max_rows);
        self
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn conditions(&self) -> &[(Column, String)] {
        &self.conditions
    }

    pub fn max_rows(&self) -> Option<usize> {
        self.limit
    }

    /// Builds the request for the first page.
    pub fn to_gen_query_inp(&self) -> GenQueryInp {
        self.page_request(0, 0)
    }

    /// Builds the request for the page after `fetched` rows, continuing the
    /// server-side statement `continue_inx`.
    pub fn page_request(&self, continue_inx: i32, fetched: usize) -> GenQueryInp {
        let remaining = self
            .limit
            .map_or(PAGE_SIZE, |limit| limit.saturating_sub(fetched));
        GenQueryInp {
            max_rows: i32::try_from(remaining.min(PAGE_SIZE)).unwrap_or(i32::MAX),
            continue_inx,
            partial_start_index: 0,
            options: 0,
            cond_input: KeyValPair::new(),
            selects: self
                .columns
                .iter()
                .map(|c| (c.index, SELECT_PLAIN))
                .collect(),
            conditions: self
                .conditions
                .iter()
                .map(|(c, v)| (c.index, equals(v)))
                .collect(),
        }
    }

    /// Builds the request that releases an unfinished statement.
    pub fn close_request(&self, continue_inx: i32) -> GenQueryInp {
        GenQueryInp {
            max_rows: 0,
            ..self.page_request(continue_inx, 0)
        }
    }
}

fn equals(value: &str) -> String {
    format!("= '{}'", value.replace('\'', "''"))
}

/// Fluent query bound to a session.
pub struct QueryBuilder<'a> {
    session: &'a Session,
    query: Query,
}

impl<'a> QueryBuilder<'a> {
    pub(crate) fn new(session: &'a Session, columns: Vec<Column>) -> Self {
        Self {
            session,
            query: Query::new(columns),
        }
    }

    pub fn filter(mut self, column: Column, value: impl Into<String>) -> Self {
        self.query = self.query.filter(column, value);
        self
    }

    pub fn limit(mut self, max_rows: usize) -> Self {
        self.query = self.query.limit(max_rows);
        self
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    /// Runs the query. No matching rows is an empty result, not an error.
    pub async fn execute(self) -> Result<ResultSet, ClientError> {
        self.session.execute_query(&self.query).await
    }
}

/// One result row, addressable by the requested columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    cells: Vec<(Column, String)>,
}

impl Row {
    pub fn get(&self, column: Column) -> Option<&str> {
        self.cells
            .iter()
            .find(|(c, _)| *c == column)
            .map(|(_, v)| v.as_str())
    }

    pub fn get_int(&self, column: Column) -> Option<i64> {
        self.get(column).and_then(|v| v.trim().parse().ok())
    }

    /// Like [`Row::get`], failing when the column was not selected.
    pub(crate) fn require(&self, column: Column) -> Result<&str, ClientError> {
        self.get(column).ok_or_else(|| {
            ClientError::UnexpectedResponse(format!("column {} missing from row", column))
        })
    }

    pub(crate) fn require_int(&self, column: Column) -> Result<i64, ClientError> {
        let value = self.require(column)?;
        value.trim().parse().map_err(|_| {
            ClientError::UnexpectedResponse(format!("column {} is not an integer: {:?}", column, value))
        })
    }

    /// Values in requested column order.
    pub fn values(&self) -> impl Iterator<Item = &str> {
        self.cells.iter().map(|(_, v)| v.as_str())
    }
}

/// Ordered query result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultSet {
    columns: Vec<Column>,
    rows: Vec<Row>,
}

impl ResultSet {
    /// A result with the requested columns and no rows.
    pub fn empty(columns: Vec<Column>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Pivots the column-major reply into rows.
    pub fn from_gen_query_out(columns: Vec<Column>, out: &GenQueryOut) -> Result<Self, ClientError> {
        let row_count = usize::try_from(out.row_count).unwrap_or(0);

        let mut value_columns = Vec::with_capacity(columns.len());
        for column in &columns {
            let result = out
                .columns
                .iter()
                .find(|r| r.attri_inx == column.index)
                .ok_or_else(|| {
                    ClientError::UnexpectedResponse(format!("reply lacks column {}", column))
                })?;
            if result.values.len() < row_count {
                return Err(ClientError::UnexpectedResponse(format!(
                    "column {} has {} values for {} rows",
                    column,
                    result.values.len(),
                    row_count
                )));
            }
            value_columns.push(&result.values);
        }

        let rows = (0..row_count)
            .map(|i| Row {
                cells: columns
                    .iter()
                    .zip(&value_columns)
                    .map(|(c, values)| (*c, values[i].clone()))
                    .collect(),
            })
            .collect();

        Ok(Self { columns, rows })
    }

    /// Appends the rows of a following page.
    pub(crate) fn append(&mut self, page: ResultSet) {
        self.rows.extend(page.rows);
    }

    pub(crate) fn truncate(&mut self, len: usize) {
        self.rows.truncate(len);
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Row> {
        self.rows.iter()
    }

    /// Returns the single row, or `None` when there are zero or several.
    pub fn one(&self) -> Option<&Row> {
        match self.rows.as_slice() {
            [row] => Some(row),
            _ => None,
        }
    }
}

impl IntoIterator for ResultSet {
    type Item = Row;
    type IntoIter = std::vec::IntoIter<Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}

impl<'a> IntoIterator for &'a ResultSet {
    type Item = &'a Row;
    type IntoIter = std::slice::Iter<'a, Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rods_protocol::catalog::{collection, data_object};
    use rods_protocol::message::SqlResult;

    fn sql(column: Column, values: &[&str]) -> SqlResult {
        SqlResult {
            attri_inx: column.index,
            res_len: 64,
            values: values.iter().map(|v| v.to_string()).collect(),
        }
    }

    #[test]
    fn test_wire_query() {
        let query = Query::new([collection::ID, collection::NAME])
            .filter(collection::NAME, "/zoneA/home/alice")
            .limit(10);
        let inp = query.to_gen_query_inp();
        assert_eq!(inp.max_rows, 10);
        assert_eq!(inp.selects, vec![(500, SELECT_PLAIN), (501, SELECT_PLAIN)]);
        assert_eq!(
            inp.conditions,
            vec![(501, "= '/zoneA/home/alice'".to_string())]
        );
    }

    #[test]
    fn test_quotes_are_doubled() {
        let inp = Query::new([data_object::NAME])
            .filter(data_object::NAME, "o'brien.txt")
            .to_gen_query_inp();
        assert_eq!(inp.conditions[0].1, "= 'o''brien.txt'");
    }

    #[test]
    fn test_default_limit() {
        let query = Query::new([collection::NAME]);
        assert_eq!(query.max_rows(), None);
        assert!(query.conditions().is_empty());
        assert_eq!(query.to_gen_query_inp().max_rows, PAGE_SIZE as i32);
    }

    #[test]
    fn test_page_requests() {
        let query = Query::new([collection::NAME]).limit(1200);
        let inp = query.page_request(7, 1000);
        assert_eq!(inp.continue_inx, 7);
        assert_eq!(inp.max_rows, 200);
        assert_eq!(query.page_request(7, 500).max_rows, PAGE_SIZE as i32);

        let close = query.close_request(7);
        assert_eq!(close.max_rows, 0);
        assert_eq!(close.continue_inx, 7);
        assert_eq!(close.selects, inp.selects);
    }

    #[test]
    fn test_append_pages() {
        let page = |names: &[&str]| {
            let out = GenQueryOut {
                row_count: names.len() as i32,
                continue_inx: 1,
                total_row_count: 3,
                columns: vec![sql(collection::NAME, names)],
            };
            ResultSet::from_gen_query_out(vec![collection::NAME], &out).unwrap()
        };

        let mut result = page(&["/a", "/b"]);
        result.append(page(&["/c"]));
        assert_eq!(result.len(), 3);
        assert_eq!(result.rows()[2].get(collection::NAME), Some("/c"));

        result.truncate(1);
        assert_eq!(result.one().unwrap().get(collection::NAME), Some("/a"));
    }

    #[test]
    fn test_rows_follow_requested_order() {
        // Reply columns arrive in a different order than requested.
        let out = GenQueryOut {
            row_count: 2,
            continue_inx: 0,
            total_row_count: 2,
            columns: vec![
                sql(data_object::SIZE, &["10", "2048"]),
                sql(data_object::NAME, &["a.txt", "b.bin"]),
            ],
        };
        let result =
            ResultSet::from_gen_query_out(vec![data_object::NAME, data_object::SIZE], &out).unwrap();

        assert_eq!(result.len(), 2);
        let first = &result.rows()[0];
        assert_eq!(first.values().collect::<Vec<_>>(), vec!["a.txt", "10"]);
        assert_eq!(result.rows()[1].get(data_object::NAME), Some("b.bin"));
        assert_eq!(result.rows()[1].get_int(data_object::SIZE), Some(2048));
        assert_eq!(first.get(collection::NAME), None);
        assert!(result.one().is_none());
    }

    #[test]
    fn test_single_row() {
        let out = GenQueryOut {
            row_count: 1,
            continue_inx: 0,
            total_row_count: 1,
            columns: vec![sql(collection::ID, &["10001"])],
        };
        let result = ResultSet::from_gen_query_out(vec![collection::ID], &out).unwrap();
        let row = result.one().unwrap();
        assert_eq!(row.require_int(collection::ID).unwrap(), 10001);
        assert!(row.require(collection::NAME).is_err());
    }

    #[test]
    fn test_missing_column_is_rejected() {
        let out = GenQueryOut {
            row_count: 1,
            continue_inx: 0,
            total_row_count: 1,
            columns: vec![sql(collection::ID, &["1"])],
        };
        let result = ResultSet::from_gen_query_out(vec![collection::NAME], &out);
        assert!(matches!(result, Err(ClientError::UnexpectedResponse(_))));
    }

    #[test]
    fn test_short_column_is_rejected() {
        let out = GenQueryOut {
            row_count: 3,
            continue_inx: 0,
            total_row_count: 3,
            columns: vec![sql(collection::ID, &["1"])],
        };
        assert!(ResultSet::from_gen_query_out(vec![collection::ID], &out).is_err());
    }

    #[test]
    fn test_empty_result_keeps_columns() {
        let result = ResultSet::empty(vec![collection::ID, collection::NAME]);
        assert!(result.is_empty());
        assert_eq!(result.columns(), &[collection::ID, collection::NAME]);
        assert_eq!(result.iter().count(), 0);
    }
}
