//! Result Page - one immutable batch of raw rows

use crate::types::ColumnDescriptor;
use std::sync::Arc;

/// Raw cells aligned to the page's columns; `None` is an absent cell
pub type RawRow = Vec<Option<String>>;

#[derive(Debug, Clone, PartialEq)]
pub struct ResultPage {
    columns: Arc<Vec<ColumnDescriptor>>,
    rows: Vec<RawRow>,
    next_token: Option<String>,
    update_count: Option<u64>,
}

impl ResultPage {
    pub fn new(columns: Arc<Vec<ColumnDescriptor>>, rows: Vec<RawRow>, next_token: Option<String>) -> Self {
        // An empty token means the same as no token
        let next_token = next_token.filter(|t| !t.is_empty());
        Self {
            columns,
            rows,
            next_token,
            update_count: None,
        }
    }

    pub fn with_update_count(mut self, update_count: Option<u64>) -> Self {
        self.update_count = update_count;
        self
    }

    /// Rows affected, when the source reports it
    pub fn update_count(&self) -> Option<u64> {
        self.update_count
    }

    pub fn columns(&self) -> &Arc<Vec<ColumnDescriptor>> {
        &self.columns
    }

    pub fn rows(&self) -> &[RawRow] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<RawRow> {
        self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn next_token(&self) -> Option<&str> {
        self.next_token.as_deref()
    }

    pub fn is_last(&self) -> bool {
        self.next_token.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_token_marks_last_page() {
        let columns = Arc::new(vec![ColumnDescriptor::new("a", "integer")]);
        let page = ResultPage::new(columns.clone(), vec![vec![Some("1".to_string())]], Some(String::new()));
        assert!(page.is_last());
        let page = ResultPage::new(columns, vec![], Some("t2".to_string()));
        assert_eq!(page.next_token(), Some("t2"));
        assert!(!page.is_last());
    }
}
