#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CellValue {
    Null,
    Text(String),
}

impl CellValue {
    #[must_use]
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Null => None,
            Self::Text(text) => Some(text),
        }
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.as_text().map_or(true, str::is_empty)
    }

    #[must_use]
    pub fn display(&self) -> &str {
        self.as_text().unwrap_or("NULL")
    }
}

impl From<Option<String>> for CellValue {
    fn from(value: Option<String>) -> Self {
        value.map_or(Self::Null, Self::Text)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Record {
    fields: Vec<(String, CellValue)>,
}

impl Record {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, column: impl Into<String>, value: CellValue) {
        let column = column.into();
        if let Some(existing) = self.fields.iter_mut().find(|(name, _)| *name == column) {
            existing.1 = value;
        } else {
            self.fields.push((column, value));
        }
    }

    #[must_use]
    pub fn get(&self, column: &str) -> Option<&CellValue> {
        self.fields
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    #[must_use]
    pub fn value_at(&self, index: usize) -> Option<&CellValue> {
        self.fields.get(index).map(|(_, value)| value)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &CellValue)> {
        self.fields
            .iter()
            .map(|(name, value)| (name.as_str(), value))
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }
}

impl<S: Into<String>> FromIterator<(S, CellValue)> for Record {
    fn from_iter<I: IntoIterator<Item = (S, CellValue)>>(iter: I) -> Self {
        let mut record = Self::new();
        for (column, value) in iter {
            record.insert(column, value);
        }
        record
    }
}

#[cfg(test)]
mod tests {
    use super::{CellValue, Record};

    #[test]
    fn blank_covers_null_and_empty_text() {
        assert!(CellValue::Null.is_blank());
        assert!(CellValue::text("").is_blank());
        assert!(!CellValue::text("0").is_blank());
        assert_eq!(CellValue::Null.display(), "NULL");
    }

    #[test]
    fn record_keeps_declared_order_and_unique_keys() {
        let record = [
            ("id", CellValue::text("1")),
            ("name", CellValue::text("alpha")),
            ("id", CellValue::text("2")),
        ]
        .into_iter()
        .collect::<Record>();

        assert_eq!(record.len(), 2);
        assert_eq!(record.column_names().collect::<Vec<_>>(), vec!["id", "name"]);
        assert_eq!(record.get("id"), Some(&CellValue::text("2")));
        assert_eq!(record.value_at(1), Some(&CellValue::text("alpha")));
        assert!(record.get("missing").is_none());
    }
}
