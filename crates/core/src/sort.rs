#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortSpec {
    pub column: String,
    pub ascending: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SortState {
    #[default]
    Unsorted,
    Ascending(String),
    Descending(String),
}

impl SortState {
    /// Next state after the operator asks to sort by `column`. A different
    /// column always restarts the cycle at ascending.
    #[must_use]
    pub fn toggled(&self, column: &str) -> Self {
        match self {
            Self::Ascending(current) if current == column => Self::Descending(current.clone()),
            Self::Descending(current) if current == column => Self::Unsorted,
            _ => Self::Ascending(column.to_string()),
        }
    }

    pub fn toggle(&mut self, column: &str) {
        *self = self.toggled(column);
    }

    pub fn clear(&mut self) {
        *self = Self::Unsorted;
    }

    #[must_use]
    pub fn column(&self) -> Option<&str> {
        match self {
            Self::Unsorted => None,
            Self::Ascending(column) | Self::Descending(column) => Some(column),
        }
    }

    #[must_use]
    pub fn spec(&self) -> Option<SortSpec> {
        match self {
            Self::Unsorted => None,
            Self::Ascending(column) => Some(SortSpec {
                column: column.clone(),
                ascending: true,
            }),
            Self::Descending(column) => Some(SortSpec {
                column: column.clone(),
                ascending: false,
            }),
        }
    }

    #[must_use]
    pub fn indicator(&self, column: &str) -> Option<&'static str> {
        match self {
            Self::Ascending(current) if current == column => Some("↑"),
            Self::Descending(current) if current == column => Some("↓"),
            _ => None,
        }
    }

    #[must_use]
    pub fn header_label(&self, column: &str) -> String {
        match self.indicator(column) {
            Some(arrow) => format!("{column} {arrow}"),
            None => column.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{SortSpec, SortState};

    #[test]
    fn same_column_cycles_through_three_states() {
        let mut state = SortState::Unsorted;

        state.toggle("balance");
        assert_eq!(state, SortState::Ascending("balance".to_string()));
        state.toggle("balance");
        assert_eq!(state, SortState::Descending("balance".to_string()));
        state.toggle("balance");
        assert_eq!(state, SortState::Unsorted);
    }

    #[test]
    fn other_column_restarts_at_ascending() {
        let ascending = SortState::Ascending("id".to_string());
        assert_eq!(
            ascending.toggled("name"),
            SortState::Ascending("name".to_string())
        );

        let descending = SortState::Descending("id".to_string());
        assert_eq!(
            descending.toggled("name"),
            SortState::Ascending("name".to_string())
        );
    }

    #[test]
    fn clear_resets_from_any_state() {
        let mut state = SortState::Descending("id".to_string());
        state.clear();
        assert_eq!(state, SortState::Unsorted);
        assert!(state.spec().is_none());
    }

    #[test]
    fn spec_and_header_label_follow_direction() {
        let state = SortState::Descending("balance".to_string());
        assert_eq!(
            state.spec(),
            Some(SortSpec {
                column: "balance".to_string(),
                ascending: false,
            })
        );
        assert_eq!(state.header_label("balance"), "balance ↓");
        assert_eq!(state.header_label("name"), "name");
        assert_eq!(
            SortState::Ascending("name".to_string()).header_label("name"),
            "name ↑"
        );
    }
}
