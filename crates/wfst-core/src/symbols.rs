// Symbol tables: label <-> string mapping attached to either side of an
// automaton.

use hashbrown::HashMap;

use crate::arc::{EPSILON, Label};
use crate::error::FstError;

/// Bidirectional mapping between labels and symbol strings.
///
/// Labels need not be dense. Label 0 is conventionally `<eps>` but the table
/// does not enforce that.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SymbolTable {
    name: String,
    symbols: HashMap<Label, String>,
    labels: HashMap<String, Label>,
    available: Label,
}

impl SymbolTable {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// A table with `<eps>` bound to label 0.
    pub fn with_epsilon(name: impl Into<String>) -> Self {
        let mut table = Self::new(name);
        table.add_symbol("<eps>");
        table
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Adds `symbol` under the next free label, or returns its existing label.
    pub fn add_symbol(&mut self, symbol: &str) -> Label {
        if let Some(&label) = self.labels.get(symbol) {
            return label;
        }
        let label = self.available;
        self.bind(symbol, label);
        label
    }

    /// Binds `symbol` to an explicit label. Rebinding the same pair is a no-op.
    pub fn add_symbol_with_label(&mut self, symbol: &str, label: Label) -> Result<(), FstError> {
        match (self.labels.get(symbol), self.symbols.get(&label)) {
            (Some(&existing), _) if existing == label => Ok(()),
            (Some(&existing), _) => Err(FstError::DuplicateSymbol {
                symbol: symbol.to_string(),
                label: existing,
            }),
            (None, Some(_)) => Err(FstError::DuplicateSymbol {
                symbol: symbol.to_string(),
                label,
            }),
            (None, None) => {
                self.bind(symbol, label);
                Ok(())
            }
        }
    }

    fn bind(&mut self, symbol: &str, label: Label) {
        self.symbols.insert(label, symbol.to_string());
        self.labels.insert(symbol.to_string(), label);
        if label >= self.available {
            self.available = label.saturating_add(1);
        }
    }

    pub fn find_label(&self, symbol: &str) -> Option<Label> {
        self.labels.get(symbol).copied()
    }

    pub fn find_symbol(&self, label: Label) -> Option<&str> {
        self.symbols.get(&label).map(String::as_str)
    }

    pub fn contains_label(&self, label: Label) -> bool {
        self.symbols.contains_key(&label)
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Symbol pairs sorted by label.
    pub fn iter(&self) -> impl Iterator<Item = (Label, &str)> {
        let mut pairs: Vec<_> = self
            .symbols
            .iter()
            .map(|(&label, symbol)| (label, symbol.as_str()))
            .collect();
        pairs.sort_unstable_by_key(|&(label, _)| label);
        pairs.into_iter()
    }

    /// True if the table binds label 0 to anything.
    pub fn has_epsilon(&self) -> bool {
        self.contains_label(EPSILON)
    }
}

/// Two optional symbol tables are compatible if either is absent or both bind
/// the same labels to the same symbols. The table name is ignored.
pub fn compat_symbols(table1: Option<&SymbolTable>, table2: Option<&SymbolTable>) -> bool {
    match (table1, table2) {
        (Some(a), Some(b)) => a.symbols == b.symbols,
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_symbol_is_idempotent() {
        let mut table = SymbolTable::with_epsilon("letters");
        let a = table.add_symbol("a");
        let b = table.add_symbol("b");
        assert_eq!((a, b), (1, 2));
        assert_eq!(table.add_symbol("a"), 1);
        assert_eq!(table.len(), 3);
        assert_eq!(table.find_symbol(0), Some("<eps>"));
        assert_eq!(table.find_label("b"), Some(2));
        assert!(table.has_epsilon());
    }

    #[test]
    fn explicit_labels_advance_available() {
        let mut table = SymbolTable::new("sparse");
        table.add_symbol_with_label("x", 10).unwrap();
        assert_eq!(table.add_symbol("y"), 11);
        table.add_symbol_with_label("x", 10).unwrap();

        let err = table.add_symbol_with_label("x", 12).unwrap_err();
        assert_eq!(
            err,
            FstError::DuplicateSymbol {
                symbol: "x".into(),
                label: 10
            }
        );
        assert!(table.add_symbol_with_label("z", 11).is_err());
    }

    #[test]
    fn iter_is_label_ordered() {
        let mut table = SymbolTable::new("t");
        table.add_symbol_with_label("c", 3).unwrap();
        table.add_symbol_with_label("a", 1).unwrap();
        let labels: Vec<_> = table.iter().map(|(label, _)| label).collect();
        assert_eq!(labels, vec![1, 3]);
    }

    #[test]
    fn compat_ignores_names_and_absence() {
        let mut a = SymbolTable::with_epsilon("a");
        a.add_symbol("x");
        let mut b = SymbolTable::with_epsilon("b");
        b.add_symbol("x");
        assert!(compat_symbols(Some(&a), Some(&b)));
        assert!(compat_symbols(Some(&a), None));
        assert!(compat_symbols(None, None));

        b.add_symbol("y");
        assert!(!compat_symbols(Some(&a), Some(&b)));
    }
}
