//! Scoped variable map.

use std::collections::HashMap;
use std::sync::Arc;

use mantis_core::{MatrixBlock, ScalarValue};

use crate::memory::MatrixHandle;

/// A bound variable.
#[derive(Debug, Clone)]
pub enum Variable {
    Scalar(ScalarValue),
    Matrix(MatrixHandle),
}

impl Variable {
    pub fn as_matrix(&self) -> Option<&MatrixHandle> {
        match self {
            Self::Matrix(h) => Some(h),
            Self::Scalar(_) => None,
        }
    }
}

/// A materialized variable value handed across the runtime boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum RuntimeValue {
    Scalar(ScalarValue),
    Matrix(MatrixBlock),
}

impl RuntimeValue {
    pub fn as_matrix(&self) -> Option<&MatrixBlock> {
        match self {
            Self::Matrix(m) => Some(m),
            Self::Scalar(_) => None,
        }
    }

    pub fn as_scalar(&self) -> Option<&ScalarValue> {
        match self {
            Self::Scalar(s) => Some(s),
            Self::Matrix(_) => None,
        }
    }
}

/// Variable names to values, organized as a stack of scopes.
///
/// Lookups search from the innermost scope outwards. Assignment updates the
/// innermost scope already holding the name and otherwise binds in the
/// program scope; [`set_local`](Self::set_local) binds in the current scope.
#[derive(Debug)]
pub struct SymbolTable {
    scopes: Vec<HashMap<String, Variable>>,
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolTable {
    pub fn new() -> Self {
        Self {
            scopes: vec![HashMap::new()],
        }
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    pub fn get(&self, name: &str) -> Option<&Variable> {
        self.scopes.iter().rev().find_map(|s| s.get(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Bind `name`, returning the replaced value.
    pub fn set(&mut self, name: impl Into<String>, value: Variable) -> Option<Variable> {
        let name = name.into();
        let idx = self
            .scopes
            .iter()
            .rposition(|s| s.contains_key(&name))
            .unwrap_or(0);
        self.scopes[idx].insert(name, value)
    }

    /// Bind `name` in the innermost scope.
    pub fn set_local(&mut self, name: impl Into<String>, value: Variable) -> Option<Variable> {
        let last = self.scopes.len() - 1;
        self.scopes[last].insert(name.into(), value)
    }

    /// Unbind `name` from the innermost scope holding it.
    pub fn remove(&mut self, name: &str) -> Option<Variable> {
        self.scopes
            .iter_mut()
            .rev()
            .find_map(|s| s.remove(name))
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    /// Drop the innermost scope and return its variables.
    ///
    /// The program scope is never popped.
    pub fn pop_scope(&mut self) -> Vec<Variable> {
        if self.scopes.len() == 1 {
            return Vec::new();
        }
        self.scopes
            .pop()
            .map(|s| s.into_values().collect())
            .unwrap_or_default()
    }

    /// Check if any visible or shadowed variable refers to `handle`.
    pub fn references(&self, handle: &MatrixHandle) -> bool {
        self.scopes
            .iter()
            .flat_map(HashMap::values)
            .any(|v| matches!(v, Variable::Matrix(h) if Arc::ptr_eq(h, handle)))
    }

    /// Visible variable names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .scopes
            .iter()
            .flat_map(HashMap::keys)
            .cloned()
            .collect();
        names.sort();
        names.dedup();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(v: i64) -> Variable {
        Variable::Scalar(ScalarValue::Int(v))
    }

    fn value(table: &SymbolTable, name: &str) -> Option<ScalarValue> {
        match table.get(name) {
            Some(Variable::Scalar(s)) => Some(s.clone()),
            _ => None,
        }
    }

    #[test]
    fn test_assignment_targets() {
        let mut table = SymbolTable::new();
        table.set("x", int(1));
        table.push_scope();
        table.set_local("i", int(7));
        table.set("x", int(2));
        table.set("y", int(3));
        assert_eq!(value(&table, "i"), Some(ScalarValue::Int(7)));

        let popped = table.pop_scope();
        assert_eq!(popped.len(), 1);
        assert_eq!(value(&table, "x"), Some(ScalarValue::Int(2)));
        assert_eq!(value(&table, "y"), Some(ScalarValue::Int(3)));
        assert!(!table.contains("i"));
        assert!(table.pop_scope().is_empty());
        assert_eq!(table.depth(), 1);
    }

    #[test]
    fn test_shadowing() {
        let mut table = SymbolTable::new();
        table.set("i", int(1));
        table.push_scope();
        table.set_local("i", int(2));
        assert_eq!(value(&table, "i"), Some(ScalarValue::Int(2)));
        assert!(table.set("i", int(3)).is_some());
        table.pop_scope();
        assert_eq!(value(&table, "i"), Some(ScalarValue::Int(1)));
        assert_eq!(table.names(), vec!["i".to_string()]);
        assert!(table.remove("i").is_some());
        assert!(table.remove("i").is_none());
    }
}
