use im::HashMap;

use crate::ast::Value;
use crate::symbols::canonical_symbol_name;

type Scope = HashMap<String, Value>;

/// Two scopes plus a LIFO stack of saved locals snapshots. A function
/// call pushes a snapshot, merges its parameter bindings into locals,
/// evaluates, then restores the snapshot — dynamic scoping. Persistent
/// maps make a snapshot an O(1) structural-sharing clone.
#[derive(Clone, Debug, Default)]
pub struct Env {
    locals: Scope,
    globals: Scope,
    saved: Vec<Scope>,
}

impl Env {
    pub fn new() -> Self {
        Self::default()
    }

    /// Locals first, then globals.
    pub fn lookup(&self, name: &str) -> Option<Value> {
        let canonical = canonical_symbol_name(name);
        if let Some(v) = self.locals.get(canonical.as_ref()) {
            return Some(v.clone());
        }
        self.globals.get(canonical.as_ref()).cloned()
    }

    pub fn is_bound(&self, name: &str) -> bool {
        let canonical = canonical_symbol_name(name);
        self.locals.contains_key(canonical.as_ref())
            || self.globals.contains_key(canonical.as_ref())
    }

    pub fn set_local(&mut self, name: &str, value: Value) {
        self.locals
            .insert(canonical_symbol_name(name).into_owned(), value);
    }

    pub fn set_global(&mut self, name: &str, value: Value) {
        self.globals
            .insert(canonical_symbol_name(name).into_owned(), value);
    }

    pub fn save_locals(&mut self) {
        self.saved.push(self.locals.clone());
    }

    pub fn restore_locals(&mut self) {
        if let Some(snapshot) = self.saved.pop() {
            self.locals = snapshot;
        }
    }

    pub fn saved_depth(&self) -> usize {
        self.saved.len()
    }

    /// Pop back to `depth`, restoring the oldest discarded snapshot.
    /// Used by the top-level driver so a failing form cannot leak a
    /// stale scope into its successors.
    pub fn unwind_saved(&mut self, depth: usize) {
        while self.saved.len() > depth {
            self.restore_locals();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_prefers_locals() {
        let mut env = Env::new();
        env.set_global("X", Value::Int(1));
        env.set_local("X", Value::Int(2));
        assert_eq!(env.lookup("x"), Some(Value::Int(2)));
    }

    #[test]
    fn save_restore_round_trips() {
        let mut env = Env::new();
        env.set_local("X", Value::Int(1));
        env.save_locals();
        env.set_local("X", Value::Int(2));
        env.set_local("Y", Value::Int(3));
        env.restore_locals();
        assert_eq!(env.lookup("X"), Some(Value::Int(1)));
        assert_eq!(env.lookup("Y"), None);
    }

    #[test]
    fn unwind_discards_nested_frames() {
        let mut env = Env::new();
        env.set_local("X", Value::Int(1));
        env.save_locals();
        env.set_local("X", Value::Int(2));
        env.save_locals();
        env.set_local("X", Value::Int(3));
        env.unwind_saved(0);
        assert_eq!(env.saved_depth(), 0);
        assert_eq!(env.lookup("X"), Some(Value::Int(1)));
    }
}
