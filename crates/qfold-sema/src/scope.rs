//! Scope arena and symbol table.
//!
//! Scopes live in a vector addressed by [`ScopeId`]. Entering pushes a record,
//! exiting pops it, so only the active chain exists at any time. Gate and
//! subroutine bodies are parented to the global scope rather than to the
//! caller, and from inside them only constants and definitions of the
//! global scope stay visible.

use std::sync::Arc;

use qfold_ir::{BuiltinId, OpaqueGate, ParameterExpression};
use qfold_qasm3::{GateDef, Span, SubroutineDef};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::consteval::Value;
use crate::resources::View;
use crate::types::ClassicalType;

/// Index of a scope record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ScopeId(usize);

impl ScopeId {
    /// The global scope.
    pub const GLOBAL: ScopeId = ScopeId(0);
}

/// What opened a scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScopeKind {
    Global,
    SubroutineBody,
    GateBody,
    /// `if`/`for`/`while` bodies and bare blocks.
    Block,
}

/// What a name denotes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SymbolKind {
    ClassicalVariable,
    QuantumRegister,
    ClassicalRegister,
    Alias,
    GateDefinition,
    SubroutineDefinition,
    Constant,
}

/// What a symbol is bound to besides its classical value.
#[derive(Debug, Clone)]
pub enum Binding {
    None,
    /// Physical qubits of a register, alias or qubit formal.
    Qubits(View),
    /// Physical clbits of a `bit` variable.
    Clbits(View),
    /// Classical gate formal bound to an actual parameter.
    Param(ParameterExpression),
    Builtin(BuiltinId),
    Gate(Arc<GateDef>),
    External(OpaqueGate),
    Subroutine(Arc<SubroutineDef>),
}

/// A declared name.
#[derive(Debug, Clone)]
pub struct Symbol {
    pub name: String,
    pub kind: SymbolKind,
    /// Declared classical type.
    pub ty: Option<ClassicalType>,
    /// Register length or bit width.
    pub size: Option<u32>,
    pub mutable: bool,
    pub scope: ScopeId,
    /// Compile-time value; `None` once it depends on runtime data.
    pub value: Option<Value>,
    pub binding: Binding,
    /// Name the variable is re-emitted under once it becomes runtime-valued.
    pub emit_name: Option<String>,
    /// Where it was declared.
    pub span: Span,
}

impl Symbol {
    /// A new symbol; `scope` is filled in by [`ScopeArena::declare`].
    pub fn new(name: impl Into<String>, kind: SymbolKind, span: Span) -> Self {
        Self {
            name: name.into(),
            kind,
            ty: None,
            size: None,
            mutable: false,
            scope: ScopeId::GLOBAL,
            value: None,
            binding: Binding::None,
            emit_name: None,
            span,
        }
    }

    #[must_use]
    pub fn with_type(mut self, ty: ClassicalType) -> Self {
        self.size = ty.width();
        self.ty = Some(ty);
        self
    }

    #[must_use]
    pub fn with_value(mut self, value: Option<Value>) -> Self {
        self.value = value;
        self
    }

    #[must_use]
    pub fn with_binding(mut self, binding: Binding) -> Self {
        self.binding = binding;
        self
    }

    #[must_use]
    pub fn mutable(mut self) -> Self {
        self.mutable = true;
        self
    }

    /// Visible from inside a gate or subroutine body when declared globally.
    fn crosses_bodies(&self) -> bool {
        matches!(
            self.kind,
            SymbolKind::Constant | SymbolKind::GateDefinition | SymbolKind::SubroutineDefinition
        )
    }
}

#[derive(Debug)]
struct ScopeRecord {
    kind: ScopeKind,
    parent: Option<ScopeId>,
    symbols: FxHashMap<String, Symbol>,
    order: Vec<String>,
}

impl ScopeRecord {
    fn new(kind: ScopeKind, parent: Option<ScopeId>) -> Self {
        Self {
            kind,
            parent,
            symbols: FxHashMap::default(),
            order: Vec::new(),
        }
    }
}

/// Arena of active scopes.
#[derive(Debug)]
pub struct ScopeArena {
    records: Vec<ScopeRecord>,
}

impl Default for ScopeArena {
    fn default() -> Self {
        Self::new()
    }
}

impl ScopeArena {
    /// An arena holding only the global scope.
    pub fn new() -> Self {
        Self {
            records: vec![ScopeRecord::new(ScopeKind::Global, None)],
        }
    }

    /// The innermost scope.
    pub fn current(&self) -> ScopeId {
        ScopeId(self.records.len() - 1)
    }

    /// Whether the innermost scope is the global one.
    pub fn is_global(&self) -> bool {
        self.records.len() == 1
    }

    /// Open a scope. Gate and subroutine bodies hang off the global scope.
    pub fn enter(&mut self, kind: ScopeKind) -> ScopeId {
        let parent = match kind {
            ScopeKind::GateBody | ScopeKind::SubroutineBody => ScopeId::GLOBAL,
            _ => self.current(),
        };
        self.records.push(ScopeRecord::new(kind, Some(parent)));
        self.current()
    }

    /// Close the innermost scope. The global scope is never closed.
    pub fn exit(&mut self) {
        if self.records.len() > 1 {
            self.records.pop();
        }
    }

    /// Declare in the innermost scope. On a clash the existing symbol is kept
    /// and its declaration span returned.
    pub fn declare(&mut self, mut symbol: Symbol) -> Result<(), Span> {
        let id = self.current();
        let record = &mut self.records[id.0];
        if let Some(existing) = record.symbols.get(&symbol.name) {
            return Err(existing.span);
        }
        symbol.scope = id;
        record.order.push(symbol.name.clone());
        record.symbols.insert(symbol.name.clone(), symbol);
        Ok(())
    }

    /// Nearest visible symbol named `name`.
    pub fn resolve(&self, name: &str) -> Option<&Symbol> {
        let id = self.locate(name)?;
        self.records[id.0].symbols.get(name)
    }

    /// Mutable access to the nearest visible symbol named `name`.
    pub fn resolve_mut(&mut self, name: &str) -> Option<&mut Symbol> {
        let id = self.locate(name)?;
        self.records[id.0].symbols.get_mut(name)
    }

    /// Whether `name` is declared in the innermost scope.
    pub fn declared_here(&self, name: &str) -> bool {
        self.records[self.current().0].symbols.contains_key(name)
    }

    /// Global symbols in declaration order.
    pub fn globals(&self) -> impl Iterator<Item = &Symbol> {
        let global = &self.records[0];
        global.order.iter().filter_map(|n| global.symbols.get(n))
    }

    fn chain(&self) -> impl Iterator<Item = ScopeId> + '_ {
        std::iter::successors(Some(self.current()), |id| self.records[id.0].parent)
    }

    fn locate(&self, name: &str) -> Option<ScopeId> {
        let mut crossed_body = false;
        for id in self.chain() {
            let record = &self.records[id.0];
            if let Some(symbol) = record.symbols.get(name) {
                if !crossed_body || symbol.crosses_bodies() {
                    return Some(id);
                }
                return None;
            }
            if matches!(record.kind, ScopeKind::GateBody | ScopeKind::SubroutineBody) {
                crossed_body = true;
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(name: &str, line: usize) -> Symbol {
        Symbol::new(name, SymbolKind::ClassicalVariable, Span::new(line, 1)).mutable()
    }

    #[test]
    fn test_redeclaration_keeps_first() {
        let mut scopes = ScopeArena::new();
        scopes.declare(var("x", 1)).unwrap();
        assert_eq!(scopes.declare(var("x", 2)), Err(Span::new(1, 1)));
        assert_eq!(scopes.resolve("x").unwrap().span.line, 1);
    }

    #[test]
    fn test_shadowing_across_scopes() {
        let mut scopes = ScopeArena::new();
        scopes.declare(var("x", 1)).unwrap();
        scopes.enter(ScopeKind::Block);
        scopes.declare(var("x", 5)).unwrap();
        assert_eq!(scopes.resolve("x").unwrap().span.line, 5);
        scopes.exit();
        assert_eq!(scopes.resolve("x").unwrap().span.line, 1);
    }

    #[test]
    fn test_block_sees_outer_variables() {
        let mut scopes = ScopeArena::new();
        scopes.declare(var("x", 1)).unwrap();
        scopes.enter(ScopeKind::Block);
        scopes.enter(ScopeKind::Block);
        assert!(scopes.resolve("x").is_some());
        assert!(!scopes.declared_here("x"));
    }

    #[test]
    fn test_body_sees_only_constants_and_definitions() {
        let mut scopes = ScopeArena::new();
        scopes.declare(var("x", 1)).unwrap();
        scopes
            .declare(Symbol::new("n", SymbolKind::Constant, Span::new(2, 1)))
            .unwrap();
        scopes
            .declare(Symbol::new("q", SymbolKind::QuantumRegister, Span::new(3, 1)))
            .unwrap();
        scopes.enter(ScopeKind::Block);
        scopes.declare(var("local", 4)).unwrap();
        scopes.enter(ScopeKind::SubroutineBody);
        assert!(scopes.resolve("n").is_some());
        assert!(scopes.resolve("x").is_none());
        assert!(scopes.resolve("q").is_none());
        // The caller's block is not the lexical parent.
        assert!(scopes.resolve("local").is_none());
    }

    #[test]
    fn test_exit_never_pops_global() {
        let mut scopes = ScopeArena::new();
        scopes.exit();
        assert!(scopes.is_global());
        assert_eq!(scopes.current(), ScopeId::GLOBAL);
    }

    #[test]
    fn test_globals_in_order() {
        let mut scopes = ScopeArena::new();
        for (i, n) in ["b", "a", "c"].iter().enumerate() {
            scopes.declare(var(n, i + 1)).unwrap();
        }
        let names: Vec<_> = scopes.globals().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["b", "a", "c"]);
    }
}
