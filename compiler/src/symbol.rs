// symbol.rs — Arena-backed scope tree and symbol resolution
//
// Every named entity of a program (functions, parameters, variables,
// channels, sequences, stages, global constants) lives in a scope node.
// Scopes form a tree rooted at the program scope; parent links are arena
// indices, so the tree is cloneable and cannot contain cycles. A root
// `Resolver` supplies symbols defined outside the source, such as the
// channels of the host system.
//
// Preconditions: one tree per analysis.
// Postconditions: symbols are never removed; a name is unique among the
// named children of one scope.
// Failure modes: `add` reports conflicts, `resolve` reports undefined names.
// Side effects: none.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use id_arena::{Arena, Id};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ast::Span;
use crate::diag::LineIndex;
use crate::types::{Type, Value};

pub type ScopeId = Id<Scope>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Kind {
    Variable,
    StatefulVariable,
    Channel,
    Function,
    Sequence,
    Stage,
    Block,
    Constant,
    Config,
    Input,
    Output,
}

impl Kind {
    pub fn name(self) -> &'static str {
        match self {
            Kind::Variable => "variable",
            Kind::StatefulVariable => "stateful variable",
            Kind::Channel => "channel",
            Kind::Function => "function",
            Kind::Sequence => "sequence",
            Kind::Stage => "stage",
            Kind::Block => "block",
            Kind::Constant => "constant",
            Kind::Config => "config",
            Kind::Input => "input",
            Kind::Output => "output",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ── Channel sets ──

/// Channels read and written by a symbol, keyed by channel key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channels {
    #[serde(default)]
    pub read: BTreeMap<u32, String>,
    #[serde(default)]
    pub write: BTreeMap<u32, String>,
}

impl Channels {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.read.is_empty() && self.write.is_empty()
    }

    pub fn merge(&mut self, other: &Channels) {
        self.read
            .extend(other.read.iter().map(|(k, v)| (*k, v.clone())));
        self.write
            .extend(other.write.iter().map(|(k, v)| (*k, v.clone())));
    }
}

// ── Symbols ──

#[derive(Debug, Clone)]
pub struct Symbol {
    pub name: String,
    pub kind: Kind,
    pub ty: Type,
    pub span: Option<Span>,
    pub default_value: Option<Value>,
    /// Unique within the owning counter. Channels carry their key here.
    pub id: Option<u32>,
    /// For a local alias of a channel, the channel's name.
    pub alias_of: Option<String>,
}

impl Symbol {
    pub fn new(name: impl Into<String>, kind: Kind, ty: Type) -> Self {
        Self {
            name: name.into(),
            kind,
            ty,
            span: None,
            default_value: None,
            id: None,
            alias_of: None,
        }
    }

    /// An anonymous block scope.
    pub fn block() -> Self {
        Self::new("", Kind::Block, Type::Invalid)
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    pub fn with_id(mut self, id: u32) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default_value = Some(value);
        self
    }

    pub fn with_alias(mut self, channel: impl Into<String>) -> Self {
        self.alias_of = Some(channel.into());
        self
    }

    /// The channel name recorded in read/write sets.
    pub fn channel_name(&self) -> &str {
        self.alias_of.as_deref().unwrap_or(&self.name)
    }

    pub fn is_named(&self) -> bool {
        self.kind != Kind::Block && !self.name.is_empty()
    }
}

/// Supplies symbols that are not declared in source.
pub trait Resolver: Send + Sync {
    fn resolve(&self, name: &str) -> Option<Symbol>;

    fn search(&self, _prefix: &str) -> Vec<Symbol> {
        Vec::new()
    }
}

/// A `Resolver` over a fixed set of symbols.
#[derive(Debug, Clone, Default)]
pub struct MapResolver {
    symbols: BTreeMap<String, Symbol>,
}

impl MapResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, symbol: Symbol) {
        self.symbols.insert(symbol.name.clone(), symbol);
    }

    /// An external channel named `name` with key `key` and value type `elem`.
    pub fn channel(mut self, name: &str, key: u32, elem: Type) -> Self {
        self.insert(Symbol::new(name, Kind::Channel, Type::chan(elem)).with_id(key));
        self
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

impl Resolver for MapResolver {
    fn resolve(&self, name: &str) -> Option<Symbol> {
        self.symbols.get(name).cloned()
    }

    fn search(&self, prefix: &str) -> Vec<Symbol> {
        self.symbols
            .values()
            .filter(|s| s.name.starts_with(prefix))
            .cloned()
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("undefined symbol: {0}")]
    Undefined(String),
    #[error("name {name} conflicts with existing symbol at line {line}, col {col}")]
    Conflict {
        name: String,
        line: usize,
        col: usize,
    },
}

// ── Scopes ──

#[derive(Debug, Clone)]
pub struct Scope {
    pub id: ScopeId,
    pub symbol: Symbol,
    pub parent: Option<ScopeId>,
    pub children: Vec<ScopeId>,
    pub channels: Channels,
    /// Next symbol ID, present on scopes that own a counter.
    counter: Option<u32>,
}

impl Scope {
    pub fn name(&self) -> &str {
        &self.symbol.name
    }

    pub fn kind(&self) -> Kind {
        self.symbol.kind
    }
}

/// A symbol found by `resolve`: either a scope in the tree or an external
/// symbol from the resolver.
#[derive(Debug, Clone)]
pub struct Resolved {
    pub symbol: Symbol,
    pub scope: Option<ScopeId>,
}

#[derive(Clone)]
pub struct ScopeTree {
    arena: Arena<Scope>,
    root: ScopeId,
    resolver: Option<Arc<dyn Resolver>>,
    lines: LineIndex,
}

impl fmt::Debug for ScopeTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopeTree")
            .field("scopes", &self.arena.len())
            .field("has_resolver", &self.resolver.is_some())
            .finish()
    }
}

impl ScopeTree {
    pub fn new(source: &str) -> Self {
        let mut arena = Arena::new();
        let root = arena.alloc_with_id(|id| Scope {
            id,
            symbol: Symbol::new("", Kind::Block, Type::Invalid),
            parent: None,
            children: Vec::new(),
            channels: Channels::new(),
            counter: Some(0),
        });
        Self {
            arena,
            root,
            resolver: None,
            lines: LineIndex::new(source),
        }
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn Resolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn root(&self) -> ScopeId {
        self.root
    }

    pub fn get(&self, id: ScopeId) -> &Scope {
        &self.arena[id]
    }

    pub fn get_mut(&mut self, id: ScopeId) -> &mut Scope {
        &mut self.arena[id]
    }

    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = &Scope> {
        self.arena.iter().map(|(_, scope)| scope)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Scope> {
        self.arena.iter_mut().map(|(_, scope)| scope)
    }

    pub fn children(&self, id: ScopeId) -> impl Iterator<Item = &Scope> {
        self.arena[id].children.iter().map(|&c| &self.arena[c])
    }

    pub fn ancestors(&self, id: ScopeId) -> AncestorIter<'_> {
        AncestorIter {
            tree: self,
            current: Some(id),
        }
    }

    /// Add `symbol` as a child of `parent` and return the new scope.
    pub fn add(&mut self, parent: ScopeId, mut symbol: Symbol) -> Result<ScopeId, ResolveError> {
        if symbol.is_named() {
            if let Some(existing) = self.conflicting(parent, &symbol.name) {
                let (line, col) = existing
                    .symbol
                    .span
                    .map(|s| self.lines.line_col(s.start))
                    .unwrap_or((0, 0));
                return Err(ResolveError::Conflict {
                    name: symbol.name,
                    line,
                    col,
                });
            }
            if symbol.id.is_none() {
                symbol.id = Some(self.next_id(parent));
            }
        }
        let counter = (symbol.kind == Kind::Function).then_some(0);
        let id = self.arena.alloc_with_id(|id| Scope {
            id,
            symbol,
            parent: Some(parent),
            children: Vec::new(),
            channels: Channels::new(),
            counter,
        });
        self.arena[parent].children.push(id);
        Ok(id)
    }

    fn conflicting(&self, parent: ScopeId, name: &str) -> Option<&Scope> {
        if let Some(sibling) = self.children(parent).find(|c| c.symbol.is_named() && c.name() == name) {
            return Some(sibling);
        }
        let scope = self.get(parent);
        let function = match scope.kind() {
            Kind::Function => Some(scope),
            Kind::Block => scope
                .parent
                .map(|p| self.get(p))
                .filter(|p| p.kind() == Kind::Function),
            _ => None,
        };
        function.filter(|f| f.name() == name)
    }

    fn next_id(&mut self, from: ScopeId) -> u32 {
        let owner = self
            .ancestors(from)
            .find(|s| s.counter.is_some())
            .map(|s| s.id)
            .unwrap_or(self.root);
        let counter = self.arena[owner].counter.get_or_insert(0);
        let id = *counter;
        *counter += 1;
        id
    }

    /// Look `name` up from `from` outward, then in the resolver.
    pub fn resolve(&self, from: ScopeId, name: &str) -> Result<Resolved, ResolveError> {
        for scope in self.ancestors(from) {
            if let Some(found) = self
                .children(scope.id)
                .find(|c| c.symbol.is_named() && c.name() == name)
            {
                return Ok(Resolved {
                    symbol: found.symbol.clone(),
                    scope: Some(found.id),
                });
            }
        }
        self.resolver
            .as_ref()
            .and_then(|r| r.resolve(name))
            .map(|symbol| Resolved {
                symbol,
                scope: None,
            })
            .ok_or_else(|| ResolveError::Undefined(name.to_string()))
    }

    /// The nearest scope of `kind`, starting with `from` itself.
    pub fn closest_ancestor_of_kind(&self, from: ScopeId, kind: Kind) -> Option<ScopeId> {
        self.ancestors(from).find(|s| s.kind() == kind).map(|s| s.id)
    }

    pub fn first_child_of_kind(&self, id: ScopeId, kind: Kind) -> Option<ScopeId> {
        self.children(id).find(|c| c.kind() == kind).map(|c| c.id)
    }

    pub fn children_of_kind(&self, id: ScopeId, kind: Kind) -> Vec<ScopeId> {
        self.children(id)
            .filter(|c| c.kind() == kind)
            .map(|c| c.id)
            .collect()
    }

    /// Every visible symbol whose name starts with `prefix`. Inner scopes
    /// shadow outer ones; resolver symbols come last.
    pub fn search(&self, from: ScopeId, prefix: &str) -> Vec<Symbol> {
        let mut seen = BTreeSet::new();
        let mut out = Vec::new();
        for scope in self.ancestors(from) {
            for child in self.children(scope.id) {
                if child.symbol.is_named()
                    && child.name().starts_with(prefix)
                    && seen.insert(child.name().to_string())
                {
                    out.push(child.symbol.clone());
                }
            }
        }
        if let Some(resolver) = &self.resolver {
            for symbol in resolver.search(prefix) {
                if seen.insert(symbol.name.clone()) {
                    out.push(symbol);
                }
            }
        }
        out
    }

    /// Position of a span start, 1-based line and 0-based column.
    pub fn position(&self, span: Span) -> (usize, usize) {
        self.lines.line_col(span.start)
    }
}

pub struct AncestorIter<'a> {
    tree: &'a ScopeTree,
    current: Option<ScopeId>,
}

impl<'a> Iterator for AncestorIter<'a> {
    type Item = &'a Scope;

    fn next(&mut self) -> Option<Self::Item> {
        let current_id = self.current?;
        let scope = &self.tree.arena[current_id];
        self.current = scope.parent;
        Some(scope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chumsky::span::Span as _;

    fn span_at(start: usize) -> Span {
        Span::new((), start..start + 1)
    }

    fn var(name: &str) -> Symbol {
        Symbol::new(name, Kind::Variable, Type::I32)
    }

    #[test]
    fn add_and_resolve() {
        let mut tree = ScopeTree::new("");
        let root = tree.root();
        tree.add(root, var("x")).unwrap();
        let found = tree.resolve(root, "x").unwrap();
        assert_eq!(found.symbol.kind, Kind::Variable);
        assert_eq!(found.symbol.id, Some(0));
    }

    #[test]
    fn resolve_walks_ancestors() {
        let mut tree = ScopeTree::new("");
        let root = tree.root();
        tree.add(root, var("outer")).unwrap();
        let block = tree.add(root, Symbol::block()).unwrap();
        let inner = tree.add(block, Symbol::block()).unwrap();
        assert!(tree.resolve(inner, "outer").is_ok());
    }

    #[test]
    fn undefined_symbol() {
        let tree = ScopeTree::new("");
        let err = tree.resolve(tree.root(), "ghost").unwrap_err();
        assert_eq!(err.to_string(), "undefined symbol: ghost");
    }

    #[test]
    fn sibling_conflict_reports_position() {
        let source = "x := 1\n  x := 2";
        let mut tree = ScopeTree::new(source);
        let root = tree.root();
        tree.add(root, var("x").with_span(span_at(0))).unwrap();
        let err = tree
            .add(root, var("x").with_span(span_at(9)))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "name x conflicts with existing symbol at line 1, col 0"
        );
    }

    #[test]
    fn nested_shadowing_is_allowed() {
        let mut tree = ScopeTree::new("");
        let root = tree.root();
        tree.add(root, var("x")).unwrap();
        let block = tree.add(root, Symbol::block()).unwrap();
        assert!(tree.add(block, var("x")).is_ok());
    }

    #[test]
    fn function_name_conflicts_in_body() {
        let mut tree = ScopeTree::new("");
        let root = tree.root();
        let func = tree
            .add(root, Symbol::new("f", Kind::Function, Type::Invalid))
            .unwrap();
        let body = tree.add(func, Symbol::block()).unwrap();
        assert!(tree.add(body, var("f")).is_err());
        let nested = tree.add(body, Symbol::block()).unwrap();
        assert!(tree.add(nested, var("f")).is_ok());
    }

    #[test]
    fn functions_own_counters() {
        let mut tree = ScopeTree::new("");
        let root = tree.root();
        tree.add(root, var("a")).unwrap();
        let func = tree
            .add(root, Symbol::new("f", Kind::Function, Type::Invalid))
            .unwrap();
        let body = tree.add(func, Symbol::block()).unwrap();
        let local = tree.add(body, var("y")).unwrap();
        assert_eq!(tree.get(func).symbol.id, Some(1));
        assert_eq!(tree.get(local).symbol.id, Some(0));
        assert_eq!(tree.get(body).symbol.id, None);
    }

    #[test]
    fn resolver_symbols_resolve_and_can_be_shadowed() {
        let resolver = MapResolver::new().channel("sensor", 12, Type::F64);
        let mut tree = ScopeTree::new("").with_resolver(Arc::new(resolver));
        let root = tree.root();
        let found = tree.resolve(root, "sensor").unwrap();
        assert_eq!(found.symbol.id, Some(12));
        assert!(found.scope.is_none());
        assert!(tree.add(root, var("sensor")).is_ok());
        assert!(tree.resolve(root, "sensor").unwrap().scope.is_some());
    }

    #[test]
    fn closest_ancestor_includes_self() {
        let mut tree = ScopeTree::new("");
        let root = tree.root();
        let func = tree
            .add(root, Symbol::new("f", Kind::Function, Type::Invalid))
            .unwrap();
        let body = tree.add(func, Symbol::block()).unwrap();
        assert_eq!(tree.closest_ancestor_of_kind(body, Kind::Function), Some(func));
        assert_eq!(tree.closest_ancestor_of_kind(func, Kind::Function), Some(func));
        assert_eq!(tree.closest_ancestor_of_kind(root, Kind::Function), None);
    }

    #[test]
    fn search_prefers_inner_scopes() {
        let resolver = MapResolver::new().channel("temp_ext", 1, Type::F32);
        let mut tree = ScopeTree::new("").with_resolver(Arc::new(resolver));
        let root = tree.root();
        tree.add(root, Symbol::new("temp", Kind::Variable, Type::I32)).unwrap();
        let block = tree.add(root, Symbol::block()).unwrap();
        tree.add(block, Symbol::new("temp", Kind::Variable, Type::F64)).unwrap();
        tree.add(block, var("other")).unwrap();
        let found = tree.search(block, "te");
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].ty, Type::F64);
        assert_eq!(found[1].name, "temp_ext");
    }
}
