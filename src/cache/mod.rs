//! Bytecode supply: resolving a callee and its type context to a compiled
//! bytecode function, plus the import data that owns modules, their type
//! information and the cache itself.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use tracing::debug;

use crate::ast::{Function, Module};
use crate::bytecode::BytecodeFunction;
use crate::vm::{VmError, VmResult};

/// Parametric values fixing one instantiation of a generic function, in
/// declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct SymbolicBindings {
    bindings: Vec<(String, i64)>,
}

impl SymbolicBindings {
    pub fn new(bindings: Vec<(String, i64)>) -> Self {
        SymbolicBindings { bindings }
    }

    pub fn get(&self, identifier: &str) -> Option<i64> {
        self.bindings.iter().find(|(k, _)| k == identifier).map(|(_, v)| *v)
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, i64)> {
        self.bindings.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

impl fmt::Display for SymbolicBindings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (k, v)) in self.bindings.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{k}: {v}")?;
        }
        write!(f, "}}")
    }
}

/// Type context for a module. Parametric instantiations hang off the module
/// root as children carrying their bindings.
#[derive(Debug)]
pub struct TypeInfo {
    id: usize,
    module: String,
    parent: Option<Rc<TypeInfo>>,
    bindings: Option<SymbolicBindings>,
}

impl TypeInfo {
    pub fn id(&self) -> usize {
        self.id
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn parent(&self) -> Option<&Rc<TypeInfo>> {
        self.parent.as_ref()
    }

    /// Bindings of this instantiation; `None` for a module root.
    pub fn bindings(&self) -> Option<&SymbolicBindings> {
        self.bindings.as_ref()
    }

    /// Looks `identifier` up in this instantiation, then its ancestors.
    pub fn binding(&self, identifier: &str) -> Option<i64> {
        self.bindings
            .as_ref()
            .and_then(|b| b.get(identifier))
            .or_else(|| self.parent().and_then(|p| p.binding(identifier)))
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}

/// Hands out type infos with ids unique to one `ImportData`.
#[derive(Debug, Default)]
pub struct TypeInfoOwner {
    next_id: Cell<usize>,
}

impl TypeInfoOwner {
    fn next(&self) -> usize {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        id
    }

    pub fn new_root(&self, module: &str) -> Rc<TypeInfo> {
        Rc::new(TypeInfo { id: self.next(), module: module.to_string(), parent: None, bindings: None })
    }

    pub fn new_child(&self, parent: &Rc<TypeInfo>, bindings: SymbolicBindings) -> Rc<TypeInfo> {
        Rc::new(TypeInfo {
            id: self.next(),
            module: parent.module.clone(),
            parent: Some(parent.clone()),
            bindings: Some(bindings),
        })
    }
}

/// What the interpreter needs from whoever owns compiled bytecode.
///
/// Resolving the same function, type info and bindings twice must return the
/// same `Rc` for as long as the type info lives.
pub trait BytecodeCache {
    fn get_or_create_bytecode_function(
        &self,
        f: &Rc<Function>,
        type_info: &Rc<TypeInfo>,
        caller_bindings: Option<&SymbolicBindings>,
    ) -> VmResult<Rc<BytecodeFunction>>;
}

/// Translates a function into bytecode; the compiler stage implements this.
pub trait BytecodeEmitter {
    fn emit(
        &self,
        f: &Rc<Function>,
        type_info: &Rc<TypeInfo>,
        caller_bindings: Option<&SymbolicBindings>,
    ) -> VmResult<BytecodeFunction>;
}

type CacheKey = (String, usize, Option<SymbolicBindings>);

/// Memoizes an emitter so each instantiation is translated once.
pub struct MemoizedCache<E> {
    emitter: E,
    entries: RefCell<HashMap<CacheKey, Rc<BytecodeFunction>>>,
}

impl<E: BytecodeEmitter> MemoizedCache<E> {
    pub fn new(emitter: E) -> Self {
        MemoizedCache { emitter, entries: RefCell::new(HashMap::new()) }
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }
}

impl<E: BytecodeEmitter> BytecodeCache for MemoizedCache<E> {
    fn get_or_create_bytecode_function(
        &self,
        f: &Rc<Function>,
        type_info: &Rc<TypeInfo>,
        caller_bindings: Option<&SymbolicBindings>,
    ) -> VmResult<Rc<BytecodeFunction>> {
        let key = (f.identifier(), type_info.id(), caller_bindings.cloned());
        if let Some(bf) = self.entries.borrow().get(&key) {
            return Ok(bf.clone());
        }
        debug!(function = %key.0, type_info = key.1, parametric = !type_info.is_root(), "emitting bytecode");
        let bf = Rc::new(self.emitter.emit(f, type_info, caller_bindings)?);
        self.entries.borrow_mut().insert(key, bf.clone());
        Ok(bf)
    }
}

#[derive(Debug, Clone)]
pub struct ModuleInfo {
    pub module: Rc<Module>,
    pub type_info: Rc<TypeInfo>,
}

/// Owner of every imported module, its root type info and the bytecode cache.
#[derive(Default)]
pub struct ImportData {
    modules: HashMap<String, ModuleInfo>,
    type_info_owner: TypeInfoOwner,
    instantiations: RefCell<HashMap<(usize, SymbolicBindings), Rc<TypeInfo>>>,
    bytecode_cache: Option<Box<dyn BytecodeCache>>,
}

impl ImportData {
    pub fn new() -> Self {
        ImportData::default()
    }

    /// Registers `module`, giving it a fresh root type info.
    pub fn put(&mut self, module: Rc<Module>) -> Rc<TypeInfo> {
        let type_info = self.type_info_owner.new_root(&module.name);
        self.modules.insert(
            module.name.clone(),
            ModuleInfo { module, type_info: type_info.clone() },
        );
        type_info
    }

    pub fn get(&self, name: &str) -> Option<&ModuleInfo> {
        self.modules.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.modules.contains_key(name)
    }

    pub fn root_type_info(&self, module: &Module) -> VmResult<Rc<TypeInfo>> {
        self.modules
            .get(&module.name)
            .map(|info| info.type_info.clone())
            .ok_or_else(|| VmError::InvalidArgument(format!("no type information for module `{}`", module.name)))
    }

    pub fn type_info_owner(&self) -> &TypeInfoOwner {
        &self.type_info_owner
    }

    /// The child of `parent` for one parametric instantiation. Asking twice
    /// with equal bindings returns the same type info.
    pub fn instantiation(&self, parent: &Rc<TypeInfo>, bindings: &SymbolicBindings) -> Rc<TypeInfo> {
        let key = (parent.id(), bindings.clone());
        if let Some(ti) = self.instantiations.borrow().get(&key) {
            return ti.clone();
        }
        let ti = self.type_info_owner.new_child(parent, bindings.clone());
        debug!(parent = parent.id(), type_info = ti.id(), bindings = %bindings, "new instantiation");
        self.instantiations.borrow_mut().insert(key, ti.clone());
        ti
    }

    pub fn set_bytecode_cache(&mut self, cache: Box<dyn BytecodeCache>) {
        self.bytecode_cache = Some(cache);
    }

    pub fn bytecode_cache(&self) -> Option<&dyn BytecodeCache> {
        self.bytecode_cache.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Span;
    use crate::bytecode::{Bytecode, Op};

    struct CountingEmitter {
        calls: Rc<Cell<usize>>,
    }

    impl BytecodeEmitter for CountingEmitter {
        fn emit(
            &self,
            f: &Rc<Function>,
            type_info: &Rc<TypeInfo>,
            _caller_bindings: Option<&SymbolicBindings>,
        ) -> VmResult<BytecodeFunction> {
            self.calls.set(self.calls.get() + 1);
            Ok(BytecodeFunction::new(
                f.clone(),
                Some(type_info.clone()),
                vec![Bytecode::new(Span::UNKNOWN, Op::JumpDest)],
            ))
        }
    }

    fn function(name: &str) -> Rc<Function> {
        Rc::new(Function {
            module: "top".to_string(),
            name: name.to_string(),
            params: Vec::new(),
            return_type: None,
            is_test: false,
            span: Span::UNKNOWN,
        })
    }

    #[test]
    fn bindings_display_and_lookup() {
        let b = SymbolicBindings::new(vec![("N".to_string(), 8), ("M".to_string(), -2)]);
        assert_eq!(b.to_string(), "{N: 8, M: -2}");
        assert_eq!(b.get("M"), Some(-2));
        assert_eq!(b.get("K"), None);
        assert!(SymbolicBindings::default().is_empty());
    }

    #[test]
    fn type_info_ids_are_unique() {
        let owner = TypeInfoOwner::default();
        let root = owner.new_root("top");
        let child = owner.new_child(&root, SymbolicBindings::new(vec![("N".to_string(), 4)]));
        assert_ne!(root.id(), child.id());
        assert!(root.is_root());
        assert!(!child.is_root());
        assert_eq!(child.module(), "top");
        assert_eq!(child.bindings().and_then(|b| b.get("N")), Some(4));
    }

    #[test]
    fn child_bindings_shadow_ancestors() {
        let owner = TypeInfoOwner::default();
        let root = owner.new_root("top");
        let outer = owner.new_child(&root, SymbolicBindings::new(vec![("N".to_string(), 4), ("M".to_string(), 1)]));
        let inner = owner.new_child(&outer, SymbolicBindings::new(vec![("N".to_string(), 8)]));
        assert_eq!(inner.binding("N"), Some(8));
        assert_eq!(inner.binding("M"), Some(1));
        assert_eq!(inner.binding("K"), None);
        assert!(Rc::ptr_eq(inner.parent().unwrap(), &outer));
        assert_eq!(root.binding("N"), None);
    }

    #[test]
    fn instantiations_are_shared() {
        let mut data = ImportData::new();
        let root = data.put(Rc::new(Module::new("top")));
        let n8 = SymbolicBindings::new(vec![("N".to_string(), 8)]);
        let a = data.instantiation(&root, &n8);
        let b = data.instantiation(&root, &n8);
        let c = data.instantiation(&root, &SymbolicBindings::new(vec![("N".to_string(), 16)]));
        assert!(Rc::ptr_eq(&a, &b));
        assert!(!Rc::ptr_eq(&a, &c));
        assert!(Rc::ptr_eq(a.parent().unwrap(), &root));
        assert_eq!(a.binding("N"), Some(8));
    }

    #[test]
    fn memoized_cache_is_idempotent() {
        let calls = Rc::new(Cell::new(0));
        let cache = MemoizedCache::new(CountingEmitter { calls: calls.clone() });
        let owner = TypeInfoOwner::default();
        let ti = owner.new_root("top");
        let f = function("f");

        let a = cache.get_or_create_bytecode_function(&f, &ti, None).unwrap();
        let b = cache.get_or_create_bytecode_function(&f, &ti, None).unwrap();
        assert!(Rc::ptr_eq(&a, &b));
        assert_eq!(calls.get(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn distinct_instantiations_are_cached_separately() {
        let calls = Rc::new(Cell::new(0));
        let cache = MemoizedCache::new(CountingEmitter { calls: calls.clone() });
        let owner = TypeInfoOwner::default();
        let ti = owner.new_root("top");
        let f = function("f");
        let n8 = SymbolicBindings::new(vec![("N".to_string(), 8)]);
        let n16 = SymbolicBindings::new(vec![("N".to_string(), 16)]);

        let a = cache.get_or_create_bytecode_function(&f, &ti, Some(&n8)).unwrap();
        let b = cache.get_or_create_bytecode_function(&f, &ti, Some(&n16)).unwrap();
        let c = cache.get_or_create_bytecode_function(&f, &ti, Some(&n8)).unwrap();
        assert!(!Rc::ptr_eq(&a, &b));
        assert!(Rc::ptr_eq(&a, &c));
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn import_data_tracks_modules() {
        let mut data = ImportData::new();
        assert!(data.bytecode_cache().is_none());
        let module = Rc::new(Module::new("top"));
        let ti = data.put(module.clone());
        assert!(data.contains("top"));
        assert_eq!(data.root_type_info(&module).unwrap().id(), ti.id());

        let other = Module::new("other");
        let err = data.root_type_info(&other).unwrap_err();
        assert!(err.to_string().contains("other"));
    }
}
