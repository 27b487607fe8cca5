//! Scoped symbol table with namespace-aware lookup and overload resolution.
use fnv::FnvHashMap as HashMap;
use fxc_core::spirv::StorageClass;
use fxc_core::{Id, Type};
use std::rc::Rc;

use crate::intrinsic::{self, Intrinsic};

/// A lexical scope: its fully qualified name (`"::"`, `"::A::"`, …), its
/// nesting level and how many of those levels are namespaces.
#[derive(PartialEq, Eq, Clone, Debug)]
pub struct Scope {
    pub name: String,
    pub level: u32,
    pub namespace_level: u32,
}

#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum SymbolKind {
    Variable,
    StructType,
    Function,
}

#[derive(Clone, Debug)]
pub struct FunctionParam {
    pub name: String,
    pub ty: Type,
    pub semantic: String,
}

/// Signature record of a user-defined function, shared between the symbol
/// table and the entry-point synthesizer.
#[derive(Clone, Debug)]
pub struct FunctionInfo {
    pub name: String,
    pub unique_name: String,
    pub definition: Id,
    pub return_type: Type,
    pub return_semantic: String,
    pub params: Vec<FunctionParam>,
}

#[derive(Clone, Debug)]
pub struct SymbolData {
    pub scope: Scope,
    pub id: Id,
    pub kind: SymbolKind,
    pub ty: Type,
    pub storage: StorageClass,
    pub function: Option<Rc<FunctionInfo>>,
}

/// Result of `resolve_call`.
pub enum CallSymbol {
    Function(Rc<FunctionInfo>),
    Intrinsic(&'static Intrinsic),
}

pub enum CallError {
    /// More than one candidate ranked equally well.
    Ambiguous,
    /// No candidate accepted the argument types.
    NoMatch,
}

pub struct SymbolTable {
    stack: HashMap<String, Vec<SymbolData>>,
    current_scope: Scope,
    parent_stack: Vec<Id>,
}

impl SymbolTable {
    pub fn new() -> SymbolTable {
        SymbolTable {
            stack: HashMap::default(),
            current_scope: Scope {
                name: "::".to_owned(),
                level: 0,
                namespace_level: 0,
            },
            parent_stack: Vec::new(),
        }
    }

    pub fn current_scope(&self) -> &Scope {
        &self.current_scope
    }
    /// The function whose body is currently being parsed, if any.
    pub fn current_parent(&self) -> Option<Id> {
        self.parent_stack.last().copied().filter(|x| *x != 0)
    }

    pub fn enter_scope(&mut self, parent: Id) {
        if parent != 0 || self.parent_stack.is_empty() {
            self.parent_stack.push(parent);
        } else {
            let top = *self.parent_stack.last().unwrap();
            self.parent_stack.push(top);
        }
        self.current_scope.level += 1;
    }
    pub fn leave_scope(&mut self) {
        debug_assert!(self.current_scope.level > 0);
        let level = self.current_scope.level;
        for symbols in self.stack.values_mut() {
            symbols.retain(|symbol| {
                !(symbol.scope.level > symbol.scope.namespace_level
                    && symbol.scope.level >= level)
            });
        }
        self.parent_stack.pop();
        self.current_scope.level -= 1;
    }

    pub fn enter_namespace(&mut self, name: &str) {
        self.current_scope.name.push_str(name);
        self.current_scope.name.push_str("::");
        self.current_scope.level += 1;
        self.current_scope.namespace_level += 1;
    }
    pub fn leave_namespace(&mut self) {
        debug_assert!(self.current_scope.level > 0);
        debug_assert!(self.current_scope.namespace_level > 0);
        // Drop the trailing `name::` segment.
        let name = &self.current_scope.name;
        let truncated = name[..name.len() - 2]
            .rfind("::")
            .map(|x| x + 2)
            .unwrap_or(0);
        self.current_scope.name.truncate(truncated);
        self.current_scope.level -= 1;
        self.current_scope.namespace_level -= 1;
    }

    /// Bind `name` in the current scope. A `global` binding is additionally
    /// reachable from every enclosing namespace by walking the `::` chain.
    /// Returns false on a duplicate; function symbols may always coexist.
    pub fn insert(&mut self, name: &str, data: SymbolData, global: bool) -> bool {
        if data.kind != SymbolKind::Function
            && self
                .find_in(name, &self.current_scope.clone(), true)
                .is_some()
        {
            return false;
        }

        fn insert_sorted(symbols: &mut Vec<SymbolData>, data: SymbolData) {
            let position = symbols
                .iter()
                .position(|x| x.scope.namespace_level > data.scope.namespace_level)
                .unwrap_or(symbols.len());
            symbols.insert(position, data);
        }

        if global {
            let full = self.current_scope.name.clone();
            let mut scope = Scope {
                name: String::new(),
                level: 0,
                namespace_level: 0,
            };
            // Walk the scope chain from the global scope back down to the
            // current namespace, registering the symbol under the name each
            // scope would use to refer to it.
            let mut pos = 0;
            loop {
                let next = match full[pos..].find("::") {
                    Some(x) => pos + x + 2,
                    None => break,
                };
                scope.name = full[..next].to_owned();
                let qualified = format!("{}{}", &full[next..], name);
                let mut entry = data.clone();
                entry.scope = scope.clone();
                insert_sorted(self.stack.entry(qualified).or_default(), entry);
                scope.namespace_level += 1;
                scope.level = scope.namespace_level;
                pos = next;
            }
        } else {
            let mut entry = data;
            entry.scope = self.current_scope.clone();
            insert_sorted(self.stack.entry(name.to_owned()).or_default(), entry);
        }
        true
    }

    pub fn find(&self, name: &str) -> Option<SymbolData> {
        self.find_in(name, &self.current_scope, false)
    }

    /// Search for `name`, walking the scope chain outward from `scope`.
    /// `exclusive` restricts the search to exactly that scope level.
    pub fn find_in(&self, name: &str, scope: &Scope, exclusive: bool) -> Option<SymbolData> {
        let symbols = self.stack.get(name)?;
        let mut result: Option<&SymbolData> = None;

        for symbol in symbols.iter().rev() {
            if symbol.scope.level > scope.level
                || symbol.scope.namespace_level > scope.namespace_level
                || (symbol.scope.namespace_level == scope.namespace_level
                    && symbol.scope.name != scope.name)
            {
                continue;
            }
            if exclusive && symbol.scope.level < scope.level {
                continue;
            }
            if symbol.kind == SymbolKind::Variable || symbol.kind == SymbolKind::StructType {
                return Some(symbol.clone());
            }
            if result.is_none() {
                result = Some(symbol);
            }
        }
        result.cloned()
    }

    /// Resolve a call to `name` with the given argument types: pick the best
    /// user-defined overload visible from `scope`, falling back to the
    /// intrinsic catalog when no user function is viable.
    pub fn resolve_call(
        &self,
        name: &str,
        arguments: &[Type],
        scope: &Scope,
    ) -> Result<CallSymbol, CallError> {
        let mut best: Option<Rc<FunctionInfo>> = None;
        let mut best_params: Vec<Type> = Vec::new();
        let mut count = 0u32;
        let mut namespace = scope.namespace_level;

        if let Some(symbols) = self.stack.get(name) {
            for symbol in symbols.iter().rev() {
                if symbol.scope.level > scope.level
                    || symbol.scope.namespace_level > scope.namespace_level
                    || symbol.kind != SymbolKind::Function
                {
                    continue;
                }
                let function = match &symbol.function {
                    Some(function) => function,
                    None => continue,
                };
                if function.params.len() != arguments.len() {
                    continue;
                }
                let params = function.params.iter().map(|x| x.ty).collect::<Vec<_>>();
                match compare_overloads(arguments, &params, &best_params, best.is_some()) {
                    Preference::Better => {
                        best = Some(function.clone());
                        best_params = params;
                        count = 1;
                        namespace = symbol.scope.namespace_level;
                    }
                    Preference::Tied if namespace == symbol.scope.namespace_level => count += 1,
                    _ => {}
                }
            }
        }

        if count == 0 {
            let mut best_intrinsic: Option<&'static Intrinsic> = None;
            for candidate in intrinsic::candidates(name) {
                if candidate.params.len() != arguments.len() {
                    continue;
                }
                match compare_overloads(
                    arguments,
                    candidate.params,
                    &best_params,
                    best_intrinsic.is_some(),
                ) {
                    Preference::Better => {
                        best_intrinsic = Some(candidate);
                        best_params = candidate.params.to_vec();
                        count = 1;
                    }
                    Preference::Tied if namespace == 0 => count += 1,
                    _ => {}
                }
            }
            return match (best_intrinsic, count) {
                (Some(intrinsic), 1) => Ok(CallSymbol::Intrinsic(intrinsic)),
                (_, x) if x > 1 => Err(CallError::Ambiguous),
                _ => Err(CallError::NoMatch),
            };
        }

        match (best, count) {
            (Some(function), 1) => Ok(CallSymbol::Function(function)),
            (_, x) if x > 1 => Err(CallError::Ambiguous),
            _ => Err(CallError::NoMatch),
        }
    }
}

enum Preference {
    Better,
    Tied,
    Worse,
}

/// Decide whether the candidate with `params` beats the incumbent with
/// `incumbent_params`. Per-argument conversion ranks are sorted descending
/// and compared lexicographically, lower (closer) first.
fn compare_overloads(
    arguments: &[Type],
    params: &[Type],
    incumbent_params: &[Type],
    has_incumbent: bool,
) -> Preference {
    let mut ranks = Vec::with_capacity(arguments.len());
    for (argument, param) in arguments.iter().zip(params.iter()) {
        let rank = Type::rank(argument, param);
        if rank == 0 {
            return Preference::Worse;
        }
        ranks.push(rank);
    }
    if !has_incumbent {
        return Preference::Better;
    }
    let mut incumbent_ranks = Vec::with_capacity(arguments.len());
    for (argument, param) in arguments.iter().zip(incumbent_params.iter()) {
        let rank = Type::rank(argument, param);
        if rank == 0 {
            return Preference::Better;
        }
        incumbent_ranks.push(rank);
    }
    ranks.sort_unstable_by(|a, b| b.cmp(a));
    incumbent_ranks.sort_unstable_by(|a, b| b.cmp(a));
    for (mine, theirs) in ranks.iter().zip(incumbent_ranks.iter()) {
        if mine < theirs {
            return Preference::Better;
        }
        if theirs < mine {
            return Preference::Worse;
        }
    }
    Preference::Tied
}

#[cfg(test)]
mod test {
    use super::*;
    use fxc_core::BaseType;

    fn variable(id: Id) -> SymbolData {
        SymbolData {
            scope: Scope {
                name: String::new(),
                level: 0,
                namespace_level: 0,
            },
            id,
            kind: SymbolKind::Variable,
            ty: Type::scalar(BaseType::Float),
            storage: StorageClass::Private,
            function: None,
        }
    }

    fn function(id: Id, params: &[Type]) -> SymbolData {
        let info = FunctionInfo {
            name: String::new(),
            unique_name: String::new(),
            definition: id,
            return_type: Type::VOID,
            return_semantic: String::new(),
            params: params
                .iter()
                .map(|ty| FunctionParam {
                    name: String::new(),
                    ty: *ty,
                    semantic: String::new(),
                })
                .collect(),
        };
        SymbolData {
            scope: Scope {
                name: String::new(),
                level: 0,
                namespace_level: 0,
            },
            id,
            kind: SymbolKind::Function,
            ty: Type::VOID,
            storage: StorageClass::Private,
            function: Some(Rc::new(info)),
        }
    }

    #[test]
    fn test_shadowing_restores_outer_binding() {
        let mut table = SymbolTable::new();
        assert!(table.insert("x", variable(100), false));
        let outer = table.find("x").unwrap().id;

        table.enter_scope(0);
        assert!(table.insert("x", variable(200), false));
        assert_eq!(table.find("x").unwrap().id, 200);
        table.leave_scope();

        assert_eq!(table.find("x").unwrap().id, outer);
    }

    #[test]
    fn test_duplicate_in_same_scope() {
        let mut table = SymbolTable::new();
        assert!(table.insert("x", variable(100), false));
        assert!(!table.insert("x", variable(101), false));
        // Functions overload instead of colliding.
        assert!(table.insert("f", function(1, &[Type::scalar(BaseType::Int)]), true));
        assert!(table.insert("f", function(2, &[Type::scalar(BaseType::Float)]), true));
    }

    #[test]
    fn test_namespace_qualified_lookup() {
        let mut table = SymbolTable::new();
        table.enter_namespace("A");
        assert!(table.insert("x", variable(7), true));
        table.leave_namespace();

        assert!(table.find("x").is_none());
        assert!(table.find("A::x").is_some());
    }

    #[test]
    fn test_overload_resolution_prefers_exact() {
        let int = Type::scalar(BaseType::Int);
        let float = Type::scalar(BaseType::Float);
        let mut table = SymbolTable::new();
        table.insert("f", function(1, &[int]), true);
        table.insert("f", function(2, &[float]), true);

        let scope = table.current_scope().clone();
        match table.resolve_call("f", &[int], &scope) {
            Ok(CallSymbol::Function(info)) => assert_eq!(info.definition, 1),
            _ => panic!("expected the int overload"),
        }
        match table.resolve_call("f", &[float], &scope) {
            Ok(CallSymbol::Function(info)) => assert_eq!(info.definition, 2),
            _ => panic!("expected the float overload"),
        }
    }

    #[test]
    fn test_ambiguous_call() {
        let int = Type::scalar(BaseType::Int);
        let uint = Type::scalar(BaseType::Uint);
        let float = Type::scalar(BaseType::Float);
        let mut table = SymbolTable::new();
        // float argument converts to int and uint at the same rank.
        table.insert("f", function(1, &[int]), true);
        table.insert("f", function(2, &[uint]), true);

        let scope = table.current_scope().clone();
        assert!(matches!(
            table.resolve_call("f", &[float], &scope),
            Err(CallError::Ambiguous)
        ));
    }

    #[test]
    fn test_intrinsic_fallback() {
        let table = SymbolTable::new();
        let scope = table.current_scope().clone();
        let float3 = Type::vector(BaseType::Float, 3);
        match table.resolve_call("cross", &[float3, float3], &scope) {
            Ok(CallSymbol::Intrinsic(intrinsic)) => assert_eq!(intrinsic.name, "cross"),
            _ => panic!("expected the cross intrinsic"),
        }
    }

    #[test]
    fn test_user_function_hides_intrinsic() {
        let float3 = Type::vector(BaseType::Float, 3);
        let mut table = SymbolTable::new();
        table.insert("cross", function(9, &[float3, float3]), true);
        let scope = table.current_scope().clone();
        match table.resolve_call("cross", &[float3, float3], &scope) {
            Ok(CallSymbol::Function(info)) => assert_eq!(info.definition, 9),
            _ => panic!("expected the user function"),
        }
    }

    #[test]
    fn test_mul_selects_matrix_vector() {
        use crate::intrinsic::Lowering;
        use fxc_core::spirv::Op;
        let table = SymbolTable::new();
        let scope = table.current_scope().clone();
        let m = Type::matrix(BaseType::Float, 4, 4);
        let v = Type::vector(BaseType::Float, 4);
        match table.resolve_call("mul", &[m, v], &scope) {
            Ok(CallSymbol::Intrinsic(intrinsic)) => {
                assert_eq!(intrinsic.lowering, Lowering::Op(Op::MatrixTimesVector))
            }
            _ => panic!("expected the matrix*vector overload"),
        }
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let table = SymbolTable::new();
        let scope = table.current_scope().clone();
        let f = Type::scalar(BaseType::Float);
        let f3 = Type::vector(BaseType::Float, 3);
        let first = match table.resolve_call("lerp", &[f3, f3, f], &scope) {
            Ok(CallSymbol::Intrinsic(x)) => x as *const _,
            _ => panic!("no overload"),
        };
        for _ in 0..16 {
            match table.resolve_call("lerp", &[f3, f3, f], &scope) {
                Ok(CallSymbol::Intrinsic(x)) => assert!(std::ptr::eq(x, first)),
                _ => panic!("no overload"),
            }
        }
    }
}
