//! Plans a checked AST into an evaluable node tree.
//!
//! One evaluable node per source node, threading the reference map: call
//! nodes carry the overloads checking resolved; ident/select/index chains
//! fold into attribute nodes so partial evaluation sees whole trails.
//! Unchecked ASTs (residuals) plan too, falling back to container-candidate
//! resolution and name-based overload lookup.

use std::sync::Arc;

use verdict_compiler::ast::{Ast, Constant, Expr, ExprKind, Reference};
use verdict_compiler::container::Container;
use verdict_core::map::MapKey;
use verdict_core::registry::TypeRegistry;
use verdict_core::types::Type;
use verdict_core::value::Value;

use crate::attributes::{AttributeNode, Qualifier};
use crate::decorators::{try_fold, ObservedNode};
use crate::functions::{FunctionOverload, FunctionRegistry};
use crate::interpretable::{
    AndNode, CallNode, ConditionalNode, ConstNode, FoldNode, HasNode, Interpretable, ListNode,
    MapEntryNode, MapNode, OrNode, SelectNode, StructFieldNode, StructNode,
};

#[derive(Debug, Clone, Default)]
pub struct PlannerOptions {
    /// Evaluate pure subtrees at plan time.
    pub constant_folding: bool,
    /// Wrap every node so its value is recorded per evaluation.
    pub track_state: bool,
}

pub struct Planner<'a> {
    ast: &'a Ast,
    functions: &'a FunctionRegistry,
    registry: Arc<TypeRegistry>,
    container: &'a Container,
    options: PlannerOptions,
}

impl<'a> Planner<'a> {
    pub fn new(
        ast: &'a Ast,
        functions: &'a FunctionRegistry,
        registry: Arc<TypeRegistry>,
        container: &'a Container,
        options: PlannerOptions,
    ) -> Planner<'a> {
        Planner {
            ast,
            functions,
            registry,
            container,
            options,
        }
    }

    pub fn plan(&self) -> Box<dyn Interpretable> {
        self.plan_expr(&self.ast.expr)
    }

    fn decorate(&self, node: Box<dyn Interpretable>) -> Box<dyn Interpretable> {
        if self.options.track_state {
            ObservedNode::wrap(node)
        } else {
            node
        }
    }

    fn plan_expr(&self, expr: &Expr) -> Box<dyn Interpretable> {
        let node: Box<dyn Interpretable> = match &expr.kind {
            ExprKind::Literal(constant) => Box::new(ConstNode {
                id: expr.id,
                value: constant.to_value(),
            }),
            ExprKind::Ident(_) | ExprKind::Select { .. } | ExprKind::Call { .. } => {
                return self.plan_reference(expr);
            }
            ExprKind::List {
                elements,
                optional_indices,
            } => Box::new(ListNode {
                id: expr.id,
                elements: elements.iter().map(|e| self.plan_expr(e)).collect(),
                optional_indices: optional_indices.clone(),
            }),
            ExprKind::Map { entries } => Box::new(MapNode {
                id: expr.id,
                entries: entries
                    .iter()
                    .map(|entry| MapEntryNode {
                        key: self.plan_expr(&entry.key),
                        value: self.plan_expr(&entry.value),
                        optional: entry.optional,
                    })
                    .collect(),
            }),
            ExprKind::Struct { type_name, fields } => {
                let resolved = match self.ast.reference_map.get(&expr.id) {
                    Some(Reference::Ident(name)) => name.clone(),
                    _ => self
                        .container
                        .candidates(type_name)
                        .into_iter()
                        .find(|c| self.registry.find_type(c).is_some())
                        .unwrap_or_else(|| type_name.clone()),
                };
                Box::new(StructNode {
                    id: expr.id,
                    type_name: resolved,
                    fields: fields
                        .iter()
                        .map(|field| StructFieldNode {
                            name: field.name.clone(),
                            value: self.plan_expr(&field.value),
                            optional: field.optional,
                        })
                        .collect(),
                    registry: Arc::clone(&self.registry),
                })
            }
            ExprKind::Comprehension(fold) => Box::new(FoldNode {
                id: expr.id,
                iter_range: self.plan_expr(&fold.iter_range),
                iter_var: fold.iter_var.clone(),
                accu_var: fold.accu_var.clone(),
                accu_init: self.plan_expr(&fold.accu_init),
                loop_cond: self.plan_expr(&fold.loop_cond),
                loop_step: self.plan_expr(&fold.loop_step),
                result: self.plan_expr(&fold.result),
            }),
        };
        self.decorate(node)
    }

    /// Idents, selects, and calls, with attribute folding and reference-map
    /// threading.
    fn plan_reference(&self, expr: &Expr) -> Box<dyn Interpretable> {
        // Enum values and other names the checker folded to constants.
        if let Some(Reference::Constant { value, .. }) = self.ast.reference_map.get(&expr.id) {
            return self.decorate(Box::new(ConstNode {
                id: expr.id,
                value: value.to_value(),
            }));
        }
        // Names resolved to types (ident or select chains) become
        // first-class type values.
        if let Some(ty) = self.resolved_type_reference(expr) {
            return self.decorate(Box::new(ConstNode {
                id: expr.id,
                value: Value::Type(ty),
            }));
        }
        if let Some(attribute) = self.try_plan_attribute(expr) {
            return self.decorate(attribute);
        }
        match &expr.kind {
            ExprKind::Ident(name) => {
                let candidates = match self.ast.reference_map.get(&expr.id) {
                    Some(Reference::Ident(resolved)) => vec![resolved.clone()],
                    _ => self.container.candidates(name),
                };
                self.decorate(Box::new(AttributeNode {
                    id: expr.id,
                    candidates,
                    qualifiers: vec![],
                }))
            }
            ExprKind::Select {
                operand,
                field,
                test_only,
                optional,
            } => {
                if *test_only {
                    return self.decorate(Box::new(HasNode {
                        id: expr.id,
                        operand: self.plan_expr(operand),
                        field: field.clone(),
                    }));
                }
                self.decorate(Box::new(SelectNode {
                    id: expr.id,
                    operand: self.plan_expr(operand),
                    field: field.clone(),
                    optional: *optional,
                }))
            }
            ExprKind::Call {
                target,
                function,
                args,
            } => self.plan_call(expr, target.as_deref(), function, args),
            _ => unreachable!("plan_reference only handles reference-like nodes"),
        }
    }

    /// A type name used as a value (`int`, `type`, registered messages,
    /// well-known message names spelled as select chains).
    fn resolved_type_reference(&self, expr: &Expr) -> Option<Type> {
        let checked = self.ast.type_map.get(&expr.id)?;
        if !matches!(checked, Type::TypeOf(_)) {
            return None;
        }
        let resolved = match self.ast.reference_map.get(&expr.id) {
            Some(Reference::Ident(resolved)) => resolved.clone(),
            _ => expr.qualified_name()?,
        };
        builtin_type(&resolved).or_else(|| self.registry.find_type(&resolved))
    }

    /// Folds ident-rooted select/index chains into a single attribute node.
    fn try_plan_attribute(&self, expr: &Expr) -> Option<Box<dyn Interpretable>> {
        let (root_candidates, mut qualifiers) = self.collect_attribute(expr)?;
        qualifiers.reverse();
        Some(Box::new(AttributeNode {
            id: expr.id,
            candidates: root_candidates,
            qualifiers,
        }))
    }

    /// Walks down a select/index chain; qualifiers come back innermost
    /// last.
    fn collect_attribute(&self, expr: &Expr) -> Option<(Vec<String>, Vec<Qualifier>)> {
        // A node the checker resolved to a qualified name is a whole root.
        if let Some(Reference::Ident(name)) = self.ast.reference_map.get(&expr.id) {
            // Type references are constants, not attributes.
            if matches!(self.ast.type_map.get(&expr.id), Some(Type::TypeOf(_))) {
                return None;
            }
            return Some((vec![name.clone()], vec![]));
        }
        match &expr.kind {
            ExprKind::Ident(name) => {
                if self.ast.is_checked() {
                    // Checked but unresolved: not a variable reference.
                    return None;
                }
                Some((self.container.candidates(name), vec![]))
            }
            ExprKind::Select {
                operand,
                field,
                test_only: false,
                optional: false,
            } => {
                let (candidates, mut qualifiers) = self.collect_attribute(operand)?;
                qualifiers.insert(0, Qualifier::Const(MapKey::String(field.as_str().into())));
                Some((candidates, qualifiers))
            }
            ExprKind::Call {
                target: None,
                function,
                args,
            } if function == "_[_]" && args.len() == 2 => {
                let (candidates, mut qualifiers) = self.collect_attribute(&args[0])?;
                let qualifier = match &args[1].kind {
                    ExprKind::Literal(Constant::String(s)) => {
                        Qualifier::Const(MapKey::String(s.as_str().into()))
                    }
                    ExprKind::Literal(Constant::Int(i)) => Qualifier::Const(MapKey::Int(*i)),
                    ExprKind::Literal(Constant::Uint(u)) => Qualifier::Const(MapKey::Uint(*u)),
                    ExprKind::Literal(Constant::Bool(b)) => Qualifier::Const(MapKey::Bool(*b)),
                    _ => Qualifier::Computed(self.plan_expr(&args[1])),
                };
                qualifiers.insert(0, qualifier);
                Some((candidates, qualifiers))
            }
            _ => None,
        }
    }

    fn plan_call(
        &self,
        expr: &Expr,
        target: Option<&Expr>,
        function: &str,
        args: &[Expr],
    ) -> Box<dyn Interpretable> {
        // Short-circuit operators are dedicated nodes, not dispatched calls.
        match function {
            "_&&_" if args.len() == 2 => {
                let node = Box::new(AndNode {
                    id: expr.id,
                    lhs: self.plan_expr(&args[0]),
                    rhs: self.plan_expr(&args[1]),
                });
                return self.finish_call(node);
            }
            "_||_" if args.len() == 2 => {
                let node = Box::new(OrNode {
                    id: expr.id,
                    lhs: self.plan_expr(&args[0]),
                    rhs: self.plan_expr(&args[1]),
                });
                return self.finish_call(node);
            }
            "_?_:_" if args.len() == 3 => {
                let node = Box::new(ConditionalNode {
                    id: expr.id,
                    cond: self.plan_expr(&args[0]),
                    then: self.plan_expr(&args[1]),
                    els: self.plan_expr(&args[2]),
                });
                return self.finish_call(node);
            }
            _ => {}
        }

        let overload_ids: Vec<String> = match self.ast.reference_map.get(&expr.id) {
            Some(Reference::Function { overload_ids }) => overload_ids.clone(),
            _ => Vec::new(),
        };
        let mut candidates: Vec<FunctionOverload> = overload_ids
            .iter()
            .filter_map(|id| self.functions.find(id).cloned())
            .collect();

        // The checker may have resolved a member call against a qualified
        // function name (`optional.of`); the registry knows the real name.
        let mut call_function = function.to_string();
        let mut receiver = target;
        if let Some(first) = candidates.first() {
            if first.function != function {
                call_function = first.function.clone();
                receiver = None;
            }
        }
        if candidates.is_empty() {
            // Unchecked AST: resolve by name, trying the qualified form
            // first for member calls.
            if let Some(t) = target {
                if let Some(prefix) = t.qualified_name() {
                    let qualified = format!("{prefix}.{function}");
                    let found = self.functions.find_by_function(&qualified);
                    if !found.is_empty() {
                        candidates = found.into_iter().cloned().collect();
                        call_function = qualified;
                        receiver = None;
                    }
                }
            }
            if candidates.is_empty() {
                candidates = self
                    .functions
                    .find_by_function(&call_function)
                    .into_iter()
                    .cloned()
                    .collect();
            }
        }

        let mut planned_args = Vec::with_capacity(args.len() + 1);
        if let Some(r) = receiver {
            planned_args.push(self.plan_expr(r));
        }
        for arg in args {
            planned_args.push(self.plan_expr(arg));
        }
        let node = Box::new(CallNode {
            id: expr.id,
            function: call_function,
            candidates,
            args: planned_args,
        });
        self.finish_call(node)
    }

    fn finish_call(&self, node: Box<dyn Interpretable>) -> Box<dyn Interpretable> {
        let node = if self.options.constant_folding {
            try_fold(node)
        } else {
            node
        };
        self.decorate(node)
    }
}

fn builtin_type(name: &str) -> Option<Type> {
    match name {
        "bool" => Some(Type::Bool),
        "bytes" => Some(Type::Bytes),
        "double" => Some(Type::Double),
        "int" => Some(Type::Int),
        "string" => Some(Type::String),
        "uint" => Some(Type::Uint),
        "list" => Some(Type::list(Type::Dyn)),
        "map" => Some(Type::map(Type::Dyn, Type::Dyn)),
        "null_type" => Some(Type::Null),
        "type" => Some(Type::TypeOf(None)),
        "dyn" => Some(Type::Dyn),
        _ => None,
    }
}
