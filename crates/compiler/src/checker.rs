//! The type checker.
//!
//! Walks a parsed AST, inferring a type for every node and resolving every
//! identifier and call. Overload resolution filters candidates by arity and
//! pairwise assignability, unifying type parameters across arguments; when
//! several overloads survive, all of them are recorded and the evaluator
//! disambiguates at runtime by trait dispatch. Errors are collected, never
//! thrown, so one pass reports everything it can find.

use std::collections::HashMap;

use verdict_core::registry::TypeRegistry;
use verdict_core::types::Type;

use crate::ast::{Ast, Constant, Expr, ExprId, ExprKind, Reference};
use crate::container::Container;
use crate::decls::{DeclScope, OverloadDecl, VariableDecl};
use crate::issues::{CompileError, IssueKind};

/// Type-parameter substitution accumulated during overload resolution.
#[derive(Debug, Clone, Default)]
struct Mapping {
    bindings: HashMap<String, Type>,
}

impl Mapping {
    /// Follows substitution chains until a non-parameter or unbound
    /// parameter is reached.
    fn resolve(&self, ty: &Type) -> Type {
        let mut current = ty.clone();
        let mut seen = 0;
        while let Type::TypeParam(name) = &current {
            match self.bindings.get(name.as_ref()) {
                Some(bound) if seen < 32 => {
                    current = bound.clone();
                    seen += 1;
                }
                _ => break,
            }
        }
        current
    }

    fn bind(&mut self, name: &str, ty: Type) {
        self.bindings.insert(name.to_string(), ty);
    }

    /// Deep substitution; parameters still unbound become `dyn`.
    fn substitute(&self, ty: &Type) -> Type {
        match ty {
            Type::TypeParam(_) => {
                let resolved = self.resolve(ty);
                if matches!(resolved, Type::TypeParam(_)) {
                    Type::Dyn
                } else {
                    self.substitute(&resolved)
                }
            }
            Type::List(elem) => Type::list(self.substitute(elem)),
            Type::Map(key, value) => Type::map(self.substitute(key), self.substitute(value)),
            Type::TypeOf(Some(subject)) => Type::type_of(self.substitute(subject)),
            Type::Wrapper(base) => Type::wrapper(self.substitute(base)),
            Type::Opaque { name, parameters } => Type::Opaque {
                name: name.clone(),
                parameters: parameters.iter().map(|p| self.substitute(p)).collect(),
            },
            other => other.clone(),
        }
    }

    /// Unification: may a `source` value be used where `target` is
    /// expected, given (and extending) the current bindings?
    fn unify(&mut self, target: &Type, source: &Type) -> bool {
        let t = self.resolve(target);
        let s = self.resolve(source);
        if let Type::TypeParam(name) = &t {
            if !occurs(name, &s) {
                self.bind(name, s);
            }
            return true;
        }
        if let Type::TypeParam(name) = &s {
            self.bind(name, t);
            return true;
        }
        if t.is_dyn() || s.is_dyn() {
            return true;
        }
        match (&t, &s) {
            (Type::Error, _) | (_, Type::Error) => true,
            (Type::Wrapper(base), _) => {
                matches!(s, Type::Null) || self.unify(base, &s)
            }
            (_, Type::Wrapper(base)) => self.unify(&t, base),
            (Type::Struct(_), Type::Null) => true,
            (Type::Struct(a), Type::Struct(b)) => a == b,
            (Type::List(ea), Type::List(eb)) => self.unify(ea, eb),
            (Type::Map(ka, va), Type::Map(kb, vb)) => {
                self.unify(ka, kb) && self.unify(va, vb)
            }
            (
                Type::Opaque {
                    name: na,
                    parameters: pa,
                },
                Type::Opaque {
                    name: nb,
                    parameters: pb,
                },
            ) => {
                na == nb
                    && pa.len() == pb.len()
                    && pa
                        .iter()
                        .zip(pb.iter())
                        .all(|(a, b)| self.unify(a, b))
            }
            (Type::TypeOf(pa), Type::TypeOf(pb)) => match (pa, pb) {
                (Some(a), Some(b)) => self.unify(a, b),
                _ => true,
            },
            _ => t.kind() == s.kind(),
        }
    }
}

fn occurs(name: &str, ty: &Type) -> bool {
    match ty {
        Type::TypeParam(n) => n.as_ref() == name,
        _ => ty.parameters().iter().any(|p| occurs(name, p)),
    }
}

fn is_numeric(ty: &Type) -> bool {
    matches!(ty, Type::Int | Type::Uint | Type::Double)
}

/// Least common assignable supertype of two types, `dyn` when unrelated.
fn join(a: &Type, b: &Type) -> Type {
    if a == b {
        return a.clone();
    }
    if a.is_dyn() || b.is_dyn() {
        return Type::Dyn;
    }
    match (a, b) {
        (Type::Error, other) | (other, Type::Error) => other.clone(),
        (Type::List(x), Type::List(y)) => Type::list(join(x, y)),
        (Type::Map(ka, va), Type::Map(kb, vb)) => Type::map(join(ka, kb), join(va, vb)),
        (Type::Wrapper(base), other) | (other, Type::Wrapper(base)) => {
            if matches!(other, Type::Null) || base.as_ref() == other {
                Type::wrapper(base.as_ref().clone())
            } else {
                Type::Dyn
            }
        }
        (Type::Struct(name), Type::Null) | (Type::Null, Type::Struct(name)) => {
            Type::Struct(name.clone())
        }
        _ => Type::Dyn,
    }
}

pub struct CheckerOptions {
    /// Reject list/map literals whose element (or key/value) types mix.
    pub homogeneous_aggregate_literals: bool,
}

impl Default for CheckerOptions {
    fn default() -> CheckerOptions {
        CheckerOptions {
            homogeneous_aggregate_literals: false,
        }
    }
}

pub struct Checker<'a> {
    scope: &'a mut DeclScope,
    registry: &'a TypeRegistry,
    container: &'a Container,
    options: &'a CheckerOptions,
    type_map: HashMap<ExprId, Type>,
    reference_map: HashMap<ExprId, Reference>,
    mapping: Mapping,
    fresh_counter: usize,
    errors: Vec<CompileError>,
    positions: HashMap<ExprId, usize>,
}

/// Checks a parsed AST, filling its side tables. Returns the (possibly
/// partial) checked AST together with every issue found.
pub fn check_ast(
    mut ast: Ast,
    scope: &mut DeclScope,
    registry: &TypeRegistry,
    container: &Container,
    options: &CheckerOptions,
) -> (Ast, Vec<CompileError>) {
    let mut checker = Checker {
        scope,
        registry,
        container,
        options,
        type_map: HashMap::new(),
        reference_map: HashMap::new(),
        mapping: Mapping::default(),
        fresh_counter: 0,
        errors: Vec::new(),
        positions: ast.source_info.positions.clone(),
    };
    checker.check_expr(&ast.expr);
    // Final substitution: empty-literal inference variables picked up
    // bindings while checking enclosing expressions.
    let substituted: HashMap<ExprId, Type> = checker
        .type_map
        .iter()
        .map(|(id, ty)| (*id, checker.mapping.substitute(ty)))
        .collect();
    checker.type_map = substituted;
    let Checker {
        type_map,
        reference_map,
        errors,
        ..
    } = checker;
    tracing::debug!(
        nodes = type_map.len(),
        errors = errors.len(),
        "checked expression"
    );
    ast.type_map = type_map;
    ast.reference_map = reference_map;
    (ast, errors)
}

impl Checker<'_> {
    fn error(&mut self, id: ExprId, kind: IssueKind, message: impl Into<String>) {
        let offset = self.positions.get(&id).copied().unwrap_or(0);
        self.errors.push(CompileError::new(offset, kind, message));
    }

    fn fresh_param(&mut self) -> Type {
        self.fresh_counter += 1;
        Type::type_param(format!("%{}", self.fresh_counter))
    }

    /// Renames an overload's type parameters so concurrent resolutions do
    /// not interfere.
    fn freshen(&mut self, overload: &OverloadDecl) -> OverloadDecl {
        let mut renames = Mapping::default();
        for name in overload.type_params() {
            let fresh = self.fresh_param();
            renames.bind(&name, fresh);
        }
        OverloadDecl {
            id: overload.id.clone(),
            params: overload
                .params
                .iter()
                .map(|p| rename_params(&renames, p))
                .collect(),
            result: rename_params(&renames, &overload.result),
            is_instance: overload.is_instance,
        }
    }

    fn check_expr(&mut self, expr: &Expr) -> Type {
        let ty = match &expr.kind {
            ExprKind::Literal(constant) => constant.type_of(),
            ExprKind::Ident(name) => self.check_ident(expr.id, name),
            ExprKind::Select {
                operand,
                field,
                test_only,
                optional,
            } => self.check_select(expr, operand, field, *test_only, *optional),
            ExprKind::Call {
                target,
                function,
                args,
            } => self.check_call(expr.id, target.as_deref(), function, args),
            ExprKind::List {
                elements,
                optional_indices,
            } => self.check_list(elements, optional_indices),
            ExprKind::Map { entries } => self.check_map(entries),
            ExprKind::Struct { type_name, fields } => {
                self.check_struct(expr.id, type_name, fields)
            }
            ExprKind::Comprehension(fold) => self.check_comprehension(fold),
        };
        self.type_map.insert(expr.id, ty.clone());
        ty
    }

    /// Resolution for a (possibly qualified) name: scoped declarations,
    /// then enum constants, then type names.
    fn resolve_name(&self, name: &str) -> Option<(Type, Reference)> {
        for candidate in self.container.candidates(name) {
            if let Some(decl) = self.scope.find_ident(&candidate) {
                return Some((decl.ty.clone(), Reference::Ident(candidate)));
            }
            if let Some(value) = self.registry.enum_value(&candidate) {
                return Some((
                    Type::Int,
                    Reference::Constant {
                        name: candidate,
                        value: Constant::Int(value),
                    },
                ));
            }
            if let Some(ty) = self.registry.find_type(&candidate) {
                return Some((Type::type_of(ty), Reference::Ident(candidate)));
            }
        }
        None
    }

    fn check_ident(&mut self, id: ExprId, name: &str) -> Type {
        match self.resolve_name(name) {
            Some((ty, reference)) => {
                self.reference_map.insert(id, reference);
                ty
            }
            None => {
                let where_ = if self.container.name().is_empty() {
                    String::new()
                } else {
                    format!(" (in container '{}')", self.container.name())
                };
                self.error(
                    id,
                    IssueKind::UndeclaredReference,
                    format!("undeclared reference to '{name}'{where_}"),
                );
                Type::Error
            }
        }
    }

    /// Nodes skipped by qualified-name folding still get a type entry.
    fn mark_folded_chain(&mut self, expr: &Expr) {
        expr.visit(&mut |e| {
            self.type_map.entry(e.id).or_insert(Type::Dyn);
        });
    }

    fn check_select(
        &mut self,
        expr: &Expr,
        operand: &Expr,
        field: &str,
        test_only: bool,
        optional: bool,
    ) -> Type {
        // `a.b.c` may simply spell a qualified name; that wins over field
        // selection on a variable named `a.b`.
        if !test_only && !optional {
            if let Some(qualified) = expr.qualified_name() {
                if let Some((ty, reference)) = self.resolve_name(&qualified) {
                    self.reference_map.insert(expr.id, reference);
                    self.mark_folded_chain(operand);
                    return ty;
                }
            }
        }
        let operand_ty = self.check_expr(operand);
        if test_only {
            match &operand_ty {
                Type::Map(_, _) | Type::Dyn | Type::Any | Type::TypeParam(_) => Type::Bool,
                Type::Error => Type::Error,
                Type::Struct(name) => {
                    if self.registry.find_field(name, field).is_none() {
                        self.error(
                            expr.id,
                            IssueKind::TypeMismatch,
                            format!("undefined field '{field}' on type '{name}'"),
                        );
                    }
                    Type::Bool
                }
                other => {
                    self.error(
                        expr.id,
                        IssueKind::TypeMismatch,
                        format!("type '{other}' does not support field presence testing"),
                    );
                    Type::Bool
                }
            }
        } else {
            let result = self.select_field_type(expr.id, &operand_ty, field);
            if optional || operand_ty.is_optional() {
                Type::optional(result)
            } else {
                result
            }
        }
    }

    fn select_field_type(&mut self, id: ExprId, operand_ty: &Type, field: &str) -> Type {
        match operand_ty {
            Type::Error => Type::Error,
            Type::Dyn | Type::Any | Type::TypeParam(_) => Type::Dyn,
            Type::Map(_, value) => value.as_ref().clone(),
            Type::Struct(name) => match self.registry.find_field(name, field) {
                Some(decl) => decl.ty,
                None => {
                    self.error(
                        id,
                        IssueKind::TypeMismatch,
                        format!("undefined field '{field}' on type '{name}'"),
                    );
                    Type::Error
                }
            },
            opt if opt.is_optional() => {
                let inner = opt.optional_inner().cloned().unwrap_or(Type::Dyn);
                self.select_field_type(id, &inner, field)
            }
            other => {
                self.error(
                    id,
                    IssueKind::TypeMismatch,
                    format!("type '{other}' does not support field selection"),
                );
                Type::Error
            }
        }
    }

    fn check_call(
        &mut self,
        id: ExprId,
        target: Option<&Expr>,
        function: &str,
        args: &[Expr],
    ) -> Type {
        // Equality admits any pair of comparable operands, including the
        // cross-type numeric comparisons.
        if target.is_none() && (function == "_==_" || function == "_!=_") {
            return self.check_equality(id, function, args);
        }
        match target {
            None => {
                for candidate in self.container.candidates(function) {
                    if self.scope.find_function(&candidate).is_some() {
                        return self.resolve_overload_call(id, &candidate, None, args);
                    }
                }
                for arg in args {
                    self.check_expr(arg);
                }
                self.error(
                    id,
                    IssueKind::UndeclaredReference,
                    format!("undeclared reference to function '{function}'"),
                );
                Type::Error
            }
            Some(receiver) => {
                // `optional.of(x)` style: the receiver chain may qualify the
                // function name rather than provide a value.
                if let Some(prefix) = receiver.qualified_name() {
                    let qualified = format!("{prefix}.{function}");
                    for candidate in self.container.candidates(&qualified) {
                        if self.scope.find_function(&candidate).is_some() {
                            self.mark_folded_chain(receiver);
                            return self.resolve_overload_call(id, &candidate, None, args);
                        }
                    }
                }
                self.resolve_overload_call(id, function, Some(receiver), args)
            }
        }
    }

    fn check_equality(&mut self, id: ExprId, function: &str, args: &[Expr]) -> Type {
        let lhs = self.check_expr(&args[0]);
        let rhs = self.check_expr(&args[1]);
        let mut trial = self.mapping.clone();
        let comparable = trial.unify(&lhs, &rhs)
            || trial.unify(&rhs, &lhs)
            || (is_numeric(&lhs) && is_numeric(&rhs));
        if !comparable {
            self.error(
                id,
                IssueKind::NoMatchingOverload,
                format!("found no matching overload for '{function}' applied to ({lhs}, {rhs})"),
            );
            return Type::Error;
        }
        let overload_id = if function == "_==_" {
            "equals"
        } else {
            "not_equals"
        };
        self.reference_map.insert(
            id,
            Reference::Function {
                overload_ids: vec![overload_id.to_string()],
            },
        );
        Type::Bool
    }

    fn resolve_overload_call(
        &mut self,
        id: ExprId,
        function: &str,
        receiver: Option<&Expr>,
        args: &[Expr],
    ) -> Type {
        let mut arg_types = Vec::with_capacity(args.len() + 1);
        if let Some(r) = receiver {
            arg_types.push(self.check_expr(r));
        }
        for arg in args {
            arg_types.push(self.check_expr(arg));
        }
        let Some(decl) = self.scope.find_function(function) else {
            self.error(
                id,
                IssueKind::UndeclaredReference,
                format!("undeclared reference to function '{function}'"),
            );
            return Type::Error;
        };
        let is_instance = receiver.is_some();
        let candidates: Vec<OverloadDecl> = decl
            .overloads
            .iter()
            .filter(|o| o.is_instance == is_instance && o.params.len() == arg_types.len())
            .cloned()
            .collect();

        // Invalid subexpressions poison the call silently; the original
        // failure is already reported.
        if arg_types.iter().any(|t| matches!(t, Type::Error)) {
            return Type::Error;
        }

        let mut matched_ids = Vec::new();
        let mut result: Option<Type> = None;
        let mut committed: Option<Mapping> = None;
        for overload in &candidates {
            let fresh = self.freshen(overload);
            let mut trial = self.mapping.clone();
            let ok = fresh
                .params
                .iter()
                .zip(arg_types.iter())
                .all(|(param, arg)| trial.unify(param, arg));
            if !ok {
                continue;
            }
            let overload_result = trial.substitute(&fresh.result);
            result = Some(match result {
                None => overload_result,
                Some(prev) => join(&prev, &overload_result),
            });
            if committed.is_none() {
                committed = Some(trial);
            }
            matched_ids.push(fresh.id);
        }
        if matched_ids.is_empty() {
            let shown: Vec<String> = arg_types.iter().map(|t| t.to_string()).collect();
            self.error(
                id,
                IssueKind::NoMatchingOverload,
                format!(
                    "found no matching overload for '{function}' applied to ({})",
                    shown.join(", ")
                ),
            );
            return Type::Error;
        }
        if let Some(mapping) = committed {
            self.mapping = mapping;
        }
        self.reference_map.insert(
            id,
            Reference::Function {
                overload_ids: matched_ids,
            },
        );
        result.unwrap_or(Type::Dyn)
    }

    fn check_list(&mut self, elements: &[Expr], optional_indices: &[usize]) -> Type {
        let mut elem_ty: Option<Type> = None;
        for (i, element) in elements.iter().enumerate() {
            let mut ty = self.check_expr(element);
            if optional_indices.contains(&i) {
                ty = self.unwrap_optional_entry(element.id, ty);
            }
            elem_ty = Some(match elem_ty {
                None => ty,
                Some(prev) => self.join_elements(element.id, prev, ty),
            });
        }
        // An empty literal gets an inference variable so that enclosing
        // expressions can refine the element type.
        let elem = elem_ty.unwrap_or_else(|| self.fresh_param());
        Type::list(elem)
    }

    fn check_map(&mut self, entries: &[crate::ast::MapEntry]) -> Type {
        let mut key_ty: Option<Type> = None;
        let mut value_ty: Option<Type> = None;
        for entry in entries {
            let kt = self.check_expr(&entry.key);
            let mut vt = self.check_expr(&entry.value);
            if entry.optional {
                vt = self.unwrap_optional_entry(entry.value.id, vt);
            }
            key_ty = Some(match key_ty {
                None => kt,
                Some(prev) => self.join_elements(entry.key.id, prev, kt),
            });
            value_ty = Some(match value_ty {
                None => vt,
                Some(prev) => self.join_elements(entry.value.id, prev, vt),
            });
        }
        let key = key_ty.unwrap_or_else(|| self.fresh_param());
        let value = value_ty.unwrap_or_else(|| self.fresh_param());
        Type::map(key, value)
    }

    fn unwrap_optional_entry(&mut self, id: ExprId, ty: Type) -> Type {
        match ty.optional_inner() {
            Some(inner) => inner.clone(),
            None if ty.is_dyn() => Type::Dyn,
            None => {
                self.error(
                    id,
                    IssueKind::TypeMismatch,
                    format!("optional entry must be an optional type, found '{ty}'"),
                );
                Type::Dyn
            }
        }
    }

    /// Join for aggregate literal members, enforcing the homogeneous mode.
    fn join_elements(&mut self, id: ExprId, prev: Type, next: Type) -> Type {
        let joined = join(&prev, &next);
        if self.options.homogeneous_aggregate_literals
            && joined.is_dyn()
            && !(prev.is_dyn() || next.is_dyn())
            && !(matches!(prev, Type::TypeParam(_)) || matches!(next, Type::TypeParam(_)))
        {
            self.error(
                id,
                IssueKind::TypeMismatch,
                format!("expected type '{prev}' in aggregate but found '{next}'"),
            );
        }
        joined
    }

    fn check_struct(
        &mut self,
        id: ExprId,
        type_name: &str,
        fields: &[crate::ast::StructField],
    ) -> Type {
        let mut resolved = None;
        for candidate in self.container.candidates(type_name) {
            if let Some(ty) = self.registry.find_type(&candidate) {
                resolved = Some((candidate, ty));
                break;
            }
        }
        let Some((resolved_name, ty)) = resolved else {
            for field in fields {
                self.check_expr(&field.value);
            }
            self.error(
                id,
                IssueKind::UndeclaredReference,
                format!("undeclared reference to type '{type_name}'"),
            );
            return Type::Error;
        };
        self.reference_map
            .insert(id, Reference::Ident(resolved_name.clone()));
        for field in fields {
            let mut value_ty = self.check_expr(&field.value);
            if field.optional {
                value_ty = self.unwrap_optional_entry(field.value.id, value_ty);
            }
            match self.struct_field_type(&resolved_name, &ty, &field.name) {
                Some(expected) => {
                    let mut trial = self.mapping.clone();
                    if !trial.unify(&expected, &value_ty) {
                        self.error(
                            field.id,
                            IssueKind::TypeMismatch,
                            format!(
                                "expected type of field '{}' is '{expected}' but provided type is '{value_ty}'",
                                field.name
                            ),
                        );
                    }
                }
                None => {
                    self.error(
                        field.id,
                        IssueKind::TypeMismatch,
                        format!(
                            "undefined field '{}' on type '{resolved_name}'",
                            field.name
                        ),
                    );
                }
            }
        }
        ty
    }

    fn struct_field_type(&self, name: &str, ty: &Type, field: &str) -> Option<Type> {
        match ty {
            Type::Struct(_) => self.registry.find_field(name, field).map(|f| f.ty),
            Type::Duration | Type::Timestamp => {
                matches!(field, "seconds" | "nanos").then_some(Type::Int)
            }
            Type::Wrapper(base) => (field == "value").then(|| base.as_ref().clone()),
            Type::Map(_, value) => Some(value.as_ref().clone()),
            _ => None,
        }
    }

    fn check_comprehension(&mut self, fold: &crate::ast::Comprehension) -> Type {
        let range_ty = self.check_expr(&fold.iter_range);
        let elem_ty = match &range_ty {
            Type::List(elem) => elem.as_ref().clone(),
            // Iterating a map yields its keys.
            Type::Map(key, _) => key.as_ref().clone(),
            Type::Dyn | Type::Any | Type::TypeParam(_) => Type::Dyn,
            Type::Error => Type::Error,
            other => {
                self.error(
                    fold.iter_range.id,
                    IssueKind::TypeMismatch,
                    format!("expression of type '{other}' cannot be the range of a comprehension"),
                );
                Type::Error
            }
        };
        let accu_ty = self.check_expr(&fold.accu_init);
        self.scope.push_layer();
        self.scope
            .declare_local(VariableDecl::new(fold.accu_var.clone(), accu_ty.clone()));
        self.scope.push_layer();
        self.scope
            .declare_local(VariableDecl::new(fold.iter_var.clone(), elem_ty));

        let cond_ty = self.check_expr(&fold.loop_cond);
        if !matches!(cond_ty, Type::Bool | Type::Dyn | Type::Any | Type::Error) {
            self.error(
                fold.loop_cond.id,
                IssueKind::TypeMismatch,
                format!("loop condition must be bool, found '{cond_ty}'"),
            );
        }
        let step_ty = self.check_expr(&fold.loop_step);
        // Resolve inference variables before joining: the step may have
        // refined an empty-literal accumulator.
        let accu_res = self.mapping.substitute(&accu_ty);
        let step_res = self.mapping.substitute(&step_ty);
        let widened = join(&accu_res, &step_res);
        if widened.is_dyn() && !(accu_res.is_dyn() || step_res.is_dyn()) {
            self.error(
                fold.loop_step.id,
                IssueKind::TypeMismatch,
                format!(
                    "loop step type '{step_res}' is not assignable to accumulator type '{accu_res}'"
                ),
            );
        }
        self.scope.pop_layer();

        // Result sees the accumulator (possibly widened), not the iteration
        // variable.
        self.scope.pop_layer();
        self.scope.push_layer();
        self.scope
            .declare_local(VariableDecl::new(fold.accu_var.clone(), widened));
        let result_ty = self.check_expr(&fold.result);
        self.scope.pop_layer();
        result_ty
    }
}

fn rename_params(renames: &Mapping, ty: &Type) -> Type {
    match ty {
        Type::TypeParam(_) => renames.resolve(ty),
        Type::List(elem) => Type::list(rename_params(renames, elem)),
        Type::Map(key, value) => Type::map(
            rename_params(renames, key),
            rename_params(renames, value),
        ),
        Type::TypeOf(Some(subject)) => Type::type_of(rename_params(renames, subject)),
        Type::Wrapper(base) => Type::wrapper(rename_params(renames, base)),
        Type::Opaque { name, parameters } => Type::Opaque {
            name: name.clone(),
            parameters: parameters.iter().map(|p| rename_params(renames, p)).collect(),
        },
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Reference;
    use crate::parser::parse;
    use crate::stdlib::standard_declarations;
    use verdict_core::registry::{FieldDescriptor, StructDescriptor};

    fn std_scope() -> DeclScope {
        let mut scope = DeclScope::new();
        for decl in standard_declarations() {
            scope.add(decl);
        }
        scope
    }

    fn check_source(source: &str, extra: Vec<crate::decls::Declaration>) -> (Ast, Vec<CompileError>) {
        let ast = parse(source).expect("parse");
        let mut scope = std_scope();
        for decl in extra {
            scope.add(decl);
        }
        let registry = TypeRegistry::new();
        let container = Container::root();
        let options = CheckerOptions::default();
        check_ast(ast, &mut scope, &registry, &container, &options)
    }

    fn checked_type(source: &str, extra: Vec<crate::decls::Declaration>) -> Type {
        let (ast, errors) = check_source(source, extra);
        assert!(errors.is_empty(), "unexpected errors: {errors:?}");
        ast.result_type()
    }

    #[test]
    fn test_literal_and_arithmetic_types() {
        assert_eq!(checked_type("1 + 2 * 3", vec![]), Type::Int);
        assert_eq!(checked_type("1u + 2u", vec![]), Type::Uint);
        assert_eq!(checked_type("'a' + 'b'", vec![]), Type::String);
        assert_eq!(checked_type("[1] + [2]", vec![]), Type::list(Type::Int));
    }

    #[test]
    fn test_overload_mismatch_reports_error() {
        let (_, errors) = check_source("1 + 'a'", vec![]);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, IssueKind::NoMatchingOverload);
    }

    #[test]
    fn test_all_errors_reported() {
        let (_, errors) = check_source("(1 + 'a') == (2 - 'b') || undeclared", vec![]);
        assert!(errors.len() >= 3, "expected 3+ errors, got {errors:?}");
    }

    #[test]
    fn test_cross_type_numeric_comparison_accepted() {
        assert_eq!(checked_type("1 < 2u", vec![]), Type::Bool);
        assert_eq!(checked_type("1.5 >= 2", vec![]), Type::Bool);
        assert_eq!(checked_type("1 == 1u", vec![]), Type::Bool);
    }

    #[test]
    fn test_equality_of_unrelated_kinds_rejected() {
        let (_, errors) = check_source("1 == 'one'", vec![]);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, IssueKind::NoMatchingOverload);
    }

    #[test]
    fn test_list_element_join() {
        assert_eq!(
            checked_type("[1, 2, 3]", vec![]),
            Type::list(Type::Int)
        );
        assert_eq!(
            checked_type("[1, 'a']", vec![]),
            Type::list(Type::Dyn)
        );
        assert_eq!(checked_type("[]", vec![]), Type::list(Type::Dyn));
    }

    #[test]
    fn test_homogeneous_mode_rejects_mixed_list() {
        let ast = parse("[1, 'a']").unwrap();
        let mut scope = std_scope();
        let registry = TypeRegistry::new();
        let container = Container::root();
        let options = CheckerOptions {
            homogeneous_aggregate_literals: true,
        };
        let (_, errors) = check_ast(ast, &mut scope, &registry, &container, &options);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, IssueKind::TypeMismatch);
    }

    #[test]
    fn test_index_unifies_element_type() {
        let decl = crate::decls::Declaration::variable("xs", Type::list(Type::String));
        assert_eq!(checked_type("xs[0]", vec![decl]), Type::String);
    }

    #[test]
    fn test_comprehension_types() {
        assert_eq!(
            checked_type("[1,2,3].all(x, x < 10)", vec![]),
            Type::Bool
        );
        assert_eq!(
            checked_type("[1,2,3].map(x, x * 2)", vec![]),
            Type::list(Type::Int)
        );
        assert_eq!(
            checked_type("{'a': 1}.exists(k, k == 'a')", vec![]),
            Type::Bool
        );
    }

    #[test]
    fn test_undeclared_identifier() {
        let (ast, errors) = check_source("nope", vec![]);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, IssueKind::UndeclaredReference);
        assert_eq!(ast.result_type(), Type::Error);
    }

    #[test]
    fn test_ident_and_call_references_recorded() {
        let decl = crate::decls::Declaration::variable("x", Type::Int);
        let (ast, errors) = check_source("x + 1", vec![decl]);
        assert!(errors.is_empty());
        let refs: Vec<&Reference> = ast.reference_map.values().collect();
        assert!(refs.iter().any(|r| matches!(r, Reference::Ident(n) if n == "x")));
        assert!(refs.iter().any(
            |r| matches!(r, Reference::Function { overload_ids } if overload_ids == &vec!["add_int64".to_string()])
        ));
    }

    #[test]
    fn test_every_node_is_typed() {
        let decl = crate::decls::Declaration::variable(
            "request",
            Type::map(Type::String, Type::Dyn),
        );
        let (ast, errors) = check_source(
            "request.path.startsWith('/admin') && [1,2].all(x, x > 0)",
            vec![decl],
        );
        assert!(errors.is_empty(), "{errors:?}");
        ast.expr.visit(&mut |e| {
            assert!(
                ast.type_map.contains_key(&e.id),
                "node {} has no type entry",
                e.id
            );
        });
    }

    #[test]
    fn test_struct_literal_against_registry() {
        let mut registry = TypeRegistry::new();
        registry.register_struct(
            StructDescriptor::new("acme.Claims")
                .with_field(FieldDescriptor::new("email", Type::String)),
        );
        let ast = parse("acme.Claims{email: 'a@b.co'}").unwrap();
        let mut scope = std_scope();
        let container = Container::root();
        let options = CheckerOptions::default();
        let (ast, errors) = check_ast(ast, &mut scope, &registry, &container, &options);
        assert!(errors.is_empty(), "{errors:?}");
        assert_eq!(ast.result_type(), Type::strct("acme.Claims"));

        let ast2 = parse("acme.Claims{email: 5}").unwrap();
        let (_, errors) = check_ast(ast2, &mut scope, &registry, &container, &options);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, IssueKind::TypeMismatch);
    }

    #[test]
    fn test_container_resolution_prefers_most_qualified() {
        let mut scope = std_scope();
        scope.add(crate::decls::Declaration::variable("a.b.x", Type::Int));
        scope.add(crate::decls::Declaration::variable("x", Type::String));
        let registry = TypeRegistry::new();
        let container = Container::new("a.b");
        let options = CheckerOptions::default();
        let ast = parse("x").unwrap();
        let (ast, errors) = check_ast(ast, &mut scope, &registry, &container, &options);
        assert!(errors.is_empty());
        assert_eq!(ast.result_type(), Type::Int);
        assert_eq!(
            ast.reference_map.get(&ast.expr.id),
            Some(&Reference::Ident("a.b.x".to_string()))
        );
    }

    #[test]
    fn test_qualified_name_folding_over_selection() {
        // `a.b.c` resolves as one name when declared as such, even though
        // it parses as nested selects.
        let mut scope = std_scope();
        scope.add(crate::decls::Declaration::variable("a.b.c", Type::Bool));
        let registry = TypeRegistry::new();
        let container = Container::root();
        let options = CheckerOptions::default();
        let ast = parse("a.b.c").unwrap();
        let (ast, errors) = check_ast(ast, &mut scope, &registry, &container, &options);
        assert!(errors.is_empty());
        assert_eq!(ast.result_type(), Type::Bool);
    }

    #[test]
    fn test_optional_select_and_index_types() {
        let decl = crate::decls::Declaration::variable(
            "m",
            Type::map(Type::String, Type::Int),
        );
        assert_eq!(
            checked_type("m.?key", vec![decl.clone()]),
            Type::optional(Type::Int)
        );
        assert_eq!(
            checked_type("m[?'key']", vec![decl.clone()]),
            Type::optional(Type::Int)
        );
        assert_eq!(
            checked_type("m[?'key'].orValue(7)", vec![decl]),
            Type::Int
        );
    }

    #[test]
    fn test_qualified_optional_functions() {
        assert_eq!(
            checked_type("optional.of(3)", vec![]),
            Type::optional(Type::Int)
        );
        assert_eq!(
            checked_type("optional.none()", vec![]),
            Type::optional(Type::Dyn)
        );
    }

    #[test]
    fn test_type_idents_and_type_call() {
        assert_eq!(
            checked_type("type(1) == int", vec![]),
            Type::Bool
        );
        assert_eq!(
            checked_type("type(1)", vec![]),
            Type::type_of(Type::Int)
        );
    }

    #[test]
    fn test_conditional_branch_types_must_unify() {
        assert_eq!(checked_type("true ? 1 : 2", vec![]), Type::Int);
        let (_, errors) = check_source("true ? 1 : 'a'", vec![]);
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn test_dyn_subsumption() {
        let decl = crate::decls::Declaration::variable("anything", Type::Dyn);
        assert_eq!(checked_type("anything + 1", vec![decl.clone()]), Type::Int);
        assert_eq!(checked_type("anything.x.y", vec![decl.clone()]), Type::Dyn);
        assert_eq!(checked_type("size(anything)", vec![decl]), Type::Int);
    }
}
