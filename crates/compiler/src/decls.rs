//! Declarations: the names and signatures a checking scope knows about.

use std::collections::HashMap;

use verdict_core::types::Type;

/// A declared variable.
#[derive(Debug, Clone)]
pub struct VariableDecl {
    pub name: String,
    pub ty: Type,
}

impl VariableDecl {
    pub fn new(name: impl Into<String>, ty: Type) -> VariableDecl {
        VariableDecl {
            name: name.into(),
            ty,
        }
    }
}

/// A single typed signature of a function.
#[derive(Debug, Clone)]
pub struct OverloadDecl {
    pub id: String,
    pub params: Vec<Type>,
    pub result: Type,
    /// Instance overloads dispatch on a receiver; the receiver is the first
    /// parameter.
    pub is_instance: bool,
}

impl OverloadDecl {
    pub fn global(id: impl Into<String>, params: Vec<Type>, result: Type) -> OverloadDecl {
        OverloadDecl {
            id: id.into(),
            params,
            result,
            is_instance: false,
        }
    }

    pub fn instance(id: impl Into<String>, params: Vec<Type>, result: Type) -> OverloadDecl {
        OverloadDecl {
            id: id.into(),
            params,
            result,
            is_instance: true,
        }
    }

    /// The type-parameter names referenced anywhere in the signature.
    pub fn type_params(&self) -> Vec<String> {
        let mut names = Vec::new();
        for ty in self.params.iter().chain(std::iter::once(&self.result)) {
            collect_type_params(ty, &mut names);
        }
        names
    }
}

fn collect_type_params(ty: &Type, out: &mut Vec<String>) {
    match ty {
        Type::TypeParam(name) => {
            if !out.iter().any(|n| n == name.as_ref()) {
                out.push(name.to_string());
            }
        }
        Type::List(elem) => collect_type_params(elem, out),
        Type::Map(key, value) => {
            collect_type_params(key, out);
            collect_type_params(value, out);
        }
        Type::TypeOf(Some(subject)) => collect_type_params(subject, out),
        Type::Wrapper(base) => collect_type_params(base, out),
        Type::Opaque { parameters, .. } => {
            for p in parameters {
                collect_type_params(p, out);
            }
        }
        _ => {}
    }
}

#[derive(Debug, Clone)]
pub struct FunctionDecl {
    pub name: String,
    pub overloads: Vec<OverloadDecl>,
}

impl FunctionDecl {
    pub fn new(name: impl Into<String>, overloads: Vec<OverloadDecl>) -> FunctionDecl {
        FunctionDecl {
            name: name.into(),
            overloads,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Declaration {
    Variable(VariableDecl),
    Function(FunctionDecl),
}

impl Declaration {
    pub fn variable(name: impl Into<String>, ty: Type) -> Declaration {
        Declaration::Variable(VariableDecl::new(name, ty))
    }

    pub fn function(name: impl Into<String>, overloads: Vec<OverloadDecl>) -> Declaration {
        Declaration::Function(FunctionDecl::new(name, overloads))
    }
}

/// A layered scope of identifier declarations plus a flat function table.
/// Comprehensions push and pop ident layers; function declarations merge by
/// name, so hosts can extend standard functions with new overloads.
#[derive(Debug, Clone, Default)]
pub struct DeclScope {
    ident_layers: Vec<HashMap<String, VariableDecl>>,
    functions: HashMap<String, FunctionDecl>,
}

impl DeclScope {
    pub fn new() -> DeclScope {
        DeclScope {
            ident_layers: vec![HashMap::new()],
            functions: HashMap::new(),
        }
    }

    pub fn add(&mut self, decl: Declaration) {
        match decl {
            Declaration::Variable(v) => {
                self.ident_layers
                    .first_mut()
                    .expect("root scope")
                    .insert(v.name.clone(), v);
            }
            Declaration::Function(f) => match self.functions.get_mut(&f.name) {
                Some(existing) => existing.overloads.extend(f.overloads),
                None => {
                    self.functions.insert(f.name.clone(), f);
                }
            },
        }
    }

    pub fn push_layer(&mut self) {
        self.ident_layers.push(HashMap::new());
    }

    pub fn pop_layer(&mut self) {
        self.ident_layers.pop();
    }

    /// Declares into the innermost layer (comprehension variables).
    pub fn declare_local(&mut self, decl: VariableDecl) {
        self.ident_layers
            .last_mut()
            .expect("at least the root scope")
            .insert(decl.name.clone(), decl);
    }

    pub fn find_ident(&self, name: &str) -> Option<&VariableDecl> {
        self.ident_layers
            .iter()
            .rev()
            .find_map(|layer| layer.get(name))
    }

    pub fn find_function(&self, name: &str) -> Option<&FunctionDecl> {
        self.functions.get(name)
    }
}
