//! Set and scalar functions, registered with [`inventory`] and resolved by name and
//! argument categories.

use std::collections::HashMap;
use std::sync::OnceLock;

use crate::calc::{Calc, Compiler};
use crate::error::{OlapError, OlapResult};
use crate::expr::{Category, Expr};

// Built-ins live in their own modules; each `inventory::submit!` registers one function.
mod builtins_count;
mod builtins_set;

pub type CompileFn = fn(&Compiler<'_>, &[Expr]) -> OlapResult<Calc>;

#[derive(Clone, Copy)]
pub struct FunctionSpec {
    pub name: &'static str,
    /// Accepted argument categories, one slice per overload.
    pub signatures: &'static [&'static [Category]],
    pub return_category: Category,
    pub description: &'static str,
    pub compile: CompileFn,
}

impl FunctionSpec {
    pub fn accepts(&self, categories: &[Category]) -> bool {
        self.signatures.iter().any(|sig| *sig == categories)
    }
}

inventory::collect!(FunctionSpec);

pub fn iter_function_specs() -> impl Iterator<Item = &'static FunctionSpec> {
    inventory::iter::<FunctionSpec>.into_iter()
}

fn registry() -> &'static HashMap<String, &'static FunctionSpec> {
    static REGISTRY: OnceLock<HashMap<String, &'static FunctionSpec>> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        let mut map = HashMap::new();
        for spec in inventory::iter::<FunctionSpec> {
            map.insert(spec.name.to_ascii_uppercase(), spec);
        }
        map
    })
}

pub fn lookup_function(name: &str) -> Option<&'static FunctionSpec> {
    registry().get(&name.to_ascii_uppercase()).copied()
}

/// The function `name` with an overload taking exactly `categories`.
pub fn resolve(name: &str, categories: &[Category]) -> OlapResult<&'static FunctionSpec> {
    let spec = lookup_function(name).ok_or_else(|| OlapError::UnknownFunction(name.to_string()))?;
    if spec.accepts(categories) {
        return Ok(spec);
    }
    Err(OlapError::SignatureMismatch {
        function: spec.name.to_string(),
        signature: categories
            .iter()
            .map(|c| c.name())
            .collect::<Vec<_>>()
            .join(", "),
    })
}
