use crate::calc::{Calc, Compiler, SetCalc};
use crate::error::{OlapError, OlapResult};
use crate::expr::{Category, Expr};
use crate::functions::FunctionSpec;

inventory::submit! {
    FunctionSpec {
        name: "NonEmpty",
        signatures: &[
            &[Category::Set],
            &[Category::Set, Category::Set],
            &[Category::Set, Category::Member],
        ],
        return_category: Category::Set,
        description: "Tuples of the set that have data for the context measure, or for any member of the second set",
        compile: compile_non_empty,
    }
}

fn compile_non_empty(compiler: &Compiler<'_>, args: &[Expr]) -> OlapResult<Calc> {
    let source = compiler.compile_set(&args[0])?;
    let filter = match args.get(1) {
        Some(expr) => {
            let filter = compiler.compile_set(expr)?;
            if filter.arity() != 1 {
                return Err(OlapError::SignatureMismatch {
                    function: "NonEmpty".to_string(),
                    signature: format!("Set, Set of arity {}", filter.arity()),
                });
            }
            Some(Box::new(filter))
        }
        None => None,
    };
    Ok(Calc::Set(SetCalc::NonEmpty {
        args: args.to_vec(),
        source: Box::new(source),
        filter,
    }))
}

inventory::submit! {
    FunctionSpec {
        name: "Except",
        signatures: &[
            &[Category::Set, Category::Set],
            &[Category::Set, Category::Member],
        ],
        return_category: Category::Set,
        description: "Tuples of the first set that are not in the second",
        compile: compile_except,
    }
}

fn compile_except(compiler: &Compiler<'_>, args: &[Expr]) -> OlapResult<Calc> {
    Ok(Calc::Set(SetCalc::Except {
        args: args.to_vec(),
        left: Box::new(compiler.compile_set(&args[0])?),
        right: Box::new(compiler.compile_set(&args[1])?),
    }))
}

inventory::submit! {
    FunctionSpec {
        name: "CrossJoin",
        signatures: &[&[Category::Set, Category::Set]],
        return_category: Category::Set,
        description: "Cartesian product of two sets",
        compile: compile_cross_join,
    }
}

fn compile_cross_join(compiler: &Compiler<'_>, args: &[Expr]) -> OlapResult<Calc> {
    Ok(Calc::Set(SetCalc::CrossJoin(
        Box::new(compiler.compile_set(&args[0])?),
        Box::new(compiler.compile_set(&args[1])?),
    )))
}
