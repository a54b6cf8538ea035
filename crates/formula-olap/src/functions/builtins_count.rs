use crate::calc::{Calc, Compiler, ScalarCalc, SetCalc};
use crate::error::{OlapError, OlapResult};
use crate::expr::{Category, Expr};
use crate::functions::FunctionSpec;

inventory::submit! {
    FunctionSpec {
        name: "Count",
        signatures: &[&[Category::Set], &[Category::Set, Category::Symbol]],
        return_category: Category::Numeric,
        description: "Number of tuples in a set; EXCLUDEEMPTY counts only tuples with data",
        compile: compile_count,
    }
}

fn compile_count(compiler: &Compiler<'_>, args: &[Expr]) -> OlapResult<Calc> {
    let exclude_empty = match args.get(1) {
        None => false,
        Some(Expr::Symbol(s)) if s.eq_ignore_ascii_case("INCLUDEEMPTY") => false,
        Some(Expr::Symbol(s)) if s.eq_ignore_ascii_case("EXCLUDEEMPTY") => true,
        Some(other) => {
            return Err(OlapError::SignatureMismatch {
                function: "Count".to_string(),
                signature: format!("Set, {}", other.to_mdx(compiler.schema())),
            })
        }
    };

    // Count(s, EXCLUDEEMPTY) is Count(NonEmpty(s)), so both share the native path and
    // one definition of empty.
    let set = if exclude_empty {
        SetCalc::NonEmpty {
            args: vec![args[0].clone()],
            source: Box::new(compiler.compile_set(&args[0])?),
            filter: None,
        }
    } else {
        compiler.compile_set(&args[0])?
    };
    Ok(Calc::Scalar(ScalarCalc::Count {
        set,
        count_empty: true,
    }))
}

inventory::submit! {
    FunctionSpec {
        name: "SetToStr",
        signatures: &[&[Category::Set]],
        return_category: Category::String,
        description: "Text form of a set, e.g. {[Store].[USA], [Store].[Mexico]}",
        compile: compile_set_to_str,
    }
}

fn compile_set_to_str(compiler: &Compiler<'_>, args: &[Expr]) -> OlapResult<Calc> {
    Ok(Calc::Scalar(ScalarCalc::SetToStr(
        compiler.compile_set(&args[0])?,
    )))
}
