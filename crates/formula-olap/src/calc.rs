//! Compiled expressions.
//!
//! A [`Calc`] is compiled once from an [`Expr`] and evaluated against an [`Evaluator`]. Each
//! set node reports up front whether it yields a materialized list or a lazy iterable, so
//! consumers choose their strategy before evaluating.

use crate::context::Evaluator;
use crate::error::{OlapError, OlapResult};
use crate::expr::{Category, Expr};
use crate::functions;
use crate::interpret;
use crate::schema::{LevelId, MemberId, Schema};
use crate::tuple::{TupleIterable, TupleList};
use crate::value::Value;
use std::sync::Arc;

/// How a set calc delivers its tuples.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResultStyle {
    List,
    Iterable,
}

/// The result of evaluating a set calc.
#[derive(Clone, Debug, PartialEq)]
pub enum SetValue {
    List(TupleList),
    Iterable(TupleIterable),
}

impl SetValue {
    pub fn arity(&self) -> usize {
        match self {
            SetValue::List(list) => list.arity(),
            SetValue::Iterable(lazy) => lazy.arity(),
        }
    }

    pub fn into_list(self) -> TupleList {
        match self {
            SetValue::List(list) => list,
            SetValue::Iterable(lazy) => lazy.materialize(),
        }
    }

    /// Visit every tuple in order with its position; stops at the first error.
    pub fn try_for_each(
        &self,
        mut f: impl FnMut(usize, &[MemberId]) -> OlapResult<()>,
    ) -> OlapResult<()> {
        match self {
            SetValue::List(list) => {
                for (i, tuple) in list.iter().enumerate() {
                    f(i, tuple)?;
                }
            }
            SetValue::Iterable(lazy) => {
                for (i, tuple) in lazy.iter().enumerate() {
                    f(i, &tuple)?;
                }
            }
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum SetCalc {
    /// Visible members of a level.
    Level(LevelId),
    /// An explicit member list; invisible members are dropped.
    Members(Vec<MemberId>),
    /// Visible children of a member.
    Children(MemberId),
    CrossJoin(Box<SetCalc>, Box<SetCalc>),
    /// `args` are the call's original arguments, offered to the native gates first.
    NonEmpty {
        args: Vec<Expr>,
        source: Box<SetCalc>,
        filter: Option<Box<SetCalc>>,
    },
    Except {
        args: Vec<Expr>,
        left: Box<SetCalc>,
        right: Box<SetCalc>,
    },
}

impl SetCalc {
    pub fn result_style(&self) -> ResultStyle {
        match self {
            SetCalc::CrossJoin(..) => ResultStyle::Iterable,
            _ => ResultStyle::List,
        }
    }

    pub fn arity(&self) -> usize {
        match self {
            SetCalc::Level(_) | SetCalc::Members(_) | SetCalc::Children(_) => 1,
            SetCalc::CrossJoin(left, right) => left.arity() + right.arity(),
            SetCalc::NonEmpty { source, .. } => source.arity(),
            SetCalc::Except { left, .. } => left.arity(),
        }
    }

    pub fn evaluate(&self, ev: &mut Evaluator) -> OlapResult<SetValue> {
        match self {
            SetCalc::Level(level) => Ok(SetValue::List(TupleList::from_members(
                ev.schema().level_members(*level, ev.role()),
            ))),
            SetCalc::Members(members) => Ok(SetValue::List(visible(ev, members))),
            SetCalc::Children(parent) => {
                let children = ev.schema().children(*parent).to_vec();
                Ok(SetValue::List(visible(ev, &children)))
            }
            SetCalc::CrossJoin(left, right) => {
                let mut factors = Vec::with_capacity(2);
                for side in [left, right] {
                    match side.evaluate(ev)? {
                        SetValue::List(list) => factors.push(list),
                        SetValue::Iterable(lazy) => factors.push(lazy.materialize()),
                    }
                }
                Ok(SetValue::Iterable(TupleIterable::product(factors)))
            }
            SetCalc::NonEmpty {
                args,
                source,
                filter,
            } => {
                if let Some(list) = evaluate_native(ev, "NonEmpty", args)? {
                    return Ok(SetValue::List(list));
                }
                let list = source.evaluate_list(ev)?;
                let members = match filter {
                    Some(filter) => filter.evaluate_list(ev)?.slice(0),
                    None => Vec::new(),
                };
                Ok(SetValue::List(interpret::filter_non_empty(
                    ev, list, &members,
                )?))
            }
            SetCalc::Except { args, left, right } => {
                if let Some(list) = evaluate_native(ev, "Except", args)? {
                    return Ok(SetValue::List(list));
                }
                let left = left.evaluate_list(ev)?;
                let right = right.evaluate_list(ev)?;
                Ok(SetValue::List(interpret::except(ev, left, &right)?))
            }
        }
    }

    pub fn evaluate_list(&self, ev: &mut Evaluator) -> OlapResult<TupleList> {
        Ok(self.evaluate(ev)?.into_list())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ScalarCalc {
    Count { set: SetCalc, count_empty: bool },
    SetToStr(SetCalc),
}

impl ScalarCalc {
    pub fn evaluate(&self, ev: &mut Evaluator) -> OlapResult<Value> {
        match self {
            ScalarCalc::Count { set, count_empty } => {
                // The set is evaluated with the non-empty flag cleared as well.
                let mut guard = ev.scoped();
                guard.set_non_empty(false);
                let value = match set.result_style() {
                    ResultStyle::List => SetValue::List(set.evaluate_list(&mut guard)?),
                    ResultStyle::Iterable => set.evaluate(&mut guard)?,
                };
                let n = interpret::count(&mut guard, value, *count_empty)?;
                Ok(Value::from(n as f64))
            }
            ScalarCalc::SetToStr(set) => {
                let value = set.evaluate(ev)?;
                Ok(Value::from(interpret::set_to_str(ev, &value)?))
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Calc {
    Set(SetCalc),
    Scalar(ScalarCalc),
}

impl Calc {
    pub fn into_set(self) -> Option<SetCalc> {
        match self {
            Calc::Set(set) => Some(set),
            Calc::Scalar(_) => None,
        }
    }
}

/// Compiles expressions by resolving calls through the function registry.
pub struct Compiler<'a> {
    schema: &'a Schema,
}

impl<'a> Compiler<'a> {
    pub fn new(schema: &'a Schema) -> Self {
        Self { schema }
    }

    pub fn schema(&self) -> &'a Schema {
        self.schema
    }

    pub fn compile(&self, expr: &Expr) -> OlapResult<Calc> {
        match expr {
            Expr::Member(m) => Ok(Calc::Set(SetCalc::Members(vec![*m]))),
            Expr::LevelMembers(level) => Ok(Calc::Set(SetCalc::Level(*level))),
            Expr::Children(m) => Ok(Calc::Set(SetCalc::Children(*m))),
            Expr::Set(items) => {
                let members = items
                    .iter()
                    .map(|item| match item {
                        Expr::Member(m) => Ok(*m),
                        other => Err(OlapError::SignatureMismatch {
                            function: "{}".to_string(),
                            signature: other.category().name().to_string(),
                        }),
                    })
                    .collect::<OlapResult<Vec<_>>>()?;
                Ok(Calc::Set(SetCalc::Members(members)))
            }
            Expr::Symbol(s) => Err(OlapError::UnknownMember(s.clone())),
            Expr::Call { name, args } => {
                let categories: Vec<Category> = args.iter().map(Expr::category).collect();
                let spec = functions::resolve(name, &categories)?;
                (spec.compile)(self, args)
            }
        }
    }

    /// Compile `expr`, which must produce a set.
    pub fn compile_set(&self, expr: &Expr) -> OlapResult<SetCalc> {
        self.compile(expr)?
            .into_set()
            .ok_or_else(|| OlapError::SignatureMismatch {
                function: expr.to_mdx(self.schema),
                signature: Category::Set.name().to_string(),
            })
    }
}

fn visible(ev: &Evaluator, members: &[MemberId]) -> TupleList {
    TupleList::from_members(
        members
            .iter()
            .copied()
            .filter(|&m| ev.is_visible(m))
            .collect(),
    )
}

/// Run `function(args)` natively when a gate accepts it.
fn evaluate_native(
    ev: &mut Evaluator,
    function: &str,
    args: &[Expr],
) -> OlapResult<Option<TupleList>> {
    let session = Arc::clone(ev.session());
    match session.native().native_set_evaluator(ev, function, args) {
        Some(native) => native.execute(ev).map(Some),
        None => {
            log::trace!("{function}() is evaluated in memory");
            Ok(None)
        }
    }
}

impl Evaluator {
    /// Compile and evaluate a set expression in the current context.
    pub fn evaluate_set(&mut self, expr: &Expr) -> OlapResult<TupleList> {
        let schema = Arc::clone(self.session().schema());
        let calc = Compiler::new(&schema).compile_set(expr)?;
        calc.evaluate_list(self)
    }

    /// Compile and evaluate a scalar expression in the current context.
    pub fn evaluate_scalar(&mut self, expr: &Expr) -> OlapResult<Value> {
        let schema = Arc::clone(self.session().schema());
        match Compiler::new(&schema).compile(expr)? {
            Calc::Scalar(calc) => calc.evaluate(self),
            Calc::Set(_) => Err(OlapError::SignatureMismatch {
                function: expr.to_mdx(&schema),
                signature: Category::Set.name().to_string(),
            }),
        }
    }
}
