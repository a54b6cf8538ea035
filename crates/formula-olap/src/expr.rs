//! Parsed set and scalar expressions.

use crate::schema::{LevelId, MemberId, Schema};
use std::fmt::Write as _;

/// Argument/return category used to match function signatures.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Category {
    Set,
    Member,
    Symbol,
    Numeric,
    String,
}

impl Category {
    pub fn name(self) -> &'static str {
        match self {
            Category::Set => "Set",
            Category::Member => "Member",
            Category::Symbol => "Symbol",
            Category::Numeric => "Numeric",
            Category::String => "String",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Expr {
    Member(MemberId),
    /// `<level>.Members`
    LevelMembers(LevelId),
    /// `<member>.Children`
    Children(MemberId),
    /// Set literal `{a, b, ...}`.
    Set(Vec<Expr>),
    /// Bare keyword such as `EXCLUDEEMPTY`.
    Symbol(String),
    Call { name: String, args: Vec<Expr> },
}

impl Expr {
    pub fn call(name: impl Into<String>, args: Vec<Expr>) -> Self {
        Expr::Call {
            name: name.into(),
            args,
        }
    }

    pub fn members(members: impl IntoIterator<Item = MemberId>) -> Self {
        Expr::Set(members.into_iter().map(Expr::Member).collect())
    }

    pub fn symbol(name: impl Into<String>) -> Self {
        Expr::Symbol(name.into())
    }

    /// Category of the expression; calls take their function's return category.
    pub fn category(&self) -> Category {
        match self {
            Expr::Member(_) => Category::Member,
            Expr::LevelMembers(_) | Expr::Children(_) | Expr::Set(_) => Category::Set,
            Expr::Symbol(_) => Category::Symbol,
            Expr::Call { name, .. } => crate::functions::lookup_function(name)
                .map_or(Category::Set, |spec| spec.return_category),
        }
    }

    /// Render as MDX text. Used for display and as the filter text in native cache keys.
    pub fn to_mdx(&self, schema: &Schema) -> String {
        let mut out = String::new();
        self.write_mdx(schema, &mut out);
        out
    }

    fn write_mdx(&self, schema: &Schema, out: &mut String) {
        match self {
            Expr::Member(m) => out.push_str(schema.member(*m).unique_name()),
            Expr::LevelMembers(l) => {
                let level = schema.level(*l);
                let hierarchy = schema.hierarchy(level.hierarchy());
                let _ = write!(out, "[{}].[{}].Members", hierarchy.name(), level.name());
            }
            Expr::Children(m) => {
                let _ = write!(out, "{}.Children", schema.member(*m).unique_name());
            }
            Expr::Set(items) => {
                out.push('{');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    item.write_mdx(schema, out);
                }
                out.push('}');
            }
            Expr::Symbol(s) => out.push_str(s),
            Expr::Call { name, args } => {
                out.push_str(name);
                out.push('(');
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    arg.write_mdx(schema, out);
                }
                out.push(')');
            }
        }
    }
}
