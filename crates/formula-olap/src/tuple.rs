//! Tuple lists: ordered sequences of fixed-arity member tuples.

use crate::error::{OlapError, OlapResult};
use crate::schema::{MemberId, Schema};
use smallvec::SmallVec;
use std::fmt;

/// An owned tuple. Most tuples have one to four members.
pub type Tuple = SmallVec<[MemberId; 4]>;

/// An ordered list of tuples that all have the same arity.
///
/// Members are stored row-major in one flat buffer; duplicates are allowed.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct TupleList {
    arity: usize,
    len: usize,
    members: Vec<MemberId>,
}

impl TupleList {
    pub fn new(arity: usize) -> Self {
        Self::with_capacity(arity, 0)
    }

    pub fn with_capacity(arity: usize, capacity: usize) -> Self {
        Self {
            arity,
            len: 0,
            members: Vec::with_capacity(arity * capacity),
        }
    }

    /// A list of one-member tuples.
    pub fn from_members(members: Vec<MemberId>) -> Self {
        Self {
            arity: 1,
            len: members.len(),
            members,
        }
    }

    pub fn from_tuples<'a>(
        arity: usize,
        tuples: impl IntoIterator<Item = &'a [MemberId]>,
    ) -> OlapResult<Self> {
        let mut list = Self::new(arity);
        for tuple in tuples {
            list.push(tuple)?;
        }
        Ok(list)
    }

    pub fn arity(&self) -> usize {
        self.arity
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn push(&mut self, tuple: &[MemberId]) -> OlapResult<()> {
        if tuple.len() != self.arity {
            return Err(OlapError::ArityMismatch {
                expected: self.arity,
                actual: tuple.len(),
            });
        }
        self.members.extend_from_slice(tuple);
        self.len += 1;
        Ok(())
    }

    pub fn get(&self, index: usize) -> Option<&[MemberId]> {
        if index >= self.len {
            return None;
        }
        let start = index * self.arity;
        Some(&self.members[start..start + self.arity])
    }

    pub fn iter(&self) -> impl Iterator<Item = &[MemberId]> + '_ {
        (0..self.len).filter_map(move |i| self.get(i))
    }

    /// Column `column` of every tuple, in list order.
    pub fn slice(&self, column: usize) -> Vec<MemberId> {
        self.iter().filter_map(|t| t.get(column).copied()).collect()
    }

    pub fn cursor(&self) -> TupleCursor<'_> {
        TupleCursor {
            list: self,
            next: 0,
        }
    }

    /// Keep the tuples for which `keep` returns true.
    pub fn retain(&mut self, mut keep: impl FnMut(&[MemberId]) -> bool) {
        let arity = self.arity;
        let mut kept = Vec::with_capacity(self.members.len());
        let mut len = 0;
        for tuple in self.iter() {
            if keep(tuple) {
                kept.extend_from_slice(tuple);
                len += 1;
            }
        }
        debug_assert_eq!(kept.len(), len * arity);
        self.members = kept;
        self.len = len;
    }

    /// Every tuple of `self` concatenated with every tuple of `other`, outer loop over `self`.
    pub fn cross_join(&self, other: &TupleList) -> TupleList {
        let mut out = TupleList::with_capacity(self.arity + other.arity, self.len * other.len);
        for left in self.iter() {
            for right in other.iter() {
                out.members.extend_from_slice(left);
                out.members.extend_from_slice(right);
                out.len += 1;
            }
        }
        out
    }

    pub fn display<'a>(&'a self, schema: &'a Schema) -> TupleListDisplay<'a> {
        TupleListDisplay { list: self, schema }
    }
}

/// Forward cursor over a [`TupleList`].
///
/// The cursor only yields tuples; binding them into an evaluation context is done with
/// [`crate::context::Evaluator::set_context_tuple`].
pub struct TupleCursor<'a> {
    list: &'a TupleList,
    next: usize,
}

impl<'a> TupleCursor<'a> {
    /// Advance to the next tuple, returning it, or `None` when exhausted.
    pub fn forward(&mut self) -> Option<&'a [MemberId]> {
        let tuple = self.list.get(self.next)?;
        self.next += 1;
        Some(tuple)
    }

    /// Number of tuples consumed so far.
    pub fn position(&self) -> usize {
        self.next
    }
}

/// A lazily enumerated set of tuples: the cartesian product of its factors.
///
/// Produced by set expressions whose result is cheaper to stream than to materialize.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TupleIterable {
    factors: Vec<TupleList>,
}

impl TupleIterable {
    pub fn product(factors: Vec<TupleList>) -> Self {
        Self { factors }
    }

    pub fn arity(&self) -> usize {
        self.factors.iter().map(TupleList::arity).sum()
    }

    pub fn iter(&self) -> ProductIter<'_> {
        let exhausted = self.factors.is_empty() || self.factors.iter().any(TupleList::is_empty);
        ProductIter {
            factors: &self.factors,
            indices: vec![0; self.factors.len()],
            exhausted,
        }
    }

    pub fn materialize(&self) -> TupleList {
        let mut out = TupleList::new(self.arity());
        for tuple in self.iter() {
            out.members.extend_from_slice(&tuple);
            out.len += 1;
        }
        out
    }
}

pub struct ProductIter<'a> {
    factors: &'a [TupleList],
    indices: Vec<usize>,
    exhausted: bool,
}

impl Iterator for ProductIter<'_> {
    type Item = Tuple;

    fn next(&mut self) -> Option<Tuple> {
        if self.exhausted {
            return None;
        }
        let mut tuple = Tuple::new();
        for (factor, &i) in self.factors.iter().zip(&self.indices) {
            tuple.extend_from_slice(factor.get(i)?);
        }

        // Odometer increment, rightmost factor fastest.
        let mut pos = self.indices.len();
        loop {
            if pos == 0 {
                self.exhausted = true;
                break;
            }
            pos -= 1;
            self.indices[pos] += 1;
            if self.indices[pos] < self.factors[pos].len() {
                break;
            }
            self.indices[pos] = 0;
        }
        Some(tuple)
    }
}

pub struct TupleListDisplay<'a> {
    list: &'a TupleList,
    schema: &'a Schema,
}

impl fmt::Display for TupleListDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, tuple) in self.list.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write_tuple(f, self.schema, tuple)?;
        }
        f.write_str("}")
    }
}

/// Write one tuple: a bare unique name for single members, `(a, b)` otherwise.
pub(crate) fn write_tuple(
    out: &mut impl fmt::Write,
    schema: &Schema,
    tuple: &[MemberId],
) -> fmt::Result {
    if let [member] = tuple {
        return out.write_str(schema.member(*member).unique_name());
    }
    out.write_str("(")?;
    for (i, &member) in tuple.iter().enumerate() {
        if i > 0 {
            out.write_str(", ")?;
        }
        out.write_str(schema.member(member).unique_name())?;
    }
    out.write_str(")")
}
