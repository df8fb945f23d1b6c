//! Boundary to the atom selection subsystem.
//!
//! The membrane code never depends on a selection grammar. It only needs to
//! turn descriptor strings into sets of atom indices, which is expressed by the
//! [SelectionResolver] trait. [TopologySelector] is a small keyword matcher
//! over a [Topology] that understands conjunctions of
//! `all`, `name`, `resname`, `resid`, `resindex` and `index` terms.

use crate::core::{LenProvider, Topology};
use regex::Regex;
use rustc_hash::FxHashMap;
use sorted_vec::SortedSet;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SelectionError {
    #[error("empty selection expression")]
    EmptyExpr,

    #[error("unknown selection keyword '{0}'")]
    Keyword(String),

    #[error("keyword '{0}' requires at least one value")]
    NoValues(String),

    #[error("invalid integer value '{0}'")]
    Int(String),

    #[error("invalid regex value")]
    Regex(#[from] regex::Error),

    #[error("index {0} is out of range 0:{1}")]
    OutOfRange(usize, usize),
}

/// Sorted set of unique atom indices
#[derive(Debug, Clone, PartialEq)]
pub struct Sel(SortedSet<usize>);

impl Sel {
    pub fn from_unsorted(ind: Vec<usize>) -> Self {
        Self(SortedSet::from_unsorted(ind))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter_index(&self) -> impl ExactSizeIterator<Item = usize> + '_ {
        self.0.iter().cloned()
    }

    pub fn first_index(&self) -> Option<usize> {
        self.0.first().cloned()
    }

    pub fn last_index(&self) -> Option<usize> {
        self.0.last().cloned()
    }

    pub fn contains(&self, i: usize) -> bool {
        self.0.binary_search(&i).is_ok()
    }

    pub fn is_subset_of(&self, other: &Sel) -> bool {
        self.iter_index().all(|i| other.contains(i))
    }
}

/// Resolves selection strings of the lipid descriptors into atom indices
pub trait SelectionResolver {
    /// Total number of atoms in the system
    fn num_atoms(&self) -> usize;

    /// Selects atoms from the whole system
    fn select(&self, expr: &str) -> Result<Sel, SelectionError>;

    /// Selects atoms only among the atoms of `within`
    fn subselect(&self, within: &Sel, expr: &str) -> Result<Sel, SelectionError>;

    /// Splits the selection into individual molecules
    fn split_molecules(&self, sel: &Sel) -> Vec<Sel>;

    /// Mass of the atom used to weight marker centers.
    /// Equal masses give plain geometric centers.
    fn mass(&self, _i: usize) -> f32 {
        1.0
    }
}

//--------------------------------------------------------------

enum StrValue {
    Str(String),
    Regex(Regex),
}

impl StrValue {
    fn matches(&self, s: &str) -> bool {
        match self {
            Self::Str(v) => v == s,
            Self::Regex(r) => r.is_match(s),
        }
    }
}

enum IntValue {
    Single(i64),
    Range(i64, i64),
}

impl IntValue {
    fn matches(&self, v: i64) -> bool {
        match self {
            Self::Single(i) => *i == v,
            Self::Range(b, e) => *b <= v && v <= *e,
        }
    }
}

enum Term {
    All,
    Name(Vec<StrValue>),
    Resname(Vec<StrValue>),
    Resid(Vec<IntValue>),
    Resindex(Vec<IntValue>),
    Index(Vec<IntValue>),
}

fn parse_int(s: &str) -> Result<i64, SelectionError> {
    s.parse().map_err(|_| SelectionError::Int(s.to_owned()))
}

fn parse_str_values(values: &[&str]) -> Result<Vec<StrValue>, SelectionError> {
    values
        .iter()
        .map(|v| {
            if v.len() > 2 && v.starts_with('/') && v.ends_with('/') {
                Ok(StrValue::Regex(Regex::new(&format!("^{}$", &v[1..v.len() - 1]))?))
            } else {
                Ok(StrValue::Str(v.to_string()))
            }
        })
        .collect()
}

fn parse_int_values(values: &[&str]) -> Result<Vec<IntValue>, SelectionError> {
    values
        .iter()
        .map(|v| match v.split_once(':') {
            Some((b, e)) => Ok(IntValue::Range(parse_int(b)?, parse_int(e)?)),
            None => Ok(IntValue::Single(parse_int(v)?)),
        })
        .collect()
}

fn parse_term(tokens: &[&str]) -> Result<Term, SelectionError> {
    let (kw, values) = tokens.split_first().ok_or(SelectionError::EmptyExpr)?;
    if *kw == "all" {
        return if values.is_empty() {
            Ok(Term::All)
        } else {
            Err(SelectionError::Keyword(values[0].to_owned()))
        };
    }
    if values.is_empty() {
        return Err(SelectionError::NoValues(kw.to_string()));
    }
    match *kw {
        "name" => Ok(Term::Name(parse_str_values(values)?)),
        "resname" => Ok(Term::Resname(parse_str_values(values)?)),
        "resid" => Ok(Term::Resid(parse_int_values(values)?)),
        "resindex" => Ok(Term::Resindex(parse_int_values(values)?)),
        "index" => Ok(Term::Index(parse_int_values(values)?)),
        _ => Err(SelectionError::Keyword(kw.to_string())),
    }
}

fn parse_expr(expr: &str) -> Result<Vec<Term>, SelectionError> {
    let tokens = expr.split_whitespace().collect::<Vec<_>>();
    if tokens.is_empty() {
        return Err(SelectionError::EmptyExpr);
    }
    tokens
        .split(|t| *t == "and")
        .map(parse_term)
        .collect()
}

/// Keyword selector over the atoms of a [Topology]
pub struct TopologySelector<'a> {
    top: &'a Topology,
}

impl<'a> TopologySelector<'a> {
    pub fn new(top: &'a Topology) -> Self {
        Self { top }
    }

    fn matches(&self, terms: &[Term], i: usize) -> bool {
        let Some(at) = self.top.get_atom(i) else {
            return false;
        };
        terms.iter().all(|t| match t {
            Term::All => true,
            Term::Name(v) => v.iter().any(|s| s.matches(&at.name)),
            Term::Resname(v) => v.iter().any(|s| s.matches(&at.resname)),
            Term::Resid(v) => v.iter().any(|r| r.matches(at.resid as i64)),
            Term::Resindex(v) => v.iter().any(|r| r.matches(at.resindex as i64)),
            Term::Index(v) => v.iter().any(|r| r.matches(i as i64)),
        })
    }
}

impl SelectionResolver for TopologySelector<'_> {
    fn num_atoms(&self) -> usize {
        self.top.len()
    }

    fn select(&self, expr: &str) -> Result<Sel, SelectionError> {
        let terms = parse_expr(expr)?;
        Ok(Sel::from_unsorted(
            (0..self.top.len())
                .filter(|i| self.matches(&terms, *i))
                .collect(),
        ))
    }

    fn subselect(&self, within: &Sel, expr: &str) -> Result<Sel, SelectionError> {
        let terms = parse_expr(expr)?;
        if let Some(last) = within.last_index() {
            if last >= self.top.len() {
                return Err(SelectionError::OutOfRange(last, self.top.len()));
            }
        }
        Ok(Sel::from_unsorted(
            within
                .iter_index()
                .filter(|i| self.matches(&terms, *i))
                .collect(),
        ))
    }

    fn split_molecules(&self, sel: &Sel) -> Vec<Sel> {
        // Residues are kept in the order of their first atom
        let mut order = vec![];
        let mut parts: FxHashMap<usize, Vec<usize>> = FxHashMap::default();
        for i in sel.iter_index() {
            if let Some(at) = self.top.get_atom(i) {
                parts
                    .entry(at.resindex)
                    .or_insert_with(|| {
                        order.push(at.resindex);
                        vec![]
                    })
                    .push(i);
            }
        }
        order
            .into_iter()
            .filter_map(|ri| parts.remove(&ri))
            .map(Sel::from_unsorted)
            .collect()
    }

    fn mass(&self, i: usize) -> f32 {
        self.top.get_atom(i).map(|a| a.mass).unwrap_or(0.0)
    }
}
