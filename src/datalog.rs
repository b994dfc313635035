//! The clause algebra.
//!
//! A query is a tree of [`Clause`]s. Leaves are triple patterns ([`Where`]),
//! predicate calls ([`WherePredicate`]), projections ([`Find`]) and the query
//! keys from the [`keys`](crate::keys) module. Compound clauses ([`And`],
//! [`Or`], [`Not`], [`NotJoin`], [`OrJoin`]) hold an ordered sequence of
//! sub-clauses. Trees are combined through [`Combine`] (`and_`, `or_`,
//! `negate`), which checks every pairing against the legal combination table
//! and fails instead of coercing.
//!
//! Compilation is pure. Sibling fragments of a compound clause are
//! deduplicated when every child is idempotent, and `And`/`Or` siblings are
//! sorted when every child is commutative, so that equal trees always compile
//! to the same text regardless of the order they were built in.

// used to deduplicate sibling fragments
use std::collections::HashSet;
use std::hash::BuildHasherDefault;
// used to print out readable forms of a clause
use std::fmt;

use seahash::SeaHasher;

use crate::error::{Result, XtdbError};
use crate::expression::Expression;
use crate::keys::{FindWhere, In, Limit, Offset, OrderBy, Timeout};

pub type FragmentHasher = BuildHasherDefault<SeaHasher>;

/// Renders a string as a double-quoted literal, escaping embedded quotes.
pub fn quote(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\\\""))
}

// ------------- Section -------------
/// The query section a conjunction belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Section {
    Where,
    Find,
}
impl Section {
    pub fn keyword(&self) -> &'static str {
        match self {
            Self::Where => "where",
            Self::Find => "find",
        }
    }
}

/// Coarse classification used by the combination table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Kind {
    Where,
    Find,
    Key,
    FindWhere,
}

// ------------- Leaves -------------
/// A single triple pattern `[ document :field value ]`.
#[derive(Debug, Clone)]
pub struct Where {
    document: String,
    field: String,
    value: String,
}
impl Where {
    pub fn new(document: impl Into<String>, field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            document: document.into(),
            field: field.into(),
            value: value.into(),
        }
    }
    pub fn document(&self) -> &str {
        &self.document
    }
    pub fn field(&self) -> &str {
        &self.field
    }
    pub fn value(&self) -> &str {
        &self.value
    }
    fn fragment(&self) -> String {
        format!("[ {} :{} {} ]", self.document, self.field, self.value)
    }
}

/// A function call pattern such as `[ (> ?age 18) ]`, optionally binding its result.
#[derive(Debug, Clone)]
pub struct WherePredicate {
    operation: String,
    args: Vec<String>,
    bind: Option<String>,
}
impl WherePredicate {
    pub fn new<I, S>(operation: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            operation: operation.into(),
            args: args.into_iter().map(Into::into).collect(),
            bind: None,
        }
    }
    pub fn bind(mut self, variable: impl Into<String>) -> Self {
        self.bind = Some(variable.into());
        self
    }
    pub fn operation(&self) -> &str {
        &self.operation
    }
    pub fn args(&self) -> &[String] {
        &self.args
    }
    fn fragment(&self) -> String {
        let mut call = self.operation.clone();
        for arg in &self.args {
            call.push(' ');
            call.push_str(arg);
        }
        match &self.bind {
            Some(bind) => format!("[ ({call}) {bind} ]"),
            None => format!("[ ({call}) ]"),
        }
    }
}

/// One projection of the find section.
#[derive(Debug, Clone)]
pub struct Find {
    expression: Expression,
}
impl Find {
    pub fn new(expression: impl Into<Expression>) -> Self {
        Self {
            expression: expression.into(),
        }
    }
    pub fn expression(&self) -> &Expression {
        &self.expression
    }
}

// ------------- Compounds -------------
#[derive(Debug, Clone)]
pub struct And {
    clauses: Vec<Clause>,
    section: Section,
}
impl And {
    pub fn new(clauses: Vec<Clause>, section: Section) -> Self {
        Self { clauses, section }
    }
    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }
    pub fn section(&self) -> Section {
        self.section
    }
    // Project lists are positional.
    fn commutative(&self) -> bool {
        self.section == Section::Where && self.clauses.iter().all(Clause::commutative)
    }
    fn idempotent(&self) -> bool {
        self.section == Section::Where && self.clauses.iter().all(Clause::idempotent)
    }
    fn collect(&self, fragments: &mut Vec<String>) {
        for clause in &self.clauses {
            match clause {
                Clause::And(inner) if inner.section == self.section => inner.collect(fragments),
                other => fragments.push(other.compile(false, " ")),
            }
        }
    }
    fn fragments(&self) -> Vec<String> {
        let mut fragments = Vec::new();
        self.collect(&mut fragments);
        canonical(fragments, self.commutative(), self.idempotent())
    }
    fn compile(&self, root: bool, separator: &str) -> String {
        match (self.section, root) {
            (Section::Where, true) => match self.fragments().as_slice() {
                // a single surviving pattern renders like a leaf
                [fragment] => format!(":where [{fragment}]"),
                fragments => format!(":where [{}{}]", separator, fragments.join(separator)),
            },
            (Section::Find, true) => format!(":find [{}]", self.fragments().join(" ")),
            (_, false) => self.fragments().join(separator),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Or {
    clauses: Vec<Clause>,
}
impl Or {
    pub fn new(clauses: Vec<Clause>) -> Self {
        Self { clauses }
    }
    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }
    fn collect(&self, fragments: &mut Vec<String>) {
        for clause in &self.clauses {
            match clause {
                Clause::Or(inner) => inner.collect(fragments),
                Clause::And(and) => fragments.push(format!("(and {})", and.compile(false, " "))),
                other => fragments.push(other.compile(false, " ")),
            }
        }
    }
    fn fragment(&self) -> String {
        let mut fragments = Vec::new();
        self.collect(&mut fragments);
        let commutative = self.clauses.iter().all(Clause::commutative);
        let idempotent = self.clauses.iter().all(Clause::idempotent);
        format!("(or {})", canonical(fragments, commutative, idempotent).join(" "))
    }
}

#[derive(Debug, Clone)]
pub struct Not {
    clauses: Vec<Clause>,
}
impl Not {
    pub fn new(clauses: Vec<Clause>) -> Self {
        Self { clauses }
    }
    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }
    fn fragment(&self) -> String {
        format!("(not {})", negated(&self.clauses))
    }
}

/// `(not-join [?var] ...)`: negation scoped to one bound variable.
#[derive(Debug, Clone)]
pub struct NotJoin {
    variable: String,
    clauses: Vec<Clause>,
}
impl NotJoin {
    pub fn new(variable: impl Into<String>, clauses: Vec<Clause>) -> Self {
        Self {
            variable: variable.into(),
            clauses,
        }
    }
    pub fn variable(&self) -> &str {
        &self.variable
    }
    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }
    fn fragment(&self) -> String {
        format!("(not-join [{}] {})", self.variable, negated(&self.clauses))
    }
}

/// `(or-join [?var] ...)`: disjunction scoped to one bound variable.
#[derive(Debug, Clone)]
pub struct OrJoin {
    variable: String,
    clauses: Vec<Clause>,
}
impl OrJoin {
    pub fn new(variable: impl Into<String>, clauses: Vec<Clause>) -> Self {
        Self {
            variable: variable.into(),
            clauses,
        }
    }
    pub fn variable(&self) -> &str {
        &self.variable
    }
    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }
    fn fragment(&self) -> String {
        let fragments = self
            .clauses
            .iter()
            .map(|clause| match clause {
                Clause::And(and) => format!("(and {})", and.compile(false, " ")),
                other => other.compile(false, " "),
            })
            .collect();
        let idempotent = self.clauses.iter().all(Clause::idempotent);
        format!(
            "(or-join [{}] {})",
            self.variable,
            canonical(fragments, false, idempotent).join(" ")
        )
    }
}

// the body of not and not-join is an implicit conjunction
fn negated(clauses: &[Clause]) -> String {
    let mut fragments = Vec::new();
    for clause in clauses {
        match clause {
            Clause::And(and) if and.section == Section::Where => and.collect(&mut fragments),
            other => fragments.push(other.compile(false, " ")),
        }
    }
    let idempotent = clauses.iter().all(Clause::idempotent);
    canonical(fragments, false, idempotent).join(" ")
}

fn canonical(mut fragments: Vec<String>, commutative: bool, idempotent: bool) -> Vec<String> {
    if idempotent {
        let mut seen = HashSet::with_capacity_and_hasher(fragments.len(), FragmentHasher::default());
        fragments.retain(|fragment| seen.insert(fragment.clone()));
    }
    if commutative {
        fragments.sort();
    }
    fragments
}

// ------------- Clause -------------
/// A node of the query-expression tree.
#[derive(Debug, Clone)]
pub enum Clause {
    Where(Where),
    WherePredicate(WherePredicate),
    And(And),
    Or(Or),
    Not(Not),
    NotJoin(NotJoin),
    OrJoin(OrJoin),
    Find(Find),
    In(In),
    OrderBy(OrderBy),
    Limit(Limit),
    Offset(Offset),
    Timeout(Timeout),
    FindWhere(Box<FindWhere>),
}

impl Clause {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Where(_) => "where",
            Self::WherePredicate(_) => "where-predicate",
            Self::And(_) => "and",
            Self::Or(_) => "or",
            Self::Not(_) => "not",
            Self::NotJoin(_) => "not-join",
            Self::OrJoin(_) => "or-join",
            Self::Find(_) => "find",
            Self::In(_) => "in",
            Self::OrderBy(_) => "order-by",
            Self::Limit(_) => "limit",
            Self::Offset(_) => "offset",
            Self::Timeout(_) => "timeout",
            Self::FindWhere(_) => "find-where",
        }
    }
    pub(crate) fn kind(&self) -> Kind {
        match self {
            Self::Find(_) => Kind::Find,
            Self::And(and) if and.section == Section::Find => Kind::Find,
            Self::In(_) | Self::OrderBy(_) | Self::Limit(_) | Self::Offset(_) | Self::Timeout(_) => {
                Kind::Key
            }
            Self::FindWhere(_) => Kind::FindWhere,
            _ => Kind::Where,
        }
    }
    pub fn commutative(&self) -> bool {
        match self {
            Self::Find(_) => false,
            Self::And(and) => and.section == Section::Where,
            _ => true,
        }
    }
    pub fn idempotent(&self) -> bool {
        self.commutative()
    }
    /// Whether this is a complete query that can be sent to the database.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::FindWhere(_))
    }

    /// Renders the clause. With `root` the clause is rendered as a query
    /// section (`:where [...]`, `:find [...]`, `:limit n`...), otherwise as
    /// the bare fragment embedded by a parent. `separator` joins the
    /// patterns of the top-level where list.
    pub fn compile(&self, root: bool, separator: &str) -> String {
        let fragment = match self {
            Self::Where(clause) => clause.fragment(),
            Self::WherePredicate(clause) => clause.fragment(),
            Self::Or(clause) => clause.fragment(),
            Self::Not(clause) => clause.fragment(),
            Self::NotJoin(clause) => clause.fragment(),
            Self::OrJoin(clause) => clause.fragment(),
            Self::And(clause) => return clause.compile(root, separator),
            Self::Find(find) if root => return format!(":find [{}]", find.expression),
            Self::Find(find) => return find.expression.compile(),
            Self::In(key) => return key.compile(root),
            Self::OrderBy(key) => return key.compile(root),
            Self::Limit(key) => return key.compile(root),
            Self::Offset(key) => return key.compile(root),
            Self::Timeout(key) => return key.compile(root),
            Self::FindWhere(query) => return query.compile(separator),
        };
        if root {
            format!(":where [{fragment}]")
        } else {
            fragment
        }
    }
}

impl fmt::Display for Clause {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.compile(true, " "))
    }
}

// Trees are equal when their canonical text is.
impl PartialEq for Clause {
    fn eq(&self, other: &Self) -> bool {
        self.compile(true, " ") == other.compile(true, " ")
    }
}
impl Eq for Clause {}

macro_rules! into_clause {
    ($($variant:ident),*) => {
        $(
            impl From<$variant> for Clause {
                fn from(clause: $variant) -> Self {
                    Clause::$variant(clause)
                }
            }
        )*
    };
}
into_clause!(Where, WherePredicate, And, Or, Not, NotJoin, OrJoin, Find, In, OrderBy, Limit, Offset, Timeout);

impl From<FindWhere> for Clause {
    fn from(query: FindWhere) -> Self {
        Clause::FindWhere(Box::new(query))
    }
}

// ------------- Algebra -------------
/// The combinators of the clause algebra: conjunction, disjunction and negation.
pub trait Combine: Into<Clause> {
    /// Conjunction (`&`).
    fn and_(self, other: impl Into<Clause>) -> Result<Clause> {
        conjoin(self.into(), other.into())
    }
    /// Disjunction (`|`).
    fn or_(self, other: impl Into<Clause>) -> Result<Clause> {
        disjoin(self.into(), other.into())
    }
    /// Negation (`~`).
    fn negate(self) -> Result<Clause> {
        invert(self.into())
    }
}
impl<T: Into<Clause>> Combine for T {}

fn conjoin(left: Clause, right: Clause) -> Result<Clause> {
    match (left, right) {
        (Clause::FindWhere(mut query), right) => {
            query.set_key(right)?;
            Ok(Clause::FindWhere(query))
        }
        (left, right) if left.kind() == Kind::Key || matches!(right.kind(), Kind::Key | Kind::FindWhere) => {
            Err(XtdbError::UnsupportedCombination(format!(
                "cannot use & on {} and {}",
                left.name(),
                right.name()
            )))
        }
        (Clause::NotJoin(mut join), right) if right.kind() == Kind::Where => {
            join.clauses.push(right);
            Ok(Clause::NotJoin(join))
        }
        (Clause::OrJoin(mut join), right) if right.kind() == Kind::Where => {
            join.clauses.push(right);
            Ok(Clause::OrJoin(join))
        }
        (left, right) => match (left.kind(), right.kind()) {
            (Kind::Find, Kind::Where) => Ok(FindWhere::assemble(left, right).into()),
            (Kind::Where, Kind::Find) => Err(XtdbError::IncompatibleSection {
                left: Section::Where.keyword().to_string(),
                right: Section::Find.keyword().to_string(),
            }),
            (Kind::Find, Kind::Find) => Ok(append(left, right, Section::Find)),
            _ => Ok(append(left, right, Section::Where)),
        },
    }
}

fn append(left: Clause, right: Clause, section: Section) -> Clause {
    let mut clauses = match left {
        Clause::And(and) if and.section == section => and.clauses,
        other => vec![other],
    };
    match right {
        Clause::And(and) if and.section == section => clauses.extend(and.clauses),
        other => clauses.push(other),
    }
    And::new(clauses, section).into()
}

fn disjoin(left: Clause, right: Clause) -> Result<Clause> {
    match (left.kind(), right.kind()) {
        (Kind::Find, _) | (_, Kind::Find) => {
            return Err(XtdbError::UnsupportedOperation("cannot use | on find clauses".to_string()));
        }
        (Kind::Where, Kind::Where) => (),
        _ => {
            return Err(XtdbError::UnsupportedOperation(
                "cannot use | on query keys/find-where".to_string(),
            ));
        }
    }
    match (left, right) {
        (Clause::Where(_) | Clause::WherePredicate(_), Clause::And(_)) => {
            Err(XtdbError::DisjunctionOfConjunction)
        }
        (Clause::Or(mut or), Clause::Or(other)) => {
            or.clauses.extend(other.clauses);
            Ok(Clause::Or(or))
        }
        (Clause::Or(mut or), right) => {
            or.clauses.push(right);
            Ok(Clause::Or(or))
        }
        (left, Clause::Or(mut or)) => {
            or.clauses.insert(0, left);
            Ok(Clause::Or(or))
        }
        (left, right) => Ok(Or::new(vec![left, right]).into()),
    }
}

fn invert(clause: Clause) -> Result<Clause> {
    match clause {
        Clause::Where(_) | Clause::WherePredicate(_) => Ok(Not::new(vec![clause]).into()),
        Clause::And(and) if and.section == Section::Where => Ok(Not::new(and.clauses).into()),
        // double negation cancels
        Clause::Not(not) => match <[Clause; 1]>::try_from(not.clauses) {
            Ok([single]) => Ok(single),
            Err(clauses) => Ok(And::new(clauses, Section::Where).into()),
        },
        Clause::Or(_) | Clause::NotJoin(_) | Clause::OrJoin(_) => Err(XtdbError::UnsupportedOperation(
            format!("cannot negate {} clauses", clause.name()),
        )),
        other => Err(XtdbError::UnsupportedOperation(format!(
            "cannot use ~ on {} clauses",
            other.name()
        ))),
    }
}
