//! Typed query builder.
//!
//! A [`Query`] targets one entity type and accumulates where patterns,
//! projections and keys. Each method consumes the query and returns the
//! updated value, so a query shared between callers is simply cloned:
//!
//! ```
//! use xtdb_client::entity_type;
//! use xtdb_client::orm::Field;
//! use xtdb_client::query::Query;
//!
//! entity_type!(static OBJECT: "Object" = [Field::scalar("name")]);
//!
//! let query = Query::new(&OBJECT).where_(&OBJECT, [("name", "test".into())]).unwrap().limit(4);
//! assert_eq!(
//!     query.to_string(),
//!     r#"{:query {:find [(pull Object [*])] :where [ [ Object :Object/name "test" ] [ Object :type "Object" ]] :limit 4}}"#
//! );
//! ```

use std::fmt;

use tracing::trace;

use crate::datalog::{quote, And, Clause, Combine, Find, Kind, Or, Section, Where};
use crate::error::{Result, XtdbError};
use crate::expression::{Aggregate, Expression};
use crate::keys::{FindWhere, In, Limit, Offset, OrderBy, Timeout};
use crate::orm::{EntityType, TYPE_FIELD};

// ------------- Var -------------
/// A logic variable, rendered as `?name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Var(String);
impl Var {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
    pub fn name(&self) -> &str {
        &self.0
    }
}
impl fmt::Display for Var {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "?{}", self.0)
    }
}

// ------------- FieldValue -------------
/// The right hand side of a field equality in [`Query::where_`].
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Var(Var),
    Nil,
    Entity(&'static EntityType),
}

impl FieldValue {
    fn literal(&self) -> String {
        match self {
            Self::Str(value) => quote(value),
            Self::Int(value) => value.to_string(),
            Self::Float(value) => format!("{value:?}"),
            Self::Bool(value) => value.to_string(),
            Self::Var(var) => var.to_string(),
            Self::Nil => "nil".to_string(),
            Self::Entity(entity_type) => entity_type.alias().to_string(),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}
impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}
impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}
impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        Self::Int(value.into())
    }
}
impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}
impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}
impl From<Var> for FieldValue {
    fn from(var: Var) -> Self {
        Self::Var(var)
    }
}
impl From<&'static EntityType> for FieldValue {
    fn from(entity_type: &'static EntityType) -> Self {
        Self::Entity(entity_type)
    }
}
impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Nil, Into::into)
    }
}

// ------------- Query -------------
#[derive(Debug, Clone)]
pub struct Query {
    result_type: &'static EntityType,
    find: Option<Clause>,
    filter: Option<Clause>,
    in_: Option<In>,
    order_by: Option<OrderBy>,
    limit: Option<Limit>,
    offset: Option<Offset>,
    timeout: Option<Timeout>,
    preserved_return_type: bool,
}

impl Query {
    pub fn new(result_type: &'static EntityType) -> Self {
        Self {
            result_type,
            find: None,
            filter: None,
            in_: None,
            order_by: None,
            limit: None,
            offset: None,
            timeout: None,
            preserved_return_type: true,
        }
    }
    pub fn result_type(&self) -> &'static EntityType {
        self.result_type
    }
    /// False once an aggregate was applied: rows are no longer documents of
    /// the result type.
    pub fn preserved_return_type(&self) -> bool {
        self.preserved_return_type
    }

    /// Constrains fields of `entity_type` to equal the given values.
    ///
    /// Every field is validated here: unknown fields, and entity values on
    /// fields that are not relations, fail with `InvalidField`.
    pub fn where_<'a, I>(mut self, entity_type: &'static EntityType, fields: I) -> Result<Self>
    where
        I: IntoIterator<Item = (&'a str, FieldValue)>,
    {
        for (field, value) in fields {
            let clause = Self::field_is(entity_type, field, value)?;
            self.filter = Some(conjoin(self.filter.take(), clause)?);
        }
        Ok(self)
    }

    /// [`where_`](Self::where_) for a single field.
    pub fn where_field(
        self,
        entity_type: &'static EntityType,
        field: &str,
        value: impl Into<FieldValue>,
    ) -> Result<Self> {
        self.where_(entity_type, [(field, value.into())])
    }

    /// Conjoins an arbitrary where clause (predicates, negations, joins...).
    pub fn where_clause(mut self, clause: impl Into<Clause>) -> Result<Self> {
        let clause = clause.into();
        if clause.kind() != Kind::Where {
            return Err(XtdbError::IncompatibleSection {
                left: Section::Where.keyword().to_string(),
                right: clause.name().to_string(),
            });
        }
        self.filter = Some(conjoin(self.filter.take(), clause)?);
        Ok(self)
    }

    fn field_is(entity_type: &'static EntityType, field: &str, value: FieldValue) -> Result<Clause> {
        let alias = entity_type.alias();
        if entity_type.field(field).is_none() {
            return Err(XtdbError::InvalidField(format!("\"{field}\" is not a field of {alias}")));
        }
        if let FieldValue::Float(number) = value {
            if !number.is_finite() {
                return Err(XtdbError::InvalidField(format!(
                    "\"{field}\" cannot hold the non-finite value {number}"
                )));
            }
        }
        if let FieldValue::Entity(_) = value {
            if entity_type.relation(field).is_none() {
                return Err(XtdbError::InvalidField(format!(
                    "\"{field}\" is not a relation of {alias}"
                )));
            }
            if !entity_type.variants().is_empty() {
                let clauses = entity_type
                    .variants()
                    .iter()
                    .map(|variant| Where::new(alias, variant.qualify(field), value.literal()).into())
                    .collect();
                return Ok(Or::new(clauses).into());
            }
        }
        Ok(Where::new(alias, entity_type.qualify(field), value.literal()).into())
    }

    /// Projects `expression` instead of the pulled result document.
    pub fn find(mut self, expression: impl Into<Expression>) -> Self {
        self.push_find(Find::new(expression));
        self
    }

    fn push_find(&mut self, find: Find) {
        self.find = Some(match self.find.take() {
            None => find.into(),
            Some(Clause::And(and)) if and.section() == Section::Find => {
                let mut clauses = and.clauses().to_vec();
                clauses.push(find.into());
                And::new(clauses, Section::Find).into()
            }
            Some(previous) => And::new(vec![previous, find.into()], Section::Find).into(),
        });
    }

    fn aggregate(mut self, aggregate: Aggregate) -> Self {
        self.preserved_return_type = false;
        self.push_find(Find::new(aggregate));
        self
    }

    /// Counts a variable, or the documents of an entity type.
    pub fn count(self, operand: impl fmt::Display) -> Self {
        self.aggregate(Aggregate::count(operand))
    }
    pub fn count_distinct(self, var: &Var) -> Self {
        self.aggregate(Aggregate::count_distinct(var))
    }
    pub fn avg(self, var: &Var) -> Self {
        self.aggregate(Aggregate::avg(var))
    }
    pub fn sum(self, var: &Var) -> Self {
        self.aggregate(Aggregate::sum(var))
    }
    pub fn min(self, var: &Var) -> Self {
        self.aggregate(Aggregate::min(var))
    }
    pub fn max(self, var: &Var) -> Self {
        self.aggregate(Aggregate::max(var))
    }
    pub fn median(self, var: &Var) -> Self {
        self.aggregate(Aggregate::median(var))
    }
    pub fn variance(self, var: &Var) -> Self {
        self.aggregate(Aggregate::variance(var))
    }
    pub fn stddev(self, var: &Var) -> Self {
        self.aggregate(Aggregate::stddev(var))
    }
    pub fn distinct(self, var: &Var) -> Self {
        self.aggregate(Aggregate::distinct(var))
    }
    pub fn rand(self, var: &Var, n: u64) -> Self {
        self.aggregate(Aggregate::rand(var, n))
    }
    pub fn sample(self, var: &Var, n: u64) -> Self {
        self.aggregate(Aggregate::sample(var, n))
    }

    pub fn in_(mut self, in_: In) -> Self {
        self.in_ = Some(in_);
        self
    }
    pub fn order_by(mut self, order_by: OrderBy) -> Self {
        self.order_by = Some(order_by);
        self
    }
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(Limit(limit));
        self
    }
    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(Offset(offset));
        self
    }
    /// Milliseconds the database node may spend on the query.
    pub fn timeout(mut self, timeout: u64) -> Self {
        self.timeout = Some(Timeout(timeout));
        self
    }

    // [ Alias :type "Alias" ], or one pattern per variant
    fn type_assertion(&self) -> Clause {
        let alias = self.result_type.alias();
        let variants = self.result_type.variants();
        if variants.is_empty() {
            return Where::new(alias, TYPE_FIELD, quote(alias)).into();
        }
        let clauses = variants
            .iter()
            .map(|variant| Where::new(alias, TYPE_FIELD, quote(variant.alias())).into())
            .collect();
        Or::new(clauses).into()
    }

    /// Assembles the complete query.
    pub fn to_find_where(&self) -> FindWhere {
        let type_assertion = self.type_assertion();
        let filter = match &self.filter {
            None => type_assertion,
            Some(Clause::And(and)) if and.section() == Section::Where => {
                let mut clauses = and.clauses().to_vec();
                clauses.push(type_assertion);
                And::new(clauses, Section::Where).into()
            }
            Some(filter) => And::new(vec![filter.clone(), type_assertion], Section::Where).into(),
        };
        let find = self
            .find
            .clone()
            .unwrap_or_else(|| Find::new(format!("(pull {} [*])", self.result_type.alias())).into());

        let mut query = FindWhere::assemble(find, filter);
        if let Some(in_) = &self.in_ {
            query = query.with_in(in_.clone());
        }
        if let Some(order_by) = &self.order_by {
            query = query.with_order_by(order_by.clone());
        }
        if let Some(limit) = self.limit {
            query = query.with_limit(limit);
        }
        if let Some(offset) = self.offset {
            query = query.with_offset(offset);
        }
        if let Some(timeout) = self.timeout {
            query = query.with_timeout(timeout);
        }
        query
    }

    pub fn compile(&self, separator: &str) -> String {
        let compiled = self.to_find_where().compile(separator);
        trace!(query = %compiled, "compiled query");
        compiled
    }

    /// The query with one where pattern per line.
    pub fn format(&self) -> String {
        self.compile("\n    ")
    }
}

fn conjoin(accumulated: Option<Clause>, clause: Clause) -> Result<Clause> {
    match accumulated {
        Some(accumulated) => accumulated.and_(clause),
        None => Ok(clause),
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.compile(" "))
    }
}

impl PartialEq for Query {
    fn eq(&self, other: &Self) -> bool {
        self.to_string() == other.to_string()
    }
}
impl Eq for Query {}
